//! Approval token generation

use rand::Rng;
use rand::distr::Alphanumeric;

/// Prefix carried by every approval token
pub const TOKEN_PREFIX: &str = "apr_";

const TOKEN_LEN: usize = 32;

/// Mint a fresh, unguessable approval token
pub fn new_token() -> String {
    let random: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect();
    format!("{}{}", TOKEN_PREFIX, random)
}

/// Cheap shape check before touching the registry
pub fn looks_like_token(token: &str) -> bool {
    token.strip_prefix(TOKEN_PREFIX).is_some_and(|rest| {
        rest.len() == TOKEN_LEN && rest.chars().all(|c| c.is_ascii_alphanumeric())
    })
}
