//! Display filters for approval prompts and results
//!
//! Everything else (`join`, `first`, `default`, `tojson`, ...) comes from the
//! minijinja builtins.

use minijinja::value::Value;
use minijinja::{Error, ErrorKind, State};

pub fn register_filters(env: &mut minijinja::Environment) {
    env.add_filter("money", filter_money);
    env.add_filter("short_id", filter_short_id);
}

/// Format a number as a currency amount with thousands separators
///
/// Example: `{{ 1234.5 | money }}` becomes `$1,234.50`; an optional
/// argument replaces the symbol: `{{ 80 | money("HK$") }}`.
fn filter_money(_state: &State, value: Value, symbol: Option<Value>) -> Result<Value, Error> {
    let symbol = symbol
        .as_ref()
        .and_then(|v| v.as_str())
        .unwrap_or("$")
        .to_string();

    let amount = match value.as_str() {
        Some(s) => s.trim().parse::<f64>().map_err(|_| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("money filter requires a number, got '{}'", s),
            )
        })?,
        None => f64::try_from(value.clone()).map_err(|_| {
            Error::new(ErrorKind::InvalidOperation, "money filter requires a number")
        })?,
    };

    let sign = if amount < 0.0 { "-" } else { "" };
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    Ok(Value::from(format!(
        "{}{}{}.{:02}",
        sign,
        symbol,
        grouped,
        cents % 100
    )))
}

/// First 8 alphanumerics of an identifier, upper-cased
///
/// `{{ run_id | short_id }}` on a uuid gives `6F1C2D3E`.
fn filter_short_id(_state: &State, value: Value) -> Result<Value, Error> {
    let short: String = value
        .to_string()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect();
    Ok(Value::from(short.to_uppercase()))
}
