//! Template errors carrying a position and a "did you mean" hint

use std::fmt;
use thiserror::Error;

/// Where in a template rendering failed
#[derive(Debug, Clone, Default)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
    pub template_name: Option<String>,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.template_name {
            Some(ref name) => write!(f, "{}:{}:{}", name, self.line, self.column),
            None => write!(f, "line {}:{}", self.line, self.column),
        }
    }
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("undefined variable '{name}' at {location}{}", hint(.suggestion))]
    UndefinedVariable {
        name: String,
        location: SourceLocation,
        suggestion: Option<String>,
    },

    #[error("syntax error at {location}: {message}")]
    SyntaxError {
        message: String,
        location: SourceLocation,
    },

    #[error("filter '{filter}' failed: {message}")]
    FilterError { filter: String, message: String },

    /// e.g. looping over a step result that is a string
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// A `checkpoint_if` condition that could not be evaluated
    #[error("expression error: {message}")]
    ExpressionError { message: String },

    #[error("template error: {0}")]
    Internal(#[from] minijinja::Error),
}

fn hint(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(", did you mean '{}'?", s))
        .unwrap_or_default()
}

impl TemplateError {
    pub fn undefined_variable(name: impl Into<String>, known_vars: &[&str]) -> Self {
        Self::undefined_variable_at(name, 0, 0, known_vars)
    }

    pub fn undefined_variable_at(
        name: impl Into<String>,
        line: usize,
        column: usize,
        known_vars: &[&str],
    ) -> Self {
        let name = name.into();
        let suggestion = suggest_correction(&name, known_vars);
        Self::UndefinedVariable {
            name,
            location: SourceLocation {
                line,
                column,
                template_name: None,
            },
            suggestion,
        }
    }

    pub fn syntax(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self::SyntaxError {
            message: message.into(),
            location: SourceLocation {
                line,
                column,
                template_name: None,
            },
        }
    }

    pub fn filter(filter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FilterError {
            filter: filter.into(),
            message: message.into(),
        }
    }

    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn expression(message: impl Into<String>) -> Self {
        Self::ExpressionError {
            message: message.into(),
        }
    }
}

/// Closest known name to a misspelled one, within half its length in edits
pub fn suggest_correction(typo: &str, candidates: &[&str]) -> Option<String> {
    let max_distance = (typo.chars().count() / 2).max(2);

    candidates
        .iter()
        .map(|candidate| (edit_distance(typo, candidate), *candidate))
        .filter(|(distance, _)| *distance <= max_distance)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate.to_string())
}

/// Levenshtein distance over chars, one row at a time
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = diagonal + usize::from(ca != *cb);
            diagonal = row[j + 1];
            row[j + 1] = substitution.min(row[j] + 1).min(row[j + 1] + 1);
        }
    }

    row[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("intake", "intkae"), 2);
        assert_eq!(edit_distance("", "ship"), 4);
        assert_eq!(edit_distance("ship", ""), 4);
        assert_eq!(edit_distance("review", "review"), 0);
    }

    #[test]
    fn test_suggest_step_names() {
        let candidates = ["intake", "inventory", "signoff", "dispatch"];

        assert_eq!(suggest_correction("intkae", &candidates), Some("intake".into()));
        assert_eq!(suggest_correction("sigoff", &candidates), Some("signoff".into()));
        assert_eq!(suggest_correction("completely_unrelated", &candidates), None);
        assert_eq!(suggest_correction("anything", &[]), None);
    }

    #[test]
    fn test_error_display() {
        let err = TemplateError::undefined_variable_at("intkae", 3, 7, &["intake", "signoff"]);
        let msg = err.to_string();
        assert!(msg.contains("undefined variable 'intkae'"));
        assert!(msg.contains("line 3:7"));
        assert!(msg.contains("did you mean 'intake'"));

        let err = TemplateError::undefined_variable("zzz", &["intake"]);
        assert!(!err.to_string().contains("did you mean"));
    }

    #[test]
    fn test_source_location_display() {
        let mut loc = SourceLocation {
            line: 2,
            column: 4,
            template_name: None,
        };
        assert_eq!(loc.to_string(), "line 2:4");

        loc.template_name = Some("approval.title".into());
        assert_eq!(loc.to_string(), "approval.title:2:4");
    }
}
