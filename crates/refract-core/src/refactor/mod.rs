//! Multi-file refactoring operations.
//!
//! Every operation here follows the same discipline:
//!
//! - target selection is driven by the index (usage lists, call-site lists),
//!   never by a blind workspace-wide text pass;
//! - preview and apply run the identical matching code, so what preview
//!   shows is exactly what apply does;
//! - writes go through the safe editor chokepoint;
//! - a failure on one file never aborts the others: per-file outcomes are
//!   collected and summarized.
//!
//! The generators ([`generate`]) are the exception to the write rule: they
//! only produce text and never touch a file.

pub mod generate;
pub mod movefile;
pub mod parameter;
pub mod pattern;
pub mod rename;

use serde::{Deserialize, Serialize};

/// One line an operation would change (or changed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditPreview {
    pub file: String,
    pub line: u32,
    pub before: String,
    pub after: String,
}

/// A file an operation could not process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFailure {
    pub file: String,
    pub error: String,
}

/// Whether a string is a plausible identifier for the indexed language.
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_validation() {
        assert!(is_identifier("Run"));
        assert!(is_identifier("_private"));
        assert!(is_identifier("save2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier("has space"));
        assert!(!is_identifier("a-b"));
    }
}
