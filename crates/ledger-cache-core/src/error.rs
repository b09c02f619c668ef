//! Error types for the core domain.

use thiserror::Error;

/// Errors produced while interpreting core domain values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The given name does not match any cache category.
    #[error("unknown cache category '{0}'")]
    UnknownCategory(String),

    /// A principal (user or token address) was empty after normalization.
    #[error("empty principal for {role}")]
    EmptyPrincipal {
        /// Which argument was empty (e.g. "user", "token").
        role: &'static str,
    },
}

impl CoreError {
    /// Creates a new unknown category error.
    pub fn unknown_category(name: impl Into<String>) -> Self {
        Self::UnknownCategory(name.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::unknown_category("balances");
        assert_eq!(err.to_string(), "unknown cache category 'balances'");

        let err = CoreError::EmptyPrincipal { role: "user" };
        assert_eq!(err.to_string(), "empty principal for user");
    }
}
