//! Error type shared by the library and the `nkpc` binary.
//!
//! Every variant carries a process exit code so `main` can stay tiny:
//! print the message, exit with `err.exit_code()`.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Bad input shape: unsupported extension, missing archive member, etc.
    #[error("{0}")]
    Usage(String),

    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Unsupported regression method '{0}': only 'OLS' is supported.")]
    UnsupportedMethod(String),

    #[error("Missing column: `{0}`")]
    MissingColumn(String),

    #[error("Date {0} is not part of the panel index.")]
    MissingDate(NaiveDate),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Numerical failure: {0}")]
    Numerical(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl AppError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    pub fn numerical(message: impl Into<String>) -> Self {
        Self::Numerical(message.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Usage(_)
            | AppError::NotFound(_)
            | AppError::UnsupportedMethod(_)
            | AppError::Config(_) => 2,
            AppError::MissingColumn(_) | AppError::MissingDate(_) => 3,
            AppError::Numerical(_) | AppError::Io { .. } => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_class() {
        assert_eq!(AppError::usage("x").exit_code(), 2);
        assert_eq!(AppError::MissingColumn("GDP".into()).exit_code(), 3);
        assert_eq!(AppError::numerical("singular").exit_code(), 4);
    }

    #[test]
    fn unsupported_method_message_names_method() {
        let err = AppError::UnsupportedMethod("quadratic".into());
        assert!(err.to_string().contains("quadratic"));
    }
}
