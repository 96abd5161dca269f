//! Errors surfaced by the outer analysis API
//!
//! The transfer function itself never fails; these cover the entry points
//! that locate functions and load configuration.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no function named `{0}` in the translation unit")]
    UnknownFunction(String),

    #[error("function `{0}` has no body in the translation unit")]
    MissingBody(String),

    #[error("invalid analysis configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("failed to read analysis configuration: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
