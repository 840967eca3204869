use thiserror::Error;

/// Errors produced by model constructors and validation routines.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid code host: {0}")]
    InvalidCodeHost(String),

    #[error("unknown {kind} value: {value}")]
    UnknownState { kind: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, ModelError>;
