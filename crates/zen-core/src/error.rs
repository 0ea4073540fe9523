//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown asset type: {value}")]
    UnknownAssetType { value: String },

    #[error("Unknown variable type: {value}")]
    UnknownVariableType { value: String },

    #[error("Invalid validation rule '{rule}': {message}")]
    InvalidRule { rule: String, message: String },

    #[error("Content is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
