//! Common error types for pattern labelling

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for pattern labelling operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the engine
#[derive(Error, Debug)]
pub enum Error {
    /// Attribute taxonomy file missing (or unreadable) in every known format
    #[error("Attribute taxonomy not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// Malformed document in one codec backend
    #[error("Parse error in {} ({backend}): {message}", .path.display())]
    Parse {
        path: PathBuf,
        backend: &'static str,
        message: String,
    },

    /// Attribute value not present in its type's allowed sequence
    #[error("Unknown value '{value}' for attribute type '{type_name}'")]
    UnknownValue { type_name: String, value: String },

    /// Attribute type name not registered
    #[error("Unknown attribute type: {0}")]
    UnknownType(String),

    /// Requested decoded image is not cached
    #[error("Image not cached: {}", .0.display())]
    CacheMiss(PathBuf),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML deserialization error
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Build a parse error tagged with the backend that produced it
    pub fn parse(path: impl Into<PathBuf>, backend: &'static str, message: impl ToString) -> Self {
        Error::Parse {
            path: path.into(),
            backend,
            message: message.to_string(),
        }
    }

    /// True when another backend may still succeed on the same input
    pub fn is_recoverable_parse(&self) -> bool {
        matches!(self, Error::Parse { .. })
    }
}
