//! Error handling for canvis-rs
//!
//! This module defines the crate error type and a Result alias for use
//! throughout the workers, the catalog codec and the configuration layer.

use thiserror::Error;

/// Main error type for canvis-rs operations
#[derive(Error, Debug)]
pub enum CanVisError {
    /// A frame payload could not be decoded against its catalog message
    #[error("Decode error for 0x{id:X}: {message}")]
    Decode { id: u32, message: String },

    /// Signal values could not be encoded into a payload
    #[error("Encode error for 0x{id:X}: {message}")]
    Encode { id: u32, message: String },

    /// The catalog has no message with this identifier
    #[error("Unknown message 0x{0:X}")]
    UnknownMessage(u32),

    /// An operation needed a catalog but none is loaded
    #[error("no database loaded")]
    NoCatalog,

    /// An inbound frame could not be normalised
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// A replay log line could not be parsed
    #[error("Replay error on line {line}: {message}")]
    Replay { line: usize, message: String },

    /// Timeout errors
    #[error("Timeout: {0}")]
    Timeout(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<CanVisError>,
    },
}

impl CanVisError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        CanVisError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Shorthand for a decode error
    pub fn decode(id: u32, message: impl Into<String>) -> Self {
        CanVisError::Decode {
            id,
            message: message.into(),
        }
    }

    /// Shorthand for an encode error
    pub fn encode(id: u32, message: impl Into<String>) -> Self {
        CanVisError::Encode {
            id,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CanVisError {
    fn from(err: serde_json::Error) -> Self {
        CanVisError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for CanVisError {
    fn from(err: toml::de::Error) -> Self {
        CanVisError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for CanVisError {
    fn from(err: toml::ser::Error) -> Self {
        CanVisError::Serialization(err.to_string())
    }
}

/// Result type alias for canvis-rs operations
pub type Result<T> = std::result::Result<T, CanVisError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
