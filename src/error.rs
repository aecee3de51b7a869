//! Error handling for forcebridge-rs
//!
//! This module defines the crate error type and a Result alias used
//! throughout the library. Only [`ForceBridgeError::Config`] and
//! [`ForceBridgeError::SourceRead`] abort a run; every other variant is
//! reported and the run carries on with the next file or variable.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for forcebridge-rs operations
#[derive(Error, Debug)]
pub enum ForceBridgeError {
    /// Required configuration fields missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// A source table could not be opened or read at all
    #[error("Failed to read source file {path:?}: {message}")]
    SourceRead { path: PathBuf, message: String },

    /// Row-level parse problems (recovered as NaN by the parser)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Cache payload unreadable, corrupt or incomplete
    #[error("Cache error: {0}")]
    Cache(String),

    /// The resolver found no leaf with the requested name
    #[error("Variable not found: {0}")]
    VariableNotFound(String),

    /// Destination for a force file could not be written
    #[error("Output write error: {0}")]
    OutputWrite(String),

    /// Transformation script failed to compile or evaluate
    #[error("Transform error: {0}")]
    Transform(String),

    /// Tree assembly problems (empty paths)
    #[error("Variable tree error: {0}")]
    Tree(String),

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
        source: Box<ForceBridgeError>,
    },
}

impl ForceBridgeError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ForceBridgeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a transform error from a Rhai error
    pub fn from_rhai_error(err: Box<rhai::EvalAltResult>) -> Self {
        ForceBridgeError::Transform(err.to_string())
    }

    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        match self {
            ForceBridgeError::Config(_) | ForceBridgeError::SourceRead { .. } => true,
            ForceBridgeError::WithContext { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

impl From<bincode::Error> for ForceBridgeError {
    fn from(err: bincode::Error) -> Self {
        ForceBridgeError::Serialization(err.to_string())
    }
}

/// Result type alias for forcebridge-rs operations
pub type Result<T> = std::result::Result<T, ForceBridgeError>;

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

impl<T> ResultExt<T> for std::result::Result<T, Box<rhai::EvalAltResult>> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ForceBridgeError::from_rhai_error(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| ForceBridgeError::from_rhai_error(e).with_context(f()))
    }
}
