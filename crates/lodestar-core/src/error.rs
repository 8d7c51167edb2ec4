//! Error types for the engine.

use thiserror::Error;

/// Engine-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// A value could not be parsed
    #[error("Invalid value for {what}: {value:?}")]
    InvalidValue {
        /// What was being parsed
        what: &'static str,
        /// The offending input
        value: String,
    },

    /// Command line argument error
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
