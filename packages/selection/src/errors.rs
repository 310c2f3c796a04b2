//! Error types for the selection engine
//!
//! Runtime conditions (detached targets, thrashing, conflicting selection)
//! never surface here. These errors only cover the edges where text comes in
//! from outside: configuration files and string-encoded identifiers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown toolbar type: {0}")]
    UnknownToolbarType(String),

    #[error("Malformed anchor key: {0}")]
    MalformedAnchorKey(String),
}
