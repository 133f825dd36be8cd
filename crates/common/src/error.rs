//! Configuration and I/O errors

use thiserror::Error;

/// Errors raised while loading configuration
#[derive(Error, Debug)]
pub enum Error {
    /// A setting is missing or out of range
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
