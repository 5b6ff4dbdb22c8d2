use thiserror::Error;

/// Errors raised while setting up the runtime (logging, configuration).
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
