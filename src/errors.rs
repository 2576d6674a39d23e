use std::str::Utf8Error;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RosterError>;

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Parsing error: {0}")]
    Parse(String),
    #[error("Storage error: {0} {1}")]
    Storage(String, String),
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<Utf8Error> for RosterError {
    fn from(e: Utf8Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<serde_json::Error> for RosterError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<url::ParseError> for RosterError {
    fn from(e: url::ParseError) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderValue> for RosterError {
    fn from(e: reqwest::header::InvalidHeaderValue) -> Self {
        Self::Other(anyhow::anyhow!(e.to_string()))
    }
}
