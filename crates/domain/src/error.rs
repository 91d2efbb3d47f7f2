use std::collections::HashMap;

use serde_json::Value;

/// Shared error type used across the BragerOne client crates.
///
/// Variants correspond to the error *kinds* named in the design: transport,
/// http-status, auth, parse, config. `lookup-miss` is deliberately absent —
/// symbol/mapping/language lookups that miss return `None`/empty collections
/// rather than an `Err`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    HttpStatus {
        status: u16,
        body: Value,
        headers: HashMap<String, String>,
    },

    #[error("auth: {0}")]
    Auth(String),

    #[error("parse: {0}")]
    Parse(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn http_status(status: u16, body: Value, headers: HashMap<String, String>) -> Self {
        Error::HttpStatus {
            status,
            body,
            headers,
        }
    }

    /// Status code, when this is an `HttpStatus` error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
