use thiserror::Error;

/// Narrow, `sa_http`-local error type. Converts into `sa_domain::Error`
/// at the crate boundary via `#[from]`, the same pattern `sa-node-sdk`
/// uses for `NodeSdkError`.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("not authenticated and no credentials provider configured")]
    NoCredentials,
    #[error("login failed: {0}")]
    Login(String),
    #[error("unexpected response status {status}: {body}")]
    Status { status: u16, body: String },
}

impl From<HttpError> for sa_domain::Error {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Request(e) => sa_domain::Error::Transport(e.to_string()),
            HttpError::NoCredentials => sa_domain::Error::Auth(err.to_string()),
            HttpError::Login(msg) => sa_domain::Error::Auth(msg),
            HttpError::Status { status, body } => sa_domain::Error::HttpStatus {
                status,
                body: serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body)),
                headers: Default::default(),
            },
        }
    }
}
