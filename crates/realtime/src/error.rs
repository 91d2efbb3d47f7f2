use thiserror::Error;

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("handshake timed out")]
    HandshakeTimeout,
    #[error("connection closed before handshake completed")]
    Closed,
}

impl From<RealtimeError> for sa_domain::Error {
    fn from(err: RealtimeError) -> Self {
        sa_domain::Error::Transport(err.to_string())
    }
}
