//! Client error type.

/// Errors surfaced by the sync client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A send was attempted while the socket was not open. The message was
    /// dropped.
    #[error("transport not open")]
    TransportNotOpen,
    /// No reply arrived before the request deadline.
    #[error("request timed out")]
    Timeout,
    /// The connection closed, or a newer request displaced this one.
    #[error("connection closed")]
    Closed,
    /// The server replied with an error payload.
    #[error("request rejected: {code}: {message}")]
    Rejected { code: String, message: String },
    #[error("codec error: {0}")]
    Codec(#[from] frames::CodecError),
    #[error("protocol error: {0}")]
    Protocol(#[from] frames::ProtocolError),
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(e))
    }
}
