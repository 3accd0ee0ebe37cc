/// Errors raised at the edges of the multiplexer.
///
/// Channel operations never surface these to callers; they are absorbed and
/// logged. Only endpoint parsing and the [`Transport`](crate::Transport) seam
/// return them.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    #[error("transport is not open")]
    NotOpen,

    #[error("transport closed")]
    TransportClosed,

    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}
