use std::time::Duration;

use channel_mux::MuxError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not started")]
    NotStarted,

    #[error("connection closed before it opened")]
    ConnectionFailed,

    #[error("connection did not open within {0:?}")]
    ConnectTimeout(Duration),

    #[error("missing {0}: pass it on the command line or set it in config")]
    MissingCredential(&'static str),

    #[error(transparent)]
    Mux(#[from] MuxError),
}
