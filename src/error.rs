use thiserror::Error;

/// Errors produced by the subprocess bridge.
///
/// Protocol-level problems (malformed lines, unknown envelope types) never
/// surface here — the read loop absorbs them. These are the application-level
/// failures a caller can act on.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The wrapper executable is missing or failed to start.
    /// Recoverable by calling `start()` again.
    #[error("failed to spawn wrapper: {0}")]
    Spawn(String),

    /// An operation that requires a running wrapper was attempted while idle.
    #[error("not connected — start the wrapper first")]
    NotConnected,

    /// `start()` was called while a wrapper session is already live.
    #[error("wrapper already running")]
    AlreadyConnected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
}
