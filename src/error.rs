/// Boxed error produced by a [`Transport`](crate::Transport) implementation.
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    /// Invalid retry parameters, detected before any request is sent.
    #[error("invalid retry configuration: {0}")]
    Config(String),
    /// The cancellation token fired while waiting on the network or a backoff.
    #[error("request cancelled")]
    Cancelled,
    /// Failure reported by the underlying transport. Never retried.
    #[error("transport error: {0}")]
    Transport(#[source] TransportError),
}

impl RetryError {
    /// Returns `true` when the call was aborted through its cancellation token.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
