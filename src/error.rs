//! Error taxonomy for the channel and search subsystems.
//!
//! Both subsystems classify all I/O failures internally: subscribers and
//! update streams only ever observe typed states, never raw transport or
//! decode errors. The variants here are the caller-visible remainder.

/// Failures surfaced by the live channel manager.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// `send` was attempted while the channel is not `Open`. Non-fatal; the
    /// caller must not block waiting for reconnection.
    #[error("live channel is not open")]
    Unavailable,

    /// Opening a new channel handle failed. Feeds the reconnect ladder.
    #[error("channel connect failed: {0}")]
    Connect(String),

    /// An established channel dropped or a write on it failed. Feeds the
    /// reconnect ladder.
    #[error("channel lost: {0}")]
    Lost(String),

    /// The built-in transport only speaks plaintext `ws://`; encrypted
    /// endpoints need an injected transport.
    #[error("unsupported channel scheme `{0}`")]
    UnsupportedScheme(String),

    /// A snapshot pull failed while in polling fallback. Logged; polling
    /// continues on the next tick.
    #[error("snapshot poll failed: {0}")]
    Poll(String),
}

/// Failures surfaced by the search coordinator.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The request was superseded by newer input and aborted. Never shown to
    /// the user.
    #[error("search cancelled")]
    Cancelled,

    /// A genuine network or decode failure. Rendered as a distinct failed
    /// state, retryable by the next keystroke.
    #[error("search failed: {0}")]
    Failed(String),
}
