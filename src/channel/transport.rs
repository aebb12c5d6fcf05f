//! Transport seam between the channel manager and the network.
//!
//! The manager never touches sockets. It asks a [`ChannelTransport`] for one
//! [`ChannelHandle`] at a time and observes loss through the handle's
//! channel endpoints, so tests and alternative transports (TLS, in-process)
//! plug in without touching the state machine.

use std::future::Future;

use tokio::sync::mpsc;

use crate::error::ChannelError;

/// One live duplex connection, represented as its two message streams.
///
/// The handle owns nothing beyond the channel endpoints: dropping it tears
/// the connection down, and transport-side failure is observed as the
/// incoming stream closing or an outgoing send failing.
#[derive(Debug)]
pub struct ChannelHandle {
    /// Frames pushed by the server. `None` from `recv` means the connection
    /// is gone.
    pub incoming: mpsc::UnboundedReceiver<String>,
    /// Frames to write to the server. A send error means the connection is
    /// gone.
    pub outgoing: mpsc::UnboundedSender<String>,
}

/// Capability to open a duplex channel to the given URL.
pub trait ChannelTransport: Send + Sync + 'static {
    /// Open a fresh connection. Called once per attempt; the manager never
    /// holds more than one returned handle at a time.
    fn open(&self, url: &str) -> impl Future<Output = Result<ChannelHandle, ChannelError>> + Send;
}

/// What: Build a loopback connection pair for tests and in-process demos.
///
/// Inputs: none.
///
/// Output:
/// - `(client, server)` handles cross-wired so frames sent on one side
///   arrive on the other.
///
/// Details:
/// - Dropping either handle closes the link for both sides, mirroring how a
///   real socket fails.
#[must_use]
pub fn memory_pair() -> (ChannelHandle, ChannelHandle) {
    let (client_tx, server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();
    (
        ChannelHandle {
            incoming: client_rx,
            outgoing: client_tx,
        },
        ChannelHandle {
            incoming: server_rx,
            outgoing: server_tx,
        },
    )
}
