//! Polling fallback pieces for the live channel.
//!
//! While the channel cannot be sustained, the manager pulls dashboard
//! snapshots on a fixed interval and synthesizes the same [`InboundEvent`]
//! shapes the channel would have pushed, so subscribers stay
//! transport-agnostic.

use std::collections::BTreeMap;
use std::future::Future;

use crate::error::ChannelError;
use crate::event::{InboundEvent, KpiSnapshot};

/// State pulled from the snapshot endpoint in one poll.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DashboardSnapshot {
    /// Current KPI counters, keyed by metric name.
    pub kpis: BTreeMap<String, i64>,
}

impl DashboardSnapshot {
    /// What: Convert one snapshot into the events it stands in for.
    ///
    /// Inputs: consumed snapshot.
    ///
    /// Output:
    /// - A `KpiUpdate` carrying the counters, or nothing when the snapshot
    ///   is empty.
    ///
    /// Details:
    /// - Subscribers receive these through the same dispatch path as channel
    ///   frames.
    #[must_use]
    pub fn into_events(self) -> Vec<InboundEvent> {
        if self.kpis.is_empty() {
            return Vec::new();
        }
        vec![InboundEvent::KpiUpdate(KpiSnapshot { values: self.kpis })]
    }
}

/// Capability to pull one dashboard snapshot.
pub trait SnapshotSource: Send + Sync + 'static {
    /// Fetch the current snapshot. Failures are logged by the manager and
    /// polling continues on the next tick.
    fn fetch_snapshot(
        &self,
    ) -> impl Future<Output = Result<DashboardSnapshot, ChannelError>> + Send;
}
