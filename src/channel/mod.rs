//! Live channel manager: one resilient duplex connection to the dashboard
//! push endpoint.
//!
//! A single driver task owns the connection handle, the heartbeat, the
//! reconnect ladder, and the polling fallback, so there is never more than
//! one of any of them. The public [`LiveChannel`] handle only enqueues
//! commands and reads the published [`ChannelState`]; teardown bumps a
//! generation counter so callbacks from a stopped incarnation are muted.

pub mod backoff;
pub mod poll;
pub mod transport;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::ChannelError;
use crate::event::{InboundEvent, OutboundMessage, decode_frame};
use backoff::BackoffPolicy;
use poll::SnapshotSource;
use transport::{ChannelHandle, ChannelTransport};

/// Lifecycle states of the live channel, published through a watch channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    /// A handshake is in flight (initial connect or a fallback probe).
    Connecting,
    /// The channel is established; `send` works and heartbeats run.
    Open,
    /// The channel was lost; retry number `attempt` is scheduled or running.
    Reconnecting(u32),
    /// The retry budget is spent; snapshots are polled instead.
    PollingFallback,
    /// Not running: before `start`, or terminally after `stop`.
    Closed,
}

/// Environment transitions the host feeds into the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvSignal {
    /// The page or window regained foreground focus.
    FocusGained,
    /// The page or window went to the background.
    FocusLost,
    /// The platform reported network reachability.
    NetworkUp,
    /// The platform reported the network as gone.
    NetworkDown,
}

/// Tunables for one live channel instance.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Channel endpoint, e.g. `ws://host:port/ws/dashboard`.
    pub url: String,
    /// Reconnect schedule consulted after every loss.
    pub backoff: BackoffPolicy,
    /// Keepalive ping cadence while `Open`.
    pub heartbeat_interval: Duration,
    /// Snapshot pull cadence while in `PollingFallback`.
    pub poll_interval: Duration,
    /// Reconnect probe cadence while in `PollingFallback`.
    pub probe_interval: Duration,
}

impl ChannelConfig {
    /// Config with the standard cadences: 30s heartbeat, 30s polling, 60s
    /// probes, default backoff.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            backoff: BackoffPolicy::default(),
            heartbeat_interval: Duration::from_secs(30),
            poll_interval: Duration::from_secs(30),
            probe_interval: Duration::from_secs(60),
        }
    }
}

/// Identifies one subscription for [`LiveChannel::unsubscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Commands the handle enqueues for the driver task.
enum Command {
    /// Forward a frame to the server.
    Send(OutboundMessage),
    /// An environment transition to feed the state machine.
    Signal(EnvSignal),
}

/// State shared between the handle and the driver task.
struct Shared {
    /// Latest channel state; `send_replace` never fails even with no
    /// receivers.
    state: watch::Sender<ChannelState>,
    /// Subscribers in insertion order; pruned when a receiver is dropped.
    subscribers: Mutex<Vec<(u64, mpsc::UnboundedSender<InboundEvent>)>>,
    /// Allocator for [`SubscriberId`]s.
    next_subscriber: AtomicU64,
    /// Incarnation counter; bumped by `start` and `stop` to mute stragglers.
    generation: AtomicU64,
}

impl Shared {
    /// Lock the subscriber registry, recovering from a poisoned lock.
    fn registry(&self) -> MutexGuard<'_, Vec<(u64, mpsc::UnboundedSender<InboundEvent>)>> {
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Live pieces of one `start()`..`stop()` span.
struct Incarnation {
    /// Command lane into the driver.
    cmd_tx: mpsc::UnboundedSender<Command>,
    /// The driver task itself; aborted on `stop`.
    task: JoinHandle<()>,
}

/// Handle to one live channel instance.
///
/// Dropping the handle stops the driver, so the channel cannot outlive its
/// owner.
pub struct LiveChannel<T, S> {
    /// Config captured at construction; each `start` reuses it.
    cfg: ChannelConfig,
    /// Connection opener.
    transport: Arc<T>,
    /// Snapshot puller for the polling fallback.
    snapshots: Arc<S>,
    /// Handle/driver shared state.
    shared: Arc<Shared>,
    /// Current incarnation, if the channel is running.
    runtime: Mutex<Option<Incarnation>>,
}

impl<T, S> LiveChannel<T, S> {
    /// Lock the incarnation slot, recovering from a poisoned lock.
    fn slot(&self) -> MutexGuard<'_, Option<Incarnation>> {
        match self.runtime.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Current channel state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    /// What: Subscribe to state transitions.
    ///
    /// Inputs: none.
    ///
    /// Output: Watch receiver that observes every published state change
    /// (coalesced to the latest under load).
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }

    /// What: Register an event subscriber.
    ///
    /// Inputs: none.
    ///
    /// Output: Subscriber id plus the receiving end of the event stream.
    ///
    /// Details:
    /// - Delivery is in subscriber-insertion order.
    /// - Dropping the receiver is equivalent to `unsubscribe`; the registry
    ///   is pruned on the next dispatch.
    #[must_use]
    pub fn subscribe(&self) -> (SubscriberId, mpsc::UnboundedReceiver<InboundEvent>) {
        let id = self.shared.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.registry().push((id, tx));
        (SubscriberId(id), rx)
    }

    /// Remove a subscriber; its receiver stops yielding events.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.shared.registry().retain(|(sid, _)| *sid != id.0);
    }

    /// What: Send one frame to the server.
    ///
    /// Inputs:
    /// - `message`: Frame to deliver.
    ///
    /// Output:
    /// - `Ok(())` when the channel is `Open` and the frame was enqueued.
    ///
    /// # Errors
    /// - [`ChannelError::Unavailable`] in every other state; callers must
    ///   not block waiting for reconnection.
    pub fn send(&self, message: OutboundMessage) -> Result<(), ChannelError> {
        let slot = self.slot();
        let Some(inc) = slot.as_ref() else {
            return Err(ChannelError::Unavailable);
        };
        if *self.shared.state.borrow() != ChannelState::Open {
            return Err(ChannelError::Unavailable);
        }
        inc.cmd_tx
            .send(Command::Send(message))
            .map_err(|_| ChannelError::Unavailable)
    }

    /// Feed an environment transition into the state machine. Ignored while
    /// the channel is not running.
    pub fn signal(&self, signal: EnvSignal) {
        let slot = self.slot();
        if let Some(inc) = slot.as_ref() {
            if inc.cmd_tx.send(Command::Signal(signal)).is_err() {
                debug!(?signal, "signal dropped, driver gone");
            }
        } else {
            debug!(?signal, "signal ignored, channel closed");
        }
    }

    /// What: Tear the channel down.
    ///
    /// Inputs: none.
    ///
    /// Output: State is `Closed`; the driver, its timers, and the handle are
    /// released and no further events are dispatched.
    ///
    /// Details:
    /// - Terminal for this incarnation. `start` afterwards begins from
    ///   scratch with a fresh attempt counter.
    pub fn stop(&self) {
        let Some(inc) = self.slot().take() else {
            return;
        };
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        inc.task.abort();
        drop(inc.cmd_tx);
        let _ = self.shared.state.send_replace(ChannelState::Closed);
        info!("live channel stopped");
    }
}

impl<T: ChannelTransport, S: SnapshotSource> LiveChannel<T, S> {
    /// Build a channel in the `Closed` state; nothing runs until `start`.
    #[must_use]
    pub fn new(cfg: ChannelConfig, transport: T, snapshots: S) -> Self {
        let (state, _) = watch::channel(ChannelState::Closed);
        Self {
            cfg,
            transport: Arc::new(transport),
            snapshots: Arc::new(snapshots),
            shared: Arc::new(Shared {
                state,
                subscribers: Mutex::new(Vec::new()),
                next_subscriber: AtomicU64::new(0),
                generation: AtomicU64::new(0),
            }),
            runtime: Mutex::new(None),
        }
    }

    /// What: Start connecting.
    ///
    /// Inputs: none.
    ///
    /// Output: State moves to `Connecting` and a fresh driver incarnation is
    /// spawned.
    ///
    /// Details:
    /// - Idempotent: a no-op while an incarnation is already running, in any
    ///   state.
    pub fn start(&self) {
        let mut slot = self.slot();
        if slot.is_some() {
            debug!("start ignored, channel already running");
            return;
        }
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let _ = self.shared.state.send_replace(ChannelState::Connecting);
        let driver = Driver {
            cfg: self.cfg.clone(),
            transport: Arc::clone(&self.transport),
            snapshots: Arc::clone(&self.snapshots),
            shared: Arc::clone(&self.shared),
            cmd_rx,
            generation,
        };
        let task = tokio::spawn(driver.run());
        *slot = Some(Incarnation { cmd_tx, task });
    }
}

impl<T, S> Drop for LiveChannel<T, S> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Where the driver goes after leaving its current activity.
enum Mode {
    /// Attempt a transport open.
    Connect,
    /// Run the open connection.
    Serve(ChannelHandle),
    /// Consult the backoff ladder after a failure.
    Backoff,
}

/// Why `serve` returned.
enum ServeEnd {
    /// The handle side shut the channel down.
    Shutdown,
    /// The connection failed; reason for the log line.
    Lost(&'static str),
}

/// Why a backoff wait ended.
enum WaitEnd {
    /// Timer elapsed or a signal bypassed it; retry now.
    Go,
    /// The handle side shut the channel down.
    Shutdown,
}

/// Why the polling loop returned.
enum PollEnd {
    /// The handle side shut the channel down.
    Shutdown,
    /// A probe reconnected; resume channel mode with this handle.
    Resume(ChannelHandle),
}

/// The driver task: sole owner of the connection handle and every timer.
struct Driver<T, S> {
    /// Config snapshot for this incarnation.
    cfg: ChannelConfig,
    /// Connection opener.
    transport: Arc<T>,
    /// Snapshot puller.
    snapshots: Arc<S>,
    /// Handle/driver shared state.
    shared: Arc<Shared>,
    /// Commands from the handle; `None` means the handle is gone.
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    /// Incarnation this driver belongs to.
    generation: u64,
}

impl<T: ChannelTransport, S: SnapshotSource> Driver<T, S> {
    /// Whether this driver is still the current incarnation.
    fn live(&self) -> bool {
        self.shared.generation.load(Ordering::SeqCst) == self.generation
    }

    /// Publish a state unless this incarnation has been superseded.
    fn publish(&self, state: ChannelState) {
        if self.live() {
            let _ = self.shared.state.send_replace(state);
        }
    }

    /// Deliver one event to every subscriber in insertion order, pruning
    /// dropped receivers.
    fn dispatch(&self, event: InboundEvent) {
        if !self.live() {
            return;
        }
        self.shared.registry().retain(|(id, tx)| {
            if tx.send(event.clone()).is_ok() {
                true
            } else {
                debug!(subscriber = *id, "pruning dropped subscriber");
                false
            }
        });
    }

    /// Main state machine loop for one incarnation.
    async fn run(mut self) {
        info!(url = %self.cfg.url, "live channel starting");
        let mut attempt: u32 = 0;
        let mut mode = Mode::Connect;
        loop {
            mode = match mode {
                Mode::Connect => match self.transport.open(&self.cfg.url).await {
                    Ok(conn) => {
                        attempt = 0;
                        Mode::Serve(conn)
                    }
                    Err(err) => {
                        warn!(error = %err, "channel connect failed");
                        Mode::Backoff
                    }
                },
                Mode::Serve(conn) => {
                    self.publish(ChannelState::Open);
                    info!("live channel open");
                    match self.serve(conn).await {
                        ServeEnd::Shutdown => break,
                        ServeEnd::Lost(reason) => {
                            warn!(reason, "live channel lost");
                            Mode::Backoff
                        }
                    }
                }
                Mode::Backoff => {
                    attempt += 1;
                    if self.cfg.backoff.is_exhausted(attempt) {
                        error!(
                            attempts = attempt - 1,
                            "max reconnect attempts exceeded, falling back to polling"
                        );
                        self.publish(ChannelState::PollingFallback);
                        match self.poll_loop().await {
                            PollEnd::Shutdown => break,
                            PollEnd::Resume(conn) => {
                                attempt = 0;
                                Mode::Serve(conn)
                            }
                        }
                    } else {
                        self.publish(ChannelState::Reconnecting(attempt));
                        let delay = self.cfg.backoff.delay(attempt);
                        info!(attempt, ?delay, "reconnect scheduled");
                        match self.wait_retry(delay).await {
                            WaitEnd::Shutdown => break,
                            WaitEnd::Go => Mode::Connect,
                        }
                    }
                }
            };
        }
        self.publish(ChannelState::Closed);
        info!("live channel driver exited");
    }

    /// Run an open connection: pump inbound frames, keep the heartbeat
    /// going, and forward outbound sends.
    async fn serve(&mut self, mut conn: ChannelHandle) -> ServeEnd {
        let mut heartbeat = tokio::time::interval_at(
            tokio::time::Instant::now() + self.cfg.heartbeat_interval,
            self.cfg.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                maybe_frame = conn.incoming.recv() => match maybe_frame {
                    Some(raw) => match decode_frame(&raw) {
                        Ok(event) => self.dispatch(event),
                        Err(err) => warn!(error = %err, "skipping malformed channel frame"),
                    },
                    None => return ServeEnd::Lost("server closed the stream"),
                },
                _ = heartbeat.tick() => {
                    if conn.outgoing.send(OutboundMessage::ping().to_frame()).is_err() {
                        return ServeEnd::Lost("heartbeat write failed");
                    }
                    debug!("heartbeat sent");
                }
                maybe_cmd = self.cmd_rx.recv() => match maybe_cmd {
                    Some(Command::Send(msg)) => {
                        if conn.outgoing.send(msg.to_frame()).is_err() {
                            return ServeEnd::Lost("outbound write failed");
                        }
                    }
                    Some(Command::Signal(signal)) => {
                        debug!(?signal, "signal ignored while open");
                    }
                    None => return ServeEnd::Shutdown,
                },
            }
        }
    }

    /// Wait out one backoff delay. Focus or reachability signals bypass the
    /// timer without touching the attempt counter.
    async fn wait_retry(&mut self, delay: Duration) -> WaitEnd {
        let deadline = tokio::time::sleep(delay);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                () = &mut deadline => return WaitEnd::Go,
                maybe_cmd = self.cmd_rx.recv() => match maybe_cmd {
                    Some(Command::Signal(EnvSignal::FocusGained | EnvSignal::NetworkUp)) => {
                        info!("environment signal, retrying immediately");
                        return WaitEnd::Go;
                    }
                    Some(Command::Signal(signal)) => {
                        debug!(?signal, "signal noted during backoff");
                    }
                    Some(Command::Send(_)) => debug!("dropping send while reconnecting"),
                    None => return WaitEnd::Shutdown,
                },
            }
        }
    }

    /// Poll snapshots on the fixed cadence and probe for a reconnect on the
    /// probe cadence or on an environment signal.
    async fn poll_loop(&mut self) -> PollEnd {
        let mut poll = tokio::time::interval(self.cfg.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut probe = tokio::time::interval_at(
            tokio::time::Instant::now() + self.cfg.probe_interval,
            self.cfg.probe_interval,
        );
        probe.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = poll.tick() => self.poll_once().await,
                _ = probe.tick() => {
                    if let Some(end) = self.probe_once().await {
                        return end;
                    }
                }
                maybe_cmd = self.cmd_rx.recv() => match maybe_cmd {
                    Some(Command::Signal(EnvSignal::FocusGained | EnvSignal::NetworkUp)) => {
                        info!("environment signal, probing for reconnect");
                        if let Some(end) = self.probe_once().await {
                            return end;
                        }
                    }
                    Some(Command::Signal(signal)) => {
                        debug!(?signal, "signal noted while polling");
                    }
                    Some(Command::Send(_)) => debug!("dropping send while polling"),
                    None => return PollEnd::Shutdown,
                },
            }
        }
    }

    /// Pull one snapshot and dispatch the synthesized events. Failures keep
    /// the loop running.
    async fn poll_once(&mut self) {
        match self.snapshots.fetch_snapshot().await {
            Ok(snapshot) => {
                let events = snapshot.into_events();
                debug!(events = events.len(), "poll snapshot fetched");
                for event in events {
                    self.dispatch(event);
                }
            }
            Err(err) => warn!(error = %err, "snapshot poll failed"),
        }
    }

    /// One reconnect probe from polling fallback. Returns `Some` when the
    /// loop should end, `None` to keep polling.
    async fn probe_once(&mut self) -> Option<PollEnd> {
        self.publish(ChannelState::Connecting);
        match self.transport.open(&self.cfg.url).await {
            Ok(conn) => {
                info!("reconnect probe succeeded, leaving polling fallback");
                Some(PollEnd::Resume(conn))
            }
            Err(err) => {
                debug!(error = %err, "reconnect probe failed, staying on polling");
                self.publish(ChannelState::PollingFallback);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicU32;

    use tokio::sync::Semaphore;

    use super::poll::DashboardSnapshot;
    use super::transport::memory_pair;
    use super::*;

    /// Transport whose open attempts are gated by a semaphore so tests can
    /// pace the driver deterministically.
    struct ScriptedTransport {
        gate: Arc<Semaphore>,
        accept: Arc<AtomicU32>,
        opened: Arc<AtomicU32>,
        server_sides: mpsc::UnboundedSender<ChannelHandle>,
    }

    impl ScriptedTransport {
        fn new(
            accept: u32,
        ) -> (
            Self,
            Arc<Semaphore>,
            Arc<AtomicU32>,
            Arc<AtomicU32>,
            mpsc::UnboundedReceiver<ChannelHandle>,
        ) {
            let gate = Arc::new(Semaphore::new(0));
            let accept = Arc::new(AtomicU32::new(accept));
            let opened = Arc::new(AtomicU32::new(0));
            let (tx, rx) = mpsc::unbounded_channel();
            let t = Self {
                gate: Arc::clone(&gate),
                accept: Arc::clone(&accept),
                opened: Arc::clone(&opened),
                server_sides: tx,
            };
            (t, gate, accept, opened, rx)
        }
    }

    impl ChannelTransport for ScriptedTransport {
        async fn open(&self, _url: &str) -> Result<ChannelHandle, ChannelError> {
            self.gate
                .acquire()
                .await
                .expect("gate semaphore closed")
                .forget();
            self.opened.fetch_add(1, Ordering::SeqCst);
            if self.accept.load(Ordering::SeqCst) > 0 {
                self.accept.fetch_sub(1, Ordering::SeqCst);
                let (client, server) = memory_pair();
                let _ = self.server_sides.send(server);
                Ok(client)
            } else {
                Err(ChannelError::Connect("scripted offline".into()))
            }
        }
    }

    /// Snapshot source serving a fixed KPI map.
    struct FixedSnapshots;

    impl SnapshotSource for FixedSnapshots {
        async fn fetch_snapshot(&self) -> Result<DashboardSnapshot, ChannelError> {
            let mut kpis = BTreeMap::new();
            kpis.insert("total_books".to_string(), 42);
            Ok(DashboardSnapshot { kpis })
        }
    }

    fn test_config() -> ChannelConfig {
        let mut cfg = ChannelConfig::new("ws://127.0.0.1:9/ws/dashboard");
        cfg.backoff = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(5), 3);
        cfg.heartbeat_interval = Duration::from_secs(30);
        cfg.poll_interval = Duration::from_secs(30);
        cfg.probe_interval = Duration::from_secs(60);
        cfg
    }

    async fn next_state(rx: &mut watch::Receiver<ChannelState>) -> ChannelState {
        rx.changed().await.expect("state sender gone");
        *rx.borrow_and_update()
    }

    #[tokio::test(start_paused = true)]
    /// What: Send is rejected in every state except `Open`.
    ///
    /// - Input: Send before start, while connecting, and after stop
    /// - Output: `ChannelError::Unavailable` each time
    async fn channel_send_requires_open() {
        let (transport, _gate, _accept, _opened, _servers) = ScriptedTransport::new(0);
        let channel = LiveChannel::new(test_config(), transport, FixedSnapshots);

        assert!(matches!(
            channel.send(OutboundMessage::ping()),
            Err(ChannelError::Unavailable)
        ));

        channel.start();
        assert_eq!(channel.state(), ChannelState::Connecting);
        assert!(matches!(
            channel.send(OutboundMessage::ping()),
            Err(ChannelError::Unavailable)
        ));

        channel.stop();
        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(matches!(
            channel.send(OutboundMessage::ping()),
            Err(ChannelError::Unavailable)
        ));
    }

    #[tokio::test(start_paused = true)]
    /// What: An open channel dispatches decoded frames and forwards sends.
    ///
    /// - Input: One KPI frame from the server, one outbound frame from the
    ///   handle
    /// - Output: Subscriber sees the event; server sees the frame
    async fn channel_open_dispatch_and_send() {
        let (transport, gate, _accept, _opened, mut servers) = ScriptedTransport::new(1);
        let channel = LiveChannel::new(test_config(), transport, FixedSnapshots);
        let (_id, mut events) = channel.subscribe();

        channel.start();
        let mut states = channel.watch_state();
        gate.add_permits(1);
        assert_eq!(next_state(&mut states).await, ChannelState::Open);

        let mut server = servers.recv().await.expect("server side");
        server
            .outgoing
            .send(r#"{"type":"kpi_update","payload":{"total_books":10}}"#.into())
            .expect("server push");
        match events.recv().await.expect("event") {
            InboundEvent::KpiUpdate(snap) => {
                assert_eq!(snap.values.get("total_books"), Some(&10));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        channel
            .send(OutboundMessage::new("ack", serde_json::json!({"seq": 1})))
            .expect("send while open");
        let frame = server.incoming.recv().await.expect("outbound frame");
        assert_eq!(frame, r#"{"type":"ack","payload":{"seq":1}}"#);
    }

    #[tokio::test(start_paused = true)]
    /// What: Channel loss always lands on `Reconnecting(1)` first, then
    /// climbs the ladder one attempt at a time.
    ///
    /// - Input: Server drop after open, then one failed retry
    /// - Output: `Reconnecting(1)` followed by `Reconnecting(2)`
    async fn channel_loss_enters_reconnecting_one() {
        let (transport, gate, _accept, _opened, mut servers) = ScriptedTransport::new(1);
        let channel = LiveChannel::new(test_config(), transport, FixedSnapshots);

        channel.start();
        let mut states = channel.watch_state();
        gate.add_permits(1);
        assert_eq!(next_state(&mut states).await, ChannelState::Open);

        let server = servers.recv().await.expect("server side");
        drop(server);
        assert_eq!(next_state(&mut states).await, ChannelState::Reconnecting(1));

        // Driver is parked at the gate; release one failing attempt.
        gate.add_permits(1);
        assert_eq!(next_state(&mut states).await, ChannelState::Reconnecting(2));
    }

    #[tokio::test(start_paused = true)]
    /// What: Heartbeats go out on the configured cadence and a failed
    /// heartbeat write counts as channel loss.
    ///
    /// - Input: Paused-time advance past the interval, then a dead write path
    /// - Output: A ping frame, then `Reconnecting(1)`
    async fn channel_heartbeat_cadence_and_loss() {
        let (transport, gate, _accept, _opened, mut servers) = ScriptedTransport::new(1);
        let channel = LiveChannel::new(test_config(), transport, FixedSnapshots);

        channel.start();
        let mut states = channel.watch_state();
        gate.add_permits(1);
        assert_eq!(next_state(&mut states).await, ChannelState::Open);

        let server = servers.recv().await.expect("server side");
        let ChannelHandle {
            incoming: mut server_in,
            outgoing: server_out,
        } = server;

        let ping = server_in.recv().await.expect("heartbeat frame");
        assert_eq!(ping, r#"{"type":"ping"}"#);

        // Kill only the write path; the read path stays up so the loss is
        // detected by the next heartbeat send.
        drop(server_in);
        assert_eq!(next_state(&mut states).await, ChannelState::Reconnecting(1));
        drop(server_out);
    }

    #[tokio::test(start_paused = true)]
    /// What: Malformed frames are skipped without dropping the channel.
    ///
    /// - Input: Garbage frame followed by a valid alert frame
    /// - Output: Only the alert is dispatched; state stays `Open`
    async fn channel_skips_malformed_frames() {
        let (transport, gate, _accept, _opened, mut servers) = ScriptedTransport::new(1);
        let channel = LiveChannel::new(test_config(), transport, FixedSnapshots);
        let (_id, mut events) = channel.subscribe();

        channel.start();
        let mut states = channel.watch_state();
        gate.add_permits(1);
        assert_eq!(next_state(&mut states).await, ChannelState::Open);

        let server = servers.recv().await.expect("server side");
        server.outgoing.send("not json".into()).expect("push");
        server
            .outgoing
            .send(
                r#"{"type":"system_alert","payload":{"level":"info","title":"Hi","message":"m"}}"#
                    .into(),
            )
            .expect("push");

        match events.recv().await.expect("event") {
            InboundEvent::SystemAlert(alert) => assert_eq!(alert.title, "Hi"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(channel.state(), ChannelState::Open);
    }

    #[tokio::test(start_paused = true)]
    /// What: Subscribers are isolated; a dropped receiver never blocks the
    /// others and unsubscribing closes the stream.
    ///
    /// - Input: Two subscribers, one dropped, one unsubscribed later
    /// - Output: Remaining subscriber keeps receiving; closed stream ends
    async fn channel_subscriber_isolation_and_unsubscribe() {
        let (transport, gate, _accept, _opened, mut servers) = ScriptedTransport::new(1);
        let channel = LiveChannel::new(test_config(), transport, FixedSnapshots);
        let (_first_id, first_rx) = channel.subscribe();
        let (second_id, mut second_rx) = channel.subscribe();

        channel.start();
        let mut states = channel.watch_state();
        gate.add_permits(1);
        assert_eq!(next_state(&mut states).await, ChannelState::Open);
        let server = servers.recv().await.expect("server side");

        drop(first_rx);
        server
            .outgoing
            .send(r#"{"type":"heartbeat"}"#.into())
            .expect("push");
        assert_eq!(
            second_rx.recv().await.expect("event"),
            InboundEvent::Heartbeat
        );

        channel.unsubscribe(second_id);
        assert!(second_rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    /// What: Exhausting the ladder falls back to polling and synthesizes
    /// KPI events from snapshots.
    ///
    /// - Input: All connect attempts fail with a budget of 3
    /// - Output: `PollingFallback` state and a polled `KpiUpdate`
    async fn channel_exhaustion_falls_back_to_polling() {
        let (transport, gate, _accept, opened, _servers) = ScriptedTransport::new(0);
        let channel = LiveChannel::new(test_config(), transport, FixedSnapshots);
        let (_id, mut events) = channel.subscribe();

        channel.start();
        let mut states = channel.watch_state();
        gate.add_permits(1);
        assert_eq!(next_state(&mut states).await, ChannelState::Reconnecting(1));
        gate.add_permits(1);
        assert_eq!(next_state(&mut states).await, ChannelState::Reconnecting(2));
        gate.add_permits(1);
        assert_eq!(next_state(&mut states).await, ChannelState::Reconnecting(3));
        gate.add_permits(1);
        assert_eq!(next_state(&mut states).await, ChannelState::PollingFallback);
        assert_eq!(opened.load(Ordering::SeqCst), 4);

        match events.recv().await.expect("polled event") {
            InboundEvent::KpiUpdate(snap) => {
                assert_eq!(snap.values.get("total_books"), Some(&42));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    /// What: Stop is terminal and a later start behaves like a fresh
    /// instance.
    ///
    /// - Input: Open, stop, start again
    /// - Output: `Closed` in between, then a brand new connect cycle
    async fn channel_stop_then_start_reinitializes() {
        let (transport, gate, accept, opened, mut servers) = ScriptedTransport::new(1);
        let channel = LiveChannel::new(test_config(), transport, FixedSnapshots);

        channel.start();
        let mut states = channel.watch_state();
        gate.add_permits(1);
        assert_eq!(next_state(&mut states).await, ChannelState::Open);
        let _server = servers.recv().await.expect("server side");

        channel.stop();
        assert_eq!(channel.state(), ChannelState::Closed);
        channel.stop();
        assert_eq!(channel.state(), ChannelState::Closed);

        accept.store(1, Ordering::SeqCst);
        channel.start();
        assert_eq!(channel.state(), ChannelState::Connecting);
        let mut states = channel.watch_state();
        gate.add_permits(1);
        assert_eq!(next_state(&mut states).await, ChannelState::Open);
        assert_eq!(opened.load(Ordering::SeqCst), 2);
    }
}
