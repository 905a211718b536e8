//! The session actor: connection lifecycle, send path, timers.
//!
//! DESIGN
//! ======
//! One task owns every table: the pending-request correlator, the service
//! and push registries, the subscription table, the outbound buffer, and
//! the active link. Client handles talk to it through a command channel;
//! link pumps and handler tasks report back through an internal channel.
//! Nothing is shared, so nothing is locked.
//!
//! The loop `select!`s over:
//! - commands from [`crate::Client`] handles
//! - internal events (link opened / message / error / closed, handler results)
//! - the heartbeat interval
//! - the earliest deadline (request timeouts and the reconnect timer)
//!
//! LIFECYCLE
//! =========
//! 1. `connect` spawns a task that dials the current pool URL under a fresh
//!    link epoch and forwards the link's events tagged with that epoch.
//! 2. Open → state `Open` → login handshake (see `session_login`).
//! 3. Login accepted → state `LoggedIn` → re-announce, flush the buffer.
//! 4. Close → state `Disconnected` → reconnect after `reconnect_delay`.
//!
//! Events carrying an epoch other than the current one come from a link the
//! session already abandoned (migration, manual server switch) and are
//! ignored, so closing an old link never schedules a second reconnect.

#[path = "session_dispatch.rs"]
mod session_dispatch;
#[path = "session_login.rs"]
mod session_login;

use std::sync::Arc;
use std::time::Duration;

use frames::{Payload, Rpc, RpcType};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, sleep_until};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::correlator::{Correlator, ReplyTx, Settled, Waiter};
use crate::error::ClientError;
use crate::events::ClientEvent;
use crate::outbox::{Outbox, Pushed, Queued};
use crate::pool::AddressPool;
use crate::registry::{HandlerTable, Service};
use crate::subscriptions::{Callback, SubscriptionId, SubscriptionTable};
use crate::transport::{Connector, Link, LinkEvent};

// =============================================================================
// TYPES
// =============================================================================

/// Where the session stands with the server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Transport open, login not yet accepted.
    Open,
    LoggedIn,
}

/// Point-in-time view of the session's tables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub address: String,
    /// URL the session dials next or is connected to.
    pub server: Option<String>,
    pub servers: Vec<String>,
    /// Requests still waiting for a response.
    pub pending: usize,
    /// Messages waiting in the outbound buffer.
    pub buffered: usize,
    pub services: Vec<String>,
    pub pushes: Vec<String>,
    pub topics: Vec<String>,
    /// How many times a link has opened.
    pub link_opens: u64,
}

/// An envelope a caller wants sent, before the session stamps it.
#[derive(Clone, Debug)]
pub(crate) struct Outgoing {
    pub kind: RpcType,
    pub path: String,
    pub data: Value,
    pub need_reply: bool,
    pub timeout: Option<Duration>,
}

impl Outgoing {
    pub(crate) fn new(kind: RpcType, path: impl Into<String>, data: Value) -> Self {
        Self { kind, path: path.into(), data, need_reply: true, timeout: None }
    }

    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

pub(crate) enum Command {
    Request { out: Outgoing, reply: ReplyTx },
    RegisterService { name: String, handler: Arc<dyn Service>, reply: ReplyTx },
    UnregisterService { name: String },
    RegisterPush { name: String, handler: Arc<dyn Service> },
    UnregisterPush { name: String },
    Subscribe { topics: Vec<String>, callback: Callback, reply: oneshot::Sender<Result<SubscriptionId, ClientError>> },
    Unsubscribe { topics: Vec<String> },
    UnsubscribeCallback { id: SubscriptionId },
    SetServer { url: String },
    Snapshot { reply: oneshot::Sender<SessionSnapshot> },
    /// Answer once logged in with an empty outbound buffer.
    Flush { reply: oneshot::Sender<()> },
    /// Close the link after it has written everything, then stop.
    Close { done: oneshot::Sender<()> },
    Shutdown,
}

pub(crate) enum Internal {
    Opened { epoch: u64, url: String, outbound: mpsc::UnboundedSender<Payload> },
    ConnectFailed { epoch: u64, reason: String },
    Link { epoch: u64, event: LinkEvent },
    /// A service or push handler finished with the inbound `request`.
    Handled { request: Rpc, result: Result<Value, Value> },
}

// =============================================================================
// SESSION
// =============================================================================

pub(crate) struct Session {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    state: ConnectionState,
    address: String,
    pool: AddressPool,
    correlator: Correlator,
    services: HandlerTable,
    pushes: HandlerTable,
    subscriptions: SubscriptionTable,
    outbox: Outbox,
    link: Option<mpsc::UnboundedSender<Payload>>,
    epoch: u64,
    reconnect_at: Option<Instant>,
    reassignments: u32,
    link_opens: u64,
    flushes: Vec<oneshot::Sender<()>>,
    closing: Option<oneshot::Sender<()>>,
    stopped: bool,
    events: broadcast::Sender<ClientEvent>,
    internal: mpsc::UnboundedSender<Internal>,
}

impl Session {
    pub(crate) fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        events: broadcast::Sender<ClientEvent>,
        internal: mpsc::UnboundedSender<Internal>,
    ) -> Self {
        Self {
            address: config.address.clone(),
            pool: AddressPool::new(config.servers.clone()),
            outbox: Outbox::new(config.outbox_capacity, config.overflow),
            config,
            connector,
            state: ConnectionState::Disconnected,
            correlator: Correlator::new(),
            services: HandlerTable::new(),
            pushes: HandlerTable::new(),
            subscriptions: SubscriptionTable::new(),
            link: None,
            epoch: 0,
            reconnect_at: None,
            reassignments: 0,
            link_opens: 0,
            flushes: Vec::new(),
            closing: None,
            stopped: false,
            events,
            internal,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        self.connect();

        let period = self.config.heartbeat_interval.max(Duration::from_millis(1));
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.stopped {
            let wake = self.next_wake();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(event) = internal.recv() => self.handle_internal(event),
                _ = heartbeat.tick() => self.heartbeat(),
                () = sleep_until(wake.unwrap_or_else(Instant::now)), if wake.is_some() => {
                    self.on_timer(Instant::now());
                }
            }
        }

        if let Some(done) = self.closing.take() {
            let _ = done.send(());
        }
        info!(address = %self.address, "session: stopped");
    }

    fn emit(&self, event: ClientEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    // =========================================================================
    // COMMANDS
    // =========================================================================

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Request { out, reply } => self.issue(out, Waiter::Caller(reply)),
            Command::RegisterService { name, handler, reply } => {
                self.services.insert(name.clone(), handler);
                self.issue(Outgoing::new(RpcType::Regist, name, Value::Bool(true)), Waiter::Caller(reply));
            }
            Command::UnregisterService { name } => {
                if self.services.remove(&name) && self.state == ConnectionState::LoggedIn {
                    self.issue(Outgoing::new(RpcType::UnRegist, name, Value::Bool(true)), Waiter::Ignore);
                }
            }
            Command::RegisterPush { name, handler } => self.pushes.insert(name, handler),
            Command::UnregisterPush { name } => {
                self.pushes.remove(&name);
            }
            Command::Subscribe { topics, callback, reply } => {
                let _ = reply.send(self.subscribe(topics, callback));
            }
            Command::Unsubscribe { topics } => {
                let topics = self.valid_topics(topics);
                for topic in &topics {
                    self.subscriptions.remove_topic(topic);
                }
                self.announce_topics(RpcType::UnSub, topics);
            }
            Command::UnsubscribeCallback { id } => {
                let emptied = self.subscriptions.remove_id(id);
                self.announce_topics(RpcType::UnSub, emptied);
            }
            Command::SetServer { url } => {
                info!(url = %url, "session: switching server");
                self.pool.select(&url);
                self.drop_link();
                self.connect();
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Flush { reply } => {
                if self.state == ConnectionState::LoggedIn && self.outbox.is_empty() {
                    let _ = reply.send(());
                } else {
                    self.flushes.push(reply);
                }
            }
            Command::Close { done } => self.close(done),
            // Handled by the run loop.
            Command::Shutdown => {}
        }
    }

    fn subscribe(&mut self, topics: Vec<String>, callback: Callback) -> Result<SubscriptionId, ClientError> {
        let topics = self.valid_topics(topics);
        if topics.is_empty() {
            return Err(ClientError::NoValidTopic);
        }
        let id = self.subscriptions.add(&topics, callback);
        self.announce_topics(RpcType::Sub, topics);
        Ok(id)
    }

    fn valid_topics(&self, topics: Vec<String>) -> Vec<String> {
        let is_valid = self.config.topic_filter;
        topics
            .into_iter()
            .filter(|topic| {
                let ok = is_valid(topic);
                if !ok {
                    warn!(topic = %topic, "subscriptions: skipping invalid topic");
                }
                ok
            })
            .collect()
    }

    /// Best-effort `Sub`/`UnSub` for `topics`; only sent while logged in.
    fn announce_topics(&mut self, kind: RpcType, topics: Vec<String>) {
        if self.state != ConnectionState::LoggedIn || topics.is_empty() {
            return;
        }
        let data = Value::Array(topics.into_iter().map(Value::String).collect());
        let out = Outgoing::new(kind, "", data).with_timeout(self.config.subscribe_ack_timeout);
        self.issue(out, Waiter::Ignore);
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            address: self.address.clone(),
            server: self.pool.current().map(str::to_owned),
            servers: self.pool.urls().to_vec(),
            pending: self.correlator.len(),
            buffered: self.outbox.len(),
            services: self.services.names().map(str::to_owned).collect(),
            pushes: self.pushes.names().map(str::to_owned).collect(),
            topics: self.subscriptions.topics().map(str::to_owned).collect(),
            link_opens: self.link_opens,
        }
    }

    // =========================================================================
    // SEND PATH
    // =========================================================================

    /// Stamp, correlate and send `out`, reporting the outcome to `waiter`.
    fn issue(&mut self, out: Outgoing, waiter: Waiter) {
        let id = match self.correlator.allocate() {
            Ok(id) => id,
            Err(e) => {
                warn!(path = %out.path, "request: identifier space exhausted");
                answer(waiter, Err(e));
                return;
            }
        };

        let mut rpc = Rpc::new(out.kind, out.path, out.data);
        rpc.id = id;
        rpc.from.clone_from(&self.address);
        rpc.to.clone_from(&self.config.server_address);
        rpc.need_reply = out.need_reply;
        let timeout = out.timeout.filter(|t| !t.is_zero());
        rpc.timeout = timeout.map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX));

        if !out.need_reply {
            let result = self.send(rpc, None).map(|()| Value::Bool(true));
            answer(waiter, result);
            return;
        }

        let seq = self.correlator.insert(id, waiter);
        let now = Instant::now();
        let deadline = now + self.config.request_timeout;
        self.correlator.arm(id, seq, deadline);
        if let Some(timeout) = timeout {
            self.correlator.arm(id, seq, now + timeout);
        }

        if let Err(e) = self.send(rpc, Some(seq))
            && let Some(settled) = self.correlator.fail(id, seq, e)
        {
            self.settle(settled);
        }
    }

    /// Write `rpc` now if logged in, otherwise buffer it.
    fn send(&mut self, rpc: Rpc, ticket: Option<u64>) -> Result<(), ClientError> {
        if self.state == ConnectionState::LoggedIn && self.write(&rpc) {
            return Ok(());
        }
        match self.outbox.push(Queued { rpc, ticket }) {
            Pushed::Accepted => Ok(()),
            Pushed::Evicted(old) => {
                warn!(id = old.rpc.id, path = %old.rpc.path, "outbox: full, dropping oldest message");
                self.discard(old, ClientError::Dropped);
                Ok(())
            }
            Pushed::Rejected(new) => {
                warn!(id = new.rpc.id, path = %new.rpc.path, "outbox: full, rejecting message");
                Err(ClientError::OutboxFull)
            }
        }
    }

    /// Encode and hand `rpc` to the link. False when there is no live link.
    fn write(&self, rpc: &Rpc) -> bool {
        let Some(link) = &self.link else {
            return false;
        };
        link.send(self.config.codec.encode(rpc)).is_ok()
    }

    /// Reject the caller of a buffered message that will never be written.
    fn discard(&mut self, entry: Queued, error: ClientError) {
        if let Some(seq) = entry.ticket
            && let Some(settled) = self.correlator.fail(entry.rpc.id, seq, error)
        {
            self.settle(settled);
        }
    }

    fn settle(&mut self, settled: Settled) {
        if let Some(login) = settled.deliver() {
            self.on_login_settled(login.outcome);
        }
    }

    // =========================================================================
    // TIMERS
    // =========================================================================

    fn next_wake(&self) -> Option<Instant> {
        match (self.correlator.next_deadline(), self.reconnect_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn on_timer(&mut self, now: Instant) {
        for settled in self.correlator.expire(now) {
            debug!(id = settled.id, "request: timed out");
            self.settle(settled);
        }
        if self.reconnect_at.is_some_and(|at| at <= now) {
            self.reconnect_at = None;
            if self.link.is_none() {
                self.connect();
            }
        }
    }

    fn heartbeat(&self) {
        if self.state != ConnectionState::LoggedIn {
            return;
        }
        let mut rpc = Rpc::new(RpcType::Heart, "", Value::Null);
        rpc.from.clone_from(&self.address);
        rpc.to.clone_from(&self.config.server_address);
        if !self.write(&rpc) {
            debug!("heartbeat: link gone");
        }
    }

    // =========================================================================
    // LINK LIFECYCLE
    // =========================================================================

    /// Dial the current pool URL under a fresh epoch.
    fn connect(&mut self) {
        if self.closing.is_some() {
            self.stopped = true;
            return;
        }
        let Some(url) = self.pool.current().map(str::to_owned) else {
            debug!("link: no server configured");
            return;
        };
        self.epoch += 1;
        self.reconnect_at = None;
        let epoch = self.epoch;
        let connector = Arc::clone(&self.connector);
        let internal = self.internal.clone();
        info!(url = %url, epoch, "link: connecting");

        tokio::spawn(async move {
            let Link { outbound, mut inbound } = match connector.connect(&url).await {
                Ok(link) => link,
                Err(e) => {
                    let _ = internal.send(Internal::ConnectFailed { epoch, reason: e.to_string() });
                    return;
                }
            };
            let opened = Internal::Opened { epoch, url, outbound };
            if internal.send(opened).is_err() {
                return;
            }
            while let Some(event) = inbound.recv().await {
                let closed = event == LinkEvent::Closed;
                if internal.send(Internal::Link { epoch, event }).is_err() || closed {
                    return;
                }
            }
            let _ = internal.send(Internal::Link { epoch, event: LinkEvent::Closed });
        });
    }

    fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::Handled { request, result } => self.on_handled(request, result),
            Internal::Opened { epoch, url, outbound } => {
                if epoch != self.epoch {
                    debug!(epoch, "link: dropping superseded link");
                    return;
                }
                self.on_opened(url, outbound);
            }
            Internal::ConnectFailed { epoch, reason } => {
                if epoch != self.epoch {
                    return;
                }
                warn!(reason = %reason, "link: connect failed");
                self.emit(ClientEvent::LinkError { reason });
                self.on_closed();
            }
            Internal::Link { epoch, event } => {
                if epoch != self.epoch {
                    debug!(epoch, current = self.epoch, "link: ignoring superseded link event");
                    return;
                }
                match event {
                    LinkEvent::Message(payload) => self.dispatch(&payload),
                    LinkEvent::Error(reason) => {
                        warn!(reason = %reason, "link: error");
                        self.state = ConnectionState::Disconnected;
                        self.emit(ClientEvent::LinkError { reason });
                    }
                    LinkEvent::Closed => self.on_closed(),
                }
            }
        }
    }

    fn on_opened(&mut self, url: String, outbound: mpsc::UnboundedSender<Payload>) {
        info!(url = %url, "link: opened");
        self.link = Some(outbound);
        self.state = ConnectionState::Open;
        self.link_opens += 1;
        self.reassignments = 0;
        self.login();
        self.emit(ClientEvent::LinkOpened { url });
    }

    /// The current link went away on its own: schedule a reconnect.
    fn on_closed(&mut self) {
        self.link = None;
        self.state = ConnectionState::Disconnected;
        self.correlator.forget_login();
        if self.closing.is_some() {
            info!("link: closed, session stopping");
            self.stopped = true;
            self.emit(ClientEvent::LinkClosed);
            return;
        }
        let at = Instant::now() + self.config.reconnect_delay;
        self.reconnect_at = Some(at);
        info!(delay_ms = self.config.reconnect_delay.as_millis(), "link: closed, reconnect scheduled");
        self.emit(ClientEvent::LinkClosed);
    }

    /// Drop the outbound sender and stop once the link reports it closed.
    ///
    /// The transport writes whatever it was already handed before closing,
    /// so messages flushed to the link are not lost.
    fn close(&mut self, done: oneshot::Sender<()>) {
        self.closing = Some(done);
        self.reconnect_at = None;
        self.state = ConnectionState::Disconnected;
        if self.link.take().is_some() {
            info!("link: closing");
        } else {
            self.stopped = true;
        }
    }

    /// Abandon the current link; its late events are ignored.
    fn drop_link(&mut self) {
        self.epoch += 1;
        self.reconnect_at = None;
        self.state = ConnectionState::Disconnected;
        self.correlator.forget_login();
        if self.link.take().is_some() {
            info!("link: closed by client");
            self.emit(ClientEvent::LinkClosed);
        }
    }
}

/// Report `result` to a caller waiter; other waiters have nobody to tell.
fn answer(waiter: Waiter, result: Result<Value, ClientError>) {
    if let Waiter::Caller(tx) = waiter {
        let _ = tx.send(result);
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
