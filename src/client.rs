//! Public client handle.
//!
//! A [`Client`] is a cheap, cloneable sender into the session task. Every
//! operation is a command; operations with an outcome carry a oneshot the
//! session answers on. When the last handle is dropped (or
//! [`Client::shutdown`] is called) the session stops and closes its link;
//! [`Client::close`] does the same but waits for the link to finish writing.

use std::sync::Arc;
use std::time::Duration;

use frames::RpcType;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::events::ClientEvent;
use crate::registry::Service;
use crate::session::{Command, Outgoing, Session, SessionSnapshot};
use crate::subscriptions::{Callback, SubscriptionId};
use crate::transport::{Connector, WsConnector};

/// Lifecycle notifications buffered per subscriber before it lags.
const EVENT_CAPACITY: usize = 256;

/// Per-request options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestOptions {
    /// Wait for a `Response`. When false the request resolves to `true` once sent.
    pub need_reply: bool,
    /// Deadline for this request on top of the global request timeout.
    /// Zero means unset.
    pub timeout: Option<Duration>,
    /// Envelope type, `Request` unless overridden.
    pub kind: RpcType,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self { need_reply: true, timeout: None, kind: RpcType::Request }
    }
}

impl RequestOptions {
    #[must_use]
    pub fn with_need_reply(mut self, need_reply: bool) -> Self {
        self.need_reply = need_reply;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: RpcType) -> Self {
        self.kind = kind;
        self
    }
}

/// Handle to a running session.
#[derive(Clone)]
pub struct Client {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<ClientEvent>,
}

impl Client {
    /// Start a session over `connector` on the current tokio runtime.
    ///
    /// If `config` names a server, the session dials it right away.
    #[must_use]
    pub fn spawn(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (internal, internal_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let session = Session::new(config, connector, events.clone(), internal);
        tokio::spawn(session.run(commands_rx, internal_rx));

        Self { commands, events }
    }

    /// Start a session over websockets.
    #[must_use]
    pub fn connect(config: ClientConfig) -> Self {
        Self::spawn(config, Arc::new(WsConnector))
    }

    /// Subscribe to lifecycle and traffic notifications from now on.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    fn command(&self, command: Command) -> Result<(), ClientError> {
        self.commands.send(command).map_err(|_| ClientError::Closed)
    }

    async fn ask<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.command(command(tx))?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    // =========================================================================
    // REQUESTS
    // =========================================================================

    /// Send a request to `path` and wait for its outcome.
    ///
    /// Messages issued before login are buffered and flushed once the
    /// session logs in.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Rejected`] when the peer answers with `Status=false`
    /// - [`ClientError::Timeout`] when no answer arrives in time
    /// - [`ClientError::MaxRequest`] when every identifier is pending
    /// - [`ClientError::OutboxFull`] / [`ClientError::Dropped`] on buffer overflow
    /// - [`ClientError::Closed`] when the session has stopped
    pub async fn request(
        &self,
        path: impl Into<String>,
        data: Value,
        options: RequestOptions,
    ) -> Result<Value, ClientError> {
        let out = Outgoing {
            kind: options.kind,
            path: path.into(),
            data,
            need_reply: options.need_reply,
            timeout: options.timeout,
        };
        self.ask(|reply| Command::Request { out, reply }).await?
    }

    /// [`Client::request`] with default options.
    ///
    /// # Errors
    ///
    /// As [`Client::request`].
    pub async fn call(&self, path: impl Into<String>, data: Value) -> Result<Value, ClientError> {
        self.request(path, data, RequestOptions::default()).await
    }

    /// Publish `data` on `topic` and wait for the server's acknowledgement.
    ///
    /// # Errors
    ///
    /// As [`Client::request`].
    pub async fn publish(&self, topic: impl Into<String>, data: Value) -> Result<Value, ClientError> {
        let options = RequestOptions::default().with_kind(RpcType::Pub);
        self.request(topic, data, options).await
    }

    // =========================================================================
    // REGISTRIES
    // =========================================================================

    /// Serve `name` with `handler` and announce it to the server.
    ///
    /// # Errors
    ///
    /// As [`Client::request`] for the announcement. The handler stays
    /// registered either way and is announced again on every login.
    pub async fn register_service(
        &self,
        name: impl Into<String>,
        handler: impl Service + 'static,
    ) -> Result<Value, ClientError> {
        let name = name.into();
        let handler: Arc<dyn Service> = Arc::new(handler);
        self.ask(|reply| Command::RegisterService { name, handler, reply })
            .await?
    }

    /// Stop serving `name`. Sends a best-effort `UnRegist` while logged in.
    ///
    /// # Errors
    ///
    /// [`ClientError::Closed`] when the session has stopped.
    pub fn unregister_service(&self, name: impl Into<String>) -> Result<(), ClientError> {
        self.command(Command::UnregisterService { name: name.into() })
    }

    /// Handle pushes to `name` with `handler`. Local only.
    ///
    /// # Errors
    ///
    /// [`ClientError::Closed`] when the session has stopped.
    pub fn register_push(&self, name: impl Into<String>, handler: impl Service + 'static) -> Result<(), ClientError> {
        let handler: Arc<dyn Service> = Arc::new(handler);
        self.command(Command::RegisterPush { name: name.into(), handler })
    }

    /// # Errors
    ///
    /// [`ClientError::Closed`] when the session has stopped.
    pub fn unregister_push(&self, name: impl Into<String>) -> Result<(), ClientError> {
        self.command(Command::UnregisterPush { name: name.into() })
    }

    // =========================================================================
    // SUBSCRIPTIONS
    // =========================================================================

    /// Invoke `callback(data, from, topic)` for publications on any of `topics`.
    ///
    /// Invalid topic names are skipped. While logged in, a best-effort `Sub`
    /// goes to the server; subscriptions are re-announced on every login.
    ///
    /// The callback runs on the session task, so it should return quickly.
    /// A panic inside it is logged and does not stop the session.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NoValidTopic`] when no topic passes validation
    /// - [`ClientError::Closed`] when the session has stopped
    pub async fn subscribe<I, S, F>(&self, topics: I, callback: F) -> Result<SubscriptionId, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&Value, &str, &str) + Send + Sync + 'static,
    {
        let topics = topics.into_iter().map(Into::into).collect();
        let callback: Callback = Arc::new(callback);
        self.ask(|reply| Command::Subscribe { topics, callback, reply })
            .await?
    }

    /// Drop every callback for each of `topics`, whoever registered it.
    ///
    /// # Errors
    ///
    /// [`ClientError::Closed`] when the session has stopped.
    pub fn unsubscribe<I, S>(&self, topics: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let topics = topics.into_iter().map(Into::into).collect();
        self.command(Command::Unsubscribe { topics })
    }

    /// Drop only the callback added by the `subscribe` call that returned `id`.
    /// Topics left without callbacks are unsubscribed on the server.
    ///
    /// # Errors
    ///
    /// [`ClientError::Closed`] when the session has stopped.
    pub fn unsubscribe_callback(&self, id: SubscriptionId) -> Result<(), ClientError> {
        self.command(Command::UnsubscribeCallback { id })
    }

    // =========================================================================
    // SESSION
    // =========================================================================

    /// Switch to `url` (added to the pool if new) and reconnect.
    ///
    /// # Errors
    ///
    /// [`ClientError::Closed`] when the session has stopped.
    pub fn set_server(&self, url: impl Into<String>) -> Result<(), ClientError> {
        self.command(Command::SetServer { url: url.into() })
    }

    /// # Errors
    ///
    /// [`ClientError::Closed`] when the session has stopped.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, ClientError> {
        self.ask(|reply| Command::Snapshot { reply }).await
    }

    /// Wait until the session is logged in and its outbound buffer is
    /// empty, so every message sent so far has been handed to the link.
    ///
    /// # Errors
    ///
    /// [`ClientError::Closed`] when the session stops first.
    pub async fn flush(&self) -> Result<(), ClientError> {
        self.ask(|reply| Command::Flush { reply }).await
    }

    /// Close the link once it has written what it was handed, then stop.
    ///
    /// Messages still in the outbound buffer and pending requests fail with
    /// [`ClientError::Closed`]; call [`Client::flush`] first to keep them.
    ///
    /// # Errors
    ///
    /// [`ClientError::Closed`] when the session had already stopped.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.ask(|done| Command::Close { done }).await
    }

    /// Stop the session. Pending requests fail with [`ClientError::Closed`].
    pub fn shutdown(&self) {
        let _ = self.command(Command::Shutdown);
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
