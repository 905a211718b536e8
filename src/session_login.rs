//! Login handshake: runs once per link open.
//!
//! The server may answer a login with a failed `Response` whose payload is a
//! string; that string is the address the server assigned. The session adopts
//! it and logs in again, up to `max_address_reassignments` times per link.

use frames::{Rpc, RpcType};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{info, warn};

use super::{ConnectionState, Outgoing, Session};
use crate::correlator::Waiter;
use crate::error::{ClientError, LoginOutcome};
use crate::events::ClientEvent;

impl Session {
    /// Start a login attempt; a failure to send it is reported as `LoginFailed`.
    pub(super) fn login(&mut self) {
        if let Err(e) = self.send_login() {
            warn!(state = ?self.state, error = %e, "login: not sent");
            self.emit(ClientEvent::LoginFailed { reason: e.to_string() });
        }
    }

    /// Write a login request straight to the link; it cannot wait for login.
    pub(super) fn send_login(&mut self) -> Result<(), ClientError> {
        if self.state != ConnectionState::Open {
            return Err(ClientError::NotConnected);
        }
        let id = self.correlator.allocate()?;

        let mut rpc = Rpc::new(RpcType::Login, "", Value::Null);
        rpc.id = id;
        rpc.from.clone_from(&self.address);
        rpc.to.clone_from(&self.config.server_address);
        rpc.need_reply = true;

        let seq = self.correlator.insert(id, Waiter::Login);
        let deadline = Instant::now() + self.config.request_timeout;
        self.correlator.arm(id, seq, deadline);
        if !self.write(&rpc) {
            warn!("login: link gone before login was written");
        }
        Ok(())
    }

    pub(super) fn on_login_settled(&mut self, outcome: Result<Value, ClientError>) {
        if self.state != ConnectionState::Open {
            return;
        }
        let outcome = match outcome {
            Ok(data) => LoginOutcome::from_response(true, data),
            Err(ClientError::Rejected(data)) => LoginOutcome::from_response(false, data),
            Err(e) => {
                warn!(error = %e, "login: failed");
                self.emit(ClientEvent::LoginFailed { reason: e.to_string() });
                return;
            }
        };

        match outcome {
            LoginOutcome::Accepted => self.logged_in(),
            LoginOutcome::AddressAssigned(address) => {
                self.reassignments += 1;
                if self.reassignments > self.config.max_address_reassignments {
                    warn!(address = %address, "login: too many address reassignments");
                    self.emit(ClientEvent::LoginFailed {
                        reason: format!("server reassigned the address {} times", self.reassignments - 1),
                    });
                    return;
                }
                info!(address = %address, "login: server assigned address");
                self.address = address;
                self.login();
            }
            LoginOutcome::Rejected(data) => {
                warn!(reason = %data, "login: rejected");
                let reason = match data {
                    Value::Null => "login rejected".to_owned(),
                    other => other.to_string(),
                };
                self.emit(ClientEvent::LoginFailed { reason });
            }
        }
    }

    /// Re-announce services and topics, then flush the outbound buffer.
    fn logged_in(&mut self) {
        self.state = ConnectionState::LoggedIn;
        info!(address = %self.address, "login: accepted");
        self.emit(ClientEvent::LoggedIn { address: self.address.clone() });

        let services: Vec<String> = self.services.names().map(str::to_owned).collect();
        for name in services {
            self.issue(Outgoing::new(RpcType::Regist, name, Value::Bool(true)), Waiter::Ignore);
        }
        let topics: Vec<String> = self.subscriptions.topics().map(str::to_owned).collect();
        for topic in topics {
            self.issue(Outgoing::new(RpcType::Sub, "", Value::String(topic)), Waiter::Ignore);
        }

        while let Some(mut entry) = self.outbox.pop() {
            entry.rpc.from.clone_from(&self.address);
            if !self.write(&entry.rpc) {
                self.outbox.restore(entry);
                break;
            }
        }
        if self.outbox.is_empty() {
            for flushed in self.flushes.drain(..) {
                let _ = flushed.send(());
            }
        }
    }
}
