//! Inbound dispatch: one decoded envelope at a time, routed by type.

use std::sync::Arc;

use frames::{NO_SERVICE, Payload, Rpc, RpcType};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Internal, Session};
use crate::events::ClientEvent;
use crate::registry::Service;

impl Session {
    pub(super) fn dispatch(&mut self, payload: &Payload) {
        let rpc = match frames::decode(payload) {
            Ok(rpc) => rpc,
            Err(e) => {
                warn!(error = %e, "dispatch: dropping undecodable message");
                return;
            }
        };
        if rpc.kind == RpcType::Proxy && rpc.to != self.address {
            debug!(to = %rpc.to, address = %self.address, "dispatch: dropping proxy for another address");
            return;
        }

        self.emit(ClientEvent::Message(rpc.clone()));

        match rpc.kind {
            RpcType::Response => match self.correlator.resolve(rpc.id, rpc.status, rpc.data) {
                Some(settled) => self.settle(settled),
                None => debug!(id = rpc.id, "dispatch: response for nothing pending"),
            },
            RpcType::Request => {
                self.emit(ClientEvent::ServiceRequest(rpc.clone()));
                match self.services.get(&rpc.path) {
                    Some(handler) => self.invoke(handler, rpc),
                    None if rpc.need_reply => {
                        debug!(path = %rpc.path, "dispatch: no such service");
                        let reply = rpc.reply(self.address.clone(), false, Value::from(NO_SERVICE));
                        self.send_reply(reply);
                    }
                    None => debug!(path = %rpc.path, "dispatch: no such service, no reply wanted"),
                }
            }
            RpcType::Push => {
                self.emit(ClientEvent::Push(rpc.clone()));
                match self.pushes.get(&rpc.path) {
                    Some(handler) => self.invoke(handler, rpc),
                    None => debug!(path = %rpc.path, "dispatch: no push handler"),
                }
            }
            RpcType::Pub => {
                if !self.subscriptions.contains(&rpc.path) {
                    debug!(topic = %rpc.path, "dispatch: publication without subscribers");
                    return;
                }
                self.emit(ClientEvent::PublishReceived(rpc.clone()));
                self.subscriptions.publish(&rpc.path, &rpc.data, &rpc.from);
            }
            RpcType::Move => self.migrate(&rpc.data),
            RpcType::Heart
            | RpcType::Login
            | RpcType::Regist
            | RpcType::UnRegist
            | RpcType::Sub
            | RpcType::UnSub
            | RpcType::Proxy => debug!(kind = ?rpc.kind, "dispatch: nothing to do"),
        }
    }

    /// Run `handler` off the loop; its result comes back as [`Internal::Handled`].
    fn invoke(&self, handler: Arc<dyn Service>, request: Rpc) {
        let internal = self.internal.clone();
        tokio::spawn(async move {
            let result = handler.call(request.data.clone()).await;
            let _ = internal.send(Internal::Handled { request, result });
        });
    }

    pub(super) fn on_handled(&mut self, request: Rpc, result: Result<Value, Value>) {
        if !request.need_reply {
            return;
        }
        let (status, data) = match result {
            Ok(data) => (true, data),
            Err(data) => (false, data),
        };
        let reply = request.reply(self.address.clone(), status, data);
        self.send_reply(reply);
    }

    fn send_reply(&mut self, reply: Rpc) {
        if let Err(e) = self.send(reply, None) {
            warn!(error = %e, "dispatch: reply not sent");
        }
    }

    /// Server-directed redirect: swap the pool's current URL and reconnect.
    fn migrate(&mut self, data: &Value) {
        let url = match data {
            Value::String(url) if !url.is_empty() => url.clone(),
            other => {
                warn!(data = %other, "dispatch: ignoring move without a target url");
                return;
            }
        };
        info!(url = %url, "dispatch: server moved client");
        self.pool.migrate(&url);
        self.emit(ClientEvent::Moved { url });
        self.drop_link();
        self.connect();
    }
}
