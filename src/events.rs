//! Lifecycle and traffic notifications broadcast to every subscriber of
//! [`crate::Client::events`].

use frames::Rpc;

#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    /// Login succeeded; carries the address now in effect.
    LoggedIn { address: String },
    /// Login failed with something other than an address assignment.
    LoginFailed { reason: String },
    /// The transport reported an error (a close follows).
    LinkError { reason: String },
    /// A transport opened to `url`.
    LinkOpened { url: String },
    /// The transport closed.
    LinkClosed,
    /// An inbound `Push` arrived.
    Push(Rpc),
    /// An inbound `Pub` matched at least one subscription.
    PublishReceived(Rpc),
    /// An inbound `Request` for a service arrived.
    ServiceRequest(Rpc),
    /// Any inbound envelope addressed to this client.
    Message(Rpc),
    /// The server redirected the client to `url`.
    Moved { url: String },
}
