//! Client engine for a bidirectional RPC and publish/subscribe protocol.
//!
//! One [`Client`] acts at once as an RPC caller, a service provider, a push
//! receiver and a topic subscriber/publisher against one logical server,
//! reachable through a pool of URLs and able to redirect the client at
//! runtime.
//!
//! ARCHITECTURE
//! ============
//! - `frames` (sibling crate): the envelope, its type tag, the codec
//! - [`transport`]: pluggable duplex links (websocket, in-memory)
//! - `session`: a single actor task owning every table; connection
//!   lifecycle, login, heartbeat and inbound dispatch
//! - [`Client`]: cloneable handle sending commands to the session
//!
//! ```no_run
//! # async fn demo() -> Result<(), castle_client::ClientError> {
//! use castle_client::{Client, ClientConfig};
//! use serde_json::json;
//!
//! let client = Client::connect(ClientConfig::new("ws://127.0.0.1:8000"));
//! let sum = client.call("math.add", json!([1, 2])).await?;
//! # let _ = sum;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod correlator;
pub mod error;
pub mod events;
pub mod outbox;
pub mod pool;
pub mod registry;
mod session;
pub mod subscriptions;
pub mod transport;

pub use client::{Client, RequestOptions};
pub use config::ClientConfig;
pub use error::{ClientError, ConfigError, LinkError, LoginOutcome};
pub use events::ClientEvent;
pub use frames;
pub use outbox::OverflowPolicy;
pub use registry::Service;
pub use session::{ConnectionState, SessionSnapshot};
pub use subscriptions::SubscriptionId;
pub use transport::{Connector, Link, LinkEvent, MemoryConnector, MemoryPeer, WsConnector};
