//! Client configuration.
//!
//! Defaults match the protocol's fixed timings: a 600 s global request
//! timeout, a 5 s reconnection delay and a 240 s heartbeat. Everything can be
//! overridden in code with the `with_*` builders or read from `CASTLE_*`
//! environment variables.

use std::time::Duration;

use frames::Codec;

use crate::error::ConfigError;
use crate::outbox::OverflowPolicy;

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 600_000;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 240_000;
pub const DEFAULT_SUBSCRIBE_ACK_TIMEOUT_MS: u64 = 10;
pub const DEFAULT_OUTBOX_CAPACITY: usize = 1024;
pub const DEFAULT_MAX_ADDRESS_REASSIGNMENTS: u32 = 16;

/// Everything a session needs to know before it starts.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Ordered candidate server URLs; the first one is dialed first.
    pub servers: Vec<String>,
    /// Initial logical address of this client; may be empty.
    pub address: String,
    /// Logical address of the server, stamped into `To` of outbound requests.
    pub server_address: String,
    /// Outbound serialization mode.
    pub codec: Codec,
    /// Deadline for every reply-expecting request.
    pub request_timeout: Duration,
    /// Delay between a transport close and the next connection attempt.
    pub reconnect_delay: Duration,
    /// Keep-alive period while logged in.
    pub heartbeat_interval: Duration,
    /// Timeout hint for best-effort `Sub`/`UnSub` acknowledgements.
    pub subscribe_ack_timeout: Duration,
    /// Maximum number of messages held while not logged in.
    pub outbox_capacity: usize,
    /// What to do when the outbound buffer is full.
    pub overflow: OverflowPolicy,
    /// Upper bound on consecutive server address assignments during login.
    pub max_address_reassignments: u32,
    /// Topic name validator applied by `subscribe`/`unsubscribe`.
    pub topic_filter: fn(&str) -> bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            address: String::new(),
            server_address: String::new(),
            codec: Codec::Binary,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
            subscribe_ack_timeout: Duration::from_millis(DEFAULT_SUBSCRIBE_ACK_TIMEOUT_MS),
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            overflow: OverflowPolicy::DropOldest,
            max_address_reassignments: DEFAULT_MAX_ADDRESS_REASSIGNMENTS,
            topic_filter: frames::is_valid_topic,
        }
    }
}

impl ClientConfig {
    /// Config for a single server URL.
    pub fn new(server: impl Into<String>) -> Self {
        Self::default().with_servers([server])
    }

    /// Build config from environment variables.
    ///
    /// Optional:
    /// - `CASTLE_SERVERS`: comma-separated server URLs
    /// - `CASTLE_ADDRESS`: initial client address
    /// - `CASTLE_CODEC`: `binary` (default) or `json`
    /// - `CASTLE_REQUEST_TIMEOUT_MS`: default 600000
    /// - `CASTLE_RECONNECT_DELAY_MS`: default 5000
    /// - `CASTLE_HEARTBEAT_INTERVAL_MS`: default 240000
    /// - `CASTLE_OUTBOX_CAPACITY`: default 1024
    /// - `CASTLE_OVERFLOW`: `drop-oldest` (default) or `reject-new`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the codec or overflow policy is unknown.
    pub fn from_env() -> Result<Self, ConfigError> {
        let servers = std::env::var("CASTLE_SERVERS")
            .map(|raw| parse_servers(&raw))
            .unwrap_or_default();
        let address = std::env::var("CASTLE_ADDRESS").unwrap_or_default();
        let codec = parse_codec(std::env::var("CASTLE_CODEC").ok().as_deref())?;
        let overflow = parse_overflow(std::env::var("CASTLE_OVERFLOW").ok().as_deref())?;

        Ok(Self {
            servers,
            address,
            codec,
            request_timeout: env_millis("CASTLE_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS),
            reconnect_delay: env_millis("CASTLE_RECONNECT_DELAY_MS", DEFAULT_RECONNECT_DELAY_MS),
            heartbeat_interval: env_millis("CASTLE_HEARTBEAT_INTERVAL_MS", DEFAULT_HEARTBEAT_INTERVAL_MS),
            outbox_capacity: env_parse("CASTLE_OUTBOX_CAPACITY", DEFAULT_OUTBOX_CAPACITY),
            overflow,
            ..Self::default()
        })
    }

    #[must_use]
    pub fn with_servers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.servers = servers
            .into_iter()
            .map(Into::into)
            .filter(|url: &String| !url.is_empty())
            .collect();
        self
    }

    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    #[must_use]
    pub fn with_server_address(mut self, server_address: impl Into<String>) -> Self {
        self.server_address = server_address.into();
        self
    }

    #[must_use]
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    #[must_use]
    pub fn with_outbox(mut self, capacity: usize, overflow: OverflowPolicy) -> Self {
        self.outbox_capacity = capacity;
        self.overflow = overflow;
        self
    }

    #[must_use]
    pub fn with_topic_filter(mut self, filter: fn(&str) -> bool) -> Self {
        self.topic_filter = filter;
        self
    }
}

fn parse_servers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn parse_codec(raw: Option<&str>) -> Result<Codec, ConfigError> {
    match raw.map(str::trim).unwrap_or("binary") {
        "" | "binary" => Ok(Codec::Binary),
        "json" => Ok(Codec::Json),
        other => Err(ConfigError::InvalidCodec(other.to_owned())),
    }
}

fn parse_overflow(raw: Option<&str>) -> Result<OverflowPolicy, ConfigError> {
    match raw.map(str::trim).unwrap_or("drop-oldest") {
        "" | "drop-oldest" => Ok(OverflowPolicy::DropOldest),
        "reject-new" => Ok(OverflowPolicy::RejectNew),
        other => Err(ConfigError::InvalidOverflow(other.to_owned())),
    }
}

fn env_millis(key: &str, default: u64) -> Duration {
    Duration::from_millis(env_parse(key, default))
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
