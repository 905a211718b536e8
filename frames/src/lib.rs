//! RPC envelope model and codecs for the castle socket protocol.
//!
//! This crate owns the wire representation shared by every peer: the
//! [`Rpc`] envelope, its [`RpcType`] tag, and the two serialization modes a
//! connection may use. Payloads stay flexible (`serde_json::Value`) while the
//! binary mode encodes over protobuf for compact transport.
//!
//! DESIGN
//! ======
//! - Inbound payloads are self-describing: text is always JSON, binary is
//!   always protobuf. Only the outbound direction consults [`Codec`].
//! - Correlation identifiers are `u16`; anything wider on the wire is a
//!   decode error rather than a silent truncation.

use std::time::{SystemTime, UNIX_EPOCH};

use prost::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Data payload sent back when an inbound request names an unknown service.
pub const NO_SERVICE: &str = "NoService";

/// Longest topic name accepted by [`is_valid_topic`], in bytes.
pub const MAX_TOPIC_LEN: usize = 255;

// =============================================================================
// ERRORS
// =============================================================================

/// Error returned by [`decode`] and [`decode_rpc`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The raw bytes could not be decoded as a protobuf `WireRpc`.
    #[error("failed to decode protobuf rpc: {0}")]
    Decode(#[from] prost::DecodeError),
    /// The text payload was not a valid JSON envelope.
    #[error("failed to decode json rpc: {0}")]
    Json(#[from] serde_json::Error),
    /// The `type` integer on the wire does not map to a known [`RpcType`].
    #[error("invalid rpc type: {0}")]
    InvalidType(i32),
    /// The correlation identifier does not fit in 16 bits.
    #[error("invalid rpc id: {0}")]
    InvalidId(u32),
}

// =============================================================================
// RPC TYPE
// =============================================================================

/// Kind of an envelope. Drives inbound dispatch on the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum RpcType {
    /// Keep-alive. Never answered.
    Heart,
    /// Session handshake; the reply may carry an assigned address.
    Login,
    /// Announces a service this client provides.
    Regist,
    /// Withdraws a previously announced service.
    UnRegist,
    /// Call into a service.
    Request,
    /// Answer to a `Request`, `Push` or any reply-expecting envelope.
    Response,
    /// Targeted message for a push handler.
    Push,
    /// Topic publication.
    Pub,
    /// Topic subscription.
    Sub,
    /// Topic unsubscription.
    UnSub,
    /// Server-directed redirect; `data` holds the new URL.
    Move,
    /// Relayed envelope carrying an explicit `to`.
    Proxy,
}

impl RpcType {
    /// Convert the tag into its wire enum integer value.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Heart => WireRpcType::Heart as i32,
            Self::Login => WireRpcType::Login as i32,
            Self::Regist => WireRpcType::Regist as i32,
            Self::UnRegist => WireRpcType::UnRegist as i32,
            Self::Request => WireRpcType::Request as i32,
            Self::Response => WireRpcType::Response as i32,
            Self::Push => WireRpcType::Push as i32,
            Self::Pub => WireRpcType::Pub as i32,
            Self::Sub => WireRpcType::Sub as i32,
            Self::UnSub => WireRpcType::UnSub as i32,
            Self::Move => WireRpcType::Move as i32,
            Self::Proxy => WireRpcType::Proxy as i32,
        }
    }

    /// Parse a tag from its wire enum integer value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidType`] for unknown values.
    pub fn from_i32(value: i32) -> Result<Self, CodecError> {
        match WireRpcType::try_from(value) {
            Ok(WireRpcType::Heart) => Ok(Self::Heart),
            Ok(WireRpcType::Login) => Ok(Self::Login),
            Ok(WireRpcType::Regist) => Ok(Self::Regist),
            Ok(WireRpcType::UnRegist) => Ok(Self::UnRegist),
            Ok(WireRpcType::Request) => Ok(Self::Request),
            Ok(WireRpcType::Response) => Ok(Self::Response),
            Ok(WireRpcType::Push) => Ok(Self::Push),
            Ok(WireRpcType::Pub) => Ok(Self::Pub),
            Ok(WireRpcType::Sub) => Ok(Self::Sub),
            Ok(WireRpcType::UnSub) => Ok(Self::UnSub),
            Ok(WireRpcType::Move) => Ok(Self::Move),
            Ok(WireRpcType::Proxy) => Ok(Self::Proxy),
            Err(_) => Err(CodecError::InvalidType(value)),
        }
    }
}

impl From<RpcType> for i32 {
    fn from(kind: RpcType) -> Self {
        kind.as_i32()
    }
}

impl TryFrom<i32> for RpcType {
    type Error = CodecError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::from_i32(value)
    }
}

// =============================================================================
// ENVELOPE
// =============================================================================

/// A single envelope on the socket protocol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rpc {
    /// Correlation identifier, meaningful only for request/response pairs.
    #[serde(rename = "ID", default)]
    pub id: u16,
    /// Service name, push name, or topic.
    #[serde(rename = "Path", default)]
    pub path: String,
    /// Arbitrary JSON payload.
    #[serde(rename = "Data", default)]
    pub data: Value,
    /// Envelope kind.
    #[serde(rename = "Type")]
    pub kind: RpcType,
    /// Logical address of the sender; empty until assigned.
    #[serde(rename = "From", default)]
    pub from: String,
    /// Logical address of the recipient; empty means "the server".
    #[serde(rename = "To", default)]
    pub to: String,
    /// Milliseconds since the Unix epoch when the envelope was created.
    #[serde(rename = "Time", default)]
    pub time: i64,
    /// Whether the sender waits for a `Response`.
    #[serde(rename = "NeedReply", default)]
    pub need_reply: bool,
    /// Success flag, meaningful only on `Response`.
    #[serde(rename = "Status", default)]
    pub status: bool,
    /// Informational timeout hint in milliseconds.
    #[serde(rename = "Timeout", default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Rpc {
    /// Create an envelope of `kind` stamped with the current time.
    pub fn new(kind: RpcType, path: impl Into<String>, data: Value) -> Self {
        Self {
            id: 0,
            path: path.into(),
            data,
            kind,
            from: String::new(),
            to: String::new(),
            time: now_ms(),
            need_reply: false,
            status: false,
            timeout: None,
        }
    }

    /// Build the `Response` answering this envelope.
    ///
    /// Keeps `id` and `path`, addresses the reply back to the original
    /// sender, and never asks for a reply itself.
    #[must_use]
    pub fn reply(&self, from: impl Into<String>, status: bool, data: Value) -> Self {
        Self {
            id: self.id,
            path: self.path.clone(),
            data,
            kind: RpcType::Response,
            from: from.into(),
            to: self.from.clone(),
            time: now_ms(),
            need_reply: false,
            status,
            timeout: None,
        }
    }
}

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

// =============================================================================
// CODEC
// =============================================================================

/// Bytes or text as carried by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    Binary(Vec<u8>),
    Text(String),
}

/// Outbound serialization mode of a connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Codec {
    /// Protobuf envelope in binary transport frames.
    #[default]
    Binary,
    /// JSON envelope in text transport frames.
    Json,
}

impl Codec {
    /// Encode an envelope for the transport according to this mode.
    #[must_use]
    pub fn encode(self, rpc: &Rpc) -> Payload {
        match self {
            Self::Binary => Payload::Binary(encode_rpc(rpc)),
            // Serializing a struct of strings, numbers and a `Value` cannot fail.
            Self::Json => Payload::Text(serde_json::to_string(rpc).unwrap_or_default()),
        }
    }
}

/// Decode a transport payload into an envelope.
///
/// # Errors
///
/// Returns [`CodecError`] for malformed bytes or text, unknown types, and
/// out-of-range identifiers.
pub fn decode(payload: &Payload) -> Result<Rpc, CodecError> {
    match payload {
        Payload::Binary(bytes) => decode_rpc(bytes),
        Payload::Text(text) => Ok(serde_json::from_str(text)?),
    }
}

/// Encode an envelope into protobuf bytes.
#[must_use]
pub fn encode_rpc(rpc: &Rpc) -> Vec<u8> {
    let wire = rpc_to_wire(rpc);

    let mut out = Vec::with_capacity(wire.encoded_len());
    // Encoding into a growable Vec<u8> cannot hit `BufferTooSmall`.
    wire.encode(&mut out).unwrap_or_default();
    out
}

/// Decode protobuf bytes into an envelope.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed bytes,
/// [`CodecError::InvalidType`] for unknown tags and
/// [`CodecError::InvalidId`] for identifiers wider than 16 bits.
pub fn decode_rpc(bytes: &[u8]) -> Result<Rpc, CodecError> {
    let wire = WireRpc::decode(bytes)?;
    wire_to_rpc(wire)
}

fn rpc_to_wire(rpc: &Rpc) -> WireRpc {
    WireRpc {
        id: u32::from(rpc.id),
        path: rpc.path.clone(),
        data: Some(json_to_proto_value(&rpc.data)),
        kind: rpc.kind.as_i32(),
        from: rpc.from.clone(),
        to: rpc.to.clone(),
        time: rpc.time,
        need_reply: rpc.need_reply,
        status: rpc.status,
        timeout: rpc.timeout,
    }
}

fn wire_to_rpc(wire: WireRpc) -> Result<Rpc, CodecError> {
    let id = u16::try_from(wire.id).map_err(|_| CodecError::InvalidId(wire.id))?;
    Ok(Rpc {
        id,
        path: wire.path,
        data: wire.data.map_or(Value::Null, |v| proto_to_json_value(&v)),
        kind: RpcType::from_i32(wire.kind)?,
        from: wire.from,
        to: wire.to,
        time: wire.time,
        need_reply: wire.need_reply,
        status: wire.status,
        timeout: wire.timeout,
    })
}

fn json_to_proto_value(value: &Value) -> prost_types::Value {
    let kind = match value {
        Value::Null => {
            prost_types::value::Kind::NullValue(prost_types::NullValue::NullValue as i32)
        }
        Value::Bool(v) => prost_types::value::Kind::BoolValue(*v),
        Value::Number(v) => prost_types::value::Kind::NumberValue(v.as_f64().unwrap_or(0.0)),
        Value::String(v) => prost_types::value::Kind::StringValue(v.clone()),
        Value::Array(v) => prost_types::value::Kind::ListValue(prost_types::ListValue {
            values: v.iter().map(json_to_proto_value).collect(),
        }),
        Value::Object(v) => prost_types::value::Kind::StructValue(prost_types::Struct {
            fields: v
                .iter()
                .map(|(k, v)| (k.clone(), json_to_proto_value(v)))
                .collect(),
        }),
    };

    prost_types::Value { kind: Some(kind) }
}

fn proto_to_json_value(value: &prost_types::Value) -> Value {
    let Some(kind) = &value.kind else {
        return Value::Null;
    };

    match kind {
        prost_types::value::Kind::NullValue(_) => Value::Null,
        prost_types::value::Kind::NumberValue(v) => number_value(*v),
        prost_types::value::Kind::StringValue(v) => Value::String(v.clone()),
        prost_types::value::Kind::BoolValue(v) => Value::Bool(*v),
        prost_types::value::Kind::StructValue(v) => Value::Object(
            v.fields
                .iter()
                .map(|(k, v)| (k.clone(), proto_to_json_value(v)))
                .collect(),
        ),
        prost_types::value::Kind::ListValue(v) => {
            Value::Array(v.values.iter().map(proto_to_json_value).collect())
        }
    }
}

/// Protobuf numbers are doubles; integral values come back as JSON integers.
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn number_value(v: f64) -> Value {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if v.is_finite() && v.trunc() == v && v.abs() <= MAX_EXACT {
        return Value::from(v as i64);
    }
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}

#[derive(Clone, PartialEq, Message)]
struct WireRpc {
    #[prost(uint32, tag = "1")]
    id: u32,
    #[prost(string, tag = "2")]
    path: String,
    #[prost(message, optional, tag = "3")]
    data: Option<prost_types::Value>,
    #[prost(enumeration = "WireRpcType", tag = "4")]
    kind: i32,
    #[prost(string, tag = "5")]
    from: String,
    #[prost(string, tag = "6")]
    to: String,
    #[prost(int64, tag = "7")]
    time: i64,
    #[prost(bool, tag = "8")]
    need_reply: bool,
    #[prost(bool, tag = "9")]
    status: bool,
    #[prost(uint64, optional, tag = "10")]
    timeout: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
enum WireRpcType {
    Heart = 0,
    Login = 1,
    Regist = 2,
    UnRegist = 3,
    Request = 4,
    Response = 5,
    Push = 6,
    Pub = 7,
    Sub = 8,
    UnSub = 9,
    Move = 10,
    Proxy = 11,
}

// =============================================================================
// TOPICS
// =============================================================================

/// Check a publish/subscribe topic name.
///
/// A topic is one or more dot-separated segments of ASCII alphanumerics,
/// `_`, `-`, `:` or `/`, at most [`MAX_TOPIC_LEN`] bytes in total.
#[must_use]
pub fn is_valid_topic(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_TOPIC_LEN {
        return false;
    }
    name.split('.').all(|segment| {
        !segment.is_empty()
            && segment
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b':' | b'/'))
    })
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
