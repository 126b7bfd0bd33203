//! Core protocol types for Parlor's wire format.
//!
//! This module defines every structure that travels "on the wire" —
//! serialized to JSON, sent over the connection, and deserialized on the
//! other side. The shapes here are a contract with client SDKs, so the
//! serde attributes matter as much as the Rust types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a player.
///
/// A newtype over `String`: identities come from an external provider (or
/// are generated by the registry), so they're opaque text rather than
/// sequential numbers. The newtype keeps a `PlayerId` from being confused
/// with a `RoomId` even though both are strings underneath.
///
/// `#[serde(transparent)]` makes it serialize as a plain JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A unique identifier for a room (one game session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Scope — the routing namespace
// ---------------------------------------------------------------------------

/// The namespace prefix of a message type.
///
/// Every wire message is tagged `<scope>.<verb>`. The scope alone decides
/// the delivery rule:
///
/// - `player.*` — processed against the sender's own identity, replies go
///   only to the sender's connection.
/// - `room.*` — resolved against the sender's current room; commands and
///   chat fan out to every member of that room.
/// - `global.*` — broadcast to every connected player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Player,
    Room,
    Global,
}

impl Scope {
    /// The lowercase wire spelling of this scope.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Room => "room",
            Self::Global => "global",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "player" => Ok(Self::Player),
            "room" => Ok(Self::Room),
            "global" => Ok(Self::Global),
            other => Err(ProtocolError::UnknownScope(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// MessageType — "<scope>.<verb>"
// ---------------------------------------------------------------------------

/// A parsed message type, e.g. `room.command` or `player.join`.
///
/// On the wire this is a single dotted string. We parse it eagerly at the
/// protocol boundary so the router can `match` on [`Scope`] and the verb
/// without re-splitting strings everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageType {
    /// The routing namespace.
    pub scope: Scope,
    /// The operation inside the namespace (`create`, `ready`, `say`, ...).
    pub verb: String,
}

impl MessageType {
    /// Builds a `player.*` message type.
    pub fn player(verb: &str) -> Self {
        Self { scope: Scope::Player, verb: verb.to_string() }
    }

    /// Builds a `room.*` message type.
    pub fn room(verb: &str) -> Self {
        Self { scope: Scope::Room, verb: verb.to_string() }
    }

    /// Builds a `global.*` message type.
    pub fn global(verb: &str) -> Self {
        Self { scope: Scope::Global, verb: verb.to_string() }
    }

    /// Parses a dotted wire string into a message type.
    ///
    /// # Errors
    /// - [`ProtocolError::MalformedType`] if there is no dot or the verb
    ///   is empty.
    /// - [`ProtocolError::UnknownScope`] if the prefix isn't a known
    ///   namespace.
    pub fn parse(s: &str) -> Result<Self, ProtocolError> {
        let (scope, verb) = s
            .split_once('.')
            .ok_or_else(|| ProtocolError::MalformedType(s.to_string()))?;
        if verb.is_empty() {
            return Err(ProtocolError::MalformedType(s.to_string()));
        }
        Ok(Self {
            scope: scope.parse()?,
            verb: verb.to_string(),
        })
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.scope, self.verb)
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Sender — who produced a message
// ---------------------------------------------------------------------------

/// The resolved origin of a message, attached by the router.
///
/// Clients never get to claim who they are inside an envelope: whatever a
/// client puts in `sender` is discarded on receipt, and the router stamps
/// the identity it resolved from the connection. The `senderKind` tag
/// makes the two shapes distinguishable without duck-typing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "senderKind", rename_all = "lowercase")]
pub enum Sender {
    /// A message produced by (or on behalf of) a player.
    Player { id: PlayerId, name: String },
    /// A message produced by the room itself (lifecycle events, state
    /// broadcasts).
    Room { id: RoomId, name: String },
}

// ---------------------------------------------------------------------------
// Recipient — where an outbound envelope goes
// ---------------------------------------------------------------------------

/// Specifies who should receive an outbound envelope.
///
/// Engine-internal addressing: the router resolves `Room` to the room's
/// current member list at fan-out time, so a recipient set is always
/// "members as of now", never a stale snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// One specific player.
    Player(PlayerId),
    /// Every current member of a room (players and watchers).
    Room(RoomId),
    /// Every connected player, regardless of room membership.
    All,
}

// ---------------------------------------------------------------------------
// Envelope — the top-level wire format
// ---------------------------------------------------------------------------

/// The unit of wire communication: `{ type, data, sender, req }`.
///
/// - `type` — namespaced routing key.
/// - `data` — opaque payload; the engine never inspects game payloads.
/// - `sender` — resolved origin, attached by the router (outbound only).
/// - `req` — optional request id; when a client sets it, the router's
///   reply (success payload or `{error: reason}`) echoes it back so the
///   client can correlate the acknowledgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The namespaced message type.
    #[serde(rename = "type")]
    pub kind: MessageType,

    /// The payload. Missing on the wire means `null`.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,

    /// The resolved sender. Never trusted from inbound frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Sender>,

    /// Optional request id for acknowledgment correlation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req: Option<u64>,
}

impl Envelope {
    /// Creates an envelope with no sender and no request id.
    pub fn new(kind: MessageType, data: Value) -> Self {
        Self { kind, data, sender: None, req: None }
    }

    /// Attaches a resolved sender.
    pub fn with_sender(mut self, sender: Sender) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Attaches a request id.
    pub fn with_req(mut self, req: u64) -> Self {
        self.req = Some(req);
        self
    }

    /// Builds a `global.error` envelope carrying `{error: reason}`.
    pub fn error(reason: &str) -> Self {
        Self::new(
            MessageType::global("error"),
            serde_json::json!({ "error": reason }),
        )
    }
}

// =========================================================================
// Tests
// =========================================================================
