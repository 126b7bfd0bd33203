//! Player types: the registry's record of a connected identity.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use parlor_protocol::PlayerId;

// ---------------------------------------------------------------------------
// PlayerStatus
// ---------------------------------------------------------------------------

/// A player's coarse status as seen by the rest of the server.
///
/// This is lobby-level status, not in-room readiness: a player who is
/// `Ready` here shows up as "looking for a game" in the global player
/// list, while per-room readiness lives on the room's membership
/// projection.
///
/// Wire spelling is lowercase (`"online"`, `"ready"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlayerStatus {
    /// Connected, not in a started game.
    #[default]
    Online,
    /// Transport closed; the identity is retained while a reconnect is
    /// still possible.
    Offline,
    /// Flagged themselves ready.
    Ready,
    /// Explicitly not ready.
    Unready,
    /// In a room whose game is running.
    Playing,
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// One registered identity.
///
/// `attributes` is an open, app-defined bag (avatar, rating, locale —
/// whatever the application attaches). The engine stores and forwards it
/// without interpreting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Unique, stable for the lifetime of the identity.
    pub id: PlayerId,
    /// Display name, supplied by the identity provider.
    pub name: String,
    /// Opaque app-defined metadata.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
    /// Current coarse status.
    #[serde(default)]
    pub status: PlayerStatus,
}

impl Player {
    /// Creates an online player with the given identity.
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            attributes: Map::new(),
            status: PlayerStatus::Online,
        }
    }
}
