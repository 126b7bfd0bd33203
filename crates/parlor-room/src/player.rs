//! Membership projection: a player as seen from inside a room.

use serde::{Deserialize, Serialize};

use parlor_protocol::PlayerId;

/// What a member is doing in the room.
///
/// Watchers occupy a seat (counted against the room's total `size`) but
/// not a player seat, can't ready up, and don't gate round start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A participant in the game.
    #[default]
    Player,
    /// A spectator.
    Watcher,
}

/// A player's membership record inside one room.
///
/// This is a projection of the registry's `Player`, not a separate
/// identity: the same id may appear in at most one room at a time, and
/// the registry stays the owner of name/attributes/status. The room only
/// adds what it needs — role, readiness, and the reconnection
/// supervisor's `online` flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPlayer {
    /// The registry identity this projection refers to.
    pub id: PlayerId,
    /// Display name, copied at join time for broadcast payloads.
    pub name: String,
    /// Player or watcher.
    #[serde(default)]
    pub role: Role,
    /// Readiness for the next round. Only meaningful for `role=player`.
    #[serde(default)]
    pub is_ready: bool,
    /// Whether the member's transport is currently open.
    #[serde(default = "default_online")]
    pub online: bool,
}

fn default_online() -> bool {
    true
}

impl RoomPlayer {
    /// Creates an online, unready membership record.
    pub fn new(id: PlayerId, name: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            name: name.into(),
            role,
            is_ready: false,
            online: true,
        }
    }
}
