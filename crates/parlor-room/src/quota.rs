//! Room capacity configuration.

use serde::{Deserialize, Serialize};

/// Capacity limits for a room.
///
/// `size` caps total membership (players + watchers); `min_players` and
/// `max_players` quota the `role=player` seats only. The invariant the
/// room enforces at all times:
///
/// ```text
/// count(role=player) ≤ max_players    and    total members ≤ size
/// ```
///
/// Wire spelling is camelCase (`minSize`/`maxSize`), matching the rest of
/// the envelope contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomQuota {
    /// Total capacity, watchers included.
    pub size: usize,
    /// Minimum `role=player` count required to start a round.
    #[serde(rename = "minSize")]
    pub min_players: usize,
    /// Maximum `role=player` count.
    #[serde(rename = "maxSize")]
    pub max_players: usize,
}

impl Default for RoomQuota {
    fn default() -> Self {
        Self {
            size: 10,
            min_players: 2,
            max_players: 8,
        }
    }
}
