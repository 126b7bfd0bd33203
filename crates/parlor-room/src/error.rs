//! Error types for the room layer.

use parlor_protocol::{PlayerId, RoomId};

/// Errors that can occur during room operations.
///
/// All of these are capacity/state rejections: the operation is refused
/// as a whole and no partial mutation occurs.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// No seat left for the requested role.
    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// The player is already a member of a room.
    #[error("player {0} is already in room {1}")]
    AlreadyInRoom(PlayerId, RoomId),

    /// The player is not a member of this room.
    #[error("player {0} is not in room {1}")]
    NotInRoom(PlayerId, RoomId),

    /// The player is not a member of any room (for operations resolved
    /// through the sender's current room).
    #[error("player {0} is not in any room")]
    NotInAnyRoom(PlayerId),

    /// Too few ready players to start a round.
    #[error("room {room}: {ready} of {required} required players ready")]
    InsufficientPlayers {
        room: RoomId,
        ready: usize,
        required: usize,
    },

    /// The room's lifecycle state doesn't allow this operation, e.g.
    /// `end()` on a room that isn't playing.
    #[error("invalid room state for this operation: {0}")]
    InvalidState(String),
}
