//! Events produced by room mutations.

use parlor_protocol::PlayerId;

use crate::RoomPlayer;

/// A state change a room mutator produced.
///
/// Mutators return these instead of pushing into channels: the router
/// turns them into broadcast envelopes and contract hook calls, in the
/// order they were produced. `AllReady` is a hint, not an auto-start —
/// starting stays a deliberate `start()` call.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// A member joined (snapshot of the new membership record).
    Join(RoomPlayer),
    /// A member left or was kicked.
    Leave(PlayerId),
    /// A member flipped to ready.
    PlayerReady(PlayerId),
    /// A member flipped to unready.
    PlayerUnready(PlayerId),
    /// Every `role=player` member is ready and the count meets the
    /// minimum quota.
    AllReady,
    /// The room transitioned `waiting → playing`.
    Started,
    /// The room transitioned `playing → waiting`.
    Ended,
    /// The room was closed for good (`→ ended`, terminal).
    Closed,
    /// A member's transport dropped.
    PlayerOffline(PlayerId),
    /// A member's transport came back.
    PlayerOnline(PlayerId),
}
