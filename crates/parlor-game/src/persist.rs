//! Session persistence seam.

use serde_json::Value;

use parlor_protocol::RoomId;

/// Receives full-state snapshots whenever a contract marks its state
/// dirty via `RoomCtx::save()`.
///
/// The engine calls this synchronously from the router task, so
/// implementations should hand the snapshot off (a channel, a write
/// queue) rather than block on IO.
pub trait Persistence: Send + 'static {
    /// Stores the contract's `get_data()` snapshot for a room.
    fn persist(&mut self, room: &RoomId, data: Value);
}

/// The default collaborator: drops every snapshot.
#[derive(Debug, Default)]
pub struct NoopPersistence;

impl Persistence for NoopPersistence {
    fn persist(&mut self, _room: &RoomId, _data: Value) {}
}
