//! Room lifecycle management for Parlor.
//!
//! A [`Room`] is a bounded multiplayer session container: ordered
//! membership ([`RoomPlayer`] projections with role and readiness), a
//! capacity quota, a repeatable `waiting → playing → waiting` lifecycle,
//! and an achievement map that survives round restarts. The
//! [`RoomRegistry`] owns all live rooms and enforces "one room per
//! player".
//!
//! Rooms are plain state machines, not actors: every mutator runs inside
//! the single router task and returns the [`RoomEvent`]s it produced, so
//! the caller decides how to fan them out. No channels, no locks, no
//! hidden listeners — which also makes the state machine trivially
//! testable.
//!
//! The reconnection supervisor's per-member state lives here too: the
//! `online` flag on [`RoomPlayer`], flipped through
//! [`Room::set_online`] and queried through [`Room::is_player_online`].

mod error;
mod event;
mod player;
mod quota;
mod registry;
mod room;

pub use error::RoomError;
pub use event::RoomEvent;
pub use player::{Role, RoomPlayer};
pub use quota::RoomQuota;
pub use registry::RoomRegistry;
pub use room::{Room, RoomStatus};
