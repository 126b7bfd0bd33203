//! Wire protocol for Parlor.
//!
//! This crate defines the "language" that clients and the engine speak:
//!
//! - **Types** ([`Envelope`], [`MessageType`], [`Sender`], etc.) — the
//!   message structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those messages are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong while encoding,
//!   decoding, or interpreting a frame.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and the router
//! (player/room context). It doesn't know about connections or rooms —
//! it only knows what a well-formed envelope looks like.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Router (player/room context)
//! ```
//!
//! Every envelope carries a namespaced `type` string (`room.command`,
//! `player.join`, `global.message`, ...). The namespace prefix is the
//! routing key: the router dispatches on it without inspecting `data`.

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    Envelope, MessageType, PlayerId, Recipient, RoomId, Scope, Sender,
};
