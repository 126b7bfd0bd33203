//! Player registry for Parlor.
//!
//! This crate owns the set of connected identities:
//!
//! 1. **Identity** — one [`Player`] per authenticated `{id, name}` pair,
//!    created at first contact, destroyed at logout.
//! 2. **Status** — a coarse per-player status
//!    ([`PlayerStatus`]: online/offline/ready/unready/playing) with a
//!    single sanctioned mutation path ([`PlayerRegistry::set_status`]).
//! 3. **Events** — subscribers receive a [`PlayerEvent`] for every
//!    create/status/remove, which is how the router keeps its global
//!    player-list broadcast current.
//!
//! # How it fits in the stack
//!
//! ```text
//! Router (above)      ← resolves connections to Players, subscribes to events
//!     ↕
//! Player Registry (this crate)
//!     ↕
//! Protocol (below)    ← provides PlayerId
//! ```

mod error;
mod player;
mod registry;

pub use error::RegistryError;
pub use player::{Player, PlayerStatus};
pub use registry::{PlayerEvent, PlayerRegistry};
