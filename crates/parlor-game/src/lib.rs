//! The game extension surface for Parlor.
//!
//! Concrete game rules never live in the engine. They live behind the
//! [`GameRoom`] trait: one implementation per game type, instantiated
//! through a [`GameRegistry`] keyed on the room's `attrs["type"]`, and
//! invoked by the router at defined lifecycle points (`on_start`,
//! `on_command`, offline supervision hooks).
//!
//! Hooks receive a [`RoomCtx`]: a view of the room plus an effect queue.
//! A contract never touches the network — it queues broadcasts, kicks,
//! achievements, an end-of-round request, or a save mark, and the router
//! applies those effects after the hook returns. That keeps contracts
//! synchronous, deterministic, and unit-testable without a server.
//!
//! # Error policy
//!
//! A malformed or out-of-turn command is a [`GameError::Rejected`]: the
//! router turns it into an addressed reply to the offending sender only.
//! It never crosses the router as a panic and never ends the round.

mod contract;
mod ctx;
mod error;
mod persist;
mod registry;

pub use contract::{Command, GameRoom};
pub use ctx::{Effects, RoomCtx};
pub use error::GameError;
pub use persist::{NoopPersistence, Persistence};
pub use registry::GameRegistry;
