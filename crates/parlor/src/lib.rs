//! # Parlor
//!
//! A realtime room-based multiplayer session engine for turn-based and
//! lightweight realtime games.
//!
//! Parlor keeps the engine and the games strictly apart: the engine owns
//! identities, rooms, routing, and reconnection supervision; a game is a
//! [`GameRoom`] implementation registered under a type name. One actor
//! task owns every piece of session state, so game code is synchronous
//! and single-threaded by construction.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use parlor::{GameRegistry, ParlorServer};
//!
//! # async fn run() -> Result<(), parlor::ParlorError> {
//! let mut games = GameRegistry::new();
//! // games.register("my-game", |_room| Box::new(MyGame::new()));
//!
//! let server = ParlorServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build(games)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod engine;
mod error;
mod handler;
mod server;

pub use engine::{Engine, EngineConfig, EngineHandle};
pub use error::ParlorError;
pub use server::{ParlorServer, ParlorServerBuilder};

// Re-exports so applications depend on one crate.
pub use parlor_game::{
    Command, Effects, GameError, GameRegistry, GameRoom, NoopPersistence,
    Persistence, RoomCtx,
};
pub use parlor_player::{
    Player, PlayerEvent, PlayerRegistry, PlayerStatus, RegistryError,
};
pub use parlor_protocol::{
    Codec, Envelope, JsonCodec, MessageType, PlayerId, ProtocolError, Recipient,
    RoomId, Scope, Sender,
};
pub use parlor_room::{
    Role, Room, RoomError, RoomEvent, RoomPlayer, RoomQuota, RoomRegistry,
    RoomStatus,
};
pub use parlor_transport::{ConnectionId, TransportError};
