//! Contract registry: maps game type names to contract constructors.

use std::collections::HashMap;

use parlor_room::Room;

use crate::{GameError, GameRoom};

type Constructor = Box<dyn Fn(&Room) -> Box<dyn GameRoom> + Send + Sync>;

/// Knows how to build a [`GameRoom`] instance for each registered game
/// type.
///
/// A room declares its game through `attrs["type"]` at creation; when the
/// room starts, the router asks the registry for a fresh contract
/// instance. One registry per engine, populated at startup.
pub struct GameRegistry {
    constructors: HashMap<String, Constructor>,
}

impl GameRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registers a constructor for a game type, replacing any previous
    /// one under the same name.
    pub fn register<F>(&mut self, game_type: &str, constructor: F)
    where
        F: Fn(&Room) -> Box<dyn GameRoom> + Send + Sync + 'static,
    {
        tracing::debug!(%game_type, "game type registered");
        self.constructors
            .insert(game_type.to_string(), Box::new(constructor));
    }

    /// Builds and initializes a contract instance for a room.
    ///
    /// # Errors
    /// Returns [`GameError::UnknownGameType`] when the room's
    /// `attrs["type"]` is missing or unregistered.
    pub fn instantiate(&self, room: &Room) -> Result<Box<dyn GameRoom>, GameError> {
        let game_type = room
            .game_type()
            .ok_or_else(|| GameError::UnknownGameType("<none>".to_string()))?;
        let constructor = self
            .constructors
            .get(game_type)
            .ok_or_else(|| GameError::UnknownGameType(game_type.to_string()))?;

        let mut game = constructor(room);
        game.init(room);
        Ok(game)
    }

    /// Whether a game type has a registered constructor.
    pub fn contains(&self, game_type: &str) -> bool {
        self.constructors.contains_key(game_type)
    }
}

impl Default for GameRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// Tests
// =========================================================================
