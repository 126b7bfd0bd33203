//! Room registry: owns all live rooms and the player→room index.

use std::collections::HashMap;

use rand::Rng;
use serde_json::{Map, Value};

use parlor_protocol::{PlayerId, RoomId};

use crate::{Role, Room, RoomError, RoomEvent, RoomQuota};

/// Owns every live room and knows which room each player is in.
///
/// The index enforces the key invariant: a player id appears in at most
/// one room at a time. Like the player registry this is a plain map owned
/// by the router task — no interior locking.
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Room>,
    /// Player → current room. Kept in sync with room membership.
    index: HashMap<PlayerId, RoomId>,
}

impl RoomRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
            index: HashMap::new(),
        }
    }

    /// Creates a room with a generated id and returns a reference to it.
    pub fn create(
        &mut self,
        name: &str,
        attrs: Map<String, Value>,
        quota: RoomQuota,
    ) -> &Room {
        let id = generate_room_id();
        let room = Room::new(id.clone(), name, attrs, quota);
        tracing::info!(room_id = %id, %name, "room created");
        self.rooms.entry(id).or_insert(room)
    }

    /// Looks up a room.
    pub fn get(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.get(id)
    }

    /// Looks up a room mutably.
    pub fn get_mut(&mut self, id: &RoomId) -> Option<&mut Room> {
        self.rooms.get_mut(id)
    }

    /// The room a player is currently in, if any.
    pub fn room_of(&self, player: &PlayerId) -> Option<&RoomId> {
        self.index.get(player)
    }

    /// Resolves a player's current room mutably.
    ///
    /// # Errors
    /// Returns [`RoomError::NotInAnyRoom`] when the player has no room.
    pub fn room_of_mut(&mut self, player: &PlayerId) -> Result<&mut Room, RoomError> {
        let room_id = self
            .index
            .get(player)
            .ok_or_else(|| RoomError::NotInAnyRoom(player.clone()))?;
        // Index and room membership are kept in sync; a dangling index
        // entry would be a bug, so surface it as NotFound.
        self.rooms
            .get_mut(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))
    }

    /// Adds a player to a room, enforcing "one room at a time".
    ///
    /// # Errors
    /// - [`RoomError::AlreadyInRoom`] if the player is in any room.
    /// - [`RoomError::NotFound`] if the room doesn't exist.
    /// - Whatever [`Room::add_player`] rejects with (capacity, state).
    pub fn join(
        &mut self,
        room_id: &RoomId,
        player: PlayerId,
        name: &str,
        role: Role,
    ) -> Result<Vec<RoomEvent>, RoomError> {
        if let Some(current) = self.index.get(&player) {
            return Err(RoomError::AlreadyInRoom(player, current.clone()));
        }
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;

        let events = room.add_player(player.clone(), name, role)?;
        self.index.insert(player, room_id.clone());
        Ok(events)
    }

    /// Removes a player from their current room.
    ///
    /// Returns the room id, the events, and whether the room is now empty
    /// (the caller decides whether to destroy it).
    ///
    /// # Errors
    /// Returns [`RoomError::NotInAnyRoom`] when the player has no room.
    pub fn leave(
        &mut self,
        player: &PlayerId,
    ) -> Result<(RoomId, Vec<RoomEvent>, bool), RoomError> {
        let room_id = self
            .index
            .get(player)
            .cloned()
            .ok_or_else(|| RoomError::NotInAnyRoom(player.clone()))?;

        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
        let events = room.kick_player(player)?;
        let empty = room.is_empty();

        self.index.remove(player);
        Ok((room_id, events, empty))
    }

    /// Destroys a room and purges its members from the index.
    ///
    /// # Errors
    /// Returns [`RoomError::NotFound`] if the room doesn't exist.
    pub fn destroy(&mut self, room_id: &RoomId) -> Result<Room, RoomError> {
        let room = self
            .rooms
            .remove(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
        self.index.retain(|_, rid| rid != room_id);
        tracing::info!(%room_id, "room destroyed");
        Ok(room)
    }

    /// All live rooms, in unspecified order.
    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    /// Number of live rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Returns `true` if no rooms exist.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Generates a random 16-character hex room id.
fn generate_room_id() -> RoomId {
    let mut rng = rand::rng();
    let bytes: [u8; 8] = rng.random();
    RoomId(bytes.iter().map(|b| format!("{b:02x}")).collect())
}

// =========================================================================
// Tests
// =========================================================================
