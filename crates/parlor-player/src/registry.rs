//! The player registry: tracks every registered identity.
//!
//! # Concurrency note
//!
//! `PlayerRegistry` is NOT thread-safe by itself — it uses a plain
//! `HashMap`, not a concurrent one. This is intentional: the registry is
//! owned by the single router task and every mutation happens inside that
//! task. Keeping it simple here avoids hidden locking overhead.

use std::collections::HashMap;

use rand::Rng;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use parlor_protocol::PlayerId;

use crate::{Player, PlayerStatus, RegistryError};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A change the registry announces to subscribers.
///
/// The router subscribes and turns these into its global player-list
/// broadcast; nothing else in the engine mutates player status, so
/// subscribers see every transition.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// A new identity was registered.
    Created(Player),
    /// A player's status changed via [`PlayerRegistry::set_status`].
    StatusChanged { id: PlayerId, status: PlayerStatus },
    /// An identity was removed (logout/eviction).
    Removed(PlayerId),
}

// ---------------------------------------------------------------------------
// PlayerRegistry
// ---------------------------------------------------------------------------

/// Owns the set of registered players and their status.
pub struct PlayerRegistry {
    /// All players, keyed by id.
    players: HashMap<PlayerId, Player>,
    /// Event subscribers. Senders whose receiver is gone are pruned on
    /// the next publish.
    subscribers: Vec<mpsc::UnboundedSender<PlayerEvent>>,
}

impl PlayerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            players: HashMap::new(),
            subscribers: Vec::new(),
        }
    }

    /// Subscribes to registry events.
    ///
    /// Events are delivered for every create, status change, and removal
    /// from this point on. Dropping the receiver unsubscribes.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<PlayerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Registers a new player.
    ///
    /// When `id` is `None` a fresh 128-bit hex id is generated. The
    /// returned reference is the stored record.
    ///
    /// # Errors
    /// Returns [`RegistryError::DuplicateIdentity`] if the id is already
    /// registered — no partial mutation occurs.
    pub fn create(
        &mut self,
        id: Option<PlayerId>,
        name: &str,
        attributes: Map<String, Value>,
    ) -> Result<&Player, RegistryError> {
        let id = match id {
            Some(id) => {
                if self.players.contains_key(&id) {
                    return Err(RegistryError::DuplicateIdentity(id));
                }
                id
            }
            None => generate_id(),
        };

        let mut player = Player::new(id.clone(), name);
        player.attributes = attributes;

        self.publish(PlayerEvent::Created(player.clone()));
        tracing::info!(player_id = %id, %name, "player registered");

        Ok(self.players.entry(id).or_insert(player))
    }

    /// Looks up a player by id.
    pub fn get(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    /// Removes a player (logout). Returns the removed record.
    ///
    /// # Errors
    /// Returns [`RegistryError::NotFound`] if the id isn't registered.
    pub fn remove(&mut self, id: &PlayerId) -> Result<Player, RegistryError> {
        let player = self
            .players
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        self.publish(PlayerEvent::Removed(id.clone()));
        tracing::info!(player_id = %id, "player removed");
        Ok(player)
    }

    /// Applies a status transition and announces it.
    ///
    /// This is the only sanctioned way to mutate a player's status; the
    /// router and rooms go through here so subscribers never miss a
    /// transition. Setting the current status again is a no-op and emits
    /// nothing.
    ///
    /// # Errors
    /// Returns [`RegistryError::NotFound`] if the id isn't registered.
    pub fn set_status(
        &mut self,
        id: &PlayerId,
        status: PlayerStatus,
    ) -> Result<(), RegistryError> {
        let player = self
            .players
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;

        if player.status == status {
            return Ok(());
        }
        player.status = status;

        tracing::debug!(player_id = %id, ?status, "player status changed");
        self.publish(PlayerEvent::StatusChanged {
            id: id.clone(),
            status,
        });
        Ok(())
    }

    /// Returns every registered player, in unspecified order.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// Returns the number of registered players.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Returns `true` if no players are registered.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Delivers an event to all live subscribers, dropping dead ones.
    fn publish(&mut self, event: PlayerEvent) {
        self.subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl Default for PlayerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Generates a random 32-character hex id (128 bits of entropy).
///
/// Collisions are computationally negligible, so generated ids don't need
/// a uniqueness check against the map.
fn generate_id() -> PlayerId {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    PlayerId(bytes.iter().map(|b| format!("{b:02x}")).collect())
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(id: &str) -> PlayerId {
        PlayerId::from(id)
    }

    fn no_attrs() -> Map<String, Value> {
        Map::new()
    }

    // =====================================================================
    // create()
    // =====================================================================

    #[test]
    fn test_create_with_explicit_id() {
        let mut reg = PlayerRegistry::new();

        let p = reg.create(Some(pid("p1")), "ada", no_attrs()).unwrap();

        assert_eq!(p.id, pid("p1"));
        assert_eq!(p.name, "ada");
        assert_eq!(p.status, PlayerStatus::Online);
    }

    #[test]
    fn test_create_generates_id_when_absent() {
        let mut reg = PlayerRegistry::new();

        let id = reg.create(None, "ada", no_attrs()).unwrap().id.clone();

        assert_eq!(id.as_str().len(), 32);
        assert!(reg.get(&id).is_some());
    }

    #[test]
    fn test_create_duplicate_identity_rejected() {
        let mut reg = PlayerRegistry::new();
        reg.create(Some(pid("p1")), "ada", no_attrs()).unwrap();

        let err = reg.create(Some(pid("p1")), "eve", no_attrs()).unwrap_err();

        assert!(matches!(err, RegistryError::DuplicateIdentity(_)));
        // No partial mutation: the original record is untouched.
        assert_eq!(reg.get(&pid("p1")).unwrap().name, "ada");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let mut reg = PlayerRegistry::new();
        let a = reg.create(None, "a", no_attrs()).unwrap().id.clone();
        let b = reg.create(None, "b", no_attrs()).unwrap().id.clone();
        assert_ne!(a, b);
    }

    // =====================================================================
    // set_status()
    // =====================================================================

    #[test]
    fn test_set_status_mutates_player() {
        let mut reg = PlayerRegistry::new();
        reg.create(Some(pid("p1")), "ada", no_attrs()).unwrap();

        reg.set_status(&pid("p1"), PlayerStatus::Ready).unwrap();

        assert_eq!(reg.get(&pid("p1")).unwrap().status, PlayerStatus::Ready);
    }

    #[test]
    fn test_set_status_unknown_player() {
        let mut reg = PlayerRegistry::new();
        let err = reg.set_status(&pid("ghost"), PlayerStatus::Ready).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    // =====================================================================
    // Events
    // =====================================================================

    #[test]
    fn test_subscribers_see_lifecycle_events() {
        let mut reg = PlayerRegistry::new();
        let mut rx = reg.subscribe();

        reg.create(Some(pid("p1")), "ada", no_attrs()).unwrap();
        reg.set_status(&pid("p1"), PlayerStatus::Playing).unwrap();
        reg.remove(&pid("p1")).unwrap();

        assert!(matches!(rx.try_recv().unwrap(), PlayerEvent::Created(_)));
        assert_eq!(
            rx.try_recv().unwrap(),
            PlayerEvent::StatusChanged {
                id: pid("p1"),
                status: PlayerStatus::Playing
            }
        );
        assert_eq!(rx.try_recv().unwrap(), PlayerEvent::Removed(pid("p1")));
    }

    #[test]
    fn test_redundant_status_emits_nothing() {
        let mut reg = PlayerRegistry::new();
        reg.create(Some(pid("p1")), "ada", no_attrs()).unwrap();
        let mut rx = reg.subscribe();

        // Already Online — no event.
        reg.set_status(&pid("p1"), PlayerStatus::Online).unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let mut reg = PlayerRegistry::new();
        let rx = reg.subscribe();
        drop(rx);

        // Publishing after the receiver is gone must not error or leak.
        reg.create(Some(pid("p1")), "ada", no_attrs()).unwrap();
        assert!(reg.subscribers.is_empty());
    }

    // =====================================================================
    // remove()
    // =====================================================================

    #[test]
    fn test_remove_then_get_is_none() {
        let mut reg = PlayerRegistry::new();
        reg.create(Some(pid("p1")), "ada", no_attrs()).unwrap();

        reg.remove(&pid("p1")).unwrap();

        assert!(reg.get(&pid("p1")).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_remove_unknown_player() {
        let mut reg = PlayerRegistry::new();
        assert!(matches!(
            reg.remove(&pid("ghost")),
            Err(RegistryError::NotFound(_))
        ));
    }
}
