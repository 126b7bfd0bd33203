//! The room: membership, capacity, readiness, and the lifecycle machine.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use parlor_protocol::{PlayerId, RoomId};

use crate::{Role, RoomError, RoomEvent, RoomPlayer, RoomQuota};

// ---------------------------------------------------------------------------
// RoomStatus
// ---------------------------------------------------------------------------

/// The lifecycle state of a room.
///
/// ```text
///          start()           end()
/// waiting ────────→ playing ────────→ waiting   (repeatable)
///    │                 │
///    └──── close() ────┴───→ ended              (terminal)
/// ```
///
/// - **Waiting**: accepting joins and readiness toggles; no active game
///   contract instance.
/// - **Playing**: a contract instance is live; commands are routed to it.
/// - **Ended**: closed for good; the registry destroys the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    #[default]
    Waiting,
    Playing,
    Ended,
}

impl RoomStatus {
    /// Returns `true` if the room accepts new `role=player` members.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Returns `true` while a round is running.
    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing)
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Playing => write!(f, "playing"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// One game session: ordered membership plus the lifecycle machine.
///
/// Every mutator either fails with a [`RoomError`] (no partial mutation)
/// or succeeds and returns the [`RoomEvent`]s it produced, in order. The
/// room never talks to the network or the game contract itself — the
/// router does both, driven by the returned events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    /// Unique id, generated by the registry.
    pub id: RoomId,
    /// Display name.
    pub name: String,
    /// Open app-defined metadata. By convention `attrs["type"]` names the
    /// game contract variant to instantiate on start.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attrs: Map<String, Value>,
    /// Capacity limits (flattened to `size`/`minSize`/`maxSize`).
    #[serde(flatten)]
    pub quota: RoomQuota,
    /// Current lifecycle state.
    #[serde(default)]
    pub status: RoomStatus,
    /// Ordered membership (join order preserved).
    #[serde(default)]
    players: Vec<RoomPlayer>,
    /// Per-player round outcomes, retained across rounds until the room
    /// is destroyed.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    achievements: HashMap<PlayerId, Value>,
}

impl Room {
    /// Creates an empty waiting room.
    pub fn new(
        id: RoomId,
        name: impl Into<String>,
        attrs: Map<String, Value>,
        quota: RoomQuota,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            attrs,
            quota,
            status: RoomStatus::Waiting,
            players: Vec::new(),
            achievements: HashMap::new(),
        }
    }

    // -- Membership ------------------------------------------------------

    /// Adds a member.
    ///
    /// `role=player` seats require `status=waiting`; watchers may join a
    /// running game. Capacity: player seats are capped by
    /// `quota.max_players`, total membership by `quota.size`.
    ///
    /// # Errors
    /// - [`RoomError::AlreadyInRoom`] if the id is already a member.
    /// - [`RoomError::RoomFull`] if the seat quota is exhausted.
    /// - [`RoomError::InvalidState`] for player joins outside `waiting`.
    pub fn add_player(
        &mut self,
        id: PlayerId,
        name: &str,
        role: Role,
    ) -> Result<Vec<RoomEvent>, RoomError> {
        if self.member(&id).is_some() {
            return Err(RoomError::AlreadyInRoom(id, self.id.clone()));
        }
        match role {
            Role::Player => {
                if !self.status.is_joinable() {
                    return Err(RoomError::InvalidState(format!(
                        "cannot take a player seat while room is {}",
                        self.status
                    )));
                }
                if self.player_count() >= self.quota.max_players {
                    return Err(RoomError::RoomFull(self.id.clone()));
                }
            }
            Role::Watcher => {
                if self.status == RoomStatus::Ended {
                    return Err(RoomError::InvalidState(
                        "room is closed".into(),
                    ));
                }
            }
        }
        if self.players.len() >= self.quota.size {
            return Err(RoomError::RoomFull(self.id.clone()));
        }

        let member = RoomPlayer::new(id, name, role);
        self.players.push(member.clone());
        tracing::info!(
            room_id = %self.id,
            player_id = %member.id,
            ?role,
            members = self.players.len(),
            "player joined room"
        );
        Ok(vec![RoomEvent::Join(member)])
    }

    /// Removes a member (leave or kick — same mechanics).
    ///
    /// # Errors
    /// Returns [`RoomError::NotInRoom`] if the id isn't a member.
    pub fn kick_player(
        &mut self,
        id: &PlayerId,
    ) -> Result<Vec<RoomEvent>, RoomError> {
        let pos = self
            .players
            .iter()
            .position(|p| &p.id == id)
            .ok_or_else(|| RoomError::NotInRoom(id.clone(), self.id.clone()))?;
        self.players.remove(pos);
        tracing::info!(
            room_id = %self.id,
            player_id = %id,
            members = self.players.len(),
            "player left room"
        );
        Ok(vec![RoomEvent::Leave(id.clone())])
    }

    // -- Readiness -------------------------------------------------------

    /// Flips a member to ready.
    ///
    /// Idempotent: readying an already-ready member changes nothing and
    /// emits nothing. Flipping to ready emits `PlayerReady`, plus
    /// `AllReady` when every player seat is now ready and the count meets
    /// `minSize` — a hint for the owner or the contract, never an
    /// automatic start.
    pub fn ready(&mut self, id: &PlayerId) -> Result<Vec<RoomEvent>, RoomError> {
        let member = self.member_mut(id)?;
        if member.is_ready {
            return Ok(Vec::new());
        }
        member.is_ready = true;

        let mut events = vec![RoomEvent::PlayerReady(id.clone())];
        if self.all_players_ready() && self.player_count() >= self.quota.min_players {
            events.push(RoomEvent::AllReady);
        }
        Ok(events)
    }

    /// Flips a member back to unready. Idempotent like [`Self::ready`].
    pub fn unready(&mut self, id: &PlayerId) -> Result<Vec<RoomEvent>, RoomError> {
        let member = self.member_mut(id)?;
        if !member.is_ready {
            return Ok(Vec::new());
        }
        member.is_ready = false;
        Ok(vec![RoomEvent::PlayerUnready(id.clone())])
    }

    // -- Lifecycle -------------------------------------------------------

    /// Starts a round: `waiting → playing`.
    ///
    /// The caller (router) instantiates the game contract and runs its
    /// `on_start` hook after this returns.
    ///
    /// # Errors
    /// - [`RoomError::InvalidState`] unless `status=waiting`.
    /// - [`RoomError::InsufficientPlayers`] unless every player seat is
    ///   ready and the count meets `minSize`. Status is unchanged.
    pub fn start(&mut self) -> Result<Vec<RoomEvent>, RoomError> {
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::InvalidState(format!(
                "cannot start while room is {}",
                self.status
            )));
        }
        let ready = self
            .players
            .iter()
            .filter(|p| p.role == Role::Player && p.is_ready)
            .count();
        if self.player_count() < self.quota.min_players
            || ready < self.player_count()
        {
            return Err(RoomError::InsufficientPlayers {
                room: self.id.clone(),
                ready,
                required: self.quota.min_players.max(self.player_count()),
            });
        }

        self.status = RoomStatus::Playing;
        tracing::info!(room_id = %self.id, players = self.player_count(), "round started");
        Ok(vec![RoomEvent::Started])
    }

    /// Ends the current round: `playing → waiting`.
    ///
    /// Readiness flags reset so the next round requires a fresh ready-up;
    /// achievements are retained. The room never auto-restarts.
    ///
    /// # Errors
    /// Returns [`RoomError::InvalidState`] unless `status=playing`.
    pub fn end(&mut self) -> Result<Vec<RoomEvent>, RoomError> {
        if self.status != RoomStatus::Playing {
            return Err(RoomError::InvalidState(format!(
                "cannot end while room is {}",
                self.status
            )));
        }
        self.status = RoomStatus::Waiting;
        for p in &mut self.players {
            p.is_ready = false;
        }
        tracing::info!(room_id = %self.id, "round ended");
        Ok(vec![RoomEvent::Ended])
    }

    /// Closes the room for good: `→ ended`, terminal.
    ///
    /// Idempotent; the registry destroys the room afterwards.
    pub fn close(&mut self) -> Vec<RoomEvent> {
        if self.status == RoomStatus::Ended {
            return Vec::new();
        }
        self.status = RoomStatus::Ended;
        tracing::info!(room_id = %self.id, "room closed");
        vec![RoomEvent::Closed]
    }

    // -- Reconnection supervision ---------------------------------------

    /// Flips a member's online flag (transport connect/close signal).
    ///
    /// Emits `PlayerOffline`/`PlayerOnline` on actual transitions; a
    /// redundant flip emits nothing.
    pub fn set_online(
        &mut self,
        id: &PlayerId,
        online: bool,
    ) -> Result<Vec<RoomEvent>, RoomError> {
        let member = self.member_mut(id)?;
        if member.online == online {
            return Ok(Vec::new());
        }
        member.online = online;
        let event = if online {
            RoomEvent::PlayerOnline(id.clone())
        } else {
            RoomEvent::PlayerOffline(id.clone())
        };
        tracing::debug!(room_id = %self.id, player_id = %id, online, "member online flag changed");
        Ok(vec![event])
    }

    /// The reconnection supervisor's query: is this member's transport
    /// currently open? Non-members count as offline.
    pub fn is_player_online(&self, id: &PlayerId) -> bool {
        self.member(id).is_some_and(|p| p.online)
    }

    // -- Achievements ----------------------------------------------------

    /// Records a per-player round outcome, replacing any previous value.
    /// Retained until the room is destroyed.
    pub fn set_achievement(&mut self, id: PlayerId, value: Value) {
        self.achievements.insert(id, value);
    }

    /// Looks up a player's retained outcome record.
    pub fn achievement(&self, id: &PlayerId) -> Option<&Value> {
        self.achievements.get(id)
    }

    /// The full retained achievement map.
    pub fn achievements(&self) -> &HashMap<PlayerId, Value> {
        &self.achievements
    }

    // -- Queries ---------------------------------------------------------

    /// Looks up a membership record.
    pub fn member(&self, id: &PlayerId) -> Option<&RoomPlayer> {
        self.players.iter().find(|p| &p.id == id)
    }

    /// The ordered membership list.
    pub fn members(&self) -> &[RoomPlayer] {
        &self.players
    }

    /// Ids of all members, in join order.
    pub fn member_ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|p| p.id.clone()).collect()
    }

    /// Ids of `role=player` members, in join order.
    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players
            .iter()
            .filter(|p| p.role == Role::Player)
            .map(|p| p.id.clone())
            .collect()
    }

    /// Number of `role=player` members.
    pub fn player_count(&self) -> usize {
        self.players.iter().filter(|p| p.role == Role::Player).count()
    }

    /// Total membership, watchers included.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Returns `true` if nobody is in the room.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// The contract variant named by `attrs["type"]`, if any.
    pub fn game_type(&self) -> Option<&str> {
        self.attrs.get("type").and_then(Value::as_str)
    }

    fn member_mut(&mut self, id: &PlayerId) -> Result<&mut RoomPlayer, RoomError> {
        let room_id = self.id.clone();
        self.players
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or(RoomError::NotInRoom(id.clone(), room_id))
    }

    fn all_players_ready(&self) -> bool {
        self.players
            .iter()
            .filter(|p| p.role == Role::Player)
            .all(|p| p.is_ready)
    }
}

// =========================================================================
// Tests
// =========================================================================
