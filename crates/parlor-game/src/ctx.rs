//! The effect context passed to game contract hooks.

use serde_json::{Value, json};

use parlor_protocol::{Envelope, MessageType, PlayerId, Recipient, Sender};
use parlor_room::{Role, Room};

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// Everything a contract hook asked the engine to do.
///
/// Filled through [`RoomCtx`] methods during a hook call, drained by the
/// router afterwards. Draining order: outbox fan-out, kicks, end-of-round,
/// persistence — so a hook that broadcasts a final board and then calls
/// `end()` behaves the way it reads.
#[derive(Debug, Default)]
pub struct Effects {
    /// Envelopes to deliver, with their recipient sets.
    pub outbox: Vec<(Recipient, Envelope)>,
    /// Members to remove from the room.
    pub kicks: Vec<PlayerId>,
    /// Whether the hook requested `playing → waiting`.
    pub end_requested: bool,
    /// Whether the hook changed state the persistence collaborator
    /// should see (`save()` was called).
    pub dirty: bool,
}

impl Effects {
    /// Creates an empty effect set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the hook produced no effects at all.
    pub fn is_empty(&self) -> bool {
        self.outbox.is_empty()
            && self.kicks.is_empty()
            && !self.end_requested
            && !self.dirty
    }
}

// ---------------------------------------------------------------------------
// RoomCtx
// ---------------------------------------------------------------------------

/// A contract hook's window onto its room.
///
/// Borrows the room mutably for the duration of one hook call. State
/// reads go through [`Self::room`]; everything with an external side
/// effect goes into [`Effects`].
pub struct RoomCtx<'a> {
    room: &'a mut Room,
    effects: &'a mut Effects,
}

impl<'a> RoomCtx<'a> {
    /// Wraps a room and an effect queue for one hook invocation.
    pub fn new(room: &'a mut Room, effects: &'a mut Effects) -> Self {
        Self { room, effects }
    }

    /// The room this contract instance is attached to.
    pub fn room(&self) -> &Room {
        self.room
    }

    /// The reconnection supervisor's query, re-exposed for convenience.
    pub fn is_player_online(&self, id: &PlayerId) -> bool {
        self.room.is_player_online(id)
    }

    // -- Messaging -------------------------------------------------------

    /// Queues an envelope for every current member, sender = the room.
    pub fn broadcast(&mut self, kind: MessageType, data: Value) {
        let envelope = Envelope::new(kind, data).with_sender(self.room_sender());
        self.effects
            .outbox
            .push((Recipient::Room(self.room.id.clone()), envelope));
    }

    /// Queues an envelope for a single member, sender = the room.
    ///
    /// This is how a contract answers or prompts one player without
    /// leaking to the rest of the table.
    pub fn send_to(&mut self, player: &PlayerId, kind: MessageType, data: Value) {
        let envelope = Envelope::new(kind, data).with_sender(self.room_sender());
        self.effects
            .outbox
            .push((Recipient::Player(player.clone()), envelope));
    }

    /// Queues a `room.message` chat broadcast attributed to a member.
    pub fn chat(&mut self, from: &PlayerId, data: Value) {
        let name = self
            .room
            .member(from)
            .map(|m| m.name.clone())
            .unwrap_or_default();
        let envelope = Envelope::new(MessageType::room("message"), data)
            .with_sender(Sender::Player { id: from.clone(), name });
        self.effects
            .outbox
            .push((Recipient::Room(self.room.id.clone()), envelope));
    }

    // -- Lifecycle requests ---------------------------------------------

    /// Requests `room.end()`: the router transitions the room back to
    /// `waiting`, tears this contract instance down, and emits `room.end`
    /// exactly once after the current hook returns.
    pub fn end(&mut self) {
        self.effects.end_requested = true;
    }

    /// Requests removal of a member after the current hook returns.
    pub fn kick(&mut self, player: &PlayerId) {
        self.effects.kicks.push(player.clone());
    }

    /// Marks session state as changed: the router hands the contract's
    /// `get_data()` snapshot to the persistence collaborator afterwards.
    pub fn save(&mut self) {
        self.effects.dirty = true;
    }

    // -- Achievements ----------------------------------------------------

    /// Stores an arbitrary outcome payload for one player, replacing any
    /// previous value. Retained by the room across rounds.
    pub fn set_achievement(&mut self, player: PlayerId, value: Value) {
        self.room.set_achievement(player, value);
    }

    /// Records a round outcome for every player seat.
    ///
    /// `winners = None` (or empty) records a draw. Each player's retained
    /// record accumulates `wins`/`losses`/`draws` counters and a
    /// `lastRound` tag (`"win"`, `"loss"`, `"draw"`) — enough for
    /// "loser goes first next round" policies without the engine knowing
    /// any game's rules.
    pub fn save_achievements(&mut self, winners: Option<&[PlayerId]>) {
        let winners = winners.unwrap_or(&[]);
        let player_ids: Vec<PlayerId> = self
            .room
            .members()
            .iter()
            .filter(|m| m.role == Role::Player)
            .map(|m| m.id.clone())
            .collect();

        for id in player_ids {
            let outcome = if winners.is_empty() {
                "draw"
            } else if winners.contains(&id) {
                "win"
            } else {
                "loss"
            };

            let mut record = self
                .room
                .achievement(&id)
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let key = match outcome {
                "win" => "wins",
                "loss" => "losses",
                _ => "draws",
            };
            let count = record.get(key).and_then(Value::as_u64).unwrap_or(0);
            record.insert(key.to_string(), json!(count + 1));
            record.insert("lastRound".to_string(), json!(outcome));

            self.room.set_achievement(id, Value::Object(record));
        }
    }

    fn room_sender(&self) -> Sender {
        Sender::Room {
            id: self.room.id.clone(),
            name: self.room.name.clone(),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
