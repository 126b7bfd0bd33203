//! The `GameRoom` trait — the extension point game developers implement.
//!
//! The engine only ever calls through this fixed hook set; everything a
//! concrete game knows (board, turn order, win conditions) is private to
//! its implementation. One instance exists per playing room, created when
//! the room starts and discarded when the round ends.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use parlor_protocol::PlayerId;
use parlor_room::Room;

use crate::{GameError, RoomCtx};

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// The inner payload of a `room.command` envelope: `{type, data}`.
///
/// A second, game-level dispatch layer under the envelope's routing
/// layer. `verb` is the game action (`say`, `status`, `drop`, ...),
/// `data` its opaque argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// The game action name.
    #[serde(rename = "type")]
    pub verb: String,
    /// The action's argument. Missing means `null`.
    #[serde(default)]
    pub data: Value,
}

impl Command {
    /// Parses the `data` field of a `room.command` envelope.
    ///
    /// # Errors
    /// Returns [`GameError::Malformed`] when the payload isn't a
    /// `{type, ...}` object.
    pub fn parse(data: &Value) -> Result<Self, GameError> {
        serde_json::from_value(data.clone())
            .map_err(|e| GameError::Malformed(e.to_string()))
    }

    /// Builds a command with a verb and argument.
    pub fn new(verb: &str, data: Value) -> Self {
        Self { verb: verb.to_string(), data }
    }
}

// ---------------------------------------------------------------------------
// GameRoom
// ---------------------------------------------------------------------------

/// The contract concrete game rules implement to plug into a room.
///
/// Hook call order over a round:
///
/// ```text
/// construct → init → on_start → on_command* → (end requested) → drop
///                        ↑ on_player_offline / on_player_online /
///                          on_offline_timeout interleave as transports
///                          drop and return
/// ```
///
/// Hooks are synchronous and run inside the single router task; anything
/// with an external side effect goes through the [`RoomCtx`] effect
/// queue. `get_status`/`get_data` must not mutate.
pub trait GameRoom: Send + 'static {
    /// Called once right after construction, before any other hook.
    /// Inspect the room (membership, retained achievements) and set up
    /// internal state. Default: nothing.
    fn init(&mut self, _room: &Room) {}

    /// Called when the room transitions to `playing`: reset per-round
    /// state, compute randomized setup, broadcast the initial view.
    fn on_start(&mut self, ctx: &mut RoomCtx<'_>);

    /// Called for every `room.command` addressed to this room while a
    /// round is running. Between rounds the router answers the common
    /// verbs itself, so contracts only ever see commands with live game
    /// state behind them.
    ///
    /// The returned `Ok` payload is delivered to the invoking sender as
    /// the acknowledgment; an `Err` becomes an addressed `{error: ...}`
    /// reply to the sender only — never a broadcast, never the end of the
    /// round.
    ///
    /// The default delegates to [`Self::on_common_command`] and rejects
    /// anything it doesn't cover. Concrete games do the same before
    /// branching on their own verbs:
    ///
    /// ```ignore
    /// fn on_command(&mut self, ctx, sender, cmd) -> Result<Value, GameError> {
    ///     if let Some(reply) = self.on_common_command(ctx, sender, cmd)? {
    ///         return Ok(reply);
    ///     }
    ///     match cmd.verb.as_str() {
    ///         "drop" => self.handle_drop(ctx, sender, &cmd.data),
    ///         other => Err(GameError::UnknownCommand(other.into())),
    ///     }
    /// }
    /// ```
    fn on_command(
        &mut self,
        ctx: &mut RoomCtx<'_>,
        sender: &PlayerId,
        cmd: &Command,
    ) -> Result<Value, GameError> {
        match self.on_common_command(ctx, sender, cmd)? {
            Some(reply) => Ok(reply),
            None => Err(GameError::UnknownCommand(cmd.verb.clone())),
        }
    }

    /// Handles the commands every game shares. Provided:
    ///
    /// - `say` — chat; broadcasts the payload to the room attributed to
    ///   the sender.
    /// - `status` — generic state pull; replies with
    ///   [`Self::get_status`] for the requesting player.
    ///
    /// Returns `Ok(None)` for verbs it doesn't cover so the caller can
    /// branch on game-specific actions.
    fn on_common_command(
        &mut self,
        ctx: &mut RoomCtx<'_>,
        sender: &PlayerId,
        cmd: &Command,
    ) -> Result<Option<Value>, GameError> {
        match cmd.verb.as_str() {
            "say" => {
                ctx.chat(sender, cmd.data.clone());
                Ok(Some(Value::Bool(true)))
            }
            "status" => Ok(Some(self.get_status(ctx.room(), sender))),
            _ => Ok(None),
        }
    }

    /// Produces the requesting player's view of the current state.
    ///
    /// Per-viewer so a game can hide other players' private information
    /// (hidden hands, own dice only). Must be safe at any point —
    /// including immediately after a reconnect — and must not mutate.
    fn get_status(&self, room: &Room, viewer: &PlayerId) -> Value;

    /// Produces the full, viewer-independent snapshot used for
    /// persistence and history. May include everything `get_status`
    /// hides.
    fn get_data(&self) -> Value;

    /// How long the engine should wait after one of this game's players
    /// goes offline before invoking [`Self::on_offline_timeout`].
    ///
    /// `None` (the default) opts out: offline players are tolerated
    /// indefinitely and no forfeiture path runs.
    fn grace_period(&self) -> Option<Duration> {
        None
    }

    /// A member's transport dropped while the round was running.
    /// Default: nothing (the engine schedules the grace timer itself).
    fn on_player_offline(&mut self, _ctx: &mut RoomCtx<'_>, _player: &PlayerId) {}

    /// A member reconnected. The engine separately pushes a fresh
    /// `get_status` to the returning player; use this for game-side
    /// reactions (resume a paused clock, announce the return).
    fn on_player_online(&mut self, _ctx: &mut RoomCtx<'_>, _player: &PlayerId) {}

    /// The grace period elapsed and the player is still offline while the
    /// room is still playing. This is the forfeiture policy hook: declare
    /// a winner, record achievements, `ctx.end()`, `ctx.kick(...)` —
    /// whatever this game's rules say. Runs at most once per offline
    /// episode.
    fn on_offline_timeout(&mut self, _ctx: &mut RoomCtx<'_>, _player: &PlayerId) {}
}

// =========================================================================
// Tests
// =========================================================================
