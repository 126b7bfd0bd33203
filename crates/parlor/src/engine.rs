//! The message router: a single actor task owning all session state.
//!
//! Every registry, room, contract instance, and outbound sender lives
//! inside this one task. Connection handlers only decode frames and push
//! them into the engine's channel; grace timers re-enter through the same
//! channel. That gives the cooperative model its guarantee: each inbound
//! frame is processed to completion (mutation, hook invocation, fan-out)
//! before the next one, with no parallel mutation anywhere.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::sync::{mpsc, oneshot};

use parlor_game::{
    Command, Effects, GameError, GameRegistry, GameRoom, Persistence, RoomCtx,
};
use parlor_player::{
    Player, PlayerEvent, PlayerRegistry, PlayerStatus, RegistryError,
};
use parlor_protocol::{
    Envelope, MessageType, PlayerId, ProtocolError, Recipient, RoomId, Scope,
    Sender,
};
use parlor_room::{Role, RoomError, RoomEvent, RoomQuota, RoomRegistry};
use parlor_transport::ConnectionId;

use crate::ParlorError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Engine-level tunables.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// How long a fresh connection gets to send its `player.join`.
    pub handshake_timeout: Duration,
    /// Quota applied to `room.create` payloads that omit limits.
    pub default_quota: RoomQuota,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            default_quota: RoomQuota::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Messages into the engine
// ---------------------------------------------------------------------------

/// Acknowledgment callback: success payload or `{error: reason}` text.
type Ack = oneshot::Sender<Result<Value, String>>;

/// The units of work the engine task processes, in arrival order.
enum EngineMsg {
    /// A transport opened; `outbound` is where its frames go.
    Connected {
        conn: ConnectionId,
        outbound: mpsc::UnboundedSender<Envelope>,
    },
    /// One decoded inbound envelope, with an optional ack callback.
    Frame {
        conn: ConnectionId,
        envelope: Envelope,
        ack: Option<Ack>,
    },
    /// The transport closed.
    Disconnected { conn: ConnectionId },
    /// A grace timer fired for a player that went offline mid-round.
    /// `epoch` names the offline episode that armed it; a timer from an
    /// earlier episode no longer matches and is ignored.
    GraceElapsed {
        room: RoomId,
        player: PlayerId,
        epoch: u64,
    },
}

// ---------------------------------------------------------------------------
// EngineHandle
// ---------------------------------------------------------------------------

/// A cheap clonable handle for feeding the engine.
///
/// Connection handlers use it from their tasks; tests use it to drive the
/// engine without any transport at all.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineMsg>,
}

impl EngineHandle {
    /// Registers a connection and returns the receiver for its outbound
    /// envelopes.
    pub fn connect(&self, conn: ConnectionId) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.tx.send(EngineMsg::Connected { conn, outbound: tx });
        rx
    }

    /// Injects a frame without requesting an acknowledgment.
    pub fn send(&self, conn: ConnectionId, envelope: Envelope) {
        let _ = self.tx.send(EngineMsg::Frame {
            conn,
            envelope,
            ack: None,
        });
    }

    /// Injects a frame and returns a receiver for the acknowledgment, so
    /// the caller can distinguish a failure from a success payload.
    pub fn call(
        &self,
        conn: ConnectionId,
        envelope: Envelope,
    ) -> oneshot::Receiver<Result<Value, String>> {
        let (tx, rx) = oneshot::channel();
        let _ = self.tx.send(EngineMsg::Frame {
            conn,
            envelope,
            ack: Some(tx),
        });
        rx
    }

    /// Announces that a connection's transport closed.
    pub fn disconnect(&self, conn: ConnectionId) {
        let _ = self.tx.send(EngineMsg::Disconnected { conn });
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The engine actor. Construct with [`Engine::new`], then spawn
/// [`Engine::run`] on the runtime and talk to it through the handle.
pub struct Engine {
    inbox: mpsc::UnboundedReceiver<EngineMsg>,
    player_events: mpsc::UnboundedReceiver<PlayerEvent>,
    core: Core,
}

impl Engine {
    /// Builds an engine with the given contract registry and persistence
    /// collaborator.
    pub fn new(
        config: EngineConfig,
        games: GameRegistry,
        persistence: Box<dyn Persistence>,
    ) -> (Self, EngineHandle) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let mut players = PlayerRegistry::new();
        let player_events = players.subscribe();

        let engine = Self {
            inbox,
            player_events,
            core: Core {
                config,
                players,
                rooms: RoomRegistry::new(),
                games,
                contracts: HashMap::new(),
                persistence,
                conn_player: HashMap::new(),
                player_conn: HashMap::new(),
                outbound: HashMap::new(),
                grace_epochs: HashMap::new(),
                tx: tx.clone(),
            },
        };
        (engine, EngineHandle { tx })
    }

    /// Runs the actor loop until every handle is dropped.
    pub async fn run(self) {
        let Self {
            mut inbox,
            mut player_events,
            mut core,
        } = self;
        loop {
            tokio::select! {
                Some(msg) = inbox.recv() => core.handle_msg(msg),
                Some(event) = player_events.recv() => core.on_player_event(event),
                else => break,
            }
        }
        tracing::info!("engine stopped");
    }
}

/// All mutable session state, owned by the actor loop.
struct Core {
    config: EngineConfig,
    players: PlayerRegistry,
    rooms: RoomRegistry,
    games: GameRegistry,
    /// Live contract instances, one per playing room.
    contracts: HashMap<RoomId, Box<dyn GameRoom>>,
    persistence: Box<dyn Persistence>,
    conn_player: HashMap<ConnectionId, PlayerId>,
    player_conn: HashMap<PlayerId, ConnectionId>,
    outbound: HashMap<ConnectionId, mpsc::UnboundedSender<Envelope>>,
    /// Offline-episode counters. Bumped on every disconnect that arms a
    /// timer and on every reconnect, so only the timer belonging to the
    /// current episode can apply forfeiture.
    grace_epochs: HashMap<PlayerId, u64>,
    /// For grace timers re-entering the actor.
    tx: mpsc::UnboundedSender<EngineMsg>,
}

// -- Inbound payload shapes -------------------------------------------------

#[derive(Deserialize)]
struct JoinData {
    id: Option<PlayerId>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    attributes: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoomEntryData {
    /// Join this existing room instead of creating one.
    id: Option<RoomId>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    attrs: Map<String, Value>,
    role: Option<Role>,
    size: Option<usize>,
    min_size: Option<usize>,
    max_size: Option<usize>,
}

impl Core {
    fn handle_msg(&mut self, msg: EngineMsg) {
        match msg {
            EngineMsg::Connected { conn, outbound } => {
                tracing::debug!(%conn, "connection registered");
                self.outbound.insert(conn, outbound);
            }
            EngineMsg::Frame {
                conn,
                envelope,
                ack,
            } => self.handle_frame(conn, envelope, ack),
            EngineMsg::Disconnected { conn } => self.on_disconnected(conn),
            EngineMsg::GraceElapsed { room, player, epoch } => {
                self.on_grace_elapsed(&room, &player, epoch)
            }
        }
    }

    // -- Frame dispatch --------------------------------------------------

    fn handle_frame(&mut self, conn: ConnectionId, env: Envelope, ack: Option<Ack>) {
        let kind = env.kind.clone();
        let req = env.req;
        // Inbound sender claims are discarded; identity comes from the
        // connection binding established at player.join.
        let player = self.conn_player.get(&conn).cloned();

        let result = if kind.scope == Scope::Player && kind.verb == "join" {
            self.on_player_join(conn, &env.data)
        } else {
            match player {
                Some(player) => self.dispatch(&player, &kind, env.data),
                None => Err(ProtocolError::InvalidMessage(
                    "first message must be player.join".into(),
                )
                .into()),
            }
        };

        if let Err(e) = &result {
            tracing::debug!(%conn, kind = %kind, error = %e, "frame rejected");
        }
        self.reply(conn, &kind, req, ack, result.map_err(|e| e.to_string()));
    }

    fn dispatch(
        &mut self,
        player: &PlayerId,
        kind: &MessageType,
        data: Value,
    ) -> Result<Value, ParlorError> {
        match (kind.scope, kind.verb.as_str()) {
            (Scope::Player, "leave") => self.on_player_leave(player),
            (Scope::Player, "ready") => {
                self.players.set_status(player, PlayerStatus::Ready)?;
                Ok(json!(true))
            }
            (Scope::Player, "unready") => {
                self.players.set_status(player, PlayerStatus::Unready)?;
                Ok(json!(true))
            }
            (Scope::Player, "command" | "message") => {
                self.echo_to_sender(player, kind, data)
            }
            (Scope::Room, "create") => self.on_room_create(player, &data),
            (Scope::Room, "ready") => self.on_room_ready(player, &data),
            (Scope::Room, "start") => self.on_room_start(player),
            (Scope::Room, "end") => self.on_room_end(player),
            (Scope::Room, "close") => self.on_room_close(player),
            (Scope::Room, "command") => self.on_room_command(player, &data),
            (Scope::Room, "message") => self.on_room_message(player, data),
            (Scope::Global, "command" | "message") => {
                self.on_global(player, kind, data)
            }
            _ => Err(ProtocolError::InvalidMessage(format!(
                "unknown operation: {kind}"
            ))
            .into()),
        }
    }

    /// Resolves the acknowledgment: success payloads go back over the
    /// wire only when the client asked for correlation via `req`; errors
    /// always become an addressed `global.error` reply.
    fn reply(
        &self,
        conn: ConnectionId,
        kind: &MessageType,
        req: Option<u64>,
        ack: Option<Ack>,
        result: Result<Value, String>,
    ) {
        if let Some(ack) = ack {
            let _ = ack.send(result.clone());
        }
        match result {
            Ok(value) => {
                if let Some(req) = req {
                    let env = Envelope::new(kind.clone(), value).with_req(req);
                    self.send_to_conn(conn, env);
                }
            }
            Err(reason) => {
                let mut env = Envelope::error(&reason);
                if let Some(req) = req {
                    env = env.with_req(req);
                }
                self.send_to_conn(conn, env);
            }
        }
    }

    // -- player.* --------------------------------------------------------

    fn on_player_join(
        &mut self,
        conn: ConnectionId,
        data: &Value,
    ) -> Result<Value, ParlorError> {
        if self.conn_player.contains_key(&conn) {
            return Err(ProtocolError::InvalidMessage(
                "connection already joined".into(),
            )
            .into());
        }
        let join: JoinData = serde_json::from_value(data.clone()).map_err(|e| {
            ProtocolError::InvalidMessage(format!("bad join payload: {e}"))
        })?;

        if let Some(id) = &join.id {
            if self.players.get(id).is_some() {
                // Same identity, open transport: a second login is a
                // rejection, not a takeover.
                if self.player_conn.contains_key(id) {
                    return Err(RegistryError::DuplicateIdentity(id.clone()).into());
                }
                return self.on_reconnect(conn, id.clone());
            }
        }

        let player = self
            .players
            .create(join.id, &join.name, join.attributes)?
            .clone();
        self.bind(conn, player.id.clone());
        tracing::info!(%conn, player_id = %player.id, "player joined");
        Ok(serde_json::to_value(&player).map_err(ProtocolError::Encode)?)
    }

    fn on_reconnect(
        &mut self,
        conn: ConnectionId,
        id: PlayerId,
    ) -> Result<Value, ParlorError> {
        self.bind(conn, id.clone());
        // Strand any timer armed by the previous offline episode.
        if let Some(epoch) = self.grace_epochs.get_mut(&id) {
            *epoch += 1;
        }

        let room_id = self.rooms.room_of(&id).cloned();
        let status = match &room_id {
            Some(rid) if self.contracts.contains_key(rid) => PlayerStatus::Playing,
            _ => PlayerStatus::Online,
        };
        self.players.set_status(&id, status)?;

        if let Some(room_id) = room_id {
            if let Some(room) = self.rooms.get_mut(&room_id) {
                if let Ok(events) = room.set_online(&id, true) {
                    self.fan_out(&room_id, events);
                }
            }
            let returning = id.clone();
            self.run_hook(&room_id, move |game, ctx| {
                game.on_player_online(ctx, &returning)
            });
            // Resync is pull-shaped: a fresh per-viewer status, not a
            // replay of missed frames.
            self.push_status(&room_id, &id);
        }

        tracing::info!(%conn, player_id = %id, "player reconnected");
        let player = self
            .players
            .get(&id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        Ok(serde_json::to_value(player).map_err(ProtocolError::Encode)?)
    }

    fn on_player_leave(&mut self, player: &PlayerId) -> Result<Value, ParlorError> {
        self.leave_room(player);
        self.players.remove(player)?;
        if let Some(conn) = self.player_conn.remove(player) {
            self.conn_player.remove(&conn);
        }
        Ok(json!(true))
    }

    /// `player.command` / `player.message`: delivered only to the
    /// sender's own connection.
    fn echo_to_sender(
        &mut self,
        player: &PlayerId,
        kind: &MessageType,
        data: Value,
    ) -> Result<Value, ParlorError> {
        let env = Envelope::new(kind.clone(), data)
            .with_sender(self.player_sender(player)?);
        self.send_to_player(player, env);
        Ok(json!(true))
    }

    // -- room.* ----------------------------------------------------------

    fn on_room_create(
        &mut self,
        player: &PlayerId,
        data: &Value,
    ) -> Result<Value, ParlorError> {
        let entry: RoomEntryData =
            serde_json::from_value(data.clone()).map_err(|e| {
                ProtocolError::InvalidMessage(format!("bad room payload: {e}"))
            })?;
        if let Some(current) = self.rooms.room_of(player) {
            return Err(
                RoomError::AlreadyInRoom(player.clone(), current.clone()).into()
            );
        }
        let player_name = self
            .players
            .get(player)
            .map(|p| p.name.clone())
            .ok_or_else(|| RegistryError::NotFound(player.clone()))?;

        let room_id = match entry.id {
            // `{id: ...}` enters an existing room.
            Some(id) => {
                if self.rooms.get(&id).is_none() {
                    return Err(RoomError::NotFound(id).into());
                }
                id
            }
            None => {
                let base = self.config.default_quota;
                let quota = RoomQuota {
                    size: entry.size.unwrap_or(base.size),
                    min_players: entry.min_size.unwrap_or(base.min_players),
                    max_players: entry.max_size.unwrap_or(base.max_players),
                };
                self.rooms.create(&entry.name, entry.attrs, quota).id.clone()
            }
        };

        let role = entry.role.unwrap_or(Role::Player);
        let events = self.rooms.join(&room_id, player.clone(), &player_name, role)?;
        self.fan_out(&room_id, events);

        let room = self
            .rooms
            .get(&room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
        Ok(serde_json::to_value(room).map_err(ProtocolError::Encode)?)
    }

    fn on_room_ready(
        &mut self,
        player: &PlayerId,
        data: &Value,
    ) -> Result<Value, ParlorError> {
        // `{ready: false}` unreadies; anything else readies.
        let ready = data.get("ready").and_then(Value::as_bool).unwrap_or(true);
        let room_id = self.current_room(player)?;
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
        let events = if ready {
            room.ready(player)?
        } else {
            room.unready(player)?
        };
        self.fan_out(&room_id, events);
        Ok(json!(true))
    }

    fn on_room_start(&mut self, player: &PlayerId) -> Result<Value, ParlorError> {
        let room_id = self.current_room(player)?;

        // Instantiate before transitioning so an unknown game type leaves
        // the room in `waiting`.
        let contract = {
            let room = self
                .rooms
                .get(&room_id)
                .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
            self.games.instantiate(room)?
        };
        let events = self
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?
            .start()?;
        self.contracts.insert(room_id.clone(), contract);
        self.fan_out(&room_id, events);
        self.run_hook(&room_id, |game, ctx| game.on_start(ctx));

        let room = self
            .rooms
            .get(&room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
        Ok(serde_json::to_value(room).map_err(ProtocolError::Encode)?)
    }

    fn on_room_end(&mut self, player: &PlayerId) -> Result<Value, ParlorError> {
        let room_id = self.current_room(player)?;
        let events = self
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?
            .end()?;
        self.contracts.remove(&room_id);
        self.fan_out(&room_id, events);
        Ok(json!(true))
    }

    fn on_room_close(&mut self, player: &PlayerId) -> Result<Value, ParlorError> {
        let room_id = self.current_room(player)?;
        let events = self
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?
            .close();
        // Broadcast while the membership list still exists.
        self.fan_out(&room_id, events);
        self.contracts.remove(&room_id);
        self.rooms.destroy(&room_id)?;
        Ok(json!(true))
    }

    fn on_room_command(
        &mut self,
        player: &PlayerId,
        data: &Value,
    ) -> Result<Value, ParlorError> {
        let room_id = self.current_room(player)?;
        let cmd = Command::parse(data)?;

        if !self.contracts.contains_key(&room_id) {
            return self.on_lobby_command(player, &room_id, &cmd);
        }
        let sender = player.clone();
        match self.run_hook(&room_id, move |game, ctx| {
            game.on_command(ctx, &sender, &cmd)
        }) {
            Some(Ok(value)) => Ok(value),
            Some(Err(e)) => Err(e.into()),
            None => Err(RoomError::InvalidState("no round in progress".into()).into()),
        }
    }

    /// Commands sent between rounds. The common verbs stay alive without
    /// a contract instance: `say` still chats, `status` answers with the
    /// room snapshot (there is no game state to view yet). Game verbs
    /// wait for the next start.
    fn on_lobby_command(
        &self,
        player: &PlayerId,
        room_id: &RoomId,
        cmd: &Command,
    ) -> Result<Value, ParlorError> {
        match cmd.verb.as_str() {
            "say" => {
                let env =
                    Envelope::new(MessageType::room("message"), cmd.data.clone())
                        .with_sender(self.player_sender(player)?);
                self.deliver(&Recipient::Room(room_id.clone()), env);
                Ok(json!(true))
            }
            "status" => {
                let room = self
                    .rooms
                    .get(room_id)
                    .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
                Ok(serde_json::to_value(room).map_err(ProtocolError::Encode)?)
            }
            other => Err(GameError::UnknownCommand(other.to_string()).into()),
        }
    }

    fn on_room_message(
        &mut self,
        player: &PlayerId,
        data: Value,
    ) -> Result<Value, ParlorError> {
        let room_id = self.current_room(player)?;
        let env = Envelope::new(MessageType::room("message"), data)
            .with_sender(self.player_sender(player)?);
        self.deliver(&Recipient::Room(room_id), env);
        Ok(json!(true))
    }

    // -- global.* --------------------------------------------------------

    fn on_global(
        &mut self,
        player: &PlayerId,
        kind: &MessageType,
        data: Value,
    ) -> Result<Value, ParlorError> {
        let env = Envelope::new(kind.clone(), data)
            .with_sender(self.player_sender(player)?);
        self.deliver(&Recipient::All, env);
        Ok(json!(true))
    }

    // -- Connection lifecycle -------------------------------------------

    fn on_disconnected(&mut self, conn: ConnectionId) {
        self.outbound.remove(&conn);
        let Some(player) = self.conn_player.remove(&conn) else {
            return;
        };
        self.player_conn.remove(&player);
        tracing::info!(%conn, player_id = %player, "player offline");

        // The identity survives: reconnection is just player.join with
        // the same id.
        let _ = self.players.set_status(&player, PlayerStatus::Offline);

        let Some(room_id) = self.rooms.room_of(&player).cloned() else {
            return;
        };
        if let Some(room) = self.rooms.get_mut(&room_id) {
            if let Ok(events) = room.set_online(&player, false) {
                self.fan_out(&room_id, events);
            }
        }
        let offline = player.clone();
        self.run_hook(&room_id, move |game, ctx| {
            game.on_player_offline(ctx, &offline)
        });

        // Grace supervision only matters mid-round, and only if the
        // contract opted in.
        if !self
            .rooms
            .get(&room_id)
            .is_some_and(|r| r.status.is_playing())
        {
            return;
        }
        let Some(grace) = self
            .contracts
            .get(&room_id)
            .and_then(|game| game.grace_period())
        else {
            return;
        };

        tracing::debug!(
            room_id = %room_id,
            player_id = %player,
            grace_ms = grace.as_millis() as u64,
            "grace timer armed"
        );
        let epoch = {
            let slot = self.grace_epochs.entry(player.clone()).or_insert(0);
            *slot += 1;
            *slot
        };
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = tx.send(EngineMsg::GraceElapsed {
                room: room_id,
                player,
                epoch,
            });
        });
    }

    fn on_grace_elapsed(&mut self, room_id: &RoomId, player: &PlayerId, epoch: u64) {
        // Implicit cancellation: the timer always fires, the consequence
        // is skipped when the world moved on. The epoch check covers the
        // case the state checks below cannot see: the player came back
        // and dropped again, so a newer timer owns the current episode
        // and this one must not cut its window short.
        if self.grace_epochs.get(player) != Some(&epoch) {
            return;
        }
        let Some(room) = self.rooms.get(room_id) else {
            return;
        };
        if !room.status.is_playing()
            || room.member(player).is_none()
            || room.is_player_online(player)
        {
            return;
        }

        tracing::info!(
            %room_id,
            player_id = %player,
            "grace period elapsed, applying forfeiture policy"
        );
        let gone = player.clone();
        self.run_hook(room_id, move |game, ctx| {
            game.on_offline_timeout(ctx, &gone)
        });
    }

    // -- Registry events -------------------------------------------------

    /// Any registry transition refreshes the global player list.
    fn on_player_event(&mut self, _event: PlayerEvent) {
        let players: Vec<&Player> = self.players.players().collect();
        let Ok(list) = serde_json::to_value(&players) else {
            return;
        };
        self.deliver(
            &Recipient::All,
            Envelope::new(MessageType::global("message"), json!({ "players": list })),
        );
    }

    // -- Contract hooks --------------------------------------------------

    /// Runs one contract hook with the room borrowed into a [`RoomCtx`],
    /// then applies the queued effects: outbox fan-out, kicks, requested
    /// end-of-round, persistence. Returns `None` when the room has no
    /// live contract.
    fn run_hook<R>(
        &mut self,
        room_id: &RoomId,
        hook: impl FnOnce(&mut dyn GameRoom, &mut RoomCtx<'_>) -> R,
    ) -> Option<R> {
        let mut contract = self.contracts.remove(room_id)?;
        let mut effects = Effects::new();

        let result = {
            let room = self.rooms.get_mut(room_id)?;
            let mut ctx = RoomCtx::new(room, &mut effects);
            hook(contract.as_mut(), &mut ctx)
        };

        for (recipient, env) in std::mem::take(&mut effects.outbox) {
            self.deliver(&recipient, env);
        }
        for kicked in std::mem::take(&mut effects.kicks) {
            if self.rooms.room_of(&kicked) == Some(room_id) {
                self.leave_room(&kicked);
            }
        }
        if effects.end_requested {
            if let Some(room) = self.rooms.get_mut(room_id) {
                match room.end() {
                    Ok(events) => self.fan_out(room_id, events),
                    Err(e) => {
                        tracing::debug!(%room_id, error = %e, "end request ignored")
                    }
                }
            }
        }
        if effects.dirty {
            self.persistence.persist(room_id, contract.get_data());
        }
        // The contract instance lives exactly as long as the round.
        if !effects.end_requested && self.rooms.get(room_id).is_some() {
            self.contracts.insert(room_id.clone(), contract);
        }
        Some(result)
    }

    /// Pushes a fresh per-viewer status to one player (`player.message`).
    fn push_status(&self, room_id: &RoomId, player: &PlayerId) {
        let (Some(contract), Some(room)) =
            (self.contracts.get(room_id), self.rooms.get(room_id))
        else {
            return;
        };
        let status = contract.get_status(room, player);
        let env = Envelope::new(MessageType::player("message"), status).with_sender(
            Sender::Room {
                id: room.id.clone(),
                name: room.name.clone(),
            },
        );
        self.send_to_player(player, env);
    }

    // -- Room event fan-out ---------------------------------------------

    /// Turns room events into broadcast envelopes for the room's current
    /// members, appending one snapshot broadcast after membership or
    /// lifecycle changes so clients keep a consistent view.
    fn fan_out(&mut self, room_id: &RoomId, events: Vec<RoomEvent>) {
        if events.is_empty() {
            return;
        }
        let mut out = Vec::with_capacity(events.len() + 1);
        let mut snapshot = false;
        let mut started = None;
        let mut ended = false;
        {
            let Some(room) = self.rooms.get(room_id) else {
                return;
            };
            let sender = Sender::Room {
                id: room.id.clone(),
                name: room.name.clone(),
            };
            for event in &events {
                let env = match event {
                    RoomEvent::Join(member) => {
                        snapshot = true;
                        Envelope::new(
                            MessageType::room("join"),
                            json!({ "player": member }),
                        )
                    }
                    RoomEvent::Leave(id) => {
                        snapshot = true;
                        Envelope::new(MessageType::room("leave"), json!({ "id": id }))
                    }
                    RoomEvent::PlayerReady(id) => Envelope::new(
                        MessageType::room("ready"),
                        json!({ "id": id, "ready": true }),
                    ),
                    RoomEvent::PlayerUnready(id) => Envelope::new(
                        MessageType::room("ready"),
                        json!({ "id": id, "ready": false }),
                    ),
                    RoomEvent::AllReady => {
                        Envelope::new(MessageType::room("allready"), Value::Null)
                    }
                    RoomEvent::Started => {
                        snapshot = true;
                        started = Some(room.player_ids());
                        Envelope::new(MessageType::room("start"), Value::Null)
                    }
                    RoomEvent::Ended => {
                        snapshot = true;
                        ended = true;
                        Envelope::new(MessageType::room("end"), Value::Null)
                    }
                    RoomEvent::Closed => {
                        Envelope::new(MessageType::room("close"), Value::Null)
                    }
                    RoomEvent::PlayerOffline(id) => Envelope::new(
                        MessageType::room("message"),
                        json!({ "event": "player-offline", "id": id }),
                    ),
                    RoomEvent::PlayerOnline(id) => Envelope::new(
                        MessageType::room("message"),
                        json!({ "event": "player-online", "id": id }),
                    ),
                };
                out.push(env.with_sender(sender.clone()));
            }
            if snapshot {
                if let Ok(v) = serde_json::to_value(room) {
                    out.push(
                        Envelope::new(
                            MessageType::room("message"),
                            json!({ "room": v }),
                        )
                        .with_sender(sender),
                    );
                }
            }
        }
        for env in out {
            self.deliver(&Recipient::Room(room_id.clone()), env);
        }

        // Lobby-level status tracks the round.
        if let Some(ids) = started {
            for id in ids {
                let _ = self.players.set_status(&id, PlayerStatus::Playing);
            }
        }
        if ended {
            let ids = self
                .rooms
                .get(room_id)
                .map(|r| r.player_ids())
                .unwrap_or_default();
            for id in ids {
                let _ = self.players.set_status(&id, PlayerStatus::Online);
            }
        }
    }

    // -- Shared plumbing -------------------------------------------------

    fn bind(&mut self, conn: ConnectionId, player: PlayerId) {
        self.conn_player.insert(conn, player.clone());
        self.player_conn.insert(player, conn);
    }

    fn current_room(&self, player: &PlayerId) -> Result<RoomId, RoomError> {
        self.rooms
            .room_of(player)
            .cloned()
            .ok_or_else(|| RoomError::NotInAnyRoom(player.clone()))
    }

    fn player_sender(&self, player: &PlayerId) -> Result<Sender, ParlorError> {
        let record = self
            .players
            .get(player)
            .ok_or_else(|| RegistryError::NotFound(player.clone()))?;
        Ok(Sender::Player {
            id: record.id.clone(),
            name: record.name.clone(),
        })
    }

    /// Removes a player from their room, destroying the room once the
    /// last member is gone.
    fn leave_room(&mut self, player: &PlayerId) {
        let Ok((room_id, events, empty)) = self.rooms.leave(player) else {
            return;
        };
        self.fan_out(&room_id, events);
        if empty {
            self.contracts.remove(&room_id);
            if let Ok(room) = self.rooms.destroy(&room_id) {
                tracing::debug!(room_id = %room.id, "empty room destroyed");
            }
        }
    }

    /// Best-effort outbound delivery: closed transports drop frames.
    fn deliver(&self, recipient: &Recipient, envelope: Envelope) {
        match recipient {
            Recipient::Player(id) => self.send_to_player(id, envelope),
            Recipient::Room(room_id) => {
                let Some(room) = self.rooms.get(room_id) else {
                    return;
                };
                for id in room.member_ids() {
                    self.send_to_player(&id, envelope.clone());
                }
            }
            Recipient::All => {
                for conn in self.player_conn.values() {
                    self.send_to_conn(*conn, envelope.clone());
                }
            }
        }
    }

    fn send_to_player(&self, id: &PlayerId, envelope: Envelope) {
        if let Some(conn) = self.player_conn.get(id) {
            self.send_to_conn(*conn, envelope);
        }
    }

    fn send_to_conn(&self, conn: ConnectionId, envelope: Envelope) {
        if let Some(tx) = self.outbound.get(&conn) {
            let _ = tx.send(envelope);
        }
    }
}
