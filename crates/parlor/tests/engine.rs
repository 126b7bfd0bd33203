//! Integration tests for the engine actor: routing scope, lifecycle,
//! reconnection, and forfeiture.
//!
//! These drive the engine through its handle, with no transport at all —
//! each "connection" is just an outbound channel. That keeps the tests
//! deterministic: awaiting an acknowledgment proves the engine finished
//! processing the frame, including every broadcast it fanned out.

use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;

use parlor::{
    Command, ConnectionId, Engine, EngineConfig, EngineHandle, Envelope,
    GameError, GameRegistry, GameRoom, MessageType, NoopPersistence, PlayerId,
    Room, RoomCtx,
};

// =========================================================================
// Mock game
// =========================================================================

/// A two-player game that answers `ping`, ends on `win`, and forfeits
/// offline players after a configurable grace period.
struct PingPong {
    grace: Option<Duration>,
}

impl GameRoom for PingPong {
    fn on_start(&mut self, ctx: &mut RoomCtx<'_>) {
        ctx.broadcast(
            MessageType::room("message"),
            json!({"event": "round-started"}),
        );
    }

    fn on_command(
        &mut self,
        ctx: &mut RoomCtx<'_>,
        sender: &PlayerId,
        cmd: &Command,
    ) -> Result<Value, GameError> {
        if let Some(reply) = self.on_common_command(ctx, sender, cmd)? {
            return Ok(reply);
        }
        match cmd.verb.as_str() {
            "ping" => {
                ctx.broadcast(MessageType::room("message"), json!({"pong": sender}));
                Ok(json!("pong"))
            }
            "win" => {
                ctx.save_achievements(Some(&[sender.clone()]));
                ctx.end();
                Ok(json!(true))
            }
            other => Err(GameError::UnknownCommand(other.into())),
        }
    }

    fn get_status(&self, room: &Room, viewer: &PlayerId) -> Value {
        json!({"viewer": viewer, "status": room.status.to_string()})
    }

    fn get_data(&self) -> Value {
        json!({})
    }

    fn grace_period(&self) -> Option<Duration> {
        self.grace
    }

    fn on_offline_timeout(&mut self, ctx: &mut RoomCtx<'_>, player: &PlayerId) {
        let winners: Vec<PlayerId> = ctx
            .room()
            .player_ids()
            .into_iter()
            .filter(|p| p != player)
            .collect();
        ctx.save_achievements(Some(&winners));
        ctx.broadcast(
            MessageType::room("message"),
            json!({"event": "forfeit", "id": player}),
        );
        ctx.kick(player);
        ctx.end();
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn start_engine(grace: Option<Duration>) -> EngineHandle {
    let mut games = GameRegistry::new();
    games.register("ping-pong", move |_room| Box::new(PingPong { grace }));
    let (engine, handle) =
        Engine::new(EngineConfig::default(), games, Box::new(NoopPersistence));
    tokio::spawn(engine.run());
    handle
}

async fn call(
    handle: &EngineHandle,
    conn: u64,
    kind: MessageType,
    data: Value,
) -> Result<Value, String> {
    handle
        .call(ConnectionId::new(conn), Envelope::new(kind, data))
        .await
        .expect("engine should be running")
}

/// Joins a player on a fresh connection, returning its outbound channel.
async fn join(
    handle: &EngineHandle,
    conn: u64,
    id: &str,
) -> mpsc::UnboundedReceiver<Envelope> {
    let rx = handle.connect(ConnectionId::new(conn));
    call(
        handle,
        conn,
        MessageType::player("join"),
        json!({"id": id, "name": id}),
    )
    .await
    .expect("join should succeed");
    rx
}

/// Creates a two-seat ping-pong room and returns its id.
async fn create_room(handle: &EngineHandle, conn: u64) -> String {
    let snapshot = call(
        handle,
        conn,
        MessageType::room("create"),
        json!({"name": "table", "attrs": {"type": "ping-pong"}, "minSize": 2, "maxSize": 2}),
    )
    .await
    .expect("create should succeed");
    snapshot["id"].as_str().expect("room id").to_string()
}

async fn enter_room(handle: &EngineHandle, conn: u64, room_id: &str) {
    call(
        handle,
        conn,
        MessageType::room("create"),
        json!({"id": room_id}),
    )
    .await
    .expect("entering an existing room should succeed");
}

async fn ready_and_start(handle: &EngineHandle, conns: &[u64]) {
    for conn in conns {
        call(handle, *conn, MessageType::room("ready"), Value::Null)
            .await
            .expect("ready should succeed");
    }
    call(handle, conns[0], MessageType::room("start"), Value::Null)
        .await
        .expect("start should succeed");
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Envelope>) -> Vec<Envelope> {
    let mut out = Vec::new();
    while let Ok(env) = rx.try_recv() {
        out.push(env);
    }
    out
}

/// Counts drained envelopes whose `data.event` matches.
fn count_events(envelopes: &[Envelope], event: &str) -> usize {
    envelopes
        .iter()
        .filter(|e| e.data.get("event").and_then(Value::as_str) == Some(event))
        .count()
}

// =========================================================================
// Joining & identity
// =========================================================================

#[tokio::test]
async fn test_join_acks_player_record() {
    let handle = start_engine(None);
    let _rx = handle.connect(ConnectionId::new(1));

    let ack = call(
        &handle,
        1,
        MessageType::player("join"),
        json!({"name": "ada"}),
    )
    .await
    .expect("join should succeed");

    assert_eq!(ack["name"], "ada");
    assert_eq!(ack["status"], "online");
    assert_eq!(ack["id"].as_str().unwrap().len(), 32, "generated id");
}

#[tokio::test]
async fn test_frames_before_join_are_rejected() {
    let handle = start_engine(None);
    let _rx = handle.connect(ConnectionId::new(1));

    let err = call(&handle, 1, MessageType::room("create"), json!({}))
        .await
        .unwrap_err();

    assert!(err.contains("player.join"), "got: {err}");
}

#[tokio::test]
async fn test_duplicate_identity_while_online_rejected() {
    let handle = start_engine(None);
    let _a = join(&handle, 1, "ada").await;

    let _rx = handle.connect(ConnectionId::new(2));
    let err = call(
        &handle,
        2,
        MessageType::player("join"),
        json!({"id": "ada", "name": "impostor"}),
    )
    .await
    .unwrap_err();

    assert!(err.contains("already"), "got: {err}");
}

// =========================================================================
// Rooms over the wire
// =========================================================================

#[tokio::test]
async fn test_room_capacity_over_the_wire() {
    let handle = start_engine(None);
    let _a = join(&handle, 1, "a").await;
    let _b = join(&handle, 2, "b").await;
    let _c = join(&handle, 3, "c").await;

    let room_id = create_room(&handle, 1).await;
    enter_room(&handle, 2, &room_id).await;

    // maxSize=2: the third player seat is a rejection.
    let err = call(
        &handle,
        3,
        MessageType::room("create"),
        json!({"id": room_id}),
    )
    .await
    .unwrap_err();
    assert!(err.contains("full"), "got: {err}");

    // The rejection left the third player roomless, so they are free to
    // open their own table.
    let other = create_room(&handle, 3).await;
    assert_ne!(other, room_id);
}

#[tokio::test]
async fn test_start_requires_ready_players() {
    let handle = start_engine(None);
    let _a = join(&handle, 1, "a").await;
    let _b = join(&handle, 2, "b").await;
    let room_id = create_room(&handle, 1).await;
    enter_room(&handle, 2, &room_id).await;

    let err = call(&handle, 1, MessageType::room("start"), Value::Null)
        .await
        .unwrap_err();
    assert!(err.contains("ready"), "got: {err}");

    ready_and_start(&handle, &[1, 2]).await;
}

#[tokio::test]
async fn test_room_command_routing_stays_inside_the_room() {
    let handle = start_engine(None);
    let mut a = join(&handle, 1, "a").await;
    let mut b = join(&handle, 2, "b").await;
    let mut c = join(&handle, 3, "c").await;
    let mut d = join(&handle, 4, "d").await;

    let r1 = create_room(&handle, 1).await;
    enter_room(&handle, 2, &r1).await;
    let r2 = create_room(&handle, 3).await;
    enter_room(&handle, 4, &r2).await;
    ready_and_start(&handle, &[1, 2]).await;

    drain(&mut a);
    drain(&mut b);
    drain(&mut c);
    drain(&mut d);

    let reply = call(
        &handle,
        1,
        MessageType::room("command"),
        json!({"type": "ping"}),
    )
    .await
    .expect("ping should succeed");
    assert_eq!(reply, json!("pong"));

    // Both members of R1 receive the broadcast, including the sender.
    for rx in [&mut a, &mut b] {
        let frames = drain(rx);
        assert!(
            frames.iter().any(|e| e.data.get("pong").is_some()),
            "room member should see the broadcast"
        );
    }
    // Nobody outside R1 does.
    for rx in [&mut c, &mut d] {
        let frames = drain(rx);
        assert!(
            frames.iter().all(|e| e.data.get("pong").is_none()),
            "players outside the room must not see room traffic"
        );
    }
}

#[tokio::test]
async fn test_chat_say_reaches_the_room() {
    let handle = start_engine(None);
    let _a = join(&handle, 1, "a").await;
    let mut b = join(&handle, 2, "b").await;
    let room_id = create_room(&handle, 1).await;
    enter_room(&handle, 2, &room_id).await;
    ready_and_start(&handle, &[1, 2]).await;
    drain(&mut b);

    call(
        &handle,
        1,
        MessageType::room("command"),
        json!({"type": "say", "data": "hi"}),
    )
    .await
    .expect("say should succeed");

    let frames = drain(&mut b);
    let chat = frames
        .iter()
        .find(|e| e.kind.to_string() == "room.message" && e.data == json!("hi"))
        .expect("chat should reach the room");
    // Attributed to the member, not the room.
    assert!(
        matches!(&chat.sender, Some(parlor::Sender::Player { id, .. }) if id.as_str() == "a")
    );
}

#[tokio::test]
async fn test_lobby_commands_work_before_start() {
    let handle = start_engine(None);
    let _a = join(&handle, 1, "a").await;
    let mut b = join(&handle, 2, "b").await;
    let room_id = create_room(&handle, 1).await;
    enter_room(&handle, 2, &room_id).await;
    drain(&mut b);

    // Chat flows while the room is still waiting, attributed to the
    // member.
    call(
        &handle,
        1,
        MessageType::room("command"),
        json!({"type": "say", "data": "ready when you are"}),
    )
    .await
    .expect("lobby chat should succeed");
    let frames = drain(&mut b);
    let chat = frames
        .iter()
        .find(|e| e.kind.to_string() == "room.message" && e.data == json!("ready when you are"))
        .expect("lobby chat should reach the room");
    assert!(
        matches!(&chat.sender, Some(parlor::Sender::Player { id, .. }) if id.as_str() == "a")
    );

    // `status` answers with the room snapshot while no round is running.
    let status = call(
        &handle,
        2,
        MessageType::room("command"),
        json!({"type": "status"}),
    )
    .await
    .expect("lobby status should succeed");
    assert_eq!(status["id"].as_str(), Some(room_id.as_str()));
    assert_eq!(status["status"], "waiting");

    // Game verbs need a running round.
    let err = call(
        &handle,
        1,
        MessageType::room("command"),
        json!({"type": "ping"}),
    )
    .await
    .unwrap_err();
    assert!(err.contains("unknown command"), "got: {err}");
}

// =========================================================================
// End-to-end round with retained achievements
// =========================================================================

#[tokio::test]
async fn test_full_round_retains_achievements() {
    let handle = start_engine(None);
    let mut a = join(&handle, 1, "a").await;
    let _b = join(&handle, 2, "b").await;
    let room_id = create_room(&handle, 1).await;
    enter_room(&handle, 2, &room_id).await;
    ready_and_start(&handle, &[1, 2]).await;

    let frames = drain(&mut a);
    assert_eq!(count_events(&frames, "round-started"), 1);

    call(
        &handle,
        1,
        MessageType::room("command"),
        json!({"type": "win"}),
    )
    .await
    .expect("win should succeed");

    // The round is over: game verbs are rejected until the next start.
    let err = call(
        &handle,
        1,
        MessageType::room("command"),
        json!({"type": "ping"}),
    )
    .await
    .unwrap_err();
    assert!(err.contains("unknown command"), "got: {err}");

    // The room returned to waiting; a fresh ready-up starts round two,
    // and the snapshot carries round one's outcome.
    for conn in [1, 2] {
        call(&handle, conn, MessageType::room("ready"), Value::Null)
            .await
            .unwrap();
    }
    let snapshot = call(&handle, 1, MessageType::room("start"), Value::Null)
        .await
        .expect("second start should succeed");
    assert_eq!(snapshot["status"], "playing");
    assert_eq!(snapshot["achievements"]["a"]["wins"], 1);
    assert_eq!(snapshot["achievements"]["a"]["lastRound"], "win");
    assert_eq!(snapshot["achievements"]["b"]["losses"], 1);
}

// =========================================================================
// Reconnection supervision
// =========================================================================

#[tokio::test]
async fn test_reconnect_within_grace_window_preserves_state() {
    let handle = start_engine(Some(Duration::from_millis(200)));
    let mut a = join(&handle, 1, "a").await;
    let _b = join(&handle, 2, "b").await;
    let room_id = create_room(&handle, 1).await;
    enter_room(&handle, 2, &room_id).await;
    ready_and_start(&handle, &[1, 2]).await;
    drain(&mut a);

    // B's transport drops mid-round.
    handle.disconnect(ConnectionId::new(2));
    tokio::time::sleep(Duration::from_millis(20)).await;

    let frames = drain(&mut a);
    assert_eq!(count_events(&frames, "player-offline"), 1);

    // B reconnects on a new connection before the window elapses.
    let mut b2 = handle.connect(ConnectionId::new(20));
    call(
        &handle,
        20,
        MessageType::player("join"),
        json!({"id": "b", "name": "b"}),
    )
    .await
    .expect("reconnect should succeed");

    // A fresh per-viewer status is pushed to the returning player.
    let frames = drain(&mut b2);
    let status = frames
        .iter()
        .find(|e| e.kind.to_string() == "player.message")
        .expect("reconnect should push a status");
    assert_eq!(status.data["viewer"], "b");
    assert_eq!(status.data["status"], "playing");

    // The grace timer fires into a world where B is back: no forfeiture,
    // the round continues.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let frames = drain(&mut a);
    assert_eq!(count_events(&frames, "forfeit"), 0);
    let reply = call(
        &handle,
        20,
        MessageType::room("command"),
        json!({"type": "ping"}),
    )
    .await
    .expect("round should still be running");
    assert_eq!(reply, json!("pong"));
}

#[tokio::test]
async fn test_second_offline_episode_gets_a_full_grace_window() {
    let handle = start_engine(Some(Duration::from_millis(300)));
    let mut a = join(&handle, 1, "a").await;
    let _b = join(&handle, 2, "b").await;
    let room_id = create_room(&handle, 1).await;
    enter_room(&handle, 2, &room_id).await;
    ready_and_start(&handle, &[1, 2]).await;
    drain(&mut a);

    // A flaky link: drop, come back inside the window...
    handle.disconnect(ConnectionId::new(2));
    tokio::time::sleep(Duration::from_millis(50)).await;
    let _b2 = handle.connect(ConnectionId::new(20));
    call(
        &handle,
        20,
        MessageType::player("join"),
        json!({"id": "b", "name": "b"}),
    )
    .await
    .expect("reconnect should succeed");
    tokio::time::sleep(Duration::from_millis(50)).await;

    // ...and drop again. The second episode's window runs from here.
    handle.disconnect(ConnectionId::new(20));

    // Past the first timer's deadline but well inside the second window:
    // the stale timer must not forfeit.
    tokio::time::sleep(Duration::from_millis(230)).await;
    let frames = drain(&mut a);
    assert_eq!(
        count_events(&frames, "forfeit"),
        0,
        "the first episode's timer cut the second window short"
    );

    // The second window elapsing applies forfeiture, once.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let frames = drain(&mut a);
    assert_eq!(count_events(&frames, "forfeit"), 1);
    let ends = frames
        .iter()
        .filter(|e| e.kind.to_string() == "room.end")
        .count();
    assert_eq!(ends, 1);
}

#[tokio::test]
async fn test_forfeiture_after_grace_window_runs_exactly_once() {
    let handle = start_engine(Some(Duration::from_millis(50)));
    let mut a = join(&handle, 1, "a").await;
    let _b = join(&handle, 2, "b").await;
    let room_id = create_room(&handle, 1).await;
    enter_room(&handle, 2, &room_id).await;
    ready_and_start(&handle, &[1, 2]).await;
    drain(&mut a);

    handle.disconnect(ConnectionId::new(2));
    tokio::time::sleep(Duration::from_millis(200)).await;

    let frames = drain(&mut a);
    assert_eq!(count_events(&frames, "forfeit"), 1);
    // room.end broadcast exactly once.
    let ends = frames
        .iter()
        .filter(|e| e.kind.to_string() == "room.end")
        .count();
    assert_eq!(ends, 1);

    // The contract is gone until the next start; its verbs went with it.
    let err = call(
        &handle,
        1,
        MessageType::room("command"),
        json!({"type": "ping"}),
    )
    .await
    .unwrap_err();
    assert!(err.contains("unknown command"), "got: {err}");

    // The remaining player holds the win.
    let snapshot = call(
        &handle,
        1,
        MessageType::room("ready"),
        Value::Null,
    )
    .await;
    assert!(snapshot.is_ok());
}

#[tokio::test]
async fn test_grace_opt_out_never_forfeits() {
    let handle = start_engine(None);
    let mut a = join(&handle, 1, "a").await;
    let _b = join(&handle, 2, "b").await;
    let room_id = create_room(&handle, 1).await;
    enter_room(&handle, 2, &room_id).await;
    ready_and_start(&handle, &[1, 2]).await;
    drain(&mut a);

    handle.disconnect(ConnectionId::new(2));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let frames = drain(&mut a);
    assert_eq!(count_events(&frames, "player-offline"), 1);
    assert_eq!(count_events(&frames, "forfeit"), 0);

    // Round still running with the player tolerated offline.
    let reply = call(
        &handle,
        1,
        MessageType::room("command"),
        json!({"type": "ping"}),
    )
    .await
    .expect("round should still be running");
    assert_eq!(reply, json!("pong"));
}

// =========================================================================
// Global scope
// =========================================================================

#[tokio::test]
async fn test_global_message_reaches_everyone() {
    let handle = start_engine(None);
    let mut a = join(&handle, 1, "a").await;
    let mut b = join(&handle, 2, "b").await;
    let room_id = create_room(&handle, 1).await;
    let _ = room_id;
    drain(&mut a);
    drain(&mut b);

    call(
        &handle,
        1,
        MessageType::global("message"),
        json!({"announce": "tournament at 8"}),
    )
    .await
    .expect("global message should succeed");

    for rx in [&mut a, &mut b] {
        let frames = drain(rx);
        assert!(
            frames
                .iter()
                .any(|e| e.data.get("announce").is_some()),
            "every connected player should receive global traffic"
        );
    }
}

#[tokio::test]
async fn test_player_message_echoes_to_sender_only() {
    let handle = start_engine(None);
    let mut a = join(&handle, 1, "a").await;
    let mut b = join(&handle, 2, "b").await;
    drain(&mut a);
    drain(&mut b);

    call(
        &handle,
        1,
        MessageType::player("message"),
        json!({"note": "self"}),
    )
    .await
    .unwrap();

    assert!(drain(&mut a).iter().any(|e| e.data.get("note").is_some()));
    assert!(drain(&mut b).iter().all(|e| e.data.get("note").is_none()));
}
