//! Four-in-a-row (Connect Four) on the Parlor engine.
//!
//! Two players drop discs into a 7x6 grid; the first to line up four in
//! any direction wins. Demonstrates the full contract surface: turn
//! validation, win/draw detection, retained achievements with a
//! loser-goes-first rematch policy, and forfeiture when a player stays
//! offline past the grace period.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};

use parlor::{
    Command, GameError, GameRegistry, GameRoom, ParlorServer, PlayerId, Room,
    RoomCtx,
};

const COLS: usize = 7;
const ROWS: usize = 6;
const CONNECT: usize = 4;

/// How long a mid-round disconnect is tolerated before forfeiture.
const GRACE: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Game types
// ---------------------------------------------------------------------------

/// One grid cell: empty, or a seat index into `seats`.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Cell {
    Empty,
    Seat(usize),
}

#[derive(Deserialize)]
struct DropData {
    col: usize,
}

struct FourInARow {
    /// `board[row][col]`, row 0 at the bottom.
    board: [[Cell; COLS]; ROWS],
    /// Play order for the current round, fixed at `on_start`.
    seats: Vec<PlayerId>,
    /// Index into `seats` of the player to move.
    turn: usize,
    over: bool,
}

impl FourInARow {
    fn new() -> Self {
        Self {
            board: [[Cell::Empty; COLS]; ROWS],
            seats: Vec::new(),
            turn: 0,
            over: false,
        }
    }

    fn current(&self) -> Option<&PlayerId> {
        if self.over { None } else { self.seats.get(self.turn) }
    }

    fn board_value(&self) -> Value {
        let rows: Vec<Value> = self
            .board
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| match cell {
                        Cell::Empty => Value::Null,
                        Cell::Seat(s) => json!(s),
                    })
                    .collect()
            })
            .collect();
        Value::Array(rows)
    }

    fn handle_drop(
        &mut self,
        ctx: &mut RoomCtx<'_>,
        sender: &PlayerId,
        data: &Value,
    ) -> Result<Value, GameError> {
        if self.over {
            return Err(GameError::Rejected("round is over".into()));
        }
        let seat = self
            .seats
            .iter()
            .position(|id| id == sender)
            .ok_or_else(|| GameError::Rejected("watchers cannot play".into()))?;
        if seat != self.turn {
            return Err(GameError::Rejected("not your turn".into()));
        }
        let DropData { col } = serde_json::from_value(data.clone())
            .map_err(|e| GameError::Malformed(e.to_string()))?;
        if col >= COLS {
            return Err(GameError::Rejected(format!(
                "col must be 0-{}",
                COLS - 1
            )));
        }
        let Some(row) = (0..ROWS).find(|&r| self.board[r][col] == Cell::Empty)
        else {
            return Err(GameError::Rejected("column is full".into()));
        };

        self.board[row][col] = Cell::Seat(seat);
        self.turn = (self.turn + 1) % self.seats.len();
        ctx.save();

        ctx.broadcast(
            parlor::MessageType::room("message"),
            json!({
                "event": "move",
                "id": sender,
                "col": col,
                "row": row,
                "turn": self.current(),
            }),
        );

        if wins(&self.board, row, col) {
            self.over = true;
            let winner = sender.clone();
            ctx.save_achievements(Some(std::slice::from_ref(&winner)));
            ctx.broadcast(
                parlor::MessageType::room("message"),
                json!({"event": "game-over", "winner": winner}),
            );
            ctx.end();
        } else if board_full(&self.board) {
            self.over = true;
            ctx.save_achievements(None);
            ctx.broadcast(
                parlor::MessageType::room("message"),
                json!({"event": "game-over", "winner": Value::Null}),
            );
            ctx.end();
        }

        Ok(json!({"row": row, "col": col}))
    }
}

impl GameRoom for FourInARow {
    fn on_start(&mut self, ctx: &mut RoomCtx<'_>) {
        self.board = [[Cell::Empty; COLS]; ROWS];
        self.over = false;
        self.turn = 0;
        self.seats = ctx.room().player_ids();

        // Rematch policy: whoever lost the previous round moves first.
        if let Some(loser) = self.seats.iter().position(|id| {
            ctx.room()
                .achievement(id)
                .is_some_and(|a| a["lastRound"] == "loss")
        }) {
            self.seats.rotate_left(loser);
        }

        ctx.broadcast(
            parlor::MessageType::room("message"),
            json!({
                "event": "round-started",
                "seats": self.seats,
                "turn": self.current(),
            }),
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
            "drop" => self.handle_drop(ctx, sender, &cmd.data),
            other => Err(GameError::UnknownCommand(other.into())),
        }
    }

    fn get_status(&self, _room: &Room, _viewer: &PlayerId) -> Value {
        // Nothing is hidden in this game: everyone sees the same board.
        json!({
            "board": self.board_value(),
            "seats": self.seats,
            "turn": self.current(),
            "over": self.over,
        })
    }

    fn get_data(&self) -> Value {
        json!({
            "board": self.board_value(),
            "seats": self.seats,
            "turn": self.turn,
            "over": self.over,
        })
    }

    fn grace_period(&self) -> Option<Duration> {
        Some(GRACE)
    }

    fn on_offline_timeout(&mut self, ctx: &mut RoomCtx<'_>, player: &PlayerId) {
        self.over = true;
        let winners: Vec<PlayerId> = self
            .seats
            .iter()
            .filter(|id| *id != player)
            .cloned()
            .collect();
        ctx.save_achievements(Some(&winners));
        ctx.broadcast(
            parlor::MessageType::room("message"),
            json!({
                "event": "forfeit",
                "id": player,
                "winner": winners.first(),
            }),
        );
        ctx.kick(player);
        ctx.end();
    }
}

// ---------------------------------------------------------------------------
// Board checks
// ---------------------------------------------------------------------------

/// Did the disc just placed at (row, col) complete a line of four?
fn wins(board: &[[Cell; COLS]; ROWS], row: usize, col: usize) -> bool {
    let who = board[row][col];
    if who == Cell::Empty {
        return false;
    }
    // Count outwards from the placed disc in both halves of each axis.
    [(0i32, 1i32), (1, 0), (1, 1), (1, -1)].iter().any(|&(dr, dc)| {
        let mut run = 1;
        for sign in [1i32, -1] {
            let (mut r, mut c) = (row as i32, col as i32);
            loop {
                r += dr * sign;
                c += dc * sign;
                if r < 0 || r >= ROWS as i32 || c < 0 || c >= COLS as i32 {
                    break;
                }
                if board[r as usize][c as usize] != who {
                    break;
                }
                run += 1;
            }
        }
        run >= CONNECT
    })
}

fn board_full(board: &[[Cell; COLS]; ROWS]) -> bool {
    board[ROWS - 1].iter().all(|c| *c != Cell::Empty)
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut games = GameRegistry::new();
    games.register("four-in-a-row", |_room| Box::new(FourInARow::new()));

    let server = ParlorServer::builder()
        .bind("0.0.0.0:8080")
        .build(games)
        .await?;
    tracing::info!(addr = %server.local_addr()?, "four-in-a-row server listening");
    server.run().await?;
    Ok(())
}

// ---------------------------------------------------------------
// Unit tests — deterministic, no network: the contract is driven
// through RoomCtx directly.
// ---------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use parlor::{Effects, Role, RoomId, RoomQuota};
    use serde_json::Map;

    fn pid(id: &str) -> PlayerId {
        PlayerId::from(id)
    }

    fn room() -> Room {
        let mut attrs = Map::new();
        attrs.insert("type".into(), json!("four-in-a-row"));
        let mut room = Room::new(
            RoomId::from("r1"),
            "table",
            attrs,
            RoomQuota { size: 4, min_players: 2, max_players: 2 },
        );
        room.add_player(pid("a"), "a", Role::Player).unwrap();
        room.add_player(pid("b"), "b", Role::Player).unwrap();
        room.ready(&pid("a")).unwrap();
        room.ready(&pid("b")).unwrap();
        room.start().unwrap();
        room
    }

    fn started() -> (FourInARow, Room) {
        let mut game = FourInARow::new();
        let mut room = room();
        let mut fx = Effects::new();
        game.on_start(&mut RoomCtx::new(&mut room, &mut fx));
        (game, room)
    }

    fn drop_disc(
        game: &mut FourInARow,
        room: &mut Room,
        who: &str,
        col: usize,
    ) -> Result<Value, GameError> {
        let mut fx = Effects::new();
        let mut ctx = RoomCtx::new(room, &mut fx);
        game.on_command(&mut ctx, &pid(who), &Command::new("drop", json!({"col": col})))
    }

    #[test]
    fn test_disc_lands_at_bottom_then_stacks() {
        let (mut game, mut room) = started();

        let reply = drop_disc(&mut game, &mut room, "a", 3).unwrap();
        assert_eq!(reply, json!({"row": 0, "col": 3}));

        let reply = drop_disc(&mut game, &mut room, "b", 3).unwrap();
        assert_eq!(reply, json!({"row": 1, "col": 3}));
    }

    #[test]
    fn test_wrong_turn_rejected() {
        let (mut game, mut room) = started();

        let err = drop_disc(&mut game, &mut room, "b", 0).unwrap_err();
        assert!(err.to_string().contains("not your turn"));

        // A rejection never advances the turn.
        assert!(drop_disc(&mut game, &mut room, "a", 0).is_ok());
    }

    #[test]
    fn test_out_of_range_column_rejected() {
        let (mut game, mut room) = started();
        let err = drop_disc(&mut game, &mut room, "a", COLS).unwrap_err();
        assert!(err.to_string().contains("0-6"));
    }

    #[test]
    fn test_full_column_rejected() {
        let (mut game, mut room) = started();
        // Both seats stack column 0: a takes rows 0/2/4, b takes rows
        // 1/3/5, so no one gets four in a row before it fills.
        for _ in 0..3 {
            drop_disc(&mut game, &mut room, "a", 0).unwrap();
            drop_disc(&mut game, &mut room, "b", 0).unwrap();
        }
        let err = drop_disc(&mut game, &mut room, "a", 0).unwrap_err();
        assert!(err.to_string().contains("column is full"));
    }

    #[test]
    fn test_watcher_cannot_play() {
        let (mut game, mut room) = started();
        room.add_player(pid("w"), "w", Role::Watcher).unwrap();
        let err = drop_disc(&mut game, &mut room, "w", 0).unwrap_err();
        assert!(err.to_string().contains("watchers"));
    }

    #[test]
    fn test_vertical_win_records_achievements_and_ends() {
        let (mut game, mut room) = started();

        // a stacks col 0, b stacks col 1; a's fourth disc wins.
        for _ in 0..3 {
            drop_disc(&mut game, &mut room, "a", 0).unwrap();
            drop_disc(&mut game, &mut room, "b", 1).unwrap();
        }
        let mut fx = Effects::new();
        let mut ctx = RoomCtx::new(&mut room, &mut fx);
        game.on_command(&mut ctx, &pid("a"), &Command::new("drop", json!({"col": 0})))
            .unwrap();

        assert!(fx.end_requested);
        assert!(fx.dirty);
        assert!(
            fx.outbox
                .iter()
                .any(|(_, e)| e.data["event"] == "game-over"
                    && e.data["winner"] == "a")
        );
        assert_eq!(room.achievement(&pid("a")).unwrap()["wins"], 1);
        assert_eq!(room.achievement(&pid("b")).unwrap()["losses"], 1);
    }

    #[test]
    fn test_horizontal_win() {
        let (mut game, mut room) = started();
        // a plays cols 0..3 along the bottom row; b stacks col 6.
        for col in 0..3 {
            drop_disc(&mut game, &mut room, "a", col).unwrap();
            drop_disc(&mut game, &mut room, "b", 6).unwrap();
        }
        drop_disc(&mut game, &mut room, "a", 3).unwrap();
        assert!(game.over);
    }

    #[test]
    fn test_diagonal_win() {
        let (mut game, mut room) = started();
        // Build a staircase for a: (0,0) (1,1) (2,2) (3,3).
        drop_disc(&mut game, &mut room, "a", 0).unwrap();
        drop_disc(&mut game, &mut room, "b", 1).unwrap();
        drop_disc(&mut game, &mut room, "a", 1).unwrap();
        drop_disc(&mut game, &mut room, "b", 2).unwrap();
        drop_disc(&mut game, &mut room, "a", 2).unwrap();
        drop_disc(&mut game, &mut room, "b", 3).unwrap();
        drop_disc(&mut game, &mut room, "a", 2).unwrap();
        drop_disc(&mut game, &mut room, "b", 3).unwrap();
        drop_disc(&mut game, &mut room, "a", 3).unwrap();
        drop_disc(&mut game, &mut room, "b", 6).unwrap();
        drop_disc(&mut game, &mut room, "a", 3).unwrap();
        assert!(game.over, "four on the rising diagonal");
    }

    #[test]
    fn test_draw_when_board_fills_without_a_line() {
        let (mut game, mut room) = started();
        // Fill everything but the top of column 6 with a known drawn
        // pattern: cell(r, c) belongs to seat (r + c/2) % 2, which never
        // lines up four in any direction.
        for r in 0..ROWS {
            for c in 0..COLS {
                if r == ROWS - 1 && c == 6 {
                    continue;
                }
                game.board[r][c] = Cell::Seat((r + c / 2) % 2);
            }
        }
        // Whichever seat the pattern assigns the final cell moves last.
        game.turn = (ROWS - 1 + 6 / 2) % 2;
        let who = game.seats[game.turn].clone();

        let mut fx = Effects::new();
        let mut ctx = RoomCtx::new(&mut room, &mut fx);
        game.on_command(&mut ctx, &who, &Command::new("drop", json!({"col": 6})))
            .unwrap();

        assert!(game.over);
        assert!(fx.end_requested);
        assert_eq!(room.achievement(&pid("a")).unwrap()["draws"], 1);
        assert_eq!(room.achievement(&pid("b")).unwrap()["draws"], 1);
    }

    #[test]
    fn test_moves_rejected_after_game_over() {
        let (mut game, mut room) = started();
        for _ in 0..3 {
            drop_disc(&mut game, &mut room, "a", 0).unwrap();
            drop_disc(&mut game, &mut room, "b", 1).unwrap();
        }
        drop_disc(&mut game, &mut room, "a", 0).unwrap();

        let err = drop_disc(&mut game, &mut room, "b", 1).unwrap_err();
        assert!(err.to_string().contains("round is over"));
    }

    #[test]
    fn test_loser_goes_first_next_round() {
        let (mut game, mut room) = started();
        assert_eq!(game.seats, vec![pid("a"), pid("b")]);

        // a wins round one.
        for _ in 0..3 {
            drop_disc(&mut game, &mut room, "a", 0).unwrap();
            drop_disc(&mut game, &mut room, "b", 1).unwrap();
        }
        drop_disc(&mut game, &mut room, "a", 0).unwrap();

        // Round two: a fresh instance, same room, loser first.
        let mut game = FourInARow::new();
        let mut fx = Effects::new();
        game.on_start(&mut RoomCtx::new(&mut room, &mut fx));
        assert_eq!(game.seats, vec![pid("b"), pid("a")]);
        assert_eq!(game.current(), Some(&pid("b")));
    }

    #[test]
    fn test_offline_timeout_forfeits_to_the_remaining_player() {
        let (mut game, mut room) = started();
        drop_disc(&mut game, &mut room, "a", 0).unwrap();

        let mut fx = Effects::new();
        let mut ctx = RoomCtx::new(&mut room, &mut fx);
        game.on_offline_timeout(&mut ctx, &pid("b"));

        assert!(fx.end_requested);
        assert_eq!(fx.kicks, vec![pid("b")]);
        assert!(
            fx.outbox
                .iter()
                .any(|(_, e)| e.data["event"] == "forfeit"
                    && e.data["winner"] == "a")
        );
        assert_eq!(room.achievement(&pid("a")).unwrap()["wins"], 1);
        assert_eq!(room.achievement(&pid("b")).unwrap()["losses"], 1);
    }

    #[test]
    fn test_grace_period_opted_in() {
        assert_eq!(FourInARow::new().grace_period(), Some(GRACE));
    }

    #[test]
    fn test_win_detection_needs_four() {
        let mut board = [[Cell::Empty; COLS]; ROWS];
        for col in 0..3 {
            board[0][col] = Cell::Seat(0);
        }
        assert!(!wins(&board, 0, 2), "three is not enough");
        board[0][3] = Cell::Seat(0);
        assert!(wins(&board, 0, 3));
        // Placing in the middle of the line counts too.
        assert!(wins(&board, 0, 1));
    }
}
