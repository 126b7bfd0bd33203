//! Game-layer errors.

use thiserror::Error;

/// What a contract hook or the registry can reject.
///
/// Every variant is a per-sender condition: the router answers the
/// offending sender with an addressed `{error: ...}` reply and keeps
/// the round running.
#[derive(Debug, Error)]
pub enum GameError {
    /// The command was well-formed but the rules refuse it right now
    /// (out of turn, illegal move, wrong phase).
    #[error("{0}")]
    Rejected(String),

    /// No handler for this command verb, neither common nor
    /// game-specific.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The command payload didn't parse into what the verb expects.
    #[error("malformed command: {0}")]
    Malformed(String),

    /// No contract constructor registered for the room's game type.
    #[error("unknown game type: {0}")]
    UnknownGameType(String),
}
