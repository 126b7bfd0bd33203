//! Error types for the player registry.

use parlor_protocol::PlayerId;

/// Errors that can occur during registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The id is already registered. Returned by `create` when a client
    /// presents an identity that's currently in use — the usual cause is
    /// a second connection claiming an id that never went offline.
    #[error("player {0} is already registered")]
    DuplicateIdentity(PlayerId),

    /// No player with this id exists.
    #[error("player {0} not found")]
    NotFound(PlayerId),
}
