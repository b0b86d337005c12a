//! The server frontend: game actor, connection handshake and player
//! sessions.
//!
//! A session is three tasks (socket receive, socket transmit, main loop);
//! the main loop is the sole owner of player state and talks to the world
//! exclusively through shard request queues.

mod auth;
mod commands;
mod connection;
mod game;
mod player;
mod subscription;
mod window;

pub use auth::{valid_username, AllowAllAuthenticator, Authenticator};
pub use commands::{CommandFramework, CommandOutcome};
pub use connection::{accept_loop, ConnConfig, ConnContext};
pub use game::{Game, GameHandle, PlayerRegistration};
pub use player::{PreparedSession, SessionConfig, SessionContext};
pub use subscription::{ordered_chunk_square, square_difference, ChunkSubscriptions};
pub use window::{combined_index_for_player_slot, RemoteWindow, WindowSlot};
