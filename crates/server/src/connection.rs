//! The TCP accept loop and the per-connection handshake.
//!
//! Each accepted socket gets a blocking worker that reads exactly one
//! packet: a server-list ping is answered with the formatted description
//! string, a handshake runs the full login sequence (username validation,
//! maintenance check, session id, authentication, player-data load) and
//! then runs the player session inline on the same worker. Every failure
//! path disconnects with a user-safe reason; internals never reach the
//! client.

use crate::auth::{valid_username, Authenticator};
use crate::game::{GameHandle, PlayerRegistration};
use crate::player::{PreparedSession, SessionContext};
use rand::Rng;
use shardcraft_proto::{read_packet_expect, serialize_packets, Packet, PROTOCOL_VERSION};
use std::io::Write;
use std::net::TcpStream;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Connection-handler configuration.
#[derive(Debug, Clone)]
pub struct ConnConfig {
    pub max_players: usize,
    pub server_desc: String,
    /// When set, logins are refused with this message.
    pub maintenance_msg: Option<String>,
}

/// Everything a handshake worker needs.
#[derive(Clone)]
pub struct ConnContext {
    pub game: GameHandle,
    pub session: SessionContext,
    pub auth: Arc<dyn Authenticator>,
    pub config: ConnConfig,
}

/// Accept connections until the listener fails or the task is aborted.
pub async fn accept_loop(listener: TcpListener, ctx: ConnContext) {
    loop {
        match listener.accept().await {
            Ok((socket, addr)) => {
                debug!("connection from {addr}");
                let Ok(socket) = socket.into_std() else {
                    warn!("failed to convert accepted socket");
                    continue;
                };
                if socket.set_nonblocking(false).is_err() {
                    warn!("failed to configure accepted socket");
                    continue;
                }
                let ctx = ctx.clone();
                tokio::task::spawn_blocking(move || handshake_worker(socket, ctx));
            }
            Err(err) => {
                warn!("accept failed: {err}");
                return;
            }
        }
    }
}

/// User-safe disconnect reasons.
mod reason {
    pub const GENERAL: &str = "Server error.";
    pub const USERNAME: &str = "Bad username.";
    pub const LOGIN: &str = "Login error.";
    pub const AUTH_FAILED: &str = "Authentication failed.";
    pub const USER_DATA: &str = "Error reading user data. Please contact the server administrator.";
    pub const SERVER_FULL: &str = "The server is full.";
    pub const VERSION: &str = "Unsupported protocol version.";
}

fn disconnect(stream: &mut TcpStream, why: &str) {
    if let Ok(data) = serialize_packets(&[Packet::Disconnect {
        reason: why.to_string(),
    }]) {
        let _ = stream.write_all(&data);
    }
    let _ = stream.shutdown(std::net::Shutdown::Both);
}

fn handshake_worker(mut stream: TcpStream, ctx: ConnContext) {
    let first = match read_packet_expect(&mut &stream, true, &[0x02, 0xfe]) {
        Ok(packet) => packet,
        Err(err) => {
            debug!("connection closed during opener: {err}");
            disconnect(&mut stream, reason::LOGIN);
            return;
        }
    };

    match first {
        Packet::ServerListPing {} => handle_server_query(stream, &ctx),
        Packet::Handshake { username_or_hash } => {
            if let Err(why) = handle_login(&mut stream, username_or_hash, &ctx) {
                disconnect(&mut stream, why);
            }
        }
        _ => disconnect(&mut stream, reason::GENERAL),
    }
}

/// A server-list poll: reply with `<desc>§<players>§<max>` and close.
fn handle_server_query(mut stream: TcpStream, ctx: &ConnContext) {
    let count = ctx.game.player_count_blocking();
    let reply = format!(
        "{}\u{a7}{}\u{a7}{}",
        ctx.config.server_desc, count, ctx.config.max_players
    );
    disconnect(&mut stream, &reply);
}

fn handle_login(
    stream: &mut TcpStream,
    username: String,
    ctx: &ConnContext,
) -> Result<(), &'static str> {
    if !valid_username(&username) {
        return Err(reason::USERNAME);
    }

    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    info!("client {peer} connected as {username:?}");

    if let Some(message) = &ctx.config.maintenance_msg {
        warn!("refusing {username:?}: maintenance mode");
        disconnect(stream, message);
        return Ok(());
    }

    if ctx.game.player_count_blocking() >= ctx.config.max_players {
        return Err(reason::SERVER_FULL);
    }

    // The random session id ties this connection to the external auth
    // check.
    let session_id = format!("{:016x}", rand::thread_rng().gen::<u64>());
    debug!("player {username:?} has session id {session_id}");

    let reply = serialize_packets(&[Packet::Handshake {
        username_or_hash: session_id.clone(),
    }])
    .map_err(|_| reason::GENERAL)?;
    stream.write_all(&reply).map_err(|_| reason::GENERAL)?;

    let login = read_packet_expect(&mut &*stream, true, &[0x01]).map_err(|_| reason::LOGIN)?;
    let Packet::Login {
        version_or_entity_id,
        ..
    } = login
    else {
        return Err(reason::LOGIN);
    };
    if version_or_entity_id != PROTOCOL_VERSION {
        warn!(
            "refusing {username:?}: protocol version {version_or_entity_id} \
             (want {PROTOCOL_VERSION})"
        );
        return Err(reason::VERSION);
    }

    if !ctx.auth.authenticate(&session_id, &username) {
        warn!("client {peer} failed authentication as {username:?}");
        return Err(reason::AUTH_FAILED);
    }
    info!("client {peer} passed authentication as {username:?}");

    let saved = match ctx.session.world.players.read(&username) {
        Ok(saved) => saved,
        Err(err) => {
            // Keep them out rather than let a default inventory overwrite
            // their real one on logout.
            warn!("unreadable player data for {username:?}: {err:#}");
            return Err(reason::USER_DATA);
        }
    };

    let entity_id = ctx.session.entities.alloc();
    let spawn_block = ctx.session.world.level.spawn;

    let session_stream = stream.try_clone().map_err(|_| reason::GENERAL)?;
    let prepared = PreparedSession::new(
        session_stream,
        entity_id,
        username.clone(),
        spawn_block,
        saved,
        ctx.session.clone(),
    )
    .map_err(|_| {
        ctx.session.entities.free(entity_id);
        reason::GENERAL
    })?;

    let registration = PlayerRegistration {
        entity_id,
        name: username,
        client: prepared.client(),
    };
    if !ctx.game.register_blocking(registration) {
        ctx.session.entities.free(entity_id);
        return Err(reason::GENERAL);
    }

    // Blocks this worker for the session's lifetime.
    prepared.run();
    Ok(())
}
