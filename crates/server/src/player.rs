//! The per-connection player session actor.
//!
//! Three concurrent tasks share a session: a receive thread blocking on
//! socket reads, a transmit thread draining a bounded byte queue, and the
//! main task that owns all mutable player state and selects over the
//! receive queue, the error channels, the deferred-callback queue, the
//! stop signal and the keep-alive timer. Shards talk back to the session
//! only through the capability handle, which forwards onto the queues the
//! session owns; once the session is gone the handle drops payloads
//! silently.

use crate::commands::{CommandFramework, CommandOutcome};
use crate::game::GameHandle;
use crate::subscription::ChunkSubscriptions;
use crate::window::{combined_index_for_player_slot, RemoteWindow, WindowSlot};
use shardcraft_core::{
    AbsXyz, BlockXyz, ChunkXz, DigStatus, EntityId, Face, InvTypeId, LookDegrees, PrgBarId,
    PrgBarValue, SlotId, TxId, WindowId, CHUNK_SIZE_Y, MAX_INTERACT_DISTANCE, TICKS_PER_SECOND,
};
use shardcraft_nbt::{Compound, Tag};
use shardcraft_proto::{read_packet, serialize_packets, Packet, ProtoError};
use shardcraft_world::{
    velocity_from_look, Click, GameRules, LocalShardManager, PlayerClient, PlayerPresence, Slot,
    TxState, WorldStore, DROP_PICKUP_IMMUNITY,
};
use std::io::{BufReader, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Eye height above the feet; the wire "stance".
const STANCE_NORMAL: f64 = 1.62;
/// Full health as sent in update-health packets.
const MAX_HEALTH: i16 = 20;
/// Full food level.
const MAX_FOOD: i16 = 20;
/// Anti-teleport limit for client-reported positions, in blocks.
const MAX_MOVE_DISTANCE: f64 = 10.0;
/// Disconnect reason for protocol violations; internals never reach the
/// client.
const SERVER_ERROR: &str = "Server error.";

/// Session timing knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle time between keep-alive pings.
    pub ping_interval: Duration,
    /// Time an unanswered ping may stay outstanding.
    pub ping_timeout: Duration,
    /// Accept mismatching keep-alive ids (replayed sessions).
    pub ping_id_relaxed: bool,
    /// Deadline for a deferred remote window transaction.
    pub deferred_tx_timeout: Duration,
    /// Player capacity reported in login replies.
    pub max_players: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            ping_interval: Duration::from_secs(20),
            ping_timeout: Duration::from_secs(60),
            ping_id_relaxed: false,
            deferred_tx_timeout: Duration::from_secs(5),
            max_players: 16,
        }
    }
}

/// Shared services a session needs.
#[derive(Clone)]
pub struct SessionContext {
    pub game: GameHandle,
    pub mgr: Arc<LocalShardManager>,
    pub rules: Arc<GameRules>,
    pub entities: Arc<shardcraft_core::EntityIdAllocator>,
    pub world: Arc<WorldStore>,
    pub config: SessionConfig,
}

/// Deferred work arriving on the session's main queue from shard tasks.
enum SessionCallback {
    NotifyChunkLoad,
    OfferItem {
        from_chunk: ChunkXz,
        entity_id: EntityId,
        item: Slot,
    },
    GiveItem {
        at: AbsXyz,
        item: Slot,
    },
    PlaceHeldItem {
        target: BlockXyz,
        was_held: Slot,
    },
    InvSubscribed {
        block: BlockXyz,
        inv_type: InvTypeId,
        slots: Vec<Slot>,
    },
    InvSlotUpdate {
        block: BlockXyz,
        slot_id: SlotId,
        slot: Slot,
    },
    InvProgressUpdate {
        block: BlockXyz,
        bar: PrgBarId,
        value: PrgBarValue,
    },
    InvCursorUpdate {
        block: BlockXyz,
        cursor: Slot,
    },
    InvTxState {
        block: BlockXyz,
        tx_id: TxId,
        accepted: bool,
    },
    InvUnsubscribed {
        block: BlockXyz,
    },
}

/// The capability chunks hold for this session. Every method forwards
/// without blocking; a full transmit queue marks the client too slow and
/// stops the session.
pub struct SessionClient {
    entity_id: EntityId,
    name: String,
    tx: mpsc::Sender<Option<Vec<u8>>>,
    main: mpsc::Sender<SessionCallback>,
    stop: mpsc::Sender<()>,
}

impl SessionClient {
    fn push(&self, callback: SessionCallback) {
        if self.main.try_send(callback).is_err() {
            debug!("player {}: main queue unavailable, dropping callback", self.name);
        }
    }
}

impl PlayerClient for SessionClient {
    fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn transmit(&self, data: Vec<u8>) {
        use mpsc::error::TrySendError;
        match self.tx.try_send(Some(data)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("player {}: transmit queue full, stopping session", self.name);
                let _ = self.stop.try_send(());
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    fn notify_chunk_load(&self) {
        self.push(SessionCallback::NotifyChunkLoad);
    }

    fn offer_item(&self, from_chunk: ChunkXz, entity_id: EntityId, item: Slot) {
        self.push(SessionCallback::OfferItem {
            from_chunk,
            entity_id,
            item,
        });
    }

    fn give_item(&self, at: AbsXyz, item: Slot) {
        self.push(SessionCallback::GiveItem { at, item });
    }

    fn place_held_item(&self, target: BlockXyz, was_held: Slot) {
        self.push(SessionCallback::PlaceHeldItem { target, was_held });
    }

    fn inventory_subscribed(&self, block: BlockXyz, inv_type: InvTypeId, slots: Vec<Slot>) {
        self.push(SessionCallback::InvSubscribed {
            block,
            inv_type,
            slots,
        });
    }

    fn inventory_slot_update(&self, block: BlockXyz, slot_id: SlotId, slot: Slot) {
        self.push(SessionCallback::InvSlotUpdate {
            block,
            slot_id,
            slot,
        });
    }

    fn inventory_progress_update(&self, block: BlockXyz, bar: PrgBarId, value: PrgBarValue) {
        self.push(SessionCallback::InvProgressUpdate { block, bar, value });
    }

    fn inventory_cursor_update(&self, block: BlockXyz, cursor: Slot) {
        self.push(SessionCallback::InvCursorUpdate { block, cursor });
    }

    fn inventory_tx_state(&self, block: BlockXyz, tx_id: TxId, accepted: bool) {
        self.push(SessionCallback::InvTxState {
            block,
            tx_id,
            accepted,
        });
    }

    fn inventory_unsubscribed(&self, block: BlockXyz) {
        self.push(SessionCallback::InvUnsubscribed { block });
    }
}

/// Keep-alive state machine.
enum PingState {
    /// No ping outstanding; the interval timer runs.
    Idle { next: Instant },
    /// A ping is outstanding; the timeout timer runs.
    Waiting { id: i32, sent: Instant, deadline: Instant },
}

/// A session whose queues and threads exist but whose main loop has not
/// started; lets the caller register the client handle first.
pub struct PreparedSession {
    session: PlayerSession,
}

impl PreparedSession {
    /// Build the session over `stream`, spawning its rx/tx threads.
    pub fn new(
        stream: TcpStream,
        entity_id: EntityId,
        name: String,
        spawn_block: BlockXyz,
        saved: Option<Compound>,
        ctx: SessionContext,
    ) -> std::io::Result<PreparedSession> {
        Ok(PreparedSession {
            session: PlayerSession::new(stream, entity_id, name, spawn_block, saved, ctx)?,
        })
    }

    /// The capability handle for this session, for the game registry and
    /// chunk subscriptions.
    pub fn client(&self) -> shardcraft_world::PlayerHandle {
        self.session.client.clone()
    }

    /// Run the main loop, blocking the calling thread until the session
    /// ends.
    pub fn run(self) {
        tokio::runtime::Handle::current().block_on(self.session.run());
    }
}

struct PlayerSession {
    entity_id: EntityId,
    name: String,
    ctx: SessionContext,
    commands: CommandFramework,

    stream: TcpStream,
    rx_queue: mpsc::Receiver<Packet>,
    rx_err: mpsc::Receiver<ProtoError>,
    tx_queue: mpsc::Sender<Option<Vec<u8>>>,
    tx_err: mpsc::Receiver<std::io::Error>,
    main_queue: mpsc::Receiver<SessionCallback>,
    stop_rx: mpsc::Receiver<()>,
    client: Arc<SessionClient>,

    position: AbsXyz,
    height: f64,
    look: LookDegrees,
    spawn_block: BlockXyz,
    health: i16,
    food: i16,
    inventory: shardcraft_world::PlayerInventory,
    cursor: Slot,
    cur_window: Option<RemoteWindow>,
    next_window_id: WindowId,
    spawn_complete: bool,
    ping: PingState,

    // Loaded and persisted, not otherwise used by the simulation yet.
    on_ground: bool,
    fall_distance: f32,
    air: i16,
    fire: i16,
    dimension: i32,
}

impl PlayerSession {
    fn new(
        stream: TcpStream,
        entity_id: EntityId,
        name: String,
        spawn_block: BlockXyz,
        saved: Option<Compound>,
        ctx: SessionContext,
    ) -> std::io::Result<PlayerSession> {
        let (rx_tx, rx_queue) = mpsc::channel::<Packet>(32);
        let (rx_err_tx, rx_err) = mpsc::channel::<ProtoError>(1);
        // Deep enough to absorb the initial chunk-square burst without
        // tripping the slow-client cutoff.
        let (tx_queue, tx_rx) = mpsc::channel::<Option<Vec<u8>>>(1024);
        let (tx_err_tx, tx_err) = mpsc::channel::<std::io::Error>(1);
        let (main_tx, main_queue) = mpsc::channel::<SessionCallback>(128);
        let (stop_tx, stop_rx) = mpsc::channel::<()>(1);

        // Receive thread: blocks on socket reads, decoding client packets.
        let read_stream = stream.try_clone()?;
        let rx_name = name.clone();
        std::thread::Builder::new()
            .name(format!("rx-{rx_name}"))
            .spawn(move || {
                let mut reader = BufReader::new(read_stream);
                loop {
                    match read_packet(&mut reader, true) {
                        Ok(packet) => {
                            if rx_tx.blocking_send(packet).is_err() {
                                return;
                            }
                        }
                        Err(err) => {
                            let _ = rx_err_tx.try_send(err);
                            return;
                        }
                    }
                }
            })?;

        // Transmit thread: drains byte blobs; `None` is the shutdown
        // sentinel.
        let mut write_stream = stream.try_clone()?;
        let tx_name = name.clone();
        std::thread::Builder::new()
            .name(format!("tx-{tx_name}"))
            .spawn(move || {
                let mut tx_rx = tx_rx;
                while let Some(item) = tx_rx.blocking_recv() {
                    match item {
                        Some(data) => {
                            if let Err(err) = write_stream.write_all(&data) {
                                let _ = tx_err_tx.try_send(err);
                                return;
                            }
                        }
                        None => return,
                    }
                }
            })?;

        let client = Arc::new(SessionClient {
            entity_id,
            name: name.clone(),
            tx: tx_queue.clone(),
            main: main_tx,
            stop: stop_tx,
        });

        let mut session = PlayerSession {
            entity_id,
            name,
            commands: CommandFramework::default(),
            stream,
            rx_queue,
            rx_err,
            tx_queue,
            tx_err,
            main_queue,
            stop_rx,
            client,
            position: AbsXyz::new(
                spawn_block.x as f64 + 0.5,
                spawn_block.y as f64,
                spawn_block.z as f64 + 0.5,
            ),
            height: STANCE_NORMAL,
            look: LookDegrees::default(),
            spawn_block,
            health: MAX_HEALTH,
            food: MAX_FOOD,
            inventory: shardcraft_world::PlayerInventory::new(),
            cursor: Slot::empty(),
            cur_window: None,
            next_window_id: WindowId::FREE_MIN,
            spawn_complete: false,
            ping: PingState::Idle {
                next: Instant::now(),
            },
            on_ground: true,
            fall_distance: 0.0,
            air: 300,
            fire: -20,
            dimension: 0,
            ctx,
        };

        if let Some(saved) = saved {
            session.apply_nbt(&saved);
        }

        Ok(session)
    }

    /// Queue raw bytes for the client.
    fn transmit(&self, data: Vec<u8>) {
        self.client.transmit(data);
    }

    /// Serialize and queue packets for the client; serialization failures
    /// are logged and dropped.
    fn send_packets(&self, packets: &[Packet]) {
        match serialize_packets(packets) {
            Ok(data) => self.transmit(data),
            Err(err) => warn!("player {}: packet serialization failed: {err}", self.name),
        }
    }

    fn presence(&self) -> PlayerPresence {
        PlayerPresence {
            entity_id: self.entity_id,
            name: self.name.clone(),
            position: self.position,
            look: self.look.to_look_bytes(),
            held_item: self.inventory.held_item_type(),
        }
    }

    async fn run(mut self) {
        info!("starting session for {} ({})", self.name, self.entity_id);

        // Login confirmation and spawn position, ahead of any chunk data.
        self.send_packets(&[
            Packet::Login {
                version_or_entity_id: self.entity_id.0,
                username: String::new(),
                map_seed: self.ctx.world.level.seed,
                level_type: "DEFAULT".to_string(),
                game_mode: 0,
                dimension: shardcraft_core::DimensionId::NORMAL,
                difficulty: shardcraft_core::GameDifficulty::NORMAL,
                world_height: CHUNK_SIZE_Y as u8,
                max_players: self.ctx.config.max_players.min(u8::MAX as usize) as u8,
            },
            Packet::SpawnPosition {
                x: self.spawn_block.x,
                y: self.spawn_block.y as i32,
                z: self.spawn_block.z,
            },
        ]);

        let mut subs = ChunkSubscriptions::init(
            Arc::clone(&self.ctx.mgr),
            self.client.clone(),
            self.presence(),
        )
        .await;

        self.ctx
            .game
            .broadcast_message(format!("{} has joined", self.name))
            .await;
        self.ping_new();

        loop {
            let deadline = self.next_deadline();
            // Resolve the event first so the branch handlers below get the
            // whole session mutably.
            let event = tokio::select! {
                packet = self.rx_queue.recv() => match packet {
                    Some(packet) => Event::Rx(packet),
                    None => Event::Fatal,
                },
                err = self.rx_err.recv() => Event::RxError(err),
                err = self.tx_err.recv() => Event::TxError(err),
                callback = self.main_queue.recv() => match callback {
                    Some(callback) => Event::Callback(callback),
                    None => Event::Fatal,
                },
                _ = self.stop_rx.recv() => Event::Fatal,
                _ = tokio::time::sleep_until(deadline) => Event::Deadline,
            };

            let fatal = match event {
                Event::Rx(packet) => self.handle_packet(packet, &mut subs).await,
                Event::Callback(callback) => {
                    self.handle_callback(callback, &mut subs).await;
                    false
                }
                Event::RxError(err) => {
                    if let Some(err) = err {
                        debug!("player {}: receive loop failed: {err}", self.name);
                        if !matches!(err, ProtoError::Io(_)) {
                            // A malformed packet, not a dropped connection.
                            self.send_packets(&[Packet::Disconnect {
                                reason: SERVER_ERROR.to_string(),
                            }]);
                        }
                    }
                    true
                }
                Event::TxError(err) => {
                    if let Some(err) = err {
                        debug!("player {}: send loop failed: {err}", self.name);
                    }
                    true
                }
                Event::Deadline => self.handle_deadline().await,
                Event::Fatal => true,
            };
            if fatal {
                break;
            }
        }

        self.shutdown(&mut subs).await;
    }

    async fn shutdown(&mut self, subs: &mut ChunkSubscriptions) {
        info!("session ending for {} ({})", self.name, self.entity_id);

        subs.close().await;

        // Terminate the transmit thread, then the socket (which unblocks
        // the receive thread).
        let _ = self.tx_queue.send(None).await;
        let _ = self.stream.shutdown(Shutdown::Both);

        // Persist before the registry forgets us.
        let data = self.marshal_nbt();
        if let Err(err) = self.ctx.world.players.write(&self.name, &data) {
            warn!("failed to write player data for {}: {err:#}", self.name);
        }

        self.ctx.game.disconnect(self.entity_id).await;
        self.ctx
            .game
            .broadcast_packet(Packet::PlayerListItem {
                username: self.name.clone(),
                online: false,
                ping: 0,
            })
            .await;
        self.ctx.entities.free(self.entity_id);
    }

    // Keep-alive.

    fn next_deadline(&self) -> Instant {
        let ping_deadline = match &self.ping {
            PingState::Idle { next } => *next,
            PingState::Waiting { deadline, .. } => *deadline,
        };
        match self
            .cur_window
            .as_ref()
            .and_then(|window| window.pending_tx.as_ref())
        {
            Some((_, tx_deadline)) => ping_deadline.min(*tx_deadline),
            None => ping_deadline,
        }
    }

    /// A timer fired: keep-alive transitions or a deferred transaction
    /// lapsed. Returns true when the session must terminate.
    async fn handle_deadline(&mut self) -> bool {
        let now = Instant::now();

        // Deferred window transactions time out as rejected.
        let mut lapsed = None;
        if let Some(window) = &mut self.cur_window {
            if let Some((tx_id, deadline)) = window.pending_tx {
                if now >= deadline {
                    window.pending_tx = None;
                    lapsed = Some((window.window_id, tx_id));
                }
            }
        }
        if let Some((window_id, tx_id)) = lapsed {
            warn!(
                "player {}: remote window transaction {tx_id:?} timed out",
                self.name
            );
            self.send_packets(&[Packet::WindowTransaction {
                window_id,
                tx_id,
                accepted: false,
            }]);
        }

        match &self.ping {
            PingState::Idle { next } if now >= *next => {
                self.ping_new();
                false
            }
            PingState::Waiting { deadline, .. } if now >= *deadline => {
                info!("player {}: keep-alive timed out", self.name);
                true
            }
            _ => false,
        }
    }

    fn ping_new(&mut self) {
        // Zero is reserved for client-initiated heartbeats.
        let mut id: i32 = rand::random();
        if id == 0 {
            id = 1;
        }
        let now = Instant::now();
        self.ping = PingState::Waiting {
            id,
            sent: now,
            deadline: now + self.ctx.config.ping_timeout,
        };
        self.send_packets(&[Packet::KeepAlive { id }]);
    }

    /// Feed a client keep-alive into the state machine. Returns true when
    /// the session must terminate.
    async fn ping_received(&mut self, id: i32) -> bool {
        if id == 0 {
            // Client-initiated heartbeat.
            return false;
        }

        match &self.ping {
            PingState::Idle { .. } => {
                if self.ctx.config.ping_id_relaxed {
                    return false;
                }
                warn!("player {}: keep-alive id={id} with none outstanding", self.name);
                true
            }
            PingState::Waiting { id: expected, sent, .. } => {
                if id != *expected && !self.ctx.config.ping_id_relaxed {
                    warn!("player {}: bad keep-alive id", self.name);
                    return true;
                }

                let latency = Instant::now().saturating_duration_since(*sent);
                if latency < self.ctx.config.ping_timeout {
                    self.ctx
                        .game
                        .broadcast_packet(Packet::PlayerListItem {
                            username: self.name.clone(),
                            online: true,
                            ping: latency.as_millis().min(i16::MAX as u128) as i16,
                        })
                        .await;
                }
                self.ping = PingState::Idle {
                    next: Instant::now() + self.ctx.config.ping_interval,
                };
                false
            }
        }
    }

    // Packet dispatch. Returns true when the session must terminate.

    async fn handle_packet(&mut self, packet: Packet, subs: &mut ChunkSubscriptions) -> bool {
        match packet {
            Packet::KeepAlive { id } => return self.ping_received(id).await,
            Packet::ChatMessage { message } => self.handle_chat(message, subs).await,
            Packet::Player { on_ground } => self.on_ground = on_ground,
            Packet::PlayerPosition { x, y, stance, z, .. } => {
                self.handle_move(AbsXyz::new(x, y, z), stance, subs).await;
            }
            Packet::PlayerLook { look, .. } => self.handle_look(look, subs).await,
            Packet::PlayerPositionLook {
                x, y1, y2, z, look, ..
            } => {
                // From the client, y1 is the feet and y2 the stance.
                self.handle_move(AbsXyz::new(x, y1, z), y2, subs).await;
                self.handle_look(look, subs).await;
            }
            Packet::PlayerBlockHit {
                status,
                block,
                face,
            } => self.handle_block_hit(status, block, face, subs).await,
            Packet::PlayerBlockInteract { block, face, .. } => {
                self.handle_block_interact(block, face, subs).await;
            }
            Packet::PlayerHoldingChange { slot_id } => {
                if !self.inventory.set_holding(slot_id) {
                    debug!("player {}: invalid holding change {slot_id:?}", self.name);
                }
            }
            Packet::WindowClick {
                window_id,
                slot,
                right_click,
                tx_id,
                shift,
                expected_slot,
            } => {
                let click = Click {
                    slot_id: slot,
                    cursor: self.cursor.clone(),
                    right_click,
                    shift_click: shift,
                    tx_id,
                    expected_slot: Slot::from_item_slot(&expected_slot),
                };
                self.handle_window_click(window_id, click, subs).await;
            }
            Packet::WindowClose { .. } => self.close_current_window(false, subs).await,
            Packet::SignUpdate {
                x,
                y,
                z,
                text1,
                text2,
                text3,
                text4,
            } => {
                let target = BlockXyz::new(x, y as i8, z);
                if self.within_interact_range(&target) {
                    if let Some((shard, _)) = subs.shard_for_block(&target) {
                        shard
                            .sign_update(target, [text1, text2, text3, text4])
                            .await;
                    }
                }
            }
            Packet::Disconnect { reason } => {
                info!("player {} disconnected: {reason:?}", self.name);
                self.ctx
                    .game
                    .broadcast_message(format!("{} has left", self.name))
                    .await;
                return true;
            }
            Packet::Handshake { .. } | Packet::Login { .. } | Packet::ServerListPing {} => {
                warn!("player {}: protocol violation after login", self.name);
                self.send_packets(&[Packet::Disconnect {
                    reason: SERVER_ERROR.to_string(),
                }]);
                return true;
            }
            Packet::UseEntity { .. }
            | Packet::EntityAnimation { .. }
            | Packet::EntityAction { .. }
            | Packet::Respawn { .. }
            | Packet::WindowTransaction { .. }
            | Packet::CreativeInventoryAction { .. }
            | Packet::EnchantItem { .. }
            | Packet::IncrementStatistic { .. }
            | Packet::PluginMessage { .. } => {}
            other => {
                debug!("player {}: unhandled packet {other:?}", self.name);
            }
        }
        false
    }

    async fn handle_chat(&mut self, message: String, subs: &mut ChunkSubscriptions) {
        if self.commands.is_command(&message) {
            match self.commands.process(&self.name, &message) {
                CommandOutcome::Reply(text) => {
                    self.send_packets(&[Packet::ChatMessage { message: text }]);
                }
                CommandOutcome::Broadcast(text) => {
                    self.ctx.game.broadcast_message(text).await;
                }
                CommandOutcome::Kill => {
                    let _ = self.client.stop.try_send(());
                }
            }
            return;
        }

        let line = format!("<{}> {}", self.name, message);
        match serialize_packets(&[Packet::ChatMessage { message: line }]) {
            Ok(data) => {
                // The sender gets its own copy; everyone else hears it via
                // the hosting chunk's multicast.
                self.transmit(data.clone());
                subs.cur_shard()
                    .multicast_players(subs.cur_chunk(), Some(self.entity_id), data)
                    .await;
            }
            Err(err) => warn!("player {}: chat serialization failed: {err}", self.name),
        }
    }

    async fn handle_move(&mut self, position: AbsXyz, stance: f64, subs: &mut ChunkSubscriptions) {
        if !self.spawn_complete {
            // Ignore position packets until the initial chunk load placed
            // the player.
            return;
        }

        if !self.position.is_within_distance_of(&position, MAX_MOVE_DISTANCE) {
            debug!(
                "player {}: discarding position too far removed ({:.2}, {:.2}, {:.2})",
                self.name, position.x, position.y, position.z
            );
            return;
        }

        self.position = position;
        self.height = stance - position.y;
        subs.moved(&position, self.presence()).await;
    }

    async fn handle_look(&mut self, look: LookDegrees, subs: &mut ChunkSubscriptions) {
        self.look = look;
        subs.cur_shard()
            .set_player_look(subs.cur_chunk(), look.to_look_bytes())
            .await;
    }

    fn within_interact_range(&self, target: &BlockXyz) -> bool {
        target
            .mid_point_to_abs_xyz()
            .is_within_distance_of(&self.position, MAX_INTERACT_DISTANCE)
    }

    async fn handle_block_hit(
        &mut self,
        status: DigStatus,
        block: BlockXyz,
        face: Face,
        subs: &mut ChunkSubscriptions,
    ) {
        if status == DigStatus::DROP_ITEM {
            let thrown = self.inventory.take_one_held();
            if thrown.is_empty() {
                // Drop key with nothing held; ignore.
                return;
            }
            self.send_held_slot_update();

            let mut at = self.position;
            at.y += self.height;
            let velocity = velocity_from_look(self.look, 0.5);
            if let Some(shard) = subs.shard_for_chunk(at.to_chunk_xz()) {
                shard
                    .drop_item(thrown, at, velocity, DROP_PICKUP_IMMUNITY)
                    .await;
            }
            return;
        }

        if !self.within_interact_range(&block) {
            debug!("player {}: ignoring dig at {block:?} (too far away)", self.name);
            return;
        }

        if let Some((shard, _)) = subs.shard_for_block(&block) {
            let held = self.inventory.held_item().clone();
            shard.hit_block(held, status, block, face).await;
        }
    }

    async fn handle_block_interact(
        &mut self,
        block: BlockXyz,
        face: Face,
        subs: &mut ChunkSubscriptions,
    ) {
        if !face.is_valid() {
            // FaceNull sometimes carries meaning (using an item in the
            // air); observed behaviour is to log and drop.
            debug!("player {}: invalid face {face:?} on interact", self.name);
            return;
        }
        if !self.within_interact_range(&block) {
            debug!(
                "player {}: ignoring interact at {block:?} (too far away)",
                self.name
            );
            return;
        }

        if let Some((shard, _)) = subs.shard_for_block(&block) {
            let held = self.inventory.held_item().clone();
            shard.interact_block(held, block, face).await;
        }
    }

    // Window handling.

    async fn handle_window_click(
        &mut self,
        window_id: WindowId,
        click: Click,
        subs: &mut ChunkSubscriptions,
    ) {
        if window_id == WindowId::INVENTORY {
            let (state, updates) = self.click_player_window(&click, click.slot_id.0 as usize);
            self.send_packets(&updates);
            self.send_packets(&[Packet::WindowTransaction {
                window_id,
                tx_id: click.tx_id,
                accepted: state == TxState::Accepted,
            }]);
            return;
        }

        let (classification, block) = match &self.cur_window {
            Some(window) if window.window_id == window_id => {
                (window.classify(click.slot_id), window.block)
            }
            _ => {
                warn!(
                    "player {}: ignored click on unknown window {window_id:?}",
                    self.name
                );
                self.send_packets(&[Packet::WindowTransaction {
                    window_id,
                    tx_id: click.tx_id,
                    accepted: false,
                }]);
                return;
            }
        };

        match classification {
            WindowSlot::Remote(remote_index) => {
                // The tile entity resolves the click; the reply arrives as
                // a deferred transaction.
                if let Some(window) = &mut self.cur_window {
                    window.pending_tx =
                        Some((click.tx_id, Instant::now() + self.ctx.config.deferred_tx_timeout));
                }
                let mut remote_click = click;
                remote_click.slot_id = SlotId(remote_index as i16);
                if let Some((shard, _)) = subs.shard_for_block(&block) {
                    shard.inventory_click(block, remote_click).await;
                }
            }
            WindowSlot::Player(window_index) => {
                let (state, extra) = self.click_player_window(&click, window_index);
                self.send_packets(&extra);
                // Echo the change at the combined window's slot index.
                let slot = self.inventory.inventory().slot(window_index).clone();
                self.send_packets(&[
                    slot.update_packet(window_id, click.slot_id),
                    Packet::WindowTransaction {
                        window_id,
                        tx_id: click.tx_id,
                        accepted: state == TxState::Accepted,
                    },
                ]);
            }
            WindowSlot::Invalid => {
                self.send_packets(&[Packet::WindowTransaction {
                    window_id,
                    tx_id: click.tx_id,
                    accepted: false,
                }]);
            }
        }
    }

    /// Apply a click to the player's own inventory at a window index,
    /// updating the cursor. Returns the outcome and follow-up packets.
    fn click_player_window(&mut self, click: &Click, window_index: usize) -> (TxState, Vec<Packet>) {
        let mut updates = Vec::new();

        if window_index == shardcraft_world::PlayerInventory::craft_output_slot() {
            let state = self.take_craft_output(&mut updates);
            return (state, updates);
        }

        if window_index >= shardcraft_world::PLAYER_WINDOW_SLOTS {
            return (TxState::Rejected, updates);
        }

        let rules = Arc::clone(&self.ctx.rules);
        let mut local_click = click.clone();
        local_click.slot_id = SlotId(window_index as i16);
        let outcome = self
            .inventory
            .inventory_mut()
            .click(&local_click, |item| rules.items.max_stack(item));
        self.cursor = outcome.cursor.clone();

        let mut craft_changed = false;
        for index in &outcome.changed {
            craft_changed |= shardcraft_world::PlayerInventory::is_craft_grid_slot(*index);
        }
        if craft_changed && self.inventory.update_craft_output(&rules.recipes) {
            let output_slot = shardcraft_world::PlayerInventory::craft_output_slot();
            updates.push(
                self.inventory
                    .inventory()
                    .slot(output_slot)
                    .update_packet(WindowId::INVENTORY, SlotId(output_slot as i16)),
            );
        }

        updates.push(
            self.cursor
                .update_packet(WindowId::CURSOR, SlotId::CURSOR),
        );
        (outcome.state, updates)
    }

    fn take_craft_output(&mut self, updates: &mut Vec<Packet>) -> TxState {
        let rules = Arc::clone(&self.ctx.rules);
        let output_slot = shardcraft_world::PlayerInventory::craft_output_slot();
        let output = self.inventory.inventory().slot(output_slot).clone();
        if output.is_empty() {
            return TxState::Rejected;
        }
        if !self.cursor.is_empty() && !self.cursor.is_same_type(&output) {
            return TxState::Rejected;
        }

        let mut produced = output;
        let max_stack = rules.items.max_stack(produced.item_type);
        if !self.cursor.add(&mut produced, max_stack) || !produced.is_empty() {
            return TxState::Rejected;
        }

        for index in self.inventory.consume_craft_ingredients() {
            updates.push(
                self.inventory
                    .inventory()
                    .slot(index)
                    .update_packet(WindowId::INVENTORY, SlotId(index as i16)),
            );
        }
        self.inventory.update_craft_output(&rules.recipes);
        updates.push(
            self.inventory
                .inventory()
                .slot(output_slot)
                .update_packet(WindowId::INVENTORY, SlotId(output_slot as i16)),
        );
        updates.push(self.cursor.update_packet(WindowId::CURSOR, SlotId::CURSOR));
        TxState::Accepted
    }

    /// The set-slot packet for a player-inventory window index, remapped
    /// into the open remote window when its combined view covers the slot.
    fn slot_update_packet(&self, window_index: usize) -> Packet {
        let slot = self.inventory.inventory().slot(window_index);
        if let Some(window) = &self.cur_window {
            if let Some(combined) =
                combined_index_for_player_slot(window.remote_slots(), window_index)
            {
                return slot.update_packet(window.window_id, SlotId(combined as i16));
            }
        }
        slot.update_packet(WindowId::INVENTORY, SlotId(window_index as i16))
    }

    fn send_held_slot_update(&self) {
        self.send_packets(&[self.slot_update_packet(self.inventory.held_window_index())]);
    }

    async fn close_current_window(&mut self, send_close: bool, subs: &mut ChunkSubscriptions) {
        if let Some(window) = self.cur_window.take() {
            if let Some((shard, _)) = subs.shard_for_block(&window.block) {
                shard.inventory_unsubscribed(window.block).await;
            }
            if send_close {
                self.send_packets(&[Packet::WindowClose {
                    window_id: window.window_id,
                }]);
            }
        }
    }

    // Callbacks from shards.

    async fn handle_callback(&mut self, callback: SessionCallback, subs: &mut ChunkSubscriptions) {
        match callback {
            SessionCallback::NotifyChunkLoad => self.on_chunk_loaded(),
            SessionCallback::OfferItem {
                from_chunk,
                entity_id,
                item,
            } => {
                let max_stack = self.ctx.rules.items.max_stack(item.item_type);
                if self.inventory.can_take_item(&item, max_stack) {
                    if let Some(shard) = subs.shard_for_chunk(from_chunk) {
                        shard.take_item(from_chunk, entity_id).await;
                    }
                }
            }
            SessionCallback::GiveItem { at, item } => self.give_item(at, item, subs).await,
            SessionCallback::PlaceHeldItem { target, was_held } => {
                self.place_held_item(target, was_held, subs).await;
            }
            SessionCallback::InvSubscribed {
                block,
                inv_type,
                slots,
            } => self.open_remote_window(block, inv_type, slots, subs).await,
            SessionCallback::InvSlotUpdate {
                block,
                slot_id,
                slot,
            } => {
                let mut update = None;
                if let Some(window) = &mut self.cur_window {
                    if window.block == block {
                        window.update_slot(slot_id, slot.clone());
                        update = Some(window.window_id);
                    }
                }
                if let Some(window_id) = update {
                    self.send_packets(&[slot.update_packet(window_id, slot_id)]);
                }
            }
            SessionCallback::InvProgressUpdate { block, bar, value } => {
                if let Some(window) = &self.cur_window {
                    if window.block == block {
                        self.send_packets(&[Packet::WindowProgressBar {
                            window_id: window.window_id,
                            prg_bar_id: bar,
                            value,
                        }]);
                    }
                }
            }
            SessionCallback::InvCursorUpdate { block, cursor } => {
                if self
                    .cur_window
                    .as_ref()
                    .map(|window| window.block == block)
                    .unwrap_or(false)
                {
                    self.cursor = cursor;
                    self.send_packets(&[self
                        .cursor
                        .update_packet(WindowId::CURSOR, SlotId::CURSOR)]);
                }
            }
            SessionCallback::InvTxState {
                block,
                tx_id,
                accepted,
            } => {
                let mut reply = None;
                if let Some(window) = &mut self.cur_window {
                    if window.block == block {
                        window.pending_tx = None;
                        reply = Some(window.window_id);
                    }
                }
                if let Some(window_id) = reply {
                    self.send_packets(&[Packet::WindowTransaction {
                        window_id,
                        tx_id,
                        accepted,
                    }]);
                }
            }
            SessionCallback::InvUnsubscribed { block } => {
                if self
                    .cur_window
                    .as_ref()
                    .map(|window| window.block == block)
                    .unwrap_or(false)
                {
                    if let Some(window) = self.cur_window.take() {
                        self.send_packets(&[Packet::WindowClose {
                            window_id: window.window_id,
                        }]);
                    }
                }
            }
        }
    }

    fn on_chunk_loaded(&mut self) {
        if self.spawn_complete {
            return;
        }
        self.spawn_complete = true;

        // Clients fall through the block unless spawned slightly above it.
        self.position.y += 0.01;

        let slots: Vec<shardcraft_proto::ItemSlot> = self
            .inventory
            .inventory()
            .slots()
            .iter()
            .map(Slot::to_item_slot)
            .collect();

        self.send_packets(&[
            Packet::PlayerPositionLook {
                x: self.position.x,
                // Server-to-client order: stance first, then feet.
                y1: self.position.y + self.height,
                y2: self.position.y,
                z: self.position.z,
                look: self.look,
                on_ground: false,
            },
            Packet::WindowItems {
                window_id: WindowId::INVENTORY,
                slots: shardcraft_proto::ItemSlotVec(slots),
            },
            Packet::UpdateHealth {
                health: self.health,
                food: self.food,
                food_saturation: 0.0,
            },
        ]);
    }

    async fn give_item(&mut self, at: AbsXyz, mut item: Slot, subs: &mut ChunkSubscriptions) {
        let max_stack = self.ctx.rules.items.max_stack(item.item_type);
        let changed = self.inventory.put_item(&mut item, max_stack);

        let updates: Vec<Packet> = changed
            .iter()
            .map(|index| self.slot_update_packet(*index))
            .collect();
        self.send_packets(&updates);

        // Whatever did not fit goes back to the world as a drop.
        if !item.is_empty() {
            let chunk = at.to_chunk_xz();
            if let Some(shard) = subs.shard_for_chunk(chunk) {
                shard
                    .drop_item(item, at, Default::default(), TICKS_PER_SECOND)
                    .await;
            }
        }
    }

    async fn place_held_item(
        &mut self,
        target: BlockXyz,
        was_held: Slot,
        subs: &mut ChunkSubscriptions,
    ) {
        // The held item may have changed since the chunk saw it.
        if !self.inventory.held_item().is_same_type(&was_held) {
            return;
        }

        let taken = self.inventory.take_one_held();
        if taken.is_empty() {
            return;
        }
        self.send_held_slot_update();

        if let Some((shard, _)) = subs.shard_for_block(&target) {
            shard.place_item(target, taken).await;
        }
    }

    async fn open_remote_window(
        &mut self,
        block: BlockXyz,
        inv_type: InvTypeId,
        slots: Vec<Slot>,
        subs: &mut ChunkSubscriptions,
    ) {
        self.close_current_window(true, subs).await;

        let window_id = self.next_window_id;
        self.next_window_id = if window_id == WindowId::FREE_MAX {
            WindowId::FREE_MIN
        } else {
            WindowId(window_id.0 + 1)
        };

        let window = RemoteWindow::new(window_id, block, inv_type, slots);
        let packets = window.open_packets(&self.inventory);
        self.cur_window = Some(window);
        self.send_packets(&packets);
    }

    // Persistence.

    fn marshal_nbt(&self) -> Compound {
        let mut tag = Compound::new();
        tag.set(
            "Pos",
            Tag::List(vec![
                Tag::Double(self.position.x),
                Tag::Double(self.position.y),
                Tag::Double(self.position.z),
            ]),
        );
        tag.set(
            "Rotation",
            Tag::List(vec![
                Tag::Float(self.look.yaw.0),
                Tag::Float(self.look.pitch.0),
            ]),
        );
        tag.set("Health", Tag::Short(self.health));
        tag.set("Food", Tag::Short(self.food));
        tag.set("OnGround", Tag::Byte(self.on_ground as i8));
        tag.set("FallDistance", Tag::Float(self.fall_distance));
        tag.set("Air", Tag::Short(self.air));
        tag.set("Fire", Tag::Short(self.fire));
        tag.set("Dimension", Tag::Int(self.dimension));
        tag.set(
            "Motion",
            Tag::List(vec![Tag::Double(0.0), Tag::Double(0.0), Tag::Double(0.0)]),
        );
        self.inventory.marshal_nbt(&mut tag);
        tag
    }

    fn apply_nbt(&mut self, tag: &Compound) {
        if let Some([x, y, z]) = tag.get_double_list::<3>("Pos") {
            self.position = AbsXyz::new(x, y, z);
        }
        if let Some([yaw, pitch]) = tag.get_float_list::<2>("Rotation") {
            self.look = LookDegrees::new(yaw, pitch);
        }
        if let Some(health) = tag.get_short("Health") {
            self.health = health;
        }
        if let Some(food) = tag.get_short("Food") {
            self.food = food;
        }
        if let Some(on_ground) = tag.get_byte("OnGround") {
            self.on_ground = on_ground != 0;
        }
        if let Some(fall) = tag.get_float("FallDistance") {
            self.fall_distance = fall;
        }
        if let Some(air) = tag.get_short("Air") {
            self.air = air;
        }
        if let Some(fire) = tag.get_short("Fire") {
            self.fire = fire;
        }
        if let Some(dimension) = tag.get_int("Dimension") {
            self.dimension = dimension;
        }
        self.inventory.unmarshal_nbt(tag);
    }
}

/// Resolved main-loop event, so branch handlers run with full access to
/// the session.
enum Event {
    Rx(Packet),
    Callback(SessionCallback),
    RxError(Option<ProtoError>),
    TxError(Option<std::io::Error>),
    Deadline,
    Fatal,
}
