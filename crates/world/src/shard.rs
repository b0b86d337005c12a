//! The chunk-shard actor runtime.
//!
//! The world is partitioned into shards of `SHARD_SIZE`-square chunk
//! groups. Each shard runs as one tokio task owning its chunks outright:
//! a bounded request channel serializes every mutation, a tick interval
//! drives per-chunk simulation, and a stop signal flushes dirty chunks on
//! the way out. Cross-shard effects travel as requests between shard
//! queues; nothing shares mutable state.

use crate::chunk::{Chunk, ChunkCtx, NeighbourQuery};
use crate::client::PlayerHandle;
use crate::entity::Spawn;
use crate::inventory::Click;
use crate::presence::PlayerPresence;
use crate::rules::GameRules;
use crate::slot::Slot;
use crate::store::ChunkStoreHandle;
use shardcraft_core::{
    AbsVelocity, AbsXyz, BlockId, BlockXyz, ChunkXz, DigStatus, EntityId, EntityIdAllocator, Face,
    LookBytes, ShardXz, SubChunkXyz, Ticks, TICKS_PER_SECOND,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Depth of each shard's request queue.
const SHARD_QUEUE_DEPTH: usize = 256;

/// How often chunks with subscribers get written back, in ticks.
const FLUSH_INTERVAL_TICKS: u64 = 100;

/// One request on a shard's queue.
pub enum ShardRequest {
    SubscribeChunk {
        loc: ChunkXz,
        player: PlayerHandle,
        notify: bool,
    },
    UnsubscribeChunk {
        loc: ChunkXz,
        entity_id: EntityId,
        send_packet: bool,
    },
    MulticastPlayers {
        loc: ChunkXz,
        exclude: Option<EntityId>,
        data: Vec<u8>,
    },
    AddPlayerData {
        loc: ChunkXz,
        presence: PlayerPresence,
    },
    RemovePlayerData {
        loc: ChunkXz,
        entity_id: EntityId,
        is_disconnect: bool,
    },
    SetPlayerPositionLook {
        loc: ChunkXz,
        entity_id: EntityId,
        position: AbsXyz,
        look: LookBytes,
        moved: bool,
    },
    SetPlayerLook {
        loc: ChunkXz,
        entity_id: EntityId,
        look: LookBytes,
    },
    HitBlock {
        player: PlayerHandle,
        held: Slot,
        status: DigStatus,
        target: BlockXyz,
        face: Face,
    },
    InteractBlock {
        player: PlayerHandle,
        held: Slot,
        target: BlockXyz,
        face: Face,
    },
    PlaceItem {
        player: PlayerHandle,
        target: BlockXyz,
        slot: Slot,
    },
    TakeItem {
        player: PlayerHandle,
        loc: ChunkXz,
        entity_id: EntityId,
    },
    DropItem {
        content: Slot,
        position: AbsXyz,
        velocity: AbsVelocity,
        pickup_immunity: Ticks,
    },
    InventoryClick {
        player: PlayerHandle,
        target: BlockXyz,
        click: Click,
    },
    InventoryUnsubscribed {
        entity_id: EntityId,
        target: BlockXyz,
    },
    SignUpdate {
        target: BlockXyz,
        lines: [String; 4],
    },
    TransferEntity {
        loc: ChunkXz,
        spawn: Spawn,
    },
    BlockQuery {
        loc: ChunkXz,
        sub: SubChunkXyz,
        reply: oneshot::Sender<(BlockId, bool)>,
    },
    Disconnect {
        entity_id: EntityId,
    },
}

/// Shard runtime tuning.
#[derive(Debug, Clone)]
pub struct ShardConfig {
    pub tick_period: Duration,
    pub spawn_mobs: bool,
}

impl Default for ShardConfig {
    fn default() -> Self {
        ShardConfig {
            tick_period: Duration::from_millis(1000 / TICKS_PER_SECOND as u64),
            spawn_mobs: false,
        }
    }
}

struct ShardEntry {
    tx: mpsc::Sender<ShardRequest>,
    handle: JoinHandle<()>,
}

/// Creates shards on demand and routes cross-shard traffic. The only
/// mutable state is the map of shard senders behind a mutex; rules and
/// allocator are immutable/shared.
pub struct LocalShardManager {
    shards: Mutex<HashMap<u64, ShardEntry>>,
    store: ChunkStoreHandle,
    rules: Arc<GameRules>,
    entities: Arc<EntityIdAllocator>,
    config: ShardConfig,
    stop_tx: watch::Sender<bool>,
}

impl LocalShardManager {
    /// Build a manager over a chunk store and rule set.
    pub fn new(
        store: ChunkStoreHandle,
        rules: Arc<GameRules>,
        entities: Arc<EntityIdAllocator>,
        config: ShardConfig,
    ) -> Arc<LocalShardManager> {
        let (stop_tx, _) = watch::channel(false);
        Arc::new(LocalShardManager {
            shards: Mutex::new(HashMap::new()),
            store,
            rules,
            entities,
            config,
            stop_tx,
        })
    }

    /// The sender for a shard, spawning its task on first use.
    pub fn shard_sender(self: &Arc<Self>, loc: ShardXz) -> mpsc::Sender<ShardRequest> {
        let mut shards = self.shards.lock().expect("shard map poisoned");
        if let Some(entry) = shards.get(&loc.key()) {
            return entry.tx.clone();
        }

        info!("starting {loc}");
        let (tx, rx) = mpsc::channel(SHARD_QUEUE_DEPTH);
        let shard = ChunkShard {
            loc,
            chunks: HashMap::new(),
            mgr: Arc::clone(self),
            ticks: 0,
        };
        let handle = tokio::spawn(shard.run(rx, self.stop_tx.subscribe()));
        shards.insert(
            loc.key(),
            ShardEntry {
                tx: tx.clone(),
                handle,
            },
        );
        tx
    }

    /// Open a per-player connection to a shard.
    pub fn connect(self: &Arc<Self>, player: PlayerHandle, loc: ShardXz) -> ShardClientConn {
        ShardClientConn {
            loc,
            tx: self.shard_sender(loc),
            player,
        }
    }

    /// Route an entity transfer to whichever shard owns `loc`. Only
    /// already-running shards accept transfers; otherwise the entity id is
    /// released.
    fn route_transfer(&self, loc: ChunkXz, spawn: Spawn) {
        let shard_loc = loc.to_shard_xz();
        let shards = self.shards.lock().expect("shard map poisoned");
        let Some(entry) = shards.get(&shard_loc.key()) else {
            debug!("dropping entity headed for unstarted {shard_loc}");
            self.entities.free(spawn.entity_id());
            return;
        };

        if let Err(err) = entry.tx.try_send(ShardRequest::TransferEntity { loc, spawn }) {
            if let ShardRequest::TransferEntity { spawn, .. } = err.into_inner() {
                warn!("{shard_loc}: queue full, dropping transferred entity");
                self.entities.free(spawn.entity_id());
            }
        }
    }

    /// Signal every shard to stop and wait for them to flush and exit.
    pub async fn stop_all(&self) {
        let entries: Vec<ShardEntry> = {
            let mut shards = self.shards.lock().expect("shard map poisoned");
            shards.drain().map(|(_, entry)| entry).collect()
        };
        let _ = self.stop_tx.send(true);
        for entry in entries {
            if let Err(err) = entry.handle.await {
                warn!("shard task failed on shutdown: {err}");
            }
        }
    }
}

/// A player's connection to one shard: the public shard contract.
#[derive(Clone)]
pub struct ShardClientConn {
    loc: ShardXz,
    tx: mpsc::Sender<ShardRequest>,
    player: PlayerHandle,
}

impl ShardClientConn {
    /// This connection's shard.
    pub fn shard_loc(&self) -> ShardXz {
        self.loc
    }

    async fn send(&self, request: ShardRequest) {
        // A closed queue means the shard stopped; requests are dropped by
        // design.
        let _ = self.tx.send(request).await;
    }

    pub async fn subscribe_chunk(&self, loc: ChunkXz, notify: bool) {
        self.send(ShardRequest::SubscribeChunk {
            loc,
            player: self.player.clone(),
            notify,
        })
        .await;
    }

    pub async fn unsubscribe_chunk(&self, loc: ChunkXz, send_packet: bool) {
        self.send(ShardRequest::UnsubscribeChunk {
            loc,
            entity_id: self.player.entity_id(),
            send_packet,
        })
        .await;
    }

    pub async fn multicast_players(&self, loc: ChunkXz, exclude: Option<EntityId>, data: Vec<u8>) {
        self.send(ShardRequest::MulticastPlayers { loc, exclude, data })
            .await;
    }

    pub async fn add_player_data(&self, loc: ChunkXz, presence: PlayerPresence) {
        self.send(ShardRequest::AddPlayerData { loc, presence })
            .await;
    }

    pub async fn remove_player_data(&self, loc: ChunkXz, is_disconnect: bool) {
        self.send(ShardRequest::RemovePlayerData {
            loc,
            entity_id: self.player.entity_id(),
            is_disconnect,
        })
        .await;
    }

    pub async fn set_player_position_look(
        &self,
        loc: ChunkXz,
        position: AbsXyz,
        look: LookBytes,
        moved: bool,
    ) {
        self.send(ShardRequest::SetPlayerPositionLook {
            loc,
            entity_id: self.player.entity_id(),
            position,
            look,
            moved,
        })
        .await;
    }

    pub async fn set_player_look(&self, loc: ChunkXz, look: LookBytes) {
        self.send(ShardRequest::SetPlayerLook {
            loc,
            entity_id: self.player.entity_id(),
            look,
        })
        .await;
    }

    pub async fn hit_block(&self, held: Slot, status: DigStatus, target: BlockXyz, face: Face) {
        self.send(ShardRequest::HitBlock {
            player: self.player.clone(),
            held,
            status,
            target,
            face,
        })
        .await;
    }

    pub async fn interact_block(&self, held: Slot, target: BlockXyz, face: Face) {
        self.send(ShardRequest::InteractBlock {
            player: self.player.clone(),
            held,
            target,
            face,
        })
        .await;
    }

    pub async fn place_item(&self, target: BlockXyz, slot: Slot) {
        self.send(ShardRequest::PlaceItem {
            player: self.player.clone(),
            target,
            slot,
        })
        .await;
    }

    pub async fn take_item(&self, loc: ChunkXz, entity_id: EntityId) {
        self.send(ShardRequest::TakeItem {
            player: self.player.clone(),
            loc,
            entity_id,
        })
        .await;
    }

    pub async fn drop_item(
        &self,
        content: Slot,
        position: AbsXyz,
        velocity: AbsVelocity,
        pickup_immunity: Ticks,
    ) {
        self.send(ShardRequest::DropItem {
            content,
            position,
            velocity,
            pickup_immunity,
        })
        .await;
    }

    pub async fn inventory_click(&self, target: BlockXyz, click: Click) {
        self.send(ShardRequest::InventoryClick {
            player: self.player.clone(),
            target,
            click,
        })
        .await;
    }

    pub async fn inventory_unsubscribed(&self, target: BlockXyz) {
        self.send(ShardRequest::InventoryUnsubscribed {
            entity_id: self.player.entity_id(),
            target,
        })
        .await;
    }

    pub async fn sign_update(&self, target: BlockXyz, lines: [String; 4]) {
        self.send(ShardRequest::SignUpdate { target, lines }).await;
    }

    /// Synchronous block read with a capacity-one reply channel. Returns
    /// `(air, false)` when the chunk is not loaded.
    pub async fn block_query(&self, loc: ChunkXz, sub: SubChunkXyz) -> (BlockId, bool) {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ShardRequest::BlockQuery {
            loc,
            sub,
            reply: reply_tx,
        })
        .await;
        reply_rx.await.unwrap_or((BlockId::AIR, false))
    }

    /// Drop this player's remaining state in the shard.
    pub async fn disconnect(&self) {
        self.send(ShardRequest::Disconnect {
            entity_id: self.player.entity_id(),
        })
        .await;
    }
}

enum ChunkSlot {
    Loaded(Box<Chunk>),
    /// Load was attempted and failed; treated as absent.
    Absent,
}

/// The single-task owner of a shard's chunks.
struct ChunkShard {
    loc: ShardXz,
    chunks: HashMap<ChunkXz, ChunkSlot>,
    mgr: Arc<LocalShardManager>,
    ticks: u64,
}

impl ChunkShard {
    async fn run(mut self, mut rx: mpsc::Receiver<ShardRequest>, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.mgr.config.tick_period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                request = rx.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => break,
                },
                _ = ticker.tick() => self.tick().await,
                _ = stop.changed() => break,
            }
        }

        self.flush(true).await;
        info!("{} stopped", self.loc);
    }

    fn owns(&self, loc: ChunkXz) -> bool {
        loc.to_shard_xz() == self.loc
    }

    /// Ensure the chunk at `loc` is resident, loading it through the
    /// store on first demand. Returns false when the chunk is absent.
    async fn ensure_loaded(&mut self, loc: ChunkXz) -> bool {
        if !self.owns(loc) {
            warn!("{}: request for foreign chunk {loc}", self.loc);
            return false;
        }

        if !self.chunks.contains_key(&loc) {
            let rules = Arc::clone(&self.mgr.rules);
            let entities = Arc::clone(&self.mgr.entities);
            let slot = match self.mgr.store.read(loc).await {
                Some(snapshot) => {
                    let ctx = ChunkCtx {
                        rules: &rules,
                        entities: &entities,
                        spawn_mobs: self.mgr.config.spawn_mobs,
                    };
                    ChunkSlot::Loaded(Box::new(Chunk::from_snapshot(snapshot, &ctx)))
                }
                None => ChunkSlot::Absent,
            };
            self.chunks.insert(loc, slot);
        }

        matches!(self.chunks.get(&loc), Some(ChunkSlot::Loaded(_)))
    }

    /// The chunk at `loc` only if already loaded.
    fn loaded(&mut self, loc: ChunkXz) -> Option<&mut Chunk> {
        match self.chunks.get_mut(&loc) {
            Some(ChunkSlot::Loaded(chunk)) => Some(chunk),
            _ => None,
        }
    }

    fn loaded_for_block(&mut self, target: &BlockXyz) -> Option<&mut Chunk> {
        let (loc, _) = target.to_chunk_local();
        self.loaded(loc)
    }

    async fn handle(&mut self, request: ShardRequest) {
        let rules = Arc::clone(&self.mgr.rules);
        let entities = Arc::clone(&self.mgr.entities);
        let ctx = ChunkCtx {
            rules: &rules,
            entities: &entities,
            spawn_mobs: self.mgr.config.spawn_mobs,
        };

        match request {
            ShardRequest::SubscribeChunk {
                loc,
                player,
                notify,
            } => {
                if self.ensure_loaded(loc).await {
                    if let Some(chunk) = self.loaded(loc) {
                        chunk.req_subscribe(player, notify);
                    }
                } else {
                    debug!("{}: subscribe to absent chunk {loc}", self.loc);
                }
            }
            ShardRequest::UnsubscribeChunk {
                loc,
                entity_id,
                send_packet,
            } => {
                let mut unload = false;
                if let Some(chunk) = self.loaded(loc) {
                    chunk.req_unsubscribe(entity_id, send_packet);
                    unload = !chunk.has_subscribers();
                }
                if unload {
                    self.unload_chunk(loc).await;
                }
            }
            ShardRequest::MulticastPlayers { loc, exclude, data } => {
                if let Some(chunk) = self.loaded(loc) {
                    chunk.req_multicast(exclude, &data);
                }
            }
            ShardRequest::AddPlayerData { loc, presence } => {
                if let Some(chunk) = self.loaded(loc) {
                    chunk.req_add_player_data(presence);
                }
            }
            ShardRequest::RemovePlayerData {
                loc,
                entity_id,
                is_disconnect,
            } => {
                if let Some(chunk) = self.loaded(loc) {
                    chunk.req_remove_player_data(entity_id, is_disconnect);
                }
            }
            ShardRequest::SetPlayerPositionLook {
                loc,
                entity_id,
                position,
                look,
                moved,
            } => {
                if let Some(chunk) = self.loaded(loc) {
                    chunk.req_set_player_position_look(entity_id, position, look, moved);
                }
            }
            ShardRequest::SetPlayerLook {
                loc,
                entity_id,
                look,
            } => {
                if let Some(chunk) = self.loaded(loc) {
                    chunk.req_set_player_look(entity_id, look);
                }
            }
            ShardRequest::HitBlock {
                player,
                held,
                status,
                target,
                face,
            } => {
                if let Some(chunk) = self.loaded_for_block(&target) {
                    chunk.req_hit_block(&ctx, &player, held, status, &target, face);
                }
            }
            ShardRequest::InteractBlock {
                player,
                held,
                target,
                face,
            } => {
                if let Some(chunk) = self.loaded_for_block(&target) {
                    chunk.req_interact_block(&ctx, &player, held, &target, face);
                }
            }
            ShardRequest::PlaceItem {
                player,
                target,
                slot,
            } => {
                if let Some(chunk) = self.loaded_for_block(&target) {
                    chunk.req_place_item(&ctx, &player, &target, slot);
                }
            }
            ShardRequest::TakeItem {
                player,
                loc,
                entity_id,
            } => {
                if let Some(chunk) = self.loaded(loc) {
                    chunk.req_take_item(&ctx, &player, entity_id);
                }
            }
            ShardRequest::DropItem {
                content,
                position,
                velocity,
                pickup_immunity,
            } => {
                let loc = position.to_chunk_xz();
                if let Some(chunk) = self.loaded(loc) {
                    chunk.req_drop_item(&ctx, content, position, velocity, pickup_immunity);
                }
            }
            ShardRequest::InventoryClick {
                player,
                target,
                click,
            } => {
                if let Some(chunk) = self.loaded_for_block(&target) {
                    chunk.req_inventory_click(&ctx, &player, &target, &click);
                }
            }
            ShardRequest::InventoryUnsubscribed { entity_id, target } => {
                if let Some(chunk) = self.loaded_for_block(&target) {
                    chunk.req_inventory_unsubscribed(entity_id, &target);
                }
            }
            ShardRequest::SignUpdate { target, lines } => {
                if let Some(chunk) = self.loaded_for_block(&target) {
                    chunk.req_sign_update(&target, lines);
                }
            }
            ShardRequest::TransferEntity { loc, spawn } => {
                if let Some(chunk) = self.loaded(loc) {
                    chunk.transfer_spawn(spawn);
                } else {
                    debug!("{}: transfer into unavailable chunk {loc}", self.loc);
                    entities.free(spawn.entity_id());
                }
            }
            ShardRequest::BlockQuery { loc, sub, reply } => {
                let result = self
                    .loaded(loc)
                    .and_then(|chunk| chunk.block_query(&sub))
                    .map(|id| (id, true))
                    .unwrap_or((BlockId::AIR, false));
                let _ = reply.send(result);
            }
            ShardRequest::Disconnect { entity_id } => {
                let mut emptied = Vec::new();
                for (loc, slot) in self.chunks.iter_mut() {
                    if let ChunkSlot::Loaded(chunk) = slot {
                        chunk.req_unsubscribe(entity_id, false);
                        if !chunk.has_subscribers() {
                            emptied.push(*loc);
                        }
                    }
                }
                for loc in emptied {
                    self.unload_chunk(loc).await;
                }
            }
        }
    }

    /// Flush (if dirty) and drop a chunk, releasing its entity ids.
    async fn unload_chunk(&mut self, loc: ChunkXz) {
        match self.chunks.remove(&loc) {
            Some(ChunkSlot::Loaded(chunk)) => {
                if chunk.is_dirty() {
                    self.mgr.store.write(chunk.to_snapshot()).await;
                }
                for entity_id in chunk.spawn_ids() {
                    self.mgr.entities.free(entity_id);
                }
            }
            Some(ChunkSlot::Absent) | None => {}
        }
    }

    async fn tick(&mut self) {
        self.ticks += 1;
        let rules = Arc::clone(&self.mgr.rules);
        let entities = Arc::clone(&self.mgr.entities);

        let locs: Vec<ChunkXz> = self
            .chunks
            .iter()
            .filter_map(|(loc, slot)| matches!(slot, ChunkSlot::Loaded(_)).then_some(*loc))
            .collect();

        let mut transfers: Vec<(ChunkXz, Spawn)> = Vec::new();
        for loc in locs {
            let Some(ChunkSlot::Loaded(mut chunk)) = self.chunks.remove(&loc) else {
                continue;
            };

            let outgoing = {
                let ctx = ChunkCtx {
                    rules: &rules,
                    entities: &entities,
                    spawn_mobs: self.mgr.config.spawn_mobs,
                };
                let chunks = &self.chunks;
                let mut neighbours = |block: &BlockXyz| -> Option<bool> {
                    let (neighbour_loc, sub) = block.to_chunk_local();
                    match chunks.get(&neighbour_loc) {
                        Some(ChunkSlot::Loaded(neighbour)) => neighbour
                            .block_query(&sub)
                            .map(|id| rules.blocks.is_solid(id)),
                        _ => None,
                    }
                };
                let neighbours: NeighbourQuery<'_> = &mut neighbours;
                chunk.tick(&ctx, neighbours)
            };

            self.chunks.insert(loc, ChunkSlot::Loaded(chunk));
            for spawn in outgoing {
                transfers.push((spawn.position().to_chunk_xz(), spawn));
            }
        }

        // Same-shard transfers land in the same tick; cross-shard ones go
        // through the destination shard's queue.
        for (dest, spawn) in transfers {
            if self.owns(dest) {
                if let Some(chunk) = self.loaded(dest) {
                    chunk.transfer_spawn(spawn);
                } else {
                    debug!("{}: transfer into unavailable chunk {dest}", self.loc);
                    entities.free(spawn.entity_id());
                }
            } else {
                self.mgr.route_transfer(dest, spawn);
            }
        }

        if self.ticks % FLUSH_INTERVAL_TICKS == 0 {
            self.flush(false).await;
        }
    }

    /// Write dirty chunks back; `all` also covers chunks without
    /// subscribers (shutdown).
    async fn flush(&mut self, all: bool) {
        let locs: Vec<ChunkXz> = self.chunks.keys().copied().collect();
        for loc in locs {
            let Some(ChunkSlot::Loaded(chunk)) = self.chunks.get_mut(&loc) else {
                continue;
            };
            if chunk.is_dirty() && (all || chunk.has_subscribers()) {
                let snapshot = chunk.to_snapshot();
                chunk.mark_clean();
                self.mgr.store.write(snapshot).await;
            }
        }
    }
}
