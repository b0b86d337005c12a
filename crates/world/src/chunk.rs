//! A chunk: a 16x128x16 column of blocks plus everything living in it.
//!
//! All public operations on a chunk execute inside its owning shard's task
//! and are written as plain single-threaded code. The `req_*` methods are
//! the request handlers the shard dispatches to; they mutate chunk state,
//! talk back to players through their [`PlayerHandle`]s, and multicast
//! updates to subscribers.

use crate::block::AspectKind;
use crate::client::PlayerHandle;
use crate::entity::{Item, Mob, Spawn};
use crate::inventory::Click;
use crate::presence::PlayerPresence;
use crate::rules::GameRules;
use crate::slot::Slot;
use crate::store::ChunkSnapshot;
use crate::tile_entity::{TileEntity, TileState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shardcraft_core::{
    AbsVelocity, AbsXyz, BlockId, BlockXyz, ChunkXz, DigStatus, EntityId, EntityIdAllocator, Face,
    LookBytes, SubChunkXyz, Ticks, CHUNK_SIZE_H, CHUNK_SIZE_Y, CHUNK_VOLUME, TICKS_PER_SECOND,
};
use shardcraft_proto::{
    serialize_packets, ChunkData, ChunkDataSize, ChunkLoadMode, Packet,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, warn};

/// Ticks a fresh drop stays immune to pickup.
pub const DROP_PICKUP_IMMUNITY: Ticks = TICKS_PER_SECOND / 2;

/// Shared context a shard passes into chunk request handlers.
pub struct ChunkCtx<'a> {
    pub rules: &'a GameRules,
    pub entities: &'a EntityIdAllocator,
    /// Experimental: spawn a pig in player-occupied chunks without mobs.
    pub spawn_mobs: bool,
}

/// Whether a block is solid; `None` when the chunk holding it is not
/// available.
pub type NeighbourQuery<'a> = &'a mut dyn FnMut(&BlockXyz) -> Option<bool>;

/// A 16x128x16 column of blocks and its inhabitants.
pub struct Chunk {
    loc: ChunkXz,
    blocks: Vec<u8>,
    block_data: Vec<u8>,
    block_light: Vec<u8>,
    sky_light: Vec<u8>,
    height_map: Vec<u8>,
    spawns: HashMap<EntityId, Spawn>,
    tile_entities: HashMap<usize, TileEntity>,
    subscribers: HashMap<EntityId, PlayerHandle>,
    players: HashMap<EntityId, PlayerPresence>,
    active_blocks: HashSet<usize>,
    next_active_blocks: HashSet<usize>,
    tick_all_blocks: bool,
    cached_packet: Option<Vec<u8>>,
    dirty: bool,
    rand: StdRng,
}

impl std::fmt::Display for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Chunk[{},{}]", self.loc.x, self.loc.z)
    }
}

impl Chunk {
    /// Build a chunk from stored (or generated) data. Entities regain
    /// fresh entity ids.
    pub fn from_snapshot(snap: ChunkSnapshot, ctx: &ChunkCtx<'_>) -> Chunk {
        let nibbles = CHUNK_VOLUME / 2;
        let mut chunk = Chunk {
            loc: snap.loc,
            blocks: fit(snap.blocks, CHUNK_VOLUME),
            block_data: fit(snap.block_data, nibbles),
            block_light: fit(snap.block_light, nibbles),
            sky_light: fit(snap.sky_light, nibbles),
            height_map: fit(snap.height_map, (CHUNK_SIZE_H * CHUNK_SIZE_H) as usize),
            spawns: HashMap::new(),
            tile_entities: HashMap::new(),
            subscribers: HashMap::new(),
            players: HashMap::new(),
            active_blocks: HashSet::new(),
            next_active_blocks: HashSet::new(),
            tick_all_blocks: true,
            cached_packet: None,
            dirty: false,
            rand: StdRng::from_entropy(),
        };

        for tag in &snap.entities {
            if let Some(mut spawn) = Spawn::unmarshal_nbt(tag) {
                spawn.set_entity_id(ctx.entities.alloc());
                chunk.spawns.insert(spawn.entity_id(), spawn);
            }
        }
        for tag in &snap.tile_entities {
            if let Some(tile) = TileEntity::unmarshal_nbt(tag) {
                let (chunk_loc, sub) = tile.block.to_chunk_local();
                if chunk_loc != chunk.loc {
                    warn!("{chunk}: dropping tile entity outside chunk at {:?}", tile.block);
                    continue;
                }
                if let Some(index) = sub.block_index() {
                    chunk.tile_entities.insert(index, tile);
                }
            }
        }

        chunk
    }

    /// Snapshot for persistence.
    pub fn to_snapshot(&self) -> ChunkSnapshot {
        ChunkSnapshot {
            loc: self.loc,
            blocks: self.blocks.clone(),
            block_data: self.block_data.clone(),
            block_light: self.block_light.clone(),
            sky_light: self.sky_light.clone(),
            height_map: self.height_map.clone(),
            entities: self.spawns.values().map(Spawn::marshal_nbt).collect(),
            tile_entities: self
                .tile_entities
                .values()
                .map(TileEntity::marshal_nbt)
                .collect(),
        }
    }

    /// This chunk's location.
    pub fn loc(&self) -> ChunkXz {
        self.loc
    }

    /// Whether the chunk changed since it was last written out.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clear the dirty flag after a successful write-back.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Whether any player subscribes to this chunk.
    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.is_empty()
    }

    // Block array accessors.

    fn block_index(&self, target: &BlockXyz) -> Option<(SubChunkXyz, usize)> {
        let (chunk_loc, sub) = target.to_chunk_local();
        if chunk_loc != self.loc {
            warn!("{self}: position {target:?} is not within chunk");
            return None;
        }
        match sub.block_index() {
            Some(index) => Some((sub, index)),
            None => {
                warn!("{self}: invalid position {target:?} within chunk");
                None
            }
        }
    }

    fn nibble(arr: &[u8], index: usize) -> u8 {
        let byte = arr[index / 2];
        if index % 2 == 0 {
            byte & 0x0f
        } else {
            byte >> 4
        }
    }

    fn set_nibble(arr: &mut [u8], index: usize, value: u8) {
        let byte = &mut arr[index / 2];
        if index % 2 == 0 {
            *byte = (*byte & 0xf0) | (value & 0x0f);
        } else {
            *byte = (*byte & 0x0f) | (value << 4);
        }
    }

    fn block_data_at(&self, index: usize) -> u8 {
        Self::nibble(&self.block_data, index)
    }

    // Subscription handling.

    /// Idempotently add a subscriber and send it the full chunk state:
    /// pre-chunk init, the cached map-chunk packet, every entity spawn,
    /// and every *other* player present.
    pub fn req_subscribe(&mut self, player: PlayerHandle, notify: bool) {
        let entity_id = player.entity_id();

        match serialize_packets(&[Packet::PreChunk {
            chunk_loc: self.loc,
            mode: ChunkLoadMode::INIT,
        }]) {
            Ok(data) => player.transmit(data),
            Err(err) => error!("{self}: pre-chunk serialization failed: {err}"),
        }
        player.transmit(self.chunk_packet());

        if !self.spawns.is_empty() {
            let mut pkts = Vec::new();
            for spawn in self.spawns.values() {
                spawn.spawn_packets(&mut pkts);
            }
            match serialize_packets(&pkts) {
                Ok(data) => player.transmit(data),
                Err(err) => error!("{self}: entity spawn serialization failed: {err}"),
            }
        }

        let others: Vec<Packet> = self
            .players
            .values()
            .filter(|presence| presence.entity_id != entity_id)
            .map(PlayerPresence::spawn_packet)
            .collect();
        if !others.is_empty() {
            match serialize_packets(&others) {
                Ok(data) => player.transmit(data),
                Err(err) => error!("{self}: player spawn serialization failed: {err}"),
            }
        }

        if notify {
            player.notify_chunk_load();
        }
        self.subscribers.insert(entity_id, player);
    }

    /// Remove a subscriber, optionally telling the client to unload the
    /// chunk.
    pub fn req_unsubscribe(&mut self, entity_id: EntityId, send_packet: bool) {
        if let Some(player) = self.subscribers.remove(&entity_id) {
            if send_packet {
                match serialize_packets(&[Packet::PreChunk {
                    chunk_loc: self.loc,
                    mode: ChunkLoadMode::UNLOAD,
                }]) {
                    Ok(data) => player.transmit(data),
                    Err(err) => error!("{self}: pre-chunk serialization failed: {err}"),
                }
            }
        }

        // Close any tile-entity windows the player still had open here.
        for tile in self.tile_entities.values_mut() {
            tile.unsubscribe(entity_id);
        }
    }

    /// Send raw bytes to every subscriber except (optionally) one.
    pub fn req_multicast(&self, exclude: Option<EntityId>, data: &[u8]) {
        for (entity_id, player) in &self.subscribers {
            if Some(*entity_id) != exclude {
                player.transmit(data.to_vec());
            }
        }
    }

    fn multicast_packets(&self, exclude: Option<EntityId>, pkts: &[Packet]) {
        if pkts.is_empty() {
            return;
        }
        match serialize_packets(pkts) {
            Ok(data) => self.req_multicast(exclude, &data),
            Err(err) => error!("{self}: multicast serialization failed: {err}"),
        }
    }

    // Entity handling.

    /// Create an entity in this chunk and announce it to subscribers.
    pub fn add_spawn(&mut self, ctx: &ChunkCtx<'_>, mut spawn: Spawn) {
        spawn.set_entity_id(ctx.entities.alloc());
        let mut pkts = Vec::new();
        spawn.spawn_packets(&mut pkts);
        self.spawns.insert(spawn.entity_id(), spawn);
        self.multicast_packets(None, &pkts);
    }

    /// Accept an entity migrating in from a neighbouring chunk and spawn
    /// it for subscribers that have not seen it.
    pub fn transfer_spawn(&mut self, spawn: Spawn) {
        let mut pkts = Vec::new();
        spawn.spawn_packets(&mut pkts);
        self.spawns.insert(spawn.entity_id(), spawn);
        self.multicast_packets(None, &pkts);
    }

    fn remove_spawn(&mut self, ctx: &ChunkCtx<'_>, entity_id: EntityId) {
        if self.spawns.remove(&entity_id).is_some() {
            if !ctx.entities.free(entity_id) {
                error!("{self}: removed spawn {entity_id} was not a live entity");
            }
            self.multicast_packets(None, &[Packet::EntityDestroy { entity_id }]);
        }
    }

    fn drop_items(&mut self, ctx: &ChunkCtx<'_>, at: AbsXyz, slots: Vec<Slot>) {
        for slot in slots {
            let velocity = AbsVelocity::new(
                self.rand.gen_range(-0.1..0.1),
                0.2,
                self.rand.gen_range(-0.1..0.1),
            );
            self.add_spawn(
                ctx,
                Spawn::Item(Item::new(slot, at, velocity, DROP_PICKUP_IMMUNITY)),
            );
        }
    }

    // Block mutation.

    /// Write a block id and its data nibble, dropping any tile entity at
    /// that position, invalidating the cached map-chunk packet and telling
    /// subscribers.
    pub fn set_block(
        &mut self,
        ctx: &ChunkCtx<'_>,
        target: &BlockXyz,
        sub: &SubChunkXyz,
        index: usize,
        block_id: BlockId,
        data: u8,
    ) {
        self.cached_packet = None;
        self.blocks[index] = block_id.0;
        Self::set_nibble(&mut self.block_data, index, data);
        self.update_height(sub);
        self.dirty = true;

        if let Some(mut tile) = self.tile_entities.remove(&index) {
            let contents = tile.destroyed();
            self.drop_items(ctx, target.mid_point_to_abs_xyz(), contents);
        }

        self.multicast_packets(
            None,
            &[Packet::BlockChange {
                block: *target,
                block_type: block_id,
                block_data: data,
            }],
        );
    }

    /// Swap the block id without touching data or the tile entity (lit
    /// furnace flips).
    fn swap_block_id(&mut self, index: usize, block_id: BlockId) {
        self.cached_packet = None;
        self.blocks[index] = block_id.0;
        self.dirty = true;

        let sub = Self::sub_for_index(index);
        let target = self.loc.block_xyz(&sub);
        let data = self.block_data_at(index);
        self.multicast_packets(
            None,
            &[Packet::BlockChange {
                block: target,
                block_type: block_id,
                block_data: data,
            }],
        );
    }

    fn sub_for_index(index: usize) -> SubChunkXyz {
        let y = (index % CHUNK_SIZE_Y as usize) as u8;
        let z = ((index / CHUNK_SIZE_Y as usize) % CHUNK_SIZE_H as usize) as u8;
        let x = (index / (CHUNK_SIZE_Y as usize * CHUNK_SIZE_H as usize)) as u8;
        SubChunkXyz { x, y, z }
    }

    fn update_height(&mut self, sub: &SubChunkXyz) {
        let column = (sub.x as usize) * CHUNK_SIZE_H as usize + sub.z as usize;
        let base = SubChunkXyz {
            x: sub.x,
            y: 0,
            z: sub.z,
        };
        let Some(base_index) = base.block_index() else {
            return;
        };
        let mut height = 0u8;
        for y in (0..CHUNK_SIZE_Y as usize).rev() {
            if self.blocks[base_index + y] != 0 {
                height = (y + 1) as u8;
                break;
            }
        }
        self.height_map[column] = height;
    }

    // Gameplay request handlers.

    /// A player hit a block. Digging that completes destroys the block
    /// and spawns its drops.
    pub fn req_hit_block(
        &mut self,
        ctx: &ChunkCtx<'_>,
        _player: &PlayerHandle,
        _held: Slot,
        status: DigStatus,
        target: &BlockXyz,
        _face: Face,
    ) {
        let Some((sub, index)) = self.block_index(target) else {
            return;
        };

        let block_id = BlockId(self.blocks[index]);
        let Some(block_type) = ctx.rules.blocks.get(block_id) else {
            warn!("{self}: attempted to hit unknown block id {block_id:?}");
            return;
        };
        if !block_type.destructable || block_type.aspect == AspectKind::Void {
            return;
        }

        if status == DigStatus::BLOCK_BROKE {
            let rolls: Vec<Slot> = block_type
                .drops
                .iter()
                .filter_map(|drop| {
                    let sample = self.rand.gen_range(0..100u8);
                    drop.roll(sample).map(|roll| {
                        Slot::new(roll.item_type, roll.count, shardcraft_core::ItemData(0))
                    })
                })
                .collect();
            self.drop_items(ctx, target.mid_point_to_abs_xyz(), rolls);
            self.set_block(ctx, target, &sub, index, BlockId::AIR, 0);
        }
    }

    /// A player right-clicked a block. Placement routes the held item
    /// back to the player (the destination may be another chunk); tile
    /// entities open their windows.
    pub fn req_interact_block(
        &mut self,
        ctx: &ChunkCtx<'_>,
        player: &PlayerHandle,
        held: Slot,
        target: &BlockXyz,
        face: Face,
    ) {
        let Some((_, index)) = self.block_index(target) else {
            return;
        };

        let block_id = BlockId(self.blocks[index]);
        let Some(block_type) = ctx.rules.blocks.get(block_id) else {
            warn!("{self}: interact with unknown block id {block_id:?} at {target:?}");
            return;
        };

        let held_block = (!held.is_empty())
            .then(|| held.item_type.to_block_id())
            .flatten();
        if let (Some(_), true) = (held_block, block_type.attachable) {
            if let Some(dest) = target.neighbour(face) {
                player.place_held_item(dest, held);
            }
            return;
        }

        if let AspectKind::Chest | AspectKind::Workbench | AspectKind::Furnace = block_type.aspect {
            if let Some(state) = TileState::for_aspect(block_type.aspect) {
                let tile = self
                    .tile_entities
                    .entry(index)
                    .or_insert_with(|| TileEntity::new(*target, state));
                tile.subscribe(player.clone());
                self.dirty = true;
            }
        }
    }

    /// Place one item from a (already taken) held slot onto a replaceable
    /// block.
    pub fn req_place_item(
        &mut self,
        ctx: &ChunkCtx<'_>,
        player: &PlayerHandle,
        target: &BlockXyz,
        slot: Slot,
    ) {
        let Some(block_id) = slot.item_type.to_block_id() else {
            return;
        };
        if slot.count.0 < 1 {
            return;
        }
        let Some((sub, index)) = self.block_index(target) else {
            return;
        };

        let current = BlockId(self.blocks[index]);
        let replaceable = ctx
            .rules
            .blocks
            .get(current)
            .map(|b| b.replaceable)
            .unwrap_or(false);
        if !replaceable {
            // Hand the item back rather than losing it.
            player.give_item(target.mid_point_to_abs_xyz(), slot);
            return;
        }

        self.set_block(ctx, target, &sub, index, block_id, slot.data.0 as u8);
        self.next_active_blocks.insert(index);
    }

    /// A player asks to collect an item entity it overlaps.
    pub fn req_take_item(&mut self, ctx: &ChunkCtx<'_>, player: &PlayerHandle, entity_id: EntityId) {
        let player_id = player.entity_id();
        let Some(presence) = self.players.get(&player_id) else {
            debug!("{self}: take-item from player {player_id} without presence record");
            return;
        };

        let Some(Spawn::Item(item)) = self.spawns.get(&entity_id) else {
            return;
        };
        if !item.can_be_picked_up() || !presence.overlaps_item(item) {
            return;
        }

        player.give_item(item.body.position(), item.slot.clone());
        self.multicast_packets(
            None,
            &[Packet::ItemCollect {
                collected_item: entity_id,
                collector: player_id,
            }],
        );
        self.remove_spawn(ctx, entity_id);
    }

    /// Spawn a dropped item.
    pub fn req_drop_item(
        &mut self,
        ctx: &ChunkCtx<'_>,
        content: Slot,
        position: AbsXyz,
        velocity: AbsVelocity,
        pickup_immunity: Ticks,
    ) {
        if content.is_empty() {
            return;
        }
        self.add_spawn(
            ctx,
            Spawn::Item(Item::new(content, position, velocity, pickup_immunity)),
        );
    }

    /// A click inside a tile-entity window.
    pub fn req_inventory_click(
        &mut self,
        ctx: &ChunkCtx<'_>,
        player: &PlayerHandle,
        target: &BlockXyz,
        click: &Click,
    ) {
        let Some((_, index)) = self.block_index(target) else {
            return;
        };
        let Some(tile) = self.tile_entities.get_mut(&index) else {
            debug!("{self}: window click on missing tile entity at {target:?}");
            return;
        };

        tile.click(player, click, ctx.rules);
        // Furnace contents changed; give it a tick soon.
        self.next_active_blocks.insert(index);
        self.dirty = true;
    }

    /// A player closed a tile-entity window.
    pub fn req_inventory_unsubscribed(&mut self, player_id: EntityId, target: &BlockXyz) {
        let Some((_, index)) = self.block_index(target) else {
            return;
        };
        if let Some(tile) = self.tile_entities.get_mut(&index) {
            tile.unsubscribe(player_id);
        }
    }

    /// Update sign text and redistribute it.
    pub fn req_sign_update(&mut self, target: &BlockXyz, lines: [String; 4]) {
        let Some((_, index)) = self.block_index(target) else {
            return;
        };
        let Some(tile) = self.tile_entities.get_mut(&index) else {
            debug!("{self}: sign update for missing tile entity at {target:?}");
            return;
        };

        if tile.set_sign_text(lines.clone()) {
            self.dirty = true;
            let [text1, text2, text3, text4] = lines;
            self.multicast_packets(
                None,
                &[Packet::SignUpdate {
                    x: target.x,
                    y: target.y as i16,
                    z: target.z,
                    text1,
                    text2,
                    text3,
                    text4,
                }],
            );
        }
    }

    // Player presence.

    /// Record a player entering this chunk and announce it to the other
    /// subscribers.
    pub fn req_add_player_data(&mut self, presence: PlayerPresence) {
        let entity_id = presence.entity_id;
        let spawn = presence.spawn_packet();
        self.players.insert(entity_id, presence);
        self.multicast_packets(Some(entity_id), &[spawn]);
    }

    /// Remove a player's presence; on disconnect also destroy its entity
    /// for the remaining subscribers.
    pub fn req_remove_player_data(&mut self, entity_id: EntityId, is_disconnect: bool) {
        self.players.remove(&entity_id);
        if is_disconnect {
            self.multicast_packets(Some(entity_id), &[Packet::EntityDestroy { entity_id }]);
        }
    }

    /// Update a player's position/look, notify other subscribers, and
    /// offer any items the player now overlaps.
    pub fn req_set_player_position_look(
        &mut self,
        entity_id: EntityId,
        position: AbsXyz,
        look: LookBytes,
        moved: bool,
    ) {
        let Some(presence) = self.players.get_mut(&entity_id) else {
            warn!("{self}: position update for player {entity_id} not present as player data");
            return;
        };
        presence.position = position;
        presence.look = look;
        let update = presence.update_packet();
        let presence = presence.clone();
        self.multicast_packets(Some(entity_id), &[update]);

        if moved {
            if let Some(player) = self.subscribers.get(&entity_id) {
                for spawn in self.spawns.values() {
                    if let Spawn::Item(item) = spawn {
                        if item.can_be_picked_up() && presence.overlaps_item(item) {
                            player.offer_item(self.loc, item.entity_id, item.slot.clone());
                        }
                    }
                }
            }
        }
    }

    /// Update only the player's look direction.
    pub fn req_set_player_look(&mut self, entity_id: EntityId, look: LookBytes) {
        let Some(presence) = self.players.get_mut(&entity_id) else {
            return;
        };
        presence.look = look;
        let update = presence.update_packet();
        self.multicast_packets(Some(entity_id), &[update]);
    }

    // Queries.

    /// The block id at a chunk-local position, `None` when out of bounds.
    pub fn block_query(&self, sub: &SubChunkXyz) -> Option<BlockId> {
        sub.block_index().map(|index| BlockId(self.blocks[index]))
    }

    /// The serialized map-chunk packet for the whole grid, built on first
    /// demand and cached until a block mutation invalidates it.
    pub fn chunk_packet(&mut self) -> Vec<u8> {
        if let Some(cached) = &self.cached_packet {
            return cached.clone();
        }

        let packet = Packet::MapChunk {
            corner: self.loc.chunk_corner(),
            data: ChunkData {
                size: ChunkDataSize {
                    x: (CHUNK_SIZE_H - 1) as u8,
                    y: (CHUNK_SIZE_Y - 1) as u8,
                    z: (CHUNK_SIZE_H - 1) as u8,
                },
                blocks: self.blocks.clone(),
                block_data: self.block_data.clone(),
                block_light: self.block_light.clone(),
                sky_light: self.sky_light.clone(),
            },
        };
        match serialize_packets(&[packet]) {
            Ok(data) => {
                self.cached_packet = Some(data.clone());
                data
            }
            Err(err) => {
                error!("{self}: map-chunk serialization failed: {err}");
                Vec::new()
            }
        }
    }

    // Ticking.

    /// Advance one tick. Returns entities that crossed into other chunks,
    /// for the shard to route.
    pub fn tick(&mut self, ctx: &ChunkCtx<'_>, neighbours: NeighbourQuery<'_>) -> Vec<Spawn> {
        let outgoing = self.tick_spawns(ctx, neighbours);
        self.tick_blocks(ctx);
        self.broadcast_updates();
        self.spawn_mob_if_wanted(ctx);
        self.dirty = true;
        outgoing
    }

    fn tick_spawns(&mut self, ctx: &ChunkCtx<'_>, neighbours: NeighbourQuery<'_>) -> Vec<Spawn> {
        let mut spawns = std::mem::take(&mut self.spawns);
        let mut despawned = Vec::new();
        let mut outgoing = Vec::new();

        {
            let loc = self.loc;
            let blocks = &self.blocks;
            let rules = ctx.rules;
            let mut query = |block: &BlockXyz| -> Option<bool> {
                let (chunk_loc, sub) = block.to_chunk_local();
                if chunk_loc == loc {
                    sub.block_index()
                        .map(|index| rules.blocks.is_solid(BlockId(blocks[index])))
                } else {
                    neighbours(block)
                }
            };

            for spawn in spawns.values_mut() {
                if spawn.tick(&mut query) {
                    let position = spawn.position();
                    if position.y <= 0.0 {
                        despawned.push(spawn.entity_id());
                    } else if position.to_chunk_xz() != loc {
                        outgoing.push(spawn.entity_id());
                    }
                }
            }
        }

        let mut out = Vec::with_capacity(outgoing.len());
        for entity_id in outgoing {
            if let Some(spawn) = spawns.remove(&entity_id) {
                out.push(spawn);
            }
        }
        self.spawns = spawns;

        for entity_id in despawned {
            self.remove_spawn(ctx, entity_id);
        }

        out
    }

    fn tick_blocks(&mut self, ctx: &ChunkCtx<'_>) {
        let mut active = std::mem::take(&mut self.active_blocks);
        active.extend(std::mem::take(&mut self.next_active_blocks));

        if self.tick_all_blocks {
            self.tick_all_blocks = false;
            for index in 0..CHUNK_VOLUME {
                if self.tick_one_block(ctx, index) {
                    active.insert(index);
                }
            }
        } else {
            let indices: Vec<usize> = active.drain().collect();
            for index in indices {
                if self.tick_one_block(ctx, index) {
                    active.insert(index);
                }
            }
        }

        self.active_blocks = active;
    }

    /// Run one block's aspect tick; true keeps the block in the active
    /// set.
    fn tick_one_block(&mut self, ctx: &ChunkCtx<'_>, index: usize) -> bool {
        let block_id = BlockId(self.blocks[index]);
        match ctx.rules.blocks.aspect(block_id) {
            AspectKind::Furnace => {
                let Some(tile) = self.tile_entities.get_mut(&index) else {
                    return false;
                };
                let Some(result) = tile.tick(&ctx.rules.furnace) else {
                    return false;
                };

                let mut stay_active = !result.changed_bars.is_empty();
                if let Some(lit) = result.lit_changed {
                    let id = if lit {
                        crate::block::ids::FURNACE_LIT
                    } else {
                        crate::block::ids::FURNACE
                    };
                    self.swap_block_id(index, id);
                    stay_active |= lit;
                }
                if !result.changed_slots.is_empty() {
                    self.dirty = true;
                    stay_active = true;
                }
                stay_active
            }
            _ => false,
        }
    }

    fn broadcast_updates(&mut self) {
        let mut pkts = Vec::new();
        for spawn in self.spawns.values_mut() {
            spawn.update_packets(&mut pkts);
        }
        self.multicast_packets(None, &pkts);
    }

    fn spawn_mob_if_wanted(&mut self, ctx: &ChunkCtx<'_>) {
        if !ctx.spawn_mobs {
            return;
        }
        let has_mobs = self.spawns.values().any(|s| matches!(s, Spawn::Mob(_)));
        if has_mobs {
            return;
        }
        let Some(presence) = self
            .players
            .values()
            .find(|p| p.position.to_chunk_xz() == self.loc)
        else {
            return;
        };

        debug!("{self}: spawning a mob at {:?}", presence.position);
        let mob = Mob::new(
            shardcraft_core::MobType::PIG,
            presence.position,
            AbsVelocity::new(0.15, 0.15, 0.15),
        );
        self.add_spawn(ctx, Spawn::Mob(mob));
    }

    // Test/introspection helpers used by the shard and its tests.

    /// Number of entities currently owned by this chunk.
    pub fn spawn_count(&self) -> usize {
        self.spawns.len()
    }

    /// Entity ids currently owned by this chunk.
    pub fn spawn_ids(&self) -> Vec<EntityId> {
        self.spawns.keys().copied().collect()
    }
}

fn fit(mut data: Vec<u8>, len: usize) -> Vec<u8> {
    if data.len() != len {
        data.resize(len, 0);
    }
    data
}
