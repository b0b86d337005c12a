//! The authoritative world: chunks, shards, entities, block rules,
//! inventories and persistence.
//!
//! Ownership is strict: each chunk belongs to exactly one shard, each
//! shard is one task, and players reach into the world only through shard
//! request queues, holding capabilities (not references) for the way back.

mod block;
mod chunk;
mod client;
mod crafting;
mod entity;
mod furnace;
mod inventory;
mod presence;
mod rules;
mod shard;
mod slot;
mod store;
mod tile_entity;

pub use block::{ids, AspectKind, BlockDrop, BlockRegistry, BlockType, ItemRegistry, ItemType};
pub use chunk::{Chunk, ChunkCtx, NeighbourQuery, DROP_PICKUP_IMMUNITY};
pub use client::{PlayerClient, PlayerHandle};
pub use crafting::{Recipe, RecipeSet};
pub use entity::{velocity_from_look, Item, Mob, Object, PointObject, Spawn};
pub use furnace::{
    FurnaceRecipes, FurnaceState, FURNACE_SLOT_FUEL, FURNACE_SLOT_INPUT, FURNACE_SLOT_OUTPUT,
};
pub use inventory::{
    Click, ClickOutcome, Inventory, PlayerInventory, TxState, HOTBAR_SIZE, PLAYER_WINDOW_SLOTS,
};
pub use presence::PlayerPresence;
pub use rules::GameRules;
pub use shard::{LocalShardManager, ShardClientConn, ShardConfig, ShardRequest};
pub use slot::{Slot, DEFAULT_MAX_STACK};
pub use store::{
    create_level, load_level, ChainedChunkStore, ChunkSnapshot, ChunkStore, ChunkStoreHandle,
    DirectoryChunkStore, FlatTerrainGenerator, LevelInfo, PlayerStore, WorldStore,
    GENERATED_SURFACE_Y,
};
pub use tile_entity::{TileEntity, TileState, CHEST_SLOTS, WORKBENCH_SLOTS};
