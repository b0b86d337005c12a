#![warn(missing_docs)]
//! Core primitives shared across the workspace.
//!
//! Defines the coordinate kinds (absolute, absolute-integer, block,
//! chunk-local, chunk, shard), the id newtypes used on the wire and in the
//! world state, angle/velocity units, and the process-wide entity-id
//! allocator. Conversions between coordinate kinds are always explicit.

pub mod angles;
pub mod coords;
pub mod entity_alloc;
pub mod ids;

pub use angles::{AngleBytes, AngleDegrees, LookBytes, LookDegrees, OrientationBytes};
pub use coords::{
    AbsIntXyz, AbsVelocity, AbsXyz, BlockXyz, ChunkXz, ShardXz, SubChunkXyz, Velocity,
};
pub use entity_alloc::EntityIdAllocator;
pub use ids::{
    BlockId, DigStatus, DimensionId, EntityId, Face, GameDifficulty, InvTypeId, ItemCount,
    ItemData, ItemTypeId, MobType, ObjTypeId, PrgBarId, PrgBarValue, SlotId, TxId, WindowId,
};

/// World time measured in day ticks (20 per second of game time).
pub type Ticks = i64;

/// Sub-tick duration used by physics integration, in ticks.
pub type TickTime = f64;

/// Internal server tick rate. All world dynamics advance at this rate; a
/// single tick therefore covers `DAY_TICKS_PER_TICK` day ticks.
pub const TICKS_PER_SECOND: i64 = 5;

/// Day-time tick rate of the wire protocol's time-update packet.
pub const DAY_TICKS_PER_SECOND: i64 = 20;

/// How far world time advances per internal tick.
pub const DAY_TICKS_PER_TICK: i64 = DAY_TICKS_PER_SECOND / TICKS_PER_SECOND;

/// Horizontal chunk edge length in blocks.
pub const CHUNK_SIZE_H: i32 = 16;

/// Chunk height in blocks.
pub const CHUNK_SIZE_Y: i32 = 128;

/// Cells in one chunk column.
pub const CHUNK_VOLUME: usize = (CHUNK_SIZE_H * CHUNK_SIZE_H * CHUNK_SIZE_Y) as usize;

/// The square radius (in chunks) a client receives updates within.
pub const CHUNK_RADIUS: i32 = 10;

/// The radius in which all chunks must be delivered before a client's login
/// completes.
pub const MIN_CHUNK_RADIUS: i32 = 2;

/// Wire positions for most spawns are expressed in 1/32 block units.
pub const PIXELS_PER_BLOCK: i32 = 32;

/// Millipixels per pixel; velocity components use millipixels per tick.
pub const MILLIPIXELS_PER_PIXEL: i32 = 1000;

/// Millipixels per block.
pub const MILLIPIXELS_PER_BLOCK: i32 = PIXELS_PER_BLOCK * MILLIPIXELS_PER_PIXEL;

/// Chunk coordinates shift right by this to produce shard coordinates.
pub const SHARD_SHIFT: u32 = 4;

/// Shard edge length in chunks.
pub const SHARD_SIZE: i32 = 1 << SHARD_SHIFT;

/// Maximum distance at which a player may dig or interact with a block.
pub const MAX_INTERACT_DISTANCE: f64 = 6.0;
