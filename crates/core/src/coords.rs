//! The five coordinate kinds and their explicit conversions.
//!
//! Nothing here converts implicitly: every crossing between kinds is a named
//! method, and the floor-division behaviour for negative coordinates is
//! pinned down by tests.

use crate::ids::Face;
use crate::{
    CHUNK_SIZE_H, CHUNK_SIZE_Y, MILLIPIXELS_PER_BLOCK, PIXELS_PER_BLOCK, SHARD_SHIFT, TickTime,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Absolute world position in blocks (floating point). Entity positions and
/// velocities live in this space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct AbsXyz {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AbsXyz {
    /// Build from components.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The chunk column containing this position.
    pub fn to_chunk_xz(&self) -> ChunkXz {
        ChunkXz {
            x: (self.x / CHUNK_SIZE_H as f64).floor() as i32,
            z: (self.z / CHUNK_SIZE_H as f64).floor() as i32,
        }
    }

    /// The shard containing this position.
    pub fn to_shard_xz(&self) -> ShardXz {
        self.to_chunk_xz().to_shard_xz()
    }

    /// The whole-block cell containing this position.
    pub fn to_block_xyz(&self) -> BlockXyz {
        BlockXyz {
            x: self.x.floor() as i32,
            y: self.y.floor() as i8,
            z: self.z.floor() as i32,
        }
    }

    /// Quantize to the 1/32-block wire representation.
    pub fn to_abs_int_xyz(&self) -> AbsIntXyz {
        AbsIntXyz {
            x: (self.x * PIXELS_PER_BLOCK as f64) as i32,
            y: (self.y * PIXELS_PER_BLOCK as f64) as i32,
            z: (self.z * PIXELS_PER_BLOCK as f64) as i32,
        }
    }

    /// Integrate a velocity over `dt` ticks.
    pub fn apply_velocity(&mut self, dt: TickTime, v: &AbsVelocity) {
        self.x += v.x * dt;
        self.y += v.y * dt;
        self.z += v.z * dt;
    }

    /// Euclidean distance to another position.
    pub fn distance_to(&self, other: &AbsXyz) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Whether `other` lies within `distance` blocks of this position.
    pub fn is_within_distance_of(&self, other: &AbsXyz, distance: f64) -> bool {
        self.distance_to(other) <= distance
    }
}

/// Absolute position in 1/32-block integer units, as carried by most spawn
/// packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AbsIntXyz {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl AbsIntXyz {
    /// The whole-block cell containing this position.
    pub fn to_block_xyz(&self) -> BlockXyz {
        BlockXyz {
            x: self.x.div_euclid(PIXELS_PER_BLOCK),
            y: self.y.div_euclid(PIXELS_PER_BLOCK) as i8,
            z: self.z.div_euclid(PIXELS_PER_BLOCK),
        }
    }

    /// The chunk column containing this position.
    pub fn to_chunk_xz(&self) -> ChunkXz {
        ChunkXz {
            x: self.x.div_euclid(CHUNK_SIZE_H * PIXELS_PER_BLOCK),
            z: self.z.div_euclid(CHUNK_SIZE_H * PIXELS_PER_BLOCK),
        }
    }
}

/// Whole-block world coordinate. Y is a narrower type than X/Z because the
/// world is only `CHUNK_SIZE_Y` blocks tall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct BlockXyz {
    pub x: i32,
    pub y: i8,
    pub z: i32,
}

impl BlockXyz {
    /// Build from components.
    pub const fn new(x: i32, y: i8, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The (-1, -1, -1) sentinel some client packets use for "no block".
    pub fn is_null(&self) -> bool {
        self.x == -1 && self.y == -1 && self.z == -1
    }

    /// Split into the containing chunk column and the position within it.
    pub fn to_chunk_local(&self) -> (ChunkXz, SubChunkXyz) {
        let chunk = ChunkXz {
            x: self.x.div_euclid(CHUNK_SIZE_H),
            z: self.z.div_euclid(CHUNK_SIZE_H),
        };
        let sub = SubChunkXyz {
            x: self.x.rem_euclid(CHUNK_SIZE_H) as u8,
            y: self.y as u8,
            z: self.z.rem_euclid(CHUNK_SIZE_H) as u8,
        };
        (chunk, sub)
    }

    /// The block's minimum corner as an absolute position.
    pub fn to_abs_xyz(&self) -> AbsXyz {
        AbsXyz {
            x: self.x as f64,
            y: self.y as f64,
            z: self.z as f64,
        }
    }

    /// The centre of the block, used for distance checks on digs and
    /// interactions.
    pub fn mid_point_to_abs_xyz(&self) -> AbsXyz {
        AbsXyz {
            x: self.x as f64 + 0.5,
            y: self.y as f64 + 0.5,
            z: self.z as f64 + 0.5,
        }
    }

    /// Quantize to the 1/32-block wire representation of the block corner.
    pub fn to_abs_int_xyz(&self) -> AbsIntXyz {
        AbsIntXyz {
            x: self.x * PIXELS_PER_BLOCK,
            y: self.y as i32 * PIXELS_PER_BLOCK,
            z: self.z * PIXELS_PER_BLOCK,
        }
    }

    /// The neighbouring block through `face`. Returns `None` when the result
    /// would leave the world vertically or when the face carries no offset.
    pub fn neighbour(&self, face: Face) -> Option<BlockXyz> {
        let (dx, dy, dz) = face.dxyz();
        if (dx, dy, dz) == (0, 0, 0) {
            return None;
        }
        let y = self.y as i32 + dy as i32;
        if !(0..CHUNK_SIZE_Y).contains(&y) {
            return None;
        }
        Some(BlockXyz {
            x: self.x + dx,
            y: y as i8,
            z: self.z + dz,
        })
    }
}

/// Position of a block within its chunk. All components are bounded by the
/// chunk dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct SubChunkXyz {
    pub x: u8,
    pub y: u8,
    pub z: u8,
}

impl SubChunkXyz {
    /// Linear index into the chunk's per-cell arrays, or `None` when any
    /// component is out of bounds. The layout matches the wire order: Y
    /// minor, then Z, then X.
    pub fn block_index(&self) -> Option<usize> {
        if self.x as i32 >= CHUNK_SIZE_H
            || self.y as i32 >= CHUNK_SIZE_Y
            || self.z as i32 >= CHUNK_SIZE_H
        {
            return None;
        }
        Some(
            (self.x as usize * CHUNK_SIZE_H as usize + self.z as usize) * CHUNK_SIZE_Y as usize
                + self.y as usize,
        )
    }
}

/// A chunk column address.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct ChunkXz {
    pub x: i32,
    pub z: i32,
}

impl ChunkXz {
    /// Build from components.
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// The world position of this chunk's (0, 0, 0) block.
    pub fn chunk_corner(&self) -> BlockXyz {
        BlockXyz {
            x: self.x * CHUNK_SIZE_H,
            y: 0,
            z: self.z * CHUNK_SIZE_H,
        }
    }

    /// A block position within this chunk lifted to world coordinates.
    pub fn block_xyz(&self, sub: &SubChunkXyz) -> BlockXyz {
        BlockXyz {
            x: self.x * CHUNK_SIZE_H + sub.x as i32,
            y: sub.y as i8,
            z: self.z * CHUNK_SIZE_H + sub.z as i32,
        }
    }

    /// The shard owning this chunk.
    pub fn to_shard_xz(&self) -> ShardXz {
        ShardXz {
            x: self.x >> SHARD_SHIFT,
            z: self.z >> SHARD_SHIFT,
        }
    }

    /// A dense hashable key.
    pub fn key(&self) -> u64 {
        ((self.x as u32 as u64) << 32) | self.z as u32 as u64
    }
}

impl fmt::Display for ChunkXz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// A shard address: a `SHARD_SIZE`-square group of chunk columns run by one
/// serial actor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct ShardXz {
    pub x: i32,
    pub z: i32,
}

impl ShardXz {
    /// A dense hashable key.
    pub fn key(&self) -> u64 {
        ((self.x as u32 as u64) << 32) | self.z as u32 as u64
    }
}

impl fmt::Display for ShardXz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shard({}, {})", self.x, self.z)
    }
}

/// Velocity on the wire: millipixels per tick per axis, clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Velocity {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

/// Largest representable wire velocity component.
pub const VELOCITY_COMPONENT_MAX: i16 = 28800;
/// Smallest representable wire velocity component.
pub const VELOCITY_COMPONENT_MIN: i16 = -28800;

/// Velocity in blocks per tick (floating point), used by physics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct AbsVelocity {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AbsVelocity {
    /// Build from components.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Clamp each component to the range representable on the wire.
    pub fn constrain(&mut self) {
        let max = VELOCITY_COMPONENT_MAX as f64 / MILLIPIXELS_PER_BLOCK as f64;
        let min = VELOCITY_COMPONENT_MIN as f64 / MILLIPIXELS_PER_BLOCK as f64;
        self.x = self.x.clamp(min, max);
        self.y = self.y.clamp(min, max);
        self.z = self.z.clamp(min, max);
    }

    /// Convert to wire units.
    pub fn to_velocity(&self) -> Velocity {
        let scale = MILLIPIXELS_PER_BLOCK as f64;
        Velocity {
            x: (self.x * scale).clamp(VELOCITY_COMPONENT_MIN as f64, VELOCITY_COMPONENT_MAX as f64)
                as i16,
            y: (self.y * scale).clamp(VELOCITY_COMPONENT_MIN as f64, VELOCITY_COMPONENT_MAX as f64)
                as i16,
            z: (self.z * scale).clamp(VELOCITY_COMPONENT_MIN as f64, VELOCITY_COMPONENT_MAX as f64)
                as i16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abs_to_chunk_floors_negative() {
        let p = AbsXyz::new(-0.5, 64.0, -16.0);
        assert_eq!(p.to_chunk_xz(), ChunkXz::new(-1, -1));

        let p = AbsXyz::new(15.9, 64.0, 16.0);
        assert_eq!(p.to_chunk_xz(), ChunkXz::new(0, 1));
    }

    #[test]
    fn block_to_chunk_local_negative() {
        let (chunk, sub) = BlockXyz::new(-1, 70, -16).to_chunk_local();
        assert_eq!(chunk, ChunkXz::new(-1, -1));
        assert_eq!(sub, SubChunkXyz { x: 15, y: 70, z: 0 });

        let (chunk, sub) = BlockXyz::new(17, 0, 31).to_chunk_local();
        assert_eq!(chunk, ChunkXz::new(1, 1));
        assert_eq!(sub, SubChunkXyz { x: 1, y: 0, z: 15 });
    }

    #[test]
    fn chunk_round_trips_block() {
        let block = BlockXyz::new(-37, 11, 260);
        let (chunk, sub) = block.to_chunk_local();
        assert_eq!(chunk.block_xyz(&sub), block);
    }

    #[test]
    fn chunk_to_shard_shift() {
        assert_eq!(ChunkXz::new(0, 0).to_shard_xz(), ShardXz { x: 0, z: 0 });
        assert_eq!(ChunkXz::new(15, 15).to_shard_xz(), ShardXz { x: 0, z: 0 });
        assert_eq!(ChunkXz::new(16, 31).to_shard_xz(), ShardXz { x: 1, z: 1 });
        // Arithmetic shift keeps negative chunks in the right shard.
        assert_eq!(ChunkXz::new(-1, -16).to_shard_xz(), ShardXz { x: -1, z: -1 });
        assert_eq!(ChunkXz::new(-17, -1).to_shard_xz(), ShardXz { x: -2, z: -1 });
    }

    #[test]
    fn block_index_bounds() {
        assert_eq!(SubChunkXyz { x: 0, y: 0, z: 0 }.block_index(), Some(0));
        assert_eq!(
            SubChunkXyz { x: 0, y: 127, z: 0 }.block_index(),
            Some(127)
        );
        assert_eq!(SubChunkXyz { x: 0, y: 128, z: 0 }.block_index(), None);
        assert_eq!(SubChunkXyz { x: 16, y: 0, z: 0 }.block_index(), None);
        // X is the most significant axis.
        assert_eq!(
            SubChunkXyz { x: 1, y: 0, z: 0 }.block_index(),
            Some(16 * 128)
        );
    }

    #[test]
    fn abs_int_quantization() {
        let p = AbsXyz::new(1.5, 64.0, -2.25);
        let q = p.to_abs_int_xyz();
        assert_eq!(q, AbsIntXyz { x: 48, y: 2048, z: -72 });
        assert_eq!(q.to_block_xyz(), BlockXyz::new(1, 64, -3));
    }

    #[test]
    fn neighbour_through_face() {
        let b = BlockXyz::new(10, 70, 10);
        assert_eq!(b.neighbour(Face::TOP), Some(BlockXyz::new(10, 71, 10)));
        assert_eq!(b.neighbour(Face::NORTH), Some(BlockXyz::new(9, 70, 10)));
        assert_eq!(b.neighbour(Face::NULL), None);
        assert_eq!(BlockXyz::new(0, 127, 0).neighbour(Face::TOP), None);
        assert_eq!(BlockXyz::new(0, 0, 0).neighbour(Face::BOTTOM), None);
    }

    #[test]
    fn velocity_constrain_and_convert() {
        let mut v = AbsVelocity::new(100.0, -100.0, 0.5);
        v.constrain();
        assert!(v.x <= VELOCITY_COMPONENT_MAX as f64 / MILLIPIXELS_PER_BLOCK as f64);
        assert!(v.y >= VELOCITY_COMPONENT_MIN as f64 / MILLIPIXELS_PER_BLOCK as f64);

        let wire = AbsVelocity::new(0.5, 0.0, -0.25).to_velocity();
        assert_eq!(wire.x, 16000);
        assert_eq!(wire.y, 0);
        assert_eq!(wire.z, -8000);
    }

    #[test]
    fn distance_checks() {
        let a = AbsXyz::new(0.0, 0.0, 0.0);
        let b = AbsXyz::new(3.0, 4.0, 0.0);
        assert_eq!(a.distance_to(&b), 5.0);
        assert!(a.is_within_distance_of(&b, 5.0));
        assert!(!a.is_within_distance_of(&b, 4.9));
    }
}
