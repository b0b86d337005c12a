//! Chunk subscription tracking for one player session.
//!
//! A player subscribes to the `CHUNK_RADIUS`-square of chunks around its
//! current chunk, opening connections to the owning shards on demand and
//! reference-counting subscribed chunks per shard. Crossing a chunk
//! boundary subscribes/unsubscribes exactly the symmetric difference of
//! the two squares, hands the player-presence record to the new chunk,
//! and rebinds the hosting shard when it changed.

use shardcraft_core::{AbsXyz, BlockXyz, ChunkXz, ShardXz, CHUNK_RADIUS};
use shardcraft_world::{LocalShardManager, PlayerHandle, PlayerPresence, ShardClientConn};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

struct ShardRef {
    conn: ShardClientConn,
    count: usize,
}

/// The set of shard connections and chunk subscriptions for one player.
pub struct ChunkSubscriptions {
    mgr: Arc<LocalShardManager>,
    player: PlayerHandle,
    cur_chunk: ChunkXz,
    cur_shard_loc: ShardXz,
    cur_shard: ShardClientConn,
    shards: HashMap<u64, ShardRef>,
}

impl ChunkSubscriptions {
    /// Subscribe the initial square (nearest chunks first) and install the
    /// player's presence in its current chunk.
    pub async fn init(
        mgr: Arc<LocalShardManager>,
        player: PlayerHandle,
        presence: PlayerPresence,
    ) -> ChunkSubscriptions {
        let cur_chunk = presence.position.to_chunk_xz();
        let cur_shard_loc = cur_chunk.to_shard_xz();

        let mut subs = ChunkSubscriptions {
            cur_shard: mgr.connect(player.clone(), cur_shard_loc),
            mgr,
            player,
            cur_chunk,
            cur_shard_loc,
            shards: HashMap::new(),
        };

        let initial = ordered_chunk_square(cur_chunk, CHUNK_RADIUS);
        subs.subscribe_to(&initial).await;
        subs.rebind_current_shard();
        subs.cur_shard.add_player_data(cur_chunk, presence).await;
        subs
    }

    /// The chunk the player currently occupies.
    pub fn cur_chunk(&self) -> ChunkXz {
        self.cur_chunk
    }

    /// The connection to the shard hosting the player.
    pub fn cur_shard(&self) -> &ShardClientConn {
        &self.cur_shard
    }

    /// The shard connection covering a block position, with the chunk the
    /// block is in. `None` when that shard is not currently connected.
    pub fn shard_for_block(&self, block: &BlockXyz) -> Option<(&ShardClientConn, ChunkXz)> {
        let (chunk, _) = block.to_chunk_local();
        self.shard_for_chunk(chunk).map(|conn| (conn, chunk))
    }

    /// The shard connection owning a chunk, if connected.
    pub fn shard_for_chunk(&self, chunk: ChunkXz) -> Option<&ShardClientConn> {
        self.shards
            .get(&chunk.to_shard_xz().key())
            .map(|shard| &shard.conn)
    }

    /// Handle a position change. Returns true when the player crossed a
    /// chunk boundary (and subscriptions were updated).
    pub async fn moved(&mut self, position: &AbsXyz, presence: PlayerPresence) -> bool {
        let new_chunk = position.to_chunk_xz();
        if new_chunk == self.cur_chunk {
            self.cur_shard
                .set_player_position_look(self.cur_chunk, presence.position, presence.look, true)
                .await;
            return false;
        }

        // Subscribe the chunks that entered the square, nearest first.
        let mut added = square_difference(new_chunk, self.cur_chunk, CHUNK_RADIUS);
        added.sort_by_key(|loc| {
            let dx = (loc.x - new_chunk.x) as i64;
            let dz = (loc.z - new_chunk.z) as i64;
            dx * dx + dz * dz
        });
        self.subscribe_to(&added).await;

        // Move the presence record from the old chunk to the new one.
        if let Some(shard) = self.shard_for_chunk(new_chunk) {
            shard.add_player_data(new_chunk, presence).await;
        }
        let old_chunk = self.cur_chunk;
        if let Some(shard) = self.shard_for_chunk(old_chunk) {
            shard.remove_player_data(old_chunk, false).await;
        }

        // Unsubscribe what left the square.
        let removed = square_difference(old_chunk, new_chunk, CHUNK_RADIUS);
        self.unsubscribe_from(&removed).await;

        self.cur_chunk = new_chunk;
        let new_shard_loc = new_chunk.to_shard_xz();
        if new_shard_loc != self.cur_shard_loc {
            self.cur_shard_loc = new_shard_loc;
            self.rebind_current_shard();
        }
        true
    }

    /// Drop presence, every subscription and every shard connection.
    pub async fn close(&mut self) {
        if let Some(shard) = self.shard_for_chunk(self.cur_chunk) {
            shard.remove_player_data(self.cur_chunk, true).await;
        }
        for shard in self.shards.values() {
            shard.conn.disconnect().await;
        }
        self.shards.clear();
    }

    fn rebind_current_shard(&mut self) {
        match self.shards.get(&self.cur_shard_loc.key()) {
            Some(shard) => self.cur_shard = shard.conn.clone(),
            None => {
                // The hosting shard should always be subscribed; fall back
                // to a fresh connection.
                warn!("hosting shard {} had no connection", self.cur_shard_loc);
                self.cur_shard = self
                    .mgr
                    .connect(self.player.clone(), self.cur_shard_loc);
            }
        }
    }

    async fn subscribe_to(&mut self, locs: &[ChunkXz]) {
        for loc in locs {
            let shard_loc = loc.to_shard_xz();
            let shard = self.shards.entry(shard_loc.key()).or_insert_with(|| ShardRef {
                conn: self.mgr.connect(self.player.clone(), shard_loc),
                count: 0,
            });
            shard.count += 1;
            let conn = shard.conn.clone();
            // The chunk the player stands in gates login completion.
            conn.subscribe_chunk(*loc, *loc == self.cur_chunk).await;
        }
    }

    async fn unsubscribe_from(&mut self, locs: &[ChunkXz]) {
        for loc in locs {
            let shard_loc = loc.to_shard_xz();
            let Some(shard) = self.shards.get_mut(&shard_loc.key()) else {
                warn!("unsubscribe from chunk {loc} in unconnected shard {shard_loc}");
                continue;
            };
            let conn = shard.conn.clone();
            shard.count -= 1;
            let drained = shard.count == 0;
            if drained {
                self.shards.remove(&shard_loc.key());
            }
            conn.unsubscribe_chunk(*loc, true).await;
            if drained {
                conn.disconnect().await;
            }
        }
    }
}

/// The chunks within the `radius`-square of `center_a` but outside the
/// `radius`-square of `center_b`.
pub fn square_difference(center_a: ChunkXz, center_b: ChunkXz, radius: i32) -> Vec<ChunkXz> {
    let mut result = Vec::new();
    for x in center_a.x - radius..=center_a.x + radius {
        for z in center_a.z - radius..=center_a.z + radius {
            let inside_b = x >= center_b.x - radius
                && x <= center_b.x + radius
                && z >= center_b.z - radius
                && z <= center_b.z + radius;
            if !inside_b {
                result.push(ChunkXz::new(x, z));
            }
        }
    }
    result
}

/// The full `radius`-square around `center`, ordered so nearby chunks come
/// first (the player sees the ground under it before the horizon).
pub fn ordered_chunk_square(center: ChunkXz, radius: i32) -> Vec<ChunkXz> {
    let edge = (2 * radius + 1) as usize;
    let mut locs = Vec::with_capacity(edge * edge);
    locs.push(center);

    for ring in 1..=radius {
        let x_min = center.x - ring;
        let x_max = center.x + ring;
        let z_min = center.z - ring;
        let z_max = center.z + ring;

        // North and south rows.
        for x in x_min..=x_max {
            locs.push(ChunkXz::new(x, z_min));
            locs.push(ChunkXz::new(x, z_max));
        }
        // East and west columns, minus the corners already emitted.
        for z in z_min + 1..z_max {
            locs.push(ChunkXz::new(x_min, z));
            locs.push(ChunkXz::new(x_max, z));
        }
    }
    locs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ordered_square_covers_exactly_the_square() {
        let locs = ordered_chunk_square(ChunkXz::new(2, -1), 3);
        let edge = 7;
        assert_eq!(locs.len(), edge * edge);

        let unique: HashSet<_> = locs.iter().copied().collect();
        assert_eq!(unique.len(), locs.len(), "no duplicates");

        for loc in &locs {
            assert!((loc.x - 2).abs() <= 3 && (loc.z + 1).abs() <= 3);
        }

        // The center comes first; rings are non-decreasing in distance.
        assert_eq!(locs[0], ChunkXz::new(2, -1));
        let ring = |loc: &ChunkXz| (loc.x - 2).abs().max((loc.z + 1).abs());
        let rings: Vec<i32> = locs.iter().map(ring).collect();
        assert!(rings.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn square_difference_one_step() {
        // A diagonal step: moving (1,1) -> (2,2) with radius 2.
        let added = square_difference(ChunkXz::new(2, 2), ChunkXz::new(1, 1), 2);
        let removed = square_difference(ChunkXz::new(1, 1), ChunkXz::new(2, 2), 2);

        // One row and one column, sharing a corner.
        assert_eq!(added.len(), 9);
        assert_eq!(removed.len(), 9);
        assert!(added.len() <= ((2 + 1) * (2 * 2 + 1)) as usize);

        let added_set: HashSet<_> = added.iter().copied().collect();
        let removed_set: HashSet<_> = removed.iter().copied().collect();
        assert!(added_set.is_disjoint(&removed_set));

        for loc in &added {
            assert!((loc.x - 2).abs() <= 2 && (loc.z - 2).abs() <= 2, "inside new");
            assert!(
                (loc.x - 1).abs() > 2 || (loc.z - 1).abs() > 2,
                "outside old"
            );
        }
    }

    #[test]
    fn square_difference_no_move_is_empty() {
        assert!(square_difference(ChunkXz::new(5, 5), ChunkXz::new(5, 5), 3).is_empty());
    }

    #[test]
    fn square_difference_disjoint_squares() {
        let diff = square_difference(ChunkXz::new(100, 100), ChunkXz::new(0, 0), 2);
        assert_eq!(diff.len(), 25);
    }
}
