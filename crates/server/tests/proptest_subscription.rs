//! Property tests for chunk subscription geometry.
//!
//! After any walk of single-chunk steps, applying the symmetric
//! differences must leave the subscription set equal to the exact square
//! around the final chunk, with nothing double-subscribed or
//! double-unsubscribed along the way.

use proptest::prelude::*;
use shardcraft_core::ChunkXz;
use shardcraft_server::{ordered_chunk_square, square_difference};
use std::collections::HashSet;

fn exact_square(center: ChunkXz, radius: i32) -> HashSet<ChunkXz> {
    let mut set = HashSet::new();
    for x in center.x - radius..=center.x + radius {
        for z in center.z - radius..=center.z + radius {
            set.insert(ChunkXz::new(x, z));
        }
    }
    set
}

proptest! {
    /// Random walk: the incrementally maintained set always equals the
    /// exact square around the current chunk.
    #[test]
    fn random_walk_keeps_exact_square(
        steps in prop::collection::vec((0i32..4, prop::bool::ANY), 1..40),
        radius in 1i32..6,
    ) {
        let mut current = ChunkXz::new(0, 0);
        let mut subscribed = exact_square(current, radius);

        for (direction, _) in steps {
            let next = match direction {
                0 => ChunkXz::new(current.x + 1, current.z),
                1 => ChunkXz::new(current.x - 1, current.z),
                2 => ChunkXz::new(current.x, current.z + 1),
                _ => ChunkXz::new(current.x, current.z - 1),
            };

            let added = square_difference(next, current, radius);
            let removed = square_difference(current, next, radius);

            // No chunk is both added and removed, and no chunk is added
            // twice or removed while absent.
            for loc in &added {
                prop_assert!(subscribed.insert(*loc), "double-subscribe of {loc}");
            }
            for loc in &removed {
                prop_assert!(subscribed.remove(loc), "double-unsubscribe of {loc}");
            }

            current = next;
            prop_assert_eq!(&subscribed, &exact_square(current, radius));
        }
    }

    /// One-step moves touch at most one row plus one column per side.
    #[test]
    fn one_step_difference_is_bounded(
        x in -100i32..100,
        z in -100i32..100,
        dx in -1i32..=1,
        dz in -1i32..=1,
        radius in 1i32..8,
    ) {
        prop_assume!(dx != 0 || dz != 0);
        let from = ChunkXz::new(x, z);
        let to = ChunkXz::new(x + dx, z + dz);

        let added = square_difference(to, from, radius);
        let bound = ((radius + 1) * (2 * radius + 1)) as usize;
        prop_assert!(added.len() <= bound, "{} > {}", added.len(), bound);
    }

    /// The ordered square is a permutation of the exact square, sorted by
    /// ring distance.
    #[test]
    fn ordered_square_is_sorted_permutation(
        x in -50i32..50,
        z in -50i32..50,
        radius in 0i32..8,
    ) {
        let center = ChunkXz::new(x, z);
        let locs = ordered_chunk_square(center, radius);

        let as_set: HashSet<ChunkXz> = locs.iter().copied().collect();
        prop_assert_eq!(as_set.len(), locs.len(), "duplicates in ordered square");
        prop_assert_eq!(as_set, exact_square(center, radius));

        let ring = |loc: &ChunkXz| (loc.x - x).abs().max((loc.z - z).abs());
        let rings: Vec<i32> = locs.iter().map(ring).collect();
        prop_assert!(rings.windows(2).all(|pair| pair[0] <= pair[1]));
    }
}
