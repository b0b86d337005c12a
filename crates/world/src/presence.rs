//! A chunk's knowledge about a player inside it.
//!
//! Exactly one chunk holds this record for a given player at a time; the
//! session updates it as the player moves. Subscribers of the chunk learn
//! about the player through the packets built here.

use crate::entity::Item;
use shardcraft_core::{AbsXyz, EntityId, ItemTypeId, LookBytes};
use shardcraft_proto::Packet;

/// Half-extent of the player pickup box on each horizontal side.
const PLAYER_AAB_H: f64 = 0.75;
/// Height of the player pickup box from the feet upwards.
const PLAYER_AAB_Y: f64 = 2.00;

/// Per-chunk player presence record.
#[derive(Debug, Clone)]
pub struct PlayerPresence {
    pub entity_id: EntityId,
    pub name: String,
    pub position: AbsXyz,
    pub look: LookBytes,
    pub held_item: ItemTypeId,
}

impl PlayerPresence {
    /// The packet announcing this player to a new subscriber.
    pub fn spawn_packet(&self) -> Packet {
        Packet::NamedEntitySpawn {
            entity_id: self.entity_id,
            username: self.name.clone(),
            position: self.position.to_abs_int_xyz(),
            rotation: self.look,
            current_item: self.held_item,
        }
    }

    /// The packet updating this player's position for subscribers.
    pub fn update_packet(&self) -> Packet {
        Packet::EntityTeleport {
            entity_id: self.entity_id,
            position: self.position.to_abs_int_xyz(),
            look: self.look,
        }
    }

    /// Whether an item entity lies within the player's pickup box.
    pub fn overlaps_item(&self, item: &Item) -> bool {
        let pos = item.body.position();
        pos.x >= self.position.x - PLAYER_AAB_H
            && pos.x <= self.position.x + PLAYER_AAB_H
            && pos.y >= self.position.y
            && pos.y <= self.position.y + PLAYER_AAB_Y
            && pos.z >= self.position.z - PLAYER_AAB_H
            && pos.z <= self.position.z + PLAYER_AAB_H
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::Slot;
    use shardcraft_core::{AbsVelocity, ItemCount, ItemData};

    fn presence_at(x: f64, y: f64, z: f64) -> PlayerPresence {
        PlayerPresence {
            entity_id: EntityId(1),
            name: "alice".into(),
            position: AbsXyz::new(x, y, z),
            look: LookBytes::default(),
            held_item: ItemTypeId(0),
        }
    }

    fn item_at(x: f64, y: f64, z: f64) -> Item {
        Item::new(
            Slot::new(ItemTypeId(3), ItemCount(1), ItemData(0)),
            AbsXyz::new(x, y, z),
            AbsVelocity::default(),
            0,
        )
    }

    #[test]
    fn overlap_bounds() {
        let player = presence_at(10.0, 64.0, 10.0);
        assert!(player.overlaps_item(&item_at(10.0, 64.0, 10.0)));
        assert!(player.overlaps_item(&item_at(10.7, 65.9, 9.3)));
        assert!(!player.overlaps_item(&item_at(11.0, 64.0, 10.0)));
        assert!(!player.overlaps_item(&item_at(10.0, 66.5, 10.0)));
        assert!(!player.overlaps_item(&item_at(10.0, 63.5, 10.0)));
    }

    #[test]
    fn spawn_packet_carries_identity() {
        let player = presence_at(1.0, 64.0, -2.0);
        match player.spawn_packet() {
            Packet::NamedEntitySpawn {
                entity_id,
                username,
                position,
                ..
            } => {
                assert_eq!(entity_id, EntityId(1));
                assert_eq!(username, "alice");
                assert_eq!(position.x, 32);
                assert_eq!(position.z, -64);
            }
            other => panic!("expected NamedEntitySpawn, got {other:?}"),
        }
    }
}
