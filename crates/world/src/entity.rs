//! Non-player entities owned by chunks: items, mobs and objects.
//!
//! All three share a [`PointObject`] physics body integrating velocity
//! under gravity, colliding with solid blocks through the chunk-provided
//! block query. A tick reports whether the entity moved; the owning chunk
//! decides about despawns and cross-chunk transfers.

use crate::slot::Slot;
use shardcraft_core::{
    AbsIntXyz, AbsVelocity, AbsXyz, EntityId, LookBytes, LookDegrees, MobType, ObjTypeId,
    OrientationBytes, Ticks, Velocity,
};
use shardcraft_nbt::{Compound, Tag};
use shardcraft_proto::{EntityMetadataTable, FireballData, Packet};

/// Downward acceleration in blocks per tick squared.
const GRAVITY: f64 = 0.08;
/// Per-tick velocity retention (drag).
const DRAG: f64 = 0.98;
/// Horizontal velocity retention when resting on the ground.
const GROUND_FRICTION: f64 = 0.6;
/// Below this speed a grounded entity is considered stopped.
const STOP_SPEED: f64 = 0.01;

/// Whether a block is solid; `None` when the chunk holding it is unknown.
pub type BlockSolidQuery<'a> = &'a mut dyn FnMut(&shardcraft_core::BlockXyz) -> Option<bool>;

/// A point-mass physics body.
#[derive(Debug, Clone)]
pub struct PointObject {
    position: AbsXyz,
    velocity: AbsVelocity,
    last_sent_position: AbsIntXyz,
    last_sent_velocity: Velocity,
    on_ground: bool,
    stopped: bool,
}

impl PointObject {
    /// A body starting at `position` with `velocity`.
    pub fn new(position: AbsXyz, velocity: AbsVelocity) -> PointObject {
        let mut velocity = velocity;
        velocity.constrain();
        PointObject {
            position,
            velocity,
            last_sent_position: position.to_abs_int_xyz(),
            last_sent_velocity: velocity.to_velocity(),
            on_ground: false,
            stopped: false,
        }
    }

    /// Current position.
    pub fn position(&self) -> AbsXyz {
        self.position
    }

    /// The position most recently told to clients.
    pub fn last_sent_position(&self) -> AbsIntXyz {
        self.last_sent_position
    }

    /// The velocity most recently told to clients.
    pub fn last_sent_velocity(&self) -> Velocity {
        self.last_sent_velocity
    }

    /// Integrate one tick. Returns true when the position changed.
    pub fn tick(&mut self, query: BlockSolidQuery<'_>) -> bool {
        if self.stopped {
            return false;
        }

        self.velocity.y -= GRAVITY;
        self.velocity.x *= DRAG;
        self.velocity.y *= DRAG;
        self.velocity.z *= DRAG;
        if self.on_ground {
            self.velocity.x *= GROUND_FRICTION;
            self.velocity.z *= GROUND_FRICTION;
        }
        self.velocity.constrain();

        let mut next = self.position;
        next.apply_velocity(1.0, &self.velocity);

        // Unknown blocks count as solid so nothing drifts off the loaded
        // world.
        let mut is_solid = |pos: &AbsXyz| {
            if pos.y < 0.0 {
                return false; // let the chunk despawn it below Y=0
            }
            query(&pos.to_block_xyz()).unwrap_or(true)
        };

        // Vertical first.
        let vertical_probe = AbsXyz::new(self.position.x, next.y, self.position.z);
        let mut landed = false;
        if self.velocity.y < 0.0 && is_solid(&vertical_probe) {
            // Land on top of the block below.
            next.y = vertical_probe.to_block_xyz().y as f64 + 1.0;
            landed = true;
        }

        // Then each horizontal axis independently.
        let x_probe = AbsXyz::new(next.x, next.y, self.position.z);
        let x_blocked = self.velocity.x != 0.0 && is_solid(&x_probe);
        let z_probe = AbsXyz::new(if x_blocked { self.position.x } else { next.x }, next.y, next.z);
        let z_blocked = self.velocity.z != 0.0 && is_solid(&z_probe);
        drop(is_solid);

        if landed {
            self.velocity.y = 0.0;
            self.on_ground = true;
        } else {
            self.on_ground = false;
        }
        if x_blocked {
            next.x = self.position.x;
            self.velocity.x = 0.0;
        }
        if z_blocked {
            next.z = self.position.z;
            self.velocity.z = 0.0;
        }

        let moved = (next.x - self.position.x).abs() > 1e-9
            || (next.y - self.position.y).abs() > 1e-9
            || (next.z - self.position.z).abs() > 1e-9;
        self.position = next;

        if self.on_ground
            && self.velocity.x.abs() < STOP_SPEED
            && self.velocity.y.abs() < STOP_SPEED
            && self.velocity.z.abs() < STOP_SPEED
        {
            self.velocity = AbsVelocity::default();
            self.stopped = true;
        }

        moved
    }

    /// Movement/velocity packets for subscribers, tracking what clients
    /// already know. Small moves become relative moves, large ones
    /// teleports.
    pub fn update_packets(&mut self, entity_id: EntityId, look: LookBytes, pkts: &mut Vec<Packet>) {
        let current = self.position.to_abs_int_xyz();
        let dx = current.x - self.last_sent_position.x;
        let dy = current.y - self.last_sent_position.y;
        let dz = current.z - self.last_sent_position.z;

        if (dx, dy, dz) != (0, 0, 0) {
            if (-128..=127).contains(&dx) && (-128..=127).contains(&dy) && (-128..=127).contains(&dz)
            {
                pkts.push(Packet::EntityRelMove {
                    entity_id,
                    delta: shardcraft_proto::RelMove {
                        x: dx as i8,
                        y: dy as i8,
                        z: dz as i8,
                    },
                });
            } else {
                pkts.push(Packet::EntityTeleport {
                    entity_id,
                    position: current,
                    look,
                });
            }
            self.last_sent_position = current;
        }

        let wire_velocity = self.velocity.to_velocity();
        if wire_velocity != self.last_sent_velocity {
            pkts.push(Packet::EntityVelocity {
                entity_id,
                velocity: wire_velocity,
            });
            self.last_sent_velocity = wire_velocity;
        }
    }

    fn marshal_nbt(&self, tag: &mut Compound) {
        tag.set(
            "Pos",
            Tag::List(vec![
                Tag::Double(self.position.x),
                Tag::Double(self.position.y),
                Tag::Double(self.position.z),
            ]),
        );
        tag.set(
            "Motion",
            Tag::List(vec![
                Tag::Double(self.velocity.x),
                Tag::Double(self.velocity.y),
                Tag::Double(self.velocity.z),
            ]),
        );
        tag.set("OnGround", Tag::Byte(self.on_ground as i8));
    }

    fn unmarshal_nbt(tag: &Compound) -> Option<PointObject> {
        let [x, y, z] = tag.get_double_list::<3>("Pos")?;
        let [vx, vy, vz] = tag.get_double_list::<3>("Motion").unwrap_or([0.0; 3]);
        let mut body = PointObject::new(
            AbsXyz::new(x, y, z),
            AbsVelocity::new(vx, vy, vz),
        );
        body.on_ground = tag.get_byte("OnGround").unwrap_or(0) != 0;
        Some(body)
    }
}

/// Compute a throw velocity from a look direction.
pub fn velocity_from_look(look: LookDegrees, speed: f64) -> AbsVelocity {
    let yaw = (look.yaw.0 as f64).to_radians();
    let pitch = (look.pitch.0 as f64).to_radians();
    AbsVelocity {
        x: -yaw.sin() * pitch.cos() * speed,
        y: -pitch.sin() * speed,
        z: yaw.cos() * pitch.cos() * speed,
    }
}

/// An item lying in the world.
#[derive(Debug, Clone)]
pub struct Item {
    pub entity_id: EntityId,
    pub slot: Slot,
    pub body: PointObject,
    pub orientation: OrientationBytes,
    /// Ticks until the item may be picked up.
    pub pickup_immunity: Ticks,
}

impl Item {
    /// A freshly dropped item.
    pub fn new(slot: Slot, position: AbsXyz, velocity: AbsVelocity, pickup_immunity: Ticks) -> Item {
        Item {
            entity_id: EntityId::default(),
            slot,
            body: PointObject::new(position, velocity),
            orientation: OrientationBytes::default(),
            pickup_immunity,
        }
    }

    /// Whether the item may currently be collected.
    pub fn can_be_picked_up(&self) -> bool {
        self.pickup_immunity <= 0
    }
}

/// A mob.
#[derive(Debug, Clone)]
pub struct Mob {
    pub entity_id: EntityId,
    pub mob_type: MobType,
    pub body: PointObject,
    pub look: LookBytes,
    pub metadata: EntityMetadataTable,
}

impl Mob {
    /// A mob at rest.
    pub fn new(mob_type: MobType, position: AbsXyz, velocity: AbsVelocity) -> Mob {
        Mob {
            entity_id: EntityId::default(),
            mob_type,
            body: PointObject::new(position, velocity),
            look: LookBytes::default(),
            metadata: EntityMetadataTable::default(),
        }
    }
}

/// A vehicle, projectile or falling block.
#[derive(Debug, Clone)]
pub struct Object {
    pub entity_id: EntityId,
    pub obj_type: ObjTypeId,
    pub body: PointObject,
}

/// Any non-player entity a chunk can own.
#[derive(Debug, Clone)]
pub enum Spawn {
    Item(Item),
    Mob(Mob),
    Object(Object),
}

impl Spawn {
    /// The entity id.
    pub fn entity_id(&self) -> EntityId {
        match self {
            Spawn::Item(e) => e.entity_id,
            Spawn::Mob(e) => e.entity_id,
            Spawn::Object(e) => e.entity_id,
        }
    }

    /// Assign the entity id at spawn time.
    pub fn set_entity_id(&mut self, id: EntityId) {
        match self {
            Spawn::Item(e) => e.entity_id = id,
            Spawn::Mob(e) => e.entity_id = id,
            Spawn::Object(e) => e.entity_id = id,
        }
    }

    /// Current position.
    pub fn position(&self) -> AbsXyz {
        self.body().position()
    }

    fn body(&self) -> &PointObject {
        match self {
            Spawn::Item(e) => &e.body,
            Spawn::Mob(e) => &e.body,
            Spawn::Object(e) => &e.body,
        }
    }

    fn body_mut(&mut self) -> &mut PointObject {
        match self {
            Spawn::Item(e) => &mut e.body,
            Spawn::Mob(e) => &mut e.body,
            Spawn::Object(e) => &mut e.body,
        }
    }

    /// Advance one tick. Returns true when the entity moved.
    pub fn tick(&mut self, query: BlockSolidQuery<'_>) -> bool {
        if let Spawn::Item(item) = self {
            if item.pickup_immunity > 0 {
                item.pickup_immunity -= 1;
            }
        }
        self.body_mut().tick(query)
    }

    /// Packets announcing this entity to a new subscriber.
    pub fn spawn_packets(&self, pkts: &mut Vec<Packet>) {
        match self {
            Spawn::Item(item) => {
                pkts.push(Packet::ItemSpawn {
                    entity_id: item.entity_id,
                    item_type: item.slot.item_type,
                    count: item.slot.count,
                    data: item.slot.data,
                    position: item.body.last_sent_position(),
                    orientation: item.orientation,
                });
                pkts.push(Packet::EntityVelocity {
                    entity_id: item.entity_id,
                    velocity: item.body.last_sent_velocity(),
                });
            }
            Spawn::Mob(mob) => {
                pkts.push(Packet::MobSpawn {
                    entity_id: mob.entity_id,
                    mob_type: mob.mob_type,
                    position: mob.body.last_sent_position(),
                    look: mob.look,
                    metadata: mob.metadata.clone(),
                });
            }
            Spawn::Object(object) => {
                pkts.push(Packet::ObjectSpawn {
                    entity_id: object.entity_id,
                    obj_type: object.obj_type,
                    position: object.body.last_sent_position(),
                    fireball: FireballData::default(),
                });
            }
        }
    }

    /// Per-tick update packets for current subscribers.
    pub fn update_packets(&mut self, pkts: &mut Vec<Packet>) {
        let entity_id = self.entity_id();
        let look = match self {
            Spawn::Mob(mob) => mob.look,
            _ => LookBytes::default(),
        };
        pkts.push(Packet::Entity { entity_id });
        self.body_mut().update_packets(entity_id, look, pkts);
    }

    /// Persist to an entity compound.
    pub fn marshal_nbt(&self) -> Compound {
        let mut tag = Compound::new();
        match self {
            Spawn::Item(item) => {
                tag.set("id", Tag::String("Item".into()));
                let mut inner = Compound::new();
                item.slot.marshal_nbt(&mut inner);
                tag.set("Item", Tag::Compound(inner));
                item.body.marshal_nbt(&mut tag);
            }
            Spawn::Mob(mob) => {
                tag.set("id", Tag::String("Mob".into()));
                tag.set("MobType", Tag::Byte(mob.mob_type.0 as i8));
                mob.body.marshal_nbt(&mut tag);
            }
            Spawn::Object(object) => {
                tag.set("id", Tag::String("Object".into()));
                tag.set("ObjType", Tag::Byte(object.obj_type.0));
                object.body.marshal_nbt(&mut tag);
            }
        }
        tag
    }

    /// Restore from an entity compound. Ids are reassigned by the chunk on
    /// load, so the stored entity id is ignored.
    pub fn unmarshal_nbt(tag: &Compound) -> Option<Spawn> {
        let body = PointObject::unmarshal_nbt(tag)?;
        match tag.get_string("id")? {
            "Item" => {
                let inner = tag.get_compound("Item")?;
                let slot = Slot::unmarshal_nbt(inner);
                if slot.is_empty() {
                    return None;
                }
                Some(Spawn::Item(Item {
                    entity_id: EntityId::default(),
                    slot,
                    body,
                    orientation: OrientationBytes::default(),
                    pickup_immunity: 0,
                }))
            }
            "Mob" => Some(Spawn::Mob(Mob {
                entity_id: EntityId::default(),
                mob_type: MobType(tag.get_byte("MobType")? as u8),
                body,
                look: LookBytes::default(),
                metadata: EntityMetadataTable::default(),
            })),
            "Object" => Some(Spawn::Object(Object {
                entity_id: EntityId::default(),
                obj_type: ObjTypeId(tag.get_byte("ObjType")?),
                body,
            })),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardcraft_core::{ItemCount, ItemData, ItemTypeId};

    fn floor_at(level: i8) -> impl FnMut(&shardcraft_core::BlockXyz) -> Option<bool> {
        move |block| Some(block.y < level)
    }

    #[test]
    fn item_falls_and_lands() {
        let mut item = Spawn::Item(Item::new(
            Slot::new(ItemTypeId(3), ItemCount(1), ItemData(0)),
            AbsXyz::new(0.5, 70.0, 0.5),
            AbsVelocity::default(),
            0,
        ));

        let mut query = floor_at(64);
        let mut moved_any = false;
        for _ in 0..200 {
            moved_any |= item.tick(&mut query);
        }
        assert!(moved_any);
        let pos = item.position();
        assert!((pos.y - 64.0).abs() < 1e-6, "rests on the floor: {pos:?}");

        // Once settled, further ticks report no movement.
        assert!(!item.tick(&mut query));
    }

    #[test]
    fn unknown_blocks_act_solid() {
        let mut item = Spawn::Item(Item::new(
            Slot::new(ItemTypeId(3), ItemCount(1), ItemData(0)),
            AbsXyz::new(0.5, 70.0, 0.5),
            AbsVelocity::default(),
            0,
        ));

        let mut query = |_: &shardcraft_core::BlockXyz| None;
        for _ in 0..10 {
            item.tick(&mut query);
        }
        // The very first probe below hit "unknown", so the item never
        // drops through.
        assert!(item.position().y >= 70.0 - 1.0);
    }

    #[test]
    fn pickup_immunity_counts_down() {
        let mut item = Item::new(
            Slot::new(ItemTypeId(3), ItemCount(1), ItemData(0)),
            AbsXyz::new(0.5, 70.0, 0.5),
            AbsVelocity::default(),
            3,
        );
        assert!(!item.can_be_picked_up());

        let mut spawn = Spawn::Item(item.clone());
        let mut query = floor_at(64);
        for _ in 0..3 {
            spawn.tick(&mut query);
        }
        let Spawn::Item(item) = &spawn else { unreachable!() };
        assert!(item.can_be_picked_up());
    }

    #[test]
    fn update_packets_track_movement() {
        let mut item = Spawn::Item(Item::new(
            Slot::new(ItemTypeId(3), ItemCount(1), ItemData(0)),
            AbsXyz::new(0.5, 70.0, 0.5),
            AbsVelocity::default(),
            0,
        ));

        let mut query = floor_at(64);
        item.tick(&mut query);

        let mut pkts = Vec::new();
        item.update_packets(&mut pkts);
        assert!(matches!(pkts[0], Packet::Entity { .. }));
        assert!(pkts
            .iter()
            .any(|p| matches!(p, Packet::EntityRelMove { .. } | Packet::EntityTeleport { .. })));

        // A second call with no movement in between sends no move packet.
        let mut pkts = Vec::new();
        item.update_packets(&mut pkts);
        assert!(!pkts
            .iter()
            .any(|p| matches!(p, Packet::EntityRelMove { .. } | Packet::EntityTeleport { .. })));
    }

    #[test]
    fn spawn_packets_for_each_kind() {
        let mut pkts = Vec::new();
        Spawn::Item(Item::new(
            Slot::new(ItemTypeId(3), ItemCount(2), ItemData(0)),
            AbsXyz::new(0.0, 64.0, 0.0),
            AbsVelocity::default(),
            0,
        ))
        .spawn_packets(&mut pkts);
        assert!(matches!(pkts[0], Packet::ItemSpawn { .. }));
        assert!(matches!(pkts[1], Packet::EntityVelocity { .. }));

        let mut pkts = Vec::new();
        Spawn::Mob(Mob::new(
            MobType::PIG,
            AbsXyz::new(0.0, 64.0, 0.0),
            AbsVelocity::default(),
        ))
        .spawn_packets(&mut pkts);
        assert!(matches!(pkts[0], Packet::MobSpawn { .. }));
    }

    #[test]
    fn velocity_from_look_directions() {
        // Looking straight down throws straight down.
        let v = velocity_from_look(LookDegrees::new(0.0, 90.0), 1.0);
        assert!(v.y < -0.99);

        // Yaw 0 faces +Z.
        let v = velocity_from_look(LookDegrees::new(0.0, 0.0), 1.0);
        assert!(v.z > 0.99 && v.x.abs() < 1e-6);
    }

    #[test]
    fn nbt_round_trip() {
        let item = Spawn::Item(Item::new(
            Slot::new(ItemTypeId(4), ItemCount(5), ItemData(0)),
            AbsXyz::new(1.5, 70.0, -3.5),
            AbsVelocity::new(0.1, 0.0, -0.1),
            0,
        ));
        let tag = item.marshal_nbt();
        let restored = Spawn::unmarshal_nbt(&tag).unwrap();
        assert!(matches!(&restored, Spawn::Item(i) if i.slot.count == ItemCount(5)));
        assert_eq!(restored.position(), item.position());

        let mob = Spawn::Mob(Mob::new(
            MobType::SHEEP,
            AbsXyz::new(0.0, 64.0, 0.0),
            AbsVelocity::default(),
        ));
        let restored = Spawn::unmarshal_nbt(&mob.marshal_nbt()).unwrap();
        assert!(matches!(restored, Spawn::Mob(m) if m.mob_type == MobType::SHEEP));
    }
}
