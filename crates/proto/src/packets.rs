//! The packet catalog.
//!
//! Each packet is declared exactly once in the `packets!` block below: type
//! id, permitted direction, and the ordered field list. The macro generates
//! the enum variant, the reader, the writer and the direction table row, so
//! adding a packet type is a single declaration. Fields that need custom
//! wire logic implement [`WireField`] in `fields.rs` and slot in like any
//! primitive.

use crate::error::{ProtoError, Result};
use crate::fields::{
    BlocksDxyz, ChunkData, ChunkLoadMode, EntityMetadataTable, FireballData, ItemSlot,
    ItemSlotVec, MapData, MultiBlockChanges, PluginData, RelMove,
};
use crate::wire::WireField;
use shardcraft_core::{
    AbsIntXyz, AbsXyz, BlockId, BlockXyz, ChunkXz, DigStatus, DimensionId, EntityId, Face,
    GameDifficulty, InvTypeId, ItemCount, ItemData, ItemTypeId, LookBytes, LookDegrees, MobType,
    ObjTypeId, PrgBarId, PrgBarValue, SlotId, TxId, Velocity, WindowId,
};
use std::io::{Read, Write};

/// Which peer may send a given packet id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Only the client sends this.
    ClientToServer,
    /// Only the server sends this.
    ServerToClient,
    /// Either peer may send this.
    Both,
}

impl Direction {
    /// Whether a packet with this direction is acceptable coming from the
    /// given peer.
    pub fn permits(self, from_client: bool) -> bool {
        match self {
            Direction::Both => true,
            Direction::ClientToServer => from_client,
            Direction::ServerToClient => !from_client,
        }
    }
}

macro_rules! packets {
    ($(
        $(#[$meta:meta])*
        $id:literal $dir:ident $name:ident { $( $field:ident : $fty:ty ),* $(,)? }
    )*) => {
        /// A decoded wire packet.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Packet {
            $(
                $(#[$meta])*
                $name { $( $field: $fty, )* },
            )*
        }

        impl Packet {
            /// The single-byte type id this packet serializes under.
            pub fn id(&self) -> u8 {
                match self {
                    $( Packet::$name { .. } => $id, )*
                }
            }

            /// Direction metadata for a packet id; `None` when the id is
            /// outside the catalog.
            pub fn direction(id: u8) -> Option<Direction> {
                match id {
                    $( $id => Some(Direction::$dir), )*
                    _ => None,
                }
            }

            fn read_body(id: u8, reader: &mut impl Read) -> Result<Packet> {
                match id {
                    $(
                        $id => Ok(Packet::$name {
                            $( $field: WireField::read(reader)?, )*
                        }),
                    )*
                    other => Err(ProtoError::UnknownPacketId(other)),
                }
            }

            /// Serialize this packet, including its type-id prefix.
            pub fn write(&self, writer: &mut impl Write) -> Result<()> {
                match self {
                    $(
                        #[allow(unused_variables)]
                        Packet::$name { $( $field, )* } => {
                            ($id as u8).write(writer)?;
                            $( WireField::write($field, writer)?; )*
                            Ok(())
                        }
                    )*
                }
            }
        }
    };
}

packets! {
    /// Keep-alive ping; id 0 marks a client-initiated heartbeat.
    0x00 Both KeepAlive { id: i32 }
    /// Login request (client) or login confirmation (server). The first
    /// field is the protocol version from the client and the assigned
    /// entity id from the server.
    0x01 Both Login {
        version_or_entity_id: i32,
        username: String,
        map_seed: i64,
        level_type: String,
        game_mode: i32,
        dimension: DimensionId,
        difficulty: GameDifficulty,
        world_height: u8,
        max_players: u8,
    }
    /// Connection opener (client) or session-id reply (server).
    0x02 Both Handshake { username_or_hash: String }
    0x03 Both ChatMessage { message: String }
    0x04 ServerToClient TimeUpdate { time: i64 }
    0x05 ServerToClient EntityEquipment {
        entity_id: EntityId,
        slot: SlotId,
        item_type: ItemTypeId,
        data: ItemData,
    }
    0x06 ServerToClient SpawnPosition { x: i32, y: i32, z: i32 }
    0x07 ClientToServer UseEntity { user: EntityId, target: EntityId, left_click: bool }
    0x08 ServerToClient UpdateHealth { health: i16, food: i16, food_saturation: f32 }
    0x09 Both Respawn {
        dimension: DimensionId,
        difficulty: GameDifficulty,
        game_type: i8,
        world_height: i16,
        map_seed: i64,
        level_type: String,
    }
    /// On-ground flag with no movement.
    0x0a ClientToServer Player { on_ground: bool }
    0x0b ClientToServer PlayerPosition { x: f64, y: f64, stance: f64, z: f64, on_ground: bool }
    0x0c ClientToServer PlayerLook { look: LookDegrees, on_ground: bool }
    /// Position and look combined. The stance sits between y and z from the
    /// client, but between z and look from the server; y1 is the first
    /// vertical field on the wire and y2 the second.
    0x0d Both PlayerPositionLook {
        x: f64,
        y1: f64,
        y2: f64,
        z: f64,
        look: LookDegrees,
        on_ground: bool,
    }
    0x0e ClientToServer PlayerBlockHit { status: DigStatus, block: BlockXyz, face: Face }
    0x0f ClientToServer PlayerBlockInteract { block: BlockXyz, face: Face, tool: ItemSlot }
    0x10 ClientToServer PlayerHoldingChange { slot_id: SlotId }
    0x11 ServerToClient PlayerUseBed { entity_id: EntityId, flag: u8, block: BlockXyz }
    0x12 Both EntityAnimation { entity_id: EntityId, animation: u8 }
    0x13 ClientToServer EntityAction { entity_id: EntityId, action: u8 }
    0x14 ServerToClient NamedEntitySpawn {
        entity_id: EntityId,
        username: String,
        position: AbsIntXyz,
        rotation: LookBytes,
        current_item: ItemTypeId,
    }
    0x15 ServerToClient ItemSpawn {
        entity_id: EntityId,
        item_type: ItemTypeId,
        count: ItemCount,
        data: ItemData,
        position: AbsIntXyz,
        orientation: shardcraft_core::OrientationBytes,
    }
    0x16 ServerToClient ItemCollect { collected_item: EntityId, collector: EntityId }
    0x17 ServerToClient ObjectSpawn {
        entity_id: EntityId,
        obj_type: ObjTypeId,
        position: AbsIntXyz,
        fireball: FireballData,
    }
    0x18 ServerToClient MobSpawn {
        entity_id: EntityId,
        mob_type: MobType,
        position: AbsIntXyz,
        look: LookBytes,
        metadata: EntityMetadataTable,
    }
    0x19 ServerToClient PaintingSpawn {
        entity_id: EntityId,
        title: String,
        position: AbsIntXyz,
        side_face: i32,
    }
    0x1a ServerToClient ExperienceOrb { entity_id: EntityId, position: AbsIntXyz, count: i16 }
    0x1c ServerToClient EntityVelocity { entity_id: EntityId, velocity: Velocity }
    0x1d ServerToClient EntityDestroy { entity_id: EntityId }
    /// Entity baseline update with no movement.
    0x1e ServerToClient Entity { entity_id: EntityId }
    0x1f ServerToClient EntityRelMove { entity_id: EntityId, delta: RelMove }
    0x20 ServerToClient EntityLook { entity_id: EntityId, look: LookBytes }
    0x21 ServerToClient EntityLookAndRelMove {
        entity_id: EntityId,
        delta: RelMove,
        look: LookBytes,
    }
    0x22 ServerToClient EntityTeleport {
        entity_id: EntityId,
        position: AbsIntXyz,
        look: LookBytes,
    }
    0x26 ServerToClient EntityStatus { entity_id: EntityId, status: u8 }
    0x27 ServerToClient EntityAttach { entity_id: EntityId, vehicle_id: EntityId }
    0x28 ServerToClient EntityMetadata { entity_id: EntityId, metadata: EntityMetadataTable }
    0x29 ServerToClient EntityEffect {
        entity_id: EntityId,
        effect: i8,
        value: i8,
        duration: i16,
    }
    0x2a ServerToClient EntityRemoveEffect { entity_id: EntityId, effect: i8 }
    0x2b ServerToClient PlayerExperience { experience: f32, level: i16, total_experience: i16 }
    0x32 ServerToClient PreChunk { chunk_loc: ChunkXz, mode: ChunkLoadMode }
    0x33 ServerToClient MapChunk { corner: BlockXyz, data: ChunkData }
    0x34 ServerToClient MultiBlockChange { chunk_loc: ChunkXz, changes: MultiBlockChanges }
    0x35 ServerToClient BlockChange { block: BlockXyz, block_type: BlockId, block_data: u8 }
    0x36 ServerToClient BlockAction { x: i32, y: i16, z: i32, value1: u8, value2: u8 }
    0x3c ServerToClient Explosion { center: AbsXyz, radius: f32, blocks: BlocksDxyz }
    0x3d ServerToClient SoundEffect { effect: i32, block: BlockXyz, data: i32 }
    /// Weather/bed state change notification.
    0x46 ServerToClient State { reason: u8, game_type: u8 }
    0x47 ServerToClient Thunderbolt { entity_id: EntityId, flag: bool, position: AbsIntXyz }
    0x64 ServerToClient WindowOpen {
        window_id: WindowId,
        inventory: InvTypeId,
        title: String,
        num_slots: u8,
    }
    0x65 Both WindowClose { window_id: WindowId }
    0x66 ClientToServer WindowClick {
        window_id: WindowId,
        slot: SlotId,
        right_click: bool,
        tx_id: TxId,
        shift: bool,
        expected_slot: ItemSlot,
    }
    0x67 ServerToClient WindowSetSlot { window_id: WindowId, slot_index: SlotId, item: ItemSlot }
    0x68 ServerToClient WindowItems { window_id: WindowId, slots: ItemSlotVec }
    0x69 ServerToClient WindowProgressBar {
        window_id: WindowId,
        prg_bar_id: PrgBarId,
        value: PrgBarValue,
    }
    0x6a Both WindowTransaction { window_id: WindowId, tx_id: TxId, accepted: bool }
    0x6b Both CreativeInventoryAction { slot_id: SlotId, slot: ItemSlot }
    0x6c ClientToServer EnchantItem { window_id: WindowId, enchantment: i8 }
    0x82 Both SignUpdate {
        x: i32,
        y: i16,
        z: i32,
        text1: String,
        text2: String,
        text3: String,
        text4: String,
    }
    0x83 ServerToClient ItemData { item_type: ItemTypeId, map_id: ItemData, map_data: MapData }
    0xc8 ClientToServer IncrementStatistic { statistic_id: i32, amount: u8 }
    0xc9 ServerToClient PlayerListItem { username: String, online: bool, ping: i16 }
    0xfa Both PluginMessage { channel: String, data: PluginData }
    /// Server list poll; carries no payload.
    0xfe ClientToServer ServerListPing {}
    0xff Both Disconnect { reason: String }
}

/// Read one packet, validating its direction against the sending peer.
pub fn read_packet(reader: &mut impl Read, from_client: bool) -> Result<Packet> {
    let id = u8::read(reader)?;
    read_packet_body(reader, from_client, id)
}

/// Read one packet whose id must be among `expected`.
pub fn read_packet_expect(
    reader: &mut impl Read,
    from_client: bool,
    expected: &[u8],
) -> Result<Packet> {
    let id = u8::read(reader)?;
    if !expected.contains(&id) {
        return Err(ProtoError::UnexpectedPacketId(id));
    }
    read_packet_body(reader, from_client, id)
}

fn read_packet_body(reader: &mut impl Read, from_client: bool, id: u8) -> Result<Packet> {
    let direction = Packet::direction(id).ok_or(ProtoError::UnknownPacketId(id))?;
    if !direction.permits(from_client) {
        return Err(ProtoError::UnexpectedPacketId(id));
    }
    Packet::read_body(id, reader)
}

/// Serialize a run of packets into one byte blob.
pub fn serialize_packets(packets: &[Packet]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    for packet in packets {
        packet.write(&mut buf)?;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{EntityMetadata, MetadataValue};

    const F64_ONE: [u8; 8] = [0x3f, 0xf0, 0, 0, 0, 0, 0, 0];
    const F64_TWO: [u8; 8] = [0x40, 0x00, 0, 0, 0, 0, 0, 0];
    const F64_THREE: [u8; 8] = [0x40, 0x08, 0, 0, 0, 0, 0, 0];
    const F64_FOUR: [u8; 8] = [0x40, 0x10, 0, 0, 0, 0, 0, 0];

    fn assert_wire(packet: Packet, from_client: bool, expected: &[u8]) {
        let mut buf = Vec::new();
        packet.write(&mut buf).unwrap();
        assert_eq!(buf, expected, "serialized form of {packet:?}");

        let decoded = read_packet(&mut buf.as_slice(), from_client).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn keep_alive_wire() {
        assert_wire(
            Packet::KeepAlive { id: 10 },
            true,
            &[0x00, 0x00, 0x00, 0x00, 0x0a],
        );
    }

    #[test]
    fn handshake_wire() {
        assert_wire(
            Packet::Handshake {
                username_or_hash: "username".into(),
            },
            true,
            &[
                0x02, 0x00, 0x08, 0x00, b'u', 0x00, b's', 0x00, b'e', 0x00, b'r', 0x00, b'n',
                0x00, b'a', 0x00, b'm', 0x00, b'e',
            ],
        );
    }

    #[test]
    fn use_entity_wire() {
        assert_wire(
            Packet::UseEntity {
                user: EntityId(2),
                target: EntityId(5),
                left_click: true,
            },
            true,
            &[0x07, 0, 0, 0, 2, 0, 0, 0, 5, 1],
        );
    }

    #[test]
    fn player_position_wire() {
        let mut expected = vec![0x0b];
        expected.extend_from_slice(&F64_ONE);
        expected.extend_from_slice(&F64_TWO);
        expected.extend_from_slice(&F64_THREE);
        expected.extend_from_slice(&F64_FOUR);
        expected.push(0x01);

        assert_wire(
            Packet::PlayerPosition {
                x: 1.0,
                y: 2.0,
                stance: 3.0,
                z: 4.0,
                on_ground: true,
            },
            true,
            &expected,
        );
    }

    #[test]
    fn entity_metadata_wire() {
        assert_wire(
            Packet::EntityMetadata {
                entity_id: EntityId(5),
                metadata: EntityMetadataTable(vec![EntityMetadata {
                    index: 0,
                    value: MetadataValue::Byte(5),
                }]),
            },
            false,
            &[0x28, 0, 0, 0, 5, 0x00, 0x05, 0x7f],
        );
    }

    #[test]
    fn window_items_wire() {
        assert_wire(
            Packet::WindowItems {
                window_id: WindowId(5),
                slots: ItemSlotVec(vec![
                    ItemSlot::empty(),
                    ItemSlot::new(ItemTypeId(3), ItemCount(7), ItemData(1)),
                ]),
            },
            false,
            &[0x68, 0x05, 0x00, 0x02, 0xff, 0xff, 0x00, 0x03, 0x07, 0x00, 0x01],
        );
    }

    #[test]
    fn login_round_trips() {
        let login = Packet::Login {
            version_or_entity_id: 23,
            username: "alice".into(),
            map_seed: 123,
            level_type: "DEFAULT".into(),
            game_mode: 0,
            dimension: DimensionId::NORMAL,
            difficulty: GameDifficulty::NORMAL,
            world_height: 128,
            max_players: 12,
        };
        let mut buf = Vec::new();
        login.write(&mut buf).unwrap();
        let decoded = read_packet(&mut buf.as_slice(), true).unwrap();
        assert_eq!(decoded, login);
    }

    #[test]
    fn map_chunk_round_trips() {
        let packet = Packet::MapChunk {
            corner: BlockXyz::new(16, 0, 32),
            data: ChunkData {
                size: crate::fields::ChunkDataSize { x: 0, y: 1, z: 2 },
                blocks: vec![1, 2, 3, 4, 5, 6],
                block_data: vec![1, 2, 3],
                block_light: vec![4, 5, 6],
                sky_light: vec![7, 8, 9],
            },
        };
        let mut buf = Vec::new();
        packet.write(&mut buf).unwrap();
        let decoded = read_packet(&mut buf.as_slice(), false).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn unknown_id_rejected() {
        let buf = [0x1b, 0, 0];
        assert!(matches!(
            read_packet(&mut buf.as_slice(), true),
            Err(ProtoError::UnknownPacketId(0x1b))
        ));
    }

    #[test]
    fn wrong_direction_rejected() {
        // TimeUpdate is server-to-client only.
        let mut buf = Vec::new();
        Packet::TimeUpdate { time: 100 }.write(&mut buf).unwrap();
        assert!(matches!(
            read_packet(&mut buf.as_slice(), true),
            Err(ProtoError::UnexpectedPacketId(0x04))
        ));
        // But decodes fine in the server-to-client direction.
        assert!(read_packet(&mut buf.as_slice(), false).is_ok());

        // UseEntity is client-to-server only.
        let mut buf = Vec::new();
        Packet::UseEntity {
            user: EntityId(1),
            target: EntityId(2),
            left_click: false,
        }
        .write(&mut buf)
        .unwrap();
        assert!(matches!(
            read_packet(&mut buf.as_slice(), false),
            Err(ProtoError::UnexpectedPacketId(0x07))
        ));
    }

    #[test]
    fn expect_filters_ids() {
        let mut buf = Vec::new();
        Packet::ServerListPing {}.write(&mut buf).unwrap();

        assert!(read_packet_expect(&mut buf.as_slice(), true, &[0x02, 0xfe]).is_ok());
        assert!(matches!(
            read_packet_expect(&mut buf.as_slice(), true, &[0x02]),
            Err(ProtoError::UnexpectedPacketId(0xfe))
        ));
    }

    #[test]
    fn serialize_packets_concatenates() {
        let blob = serialize_packets(&[
            Packet::KeepAlive { id: 1 },
            Packet::Disconnect {
                reason: "bye".into(),
            },
        ])
        .unwrap();
        assert_eq!(blob[0], 0x00);
        assert_eq!(blob[5], 0xff);

        let mut r = blob.as_slice();
        assert!(matches!(
            read_packet(&mut r, false).unwrap(),
            Packet::KeepAlive { id: 1 }
        ));
        assert!(matches!(
            read_packet(&mut r, false).unwrap(),
            Packet::Disconnect { .. }
        ));
        assert!(r.is_empty());
    }

    #[test]
    fn block_interact_empty_tool() {
        assert_wire(
            Packet::PlayerBlockInteract {
                block: BlockXyz::new(1, 2, 3),
                face: Face(2),
                tool: ItemSlot::empty(),
            },
            true,
            &[0x0f, 0, 0, 0, 1, 2, 0, 0, 0, 3, 2, 0xff, 0xff],
        );
    }
}
