//! Fuzz-style property tests for the packet codec.
//!
//! Round-trip properties for representative packet shapes, and
//! arbitrary-bytes robustness: decoders must reject garbage with an error,
//! never panic.

use proptest::prelude::*;
use shardcraft_core::{EntityId, ItemCount, ItemData, ItemTypeId, SlotId, TxId, WindowId};
use shardcraft_proto::{
    read_packet, serialize_packets, ChunkData, ChunkDataSize, ItemSlot, ItemSlotVec,
    MultiBlockChanges, Packet, ProtoError, WireField,
};

fn arb_item_slot() -> impl Strategy<Value = ItemSlot> {
    prop_oneof![
        Just(ItemSlot::empty()),
        (1i16..400, 1i8..64, any::<i16>()).prop_map(|(ty, count, data)| {
            ItemSlot::new(ItemTypeId(ty), ItemCount(count), ItemData(data))
        }),
    ]
}

proptest! {
    #[test]
    fn arbitrary_bytes_dont_crash_client_decode(
        bytes in prop::collection::vec(any::<u8>(), 0..2000),
    ) {
        let _ = read_packet(&mut bytes.as_slice(), true);
    }

    #[test]
    fn arbitrary_bytes_dont_crash_server_decode(
        bytes in prop::collection::vec(any::<u8>(), 0..2000),
    ) {
        let _ = read_packet(&mut bytes.as_slice(), false);
    }

    #[test]
    fn keep_alive_round_trips(id in any::<i32>()) {
        let packet = Packet::KeepAlive { id };
        let blob = serialize_packets(std::slice::from_ref(&packet)).unwrap();
        let decoded = read_packet(&mut blob.as_slice(), true).unwrap();
        prop_assert_eq!(decoded, packet);
    }

    #[test]
    fn chat_round_trips(message in "[ -~]{0,120}") {
        let packet = Packet::ChatMessage { message };
        let blob = serialize_packets(std::slice::from_ref(&packet)).unwrap();
        let decoded = read_packet(&mut blob.as_slice(), true).unwrap();
        prop_assert_eq!(decoded, packet);
    }

    #[test]
    fn player_position_round_trips(
        x in -30_000_000.0f64..30_000_000.0,
        y in 0.0f64..128.0,
        z in -30_000_000.0f64..30_000_000.0,
        on_ground in any::<bool>(),
    ) {
        let packet = Packet::PlayerPosition { x, y, stance: y + 1.62, z, on_ground };
        let blob = serialize_packets(std::slice::from_ref(&packet)).unwrap();
        let decoded = read_packet(&mut blob.as_slice(), true).unwrap();
        prop_assert_eq!(decoded, packet);
    }

    #[test]
    fn window_items_round_trips(slots in prop::collection::vec(arb_item_slot(), 0..46)) {
        let packet = Packet::WindowItems {
            window_id: WindowId(1),
            slots: ItemSlotVec(slots),
        };
        let blob = serialize_packets(std::slice::from_ref(&packet)).unwrap();
        let decoded = read_packet(&mut blob.as_slice(), false).unwrap();
        prop_assert_eq!(decoded, packet);
    }

    #[test]
    fn window_click_round_trips(
        slot in -1i16..45,
        right_click in any::<bool>(),
        shift in any::<bool>(),
        tx in any::<i16>(),
        expected in arb_item_slot(),
    ) {
        let packet = Packet::WindowClick {
            window_id: WindowId(0),
            slot: SlotId(slot),
            right_click,
            tx_id: TxId(tx),
            shift,
            expected_slot: expected,
        };
        let blob = serialize_packets(std::slice::from_ref(&packet)).unwrap();
        let decoded = read_packet(&mut blob.as_slice(), true).unwrap();
        prop_assert_eq!(decoded, packet);
    }

    #[test]
    fn chunk_data_round_trips(
        blocks in prop::collection::vec(any::<u8>(), 32..=32),
        nibbles in prop::collection::vec(any::<u8>(), 16..=16),
    ) {
        // 2x8x2 cells.
        let data = ChunkData {
            size: ChunkDataSize { x: 1, y: 7, z: 1 },
            blocks,
            block_data: nibbles.clone(),
            block_light: nibbles.clone(),
            sky_light: nibbles,
        };
        let mut buf = Vec::new();
        data.write(&mut buf).unwrap();
        let decoded = ChunkData::read(&mut buf.as_slice()).unwrap();
        prop_assert_eq!(decoded, data);
    }

    #[test]
    fn multi_block_change_round_trips(
        entries in prop::collection::vec((any::<u8>(), any::<u8>(), any::<u8>()), 0..64),
    ) {
        let changes = MultiBlockChanges {
            coords: entries
                .iter()
                .map(|(x, y, z)| MultiBlockChanges::pack_coord(x & 0x0f, *y >> 1, z & 0x0f))
                .collect(),
            type_ids: entries.iter().map(|(x, ..)| *x).collect(),
            block_data: entries.iter().map(|(_, y, _)| *y).collect(),
        };
        let packet = Packet::MultiBlockChange {
            chunk_loc: shardcraft_core::ChunkXz::new(1, 2),
            changes,
        };
        let blob = serialize_packets(std::slice::from_ref(&packet)).unwrap();
        let decoded = read_packet(&mut blob.as_slice(), false).unwrap();
        prop_assert_eq!(decoded, packet);
    }

    #[test]
    fn truncated_frames_error_not_panic(truncate_at in 0usize..40) {
        let packet = Packet::NamedEntitySpawn {
            entity_id: EntityId(7),
            username: "somebody".into(),
            position: shardcraft_core::AbsIntXyz { x: 1, y: 2, z: 3 },
            rotation: Default::default(),
            current_item: ItemTypeId(0),
        };
        let mut blob = serialize_packets(std::slice::from_ref(&packet)).unwrap();
        if truncate_at < blob.len() {
            blob.truncate(truncate_at);
            let result = read_packet(&mut blob.as_slice(), false);
            prop_assert!(result.is_err());
        }
    }
}

#[test]
fn string_too_long_is_reported() {
    let packet = Packet::ChatMessage {
        message: "x".repeat(40_000),
    };
    assert!(matches!(
        serialize_packets(std::slice::from_ref(&packet)),
        Err(ProtoError::StringTooLong)
    ));
}

#[test]
fn empty_input_is_io_error() {
    assert!(read_packet(&mut [].as_slice(), true).is_err());
}
