//! Composite packet fields that do not fit the uniform field grammar.
//!
//! These implement [`WireField`] by hand — the codec equivalent of the
//! marshaler opt-out: the `packets!` declarations treat them like any other
//! field, and the custom logic lives here.

use crate::error::{ProtoError, Result};
use crate::wire::WireField;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use shardcraft_core::{EntityId, ItemCount, ItemData, ItemTypeId};
use shardcraft_nbt::Compound;
use std::io::{Read, Write};
use tracing::warn;

/// Item type ids whose wire slots carry a gzip-compressed NBT compound:
/// tools, armour, bow, fishing rod and shears.
pub fn requires_nbt(item_type: ItemTypeId) -> bool {
    matches!(
        item_type.0,
        0x105 // bow
        | 0x15a // fishing rod
        | 0x167 // shears
        // sword, shovel, pickaxe, axe, hoe per material
        | 0x10c..=0x10f | 0x122 // wood
        | 0x110..=0x113 | 0x123 // stone
        | 0x10b | 0x100..=0x102 | 0x124 // iron
        | 0x114..=0x117 | 0x125 // diamond
        | 0x11b..=0x11e | 0x126 // gold
        // helmet, chestplate, leggings, boots per material
        | 0x12a..=0x12d // leather
        | 0x12e..=0x131 // chain
        | 0x132..=0x135 // iron
        | 0x136..=0x139 // diamond
        | 0x13a..=0x13d // gold
    )
}

/// An inventory slot on the wire. Item type -1 encodes "empty" and carries
/// no further bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSlot {
    pub item_type: ItemTypeId,
    pub count: ItemCount,
    pub data: ItemData,
    /// Only present for the damageable item-type set.
    pub nbt: Option<Compound>,
}

impl Default for ItemSlot {
    fn default() -> Self {
        Self::empty()
    }
}

impl ItemSlot {
    /// The empty slot.
    pub fn empty() -> Self {
        Self {
            item_type: ItemTypeId::NULL,
            count: ItemCount(0),
            data: ItemData(0),
            nbt: None,
        }
    }

    /// A plain slot without NBT.
    pub fn new(item_type: ItemTypeId, count: ItemCount, data: ItemData) -> Self {
        Self {
            item_type,
            count,
            data,
            nbt: None,
        }
    }

    /// Whether this slot encodes "no item".
    pub fn is_empty(&self) -> bool {
        self.item_type == ItemTypeId::NULL || self.count.0 == 0
    }
}

impl WireField for ItemSlot {
    fn read(reader: &mut impl Read) -> Result<Self> {
        let item_type = ItemTypeId::read(reader)?;
        if item_type == ItemTypeId::NULL {
            return Ok(ItemSlot::empty());
        }

        let count = ItemCount::read(reader)?;
        let data = ItemData::read(reader)?;

        let nbt = if requires_nbt(item_type) {
            let len = i16::read(reader)?;
            if len < 0 {
                None
            } else {
                let mut compressed = vec![0u8; len as usize];
                reader.read_exact(&mut compressed)?;
                Some(shardcraft_nbt::read_gzip(compressed.as_slice())?)
            }
        } else {
            None
        };

        Ok(ItemSlot {
            item_type,
            count,
            data,
            nbt,
        })
    }

    fn write(&self, writer: &mut impl Write) -> Result<()> {
        self.item_type.write(writer)?;
        if self.item_type == ItemTypeId::NULL {
            return Ok(());
        }

        self.count.write(writer)?;
        self.data.write(writer)?;

        if requires_nbt(self.item_type) {
            match &self.nbt {
                Some(compound) if !compound.is_empty() => {
                    let mut compressed = Vec::new();
                    shardcraft_nbt::write_gzip(&mut compressed, compound)?;
                    (compressed.len() as i16).write(writer)?;
                    writer.write_all(&compressed)?;
                }
                _ => {
                    (-1i16).write(writer)?;
                }
            }
        }

        Ok(())
    }
}

/// A slot array prefixed by an i16 count.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ItemSlotVec(pub Vec<ItemSlot>);

impl WireField for ItemSlotVec {
    fn read(reader: &mut impl Read) -> Result<Self> {
        let count = i16::read(reader)?;
        if count < 0 {
            return Err(ProtoError::LengthNegative);
        }

        let mut slots = Vec::with_capacity(count as usize);
        for _ in 0..count {
            slots.push(ItemSlot::read(reader)?);
        }
        Ok(ItemSlotVec(slots))
    }

    fn write(&self, writer: &mut impl Write) -> Result<()> {
        (self.0.len() as i16).write(writer)?;
        for slot in &self.0 {
            slot.write(writer)?;
        }
        Ok(())
    }
}

/// Dimensions of the data inside [`ChunkData`]. Each component is a maximum
/// index, so the cell count along an axis is the component plus one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkDataSize {
    pub x: u8,
    pub y: u8,
    pub z: u8,
}

impl ChunkDataSize {
    /// Total cells described.
    pub fn cells(&self) -> usize {
        (self.x as usize + 1) * (self.y as usize + 1) * (self.z as usize + 1)
    }
}

/// The zlib-compressed block payload of a map-chunk packet: block ids, then
/// three half-byte-packed arrays (block data, block light, sky light).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChunkData {
    pub size: ChunkDataSize,
    pub blocks: Vec<u8>,
    pub block_data: Vec<u8>,
    pub block_light: Vec<u8>,
    pub sky_light: Vec<u8>,
}

impl WireField for ChunkData {
    fn read(reader: &mut impl Read) -> Result<Self> {
        let size = ChunkDataSize {
            x: u8::read(reader)?,
            y: u8::read(reader)?,
            z: u8::read(reader)?,
        };

        let length = u32::read(reader)?;
        if (length as i32) < 0 {
            return Err(ProtoError::LengthNegative);
        }

        let mut compressed = vec![0u8; length as usize];
        reader.read_exact(&mut compressed)?;

        let cells = size.cells();
        let nibbles = cells >> 1;

        let mut decoder = ZlibDecoder::new(compressed.as_slice());
        let mut payload = vec![0u8; cells + 3 * nibbles];
        decoder.read_exact(&mut payload)?;

        // Make sure we consumed the whole stream; trailing bytes mean we
        // have lost sync with the packet framing.
        let mut dump = [0u8; 64];
        match decoder.read(&mut dump)? {
            0 => {}
            n => {
                warn!("unexpected {n}+ extra bytes inside chunk data; assuming bad packet stream");
                return Err(ProtoError::BadPacketData);
            }
        }

        let sky_light = payload.split_off(cells + 2 * nibbles);
        let block_light = payload.split_off(cells + nibbles);
        let block_data = payload.split_off(cells);
        let blocks = payload;

        Ok(ChunkData {
            size,
            blocks,
            block_data,
            block_light,
            sky_light,
        })
    }

    fn write(&self, writer: &mut impl Write) -> Result<()> {
        let cells = self.size.cells();
        let nibbles = cells >> 1;
        if self.blocks.len() != cells
            || self.block_data.len() != nibbles
            || self.block_light.len() != nibbles
            || self.sky_light.len() != nibbles
        {
            return Err(ProtoError::BadChunkDataSize);
        }

        self.size.x.write(writer)?;
        self.size.y.write(writer)?;
        self.size.z.write(writer)?;

        let mut encoder = ZlibEncoder::new(Vec::with_capacity(8192), Compression::default());
        encoder.write_all(&self.blocks)?;
        encoder.write_all(&self.block_data)?;
        encoder.write_all(&self.block_light)?;
        encoder.write_all(&self.sky_light)?;
        let compressed = encoder.finish()?;

        (compressed.len() as u32).write(writer)?;
        writer.write_all(&compressed)?;
        Ok(())
    }
}

/// The packed parallel arrays of a multi-block-change packet. Coords pack a
/// chunk-local position into an i16: x in bits 12-15, z in bits 8-11, y in
/// bits 0-7.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultiBlockChanges {
    pub coords: Vec<i16>,
    pub type_ids: Vec<u8>,
    pub block_data: Vec<u8>,
}

impl MultiBlockChanges {
    /// Pack a chunk-local position into the wire coordinate form.
    pub fn pack_coord(x: u8, y: u8, z: u8) -> i16 {
        (((x as i16) & 0x0f) << 12) | (((z as i16) & 0x0f) << 8) | (y as i16 & 0xff)
    }

    /// Unpack a wire coordinate into chunk-local (x, y, z).
    pub fn unpack_coord(coord: i16) -> (u8, u8, u8) {
        (
            ((coord >> 12) & 0x0f) as u8,
            (coord & 0xff) as u8,
            ((coord >> 8) & 0x0f) as u8,
        )
    }
}

impl WireField for MultiBlockChanges {
    fn read(reader: &mut impl Read) -> Result<Self> {
        let count = i16::read(reader)?;
        if count < 0 {
            return Err(ProtoError::LengthNegative);
        }
        let count = count as usize;

        let mut coords = Vec::with_capacity(count);
        for _ in 0..count {
            coords.push(i16::read(reader)?);
        }

        let mut type_ids = vec![0u8; count];
        reader.read_exact(&mut type_ids)?;

        let mut block_data = vec![0u8; count];
        reader.read_exact(&mut block_data)?;

        Ok(MultiBlockChanges {
            coords,
            type_ids,
            block_data,
        })
    }

    fn write(&self, writer: &mut impl Write) -> Result<()> {
        let count = self.coords.len();
        if count != self.type_ids.len() || count != self.block_data.len() {
            return Err(ProtoError::MismatchingValues);
        }

        (count as i16).write(writer)?;
        for coord in &self.coords {
            coord.write(writer)?;
        }
        writer.write_all(&self.type_ids)?;
        writer.write_all(&self.block_data)?;
        Ok(())
    }
}

/// Relative block offsets in an explosion packet: a u32 triple count, then
/// three signed bytes per triple.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlocksDxyz(pub Vec<i8>);

impl WireField for BlocksDxyz {
    fn read(reader: &mut impl Read) -> Result<Self> {
        let count = u32::read(reader)?;
        if (count as i32) < 0 {
            return Err(ProtoError::LengthNegative);
        }

        let mut raw = vec![0u8; 3 * count as usize];
        reader.read_exact(&mut raw)?;
        Ok(BlocksDxyz(raw.into_iter().map(|b| b as i8).collect()))
    }

    fn write(&self, writer: &mut impl Write) -> Result<()> {
        if self.0.len() % 3 != 0 {
            return Err(ProtoError::MismatchingValues);
        }
        ((self.0.len() / 3) as u32).write(writer)?;
        for b in &self.0 {
            b.write(writer)?;
        }
        Ok(())
    }
}

/// Map item pixel data: a u8 length prefix then raw bytes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapData(pub Vec<u8>);

impl WireField for MapData {
    fn read(reader: &mut impl Read) -> Result<Self> {
        let length = u8::read(reader)?;
        let mut data = vec![0u8; length as usize];
        reader.read_exact(&mut data)?;
        Ok(MapData(data))
    }

    fn write(&self, writer: &mut impl Write) -> Result<()> {
        (self.0.len() as u8).write(writer)?;
        writer.write_all(&self.0)?;
        Ok(())
    }
}

/// Plugin-message payload: a u16 length prefix capped at i16::MAX.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PluginData(pub Vec<u8>);

impl WireField for PluginData {
    fn read(reader: &mut impl Read) -> Result<Self> {
        let length = u16::read(reader)?;
        if length > i16::MAX as u16 {
            return Err(ProtoError::LengthNegative);
        }
        let mut data = vec![0u8; length as usize];
        reader.read_exact(&mut data)?;
        Ok(PluginData(data))
    }

    fn write(&self, writer: &mut impl Write) -> Result<()> {
        (self.0.len() as u16).write(writer)?;
        writer.write_all(&self.0)?;
        Ok(())
    }
}

/// Thrower and offsets for fireball-style object spawns. Only present on the
/// wire when the thrower id is positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FireballData {
    pub thrower_id: EntityId,
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl WireField for FireballData {
    fn read(reader: &mut impl Read) -> Result<Self> {
        let thrower_id = EntityId::read(reader)?;
        if thrower_id.0 > 0 {
            Ok(FireballData {
                thrower_id,
                x: i16::read(reader)?,
                y: i16::read(reader)?,
                z: i16::read(reader)?,
            })
        } else {
            Ok(FireballData {
                thrower_id,
                x: 0,
                y: 0,
                z: 0,
            })
        }
    }

    fn write(&self, writer: &mut impl Write) -> Result<()> {
        self.thrower_id.write(writer)?;
        if self.thrower_id.0 > 0 {
            self.x.write(writer)?;
            self.y.write(writer)?;
            self.z.write(writer)?;
        }
        Ok(())
    }
}

/// A relative entity move in 1/32-block units, constrained to a byte per
/// axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelMove {
    pub x: i8,
    pub y: i8,
    pub z: i8,
}

impl WireField for RelMove {
    fn read(reader: &mut impl Read) -> Result<Self> {
        Ok(Self {
            x: i8::read(reader)?,
            y: i8::read(reader)?,
            z: i8::read(reader)?,
        })
    }

    fn write(&self, writer: &mut impl Write) -> Result<()> {
        self.x.write(writer)?;
        self.y.write(writer)?;
        self.z.write(writer)
    }
}

/// Pre-chunk packet mode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkLoadMode(pub u8);

impl ChunkLoadMode {
    /// The client should unload the chunk.
    pub const UNLOAD: ChunkLoadMode = ChunkLoadMode(0);
    /// The client should initialize the chunk ahead of map data.
    pub const INIT: ChunkLoadMode = ChunkLoadMode(1);
}

impl WireField for ChunkLoadMode {
    fn read(reader: &mut impl Read) -> Result<Self> {
        Ok(Self(u8::read(reader)?))
    }

    fn write(&self, writer: &mut impl Write) -> Result<()> {
        self.0.write(writer)
    }
}

/// One entry in an entity metadata table. The wire header packs the payload
/// type into the top 3 bits and the field index into the low 5.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMetadata {
    pub index: u8,
    pub value: MetadataValue,
}

/// Typed payload of a metadata entry.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Byte(i8),
    Short(i16),
    Int(i32),
    Float(f32),
    String(String),
    Position(i16, u8, i16),
}

impl MetadataValue {
    fn type_tag(&self) -> u8 {
        match self {
            MetadataValue::Byte(_) => 0,
            MetadataValue::Short(_) => 1,
            MetadataValue::Int(_) => 2,
            MetadataValue::Float(_) => 3,
            MetadataValue::String(_) => 4,
            MetadataValue::Position(..) => 5,
        }
    }
}

const METADATA_TERMINATOR: u8 = 0x7f;

/// A variable-length entity metadata table, terminated by 0x7F.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityMetadataTable(pub Vec<EntityMetadata>);

impl WireField for EntityMetadataTable {
    fn read(reader: &mut impl Read) -> Result<Self> {
        let mut items = Vec::new();
        loop {
            let header = u8::read(reader)?;
            if header == METADATA_TERMINATOR {
                break;
            }

            let index = header & 0x1f;
            let value = match (header & 0xe0) >> 5 {
                0 => MetadataValue::Byte(i8::read(reader)?),
                1 => MetadataValue::Short(i16::read(reader)?),
                2 => MetadataValue::Int(i32::read(reader)?),
                3 => MetadataValue::Float(f32::read(reader)?),
                4 => MetadataValue::String(String::read(reader)?),
                5 => MetadataValue::Position(
                    i16::read(reader)?,
                    u8::read(reader)?,
                    i16::read(reader)?,
                ),
                other => {
                    warn!("unknown entity metadata type tag {other}");
                    return Err(ProtoError::BadPacketData);
                }
            };

            items.push(EntityMetadata { index, value });
        }
        Ok(EntityMetadataTable(items))
    }

    fn write(&self, writer: &mut impl Write) -> Result<()> {
        for item in &self.0 {
            let header = (item.value.type_tag() << 5) | (item.index & 0x1f);
            header.write(writer)?;
            match &item.value {
                MetadataValue::Byte(v) => v.write(writer)?,
                MetadataValue::Short(v) => v.write(writer)?,
                MetadataValue::Int(v) => v.write(writer)?,
                MetadataValue::Float(v) => v.write(writer)?,
                MetadataValue::String(v) => v.write(writer)?,
                MetadataValue::Position(x, y, z) => {
                    x.write(writer)?;
                    y.write(writer)?;
                    z.write(writer)?;
                }
            }
        }
        METADATA_TERMINATOR.write(writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: WireField + PartialEq + std::fmt::Debug>(value: &T) -> T {
        let mut buf = Vec::new();
        value.write(&mut buf).unwrap();
        let mut r = buf.as_slice();
        let restored = T::read(&mut r).unwrap();
        assert!(r.is_empty(), "trailing bytes after read");
        restored
    }

    #[test]
    fn nbt_item_set_membership() {
        assert!(requires_nbt(ItemTypeId(0x105))); // bow
        assert!(requires_nbt(ItemTypeId(0x10c))); // wooden sword
        assert!(requires_nbt(ItemTypeId(0x139))); // diamond boots
        assert!(!requires_nbt(ItemTypeId(1))); // stone block
        assert!(!requires_nbt(ItemTypeId(0x106)));
    }

    #[test]
    fn empty_slot_is_two_bytes() {
        let mut buf = Vec::new();
        ItemSlot::empty().write(&mut buf).unwrap();
        assert_eq!(buf, [0xff, 0xff]);
        assert_eq!(round_trip(&ItemSlot::empty()), ItemSlot::empty());
    }

    #[test]
    fn plain_slot_round_trips() {
        let slot = ItemSlot::new(ItemTypeId(3), ItemCount(7), ItemData(1));
        let mut buf = Vec::new();
        slot.write(&mut buf).unwrap();
        assert_eq!(buf, [0x00, 0x03, 0x07, 0x00, 0x01]);
        assert_eq!(round_trip(&slot), slot);
    }

    #[test]
    fn nbt_slot_round_trips() {
        let mut compound = Compound::new();
        compound.set("Damage", shardcraft_nbt::Tag::Short(12));
        let slot = ItemSlot {
            item_type: ItemTypeId(0x10c),
            count: ItemCount(1),
            data: ItemData(12),
            nbt: Some(compound),
        };
        assert_eq!(round_trip(&slot), slot);
    }

    #[test]
    fn nbt_slot_without_compound_writes_absent_marker() {
        let slot = ItemSlot::new(ItemTypeId(0x105), ItemCount(1), ItemData(0));
        let mut buf = Vec::new();
        slot.write(&mut buf).unwrap();
        // type, count, data, then -1 "no tags" marker.
        assert_eq!(buf, [0x01, 0x05, 0x01, 0x00, 0x00, 0xff, 0xff]);
        assert_eq!(round_trip(&slot), slot);
    }

    #[test]
    fn slot_vec_round_trips() {
        let slots = ItemSlotVec(vec![
            ItemSlot::empty(),
            ItemSlot::new(ItemTypeId(3), ItemCount(7), ItemData(1)),
        ]);
        let mut buf = Vec::new();
        slots.write(&mut buf).unwrap();
        assert_eq!(
            buf,
            [0x00, 0x02, 0xff, 0xff, 0x00, 0x03, 0x07, 0x00, 0x01]
        );
        assert_eq!(round_trip(&slots), slots);
    }

    #[test]
    fn chunk_data_round_trips() {
        let size = ChunkDataSize { x: 0, y: 1, z: 2 };
        let chunk = ChunkData {
            size,
            blocks: vec![1, 2, 3, 4, 5, 6],
            block_data: vec![1, 2, 3],
            block_light: vec![4, 5, 6],
            sky_light: vec![7, 8, 9],
        };
        assert_eq!(round_trip(&chunk), chunk);
    }

    #[test]
    fn chunk_data_size_mismatch_rejected() {
        let chunk = ChunkData {
            size: ChunkDataSize { x: 0, y: 1, z: 2 },
            blocks: vec![1, 2, 3], // should be 6
            block_data: vec![1, 2, 3],
            block_light: vec![4, 5, 6],
            sky_light: vec![7, 8, 9],
        };
        let mut buf = Vec::new();
        assert!(matches!(
            chunk.write(&mut buf),
            Err(ProtoError::BadChunkDataSize)
        ));
    }

    #[test]
    fn chunk_data_trailing_bytes_rejected() {
        // Hand-build a frame whose zlib stream holds one byte too many.
        let size = ChunkDataSize { x: 0, y: 0, z: 0 };
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        // 1 cell => 1 block byte + 0 nibble bytes expected; write 2.
        encoder.write_all(&[1, 2]).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut buf = Vec::new();
        size.x.write(&mut buf).unwrap();
        size.y.write(&mut buf).unwrap();
        size.z.write(&mut buf).unwrap();
        (compressed.len() as u32).write(&mut buf).unwrap();
        buf.extend_from_slice(&compressed);

        assert!(matches!(
            ChunkData::read(&mut buf.as_slice()),
            Err(ProtoError::BadPacketData)
        ));
    }

    #[test]
    fn multi_block_coord_packing() {
        let coord = MultiBlockChanges::pack_coord(15, 127, 3);
        assert_eq!(MultiBlockChanges::unpack_coord(coord), (15, 127, 3));
        assert_eq!(MultiBlockChanges::pack_coord(0, 0, 0), 0);
    }

    #[test]
    fn multi_block_changes_round_trip() {
        let changes = MultiBlockChanges {
            coords: vec![5, 7, 9],
            type_ids: vec![1, 2, 3],
            block_data: vec![4, 5, 6],
        };
        let mut buf = Vec::new();
        changes.write(&mut buf).unwrap();
        assert_eq!(
            buf,
            [0x00, 0x03, 0x00, 0x05, 0x00, 0x07, 0x00, 0x09, 1, 2, 3, 4, 5, 6]
        );
        assert_eq!(round_trip(&changes), changes);
    }

    #[test]
    fn multi_block_changes_mismatch_rejected() {
        let changes = MultiBlockChanges {
            coords: vec![5, 7],
            type_ids: vec![1],
            block_data: vec![4, 5],
        };
        let mut buf = Vec::new();
        assert!(matches!(
            changes.write(&mut buf),
            Err(ProtoError::MismatchingValues)
        ));
    }

    #[test]
    fn blocks_dxyz_round_trips() {
        let blocks = BlocksDxyz(vec![1, 2, 3, -4, -5, -6]);
        let mut buf = Vec::new();
        blocks.write(&mut buf).unwrap();
        assert_eq!(&buf[..4], [0, 0, 0, 2]);
        assert_eq!(round_trip(&blocks), blocks);
    }

    #[test]
    fn fireball_data_gated_on_thrower() {
        let none = FireballData::default();
        let mut buf = Vec::new();
        none.write(&mut buf).unwrap();
        assert_eq!(buf.len(), 4);
        assert_eq!(round_trip(&none), none);

        let thrown = FireballData {
            thrower_id: EntityId(9),
            x: 1,
            y: 2,
            z: 3,
        };
        let mut buf = Vec::new();
        thrown.write(&mut buf).unwrap();
        assert_eq!(buf.len(), 10);
        assert_eq!(round_trip(&thrown), thrown);
    }

    #[test]
    fn metadata_table_round_trips() {
        let table = EntityMetadataTable(vec![
            EntityMetadata {
                index: 0,
                value: MetadataValue::Byte(5),
            },
            EntityMetadata {
                index: 4,
                value: MetadataValue::String("name".into()),
            },
            EntityMetadata {
                index: 6,
                value: MetadataValue::Position(1, 2, 3),
            },
        ]);
        assert_eq!(round_trip(&table), table);
    }

    #[test]
    fn metadata_wire_form() {
        let table = EntityMetadataTable(vec![EntityMetadata {
            index: 0,
            value: MetadataValue::Byte(5),
        }]);
        let mut buf = Vec::new();
        table.write(&mut buf).unwrap();
        assert_eq!(buf, [0x00, 0x05, 0x7f]);
    }
}
