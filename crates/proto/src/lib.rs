#![warn(missing_docs)]
//! Bidirectional binary packet codec for the frozen wire revision.
//!
//! The catalog of packet types, their single-byte ids and their permitted
//! directions live in [`packets`]; composite field marshalers in
//! [`fields`]; the primitive big-endian readers and writers in [`wire`].
//! The codec is symmetric: for every packet `p`,
//! `decode(encode(p)) == p`, and decoding validates both the id and the
//! direction it arrived from.

pub mod error;
pub mod fields;
pub mod packets;
pub mod wire;

pub use error::{ProtoError, Result};
pub use fields::{
    requires_nbt, BlocksDxyz, ChunkData, ChunkDataSize, ChunkLoadMode, EntityMetadata,
    EntityMetadataTable, FireballData, ItemSlot, ItemSlotVec, MapData, MetadataValue,
    MultiBlockChanges, PluginData, RelMove,
};
pub use packets::{read_packet, read_packet_expect, serialize_packets, Direction, Packet};
pub use wire::{read_string16, write_string16, WireField, MAX_STRING_CODE_POINTS};

/// The single wire protocol revision this server speaks.
pub const PROTOCOL_VERSION: i32 = 23;
