//! The codec error taxonomy.

use std::io;
use thiserror::Error;

/// Errors produced while encoding or decoding packets.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// The type-id byte is outside the packet catalog.
    #[error("unknown packet id 0x{0:02x}")]
    UnknownPacketId(u8),
    /// The packet id is in the catalog but not permitted from this peer, or
    /// not among the ids a caller said it expected.
    #[error("unexpected packet id 0x{0:02x}")]
    UnexpectedPacketId(u8),
    /// A length prefix decoded to a negative value.
    #[error("length was negative")]
    LengthNegative,
    /// A string exceeded the 32767 code-point wire limit.
    #[error("string too long for the wire")]
    StringTooLong,
    /// Packet data was well-formed but contained out-of-range values (e.g.
    /// trailing bytes inside a compressed chunk payload).
    #[error("bad packet data")]
    BadPacketData,
    /// Chunk data array lengths disagree with the declared size.
    #[error("chunk data length mismatches declared size")]
    BadChunkDataSize,
    /// Parallel arrays in a packet had differing lengths.
    #[error("packet data contains mismatching values")]
    MismatchingValues,
    /// Programmer error in packetization.
    #[error("internal packetization error")]
    Internal,
    /// Underlying reader/writer failure (including short reads).
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<shardcraft_nbt::NbtError> for ProtoError {
    fn from(err: shardcraft_nbt::NbtError) -> Self {
        match err {
            shardcraft_nbt::NbtError::Io(err) => ProtoError::Io(err),
            _ => ProtoError::BadPacketData,
        }
    }
}

/// Codec result alias.
pub type Result<T> = std::result::Result<T, ProtoError>;
