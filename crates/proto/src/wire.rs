//! Primitive wire fields.
//!
//! Every packet field type implements [`WireField`]; the `packets!`
//! declarations compose these into whole-packet readers and writers. All
//! multi-byte values are big-endian. Strings travel as UCS-2: an i16
//! code-point count followed by one 2-byte unit per code point. In memory
//! strings are UTF-8; code points outside the BMP are lossily written as
//! U+FFFD.

use crate::error::{ProtoError, Result};
use shardcraft_core::{
    AbsIntXyz, AbsXyz, AngleBytes, BlockId, BlockXyz, ChunkXz, DigStatus, DimensionId, EntityId,
    Face, GameDifficulty, InvTypeId, ItemCount, ItemData, ItemTypeId, LookBytes, LookDegrees,
    MobType, ObjTypeId, PrgBarId, PrgBarValue, SlotId, TxId, Velocity, WindowId,
};
use std::io::{Read, Write};

/// Longest string the wire format can carry, in code points.
pub const MAX_STRING_CODE_POINTS: usize = 32767;

const UCS2_REPLACEMENT: u16 = 0xfffd;

/// A value with a fixed wire representation.
pub trait WireField: Sized {
    /// Read one value.
    fn read(reader: &mut impl Read) -> Result<Self>;
    /// Write one value.
    fn write(&self, writer: &mut impl Write) -> Result<()>;
}

macro_rules! int_field {
    ($($ty:ty),*) => {
        $(
            impl WireField for $ty {
                fn read(reader: &mut impl Read) -> Result<Self> {
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    reader.read_exact(&mut buf)?;
                    Ok(<$ty>::from_be_bytes(buf))
                }

                fn write(&self, writer: &mut impl Write) -> Result<()> {
                    writer.write_all(&self.to_be_bytes())?;
                    Ok(())
                }
            }
        )*
    };
}

int_field!(i8, i16, i32, i64, u8, u16, u32);

impl WireField for f32 {
    fn read(reader: &mut impl Read) -> Result<Self> {
        Ok(f32::from_bits(u32::read(reader)?))
    }

    fn write(&self, writer: &mut impl Write) -> Result<()> {
        self.to_bits().write(writer)
    }
}

impl WireField for f64 {
    fn read(reader: &mut impl Read) -> Result<Self> {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        Ok(f64::from_bits(u64::from_be_bytes(buf)))
    }

    fn write(&self, writer: &mut impl Write) -> Result<()> {
        writer.write_all(&self.to_bits().to_be_bytes())?;
        Ok(())
    }
}

impl WireField for bool {
    fn read(reader: &mut impl Read) -> Result<Self> {
        Ok(u8::read(reader)? != 0)
    }

    fn write(&self, writer: &mut impl Write) -> Result<()> {
        (*self as u8).write(writer)
    }
}

impl WireField for String {
    fn read(reader: &mut impl Read) -> Result<Self> {
        read_string16(reader)
    }

    fn write(&self, writer: &mut impl Write) -> Result<()> {
        write_string16(writer, self)
    }
}

/// Read a UCS-2 length-prefixed string.
pub fn read_string16(reader: &mut impl Read) -> Result<String> {
    let len = i16::read(reader)?;
    if len < 0 {
        return Err(ProtoError::LengthNegative);
    }

    let mut out = String::with_capacity(len as usize);
    for _ in 0..len {
        let unit = u16::read(reader)?;
        // Unpaired surrogate units have no scalar value; substitute.
        let cp = char::from_u32(unit as u32).unwrap_or('\u{fffd}');
        out.push(cp);
    }
    Ok(out)
}

/// Write a UCS-2 length-prefixed string. Code points outside the BMP are
/// written as U+FFFD; strings longer than the wire limit are refused.
pub fn write_string16(writer: &mut impl Write, s: &str) -> Result<()> {
    let count = s.chars().count();
    if count > MAX_STRING_CODE_POINTS {
        return Err(ProtoError::StringTooLong);
    }

    (count as i16).write(writer)?;
    for cp in s.chars() {
        let unit = if (cp as u32) > 0xffff {
            UCS2_REPLACEMENT
        } else {
            cp as u32 as u16
        };
        unit.write(writer)?;
    }
    Ok(())
}

macro_rules! newtype_field {
    ($($ty:ty => $repr:ty),* $(,)?) => {
        $(
            impl WireField for $ty {
                fn read(reader: &mut impl Read) -> Result<Self> {
                    Ok(Self(<$repr as WireField>::read(reader)?))
                }

                fn write(&self, writer: &mut impl Write) -> Result<()> {
                    self.0.write(writer)
                }
            }
        )*
    };
}

newtype_field!(
    EntityId => i32,
    BlockId => u8,
    ItemTypeId => i16,
    ItemData => i16,
    ItemCount => i8,
    WindowId => i8,
    SlotId => i16,
    TxId => i16,
    PrgBarId => i16,
    PrgBarValue => i16,
    InvTypeId => i8,
    DimensionId => i8,
    GameDifficulty => i8,
    MobType => u8,
    ObjTypeId => i8,
    Face => i8,
    DigStatus => u8,
    AngleBytes => u8,
);

impl WireField for LookBytes {
    fn read(reader: &mut impl Read) -> Result<Self> {
        Ok(Self {
            yaw: AngleBytes::read(reader)?,
            pitch: AngleBytes::read(reader)?,
        })
    }

    fn write(&self, writer: &mut impl Write) -> Result<()> {
        self.yaw.write(writer)?;
        self.pitch.write(writer)
    }
}

impl WireField for LookDegrees {
    fn read(reader: &mut impl Read) -> Result<Self> {
        Ok(Self {
            yaw: shardcraft_core::AngleDegrees(f32::read(reader)?),
            pitch: shardcraft_core::AngleDegrees(f32::read(reader)?),
        })
    }

    fn write(&self, writer: &mut impl Write) -> Result<()> {
        self.yaw.0.write(writer)?;
        self.pitch.0.write(writer)
    }
}

impl WireField for shardcraft_core::OrientationBytes {
    fn read(reader: &mut impl Read) -> Result<Self> {
        Ok(Self {
            yaw: AngleBytes::read(reader)?,
            pitch: AngleBytes::read(reader)?,
            roll: AngleBytes::read(reader)?,
        })
    }

    fn write(&self, writer: &mut impl Write) -> Result<()> {
        self.yaw.write(writer)?;
        self.pitch.write(writer)?;
        self.roll.write(writer)
    }
}

impl WireField for Velocity {
    fn read(reader: &mut impl Read) -> Result<Self> {
        Ok(Self {
            x: i16::read(reader)?,
            y: i16::read(reader)?,
            z: i16::read(reader)?,
        })
    }

    fn write(&self, writer: &mut impl Write) -> Result<()> {
        self.x.write(writer)?;
        self.y.write(writer)?;
        self.z.write(writer)
    }
}

impl WireField for AbsXyz {
    fn read(reader: &mut impl Read) -> Result<Self> {
        Ok(Self {
            x: f64::read(reader)?,
            y: f64::read(reader)?,
            z: f64::read(reader)?,
        })
    }

    fn write(&self, writer: &mut impl Write) -> Result<()> {
        self.x.write(writer)?;
        self.y.write(writer)?;
        self.z.write(writer)
    }
}

impl WireField for AbsIntXyz {
    fn read(reader: &mut impl Read) -> Result<Self> {
        Ok(Self {
            x: i32::read(reader)?,
            y: i32::read(reader)?,
            z: i32::read(reader)?,
        })
    }

    fn write(&self, writer: &mut impl Write) -> Result<()> {
        self.x.write(writer)?;
        self.y.write(writer)?;
        self.z.write(writer)
    }
}

impl WireField for BlockXyz {
    fn read(reader: &mut impl Read) -> Result<Self> {
        Ok(Self {
            x: i32::read(reader)?,
            y: i8::read(reader)?,
            z: i32::read(reader)?,
        })
    }

    fn write(&self, writer: &mut impl Write) -> Result<()> {
        self.x.write(writer)?;
        self.y.write(writer)?;
        self.z.write(writer)
    }
}

impl WireField for ChunkXz {
    fn read(reader: &mut impl Read) -> Result<Self> {
        Ok(Self {
            x: i32::read(reader)?,
            z: i32::read(reader)?,
        })
    }

    fn write(&self, writer: &mut impl Write) -> Result<()> {
        self.x.write(writer)?;
        self.z.write(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip_string(s: &str) -> String {
        let mut buf = Vec::new();
        write_string16(&mut buf, s).unwrap();
        read_string16(&mut buf.as_slice()).unwrap()
    }

    #[test]
    fn string16_ascii() {
        let mut buf = Vec::new();
        write_string16(&mut buf, "username").unwrap();
        assert_eq!(
            buf,
            [
                0x00, 0x08, 0x00, b'u', 0x00, b's', 0x00, b'e', 0x00, b'r', 0x00, b'n', 0x00,
                b'a', 0x00, b'm', 0x00, b'e'
            ]
        );
        assert_eq!(round_trip_string("username"), "username");
    }

    #[test]
    fn string16_bmp_round_trips() {
        assert_eq!(round_trip_string("üßərnáme"), "üßərnáme");
    }

    #[test]
    fn string16_astral_is_lossy() {
        // U+1F600 is outside the BMP; it degrades to the replacement char.
        assert_eq!(round_trip_string("a\u{1F600}b"), "a\u{fffd}b");
    }

    #[test]
    fn string16_negative_length() {
        let buf = [0xff, 0xff];
        assert!(matches!(
            read_string16(&mut buf.as_slice()),
            Err(ProtoError::LengthNegative)
        ));
    }

    #[test]
    fn string16_too_long() {
        let s = "x".repeat(MAX_STRING_CODE_POINTS + 1);
        let mut buf = Vec::new();
        assert!(matches!(
            write_string16(&mut buf, &s),
            Err(ProtoError::StringTooLong)
        ));
    }

    #[test]
    fn primitive_round_trips() {
        let mut buf = Vec::new();
        0x1234i16.write(&mut buf).unwrap();
        (-2i32).write(&mut buf).unwrap();
        1.5f64.write(&mut buf).unwrap();
        true.write(&mut buf).unwrap();

        let mut r = buf.as_slice();
        assert_eq!(i16::read(&mut r).unwrap(), 0x1234);
        assert_eq!(i32::read(&mut r).unwrap(), -2);
        assert_eq!(f64::read(&mut r).unwrap(), 1.5);
        assert!(bool::read(&mut r).unwrap());
        assert!(r.is_empty());
    }

    #[test]
    fn short_read_is_io_error() {
        let buf = [0x00u8];
        assert!(matches!(
            i32::read(&mut buf.as_slice()),
            Err(ProtoError::Io(_))
        ));
    }
}
