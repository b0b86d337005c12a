#![warn(missing_docs)]
//! The tagged binary tree format ("NBT") used for on-disk world and player
//! state, and for the compressed compounds embedded in item slots on the
//! wire.
//!
//! Values are big-endian. Every named tag is serialized as a one-byte tag
//! id, a length-prefixed UTF-8 name, then the payload; compounds are
//! terminated by an end tag. The top-level value of any stream is a single
//! named compound.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use thiserror::Error;

const TAG_END: u8 = 0;
const TAG_BYTE: u8 = 1;
const TAG_SHORT: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_LONG: u8 = 4;
const TAG_FLOAT: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_BYTE_ARRAY: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_LIST: u8 = 9;
const TAG_COMPOUND: u8 = 10;

/// Errors produced while reading or writing tag streams.
#[derive(Debug, Error)]
pub enum NbtError {
    /// The stream contained a tag id outside the known set.
    #[error("unknown tag id {0}")]
    UnknownTagId(u8),
    /// The top-level tag was not a compound.
    #[error("root tag is not a compound")]
    RootNotCompound,
    /// A list declared one element type but held another.
    #[error("list element type mismatch")]
    ListTypeMismatch,
    /// A name or string payload was not valid UTF-8.
    #[error("string payload is not valid UTF-8")]
    BadString,
    /// Underlying reader/writer failure (including truncation).
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One tag value.
#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    /// Signed byte.
    Byte(i8),
    /// Signed 16-bit integer.
    Short(i16),
    /// Signed 32-bit integer.
    Int(i32),
    /// Signed 64-bit integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// Raw byte array.
    ByteArray(Vec<u8>),
    /// UTF-8 string.
    String(String),
    /// Homogeneous list; the element tag id is implied by the contents
    /// (empty lists serialize with element type end).
    List(Vec<Tag>),
    /// Named subtree.
    Compound(Compound),
}

impl Tag {
    fn type_id(&self) -> u8 {
        match self {
            Tag::Byte(_) => TAG_BYTE,
            Tag::Short(_) => TAG_SHORT,
            Tag::Int(_) => TAG_INT,
            Tag::Long(_) => TAG_LONG,
            Tag::Float(_) => TAG_FLOAT,
            Tag::Double(_) => TAG_DOUBLE,
            Tag::ByteArray(_) => TAG_BYTE_ARRAY,
            Tag::String(_) => TAG_STRING,
            Tag::List(_) => TAG_LIST,
            Tag::Compound(_) => TAG_COMPOUND,
        }
    }
}

/// A map of named tags. BTreeMap keeps serialization deterministic.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Compound(pub BTreeMap<String, Tag>);

impl Compound {
    /// An empty compound.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a named tag.
    pub fn set(&mut self, name: &str, tag: Tag) {
        self.0.insert(name.to_string(), tag);
    }

    /// Look up a tag by name.
    pub fn get(&self, name: &str) -> Option<&Tag> {
        self.0.get(name)
    }

    /// Look up a path of nested compounds separated by `/`.
    pub fn lookup(&self, path: &str) -> Option<&Tag> {
        let mut current = self;
        let mut parts = path.split('/').peekable();
        while let Some(part) = parts.next() {
            let tag = current.0.get(part)?;
            if parts.peek().is_none() {
                return Some(tag);
            }
            match tag {
                Tag::Compound(inner) => current = inner,
                _ => return None,
            }
        }
        None
    }

    /// True when no tags are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Typed accessor for a byte tag.
    pub fn get_byte(&self, name: &str) -> Option<i8> {
        match self.get(name) {
            Some(Tag::Byte(v)) => Some(*v),
            _ => None,
        }
    }

    /// Typed accessor for a short tag.
    pub fn get_short(&self, name: &str) -> Option<i16> {
        match self.get(name) {
            Some(Tag::Short(v)) => Some(*v),
            _ => None,
        }
    }

    /// Typed accessor for an int tag.
    pub fn get_int(&self, name: &str) -> Option<i32> {
        match self.get(name) {
            Some(Tag::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Typed accessor for a long tag.
    pub fn get_long(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(Tag::Long(v)) => Some(*v),
            _ => None,
        }
    }

    /// Typed accessor for a float tag.
    pub fn get_float(&self, name: &str) -> Option<f32> {
        match self.get(name) {
            Some(Tag::Float(v)) => Some(*v),
            _ => None,
        }
    }

    /// Typed accessor for a string tag.
    pub fn get_string(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(Tag::String(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Typed accessor for a byte-array tag.
    pub fn get_byte_array(&self, name: &str) -> Option<&[u8]> {
        match self.get(name) {
            Some(Tag::ByteArray(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Typed accessor for a nested compound.
    pub fn get_compound(&self, name: &str) -> Option<&Compound> {
        match self.get(name) {
            Some(Tag::Compound(v)) => Some(v),
            _ => None,
        }
    }

    /// A list of doubles as a fixed-size array, used for positions and
    /// motion vectors.
    pub fn get_double_list<const N: usize>(&self, name: &str) -> Option<[f64; N]> {
        match self.get(name) {
            Some(Tag::List(items)) if items.len() == N => {
                let mut out = [0.0; N];
                for (slot, item) in out.iter_mut().zip(items) {
                    match item {
                        Tag::Double(v) => *slot = *v,
                        _ => return None,
                    }
                }
                Some(out)
            }
            _ => None,
        }
    }

    /// A list of floats as a fixed-size array.
    pub fn get_float_list<const N: usize>(&self, name: &str) -> Option<[f32; N]> {
        match self.get(name) {
            Some(Tag::List(items)) if items.len() == N => {
                let mut out = [0.0; N];
                for (slot, item) in out.iter_mut().zip(items) {
                    match item {
                        Tag::Float(v) => *slot = *v,
                        _ => return None,
                    }
                }
                Some(out)
            }
            _ => None,
        }
    }
}

/// Read a named root compound from `reader`.
pub fn read_compound(reader: &mut impl Read) -> Result<Compound, NbtError> {
    let type_id = read_u8(reader)?;
    if type_id != TAG_COMPOUND {
        return Err(NbtError::RootNotCompound);
    }
    let _name = read_string(reader)?;
    match read_payload(reader, TAG_COMPOUND)? {
        Tag::Compound(compound) => Ok(compound),
        _ => unreachable!("payload of compound tag"),
    }
}

/// Write `compound` as the (unnamed) root of the stream.
pub fn write_compound(writer: &mut impl Write, compound: &Compound) -> Result<(), NbtError> {
    writer.write_all(&[TAG_COMPOUND])?;
    write_string(writer, "")?;
    write_payload(writer, &Tag::Compound(compound.clone()))
}

/// Read a gzip-compressed root compound.
pub fn read_gzip(reader: impl Read) -> Result<Compound, NbtError> {
    let mut decoder = GzDecoder::new(reader);
    read_compound(&mut decoder)
}

/// Write a gzip-compressed root compound.
pub fn write_gzip(writer: impl Write, compound: &Compound) -> Result<(), NbtError> {
    let mut encoder = GzEncoder::new(writer, Compression::default());
    write_compound(&mut encoder, compound)?;
    encoder.finish()?;
    Ok(())
}

fn read_payload(reader: &mut impl Read, type_id: u8) -> Result<Tag, NbtError> {
    Ok(match type_id {
        TAG_BYTE => Tag::Byte(read_u8(reader)? as i8),
        TAG_SHORT => Tag::Short(read_i16(reader)?),
        TAG_INT => Tag::Int(read_i32(reader)?),
        TAG_LONG => Tag::Long(read_i64(reader)?),
        TAG_FLOAT => Tag::Float(f32::from_bits(read_i32(reader)? as u32)),
        TAG_DOUBLE => Tag::Double(f64::from_bits(read_i64(reader)? as u64)),
        TAG_BYTE_ARRAY => {
            let len = read_i32(reader)?;
            if len < 0 {
                return Err(NbtError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "negative byte array length",
                )));
            }
            let mut buf = vec![0u8; len as usize];
            reader.read_exact(&mut buf)?;
            Tag::ByteArray(buf)
        }
        TAG_STRING => Tag::String(read_string(reader)?),
        TAG_LIST => {
            let elem_type = read_u8(reader)?;
            let len = read_i32(reader)?;
            if len < 0 {
                return Err(NbtError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "negative list length",
                )));
            }
            let mut items = Vec::with_capacity(len.min(1024) as usize);
            for _ in 0..len {
                items.push(read_payload(reader, elem_type)?);
            }
            Tag::List(items)
        }
        TAG_COMPOUND => {
            let mut compound = Compound::new();
            loop {
                let child_type = read_u8(reader)?;
                if child_type == TAG_END {
                    break;
                }
                let name = read_string(reader)?;
                let value = read_payload(reader, child_type)?;
                compound.0.insert(name, value);
            }
            Tag::Compound(compound)
        }
        other => return Err(NbtError::UnknownTagId(other)),
    })
}

fn write_payload(writer: &mut impl Write, tag: &Tag) -> Result<(), NbtError> {
    match tag {
        Tag::Byte(v) => writer.write_all(&[*v as u8])?,
        Tag::Short(v) => writer.write_all(&v.to_be_bytes())?,
        Tag::Int(v) => writer.write_all(&v.to_be_bytes())?,
        Tag::Long(v) => writer.write_all(&v.to_be_bytes())?,
        Tag::Float(v) => writer.write_all(&v.to_bits().to_be_bytes())?,
        Tag::Double(v) => writer.write_all(&v.to_bits().to_be_bytes())?,
        Tag::ByteArray(v) => {
            writer.write_all(&(v.len() as i32).to_be_bytes())?;
            writer.write_all(v)?;
        }
        Tag::String(v) => write_string(writer, v)?,
        Tag::List(items) => {
            let elem_type = items.first().map(Tag::type_id).unwrap_or(TAG_END);
            if items.iter().any(|item| item.type_id() != elem_type) {
                return Err(NbtError::ListTypeMismatch);
            }
            writer.write_all(&[elem_type])?;
            writer.write_all(&(items.len() as i32).to_be_bytes())?;
            for item in items {
                write_payload(writer, item)?;
            }
        }
        Tag::Compound(compound) => {
            for (name, value) in &compound.0 {
                writer.write_all(&[value.type_id()])?;
                write_string(writer, name)?;
                write_payload(writer, value)?;
            }
            writer.write_all(&[TAG_END])?;
        }
    }
    Ok(())
}

fn read_u8(reader: &mut impl Read) -> Result<u8, NbtError> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_i16(reader: &mut impl Read) -> Result<i16, NbtError> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(i16::from_be_bytes(buf))
}

fn read_i32(reader: &mut impl Read) -> Result<i32, NbtError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

fn read_i64(reader: &mut impl Read) -> Result<i64, NbtError> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_be_bytes(buf))
}

fn read_string(reader: &mut impl Read) -> Result<String, NbtError> {
    let len = read_i16(reader)?;
    if len < 0 {
        return Err(NbtError::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            "negative string length",
        )));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| NbtError::BadString)
}

fn write_string(writer: &mut impl Write, s: &str) -> Result<(), NbtError> {
    writer.write_all(&(s.len() as i16).to_be_bytes())?;
    writer.write_all(s.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Compound {
        let mut inner = Compound::new();
        inner.set("id", Tag::Short(276));
        inner.set("Count", Tag::Byte(1));
        inner.set("Damage", Tag::Short(0));

        let mut root = Compound::new();
        root.set("Health", Tag::Short(20));
        root.set("OnGround", Tag::Byte(1));
        root.set("FallDistance", Tag::Float(0.0));
        root.set(
            "Pos",
            Tag::List(vec![Tag::Double(0.5), Tag::Double(75.0), Tag::Double(0.5)]),
        );
        root.set("Item", Tag::Compound(inner));
        root.set("Name", Tag::String("alice".to_string()));
        root.set("Raw", Tag::ByteArray(vec![1, 2, 3]));
        root
    }

    #[test]
    fn round_trip() {
        let compound = sample();
        let mut buf = Vec::new();
        write_compound(&mut buf, &compound).unwrap();
        let restored = read_compound(&mut buf.as_slice()).unwrap();
        assert_eq!(restored, compound);
    }

    #[test]
    fn gzip_round_trip() {
        let compound = sample();
        let mut buf = Vec::new();
        write_gzip(&mut buf, &compound).unwrap();
        let restored = read_gzip(buf.as_slice()).unwrap();
        assert_eq!(restored, compound);
    }

    #[test]
    fn typed_accessors() {
        let compound = sample();
        assert_eq!(compound.get_short("Health"), Some(20));
        assert_eq!(compound.get_byte("OnGround"), Some(1));
        assert_eq!(compound.get_string("Name"), Some("alice"));
        assert_eq!(compound.get_byte_array("Raw"), Some(&[1u8, 2, 3][..]));
        assert_eq!(
            compound.get_double_list::<3>("Pos"),
            Some([0.5, 75.0, 0.5])
        );
        assert_eq!(compound.get_double_list::<2>("Pos"), None);
        assert_eq!(compound.get_short("Missing"), None);
        // Wrong type yields None, not a panic.
        assert_eq!(compound.get_int("Health"), None);
    }

    #[test]
    fn lookup_nested_path() {
        let compound = sample();
        assert_eq!(compound.lookup("Item/id"), Some(&Tag::Short(276)));
        assert_eq!(compound.lookup("Item/Missing"), None);
        assert_eq!(compound.lookup("Health/id"), None);
    }

    #[test]
    fn root_must_be_compound() {
        // A stream starting with a short tag id.
        let bytes = [TAG_SHORT, 0, 0, 0, 5];
        assert!(matches!(
            read_compound(&mut bytes.as_slice()),
            Err(NbtError::RootNotCompound)
        ));
    }

    #[test]
    fn truncated_stream_is_io_error() {
        let compound = sample();
        let mut buf = Vec::new();
        write_compound(&mut buf, &compound).unwrap();
        buf.truncate(buf.len() / 2);
        assert!(matches!(
            read_compound(&mut buf.as_slice()),
            Err(NbtError::Io(_))
        ));
    }

    #[test]
    fn heterogeneous_list_rejected_on_write() {
        let mut root = Compound::new();
        root.set("Bad", Tag::List(vec![Tag::Byte(1), Tag::Short(2)]));
        let mut buf = Vec::new();
        assert!(matches!(
            write_compound(&mut buf, &root),
            Err(NbtError::ListTypeMismatch)
        ));
    }

    #[test]
    fn empty_list_round_trips() {
        let mut root = Compound::new();
        root.set("Empty", Tag::List(Vec::new()));
        let mut buf = Vec::new();
        write_compound(&mut buf, &root).unwrap();
        let restored = read_compound(&mut buf.as_slice()).unwrap();
        assert_eq!(restored, root);
    }
}
