//! Schema-packed encoder
//!
//! Bus payloads keep the flight software's in-memory layout: little-endian
//! fields at C alignment, with padding. Ground tools that do not share that
//! layout get a packed rendition instead:
//!
//! ```text
//! native:  | hdr (BE) | u16 LE | pad | u32 LE | f64 LE | char[10] | pad |
//! packed:  | hdr (BE) | u16 BE | u32 BE | f64 BE | char[10] |
//! ```
//!
//! Headers are copied as they are (already big-endian) and the length field is
//! rewritten for the packed size. Each message id needs a [`Schema`] in the
//! [`TypeDatabase`]; the gateway's own telemetry is built in, anything else is
//! declared in the `[encoder]` config section.

use super::{checked_size, EncodeError, Encoder};
use crate::constants::{DATA_TYPES_MID, DEFAULT_MAX_PACKET_SIZE, HK_TLM_MID};
use crate::message::{Message, MsgId, PRIMARY_HEADER_LEN};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Field types
// =============================================================================

/// One field of a payload schema
///
/// Written in config as `"u8"`, `"i16"`, `"f64"`, `"char[10]"`, `"pad[4]"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
    /// Fixed-length byte string, copied verbatim
    Chars(usize),
    /// Alignment gap, dropped from the packed output
    Pad(usize),
}

impl FieldType {
    /// Bytes the field occupies in the native layout
    pub fn native_size(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::F64 => 8,
            Self::Chars(n) | Self::Pad(n) => n,
        }
    }

    /// Bytes the field occupies once packed
    pub fn packed_size(self) -> usize {
        match self {
            Self::Pad(_) => 0,
            other => other.native_size(),
        }
    }

    /// Append the packed form of one native field
    fn pack(self, native: &[u8], out: &mut BytesMut) {
        match self {
            Self::Pad(_) => {}
            Self::U8 | Self::I8 | Self::Chars(_) => out.put_slice(native),
            // Multi-byte numbers: LE -> BE is a byte reversal for every width
            Self::U16 | Self::I16 | Self::U32 | Self::I32 | Self::F32 | Self::F64 => {
                out.extend(native.iter().rev());
            }
        }
    }
}

fn parse_array(s: &str, prefix: &str) -> Option<usize> {
    s.strip_prefix(prefix)?
        .strip_prefix('[')?
        .strip_suffix(']')?
        .trim()
        .parse()
        .ok()
        .filter(|&n| n > 0)
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let field = match s {
            "u8" | "bool" => Self::U8,
            "i8" => Self::I8,
            "u16" => Self::U16,
            "i16" => Self::I16,
            "u32" => Self::U32,
            "i32" => Self::I32,
            "f32" => Self::F32,
            "f64" => Self::F64,
            _ => {
                if let Some(n) = parse_array(s, "char") {
                    Self::Chars(n)
                } else if let Some(n) = parse_array(s, "pad") {
                    Self::Pad(n)
                } else {
                    return Err(format!("unknown field type '{}'", s));
                }
            }
        };
        Ok(field)
    }
}

impl TryFrom<String> for FieldType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8 => write!(f, "u8"),
            Self::I8 => write!(f, "i8"),
            Self::U16 => write!(f, "u16"),
            Self::I16 => write!(f, "i16"),
            Self::U32 => write!(f, "u32"),
            Self::I32 => write!(f, "i32"),
            Self::F32 => write!(f, "f32"),
            Self::F64 => write!(f, "f64"),
            Self::Chars(n) => write!(f, "char[{}]", n),
            Self::Pad(n) => write!(f, "pad[{}]", n),
        }
    }
}

impl From<FieldType> for String {
    fn from(field: FieldType) -> Self {
        field.to_string()
    }
}

// =============================================================================
// Schemas
// =============================================================================

/// Payload layout of one message id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub msg_id: MsgId,
    #[serde(default)]
    pub name: String,
    pub fields: Vec<FieldType>,
}

impl Schema {
    pub fn native_size(&self) -> usize {
        self.fields.iter().map(|f| f.native_size()).sum()
    }

    pub fn packed_size(&self) -> usize {
        self.fields.iter().map(|f| f.packed_size()).sum()
    }

    /// Housekeeping telemetry
    pub fn housekeeping() -> Self {
        use FieldType::*;
        Self {
            msg_id: HK_TLM_MID,
            name: "housekeeping".into(),
            fields: vec![U8, U8, Pad(2)],
        }
    }

    /// Diagnostic data-types sample
    pub fn data_types() -> Self {
        use FieldType::*;
        Self {
            msg_id: DATA_TYPES_MID,
            name: "data_types".into(),
            fields: vec![
                U16,
                U8,
                U8,
                I8,
                I8,
                I8,
                I8,
                I16,
                I16,
                I32,
                I32,
                F32,
                F32,
                Pad(4),
                F64,
                F64,
                Chars(10),
                Pad(6),
            ],
        }
    }
}

/// Schemas keyed by message id
#[derive(Debug, Clone, Default)]
pub struct TypeDatabase {
    schemas: HashMap<MsgId, Schema>,
}

impl TypeDatabase {
    /// Empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Database holding the gateway's own telemetry schemas
    pub fn builtin() -> Self {
        let mut db = Self::new();
        db.insert(Schema::housekeeping());
        db.insert(Schema::data_types());
        db
    }

    /// Built-in schemas plus `extra`; an extra schema replaces a built-in one
    pub fn with_schemas(extra: impl IntoIterator<Item = Schema>) -> Self {
        let mut db = Self::builtin();
        for schema in extra {
            db.insert(schema);
        }
        db
    }

    pub fn insert(&mut self, schema: Schema) -> Option<Schema> {
        self.schemas.insert(schema.msg_id, schema)
    }

    pub fn get(&self, msg_id: MsgId) -> Option<&Schema> {
        self.schemas.get(&msg_id)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

// =============================================================================
// Encoder
// =============================================================================

/// Encoder producing packed big-endian packets
pub struct PackedEncoder {
    types: TypeDatabase,
    max_packet_size: usize,
    buf: BytesMut,
}

impl PackedEncoder {
    pub fn new(types: TypeDatabase, max_packet_size: usize) -> Self {
        Self {
            types,
            max_packet_size,
            buf: BytesMut::with_capacity(max_packet_size),
        }
    }

    pub fn types(&self) -> &TypeDatabase {
        &self.types
    }
}

impl Default for PackedEncoder {
    fn default() -> Self {
        Self::new(TypeDatabase::builtin(), DEFAULT_MAX_PACKET_SIZE)
    }
}

impl Encoder for PackedEncoder {
    fn encode(&mut self, msg: &Message) -> Result<Bytes, EncodeError> {
        let msg_id = msg.msg_id();
        let declared = checked_size(msg, usize::MAX)?;
        let schema = self
            .types
            .get(msg_id)
            .ok_or(EncodeError::UnknownType { msg_id })?;

        let header_len = msg.header_len();
        let available = declared.saturating_sub(header_len);
        if available < schema.native_size() {
            return Err(EncodeError::SizeMismatch {
                msg_id,
                expected: schema.native_size(),
                actual: available,
            });
        }

        let total = header_len + schema.packed_size();
        if total <= PRIMARY_HEADER_LEN {
            return Err(EncodeError::EmptyPacket { msg_id });
        }
        if total > self.max_packet_size {
            return Err(EncodeError::TooLarge {
                size: total,
                max: self.max_packet_size,
            });
        }

        let src = msg.as_bytes();
        self.buf.clear();
        self.buf.reserve(total);
        self.buf.put_slice(&src[..PRIMARY_HEADER_LEN - 2]);
        // Length field is total - 7; total > PRIMARY_HEADER_LEN here
        self.buf.put_u16((total - PRIMARY_HEADER_LEN - 1) as u16);
        self.buf.put_slice(&src[PRIMARY_HEADER_LEN..header_len]);

        let mut offset = header_len;
        for field in &schema.fields {
            let size = field.native_size();
            field.pack(&src[offset..offset + size], &mut self.buf);
            offset += size;
        }

        Ok(self.buf.split().freeze())
    }
}

// ============================================================================
// Tests
// ============================================================================
