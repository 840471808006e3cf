//! Wire type ids and the static-type language (C4, static side).
//!
//! ## Type ids
//!
//! Every logical type on the wire has a small signed id. Ids 1-37 are the
//! shared cross-language vocabulary; ids >= 256 are implementation-internal
//! sentinels that never appear on the wire; ids >= 300 are allocated at
//! runtime for user types that were never registered explicitly. A negative
//! id denotes the pointer/boxed polarity of the same structural type; this
//! implementation has uniform reference semantics, so it writes the positive
//! polarity and ignores the sign on read.
//!
//! ## `TypeSpec`
//!
//! [`TypeSpec`] is the static type of a declared slot: a struct field, a
//! container element, a map key or value. Slots declared with a concrete
//! spec omit per-value type headers on the wire; slots declared
//! [`TypeSpec::Any`] carry one.
//!
//! Specs have a compact textual grammar shared with peer implementations:
//!
//! ```text
//! spec      := '*' spec              // pointer polarity
//!            | "[]" spec             // list
//!            | '[' digits ']' spec   // fixed array (rides the list path)
//!            | "set[" spec ']'
//!            | "map[" spec ']' spec
//!            | '@' qualified         // registered named type
//!            | base
//! qualified := [ namespace '.' ] name
//! base      := "bool" | "int8" | "int16" | "int32" | "varint32" | "int64"
//!            | "varint64" | "sliint64" | "float32" | "float64" | "string"
//!            | "binary" | "date" | "timestamp" | "duration" | "any"
//! ```
//!
//! Schema registration accepts field declarations in this grammar (see
//! [`crate::schema::StructSchema::parsed_field`]), so the parser is the
//! canonical way composite static types enter the registry.

use crate::error::{CrosswireError, Result};
use std::fmt;

/// A wire type id. Negative values denote the pointer polarity.
pub type TypeId = i32;

/// A null slot with no physical storage.
pub const NA: TypeId = 0;
/// Boolean, 1 byte.
pub const BOOL: TypeId = 1;
/// Signed 8-bit integer.
pub const INT8: TypeId = 2;
/// Signed 16-bit little-endian integer.
pub const INT16: TypeId = 3;
/// Signed 32-bit little-endian integer.
pub const INT32: TypeId = 4;
/// 32-bit signed integer, ZigZag + varint encoded.
pub const VAR_INT32: TypeId = 5;
/// Signed 64-bit little-endian integer.
pub const INT64: TypeId = 6;
/// 64-bit signed integer, ZigZag + varint encoded.
pub const VAR_INT64: TypeId = 7;
/// 64-bit signed integer in the small-long hybrid encoding.
pub const SLI_INT64: TypeId = 8;
/// 2-byte floating point. Defined for the id space; not materializable.
pub const HALF_FLOAT: TypeId = 9;
/// IEEE-754 single precision.
pub const FLOAT32: TypeId = 10;
/// IEEE-754 double precision.
pub const FLOAT64: TypeId = 11;
/// Length-prefixed string with an encoding discriminator.
pub const STRING: TypeId = 12;
/// Enum serialized as a varint ordinal, registered by id.
pub const ENUM: TypeId = 13;
/// Enum whose on-wire identity is its (namespace, name).
pub const NAMED_ENUM: TypeId = 14;
/// Final struct registered by id.
pub const STRUCT: TypeId = 15;
/// Schema-evolving struct registered by id. Recognized, not decoded.
pub const COMPATIBLE_STRUCT: TypeId = 16;
/// Final struct whose on-wire identity is its (namespace, name).
pub const NAMED_STRUCT: TypeId = 17;
/// Schema-evolving named struct. Recognized, not decoded.
pub const NAMED_COMPATIBLE_STRUCT: TypeId = 18;
/// User-codec type registered by id.
pub const EXT: TypeId = 19;
/// User-codec type whose on-wire identity is its (namespace, name).
pub const NAMED_EXT: TypeId = 20;
/// List of some logical type.
pub const LIST: TypeId = 21;
/// Unordered set of unique elements.
pub const SET: TypeId = 22;
/// Key/value map in the chunked encoding.
pub const MAP: TypeId = 23;
/// Elapsed time: int64 seconds then int32 nanos.
pub const DURATION: TypeId = 24;
/// Exact timestamp: int64 milliseconds since the UNIX epoch.
pub const TIMESTAMP: TypeId = 25;
/// Naive date: int32 days since 1970-01-01, proleptic Gregorian.
pub const LOCAL_DATE: TypeId = 26;
/// 128-bit decimal. Defined for the id space; not materializable.
pub const DECIMAL128: TypeId = 27;
/// Length-prefixed raw bytes.
pub const BINARY: TypeId = 28;
/// Multidimensional array. Defined for the id space; rides the list path.
pub const ARRAY: TypeId = 29;
/// Packed one-dimensional bool array.
pub const BOOL_ARRAY: TypeId = 30;
/// Packed one-dimensional int8 array.
pub const INT8_ARRAY: TypeId = 31;
/// Packed one-dimensional int16 array.
pub const INT16_ARRAY: TypeId = 32;
/// Packed one-dimensional int32 array.
pub const INT32_ARRAY: TypeId = 33;
/// Packed one-dimensional int64 array.
pub const INT64_ARRAY: TypeId = 34;
/// Packed half-float array. Recognized, not materializable.
pub const FLOAT16_ARRAY: TypeId = 35;
/// Packed one-dimensional float32 array.
pub const FLOAT32_ARRAY: TypeId = 36;
/// Packed one-dimensional float64 array.
pub const FLOAT64_ARRAY: TypeId = 37;

/// Registry-internal marker for tag-registered types. Never on the wire:
/// the named families above are the canonical wire representation.
pub const TYPE_TAG: TypeId = 256;

/// String payload encoding: Latin-1, one byte per char.
pub const STRING_LATIN1: u64 = 0;
/// String payload encoding: UTF-16 little-endian.
pub const STRING_UTF16LE: u64 = 1;
/// String payload encoding: UTF-8.
pub const STRING_UTF8: u64 = 2;

/// Map chunk flag: the chunk contains null keys.
pub const KEY_HAS_NULL: u8 = 0x01;
/// Map chunk flag: the chunk contains null values.
pub const VALUE_HAS_NULL: u8 = 0x02;
/// Map chunk flag: the key type was not statically declared.
pub const KEY_NOT_DECL_TYPE: u8 = 0x04;
/// Map chunk flag: the value type was not statically declared.
pub const VALUE_NOT_DECL_TYPE: u8 = 0x08;
/// Map chunk flag: keys carry per-entry reference flags.
pub const TRACKING_KEY_REF: u8 = 0x10;
/// Map chunk flag: values carry per-entry reference flags.
pub const TRACKING_VALUE_REF: u8 = 0x20;
/// Map chunk flag: one key type header precedes the entries.
pub const KEY_DECL_TYPE: u8 = 0x40;
/// Map chunk flag: one value type header precedes the entries.
pub const VALUE_DECL_TYPE: u8 = 0x80;

/// First id handed out to user types discovered during serialization
/// without an explicit registration.
pub const AUTO_TYPE_ID_BASE: TypeId = 300;

/// Whether a type id carries (namespace, name) metastrings in its header.
pub fn is_namespaced_type(type_id: TypeId) -> bool {
    matches!(
        type_id,
        NAMED_ENUM | NAMED_STRUCT | NAMED_COMPATIBLE_STRUCT | NAMED_EXT | TYPE_TAG
    )
}

/// Whether a type id is a fixed-width primitive.
pub fn is_primitive_type(type_id: TypeId) -> bool {
    matches!(
        type_id,
        BOOL | INT8 | INT16 | INT32 | INT64 | FLOAT32 | FLOAT64
    )
}

/// Whether a type id is a packed primitive array.
pub fn is_primitive_array_type(type_id: TypeId) -> bool {
    matches!(
        type_id,
        BOOL_ARRAY
            | INT8_ARRAY
            | INT16_ARRAY
            | INT32_ARRAY
            | INT64_ARRAY
            | FLOAT32_ARRAY
            | FLOAT64_ARRAY
    )
}

/// The static type of a declared slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSpec {
    /// Fully dynamic: the wire carries a type header per value.
    Any,
    /// 1-byte boolean.
    Bool,
    /// Fixed 1-byte integer.
    Int8,
    /// Fixed 2-byte integer.
    Int16,
    /// Fixed 4-byte integer.
    Int32,
    /// ZigZag varint-encoded 32-bit integer.
    VarInt32,
    /// Fixed 8-byte integer.
    Int64,
    /// ZigZag varint-encoded 64-bit integer.
    VarInt64,
    /// Small-long hybrid 64-bit integer.
    SliInt64,
    /// IEEE-754 single precision.
    Float32,
    /// IEEE-754 double precision.
    Float64,
    /// String slot.
    String,
    /// Raw bytes slot.
    Binary,
    /// Naive date slot.
    Date,
    /// Millisecond timestamp slot.
    Timestamp,
    /// Seconds + nanos duration slot.
    Duration,
    /// List with a declared element type. Primitive element types denote the
    /// corresponding packed array wire type.
    List(Box<TypeSpec>),
    /// Set with a declared element type.
    Set(Box<TypeSpec>),
    /// Map with declared key and value types.
    Map(Box<TypeSpec>, Box<TypeSpec>),
    /// A registered named type (struct, enum or ext codec).
    Named {
        /// Registered namespace; empty for the default namespace.
        namespace: String,
        /// Registered type name.
        name: String,
    },
    /// Pointer polarity of the inner spec. Encodes identically; documents
    /// that the slot is nullable and maps to a negative id on peers that
    /// distinguish polarity.
    Ptr(Box<TypeSpec>),
}

impl TypeSpec {
    /// Parses the textual grammar. The entire input must be consumed.
    pub fn parse(decl: &str) -> Result<Self> {
        let (spec, rest) = parse_spec(decl.trim())?;
        if !rest.is_empty() {
            return Err(CrosswireError::TypeMismatch(format!(
                "trailing input {rest:?} after type declaration"
            )));
        }
        Ok(spec)
    }

    /// Shorthand for a named spec.
    pub fn named(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Named {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Strips pointer polarity.
    pub fn strip_ptr(&self) -> &TypeSpec {
        match self {
            Self::Ptr(inner) => inner.strip_ptr(),
            other => other,
        }
    }

    /// Whether values in this slot are encoded raw, with no reference flag.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self.strip_ptr(),
            Self::Bool
                | Self::Int8
                | Self::Int16
                | Self::Int32
                | Self::VarInt32
                | Self::Int64
                | Self::VarInt64
                | Self::SliInt64
                | Self::Float32
                | Self::Float64
        )
    }

    /// The packed-array wire id that a `List` of this element spec denotes,
    /// if its element type is primitive.
    pub fn primitive_array_id(&self) -> Option<TypeId> {
        match self.strip_ptr() {
            Self::Bool => Some(BOOL_ARRAY),
            Self::Int8 => Some(INT8_ARRAY),
            Self::Int16 => Some(INT16_ARRAY),
            Self::Int32 => Some(INT32_ARRAY),
            Self::Int64 => Some(INT64_ARRAY),
            Self::Float32 => Some(FLOAT32_ARRAY),
            Self::Float64 => Some(FLOAT64_ARRAY),
            _ => None,
        }
    }
}

fn parse_spec(input: &str) -> Result<(TypeSpec, &str)> {
    if let Some(rest) = input.strip_prefix('*') {
        let (inner, rest) = parse_spec(rest)?;
        return Ok((TypeSpec::Ptr(Box::new(inner)), rest));
    }
    if let Some(rest) = input.strip_prefix("[]") {
        let (inner, rest) = parse_spec(rest)?;
        return Ok((TypeSpec::List(Box::new(inner)), rest));
    }
    if let Some(rest) = input.strip_prefix("map[") {
        let (key, rest) = parse_spec(rest)?;
        let rest = rest
            .strip_prefix(']')
            .ok_or_else(|| unparseable(input, "missing ']' after map key"))?;
        let (value, rest) = parse_spec(rest)?;
        return Ok((TypeSpec::Map(Box::new(key), Box::new(value)), rest));
    }
    if let Some(rest) = input.strip_prefix("set[") {
        let (inner, rest) = parse_spec(rest)?;
        let rest = rest
            .strip_prefix(']')
            .ok_or_else(|| unparseable(input, "missing ']' after set element"))?;
        return Ok((TypeSpec::Set(Box::new(inner)), rest));
    }
    if let Some(rest) = input.strip_prefix('[') {
        // Fixed array `[n]T`: the length is accepted and dropped; fixed
        // arrays ride the list path on the wire.
        let digits = rest.chars().take_while(char::is_ascii_digit).count();
        if digits == 0 {
            return Err(unparseable(input, "expected array length"));
        }
        let rest = rest[digits..]
            .strip_prefix(']')
            .ok_or_else(|| unparseable(input, "missing ']' after array length"))?;
        let (inner, rest) = parse_spec(rest)?;
        return Ok((TypeSpec::List(Box::new(inner)), rest));
    }
    if let Some(rest) = input.strip_prefix('@') {
        let end = rest
            .find(|c: char| c == ']')
            .unwrap_or(rest.len());
        let qualified = &rest[..end];
        if qualified.is_empty() {
            return Err(unparseable(input, "empty type name after '@'"));
        }
        let (namespace, name) = match qualified.rfind('.') {
            Some(idx) => (&qualified[..idx], &qualified[idx + 1..]),
            None => ("", qualified),
        };
        if name.is_empty() {
            return Err(unparseable(input, "empty type name after namespace"));
        }
        return Ok((TypeSpec::named(namespace, name), &rest[end..]));
    }

    let end = input.find(|c: char| c == ']').unwrap_or(input.len());
    let token = &input[..end];
    let spec = match token {
        "bool" => TypeSpec::Bool,
        "int8" => TypeSpec::Int8,
        "int16" => TypeSpec::Int16,
        "int32" => TypeSpec::Int32,
        "varint32" => TypeSpec::VarInt32,
        "int64" => TypeSpec::Int64,
        "varint64" => TypeSpec::VarInt64,
        "sliint64" => TypeSpec::SliInt64,
        "float32" => TypeSpec::Float32,
        "float64" => TypeSpec::Float64,
        "string" => TypeSpec::String,
        "binary" => TypeSpec::Binary,
        "date" => TypeSpec::Date,
        "timestamp" => TypeSpec::Timestamp,
        "duration" => TypeSpec::Duration,
        "any" => TypeSpec::Any,
        other => {
            return Err(unparseable(input, &format!("unknown base type {other:?}")));
        }
    };
    Ok((spec, &input[end..]))
}

fn unparseable(input: &str, reason: &str) -> CrosswireError {
    CrosswireError::TypeMismatch(format!("unparseable type {input:?}: {reason}"))
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Bool => write!(f, "bool"),
            Self::Int8 => write!(f, "int8"),
            Self::Int16 => write!(f, "int16"),
            Self::Int32 => write!(f, "int32"),
            Self::VarInt32 => write!(f, "varint32"),
            Self::Int64 => write!(f, "int64"),
            Self::VarInt64 => write!(f, "varint64"),
            Self::SliInt64 => write!(f, "sliint64"),
            Self::Float32 => write!(f, "float32"),
            Self::Float64 => write!(f, "float64"),
            Self::String => write!(f, "string"),
            Self::Binary => write!(f, "binary"),
            Self::Date => write!(f, "date"),
            Self::Timestamp => write!(f, "timestamp"),
            Self::Duration => write!(f, "duration"),
            Self::List(inner) => write!(f, "[]{inner}"),
            Self::Set(inner) => write!(f, "set[{inner}]"),
            Self::Map(key, value) => write!(f, "map[{key}]{value}"),
            Self::Named { namespace, name } => {
                if namespace.is_empty() {
                    write!(f, "@{name}")
                } else {
                    write!(f, "@{namespace}.{name}")
                }
            }
            Self::Ptr(inner) => write!(f, "*{inner}"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn grammar_roundtrip() {
        for decl in [
            "bool",
            "int32",
            "string",
            "any",
            "[]string",
            "[]int32",
            "set[int64]",
            "map[string]varint32",
            "map[string]map[int8]float64",
            "@example.Person",
            "*@example.Person",
            "@Orphan",
            "[]@example.Person",
            "map[@example.Key]*@example.Person",
        ] {
            let spec = TypeSpec::parse(decl).unwrap();
            assert_eq!(spec.to_string(), decl, "roundtrip of {decl}");
        }
    }

    #[test]
    fn fixed_arrays_ride_the_list_path() {
        assert_eq!(
            TypeSpec::parse("[2]int16").unwrap(),
            TypeSpec::List(Box::new(TypeSpec::Int16))
        );
    }

    #[test]
    fn parse_failures() {
        for decl in ["", "map[string", "[x]bool", "@", "float128", "[]“", "*"] {
            assert!(TypeSpec::parse(decl).is_err(), "{decl:?} should not parse");
        }
    }

    #[test]
    fn primitive_classification() {
        assert!(TypeSpec::Int32.is_primitive());
        assert!(TypeSpec::Ptr(Box::new(TypeSpec::Bool)).is_primitive());
        assert!(!TypeSpec::String.is_primitive());
        assert!(!TypeSpec::Any.is_primitive());
    }

    #[test]
    fn primitive_element_lists_map_to_packed_arrays() {
        assert_eq!(TypeSpec::Int32.primitive_array_id(), Some(INT32_ARRAY));
        assert_eq!(TypeSpec::String.primitive_array_id(), None);
    }

    #[test]
    fn named_family_classifier() {
        assert!(is_namespaced_type(NAMED_STRUCT));
        assert!(is_namespaced_type(TYPE_TAG));
        assert!(!is_namespaced_type(STRUCT));
        assert!(!is_namespaced_type(MAP));
    }
}
