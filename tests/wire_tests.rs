#![allow(missing_docs)]

use crosswire::metastring::MetaStringEncoder;
use crosswire::{
    ByteBuffer, Crosswire, CrosswireError, StructSchema, StructValue, TypeRegistry, TypeSpec,
    Value,
};
use std::sync::Arc;

fn isolated_codec() -> Crosswire {
    Crosswire::builder().with_registry(Arc::new(TypeRegistry::new()))
}

/// Validate the magic guard: anything not starting `D4 62` is `BadMagic`.
#[test]
fn test_bad_magic() {
    let mut codec = Crosswire::default();
    for stream in [&[][..], &[0xD4][..], &[0x62, 0xD4, 0x03][..], &[0u8; 16][..]] {
        assert!(
            matches!(codec.from_bytes(stream), Err(CrosswireError::BadMagic)),
            "stream {stream:?}"
        );
    }
}

/// Validate that unknown or missing flag bits are `UnsupportedVersion`.
#[test]
fn test_unsupported_flags() {
    let mut codec = Crosswire::default();
    // Reserved bit set.
    assert!(matches!(
        codec.from_bytes(&[0xD4, 0x62, 0x07, 0x00]),
        Err(CrosswireError::UnsupportedVersion(0x07))
    ));
    // Cross-language bit missing.
    assert!(matches!(
        codec.from_bytes(&[0xD4, 0x62, 0x02, 0x00]),
        Err(CrosswireError::UnsupportedVersion(0x02))
    ));
}

/// Validate that leftover bytes after the root value are `TrailingBytes`.
#[test]
fn test_trailing_bytes() -> crosswire::Result<()> {
    let mut codec = Crosswire::default();
    let mut bytes = codec.to_bytes(&Value::Bool(true))?;
    bytes.extend_from_slice(&[0xAA, 0xBB]);
    assert!(matches!(
        codec.from_bytes(&bytes),
        Err(CrosswireError::TrailingBytes(2))
    ));
    Ok(())
}

/// Validate that a stream cut mid-value is `Truncated`.
#[test]
fn test_truncated_stream() -> crosswire::Result<()> {
    let mut codec = Crosswire::default();
    let bytes = codec.to_bytes(&Value::Int64(-1))?;
    for cut in 4..bytes.len() {
        assert!(
            matches!(
                codec.from_bytes(&bytes[..cut]),
                Err(CrosswireError::Truncated { .. })
            ),
            "cut at {cut}"
        );
    }
    Ok(())
}

/// Validate that a back-reference to an id never written is `UnknownRefId`.
#[test]
fn test_unknown_ref_id() {
    let mut codec = Crosswire::default();
    // magic, flags, REF flag, back-ref id 5.
    assert!(matches!(
        codec.from_bytes(&[0xD4, 0x62, 0x03, 0x01, 0x05]),
        Err(CrosswireError::UnknownRefId(5))
    ));
}

/// Validate that a metastring back-reference past the written fragments is
/// `UnknownMetaStringId`.
#[test]
fn test_unknown_metastring_id() {
    let mut codec = isolated_codec();
    let mut buffer = ByteBuffer::new();
    buffer.write_bytes(&[0xD4, 0x62, 0x03, 0x03]);
    // NAMED_STRUCT header whose namespace fragment is back-ref id 2.
    buffer.write_varuint32(17);
    buffer.write_varuint32(((2 + 1) << 1) | 1);
    assert!(matches!(
        codec.deserialize(&mut buffer),
        Err(CrosswireError::UnknownMetaStringId(2))
    ));
}

/// Validate that a named header for an unknown type reports the decoded
/// name.
#[test]
fn test_unregistered_type_carries_name() -> crosswire::Result<()> {
    let writer_registry = Arc::new(TypeRegistry::new());
    let schema = writer_registry
        .register_struct_by_name(StructSchema::new("example", "Ghost"))?;
    let mut writer = Crosswire::builder().with_registry(writer_registry);
    let bytes = writer.to_bytes(&Value::struct_value(StructValue::new(schema)))?;

    let mut reader = isolated_codec();
    assert!(matches!(
        reader.from_bytes(&bytes),
        Err(CrosswireError::UnregisteredType(name)) if name == "example.Ghost"
    ));
    Ok(())
}

/// Validate metastring idempotence: one literal per stream, back-refs after.
#[test]
fn test_metastring_written_once_per_stream() -> crosswire::Result<()> {
    let registry = Arc::new(TypeRegistry::new());
    let schema = registry.register_struct_by_name(
        StructSchema::new("example", "Point")
            .field("x", TypeSpec::VarInt32)
            .field("y", TypeSpec::VarInt32),
    )?;

    let mut codec = Crosswire::builder().with_registry(registry);
    let mut first = StructValue::new(schema.clone());
    first.set("x", Value::Int32(1))?;
    first.set("y", Value::Int32(2))?;
    let mut second = StructValue::new(schema);
    second.set("x", Value::Int32(3))?;
    second.set("y", Value::Int32(4))?;
    let bytes = codec.to_bytes(&Value::list(vec![
        Value::struct_value(first),
        Value::struct_value(second),
    ]))?;

    // The packed namespace fragment appears exactly once; the second type
    // header back-references it.
    let fragment = MetaStringEncoder::new('.', '_').encode("example");
    let occurrences = bytes
        .windows(fragment.data.len())
        .filter(|window| *window == fragment.data.as_slice())
        .count();
    assert_eq!(occurrences, 1);
    Ok(())
}

/// Validate the full chunk layout of a homogeneous string→int32 map: one
/// chunk, per-chunk type headers, tracked keys, zero terminator.
#[test]
fn test_homogeneous_map_chunk_bytes() -> crosswire::Result<()> {
    let mut codec = Crosswire::default();
    let map = Value::map([
        (Value::str("k1"), Value::Int32(1)),
        (Value::str("k2"), Value::Int32(-1)),
        (Value::str(""), Value::Int32(3)),
    ]);
    let bytes = codec.to_bytes(&map)?;
    let expected = [
        0xD4, 0x62, 0x03, // magic, flags
        0x03, 0x17, // NON_REF, MAP header
        0x03, 0xDC, 0x0C, 0x04, // chunk: size 3, flags, STRING, INT32
        0x03, 0x08, 0x6B, 0x31, // "k1": NON_REF, (2<<2)|latin1, bytes
        0x01, 0x00, 0x00, 0x00, // 1
        0x03, 0x08, 0x6B, 0x32, // "k2"
        0xFF, 0xFF, 0xFF, 0xFF, // -1
        0x03, 0x00, // "": NON_REF, empty body
        0x03, 0x00, 0x00, 0x00, // 3
        0x00, // terminating zero chunk
    ];
    assert_eq!(bytes, expected);
    Ok(())
}

/// Validate that a map mixing value types splits into (at least) two chunks.
#[test]
fn test_heterogeneous_map_chunks() -> crosswire::Result<()> {
    let mut codec = Crosswire::default();
    let mixed = Value::map([
        (Value::str("a"), Value::Int32(1)),
        (Value::str("b"), Value::str("two")),
    ]);
    let homogeneous = Value::map([
        (Value::str("a"), Value::Int32(1)),
        (Value::str("b"), Value::Int32(2)),
    ]);
    let mixed_bytes = codec.to_bytes(&mixed)?;
    let homogeneous_bytes = codec.to_bytes(&homogeneous)?;

    // The split costs a second chunk header and value type header.
    assert!(mixed_bytes.len() > homogeneous_bytes.len());
    assert_eq!(codec.from_bytes(&mixed_bytes)?, mixed);
    Ok(())
}

/// Validate the packed layout of primitive arrays: length varint plus
/// `len * width` raw bytes, no per-element flags.
#[test]
fn test_packed_array_bytes() -> crosswire::Result<()> {
    let mut codec = Crosswire::default();
    let bytes = codec.to_bytes(&Value::Int32Array(std::rc::Rc::new(vec![0; 5])))?;
    // magic(2) flags(1) ref(1) header(1) len(1) payload(20)
    assert_eq!(bytes.len(), 26);
    assert_eq!(bytes[4], 33); // INT32_ARRAY
    assert_eq!(bytes[5], 5);
    assert!(bytes[6..].iter().all(|&b| b == 0));
    Ok(())
}

/// Validate that UTF-16LE string payloads decode.
#[test]
fn test_utf16_string_accepted() -> crosswire::Result<()> {
    let mut buffer = ByteBuffer::new();
    buffer.write_bytes(&[0xD4, 0x62, 0x03, 0x03, 0x0C]); // magic, flags, NON_REF, STRING
    let units: Vec<u8> = "straße".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
    buffer.write_varuint64(((units.len() as u64) << 2) | 1); // UTF-16LE
    buffer.write_bytes(&units);

    let mut codec = Crosswire::default();
    assert_eq!(codec.deserialize(&mut buffer)?, Value::str("straße"));
    Ok(())
}

/// Validate that an invalid UTF-8 payload is `InvalidUtf8`.
#[test]
fn test_invalid_utf8_rejected() {
    let mut buffer = ByteBuffer::new();
    buffer.write_bytes(&[0xD4, 0x62, 0x03, 0x03, 0x0C]);
    buffer.write_varuint64((2 << 2) | 2); // UTF-8, 2 bytes
    buffer.write_bytes(&[0xFF, 0xFE]);

    let mut codec = Crosswire::default();
    assert!(matches!(
        codec.deserialize(&mut buffer),
        Err(CrosswireError::InvalidUtf8(_))
    ));
}

/// Validate that the compatible-struct family is recognized and refused.
#[test]
fn test_compatible_struct_rejected() {
    let mut codec = Crosswire::default();
    // magic, flags, NON_REF, COMPATIBLE_STRUCT (16).
    assert!(matches!(
        codec.from_bytes(&[0xD4, 0x62, 0x03, 0x03, 0x10]),
        Err(CrosswireError::TypeMismatch(_))
    ));
}

/// Validate that a pointer-polarity (negative) type id resolves to the same
/// registration as the value polarity.
#[test]
fn test_negative_type_id_reconciled() -> crosswire::Result<()> {
    let registry = Arc::new(TypeRegistry::new());
    let schema = registry.register_struct_by_name(
        StructSchema::new("example", "Node").field("tag", TypeSpec::VarInt32),
    )?;

    let mut codec = Crosswire::builder().with_registry(registry.clone());
    let mut node = StructValue::new(schema);
    node.set("tag", Value::Int32(9))?;
    let bytes = codec.to_bytes(&Value::struct_value(node))?;

    // Rewrite the type-id varint from NAMED_STRUCT (17) to its negated
    // two's-complement form, as a pointer-registering peer would emit.
    let mut patched = bytes[..4].to_vec();
    let mut header = ByteBuffer::new();
    header.write_varuint32(-17i32 as u32);
    patched.extend_from_slice(header.as_slice());
    patched.extend_from_slice(&bytes[5..]);

    let back = codec.from_bytes(&patched)?;
    match back {
        Value::Struct(sv) => assert_eq!(sv.borrow().get("tag"), Some(&Value::Int32(9))),
        other => panic!("expected struct, got {other:?}"),
    }
    Ok(())
}

/// Validate that a truncated metastring literal is `Truncated`.
#[test]
fn test_truncated_metastring() {
    let mut codec = isolated_codec();
    let mut buffer = ByteBuffer::new();
    buffer.write_bytes(&[0xD4, 0x62, 0x03, 0x03]);
    buffer.write_varuint32(17); // NAMED_STRUCT
    buffer.write_varuint32(8 << 1); // literal of 8 bytes, none present
    buffer.write_u8(1); // encoding tag
    assert!(matches!(
        codec.deserialize(&mut buffer),
        Err(CrosswireError::Truncated { .. })
    ));
}
