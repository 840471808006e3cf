#![allow(missing_docs)]

use crosswire::{
    Crosswire, CrosswireError, StructSchema, StructValue, TypeRegistry, TypeSpec, Value,
};
use std::rc::Rc;
use std::sync::Arc;

fn codec_with(registry: &Arc<TypeRegistry>) -> Crosswire {
    Crosswire::builder().with_registry(registry.clone())
}

/// Validate `AlreadyRegistered` on id and name collisions through the codec
/// passthroughs.
#[test]
fn test_duplicate_registrations_rejected() -> crosswire::Result<()> {
    let codec = Crosswire::builder().with_registry(Arc::new(TypeRegistry::new()));
    codec.register_struct(StructSchema::new("a", "First"), 100)?;

    assert!(matches!(
        codec.register_struct(StructSchema::new("a", "Second"), 100),
        Err(CrosswireError::AlreadyRegistered(_))
    ));
    assert!(matches!(
        codec.register_struct_by_name(StructSchema::new("a", "First")),
        Err(CrosswireError::AlreadyRegistered(_))
    ));
    Ok(())
}

/// Validate that declared fields are encoded without per-value type headers
/// by checking the stream is smaller than the dynamic rendition.
#[test]
fn test_declared_fields_omit_headers() -> crosswire::Result<()> {
    let registry = Arc::new(TypeRegistry::new());
    let schema = registry.register_struct_by_name(
        StructSchema::new("example", "Tight")
            .field("a", TypeSpec::VarInt32)
            .field("b", TypeSpec::VarInt32)
            .field("c", TypeSpec::VarInt32),
    )?;
    let loose = registry.register_struct_by_name(
        StructSchema::new("example", "Loose")
            .field("a", TypeSpec::Any)
            .field("b", TypeSpec::Any)
            .field("c", TypeSpec::Any),
    )?;

    let mut tight_value = StructValue::new(schema);
    let mut loose_value = StructValue::new(loose);
    for field in ["a", "b", "c"] {
        tight_value.set(field, Value::Int32(5))?;
        loose_value.set(field, Value::Int32(5))?;
    }

    let mut codec = codec_with(&registry);
    let tight_bytes = codec.to_bytes(&Value::struct_value(tight_value))?;
    let loose_bytes = codec.to_bytes(&Value::struct_value(loose_value))?;
    assert!(tight_bytes.len() < loose_bytes.len());
    Ok(())
}

/// Validate that a null in a primitive-declared field is a `TypeMismatch`.
#[test]
fn test_null_primitive_field_rejected() -> crosswire::Result<()> {
    let registry = Arc::new(TypeRegistry::new());
    let schema = registry.register_struct_by_name(
        StructSchema::new("example", "Strict").field("count", TypeSpec::Int32),
    )?;

    let value = Value::struct_value(StructValue::new(schema));
    let mut codec = codec_with(&registry);
    assert!(matches!(
        codec.to_bytes(&value),
        Err(CrosswireError::TypeMismatch(_))
    ));
    Ok(())
}

/// Validate that pointer-declared slots accept null.
#[test]
fn test_pointer_slots_are_nullable() -> crosswire::Result<()> {
    let registry = Arc::new(TypeRegistry::new());
    let schema = registry.register_struct_by_name(
        StructSchema::new("example", "Chain")
            .field("label", TypeSpec::String)
            .parsed_field("next", "*@example.Chain")?,
    )?;

    let mut head = StructValue::new(schema.clone());
    head.set("label", Value::str("head"))?;
    let mut tail = StructValue::new(schema);
    tail.set("label", Value::str("tail"))?;
    head.set("next", Value::struct_value(tail))?;

    let mut codec = codec_with(&registry);
    let bytes = codec.to_bytes(&Value::struct_value(head))?;
    let back = codec.from_bytes(&bytes)?;

    let head_back = match &back {
        Value::Struct(sv) => sv.borrow().clone(),
        other => panic!("expected struct, got {other:?}"),
    };
    assert_eq!(head_back.get("label"), Some(&Value::str("head")));
    match head_back.get("next") {
        Some(Value::Struct(next)) => {
            assert_eq!(next.borrow().get("label"), Some(&Value::str("tail")));
            assert_eq!(next.borrow().get("next"), Some(&Value::Null));
        }
        other => panic!("expected struct in next, got {other:?}"),
    }
    Ok(())
}

/// Validate that a value of the wrong shape for its declared field fails
/// with `TypeMismatch` instead of corrupting the stream.
#[test]
fn test_field_shape_mismatch_rejected() -> crosswire::Result<()> {
    let registry = Arc::new(TypeRegistry::new());
    let schema = registry.register_struct_by_name(
        StructSchema::new("example", "Shaped").parsed_field("items", "[]string")?,
    )?;

    let mut value = StructValue::new(schema);
    value.set("items", Value::Int32(3))?;
    let mut codec = codec_with(&registry);
    assert!(matches!(
        codec.to_bytes(&Value::struct_value(value)),
        Err(CrosswireError::TypeMismatch(_))
    ));
    Ok(())
}

/// Validate declared-container fields: typed lists, sets, maps and packed
/// arrays all survive a schema-mediated round-trip.
#[test]
fn test_declared_container_fields() -> crosswire::Result<()> {
    let registry = Arc::new(TypeRegistry::new());
    let schema = registry.register_struct_by_name(
        StructSchema::new("example", "Containers")
            .parsed_field("names", "[]string")?
            .parsed_field("lookup", "map[string]varint32")?
            .parsed_field("tags", "set[int64]")?
            .parsed_field("weights", "[]float64")?,
    )?;

    let mut value = StructValue::new(schema);
    value.set(
        "names",
        Value::list(vec![Value::str("ada"), Value::Null, Value::str("alan")]),
    )?;
    value.set(
        "lookup",
        Value::map([
            (Value::str("one"), Value::Int32(1)),
            (Value::str("two"), Value::Int32(2)),
        ]),
    )?;
    value.set("tags", Value::set([Value::Int64(10), Value::Int64(20)]))?;
    value.set("weights", Value::Float64Array(Rc::new(vec![0.5, 2.25])))?;
    let value = Value::struct_value(value);

    let mut codec = codec_with(&registry);
    assert_eq!({
        let bytes = codec.to_bytes(&value)?;
        codec.from_bytes(&bytes)?
    }, value);
    Ok(())
}

/// Validate that a struct value written into a slot declared for a different
/// named type is rejected.
#[test]
fn test_named_slot_enforces_identity() -> crosswire::Result<()> {
    let registry = Arc::new(TypeRegistry::new());
    let holder = registry.register_struct_by_name(
        StructSchema::new("example", "Holder").parsed_field("inner", "@example.Expected")?,
    )?;
    registry.register_struct_by_name(StructSchema::new("example", "Expected"))?;
    let other = registry
        .register_struct_by_name(StructSchema::new("example", "Other"))?;

    let mut value = StructValue::new(holder);
    value.set("inner", Value::struct_value(StructValue::new(other)))?;
    let mut codec = codec_with(&registry);
    assert!(matches!(
        codec.to_bytes(&Value::struct_value(value)),
        Err(CrosswireError::TypeMismatch(_))
    ));
    Ok(())
}

/// Validate a struct registered under a raw id: the header is just the id
/// varint, and the peer resolves it from its own by-id registration.
#[test]
fn test_struct_registered_by_id() -> crosswire::Result<()> {
    let register = |registry: &TypeRegistry| {
        registry.register_struct(
            StructSchema::new("example", "Compact").field("n", TypeSpec::VarInt64),
            120,
        )
    };

    let write_registry = Arc::new(TypeRegistry::new());
    let schema = register(&write_registry)?;
    let mut object = StructValue::new(schema);
    object.set("n", Value::Int64(-7))?;

    let mut writer = codec_with(&write_registry);
    let bytes = writer.to_bytes(&Value::struct_value(object))?;
    // magic(2) flags(1) ref(1) id varint(1) field flag... the id header is a
    // single byte, no name fragments.
    assert_eq!(bytes[4], 120);

    let read_registry = Arc::new(TypeRegistry::new());
    register(&read_registry)?;
    let mut reader = codec_with(&read_registry);
    match reader.from_bytes(&bytes)? {
        Value::Struct(sv) => assert_eq!(sv.borrow().get("n"), Some(&Value::Int64(-7))),
        other => panic!("expected struct, got {other:?}"),
    }
    Ok(())
}

/// Validate the textual grammar end to end: a spec parsed from its printed
/// form declares the same wire layout.
#[test]
fn test_grammar_print_parse_agreement() -> crosswire::Result<()> {
    for decl in [
        "map[string]map[int8]float64",
        "[]@example.Person",
        "*@example.Person",
        "set[string]",
        "[]varint32",
    ] {
        let spec = TypeSpec::parse(decl)?;
        assert_eq!(TypeSpec::parse(&spec.to_string())?, spec, "{decl}");
    }
    Ok(())
}
