//! The write-side engine (C5): values to bytes.
//!
//! One [`Writer`] session exists per top-level serialize call. It borrows the
//! caller's buffer, the registry, and the codec's reusable session state
//! (reference ids and metastring interning); the owning codec resets that
//! state on every exit path.
//!
//! ## Slot protocol
//!
//! Every value is written into a *slot* whose static type is a
//! [`TypeSpec`]:
//!
//! 1. Slots declared with a primitive spec hold the raw encoding, nothing
//!    else.
//! 2. Every other slot starts with a reference flag. With tracking enabled,
//!    a non-null value writes `NON_REF` and allocates a reference id (or
//!    `REF` + id when its identity was already written); with tracking
//!    disabled it writes `NON_REF_NULL` and a recursion-depth guard stands
//!    in for cycle detection.
//! 3. Slots declared `any` then carry a type header; concretely declared
//!    slots do not.
//! 4. The value body follows.
//!
//! Map bodies use the chunked encoding: runs of entries whose key and value
//! dynamic classes agree share a 2-byte chunk header, one type header per
//! dynamic side, and per-entry reference flags only for sides that are
//! tracked or nullable. A zero size byte terminates the map.

use crate::buffer::ByteBuffer;
use crate::error::{CrosswireError, Result};
use crate::metastring::MetaStringWriterState;
use crate::refs::{RefFlag, RefWriter, WriteRef};
use crate::resolver::{TypeKind, TypeRegistry};
use crate::types::{self, TypeId, TypeSpec};
use crate::value::{ExtKey, MapValue, StructValue, Value};
use std::cell::RefCell;
use std::mem::Discriminant;
use std::rc::Rc;
use std::sync::Arc;

/// Per-binary callback of the out-of-band mode: `true` keeps the bytes
/// in-band, `false` extracts them and leaves a placeholder.
pub(crate) type OobSink<'s> = dyn FnMut(Rc<Vec<u8>>) -> bool + 's;

/// One write session.
pub(crate) struct Writer<'a, 's> {
    pub buffer: &'a mut ByteBuffer,
    pub registry: &'a TypeRegistry,
    pub refs: &'a mut RefWriter,
    pub strings: &'a mut MetaStringWriterState,
    pub ref_tracking: bool,
    pub recursion_limit: usize,
    pub oob: Option<&'a mut OobSink<'s>>,
    depth: usize,
}

fn mismatch(value: &Value, expected: impl std::fmt::Display) -> CrosswireError {
    CrosswireError::TypeMismatch(format!(
        "expected {expected}, found {}",
        value.type_name()
    ))
}

impl<'a, 's> Writer<'a, 's> {
    pub fn new(
        buffer: &'a mut ByteBuffer,
        registry: &'a TypeRegistry,
        refs: &'a mut RefWriter,
        strings: &'a mut MetaStringWriterState,
        ref_tracking: bool,
        recursion_limit: usize,
        oob: Option<&'a mut OobSink<'s>>,
    ) -> Self {
        Self {
            buffer,
            registry,
            refs,
            strings,
            ref_tracking,
            recursion_limit,
            oob,
            depth: 0,
        }
    }

    /// Writes the root value as an `any` slot.
    pub fn write_root(&mut self, value: &Value) -> Result<()> {
        self.write_slot(value, &TypeSpec::Any)
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        // With tracking enabled cycles terminate through back-references;
        // without it the depth guard is the only brake.
        if !self.ref_tracking && self.depth > self.recursion_limit {
            return Err(CrosswireError::RecursionLimit(self.recursion_limit));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Writes one slot: ref flag, optional type header, body.
    fn write_slot(&mut self, value: &Value, spec: &TypeSpec) -> Result<()> {
        let spec = spec.strip_ptr();
        if spec.is_primitive() {
            return self.write_primitive_body(value, spec);
        }
        if value.is_null() {
            self.buffer.write_u8(RefFlag::Null as u8);
            return Ok(());
        }
        if self.ref_tracking {
            match self.refs.offer(value.identity()) {
                WriteRef::Seen(id) => {
                    self.buffer.write_u8(RefFlag::Ref as u8);
                    self.buffer.write_varuint32(id);
                    return Ok(());
                }
                WriteRef::Fresh(_) => self.buffer.write_u8(RefFlag::NonRef as u8),
            }
        } else {
            self.buffer.write_u8(RefFlag::NonRefNull as u8);
        }
        if matches!(spec, TypeSpec::Any) {
            self.write_type_header(value)?;
            self.write_dynamic_body(value)
        } else {
            self.write_declared_body(value, spec)
        }
    }

    /// Writes the type header the dynamic type of `value` implies.
    fn write_type_header(&mut self, value: &Value) -> Result<()> {
        let id: TypeId = match value {
            Value::Null => {
                return Err(CrosswireError::TypeMismatch(
                    "null carries no type header".into(),
                ))
            }
            Value::Bool(_) => types::BOOL,
            Value::Int8(_) => types::INT8,
            Value::Int16(_) => types::INT16,
            Value::Int32(_) => types::INT32,
            Value::Int64(_) => types::INT64,
            Value::Float32(_) => types::FLOAT32,
            Value::Float64(_) => types::FLOAT64,
            Value::String(_) => types::STRING,
            Value::Binary(_) => types::BINARY,
            Value::Date(_) => types::LOCAL_DATE,
            Value::Timestamp(_) => types::TIMESTAMP,
            Value::Duration(_) => types::DURATION,
            Value::List(_) => types::LIST,
            Value::Set(_) => types::SET,
            Value::Map(_) => types::MAP,
            Value::BoolArray(_) => types::BOOL_ARRAY,
            Value::Int8Array(_) => types::INT8_ARRAY,
            Value::Int16Array(_) => types::INT16_ARRAY,
            Value::Int32Array(_) => types::INT32_ARRAY,
            Value::Int64Array(_) => types::INT64_ARRAY,
            Value::Float32Array(_) => types::FLOAT32_ARRAY,
            Value::Float64Array(_) => types::FLOAT64_ARRAY,
            Value::Struct(sv) => {
                let schema = sv.borrow().schema.clone();
                let info = self.registry.info_for_struct(&schema)?;
                return self.registry.write_type_info(self.buffer, &info, self.strings);
            }
            Value::Enum(ev) => {
                let info = self.registry.info_for_enum(&ev.schema)?;
                return self.registry.write_type_info(self.buffer, &info, self.strings);
            }
            Value::Ext(ev) => {
                let info = self.registry.info_for_ext(&ev.key)?;
                return self.registry.write_type_info(self.buffer, &info, self.strings);
            }
        };
        self.buffer.write_varuint32(id as u32);
        Ok(())
    }

    /// Raw encoding of a primitive-declared slot.
    fn write_primitive_body(&mut self, value: &Value, spec: &TypeSpec) -> Result<()> {
        match (spec, value) {
            (TypeSpec::Bool, Value::Bool(v)) => self.buffer.write_bool(*v),
            (TypeSpec::Int8, Value::Int8(v)) => self.buffer.write_i8(*v),
            (TypeSpec::Int16, Value::Int16(v)) => self.buffer.write_i16(*v),
            (TypeSpec::Int32, Value::Int32(v)) => self.buffer.write_i32(*v),
            (TypeSpec::VarInt32, Value::Int32(v)) => self.buffer.write_varint32(*v),
            (TypeSpec::Int64, Value::Int64(v)) => self.buffer.write_i64(*v),
            (TypeSpec::VarInt64, Value::Int64(v)) => self.buffer.write_varint64(*v),
            (TypeSpec::SliInt64, Value::Int64(v)) => write_sli_int64(self.buffer, *v),
            (TypeSpec::Float32, Value::Float32(v)) => self.buffer.write_f32(*v),
            (TypeSpec::Float64, Value::Float64(v)) => self.buffer.write_f64(*v),
            _ => return Err(mismatch(value, spec)),
        }
        Ok(())
    }

    /// Body of a dynamically-typed slot; the header has already been
    /// written, so the value's own variant drives the encoding.
    fn write_dynamic_body(&mut self, value: &Value) -> Result<()> {
        self.enter()?;
        let result = self.write_dynamic_body_inner(value);
        self.leave();
        result
    }

    fn write_dynamic_body_inner(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => Err(CrosswireError::TypeMismatch(
                "null has no value body".into(),
            )),
            Value::Bool(v) => {
                self.buffer.write_bool(*v);
                Ok(())
            }
            Value::Int8(v) => {
                self.buffer.write_i8(*v);
                Ok(())
            }
            Value::Int16(v) => {
                self.buffer.write_i16(*v);
                Ok(())
            }
            Value::Int32(v) => {
                self.buffer.write_i32(*v);
                Ok(())
            }
            Value::Int64(v) => {
                self.buffer.write_i64(*v);
                Ok(())
            }
            Value::Float32(v) => {
                self.buffer.write_f32(*v);
                Ok(())
            }
            Value::Float64(v) => {
                self.buffer.write_f64(*v);
                Ok(())
            }
            Value::String(s) => {
                write_string_body(self.buffer, s);
                Ok(())
            }
            Value::Binary(b) => self.write_binary_body(b),
            Value::Date(d) => {
                self.buffer.write_i32(d.days());
                Ok(())
            }
            Value::Timestamp(t) => {
                self.buffer.write_i64(t.millis());
                Ok(())
            }
            Value::Duration(d) => {
                self.buffer.write_i64(d.secs);
                self.buffer.write_i32(d.nanos);
                Ok(())
            }
            Value::Enum(ev) => {
                self.buffer.write_varuint32(ev.ordinal);
                Ok(())
            }
            Value::List(items) => {
                let items = items.borrow();
                self.buffer.write_varuint32(items.len() as u32);
                for item in items.iter() {
                    self.write_slot(item, &TypeSpec::Any)?;
                }
                Ok(())
            }
            Value::Set(set) => {
                let set = set.borrow();
                self.buffer.write_varuint32(set.len() as u32);
                for item in set.items() {
                    self.write_slot(item, &TypeSpec::Any)?;
                }
                Ok(())
            }
            Value::Map(map) => {
                let map = map.borrow();
                self.write_map_body(&map, &TypeSpec::Any, &TypeSpec::Any)
            }
            Value::Struct(sv) => self.write_struct_fields(sv),
            Value::Ext(ev) => {
                let info = self.registry.info_for_ext(&ev.key)?;
                match &info.kind {
                    TypeKind::Ext { codec, .. } => codec.write(self.buffer, &*ev.data),
                    _ => Err(CrosswireError::TypeMismatch(format!(
                        "{} is not an ext registration",
                        ev.key
                    ))),
                }
            }
            array => self.write_array_body(array),
        }
    }

    /// Body of a slot with a concrete declared spec (non-primitive).
    fn write_declared_body(&mut self, value: &Value, spec: &TypeSpec) -> Result<()> {
        self.enter()?;
        let result = self.write_declared_body_inner(value, spec);
        self.leave();
        result
    }

    fn write_declared_body_inner(&mut self, value: &Value, spec: &TypeSpec) -> Result<()> {
        match (spec, value) {
            (TypeSpec::String, Value::String(s)) => {
                write_string_body(self.buffer, s);
                Ok(())
            }
            (TypeSpec::Binary, Value::Binary(b)) => self.write_binary_body(b),
            (TypeSpec::Date, Value::Date(d)) => {
                self.buffer.write_i32(d.days());
                Ok(())
            }
            (TypeSpec::Timestamp, Value::Timestamp(t)) => {
                self.buffer.write_i64(t.millis());
                Ok(())
            }
            (TypeSpec::Duration, Value::Duration(d)) => {
                self.buffer.write_i64(d.secs);
                self.buffer.write_i32(d.nanos);
                Ok(())
            }
            (TypeSpec::List(elem), value) => {
                if let Some(array_id) = elem.primitive_array_id() {
                    if array_wire_id(value) != Some(array_id) {
                        return Err(mismatch(value, spec));
                    }
                    return self.write_array_body(value);
                }
                match value {
                    Value::List(items) => {
                        let items = items.borrow();
                        self.buffer.write_varuint32(items.len() as u32);
                        for item in items.iter() {
                            self.write_slot(item, elem)?;
                        }
                        Ok(())
                    }
                    other => Err(mismatch(other, spec)),
                }
            }
            (TypeSpec::Set(elem), Value::Set(set)) => {
                let set = set.borrow();
                self.buffer.write_varuint32(set.len() as u32);
                for item in set.items() {
                    self.write_slot(item, elem)?;
                }
                Ok(())
            }
            (TypeSpec::Map(key_spec, value_spec), Value::Map(map)) => {
                let map = map.borrow();
                self.write_map_body(&map, key_spec, value_spec)
            }
            (TypeSpec::Named { namespace, name }, value) => {
                self.write_named_body(namespace, name, value)
            }
            (spec, value) => Err(mismatch(value, spec)),
        }
    }

    /// Body of a slot declared `@ns.Name`: the header is implied by the
    /// declaration, so only the registered kind's payload is written.
    fn write_named_body(&mut self, namespace: &str, name: &str, value: &Value) -> Result<()> {
        match value {
            Value::Struct(sv) => {
                let schema = sv.borrow().schema.clone();
                if schema.namespace != namespace || schema.name != name {
                    return Err(CrosswireError::TypeMismatch(format!(
                        "struct {} in a slot declared {}",
                        schema.qualified_name(),
                        TypeSpec::named(namespace, name)
                    )));
                }
                self.registry.info_for_struct(&schema)?;
                self.write_struct_fields(sv)
            }
            Value::Enum(ev) => {
                if ev.schema.namespace != namespace || ev.schema.name != name {
                    return Err(mismatch(value, TypeSpec::named(namespace, name)));
                }
                self.registry.info_for_enum(&ev.schema)?;
                self.buffer.write_varuint32(ev.ordinal);
                Ok(())
            }
            Value::Ext(ev) => {
                let declared = ExtKey::Named {
                    namespace: namespace.to_owned(),
                    name: name.to_owned(),
                };
                if ev.key != declared {
                    return Err(mismatch(value, TypeSpec::named(namespace, name)));
                }
                let info = self.registry.info_for_ext(&ev.key)?;
                match &info.kind {
                    TypeKind::Ext { codec, .. } => codec.write(self.buffer, &*ev.data),
                    _ => Err(mismatch(value, TypeSpec::named(namespace, name))),
                }
            }
            other => Err(mismatch(other, TypeSpec::named(namespace, name))),
        }
    }

    /// Struct fields in declaration order, each per its declared spec.
    fn write_struct_fields(&mut self, sv: &Rc<RefCell<StructValue>>) -> Result<()> {
        let guard = sv.borrow();
        if guard.fields.len() != guard.schema.fields.len() {
            return Err(CrosswireError::TypeMismatch(format!(
                "struct {} has {} field values for {} declared fields",
                guard.schema.qualified_name(),
                guard.fields.len(),
                guard.schema.fields.len()
            )));
        }
        for (value, decl) in guard.fields.iter().zip(guard.schema.fields.iter()) {
            self.write_slot(value, &decl.spec)?;
        }
        Ok(())
    }

    fn write_binary_body(&mut self, bytes: &Rc<Vec<u8>>) -> Result<()> {
        if let Some(sink) = self.oob.as_mut() {
            let keep_in_band = sink(bytes.clone());
            if keep_in_band {
                self.buffer.write_u8(1);
                self.buffer.write_length_prefixed_bytes(bytes);
            } else {
                // Placeholder only; the caller transports the payload.
                self.buffer.write_u8(0);
            }
        } else {
            self.buffer.write_length_prefixed_bytes(bytes);
        }
        Ok(())
    }

    fn write_array_body(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::BoolArray(items) => {
                self.buffer.write_varuint32(items.len() as u32);
                for &v in items.iter() {
                    self.buffer.write_bool(v);
                }
            }
            Value::Int8Array(items) => {
                self.buffer.write_varuint32(items.len() as u32);
                for &v in items.iter() {
                    self.buffer.write_i8(v);
                }
            }
            Value::Int16Array(items) => {
                self.buffer.write_varuint32(items.len() as u32);
                for &v in items.iter() {
                    self.buffer.write_i16(v);
                }
            }
            Value::Int32Array(items) => {
                self.buffer.write_varuint32(items.len() as u32);
                for &v in items.iter() {
                    self.buffer.write_i32(v);
                }
            }
            Value::Int64Array(items) => {
                self.buffer.write_varuint32(items.len() as u32);
                for &v in items.iter() {
                    self.buffer.write_i64(v);
                }
            }
            Value::Float32Array(items) => {
                self.buffer.write_varuint32(items.len() as u32);
                for &v in items.iter() {
                    self.buffer.write_f32(v);
                }
            }
            Value::Float64Array(items) => {
                self.buffer.write_varuint32(items.len() as u32);
                for &v in items.iter() {
                    self.buffer.write_f64(v);
                }
            }
            other => return Err(mismatch(other, "packed primitive array")),
        }
        Ok(())
    }

    // --- CHUNKED MAPS ---

    fn write_map_body(
        &mut self,
        map: &MapValue,
        key_spec: &TypeSpec,
        value_spec: &TypeSpec,
    ) -> Result<()> {
        const MAX_CHUNK: usize = 255;

        let entries = map.entries();
        let key_declared = !matches!(key_spec.strip_ptr(), TypeSpec::Any);
        let value_declared = !matches!(value_spec.strip_ptr(), TypeSpec::Any);

        let mut start = 0;
        while start < entries.len() {
            // 1. Extend the run while both sides keep their class.
            let key_class = ChunkClass::of(&entries[start].0);
            let value_class = ChunkClass::of(&entries[start].1);
            let mut end = start + 1;
            while end < entries.len()
                && end - start < MAX_CHUNK
                && ChunkClass::of(&entries[end].0) == key_class
                && ChunkClass::of(&entries[end].1) == value_class
            {
                end += 1;
            }

            // 2. Chunk header.
            let key_null = key_class.is_null();
            let value_null = value_class.is_null();
            let key_header = !key_declared && !key_null;
            let value_header = !value_declared && !value_null;
            let key_tracked = self.ref_tracking && key_class.has_identity();
            let value_tracked = self.ref_tracking && value_class.has_identity();

            let mut flags = 0u8;
            if key_null {
                flags |= types::KEY_HAS_NULL;
            }
            if value_null {
                flags |= types::VALUE_HAS_NULL;
            }
            if key_header {
                flags |= types::KEY_NOT_DECL_TYPE | types::KEY_DECL_TYPE;
            }
            if value_header {
                flags |= types::VALUE_NOT_DECL_TYPE | types::VALUE_DECL_TYPE;
            }
            if key_tracked {
                flags |= types::TRACKING_KEY_REF;
            }
            if value_tracked {
                flags |= types::TRACKING_VALUE_REF;
            }
            self.buffer.write_u8((end - start) as u8);
            self.buffer.write_u8(flags);
            if key_header {
                self.write_type_header(&entries[start].0)?;
            }
            if value_header {
                self.write_type_header(&entries[start].1)?;
            }

            // 3. Interleaved key,value slots.
            let key_flagged = key_tracked || key_null;
            let value_flagged = value_tracked || value_null;
            for (key, value) in &entries[start..end] {
                self.write_map_slot(key, key_spec, key_flagged)?;
                self.write_map_slot(value, value_spec, value_flagged)?;
            }
            start = end;
        }
        // Zero-size chunk terminates the map.
        self.buffer.write_u8(0);
        Ok(())
    }

    fn write_map_slot(&mut self, value: &Value, spec: &TypeSpec, flagged: bool) -> Result<()> {
        if !flagged {
            return self.write_map_slot_body(value, spec);
        }
        if value.is_null() {
            self.buffer.write_u8(RefFlag::Null as u8);
            return Ok(());
        }
        if self.ref_tracking {
            match self.refs.offer(value.identity()) {
                WriteRef::Seen(id) => {
                    self.buffer.write_u8(RefFlag::Ref as u8);
                    self.buffer.write_varuint32(id);
                    return Ok(());
                }
                WriteRef::Fresh(_) => self.buffer.write_u8(RefFlag::NonRef as u8),
            }
        } else {
            self.buffer.write_u8(RefFlag::NonRefNull as u8);
        }
        self.write_map_slot_body(value, spec)
    }

    fn write_map_slot_body(&mut self, value: &Value, spec: &TypeSpec) -> Result<()> {
        let spec = spec.strip_ptr();
        if matches!(spec, TypeSpec::Any) {
            // The chunk header already carried the type.
            return self.write_dynamic_body(value);
        }
        if spec.is_primitive() {
            return self.write_primitive_body(value, spec);
        }
        self.write_declared_body(value, spec)
    }
}

/// One side's grouping class within a map chunk: entries share a chunk only
/// while their key and value classes both hold.
#[derive(PartialEq, Clone, Copy)]
enum ChunkClass<'v> {
    Null,
    Simple {
        disc: Discriminant<Value>,
        identity: bool,
    },
    Struct(*const crate::schema::StructSchema),
    Enum(*const crate::schema::EnumSchema),
    Ext(&'v ExtKey),
}

impl<'v> ChunkClass<'v> {
    fn of(value: &'v Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Struct(sv) => Self::Struct(Arc::as_ptr(&sv.borrow().schema)),
            Value::Enum(ev) => Self::Enum(Arc::as_ptr(&ev.schema)),
            Value::Ext(ev) => Self::Ext(&ev.key),
            other => Self::Simple {
                disc: std::mem::discriminant(other),
                identity: other.identity().is_some(),
            },
        }
    }

    fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn has_identity(&self) -> bool {
        match self {
            Self::Null | Self::Enum(_) => false,
            Self::Struct(_) | Self::Ext(_) => true,
            Self::Simple { identity, .. } => *identity,
        }
    }
}

/// The packed-array wire id of an array value, if it is one.
fn array_wire_id(value: &Value) -> Option<TypeId> {
    match value {
        Value::BoolArray(_) => Some(types::BOOL_ARRAY),
        Value::Int8Array(_) => Some(types::INT8_ARRAY),
        Value::Int16Array(_) => Some(types::INT16_ARRAY),
        Value::Int32Array(_) => Some(types::INT32_ARRAY),
        Value::Int64Array(_) => Some(types::INT64_ARRAY),
        Value::Float32Array(_) => Some(types::FLOAT32_ARRAY),
        Value::Float64Array(_) => Some(types::FLOAT64_ARRAY),
        _ => None,
    }
}

const SLI_SMALL_MIN: i64 = -(1 << 30);
const SLI_SMALL_MAX: i64 = (1 << 30) - 1;

/// Small-long hybrid: 31-bit values take 4 bytes with a zero LSB, everything
/// else a one-byte discriminator (LSB set) plus 8 bytes.
pub(crate) fn write_sli_int64(buffer: &mut ByteBuffer, value: i64) {
    if (SLI_SMALL_MIN..=SLI_SMALL_MAX).contains(&value) {
        buffer.write_i32((value as i32) << 1);
    } else {
        buffer.write_u8(1);
        buffer.write_i64(value);
    }
}

/// String body: `varuint((byte_len << 2) | encoding)` then the bytes. The
/// writer picks Latin-1 when every char fits one byte, UTF-8 otherwise;
/// UTF-16LE is accepted on read only.
pub(crate) fn write_string_body(buffer: &mut ByteBuffer, s: &str) {
    if s.chars().all(|c| (c as u32) <= 0xFF) {
        let bytes: Vec<u8> = s.chars().map(|c| c as u8).collect();
        buffer.write_varuint64(((bytes.len() as u64) << 2) | types::STRING_LATIN1);
        buffer.write_bytes(&bytes);
    } else {
        let bytes = s.as_bytes();
        buffer.write_varuint64(((bytes.len() as u64) << 2) | types::STRING_UTF8);
        buffer.write_bytes(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sli_small_form_is_four_bytes() {
        let mut buf = ByteBuffer::new();
        write_sli_int64(&mut buf, 7);
        assert_eq!(buf.writer_index(), 4);
        // LSB of the first byte is the small-form marker.
        assert_eq!(buf.as_slice()[0] & 1, 0);
    }

    #[test]
    fn sli_large_form_is_nine_bytes() {
        let mut buf = ByteBuffer::new();
        write_sli_int64(&mut buf, i64::MAX);
        assert_eq!(buf.writer_index(), 9);
        assert_eq!(buf.as_slice()[0] & 1, 1);
    }

    #[test]
    fn string_body_prefers_latin1() {
        let mut buf = ByteBuffer::new();
        write_string_body(&mut buf, "héllo");
        // héllo is 5 chars, all <= U+00FF: header (5<<2)|0, then 5 bytes.
        assert_eq!(buf.as_slice()[0], 5 << 2);
        assert_eq!(buf.writer_index(), 6);
    }

    #[test]
    fn string_body_falls_back_to_utf8() {
        let mut buf = ByteBuffer::new();
        write_string_body(&mut buf, "日本");
        let header = buf.as_slice()[0] as u64;
        assert_eq!(header & 0b11, types::STRING_UTF8);
        assert_eq!(header >> 2, "日本".len() as u64);
    }
}
