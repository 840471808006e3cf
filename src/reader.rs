//! The read-side engine (C5): bytes back to values.
//!
//! One [`Reader`] session exists per top-level deserialize call and mirrors
//! [`crate::writer::Writer`] slot for slot. The protocol is self-describing
//! at every branch point (reference flags, type headers and map chunk flags
//! all sit in the stream), so the reader never needs to know whether the
//! writer had reference tracking enabled.
//!
//! ## Cycles
//!
//! A `NON_REF` flag reserves the next arena slot *before* the value body is
//! read. Containers and structs install their empty shell into that slot
//! first and only then read their elements, so a nested back-reference to
//! the enclosing object resolves to the still-under-construction shell. Leaf
//! values fill their slot right after decoding; nothing nested can
//! back-reference them mid-read.

use crate::buffer::ByteBuffer;
use crate::error::{CrosswireError, Result};
use crate::metastring::MetaStringReaderState;
use crate::refs::{RefFlag, RefReader};
use crate::resolver::{ResolvedType, TypeInfo, TypeKind, TypeRegistry};
use crate::types::{self, TypeId, TypeSpec};
use crate::value::{
    Date, EnumValue, ExtValue, MapValue, SetValue, StructValue, TimeDelta, Timestamp, Value,
};
use std::cell::RefCell;
use std::rc::Rc;

/// Caller-supplied out-of-band buffers, consumed in stream order.
struct OobCursor<'a> {
    buffers: &'a [Rc<Vec<u8>>],
    next: usize,
}

/// One read session.
pub(crate) struct Reader<'a> {
    pub buffer: &'a mut ByteBuffer,
    pub registry: &'a TypeRegistry,
    pub refs: &'a mut RefReader,
    pub strings: &'a mut MetaStringReaderState,
    oob: Option<OobCursor<'a>>,
}

impl<'a> Reader<'a> {
    pub fn new(
        buffer: &'a mut ByteBuffer,
        registry: &'a TypeRegistry,
        refs: &'a mut RefReader,
        strings: &'a mut MetaStringReaderState,
        oob_buffers: Option<&'a [Rc<Vec<u8>>]>,
    ) -> Self {
        Self {
            buffer,
            registry,
            refs,
            strings,
            oob: oob_buffers.map(|buffers| OobCursor { buffers, next: 0 }),
        }
    }

    /// Reads the root value as an `any` slot.
    pub fn read_root(&mut self) -> Result<Value> {
        self.read_slot(&TypeSpec::Any)
    }

    /// Reads one slot: ref flag, optional type header, body.
    fn read_slot(&mut self, spec: &TypeSpec) -> Result<Value> {
        let spec = spec.strip_ptr();
        if spec.is_primitive() {
            return self.read_primitive_body(spec);
        }
        match RefFlag::from_byte(self.buffer.read_u8()?)? {
            RefFlag::Null => Ok(Value::Null),
            RefFlag::Ref => {
                let id = self.buffer.read_varuint32()?;
                self.refs.resolve(id)
            }
            RefFlag::NonRefNull => self.read_slot_body(spec, None),
            RefFlag::NonRef => {
                // Mirror of the writer's id allocation: reserve first.
                let id = self.refs.reserve();
                self.read_slot_body(spec, Some(id))
            }
        }
    }

    fn finish(&mut self, track: Option<u32>, value: Value) -> Value {
        if let Some(id) = track {
            self.refs.fill(id, value.clone());
        }
        value
    }

    fn read_slot_body(&mut self, spec: &TypeSpec, track: Option<u32>) -> Result<Value> {
        match spec {
            TypeSpec::Any => {
                let resolved = self.registry.read_type_info(self.buffer, self.strings)?;
                self.read_resolved_body(&resolved, track)
            }
            TypeSpec::String => {
                let value = self.read_string_body()?;
                Ok(self.finish(track, value))
            }
            TypeSpec::Binary => {
                let value = self.read_binary_body()?;
                Ok(self.finish(track, value))
            }
            TypeSpec::Date => {
                let value = Value::Date(Date::from_days(self.buffer.read_i32()?));
                Ok(self.finish(track, value))
            }
            TypeSpec::Timestamp => {
                let value = Value::Timestamp(Timestamp::from_millis(self.buffer.read_i64()?));
                Ok(self.finish(track, value))
            }
            TypeSpec::Duration => {
                let secs = self.buffer.read_i64()?;
                let nanos = self.buffer.read_i32()?;
                Ok(self.finish(track, Value::Duration(TimeDelta::new(secs, nanos))))
            }
            TypeSpec::List(elem) => {
                if let Some(array_id) = elem.primitive_array_id() {
                    let value = self.read_array_body(array_id)?;
                    return Ok(self.finish(track, value));
                }
                let list = Rc::new(RefCell::new(Vec::new()));
                if let Some(id) = track {
                    self.refs.fill(id, Value::List(list.clone()));
                }
                let len = self.buffer.read_varuint32()? as usize;
                for _ in 0..len {
                    let item = self.read_slot(elem)?;
                    list.borrow_mut().push(item);
                }
                Ok(Value::List(list))
            }
            TypeSpec::Set(elem) => {
                let set = Rc::new(RefCell::new(SetValue::new()));
                if let Some(id) = track {
                    self.refs.fill(id, Value::Set(set.clone()));
                }
                let len = self.buffer.read_varuint32()? as usize;
                for _ in 0..len {
                    let item = self.read_slot(elem)?;
                    set.borrow_mut().insert(item);
                }
                Ok(Value::Set(set))
            }
            TypeSpec::Map(key_spec, value_spec) => {
                let map = Rc::new(RefCell::new(MapValue::new()));
                if let Some(id) = track {
                    self.refs.fill(id, Value::Map(map.clone()));
                }
                self.read_map_body(&map, key_spec, value_spec)?;
                Ok(Value::Map(map))
            }
            TypeSpec::Named { namespace, name } => {
                let info = self.registry.lookup_by_name(namespace, name)?;
                self.read_registered_body(&info, track)
            }
            // Primitives were dispatched before the ref flag.
            other => Err(CrosswireError::TypeMismatch(format!(
                "primitive spec {other} in a flagged slot"
            ))),
        }
    }

    fn read_resolved_body(&mut self, resolved: &ResolvedType, track: Option<u32>) -> Result<Value> {
        match resolved {
            ResolvedType::Builtin(id) => self.read_builtin_body(*id, track),
            ResolvedType::Registered(info) => self.read_registered_body(info, track),
        }
    }

    fn read_builtin_body(&mut self, id: TypeId, track: Option<u32>) -> Result<Value> {
        let value = match id {
            types::BOOL => Value::Bool(self.buffer.read_bool()?),
            types::INT8 => Value::Int8(self.buffer.read_i8()?),
            types::INT16 => Value::Int16(self.buffer.read_i16()?),
            types::INT32 => Value::Int32(self.buffer.read_i32()?),
            types::VAR_INT32 => Value::Int32(self.buffer.read_varint32()?),
            types::INT64 => Value::Int64(self.buffer.read_i64()?),
            types::VAR_INT64 => Value::Int64(self.buffer.read_varint64()?),
            types::SLI_INT64 => Value::Int64(read_sli_int64(self.buffer)?),
            types::FLOAT32 => Value::Float32(self.buffer.read_f32()?),
            types::FLOAT64 => Value::Float64(self.buffer.read_f64()?),
            types::STRING => self.read_string_body()?,
            types::BINARY => self.read_binary_body()?,
            types::LOCAL_DATE => Value::Date(Date::from_days(self.buffer.read_i32()?)),
            types::TIMESTAMP => Value::Timestamp(Timestamp::from_millis(self.buffer.read_i64()?)),
            types::DURATION => {
                let secs = self.buffer.read_i64()?;
                let nanos = self.buffer.read_i32()?;
                Value::Duration(TimeDelta::new(secs, nanos))
            }
            types::LIST => {
                let list = Rc::new(RefCell::new(Vec::new()));
                if let Some(id) = track {
                    self.refs.fill(id, Value::List(list.clone()));
                }
                let len = self.buffer.read_varuint32()? as usize;
                for _ in 0..len {
                    let item = self.read_slot(&TypeSpec::Any)?;
                    list.borrow_mut().push(item);
                }
                return Ok(Value::List(list));
            }
            types::SET => {
                let set = Rc::new(RefCell::new(SetValue::new()));
                if let Some(id) = track {
                    self.refs.fill(id, Value::Set(set.clone()));
                }
                let len = self.buffer.read_varuint32()? as usize;
                for _ in 0..len {
                    let item = self.read_slot(&TypeSpec::Any)?;
                    set.borrow_mut().insert(item);
                }
                return Ok(Value::Set(set));
            }
            types::MAP => {
                let map = Rc::new(RefCell::new(MapValue::new()));
                if let Some(id) = track {
                    self.refs.fill(id, Value::Map(map.clone()));
                }
                self.read_map_body(&map, &TypeSpec::Any, &TypeSpec::Any)?;
                return Ok(Value::Map(map));
            }
            types::BOOL_ARRAY
            | types::INT8_ARRAY
            | types::INT16_ARRAY
            | types::INT32_ARRAY
            | types::INT64_ARRAY
            | types::FLOAT32_ARRAY
            | types::FLOAT64_ARRAY => self.read_array_body(id)?,
            types::COMPATIBLE_STRUCT => {
                return Err(CrosswireError::TypeMismatch(
                    "compatible struct encoding is not supported by this codec".into(),
                ))
            }
            types::HALF_FLOAT | types::DECIMAL128 | types::ARRAY | types::FLOAT16_ARRAY => {
                return Err(CrosswireError::TypeMismatch(format!(
                    "wire type id {id} has no value form in this codec"
                )))
            }
            // ENUM/STRUCT/EXT need registry context a bare id cannot supply.
            other => return Err(CrosswireError::UnregisteredType(format!("type id {other}"))),
        };
        Ok(self.finish(track, value))
    }

    fn read_registered_body(&mut self, info: &TypeInfo, track: Option<u32>) -> Result<Value> {
        match &info.kind {
            TypeKind::Struct(schema) => {
                let shell = Rc::new(RefCell::new(StructValue::new(schema.clone())));
                if let Some(id) = track {
                    self.refs.fill(id, Value::Struct(shell.clone()));
                }
                for index in 0..schema.fields.len() {
                    let value = self.read_slot(&schema.fields[index].spec)?;
                    shell.borrow_mut().fields[index] = value;
                }
                Ok(Value::Struct(shell))
            }
            TypeKind::Enum(schema) => {
                let ordinal = self.buffer.read_varuint32()?;
                let value = Value::Enum(EnumValue::new(schema.clone(), ordinal)?);
                Ok(self.finish(track, value))
            }
            TypeKind::Ext { codec, key } => {
                let data = codec.read(self.buffer)?;
                let value = Value::Ext(ExtValue::new(key.clone(), data));
                Ok(self.finish(track, value))
            }
        }
    }

    fn read_primitive_body(&mut self, spec: &TypeSpec) -> Result<Value> {
        Ok(match spec {
            TypeSpec::Bool => Value::Bool(self.buffer.read_bool()?),
            TypeSpec::Int8 => Value::Int8(self.buffer.read_i8()?),
            TypeSpec::Int16 => Value::Int16(self.buffer.read_i16()?),
            TypeSpec::Int32 => Value::Int32(self.buffer.read_i32()?),
            TypeSpec::VarInt32 => Value::Int32(self.buffer.read_varint32()?),
            TypeSpec::Int64 => Value::Int64(self.buffer.read_i64()?),
            TypeSpec::VarInt64 => Value::Int64(self.buffer.read_varint64()?),
            TypeSpec::SliInt64 => Value::Int64(read_sli_int64(self.buffer)?),
            TypeSpec::Float32 => Value::Float32(self.buffer.read_f32()?),
            TypeSpec::Float64 => Value::Float64(self.buffer.read_f64()?),
            other => {
                return Err(CrosswireError::TypeMismatch(format!(
                    "{other} is not a primitive spec"
                )))
            }
        })
    }

    fn read_string_body(&mut self) -> Result<Value> {
        let header = self.buffer.read_varuint64()?;
        let len = (header >> 2) as usize;
        let encoding = header & 0b11;
        let bytes = self.buffer.read_bytes(len)?;
        let s = match encoding {
            types::STRING_LATIN1 => bytes.iter().map(|&b| b as char).collect(),
            types::STRING_UTF16LE => {
                if len % 2 != 0 {
                    return Err(CrosswireError::InvalidUtf8(format!(
                        "odd UTF-16 payload length {len}"
                    )));
                }
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16(&units)
                    .map_err(|e| CrosswireError::InvalidUtf8(e.to_string()))?
            }
            types::STRING_UTF8 => std::str::from_utf8(bytes)
                .map_err(|e| CrosswireError::InvalidUtf8(e.to_string()))?
                .to_owned(),
            other => {
                return Err(CrosswireError::InvalidUtf8(format!(
                    "unknown string encoding {other}"
                )))
            }
        };
        Ok(Value::String(Rc::new(s)))
    }

    fn read_binary_body(&mut self) -> Result<Value> {
        if let Some(cursor) = self.oob.as_mut() {
            let in_band = self.buffer.read_u8()? != 0;
            if !in_band {
                let payload = cursor.buffers.get(cursor.next).cloned().ok_or_else(|| {
                    CrosswireError::from(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "stream references an out-of-band buffer that was not supplied",
                    ))
                })?;
                cursor.next += 1;
                return Ok(Value::Binary(payload));
            }
        }
        let bytes = self.buffer.read_length_prefixed_bytes()?.to_vec();
        Ok(Value::Binary(Rc::new(bytes)))
    }

    fn read_array_body(&mut self, id: TypeId) -> Result<Value> {
        let len = self.buffer.read_varuint32()? as usize;
        Ok(match id {
            types::BOOL_ARRAY => {
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(self.buffer.read_bool()?);
                }
                Value::BoolArray(Rc::new(items))
            }
            types::INT8_ARRAY => {
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(self.buffer.read_i8()?);
                }
                Value::Int8Array(Rc::new(items))
            }
            types::INT16_ARRAY => {
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(self.buffer.read_i16()?);
                }
                Value::Int16Array(Rc::new(items))
            }
            types::INT32_ARRAY => {
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(self.buffer.read_i32()?);
                }
                Value::Int32Array(Rc::new(items))
            }
            types::INT64_ARRAY => {
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(self.buffer.read_i64()?);
                }
                Value::Int64Array(Rc::new(items))
            }
            types::FLOAT32_ARRAY => {
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(self.buffer.read_f32()?);
                }
                Value::Float32Array(Rc::new(items))
            }
            types::FLOAT64_ARRAY => {
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(self.buffer.read_f64()?);
                }
                Value::Float64Array(Rc::new(items))
            }
            other => {
                return Err(CrosswireError::TypeMismatch(format!(
                    "wire type id {other} is not a packed array"
                )))
            }
        })
    }

    // --- CHUNKED MAPS ---

    fn read_map_body(
        &mut self,
        shell: &Rc<RefCell<MapValue>>,
        key_spec: &TypeSpec,
        value_spec: &TypeSpec,
    ) -> Result<()> {
        loop {
            let size = self.buffer.read_u8()?;
            if size == 0 {
                return Ok(());
            }
            let flags = self.buffer.read_u8()?;
            let key_header = if flags & types::KEY_DECL_TYPE != 0 {
                Some(self.registry.read_type_info(self.buffer, self.strings)?)
            } else {
                None
            };
            let value_header = if flags & types::VALUE_DECL_TYPE != 0 {
                Some(self.registry.read_type_info(self.buffer, self.strings)?)
            } else {
                None
            };
            let key_flagged = flags & (types::TRACKING_KEY_REF | types::KEY_HAS_NULL) != 0;
            let value_flagged = flags & (types::TRACKING_VALUE_REF | types::VALUE_HAS_NULL) != 0;

            for _ in 0..size {
                let key = self.read_map_slot(key_spec, key_header.as_ref(), key_flagged)?;
                let value = self.read_map_slot(value_spec, value_header.as_ref(), value_flagged)?;
                shell.borrow_mut().insert(key, value);
            }
        }
    }

    fn read_map_slot(
        &mut self,
        spec: &TypeSpec,
        header: Option<&ResolvedType>,
        flagged: bool,
    ) -> Result<Value> {
        if !flagged {
            return self.read_map_slot_body(spec, header, None);
        }
        match RefFlag::from_byte(self.buffer.read_u8()?)? {
            RefFlag::Null => Ok(Value::Null),
            RefFlag::Ref => {
                let id = self.buffer.read_varuint32()?;
                self.refs.resolve(id)
            }
            RefFlag::NonRefNull => self.read_map_slot_body(spec, header, None),
            RefFlag::NonRef => {
                let id = self.refs.reserve();
                self.read_map_slot_body(spec, header, Some(id))
            }
        }
    }

    fn read_map_slot_body(
        &mut self,
        spec: &TypeSpec,
        header: Option<&ResolvedType>,
        track: Option<u32>,
    ) -> Result<Value> {
        if let Some(resolved) = header {
            return self.read_resolved_body(resolved, track);
        }
        let spec = spec.strip_ptr();
        if spec.is_primitive() {
            return self.read_primitive_body(spec);
        }
        self.read_slot_body(spec, track)
    }
}

/// Inverse of [`crate::writer::write_sli_int64`]; the first byte's LSB picks
/// the form and the 4-byte form sign-extends by arithmetic shift.
pub(crate) fn read_sli_int64(buffer: &mut ByteBuffer) -> Result<i64> {
    if buffer.peek_u8()? & 1 == 0 {
        let raw = buffer.read_i32()?;
        Ok((raw >> 1) as i64)
    } else {
        buffer.read_u8()?;
        buffer.read_i64()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::writer::write_sli_int64;

    #[test]
    fn sli_roundtrip_across_both_forms() {
        for v in [
            0i64,
            1,
            -1,
            (1 << 30) - 1,
            -(1 << 30),
            1 << 30,
            -(1 << 30) - 1,
            i64::MAX,
            i64::MIN,
        ] {
            let mut buf = ByteBuffer::new();
            write_sli_int64(&mut buf, v);
            assert_eq!(read_sli_int64(&mut buf).unwrap(), v, "value {v}");
            assert_eq!(buf.remaining(), 0);
        }
    }

    #[test]
    fn utf16le_payloads_are_accepted() {
        let mut buf = ByteBuffer::new();
        let units: Vec<u8> = "été"
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect();
        buf.write_varuint64(((units.len() as u64) << 2) | types::STRING_UTF16LE);
        buf.write_bytes(&units);

        let registry = TypeRegistry::new();
        let mut refs = RefReader::default();
        let mut strings = MetaStringReaderState::default();
        let mut reader = Reader::new(&mut buf, &registry, &mut refs, &mut strings, None);
        assert_eq!(reader.read_string_body().unwrap(), Value::str("été"));
    }
}
