//! The codec entry point: framing, session lifecycle, configuration.
//!
//! [`Crosswire`] owns the per-session state (reference ids, metastring
//! interning) and the configuration (registry handle, reference tracking,
//! recursion limit). One instance handles one serialize or deserialize call
//! at a time; the `&mut self` receivers encode that rule in the type
//! system; for concurrency, create one instance per thread and share the
//! registry.
//!
//! ## Stream framing
//!
//! ```text
//! stream := magic(2) flags(1) root_value
//! magic  := 0xD4 0x62                  // little-endian u16 0x62D4
//! flags  := bit0 = xlang, bit1 = ref tracking, bit2..7 reserved
//! ```
//!
//! After the root value the reader must sit exactly at the writer cursor or
//! the call fails with [`CrosswireError::TrailingBytes`].
//!
//! ## Session lifecycle
//!
//! Session state is reset on **every** exit path, success or failure, so a
//! failed call never leaks reference ids or interned fragments into the next
//! one and the instance is immediately reusable. The reset clears the session
//! maps without dropping their allocations.

use crate::buffer::ByteBuffer;
use crate::constants;
use crate::error::{CrosswireError, Result};
use crate::metastring::{MetaStringReaderState, MetaStringWriterState};
use crate::reader::Reader;
use crate::refs::{RefReader, RefWriter};
use crate::resolver::TypeRegistry;
use crate::schema::{EnumSchema, ExtCodec, StructSchema};
use crate::types::TypeId;
use crate::value::Value;
use crate::writer::{OobSink, Writer};
use std::rc::Rc;
use std::sync::Arc;

/// The cross-language codec.
///
/// ```
/// use crosswire::{ByteBuffer, Crosswire, Value};
///
/// let mut codec = Crosswire::default();
/// let mut buffer = ByteBuffer::new();
/// codec.serialize(&mut buffer, &Value::str("hello"))?;
/// let back = codec.deserialize(&mut buffer)?;
/// assert_eq!(back, Value::str("hello"));
/// # Ok::<(), crosswire::CrosswireError>(())
/// ```
#[derive(Debug)]
pub struct Crosswire {
    registry: Arc<TypeRegistry>,
    ref_tracking: bool,
    recursion_limit: usize,
    write_refs: RefWriter,
    write_strings: MetaStringWriterState,
    read_refs: RefReader,
    read_strings: MetaStringReaderState,
}

impl Default for Crosswire {
    /// A codec over the process-wide default registry, with reference
    /// tracking enabled.
    fn default() -> Self {
        Self {
            registry: TypeRegistry::global(),
            ref_tracking: true,
            recursion_limit: constants::DEFAULT_RECURSION_LIMIT,
            write_refs: RefWriter::default(),
            write_strings: MetaStringWriterState::default(),
            read_refs: RefReader::default(),
            read_strings: MetaStringReaderState::default(),
        }
    }
}

impl Crosswire {
    /// Starts configuring a codec.
    pub fn builder() -> Self {
        Self::default()
    }

    /// Enables or disables reference tracking.
    ///
    /// With tracking off, shared objects are written once per occurrence and
    /// cyclic graphs are a caller error caught by the recursion limit.
    pub fn ref_tracking(mut self, enable: bool) -> Self {
        self.ref_tracking = enable;
        self
    }

    /// Caps the value-graph depth while reference tracking is off.
    pub fn recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Uses an isolated registry instead of the process-wide default.
    pub fn with_registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// The registry this codec resolves types against.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    // --- REGISTRATION PASSTHROUGHS ---

    /// Registers a struct schema under a raw wire id.
    /// See [`TypeRegistry::register_struct`].
    pub fn register_struct(&self, schema: StructSchema, id: TypeId) -> Result<Arc<StructSchema>> {
        self.registry.register_struct(schema, id)
    }

    /// Registers a struct schema under its (namespace, name) identity.
    /// See [`TypeRegistry::register_struct_by_name`].
    pub fn register_struct_by_name(&self, schema: StructSchema) -> Result<Arc<StructSchema>> {
        self.registry.register_struct_by_name(schema)
    }

    /// Registers an enum schema under a raw wire id.
    pub fn register_enum(&self, schema: EnumSchema, id: TypeId) -> Result<Arc<EnumSchema>> {
        self.registry.register_enum(schema, id)
    }

    /// Registers an enum schema under its (namespace, name) identity.
    pub fn register_enum_by_name(&self, schema: EnumSchema) -> Result<Arc<EnumSchema>> {
        self.registry.register_enum_by_name(schema)
    }

    /// Registers an ext codec under a raw wire id, replacing any previous
    /// codec for the id.
    pub fn register_ext(&self, id: TypeId, codec: Arc<dyn ExtCodec>) -> Result<()> {
        self.registry.register_ext(id, codec)
    }

    /// Registers an ext codec under a (namespace, name) identity, replacing
    /// any previous codec for the name.
    pub fn register_ext_by_name(
        &self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        codec: Arc<dyn ExtCodec>,
    ) -> Result<()> {
        self.registry.register_ext_by_name(namespace, name, codec)
    }

    // --- SERIALIZATION ---

    /// Serializes a value graph into the buffer.
    pub fn serialize(&mut self, buffer: &mut ByteBuffer, value: &Value) -> Result<()> {
        let result = self.serialize_inner(buffer, value, None);
        self.reset_write_state();
        result
    }

    /// Serializes with out-of-band binary extraction.
    ///
    /// The sink sees every binary payload in stream order. Returning `true`
    /// keeps the bytes in-band; returning `false` leaves a placeholder and
    /// makes the caller responsible for transporting the payload to the
    /// matching [`Crosswire::deserialize_with_oob`] call.
    pub fn serialize_with_oob(
        &mut self,
        buffer: &mut ByteBuffer,
        value: &Value,
        mut sink: impl FnMut(Rc<Vec<u8>>) -> bool,
    ) -> Result<()> {
        let result = self.serialize_inner(buffer, value, Some(&mut sink));
        self.reset_write_state();
        result
    }

    fn serialize_inner(
        &mut self,
        buffer: &mut ByteBuffer,
        value: &Value,
        oob: Option<&mut OobSink<'_>>,
    ) -> Result<()> {
        buffer.write_u16(constants::MAGIC);
        let mut flags = constants::FLAG_XLANG;
        if self.ref_tracking {
            flags |= constants::FLAG_REF_TRACKING;
        }
        buffer.write_u8(flags);

        let mut writer = Writer::new(
            buffer,
            &self.registry,
            &mut self.write_refs,
            &mut self.write_strings,
            self.ref_tracking,
            self.recursion_limit,
            oob,
        );
        writer.write_root(value)
    }

    /// Deserializes one value graph from the buffer.
    pub fn deserialize(&mut self, buffer: &mut ByteBuffer) -> Result<Value> {
        let result = self.deserialize_inner(buffer, None);
        self.reset_read_state();
        result
    }

    /// Deserializes a stream produced by [`Crosswire::serialize_with_oob`],
    /// resolving placeholders from `oob_buffers` in stream order.
    pub fn deserialize_with_oob(
        &mut self,
        buffer: &mut ByteBuffer,
        oob_buffers: &[Rc<Vec<u8>>],
    ) -> Result<Value> {
        let result = self.deserialize_inner(buffer, Some(oob_buffers));
        self.reset_read_state();
        result
    }

    fn deserialize_inner(
        &mut self,
        buffer: &mut ByteBuffer,
        oob_buffers: Option<&[Rc<Vec<u8>>]>,
    ) -> Result<Value> {
        let magic = buffer.read_u16().map_err(|_| CrosswireError::BadMagic)?;
        if magic != constants::MAGIC {
            return Err(CrosswireError::BadMagic);
        }
        let flags = buffer.read_u8()?;
        if flags & !(constants::FLAG_XLANG | constants::FLAG_REF_TRACKING) != 0
            || flags & constants::FLAG_XLANG == 0
        {
            return Err(CrosswireError::UnsupportedVersion(flags));
        }

        let mut reader = Reader::new(
            buffer,
            &self.registry,
            &mut self.read_refs,
            &mut self.read_strings,
            oob_buffers,
        );
        let value = reader.read_root()?;
        if buffer.remaining() != 0 {
            return Err(CrosswireError::TrailingBytes(buffer.remaining()));
        }
        Ok(value)
    }

    /// Serializes into a fresh byte vector.
    pub fn to_bytes(&mut self, value: &Value) -> Result<Vec<u8>> {
        let mut buffer = ByteBuffer::new();
        self.serialize(&mut buffer, value)?;
        Ok(buffer.into_vec())
    }

    /// Deserializes from a byte slice.
    pub fn from_bytes(&mut self, bytes: &[u8]) -> Result<Value> {
        let mut buffer = ByteBuffer::from_vec(bytes.to_vec());
        self.deserialize(&mut buffer)
    }

    fn reset_write_state(&mut self) {
        self.write_refs.reset();
        self.write_strings.reset();
    }

    fn reset_read_state(&mut self) {
        self.read_refs.reset();
        self.read_strings.reset();
    }
}
