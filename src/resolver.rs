//! The type registry and type-header codec (C4).
//!
//! The registry owns every caller registration (struct schemas, enum
//! schemas, ext codecs) and the machinery that turns them into wire type
//! headers: namespace/name metastring encoding, auto-id allocation for
//! unregistered structs, and the two-level named lookup on the read side.
//!
//! ## Sharing model
//!
//! A [`TypeRegistry`] is a configurable owned object: codec instances borrow
//! it through an `Arc` and may share one registry across threads.
//! Registrations are a startup-phase activity guarded by the inner exclusive
//! lock; steady-state lookups are read-locked. A process-wide default
//! registry is available behind a write-once initializer for callers who do
//! not need registry isolation.
//!
//! ## Named lookup
//!
//! Reading a named type header first tries the composite
//! `(namespace_hashcode, name_hashcode)` key, which requires no fragment
//! decoding. On a miss the fragments are decoded to strings and the
//! `(namespace, name)` key is tried; a hit backfills the composite cache so
//! the next stream takes the fast path. A miss on both is
//! [`CrosswireError::UnregisteredType`] carrying the decoded name.

use crate::buffer::ByteBuffer;
use crate::error::{CrosswireError, Result};
use crate::metastring::{
    MetaStringBytes, MetaStringDecoder, MetaStringEncoder, MetaStringReaderState,
    MetaStringWriterState,
};
use crate::schema::{EnumSchema, ExtCodec, StructSchema};
use crate::types::{self, TypeId};
use crate::value::ExtKey;
use rustc_hash::FxHashMap;
use std::hash::Hasher;
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};
use twox_hash::XxHash64;

/// What a registration describes.
#[derive(Debug, Clone)]
pub enum TypeKind {
    /// A user struct with a registered field schema.
    Struct(Arc<StructSchema>),
    /// A user enum with a registered variant list.
    Enum(Arc<EnumSchema>),
    /// A caller-supplied ext codec plus the key it was registered under.
    Ext {
        /// The codec that owns the payload layout.
        codec: Arc<dyn ExtCodec>,
        /// The registration key, reattached to values on read.
        key: ExtKey,
    },
}

impl TypeKind {
    fn tag(&self) -> u8 {
        match self {
            Self::Struct(_) => 0,
            Self::Enum(_) => 1,
            Self::Ext { .. } => 2,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Struct(_) => "struct",
            Self::Enum(_) => "enum",
            Self::Ext { .. } => "ext",
        }
    }
}

/// One registered type: its kind, wire id, interned name fragments, and a
/// process-local identity hash.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    /// What the registration describes.
    pub kind: TypeKind,
    /// Wire id written in type headers. For named registrations this is the
    /// NAMED family constant; for by-id registrations the caller's raw id.
    /// Negative after pointer-polarity reconciliation on the read side.
    pub type_id: TypeId,
    /// Registry-internal id: the caller's raw id, or an auto-assigned id
    /// (>= 300) for types discovered during serialization.
    pub local_id: TypeId,
    /// Interned namespace fragment; present iff the type is named.
    pub namespace_bytes: Option<Arc<MetaStringBytes>>,
    /// Interned name fragment; present iff the type is named.
    pub name_bytes: Option<Arc<MetaStringBytes>>,
    /// Whether this info was reconciled from a pointer-polarity header.
    pub is_dynamic: bool,
    /// Stable under (namespace, name, kind). Process-local only.
    pub hash: u64,
}

impl TypeInfo {
    /// The `namespace.Name` form used in diagnostics.
    pub fn qualified_name(&self) -> String {
        match &self.kind {
            TypeKind::Struct(s) => s.qualified_name(),
            TypeKind::Enum(e) => e.qualified_name(),
            TypeKind::Ext { key, .. } => key.to_string(),
        }
    }

    /// Copy of this info with the polarity observed on the wire applied.
    fn with_polarity(&self, raw_id: TypeId) -> TypeInfo {
        let mut info = self.clone();
        if raw_id < 0 {
            info.type_id = raw_id;
            info.is_dynamic = true;
        }
        info
    }
}

/// Result of reading one type header.
#[derive(Debug, Clone)]
pub enum ResolvedType {
    /// One of the fixed wire vocabulary ids (1-37); the value serializers
    /// decode the body directly.
    Builtin(TypeId),
    /// A registered user type.
    Registered(TypeInfo),
}

fn type_hash(namespace: &str, name: &str, kind_tag: u8) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(namespace.as_bytes());
    hasher.write(name.as_bytes());
    hasher.write(&[kind_tag]);
    hasher.finish()
}

#[derive(Debug, Default)]
struct RegistryInner {
    by_id: FxHashMap<TypeId, TypeInfo>,
    by_name: FxHashMap<(String, String), TypeInfo>,
    // Composite metastring-hashcode key, backfilled on first named lookup.
    by_hash: FxHashMap<(u64, u64), TypeInfo>,
    next_auto_id: TypeId,
}

/// The process- or instance-scoped table of registered types.
#[derive(Debug)]
pub struct TypeRegistry {
    inner: RwLock<RegistryInner>,
    namespace_encoder: MetaStringEncoder,
    namespace_decoder: MetaStringDecoder,
    typename_encoder: MetaStringEncoder,
    typename_decoder: MetaStringDecoder,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_REGISTRY: OnceLock<Arc<TypeRegistry>> = OnceLock::new();

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                next_auto_id: types::AUTO_TYPE_ID_BASE,
                ..RegistryInner::default()
            }),
            // Namespace fragments separate on '.'; type names on '$'.
            // Peer implementations use the same pairs.
            namespace_encoder: MetaStringEncoder::new('.', '_'),
            namespace_decoder: MetaStringDecoder::new('.', '_'),
            typename_encoder: MetaStringEncoder::new('$', '_'),
            typename_decoder: MetaStringDecoder::new('$', '_'),
        }
    }

    /// The process-wide default registry.
    pub fn global() -> Arc<TypeRegistry> {
        GLOBAL_REGISTRY
            .get_or_init(|| Arc::new(TypeRegistry::new()))
            .clone()
    }

    fn read_inner(&self) -> RwLockReadGuard<'_, RegistryInner> {
        // Lock poisoning requires a panic, and the crate denies panics;
        // recover the guard regardless.
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_inner(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn encode_name(&self, namespace: &str, name: &str) -> (Arc<MetaStringBytes>, Arc<MetaStringBytes>) {
        (
            Arc::new(self.namespace_encoder.encode(namespace)),
            Arc::new(self.typename_encoder.encode(name)),
        )
    }

    fn build_named_info(&self, kind: TypeKind, type_id: TypeId, local_id: TypeId, namespace: &str, name: &str) -> TypeInfo {
        let (ns_bytes, name_bytes) = self.encode_name(namespace, name);
        let hash = type_hash(namespace, name, kind.tag());
        TypeInfo {
            kind,
            type_id,
            local_id,
            namespace_bytes: Some(ns_bytes),
            name_bytes: Some(name_bytes),
            is_dynamic: false,
            hash,
        }
    }

    fn check_id_free(inner: &RegistryInner, id: TypeId, what: &str) -> Result<()> {
        if id <= types::FLOAT64_ARRAY {
            return Err(CrosswireError::AlreadyRegistered(format!(
                "id {id} is reserved for the wire vocabulary"
            )));
        }
        if id == types::TYPE_TAG {
            return Err(CrosswireError::AlreadyRegistered(format!(
                "id {id} is an internal sentinel"
            )));
        }
        if let Some(existing) = inner.by_id.get(&id) {
            return Err(CrosswireError::AlreadyRegistered(format!(
                "{what} id {id} is taken by {} {}",
                existing.kind.label(),
                existing.qualified_name()
            )));
        }
        Ok(())
    }

    fn check_name_free(inner: &RegistryInner, namespace: &str, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(CrosswireError::TypeMismatch(
                "type name must not be empty".into(),
            ));
        }
        if inner
            .by_name
            .contains_key(&(namespace.to_owned(), name.to_owned()))
        {
            let qualified = if namespace.is_empty() {
                name.to_owned()
            } else {
                format!("{namespace}.{name}")
            };
            return Err(CrosswireError::AlreadyRegistered(qualified));
        }
        Ok(())
    }

    fn insert(inner: &mut RegistryInner, info: TypeInfo) {
        let namespace;
        let name;
        match &info.kind {
            TypeKind::Struct(s) => {
                namespace = s.namespace.clone();
                name = s.name.clone();
            }
            TypeKind::Enum(e) => {
                namespace = e.namespace.clone();
                name = e.name.clone();
            }
            TypeKind::Ext { key, .. } => match key {
                ExtKey::Named {
                    namespace: ns,
                    name: n,
                } => {
                    namespace = ns.clone();
                    name = n.clone();
                }
                ExtKey::Id(_) => {
                    namespace = String::new();
                    name = String::new();
                }
            },
        }
        if !name.is_empty() {
            if let (Some(ns_bytes), Some(name_bytes)) =
                (&info.namespace_bytes, &info.name_bytes)
            {
                inner
                    .by_hash
                    .insert((ns_bytes.hashcode, name_bytes.hashcode), info.clone());
            }
            inner.by_name.insert((namespace, name), info.clone());
        }
        inner.by_id.insert(info.local_id, info);
    }

    // --- REGISTRATION API ---

    /// Registers a struct schema under a raw wire id.
    pub fn register_struct(&self, schema: StructSchema, id: TypeId) -> Result<Arc<StructSchema>> {
        let mut inner = self.write_inner();
        Self::check_id_free(&inner, id, "struct")?;
        Self::check_name_free(&inner, &schema.namespace, &schema.name)?;
        let schema = Arc::new(schema);
        let info = self.build_named_info(
            TypeKind::Struct(schema.clone()),
            id,
            id,
            &schema.namespace,
            &schema.name,
        );
        Self::insert(&mut inner, info);
        Ok(schema)
    }

    /// Registers a struct schema under its (namespace, name) identity. An
    /// empty namespace is the default namespace.
    pub fn register_struct_by_name(&self, schema: StructSchema) -> Result<Arc<StructSchema>> {
        let mut inner = self.write_inner();
        Self::check_name_free(&inner, &schema.namespace, &schema.name)?;
        let local_id = inner.next_auto_id;
        inner.next_auto_id += 1;
        let schema = Arc::new(schema);
        let info = self.build_named_info(
            TypeKind::Struct(schema.clone()),
            types::NAMED_STRUCT,
            local_id,
            &schema.namespace,
            &schema.name,
        );
        Self::insert(&mut inner, info);
        Ok(schema)
    }

    /// Registers an enum schema under a raw wire id.
    pub fn register_enum(&self, schema: EnumSchema, id: TypeId) -> Result<Arc<EnumSchema>> {
        let mut inner = self.write_inner();
        Self::check_id_free(&inner, id, "enum")?;
        Self::check_name_free(&inner, &schema.namespace, &schema.name)?;
        let schema = Arc::new(schema);
        let info = self.build_named_info(
            TypeKind::Enum(schema.clone()),
            id,
            id,
            &schema.namespace,
            &schema.name,
        );
        Self::insert(&mut inner, info);
        Ok(schema)
    }

    /// Registers an enum schema under its (namespace, name) identity.
    pub fn register_enum_by_name(&self, schema: EnumSchema) -> Result<Arc<EnumSchema>> {
        let mut inner = self.write_inner();
        Self::check_name_free(&inner, &schema.namespace, &schema.name)?;
        let local_id = inner.next_auto_id;
        inner.next_auto_id += 1;
        let schema = Arc::new(schema);
        let info = self.build_named_info(
            TypeKind::Enum(schema.clone()),
            types::NAMED_ENUM,
            local_id,
            &schema.namespace,
            &schema.name,
        );
        Self::insert(&mut inner, info);
        Ok(schema)
    }

    /// Registers an ext codec under a raw wire id, replacing any previous
    /// codec for that id.
    pub fn register_ext(&self, id: TypeId, codec: Arc<dyn ExtCodec>) -> Result<()> {
        let mut inner = self.write_inner();
        if let Some(existing) = inner.by_id.get(&id) {
            if !matches!(existing.kind, TypeKind::Ext { .. }) {
                return Err(CrosswireError::AlreadyRegistered(format!(
                    "ext id {id} is taken by {} {}",
                    existing.kind.label(),
                    existing.qualified_name()
                )));
            }
        } else {
            Self::check_id_free(&inner, id, "ext")?;
        }
        let info = TypeInfo {
            kind: TypeKind::Ext {
                codec,
                key: ExtKey::Id(id),
            },
            type_id: id,
            local_id: id,
            namespace_bytes: None,
            name_bytes: None,
            is_dynamic: false,
            hash: type_hash("", "", 2),
        };
        inner.by_id.insert(id, info);
        Ok(())
    }

    /// Registers an ext codec under a (namespace, name) identity, replacing
    /// any previous codec for that name.
    pub fn register_ext_by_name(
        &self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        codec: Arc<dyn ExtCodec>,
    ) -> Result<()> {
        let namespace = namespace.into();
        let name = name.into();
        if name.is_empty() {
            return Err(CrosswireError::TypeMismatch(
                "type name must not be empty".into(),
            ));
        }
        let mut inner = self.write_inner();
        let key = (namespace.clone(), name.clone());
        let mut reused_id = None;
        if let Some(existing) = inner.by_name.get(&key) {
            if !matches!(existing.kind, TypeKind::Ext { .. }) {
                return Err(CrosswireError::AlreadyRegistered(format!(
                    "name {}.{} is taken by a {}",
                    namespace,
                    name,
                    existing.kind.label()
                )));
            }
            // Replacement keeps the previous local id.
            reused_id = Some(existing.local_id);
        }
        let local_id = match reused_id {
            Some(id) => id,
            None => {
                let id = inner.next_auto_id;
                inner.next_auto_id += 1;
                id
            }
        };
        let info = self.build_named_info(
            TypeKind::Ext {
                codec,
                key: ExtKey::Named {
                    namespace: namespace.clone(),
                    name: name.clone(),
                },
            },
            types::NAMED_EXT,
            local_id,
            &namespace,
            &name,
        );
        // Replacement path: insert directly, skipping the duplicate check.
        if let (Some(ns_bytes), Some(name_bytes)) = (&info.namespace_bytes, &info.name_bytes) {
            inner
                .by_hash
                .insert((ns_bytes.hashcode, name_bytes.hashcode), info.clone());
        }
        inner.by_name.insert(key, info.clone());
        inner.by_id.insert(local_id, info);
        Ok(())
    }

    // --- WRITE-SIDE LOOKUP ---

    /// Resolves the registration of a struct value's schema, auto-assigning
    /// an id when the schema was never registered (named-struct family,
    /// matched by name on the peer side).
    pub(crate) fn info_for_struct(&self, schema: &Arc<StructSchema>) -> Result<TypeInfo> {
        {
            let inner = self.read_inner();
            if let Some(info) = inner
                .by_name
                .get(&(schema.namespace.clone(), schema.name.clone()))
            {
                return Self::check_struct_registration(info, schema).map(|_| info.clone());
            }
        }
        // First sighting: register on the fly.
        let mut inner = self.write_inner();
        // A racing serialize on another instance may have won.
        if let Some(info) = inner
            .by_name
            .get(&(schema.namespace.clone(), schema.name.clone()))
        {
            return Self::check_struct_registration(info, schema).map(|_| info.clone());
        }
        if schema.name.is_empty() {
            return Err(CrosswireError::TypeMismatch(
                "anonymous structs must be registered explicitly".into(),
            ));
        }
        let local_id = inner.next_auto_id;
        inner.next_auto_id += 1;
        let info = self.build_named_info(
            TypeKind::Struct(schema.clone()),
            types::NAMED_STRUCT,
            local_id,
            &schema.namespace,
            &schema.name,
        );
        Self::insert(&mut inner, info.clone());
        Ok(info)
    }

    fn check_struct_registration(info: &TypeInfo, schema: &Arc<StructSchema>) -> Result<()> {
        match &info.kind {
            TypeKind::Struct(registered)
                if Arc::ptr_eq(registered, schema) || **registered == **schema =>
            {
                Ok(())
            }
            _ => Err(CrosswireError::TypeMismatch(format!(
                "value schema for {} does not match its registration",
                schema.qualified_name()
            ))),
        }
    }

    /// Resolves the registration of an enum value's schema. Enums are never
    /// auto-registered.
    pub(crate) fn info_for_enum(&self, schema: &Arc<EnumSchema>) -> Result<TypeInfo> {
        let inner = self.read_inner();
        let info = inner
            .by_name
            .get(&(schema.namespace.clone(), schema.name.clone()))
            .ok_or_else(|| CrosswireError::UnregisteredType(schema.qualified_name()))?;
        match &info.kind {
            TypeKind::Enum(_) => Ok(info.clone()),
            other => Err(CrosswireError::TypeMismatch(format!(
                "{} is registered as a {}, not an enum",
                schema.qualified_name(),
                other.label()
            ))),
        }
    }

    /// Resolves the codec registration behind an ext value.
    pub(crate) fn info_for_ext(&self, key: &ExtKey) -> Result<TypeInfo> {
        let inner = self.read_inner();
        let info = match key {
            ExtKey::Id(id) => inner.by_id.get(id),
            ExtKey::Named { namespace, name } => {
                inner.by_name.get(&(namespace.clone(), name.clone()))
            }
        }
        .ok_or_else(|| CrosswireError::UnregisteredType(key.to_string()))?;
        match &info.kind {
            TypeKind::Ext { .. } => Ok(info.clone()),
            other => Err(CrosswireError::TypeMismatch(format!(
                "{key} is registered as a {}",
                other.label()
            ))),
        }
    }

    /// Looks up a registered named type for a declared `@ns.Name` slot.
    pub(crate) fn lookup_by_name(&self, namespace: &str, name: &str) -> Result<TypeInfo> {
        let inner = self.read_inner();
        inner
            .by_name
            .get(&(namespace.to_owned(), name.to_owned()))
            .cloned()
            .ok_or_else(|| {
                CrosswireError::UnregisteredType(if namespace.is_empty() {
                    name.to_owned()
                } else {
                    format!("{namespace}.{name}")
                })
            })
    }

    // --- TYPE HEADERS ---

    /// Writes a type header: the id varint, then namespace and name
    /// metastrings for the named family.
    pub(crate) fn write_type_info(
        &self,
        buffer: &mut ByteBuffer,
        info: &TypeInfo,
        strings: &mut MetaStringWriterState,
    ) -> Result<()> {
        // Two's-complement cast, not abs: the reader recovers polarity from
        // its static context.
        buffer.write_varuint32(info.type_id as u32);
        if types::is_namespaced_type(info.type_id.unsigned_abs() as TypeId) {
            let (ns, name) = match (&info.namespace_bytes, &info.name_bytes) {
                (Some(ns), Some(name)) => (ns, name),
                _ => {
                    return Err(CrosswireError::TypeMismatch(format!(
                        "named type {} has no interned name fragments",
                        info.qualified_name()
                    )))
                }
            };
            strings.write(buffer, ns);
            strings.write(buffer, name);
        }
        Ok(())
    }

    /// Reads a type header and resolves it against the registry.
    pub(crate) fn read_type_info(
        &self,
        buffer: &mut ByteBuffer,
        strings: &mut MetaStringReaderState,
    ) -> Result<ResolvedType> {
        let raw_id = buffer.read_varuint32()? as i32;
        let id = raw_id.unsigned_abs() as TypeId;

        if types::is_namespaced_type(id) {
            let ns_bytes = strings.read(buffer)?;
            let name_bytes = strings.read(buffer)?;

            if id == types::NAMED_COMPATIBLE_STRUCT {
                return Err(CrosswireError::TypeMismatch(
                    "compatible struct encoding is not supported by this codec".into(),
                ));
            }

            // 1. Fast path: composite hashcode key.
            {
                let inner = self.read_inner();
                if let Some(info) = inner
                    .by_hash
                    .get(&(ns_bytes.hashcode, name_bytes.hashcode))
                {
                    return Ok(ResolvedType::Registered(info.with_polarity(raw_id)));
                }
            }

            // 2. Slow path: decode fragments, look up by name, backfill.
            let namespace = self
                .namespace_decoder
                .decode(&ns_bytes.data, ns_bytes.encoding)?;
            let name = self
                .typename_decoder
                .decode(&name_bytes.data, name_bytes.encoding)?;
            let mut inner = self.write_inner();
            if let Some(info) = inner
                .by_name
                .get(&(namespace.clone(), name.clone()))
                .cloned()
            {
                inner
                    .by_hash
                    .insert((ns_bytes.hashcode, name_bytes.hashcode), info.clone());
                return Ok(ResolvedType::Registered(info.with_polarity(raw_id)));
            }
            let qualified = if namespace.is_empty() {
                name
            } else {
                format!("{namespace}.{name}")
            };
            return Err(CrosswireError::UnregisteredType(qualified));
        }

        if (types::BOOL..=types::FLOAT64_ARRAY).contains(&id) {
            return Ok(ResolvedType::Builtin(id));
        }

        let inner = self.read_inner();
        inner
            .by_id
            .get(&id)
            .map(|info| ResolvedType::Registered(info.with_polarity(raw_id)))
            .ok_or_else(|| CrosswireError::UnregisteredType(format!("type id {id}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::types::TypeSpec;

    fn person_schema() -> StructSchema {
        StructSchema::new("example", "Person")
            .field("name", TypeSpec::String)
            .field("age", TypeSpec::VarInt32)
    }

    #[test]
    fn duplicate_name_registration_rejected() {
        let registry = TypeRegistry::new();
        registry.register_struct_by_name(person_schema()).unwrap();
        assert!(matches!(
            registry.register_struct_by_name(person_schema()),
            Err(CrosswireError::AlreadyRegistered(name)) if name == "example.Person"
        ));
    }

    #[test]
    fn duplicate_id_registration_rejected() {
        let registry = TypeRegistry::new();
        registry.register_struct(person_schema(), 100).unwrap();
        let other = StructSchema::new("example", "Other");
        assert!(matches!(
            registry.register_struct(other, 100),
            Err(CrosswireError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn vocabulary_ids_are_reserved() {
        let registry = TypeRegistry::new();
        assert!(matches!(
            registry.register_struct(person_schema(), crate::types::MAP),
            Err(CrosswireError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn auto_ids_start_at_300() {
        let registry = TypeRegistry::new();
        let schema = Arc::new(person_schema());
        let info = registry.info_for_struct(&schema).unwrap();
        assert_eq!(info.local_id, crate::types::AUTO_TYPE_ID_BASE);
        assert_eq!(info.type_id, crate::types::NAMED_STRUCT);

        // Resolving again reuses the auto registration.
        let again = registry.info_for_struct(&schema).unwrap();
        assert_eq!(again.local_id, info.local_id);
    }

    #[test]
    fn named_header_roundtrip_with_backfill() {
        let registry = TypeRegistry::new();
        registry.register_struct_by_name(person_schema()).unwrap();
        let info = registry
            .lookup_by_name("example", "Person")
            .unwrap();

        let mut buf = ByteBuffer::new();
        let mut writer_strings = MetaStringWriterState::default();
        registry
            .write_type_info(&mut buf, &info, &mut writer_strings)
            .unwrap();

        let mut reader_strings = MetaStringReaderState::default();
        let resolved = registry
            .read_type_info(&mut buf, &mut reader_strings)
            .unwrap();
        match resolved {
            ResolvedType::Registered(read_info) => {
                assert_eq!(read_info.type_id, crate::types::NAMED_STRUCT);
                assert_eq!(read_info.qualified_name(), "example.Person");
            }
            other => panic!("expected registered type, got {other:?}"),
        }
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn unknown_name_reports_decoded_name() {
        let registry = TypeRegistry::new();
        let schema = Arc::new(StructSchema::new("example", "Ghost"));
        let info = registry.info_for_struct(&schema).unwrap();

        let mut buf = ByteBuffer::new();
        let mut writer_strings = MetaStringWriterState::default();
        registry
            .write_type_info(&mut buf, &info, &mut writer_strings)
            .unwrap();

        // A different registry never saw the registration.
        let empty = TypeRegistry::new();
        let mut reader_strings = MetaStringReaderState::default();
        assert!(matches!(
            empty.read_type_info(&mut buf, &mut reader_strings),
            Err(CrosswireError::UnregisteredType(name)) if name == "example.Ghost"
        ));
    }

    #[test]
    fn enum_ordinals_are_bounded_by_registration() {
        let registry = TypeRegistry::new();
        let schema = registry
            .register_enum_by_name(
                EnumSchema::new("example", "Color")
                    .variant("Red")
                    .variant("Green"),
            )
            .unwrap();
        let info = registry.info_for_enum(&schema).unwrap();
        assert_eq!(info.type_id, crate::types::NAMED_ENUM);
    }

    #[test]
    fn ext_registration_replaces() {
        #[derive(Debug)]
        struct NoopCodec;
        impl ExtCodec for NoopCodec {
            fn write(&self, _: &mut ByteBuffer, _: &dyn std::any::Any) -> Result<()> {
                Ok(())
            }
            fn read(&self, _: &mut ByteBuffer) -> Result<std::rc::Rc<dyn std::any::Any>> {
                Ok(std::rc::Rc::new(()))
            }
        }

        let registry = TypeRegistry::new();
        registry.register_ext(400, Arc::new(NoopCodec)).unwrap();
        // Replacing is allowed for ext codecs.
        registry.register_ext(400, Arc::new(NoopCodec)).unwrap();
        assert!(registry.info_for_ext(&ExtKey::Id(400)).is_ok());
    }
}
