//! Caller-supplied type descriptions.
//!
//! Rust has no runtime reflection, so the layout of a user struct enters the
//! codec as data: a [`StructSchema`] listing fields in declaration order with
//! their static types. Enums register their variant list the same way, and
//! user-codec (ext) types plug in through the [`ExtCodec`] trait, the one
//! seam where caller code, not a tagged dispatch, does the encoding.

use crate::buffer::ByteBuffer;
use crate::error::Result;
use crate::types::TypeSpec;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// One declared struct field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    /// Field name, unique within the struct.
    pub name: String,
    /// Static type of the field's slot.
    pub spec: TypeSpec,
}

/// The declared shape of a user struct: identity plus ordered fields.
///
/// Fields are serialized in declaration order; both sides must register the
/// same schema (the companion self-describing "compatible" mode is out of
/// scope).
#[derive(Debug, Clone, PartialEq)]
pub struct StructSchema {
    /// Namespace of the on-wire identity; may be empty.
    pub namespace: String,
    /// Type name of the on-wire identity.
    pub name: String,
    /// Fields in declaration order.
    pub fields: Vec<FieldSchema>,
}

impl StructSchema {
    /// Starts a schema with no fields.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Appends a field with an already-built spec.
    pub fn field(mut self, name: impl Into<String>, spec: TypeSpec) -> Self {
        self.fields.push(FieldSchema {
            name: name.into(),
            spec,
        });
        self
    }

    /// Appends a field declared in the textual type grammar,
    /// e.g. `"map[string]int32"` or `"*@example.Node"`.
    pub fn parsed_field(self, name: impl Into<String>, decl: &str) -> Result<Self> {
        let spec = TypeSpec::parse(decl)?;
        Ok(self.field(name, spec))
    }

    /// Index of a field by name.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// The `namespace.Name` form used in diagnostics.
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

/// The declared shape of a user enum: identity plus ordered variant names.
///
/// On the wire an enum is its variant ordinal; the variant list bounds what
/// the reader accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumSchema {
    /// Namespace of the on-wire identity; may be empty.
    pub namespace: String,
    /// Type name of the on-wire identity.
    pub name: String,
    /// Variant names in ordinal order.
    pub variants: Vec<String>,
}

impl EnumSchema {
    /// Starts a schema with no variants.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            variants: Vec::new(),
        }
    }

    /// Appends a variant.
    pub fn variant(mut self, name: impl Into<String>) -> Self {
        self.variants.push(name.into());
        self
    }

    /// The `namespace.Name` form used in diagnostics.
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

/// A caller-supplied codec for an ext type.
///
/// The codec owns the payload layout between the type header and the next
/// slot; the surrounding reference flag and type header stay with the
/// library. Implementations must read exactly the bytes they wrote.
///
/// Codecs live in the type registry, which may be shared across codec
/// instances on different threads, hence the `Send + Sync` bound.
pub trait ExtCodec: fmt::Debug + Send + Sync {
    /// Encodes `value` into the buffer.
    ///
    /// `value` is the payload the caller placed into
    /// [`crate::value::ExtValue`]; downcast it to the concrete type this
    /// codec was registered for.
    fn write(&self, buffer: &mut ByteBuffer, value: &dyn Any) -> Result<()>;

    /// Decodes one payload from the buffer.
    fn read(&self, buffer: &mut ByteBuffer) -> Result<Rc<dyn Any>>;
}
