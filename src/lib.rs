//! # Crosswire
//!
//! A cross-language binary serialization codec: it turns an in-memory object
//! graph into a self-describing little-endian byte stream whose layout is
//! shared with peer implementations in other languages, and turns such
//! streams back into native [`Value`] graphs.
//!
//! ## Overview
//!
//! Crosswire is built for low-latency, *reference-preserving* transport of
//! structured data between processes that do not share a language. The wire
//! format carries enough type information to decode a stream with nothing
//! but a type registry on the receiving side, while compressing the
//! recurring parts (type names, repeated objects) aggressively:
//!
//! *   **Reference tracking:** every shared object is written once; later
//!     occurrences are 2-3 byte back-references. Cyclic graphs round-trip
//!     because objects register with the reference resolver *before* their
//!     bodies are encoded.
//! *   **MetaString interning:** namespace and type-name fragments are
//!     bit-packed (5 or 6 bits per char where the charset allows) and
//!     written once per stream; repeats collapse to a 1-2 byte
//!     back-reference.
//! *   **Compact integers:** ZigZag varints, and a hybrid "small long"
//!     encoding that spends 4 bytes on 31-bit values and 9 on the rest.
//! *   **Chunked maps:** runs of map entries that share key/value types
//!     amortize one type header per run instead of paying per entry.
//!
//! ## Architecture
//!
//! The codec is five components, each its own module, all I/O funneling
//! through the buffer layer:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │ api::Crosswire      framing, session lifecycle         │
//! ├──────────────────────────────┬─────────────────────────┤
//! │ writer::Writer               │ reader::Reader          │
//! │   values → slots → bytes     │   bytes → slots → values│
//! ├────────────┬─────────────────┴───┬─────────────────────┤
//! │ resolver   │ refs                │ metastring          │
//! │ (registry, │ (identity ↔ ref id) │ (fragment interning)│
//! │  headers)  │                     │                     │
//! ├────────────┴─────────────────────┴─────────────────────┤
//! │ buffer::ByteBuffer   little-endian store, varints      │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! Values are a tagged variant ([`Value`]); per-type dispatch on the hot
//! path is a `match`, not a virtual call. Only caller-supplied ext codecs
//! go through a trait object ([`ExtCodec`]).
//!
//! ## Usage
//!
//! ### Plain values
//!
//! ```
//! use crosswire::{ByteBuffer, Crosswire, Value};
//!
//! let mut codec = Crosswire::default();
//! let mut buffer = ByteBuffer::new();
//! codec.serialize(&mut buffer, &Value::list(vec![
//!     Value::from(true),
//!     Value::from(-1i64),
//!     Value::str("str"),
//! ]))?;
//! let back = codec.deserialize(&mut buffer)?;
//! # let _ = back;
//! # Ok::<(), crosswire::CrosswireError>(())
//! ```
//!
//! ### Registered structs
//!
//! ```
//! use crosswire::{Crosswire, StructValue, TypeRegistry, TypeSpec, Value};
//! use crosswire::StructSchema;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(TypeRegistry::new());
//! let schema = registry.register_struct_by_name(
//!     StructSchema::new("example", "Person")
//!         .field("name", TypeSpec::String)
//!         .parsed_field("scores", "[]int32")?,
//! )?;
//!
//! let mut person = StructValue::new(schema);
//! person.set("name", Value::str("ada"))?;
//! person.set("scores", Value::Int32Array(std::rc::Rc::new(vec![1, 2, 3])))?;
//!
//! let mut codec = Crosswire::builder().with_registry(registry);
//! let bytes = codec.to_bytes(&Value::struct_value(person))?;
//! let back = codec.from_bytes(&bytes)?;
//! # let _ = back;
//! # Ok::<(), crosswire::CrosswireError>(())
//! ```
//!
//! ## Sharing and cycles
//!
//! Identity is `Rc` identity. With reference tracking enabled (the
//! default), a value appearing twice in the graph deserializes into one
//! shared object, and self-referential graphs round-trip:
//!
//! ```
//! use crosswire::{Crosswire, Value};
//!
//! let shared = Value::str("str1");
//! let list = Value::list(vec![shared.clone(), shared.clone()]);
//!
//! let mut codec = Crosswire::default();
//! let bytes = codec.to_bytes(&list)?;
//! let back = codec.from_bytes(&bytes)?;
//! if let Value::List(items) = &back {
//!     let items = items.borrow();
//!     assert!(items[0].ptr_eq(&items[1]));
//! }
//! # Ok::<(), crosswire::CrosswireError>(())
//! ```
//!
//! ## Safety and error handling
//!
//! *   **No unsafe:** enforced by `#![deny(unsafe_code)]`.
//! *   **No panics:** no `unwrap()` or `panic!()` in the library (enforced
//!     by clippy lints); every failure is a typed [`CrosswireError`].
//! *   **Failed calls leave the codec reusable:** session state resets on
//!     every exit path.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// --- PUBLIC API MODULES ---
pub mod api;
pub mod buffer;
pub mod error;
pub mod metastring;
pub mod refs;
pub mod resolver;
pub mod schema;
pub mod types;
pub mod value;

// --- INTERNAL ENGINE MODULES ---
mod reader;
mod writer;

// --- RE-EXPORTS ---

pub use api::Crosswire;
pub use buffer::{ByteBuffer, ByteSlice};
pub use error::{CrosswireError, Result};
pub use resolver::{TypeInfo, TypeKind, TypeRegistry};
pub use schema::{EnumSchema, ExtCodec, FieldSchema, StructSchema};
pub use types::{TypeId, TypeSpec};
pub use value::{
    Date, EnumValue, ExtKey, ExtValue, MapValue, SetValue, StructValue, TimeDelta, Timestamp,
    Value,
};

/// Wire-level constants shared with peer implementations.
pub mod constants {
    /// The two-byte stream magic, written little-endian (`D4 62`).
    pub const MAGIC: u16 = 0x62D4;

    /// Session flag bit: the stream is in cross-language mode.
    pub const FLAG_XLANG: u8 = 0b0000_0001;

    /// Session flag bit: the writer had reference tracking enabled.
    pub const FLAG_REF_TRACKING: u8 = 0b0000_0010;

    /// Default depth cap applied while reference tracking is off.
    pub const DEFAULT_RECURSION_LIMIT: usize = 512;
}
