//! Centralized error handling for Crosswire.
//!
//! Every failure the codec can produce is a variant of [`CrosswireError`].
//! The library never panics: all fallible paths return `Result`, enforced by
//! `#![deny(clippy::unwrap_used)]` and `#![deny(clippy::panic)]` at the crate
//! root.
//!
//! ## Design Philosophy
//!
//! 1. **One typed error per failed call.** Errors bubble to the top-level
//!    `serialize`/`deserialize` call unchanged; nothing is retried inside the
//!    codec. Session state is unconditionally reset on the error path, so the
//!    caller may reuse the codec instance immediately.
//!
//! 2. **Cloneable Errors:** [`CrosswireError`] is `Clone` so errors can be
//!    stored or shared across threads. I/O errors are wrapped in `Arc` to
//!    keep cloning cheap.
//!
//! 3. **Diagnosable by kind.** Each variant corresponds to exactly one
//!    failure domain of the wire protocol: a truncated buffer is never
//!    reported as a type mismatch, and vice versa.
//!
//! ## Error Categories
//!
//! - **Framing** ([`CrosswireError::BadMagic`],
//!   [`CrosswireError::UnsupportedVersion`],
//!   [`CrosswireError::TrailingBytes`]): the stream envelope is wrong.
//! - **Buffer** ([`CrosswireError::Truncated`],
//!   [`CrosswireError::VarintTooLong`]): the reader ran off the end of the
//!   data or a variable-length integer is malformed.
//! - **Types** ([`CrosswireError::TypeMismatch`],
//!   [`CrosswireError::UnregisteredType`],
//!   [`CrosswireError::AlreadyRegistered`]): the registry and the stream
//!   disagree.
//! - **Graph** ([`CrosswireError::UnknownRefId`],
//!   [`CrosswireError::UnknownMetaStringId`],
//!   [`CrosswireError::RecursionLimit`]): back-references or recursion went
//!   wrong.
//! - **Payload** ([`CrosswireError::InvalidUtf8`],
//!   [`CrosswireError::InvalidDate`]): bytes were present but do not decode.
//! - **I/O** ([`CrosswireError::Io`]): the underlying buffer rejected a
//!   write.

use std::fmt;
use std::io;
use std::sync::Arc;

/// A specialized `Result` type for Crosswire operations.
///
/// Equivalent to `std::result::Result<T, CrosswireError>` and used
/// throughout the library.
pub type Result<T> = std::result::Result<T, CrosswireError>;

/// The master error enum covering all failure domains in Crosswire.
///
/// See the module documentation for the category breakdown. The enum is
/// `Clone`; the only non-trivially-cloneable payload (`io::Error`) is held
/// behind an `Arc`.
#[derive(Debug, Clone)]
pub enum CrosswireError {
    /// The reader hit the end of the buffer in the middle of a value.
    Truncated {
        /// Bytes the current read needed.
        needed: usize,
        /// Bytes actually remaining between the cursors.
        remaining: usize,
    },

    /// The stream does not begin with the magic bytes `0xD4 0x62`.
    BadMagic,

    /// The session flag byte declares a feature bit this implementation does
    /// not know. The raw flag byte is carried for diagnostics.
    UnsupportedVersion(u8),

    /// The static destination type is incompatible with the wire type id (or
    /// with the shape of the value being written).
    TypeMismatch(String),

    /// A named type header referenced a (namespace, name) pair that is not in
    /// the registry. Carries the decoded full name.
    UnregisteredType(String),

    /// A metastring back-reference pointed past the fragments written so far
    /// in this stream.
    UnknownMetaStringId(u32),

    /// A reference back-reference pointed past the objects materialized so
    /// far in this stream.
    UnknownRefId(u32),

    /// A varint carried continuation bits beyond the 32/64-bit limit.
    VarintTooLong,

    /// A string payload does not decode under its declared encoding.
    InvalidUtf8(String),

    /// A date payload (or a year/month/day triple) is out of range.
    InvalidDate(String),

    /// A registration id or (namespace, name) slot is already taken.
    AlreadyRegistered(String),

    /// The value graph nests deeper than the configured limit while reference
    /// tracking is disabled. Carries the limit that was hit.
    RecursionLimit(usize),

    /// Bytes remained between the cursors after the root value was read.
    /// Carries the number of leftover bytes.
    TrailingBytes(usize),

    /// The underlying buffer rejected a write.
    ///
    /// The `io::Error` is wrapped in an `Arc` so the variant stays `Clone`.
    Io(Arc<io::Error>),
}

impl fmt::Display for CrosswireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { needed, remaining } => write!(
                f,
                "Truncated stream: needed {needed} byte(s), {remaining} remaining"
            ),
            Self::BadMagic => write!(f, "Bad magic: stream does not start with 0xD4 0x62"),
            Self::UnsupportedVersion(flags) => {
                write!(f, "Unsupported stream flags: {flags:#04x}")
            }
            Self::TypeMismatch(s) => write!(f, "Type mismatch: {s}"),
            Self::UnregisteredType(name) => write!(f, "Type not registered: {name}"),
            Self::UnknownMetaStringId(id) => write!(f, "Unknown metastring back-ref id {id}"),
            Self::UnknownRefId(id) => write!(f, "Unknown reference back-ref id {id}"),
            Self::VarintTooLong => write!(f, "Varint continuation exceeds the length limit"),
            Self::InvalidUtf8(s) => write!(f, "Invalid string payload: {s}"),
            Self::InvalidDate(s) => write!(f, "Invalid date: {s}"),
            Self::AlreadyRegistered(s) => write!(f, "Already registered: {s}"),
            Self::RecursionLimit(limit) => {
                write!(f, "Recursion limit of {limit} exceeded (is the graph cyclic?)")
            }
            Self::TrailingBytes(n) => {
                write!(f, "{n} trailing byte(s) after the root value")
            }
            Self::Io(e) => write!(f, "I/O Error: {e}"),
        }
    }
}

impl std::error::Error for CrosswireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CrosswireError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl CrosswireError {
    /// Shorthand used by readers when `needed` bytes are not available.
    pub(crate) fn truncated(needed: usize, remaining: usize) -> Self {
        Self::Truncated { needed, remaining }
    }
}
