//! Centralized error handling for Hickle.
//!
//! All failure conditions are propagated through the `Result` type; the
//! library never panics on bad input (enforced by `#![deny(clippy::panic)]`
//! and `#![deny(clippy::unwrap_used)]`).
//!
//! ## Design Philosophy
//!
//! 1. **No Panics:** Every error condition is represented as a `Result`
//!    value. Invariant violations inside the engine surface as
//!    [`HickleError::Internal`] rather than aborting the process.
//!
//! 2. **Contextual Information:** Error messages carry the node path and the
//!    attempted type wherever one is known, so a failed encode or decode can
//!    be diagnosed without a debugger.
//!
//! 3. **Cloneable Errors:** [`HickleError`] is `Clone`; I/O errors are
//!    wrapped in an `Arc` so cloning stays cheap.
//!
//! ## Error Categories
//!
//! - **Encoding** ([`HickleError::Encoding`]): a value cannot be written —
//!   unsupported decomposition, a reducer produced a malformed spec, or a
//!   name collided with the reserved metadata namespace.
//! - **Decoding** ([`HickleError::Decoding`]): a stored node cannot be read
//!   back — missing metadata children, unknown type tags, malformed leaves.
//! - **NameResolution** ([`HickleError::NameResolution`]): a stored
//!   qualified name (or extension code) has no live counterpart in the
//!   resolver.
//! - **Construction** ([`HickleError::Construction`]): a constructor
//!   rejected its arguments or an object refused the captured state.
//! - **Store** ([`HickleError::Store`]): the storage adapter reported a
//!   failure (missing node, duplicate node, invalid name).
//! - **Format / Serialization / Compression / Io**: the persisted container
//!   layer (file framing, record payloads, compressed blocks, raw I/O).
//! - **Internal** ([`HickleError::Internal`]): a logic error in the engine
//!   itself; should not occur in production.
//!
//! ## Error Propagation with `?`
//!
//! ```rust
//! use hickle::{Hickle, MemStore, ValueGraph};
//!
//! fn save_report() -> hickle::Result<MemStore> {
//!     let mut graph = ValueGraph::new();
//!     let obj = graph.int(42);
//!     let mut store = MemStore::new();
//!     Hickle::dump(&mut store, &mut graph, obj, "/report")?;
//!     Ok(store)
//! }
//! # save_report()?;
//! # Ok::<(), hickle::HickleError>(())
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;

/// A specialized `Result` type for Hickle operations.
///
/// Equivalent to `std::result::Result<T, HickleError>` and used throughout
/// the library.
pub type Result<T> = std::result::Result<T, HickleError>;

/// The master error enum covering all failure domains in Hickle.
///
/// Each variant corresponds to a failure domain; see the module
/// documentation for the taxonomy. The type is `Clone` so errors can be
/// stored or shared across threads; the wrapped `io::Error` lives behind an
/// `Arc` for that reason.
#[derive(Debug, Clone)]
pub enum HickleError {
    /// Low-level I/O failure while writing or reading a container file.
    Io(Arc<io::Error>),

    /// A value could not be encoded into the store.
    ///
    /// Raised for malformed reducer output, constructor/class mismatches,
    /// unregistered array families and dangling object ids. The message
    /// names the node path being written.
    Encoding(String),

    /// A stored node could not be decoded back into a value.
    ///
    /// Raised for missing required metadata children, unknown or malformed
    /// type tags, and leaf blocks of the wrong scalar kind. Decoding never
    /// substitutes a default for missing data.
    Decoding(String),

    /// A stored qualified name (or extension code) could not be resolved to
    /// a live constructor through the configured [`Resolver`].
    ///
    /// [`Resolver`]: crate::reduce::Resolver
    NameResolution(String),

    /// A resolved constructor raised, rejected its arguments, or the
    /// reconstructed object refused the captured state.
    Construction(String),

    /// The storage adapter reported a failure: a missing node, an attempt
    /// to overwrite an existing node, or an invalid path or child name.
    Store(String),

    /// The container file is invalid, truncated, corrupted, or carries an
    /// unsupported version.
    Format(String),

    /// A container record payload failed to encode or decode (bincode).
    Serialization(String),

    /// A compressed block failed to compress or decompress, or named an
    /// unregistered algorithm id.
    Compression(String),

    /// Logic error inside the engine. Indicates a bug; please report it
    /// with a minimal reproduction case.
    Internal(String),
}

impl fmt::Display for HickleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Encoding(s) => write!(f, "encoding error: {s}"),
            Self::Decoding(s) => write!(f, "decoding error: {s}"),
            Self::NameResolution(s) => write!(f, "name resolution error: {s}"),
            Self::Construction(s) => write!(f, "construction error: {s}"),
            Self::Store(s) => write!(f, "store error: {s}"),
            Self::Format(s) => write!(f, "format error: {s}"),
            Self::Serialization(s) => write!(f, "serialization error: {s}"),
            Self::Compression(s) => write!(f, "compression error: {s}"),
            Self::Internal(s) => write!(f, "internal logic error: {s}"),
        }
    }
}

impl std::error::Error for HickleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for HickleError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}
