//! # Hickle
//!
//! Hierarchical object-graph pickling for Rust: serialize an arbitrary
//! in-memory value graph into a path-addressable tree store — named
//! composite "group" nodes and leaf "array" nodes — and reconstruct an
//! equivalent graph from it. The tree stays interpretable from outside:
//! every node carries a readable type tag, mapping keys become child
//! names, and numeric sequences become flat scalar blocks.
//!
//! ## Overview
//!
//! Unlike byte-stream serializers, Hickle treats the destination as a
//! tree. Each value gets its own node under the path where it is first
//! met; objects met again become back-reference nodes pointing at the
//! first copy. That single mechanism deduplicates shared substructure and
//! breaks reference cycles.
//!
//! ### Key pieces
//!
//! *   **[`ValueGraph`]** — an arena of [`Value`] slots. The slot id
//!     ([`ObjId`]) is the value's identity: the same id in two places is
//!     one shared object.
//! *   **[`Pickler`]** — walks the graph top-down, assigns paths, writes
//!     nodes through the [`Store`] adapter and keeps the identity memo.
//! *   **[`Unpickler`]** — walks the stored tree driven by per-node type
//!     tags, rebuilding values bottom-up (with pre-registration for
//!     cycles) into its own graph.
//! *   **[`Registry`]** — the type-kind dispatch table, plus reducers,
//!     array families and extension codes.
//! *   **Generic object protocol** — objects with no registered routine
//!     decompose into an explicit [`ReduceSpec`] (constructor, arguments,
//!     state, extend-items) and rebuild through a host-supplied
//!     [`Resolver`]; see the [`reduce`] module.
//! *   **[`MemStore`]** — the bundled in-memory backend; [`Hickle`] can
//!     persist its image as a single checksummed container file.
//!
//! ## Basic usage
//!
//! ```rust
//! use hickle::{GlobalTable, Hickle, MemStore, ValueGraph};
//!
//! let mut graph = ValueGraph::new();
//! let a = graph.int(1);
//! let b = graph.text("two");
//! let items = graph.list(vec![a, b]);
//!
//! let mut store = MemStore::new();
//! Hickle::dump(&mut store, &mut graph, items, "/data")?;
//!
//! let (decoded, root) = Hickle::load(&store, Box::new(GlobalTable::new()), "/data")?;
//! assert!(graph.graph_eq(items, &decoded, root));
//! # Ok::<(), hickle::HickleError>(())
//! ```
//!
//! ## Batch sessions
//!
//! A [`Pickler`] or [`Unpickler`] keeps its memo alive across top-level
//! calls, so several objects encoded through one instance share structure
//! (`encode_many` / `decode_many`). Clear the memo to start an unrelated
//! session.
//!
//! ## Safety and error handling
//!
//! * **No panics:** no `unwrap()` or `panic!()` in the library (enforced
//!   by clippy lints); all failures surface as [`HickleError`].
//! * **Encapsulated unsafe:** `unsafe` appears once, for memory-mapping
//!   container files in the `reader` module.
//! * **Loud failures:** decoding never substitutes defaults for missing
//!   metadata; a failed call leaves no partial result behind.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

pub mod api;
pub mod compression;
pub mod error;
pub mod format;
pub mod inspector;
pub mod memstore;
pub mod pickler;
pub mod protocol;
pub mod reader;
pub mod reduce;
pub mod registry;
pub mod store;
pub mod unpickler;
pub mod value;

#[doc(hidden)]
pub mod io;

// Re-exported so callers can build `Value::BigInt` without pinning their
// own copy of the crate.
pub use num_bigint;

pub use api::Hickle;
pub use compression::{Compressor, NoCompression};
#[cfg(feature = "lz4_flex")]
pub use compression::Lz4Compressor;
pub use error::{HickleError, Result};
pub use inspector::Inspector;
pub use memstore::MemStore;
pub use pickler::Pickler;
pub use reader::StoreReader;
pub use reduce::{BasicClass, Construct, Ctor, GlobalTable, ReduceSpec, Reducer, Resolver};
pub use registry::Registry;
pub use store::{ArrayData, AttrValue, NodeKind, Store};
pub use unpickler::Unpickler;
pub use value::{Complex64, GlobalRef, Instance, ObjId, TypedArray, Value, ValueGraph, ValueKind};
