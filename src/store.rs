//! The storage adapter contract.
//!
//! The engine never talks to a concrete backend; it writes and reads
//! through the [`Store`] trait, which models a tree of named composite
//! nodes ("groups") and leaf data nodes ("arrays"), each carrying named
//! attributes. Paths are absolute and slash-delimited, and every node is
//! write-once for the duration of an encode session.
//!
//! [`MemStore`](crate::memstore::MemStore) is the bundled in-memory
//! implementation; [`StoreReader`](crate::reader::StoreReader) and
//! [`Hickle::save_file`](crate::api::Hickle::save_file) move a `MemStore`
//! image to and from a single container file.

use serde::{Deserialize, Serialize};

use crate::error::{HickleError, Result};
use crate::value::Complex64;

/// Whether a node is a composite or a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Composite node with named children.
    Group,
    /// Leaf node holding one flat scalar block.
    Array,
}

/// A typed per-node attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    /// String attribute (type tags, reference targets, shapes).
    Str(String),
    /// Integer attribute (markers such as `empty`).
    Int(i64),
}

impl AttrValue {
    /// Returns the string payload, if this is a string attribute.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            AttrValue::Int(_) => None,
        }
    }

    /// Returns the integer payload, if this is an integer attribute.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            AttrValue::Str(_) => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

/// A flat block of homogeneous scalar data, the payload of a leaf node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayData {
    /// Signed 64-bit integers.
    Int64(Vec<i64>),
    /// 64-bit floats.
    Float64(Vec<f64>),
    /// Complex numbers.
    Complex128(Vec<Complex64>),
    /// Raw bytes (strings, encoded big integers, name records).
    UInt8(Vec<u8>),
}

impl ArrayData {
    /// Number of scalar elements in the block.
    pub fn len(&self) -> usize {
        match self {
            ArrayData::Int64(v) => v.len(),
            ArrayData::Float64(v) => v.len(),
            ArrayData::Complex128(v) => v.len(),
            ArrayData::UInt8(v) => v.len(),
        }
    }

    /// Returns true if the block holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A short name for the element type, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ArrayData::Int64(_) => "int64",
            ArrayData::Float64(_) => "float64",
            ArrayData::Complex128(_) => "complex128",
            ArrayData::UInt8(_) => "uint8",
        }
    }
}

/// Path-addressed access to a hierarchical store.
///
/// All paths are absolute (`/a/b/c`). Creating a node requires its parent
/// group to exist; creating over an existing node is an error — the engine
/// relies on the write-once property to detect name collisions.
pub trait Store {
    /// Creates an empty group at `path`.
    fn create_group(&mut self, path: &str) -> Result<()>;

    /// Creates a leaf holding `data` at `path`.
    fn create_array(&mut self, path: &str, data: ArrayData) -> Result<()>;

    /// Sets (or overwrites) a named attribute on the node at `path`.
    fn set_attr(&mut self, path: &str, key: &str, value: AttrValue) -> Result<()>;

    /// Reads a named attribute from the node at `path`.
    ///
    /// Returns `Ok(None)` when the node exists but carries no such
    /// attribute; a missing node is an error.
    fn get_attr(&self, path: &str, key: &str) -> Result<Option<AttrValue>>;

    /// Returns true if the node at `path` carries the attribute.
    fn has_attr(&self, path: &str, key: &str) -> Result<bool> {
        Ok(self.get_attr(path, key)?.is_some())
    }

    /// Reads the data block of the leaf at `path`.
    fn read_array(&self, path: &str) -> Result<ArrayData>;

    /// Returns whether the node at `path` is a group or a leaf.
    fn node_kind(&self, path: &str) -> Result<NodeKind>;

    /// Returns true if a node exists at `path`.
    fn has_path(&self, path: &str) -> bool;

    /// Returns the names of the children of the group at `path`, in
    /// creation order.
    fn children(&self, path: &str) -> Result<Vec<String>>;
}

/// Splits an absolute path into its parent path and final name.
pub fn split_path(path: &str) -> Result<(&str, &str)> {
    if path == "/" {
        return Err(HickleError::Store("cannot split the root path".into()));
    }
    let idx = path
        .rfind('/')
        .ok_or_else(|| HickleError::Store(format!("path {path:?} is not absolute")))?;
    let (parent, name) = (&path[..idx], &path[idx + 1..]);
    if name.is_empty() {
        return Err(HickleError::Store(format!("path {path:?} ends in a slash")));
    }
    Ok((if parent.is_empty() { "/" } else { parent }, name))
}

/// Joins a parent path and a child name.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}
