//! The bundled in-memory storage backend.
//!
//! A [`MemStore`] keeps the whole node tree in a path-indexed table,
//! preserving child creation order. It is the working set for encode and
//! decode sessions and the unit the container layer persists
//! (see [`Hickle::save_file`](crate::api::Hickle::save_file)).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{HickleError, Result};
use crate::store::{split_path, ArrayData, AttrValue, NodeKind, Store};

/// One stored node: kind, attributes, optional leaf data, ordered child
/// names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct NodeRec {
    pub(crate) kind: NodeKind,
    pub(crate) attrs: IndexMap<String, AttrValue>,
    pub(crate) data: Option<ArrayData>,
    pub(crate) children: Vec<String>,
}

impl NodeRec {
    fn group() -> Self {
        Self {
            kind: NodeKind::Group,
            attrs: IndexMap::new(),
            data: None,
            children: Vec::new(),
        }
    }

    fn array(data: ArrayData) -> Self {
        Self {
            kind: NodeKind::Array,
            attrs: IndexMap::new(),
            data: Some(data),
            children: Vec::new(),
        }
    }
}

/// In-memory path-indexed node tree.
///
/// The root group `/` exists from creation. Node creation validates the
/// parent, rejects duplicates, and records the child under its parent in
/// creation order, which is the order [`Store::children`] reports.
#[derive(Debug, Clone)]
pub struct MemStore {
    nodes: IndexMap<String, NodeRec>,
}

impl MemStore {
    /// Creates a store containing only the root group.
    pub fn new() -> Self {
        let mut nodes = IndexMap::new();
        nodes.insert("/".to_string(), NodeRec::group());
        Self { nodes }
    }

    /// Number of nodes, including the root group.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the store holds only the root group.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    fn check_path(path: &str) -> Result<()> {
        if path == "/" {
            return Ok(());
        }
        if !path.starts_with('/') || path.ends_with('/') || path.contains("//") {
            return Err(HickleError::Store(format!("invalid path {path:?}")));
        }
        Ok(())
    }

    fn node(&self, path: &str) -> Result<&NodeRec> {
        self.nodes
            .get(path)
            .ok_or_else(|| HickleError::Store(format!("no node at {path}")))
    }

    fn node_mut(&mut self, path: &str) -> Result<&mut NodeRec> {
        self.nodes
            .get_mut(path)
            .ok_or_else(|| HickleError::Store(format!("no node at {path}")))
    }

    fn insert_node(&mut self, path: &str, rec: NodeRec) -> Result<()> {
        Self::check_path(path)?;
        let (parent, name) = split_path(path)?;
        if name.contains('/') || name.is_empty() {
            return Err(HickleError::Store(format!("invalid node name {name:?}")));
        }
        if self.nodes.contains_key(path) {
            return Err(HickleError::Store(format!("node already exists at {path}")));
        }
        let parent_rec = self.node_mut(parent)?;
        if parent_rec.kind != NodeKind::Group {
            return Err(HickleError::Store(format!("parent {parent} is not a group")));
        }
        parent_rec.children.push(name.to_string());
        self.nodes.insert(path.to_string(), rec);
        Ok(())
    }

    /// Iterates all nodes as (path, record) in insertion order, for the
    /// container writer.
    pub(crate) fn records(&self) -> impl Iterator<Item = (&str, &NodeRec)> {
        self.nodes.iter().map(|(p, r)| (p.as_str(), r))
    }

    /// Rebuilds a store from raw records, bypassing parent validation.
    /// The container reader replays records in their written order.
    pub(crate) fn from_records(records: Vec<(String, NodeRec)>) -> Self {
        let mut nodes = IndexMap::with_capacity(records.len());
        for (path, rec) in records {
            nodes.insert(path, rec);
        }
        Self { nodes }
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemStore {
    fn create_group(&mut self, path: &str) -> Result<()> {
        self.insert_node(path, NodeRec::group())
    }

    fn create_array(&mut self, path: &str, data: ArrayData) -> Result<()> {
        self.insert_node(path, NodeRec::array(data))
    }

    fn set_attr(&mut self, path: &str, key: &str, value: AttrValue) -> Result<()> {
        self.node_mut(path)?.attrs.insert(key.to_string(), value);
        Ok(())
    }

    fn get_attr(&self, path: &str, key: &str) -> Result<Option<AttrValue>> {
        Ok(self.node(path)?.attrs.get(key).cloned())
    }

    fn read_array(&self, path: &str) -> Result<ArrayData> {
        let rec = self.node(path)?;
        rec.data
            .clone()
            .ok_or_else(|| HickleError::Store(format!("node at {path} is not an array")))
    }

    fn node_kind(&self, path: &str) -> Result<NodeKind> {
        Ok(self.node(path)?.kind)
    }

    fn has_path(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    fn children(&self, path: &str) -> Result<Vec<String>> {
        let rec = self.node(path)?;
        if rec.kind != NodeKind::Group {
            return Err(HickleError::Store(format!("node at {path} is not a group")));
        }
        Ok(rec.children.clone())
    }
}
