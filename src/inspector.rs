//! Tools for inspecting the tree written by an encode session.
//!
//! Useful for checking layout decisions (flattened vs indexed sequences,
//! surrogate tables, reference placement) without decoding anything.

use serde::Serialize;

use crate::error::Result;
use crate::protocol::{ATTR_EMPTY, ATTR_TARGET, ATTR_TYPE};
use crate::store::{join_path, AttrValue, NodeKind, Store};

/// A structural report of one node and its subtree.
#[derive(Debug, Serialize)]
pub struct NodeReport {
    /// Node name (the last path segment; `/` for the root).
    pub name: String,
    /// Group or array.
    pub kind: NodeKind,
    /// The node's type tag, if any.
    pub tag: Option<String>,
    /// Element kind and count for array leaves.
    pub data: Option<(String, usize)>,
    /// Whether the node carries the empty marker.
    pub empty: bool,
    /// Back-reference target, for `REF` nodes.
    pub target: Option<String>,
    /// Child reports, in creation order.
    pub children: Vec<NodeReport>,
}

/// The store inspector.
#[derive(Debug)]
pub struct Inspector;

impl Inspector {
    /// Builds a report for the subtree rooted at `path`.
    pub fn inspect(store: &dyn Store, path: &str) -> Result<NodeReport> {
        let name = path.rsplit('/').next().unwrap_or_default();
        let name = if name.is_empty() { "/" } else { name };
        Self::inspect_node(store, path, name)
    }

    fn inspect_node(store: &dyn Store, path: &str, name: &str) -> Result<NodeReport> {
        let kind = store.node_kind(path)?;
        let tag = match store.get_attr(path, ATTR_TYPE)? {
            Some(AttrValue::Str(t)) => Some(t),
            _ => None,
        };
        let target = match store.get_attr(path, ATTR_TARGET)? {
            Some(AttrValue::Str(t)) => Some(t),
            _ => None,
        };
        let empty = store.has_attr(path, ATTR_EMPTY)?;
        let data = match kind {
            NodeKind::Array => {
                let block = store.read_array(path)?;
                Some((block.kind_name().to_string(), block.len()))
            }
            NodeKind::Group => None,
        };
        let mut children = Vec::new();
        if kind == NodeKind::Group {
            for child in store.children(path)? {
                children.push(Self::inspect_node(store, &join_path(path, &child), &child)?);
            }
        }
        Ok(NodeReport {
            name: name.to_string(),
            kind,
            tag,
            data,
            empty,
            target,
            children,
        })
    }
}

impl std::fmt::Display for NodeReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== HICKLE TREE REPORT ===")?;
        self.fmt_recursive(f, "", true)
    }
}

impl NodeReport {
    fn fmt_recursive(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        prefix: &str,
        is_last: bool,
    ) -> std::fmt::Result {
        let connector = if is_last { "└── " } else { "├── " };
        let child_prefix = if is_last { "    " } else { "│   " };

        let tag = self.tag.as_deref().unwrap_or("-");
        let detail = match (&self.data, &self.target) {
            (_, Some(target)) => format!(" -> {target}"),
            (Some((kind, len)), None) => format!(" [{kind} x{len}]"),
            (None, None) => String::new(),
        };
        let empty = if self.empty { " (empty)" } else { "" };
        writeln!(f, "{prefix}{connector}{} <{tag}>{detail}{empty}", self.name)?;

        for (i, child) in self.children.iter().enumerate() {
            let last = i == self.children.len() - 1;
            child.fmt_recursive(f, &format!("{prefix}{child_prefix}"), last)?;
        }
        Ok(())
    }
}
