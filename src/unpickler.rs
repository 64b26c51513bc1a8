//! The decode-side engine.
//!
//! An [`Unpickler`] walks the stored tree driven by per-node type tags and
//! rebuilds values into its own [`ValueGraph`]. The path memo makes every
//! node decode at most once, so two `REF`s to one canonical path come back
//! as one shared object.
//!
//! Two ordering rules are load-bearing for cyclic data:
//!
//! 1. Containers insert a placeholder slot and memoize it *before* loading
//!    their children, then replace the slot in place.
//! 2. Generic objects are memoized immediately after construction, before
//!    extend-items or state are applied.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, trace};

use crate::error::{HickleError, Result};
use crate::protocol::{
    child_order, parse_shape, tag, ATTR_EMPTY, ATTR_SHAPE, ATTR_STATE, ATTR_TARGET, ATTR_TYPE,
    META, META_ARGS, META_CLS, META_CONTENT, META_DICTITEMS, META_FUNC, META_LISTITEMS,
};
use crate::reduce::{Construct, GlobalTable, Resolver};
use crate::registry::Registry;
use crate::store::{join_path, ArrayData, AttrValue, NodeKind, Store};
use crate::value::{GlobalRef, ObjId, TypedArray, Value, ValueGraph};

/// The decoder.
///
/// Borrows a store read-only, owns the output graph and the path memo.
/// Several top-level paths decoded through one instance share objects
/// wherever the store shares nodes (batch mode); [`Unpickler::clear_memo`]
/// starts an unrelated session (already-returned ids stay valid).
pub struct Unpickler<'s> {
    file: &'s dyn Store,
    registry: Registry,
    resolver: Box<dyn Resolver>,
    graph: ValueGraph,
    memo: HashMap<String, ObjId>,
}

impl<'s> Unpickler<'s> {
    /// Creates a decoder with the standard registry and an empty resolver.
    ///
    /// Without resolver entries, any `GLOBAL`, `EXT`, `INST` or `REDUCE`
    /// node fails with a name-resolution error; pure data trees decode
    /// fine.
    pub fn new(store: &'s dyn Store) -> Self {
        Self::with_parts(store, Registry::standard(), Box::new(GlobalTable::new()))
    }

    /// Creates a decoder with a host-supplied resolver.
    pub fn with_resolver(store: &'s dyn Store, resolver: Box<dyn Resolver>) -> Self {
        Self::with_parts(store, Registry::standard(), resolver)
    }

    /// Creates a decoder with a custom registry and resolver.
    pub fn with_parts(store: &'s dyn Store, registry: Registry, resolver: Box<dyn Resolver>) -> Self {
        Self {
            file: store,
            registry,
            resolver,
            graph: ValueGraph::new(),
            memo: HashMap::new(),
        }
    }

    /// The graph holding everything decoded so far.
    pub fn graph(&self) -> &ValueGraph {
        &self.graph
    }

    /// Mutable access to the output graph.
    pub fn graph_mut(&mut self) -> &mut ValueGraph {
        &mut self.graph
    }

    /// Consumes the decoder, returning the output graph.
    pub fn into_graph(self) -> ValueGraph {
        self.graph
    }

    /// Drops the path memo. Ids already handed out remain valid; nodes
    /// decoded afterwards no longer alias them.
    pub fn clear_memo(&mut self) {
        self.memo.clear();
    }

    /// Decodes the node at `path` into an object id.
    pub fn decode_one(&mut self, path: &str) -> Result<ObjId> {
        debug!("decoding node at {path}");
        self.load(path)
    }

    /// Decodes several paths through one shared memo, preserving sharing
    /// between them.
    pub fn decode_many(&mut self, paths: &[&str]) -> Result<Vec<(String, ObjId)>> {
        let mut out = Vec::with_capacity(paths.len());
        for path in paths {
            let id = self.decode_one(path)?;
            out.push((path.to_string(), id));
        }
        Ok(out)
    }

    /// Memoized recursive entry point: tag dispatch, raw read for untagged
    /// leaves.
    fn load(&mut self, path: &str) -> Result<ObjId> {
        if let Some(&id) = self.memo.get(path) {
            return Ok(id);
        }
        if !self.file.has_path(path) {
            return Err(HickleError::Decoding(format!("no node at {path}")));
        }
        let id = match self.file.get_attr(path, ATTR_TYPE)? {
            Some(AttrValue::Str(t)) => {
                trace!("decode tag {t:?} at {path}");
                let f = self.registry.decode_fn(&t).ok_or_else(|| {
                    HickleError::Decoding(format!("no decode routine for tag {t:?} at {path}"))
                })?;
                f(self, path, &t)?
            }
            Some(AttrValue::Int(_)) => {
                return Err(HickleError::Decoding(format!(
                    "malformed type tag attribute at {path}"
                )))
            }
            None => match self.file.node_kind(path)? {
                NodeKind::Array => self.read_typed(path, tag::ND)?,
                NodeKind::Group => {
                    return Err(HickleError::Decoding(format!(
                        "group at {path} carries no type tag"
                    )))
                }
            },
        };
        self.memo.insert(path.to_string(), id);
        Ok(id)
    }

    // --- scalar leaves ---

    pub(crate) fn load_none(&mut self, _path: &str, _tag: &str) -> Result<ObjId> {
        Ok(self.graph.insert(Value::None))
    }

    pub(crate) fn load_bool(&mut self, path: &str, _tag: &str) -> Result<ObjId> {
        let i = self.read_scalar_i64(path)?;
        Ok(self.graph.insert(Value::Bool(i != 0)))
    }

    pub(crate) fn load_int(&mut self, path: &str, _tag: &str) -> Result<ObjId> {
        let i = self.read_scalar_i64(path)?;
        Ok(self.graph.insert(Value::Int(i)))
    }

    pub(crate) fn load_long(&mut self, path: &str, _tag: &str) -> Result<ObjId> {
        let bytes = self.read_bytes(path)?;
        let big = if bytes.is_empty() {
            num_bigint::BigInt::default()
        } else {
            num_bigint::BigInt::from_signed_bytes_be(&bytes)
        };
        Ok(self.graph.insert(Value::BigInt(big)))
    }

    pub(crate) fn load_float(&mut self, path: &str, _tag: &str) -> Result<ObjId> {
        match self.file.read_array(path)? {
            ArrayData::Float64(v) if v.len() == 1 => Ok(self.graph.insert(Value::Float(v[0]))),
            other => Err(malformed_leaf(path, "float", &other)),
        }
    }

    pub(crate) fn load_complex(&mut self, path: &str, _tag: &str) -> Result<ObjId> {
        match self.file.read_array(path)? {
            ArrayData::Complex128(v) if v.len() == 1 => {
                Ok(self.graph.insert(Value::Complex(v[0])))
            }
            other => Err(malformed_leaf(path, "complex", &other)),
        }
    }

    pub(crate) fn load_string(&mut self, path: &str, _tag: &str) -> Result<ObjId> {
        let bytes = self.read_bytes(path)?;
        Ok(self.graph.insert(Value::Bytes(bytes)))
    }

    pub(crate) fn load_unicode(&mut self, path: &str, _tag: &str) -> Result<ObjId> {
        let bytes = self.read_bytes(path)?;
        let s = String::from_utf8(bytes).map_err(|e| {
            HickleError::Decoding(format!("text leaf at {path} is not valid UTF-8: {e}"))
        })?;
        Ok(self.graph.insert(Value::Text(s)))
    }

    // --- sequences ---

    /// Decodes `TUPLE` and `LIST` nodes; the tag chooses the container.
    /// A leaf is a flattened homogeneous sequence (or the empty marker);
    /// a group restores its indexed children strictly in numeric order.
    pub(crate) fn load_sequence(&mut self, path: &str, seq_tag: &str) -> Result<ObjId> {
        let is_tuple = seq_tag == tag::TUPLE;
        match self.file.node_kind(path)? {
            NodeKind::Array => {
                let ids = if self.file.has_attr(path, ATTR_EMPTY)? {
                    Vec::new()
                } else {
                    self.unflatten(path)?
                };
                Ok(self.graph.insert(seq_value(is_tuple, ids)))
            }
            NodeKind::Group => {
                let placeholder = self.graph.insert(seq_value(is_tuple, Vec::new()));
                self.memo.insert(path.to_string(), placeholder);
                let mut names = self.file.children(path)?;
                names.sort_by(|a, b| child_order(a, b));
                let mut ids = Vec::with_capacity(names.len());
                for name in names {
                    ids.push(self.load(&join_path(path, &name))?);
                }
                self.graph.replace(placeholder, seq_value(is_tuple, ids));
                Ok(placeholder)
            }
        }
    }

    fn unflatten(&mut self, path: &str) -> Result<Vec<ObjId>> {
        let data = self.file.read_array(path)?;
        let ids = match data {
            ArrayData::Int64(v) => v
                .into_iter()
                .map(|i| self.graph.insert(Value::Int(i)))
                .collect(),
            ArrayData::Float64(v) => v
                .into_iter()
                .map(|f| self.graph.insert(Value::Float(f)))
                .collect(),
            ArrayData::Complex128(v) => v
                .into_iter()
                .map(|c| self.graph.insert(Value::Complex(c)))
                .collect(),
            other => return Err(malformed_leaf(path, "flattened sequence", &other)),
        };
        Ok(ids)
    }

    // --- mappings ---

    pub(crate) fn load_dict(&mut self, path: &str, _tag: &str) -> Result<ObjId> {
        let placeholder = self.graph.insert(Value::Dict(Vec::new()));
        self.memo.insert(path.to_string(), placeholder);
        let pairs = self.load_dict_entries(path)?;
        self.graph.replace(placeholder, Value::Dict(pairs));
        Ok(placeholder)
    }

    /// Inverse of the mapping-encode rule: surrogate entries under the
    /// reserved namespace map child names back to key objects; every other
    /// direct child name is itself the key.
    fn load_dict_entries(&mut self, path: &str) -> Result<Vec<(ObjId, ObjId)>> {
        let meta_path = join_path(path, META);
        let mut surrogates: HashMap<String, ObjId> = HashMap::new();
        if self.file.has_path(&meta_path) {
            for name in self.file.children(&meta_path)? {
                if name.starts_with('_') {
                    let key = self.load(&join_path(&meta_path, &name))?;
                    surrogates.insert(name, key);
                }
            }
        }
        let mut pairs = Vec::new();
        for name in self.file.children(path)? {
            if name == META {
                continue;
            }
            let value = self.load(&join_path(path, &name))?;
            let key = match surrogates.get(&name) {
                Some(&k) => k,
                None => self.graph.insert(Value::Text(name.clone())),
            };
            pairs.push((key, value));
        }
        Ok(pairs)
    }

    // --- generic objects ---

    /// Decodes a `REDUCE` group: arguments, constructor (function call or
    /// raw class allocation), then — after memoizing — extend-items and
    /// state.
    pub(crate) fn load_reduce(&mut self, path: &str, _tag: &str) -> Result<ObjId> {
        let args = self.load_args(path)?;
        let meta_path = join_path(path, META);
        let func_path = join_path(&meta_path, META_FUNC);
        let (factory, obj) = if self.file.has_path(&func_path) {
            let factory = self.resolve_ctor(&func_path)?;
            let obj = factory.construct(&mut self.graph, &args)?;
            (factory, obj)
        } else {
            let cls_path = join_path(&meta_path, META_CLS);
            if !self.file.has_path(&cls_path) {
                return Err(HickleError::Decoding(format!(
                    "node at {path} is missing both {META_FUNC:?} and {META_CLS:?} metadata"
                )));
            }
            let factory = self.resolve_ctor(&cls_path)?;
            let obj = factory.allocate(&mut self.graph, &args)?;
            (factory, obj)
        };
        // Mandatory ordering: the object must be reachable through the
        // memo before its own state loads.
        self.memo.insert(path.to_string(), obj);

        let listitems_path = join_path(&meta_path, META_LISTITEMS);
        if self.file.has_path(&listitems_path) {
            let seq = self.load(&listitems_path)?;
            self.extend_sequence(obj, seq, path)?;
        }
        let dictitems_path = join_path(&meta_path, META_DICTITEMS);
        if self.file.has_path(&dictitems_path) {
            let map = self.load(&dictitems_path)?;
            self.extend_mapping(obj, map, path)?;
        }

        let content_path = join_path(&meta_path, META_CONTENT);
        if self.file.has_path(&content_path) {
            let state = self.load(&content_path)?;
            self.set_state(Some(&factory), obj, state, path)?;
        } else if self.file.has_attr(path, ATTR_STATE)? {
            let pairs = self.load_dict_entries(path)?;
            let state = self.graph.insert(Value::Dict(pairs));
            self.set_state(Some(&factory), obj, state, path)?;
        }
        Ok(obj)
    }

    /// Decodes an `INST` group: class + arguments through the full
    /// constructor, then state from `__/content` or folded children.
    pub(crate) fn load_inst(&mut self, path: &str, _tag: &str) -> Result<ObjId> {
        let args = self.load_args(path)?;
        let meta_path = join_path(path, META);
        let factory = self.resolve_ctor(&join_path(&meta_path, META_CLS))?;
        let obj = factory.construct(&mut self.graph, &args)?;
        self.memo.insert(path.to_string(), obj);

        let content_path = join_path(&meta_path, META_CONTENT);
        let state = if self.file.has_path(&content_path) {
            self.load(&content_path)?
        } else {
            let pairs = self.load_dict_entries(path)?;
            self.graph.insert(Value::Dict(pairs))
        };
        self.set_state(Some(&factory), obj, state, path)?;
        Ok(obj)
    }

    fn load_args(&mut self, path: &str) -> Result<Vec<ObjId>> {
        let args_path = join_path(&join_path(path, META), META_ARGS);
        if !self.file.has_path(&args_path) {
            return Err(HickleError::Decoding(format!(
                "node at {path} is missing its {META_ARGS:?} metadata child"
            )));
        }
        let args_id = self.load(&args_path)?;
        match self.graph.get(args_id) {
            Value::Tuple(v) | Value::List(v) => Ok(v.clone()),
            _ => Err(HickleError::Decoding(format!(
                "arguments node at {args_path} is not a sequence"
            ))),
        }
    }

    fn resolve_ctor(&mut self, path: &str) -> Result<Arc<dyn Construct>> {
        let id = self.load(path)?;
        let gref = match self.graph.get(id) {
            Value::Global(g) => g.clone(),
            other => {
                return Err(HickleError::Decoding(format!(
                    "constructor reference at {path} is a {:?}, not a global",
                    other.kind()
                )))
            }
        };
        self.resolver.find(&gref.module, &gref.name).ok_or_else(|| {
            HickleError::NameResolution(format!(
                "{gref} is not registered with the resolver (needed at {path})"
            ))
        })
    }

    fn extend_sequence(&mut self, obj: ObjId, seq: ObjId, path: &str) -> Result<()> {
        let items = match self.graph.get(seq) {
            Value::Tuple(v) | Value::List(v) => v.clone(),
            _ => {
                return Err(HickleError::Decoding(format!(
                    "listitems node under {path} is not a sequence"
                )))
            }
        };
        match self.graph.get_mut(obj) {
            Value::List(v) => {
                v.extend(items);
                Ok(())
            }
            _ => Err(HickleError::Construction(format!(
                "object at {path} cannot be extended as a sequence"
            ))),
        }
    }

    fn extend_mapping(&mut self, obj: ObjId, map: ObjId, path: &str) -> Result<()> {
        let pairs = match self.graph.get(map) {
            Value::Dict(p) => p.clone(),
            _ => {
                return Err(HickleError::Decoding(format!(
                    "dictitems node under {path} is not a mapping"
                )))
            }
        };
        match self.graph.get_mut(obj) {
            Value::Dict(d) => {
                d.extend(pairs);
                Ok(())
            }
            _ => Err(HickleError::Construction(format!(
                "object at {path} cannot be extended as a mapping"
            ))),
        }
    }

    /// Applies captured state to a rebuilt object: factory hook first,
    /// then the two-part (fields, slots) form, then a plain mapping into
    /// the field table.
    fn set_state(
        &mut self,
        factory: Option<&Arc<dyn Construct>>,
        obj: ObjId,
        state: ObjId,
        path: &str,
    ) -> Result<()> {
        if let Some(f) = factory {
            if f.apply_state(&mut self.graph, obj, state)? {
                return Ok(());
            }
        }
        let sv = self.graph.get(state).clone();
        match sv {
            Value::None => Ok(()),
            Value::Tuple(items) if items.len() == 2 => {
                let (fields, slots) = (items[0], items[1]);
                if !matches!(self.graph.get(fields), Value::None) {
                    self.state_into_table(obj, fields, false, path)?;
                }
                if !matches!(self.graph.get(slots), Value::None) {
                    self.state_into_table(obj, slots, true, path)?;
                }
                Ok(())
            }
            Value::Dict(_) => self.state_into_table(obj, state, false, path),
            other => Err(HickleError::Construction(format!(
                "unsupported state shape {:?} for object at {path}",
                other.kind()
            ))),
        }
    }

    fn state_into_table(
        &mut self,
        obj: ObjId,
        dict_id: ObjId,
        slots: bool,
        path: &str,
    ) -> Result<()> {
        let pairs = match self.graph.get(dict_id) {
            Value::Dict(p) => p.clone(),
            _ => {
                return Err(HickleError::Construction(format!(
                    "state for object at {path} is not a mapping"
                )))
            }
        };
        if pairs.is_empty() {
            return Ok(());
        }
        let mut entries = Vec::with_capacity(pairs.len());
        for (k, v) in pairs {
            match self.graph.get(k) {
                Value::Text(s) => entries.push((s.clone(), v)),
                other => {
                    return Err(HickleError::Construction(format!(
                        "state key for object at {path} is a {:?}, not text",
                        other.kind()
                    )))
                }
            }
        }
        match self.graph.get_mut(obj) {
            Value::Object(inst) => {
                let table = if slots { &mut inst.slots } else { &mut inst.fields };
                for (name, v) in entries {
                    table.insert(name, v);
                }
                Ok(())
            }
            _ => Err(HickleError::Construction(format!(
                "object at {path} does not accept field state"
            ))),
        }
    }

    // --- globals, references, arrays ---

    pub(crate) fn load_global(&mut self, path: &str, _tag: &str) -> Result<ObjId> {
        let bytes = self.read_bytes(path)?;
        let record = String::from_utf8(bytes).map_err(|e| {
            HickleError::Decoding(format!("name record at {path} is not valid UTF-8: {e}"))
        })?;
        let (module, name) = record.split_once('\n').ok_or_else(|| {
            HickleError::Decoding(format!("malformed name record at {path}"))
        })?;
        let gref = GlobalRef::new(module, name);
        self.check_resolvable(&gref, path)?;
        Ok(self.graph.insert(Value::Global(gref)))
    }

    pub(crate) fn load_ext(&mut self, path: &str, _tag: &str) -> Result<ObjId> {
        let bytes = self.read_bytes(path)?;
        let code_bytes: [u8; 4] = bytes.as_slice().try_into().map_err(|_| {
            HickleError::Decoding(format!("malformed extension code leaf at {path}"))
        })?;
        let code = i32::from_le_bytes(code_bytes);
        let gref = self
            .registry
            .extension_name(code)
            .cloned()
            .ok_or_else(|| {
                HickleError::NameResolution(format!(
                    "unregistered extension code {code} at {path}"
                ))
            })?;
        self.check_resolvable(&gref, path)?;
        Ok(self.graph.insert(Value::Global(gref)))
    }

    fn check_resolvable(&self, gref: &GlobalRef, path: &str) -> Result<()> {
        if self.resolver.find(&gref.module, &gref.name).is_none() {
            return Err(HickleError::NameResolution(format!(
                "{gref} is not registered with the resolver (stored at {path})"
            )));
        }
        Ok(())
    }

    pub(crate) fn load_ref(&mut self, path: &str, _tag: &str) -> Result<ObjId> {
        let target = match self.file.get_attr(path, ATTR_TARGET)? {
            Some(AttrValue::Str(t)) => t,
            _ => {
                return Err(HickleError::Decoding(format!(
                    "reference node at {path} carries no target attribute"
                )))
            }
        };
        trace!("follow back-reference {path} -> {target}");
        self.load(&target)
    }

    pub(crate) fn load_typed_array(&mut self, path: &str, family: &str) -> Result<ObjId> {
        self.read_typed(path, family)
    }

    fn read_typed(&mut self, path: &str, family: &str) -> Result<ObjId> {
        let data = self.file.read_array(path)?;
        let shape = match self.file.get_attr(path, ATTR_SHAPE)? {
            Some(AttrValue::Str(s)) => parse_shape(&s).ok_or_else(|| {
                HickleError::Decoding(format!("malformed shape attribute at {path}"))
            })?,
            _ => vec![data.len()],
        };
        Ok(self.graph.insert(Value::TypedArray(TypedArray {
            family: family.to_string(),
            shape,
            data,
        })))
    }

    // --- leaf readers ---

    fn read_scalar_i64(&self, path: &str) -> Result<i64> {
        match self.file.read_array(path)? {
            ArrayData::Int64(v) if v.len() == 1 => Ok(v[0]),
            other => Err(malformed_leaf(path, "integer scalar", &other)),
        }
    }

    /// Reads a byte leaf, honoring the empty marker.
    fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        if self.file.has_attr(path, ATTR_EMPTY)? {
            return Ok(Vec::new());
        }
        match self.file.read_array(path)? {
            ArrayData::UInt8(b) => Ok(b),
            other => Err(malformed_leaf(path, "byte block", &other)),
        }
    }
}

fn malformed_leaf(path: &str, expected: &str, got: &ArrayData) -> HickleError {
    HickleError::Decoding(format!(
        "leaf at {path} is not a {expected} (found {} x{})",
        got.kind_name(),
        got.len()
    ))
}

fn seq_value(is_tuple: bool, ids: Vec<ObjId>) -> Value {
    if is_tuple {
        Value::Tuple(ids)
    } else {
        Value::List(ids)
    }
}

impl std::fmt::Debug for Unpickler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unpickler")
            .field("memo", &self.memo.len())
            .field("graph", &self.graph.len())
            .finish()
    }
}
