//! The encode-side engine.
//!
//! A [`Pickler`] walks an object graph top-down, assigns each object the
//! path at which it is first encountered, and writes nodes through the
//! [`Store`] adapter. The identity memo (object id → canonical path) is
//! both the deduplication and the cycle-breaking mechanism: any object met
//! a second time — including an object met again *while its own children
//! are being written* — becomes a `REF` group pointing at its canonical
//! path.
//!
//! Encode routines for the built-in kinds are dispatched through the
//! [`Registry`]; a value with no routine (a generic object) goes through
//! the reduce protocol instead.

use std::collections::{HashMap, HashSet};

use log::{debug, trace};

use crate::error::{HickleError, Result};
use crate::protocol::{
    format_shape, is_direct_key, tag, ATTR_EMPTY, ATTR_SHAPE, ATTR_STATE, ATTR_TARGET, ATTR_TYPE,
    META, META_ARGS, META_CLS, META_CONTENT, META_DICTITEMS, META_FUNC, META_LISTITEMS,
};
use crate::reduce::{Ctor, ReduceSpec};
use crate::registry::Registry;
use crate::store::{join_path, ArrayData, Store};
use crate::value::{GlobalRef, Instance, ObjId, Value, ValueGraph, ValueKind};

/// The encoder.
///
/// A `Pickler` borrows a store for the duration of one session. The memo
/// lives as long as the `Pickler`, so several top-level objects encoded
/// through one instance share structure across calls (batch mode); call
/// [`Pickler::clear_memo`] to start an unrelated session.
pub struct Pickler<'s> {
    file: &'s mut dyn Store,
    registry: Registry,
    paths: HashMap<ObjId, String>,
}

impl<'s> Pickler<'s> {
    /// Creates an encoder over `store` with the standard registry.
    pub fn new(store: &'s mut dyn Store) -> Self {
        Self::with_registry(store, Registry::standard())
    }

    /// Creates an encoder with a custom registry (extra array families,
    /// reducers, extension codes).
    pub fn with_registry(store: &'s mut dyn Store, registry: Registry) -> Self {
        Self {
            file: store,
            registry,
            paths: HashMap::new(),
        }
    }

    /// The registry in use.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Mutable access to the registry, for late registration.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Drops the identity memo, starting a fresh independent session.
    pub fn clear_memo(&mut self) {
        self.paths.clear();
    }

    /// Encodes one object at `path`.
    ///
    /// The parent group of `path` must already exist in the store; the
    /// node at `path` must not.
    pub fn encode_one(&mut self, graph: &mut ValueGraph, id: ObjId, path: &str) -> Result<()> {
        if !path.starts_with('/') || path == "/" {
            return Err(HickleError::Encoding(format!(
                "target path {path:?} must be absolute and below the root"
            )));
        }
        debug!("encoding object {id} at {path}");
        self.save(graph, path, id)
    }

    /// Encodes several top-level objects through one shared memo, so
    /// objects shared between them are written once and referenced from
    /// everywhere else.
    pub fn encode_many(&mut self, graph: &mut ValueGraph, items: &[(&str, ObjId)]) -> Result<()> {
        for (path, id) in items {
            self.encode_one(graph, *id, path)?;
        }
        Ok(())
    }

    /// The recursive entry point: memo check, memoize, dispatch.
    fn save(&mut self, graph: &mut ValueGraph, path: &str, id: ObjId) -> Result<()> {
        if let Some(target) = self.paths.get(&id) {
            let target = target.clone();
            return self.save_ref(path, &target);
        }
        if !graph.contains(id) {
            return Err(HickleError::Encoding(format!(
                "dangling object id {id} at {path}"
            )));
        }
        // Memoize before descending so self-referential structures hit the
        // memo on the inner occurrence.
        self.paths.insert(id, path.to_string());

        let kind = graph.get(id).kind();
        trace!("encode {kind:?} at {path}");
        if let Some(f) = self.registry.encode_fn(kind) {
            return f(self, graph, path, id);
        }
        match kind {
            ValueKind::Object => self.save_object(graph, path, id),
            other => Err(HickleError::Encoding(format!(
                "no encode routine registered for {other:?} at {path}"
            ))),
        }
    }

    fn save_ref(&mut self, path: &str, target: &str) -> Result<()> {
        trace!("back-reference at {path} -> {target}");
        self.file.create_group(path)?;
        self.file.set_attr(path, ATTR_TARGET, target.into())?;
        self.file.set_attr(path, ATTR_TYPE, tag::REF.into())
    }

    // --- scalar leaves ---

    pub(crate) fn save_none(&mut self, graph: &mut ValueGraph, path: &str, id: ObjId) -> Result<()> {
        let _ = self.expect_kind(graph, id, ValueKind::None, path)?;
        self.write_scalar(path, ArrayData::Int64(vec![0]), tag::NONE)
    }

    pub(crate) fn save_bool(&mut self, graph: &mut ValueGraph, path: &str, id: ObjId) -> Result<()> {
        let b = match graph.get(id) {
            Value::Bool(b) => *b,
            _ => return self.kind_mismatch(path),
        };
        self.write_scalar(path, ArrayData::Int64(vec![i64::from(b)]), tag::BOOL)
    }

    pub(crate) fn save_int(&mut self, graph: &mut ValueGraph, path: &str, id: ObjId) -> Result<()> {
        let i = match graph.get(id) {
            Value::Int(i) => *i,
            _ => return self.kind_mismatch(path),
        };
        self.write_scalar(path, ArrayData::Int64(vec![i]), tag::INT)
    }

    pub(crate) fn save_big_int(
        &mut self,
        graph: &mut ValueGraph,
        path: &str,
        id: ObjId,
    ) -> Result<()> {
        let big = match graph.get(id) {
            Value::BigInt(b) => b.clone(),
            _ => return self.kind_mismatch(path),
        };
        if big == num_bigint::BigInt::default() {
            return self.write_empty_leaf(path, tag::LONG);
        }
        self.write_scalar(path, ArrayData::UInt8(big.to_signed_bytes_be()), tag::LONG)
    }

    pub(crate) fn save_float(
        &mut self,
        graph: &mut ValueGraph,
        path: &str,
        id: ObjId,
    ) -> Result<()> {
        let f = match graph.get(id) {
            Value::Float(f) => *f,
            _ => return self.kind_mismatch(path),
        };
        self.write_scalar(path, ArrayData::Float64(vec![f]), tag::FLOAT)
    }

    pub(crate) fn save_complex(
        &mut self,
        graph: &mut ValueGraph,
        path: &str,
        id: ObjId,
    ) -> Result<()> {
        let c = match graph.get(id) {
            Value::Complex(c) => *c,
            _ => return self.kind_mismatch(path),
        };
        self.write_scalar(path, ArrayData::Complex128(vec![c]), tag::COMPLEX)
    }

    pub(crate) fn save_bytes(
        &mut self,
        graph: &mut ValueGraph,
        path: &str,
        id: ObjId,
    ) -> Result<()> {
        let b = match graph.get(id) {
            Value::Bytes(b) => b.clone(),
            _ => return self.kind_mismatch(path),
        };
        if b.is_empty() {
            return self.write_empty_leaf(path, tag::STRING);
        }
        self.write_scalar(path, ArrayData::UInt8(b), tag::STRING)
    }

    pub(crate) fn save_text(
        &mut self,
        graph: &mut ValueGraph,
        path: &str,
        id: ObjId,
    ) -> Result<()> {
        let s = match graph.get(id) {
            Value::Text(s) => s.clone(),
            _ => return self.kind_mismatch(path),
        };
        if s.is_empty() {
            return self.write_empty_leaf(path, tag::UNICODE);
        }
        self.write_scalar(path, ArrayData::UInt8(s.into_bytes()), tag::UNICODE)
    }

    // --- sequences ---

    pub(crate) fn save_tuple(
        &mut self,
        graph: &mut ValueGraph,
        path: &str,
        id: ObjId,
    ) -> Result<()> {
        let ids = match graph.get(id) {
            Value::Tuple(v) => v.clone(),
            _ => return self.kind_mismatch(path),
        };
        self.write_sequence(graph, path, &ids, tag::TUPLE)
    }

    pub(crate) fn save_list(
        &mut self,
        graph: &mut ValueGraph,
        path: &str,
        id: ObjId,
    ) -> Result<()> {
        let ids = match graph.get(id) {
            Value::List(v) => v.clone(),
            _ => return self.kind_mismatch(path),
        };
        self.write_sequence(graph, path, &ids, tag::LIST)
    }

    /// Writes a sequence: the empty marker for no elements, one flattened
    /// leaf when every element is the same numeric scalar kind, otherwise
    /// a group with indexed children `_0`, `_1`, ….
    ///
    /// Flattened elements are data, not nodes: they are not individually
    /// memoized and cannot be back-referenced.
    fn write_sequence(
        &mut self,
        graph: &mut ValueGraph,
        path: &str,
        ids: &[ObjId],
        seq_tag: &str,
    ) -> Result<()> {
        if ids.is_empty() {
            return self.write_empty_leaf(path, seq_tag);
        }
        if let Some(data) = flatten_homogeneous(graph, ids) {
            return self.write_scalar(path, data, seq_tag);
        }
        self.file.create_group(path)?;
        self.file.set_attr(path, ATTR_TYPE, seq_tag.into())?;
        for (i, el) in ids.iter().enumerate() {
            self.save(graph, &format!("{path}/_{i}"), *el)?;
        }
        Ok(())
    }

    // --- mappings ---

    pub(crate) fn save_dict(
        &mut self,
        graph: &mut ValueGraph,
        path: &str,
        id: ObjId,
    ) -> Result<()> {
        let pairs = match graph.get(id) {
            Value::Dict(p) => p.clone(),
            _ => return self.kind_mismatch(path),
        };
        self.file.create_group(path)?;
        self.file.set_attr(path, ATTR_TYPE, tag::DICT.into())?;
        self.save_dict_entries(graph, path, &pairs)
    }

    /// Writes mapping entries as children of `path`.
    ///
    /// Keys are partitioned in two passes: direct keys first (text, bare
    /// identifier, not the reserved name, not yet taken), then surrogate
    /// names `_0, _1, …` skipping any name already in use. Surrogate key
    /// objects are written under the reserved namespace, which is created
    /// lazily on the first surrogate.
    fn save_dict_entries(
        &mut self,
        graph: &mut ValueGraph,
        path: &str,
        pairs: &[(ObjId, ObjId)],
    ) -> Result<()> {
        let mut used: HashSet<String> = HashSet::new();
        let mut names: Vec<Option<String>> = vec![None; pairs.len()];
        for (i, (k, _)) in pairs.iter().enumerate() {
            if let Some(Value::Text(s)) = graph.try_get(*k) {
                if is_direct_key(s) && !used.contains(s.as_str()) {
                    used.insert(s.clone());
                    names[i] = Some(s.clone());
                }
            }
        }
        let mut keyi = 0usize;
        let resolved: Vec<(String, bool)> = names
            .into_iter()
            .map(|name| match name {
                Some(n) => (n, true),
                None => {
                    let mut candidate = format!("_{keyi}");
                    while used.contains(&candidate) {
                        keyi += 1;
                        candidate = format!("_{keyi}");
                    }
                    used.insert(candidate.clone());
                    (candidate, false)
                }
            })
            .collect();

        let meta_path = join_path(path, META);
        let mut has_meta = self.file.has_path(&meta_path);
        for ((k, v), (name, direct)) in pairs.iter().zip(resolved.iter()) {
            self.save(graph, &join_path(path, name), *v)?;
            if !direct {
                if !has_meta {
                    self.file.create_group(&meta_path)?;
                    has_meta = true;
                }
                self.save(graph, &join_path(&meta_path, name), *k)?;
            }
        }
        Ok(())
    }

    // --- globals and arrays ---

    pub(crate) fn save_global(
        &mut self,
        graph: &mut ValueGraph,
        path: &str,
        id: ObjId,
    ) -> Result<()> {
        let gref = match graph.get(id) {
            Value::Global(g) => g.clone(),
            _ => return self.kind_mismatch(path),
        };
        self.write_global_leaf(path, &gref)
    }

    pub(crate) fn save_typed_array(
        &mut self,
        graph: &mut ValueGraph,
        path: &str,
        id: ObjId,
    ) -> Result<()> {
        let arr = match graph.get(id) {
            Value::TypedArray(a) => a.clone(),
            _ => return self.kind_mismatch(path),
        };
        if !self.registry.is_array_family(&arr.family) {
            return Err(HickleError::Encoding(format!(
                "array family {:?} is not registered, at {path}",
                arr.family
            )));
        }
        self.file.create_array(path, arr.data)?;
        self.file.set_attr(path, ATTR_SHAPE, format_shape(&arr.shape).into())?;
        self.file.set_attr(path, ATTR_TYPE, arr.family.as_str().into())
    }

    // --- generic objects ---

    /// Encodes an object with no registered routine: a registered reducer
    /// produces a `REDUCE` node; otherwise the default dict-based state
    /// capture produces an `INST` node with the fields folded into the
    /// node's own children.
    fn save_object(&mut self, graph: &mut ValueGraph, path: &str, id: ObjId) -> Result<()> {
        let inst = match graph.get(id) {
            Value::Object(i) => i.clone(),
            _ => return self.kind_mismatch(path),
        };
        if let Some(reducer) = self.registry.reducer_for(&inst.class) {
            let spec = reducer.reduce(graph, id)?;
            self.check_spec(graph, &inst, &spec, path)?;
            return self.save_reduce(graph, path, &spec);
        }
        self.save_inst(graph, path, &inst)
    }

    /// Default state capture: class reference, empty argument tuple, and
    /// the field table folded into the node's children. An object with
    /// slot fields captures a two-part state under `__/content` instead,
    /// since a fold cannot carry two tables.
    fn save_inst(&mut self, graph: &mut ValueGraph, path: &str, inst: &Instance) -> Result<()> {
        self.file.create_group(path)?;
        self.file.set_attr(path, ATTR_TYPE, tag::INST.into())?;
        let meta_path = join_path(path, META);
        self.file.create_group(&meta_path)?;
        self.write_global_leaf(&join_path(&meta_path, META_CLS), &inst.class)?;
        self.write_sequence(graph, &join_path(&meta_path, META_ARGS), &[], tag::TUPLE)?;

        if inst.slots.is_empty() {
            let pairs: Vec<(ObjId, ObjId)> = inst
                .fields
                .iter()
                .map(|(name, &v)| (graph.insert(Value::Text(name.clone())), v))
                .collect();
            self.save_dict_entries(graph, path, &pairs)
        } else {
            let fields: Vec<(ObjId, ObjId)> = inst
                .fields
                .iter()
                .map(|(name, &v)| (graph.insert(Value::Text(name.clone())), v))
                .collect();
            let slots: Vec<(ObjId, ObjId)> = inst
                .slots
                .iter()
                .map(|(name, &v)| (graph.insert(Value::Text(name.clone())), v))
                .collect();
            let fd = graph.insert(Value::Dict(fields));
            let sd = graph.insert(Value::Dict(slots));
            let st = graph.insert(Value::Tuple(vec![fd, sd]));
            self.save(graph, &join_path(&meta_path, META_CONTENT), st)
        }
    }

    fn check_spec(
        &self,
        graph: &ValueGraph,
        inst: &Instance,
        spec: &ReduceSpec,
        path: &str,
    ) -> Result<()> {
        if let Ctor::Class(cls) = &spec.ctor {
            if *cls != inst.class {
                return Err(HickleError::Encoding(format!(
                    "reducer constructor class {cls} does not match object class {}, at {path}",
                    inst.class
                )));
            }
        }
        let mut ids: Vec<ObjId> = spec.args.clone();
        ids.extend(spec.state);
        if let Some(items) = &spec.list_items {
            ids.extend(items.iter().copied());
        }
        if let Some(pairs) = &spec.dict_items {
            for (k, v) in pairs {
                ids.push(*k);
                ids.push(*v);
            }
        }
        for id in ids {
            if !graph.contains(id) {
                return Err(HickleError::Encoding(format!(
                    "reducer for {} produced dangling object id {id}, at {path}",
                    inst.class
                )));
            }
        }
        Ok(())
    }

    /// Writes a `REDUCE` group from a decomposition spec.
    fn save_reduce(&mut self, graph: &mut ValueGraph, path: &str, spec: &ReduceSpec) -> Result<()> {
        self.file.create_group(path)?;
        self.file.set_attr(path, ATTR_TYPE, tag::REDUCE.into())?;
        let meta_path = join_path(path, META);
        self.file.create_group(&meta_path)?;
        match &spec.ctor {
            Ctor::Class(c) => self.write_global_leaf(&join_path(&meta_path, META_CLS), c)?,
            Ctor::Func(f) => self.write_global_leaf(&join_path(&meta_path, META_FUNC), f)?,
        }
        self.write_sequence(graph, &join_path(&meta_path, META_ARGS), &spec.args, tag::TUPLE)?;

        if let Some(items) = &spec.list_items {
            self.write_sequence(graph, &join_path(&meta_path, META_LISTITEMS), items, tag::LIST)?;
        }
        if let Some(pairs) = &spec.dict_items {
            let p = join_path(&meta_path, META_DICTITEMS);
            self.file.create_group(&p)?;
            self.file.set_attr(&p, ATTR_TYPE, tag::DICT.into())?;
            self.save_dict_entries(graph, &p, pairs)?;
        }
        if let Some(st) = spec.state {
            self.file.set_attr(path, ATTR_STATE, 1i64.into())?;
            let dict_pairs = match graph.get(st) {
                Value::Dict(p) => Some(p.clone()),
                _ => None,
            };
            match dict_pairs {
                Some(pairs) => self.save_dict_entries(graph, path, &pairs)?,
                None => self.save(graph, &join_path(&meta_path, META_CONTENT), st)?,
            }
        }
        Ok(())
    }

    // --- low-level writes ---

    fn write_scalar(&mut self, path: &str, data: ArrayData, leaf_tag: &str) -> Result<()> {
        self.file.create_array(path, data)?;
        self.file.set_attr(path, ATTR_TYPE, leaf_tag.into())
    }

    fn write_empty_leaf(&mut self, path: &str, leaf_tag: &str) -> Result<()> {
        self.file.create_array(path, ArrayData::Int64(vec![0]))?;
        self.file.set_attr(path, ATTR_EMPTY, 1i64.into())?;
        self.file.set_attr(path, ATTR_TYPE, leaf_tag.into())
    }

    /// Writes a constructor or class reference leaf: a compact `EXT` code
    /// when the name is in the extension table, a `GLOBAL` name record
    /// otherwise.
    fn write_global_leaf(&mut self, path: &str, gref: &GlobalRef) -> Result<()> {
        if gref.module.is_empty()
            || gref.name.is_empty()
            || gref.module.contains('\n')
            || gref.name.contains('\n')
        {
            return Err(HickleError::Encoding(format!(
                "invalid qualified name {gref:?} at {path}"
            )));
        }
        if let Some(code) = self.registry.extension_code(gref) {
            self.file
                .create_array(path, ArrayData::UInt8(code.to_le_bytes().to_vec()))?;
            self.file.set_attr(path, ATTR_TYPE, tag::EXT.into())
        } else {
            let record = format!("{}\n{}", gref.module, gref.name).into_bytes();
            self.file.create_array(path, ArrayData::UInt8(record))?;
            self.file.set_attr(path, ATTR_TYPE, tag::GLOBAL.into())
        }
    }

    fn expect_kind(
        &self,
        graph: &ValueGraph,
        id: ObjId,
        kind: ValueKind,
        path: &str,
    ) -> Result<ObjId> {
        if graph.get(id).kind() == kind {
            Ok(id)
        } else {
            Err(HickleError::Internal(format!(
                "registry dispatched {kind:?} routine for a different kind at {path}"
            )))
        }
    }

    fn kind_mismatch(&self, path: &str) -> Result<()> {
        Err(HickleError::Internal(format!(
            "registry dispatch and value kind disagree at {path}"
        )))
    }
}

impl std::fmt::Debug for Pickler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pickler")
            .field("memo", &self.paths.len())
            .field("registry", &self.registry)
            .finish()
    }
}

/// Returns the flattened block for a sequence whose elements are all
/// machine integers, all floats, or all complex numbers; `None` otherwise.
fn flatten_homogeneous(graph: &ValueGraph, ids: &[ObjId]) -> Option<ArrayData> {
    match graph.try_get(*ids.first()?)? {
        Value::Int(_) => {
            let mut out = Vec::with_capacity(ids.len());
            for id in ids {
                match graph.try_get(*id)? {
                    Value::Int(i) => out.push(*i),
                    _ => return None,
                }
            }
            Some(ArrayData::Int64(out))
        }
        Value::Float(_) => {
            let mut out = Vec::with_capacity(ids.len());
            for id in ids {
                match graph.try_get(*id)? {
                    Value::Float(f) => out.push(*f),
                    _ => return None,
                }
            }
            Some(ArrayData::Float64(out))
        }
        Value::Complex(_) => {
            let mut out = Vec::with_capacity(ids.len());
            for id in ids {
                match graph.try_get(*id)? {
                    Value::Complex(c) => out.push(*c),
                    _ => return None,
                }
            }
            Some(ArrayData::Complex128(out))
        }
        _ => None,
    }
}
