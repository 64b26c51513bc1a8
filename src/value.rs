//! The in-memory object model: an arena of values with explicit identity.
//!
//! Rust has no ambient runtime object graph, so the engine defines one. A
//! [`ValueGraph`] is an arena of [`Value`] slots; an [`ObjId`] is the slot
//! index and doubles as the *identity* of the value it names. Two
//! occurrences of the same `ObjId` inside one graph are one shared object,
//! and an `ObjId` reachable from itself is a cycle. The encoder keys its
//! memo on these ids, which is what turns shared substructure into
//! back-references instead of duplicates.

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::store::ArrayData;

/// A strong type identifying one slot in a [`ValueGraph`].
///
/// The id is the object's identity for the duration of the graph's life.
/// Ids are only meaningful for the graph that issued them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId(u32);

impl ObjId {
    pub(crate) fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw numeric value.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjId({})", self.0)
    }
}

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A complex number stored as a pair of 64-bit floats.
///
/// The engine only stores and compares complex values; it does no
/// arithmetic on them, so a plain pair struct is all that is needed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Complex64 {
    /// Real part.
    pub re: f64,
    /// Imaginary part.
    pub im: f64,
}

impl Complex64 {
    /// Creates a complex number from its parts.
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }
}

/// The stored qualified name of a class, function or type.
///
/// Wire form is `module` and `name` joined by a newline, which is why
/// neither component may contain one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GlobalRef {
    /// The defining module (or any host-chosen namespace string).
    pub module: String,
    /// The name within the module.
    pub name: String,
}

impl GlobalRef {
    /// Creates a qualified name.
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for GlobalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.name)
    }
}

/// A generic object: a class reference plus two ordered field tables.
///
/// `fields` is the regular field table; `slots` is the separate slot table
/// that a two-part captured state populates. Most objects leave `slots`
/// empty.
#[derive(Debug, Clone, Default)]
pub struct Instance {
    /// The object's class.
    pub class: GlobalRef,
    /// Regular fields, in insertion order.
    pub fields: IndexMap<String, ObjId>,
    /// Slot fields, in insertion order.
    pub slots: IndexMap<String, ObjId>,
}

impl Default for GlobalRef {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl Instance {
    /// Creates an empty instance of `class`.
    pub fn new(class: GlobalRef) -> Self {
        Self {
            class,
            fields: IndexMap::new(),
            slots: IndexMap::new(),
        }
    }
}

/// An externally-provided numeric array, passed through to a leaf node.
///
/// The `family` tag names the array family that produced the block, so
/// decode can hand the data back to the matching constructor. Families are
/// registered in the [`Registry`](crate::registry::Registry); the built-in
/// one is [`crate::protocol::tag::ND`].
#[derive(Debug, Clone, PartialEq)]
pub struct TypedArray {
    /// The family tag written as the node's `pickletype`.
    pub family: String,
    /// Logical shape; the stored block is always flat.
    pub shape: Vec<usize>,
    /// The flat scalar block.
    pub data: ArrayData,
}

/// The runtime classification of a [`Value`], used as the registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// The absent value.
    None,
    /// Boolean.
    Bool,
    /// Machine integer.
    Int,
    /// Arbitrary-precision integer.
    BigInt,
    /// 64-bit float.
    Float,
    /// Complex number.
    Complex,
    /// Byte string.
    Bytes,
    /// UTF-8 text.
    Text,
    /// Immutable sequence.
    Tuple,
    /// Mutable sequence.
    List,
    /// Mapping with arbitrary keys.
    Dict,
    /// Generic object (class + field tables).
    Object,
    /// A class/function/type as a value.
    Global,
    /// External numeric array.
    TypedArray,
}

/// One value in the graph.
///
/// Containers hold [`ObjId`]s, never nested `Value`s; sharing and cycles
/// are expressed purely through ids.
#[derive(Debug, Clone)]
pub enum Value {
    /// The absent value.
    None,
    /// Boolean.
    Bool(bool),
    /// Machine integer.
    Int(i64),
    /// Arbitrary-precision integer.
    BigInt(BigInt),
    /// 64-bit float.
    Float(f64),
    /// Complex number.
    Complex(Complex64),
    /// Byte string.
    Bytes(Vec<u8>),
    /// UTF-8 text.
    Text(String),
    /// Immutable sequence of ids.
    Tuple(Vec<ObjId>),
    /// Mutable sequence of ids.
    List(Vec<ObjId>),
    /// Mapping as ordered (key id, value id) pairs; keys may be any value.
    Dict(Vec<(ObjId, ObjId)>),
    /// Generic object.
    Object(Instance),
    /// A class/function/type as a value.
    Global(GlobalRef),
    /// External numeric array.
    TypedArray(TypedArray),
}

impl Value {
    /// Returns the runtime classification of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::None => ValueKind::None,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::BigInt(_) => ValueKind::BigInt,
            Value::Float(_) => ValueKind::Float,
            Value::Complex(_) => ValueKind::Complex,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Text(_) => ValueKind::Text,
            Value::Tuple(_) => ValueKind::Tuple,
            Value::List(_) => ValueKind::List,
            Value::Dict(_) => ValueKind::Dict,
            Value::Object(_) => ValueKind::Object,
            Value::Global(_) => ValueKind::Global,
            Value::TypedArray(_) => ValueKind::TypedArray,
        }
    }
}

/// The arena holding an object graph.
///
/// Acts as a slot allocator for [`Value`]s. The decoder also uses the
/// replace-in-place operation to materialize cyclic containers: a
/// placeholder slot is inserted (so children can refer back to it), then
/// swapped for the finished container.
#[derive(Debug, Clone, Default)]
pub struct ValueGraph {
    slots: Vec<Value>,
}

impl ValueGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Inserts a value and returns its id.
    pub fn insert(&mut self, value: Value) -> ObjId {
        let id = ObjId::new(u32::try_from(self.slots.len()).unwrap_or(u32::MAX));
        self.slots.push(value);
        id
    }

    /// Returns a reference to the value at `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this graph.
    pub fn get(&self, id: ObjId) -> &Value {
        self.slots
            .get(id.as_u32() as usize)
            .expect("ValueGraph invariant violated: id out of bounds")
    }

    /// Returns a mutable reference to the value at `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this graph.
    pub fn get_mut(&mut self, id: ObjId) -> &mut Value {
        self.slots
            .get_mut(id.as_u32() as usize)
            .expect("ValueGraph invariant violated: id out of bounds")
    }

    /// Returns the value at `id`, or `None` for a foreign id.
    pub fn try_get(&self, id: ObjId) -> Option<&Value> {
        self.slots.get(id.as_u32() as usize)
    }

    /// Returns true if `id` was issued by this graph.
    pub fn contains(&self, id: ObjId) -> bool {
        (id.as_u32() as usize) < self.slots.len()
    }

    /// Replaces the value at `id`, returning the previous one.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this graph.
    pub fn replace(&mut self, id: ObjId, value: Value) -> Value {
        std::mem::replace(self.get_mut(id), value)
    }

    /// Returns the number of slots in the graph.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the graph has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    // --- convenience constructors ---

    /// Inserts the absent value.
    pub fn none(&mut self) -> ObjId {
        self.insert(Value::None)
    }

    /// Inserts a boolean.
    pub fn boolean(&mut self, b: bool) -> ObjId {
        self.insert(Value::Bool(b))
    }

    /// Inserts a machine integer.
    pub fn int(&mut self, i: i64) -> ObjId {
        self.insert(Value::Int(i))
    }

    /// Inserts an arbitrary-precision integer.
    pub fn big_int(&mut self, i: BigInt) -> ObjId {
        self.insert(Value::BigInt(i))
    }

    /// Inserts a float.
    pub fn float(&mut self, f: f64) -> ObjId {
        self.insert(Value::Float(f))
    }

    /// Inserts a complex number.
    pub fn complex(&mut self, re: f64, im: f64) -> ObjId {
        self.insert(Value::Complex(Complex64::new(re, im)))
    }

    /// Inserts a byte string.
    pub fn bytes(&mut self, b: impl Into<Vec<u8>>) -> ObjId {
        self.insert(Value::Bytes(b.into()))
    }

    /// Inserts a text string.
    pub fn text(&mut self, s: impl Into<String>) -> ObjId {
        self.insert(Value::Text(s.into()))
    }

    /// Inserts a tuple of existing ids.
    pub fn tuple(&mut self, items: Vec<ObjId>) -> ObjId {
        self.insert(Value::Tuple(items))
    }

    /// Inserts a list of existing ids.
    pub fn list(&mut self, items: Vec<ObjId>) -> ObjId {
        self.insert(Value::List(items))
    }

    /// Inserts a mapping of existing id pairs.
    pub fn dict(&mut self, pairs: Vec<(ObjId, ObjId)>) -> ObjId {
        self.insert(Value::Dict(pairs))
    }

    /// Inserts a generic object.
    pub fn object(&mut self, instance: Instance) -> ObjId {
        self.insert(Value::Object(instance))
    }

    /// Inserts a class/function reference.
    pub fn global(&mut self, module: impl Into<String>, name: impl Into<String>) -> ObjId {
        self.insert(Value::Global(GlobalRef::new(module, name)))
    }

    /// Inserts an external numeric array.
    pub fn typed_array(&mut self, array: TypedArray) -> ObjId {
        self.insert(Value::TypedArray(array))
    }

    /// Cycle-safe structural equality between `a` in this graph and `b` in
    /// `other`.
    ///
    /// Containers compare element-wise; mappings compare independent of
    /// pair order; objects compare by class and per-name field lookup.
    /// Cycles are handled by bisimulation: a pair of ids already under
    /// comparison is assumed equal. `NaN` floats compare unequal, like
    /// `f64` itself.
    pub fn graph_eq(&self, a: ObjId, other: &ValueGraph, b: ObjId) -> bool {
        let mut assumed = HashSet::new();
        self.eq_inner(a, other, b, &mut assumed)
    }

    fn eq_inner(
        &self,
        a: ObjId,
        other: &ValueGraph,
        b: ObjId,
        assumed: &mut HashSet<(u32, u32)>,
    ) -> bool {
        if !assumed.insert((a.as_u32(), b.as_u32())) {
            return true;
        }
        let (va, vb) = match (self.try_get(a), other.try_get(b)) {
            (Some(va), Some(vb)) => (va, vb),
            _ => return false,
        };
        match (va, vb) {
            (Value::None, Value::None) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::BigInt(x), Value::BigInt(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => x == y,
            (Value::Complex(x), Value::Complex(y)) => x == y,
            (Value::Bytes(x), Value::Bytes(y)) => x == y,
            (Value::Text(x), Value::Text(y)) => x == y,
            (Value::Global(x), Value::Global(y)) => x == y,
            (Value::TypedArray(x), Value::TypedArray(y)) => x == y,
            (Value::Tuple(xs), Value::Tuple(ys)) | (Value::List(xs), Value::List(ys)) => {
                xs.len() == ys.len()
                    && xs
                        .iter()
                        .zip(ys.iter())
                        .all(|(&x, &y)| self.eq_inner(x, other, y, assumed))
            }
            (Value::Dict(xs), Value::Dict(ys)) => self.dict_eq(xs, other, ys, assumed),
            (Value::Object(x), Value::Object(y)) => {
                x.class == y.class
                    && self.table_eq(&x.fields, other, &y.fields, assumed)
                    && self.table_eq(&x.slots, other, &y.slots, assumed)
            }
            _ => false,
        }
    }

    fn table_eq(
        &self,
        xs: &IndexMap<String, ObjId>,
        other: &ValueGraph,
        ys: &IndexMap<String, ObjId>,
        assumed: &mut HashSet<(u32, u32)>,
    ) -> bool {
        xs.len() == ys.len()
            && xs.iter().all(|(name, &x)| {
                ys.get(name)
                    .is_some_and(|&y| self.eq_inner(x, other, y, assumed))
            })
    }

    // Pair order is not significant for mappings, so each left pair hunts
    // for an unmatched right pair. Candidate trials run on a scratch copy
    // of the assumption set; only a successful match is committed.
    fn dict_eq(
        &self,
        xs: &[(ObjId, ObjId)],
        other: &ValueGraph,
        ys: &[(ObjId, ObjId)],
        assumed: &mut HashSet<(u32, u32)>,
    ) -> bool {
        if xs.len() != ys.len() {
            return false;
        }
        let mut taken = vec![false; ys.len()];
        for &(xk, xv) in xs {
            let mut matched = false;
            for (j, &(yk, yv)) in ys.iter().enumerate() {
                if taken[j] {
                    continue;
                }
                let mut trial = assumed.clone();
                if self.eq_inner(xk, other, yk, &mut trial)
                    && self.eq_inner(xv, other, yv, &mut trial)
                {
                    *assumed = trial;
                    taken[j] = true;
                    matched = true;
                    break;
                }
            }
            if !matched {
                return false;
            }
        }
        true
    }
}
