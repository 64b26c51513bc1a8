//! The generic object protocol.
//!
//! When the type-kind registry has no routine for a value — which in this
//! engine means any [`Value::Object`](crate::value::Value::Object) — the
//! value is decomposed into an explicit [`ReduceSpec`]: a constructor
//! reference, an argument tuple, optional captured state, and optional
//! sequence/mapping extend-items. The decoder replays the spec: resolve
//! the constructor by name, build, **memoize**, extend, then apply state.
//!
//! There is no reflection anywhere in the contract. Decomposition is a
//! [`Reducer`] registered per class; reconstruction is a [`Construct`]
//! factory found through a host-supplied [`Resolver`]. Objects without a
//! registered reducer fall back to the default dict-based state capture
//! (class reference + empty arguments + field table).

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{HickleError, Result};
use crate::value::{GlobalRef, Instance, ObjId, Value, ValueGraph};

/// The constructor half of a [`ReduceSpec`].
///
/// `Class` is the construct-by-raw-allocation convention: decode calls
/// [`Construct::allocate`] on the named class. `Func` names a factory
/// function and decode calls [`Construct::construct`]. Both are callable
/// by construction, so the "non-callable constructor" failure mode of the
/// protocol cannot arise here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ctor {
    /// Rebuild by raw-allocating the named class.
    Class(GlobalRef),
    /// Rebuild by calling the named factory function.
    Func(GlobalRef),
}

impl Ctor {
    /// The qualified name behind either variant.
    pub fn global_ref(&self) -> &GlobalRef {
        match self {
            Ctor::Class(g) | Ctor::Func(g) => g,
        }
    }
}

/// The decomposition of one object: everything the decoder needs to
/// rebuild it.
#[derive(Debug, Clone)]
pub struct ReduceSpec {
    /// How to obtain a fresh object.
    pub ctor: Ctor,
    /// Constructor arguments, recursively encoded.
    pub args: Vec<ObjId>,
    /// Captured state; a mapping folds into the object node's own
    /// children, anything else is written under the metadata namespace.
    pub state: Option<ObjId>,
    /// Items to append to the rebuilt object as a sequence.
    pub list_items: Option<Vec<ObjId>>,
    /// Pairs to insert into the rebuilt object as a mapping.
    pub dict_items: Option<Vec<(ObjId, ObjId)>>,
}

impl ReduceSpec {
    /// A spec with only a constructor and arguments.
    pub fn new(ctor: Ctor, args: Vec<ObjId>) -> Self {
        Self {
            ctor,
            args,
            state: None,
            list_items: None,
            dict_items: None,
        }
    }

    /// Attaches captured state.
    pub fn with_state(mut self, state: ObjId) -> Self {
        self.state = Some(state);
        self
    }

    /// Attaches sequence-extend items.
    pub fn with_list_items(mut self, items: Vec<ObjId>) -> Self {
        self.list_items = Some(items);
        self
    }

    /// Attaches mapping-extend items.
    pub fn with_dict_items(mut self, pairs: Vec<(ObjId, ObjId)>) -> Self {
        self.dict_items = Some(pairs);
        self
    }
}

/// Per-class decomposition hook, registered in the
/// [`Registry`](crate::registry::Registry).
///
/// The reducer receives the graph mutably so it can mint argument or state
/// values that do not yet exist as graph slots.
pub trait Reducer: Send + Sync {
    /// Decomposes `obj` into a [`ReduceSpec`].
    fn reduce(&self, graph: &mut ValueGraph, obj: ObjId) -> Result<ReduceSpec>;
}

/// Decode-side factory for one qualified name.
///
/// `construct` is a full constructor call; `allocate` is the raw
/// allocation used by the class path of a `REDUCE` node and defaults to
/// `construct`. `apply_state` lets a factory take over state application
/// entirely; returning `Ok(false)` falls back to the engine's default
/// (two-part or mapping state into the field tables).
pub trait Construct: Send + Sync {
    /// Builds an object from the decoded argument tuple.
    fn construct(&self, graph: &mut ValueGraph, args: &[ObjId]) -> Result<ObjId>;

    /// Raw allocation; state and extend-items arrive afterwards.
    fn allocate(&self, graph: &mut ValueGraph, args: &[ObjId]) -> Result<ObjId> {
        self.construct(graph, args)
    }

    /// Object-level state hook. Return `Ok(true)` when the state was
    /// consumed.
    fn apply_state(&self, _graph: &mut ValueGraph, _obj: ObjId, _state: ObjId) -> Result<bool> {
        Ok(false)
    }
}

/// Pluggable qualified-name lookup supplied by the host application.
///
/// Name resolution is open-world: the engine never imports or scans
/// anything. A name the resolver does not know fails decoding with
/// [`HickleError::NameResolution`].
pub trait Resolver: Send + Sync {
    /// Looks up the factory for `module`.`name`.
    fn find(&self, module: &str, name: &str) -> Option<Arc<dyn Construct>>;
}

/// The stock map-backed [`Resolver`].
#[derive(Default)]
pub struct GlobalTable {
    map: HashMap<(String, String), Arc<dyn Construct>>,
}

impl GlobalTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under a qualified name.
    pub fn register(
        &mut self,
        module: impl Into<String>,
        name: impl Into<String>,
        factory: Arc<dyn Construct>,
    ) {
        self.map.insert((module.into(), name.into()), factory);
    }

    /// Registers a [`BasicClass`] under a qualified name; the common case
    /// for plain field-table objects written through the default capture.
    pub fn register_class(&mut self, module: impl Into<String>, name: impl Into<String>) {
        let module = module.into();
        let name = name.into();
        let factory = Arc::new(BasicClass::new(module.clone(), name.clone()));
        self.register(module, name, factory);
    }
}

impl Resolver for GlobalTable {
    fn find(&self, module: &str, name: &str) -> Option<Arc<dyn Construct>> {
        self.map
            .get(&(module.to_string(), name.to_string()))
            .cloned()
    }
}

/// The stock factory for plain objects: builds an empty [`Instance`] of
/// its class and lets the engine's default state application fill the
/// field tables.
///
/// A `BasicClass` takes no constructor arguments; a spec that supplies
/// some fails with [`HickleError::Construction`].
pub struct BasicClass {
    class: GlobalRef,
}

impl BasicClass {
    /// Creates a factory for `module`.`name`.
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            class: GlobalRef::new(module, name),
        }
    }
}

impl Construct for BasicClass {
    fn construct(&self, graph: &mut ValueGraph, args: &[ObjId]) -> Result<ObjId> {
        if !args.is_empty() {
            return Err(HickleError::Construction(format!(
                "constructor for {} takes no arguments, got {}",
                self.class,
                args.len()
            )));
        }
        Ok(graph.insert(Value::Object(Instance::new(self.class.clone()))))
    }
}
