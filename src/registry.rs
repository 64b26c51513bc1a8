//! The type-kind registry.
//!
//! The registry is the dispatch table of the engine: it maps a value's
//! runtime classification ([`ValueKind`]) to its encode routine and a
//! stored type tag back to its decode routine. Lookup failure on the
//! encode side is what routes a value into the generic object protocol.
//!
//! It also owns the open ends of the wire format: registered numeric-array
//! family tags, per-class [`Reducer`]s, and the extension table mapping
//! qualified names to compact integer codes.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::{HickleError, Result};
use crate::pickler::Pickler;
use crate::protocol::tag;
use crate::reduce::Reducer;
use crate::unpickler::Unpickler;
use crate::value::{GlobalRef, ObjId, ValueGraph, ValueKind};

/// An encode routine: writes the value `id` at `path`.
pub type EncodeFn = fn(&mut Pickler<'_>, &mut ValueGraph, &str, ObjId) -> Result<()>;

/// A decode routine: rebuilds the node at `path` whose type tag is the
/// third argument.
pub type DecodeFn = fn(&mut Unpickler<'_>, &str, &str) -> Result<ObjId>;

macro_rules! enc {
    ($method:ident) => {{
        fn adapter(p: &mut Pickler<'_>, g: &mut ValueGraph, path: &str, id: ObjId) -> Result<()> {
            p.$method(g, path, id)
        }
        adapter as EncodeFn
    }};
}

macro_rules! dec {
    ($method:ident) => {{
        fn adapter(u: &mut Unpickler<'_>, path: &str, tag: &str) -> Result<ObjId> {
            u.$method(path, tag)
        }
        adapter as DecodeFn
    }};
}

/// Bidirectional table of extension codes.
///
/// Codes are positive integers standing in for frequently-used qualified
/// names; a registered name encodes as a compact `EXT` leaf instead of a
/// `GLOBAL` one.
#[derive(Debug, Clone, Default)]
pub struct ExtensionRegistry {
    by_name: HashMap<GlobalRef, i32>,
    by_code: HashMap<i32, GlobalRef>,
}

impl ExtensionRegistry {
    /// Registers `code` for a qualified name. Codes must be positive and
    /// both directions must be fresh.
    pub fn register(&mut self, gref: GlobalRef, code: i32) -> Result<()> {
        if code <= 0 {
            return Err(HickleError::Encoding(format!(
                "extension code {code} for {gref} must be positive"
            )));
        }
        if self.by_code.contains_key(&code) {
            return Err(HickleError::Encoding(format!(
                "extension code {code} is already registered"
            )));
        }
        if self.by_name.contains_key(&gref) {
            return Err(HickleError::Encoding(format!(
                "extension name {gref} is already registered"
            )));
        }
        self.by_name.insert(gref.clone(), code);
        self.by_code.insert(code, gref);
        Ok(())
    }

    /// The code for a name, if registered.
    pub fn code_for(&self, gref: &GlobalRef) -> Option<i32> {
        self.by_name.get(gref).copied()
    }

    /// The name for a code, if registered.
    pub fn name_for(&self, code: i32) -> Option<&GlobalRef> {
        self.by_code.get(&code)
    }
}

/// The dispatch table driving both directions of the engine.
///
/// [`Registry::standard`] registers every built-in kind and tag plus the
/// default numeric-array family. [`ValueKind::Object`] is deliberately
/// not registered — its absence is the fall-through into the generic
/// object protocol.
#[derive(Clone)]
pub struct Registry {
    encoders: HashMap<ValueKind, EncodeFn>,
    decoders: HashMap<String, DecodeFn>,
    families: HashSet<String>,
    reducers: HashMap<GlobalRef, Arc<dyn Reducer>>,
    extensions: ExtensionRegistry,
}

impl Registry {
    /// The standard registry: all built-in kinds and tags, the `ND` array
    /// family, no reducers, no extension codes.
    pub fn standard() -> Self {
        let mut encoders: HashMap<ValueKind, EncodeFn> = HashMap::new();
        encoders.insert(ValueKind::None, enc!(save_none));
        encoders.insert(ValueKind::Bool, enc!(save_bool));
        encoders.insert(ValueKind::Int, enc!(save_int));
        encoders.insert(ValueKind::BigInt, enc!(save_big_int));
        encoders.insert(ValueKind::Float, enc!(save_float));
        encoders.insert(ValueKind::Complex, enc!(save_complex));
        encoders.insert(ValueKind::Bytes, enc!(save_bytes));
        encoders.insert(ValueKind::Text, enc!(save_text));
        encoders.insert(ValueKind::Tuple, enc!(save_tuple));
        encoders.insert(ValueKind::List, enc!(save_list));
        encoders.insert(ValueKind::Dict, enc!(save_dict));
        encoders.insert(ValueKind::Global, enc!(save_global));
        encoders.insert(ValueKind::TypedArray, enc!(save_typed_array));

        let mut decoders: HashMap<String, DecodeFn> = HashMap::new();
        decoders.insert(tag::NONE.into(), dec!(load_none));
        decoders.insert(tag::BOOL.into(), dec!(load_bool));
        decoders.insert(tag::INT.into(), dec!(load_int));
        decoders.insert(tag::LONG.into(), dec!(load_long));
        decoders.insert(tag::FLOAT.into(), dec!(load_float));
        decoders.insert(tag::COMPLEX.into(), dec!(load_complex));
        decoders.insert(tag::STRING.into(), dec!(load_string));
        decoders.insert(tag::UNICODE.into(), dec!(load_unicode));
        decoders.insert(tag::TUPLE.into(), dec!(load_sequence));
        decoders.insert(tag::LIST.into(), dec!(load_sequence));
        decoders.insert(tag::DICT.into(), dec!(load_dict));
        decoders.insert(tag::REDUCE.into(), dec!(load_reduce));
        decoders.insert(tag::INST.into(), dec!(load_inst));
        decoders.insert(tag::GLOBAL.into(), dec!(load_global));
        decoders.insert(tag::EXT.into(), dec!(load_ext));
        decoders.insert(tag::REF.into(), dec!(load_ref));

        let mut registry = Self {
            encoders,
            decoders,
            families: HashSet::new(),
            reducers: HashMap::new(),
            extensions: ExtensionRegistry::default(),
        };
        // The built-in array family bypasses the collision check: the tag
        // set above never contains it.
        registry.families.insert(tag::ND.to_string());
        registry
            .decoders
            .insert(tag::ND.to_string(), dec!(load_typed_array));
        registry
    }

    /// The encode routine for a kind, if one is registered.
    pub fn encode_fn(&self, kind: ValueKind) -> Option<EncodeFn> {
        self.encoders.get(&kind).copied()
    }

    /// The decode routine for a stored tag, if one is registered.
    pub fn decode_fn(&self, tag: &str) -> Option<DecodeFn> {
        self.decoders.get(tag).copied()
    }

    /// Registers a new numeric-array family tag. The tag must not collide
    /// with any registered decode tag.
    pub fn register_array_family(&mut self, family: &str) -> Result<()> {
        if family.is_empty() || self.decoders.contains_key(family) {
            return Err(HickleError::Encoding(format!(
                "array family tag {family:?} is empty or already in use"
            )));
        }
        self.families.insert(family.to_string());
        self.decoders.insert(family.to_string(), dec!(load_typed_array));
        Ok(())
    }

    /// Returns true if `family` is a registered array family tag.
    pub fn is_array_family(&self, family: &str) -> bool {
        self.families.contains(family)
    }

    /// Registers a decomposition hook for a class.
    pub fn register_reducer(&mut self, class: GlobalRef, reducer: Arc<dyn Reducer>) {
        self.reducers.insert(class, reducer);
    }

    /// The reducer for a class, if one is registered.
    pub fn reducer_for(&self, class: &GlobalRef) -> Option<Arc<dyn Reducer>> {
        self.reducers.get(class).cloned()
    }

    /// Registers an extension code for a qualified name.
    pub fn register_extension(&mut self, gref: GlobalRef, code: i32) -> Result<()> {
        self.extensions.register(gref, code)
    }

    /// The extension code for a name, if registered.
    pub fn extension_code(&self, gref: &GlobalRef) -> Option<i32> {
        self.extensions.code_for(gref)
    }

    /// The qualified name for an extension code, if registered.
    pub fn extension_name(&self, code: i32) -> Option<&GlobalRef> {
        self.extensions.name_for(code)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("encoders", &self.encoders.len())
            .field("decoders", &self.decoders.len())
            .field("families", &self.families)
            .field("reducers", &self.reducers.len())
            .field("extensions", &self.extensions.by_code.len())
            .finish()
    }
}
