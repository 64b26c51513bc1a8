//! Wire-level conventions: type tags, attribute names, the reserved
//! metadata namespace, and the child-naming rules.
//!
//! Every node except an untagged raw leaf carries a `pickletype` attribute
//! naming its decode routine. Composite nodes reserve the child name `__`
//! for protocol metadata — constructor references, argument tuples, state
//! blobs and surrogate key entries — so it can never collide with an
//! ordinary mapping key or object field, which are routed to surrogate
//! names instead.

use std::cmp::Ordering;

/// The reserved metadata child name under composite nodes.
pub const META: &str = "__";

/// Attribute selecting the decode routine for a node.
pub const ATTR_TYPE: &str = "pickletype";

/// Attribute on a `REF` group: absolute path of the referenced node.
pub const ATTR_TARGET: &str = "target";

/// Marker attribute distinguishing an empty sequence/string/integer from
/// absent data.
pub const ATTR_EMPTY: &str = "empty";

/// Marker attribute on a `REDUCE` group whose captured state was folded
/// into the group's direct children.
pub const ATTR_STATE: &str = "has_state";

/// Attribute carrying the logical shape of an external numeric array.
pub const ATTR_SHAPE: &str = "shape";

/// Metadata child: constructor class reference.
pub const META_CLS: &str = "cls";
/// Metadata child: constructor function reference.
pub const META_FUNC: &str = "func";
/// Metadata child: constructor argument tuple.
pub const META_ARGS: &str = "args";
/// Metadata child: sequence-extend items.
pub const META_LISTITEMS: &str = "listitems";
/// Metadata child: mapping-extend items.
pub const META_DICTITEMS: &str = "dictitems";
/// Metadata child: non-mapping captured state.
pub const META_CONTENT: &str = "content";

/// The type tags written as the `pickletype` attribute.
pub mod tag {
    /// The absent value.
    pub const NONE: &str = "NONE";
    /// Boolean scalar.
    pub const BOOL: &str = "BOOL";
    /// Machine integer scalar.
    pub const INT: &str = "INT";
    /// Arbitrary-precision integer (big-endian signed bytes).
    pub const LONG: &str = "LONG";
    /// Float scalar.
    pub const FLOAT: &str = "FLOAT";
    /// Complex scalar.
    pub const COMPLEX: &str = "COMPLEX";
    /// Byte string.
    pub const STRING: &str = "STRING";
    /// UTF-8 text.
    pub const UNICODE: &str = "UNICODE";
    /// Immutable sequence (flattened leaf or indexed group).
    pub const TUPLE: &str = "TUPLE";
    /// Mutable sequence (flattened leaf or indexed group).
    pub const LIST: &str = "LIST";
    /// Mapping group.
    pub const DICT: &str = "DICT";
    /// Generic object written through the default state capture.
    pub const INST: &str = "INST";
    /// Generic object written through a registered reducer.
    pub const REDUCE: &str = "REDUCE";
    /// Qualified-name reference to a class/function/type.
    pub const GLOBAL: &str = "GLOBAL";
    /// Compact extension-code reference.
    pub const EXT: &str = "EXT";
    /// Back-reference to an already-written node.
    pub const REF: &str = "REF";
    /// The built-in numeric-array family.
    pub const ND: &str = "ND";
}

/// Returns true if `s` is a bare ASCII identifier
/// (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn is_bare_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Returns true if a text mapping key may be used directly as a child
/// name. Everything else — non-identifier text, the reserved name, and
/// non-text keys — takes a surrogate name.
pub fn is_direct_key(s: &str) -> bool {
    is_bare_identifier(s) && s != META
}

/// Child-name ordering for indexed sequence children: shorter names first,
/// then lexical. This restores `_0, _1, … _10, _11` in numeric order.
pub fn child_order(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Formats a shape attribute value (`"2,3,4"`).
pub fn format_shape(shape: &[usize]) -> String {
    let parts: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    parts.join(",")
}

/// Parses a shape attribute value produced by [`format_shape`].
pub fn parse_shape(s: &str) -> Option<Vec<usize>> {
    if s.is_empty() {
        return Some(Vec::new());
    }
    s.split(',').map(|p| p.parse().ok()).collect()
}
