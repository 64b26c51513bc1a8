//! The generic object protocol: default state capture, custom reducers
//! and factories, state hooks, slots, and the failure modes.

use std::sync::Arc;

use hickle::protocol::{tag, ATTR_TYPE, META};
use hickle::{
    AttrValue, BasicClass, Construct, Ctor, GlobalRef, GlobalTable, Hickle, HickleError, Instance,
    MemStore, ObjId, Pickler, ReduceSpec, Reducer, Registry, Result, Store, Unpickler, Value,
    ValueGraph,
};

fn config_class() -> GlobalRef {
    GlobalRef::new("app", "Config")
}

fn point_class() -> GlobalRef {
    GlobalRef::new("geo", "Point")
}

fn new_config(graph: &mut ValueGraph, port: i64, name: &str) -> ObjId {
    let port = graph.int(port);
    let name = graph.text(name);
    let mut inst = Instance::new(config_class());
    inst.fields.insert("port".to_string(), port);
    inst.fields.insert("name".to_string(), name);
    graph.object(inst)
}

fn config_resolver() -> Box<GlobalTable> {
    let mut table = GlobalTable::new();
    table.register_class("app", "Config");
    Box::new(table)
}

#[test]
fn default_capture_roundtrips_fields() {
    let mut graph = ValueGraph::new();
    let obj = new_config(&mut graph, 8080, "primary");

    let mut store = MemStore::new();
    Hickle::dump(&mut store, &mut graph, obj, "/cfg").unwrap();

    // Default capture: INST tag, class reference under the metadata
    // namespace, fields folded into the node's own children.
    assert_eq!(
        store.get_attr("/cfg", ATTR_TYPE).unwrap(),
        Some(AttrValue::Str(tag::INST.to_string()))
    );
    assert!(store.has_path(&format!("/cfg/{META}/cls")));
    assert!(store.has_path(&format!("/cfg/{META}/args")));
    assert!(store.has_path("/cfg/port"));
    assert!(store.has_path("/cfg/name"));

    let (decoded, root) = Hickle::load(&store, config_resolver(), "/cfg").unwrap();
    assert!(graph.graph_eq(obj, &decoded, root));
}

#[test]
fn nested_instances_roundtrip() {
    let mut graph = ValueGraph::new();
    let inner = new_config(&mut graph, 1234, "inner");
    let outer_name = graph.text("outer");
    let mut outer = Instance::new(config_class());
    outer.fields.insert("name".to_string(), outer_name);
    outer.fields.insert("fallback".to_string(), inner);
    let outer = graph.object(outer);

    let mut store = MemStore::new();
    Hickle::dump(&mut store, &mut graph, outer, "/cfg").unwrap();
    let (decoded, root) = Hickle::load(&store, config_resolver(), "/cfg").unwrap();
    assert!(graph.graph_eq(outer, &decoded, root));
}

#[test]
fn self_referential_object_roundtrips() {
    let mut graph = ValueGraph::new();
    let obj = new_config(&mut graph, 1, "loop");
    if let Value::Object(inst) = graph.get_mut(obj) {
        inst.fields.insert("me".to_string(), obj);
    }

    let mut store = MemStore::new();
    Hickle::dump(&mut store, &mut graph, obj, "/cfg").unwrap();
    let (decoded, root) = Hickle::load(&store, config_resolver(), "/cfg").unwrap();
    match decoded.get(root) {
        Value::Object(inst) => assert_eq!(inst.fields.get("me"), Some(&root)),
        other => panic!("expected an object, got {other:?}"),
    }
    assert!(graph.graph_eq(obj, &decoded, root));
}

#[test]
fn slot_state_roundtrips_through_content() {
    let mut graph = ValueGraph::new();
    let a = graph.int(1);
    let s = graph.int(2);
    let mut inst = Instance::new(config_class());
    inst.fields.insert("a".to_string(), a);
    inst.slots.insert("s".to_string(), s);
    let obj = graph.object(inst);

    let mut store = MemStore::new();
    Hickle::dump(&mut store, &mut graph, obj, "/cfg").unwrap();
    assert!(store.has_path(&format!("/cfg/{META}/content")));

    let (decoded, root) = Hickle::load(&store, config_resolver(), "/cfg").unwrap();
    match decoded.get(root) {
        Value::Object(inst) => {
            assert!(inst.fields.contains_key("a"));
            assert!(inst.slots.contains_key("s"));
        }
        other => panic!("expected an object, got {other:?}"),
    }
    assert!(graph.graph_eq(obj, &decoded, root));
}

// --- custom reducer + factory: constructor arguments ---

struct PointReducer;

impl Reducer for PointReducer {
    fn reduce(&self, graph: &mut ValueGraph, obj: ObjId) -> Result<ReduceSpec> {
        let (x, y) = match graph.get(obj) {
            Value::Object(inst) => (
                inst.fields.get("x").copied(),
                inst.fields.get("y").copied(),
            ),
            _ => (None, None),
        };
        let (x, y) = (
            x.ok_or_else(|| HickleError::Encoding("point has no x".into()))?,
            y.ok_or_else(|| HickleError::Encoding("point has no y".into()))?,
        );
        Ok(ReduceSpec::new(Ctor::Class(point_class()), vec![x, y]))
    }
}

struct PointFactory;

impl Construct for PointFactory {
    fn construct(&self, graph: &mut ValueGraph, args: &[ObjId]) -> Result<ObjId> {
        if args.len() != 2 {
            return Err(HickleError::Construction(format!(
                "Point takes two arguments, got {}",
                args.len()
            )));
        }
        let mut inst = Instance::new(point_class());
        inst.fields.insert("x".to_string(), args[0]);
        inst.fields.insert("y".to_string(), args[1]);
        Ok(graph.insert(Value::Object(inst)))
    }
}

#[test]
fn reducer_roundtrips_constructor_arguments() {
    let mut graph = ValueGraph::new();
    let x = graph.float(1.5);
    let y = graph.float(-0.5);
    let mut inst = Instance::new(point_class());
    inst.fields.insert("x".to_string(), x);
    inst.fields.insert("y".to_string(), y);
    let obj = graph.object(inst);

    let mut registry = Registry::standard();
    registry.register_reducer(point_class(), Arc::new(PointReducer));

    let mut store = MemStore::new();
    Pickler::with_registry(&mut store, registry)
        .encode_one(&mut graph, obj, "/pt")
        .unwrap();
    assert_eq!(
        store.get_attr("/pt", ATTR_TYPE).unwrap(),
        Some(AttrValue::Str(tag::REDUCE.to_string()))
    );
    assert!(store.has_path(&format!("/pt/{META}/cls")));

    let mut table = GlobalTable::new();
    table.register("geo", "Point", Arc::new(PointFactory));
    let (decoded, root) = Hickle::load(&store, Box::new(table), "/pt").unwrap();
    assert!(graph.graph_eq(obj, &decoded, root));
}

// --- factory function + extend-items ---

struct StackReducer;

impl Reducer for StackReducer {
    fn reduce(&self, graph: &mut ValueGraph, obj: ObjId) -> Result<ReduceSpec> {
        let items = match graph.get(obj) {
            Value::Object(inst) => match inst.fields.get("items") {
                Some(&list) => match graph.get(list) {
                    Value::List(v) => v.clone(),
                    _ => Vec::new(),
                },
                None => Vec::new(),
            },
            _ => Vec::new(),
        };
        Ok(ReduceSpec::new(Ctor::Func(GlobalRef::new("col", "make_stack")), Vec::new())
            .with_list_items(items))
    }
}

struct MakeStack;

impl Construct for MakeStack {
    fn construct(&self, graph: &mut ValueGraph, _args: &[ObjId]) -> Result<ObjId> {
        Ok(graph.insert(Value::List(Vec::new())))
    }
}

#[test]
fn list_items_extend_the_rebuilt_object() {
    let mut graph = ValueGraph::new();
    let items: Vec<ObjId> = (1..=3).map(|i| graph.int(i)).collect();
    let list = graph.list(items);
    let mut inst = Instance::new(GlobalRef::new("col", "Stack"));
    inst.fields.insert("items".to_string(), list);
    let obj = graph.object(inst);

    let mut registry = Registry::standard();
    registry.register_reducer(GlobalRef::new("col", "Stack"), Arc::new(StackReducer));

    let mut store = MemStore::new();
    Pickler::with_registry(&mut store, registry)
        .encode_one(&mut graph, obj, "/stack")
        .unwrap();

    let mut table = GlobalTable::new();
    table.register("col", "make_stack", Arc::new(MakeStack));
    let (decoded, root) = Hickle::load(&store, Box::new(table), "/stack").unwrap();
    assert!(graph.graph_eq(list, &decoded, root));
}

// --- mapping extend-items ---

struct TableReducer;

impl Reducer for TableReducer {
    fn reduce(&self, graph: &mut ValueGraph, obj: ObjId) -> Result<ReduceSpec> {
        let pairs = match graph.get(obj) {
            Value::Object(inst) => match inst.fields.get("entries") {
                Some(&d) => match graph.get(d) {
                    Value::Dict(p) => p.clone(),
                    _ => Vec::new(),
                },
                None => Vec::new(),
            },
            _ => Vec::new(),
        };
        Ok(ReduceSpec::new(Ctor::Func(GlobalRef::new("col", "make_table")), Vec::new())
            .with_dict_items(pairs))
    }
}

struct MakeTable;

impl Construct for MakeTable {
    fn construct(&self, graph: &mut ValueGraph, _args: &[ObjId]) -> Result<ObjId> {
        Ok(graph.insert(Value::Dict(Vec::new())))
    }
}

#[test]
fn dict_items_extend_the_rebuilt_object() {
    let mut graph = ValueGraph::new();
    let k = graph.text("answer");
    let v = graph.int(42);
    let entries = graph.dict(vec![(k, v)]);
    let mut inst = Instance::new(GlobalRef::new("col", "Table"));
    inst.fields.insert("entries".to_string(), entries);
    let obj = graph.object(inst);

    let mut registry = Registry::standard();
    registry.register_reducer(GlobalRef::new("col", "Table"), Arc::new(TableReducer));

    let mut store = MemStore::new();
    Pickler::with_registry(&mut store, registry)
        .encode_one(&mut graph, obj, "/table")
        .unwrap();

    let mut table = GlobalTable::new();
    table.register("col", "make_table", Arc::new(MakeTable));
    let (decoded, root) = Hickle::load(&store, Box::new(table), "/table").unwrap();
    assert!(graph.graph_eq(entries, &decoded, root));
}

// --- object-level state hook ---

struct BoxReducer;

impl Reducer for BoxReducer {
    fn reduce(&self, graph: &mut ValueGraph, obj: ObjId) -> Result<ReduceSpec> {
        let payload = match graph.get(obj) {
            Value::Object(inst) => inst.fields.get("payload").copied(),
            _ => None,
        };
        let payload =
            payload.ok_or_else(|| HickleError::Encoding("box has no payload".into()))?;
        Ok(ReduceSpec::new(Ctor::Class(GlobalRef::new("app", "Box")), Vec::new())
            .with_state(payload))
    }
}

struct BoxFactory;

impl Construct for BoxFactory {
    fn construct(&self, graph: &mut ValueGraph, _args: &[ObjId]) -> Result<ObjId> {
        Ok(graph.insert(Value::Object(Instance::new(GlobalRef::new("app", "Box")))))
    }

    fn apply_state(&self, graph: &mut ValueGraph, obj: ObjId, state: ObjId) -> Result<bool> {
        match graph.get_mut(obj) {
            Value::Object(inst) => {
                inst.fields.insert("captured".to_string(), state);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[test]
fn apply_state_hook_takes_over_state_application() {
    let mut graph = ValueGraph::new();
    let payload = graph.int(7);
    let mut inst = Instance::new(GlobalRef::new("app", "Box"));
    inst.fields.insert("payload".to_string(), payload);
    let obj = graph.object(inst);

    let mut registry = Registry::standard();
    registry.register_reducer(GlobalRef::new("app", "Box"), Arc::new(BoxReducer));

    let mut store = MemStore::new();
    Pickler::with_registry(&mut store, registry)
        .encode_one(&mut graph, obj, "/box")
        .unwrap();
    // Non-mapping state goes under the metadata namespace.
    assert!(store.has_path(&format!("/box/{META}/content")));

    let mut table = GlobalTable::new();
    table.register("app", "Box", Arc::new(BoxFactory));
    let (decoded, root) = Hickle::load(&store, Box::new(table), "/box").unwrap();
    match decoded.get(root) {
        Value::Object(inst) => {
            let captured = inst.fields.get("captured").copied().unwrap();
            assert!(matches!(decoded.get(captured), Value::Int(7)));
        }
        other => panic!("expected an object, got {other:?}"),
    }
}

// --- globals and extension codes ---

#[test]
fn global_value_roundtrips_by_qualified_name() {
    let mut graph = ValueGraph::new();
    let g = graph.global("math", "sqrt");

    let mut store = MemStore::new();
    Hickle::dump(&mut store, &mut graph, g, "/fn").unwrap();
    assert_eq!(
        store.get_attr("/fn", ATTR_TYPE).unwrap(),
        Some(AttrValue::Str(tag::GLOBAL.to_string()))
    );

    let mut table = GlobalTable::new();
    table.register("math", "sqrt", Arc::new(BasicClass::new("math", "sqrt")));
    let (decoded, root) = Hickle::load(&store, Box::new(table), "/fn").unwrap();
    assert!(graph.graph_eq(g, &decoded, root));
}

#[test]
fn registered_extension_code_replaces_the_name_record() {
    let mut graph = ValueGraph::new();
    let g = graph.global("math", "sqrt");

    let mut registry = Registry::standard();
    registry
        .register_extension(GlobalRef::new("math", "sqrt"), 7)
        .unwrap();

    let mut store = MemStore::new();
    Pickler::with_registry(&mut store, registry.clone())
        .encode_one(&mut graph, g, "/fn")
        .unwrap();
    assert_eq!(
        store.get_attr("/fn", ATTR_TYPE).unwrap(),
        Some(AttrValue::Str(tag::EXT.to_string()))
    );

    let mut table = GlobalTable::new();
    table.register("math", "sqrt", Arc::new(BasicClass::new("math", "sqrt")));
    let mut unpickler = Unpickler::with_parts(&store, registry, Box::new(table));
    let root = unpickler.decode_one("/fn").unwrap();
    assert!(graph.graph_eq(g, unpickler.graph(), root));
}

// --- failure modes ---

#[test]
fn unresolved_name_fails_decoding() {
    let mut graph = ValueGraph::new();
    let obj = new_config(&mut graph, 1, "x");
    let mut store = MemStore::new();
    Hickle::dump(&mut store, &mut graph, obj, "/cfg").unwrap();

    let err = Hickle::load(&store, Box::new(GlobalTable::new()), "/cfg").unwrap_err();
    assert!(matches!(err, HickleError::NameResolution(_)), "{err}");
}

struct ArgsReducer;

impl Reducer for ArgsReducer {
    fn reduce(&self, graph: &mut ValueGraph, _obj: ObjId) -> Result<ReduceSpec> {
        let arg = graph.int(5);
        Ok(ReduceSpec::new(Ctor::Class(config_class()), vec![arg]))
    }
}

#[test]
fn rejected_constructor_arguments_fail_decoding() {
    let mut graph = ValueGraph::new();
    let obj = graph.object(Instance::new(config_class()));

    let mut registry = Registry::standard();
    registry.register_reducer(config_class(), Arc::new(ArgsReducer));

    let mut store = MemStore::new();
    Pickler::with_registry(&mut store, registry)
        .encode_one(&mut graph, obj, "/cfg")
        .unwrap();

    // BasicClass takes no constructor arguments.
    let err = Hickle::load(&store, config_resolver(), "/cfg").unwrap_err();
    assert!(matches!(err, HickleError::Construction(_)), "{err}");
}

struct MismatchedReducer;

impl Reducer for MismatchedReducer {
    fn reduce(&self, _graph: &mut ValueGraph, _obj: ObjId) -> Result<ReduceSpec> {
        Ok(ReduceSpec::new(
            Ctor::Class(GlobalRef::new("other", "Thing")),
            Vec::new(),
        ))
    }
}

#[test]
fn reducer_class_mismatch_fails_encoding() {
    let mut graph = ValueGraph::new();
    let obj = graph.object(Instance::new(config_class()));

    let mut registry = Registry::standard();
    registry.register_reducer(config_class(), Arc::new(MismatchedReducer));

    let mut store = MemStore::new();
    let err = Pickler::with_registry(&mut store, registry)
        .encode_one(&mut graph, obj, "/cfg")
        .unwrap_err();
    assert!(matches!(err, HickleError::Encoding(_)), "{err}");
}
