//! Round-trip coverage for scalars, strings, big integers, sequences and
//! the flattened-vs-indexed layout rules.

use hickle::num_bigint::BigInt;
use hickle::protocol::{tag, ATTR_EMPTY, ATTR_TYPE};
use hickle::{
    ArrayData, AttrValue, GlobalTable, Hickle, HickleError, MemStore, NodeKind, ObjId, Pickler,
    Registry, Store, TypedArray, Unpickler, Value, ValueGraph,
};

fn roundtrip(graph: &mut ValueGraph, id: ObjId) -> (MemStore, ValueGraph, ObjId) {
    let mut store = MemStore::new();
    Hickle::dump(&mut store, graph, id, "/data").unwrap();
    let (decoded, root) = Hickle::load(&store, Box::new(GlobalTable::new()), "/data").unwrap();
    (store, decoded, root)
}

fn assert_roundtrip(graph: &mut ValueGraph, id: ObjId) {
    let (_, decoded, root) = roundtrip(graph, id);
    assert!(
        graph.graph_eq(id, &decoded, root),
        "value did not survive the round trip: {:?}",
        graph.get(id)
    );
}

#[test]
fn scalars_roundtrip() {
    let mut graph = ValueGraph::new();
    let values = vec![
        graph.none(),
        graph.boolean(true),
        graph.boolean(false),
        graph.int(0),
        graph.int(-5),
        graph.int(i64::MAX),
        graph.float(0.5),
        graph.float(-1.25e300),
        graph.complex(1.5, -2.5),
    ];
    for id in values {
        assert_roundtrip(&mut graph, id);
    }
}

#[test]
fn strings_roundtrip() {
    let mut graph = ValueGraph::new();
    let values = vec![
        graph.bytes(b"raw \x00 bytes".to_vec()),
        graph.bytes(Vec::new()),
        graph.text("plain"),
        graph.text("héllo wörld ✓"),
        graph.text(""),
    ];
    for id in values {
        assert_roundtrip(&mut graph, id);
    }
}

#[test]
fn big_integers_roundtrip() {
    let mut graph = ValueGraph::new();
    let huge: BigInt = "123456789012345678901234567890".parse().unwrap();
    let negative: BigInt = "-987654321098765432109876543210".parse().unwrap();
    let values = vec![
        graph.big_int(BigInt::from(0)),
        graph.big_int(BigInt::from(255)),
        graph.big_int(huge),
        graph.big_int(negative),
    ];
    for id in values {
        assert_roundtrip(&mut graph, id);
    }
}

#[test]
fn zero_big_integer_uses_empty_marker() {
    let mut graph = ValueGraph::new();
    let zero = graph.big_int(BigInt::from(0));
    let (store, decoded, root) = roundtrip(&mut graph, zero);
    assert!(store.has_attr("/data", ATTR_EMPTY).unwrap());
    assert!(matches!(decoded.get(root), Value::BigInt(b) if *b == BigInt::from(0)));
}

#[test]
fn empty_containers_roundtrip_with_marker() {
    let mut graph = ValueGraph::new();
    let cases = vec![
        (graph.text(""), tag::UNICODE),
        (graph.tuple(vec![]), tag::TUPLE),
        (graph.list(vec![]), tag::LIST),
    ];
    for (id, expected_tag) in cases {
        let (store, decoded, root) = roundtrip(&mut graph, id);
        assert!(store.has_attr("/data", ATTR_EMPTY).unwrap());
        assert_eq!(
            store.get_attr("/data", ATTR_TYPE).unwrap(),
            Some(AttrValue::Str(expected_tag.to_string()))
        );
        assert!(graph.graph_eq(id, &decoded, root));
    }
}

#[test]
fn homogeneous_sequence_flattens_to_one_leaf() {
    let mut graph = ValueGraph::new();
    let items: Vec<ObjId> = (1..=7).map(|i| graph.int(i)).collect();
    let list = graph.list(items);
    let (store, decoded, root) = roundtrip(&mut graph, list);
    assert_eq!(store.node_kind("/data").unwrap(), NodeKind::Array);
    assert_eq!(store.read_array("/data").unwrap().len(), 7);
    assert!(graph.graph_eq(list, &decoded, root));
}

#[test]
fn heterogeneous_sequence_uses_indexed_children() {
    let mut graph = ValueGraph::new();
    let i1 = graph.int(1);
    let i2 = graph.int(2);
    let c = graph.text("c");
    let a = graph.text("a");
    let b = graph.text("b");
    let list = graph.list(vec![i1, i2, c, a, b]);
    let (store, decoded, root) = roundtrip(&mut graph, list);
    assert_eq!(store.node_kind("/data").unwrap(), NodeKind::Group);
    assert_eq!(
        store.children("/data").unwrap(),
        vec!["_0", "_1", "_2", "_3", "_4"]
    );
    assert!(graph.graph_eq(list, &decoded, root));
}

#[test]
fn indexed_children_restore_in_numeric_order() {
    let mut graph = ValueGraph::new();
    // Twelve mixed elements force the indexed layout and take the child
    // names past _9, where lexical order would go wrong.
    let mut items = Vec::new();
    for i in 0..11 {
        items.push(graph.int(i));
    }
    items.push(graph.text("tail"));
    let t = graph.tuple(items);
    assert_roundtrip(&mut graph, t);
}

#[test]
fn float_and_complex_tuples_flatten() {
    let mut graph = ValueGraph::new();
    let f1 = graph.float(1.0);
    let f2 = graph.float(2.0);
    let floats = graph.tuple(vec![f1, f2]);
    let c1 = graph.complex(0.0, 1.0);
    let c2 = graph.complex(2.0, -3.0);
    let complexes = graph.tuple(vec![c1, c2]);
    for id in [floats, complexes] {
        let (store, decoded, root) = roundtrip(&mut graph, id);
        assert_eq!(store.node_kind("/data").unwrap(), NodeKind::Array);
        assert!(graph.graph_eq(id, &decoded, root));
    }
}

#[test]
fn bool_sequences_never_flatten() {
    let mut graph = ValueGraph::new();
    let t = graph.boolean(true);
    let f = graph.boolean(false);
    let list = graph.list(vec![t, f]);
    let (store, decoded, root) = roundtrip(&mut graph, list);
    assert_eq!(store.node_kind("/data").unwrap(), NodeKind::Group);
    assert!(graph.graph_eq(list, &decoded, root));
}

#[test]
fn typed_array_roundtrip_preserves_shape() {
    let mut graph = ValueGraph::new();
    let arr = graph.typed_array(TypedArray {
        family: tag::ND.to_string(),
        shape: vec![2, 3],
        data: ArrayData::Float64(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
    });
    let (_, decoded, root) = roundtrip(&mut graph, arr);
    match decoded.get(root) {
        Value::TypedArray(a) => {
            assert_eq!(a.family, tag::ND);
            assert_eq!(a.shape, vec![2, 3]);
            assert_eq!(a.data.len(), 6);
        }
        other => panic!("expected a typed array, got {other:?}"),
    }
}

#[test]
fn untagged_leaf_decodes_as_raw_data() {
    let mut store = MemStore::new();
    store
        .create_array("/raw", ArrayData::Int64(vec![9, 8, 7]))
        .unwrap();
    let mut unpickler = Unpickler::new(&store);
    let id = unpickler.decode_one("/raw").unwrap();
    match unpickler.graph().get(id) {
        Value::TypedArray(a) => {
            assert_eq!(a.family, tag::ND);
            assert_eq!(a.shape, vec![3]);
        }
        other => panic!("expected a raw typed array, got {other:?}"),
    }
}

#[test]
fn custom_array_family_roundtrips() {
    let mut graph = ValueGraph::new();
    let arr = graph.typed_array(TypedArray {
        family: "GPU".to_string(),
        shape: vec![4],
        data: ArrayData::Int64(vec![1, 2, 3, 4]),
    });

    let mut registry = Registry::standard();
    registry.register_array_family("GPU").unwrap();

    let mut store = MemStore::new();
    Pickler::with_registry(&mut store, registry.clone())
        .encode_one(&mut graph, arr, "/gpu")
        .unwrap();
    assert_eq!(
        store.get_attr("/gpu", ATTR_TYPE).unwrap(),
        Some(AttrValue::Str("GPU".to_string()))
    );

    let mut unpickler = Unpickler::with_parts(&store, registry, Box::new(GlobalTable::new()));
    let root = unpickler.decode_one("/gpu").unwrap();
    assert!(graph.graph_eq(arr, unpickler.graph(), root));
}

#[test]
fn unregistered_array_family_fails_encoding() {
    let mut graph = ValueGraph::new();
    let arr = graph.typed_array(TypedArray {
        family: "GPU".to_string(),
        shape: vec![1],
        data: ArrayData::Int64(vec![0]),
    });
    let mut store = MemStore::new();
    let err = Hickle::dump(&mut store, &mut graph, arr, "/gpu").unwrap_err();
    assert!(matches!(err, HickleError::Encoding(_)), "{err}");
}

#[test]
fn nested_mixed_structure_roundtrips() {
    let mut graph = ValueGraph::new();
    let n = graph.none();
    let flag = graph.boolean(true);
    let nums: Vec<ObjId> = (0..4).map(|i| graph.int(i * 10)).collect();
    let flat = graph.list(nums);
    let label = graph.text("label");
    let inner = graph.tuple(vec![n, flag, flat]);
    let k1 = graph.text("inner");
    let k2 = graph.text("name");
    let dict = graph.dict(vec![(k1, inner), (k2, label)]);
    assert_roundtrip(&mut graph, dict);
}
