//! Container persistence: save a store image, reopen it, decode from the
//! reopened copy, and detect corruption.

use std::fs;

use tempfile::NamedTempFile;

use hickle::{GlobalTable, Hickle, HickleError, MemStore, ObjId, StoreReader, ValueGraph};

fn sample_store() -> (ValueGraph, ObjId, MemStore) {
    let mut graph = ValueGraph::new();
    let port = graph.int(443);
    let hosts: Vec<ObjId> = ["alpha", "beta"].iter().map(|h| graph.text(*h)).collect();
    let hosts = graph.list(hosts);
    let weights: Vec<ObjId> = (0..16).map(|i| graph.int(i * i)).collect();
    let weights = graph.list(weights);
    let k1 = graph.text("port");
    let k2 = graph.text("hosts");
    let k3 = graph.text("weights");
    let root = graph.dict(vec![(k1, port), (k2, hosts), (k3, weights)]);

    let mut store = MemStore::new();
    Hickle::dump(&mut store, &mut graph, root, "/data").unwrap();
    (graph, root, store)
}

#[test]
fn container_roundtrip() {
    let (graph, root, store) = sample_store();

    let file = NamedTempFile::new().unwrap();
    Hickle::save_file(file.path(), &store).unwrap();

    let reopened = Hickle::open_file(file.path()).unwrap();
    assert_eq!(reopened.len(), store.len());

    let (decoded, decoded_root) =
        Hickle::load(&reopened, Box::new(GlobalTable::new()), "/data").unwrap();
    assert!(graph.graph_eq(root, &decoded, decoded_root));
}

#[test]
fn tail_reports_the_record_count() {
    let (_, _, store) = sample_store();
    let file = NamedTempFile::new().unwrap();
    Hickle::save_file(file.path(), &store).unwrap();

    let reader = StoreReader::open(file.path()).unwrap();
    assert_eq!(reader.tail().record_count, store.len() as u64);
}

#[test]
fn corrupted_magic_is_rejected() {
    let (_, _, store) = sample_store();
    let file = NamedTempFile::new().unwrap();
    Hickle::save_file(file.path(), &store).unwrap();

    let mut bytes = fs::read(file.path()).unwrap();
    let tail_start = bytes.len() - 22;
    bytes[tail_start] ^= 0xFF;
    fs::write(file.path(), &bytes).unwrap();

    let err = Hickle::open_file(file.path()).unwrap_err();
    assert!(matches!(err, HickleError::Format(_)), "{err}");
}

#[test]
fn corrupted_record_bytes_fail_the_checksum() {
    let (_, _, store) = sample_store();
    let file = NamedTempFile::new().unwrap();
    Hickle::save_file(file.path(), &store).unwrap();

    let mut bytes = fs::read(file.path()).unwrap();
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0x01;
    fs::write(file.path(), &bytes).unwrap();

    let err = Hickle::open_file(file.path()).unwrap_err();
    assert!(matches!(err, HickleError::Format(_)), "{err}");
}

#[test]
fn truncated_file_is_rejected() {
    let (_, _, store) = sample_store();
    let file = NamedTempFile::new().unwrap();
    Hickle::save_file(file.path(), &store).unwrap();

    let bytes = fs::read(file.path()).unwrap();
    fs::write(file.path(), &bytes[..10]).unwrap();

    let err = Hickle::open_file(file.path()).unwrap_err();
    assert!(matches!(err, HickleError::Format(_)), "{err}");
}

#[cfg(feature = "lz4_flex")]
#[test]
fn lz4_container_roundtrip() {
    use hickle::Lz4Compressor;

    let (graph, root, store) = sample_store();
    let file = NamedTempFile::new().unwrap();
    Hickle::save_file_with(file.path(), &store, &Lz4Compressor).unwrap();

    let reopened = Hickle::open_file(file.path()).unwrap();
    let (decoded, decoded_root) =
        Hickle::load(&reopened, Box::new(GlobalTable::new()), "/data").unwrap();
    assert!(graph.graph_eq(root, &decoded, decoded_root));
}
