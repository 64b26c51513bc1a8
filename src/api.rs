//! The high-level entry points.
//!
//! [`Hickle::dump`] and [`Hickle::load`] run one-shot encode/decode
//! sessions over any [`Store`]; for batch sessions with a shared memo use
//! [`Pickler`](crate::pickler::Pickler) and
//! [`Unpickler`](crate::unpickler::Unpickler) directly.
//! [`Hickle::save_file`] and [`Hickle::open_file`] move a [`MemStore`]
//! image to and from a single container file.

use std::hash::Hasher;
use std::path::Path;

use log::debug;
use twox_hash::XxHash64;

use crate::compression::{Compressor, NoCompression};
use crate::error::{HickleError, Result};
use crate::format::{Tail, RECORD_HEADER_SIZE};
use crate::io::SeqWriter;
use crate::memstore::MemStore;
use crate::pickler::Pickler;
use crate::reader::StoreReader;
use crate::reduce::Resolver;
use crate::store::Store;
use crate::unpickler::Unpickler;
use crate::value::{ObjId, ValueGraph};

/// The main entry point for one-shot operations.
#[derive(Debug)]
pub struct Hickle;

impl Hickle {
    /// Encodes one object at `path` in a fresh session.
    pub fn dump(
        store: &mut dyn Store,
        graph: &mut ValueGraph,
        id: ObjId,
        path: &str,
    ) -> Result<()> {
        Pickler::new(store).encode_one(graph, id, path)
    }

    /// Decodes the node at `path` in a fresh session, returning the output
    /// graph and the decoded object's id.
    pub fn load(
        store: &dyn Store,
        resolver: Box<dyn Resolver>,
        path: &str,
    ) -> Result<(ValueGraph, ObjId)> {
        let mut unpickler = Unpickler::with_resolver(store, resolver);
        let id = unpickler.decode_one(path)?;
        Ok((unpickler.into_graph(), id))
    }

    /// Writes a store image to a container file without compression.
    pub fn save_file<P: AsRef<Path>>(path: P, store: &MemStore) -> Result<()> {
        Self::save_file_with(path, store, &NoCompression)
    }

    /// Writes a store image to a container file through the given
    /// compressor.
    pub fn save_file_with<P: AsRef<Path>>(
        path: P,
        store: &MemStore,
        compressor: &dyn Compressor,
    ) -> Result<()> {
        let path = path.as_ref();
        debug!("saving {} store nodes to {}", store.len(), path.display());

        let mut writer = SeqWriter::create(path)?;
        let mut hasher = XxHash64::with_seed(0);
        let mut count: u64 = 0;

        for (node_path, rec) in store.records() {
            let payload =
                bincode::serde::encode_to_vec(&(node_path, rec), bincode::config::standard())
                    .map_err(|e| HickleError::Serialization(e.to_string()))?;
            let compressed = compressor.compress(&payload)?;
            let len = u32::try_from(compressed.len()).map_err(|_| {
                HickleError::Format(format!("record for {node_path} exceeds the frame limit"))
            })?;

            let mut frame = Vec::with_capacity(RECORD_HEADER_SIZE + compressed.len());
            frame.extend_from_slice(&len.to_le_bytes());
            frame.push(compressor.id());
            frame.extend_from_slice(&compressed);

            hasher.write(&frame);
            writer.write_all(&frame)?;
            count += 1;
        }

        let tail = Tail::new(count, hasher.finish());
        writer.write_all(&tail.to_bytes())?;
        writer.flush()
    }

    /// Opens a container file and rebuilds its store image.
    pub fn open_file<P: AsRef<Path>>(path: P) -> Result<MemStore> {
        StoreReader::open(path)?.read_store()
    }
}
