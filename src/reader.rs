//! The container read side.
//!
//! Memory-maps a container file, validates the tail (magic, version,
//! checksum) and replays the record stream into a fresh
//! [`MemStore`](crate::memstore::MemStore).

use std::fs::File;
use std::hash::Hasher;
use std::path::Path;

use memmap2::Mmap;
use twox_hash::XxHash64;

use crate::compression::CompressorRegistry;
use crate::error::{HickleError, Result};
use crate::format::{Tail, RECORD_HEADER_SIZE, TAIL_SIZE};
use crate::memstore::{MemStore, NodeRec};

/// A validated handle on a container file.
#[derive(Debug)]
pub struct StoreReader {
    mmap: Mmap,
    tail: Tail,
}

impl StoreReader {
    /// Opens a container file and validates its integrity.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len() as usize;
        if file_size < TAIL_SIZE {
            return Err(HickleError::Format("file smaller than the tail".into()));
        }

        // Mmap assumes no concurrent writers to the file; the container is
        // written once and then only read.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };

        let tail = Tail::from_bytes(&mmap[file_size - TAIL_SIZE..])?;

        let mut hasher = XxHash64::with_seed(0);
        hasher.write(&mmap[..file_size - TAIL_SIZE]);
        if hasher.finish() != tail.checksum {
            return Err(HickleError::Format(
                "record checksum mismatch, file is corrupted".into(),
            ));
        }

        Ok(Self { mmap, tail })
    }

    /// The validated tail.
    pub fn tail(&self) -> Tail {
        self.tail
    }

    /// Replays the record stream into an in-memory store.
    pub fn read_store(&self) -> Result<MemStore> {
        let region = &self.mmap[..self.mmap.len() - TAIL_SIZE];
        let registry = CompressorRegistry::new();
        let mut records: Vec<(String, NodeRec)> =
            Vec::with_capacity(self.tail.record_count as usize);
        let mut cursor = 0usize;

        for _ in 0..self.tail.record_count {
            if cursor + RECORD_HEADER_SIZE > region.len() {
                return Err(HickleError::Format("truncated record header".into()));
            }
            let len_bytes: [u8; 4] = region[cursor..cursor + 4]
                .try_into()
                .map_err(|_| HickleError::Format("truncated record header".into()))?;
            let len = u32::from_le_bytes(len_bytes) as usize;
            let algo = region[cursor + 4];
            cursor += RECORD_HEADER_SIZE;

            if cursor + len > region.len() {
                return Err(HickleError::Format("record overruns the file".into()));
            }
            let payload = &region[cursor..cursor + len];
            cursor += len;

            let raw = registry.get(algo)?.decompress(payload)?;
            let (record, consumed): ((String, NodeRec), usize) =
                bincode::serde::decode_from_slice(&raw, bincode::config::standard())
                    .map_err(|e| HickleError::Serialization(e.to_string()))?;
            if consumed != raw.len() {
                return Err(HickleError::Format("trailing bytes in record payload".into()));
            }
            records.push(record);
        }
        if cursor != region.len() {
            return Err(HickleError::Format(
                "trailing bytes after the record stream".into(),
            ));
        }
        Ok(MemStore::from_records(records))
    }
}
