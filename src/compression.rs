//! Pluggable compression for container record payloads.
//!
//! Each record in a container file names the algorithm that compressed its
//! payload by a one-byte id. The [`Compressor`] trait is the seam; the
//! [`CompressorRegistry`] maps ids back to implementations on the read
//! side.

use std::borrow::Cow;

use crate::error::{HickleError, Result};

/// Interface for compression algorithms.
///
/// Each implementation is identified by a unique id; 0 is reserved for the
/// pass-through.
pub trait Compressor: Send + Sync + std::fmt::Debug {
    /// The id written into each record header.
    fn id(&self) -> u8;

    /// Compresses a payload. May borrow the input when nothing is done.
    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>>;

    /// Decompresses a payload back to the original bytes.
    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>>;
}

/// The pass-through strategy (id 0, the default).
#[derive(Debug, Clone, Copy)]
pub struct NoCompression;

impl Compressor for NoCompression {
    fn id(&self) -> u8 {
        0
    }

    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        Ok(Cow::Borrowed(data))
    }

    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        Ok(Cow::Borrowed(data))
    }
}

/// LZ4 block compression (id 1), available with the `lz4_flex` feature.
#[cfg(feature = "lz4_flex")]
#[derive(Debug, Clone, Copy)]
pub struct Lz4Compressor;

#[cfg(feature = "lz4_flex")]
impl Compressor for Lz4Compressor {
    fn id(&self) -> u8 {
        1
    }

    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        Ok(Cow::Owned(lz4_flex::compress_prepend_size(data)))
    }

    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        lz4_flex::decompress_size_prepended(data)
            .map(Cow::Owned)
            .map_err(|e| HickleError::Compression(e.to_string()))
    }
}

/// Id-indexed table of available algorithms.
#[derive(Debug)]
pub struct CompressorRegistry {
    algorithms: Vec<Option<Box<dyn Compressor>>>,
}

impl CompressorRegistry {
    /// A registry with the stock algorithms: id 0 pass-through, id 1 LZ4
    /// when the feature is enabled.
    pub fn new() -> Self {
        let mut registry = Self {
            algorithms: Vec::new(),
        };
        registry.register(Box::new(NoCompression));
        #[cfg(feature = "lz4_flex")]
        registry.register(Box::new(Lz4Compressor));
        registry
    }

    /// Registers an algorithm under its own id, replacing any previous
    /// holder of that id.
    pub fn register(&mut self, algo: Box<dyn Compressor>) {
        let id = algo.id() as usize;
        if id >= self.algorithms.len() {
            self.algorithms.resize_with(id + 1, || None);
        }
        if let Some(slot) = self.algorithms.get_mut(id) {
            *slot = Some(algo);
        }
    }

    /// Looks up an algorithm by id.
    pub fn get(&self, id: u8) -> Result<&dyn Compressor> {
        self.algorithms
            .get(usize::from(id))
            .and_then(|slot| slot.as_deref())
            .ok_or_else(|| {
                HickleError::Compression(format!("algorithm id {id} is not registered"))
            })
    }
}

impl Default for CompressorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
