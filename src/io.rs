//! Low-level sequential writing for container files.
//!
//! The engine's walk is single-threaded and synchronous, so the writer is
//! a plain buffered appender that tracks its offset.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;

/// A buffered writer that appends frames to a file.
#[derive(Debug)]
pub struct SeqWriter {
    writer: BufWriter<File>,
    offset: u64,
}

impl SeqWriter {
    /// Creates (truncating) the file at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            offset: 0,
        })
    }

    /// Appends a complete buffer, returning the offset it was written at.
    pub fn write_all(&mut self, buffer: &[u8]) -> Result<u64> {
        let start = self.offset;
        self.writer.write_all(buffer)?;
        self.offset += buffer.len() as u64;
        Ok(start)
    }

    /// Current file cursor position.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Flushes buffered data to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
