//! The append-only code buffer the back-ends emit into.

use crate::{Error, Result};

/// An append-only byte buffer with a hard capacity.
///
/// The back-ends push raw instruction bytes through the `put*` methods.
/// Rather than panicking, a write past the capacity latches an overflow
/// flag and discards the bytes; [`CodeBuffer::finish`] then reports
/// [`Error::CodeTooLarge`] so the caller can abandon the trampoline.
///
/// The buffer knows nothing about instruction sets or calling conventions.
pub(crate) struct CodeBuffer {
    bytes: Vec<u8>,
    capacity: usize,
    overflowed: bool,
}

impl CodeBuffer {
    /// Create an empty buffer that accepts at most `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        CodeBuffer {
            bytes: Vec::with_capacity(capacity),
            capacity,
            overflowed: false,
        }
    }

    fn put(&mut self, bytes: &[u8]) {
        if self.bytes.len() + bytes.len() > self.capacity {
            self.overflowed = true;
            return;
        }
        self.bytes.extend_from_slice(bytes);
    }

    /// Add 1 byte to the code section.
    pub fn put1(&mut self, v: u8) {
        self.put(&[v]);
    }

    /// Add 2 bytes, little-endian.
    #[allow(dead_code)]
    pub fn put2(&mut self, v: u16) {
        self.put(&v.to_le_bytes());
    }

    /// Add 4 bytes, little-endian.
    pub fn put4(&mut self, v: u32) {
        self.put(&v.to_le_bytes());
    }

    /// Add 8 bytes, little-endian.
    pub fn put8(&mut self, v: u64) {
        self.put(&v.to_le_bytes());
    }

    /// Append one fixed-width AArch64 instruction word.
    pub fn put_inst32(&mut self, word: u32) {
        self.put4(word);
    }

    /// The byte offset the next write lands at.
    #[allow(dead_code)]
    pub fn cur_offset(&self) -> usize {
        self.bytes.len()
    }

    /// Overwrite a previously emitted 32-bit word at `offset`.
    ///
    /// Supports forward-branch patching: capture [`CodeBuffer::cur_offset`]
    /// before emitting a placeholder, then patch once the target is known.
    /// `offset` must lie within already-emitted bytes. No back-end patches
    /// yet; the straight-line bodies need no forward branches.
    #[allow(dead_code)]
    pub fn patch4(&mut self, offset: usize, v: u32) {
        assert!(offset + 4 <= self.bytes.len());
        self.bytes[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
    }

    /// Finish emission, yielding the bytes or the overflow error.
    pub fn finish(self) -> Result<Vec<u8>> {
        if self.overflowed {
            return Err(Error::CodeTooLarge {
                capacity: self.capacity,
            });
        }
        Ok(self.bytes)
    }
}
