//! Utilities for maintaining instruction-cache coherence after writing
//! freshly JIT-compiled code.
//!
//! On architectures with incoherent instruction and data caches (notably
//! AArch64), code written through the data side is not guaranteed to be
//! visible to instruction fetch until the affected cache lines have been
//! cleaned and invalidated and the pipeline has been flushed. x86-64
//! hardware keeps the caches coherent, so the operations below reduce to
//! no-ops there, but callers must still invoke them to stay portable.
//!
//! The expected sequence after writing code to an executable mapping is:
//!
//! 1. [`clear_cache`] over the written range;
//! 2. [`pipeline_flush_mt`] once, before any thread executes the new code.

use std::ffi::c_void;
use std::io::Result;

cfg_if::cfg_if! {
    if #[cfg(target_os = "windows")] {
        mod win;
        use win as imp;
    } else {
        mod unix;
        use unix as imp;
    }
}

/// Ensure that instruction fetches from the `len` bytes at `ptr` observe
/// the most recent data-side stores.
///
/// Call this after writing code and before executing it. The range must be
/// a valid, mapped region of the current process.
pub fn clear_cache(ptr: *const c_void, len: usize) -> Result<()> {
    imp::clear_cache(ptr, len)
}

/// Flush the processor pipeline(s) so that no stale instructions remain
/// in flight on any core that may execute the new code.
///
/// Required once per batch of [`clear_cache`] calls, before the first
/// execution of the written code.
pub fn pipeline_flush_mt() -> Result<()> {
    imp::pipeline_flush_mt()
}
