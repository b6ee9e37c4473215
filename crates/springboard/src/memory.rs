//! Executable-memory regions for emitted trampolines.

use region::{Allocation, Protection};

use crate::Result;

/// A page-aligned read/write/execute allocation owning one trampoline body.
///
/// Dropping the region returns it to the OS, which makes construction
/// atomic: every error path after acquisition releases the pages on the way
/// out without further bookkeeping. The region is written exactly once,
/// during [`publish`](CodeRegion::publish); afterwards it is only read and
/// executed, so concurrent invocation needs no synchronization.
pub(crate) struct CodeRegion {
    alloc: Allocation,
}

impl CodeRegion {
    /// Acquire at least `size` bytes of read/write/execute memory, rounded
    /// up to the host page size.
    pub fn allocate(size: usize) -> Result<Self> {
        let alloc = region::alloc(size, Protection::READ_WRITE_EXECUTE)?;
        log::debug!(
            "acquired {} executable bytes at {:p}",
            alloc.len(),
            alloc.as_ptr::<u8>()
        );
        Ok(CodeRegion { alloc })
    }

    /// Base address of the region.
    pub fn as_ptr(&self) -> *const u8 {
        self.alloc.as_ptr()
    }

    /// Actual (page-rounded) size of the region.
    pub fn len(&self) -> usize {
        self.alloc.len()
    }

    /// Copy `code` into the region and synchronize the instruction cache so
    /// that the bytes are fetchable before this returns.
    pub fn publish(&mut self, code: &[u8]) {
        debug_assert!(code.len() <= self.len());
        unsafe {
            std::ptr::copy_nonoverlapping(code.as_ptr(), self.alloc.as_mut_ptr(), code.len());
        }
        sync_icache(self.as_ptr(), code.len());
    }
}

/// Flush/invalidate the instruction cache for freshly written code.
///
/// Required on AArch64 and honored by contract on x86-64. Failures here are
/// diagnostics rather than errors: the write itself succeeded, and the
/// fallback behavior on every supported platform is a stale-fetch window,
/// not memory unsafety in the engine itself.
pub(crate) fn sync_icache(ptr: *const u8, len: usize) {
    use springboard_jit_icache_coherence as icache;

    if let Err(e) = icache::clear_cache(ptr.cast(), len) {
        log::warn!("instruction cache clear failed: {e}");
    }
    if let Err(e) = icache::pipeline_flush_mt() {
        log::warn!("pipeline flush failed: {e}");
    }
}
