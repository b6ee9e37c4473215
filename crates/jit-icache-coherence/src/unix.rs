//! Unix implementations.
//!
//! x86-64 keeps instruction fetch coherent with data stores in hardware, so
//! `clear_cache` has nothing to do there. On AArch64 the unified-cache
//! guarantee does not exist: the written lines must be cleaned to the point
//! of unification, the corresponding instruction-cache lines invalidated,
//! and every core's pipeline flushed before the code runs.

use std::ffi::c_void;
use std::io::Result;

pub fn clear_cache(ptr: *const c_void, len: usize) -> Result<()> {
    let _ = (ptr, len);
    cfg_if::cfg_if! {
        if #[cfg(all(target_arch = "aarch64", target_vendor = "apple"))] {
            extern "C" {
                // From libkern/OSCacheControl.h.
                fn sys_icache_invalidate(start: *mut c_void, size: usize);
            }
            unsafe {
                sys_icache_invalidate(ptr.cast_mut(), len);
            }
        } else if #[cfg(target_arch = "aarch64")] {
            unsafe {
                invalidate_icache_range(ptr as usize, len);
            }
        }
    }
    Ok(())
}

pub fn pipeline_flush_mt() -> Result<()> {
    cfg_if::cfg_if! {
        if #[cfg(all(target_arch = "aarch64", target_os = "linux"))] {
            membarrier_sync_core()?;
        }
        // macOS flushes as part of sys_icache_invalidate; x86-64 cores do
        // not run stale code across a store to the same address space.
    }
    Ok(())
}

/// Clean the data cache and invalidate the instruction cache for
/// `[start, start + len)`, line by line, using the line sizes advertised
/// in `CTR_EL0`. This is the userspace half of the AArch64 coherence
/// protocol; the cross-core pipeline flush is [`membarrier_sync_core`].
#[cfg(all(target_arch = "aarch64", not(target_vendor = "apple")))]
unsafe fn invalidate_icache_range(start: usize, len: usize) {
    use std::arch::asm;

    let ctr_el0: u64;
    asm!(
        "mrs {}, ctr_el0",
        out(reg) ctr_el0,
        options(nomem, nostack, preserves_flags)
    );
    // CTR_EL0.DminLine and .IminLine hold log2 of the line size in words.
    let dline = 4usize << ((ctr_el0 >> 16) & 0xf);
    let iline = 4usize << (ctr_el0 & 0xf);
    let end = start + len;

    let mut addr = start & !(dline - 1);
    while addr < end {
        asm!("dc cvau, {}", in(reg) addr, options(nostack, preserves_flags));
        addr += dline;
    }
    asm!("dsb ish", options(nostack, preserves_flags));

    let mut addr = start & !(iline - 1);
    while addr < end {
        asm!("ic ivau, {}", in(reg) addr, options(nostack, preserves_flags));
        addr += iline;
    }
    asm!("dsb ish", "isb", options(nostack, preserves_flags));
}

/// Issue a `membarrier(SYNC_CORE)` so that every core of this process
/// discards any speculatively fetched instructions.
#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
fn membarrier_sync_core() -> Result<()> {
    use std::io::Error;
    use std::sync::atomic::{AtomicBool, Ordering};

    const MEMBARRIER_CMD_PRIVATE_EXPEDITED_SYNC_CORE: libc::c_long = 1 << 5;
    const MEMBARRIER_CMD_REGISTER_PRIVATE_EXPEDITED_SYNC_CORE: libc::c_long = 1 << 6;

    static REGISTERED: AtomicBool = AtomicBool::new(false);

    unsafe {
        if !REGISTERED.swap(true, Ordering::Relaxed)
            && libc::syscall(
                libc::SYS_membarrier,
                MEMBARRIER_CMD_REGISTER_PRIVATE_EXPEDITED_SYNC_CORE,
                0,
                0,
            ) != 0
        {
            return Err(Error::last_os_error());
        }
        if libc::syscall(
            libc::SYS_membarrier,
            MEMBARRIER_CMD_PRIVATE_EXPEDITED_SYNC_CORE,
            0,
            0,
        ) != 0
        {
            return Err(Error::last_os_error());
        }
    }
    Ok(())
}
