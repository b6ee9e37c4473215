//! Windows implementation, backed by `FlushInstructionCache`.

use std::ffi::c_void;
use std::io::{Error, Result};

use windows_sys::Win32::System::Diagnostics::Debug::FlushInstructionCache;
use windows_sys::Win32::System::Threading::GetCurrentProcess;

pub fn clear_cache(ptr: *const c_void, len: usize) -> Result<()> {
    unsafe {
        if FlushInstructionCache(GetCurrentProcess(), ptr, len) == 0 {
            return Err(Error::last_os_error());
        }
    }
    Ok(())
}

pub fn pipeline_flush_mt() -> Result<()> {
    // FlushInstructionCache already performs the required serialization on
    // every core.
    Ok(())
}
