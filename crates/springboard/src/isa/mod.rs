//! Target-ISA back-ends and calling-convention selection.

pub(crate) mod aarch64;
pub(crate) mod x64;

use core::fmt;

use crate::abi::Plan;
use crate::buffer::CodeBuffer;
use crate::signature::Signature;
use crate::Result;

/// The calling conventions the engine can target.
///
/// The host's convention is fixed at build time via [`CallConv::host`];
/// there is no runtime switch. Classification and emission are nonetheless
/// pure and can be exercised for any convention on any host, which is how
/// the cross-convention unit tests run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallConv {
    /// System V AMD64 (Linux and macOS on x86-64).
    SystemV,
    /// The Microsoft x64 convention.
    WindowsFastcall,
    /// The AArch64 procedure-call standard (Linux and macOS on ARM64).
    Aapcs64,
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("springboard targets only x86-64 and AArch64 hosts");

impl CallConv {
    /// The calling convention of the host this crate was compiled for.
    pub fn host() -> Self {
        #[cfg(all(target_arch = "x86_64", windows))]
        return CallConv::WindowsFastcall;
        #[cfg(all(target_arch = "x86_64", not(windows)))]
        return CallConv::SystemV;
        #[cfg(target_arch = "aarch64")]
        return CallConv::Aapcs64;
    }
}

impl fmt::Display for CallConv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            CallConv::SystemV => "system_v",
            CallConv::WindowsFastcall => "windows_fastcall",
            CallConv::Aapcs64 => "aapcs64",
        })
    }
}

/// Size of the code region reserved for one trampoline body.
pub(crate) const CODE_CAPACITY: usize = 512;

/// Emit the trampoline body for `sig` into `buf`, following `plan`.
pub(crate) fn compile(
    buf: &mut CodeBuffer,
    sig: &Signature,
    plan: &Plan,
    conv: CallConv,
) -> Result<()> {
    match conv {
        CallConv::SystemV | CallConv::WindowsFastcall => x64::compile(buf, sig, plan, conv),
        CallConv::Aapcs64 => aarch64::compile(buf, sig, plan),
    }
}
