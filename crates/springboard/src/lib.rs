//! Runtime trampoline compiler for foreign C calls.
//!
//! `springboard` turns a [`Signature`] — a runtime description of a C
//! function's parameter and return types plus the callee's entry address —
//! into a JIT-compiled *trampoline*: a few dozen bytes of machine code that
//! obey the platform's C calling convention, read each argument out of a
//! generic vector of value pointers, perform the native call, and write the
//! result through a caller-supplied return buffer. No per-signature stub has
//! to exist at build time.
//!
//! Construction runs in four stages: the signature is *classified* against
//! the target calling convention into a plan of argument locations, the
//! plan is *compiled* into an instruction stream by the matching ISA
//! back-end, the bytes are copied into a fresh read/write/execute code
//! region, and the instruction cache is synchronized before
//! the constructor returns. Any failure along the way releases the region
//! and yields an [`Error`]; a successfully constructed [`Trampoline`] is
//! immutable and may be invoked concurrently from any number of threads.
//!
//! Supported calling conventions are System V AMD64, the Microsoft x64
//! convention, and AArch64 AAPCS64; the host's convention is selected at
//! build time.
//!
//! ```no_run
//! use springboard::{Arg, CType, RetValue, Signature, Trampoline};
//!
//! extern "C" fn add(a: i32, b: i32) -> i32 {
//!     a + b
//! }
//!
//! fn main() -> springboard::Result<()> {
//!     let callee = add as extern "C" fn(i32, i32) -> i32;
//!     let sig = Signature::new("add", CType::Int, [CType::Int, CType::Int], callee as usize);
//!     let trampoline = Trampoline::new(sig)?;
//!
//!     let (a, b) = (2_i32, 40_i32);
//!     let mut ret = RetValue::new();
//!     unsafe {
//!         trampoline.invoke(&[Arg::from_ref(&a), Arg::from_ref(&b)], Some(&mut ret))?;
//!         assert_eq!(ret.get::<i32>(), 42);
//!     }
//!     Ok(())
//! }
//! ```

mod abi;
mod buffer;
mod isa;
mod memory;
mod signature;
mod trampoline;
mod types;

pub use crate::isa::CallConv;
pub use crate::signature::Signature;
pub use crate::trampoline::{Arg, RetValue, Trampoline};
pub use crate::types::CType;

/// The errors produced while building or invoking a trampoline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The executable code region could not be acquired from the OS.
    #[error("failed to allocate executable memory")]
    Allocation(#[from] region::Error),

    /// A type in the signature cannot be passed under the selected calling
    /// convention.
    #[error("type {ty:?} is not supported by the {conv} calling convention")]
    Unsupported {
        /// The offending type tag.
        ty: CType,
        /// The convention it was classified against.
        conv: CallConv,
    },

    /// The emitted trampoline body overran its code region.
    #[error("emitted code overran the {capacity}-byte code region")]
    CodeTooLarge {
        /// Size of the reservation that was exceeded.
        capacity: usize,
    },

    /// `invoke` was handed the wrong number of argument cells.
    #[error("expected {expected} argument(s), got {got}")]
    ArgCountMismatch {
        /// Parameter count declared by the signature.
        expected: usize,
        /// Cell count actually supplied.
        got: usize,
    },

    /// A return buffer was missing for a non-void return, or supplied for a
    /// void one.
    #[error("return buffer does not match the signature's return type")]
    ReturnBufferMismatch,
}

/// A convenience alias for `Result<T, springboard::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
