//! Argument-location plans produced by ABI classification.
//!
//! Classification is a pure transformation from a signature and a calling
//! convention to a [`Plan`]; it allocates registers and stack slots but
//! emits nothing. The per-convention assignment algorithms live with their
//! ISA back-ends (`isa::x64::abi`, `isa::aarch64::abi`); this module holds
//! the shared vocabulary and the invariants every plan must satisfy.

use smallvec::SmallVec;

use crate::isa::CallConv;
use crate::signature::Signature;
use crate::Result;

/// Where one parameter travels on its way into the callee.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ArgLoc {
    /// A general-purpose register, by hardware encoding.
    Gpr(u8),
    /// A floating-point register, by hardware encoding.
    Fpr(u8),
    /// Two consecutive general-purpose registers holding a 128-bit integer,
    /// low half first.
    GprPair(u8, u8),
    /// One or two 8-byte outgoing stack slots at `offset` bytes above the
    /// stack pointer at call time. On the Microsoft convention the offset
    /// already accounts for the 32-byte shadow space.
    Stack { offset: u32, slots: u8 },
}

/// How the callee hands back its result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RetLoc {
    /// Void; nothing to capture.
    None,
    /// The convention's first integer return register (RAX / X0).
    Gpr,
    /// The first floating-point register (XMM0 / V0).
    Fpr,
    /// A 128-bit integer in the register pair (RDX:RAX / X0:X1).
    GprPair,
    /// The callee writes the result through a pointer passed as a hidden
    /// first argument; no capture is emitted.
    HiddenPtr,
}

/// The classification result the trampoline compiler consumes.
#[derive(Debug)]
pub(crate) struct Plan {
    /// Per-parameter locations, in declaration order.
    pub args: SmallVec<[ArgLoc; 8]>,
    /// The return convention.
    pub ret: RetLoc,
    /// Bytes to subtract from the stack pointer after the prologue pushes.
    /// Always a multiple of 16; includes the shadow space where the
    /// convention requires one.
    pub stack_reserve: u32,
    /// Number of floating-point argument registers consumed (System V AL
    /// bookkeeping).
    pub used_fprs: u8,
}

impl Plan {
    /// No register is assigned to two parameters within the same bank.
    fn banks_disjoint(&self) -> bool {
        let mut gprs = Vec::new();
        let mut fprs = Vec::new();
        for loc in &self.args {
            match *loc {
                ArgLoc::Gpr(r) => gprs.push(r),
                ArgLoc::Fpr(r) => fprs.push(r),
                ArgLoc::GprPair(lo, hi) => {
                    gprs.push(lo);
                    gprs.push(hi);
                }
                ArgLoc::Stack { .. } => {}
            }
        }
        let unique = |regs: &mut Vec<u8>| {
            let before = regs.len();
            regs.sort_unstable();
            regs.dedup();
            regs.len() == before
        };
        unique(&mut gprs) && unique(&mut fprs)
    }
}

/// Round `x` up to the next multiple of `align` (a power of two).
pub(crate) fn align_to(x: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    (x + align - 1) & !(align - 1)
}

/// Return-location selection shared by the conventions that return 128-bit
/// integers in a register pair (System V's RDX:RAX, AAPCS64's X0:X1).
pub(crate) fn ret_loc_two_reg(ty: crate::types::CType, conv: CallConv) -> Result<RetLoc> {
    use crate::types::{type_info, Bank, CType};
    if ty == CType::Void {
        return Ok(RetLoc::None);
    }
    let info = type_info(ty, conv).ok_or(crate::Error::Unsupported { ty, conv })?;
    Ok(match info.bank {
        Bank::Float => RetLoc::Fpr,
        Bank::IntPair => RetLoc::GprPair,
        Bank::Int => RetLoc::Gpr,
    })
}

/// Classify `sig` for `conv`, producing the plan the compiler consumes.
pub(crate) fn classify(sig: &Signature, conv: CallConv) -> Result<Plan> {
    let plan = match conv {
        CallConv::SystemV => crate::isa::x64::abi::compute_arg_locs_sysv(sig)?,
        CallConv::WindowsFastcall => crate::isa::x64::abi::compute_arg_locs_windows(sig)?,
        CallConv::Aapcs64 => crate::isa::aarch64::abi::compute_arg_locs(sig)?,
    };
    debug_assert_eq!(plan.args.len(), sig.params().len());
    debug_assert_eq!(plan.stack_reserve % 16, 0);
    debug_assert!(plan.banks_disjoint());
    Ok(plan)
}
