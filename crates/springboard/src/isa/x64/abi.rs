//! Parameter classification for the two x86-64 calling conventions.

use smallvec::SmallVec;

use super::regs::{SYSV_ARG_GPRS, SYSV_ARG_XMMS, WIN64_ARG_GPRS, WIN64_SHADOW_SPACE};
use crate::abi::{align_to, ret_loc_two_reg, ArgLoc, Plan, RetLoc};
use crate::isa::CallConv;
use crate::signature::Signature;
use crate::types::{type_info, Bank, CType, TypeInfo};
use crate::{Error, Result};

fn info_for(ty: CType, conv: CallConv) -> Result<TypeInfo> {
    type_info(ty, conv).ok_or(Error::Unsupported { ty, conv })
}

/// System V AMD64 argument assignment.
///
/// Integer-class parameters fill RDI, RSI, RDX, RCX, R8, R9; FP parameters
/// fill XMM0–XMM7; 128-bit integers take two consecutive GPRs and never
/// split across the register/stack boundary. Once any parameter fails to
/// fit its bank, it and every subsequent parameter go to the stack in
/// declaration order.
pub(crate) fn compute_arg_locs_sysv(sig: &Signature) -> Result<Plan> {
    let conv = CallConv::SystemV;
    let mut args = SmallVec::new();
    let mut next_gpr = 0_usize;
    let mut next_fpr = 0_u8;
    let mut slots = 0_u32;
    let mut spilled = false;

    for &ty in sig.params() {
        let info = info_for(ty, conv)?;
        let loc = match info.bank {
            Bank::Float if !spilled && next_fpr < SYSV_ARG_XMMS => {
                next_fpr += 1;
                ArgLoc::Fpr(next_fpr - 1)
            }
            Bank::Int if !spilled && next_gpr < SYSV_ARG_GPRS.len() => {
                next_gpr += 1;
                ArgLoc::Gpr(SYSV_ARG_GPRS[next_gpr - 1].enc())
            }
            Bank::IntPair if !spilled && next_gpr + 1 < SYSV_ARG_GPRS.len() => {
                let pair = ArgLoc::GprPair(
                    SYSV_ARG_GPRS[next_gpr].enc(),
                    SYSV_ARG_GPRS[next_gpr + 1].enc(),
                );
                next_gpr += 2;
                pair
            }
            _ => {
                spilled = true;
                let n = if info.bank == Bank::IntPair { 2 } else { 1 };
                let loc = ArgLoc::Stack {
                    offset: slots * 8,
                    slots: n,
                };
                slots += u32::from(n);
                loc
            }
        };
        args.push(loc);
    }

    Ok(Plan {
        args,
        ret: ret_loc_two_reg(sig.ret(), conv)?,
        stack_reserve: align_to(slots * 8, 16),
        used_fprs: next_fpr,
    })
}

/// Microsoft x64 argument assignment, using the ABI's paired-slot model:
/// parameter N consumes positional slot N regardless of class. Slots 0–3
/// map to RCX, RDX, R8, R9 or XMM0–XMM3; slot 4 and beyond land on the
/// stack just above the 32-byte shadow space. A return value wider than
/// 8 bytes is written through a hidden pointer passed in RCX, which
/// consumes slot 0 and shifts every declared parameter by one.
pub(crate) fn compute_arg_locs_windows(sig: &Signature) -> Result<Plan> {
    let conv = CallConv::WindowsFastcall;
    let max_slots = WIN64_ARG_GPRS.len();

    let ret = match sig.ret() {
        CType::Void => RetLoc::None,
        ty => {
            let info = info_for(ty, conv)?;
            match info.bank {
                Bank::Float => RetLoc::Fpr,
                Bank::IntPair => RetLoc::HiddenPtr,
                Bank::Int => RetLoc::Gpr,
            }
        }
    };

    let mut args = SmallVec::new();
    let mut slot = if ret == RetLoc::HiddenPtr { 1 } else { 0 };
    let mut stack_slots = 0_u32;
    let mut used_fprs = 0_u8;

    for &ty in sig.params() {
        let info = info_for(ty, conv)?;
        let loc = match info.bank {
            Bank::Float if slot < max_slots => {
                used_fprs += 1;
                let fpr = ArgLoc::Fpr(slot as u8);
                slot += 1;
                fpr
            }
            Bank::Int if slot < max_slots => {
                let gpr = ArgLoc::Gpr(WIN64_ARG_GPRS[slot].enc());
                slot += 1;
                gpr
            }
            Bank::IntPair if slot + 1 < max_slots => {
                let pair = ArgLoc::GprPair(
                    WIN64_ARG_GPRS[slot].enc(),
                    WIN64_ARG_GPRS[slot + 1].enc(),
                );
                slot += 2;
                pair
            }
            _ => {
                let n = if info.bank == Bank::IntPair { 2 } else { 1 };
                let loc = ArgLoc::Stack {
                    offset: WIN64_SHADOW_SPACE + stack_slots * 8,
                    slots: n,
                };
                // The positional slot is consumed even when its value
                // spills; no later parameter may claim it.
                slot += usize::from(n);
                stack_slots += u32::from(n);
                loc
            }
        };
        args.push(loc);
    }

    Ok(Plan {
        args,
        ret,
        stack_reserve: align_to(WIN64_SHADOW_SPACE + stack_slots * 8, 16),
        used_fprs,
    })
}
