//! Parameter classification for AAPCS64.

use smallvec::SmallVec;

use super::regs::{NUM_ARG_VREGS, NUM_ARG_XREGS};
use crate::abi::{align_to, ret_loc_two_reg, ArgLoc, Plan};
use crate::isa::CallConv;
use crate::signature::Signature;
use crate::types::{type_info, Bank};
use crate::{Error, Result};

/// AAPCS64 argument assignment.
///
/// Integer-class parameters fill X0–X7, FP parameters fill V0–V7, and
/// 128-bit integers take two consecutive X registers. Spill behavior
/// mirrors System V: a parameter that cannot fit its bank goes to the
/// stack together with everything after it, and a pair never splits
/// across the register/stack boundary. Results come back in X0, V0, or
/// X0:X1. (Aggregates larger than 16 bytes would use the X8 indirect
/// result register; no such type is passable here.)
pub(crate) fn compute_arg_locs(sig: &Signature) -> Result<Plan> {
    let conv = CallConv::Aapcs64;
    let mut args = SmallVec::new();
    let mut next_xreg = 0_u8;
    let mut next_vreg = 0_u8;
    let mut slots = 0_u32;
    let mut spilled = false;

    for &ty in sig.params() {
        let info = type_info(ty, conv).ok_or(Error::Unsupported { ty, conv })?;
        let loc = match info.bank {
            Bank::Float if !spilled && next_vreg < NUM_ARG_VREGS => {
                next_vreg += 1;
                ArgLoc::Fpr(next_vreg - 1)
            }
            Bank::Int if !spilled && next_xreg < NUM_ARG_XREGS => {
                next_xreg += 1;
                ArgLoc::Gpr(next_xreg - 1)
            }
            Bank::IntPair if !spilled && next_xreg + 1 < NUM_ARG_XREGS => {
                let pair = ArgLoc::GprPair(next_xreg, next_xreg + 1);
                next_xreg += 2;
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
        used_fprs: next_vreg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::RetLoc;
    use crate::types::CType;

    fn sig(ret: CType, params: &[CType]) -> Signature {
        Signature::new("test", ret, params.to_vec(), 0)
    }

    #[test]
    fn eight_xregs_then_stack() {
        let plan = compute_arg_locs(&sig(CType::Int, &[CType::Int; 9])).unwrap();
        for (i, loc) in plan.args.iter().take(8).enumerate() {
            assert_eq!(*loc, ArgLoc::Gpr(i as u8));
        }
        assert_eq!(plan.args[8], ArgLoc::Stack { offset: 0, slots: 1 });
        assert_eq!(plan.stack_reserve, 16);
    }

    #[test]
    fn nine_doubles_spill_one() {
        let plan = compute_arg_locs(&sig(CType::Double, &[CType::Double; 9])).unwrap();
        assert_eq!(plan.args[7], ArgLoc::Fpr(7));
        assert_eq!(plan.args[8], ArgLoc::Stack { offset: 0, slots: 1 });
        assert_eq!(plan.used_fprs, 8);
        assert_eq!(plan.ret, RetLoc::Fpr);
    }

    #[test]
    fn int128_takes_x0_x1_and_returns_in_the_pair() {
        let plan = compute_arg_locs(&sig(CType::Int128, &[CType::Int128])).unwrap();
        assert_eq!(plan.args[0], ArgLoc::GprPair(0, 1));
        assert_eq!(plan.ret, RetLoc::GprPair);
    }

    #[test]
    fn pair_with_one_register_left_spills_whole() {
        let mut params = vec![CType::Int; 7];
        params.push(CType::UInt128);
        params.push(CType::Int);
        let plan = compute_arg_locs(&sig(CType::Void, &params)).unwrap();
        assert_eq!(plan.args[7], ArgLoc::Stack { offset: 0, slots: 2 });
        // X7 stays free, but later parameters spill regardless.
        assert_eq!(plan.args[8], ArgLoc::Stack { offset: 16, slots: 1 });
        assert_eq!(plan.stack_reserve, 32);
    }
}
