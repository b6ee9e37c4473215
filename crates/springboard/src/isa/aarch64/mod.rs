//! AArch64 trampoline emission for AAPCS64.

pub(crate) mod abi;
mod emit;
mod regs;

use self::emit::{
    enc_arith_imm12, enc_blr, enc_ldst_pair, enc_mov_from_sp, enc_mov_rr, enc_move_wide,
    ldst_fpr, ldst_gpr, MoveWideOp, LDP_POST, LDRB_UIMM, LDRD_UIMM, LDRH_UIMM, LDRSB_UIMM,
    LDRSH_UIMM, LDRSW_UIMM, LDRS_UIMM, LDRW_UIMM, LDRX_UIMM, RET, STP_PRE, STRB_UIMM,
    STRD_UIMM, STRH_UIMM, STRS_UIMM, STRW_UIMM, STRX_UIMM,
};
use self::regs::{call_tmp_reg, fp_reg, link_reg, stack_reg, vreg, xreg, Xreg};
use crate::abi::{ArgLoc, Plan, RetLoc};
use crate::buffer::CodeBuffer;
use crate::isa::CallConv;
use crate::signature::Signature;
use crate::types::{type_info, Bank, TypeInfo};
use crate::Result;

/// Emit the complete trampoline body for AAPCS64.
///
/// The generated function implements the gateway signature
/// `extern "C" fn(args: *const Arg, argc: usize, ret: *mut u8)`, arriving
/// in X0, X1, X2. X19 holds the argument-vector base and X20 the return
/// buffer across the call; X8/X9/X10 and V16 are the scratch registers,
/// all caller-saved.
pub(crate) fn compile(buf: &mut CodeBuffer, sig: &Signature, plan: &Plan) -> Result<()> {
    let conv = CallConv::Aapcs64;
    let vec_base = xreg(19);
    let ret_buf = xreg(20);
    let ptr_tmp = xreg(8);
    let val_tmp = xreg(9);
    let val_tmp2 = xreg(10);
    let fp_tmp = vreg(16);

    // SP stays 16-byte aligned throughout: two 16-byte pair pushes, then a
    // 16-byte-aligned reserve.
    buf.put_inst32(enc_ldst_pair(STP_PRE, -2, fp_reg(), link_reg(), stack_reg()));
    buf.put_inst32(enc_mov_from_sp(fp_reg(), stack_reg()));
    buf.put_inst32(enc_ldst_pair(STP_PRE, -2, vec_base, ret_buf, stack_reg()));
    buf.put_inst32(enc_mov_rr(vec_base, xreg(0)));
    buf.put_inst32(enc_mov_rr(ret_buf, xreg(2)));
    if plan.stack_reserve > 0 {
        debug_assert!(plan.stack_reserve < (1 << 12));
        buf.put_inst32(enc_arith_imm12(
            0xD1,
            plan.stack_reserve,
            stack_reg(),
            stack_reg(),
        ));
    }

    for (i, (&ty, loc)) in sig.params().iter().zip(&plan.args).enumerate() {
        let info =
            type_info(ty, conv).expect("void parameters are rejected during classification");
        // Value pointer for parameter `i` into X8; X9/X10 stage stack-bound
        // values so later pointer loads cannot clobber staged data.
        buf.put_inst32(ldst_gpr(LDRX_UIMM, ptr_tmp, vec_base, (i * 8) as u32));
        match *loc {
            ArgLoc::Gpr(n) => buf.put_inst32(load_scalar(xreg(n), ptr_tmp, info)),
            ArgLoc::Fpr(n) => {
                let op = if info.size == 4 { LDRS_UIMM } else { LDRD_UIMM };
                buf.put_inst32(ldst_fpr(op, vreg(n), ptr_tmp, 0));
            }
            ArgLoc::GprPair(lo, hi) => {
                buf.put_inst32(ldst_gpr(LDRX_UIMM, xreg(lo), ptr_tmp, 0));
                buf.put_inst32(ldst_gpr(LDRX_UIMM, xreg(hi), ptr_tmp, 8));
            }
            ArgLoc::Stack { offset, .. } => match info.bank {
                Bank::Float => {
                    let (ld, st) = if info.size == 4 {
                        (LDRS_UIMM, STRS_UIMM)
                    } else {
                        (LDRD_UIMM, STRD_UIMM)
                    };
                    buf.put_inst32(ldst_fpr(ld, fp_tmp, ptr_tmp, 0));
                    buf.put_inst32(ldst_fpr(st, fp_tmp, stack_reg(), offset));
                }
                Bank::IntPair => {
                    buf.put_inst32(ldst_gpr(LDRX_UIMM, val_tmp, ptr_tmp, 0));
                    buf.put_inst32(ldst_gpr(LDRX_UIMM, val_tmp2, ptr_tmp, 8));
                    buf.put_inst32(ldst_gpr(STRX_UIMM, val_tmp, stack_reg(), offset));
                    buf.put_inst32(ldst_gpr(STRX_UIMM, val_tmp2, stack_reg(), offset + 8));
                }
                Bank::Int => {
                    buf.put_inst32(load_scalar(val_tmp, ptr_tmp, info));
                    buf.put_inst32(ldst_gpr(STRX_UIMM, val_tmp, stack_reg(), offset));
                }
            },
        }
    }

    // Materialize the callee address in X16 and call through it.
    let addr = sig.callee() as u64;
    buf.put_inst32(enc_move_wide(
        MoveWideOp::MovZ,
        call_tmp_reg(),
        addr as u16,
        0,
    ));
    for hw in 1..4 {
        buf.put_inst32(enc_move_wide(
            MoveWideOp::MovK,
            call_tmp_reg(),
            (addr >> (16 * hw)) as u16,
            hw as u8,
        ));
    }
    buf.put_inst32(enc_blr(call_tmp_reg()));

    match plan.ret {
        RetLoc::None | RetLoc::HiddenPtr => {}
        RetLoc::Gpr => {
            let size = type_info(sig.ret(), conv).expect("non-void return").size;
            let op = match size {
                1 => STRB_UIMM,
                2 => STRH_UIMM,
                4 => STRW_UIMM,
                _ => STRX_UIMM,
            };
            buf.put_inst32(ldst_gpr(op, xreg(0), ret_buf, 0));
        }
        RetLoc::Fpr => {
            let size = type_info(sig.ret(), conv).expect("non-void return").size;
            let op = if size == 4 { STRS_UIMM } else { STRD_UIMM };
            buf.put_inst32(ldst_fpr(op, vreg(0), ret_buf, 0));
        }
        RetLoc::GprPair => {
            buf.put_inst32(ldst_gpr(STRX_UIMM, xreg(0), ret_buf, 0));
            buf.put_inst32(ldst_gpr(STRX_UIMM, xreg(1), ret_buf, 8));
        }
    }

    if plan.stack_reserve > 0 {
        buf.put_inst32(enc_arith_imm12(
            0x91,
            plan.stack_reserve,
            stack_reg(),
            stack_reg(),
        ));
    }
    buf.put_inst32(enc_ldst_pair(LDP_POST, 2, vec_base, ret_buf, stack_reg()));
    buf.put_inst32(enc_ldst_pair(LDP_POST, 2, fp_reg(), link_reg(), stack_reg()));
    buf.put_inst32(RET);
    Ok(())
}

/// The width/signedness-appropriate load of a scalar integer from
/// `[base]` into `dst`.
fn load_scalar(dst: Xreg, base: Xreg, info: TypeInfo) -> u32 {
    let op = match (info.size, info.signed) {
        (1, false) => LDRB_UIMM,
        (1, true) => LDRSB_UIMM,
        (2, false) => LDRH_UIMM,
        (2, true) => LDRSH_UIMM,
        (4, false) => LDRW_UIMM,
        (4, true) => LDRSW_UIMM,
        (8, _) => LDRX_UIMM,
        _ => unreachable!("pair-sized values are loaded half by half"),
    };
    ldst_gpr(op, dst, base, 0)
}
