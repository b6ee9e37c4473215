//! x86-64 trampoline emission for the System V and Microsoft conventions.
//!
//! The two conventions share one body generator: they differ only in the
//! incoming gateway registers, the callee-saved homes chosen for the
//! argument-vector base and return-buffer pointers, the FP scratch register
//! that is safe to clobber, and the System-V-only AL contract.

pub(crate) mod abi;
mod encoding;
mod regs;

use self::encoding::{emit_mem, encode_modrm, RexFlags};
use self::regs::{Gpr, Xmm};
use crate::abi::{ArgLoc, Plan, RetLoc};
use crate::buffer::CodeBuffer;
use crate::isa::CallConv;
use crate::signature::Signature;
use crate::types::{type_info, Bank, TypeInfo};
use crate::Result;

/// Emit the complete trampoline body for one x86-64 convention.
///
/// The generated function implements the gateway signature
/// `extern "C" fn(args: *const Arg, argc: usize, ret: *mut u8)`.
pub(crate) fn compile(
    buf: &mut CodeBuffer,
    sig: &Signature,
    plan: &Plan,
    conv: CallConv,
) -> Result<()> {
    // Incoming gateway registers and the callee-saved homes that hold the
    // argument-vector base and the return-buffer pointer across the call.
    let (vec_in, ret_in, vec_base, ret_buf, fp_scratch) = match conv {
        CallConv::SystemV => (Gpr::RDI, Gpr::RDX, Gpr::R14, Gpr::R12, Xmm::XMM8),
        CallConv::WindowsFastcall => (Gpr::RCX, Gpr::R8, Gpr::R13, Gpr::R14, Xmm::XMM4),
        CallConv::Aapcs64 => unreachable!("x64 back-end handed an AArch64 plan"),
    };

    // CET landing pad, then the frame: after the three pushes RSP is
    // 16-byte aligned again, so a 16-byte-aligned reserve keeps the call
    // site aligned.
    endbr64(buf);
    push_r(buf, Gpr::RBP);
    mov_rr(buf, Gpr::RBP, Gpr::RSP);
    push_r(buf, vec_base);
    mov_rr(buf, vec_base, vec_in);
    push_r(buf, ret_buf);
    mov_rr(buf, ret_buf, ret_in);
    if plan.stack_reserve > 0 {
        sub_rsp(buf, plan.stack_reserve);
    }

    if plan.ret == RetLoc::HiddenPtr {
        // The hidden result pointer claims the first argument register
        // before any declared parameter lands.
        mov_rr(buf, Gpr::RCX, ret_buf);
    }

    for (i, (&ty, loc)) in sig.params().iter().zip(&plan.args).enumerate() {
        let info =
            type_info(ty, conv).expect("void parameters are rejected during classification");
        // Value pointer for parameter `i`, then the value itself. R10 holds
        // the pointer and R11 stages stack-bound values, so a later pointer
        // load can never clobber an earlier staged value.
        load_gpr64(buf, Gpr::R10, vec_base, (i * 8) as i32);
        match *loc {
            ArgLoc::Gpr(enc) => load_scalar(buf, Gpr::new(enc), Gpr::R10, info),
            ArgLoc::Fpr(enc) => fp_load(buf, Xmm::new(enc), Gpr::R10, 0, info.size),
            ArgLoc::GprPair(lo, hi) => {
                load_gpr64(buf, Gpr::new(lo), Gpr::R10, 0);
                load_gpr64(buf, Gpr::new(hi), Gpr::R10, 8);
            }
            ArgLoc::Stack { offset, .. } => stage_stack_arg(buf, info, offset as i32, fp_scratch),
        }
    }

    if conv == CallConv::SystemV {
        // Fixed-arity contract: AL bounds the vector registers a variadic
        // callee would read.
        mov_al_imm8(buf, 0);
    }

    mov_rax_imm64(buf, sig.callee() as u64);
    call_r(buf, Gpr::RAX);

    match plan.ret {
        RetLoc::None | RetLoc::HiddenPtr => {}
        RetLoc::Gpr => {
            let size = ret_size(sig, conv);
            store_gpr(buf, ret_buf, 0, Gpr::RAX, size);
        }
        RetLoc::Fpr => {
            let size = ret_size(sig, conv);
            fp_store(buf, ret_buf, 0, Xmm::XMM0, size);
        }
        RetLoc::GprPair => {
            store_gpr(buf, ret_buf, 0, Gpr::RAX, 8);
            store_gpr(buf, ret_buf, 8, Gpr::RDX, 8);
        }
    }

    if plan.stack_reserve > 0 {
        add_rsp(buf, plan.stack_reserve);
    }
    pop_r(buf, ret_buf);
    pop_r(buf, vec_base);
    pop_r(buf, Gpr::RBP);
    ret(buf);
    Ok(())
}

fn ret_size(sig: &Signature, conv: CallConv) -> u8 {
    type_info(sig.ret(), conv)
        .expect("non-void return")
        .size
}

/// Copy one stack-bound parameter from its value cell into the reserved
/// outgoing slot(s) at `RSP + offset`.
fn stage_stack_arg(buf: &mut CodeBuffer, info: TypeInfo, offset: i32, fp_scratch: Xmm) {
    match info.bank {
        Bank::Float => {
            fp_load(buf, fp_scratch, Gpr::R10, 0, info.size);
            fp_store(buf, Gpr::RSP, offset, fp_scratch, info.size);
        }
        Bank::IntPair => {
            load_gpr64(buf, Gpr::R11, Gpr::R10, 0);
            store_gpr(buf, Gpr::RSP, offset, Gpr::R11, 8);
            load_gpr64(buf, Gpr::R11, Gpr::R10, 8);
            store_gpr(buf, Gpr::RSP, offset + 8, Gpr::R11, 8);
        }
        Bank::Int => {
            load_scalar(buf, Gpr::R11, Gpr::R10, info);
            store_gpr(buf, Gpr::RSP, offset, Gpr::R11, 8);
        }
    }
}

//=============================================================================
// Instruction forms

/// `endbr64`: the indirect-branch landing pad required under CET.
fn endbr64(buf: &mut CodeBuffer) {
    buf.put1(0xF3);
    buf.put1(0x0F);
    buf.put1(0x1E);
    buf.put1(0xFA);
}

fn push_r(buf: &mut CodeBuffer, r: Gpr) {
    if r.is_extended() {
        buf.put1(0x41);
    }
    buf.put1(0x50 + r.low3());
}

fn pop_r(buf: &mut CodeBuffer, r: Gpr) {
    if r.is_extended() {
        buf.put1(0x41);
    }
    buf.put1(0x58 + r.low3());
}

/// `MOV dst, src` between 64-bit registers (89 /r).
fn mov_rr(buf: &mut CodeBuffer, dst: Gpr, src: Gpr) {
    RexFlags::set_w().emit_reg_reg(buf, src.enc(), dst.enc());
    buf.put1(0x89);
    buf.put1(encode_modrm(0b11, src.low3(), dst.low3()));
}

/// `MOV dst, [base + disp]`, 64-bit (8B /r).
fn load_gpr64(buf: &mut CodeBuffer, dst: Gpr, base: Gpr, disp: i32) {
    RexFlags::set_w().emit_reg_mem(buf, dst.enc(), base);
    buf.put1(0x8B);
    emit_mem(buf, dst.low3(), base, disp);
}

/// Load a scalar integer value from `[base]` into `dst` with the
/// width-appropriate extension to 64 bits.
fn load_scalar(buf: &mut CodeBuffer, dst: Gpr, base: Gpr, info: TypeInfo) {
    match (info.size, info.signed) {
        // MOVZX/MOVSX r64, r/m8|r/m16.
        (1, false) => load_ext(buf, dst, base, 0xB6),
        (1, true) => load_ext(buf, dst, base, 0xBE),
        (2, false) => load_ext(buf, dst, base, 0xB7),
        (2, true) => load_ext(buf, dst, base, 0xBF),
        // MOVSXD r64, r/m32.
        (4, true) => {
            RexFlags::set_w().emit_reg_mem(buf, dst.enc(), base);
            buf.put1(0x63);
            emit_mem(buf, dst.low3(), base, 0);
        }
        // MOV r32, r/m32: writing the 32-bit register clears the upper half.
        (4, false) => {
            RexFlags::clear_w().emit_reg_mem(buf, dst.enc(), base);
            buf.put1(0x8B);
            emit_mem(buf, dst.low3(), base, 0);
        }
        (8, _) => load_gpr64(buf, dst, base, 0),
        _ => unreachable!("pair-sized values are loaded half by half"),
    }
}

fn load_ext(buf: &mut CodeBuffer, dst: Gpr, base: Gpr, opcode: u8) {
    RexFlags::set_w().emit_reg_mem(buf, dst.enc(), base);
    buf.put1(0x0F);
    buf.put1(opcode);
    emit_mem(buf, dst.low3(), base, 0);
}

/// Store the low `size` bytes of `src` to `[base + disp]`.
fn store_gpr(buf: &mut CodeBuffer, base: Gpr, disp: i32, src: Gpr, size: u8) {
    match size {
        1 => {
            // MOV r/m8, r8 (88 /r); the sources used here (AL, R11B) never
            // need a REX solely for byte-register access.
            RexFlags::clear_w().emit_reg_mem(buf, src.enc(), base);
            buf.put1(0x88);
        }
        2 => {
            buf.put1(0x66);
            RexFlags::clear_w().emit_reg_mem(buf, src.enc(), base);
            buf.put1(0x89);
        }
        4 => {
            RexFlags::clear_w().emit_reg_mem(buf, src.enc(), base);
            buf.put1(0x89);
        }
        8 => {
            RexFlags::set_w().emit_reg_mem(buf, src.enc(), base);
            buf.put1(0x89);
        }
        _ => unreachable!("stores are at most 8 bytes wide"),
    }
    emit_mem(buf, src.low3(), base, disp);
}

/// `MOVSS`/`MOVSD` xmm, [base + disp].
fn fp_load(buf: &mut CodeBuffer, dst: Xmm, base: Gpr, disp: i32, size: u8) {
    buf.put1(if size == 4 { 0xF3 } else { 0xF2 });
    RexFlags::clear_w().emit_reg_mem(buf, dst.enc(), base);
    buf.put1(0x0F);
    buf.put1(0x10);
    emit_mem(buf, dst.low3(), base, disp);
}

/// `MOVSS`/`MOVSD` [base + disp], xmm.
fn fp_store(buf: &mut CodeBuffer, base: Gpr, disp: i32, src: Xmm, size: u8) {
    buf.put1(if size == 4 { 0xF3 } else { 0xF2 });
    RexFlags::clear_w().emit_reg_mem(buf, src.enc(), base);
    buf.put1(0x0F);
    buf.put1(0x11);
    emit_mem(buf, src.low3(), base, disp);
}

fn sub_rsp(buf: &mut CodeBuffer, imm: u32) {
    alu_rsp(buf, 5, imm);
}

fn add_rsp(buf: &mut CodeBuffer, imm: u32) {
    alu_rsp(buf, 0, imm);
}

/// Immediate-group ALU op on RSP (83 /g ib or 81 /g id).
fn alu_rsp(buf: &mut CodeBuffer, group: u8, imm: u32) {
    RexFlags::set_w().emit_reg_reg(buf, 0, Gpr::RSP.enc());
    if imm <= i8::MAX as u32 {
        buf.put1(0x83);
        buf.put1(encode_modrm(0b11, group, Gpr::RSP.low3()));
        buf.put1(imm as u8);
    } else {
        buf.put1(0x81);
        buf.put1(encode_modrm(0b11, group, Gpr::RSP.low3()));
        buf.put4(imm);
    }
}

fn mov_al_imm8(buf: &mut CodeBuffer, v: u8) {
    buf.put1(0xB0);
    buf.put1(v);
}

/// `MOV RAX, imm64`.
fn mov_rax_imm64(buf: &mut CodeBuffer, v: u64) {
    buf.put1(0x48);
    buf.put1(0xB8);
    buf.put8(v);
}

/// `CALL r` (FF /2).
fn call_r(buf: &mut CodeBuffer, r: Gpr) {
    if r.is_extended() {
        buf.put1(0x41);
    }
    buf.put1(0xFF);
    buf.put1(encode_modrm(0b11, 2, r.low3()));
}

fn ret(buf: &mut CodeBuffer) {
    buf.put1(0xC3);
}
