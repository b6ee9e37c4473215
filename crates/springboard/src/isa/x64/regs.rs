//! x86-64 register definitions.

/// A general-purpose register, identified by its 4-bit hardware encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Gpr(u8);

impl Gpr {
    pub const RAX: Gpr = Gpr(0);
    pub const RCX: Gpr = Gpr(1);
    pub const RDX: Gpr = Gpr(2);
    pub const RSP: Gpr = Gpr(4);
    pub const RBP: Gpr = Gpr(5);
    pub const RSI: Gpr = Gpr(6);
    pub const RDI: Gpr = Gpr(7);
    pub const R8: Gpr = Gpr(8);
    pub const R9: Gpr = Gpr(9);
    pub const R10: Gpr = Gpr(10);
    pub const R11: Gpr = Gpr(11);
    pub const R12: Gpr = Gpr(12);
    pub const R13: Gpr = Gpr(13);
    pub const R14: Gpr = Gpr(14);

    /// Create a register from its hardware encoding.
    pub fn new(enc: u8) -> Gpr {
        debug_assert!(enc < 16);
        Gpr(enc)
    }

    /// The full hardware encoding, 0–15.
    pub fn enc(self) -> u8 {
        self.0
    }

    /// The low three bits, as placed in ModR/M and SIB fields.
    pub fn low3(self) -> u8 {
        self.0 & 7
    }

    /// Whether encoding this register requires a REX extension bit.
    pub fn is_extended(self) -> bool {
        self.0 >= 8
    }
}

/// An SSE register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Xmm(u8);

impl Xmm {
    pub const XMM0: Xmm = Xmm(0);
    /// Scratch for stack-bound FP values under the Microsoft convention
    /// (XMM0–5 are volatile there; XMM6+ are callee-saved).
    pub const XMM4: Xmm = Xmm(4);
    /// Scratch for stack-bound FP values under System V, where XMM0–7 all
    /// carry arguments.
    pub const XMM8: Xmm = Xmm(8);

    /// Create a register from its hardware encoding.
    pub fn new(enc: u8) -> Xmm {
        debug_assert!(enc < 16);
        Xmm(enc)
    }

    /// The full hardware encoding, 0–15.
    pub fn enc(self) -> u8 {
        self.0
    }

    /// The low three bits, as placed in ModR/M fields.
    pub fn low3(self) -> u8 {
        self.0 & 7
    }

    /// Whether encoding this register requires a REX extension bit.
    pub fn is_extended(self) -> bool {
        self.0 >= 8
    }
}

/// System V integer argument registers, in assignment order.
pub(crate) const SYSV_ARG_GPRS: [Gpr; 6] = [
    Gpr::RDI,
    Gpr::RSI,
    Gpr::RDX,
    Gpr::RCX,
    Gpr::R8,
    Gpr::R9,
];

/// System V floating-point argument register count (XMM0–XMM7).
pub(crate) const SYSV_ARG_XMMS: u8 = 8;

/// Microsoft x64 integer argument registers, by positional slot.
pub(crate) const WIN64_ARG_GPRS: [Gpr; 4] = [Gpr::RCX, Gpr::RDX, Gpr::R8, Gpr::R9];

/// Byte count of the Microsoft x64 shadow space.
pub(crate) const WIN64_SHADOW_SPACE: u32 = 32;
