// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Opcode byte layout for the eBPF-style instruction subset.
//!
//! An opcode byte is `operation | source | class` for ALU and jump instructions and
//! `mode | size | class` for loads and stores.

/// `lddw` and other wide loads.
pub const CLASS_LD: u8 = 0x00;
/// Register load from memory.
pub const CLASS_LDX: u8 = 0x01;
/// Immediate store to memory.
pub const CLASS_ST: u8 = 0x02;
/// Register store to memory.
pub const CLASS_STX: u8 = 0x03;
/// 32-bit arithmetic.
pub const CLASS_ALU: u8 = 0x04;
/// Jumps, calls, exit.
pub const CLASS_JMP: u8 = 0x05;
/// 64-bit arithmetic.
pub const CLASS_ALU64: u8 = 0x07;

/// Operand is the `imm` field.
pub const SRC_K: u8 = 0x00;
/// Operand is the `src` register.
pub const SRC_X: u8 = 0x08;

/// Immediate addressing mode (`lddw`).
pub const MODE_IMM: u8 = 0x00;
/// Memory addressing mode (`ldx`, `st`, `stx`).
pub const MODE_MEM: u8 = 0x60;

/// `lddw dst, imm64` (two slots).
pub const LDDW: u8 = CLASS_LD | MODE_IMM | Size::Dw.code();
/// `call imm`.
pub const CALL: u8 = CLASS_JMP | 0x80;
/// `exit`.
pub const EXIT: u8 = CLASS_JMP | 0x90;
/// `ja off`.
pub const JA: u8 = CLASS_JMP;

const CLASS_MASK: u8 = 0x07;
const SIZE_MASK: u8 = 0x18;
const MODE_MASK: u8 = 0xe0;
const OP_MASK: u8 = 0xf0;

/// Class bits of an opcode.
#[must_use]
pub const fn class(opcode: u8) -> u8 {
    opcode & CLASS_MASK
}

/// Operation bits of an ALU or jump opcode.
#[must_use]
pub const fn op(opcode: u8) -> u8 {
    opcode & OP_MASK
}

/// Returns `true` if the operand comes from the `src` register.
#[must_use]
pub const fn uses_src_reg(opcode: u8) -> bool {
    opcode & SRC_X != 0
}

/// Mode bits of a load/store opcode.
#[must_use]
pub const fn mode(opcode: u8) -> u8 {
    opcode & MODE_MASK
}

/// Access width of a load or store.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Size {
    /// 4 bytes.
    W,
    /// 2 bytes.
    H,
    /// 1 byte.
    B,
    /// 8 bytes.
    Dw,
}

impl Size {
    /// Size bits.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::W => 0x00,
            Self::H => 0x08,
            Self::B => 0x10,
            Self::Dw => 0x18,
        }
    }

    /// Decodes the size bits of `opcode`.
    #[must_use]
    pub const fn of(opcode: u8) -> Self {
        match opcode & SIZE_MASK {
            0x00 => Self::W,
            0x08 => Self::H,
            0x10 => Self::B,
            _ => Self::Dw,
        }
    }

    /// Width in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::B => 1,
            Self::H => 2,
            Self::W => 4,
            Self::Dw => 8,
        }
    }

    /// Mnemonic suffix.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::B => "b",
            Self::H => "h",
            Self::W => "w",
            Self::Dw => "dw",
        }
    }
}

/// Arithmetic operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AluOp {
    /// `dst += src`
    Add,
    /// `dst -= src`
    Sub,
    /// `dst *= src`
    Mul,
    /// `dst /= src` (unsigned)
    Div,
    /// `dst |= src`
    Or,
    /// `dst &= src`
    And,
    /// `dst <<= src`
    Lsh,
    /// `dst >>= src` (logical)
    Rsh,
    /// `dst = -dst`
    Neg,
    /// `dst %= src` (unsigned)
    Mod,
    /// `dst ^= src`
    Xor,
    /// `dst = src`
    Mov,
    /// `dst >>= src` (arithmetic)
    Arsh,
}

impl AluOp {
    /// Operation bits.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Add => 0x00,
            Self::Sub => 0x10,
            Self::Mul => 0x20,
            Self::Div => 0x30,
            Self::Or => 0x40,
            Self::And => 0x50,
            Self::Lsh => 0x60,
            Self::Rsh => 0x70,
            Self::Neg => 0x80,
            Self::Mod => 0x90,
            Self::Xor => 0xa0,
            Self::Mov => 0xb0,
            Self::Arsh => 0xc0,
        }
    }

    /// Decodes operation bits.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => Self::Add,
            0x10 => Self::Sub,
            0x20 => Self::Mul,
            0x30 => Self::Div,
            0x40 => Self::Or,
            0x50 => Self::And,
            0x60 => Self::Lsh,
            0x70 => Self::Rsh,
            0x80 => Self::Neg,
            0x90 => Self::Mod,
            0xa0 => Self::Xor,
            0xb0 => Self::Mov,
            0xc0 => Self::Arsh,
            _ => return None,
        })
    }

    /// Mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Or => "or",
            Self::And => "and",
            Self::Lsh => "lsh",
            Self::Rsh => "rsh",
            Self::Neg => "neg",
            Self::Mod => "mod",
            Self::Xor => "xor",
            Self::Mov => "mov",
            Self::Arsh => "arsh",
        }
    }
}

/// Conditional jump predicates (64-bit comparisons).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum JmpCond {
    /// `==`
    Eq,
    /// `>` unsigned
    Gt,
    /// `>=` unsigned
    Ge,
    /// `dst & src != 0`
    Set,
    /// `!=`
    Ne,
    /// `>` signed
    Sgt,
    /// `>=` signed
    Sge,
    /// `<` unsigned
    Lt,
    /// `<=` unsigned
    Le,
    /// `<` signed
    Slt,
    /// `<=` signed
    Sle,
}

impl JmpCond {
    /// Operation bits.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Eq => 0x10,
            Self::Gt => 0x20,
            Self::Ge => 0x30,
            Self::Set => 0x40,
            Self::Ne => 0x50,
            Self::Sgt => 0x60,
            Self::Sge => 0x70,
            Self::Lt => 0xa0,
            Self::Le => 0xb0,
            Self::Slt => 0xc0,
            Self::Sle => 0xd0,
        }
    }

    /// Decodes operation bits.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x10 => Self::Eq,
            0x20 => Self::Gt,
            0x30 => Self::Ge,
            0x40 => Self::Set,
            0x50 => Self::Ne,
            0x60 => Self::Sgt,
            0x70 => Self::Sge,
            0xa0 => Self::Lt,
            0xb0 => Self::Le,
            0xc0 => Self::Slt,
            0xd0 => Self::Sle,
            _ => return None,
        })
    }

    /// Evaluates the predicate.
    #[must_use]
    pub const fn holds(self, a: u64, b: u64) -> bool {
        match self {
            Self::Eq => a == b,
            Self::Gt => a > b,
            Self::Ge => a >= b,
            Self::Set => a & b != 0,
            Self::Ne => a != b,
            Self::Sgt => (a as i64) > (b as i64),
            Self::Sge => (a as i64) >= (b as i64),
            Self::Lt => a < b,
            Self::Le => a <= b,
            Self::Slt => (a as i64) < (b as i64),
            Self::Sle => (a as i64) <= (b as i64),
        }
    }

    /// Mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Eq => "jeq",
            Self::Gt => "jgt",
            Self::Ge => "jge",
            Self::Set => "jset",
            Self::Ne => "jne",
            Self::Sgt => "jsgt",
            Self::Sge => "jsge",
            Self::Lt => "jlt",
            Self::Le => "jle",
            Self::Slt => "jslt",
            Self::Sle => "jsle",
        }
    }
}
