// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bytecode builder ("assembler").
//!
//! A small helper for constructing instruction streams without computing jump offsets by hand.
//! The output is not verified; pass it through [`verify`](crate::verifier::verify) (or
//! configure an execution context with it) to check it.
//!
//! ```
//! use sandbox_host::asm::{Asm, JmpCond};
//! use sandbox_host::call::CallId;
//!
//! let mut a = Asm::new();
//! let done = a.label();
//! a.mov64_imm(0, 0);
//! a.jmp_imm(JmpCond::Eq, 1, 0, done);
//! a.call(CallId(0x03));
//! a.bind(done);
//! a.exit();
//! let code = a.finish().unwrap();
//! assert_eq!(code.len(), 4 * 8);
//! ```

use alloc::vec::Vec;
use core::fmt;

use crate::bytecode::{INSN_SIZE, Insn};
use crate::call::CallId;
use crate::opcode;

pub use crate::opcode::{AluOp, JmpCond, Size};

/// A label for control-flow targets.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Label(u32);

/// A bytecode builder error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AsmError {
    /// A label was referenced but never placed.
    UnresolvedLabel {
        /// The label.
        label: Label,
    },
    /// A jump distance does not fit the 16-bit offset field.
    JumpTooFar {
        /// Slot index of the jump.
        pc: usize,
    },
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedLabel { label } => {
                write!(f, "label {} was referenced but never placed", label.0)
            }
            Self::JumpTooFar { pc } => write!(f, "jump at pc={pc} does not fit in 16 bits"),
        }
    }
}

impl core::error::Error for AsmError {}

/// Instruction stream builder.
#[derive(Clone, Debug, Default)]
pub struct Asm {
    insns: Vec<Insn>,
    labels: Vec<Option<usize>>,
    fixups: Vec<(usize, Label)>,
}

impl Asm {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot index of the next instruction.
    #[must_use]
    pub fn here(&self) -> usize {
        self.insns.len()
    }

    /// Creates an unplaced label.
    pub fn label(&mut self) -> Label {
        let id = self.labels.len() as u32;
        self.labels.push(None);
        Label(id)
    }

    /// Places `label` at the next instruction.
    pub fn bind(&mut self, label: Label) {
        self.labels[label.0 as usize] = Some(self.insns.len());
    }

    /// Appends a raw slot.
    pub fn raw(&mut self, insn: Insn) -> &mut Self {
        self.insns.push(insn);
        self
    }

    fn emit(&mut self, opcode: u8, dst: u8, src: u8, off: i16, imm: i32) -> &mut Self {
        self.raw(Insn {
            opcode,
            dst,
            src,
            off,
            imm,
        })
    }

    /// `dst = dst op imm` (64-bit).
    pub fn alu64_imm(&mut self, op: AluOp, dst: u8, imm: i32) -> &mut Self {
        self.emit(opcode::CLASS_ALU64 | op.code() | opcode::SRC_K, dst, 0, 0, imm)
    }

    /// `dst = dst op src` (64-bit).
    pub fn alu64_reg(&mut self, op: AluOp, dst: u8, src: u8) -> &mut Self {
        self.emit(opcode::CLASS_ALU64 | op.code() | opcode::SRC_X, dst, src, 0, 0)
    }

    /// `dst = dst op imm` (32-bit, zero-extended).
    pub fn alu32_imm(&mut self, op: AluOp, dst: u8, imm: i32) -> &mut Self {
        self.emit(opcode::CLASS_ALU | op.code() | opcode::SRC_K, dst, 0, 0, imm)
    }

    /// `dst = dst op src` (32-bit, zero-extended).
    pub fn alu32_reg(&mut self, op: AluOp, dst: u8, src: u8) -> &mut Self {
        self.emit(opcode::CLASS_ALU | op.code() | opcode::SRC_X, dst, src, 0, 0)
    }

    /// `dst = imm` (sign-extended).
    pub fn mov64_imm(&mut self, dst: u8, imm: i32) -> &mut Self {
        self.alu64_imm(AluOp::Mov, dst, imm)
    }

    /// `dst = src`.
    pub fn mov64_reg(&mut self, dst: u8, src: u8) -> &mut Self {
        self.alu64_reg(AluOp::Mov, dst, src)
    }

    /// `dst += imm`.
    pub fn add64_imm(&mut self, dst: u8, imm: i32) -> &mut Self {
        self.alu64_imm(AluOp::Add, dst, imm)
    }

    /// `dst += src`.
    pub fn add64_reg(&mut self, dst: u8, src: u8) -> &mut Self {
        self.alu64_reg(AluOp::Add, dst, src)
    }

    /// `dst = imm` for a full 64-bit immediate (two slots).
    pub fn lddw(&mut self, dst: u8, imm: u64) -> &mut Self {
        self.emit(opcode::LDDW, dst, 0, 0, imm as u32 as i32);
        self.emit(0, 0, 0, 0, (imm >> 32) as u32 as i32)
    }

    /// `dst = *(size *)(src + off)`.
    pub fn ldx(&mut self, size: Size, dst: u8, src: u8, off: i16) -> &mut Self {
        self.emit(
            opcode::CLASS_LDX | opcode::MODE_MEM | size.code(),
            dst,
            src,
            off,
            0,
        )
    }

    /// `*(size *)(dst + off) = imm`.
    pub fn st(&mut self, size: Size, dst: u8, off: i16, imm: i32) -> &mut Self {
        self.emit(
            opcode::CLASS_ST | opcode::MODE_MEM | size.code(),
            dst,
            0,
            off,
            imm,
        )
    }

    /// `*(size *)(dst + off) = src`.
    pub fn stx(&mut self, size: Size, dst: u8, src: u8, off: i16) -> &mut Self {
        self.emit(
            opcode::CLASS_STX | opcode::MODE_MEM | size.code(),
            dst,
            src,
            off,
            0,
        )
    }

    fn jump(&mut self, opcode: u8, dst: u8, src: u8, imm: i32, target: Label) -> &mut Self {
        self.fixups.push((self.insns.len(), target));
        self.emit(opcode, dst, src, 0, imm)
    }

    /// Unconditional jump.
    pub fn ja(&mut self, target: Label) -> &mut Self {
        self.jump(opcode::JA, 0, 0, 0, target)
    }

    /// Jump if `cond(dst, imm)`.
    pub fn jmp_imm(&mut self, cond: JmpCond, dst: u8, imm: i32, target: Label) -> &mut Self {
        self.jump(
            opcode::CLASS_JMP | cond.code() | opcode::SRC_K,
            dst,
            0,
            imm,
            target,
        )
    }

    /// Jump if `cond(dst, src)`.
    pub fn jmp_reg(&mut self, cond: JmpCond, dst: u8, src: u8, target: Label) -> &mut Self {
        self.jump(
            opcode::CLASS_JMP | cond.code() | opcode::SRC_X,
            dst,
            src,
            0,
            target,
        )
    }

    /// Host call.
    pub fn call(&mut self, id: CallId) -> &mut Self {
        self.emit(opcode::CALL, 0, 0, 0, id.0 as i32)
    }

    /// Return `r0`.
    pub fn exit(&mut self) -> &mut Self {
        self.emit(opcode::EXIT, 0, 0, 0, 0)
    }

    /// Resolves labels and returns the encoded program.
    pub fn finish(mut self) -> Result<Vec<u8>, AsmError> {
        for &(pc, label) in &self.fixups {
            let target = self.labels[label.0 as usize]
                .ok_or(AsmError::UnresolvedLabel { label })?;
            let off = target as i64 - (pc as i64 + 1);
            self.insns[pc].off = i16::try_from(off).map_err(|_| AsmError::JumpTooFar { pc })?;
        }
        let mut out = Vec::with_capacity(self.insns.len() * INSN_SIZE);
        for insn in &self.insns {
            out.extend_from_slice(&insn.encode());
        }
        Ok(out)
    }
}
