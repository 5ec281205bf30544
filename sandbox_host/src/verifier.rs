// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Structural bytecode verification.
//!
//! Verification rejects programs the interpreter could not execute meaningfully: truncated or
//! unknown instructions, bad register numbers, writes to the frame pointer, jumps that leave
//! the program or land inside a `lddw`, and division by a constant zero. It does not track
//! values, so memory safety is still enforced at runtime by region checks.

use alloc::vec::Vec;
use core::fmt;

use crate::abi::{FRAME_POINTER, REGISTER_COUNT};
use crate::bytecode::{self, DecodeError, INSN_SIZE, Instr, Operand};
use crate::opcode::AluOp;

/// Verifier configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VerifyConfig {
    /// Require the last instruction to be `exit` or `ja`.
    pub require_exit: bool,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self { require_exit: true }
    }
}

/// Bytecode that passed [`verify`], with its instructions decoded once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedBytecode<'a> {
    code: &'a [u8],
    instrs: Vec<Option<Instr>>,
}

impl<'a> VerifiedBytecode<'a> {
    /// The raw bytecode.
    #[must_use]
    pub fn code(&self) -> &'a [u8] {
        self.code
    }

    /// Number of 8-byte slots.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.instrs.len()
    }

    /// The instruction starting at slot `pc`. `None` for the second slot of a `lddw` and past the
    /// end.
    #[must_use]
    pub fn instr(&self, pc: usize) -> Option<&Instr> {
        self.instrs.get(pc).and_then(Option::as_ref)
    }
}

/// A verification error. `pc` values are slot indices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyError {
    /// No instructions.
    Empty,
    /// Length is not a multiple of the slot size.
    Misaligned {
        /// Byte length.
        len: usize,
    },
    /// The slot does not decode.
    Decode {
        /// Slot index.
        pc: usize,
        /// Decoder error.
        error: DecodeError,
    },
    /// A register number above `r10`.
    BadRegister {
        /// Slot index.
        pc: usize,
        /// Register number.
        reg: u8,
    },
    /// The instruction writes the read-only frame pointer.
    WritesFramePointer {
        /// Slot index.
        pc: usize,
    },
    /// A jump target is outside the program.
    JumpOutOfBounds {
        /// Slot index of the jump.
        pc: usize,
        /// Computed target.
        target: i64,
    },
    /// A jump lands on the second slot of a `lddw`.
    JumpIntoLddw {
        /// Slot index of the jump.
        pc: usize,
        /// Computed target.
        target: usize,
    },
    /// `div`/`mod` by the immediate zero.
    DivisionByZero {
        /// Slot index.
        pc: usize,
    },
    /// The program can fall off its end.
    MissingExit,
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty program"),
            Self::Misaligned { len } => {
                write!(f, "program length {len} is not a multiple of {INSN_SIZE}")
            }
            Self::Decode { pc, error } => write!(f, "pc={pc}: {error}"),
            Self::BadRegister { pc, reg } => write!(f, "pc={pc}: invalid register r{reg}"),
            Self::WritesFramePointer { pc } => write!(f, "pc={pc}: write to frame pointer"),
            Self::JumpOutOfBounds { pc, target } => {
                write!(f, "pc={pc}: jump target {target} out of bounds")
            }
            Self::JumpIntoLddw { pc, target } => {
                write!(f, "pc={pc}: jump target {target} is inside lddw")
            }
            Self::DivisionByZero { pc } => write!(f, "pc={pc}: division by constant zero"),
            Self::MissingExit => write!(f, "program does not end with exit or ja"),
        }
    }
}

impl core::error::Error for VerifyError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Decode { error, .. } => Some(error),
            _ => None,
        }
    }
}

fn check_reg(pc: usize, reg: u8) -> Result<(), VerifyError> {
    if usize::from(reg) < REGISTER_COUNT {
        Ok(())
    } else {
        Err(VerifyError::BadRegister { pc, reg })
    }
}

fn check_instr(pc: usize, instr: &Instr) -> Result<(), VerifyError> {
    match *instr {
        Instr::Alu { op, dst, src, .. } => {
            check_reg(pc, dst)?;
            if let Operand::Reg(r) = src {
                check_reg(pc, r)?;
            }
            if matches!(op, AluOp::Div | AluOp::Mod) && src == Operand::Imm(0) {
                return Err(VerifyError::DivisionByZero { pc });
            }
        }
        Instr::Jmp { dst, src, .. } => {
            check_reg(pc, dst)?;
            if let Operand::Reg(r) = src {
                check_reg(pc, r)?;
            }
        }
        Instr::Lddw { dst, .. } => check_reg(pc, dst)?,
        Instr::Ldx { dst, src, .. } | Instr::Stx { dst, src, .. } => {
            check_reg(pc, dst)?;
            check_reg(pc, src)?;
        }
        Instr::St { dst, .. } => check_reg(pc, dst)?,
        Instr::Call { .. } | Instr::Exit => {}
    }
    if instr.writes() == Some(FRAME_POINTER as u8) {
        return Err(VerifyError::WritesFramePointer { pc });
    }
    Ok(())
}

/// Verifies `code` and decodes it.
pub fn verify(code: &[u8], config: VerifyConfig) -> Result<VerifiedBytecode<'_>, VerifyError> {
    if code.is_empty() {
        return Err(VerifyError::Empty);
    }
    if code.len() % INSN_SIZE != 0 {
        return Err(VerifyError::Misaligned { len: code.len() });
    }
    let slots = code.len() / INSN_SIZE;
    let mut instrs: Vec<Option<Instr>> = alloc::vec![None; slots];
    let mut last = None;

    let mut pc = 0;
    while pc < slots {
        let instr =
            bytecode::decode(code, pc).map_err(|error| VerifyError::Decode { pc, error })?;
        check_instr(pc, &instr)?;
        instrs[pc] = Some(instr);
        last = Some(instr);
        pc += instr.slots();
    }

    for (pc, instr) in instrs.iter().enumerate() {
        let Some(Instr::Jmp { off, .. }) = instr else {
            continue;
        };
        let target = pc as i64 + 1 + i64::from(*off);
        let Some(t) = usize::try_from(target).ok().filter(|&t| t < slots) else {
            return Err(VerifyError::JumpOutOfBounds { pc, target });
        };
        if instrs[t].is_none() {
            return Err(VerifyError::JumpIntoLddw { pc, target: t });
        }
    }

    if config.require_exit && !matches!(last, Some(Instr::Exit | Instr::Jmp { cond: None, .. })) {
        return Err(VerifyError::MissingExit);
    }

    tracing::debug!(slots, "verified bytecode");
    Ok(VerifiedBytecode { code, instrs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::{Asm, JmpCond};
    use crate::bytecode::Insn;
    use crate::opcode;

    fn raw(insns: &[Insn]) -> Vec<u8> {
        insns.iter().flat_map(|i| i.encode()).collect()
    }

    const EXIT: Insn = Insn {
        opcode: opcode::EXIT,
        dst: 0,
        src: 0,
        off: 0,
        imm: 0,
    };

    #[test]
    fn accepts_assembled_program() {
        let mut a = Asm::new();
        let top = a.label();
        a.mov64_imm(0, 0);
        a.bind(top);
        a.add64_imm(0, 1);
        a.jmp_imm(JmpCond::Lt, 0, 10, top);
        a.lddw(1, 0x1_0000_0000);
        a.exit();
        let code = a.finish().unwrap();
        let v = verify(&code, VerifyConfig::default()).unwrap();
        assert_eq!(v.slot_count(), 6);
        assert!(v.instr(4).is_none());
        assert_eq!(v.instr(5), Some(&Instr::Exit));
    }

    #[test]
    fn rejects_shape_errors() {
        assert_eq!(verify(&[], VerifyConfig::default()), Err(VerifyError::Empty));
        assert_eq!(
            verify(&[0x95, 0, 0], VerifyConfig::default()),
            Err(VerifyError::Misaligned { len: 3 })
        );
        let code = raw(&[Insn {
            opcode: 0xff,
            ..EXIT
        }]);
        assert!(matches!(
            verify(&code, VerifyConfig::default()),
            Err(VerifyError::Decode { pc: 0, .. })
        ));
    }

    #[test]
    fn rejects_register_misuse() {
        let bad_reg = raw(&[
            Insn {
                opcode: 0xb7,
                dst: 11,
                ..EXIT
            },
            EXIT,
        ]);
        assert_eq!(
            verify(&bad_reg, VerifyConfig::default()),
            Err(VerifyError::BadRegister { pc: 0, reg: 11 })
        );
        let fp = raw(&[
            Insn {
                opcode: 0xb7,
                dst: 10,
                ..EXIT
            },
            EXIT,
        ]);
        assert_eq!(
            verify(&fp, VerifyConfig::default()),
            Err(VerifyError::WritesFramePointer { pc: 0 })
        );
    }

    #[test]
    fn rejects_bad_jumps() {
        let out = raw(&[
            Insn {
                opcode: opcode::JA,
                off: 5,
                ..EXIT
            },
            EXIT,
        ]);
        assert_eq!(
            verify(&out, VerifyConfig::default()),
            Err(VerifyError::JumpOutOfBounds { pc: 0, target: 6 })
        );
        let into_lddw = raw(&[
            Insn {
                opcode: opcode::JA,
                off: 1,
                ..EXIT
            },
            Insn {
                opcode: opcode::LDDW,
                ..EXIT
            },
            Insn { opcode: 0, ..EXIT },
            EXIT,
        ]);
        assert_eq!(
            verify(&into_lddw, VerifyConfig::default()),
            Err(VerifyError::JumpIntoLddw { pc: 0, target: 2 })
        );
    }

    #[test]
    fn rejects_constant_division_by_zero() {
        let code = raw(&[
            Insn {
                opcode: 0x37,
                ..EXIT
            },
            EXIT,
        ]);
        assert_eq!(
            verify(&code, VerifyConfig::default()),
            Err(VerifyError::DivisionByZero { pc: 0 })
        );
    }

    #[test]
    fn final_exit_is_optional_with_no_return() {
        let code = raw(&[Insn {
            opcode: 0xb7,
            ..EXIT
        }]);
        assert_eq!(
            verify(&code, VerifyConfig::default()),
            Err(VerifyError::MissingExit)
        );
        assert!(verify(&code, VerifyConfig { require_exit: false }).is_ok());
    }
}
