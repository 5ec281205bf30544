// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Instruction slot encoding and decoding.
//!
//! A program is a sequence of 8-byte slots `{ opcode: u8, regs: u8 (src << 4 | dst), off: i16,
//! imm: i32 }`, little-endian. `lddw` spans two slots; the second carries the upper 32 bits of
//! the immediate in its `imm` field and must otherwise be zero.

use core::fmt;

use crate::call::CallId;
use crate::opcode::{self, AluOp, JmpCond, Size};

/// Size of one instruction slot in bytes.
pub const INSN_SIZE: usize = 8;

/// One raw instruction slot.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Insn {
    /// Opcode byte.
    pub opcode: u8,
    /// Destination register (low nibble).
    pub dst: u8,
    /// Source register (high nibble).
    pub src: u8,
    /// Signed offset.
    pub off: i16,
    /// Signed immediate.
    pub imm: i32,
}

impl Insn {
    /// Decodes one slot.
    #[must_use]
    pub const fn decode(b: [u8; INSN_SIZE]) -> Self {
        Self {
            opcode: b[0],
            dst: b[1] & 0x0f,
            src: b[1] >> 4,
            off: i16::from_le_bytes([b[2], b[3]]),
            imm: i32::from_le_bytes([b[4], b[5], b[6], b[7]]),
        }
    }

    /// Decodes slot `pc` of `code`, if present.
    #[must_use]
    pub fn at(code: &[u8], pc: usize) -> Option<Self> {
        let start = pc.checked_mul(INSN_SIZE)?;
        let bytes = code.get(start..start.checked_add(INSN_SIZE)?)?;
        let mut slot = [0_u8; INSN_SIZE];
        slot.copy_from_slice(bytes);
        Some(Self::decode(slot))
    }

    /// Encodes the slot.
    #[must_use]
    pub const fn encode(&self) -> [u8; INSN_SIZE] {
        let off = self.off.to_le_bytes();
        let imm = self.imm.to_le_bytes();
        [
            self.opcode,
            (self.src << 4) | (self.dst & 0x0f),
            off[0],
            off[1],
            imm[0],
            imm[1],
            imm[2],
            imm[3],
        ]
    }
}

/// The second operand of an ALU or jump instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    /// A register.
    Reg(u8),
    /// The sign-extended immediate.
    Imm(i32),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reg(r) => write!(f, "r{r}"),
            Self::Imm(i) => write!(f, "{i}"),
        }
    }
}

/// A decoded instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Instr {
    /// Arithmetic. `wide` selects 64-bit operation; 32-bit results are zero-extended.
    Alu {
        /// 64-bit operation.
        wide: bool,
        /// Operation.
        op: AluOp,
        /// Destination register.
        dst: u8,
        /// Second operand (ignored by `neg`).
        src: Operand,
    },
    /// `ja` (`cond == None`) or a conditional jump to `pc + 1 + off`.
    Jmp {
        /// Predicate, `None` for an unconditional jump.
        cond: Option<JmpCond>,
        /// Left register.
        dst: u8,
        /// Right operand.
        src: Operand,
        /// Slot offset relative to the next instruction.
        off: i16,
    },
    /// Host call.
    Call {
        /// Call id.
        id: CallId,
    },
    /// Return `r0`.
    Exit,
    /// `dst = imm64`.
    Lddw {
        /// Destination register.
        dst: u8,
        /// Immediate.
        imm: u64,
    },
    /// `dst = *(size *)(src + off)`.
    Ldx {
        /// Access width.
        size: Size,
        /// Destination register.
        dst: u8,
        /// Address register.
        src: u8,
        /// Byte offset.
        off: i16,
    },
    /// `*(size *)(dst + off) = imm`.
    St {
        /// Access width.
        size: Size,
        /// Address register.
        dst: u8,
        /// Byte offset.
        off: i16,
        /// Stored immediate.
        imm: i32,
    },
    /// `*(size *)(dst + off) = src`.
    Stx {
        /// Access width.
        size: Size,
        /// Address register.
        dst: u8,
        /// Stored register.
        src: u8,
        /// Byte offset.
        off: i16,
    },
}

impl Instr {
    /// Number of slots the instruction occupies.
    #[must_use]
    pub const fn slots(&self) -> usize {
        match self {
            Self::Lddw { .. } => 2,
            _ => 1,
        }
    }

    /// Register written by the instruction, if any.
    #[must_use]
    pub const fn writes(&self) -> Option<u8> {
        match *self {
            Self::Alu { dst, .. } | Self::Lddw { dst, .. } | Self::Ldx { dst, .. } => Some(dst),
            Self::Call { .. } => Some(0),
            _ => None,
        }
    }
}

/// Why a slot does not decode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// The pc is past the end of the program.
    OutOfBounds,
    /// The opcode byte is not part of the supported subset.
    UnknownOpcode {
        /// The opcode byte.
        opcode: u8,
    },
    /// `lddw` without a valid second slot.
    IncompleteLddw,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds => write!(f, "pc out of bounds"),
            Self::UnknownOpcode { opcode } => write!(f, "unknown opcode 0x{opcode:02x}"),
            Self::IncompleteLddw => write!(f, "incomplete lddw"),
        }
    }
}

impl core::error::Error for DecodeError {}

/// Decodes the instruction at slot `pc`.
pub fn decode(code: &[u8], pc: usize) -> Result<Instr, DecodeError> {
    let insn = Insn::at(code, pc).ok_or(DecodeError::OutOfBounds)?;
    let unknown = DecodeError::UnknownOpcode {
        opcode: insn.opcode,
    };
    let operand = || {
        if opcode::uses_src_reg(insn.opcode) {
            Operand::Reg(insn.src)
        } else {
            Operand::Imm(insn.imm)
        }
    };
    let size = Size::of(insn.opcode);

    match opcode::class(insn.opcode) {
        opcode::CLASS_ALU | opcode::CLASS_ALU64 => {
            let op = AluOp::from_code(opcode::op(insn.opcode)).ok_or(unknown)?;
            Ok(Instr::Alu {
                wide: opcode::class(insn.opcode) == opcode::CLASS_ALU64,
                op,
                dst: insn.dst,
                src: operand(),
            })
        }
        opcode::CLASS_JMP => match insn.opcode {
            opcode::JA => Ok(Instr::Jmp {
                cond: None,
                dst: 0,
                src: Operand::Imm(0),
                off: insn.off,
            }),
            opcode::CALL => Ok(Instr::Call {
                id: CallId(insn.imm as u32),
            }),
            opcode::EXIT => Ok(Instr::Exit),
            _ => {
                let cond = JmpCond::from_code(opcode::op(insn.opcode)).ok_or(unknown)?;
                Ok(Instr::Jmp {
                    cond: Some(cond),
                    dst: insn.dst,
                    src: operand(),
                    off: insn.off,
                })
            }
        },
        opcode::CLASS_LD if insn.opcode == opcode::LDDW => {
            let hi = Insn::at(code, pc + 1).ok_or(DecodeError::IncompleteLddw)?;
            if hi.opcode != 0 || hi.dst != 0 || hi.src != 0 || hi.off != 0 {
                return Err(DecodeError::IncompleteLddw);
            }
            Ok(Instr::Lddw {
                dst: insn.dst,
                imm: u64::from(insn.imm as u32) | (u64::from(hi.imm as u32) << 32),
            })
        }
        opcode::CLASS_LDX if opcode::mode(insn.opcode) == opcode::MODE_MEM => Ok(Instr::Ldx {
            size,
            dst: insn.dst,
            src: insn.src,
            off: insn.off,
        }),
        opcode::CLASS_ST if opcode::mode(insn.opcode) == opcode::MODE_MEM => Ok(Instr::St {
            size,
            dst: insn.dst,
            off: insn.off,
            imm: insn.imm,
        }),
        opcode::CLASS_STX if opcode::mode(insn.opcode) == opcode::MODE_MEM => Ok(Instr::Stx {
            size,
            dst: insn.dst,
            src: insn.src,
            off: insn.off,
        }),
        _ => Err(unknown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_layout_is_little_endian() {
        let insn = Insn {
            opcode: 0x79,
            dst: 2,
            src: 10,
            off: -8,
            imm: 0x0102_0304,
        };
        let bytes = insn.encode();
        assert_eq!(bytes, [0x79, 0xa2, 0xf8, 0xff, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(Insn::decode(bytes), insn);
    }

    #[test]
    fn decodes_lddw_pair() {
        let mut code = [0_u8; 16];
        code[0] = opcode::LDDW;
        code[1] = 3;
        code[4..8].copy_from_slice(&0xdead_beef_u32.to_le_bytes());
        code[12..16].copy_from_slice(&0x1234_u32.to_le_bytes());
        assert_eq!(
            decode(&code, 0),
            Ok(Instr::Lddw {
                dst: 3,
                imm: 0x1234_dead_beef,
            })
        );
        assert_eq!(decode(&code[..8], 0), Err(DecodeError::IncompleteLddw));
    }

    #[test]
    fn rejects_unknown_opcodes() {
        let code = [0xff_u8, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            decode(&code, 0),
            Err(DecodeError::UnknownOpcode { opcode: 0xff })
        );
        // ALU op 0xd0 is not defined.
        let code = [0xd7_u8, 0, 0, 0, 0, 0, 0, 0];
        assert!(decode(&code, 0).is_err());
        assert_eq!(decode(&code, 1), Err(DecodeError::OutOfBounds));
    }

    #[test]
    fn decodes_operands() {
        let add = Insn {
            opcode: 0x0f,
            dst: 1,
            src: 2,
            ..Insn::default()
        };
        assert_eq!(
            decode(&add.encode(), 0),
            Ok(Instr::Alu {
                wide: true,
                op: AluOp::Add,
                dst: 1,
                src: Operand::Reg(2),
            })
        );
        let jne = Insn {
            opcode: 0x55,
            dst: 1,
            off: -3,
            imm: 7,
            ..Insn::default()
        };
        assert_eq!(
            decode(&jne.encode(), 0),
            Ok(Instr::Jmp {
                cond: Some(JmpCond::Ne),
                dst: 1,
                src: Operand::Imm(7),
                off: -3,
            })
        );
    }
}
