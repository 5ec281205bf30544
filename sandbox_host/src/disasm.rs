// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Disassembler.
//!
//! Produces one line per instruction, prefixed with its slot index. Slots that fail to decode
//! are printed as `.invalid` and skipped, so the listing is best-effort for any byte string.

use core::fmt;

use crate::bytecode::{self, INSN_SIZE, Insn, Instr};

/// A lazily formatted listing of a byte string.
#[derive(Copy, Clone, Debug)]
pub struct Disassembly<'a> {
    code: &'a [u8],
}

/// Disassembles `code`.
#[must_use]
pub fn disassemble(code: &[u8]) -> Disassembly<'_> {
    Disassembly { code }
}

struct Off(i16);

impl fmt::Display for Off {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < 0 {
            write!(f, "-{}", self.0.unsigned_abs())
        } else {
            write!(f, "+{}", self.0)
        }
    }
}

fn signed_off(off: i16) -> Off {
    Off(off)
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Alu { wide, op, dst, src } => {
                let bits = if wide { 64 } else { 32 };
                if op == crate::opcode::AluOp::Neg {
                    write!(f, "neg{bits} r{dst}")
                } else {
                    write!(f, "{}{bits} r{dst}, {src}", op.mnemonic())
                }
            }
            Self::Jmp {
                cond: None, off, ..
            } => write!(f, "ja {}", signed_off(off)),
            Self::Jmp {
                cond: Some(cond),
                dst,
                src,
                off,
            } => write!(f, "{} r{dst}, {src}, {}", cond.mnemonic(), signed_off(off)),
            Self::Call { id } => write!(f, "call {id}"),
            Self::Exit => write!(f, "exit"),
            Self::Lddw { dst, imm } => write!(f, "lddw r{dst}, 0x{imm:x}"),
            Self::Ldx {
                size,
                dst,
                src,
                off,
            } => write!(f, "ldx{} r{dst}, [r{src}{}]", size.suffix(), signed_off(off)),
            Self::St {
                size,
                dst,
                off,
                imm,
            } => write!(f, "st{} [r{dst}{}], {imm}", size.suffix(), signed_off(off)),
            Self::Stx {
                size,
                dst,
                src,
                off,
            } => write!(f, "stx{} [r{dst}{}], r{src}", size.suffix(), signed_off(off)),
        }
    }
}

impl fmt::Display for Disassembly<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.code.len() / INSN_SIZE;
        let mut pc = 0;
        while pc < slots {
            match bytecode::decode(self.code, pc) {
                Ok(instr) => {
                    writeln!(f, "{pc:4}: {instr}")?;
                    pc += instr.slots();
                }
                Err(_) => {
                    let opcode = Insn::at(self.code, pc).map_or(0, |i| i.opcode);
                    writeln!(f, "{pc:4}: .invalid 0x{opcode:02x}")?;
                    pc += 1;
                }
            }
        }
        let tail = self.code.len() % INSN_SIZE;
        if tail != 0 {
            writeln!(f, "{slots:4}: .trailing {tail} byte(s)")?;
        }
        Ok(())
    }
}
