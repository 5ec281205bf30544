// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reference interpreter.
//!
//! Executes [`VerifiedBytecode`] against a [`RegionTable`]. Every load and store resolves its
//! [`GuestAddr`](crate::region::GuestAddr) through the region list, host calls go through the
//! [`CallRegistry`] and [`abi::invoke`], and each taken jump spends one unit of branch budget.
//! A jump attempted with no budget left faults with [`Fault::BudgetExhausted`].

use crate::abi::{self, RegisterFile};
use crate::bytecode::{INSN_SIZE, Instr, Operand};
use crate::call::CallId;
use crate::fault::{Fault, FaultInfo};
use crate::opcode::AluOp;
use crate::region::RegionTable;
use crate::registry::{CallRegistry, Resolution};
use crate::services::HostServices;
use crate::trace::{TraceMask, TraceOutcome, TraceSink};
use crate::verifier::VerifiedBytecode;

/// One interpreter run over verified bytecode.
#[derive(Debug)]
pub struct Machine<'p, 'a, 'r> {
    program: &'p VerifiedBytecode<'a>,
    registry: &'r CallRegistry,
    regs: RegisterFile,
    budget: u32,
    pc: usize,
}

impl<'p, 'a, 'r> Machine<'p, 'a, 'r> {
    /// A machine at slot 0 with zeroed registers.
    #[must_use]
    pub fn new(program: &'p VerifiedBytecode<'a>, registry: &'r CallRegistry, budget: u32) -> Self {
        Self {
            program,
            registry,
            regs: RegisterFile::new(),
            budget,
            pc: 0,
        }
    }

    /// Register file.
    #[must_use]
    pub fn regs(&self) -> &RegisterFile {
        &self.regs
    }

    /// Register file, for seeding arguments before [`Machine::run`].
    pub fn regs_mut(&mut self) -> &mut RegisterFile {
        &mut self.regs
    }

    /// Branch budget left.
    #[must_use]
    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Current slot index.
    #[must_use]
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Runs until `exit` or a fault. Returns `r0` on exit.
    pub fn run(
        &mut self,
        memory: &RegionTable<'_>,
        services: &mut HostServices<'_>,
        mut trace: Option<&mut dyn TraceSink>,
    ) -> Result<u64, FaultInfo> {
        let mask = trace.as_ref().map_or(TraceMask::NONE, |t| t.mask());
        if mask.contains(TraceMask::RUN)
            && let Some(t) = trace.as_deref_mut()
        {
            t.run_start(self.program.slot_count(), self.budget);
        }

        let result = self
            .run_body(memory, services, mask, &mut trace)
            .map_err(|fault| FaultInfo { pc: self.pc, fault });

        if mask.contains(TraceMask::RUN)
            && let Some(t) = trace.as_deref_mut()
        {
            let outcome = match &result {
                Ok(v) => TraceOutcome::Ok(*v),
                Err(e) => TraceOutcome::Fault(e),
            };
            t.run_end(outcome);
        }
        result
    }

    fn run_body(
        &mut self,
        memory: &RegionTable<'_>,
        services: &mut HostServices<'_>,
        mask: TraceMask,
        trace: &mut Option<&mut dyn TraceSink>,
    ) -> Result<u64, Fault> {
        let code = self.program.code();
        loop {
            let pc = self.pc;
            let instr = *self.program.instr(pc).ok_or(Fault::PcOutOfBounds)?;
            if mask.contains(TraceMask::INSTR)
                && let Some(t) = trace.as_deref_mut()
            {
                t.instr(pc, code.get(pc * INSN_SIZE).copied().unwrap_or(0));
            }
            let mut next = pc + instr.slots();

            match instr {
                Instr::Alu { wide, op, dst, src } => {
                    let a = self.regs.get(dst.into());
                    let b = self.operand(src);
                    let v = if wide { alu64(op, a, b)? } else { alu32(op, a, b)? };
                    self.regs.set(dst.into(), v);
                }
                Instr::Jmp { cond, dst, src, off } => {
                    let taken = match cond {
                        None => true,
                        Some(c) => c.holds(self.regs.get(dst.into()), self.operand(src)),
                    };
                    if taken {
                        if self.budget == 0 {
                            return Err(Fault::BudgetExhausted);
                        }
                        self.budget -= 1;
                        let target = next as i64 + i64::from(off);
                        next = usize::try_from(target).map_err(|_| Fault::PcOutOfBounds)?;
                    }
                }
                Instr::Call { id } => self.call(pc, id, memory, services, mask, trace)?,
                Instr::Exit => return Ok(self.regs.get(0)),
                Instr::Lddw { dst, imm } => self.regs.set(dst.into(), imm),
                Instr::Ldx {
                    size,
                    dst,
                    src,
                    off,
                } => {
                    let addr = self.effective(src, off);
                    let v = memory.load(addr, size.bytes())?;
                    self.regs.set(dst.into(), v);
                }
                Instr::St {
                    size,
                    dst,
                    off,
                    imm,
                } => {
                    let addr = self.effective(dst, off);
                    memory.store(addr, size.bytes(), i64::from(imm) as u64)?;
                }
                Instr::Stx {
                    size,
                    dst,
                    src,
                    off,
                } => {
                    let addr = self.effective(dst, off);
                    memory.store(addr, size.bytes(), self.regs.get(src.into()))?;
                }
            }
            self.pc = next;
        }
    }

    fn operand(&self, src: Operand) -> u64 {
        match src {
            Operand::Reg(r) => self.regs.get(r.into()),
            Operand::Imm(i) => i64::from(i) as u64,
        }
    }

    fn effective(&self, base: u8, off: i16) -> u64 {
        self.regs
            .get(base.into())
            .wrapping_add(i64::from(off) as u64)
    }

    fn call(
        &mut self,
        pc: usize,
        id: CallId,
        memory: &RegionTable<'_>,
        services: &mut HostServices<'_>,
        mask: TraceMask,
        trace: &mut Option<&mut dyn TraceSink>,
    ) -> Result<(), Fault> {
        let resolution = self.registry.resolve(id);
        let traced = mask.contains(TraceMask::HOST);
        if traced && let Some(t) = trace.as_deref_mut() {
            t.host_call_enter(pc, id, resolution.call().map(|c| c.name));
        }
        let Resolution::Resolved(call) = resolution else {
            return Err(Fault::UnsupportedCall { id });
        };
        let result = abi::invoke(call, &mut self.regs, memory, services);
        if traced && let Some(t) = trace.as_deref_mut() {
            t.host_call_exit(pc, id, result.as_ref().ok().copied());
        }
        tracing::trace!(%id, name = call.name, ok = result.is_ok(), "host call");
        result.map(|_| ())
    }
}

fn alu64(op: AluOp, a: u64, b: u64) -> Result<u64, Fault> {
    Ok(match op {
        AluOp::Add => a.wrapping_add(b),
        AluOp::Sub => a.wrapping_sub(b),
        AluOp::Mul => a.wrapping_mul(b),
        AluOp::Div => a.checked_div(b).ok_or(Fault::DivisionByZero)?,
        AluOp::Mod => a.checked_rem(b).ok_or(Fault::DivisionByZero)?,
        AluOp::Or => a | b,
        AluOp::And => a & b,
        AluOp::Xor => a ^ b,
        AluOp::Lsh => a << (b & 63),
        AluOp::Rsh => a >> (b & 63),
        AluOp::Arsh => ((a as i64) >> (b & 63)) as u64,
        AluOp::Neg => (a as i64).wrapping_neg() as u64,
        AluOp::Mov => b,
    })
}

fn alu32(op: AluOp, a: u64, b: u64) -> Result<u64, Fault> {
    let (a, b) = (a as u32, b as u32);
    let v = match op {
        AluOp::Add => a.wrapping_add(b),
        AluOp::Sub => a.wrapping_sub(b),
        AluOp::Mul => a.wrapping_mul(b),
        AluOp::Div => a.checked_div(b).ok_or(Fault::DivisionByZero)?,
        AluOp::Mod => a.checked_rem(b).ok_or(Fault::DivisionByZero)?,
        AluOp::Or => a | b,
        AluOp::And => a & b,
        AluOp::Xor => a ^ b,
        AluOp::Lsh => a << (b & 31),
        AluOp::Rsh => a >> (b & 31),
        AluOp::Arsh => ((a as i32) >> (b & 31)) as u32,
        AluOp::Neg => (a as i32).wrapping_neg() as u32,
        AluOp::Mov => b,
    };
    Ok(u64::from(v))
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;
    use crate::asm::{Asm, JmpCond, Size};
    use crate::region::Perms;
    use crate::registry::CallGroup;
    use crate::services::{BufferConsole, ManualClock, NoDevices};
    use crate::verifier::{VerifyConfig, verify};

    fn exec(code: &[u8], memory: &RegionTable<'_>, budget: u32) -> (Result<u64, FaultInfo>, u32) {
        let registry = CallRegistry::with_groups(&[CallGroup::Core]).unwrap();
        let program = verify(code, VerifyConfig::default()).unwrap();
        let mut console = BufferConsole::new();
        let mut devices = NoDevices;
        let mut clock = ManualClock::new(0);
        let mut services = HostServices::new(&mut console, &mut devices, &mut clock);
        let mut m = Machine::new(&program, &registry, budget);
        let r = m.run(memory, &mut services, None);
        (r, m.budget())
    }

    #[test]
    fn arithmetic_and_exit() {
        let mut a = Asm::new();
        a.mov64_imm(0, 6);
        a.alu64_imm(AluOp::Mul, 0, 7);
        a.alu64_imm(AluOp::Sub, 0, 2);
        a.alu64_imm(AluOp::Div, 0, 4);
        a.exit();
        let (r, _) = exec(&a.finish().unwrap(), &RegionTable::new(), 0);
        assert_eq!(r, Ok(10));
    }

    #[test]
    fn alu32_zero_extends() {
        let mut a = Asm::new();
        a.mov64_imm(0, -1);
        a.alu32_imm(AluOp::Add, 0, 1);
        a.mov64_imm(1, -8);
        a.alu32_imm(AluOp::Arsh, 1, 1);
        a.alu64_reg(AluOp::Or, 0, 1);
        a.exit();
        let (r, _) = exec(&a.finish().unwrap(), &RegionTable::new(), 0);
        assert_eq!(r, Ok(0xffff_fffc));
    }

    #[test]
    fn register_division_by_zero_faults() {
        let mut a = Asm::new();
        a.mov64_imm(0, 1);
        a.alu64_reg(AluOp::Div, 0, 1);
        a.exit();
        let (r, _) = exec(&a.finish().unwrap(), &RegionTable::new(), 0);
        assert_eq!(
            r,
            Err(FaultInfo {
                pc: 1,
                fault: Fault::DivisionByZero,
            })
        );
    }

    #[test]
    fn loop_spends_one_unit_per_taken_branch() {
        // r0 counts iterations; 3 taken back-edges, then the exit edge falls through.
        let mut a = Asm::new();
        let top = a.label();
        a.mov64_imm(0, 0);
        a.bind(top);
        a.add64_imm(0, 1);
        a.jmp_imm(JmpCond::Lt, 0, 4, top);
        a.exit();
        let (r, left) = exec(&a.finish().unwrap(), &RegionTable::new(), 10);
        assert_eq!(r, Ok(4));
        assert_eq!(left, 7);
    }

    #[test]
    fn infinite_loop_exhausts_budget() {
        let mut a = Asm::new();
        let top = a.label();
        a.bind(top);
        a.ja(top);
        let (r, left) = exec(&a.finish().unwrap(), &RegionTable::new(), 5);
        assert_eq!(r.unwrap_err().fault, Fault::BudgetExhausted);
        assert_eq!(left, 0);
    }

    #[test]
    fn loads_and_stores_go_through_regions() {
        let mut buf = [0_u8; 16];
        let mut table = RegionTable::new();
        let h = table.grant(&mut buf[..], Perms::READ_WRITE).unwrap();

        let mut a = Asm::new();
        a.lddw(1, h.base().0);
        a.st(Size::W, 1, 4, -2);
        a.mov64_imm(2, 0x11);
        a.stx(Size::B, 1, 2, 0);
        a.ldx(Size::Dw, 0, 1, 0);
        a.exit();
        let (r, _) = exec(&a.finish().unwrap(), &table, 0);
        assert_eq!(r, Ok(0xffff_fffe_0000_0011));
        drop(table);
        assert_eq!(&buf[..8], &[0x11, 0, 0, 0, 0xfe, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn out_of_region_store_faults() {
        let mut buf = [0_u8; 4];
        let mut table = RegionTable::new();
        let h = table.grant(&mut buf[..], Perms::READ_WRITE).unwrap();

        let mut a = Asm::new();
        a.lddw(1, h.base().0);
        a.stx(Size::Dw, 1, 1, 0);
        a.exit();
        let (r, _) = exec(&a.finish().unwrap(), &table, 0);
        let info = r.unwrap_err();
        assert_eq!(info.pc, 2);
        assert!(matches!(info.fault, Fault::MemoryViolation { len: 8, .. }));
        drop(table);
        assert_eq!(buf, [0; 4]);
    }

    #[test]
    fn unknown_call_is_unsupported() {
        let mut a = Asm::new();
        a.call(CallId(0x10));
        a.exit();
        let (r, _) = exec(&a.finish().unwrap(), &RegionTable::new(), 0);
        assert_eq!(
            r.unwrap_err().fault,
            Fault::UnsupportedCall { id: CallId(0x10) }
        );
    }

    #[test]
    fn host_call_result_lands_in_r0_and_trace_fires() {
        #[derive(Default)]
        struct Collect {
            opcodes: Vec<u8>,
            calls: Vec<(CallId, Option<&'static str>, Option<u64>)>,
            ended: Option<u64>,
        }

        impl TraceSink for Collect {
            fn mask(&self) -> TraceMask {
                TraceMask::ALL
            }

            fn instr(&mut self, _pc: usize, opcode: u8) {
                self.opcodes.push(opcode);
            }

            fn host_call_enter(&mut self, _pc: usize, id: CallId, name: Option<&'static str>) {
                self.calls.push((id, name, None));
            }

            fn host_call_exit(&mut self, _pc: usize, _id: CallId, result: Option<u64>) {
                if let Some(last) = self.calls.last_mut() {
                    last.2 = result;
                }
            }

            fn run_end(&mut self, outcome: TraceOutcome<'_>) {
                if let TraceOutcome::Ok(v) = outcome {
                    self.ended = Some(v);
                }
            }
        }

        let mut a = Asm::new();
        a.mov64_imm(1, 42);
        a.call(CallId(0x03));
        a.exit();
        let code = a.finish().unwrap();

        let registry = CallRegistry::with_groups(&[CallGroup::Core]).unwrap();
        let program = verify(&code, VerifyConfig::default()).unwrap();
        let mut console = BufferConsole::new();
        let mut devices = NoDevices;
        let mut clock = ManualClock::new(0);
        let mut services = HostServices::new(&mut console, &mut devices, &mut clock);
        let mut sink = Collect::default();
        let mut m = Machine::new(&program, &registry, 0);
        let table = RegionTable::new();
        let r = m.run(&table, &mut services, Some(&mut sink));

        assert_eq!(r, Ok(0));
        assert_eq!(sink.opcodes, [0xb7, 0x85, 0x95]);
        assert_eq!(
            sink.calls,
            [(CallId(0x03), Some("debug_print"), Some(0))]
        );
        assert_eq!(sink.ended, Some(0));
        drop(services);
        assert_eq!(console.contents(), "[DEBUG]: 42\n");
    }
}
