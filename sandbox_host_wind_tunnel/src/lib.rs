// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Workload builders for the `sandbox_host` benchmarks.

use sandbox_host::asm::{Asm, AsmError, JmpCond};
use sandbox_host::call::CallId;

/// `r0 += 1`, `len` times.
pub fn add_chain(len: u32) -> Result<Vec<u8>, AsmError> {
    let mut a = Asm::new();
    a.mov64_imm(0, 0);
    for _ in 0..len {
        a.add64_imm(0, 1);
    }
    a.exit();
    a.finish()
}

/// Counts `r0` up to `iterations`, taking one branch per iteration but the last.
pub fn counted_loop(iterations: i32) -> Result<Vec<u8>, AsmError> {
    let mut a = Asm::new();
    a.mov64_imm(0, 0);
    let top = a.label();
    a.bind(top);
    a.add64_imm(0, 1);
    a.jmp_imm(JmpCond::Ne, 0, iterations, top);
    a.exit();
    a.finish()
}

/// Calls `id` with no arguments `iterations` times inside a loop.
pub fn call_loop(id: CallId, iterations: i32) -> Result<Vec<u8>, AsmError> {
    let mut a = Asm::new();
    a.mov64_imm(6, 0);
    let top = a.label();
    a.bind(top);
    a.call(id);
    a.add64_imm(6, 1);
    a.jmp_imm(JmpCond::Ne, 6, iterations, top);
    a.exit();
    a.finish()
}

/// `memcpy(r1 + 0, r1 + 8, 8)` on the argument block, then exit.
pub fn args_memcpy() -> Result<Vec<u8>, AsmError> {
    let mut a = Asm::new();
    a.mov64_reg(2, 1);
    a.add64_imm(2, 8);
    a.mov64_imm(3, 8);
    a.call(CallId(0x02));
    a.exit();
    a.finish()
}
