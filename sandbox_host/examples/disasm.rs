// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Disassembler example.
//!
//! Run with:
//! `cargo run -p sandbox_host --example disasm`

use sandbox_host::asm::{Asm, JmpCond, Size};
use sandbox_host::call::CallId;
use sandbox_host::disasm::disassemble;

fn main() {
    // Sum the payload bytes and print the total.
    let mut a = Asm::new();
    let top = a.label();
    let done = a.label();
    a.ldx(Size::W, 2, 1, 0);
    a.ldx(Size::Dw, 3, 1, 8);
    a.mov64_imm(6, 0);
    a.bind(top);
    a.jmp_imm(JmpCond::Eq, 2, 0, done);
    a.ldx(Size::B, 4, 3, 0);
    a.add64_reg(6, 4);
    a.add64_imm(3, 1);
    a.add64_imm(2, -1);
    a.ja(top);
    a.bind(done);
    a.mov64_reg(1, 6);
    a.call(CallId(0x03));
    a.mov64_reg(0, 6);
    a.exit();

    let code = a.finish().expect("labels are bound");
    print!("{}", disassemble(&code));
}
