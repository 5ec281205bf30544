// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared fixtures for the `sandbox_host` conformance suite.
//!
//! The tests live in `tests/`; this crate only holds the host doubles and small program builders
//! several of them need.

use sandbox_host::asm::{Asm, AsmError};
use sandbox_host::call::CallId;
use sandbox_host::fault::FaultInfo;
use sandbox_host::region::GuestAddr;
use sandbox_host::services::{
    BufferConsole, HostServices, ManualClock, Phydat, ResponseState, StaticDevice, StaticDevices,
};
use sandbox_host::trace::{TraceMask, TraceOutcome, TraceSink};

/// Deterministic collaborators for one test.
#[derive(Debug, Default)]
pub struct TestHost {
    /// Print output.
    pub console: BufferConsole,
    /// Simulated devices.
    pub devices: StaticDevices,
    /// Manual clock, stepping on every read when configured.
    pub clock: ManualClock,
    /// Request answered by the protocol calls.
    pub response: ResponseState,
}

impl TestHost {
    /// A host with no devices and a clock frozen at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every clock reading advances time by `step` microseconds.
    #[must_use]
    pub fn with_clock_step(mut self, step: u64) -> Self {
        self.clock = ManualClock::new(self.clock.peek()).with_step(step);
        self
    }

    /// Registers a device and returns `self`.
    #[must_use]
    pub fn with_device(mut self, device: StaticDevice) -> Self {
        self.devices.push(device);
        self
    }

    /// Sets the request the protocol calls answer.
    #[must_use]
    pub fn with_request(mut self, message_id: u16, token: &[u8]) -> Self {
        self.response = ResponseState::new(message_id, token);
        self
    }

    /// Borrows everything as [`HostServices`].
    pub fn services(&mut self) -> HostServices<'_> {
        HostServices::new(&mut self.console, &mut self.devices, &mut self.clock)
            .with_response(self.response.clone())
    }
}

/// A single-dimension device.
#[must_use]
pub fn sensor(name: &str, class: u8, value: i16, writable: bool) -> StaticDevice {
    StaticDevice {
        name: name.into(),
        class,
        value: Phydat {
            val: [value, 0, 0],
            unit: 0,
            scale: 0,
        },
        dims: 1,
        writable,
    }
}

/// Records every trace event kind it sees.
#[derive(Debug, Default)]
pub struct RecordingSink {
    /// Events requested.
    pub mask: TraceMask,
    /// Slot count and budget reported at run start.
    pub started: Option<(usize, u32)>,
    /// Program counters of executed instructions, in order.
    pub instrs: Vec<usize>,
    /// Host calls entered.
    pub calls: Vec<CallId>,
    /// Results of host calls that returned.
    pub returns: Vec<Option<u64>>,
    /// Final value, or the fault that ended the run.
    pub outcome: Option<Result<u64, FaultInfo>>,
}

impl RecordingSink {
    /// A sink requesting every event.
    #[must_use]
    pub fn all() -> Self {
        Self {
            mask: TraceMask::ALL,
            ..Self::default()
        }
    }
}

impl TraceSink for RecordingSink {
    fn mask(&self) -> TraceMask {
        self.mask
    }

    fn run_start(&mut self, slots: usize, budget: u32) {
        self.started = Some((slots, budget));
    }

    fn instr(&mut self, pc: usize, _opcode: u8) {
        self.instrs.push(pc);
    }

    fn host_call_enter(&mut self, _pc: usize, id: CallId, _name: Option<&'static str>) {
        self.calls.push(id);
    }

    fn host_call_exit(&mut self, _pc: usize, _id: CallId, result: Option<u64>) {
        self.returns.push(result);
    }

    fn run_end(&mut self, outcome: TraceOutcome<'_>) {
        self.outcome = Some(match outcome {
            TraceOutcome::Ok(v) => Ok(v),
            TraceOutcome::Fault(info) => Err(info.clone()),
        });
    }
}

/// `loop: ja loop`
pub fn spin() -> Result<Vec<u8>, AsmError> {
    let mut a = Asm::new();
    let top = a.label();
    a.bind(top);
    a.ja(top);
    a.exit();
    a.finish()
}

/// Calls `memcpy(dst, src, len)` and exits with its result.
pub fn memcpy_call(dst: GuestAddr, src: GuestAddr, len: i32) -> Result<Vec<u8>, AsmError> {
    let mut a = Asm::new();
    a.lddw(1, dst.0);
    a.lddw(2, src.0);
    a.mov64_imm(3, len);
    a.call(CallId(0x02));
    a.exit();
    a.finish()
}

/// Returns `imm` without touching memory or calling out.
pub fn constant(imm: i32) -> Result<Vec<u8>, AsmError> {
    let mut a = Asm::new();
    a.mov64_imm(0, imm);
    a.exit();
    a.finish()
}
