// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing hooks for the interpreter.
//!
//! Tracing is optional and `no_std` friendly. The interpreter only emits the events requested by
//! the sink's [`TraceMask`]. These hooks are separate from `tracing` log records: they are meant
//! for embedders that want to observe every instruction or host call of a single run (profilers,
//! step debuggers, test harnesses).
//!
//! To enable tracing, pass a [`TraceSink`] to
//! [`ExecutionContext::execute`](crate::harness::ExecutionContext::execute).

use crate::call::CallId;
use crate::fault::FaultInfo;

/// A set of trace events requested by a [`TraceSink`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TraceMask(u32);

impl core::ops::BitOr for TraceMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for TraceMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl TraceMask {
    /// No tracing.
    pub const NONE: Self = Self(0);
    /// Trace run boundaries.
    ///
    /// Enables:
    /// - [`TraceSink::run_start`]
    /// - [`TraceSink::run_end`]
    pub const RUN: Self = Self(1 << 0);
    /// Trace each executed instruction.
    ///
    /// Enables:
    /// - [`TraceSink::instr`]
    pub const INSTR: Self = Self(1 << 1);
    /// Trace host calls.
    ///
    /// Enables:
    /// - [`TraceSink::host_call_enter`]
    /// - [`TraceSink::host_call_exit`]
    pub const HOST: Self = Self(1 << 2);
    /// Every event.
    pub const ALL: Self = Self(0b111);

    /// Returns `true` if this mask includes all bits in `other`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

/// Run outcome for tracing.
#[derive(Clone, Debug)]
pub enum TraceOutcome<'a> {
    /// The program exited with this `r0`.
    Ok(u64),
    /// The program faulted.
    Fault(&'a FaultInfo),
}

/// A trace sink that can receive interpreter events.
pub trait TraceSink {
    /// Returns the set of events the sink wants.
    fn mask(&self) -> TraceMask {
        TraceMask::NONE
    }

    /// Called before the first instruction.
    ///
    /// - `slots`: program length in instruction slots
    /// - `budget`: branch budget for the run
    fn run_start(&mut self, _slots: usize, _budget: u32) {}

    /// Called for each executed instruction, before it executes.
    ///
    /// - `pc`: slot index
    /// - `opcode`: opcode byte
    fn instr(&mut self, _pc: usize, _opcode: u8) {}

    /// Called before a host call's arguments are checked. `name` is `None` when the id does not
    /// resolve.
    fn host_call_enter(&mut self, _pc: usize, _id: CallId, _name: Option<&'static str>) {}

    /// Called after a resolved host call returns.
    ///
    /// - `result`: the widened return value, or `None` when the call faulted
    fn host_call_exit(&mut self, _pc: usize, _id: CallId, _result: Option<u64>) {}

    /// Called once the run has ended.
    fn run_end(&mut self, _outcome: TraceOutcome<'_>) {}
}
