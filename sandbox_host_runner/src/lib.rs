// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Std host services and a configuration-driven runner for `sandbox_host`.
//!
//! The core crate is `no_std`; this crate supplies the pieces that need an operating system: a
//! wall clock, a stdout console, log output for trace events, and JSON configuration.

pub mod config;

use std::io::Write as _;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use sandbox_host::call::CallId;
use sandbox_host::fault::FaultInfo;
use sandbox_host::harness::ExecutionResult;
use sandbox_host::sandbox::{RunError, Sandbox};
use sandbox_host::services::{Clock, Console, HostServices, ResponseState, StaticDevices};
use sandbox_host::store::RamStore;
use sandbox_host::trace::{TraceMask, TraceOutcome, TraceSink};
use serde::Serialize;

use crate::config::RunnerConfig;

/// Monotonic clock backed by [`Instant`].
#[derive(Copy, Clone, Debug)]
pub struct StdClock {
    epoch: Instant,
}

impl StdClock {
    /// A clock whose epoch is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now_us(&mut self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_micros()).unwrap_or(u64::MAX)
    }

    fn sleep_us(&mut self, us: u64) {
        std::thread::sleep(Duration::from_micros(us));
    }
}

/// Console writing to stdout.
#[derive(Copy, Clone, Debug, Default)]
pub struct StdoutConsole;

impl Console for StdoutConsole {
    fn write_str(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        let mut out = std::io::stdout().lock();
        if out.write_all(bytes).and_then(|()| out.flush()).is_err() {
            tracing::warn!("console write failed");
        }
    }
}

/// Forwards interpreter trace events to `tracing`.
#[derive(Copy, Clone, Debug)]
pub struct LogTraceSink {
    mask: TraceMask,
}

impl LogTraceSink {
    /// A sink requesting `mask`.
    #[must_use]
    pub fn new(mask: TraceMask) -> Self {
        Self { mask }
    }
}

impl TraceSink for LogTraceSink {
    fn mask(&self) -> TraceMask {
        self.mask
    }

    fn run_start(&mut self, slots: usize, budget: u32) {
        tracing::debug!(slots, budget, "run start");
    }

    fn instr(&mut self, pc: usize, opcode: u8) {
        tracing::trace!(pc, opcode, "instr");
    }

    fn host_call_enter(&mut self, pc: usize, id: CallId, name: Option<&'static str>) {
        tracing::debug!(pc, %id, name = name.unwrap_or("<unsupported>"), "host call");
    }

    fn host_call_exit(&mut self, pc: usize, id: CallId, result: Option<u64>) {
        tracing::debug!(pc, %id, ?result, "host call returned");
    }

    fn run_end(&mut self, outcome: TraceOutcome<'_>) {
        match outcome {
            TraceOutcome::Ok(value) => tracing::debug!(value, "run end"),
            TraceOutcome::Fault(FaultInfo { pc, fault }) => {
                tracing::debug!(pc, %fault, "run end (fault)");
            }
        }
    }
}

/// The JSON line printed for a run.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
    /// Microseconds spent in the VM.
    pub execution_time: u64,
    /// `r0`, or `-1` on failure.
    pub result: i64,
    /// `0` or a negative status code.
    pub status: i32,
}

impl From<&ExecutionResult> for RunReport {
    fn from(r: &ExecutionResult) -> Self {
        Self {
            execution_time: r.elapsed_us,
            result: r.value,
            status: r.status.code(),
        }
    }
}

impl From<&RunError> for RunReport {
    fn from(e: &RunError) -> Self {
        Self {
            execution_time: 0,
            result: -1,
            status: e.code(),
        }
    }
}

/// A sandbox plus the simulated devices and request described by a [`RunnerConfig`].
#[derive(Debug)]
pub struct Runner {
    sandbox: Sandbox<RamStore>,
    devices: StaticDevices,
    response: ResponseState,
    trace: TraceMask,
}

impl Runner {
    /// Builds a runner; slot paths are resolved against `base_dir`.
    pub fn from_config(config: &RunnerConfig, base_dir: &Path) -> Result<Self> {
        let sandbox = Sandbox::new(
            config.store(base_dir)?,
            config.registry()?,
            config.sandbox_config(),
        );
        Ok(Self {
            sandbox,
            devices: config.devices(),
            response: config.response_state(),
            trace: TraceMask::RUN | TraceMask::HOST,
        })
    }

    /// Events forwarded to the log; the default is run boundaries and host calls.
    #[must_use]
    pub fn with_trace(mut self, trace: TraceMask) -> Self {
        self.trace = trace;
        self
    }

    /// The wrapped sandbox.
    pub fn sandbox(&self) -> &Sandbox<RamStore> {
        &self.sandbox
    }

    /// Device state, including writes made by earlier runs.
    pub fn devices(&self) -> &StaticDevices {
        &self.devices
    }

    /// Runs the image at `location`. Failures to start are reported in the returned line.
    pub fn run(
        &mut self,
        console: &mut dyn Console,
        clock: &mut dyn Clock,
        location: &str,
        payload: &mut [u8],
    ) -> RunReport {
        let mut services = HostServices::new(console, &mut self.devices, clock)
            .with_response(self.response.clone());
        let mut sink = LogTraceSink::new(self.trace);
        match self
            .sandbox
            .run_traced(&mut services, payload, location, Some(&mut sink))
        {
            Ok(result) => RunReport::from(&result),
            Err(e) => {
                tracing::warn!(location, error = %e, "run did not start");
                RunReport::from(&e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandbox_host::asm::Asm;
    use sandbox_host::services::{BufferConsole, ManualClock};

    #[test]
    fn report_serializes_like_the_endpoint() {
        let report = RunReport {
            execution_time: 12,
            result: -1,
            status: -3,
        };
        assert_eq!(
            serde_json::to_string(&report).unwrap(),
            r#"{"execution_time":12,"result":-1,"status":-3}"#
        );
    }

    #[test]
    fn runner_reports_missing_image() {
        let config = RunnerConfig::default();
        let mut runner = Runner::from_config(&config, Path::new(".")).unwrap();
        let mut console = BufferConsole::new();
        let mut clock = ManualClock::new(0);
        let report = runner.run(&mut console, &mut clock, ".ram.0", &mut []);
        assert_eq!(
            report,
            RunReport {
                execution_time: 0,
                result: -1,
                status: -4,
            }
        );
    }

    #[test]
    fn runner_executes_installed_image() {
        let dir = std::env::temp_dir().join(format!("sandbox_host_runner_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut a = Asm::new();
        a.mov64_imm(0, 21);
        a.exit();
        std::fs::write(dir.join("app.bin"), a.finish().unwrap()).unwrap();

        let config = RunnerConfig::from_json(
            r#"{ "slots": [{ "location": ".ram.3", "path": "app.bin" }] }"#,
        )
        .unwrap();
        let mut runner = Runner::from_config(&config, &dir).unwrap();
        let mut console = BufferConsole::new();
        let mut clock = ManualClock::new(0).with_step(4);
        let report = runner.run(&mut console, &mut clock, ".ram.3", &mut [0_u8; 2]);
        assert_eq!(
            report,
            RunReport {
                execution_time: 4,
                result: 21,
                status: 0,
            }
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn std_clock_is_monotonic() {
        let mut c = StdClock::new();
        let a = c.now_us();
        let b = c.now_us();
        assert!(b >= a);
    }
}
