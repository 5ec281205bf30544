// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Execution harness.
//!
//! An [`ExecutionContext`] drives one run through a fixed lifecycle:
//!
//! ```text
//! Unconfigured ──configure──▶ Configured ──grant_region──▶ RegionsGranted
//!                                  │                            │
//!                                  └──────────execute───────────┴──▶ Completed | Faulted
//! ```
//!
//! `configure` may be called again from any state and starts over with an empty region list.
//! Region slot 0 is always the stack; caller grants follow in order, and the argument block
//! passed to `execute` is appended last.
//!
//! ```
//! use sandbox_host::asm::Asm;
//! use sandbox_host::harness::{ExecConfig, ExecutionContext, Status};
//! use sandbox_host::registry::CallRegistry;
//! use sandbox_host::services::{HostServices, ManualClock, NoDevices, NullConsole};
//!
//! let mut a = Asm::new();
//! a.mov64_imm(0, 7);
//! a.exit();
//! let code = a.finish().unwrap();
//!
//! let registry = CallRegistry::standard();
//! let mut stack = [0_u8; 512];
//! let mut args = [0_u8; 8];
//! let mut ctx = ExecutionContext::new(&registry);
//! ctx.configure(&code, &mut stack, ExecConfig::default()).unwrap();
//!
//! let (mut console, mut devices, mut clock) = (NullConsole, NoDevices, ManualClock::new(0));
//! let mut services = HostServices::new(&mut console, &mut devices, &mut clock);
//! let result = ctx.execute(&mut services, &mut args, None).unwrap();
//! assert_eq!(result.status, Status::Completed);
//! assert_eq!(result.value, 7);
//! ```

use core::fmt;

use crate::abi::FRAME_POINTER;
use crate::disasm::disassemble;
use crate::fault::{FaultClass, FaultInfo};
use crate::interp::Machine;
use crate::region::{GrantError, GuestAddr, Perms, RegionHandle, RegionMemory, RegionTable};
use crate::registry::CallRegistry;
use crate::services::HostServices;
use crate::trace::TraceSink;
use crate::verifier::{VerifiedBytecode, VerifyConfig, VerifyError, verify};

/// Smallest stack accepted by [`ExecutionContext::configure`].
pub const MIN_STACK_SIZE: usize = 512;

/// Branch budget used by [`ExecConfig::default`].
pub const DEFAULT_BRANCH_BUDGET: u32 = 100;

/// Execution flags.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ExecFlags(u32);

impl ExecFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// The program need not end with `exit`; the verifier skips that check.
    pub const NO_RETURN: Self = Self(1 << 0);

    /// Returns `true` if this set includes all bits in `other`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Builds a set from raw bits, dropping unknown ones.
    #[must_use]
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::NO_RETURN.0)
    }
}

impl core::ops::BitOr for ExecFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Per-run configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExecConfig {
    /// Execution flags.
    pub flags: ExecFlags,
    /// Taken jumps allowed before the run faults.
    pub branch_budget: u32,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            flags: ExecFlags::NONE,
            branch_budget: DEFAULT_BRANCH_BUDGET,
        }
    }
}

/// Lifecycle state of an [`ExecutionContext`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HarnessState {
    /// Nothing loaded.
    Unconfigured,
    /// Bytecode verified and stack granted.
    Configured,
    /// At least one caller region granted.
    RegionsGranted,
    /// The VM is executing.
    Running,
    /// The last run exited normally.
    Completed,
    /// The last run faulted.
    Faulted,
}

impl fmt::Display for HarnessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unconfigured => "unconfigured",
            Self::Configured => "configured",
            Self::RegionsGranted => "regions granted",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Faulted => "faulted",
        })
    }
}

/// Why `configure` rejected its input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The bytecode buffer is empty.
    EmptyBytecode,
    /// The stack is below [`MIN_STACK_SIZE`].
    StackTooSmall {
        /// Provided length.
        len: usize,
        /// Required minimum.
        min: usize,
    },
    /// The stack could not be granted.
    Stack(GrantError),
    /// The bytecode failed verification.
    Verify(VerifyError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyBytecode => write!(f, "empty bytecode"),
            Self::StackTooSmall { len, min } => {
                write!(f, "stack of {len} bytes is below the {min} byte minimum")
            }
            Self::Stack(e) => write!(f, "stack grant failed: {e}"),
            Self::Verify(e) => write!(f, "bytecode rejected: {e}"),
        }
    }
}

impl core::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Stack(e) => Some(e),
            Self::Verify(e) => Some(e),
            _ => None,
        }
    }
}

/// Lifecycle misuse or a failed grant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HarnessError {
    /// The operation is not allowed in the current state.
    InvalidState {
        /// Rejected operation.
        operation: &'static str,
        /// State at the time.
        state: HarnessState,
    },
    /// A region grant was rejected.
    Grant(GrantError),
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidState { operation, state } => {
                write!(f, "{operation} is not allowed while {state}")
            }
            Self::Grant(e) => write!(f, "region grant failed: {e}"),
        }
    }
}

impl core::error::Error for HarnessError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Grant(e) => Some(e),
            Self::InvalidState { .. } => None,
        }
    }
}

/// How a run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    /// The program exited.
    Completed,
    /// The program faulted.
    Faulted(FaultInfo),
}

impl Status {
    /// Status code: `0` on completion, the fault class code otherwise.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::Completed => 0,
            Self::Faulted(info) => info.class().code(),
        }
    }

    /// The fault class, if the run faulted.
    #[must_use]
    pub fn fault_class(&self) -> Option<FaultClass> {
        match self {
            Self::Completed => None,
            Self::Faulted(info) => Some(info.class()),
        }
    }
}

/// Outcome of one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionResult {
    /// How the run ended.
    pub status: Status,
    /// `r0` on completion, `-1` on a fault.
    pub value: i64,
    /// Microseconds spent inside the VM.
    pub elapsed_us: u64,
}

/// State of a single VM run.
#[derive(Debug)]
pub struct ExecutionContext<'a> {
    registry: &'a CallRegistry,
    state: HarnessState,
    program: Option<VerifiedBytecode<'a>>,
    regions: RegionTable<'a>,
    config: ExecConfig,
    stack_top: GuestAddr,
}

impl<'a> ExecutionContext<'a> {
    /// An unconfigured context resolving calls through `registry`.
    #[must_use]
    pub fn new(registry: &'a CallRegistry) -> Self {
        Self {
            registry,
            state: HarnessState::Unconfigured,
            program: None,
            regions: RegionTable::new(),
            config: ExecConfig::default(),
            stack_top: GuestAddr::NULL,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> HarnessState {
        self.state
    }

    /// Regions granted so far, stack first.
    #[must_use]
    pub fn regions(&self) -> &RegionTable<'a> {
        &self.regions
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> ExecConfig {
        self.config
    }

    /// Loads and verifies `bytecode`, grants `stack` as slot 0, and drops every earlier grant.
    ///
    /// On error the context is left unconfigured.
    pub fn configure(
        &mut self,
        bytecode: &'a [u8],
        stack: &'a mut [u8],
        config: ExecConfig,
    ) -> Result<(), ConfigError> {
        self.state = HarnessState::Unconfigured;
        self.program = None;
        self.regions.clear();
        self.stack_top = GuestAddr::NULL;

        if bytecode.is_empty() {
            return Err(ConfigError::EmptyBytecode);
        }
        if stack.len() < MIN_STACK_SIZE {
            return Err(ConfigError::StackTooSmall {
                len: stack.len(),
                min: MIN_STACK_SIZE,
            });
        }
        let verify_config = VerifyConfig {
            require_exit: !config.flags.contains(ExecFlags::NO_RETURN),
        };
        let program = verify(bytecode, verify_config).map_err(ConfigError::Verify)?;
        tracing::trace!(listing = %disassemble(bytecode), "loaded bytecode");

        let stack_len = stack.len();
        let handle = self
            .regions
            .grant(stack, Perms::READ_WRITE)
            .map_err(ConfigError::Stack)?;
        let top = u32::try_from(stack_len).map_err(|_| {
            ConfigError::Stack(GrantError::TooLarge { len: stack_len })
        })?;

        self.stack_top = handle.at(top);
        self.program = Some(program);
        self.config = config;
        self.state = HarnessState::Configured;
        tracing::debug!(
            bytes = bytecode.len(),
            stack = stack_len,
            budget = config.branch_budget,
            flags = config.flags.bits(),
            "configured execution context"
        );
        Ok(())
    }

    fn expect_state(&self, operation: &'static str) -> Result<(), HarnessError> {
        match self.state {
            HarnessState::Configured | HarnessState::RegionsGranted => Ok(()),
            state => Err(HarnessError::InvalidState { operation, state }),
        }
    }

    /// Grants `memory` to the next run.
    ///
    /// Only allowed after [`configure`](Self::configure) and before [`execute`](Self::execute).
    pub fn grant_region(
        &mut self,
        memory: impl Into<RegionMemory<'a>>,
        perms: Perms,
    ) -> Result<RegionHandle, HarnessError> {
        self.expect_state("grant_region")?;
        let handle = self
            .regions
            .grant(memory, perms)
            .map_err(HarnessError::Grant)?;
        self.state = HarnessState::RegionsGranted;
        Ok(handle)
    }

    /// Runs the program once.
    ///
    /// `args` is granted read-write at its full length as the last region and its address is
    /// passed in `r1`; `r10` holds the stack top. Time is read from `services.clock` immediately
    /// before and after the VM runs. A fault is reported in the result, not as an error.
    pub fn execute(
        &mut self,
        services: &mut HostServices<'_>,
        args: &'a mut [u8],
        trace: Option<&mut dyn TraceSink>,
    ) -> Result<ExecutionResult, HarnessError> {
        self.expect_state("execute")?;
        let args_len = args.len();
        let args_region = self
            .regions
            .grant(args, Perms::READ_WRITE)
            .map_err(HarnessError::Grant)?;
        let Some(program) = self.program.as_ref() else {
            return Err(HarnessError::InvalidState {
                operation: "execute",
                state: self.state,
            });
        };

        self.state = HarnessState::Running;
        services.response.reset_progress();
        let mut machine = Machine::new(program, self.registry, self.config.branch_budget);
        machine.regs_mut().set(1, args_region.base().0);
        machine.regs_mut().set(FRAME_POINTER, self.stack_top.0);

        let start = services.clock.now_us();
        let outcome = machine.run(&self.regions, services, trace);
        let elapsed_us = services.clock.now_us().saturating_sub(start);

        let (status, value) = match outcome {
            Ok(v) => (Status::Completed, v as i64),
            Err(info) => {
                tracing::debug!(pc = info.pc, fault = %info.fault, "run faulted");
                (Status::Faulted(info), -1)
            }
        };
        self.state = match status {
            Status::Completed => HarnessState::Completed,
            Status::Faulted(_) => HarnessState::Faulted,
        };
        tracing::debug!(
            status = status.code(),
            value,
            elapsed_us,
            args = args_len,
            branches = self.config.branch_budget - machine.budget(),
            "run finished"
        );
        Ok(ExecutionResult {
            status,
            value,
            elapsed_us,
        })
    }
}
