// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! One-call entry point: load an image from a store and run it against a payload.
//!
//! [`Sandbox::run`] resolves the location, copies the image into a scratch buffer, configures an
//! [`ExecutionContext`], grants the payload twice (a packet view and an argument view), and runs
//! the program with a [`PayloadArgs`] block in `r1`. An unknown location fails before anything
//! is configured.

use alloc::vec;
use core::cell::Cell;
use core::fmt;

use crate::fault::FaultClass;
use crate::harness::{
    ConfigError, DEFAULT_BRANCH_BUDGET, ExecConfig, ExecFlags, ExecutionContext, ExecutionResult,
    HarnessError, MIN_STACK_SIZE,
};
use crate::region::{GuestAddr, Perms};
use crate::registry::CallRegistry;
use crate::services::HostServices;
use crate::store::{DEFAULT_IMAGE_CAPACITY, FirmwareStore, LoadError, load_bytecode};
use crate::trace::TraceSink;

/// Limits applied to every run of a [`Sandbox`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Stack size in bytes.
    pub stack_size: usize,
    /// Taken jumps allowed per run.
    pub branch_budget: u32,
    /// Execution flags.
    pub flags: ExecFlags,
    /// Largest image that can be loaded.
    pub image_capacity: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            stack_size: MIN_STACK_SIZE,
            branch_budget: DEFAULT_BRANCH_BUDGET,
            flags: ExecFlags::NONE,
            image_capacity: DEFAULT_IMAGE_CAPACITY,
        }
    }
}

/// The argument block passed in `r1` by [`Sandbox::run`].
///
/// Layout (little-endian): `{ length: u32, _pad: u32, payload: u64 }`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PayloadArgs {
    /// Payload length in bytes.
    pub length: u32,
    /// Guest address of the payload.
    pub payload: GuestAddr,
}

impl PayloadArgs {
    /// Encoded size.
    pub const SIZE: usize = 16;

    /// Encodes the block.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0_u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.length.to_le_bytes());
        out[8..16].copy_from_slice(&self.payload.0.to_le_bytes());
        out
    }

    /// Decodes a block.
    #[must_use]
    pub fn from_bytes(b: [u8; Self::SIZE]) -> Self {
        Self {
            length: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            payload: GuestAddr(u64::from_le_bytes([
                b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15],
            ])),
        }
    }
}

/// Why a run could not start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunError {
    /// The image could not be loaded.
    Load(LoadError),
    /// The image or limits were rejected.
    Config(ConfigError),
    /// A grant or lifecycle step failed.
    Harness(HarnessError),
    /// The payload is larger than a region can be.
    PayloadTooLarge {
        /// Payload length.
        len: usize,
    },
}

impl RunError {
    /// The fault class this error reports as.
    #[must_use]
    pub fn class(&self) -> FaultClass {
        match self {
            Self::Load(LoadError::StorageNotFound { .. }) => FaultClass::StorageNotFound,
            _ => FaultClass::Abort,
        }
    }

    /// Status code for callers.
    #[must_use]
    pub fn code(&self) -> i32 {
        self.class().code()
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load(e) => write!(f, "load failed: {e}"),
            Self::Config(e) => write!(f, "configure failed: {e}"),
            Self::Harness(e) => write!(f, "{e}"),
            Self::PayloadTooLarge { len } => write!(f, "payload of {len} bytes is too large"),
        }
    }
}

impl core::error::Error for RunError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Load(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Harness(e) => Some(e),
            Self::PayloadTooLarge { .. } => None,
        }
    }
}

impl From<LoadError> for RunError {
    fn from(e: LoadError) -> Self {
        Self::Load(e)
    }
}

impl From<ConfigError> for RunError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<HarnessError> for RunError {
    fn from(e: HarnessError) -> Self {
        Self::Harness(e)
    }
}

/// A store, a registry, and limits: everything needed to run stored images.
#[derive(Debug)]
pub struct Sandbox<S> {
    store: S,
    registry: CallRegistry,
    config: SandboxConfig,
}

impl<S: FirmwareStore> Sandbox<S> {
    /// Bundles the parts.
    pub fn new(store: S, registry: CallRegistry, config: SandboxConfig) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// The image store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The image store, for installing images.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// The call registry.
    pub fn registry(&self) -> &CallRegistry {
        &self.registry
    }

    /// Limits.
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Runs the image at `location` against `payload`.
    pub fn run(
        &self,
        services: &mut HostServices<'_>,
        payload: &mut [u8],
        location: &str,
    ) -> Result<ExecutionResult, RunError> {
        self.run_traced(services, payload, location, None)
    }

    /// [`run`](Self::run) with a trace sink attached.
    pub fn run_traced(
        &self,
        services: &mut HostServices<'_>,
        payload: &mut [u8],
        location: &str,
        trace: Option<&mut dyn TraceSink>,
    ) -> Result<ExecutionResult, RunError> {
        let mut image = vec![0_u8; self.config.image_capacity];
        let len = load_bytecode(&self.store, &mut image, location)?;
        let length = u32::try_from(payload.len()).map_err(|_| RunError::PayloadTooLarge {
            len: payload.len(),
        })?;

        let mut stack = vec![0_u8; self.config.stack_size];
        let payload = Cell::from_mut(payload).as_slice_of_cells();
        let mut args: [u8; PayloadArgs::SIZE];

        let mut ctx = ExecutionContext::new(&self.registry);
        ctx.configure(
            &image[..len],
            &mut stack,
            ExecConfig {
                flags: self.config.flags,
                branch_budget: self.config.branch_budget,
            },
        )?;
        ctx.grant_region(payload, Perms::READ_WRITE)?;
        let view = ctx.grant_region(payload, Perms::READ_WRITE)?;
        args = PayloadArgs {
            length,
            payload: view.base(),
        }
        .to_bytes();

        tracing::debug!(location, image = len, payload = length, "running image");
        Ok(ctx.execute(services, &mut args, trace)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::{Asm, Size};
    use crate::harness::Status;
    use crate::services::{BufferConsole, ManualClock, NoDevices};
    use crate::store::RamStore;

    #[test]
    fn payload_args_layout() {
        let a = PayloadArgs {
            length: 5,
            payload: GuestAddr::new(2, 0),
        };
        let b = a.to_bytes();
        assert_eq!(&b[..8], &[5, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&b[8..], &[0, 0, 0, 0, 3, 0, 0, 0]);
        assert_eq!(PayloadArgs::from_bytes(b), a);
    }

    #[test]
    fn unknown_location_is_storage_not_found() {
        let sandbox = Sandbox::new(
            RamStore::default(),
            CallRegistry::standard(),
            SandboxConfig::default(),
        );
        let mut console = BufferConsole::new();
        let mut devices = NoDevices;
        let mut clock = ManualClock::new(0).with_step(1);
        let mut services = HostServices::new(&mut console, &mut devices, &mut clock);
        let err = sandbox
            .run(&mut services, &mut [0_u8; 4], ".ram.7")
            .unwrap_err();
        assert_eq!(err.code(), -4);
        drop(services);
        // The clock was never read, so nothing was executed.
        assert_eq!(clock.peek(), 0);
    }

    #[test]
    fn program_sees_payload_through_args() {
        // r0 = payload[0] + args.length; payload[1] = 0x55.
        let mut a = Asm::new();
        a.ldx(Size::Dw, 2, 1, 8);
        a.ldx(Size::W, 3, 1, 0);
        a.ldx(Size::B, 0, 2, 0);
        a.add64_reg(0, 3);
        a.st(Size::B, 2, 1, 0x55);
        a.exit();

        let mut store = RamStore::default();
        store.install(".ram.0", &a.finish().unwrap()).unwrap();
        let sandbox = Sandbox::new(store, CallRegistry::standard(), SandboxConfig::default());

        let mut payload = [40_u8, 0, 0];
        let mut console = BufferConsole::new();
        let mut devices = NoDevices;
        let mut clock = ManualClock::new(0);
        let mut services = HostServices::new(&mut console, &mut devices, &mut clock);
        let r = sandbox.run(&mut services, &mut payload, ".ram.0").unwrap();
        assert_eq!(r.status, Status::Completed);
        assert_eq!(r.value, 43);
        drop(services);
        assert_eq!(payload, [40, 0x55, 0]);
    }
}
