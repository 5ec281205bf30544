// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `sandbox_host`: the host-call bridge and execution harness for sandboxed eBPF-style bytecode.
//!
//! Untrusted programs run in a small register VM and reach native functionality only through
//! numbered host calls. This crate provides:
//! - a [`CallRegistry`](registry::CallRegistry) mapping call ids to typed
//!   [`HostCall`](call::HostCall) descriptors, grouped so whole groups can be enabled or compiled
//!   out;
//! - the register calling convention ([`abi`]) that validates every argument, including address
//!   capabilities, before a native function runs;
//! - capability regions ([`region`]) addressed by checked [`GuestAddr`](region::GuestAddr)
//!   handles instead of raw pointers;
//! - an [`ExecutionContext`](harness::ExecutionContext) that configures, grants, runs, and times
//!   a single execution, and the [`Sandbox`](sandbox::Sandbox) entry point that does all of it
//!   for an image in a [`FirmwareStore`](store::FirmwareStore).
//!
//! ## Example
//!
//! ```
//! use sandbox_host::asm::{Asm, Size};
//! use sandbox_host::harness::Status;
//! use sandbox_host::registry::CallRegistry;
//! use sandbox_host::sandbox::{Sandbox, SandboxConfig};
//! use sandbox_host::services::{BufferConsole, HostServices, ManualClock, NoDevices};
//! use sandbox_host::store::RamStore;
//!
//! // Return the payload length from the argument block in r1.
//! let mut a = Asm::new();
//! a.ldx(Size::W, 0, 1, 0);
//! a.exit();
//!
//! let mut store = RamStore::default();
//! store.install(".ram.0", &a.finish()?)?;
//! let sandbox = Sandbox::new(store, CallRegistry::standard(), SandboxConfig::default());
//!
//! let mut console = BufferConsole::new();
//! let mut devices = NoDevices;
//! let mut clock = ManualClock::new(0);
//! let mut services = HostServices::new(&mut console, &mut devices, &mut clock);
//! let mut payload = *b"hello";
//! let result = sandbox.run(&mut services, &mut payload, ".ram.0")?;
//! assert_eq!(result.status, Status::Completed);
//! assert_eq!(result.value, 5);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![no_std]

extern crate alloc;

pub mod abi;
pub mod asm;
pub mod bytecode;
pub mod call;
pub mod calls;
pub mod disasm;
pub mod fault;
pub mod harness;
pub mod interp;
pub mod opcode;
pub mod region;
pub mod registry;
pub mod sandbox;
pub mod services;
pub mod store;
pub mod trace;
pub mod verifier;
