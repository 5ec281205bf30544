// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Register calling convention for host calls.
//!
//! The VM and a host call share one [`RegisterFile`]. Slot 0 is reserved for the result;
//! arguments occupy `r1..=rk` where `k` is the declared arity. [`invoke`] validates every
//! argument against the descriptor before the native function runs, and the function then
//! reads arguments and guest memory only through its [`CallFrame`].

use alloc::vec::Vec;
use core::fmt;

use crate::call::{ArgKind, HostCall, MAX_ARGS};
use crate::fault::{Fault, HostError};
use crate::region::{GuestAddr, Perms, RegionTable};
use crate::services::HostServices;

/// Number of VM registers (`r0..=r10`).
pub const REGISTER_COUNT: usize = 11;

/// Index of the read-only frame pointer.
pub const FRAME_POINTER: usize = 10;

/// The VM register file.
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct RegisterFile([u64; REGISTER_COUNT]);

impl RegisterFile {
    /// All registers zero.
    #[must_use]
    pub const fn new() -> Self {
        Self([0; REGISTER_COUNT])
    }

    /// Reads register `index`; out-of-range indices read as zero.
    #[must_use]
    pub fn get(&self, index: usize) -> u64 {
        self.0.get(index).copied().unwrap_or(0)
    }

    /// Writes register `index`; out-of-range indices are ignored.
    pub fn set(&mut self, index: usize, value: u64) {
        if let Some(slot) = self.0.get_mut(index) {
            *slot = value;
        }
    }

    /// All registers in order.
    #[must_use]
    pub fn as_slice(&self) -> &[u64; REGISTER_COUNT] {
        &self.0
    }
}

impl fmt::Debug for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut m = f.debug_map();
        for (i, v) in self.0.iter().enumerate() {
            m.entry(&i, &format_args!("0x{v:x}"));
        }
        m.finish()
    }
}

/// A host call's view of its arguments, guest memory, and host services.
pub struct CallFrame<'f, 'm, 's> {
    call: &'f HostCall,
    args: [u64; MAX_ARGS],
    memory: &'f RegionTable<'m>,
    services: &'f mut HostServices<'s>,
}

impl<'s> CallFrame<'_, '_, 's> {
    /// The descriptor being invoked.
    #[must_use]
    pub fn call(&self) -> &HostCall {
        self.call
    }

    fn kind(&self, index: usize) -> Result<(ArgKind, u64), HostError> {
        let mismatch = HostError::ArgKindMismatch { index };
        let kind = self.call.args.get(index).copied().ok_or(mismatch.clone())?;
        let raw = self.args.get(index).copied().ok_or(mismatch)?;
        Ok((kind, raw))
    }

    /// Scalar argument `index`, narrowed and re-extended per its declared kind.
    pub fn scalar(&self, index: usize) -> Result<u64, HostError> {
        match self.kind(index)? {
            (ArgKind::Scalar(_), raw) => Ok(raw),
            (ArgKind::Addr { .. }, _) => Err(HostError::ArgKindMismatch { index }),
        }
    }

    /// Scalar argument `index` as a signed value.
    pub fn signed(&self, index: usize) -> Result<i64, HostError> {
        self.scalar(index).map(|v| v as i64)
    }

    /// Address argument `index`. Non-null values were already checked against the declared access.
    pub fn addr(&self, index: usize) -> Result<GuestAddr, HostError> {
        match self.kind(index)? {
            (ArgKind::Addr { .. }, raw) => Ok(GuestAddr(raw)),
            (ArgKind::Scalar(_), _) => Err(HostError::ArgKindMismatch { index }),
        }
    }

    /// Copies `out.len()` bytes of readable guest memory.
    pub fn read(&self, addr: GuestAddr, out: &mut [u8]) -> Result<(), Fault> {
        self.memory.read(addr.0, out)
    }

    /// Reads `len` bytes of guest memory into a new buffer.
    pub fn read_vec(&self, addr: GuestAddr, len: usize) -> Result<Vec<u8>, Fault> {
        self.memory.check(addr.0, len as u64, Perms::READ)?;
        let mut out = alloc::vec![0_u8; len];
        self.memory.read(addr.0, &mut out)?;
        Ok(out)
    }

    /// Writes `data` to writable guest memory.
    pub fn write(&self, addr: GuestAddr, data: &[u8]) -> Result<(), Fault> {
        self.memory.write(addr.0, data)
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&self, addr: GuestAddr) -> Result<u32, Fault> {
        self.memory.load(addr.0, 4).map(|v| v as u32)
    }

    /// Writes a little-endian `u32`.
    pub fn write_u32(&self, addr: GuestAddr, value: u32) -> Result<(), Fault> {
        self.memory.store(addr.0, 4, u64::from(value))
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64(&self, addr: GuestAddr) -> Result<u64, Fault> {
        self.memory.load(addr.0, 8)
    }

    /// Reads a NUL-terminated byte string, without the terminator.
    ///
    /// Faults if the string runs off the end of its region before a NUL is found.
    pub fn read_c_str(&self, addr: GuestAddr) -> Result<Vec<u8>, Fault> {
        let mut out = Vec::new();
        let mut at = addr.0;
        loop {
            let b = self.memory.load(at, 1)? as u8;
            if b == 0 {
                return Ok(out);
            }
            out.push(b);
            at = at.wrapping_add(1);
        }
    }

    /// Host collaborators for this run.
    pub fn services(&mut self) -> &mut HostServices<'s> {
        self.services
    }
}

impl fmt::Debug for CallFrame<'_, '_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallFrame")
            .field("call", &self.call.name)
            .field("args", &&self.args[..self.call.arity().min(MAX_ARGS)])
            .finish_non_exhaustive()
    }
}

/// Runs `call` against `regs`.
///
/// Arguments are taken from `r1..` in declaration order: scalars are narrowed, addresses must
/// point inside a region carrying the declared access (null only when declared nullable). A
/// failed check faults before the function runs. On success the widened result is written to
/// `r0` and returned.
pub fn invoke(
    call: &HostCall,
    regs: &mut RegisterFile,
    memory: &RegionTable<'_>,
    services: &mut HostServices<'_>,
) -> Result<u64, Fault> {
    let mut args = [0_u64; MAX_ARGS];
    for (index, kind) in call.args.iter().enumerate().take(MAX_ARGS) {
        let raw = regs.get(index + 1);
        args[index] = match *kind {
            ArgKind::Scalar(scalar) => scalar.narrow(raw),
            ArgKind::Addr { access, nullable } => {
                if !(nullable && raw == 0) {
                    memory.check_pointer(raw, access)?;
                }
                raw
            }
        };
    }
    let mut frame = CallFrame {
        call,
        args,
        memory,
        services,
    };
    let raw = (call.func)(&mut frame)?;
    let value = call.ret.widen(raw);
    regs.set(0, value);
    Ok(value)
}
