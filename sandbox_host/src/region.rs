// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Memory capability regions.
//!
//! A region is a window onto caller-owned memory, borrowed for the lifetime of an execution
//! context. Guest code never sees host pointers: it sees [`GuestAddr`] values that name a region
//! slot and a byte offset, and every access through one is bounds- and permission-checked.
//!
//! Writable regions are backed by `&[Cell<u8>]`, so the same buffer can be granted under two
//! slots (aliasing) without any `unsafe`:
//!
//! ```
//! use core::cell::Cell;
//! use sandbox_host::region::{Perms, RegionTable};
//!
//! let mut buf = [0_u8; 4];
//! let cells = Cell::from_mut(&mut buf[..]).as_slice_of_cells();
//! let mut table = RegionTable::new();
//! let a = table.grant(cells, Perms::READ_WRITE).unwrap();
//! let b = table.grant(cells, Perms::READ).unwrap();
//! table.store(a.base().0 + 1, 1, 0x7f).unwrap();
//! assert_eq!(table.load(b.base().0 + 1, 1).unwrap(), 0x7f);
//! ```

use alloc::vec::Vec;
use core::cell::Cell;
use core::fmt;

use crate::fault::Fault;

/// Access permissions carried by a region.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Perms(u8);

impl Perms {
    /// No access.
    pub const NONE: Self = Self(0);
    /// Loads and host-call reads.
    pub const READ: Self = Self(1 << 0);
    /// Stores and host-call writes.
    pub const WRITE: Self = Self(1 << 1);
    /// Both directions.
    pub const READ_WRITE: Self = Self(Self::READ.0 | Self::WRITE.0);

    /// Returns `true` if every bit in `other` is present.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Returns `true` if no permission bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Raw bit representation.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl core::ops::BitOr for Perms {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for Perms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = if self.contains(Self::READ) { 'r' } else { '-' };
        let w = if self.contains(Self::WRITE) { 'w' } else { '-' };
        write!(f, "{r}{w}")
    }
}

/// A guest-visible address: region slot (biased by one) in the upper half, offset in the lower.
///
/// `GuestAddr(0)` is the null address and never resolves.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GuestAddr(pub u64);

impl GuestAddr {
    /// The null address.
    pub const NULL: Self = Self(0);

    /// Builds the address of `offset` within region `slot`.
    #[must_use]
    pub const fn new(slot: u32, offset: u32) -> Self {
        Self(((slot as u64).wrapping_add(1) << 32) | offset as u64)
    }

    /// Returns the region slot, or `None` for addresses in the null page.
    #[must_use]
    pub const fn slot(self) -> Option<u32> {
        match self.0 >> 32 {
            0 => None,
            hi => Some((hi - 1) as u32),
        }
    }

    /// Byte offset within the region.
    #[must_use]
    pub const fn offset(self) -> u32 {
        self.0 as u32
    }

    /// Returns `true` for [`GuestAddr::NULL`].
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for GuestAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot() {
            Some(slot) => write!(f, "r{slot}+0x{:x}", self.offset()),
            None => write!(f, "null+0x{:x}", self.offset()),
        }
    }
}

/// Caller memory backing a region.
#[derive(Copy, Clone, Debug)]
pub enum RegionMemory<'a> {
    /// Read-only borrowed bytes.
    Shared(&'a [u8]),
    /// Interior-mutable bytes, writable and safely aliasable.
    Cells(&'a [Cell<u8>]),
}

impl RegionMemory<'_> {
    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Shared(b) => b.len(),
            Self::Cells(c) => c.len(),
        }
    }

    /// Returns `true` for zero-length memory.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_into(&self, start: usize, out: &mut [u8]) {
        let end = start + out.len();
        match self {
            Self::Shared(b) => out.copy_from_slice(&b[start..end]),
            Self::Cells(c) => {
                for (dst, src) in out.iter_mut().zip(&c[start..end]) {
                    *dst = src.get();
                }
            }
        }
    }
}

impl<'a> From<&'a [u8]> for RegionMemory<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::Shared(bytes)
    }
}

impl<'a> From<&'a [Cell<u8>]> for RegionMemory<'a> {
    fn from(cells: &'a [Cell<u8>]) -> Self {
        Self::Cells(cells)
    }
}

impl<'a> From<&'a mut [u8]> for RegionMemory<'a> {
    fn from(bytes: &'a mut [u8]) -> Self {
        Self::Cells(Cell::from_mut(bytes).as_slice_of_cells())
    }
}

/// One granted capability window.
#[derive(Copy, Clone, Debug)]
pub struct Region<'a> {
    memory: RegionMemory<'a>,
    perms: Perms,
}

impl<'a> Region<'a> {
    /// Backing memory.
    #[must_use]
    pub fn memory(&self) -> RegionMemory<'a> {
        self.memory
    }

    /// Permissions granted on this region.
    #[must_use]
    pub fn perms(&self) -> Perms {
        self.perms
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    /// Returns `true` for a zero-length region.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }
}

/// Handle returned by a grant; identifies the region slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RegionHandle(u32);

impl RegionHandle {
    /// Slot index within the region table.
    #[must_use]
    pub const fn slot(self) -> u32 {
        self.0
    }

    /// Guest address of the first byte of the region.
    #[must_use]
    pub const fn base(self) -> GuestAddr {
        GuestAddr::new(self.0, 0)
    }

    /// Guest address `offset` bytes into the region.
    #[must_use]
    pub const fn at(self, offset: u32) -> GuestAddr {
        GuestAddr::new(self.0, offset)
    }
}

/// Errors produced when granting a region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrantError {
    /// A read-only borrow was granted with [`Perms::WRITE`].
    ImmutableWrite,
    /// The buffer does not fit the 32-bit offset space.
    TooLarge {
        /// Length of the rejected buffer.
        len: usize,
    },
    /// The grant carries no permission bit.
    NoPermissions,
    /// Region slots are exhausted.
    TooManyRegions,
}

impl fmt::Display for GrantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ImmutableWrite => write!(f, "read-only memory cannot be granted writable"),
            Self::TooLarge { len } => write!(f, "region of {len} bytes exceeds offset space"),
            Self::NoPermissions => write!(f, "region grant without permissions"),
            Self::TooManyRegions => write!(f, "too many regions"),
        }
    }
}

impl core::error::Error for GrantError {}

/// Ordered list of granted regions for one execution context.
#[derive(Clone, Debug, Default)]
pub struct RegionTable<'a> {
    regions: Vec<Region<'a>>,
}

impl<'a> RegionTable<'a> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a region and returns its handle. Grants are additive; aliasing is allowed.
    pub fn grant(
        &mut self,
        memory: impl Into<RegionMemory<'a>>,
        perms: Perms,
    ) -> Result<RegionHandle, GrantError> {
        let memory = memory.into();
        if perms.is_empty() {
            return Err(GrantError::NoPermissions);
        }
        if perms.contains(Perms::WRITE) && matches!(memory, RegionMemory::Shared(_)) {
            return Err(GrantError::ImmutableWrite);
        }
        if u32::try_from(memory.len()).is_err() {
            return Err(GrantError::TooLarge { len: memory.len() });
        }
        let slot = u32::try_from(self.regions.len())
            .ok()
            .filter(|&s| s < u32::MAX)
            .ok_or(GrantError::TooManyRegions)?;
        self.regions.push(Region { memory, perms });
        tracing::debug!(slot, len = memory.len(), perms = %perms, "granted region");
        Ok(RegionHandle(slot))
    }

    /// Returns the region behind `handle`.
    #[must_use]
    pub fn get(&self, handle: RegionHandle) -> Option<&Region<'a>> {
        self.regions.get(handle.0 as usize)
    }

    /// Number of granted regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Returns `true` if nothing has been granted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Drops every grant.
    pub fn clear(&mut self) {
        self.regions.clear();
    }

    /// Iterates granted regions in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Region<'a>> {
        self.regions.iter()
    }

    fn lookup(&self, addr: u64) -> Option<(&Region<'a>, usize)> {
        let addr = GuestAddr(addr);
        let region = self.regions.get(addr.slot()? as usize)?;
        Some((region, addr.offset() as usize))
    }

    /// Checks that `len` bytes at `addr` lie inside one region carrying `access`.
    ///
    /// Returns the region and the start offset on success.
    pub fn check(&self, addr: u64, len: u64, access: Perms) -> Result<(&Region<'a>, usize), Fault> {
        let violation = Fault::MemoryViolation { addr, len, access };
        let (region, start) = self.lookup(addr).ok_or_else(|| violation.clone())?;
        let end = (start as u64).checked_add(len).ok_or_else(|| violation.clone())?;
        if end > region.len() as u64 || !region.perms.contains(access) {
            return Err(violation);
        }
        Ok((region, start))
    }

    /// Checks that `addr` points inside a region carrying `access`.
    ///
    /// The one-past-the-end position is accepted only for an empty region.
    pub fn check_pointer(&self, addr: u64, access: Perms) -> Result<(), Fault> {
        let violation = Fault::MemoryViolation {
            addr,
            len: 0,
            access,
        };
        let (region, start) = self.lookup(addr).ok_or_else(|| violation.clone())?;
        let inside = start < region.len() || (start == 0 && region.is_empty());
        if !inside || !region.perms.contains(access) {
            return Err(violation);
        }
        Ok(())
    }

    /// Copies `out.len()` bytes from guest memory at `addr`.
    pub fn read(&self, addr: u64, out: &mut [u8]) -> Result<(), Fault> {
        let (region, start) = self.check(addr, out.len() as u64, Perms::READ)?;
        region.memory.read_into(start, out);
        Ok(())
    }

    /// Copies `data` into guest memory at `addr`.
    pub fn write(&self, addr: u64, data: &[u8]) -> Result<(), Fault> {
        let (region, start) = self.check(addr, data.len() as u64, Perms::WRITE)?;
        let RegionMemory::Cells(cells) = region.memory else {
            // Writable grants over shared memory are rejected at grant time.
            return Err(Fault::MemoryViolation {
                addr,
                len: data.len() as u64,
                access: Perms::WRITE,
            });
        };
        for (dst, &src) in cells[start..start + data.len()].iter().zip(data) {
            dst.set(src);
        }
        Ok(())
    }

    /// Loads a little-endian value of `width` bytes (1, 2, 4 or 8), zero-extended.
    pub fn load(&self, addr: u64, width: usize) -> Result<u64, Fault> {
        let mut buf = [0_u8; 8];
        self.read(addr, &mut buf[..width.min(8)])?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Stores the low `width` bytes of `value` little-endian.
    pub fn store(&self, addr: u64, width: usize, value: u64) -> Result<(), Fault> {
        self.write(addr, &value.to_le_bytes()[..width.min(8)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_addr_packs_slot_and_offset() {
        let a = GuestAddr::new(0, 0);
        assert_eq!(a.0, 1 << 32);
        assert_eq!(a.slot(), Some(0));
        assert_eq!(GuestAddr::new(3, 17).offset(), 17);
        assert_eq!(GuestAddr::NULL.slot(), None);
        assert!(GuestAddr::NULL.is_null());
        assert_eq!(GuestAddr(0x10).slot(), None);
    }

    #[test]
    fn aliased_grants_observe_same_bytes() {
        let mut buf = [0_u8; 8];
        let cells = Cell::from_mut(&mut buf[..]).as_slice_of_cells();
        let mut table = RegionTable::new();
        let packet = table.grant(cells, Perms::READ_WRITE).unwrap();
        let args = table.grant(cells, Perms::READ_WRITE).unwrap();
        assert_ne!(packet, args);

        table.write(packet.at(2).0, &[9, 8, 7]).unwrap();
        let mut out = [0_u8; 3];
        table.read(args.at(2).0, &mut out).unwrap();
        assert_eq!(out, [9, 8, 7]);

        table.store(args.base().0, 4, 0xdead_beef).unwrap();
        assert_eq!(table.load(packet.base().0, 4).unwrap(), 0xdead_beef);
    }

    #[test]
    fn shared_memory_cannot_be_writable() {
        let bytes = [1_u8, 2, 3];
        let mut table = RegionTable::new();
        assert_eq!(
            table.grant(&bytes[..], Perms::READ_WRITE),
            Err(GrantError::ImmutableWrite)
        );
        assert_eq!(
            table.grant(&bytes[..], Perms::NONE),
            Err(GrantError::NoPermissions)
        );
        let h = table.grant(&bytes[..], Perms::READ).unwrap();
        assert_eq!(table.load(h.at(1).0, 2).unwrap(), 0x0302);
    }

    #[test]
    fn accesses_are_bounded_and_permission_checked() {
        let mut buf = [0_u8; 4];
        let mut table = RegionTable::new();
        let h = table.grant(&mut buf[..], Perms::READ).unwrap();

        assert!(table.load(h.at(0).0, 4).is_ok());
        assert_eq!(
            table.load(h.at(1).0, 4),
            Err(Fault::MemoryViolation {
                addr: h.at(1).0,
                len: 4,
                access: Perms::READ,
            })
        );
        assert!(table.store(h.at(0).0, 1, 1).is_err());
        assert!(table.load(GuestAddr::new(5, 0).0, 1).is_err());
        assert!(table.load(0, 1).is_err());
    }

    #[test]
    fn pointer_check_requires_address_inside_region() {
        let mut buf = [0_u8; 4];
        let empty: [u8; 0] = [];
        let mut table = RegionTable::new();
        let h = table.grant(&mut buf[..], Perms::WRITE).unwrap();
        let e = table.grant(&empty[..], Perms::READ).unwrap();

        assert!(table.check_pointer(h.at(3).0, Perms::WRITE).is_ok());
        assert!(table.check_pointer(h.at(4).0, Perms::WRITE).is_err());
        assert!(table.check_pointer(h.at(0).0, Perms::READ).is_err());
        assert!(table.check_pointer(e.base().0, Perms::READ).is_ok());
    }
}
