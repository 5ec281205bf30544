// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host-call descriptors.
//!
//! Every native operation the sandbox may invoke is described by a [`HostCall`]: a numeric
//! [`CallId`], the kinds of its register arguments, its return kind, and the function itself.
//! The descriptor is the contract the register ABI adapter validates against; host functions
//! never look at raw register values.

use core::fmt;

use crate::abi::CallFrame;
use crate::fault::Fault;
use crate::region::Perms;
use crate::registry::CallGroup;

/// Maximum number of register arguments a host call may declare (`r1..=r5`).
pub const MAX_ARGS: usize = 5;

/// A numeric host-call identifier, carried in the `imm` field of a `call` instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(pub u32);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// Width and signedness of a scalar argument.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScalarKind {
    /// Unsigned 8-bit.
    U8,
    /// Unsigned 16-bit.
    U16,
    /// Unsigned 32-bit.
    U32,
    /// Unsigned 64-bit.
    U64,
    /// Signed 8-bit.
    I8,
    /// Signed 16-bit.
    I16,
    /// Signed 32-bit.
    I32,
    /// Signed 64-bit.
    I64,
}

impl ScalarKind {
    /// Narrows a 64-bit register slot to this width and re-extends it.
    ///
    /// Unsigned kinds zero-extend, signed kinds sign-extend. The result is returned as raw
    /// 64-bit two's complement bits.
    #[must_use]
    pub const fn narrow(self, slot: u64) -> u64 {
        match self {
            Self::U8 => slot as u8 as u64,
            Self::U16 => slot as u16 as u64,
            Self::U32 => slot as u32 as u64,
            Self::U64 | Self::I64 => slot,
            Self::I8 => slot as u8 as i8 as i64 as u64,
            Self::I16 => slot as u16 as i16 as i64 as u64,
            Self::I32 => slot as u32 as i32 as i64 as u64,
        }
    }

    /// Returns `true` for signed kinds.
    #[must_use]
    pub const fn is_signed(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }
}

/// How a host call interprets one register argument.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArgKind {
    /// A scalar of the given width and signedness.
    Scalar(ScalarKind),
    /// A guest address that must resolve to a granted region carrying `access`.
    Addr {
        /// Permissions the call needs on the addressed region.
        access: Perms,
        /// Whether the null address is accepted (the call then skips the dereference).
        nullable: bool,
    },
}

impl ArgKind {
    /// Unsigned 8-bit scalar.
    pub const U8: Self = Self::Scalar(ScalarKind::U8);
    /// Unsigned 16-bit scalar.
    pub const U16: Self = Self::Scalar(ScalarKind::U16);
    /// Unsigned 32-bit scalar.
    pub const U32: Self = Self::Scalar(ScalarKind::U32);
    /// Unsigned 64-bit scalar.
    pub const U64: Self = Self::Scalar(ScalarKind::U64);
    /// Signed 16-bit scalar.
    pub const I16: Self = Self::Scalar(ScalarKind::I16);
    /// Signed 32-bit scalar.
    pub const I32: Self = Self::Scalar(ScalarKind::I32);
    /// Read-only source address.
    pub const SRC: Self = Self::Addr {
        access: Perms::READ,
        nullable: false,
    };
    /// Writable destination address.
    pub const DST: Self = Self::Addr {
        access: Perms::WRITE,
        nullable: false,
    };
    /// Address that is both read and written.
    pub const INOUT: Self = Self::Addr {
        access: Perms::READ_WRITE,
        nullable: false,
    };
    /// Writable destination address that may be null.
    pub const DST_OR_NULL: Self = Self::Addr {
        access: Perms::WRITE,
        nullable: true,
    };
}

/// How the raw result of a host function is widened into `r0`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RetKind {
    /// 32-bit unsigned, zero-extended.
    U32,
    /// 32-bit signed, sign-extended.
    I32,
    /// Full 64-bit guest address.
    Addr,
}

impl RetKind {
    /// Applies the return contract to a raw host result.
    #[must_use]
    pub const fn widen(self, raw: u64) -> u64 {
        match self {
            Self::U32 => raw as u32 as u64,
            Self::I32 => raw as u32 as i32 as i64 as u64,
            Self::Addr => raw,
        }
    }
}

/// The native side of a host call.
///
/// Arguments are read through the [`CallFrame`], which has already validated them against the
/// descriptor. The returned value is widened per [`HostCall::ret`].
pub type HostFn = fn(&mut CallFrame<'_, '_, '_>) -> Result<u64, Fault>;

/// A typed host-call descriptor.
#[derive(Copy, Clone, Debug)]
pub struct HostCall {
    /// Numeric identifier the bytecode calls.
    pub id: CallId,
    /// Stable name, for logs and traces.
    pub name: &'static str,
    /// Group that contributes the call.
    pub group: CallGroup,
    /// Argument kinds for `r1..`, at most [`MAX_ARGS`].
    pub args: &'static [ArgKind],
    /// Return kind.
    pub ret: RetKind,
    /// Native implementation.
    pub func: HostFn,
}

impl HostCall {
    /// Number of register arguments the call consumes.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}
