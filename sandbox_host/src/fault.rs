// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runtime faults raised by the interpreter or by host calls.

use core::fmt;

use crate::call::CallId;
use crate::region::Perms;

/// Errors a host function reports about its own arguments or collaborators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostError {
    /// The function asked for an argument its descriptor does not declare with that kind.
    ArgKindMismatch {
        /// Zero-based argument index (`r1` is index 0).
        index: usize,
    },
    /// An argument value is outside the range the function accepts.
    InvalidArgument {
        /// Zero-based argument index.
        index: usize,
    },
    /// A guest-side structure read by the function is malformed.
    MalformedStruct,
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArgKindMismatch { index } => write!(f, "argument {index} has a different kind"),
            Self::InvalidArgument { index } => write!(f, "argument {index} is out of range"),
            Self::MalformedStruct => write!(f, "malformed guest structure"),
        }
    }
}

impl core::error::Error for HostError {}

/// A runtime fault. Any fault ends the run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fault {
    /// The call id has no handler in this build.
    UnsupportedCall {
        /// The unresolved id.
        id: CallId,
    },
    /// A branch was attempted with no branch budget left.
    BudgetExhausted,
    /// A memory access fell outside every granted region or lacked a permission.
    MemoryViolation {
        /// Guest address of the access.
        addr: u64,
        /// Length of the access in bytes.
        len: u64,
        /// Permissions the access needed.
        access: Perms,
    },
    /// The interpreter met an instruction it cannot execute.
    IllegalInstruction {
        /// Raw opcode byte.
        opcode: u8,
    },
    /// Integer division or modulo by zero.
    DivisionByZero,
    /// Execution ran past the end of the program.
    PcOutOfBounds,
    /// A host function rejected its input.
    Host(HostError),
}

/// Coarse fault classes, each with a stable negative status code.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FaultClass {
    /// No handler for the call id.
    UnsupportedCall,
    /// Runtime trap in the VM core or a host call, including capability violations.
    Abort,
    /// Branch budget ran out.
    BudgetExhausted,
    /// The firmware store has no image at the requested location.
    StorageNotFound,
}

impl FaultClass {
    /// Status code reported to callers. Success is `0`.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::UnsupportedCall => -1,
            Self::Abort => -2,
            Self::BudgetExhausted => -3,
            Self::StorageNotFound => -4,
        }
    }
}

impl fmt::Display for FaultClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedCall => write!(f, "unsupported call"),
            Self::Abort => write!(f, "fault abort"),
            Self::BudgetExhausted => write!(f, "budget exhausted"),
            Self::StorageNotFound => write!(f, "storage not found"),
        }
    }
}

impl Fault {
    /// Returns the class this fault reports as.
    #[must_use]
    pub fn class(&self) -> FaultClass {
        match self {
            Self::UnsupportedCall { .. } => FaultClass::UnsupportedCall,
            Self::BudgetExhausted => FaultClass::BudgetExhausted,
            Self::MemoryViolation { .. }
            | Self::IllegalInstruction { .. }
            | Self::DivisionByZero
            | Self::PcOutOfBounds
            | Self::Host(_) => FaultClass::Abort,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedCall { id } => write!(f, "unsupported host call {id}"),
            Self::BudgetExhausted => write!(f, "branch budget exhausted"),
            Self::MemoryViolation { addr, len, access } => write!(
                f,
                "memory violation: {len} byte(s) at 0x{addr:016x} need {access}"
            ),
            Self::IllegalInstruction { opcode } => {
                write!(f, "illegal instruction (opcode 0x{opcode:02x})")
            }
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::PcOutOfBounds => write!(f, "pc out of bounds"),
            Self::Host(e) => write!(f, "host call failed: {e}"),
        }
    }
}

impl core::error::Error for Fault {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Host(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HostError> for Fault {
    fn from(e: HostError) -> Self {
        Self::Host(e)
    }
}

/// A fault annotated with the instruction index it occurred at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FaultInfo {
    /// Instruction slot index (not a byte offset).
    pub pc: usize,
    /// Fault kind.
    pub fault: Fault,
}

impl FaultInfo {
    /// Returns the class of the underlying fault.
    #[must_use]
    pub fn class(&self) -> FaultClass {
        self.fault.class()
    }
}

impl fmt::Display for FaultInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fault at pc={}: {}", self.pc, self.fault)
    }
}

impl core::error::Error for FaultInfo {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        Some(&self.fault)
    }
}
