// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Numeric call-id dispatch.
//!
//! A [`CallRegistry`] maps [`CallId`]s to [`HostCall`] descriptors. Descriptors are contributed
//! by call groups; a call resolves only while its group is enabled. Groups other than `core` can
//! also be compiled out with Cargo features, in which case enabling them is an error.

use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashMap;

use crate::call::{CallId, HostCall, MAX_ARGS};

/// A set of related host calls that is enabled or disabled as a unit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CallGroup {
    /// Printing and bulk copy.
    Core,
    /// Sensor/actuator registry access.
    Device,
    /// Response construction for the request being served.
    Protocol,
    /// Number formatting.
    Format,
    /// Clock and periodic wakeup.
    Timer,
    /// Calls registered by the embedder.
    Extension,
}

impl CallGroup {
    /// Every group, in id order.
    pub const ALL: [Self; 6] = [
        Self::Core,
        Self::Device,
        Self::Protocol,
        Self::Format,
        Self::Timer,
        Self::Extension,
    ];

    /// Stable lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Device => "device",
            Self::Protocol => "protocol",
            Self::Format => "format",
            Self::Timer => "timer",
            Self::Extension => "extension",
        }
    }

    /// Parses a name produced by [`CallGroup::name`].
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.name() == name)
    }

    /// Built-in calls contributed by this group (empty when compiled out).
    #[must_use]
    pub fn calls(self) -> &'static [HostCall] {
        match self {
            Self::Core => crate::calls::common::CALLS,
            #[cfg(feature = "device")]
            Self::Device => crate::calls::device::CALLS,
            #[cfg(feature = "protocol")]
            Self::Protocol => crate::calls::protocol::CALLS,
            #[cfg(feature = "format")]
            Self::Format => crate::calls::format::CALLS,
            #[cfg(feature = "timer")]
            Self::Timer => crate::calls::timer::CALLS,
            _ => &[],
        }
    }

    /// Returns `true` if the group's built-in calls are compiled into this build.
    #[must_use]
    pub const fn is_compiled(self) -> bool {
        match self {
            Self::Core | Self::Extension => true,
            Self::Device => cfg!(feature = "device"),
            Self::Protocol => cfg!(feature = "protocol"),
            Self::Format => cfg!(feature = "format"),
            Self::Timer => cfg!(feature = "timer"),
        }
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for CallGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of looking up a call id.
#[derive(Copy, Clone, Debug)]
pub enum Resolution<'r> {
    /// The id names an enabled call.
    Resolved(&'r HostCall),
    /// No enabled call has this id.
    Unsupported,
}

impl<'r> Resolution<'r> {
    /// The resolved descriptor, if any.
    #[must_use]
    pub fn call(self) -> Option<&'r HostCall> {
        match self {
            Self::Resolved(call) => Some(call),
            Self::Unsupported => None,
        }
    }
}

/// Errors when building a registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// Two descriptors share one id.
    DuplicateCall {
        /// The contested id.
        id: CallId,
        /// Name of the descriptor already registered.
        existing: &'static str,
    },
    /// The group was compiled out of this build.
    GroupNotCompiled {
        /// The requested group.
        group: CallGroup,
    },
    /// The descriptor declares more register arguments than the ABI passes.
    TooManyArgs {
        /// The descriptor's id.
        id: CallId,
        /// Declared argument count.
        count: usize,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateCall { id, existing } => {
                write!(f, "call id {id} is already registered to '{existing}'")
            }
            Self::GroupNotCompiled { group } => {
                write!(f, "call group '{group}' is not compiled into this build")
            }
            Self::TooManyArgs { id, count } => {
                write!(f, "call id {id} declares {count} arguments, at most {MAX_ARGS} fit")
            }
        }
    }
}

impl core::error::Error for RegistryError {}

/// Dispatch table from call id to descriptor.
///
/// # Example
/// ```
/// use sandbox_host::call::CallId;
/// use sandbox_host::registry::{CallGroup, CallRegistry};
///
/// let reg = CallRegistry::with_groups(&[CallGroup::Core]).unwrap();
/// assert!(reg.resolve(CallId(0x02)).call().is_some());
/// assert!(reg.resolve(CallId(0x20)).call().is_none());
/// ```
#[derive(Clone, Debug, Default)]
pub struct CallRegistry {
    calls: HashMap<u32, HostCall>,
    enabled: u8,
}

impl CallRegistry {
    /// An empty registry with no group enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every compiled group enabled.
    #[must_use]
    pub fn standard() -> Self {
        let mut reg = Self::new();
        for group in CallGroup::ALL.into_iter().filter(|g| g.is_compiled()) {
            for call in group.calls() {
                reg.calls.insert(call.id.0, *call);
            }
            reg.enabled |= group.bit();
        }
        reg
    }

    /// A registry with exactly `groups` enabled.
    pub fn with_groups(groups: &[CallGroup]) -> Result<Self, RegistryError> {
        let mut reg = Self::new();
        for &group in groups {
            reg.enable_group(group)?;
        }
        Ok(reg)
    }

    /// Enables `group`, registering its built-in calls on first use.
    pub fn enable_group(&mut self, group: CallGroup) -> Result<(), RegistryError> {
        if !group.is_compiled() {
            return Err(RegistryError::GroupNotCompiled { group });
        }
        for call in group.calls() {
            check_arity(call)?;
            match self.calls.get(&call.id.0) {
                Some(existing) if existing.name == call.name && existing.group == group => {}
                Some(existing) => {
                    return Err(RegistryError::DuplicateCall {
                        id: call.id,
                        existing: existing.name,
                    });
                }
                None => {
                    self.calls.insert(call.id.0, *call);
                }
            }
        }
        self.enabled |= group.bit();
        tracing::debug!(group = group.name(), "enabled call group");
        Ok(())
    }

    /// Disables `group`; its calls stop resolving.
    pub fn disable_group(&mut self, group: CallGroup) {
        self.enabled &= !group.bit();
    }

    /// Returns `true` if `group` is enabled.
    #[must_use]
    pub fn is_enabled(&self, group: CallGroup) -> bool {
        self.enabled & group.bit() != 0
    }

    /// Registers an additional descriptor.
    ///
    /// It resolves once its group is enabled.
    pub fn register(&mut self, call: HostCall) -> Result<(), RegistryError> {
        check_arity(&call)?;
        if let Some(existing) = self.calls.get(&call.id.0) {
            return Err(RegistryError::DuplicateCall {
                id: call.id,
                existing: existing.name,
            });
        }
        self.calls.insert(call.id.0, call);
        Ok(())
    }

    /// Looks up `id`. Unknown ids and ids of disabled groups are [`Resolution::Unsupported`].
    #[must_use]
    pub fn resolve(&self, id: CallId) -> Resolution<'_> {
        match self.calls.get(&id.0) {
            Some(call) if self.is_enabled(call.group) => Resolution::Resolved(call),
            _ => {
                tracing::trace!(%id, "unsupported host call");
                Resolution::Unsupported
            }
        }
    }

    /// Every id that currently resolves, ascending.
    #[must_use]
    pub fn ids(&self) -> Vec<CallId> {
        let mut ids: Vec<CallId> = self
            .calls
            .values()
            .filter(|c| self.is_enabled(c.group))
            .map(|c| c.id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

fn check_arity(call: &HostCall) -> Result<(), RegistryError> {
    if call.arity() > MAX_ARGS {
        return Err(RegistryError::TooManyArgs {
            id: call.id,
            count: call.arity(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::CallFrame;
    use crate::call::{ArgKind, RetKind};
    use crate::fault::Fault;

    fn zero(_frame: &mut CallFrame<'_, '_, '_>) -> Result<u64, Fault> {
        Ok(0)
    }

    fn extension(id: u32, name: &'static str) -> HostCall {
        HostCall {
            id: CallId(id),
            name,
            group: CallGroup::Extension,
            args: &[],
            ret: RetKind::U32,
            func: zero,
        }
    }

    #[test]
    fn resolves_iff_group_enabled() {
        let mut reg = CallRegistry::with_groups(&[CallGroup::Core]).unwrap();
        for id in [0x01, 0x02, 0x03] {
            assert!(reg.resolve(CallId(id)).call().is_some(), "{id:#x}");
        }
        assert!(reg.resolve(CallId(0x20)).call().is_none());

        #[cfg(feature = "timer")]
        {
            reg.enable_group(CallGroup::Timer).unwrap();
            assert_eq!(
                reg.resolve(CallId(0x60)).call().map(|c| c.name),
                Some("now_us")
            );
            reg.disable_group(CallGroup::Timer);
            assert!(reg.resolve(CallId(0x60)).call().is_none());
        }

        reg.disable_group(CallGroup::Core);
        assert!(reg.resolve(CallId(0x01)).call().is_none());
    }

    #[test]
    fn unknown_and_key_value_ids_are_unsupported() {
        let reg = CallRegistry::standard();
        for id in [0x00, 0x10, 0x11, 0x12, 0x13, 0x44, 0xffff_ffff] {
            assert!(matches!(reg.resolve(CallId(id)), Resolution::Unsupported));
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut reg = CallRegistry::with_groups(&[CallGroup::Core]).unwrap();
        let err = reg.register(extension(0x02, "my_memcpy")).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateCall {
                id: CallId(0x02),
                existing: "memcpy",
            }
        );
        reg.register(extension(0x90, "ext")).unwrap();
        assert!(reg.register(extension(0x90, "ext2")).is_err());
    }

    #[test]
    fn descriptors_with_too_many_args_are_rejected() {
        static SIX: [ArgKind; MAX_ARGS + 1] = [ArgKind::U32; MAX_ARGS + 1];
        static FIVE: [ArgKind; MAX_ARGS] = [ArgKind::U32; MAX_ARGS];
        let mut reg = CallRegistry::new();
        let mut wide = extension(0x91, "wide");
        wide.args = &SIX;
        assert_eq!(
            reg.register(wide),
            Err(RegistryError::TooManyArgs {
                id: CallId(0x91),
                count: MAX_ARGS + 1,
            })
        );
        reg.enable_group(CallGroup::Extension).unwrap();
        assert!(reg.resolve(CallId(0x91)).call().is_none());

        let mut five = extension(0x92, "five");
        five.args = &FIVE;
        reg.register(five).unwrap();
        assert!(reg.resolve(CallId(0x92)).call().is_some());
    }

    #[test]
    fn extension_calls_follow_their_group() {
        let mut reg = CallRegistry::new();
        reg.register(extension(0x90, "ext")).unwrap();
        assert!(reg.resolve(CallId(0x90)).call().is_none());
        reg.enable_group(CallGroup::Extension).unwrap();
        assert!(reg.resolve(CallId(0x90)).call().is_some());
        assert_eq!(reg.ids(), [CallId(0x90)]);
    }

    #[test]
    fn enabling_twice_is_idempotent() {
        let mut reg = CallRegistry::standard();
        let before = reg.ids();
        reg.enable_group(CallGroup::Core).unwrap();
        assert_eq!(reg.ids(), before);
    }

    #[test]
    fn group_names_round_trip() {
        for g in CallGroup::ALL {
            assert_eq!(CallGroup::from_name(g.name()), Some(g));
        }
        assert_eq!(CallGroup::from_name("kv"), None);
    }
}
