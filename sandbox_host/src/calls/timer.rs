// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `timer` group: monotonic time and periodic wakeup.
//!
//! Times cross the boundary as wrapping 32-bit values.

use crate::abi::CallFrame;
use crate::call::{ArgKind, CallId, HostCall, RetKind};
use crate::fault::Fault;
use crate::registry::CallGroup;

/// Calls contributed by the `timer` group.
pub static CALLS: &[HostCall] = &[
    HostCall {
        id: CallId(0x20),
        name: "now_ms",
        group: CallGroup::Timer,
        args: &[],
        ret: RetKind::U32,
        func: now_ms,
    },
    HostCall {
        id: CallId(0x60),
        name: "now_us",
        group: CallGroup::Timer,
        args: &[],
        ret: RetKind::U32,
        func: now_us,
    },
    HostCall {
        id: CallId(0x61),
        name: "periodic_wakeup",
        group: CallGroup::Timer,
        args: &[ArgKind::INOUT, ArgKind::U32],
        ret: RetKind::U32,
        func: periodic_wakeup,
    },
];

fn now_ms(frame: &mut CallFrame<'_, '_, '_>) -> Result<u64, Fault> {
    Ok(frame.services().clock.now_ms())
}

fn now_us(frame: &mut CallFrame<'_, '_, '_>) -> Result<u64, Fault> {
    Ok(frame.services().clock.now_us())
}

/// `periodic_wakeup(last_wakeup, period)`: sleeps until `*last_wakeup + period`.
///
/// On time, the target becomes the new `*last_wakeup`. When the target already passed (the
/// distance to it exceeds one period), nothing sleeps and `*last_wakeup` is set to now.
fn periodic_wakeup(frame: &mut CallFrame<'_, '_, '_>) -> Result<u64, Fault> {
    let last = frame.addr(0)?;
    let period = frame.scalar(1)? as u32;
    let target = frame.read_u32(last)?.wrapping_add(period);
    let clock = &mut *frame.services().clock;
    let now = clock.now_us() as u32;
    let offset = target.wrapping_sub(now);
    let next = if offset <= period {
        clock.sleep_us(u64::from(offset));
        target
    } else {
        now
    };
    frame.write_u32(last, next)?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{RegisterFile, invoke};
    use crate::region::{Perms, RegionTable};
    use crate::services::{HostServices, ManualClock, NoDevices, NullConsole};

    fn wakeup(clock: &mut ManualClock, last: u32, period: u32) -> u32 {
        let mut cell = last.to_le_bytes();
        {
            let mut mem = RegionTable::new();
            let h = mem.grant(&mut cell[..], Perms::READ_WRITE).unwrap();
            let (mut console, mut devices) = (NullConsole, NoDevices);
            let mut s = HostServices::new(&mut console, &mut devices, clock);
            let mut regs = RegisterFile::new();
            regs.set(1, h.base().0);
            regs.set(2, u64::from(period));
            invoke(&CALLS[2], &mut regs, &mem, &mut s).unwrap();
        }
        u32::from_le_bytes(cell)
    }

    #[test]
    fn sleeps_until_target() {
        let mut clock = ManualClock::new(1_000);
        assert_eq!(wakeup(&mut clock, 900, 500), 1_400);
        assert_eq!(clock.peek(), 1_400);
    }

    #[test]
    fn late_wakeup_resyncs_to_now() {
        let mut clock = ManualClock::new(10_000);
        assert_eq!(wakeup(&mut clock, 900, 500), 10_000);
        assert_eq!(clock.peek(), 10_000);
    }

    #[test]
    fn wraps_around_u32() {
        let mut clock = ManualClock::new(u64::from(u32::MAX) - 10);
        assert_eq!(wakeup(&mut clock, u32::MAX - 20, 40), 19);
        assert_eq!(clock.peek(), u64::from(u32::MAX) + 20);
    }

    #[test]
    fn now_reads_clock() {
        let mut clock = ManualClock::new(5_000_123);
        let (mut console, mut devices) = (NullConsole, NoDevices);
        let mut s = HostServices::new(&mut console, &mut devices, &mut clock);
        let mem = RegionTable::new();
        let mut regs = RegisterFile::new();
        assert_eq!(invoke(&CALLS[0], &mut regs, &mem, &mut s), Ok(5_000));
        assert_eq!(invoke(&CALLS[1], &mut regs, &mem, &mut s), Ok(5_000_123));
    }
}
