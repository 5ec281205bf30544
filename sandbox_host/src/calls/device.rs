// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `device` group: sensor/actuator registry access.
//!
//! Devices are named by opaque handles: `0` means "not found", any other value is the device
//! index plus one. Handles are plain scalars; the guest cannot forge a pointer with them.

use crate::abi::CallFrame;
use crate::call::{ArgKind, CallId, HostCall, RetKind};
use crate::calls::status;
use crate::fault::Fault;
use crate::registry::CallGroup;
use crate::services::{DeviceError, DeviceId, Phydat};

/// Calls contributed by the `device` group.
pub static CALLS: &[HostCall] = &[
    HostCall {
        id: CallId(0x30),
        name: "device_find_nth",
        group: CallGroup::Device,
        args: &[ArgKind::I32],
        ret: RetKind::U32,
        func: find_nth,
    },
    HostCall {
        id: CallId(0x31),
        name: "device_find_type",
        group: CallGroup::Device,
        args: &[ArgKind::U8],
        ret: RetKind::U32,
        func: find_type,
    },
    HostCall {
        id: CallId(0x32),
        name: "device_read",
        group: CallGroup::Device,
        args: &[ArgKind::U32, ArgKind::DST],
        ret: RetKind::I32,
        func: read,
    },
    HostCall {
        id: CallId(0x33),
        name: "device_write",
        group: CallGroup::Device,
        args: &[ArgKind::U32, ArgKind::SRC],
        ret: RetKind::I32,
        func: write,
    },
];

fn handle(dev: Option<DeviceId>) -> u64 {
    dev.map_or(0, |d| u64::from(d.0) + 1)
}

fn device(raw: u64) -> Result<DeviceId, DeviceError> {
    match raw {
        0 => Err(DeviceError::NoDevice),
        h => Ok(DeviceId((h - 1) as u32)),
    }
}

fn find_nth(frame: &mut CallFrame<'_, '_, '_>) -> Result<u64, Fault> {
    let index = frame.signed(0)?;
    let Ok(index) = usize::try_from(index) else {
        return Ok(0);
    };
    Ok(handle(frame.services().devices.find_nth(index)))
}

fn find_type(frame: &mut CallFrame<'_, '_, '_>) -> Result<u64, Fault> {
    let class = frame.scalar(0)? as u8;
    Ok(handle(frame.services().devices.find_type(class)))
}

/// Reads the device into the guest's sensor reading; returns the dimension count or `-errno`.
fn read(frame: &mut CallFrame<'_, '_, '_>) -> Result<u64, Fault> {
    let dev = device(frame.scalar(0)?);
    let out = frame.addr(1)?;
    let result = dev.and_then(|d| frame.services().devices.read(d));
    match result {
        Ok((data, dims)) => {
            frame.write(out, &data.to_bytes())?;
            Ok(u64::from(dims))
        }
        Err(e) => Ok(status(e.errno())),
    }
}

/// Writes the guest's sensor reading to the device; returns the dimension count or `-errno`.
fn write(frame: &mut CallFrame<'_, '_, '_>) -> Result<u64, Fault> {
    let dev = device(frame.scalar(0)?);
    let mut bytes = [0_u8; Phydat::SIZE];
    frame.read(frame.addr(1)?, &mut bytes)?;
    let data = Phydat::from_bytes(bytes);
    match dev.and_then(|d| frame.services().devices.write(d, &data)) {
        Ok(dims) => Ok(u64::from(dims)),
        Err(e) => Ok(status(e.errno())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{RegisterFile, invoke};
    use crate::region::{Perms, RegionTable};
    use crate::services::{
        HostServices, ManualClock, NullConsole, StaticDevice, StaticDevices, errno,
    };

    fn registry() -> StaticDevices {
        let mut devs = StaticDevices::new();
        devs.push(StaticDevice {
            name: "temp".into(),
            class: 0x82,
            value: Phydat {
                val: [2150, 0, 0],
                unit: 2,
                scale: -2,
            },
            dims: 1,
            writable: false,
        });
        devs.push(StaticDevice {
            name: "led".into(),
            class: 0x42,
            value: Phydat::default(),
            dims: 1,
            writable: true,
        });
        devs
    }

    fn run(
        devs: &mut StaticDevices,
        id: u32,
        regs: &mut RegisterFile,
        mem: &RegionTable<'_>,
    ) -> i64 {
        let mut console = NullConsole;
        let mut clock = ManualClock::default();
        let mut services = HostServices::new(&mut console, devs, &mut clock);
        let call = CALLS.iter().find(|c| c.id.0 == id).unwrap();
        invoke(call, regs, mem, &mut services).unwrap() as i64
    }

    #[test]
    fn find_returns_biased_handles() {
        let mut devs = registry();
        let mem = RegionTable::new();
        let mut regs = RegisterFile::new();

        regs.set(1, 1);
        assert_eq!(run(&mut devs, 0x30, &mut regs, &mem), 2);
        regs.set(1, 5);
        assert_eq!(run(&mut devs, 0x30, &mut regs, &mem), 0);
        regs.set(1, u64::MAX);
        assert_eq!(run(&mut devs, 0x30, &mut regs, &mem), 0);
        regs.set(1, 0x182);
        assert_eq!(run(&mut devs, 0x31, &mut regs, &mem), 1);
    }

    #[test]
    fn read_fills_guest_struct() {
        let mut devs = registry();
        let mut buf = [0xaa_u8; 8];
        let mut mem = RegionTable::new();
        let h = mem.grant(&mut buf[..], Perms::READ_WRITE).unwrap();
        let mut regs = RegisterFile::new();
        regs.set(1, 1);
        regs.set(2, h.base().0);
        assert_eq!(run(&mut devs, 0x32, &mut regs, &mem), 1);
        drop(mem);
        assert_eq!(buf, devs.get(DeviceId(0)).unwrap().value.to_bytes());
    }

    #[test]
    fn failed_read_leaves_guest_struct_alone() {
        let mut devs = registry();
        let mut buf = [0xaa_u8; 8];
        let mut mem = RegionTable::new();
        let h = mem.grant(&mut buf[..], Perms::READ_WRITE).unwrap();
        let mut regs = RegisterFile::new();
        regs.set(2, h.base().0);
        for handle in [0, 9] {
            regs.set(1, handle);
            assert_eq!(
                run(&mut devs, 0x32, &mut regs, &mem),
                -i64::from(errno::ENODEV)
            );
        }
        drop(mem);
        assert_eq!(buf, [0xaa; 8]);
    }

    #[test]
    fn write_respects_device_capabilities() {
        let mut devs = registry();
        let on = Phydat {
            val: [1, 0, 0],
            ..Phydat::default()
        };
        let bytes = on.to_bytes();
        let mut mem = RegionTable::new();
        let h = mem.grant(&bytes[..], Perms::READ).unwrap();
        let mut regs = RegisterFile::new();
        regs.set(2, h.base().0);

        regs.set(1, 2);
        assert_eq!(run(&mut devs, 0x33, &mut regs, &mem), 1);
        regs.set(1, 1);
        assert_eq!(
            run(&mut devs, 0x33, &mut regs, &mem),
            -i64::from(errno::ENOTSUP)
        );
        assert_eq!(devs.get(DeviceId(1)).unwrap().value, on);
    }
}
