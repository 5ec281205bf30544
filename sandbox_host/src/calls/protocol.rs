// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `protocol` group: building a compact binary response in a guest buffer.
//!
//! The guest passes a context `{ buf: GuestAddr, buf_len: u64 }` naming its response buffer.
//! The header carries version 1, type acknowledgement, the response code, and the message id
//! and token of the request (from [`ResponseState`]). Options are delta encoded and a `0xff`
//! marker separates them from the payload.
//!
//! [`ResponseState`]: crate::services::ResponseState

use crate::abi::CallFrame;
use crate::call::{ArgKind, CallId, HostCall, RetKind};
use crate::calls::status;
use crate::fault::Fault;
use crate::region::GuestAddr;
use crate::registry::CallGroup;
use crate::services::errno;

/// Calls contributed by the `protocol` group.
pub static CALLS: &[HostCall] = &[
    HostCall {
        id: CallId(0x40),
        name: "resp_init",
        group: CallGroup::Protocol,
        args: &[ArgKind::SRC, ArgKind::U32],
        ret: RetKind::I32,
        func: resp_init,
    },
    HostCall {
        id: CallId(0x41),
        name: "opt_finish",
        group: CallGroup::Protocol,
        args: &[ArgKind::SRC, ArgKind::U16],
        ret: RetKind::I32,
        func: opt_finish,
    },
    HostCall {
        id: CallId(0x42),
        name: "add_format",
        group: CallGroup::Protocol,
        args: &[ArgKind::SRC, ArgKind::U16],
        ret: RetKind::I32,
        func: add_format,
    },
    HostCall {
        id: CallId(0x43),
        name: "get_payload",
        group: CallGroup::Protocol,
        args: &[ArgKind::SRC],
        ret: RetKind::Addr,
        func: get_payload,
    },
];

/// Size of the guest protocol context.
pub const CTX_SIZE: usize = 16;

/// `opt_finish` flag: a payload follows, so emit the payload marker.
pub const OPT_FINISH_PAYLOAD: u16 = 0x0001;

/// Option number of the content-format option.
pub const OPTION_CONTENT_FORMAT: u16 = 12;

/// Byte separating options from payload.
pub const PAYLOAD_MARKER: u8 = 0xff;

const VERSION_ACK: u8 = 0x60;

struct Ctx {
    buf: GuestAddr,
    buf_len: usize,
}

fn ctx(frame: &CallFrame<'_, '_, '_>) -> Result<Ctx, Fault> {
    let at = frame.addr(0)?;
    let buf = frame.read_u64(at)?;
    let buf_len = frame.read_u64(GuestAddr(at.0.wrapping_add(8)))?;
    Ok(Ctx {
        buf: GuestAddr(buf),
        buf_len: usize::try_from(buf_len).unwrap_or(usize::MAX),
    })
}

fn at(buf: GuestAddr, offset: usize) -> GuestAddr {
    GuestAddr(buf.0.wrapping_add(offset as u64))
}

/// `resp_init(ctx, code)`: writes the response header; returns `0` or `-ENOSPC`.
fn resp_init(frame: &mut CallFrame<'_, '_, '_>) -> Result<u64, Fault> {
    let ctx = ctx(frame)?;
    let code = frame.scalar(1)? as u8;
    let response = &mut frame.services().response;
    response.reset_progress();
    let token = response.token().to_vec();
    let id = response.message_id.to_be_bytes();
    let header_len = 4 + token.len();
    if header_len > ctx.buf_len {
        return Ok(status(-errno::ENOSPC));
    }

    let mut header = alloc::vec::Vec::with_capacity(header_len);
    header.extend_from_slice(&[VERSION_ACK | token.len() as u8, code, id[0], id[1]]);
    header.extend_from_slice(&token);
    frame.write(ctx.buf, &header)?;
    frame.services().response.cursor = Some(header_len);
    Ok(0)
}

/// `add_format(ctx, format)`: appends a content-format option; returns its encoded length.
///
/// Returns `-EINVAL` before `resp_init` or after `opt_finish`, `-ENOSPC` if the buffer is full.
fn add_format(frame: &mut CallFrame<'_, '_, '_>) -> Result<u64, Fault> {
    let ctx = ctx(frame)?;
    let format = frame.scalar(1)? as u16;
    let response = &frame.services().response;
    let (Some(cursor), None) = (response.cursor, response.payload_offset) else {
        return Ok(status(-errno::EINVAL));
    };
    let Some(delta) = OPTION_CONTENT_FORMAT.checked_sub(response.last_option) else {
        return Ok(status(-errno::EINVAL));
    };

    let value = format.to_be_bytes();
    let value: &[u8] = match format {
        0 => &[],
        1..=0xff => &value[1..],
        _ => &value[..],
    };
    let mut option = [0_u8; 3];
    option[0] = ((delta as u8) << 4) | value.len() as u8;
    option[1..=value.len()].copy_from_slice(value);
    let option = &option[..=value.len()];
    if cursor + option.len() > ctx.buf_len {
        return Ok(status(-errno::ENOSPC));
    }

    frame.write(at(ctx.buf, cursor), option)?;
    let response = &mut frame.services().response;
    response.cursor = Some(cursor + option.len());
    response.last_option = OPTION_CONTENT_FORMAT;
    Ok(option.len() as u64)
}

/// `opt_finish(ctx, flags)`: closes the option list; returns the header length or `-errno`.
fn opt_finish(frame: &mut CallFrame<'_, '_, '_>) -> Result<u64, Fault> {
    let ctx = ctx(frame)?;
    let flags = frame.scalar(1)? as u16;
    let Some(mut cursor) = frame.services().response.cursor else {
        return Ok(status(-errno::EINVAL));
    };
    if flags & OPT_FINISH_PAYLOAD != 0 {
        if cursor + 1 > ctx.buf_len {
            return Ok(status(-errno::ENOSPC));
        }
        frame.write(at(ctx.buf, cursor), &[PAYLOAD_MARKER])?;
        cursor += 1;
    }
    let response = &mut frame.services().response;
    response.cursor = Some(cursor);
    response.payload_offset = Some(cursor);
    Ok(cursor as u64)
}

/// `get_payload(ctx)`: guest address where the payload starts.
fn get_payload(frame: &mut CallFrame<'_, '_, '_>) -> Result<u64, Fault> {
    let ctx = ctx(frame)?;
    let response = &frame.services().response;
    let offset = response.payload_offset.or(response.cursor).unwrap_or(0);
    Ok(at(ctx.buf, offset).0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{RegisterFile, invoke};
    use crate::region::{Perms, RegionTable};
    use crate::services::{HostServices, ManualClock, NoDevices, NullConsole, ResponseState};

    struct Fixture<'a> {
        mem: RegionTable<'a>,
        ctx: GuestAddr,
        buf: GuestAddr,
    }

    fn fixture<'a>(ctx_bytes: &'a mut [u8; CTX_SIZE], buf: &'a mut [u8]) -> Fixture<'a> {
        let mut mem = RegionTable::new();
        let b = mem.grant(buf, Perms::READ_WRITE).unwrap();
        let len = mem.get(b).unwrap().len() as u64;
        ctx_bytes[..8].copy_from_slice(&b.base().0.to_le_bytes());
        ctx_bytes[8..].copy_from_slice(&len.to_le_bytes());
        let c = mem.grant(&mut ctx_bytes[..], Perms::READ).unwrap();
        Fixture {
            mem,
            ctx: c.base(),
            buf: b.base(),
        }
    }

    fn call(f: &Fixture<'_>, s: &mut HostServices<'_>, id: u32, arg: u64) -> i64 {
        let call = CALLS.iter().find(|c| c.id.0 == id).unwrap();
        let mut regs = RegisterFile::new();
        regs.set(1, f.ctx.0);
        regs.set(2, arg);
        invoke(call, &mut regs, &f.mem, s).unwrap() as i64
    }

    #[test]
    fn builds_header_options_and_marker() {
        let mut ctx = [0_u8; CTX_SIZE];
        let mut buf = [0_u8; 32];
        let (mut console, mut devices, mut clock) =
            (NullConsole, NoDevices, ManualClock::default());
        let mut s = HostServices::new(&mut console, &mut devices, &mut clock)
            .with_response(ResponseState::new(0x1234, &[0xaa, 0xbb]));
        {
            let f = fixture(&mut ctx, &mut buf);
            assert_eq!(call(&f, &mut s, 0x40, 0x45), 0);
            assert_eq!(call(&f, &mut s, 0x42, 50), 2);
            assert_eq!(call(&f, &mut s, 0x41, u64::from(OPT_FINISH_PAYLOAD)), 9);
            assert_eq!(call(&f, &mut s, 0x43, 0) as u64, f.buf.0 + 9);
            assert_eq!(call(&f, &mut s, 0x42, 0), -i64::from(errno::EINVAL));
        }
        assert_eq!(
            buf[..9],
            [0x62, 0x45, 0x12, 0x34, 0xaa, 0xbb, 0xc1, 50, PAYLOAD_MARKER]
        );
    }

    #[test]
    fn header_token_length_fits_the_tkl_nibble() {
        let mut ctx = [0_u8; CTX_SIZE];
        let mut buf = [0_u8; 16];
        let (mut console, mut devices, mut clock) =
            (NullConsole, NoDevices, ManualClock::default());
        let mut s = HostServices::new(&mut console, &mut devices, &mut clock)
            .with_response(ResponseState::new(1, &[0xcc; 12]));
        {
            let f = fixture(&mut ctx, &mut buf);
            assert_eq!(call(&f, &mut s, 0x40, 0x45), 0);
            assert_eq!(call(&f, &mut s, 0x41, 0), 12);
        }
        assert_eq!(buf[0], 0x68);
        assert_eq!(buf[4..12], [0xcc; 8]);
        assert_eq!(buf[12], 0);
    }

    #[test]
    fn short_buffer_reports_enospc() {
        let mut ctx = [0_u8; CTX_SIZE];
        let mut buf = [0_u8; 3];
        let (mut console, mut devices, mut clock) =
            (NullConsole, NoDevices, ManualClock::default());
        let mut s = HostServices::new(&mut console, &mut devices, &mut clock);
        let f = fixture(&mut ctx, &mut buf);
        assert_eq!(call(&f, &mut s, 0x40, 0x45), -i64::from(errno::ENOSPC));
        assert_eq!(call(&f, &mut s, 0x41, 0), -i64::from(errno::EINVAL));
    }

    #[test]
    fn lying_buffer_length_still_faults() {
        let mut ctx = [0_u8; CTX_SIZE];
        let mut buf = [0_u8; 4];
        let (mut console, mut devices, mut clock) =
            (NullConsole, NoDevices, ManualClock::default());
        let mut s = HostServices::new(&mut console, &mut devices, &mut clock);
        let mut f = fixture(&mut ctx, &mut buf);
        // Rebuild the context claiming a larger buffer than was granted.
        let mut forged = [0_u8; CTX_SIZE];
        forged[..8].copy_from_slice(&f.buf.0.to_le_bytes());
        forged[8..].copy_from_slice(&64_u64.to_le_bytes());
        f.ctx = f.mem.grant(&forged[..], Perms::READ).unwrap().base();

        assert_eq!(call(&f, &mut s, 0x40, 0x45), 0);
        let add = CALLS.iter().find(|c| c.id.0 == 0x42).unwrap();
        let mut regs = RegisterFile::new();
        regs.set(1, f.ctx.0);
        regs.set(2, 50);
        assert!(matches!(
            invoke(add, &mut regs, &f.mem, &mut s),
            Err(Fault::MemoryViolation { .. })
        ));
    }
}
