// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `format` group: number-to-text conversion into guest buffers.
//!
//! Both calls return the length of the text. A null output address asks for the length only.
//! The text is not NUL-terminated.

use alloc::string::String;
use core::fmt::Write as _;

use crate::abi::CallFrame;
use crate::call::{ArgKind, CallId, HostCall, RetKind};
use crate::fault::{Fault, HostError};
use crate::registry::CallGroup;

/// Calls contributed by the `format` group.
pub static CALLS: &[HostCall] = &[
    HostCall {
        id: CallId(0x50),
        name: "fmt_s16_dfp",
        group: CallGroup::Format,
        args: &[ArgKind::DST_OR_NULL, ArgKind::I16, ArgKind::I32],
        ret: RetKind::U32,
        func: fmt_s16_dfp,
    },
    HostCall {
        id: CallId(0x51),
        name: "fmt_u32_dec",
        group: CallGroup::Format,
        args: &[ArgKind::DST_OR_NULL, ArgKind::U32],
        ret: RetKind::U32,
        func: fmt_u32_dec,
    },
];

/// Largest accepted decimal-point shift in either direction.
pub const MAX_FP_DIGITS: i32 = 9;

/// Formats `val * 10^-fp_digits` as a decimal string.
///
/// Positive `fp_digits` place a decimal point, negative ones append zeros.
#[must_use]
pub fn format_s32_dfp(val: i32, fp_digits: i32) -> Option<String> {
    if fp_digits.unsigned_abs() > MAX_FP_DIGITS.unsigned_abs() {
        return None;
    }
    let mut out = String::new();
    if fp_digits <= 0 {
        let _ = write!(out, "{val}");
        out.extend(core::iter::repeat_n('0', fp_digits.unsigned_abs() as usize));
        return Some(out);
    }
    let scale = 10_u64.pow(fp_digits as u32);
    let mag = u64::from(val.unsigned_abs());
    if val < 0 {
        out.push('-');
    }
    let _ = write!(
        out,
        "{}.{:0width$}",
        mag / scale,
        mag % scale,
        width = fp_digits as usize
    );
    Some(out)
}

fn emit(frame: &mut CallFrame<'_, '_, '_>, text: &str) -> Result<u64, Fault> {
    let out = frame.addr(0)?;
    if !out.is_null() {
        frame.write(out, text.as_bytes())?;
    }
    Ok(text.len() as u64)
}

fn fmt_s16_dfp(frame: &mut CallFrame<'_, '_, '_>) -> Result<u64, Fault> {
    let val = frame.signed(1)? as i16;
    let digits = frame.signed(2)? as i32;
    let text = format_s32_dfp(i32::from(val), digits)
        .ok_or(HostError::InvalidArgument { index: 2 })?;
    emit(frame, &text)
}

fn fmt_u32_dec(frame: &mut CallFrame<'_, '_, '_>) -> Result<u64, Fault> {
    let val = frame.scalar(1)? as u32;
    let mut text = String::new();
    let _ = write!(text, "{val}");
    emit(frame, &text)
}
