// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `core` group: formatted printing, debug printing, bulk copy.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write as _;

use crate::abi::CallFrame;
use crate::call::{ArgKind, CallId, HostCall, RetKind};
use crate::fault::Fault;
use crate::registry::CallGroup;

/// Calls contributed by the `core` group.
pub static CALLS: &[HostCall] = &[
    HostCall {
        id: CallId(0x01),
        name: "printf",
        group: CallGroup::Core,
        args: &[
            ArgKind::SRC,
            ArgKind::U32,
            ArgKind::U32,
            ArgKind::U32,
            ArgKind::U32,
        ],
        ret: RetKind::I32,
        func: printf,
    },
    HostCall {
        id: CallId(0x02),
        name: "memcpy",
        group: CallGroup::Core,
        args: &[ArgKind::DST, ArgKind::SRC, ArgKind::U32],
        ret: RetKind::Addr,
        func: memcpy,
    },
    HostCall {
        id: CallId(0x03),
        name: "debug_print",
        group: CallGroup::Core,
        args: &[ArgKind::U64],
        ret: RetKind::U32,
        func: debug_print,
    },
];

/// `printf(fmt, a1, a2, a3, a4)`: renders a NUL-terminated format with up to four 32-bit
/// arguments to the console and returns the number of bytes written.
fn printf(frame: &mut CallFrame<'_, '_, '_>) -> Result<u64, Fault> {
    let fmt = frame.read_c_str(frame.addr(0)?)?;
    let mut args = [0_u32; 4];
    for (i, a) in args.iter_mut().enumerate() {
        *a = frame.scalar(i + 1)? as u32;
    }
    let text = render(&fmt, &args);
    frame.services().console.write_bytes(&text);
    Ok(text.len() as u64)
}

/// `memcpy(dest, src, len)`: copies `len` bytes and returns `dest`.
///
/// Both extents are checked before anything is written. Overlapping ranges behave like
/// `memmove`.
fn memcpy(frame: &mut CallFrame<'_, '_, '_>) -> Result<u64, Fault> {
    let dest = frame.addr(0)?;
    let src = frame.addr(1)?;
    let len = frame.scalar(2)? as usize;
    let bytes = frame.read_vec(src, len)?;
    frame.write(dest, &bytes)?;
    Ok(dest.0)
}

/// `debug_print(value)`: prints one value on its own line.
fn debug_print(frame: &mut CallFrame<'_, '_, '_>) -> Result<u64, Fault> {
    let value = frame.scalar(0)?;
    let mut line = String::new();
    let _ = writeln!(line, "[DEBUG]: {value}");
    frame.services().console.write_str(&line);
    Ok(0)
}

/// Renders a C-style format string.
///
/// Supports `%d %i %u %x %X %c %%` with optional `-`/`0` flags, a field width, and
/// ignored `l`/`h` length modifiers. Arguments are consumed left to right; missing ones read as
/// zero. Unknown conversions are copied through verbatim.
pub(crate) fn render(fmt: &[u8], args: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut args = args.iter().copied();
    let mut i = 0;
    while i < fmt.len() {
        let b = fmt[i];
        i += 1;
        if b != b'%' {
            out.push(b);
            continue;
        }
        let start = i - 1;
        let mut left = false;
        let mut zero = false;
        while let Some(&flag) = fmt.get(i) {
            match flag {
                b'-' => left = true,
                b'0' => zero = true,
                _ => break,
            }
            i += 1;
        }
        let mut width = 0_usize;
        while let Some(d) = fmt.get(i).filter(|d| d.is_ascii_digit()) {
            width = width.saturating_mul(10).saturating_add(usize::from(d - b'0'));
            i += 1;
        }
        while matches!(fmt.get(i), Some(b'l' | b'h')) {
            i += 1;
        }
        let Some(&conv) = fmt.get(i) else {
            out.extend_from_slice(&fmt[start..]);
            break;
        };
        i += 1;
        let mut field = String::new();
        match conv {
            b'%' => {
                out.push(b'%');
                continue;
            }
            b'd' | b'i' => {
                let _ = write!(field, "{}", args.next().unwrap_or(0) as i32);
            }
            b'u' => {
                let _ = write!(field, "{}", args.next().unwrap_or(0));
            }
            b'x' => {
                let _ = write!(field, "{:x}", args.next().unwrap_or(0));
            }
            b'X' => {
                let _ = write!(field, "{:X}", args.next().unwrap_or(0));
            }
            b'c' => {
                // Emitted as the raw byte; `0` never applies.
                let c = args.next().unwrap_or(0) as u8;
                let fill = core::iter::repeat_n(b' ', width.saturating_sub(1));
                if left {
                    out.push(c);
                    out.extend(fill);
                } else {
                    out.extend(fill);
                    out.push(c);
                }
                continue;
            }
            _ => {
                out.extend_from_slice(&fmt[start..i]);
                continue;
            }
        }
        pad(&mut out, &field, width, left, zero && !left);
    }
    out
}

fn pad(out: &mut Vec<u8>, field: &str, width: usize, left: bool, zero: bool) {
    let fill = width.saturating_sub(field.len());
    if left {
        out.extend_from_slice(field.as_bytes());
        out.extend(core::iter::repeat_n(b' ', fill));
    } else if zero {
        let (sign, digits) = match field.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", field),
        };
        out.extend_from_slice(sign.as_bytes());
        out.extend(core::iter::repeat_n(b'0', fill));
        out.extend_from_slice(digits.as_bytes());
    } else {
        out.extend(core::iter::repeat_n(b' ', fill));
        out.extend_from_slice(field.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_conversions() {
        assert_eq!(render(b"v=%d", &[(-7_i32) as u32]), b"v=-7");
        assert_eq!(render(b"%u|%x|%X", &[7, 255, 255]), b"7|ff|FF");
        assert_eq!(render(b"%c%c", &[u32::from(b'o'), u32::from(b'k')]), b"ok");
        assert_eq!(render(b"100%%", &[]), b"100%");
        assert_eq!(render(b"%ld", &[3]), b"3");
    }

    #[test]
    fn render_width_and_flags() {
        assert_eq!(render(b"[%4d]", &[42]), b"[  42]");
        assert_eq!(render(b"[%-4d]", &[42]), b"[42  ]");
        assert_eq!(render(b"[%04d]", &[(-42_i32) as u32]), b"[-042]");
        assert_eq!(render(b"%08x", &[0xbeef]), b"0000beef");
    }

    #[test]
    fn render_is_lenient() {
        assert_eq!(render(b"%d %d", &[1]), b"1 0");
        assert_eq!(render(b"%q", &[1]), b"%q");
        assert_eq!(render(b"tail %", &[]), b"tail %");
    }

    #[test]
    fn render_counts_raw_bytes() {
        let text = render(b"\xb0C %c", &[0xe9]);
        assert_eq!(text, b"\xb0C \xe9");
        assert_eq!(text.len(), 4);
        assert_eq!(render(b"[%3c]", &[u32::from(b'x')]), b"[  x]");
    }
}
