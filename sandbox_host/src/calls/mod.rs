// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Built-in host-call groups.
//!
//! | Group      | Id     | Call              |
//! |------------|--------|-------------------|
//! | `core`     | `0x01` | `printf`          |
//! | `core`     | `0x02` | `memcpy`          |
//! | `core`     | `0x03` | `debug_print`     |
//! | `timer`    | `0x20` | `now_ms`          |
//! | `device`   | `0x30` | `device_find_nth` |
//! | `device`   | `0x31` | `device_find_type`|
//! | `device`   | `0x32` | `device_read`     |
//! | `device`   | `0x33` | `device_write`    |
//! | `protocol` | `0x40` | `resp_init`       |
//! | `protocol` | `0x41` | `opt_finish`      |
//! | `protocol` | `0x42` | `add_format`      |
//! | `protocol` | `0x43` | `get_payload`     |
//! | `format`   | `0x50` | `fmt_s16_dfp`     |
//! | `format`   | `0x51` | `fmt_u32_dec`     |
//! | `timer`    | `0x60` | `now_us`          |
//! | `timer`    | `0x61` | `periodic_wakeup` |
//!
//! Ids `0x10..=0x13` are reserved for a key/value store and never resolve.
//!
//! Host calls report recoverable failures (no device, buffer full) to the guest as negative
//! errno results. They fault only when the guest hands them memory it may not touch or values
//! outside the call's domain.

pub mod common;
#[cfg(feature = "device")]
pub mod device;
#[cfg(feature = "format")]
pub mod format;
#[cfg(feature = "protocol")]
pub mod protocol;
#[cfg(feature = "timer")]
pub mod timer;

/// Encodes a signed status as the raw result of an `I32` call.
#[cfg_attr(
    not(any(feature = "device", feature = "protocol")),
    expect(dead_code, reason = "only used by optional call groups")
)]
pub(crate) const fn status(code: i32) -> u64 {
    code as i64 as u64
}
