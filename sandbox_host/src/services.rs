// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host collaborators reachable from host calls.
//!
//! Host calls never touch globals: everything they affect outside guest memory is passed in
//! through [`HostServices`] for the duration of one run.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// Negative-errno values host calls return to the guest.
pub mod errno {
    /// Invalid argument.
    pub const EINVAL: i32 = 22;
    /// No such device.
    pub const ENODEV: i32 = 19;
    /// No space left (response buffer full).
    pub const ENOSPC: i32 = 28;
    /// Operation not supported.
    pub const ENOTSUP: i32 = 95;
}

/// Text sink for the print calls.
pub trait Console {
    /// Appends `s` to the output.
    fn write_str(&mut self, s: &str);

    /// Appends raw guest bytes. Sinks that only hold text see invalid UTF-8 replaced.
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_str(&String::from_utf8_lossy(bytes));
    }
}

/// A console that discards everything.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullConsole;

impl Console for NullConsole {
    fn write_str(&mut self, _s: &str) {}
}

/// A console that keeps everything in memory.
#[derive(Clone, Debug, Default)]
pub struct BufferConsole {
    out: String,
}

impl BufferConsole {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    #[must_use]
    pub fn contents(&self) -> &str {
        &self.out
    }

    /// Takes the buffered output, leaving the buffer empty.
    pub fn take(&mut self) -> String {
        core::mem::take(&mut self.out)
    }
}

impl Console for BufferConsole {
    fn write_str(&mut self, s: &str) {
        self.out.push_str(s);
    }
}

/// Monotonic microsecond clock.
pub trait Clock {
    /// Current time in microseconds since an arbitrary epoch.
    fn now_us(&mut self) -> u64;

    /// Blocks (or simulates blocking) for `us` microseconds.
    fn sleep_us(&mut self, us: u64);

    /// Current time in milliseconds.
    fn now_ms(&mut self) -> u64 {
        self.now_us() / 1000
    }
}

/// A deterministic clock that only moves when told to.
///
/// Every `now_us` reading advances the clock by `step` after it is taken; sleeping advances it
/// by the requested amount.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ManualClock {
    now: u64,
    step: u64,
}

impl ManualClock {
    /// A clock starting at `start` microseconds with no automatic step.
    #[must_use]
    pub const fn new(start: u64) -> Self {
        Self {
            now: start,
            step: 0,
        }
    }

    /// Sets the amount every reading advances the clock by.
    #[must_use]
    pub const fn with_step(mut self, step: u64) -> Self {
        self.step = step;
        self
    }

    /// Moves the clock forward.
    pub fn advance(&mut self, us: u64) {
        self.now = self.now.saturating_add(us);
    }

    /// Current time without advancing.
    #[must_use]
    pub const fn peek(&self) -> u64 {
        self.now
    }
}

impl Clock for ManualClock {
    fn now_us(&mut self) -> u64 {
        let t = self.now;
        self.advance(self.step);
        t
    }

    fn sleep_us(&mut self, us: u64) {
        self.advance(us);
    }
}

/// A sensor/actuator reading as the guest sees it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Phydat {
    /// Up to three values.
    pub val: [i16; 3],
    /// Unit code.
    pub unit: u8,
    /// Decimal exponent applied to every value.
    pub scale: i8,
}

impl Phydat {
    /// Guest layout size: `{ val: [i16; 3], unit: u8, scale: i8 }`.
    pub const SIZE: usize = 8;

    /// Encodes the guest layout (little-endian).
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0_u8; Self::SIZE];
        for (i, v) in self.val.iter().enumerate() {
            out[i * 2..i * 2 + 2].copy_from_slice(&v.to_le_bytes());
        }
        out[6] = self.unit;
        out[7] = self.scale as u8;
        out
    }

    /// Decodes the guest layout.
    #[must_use]
    pub fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        let v = |i: usize| i16::from_le_bytes([bytes[i * 2], bytes[i * 2 + 1]]);
        Self {
            val: [v(0), v(1), v(2)],
            unit: bytes[6],
            scale: bytes[7] as i8,
        }
    }
}

/// Identifies a device inside a [`DeviceRegistry`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeviceId(pub u32);

/// Why a device operation failed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeviceError {
    /// No device behind the id.
    NoDevice,
    /// The device does not support the operation.
    NotSupported,
}

impl DeviceError {
    /// Negative errno reported to the guest.
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::NoDevice => -errno::ENODEV,
            Self::NotSupported => -errno::ENOTSUP,
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDevice => write!(f, "no such device"),
            Self::NotSupported => write!(f, "operation not supported by device"),
        }
    }
}

impl core::error::Error for DeviceError {}

/// Registry of sensors and actuators.
pub trait DeviceRegistry {
    /// The `index`-th registered device.
    fn find_nth(&self, index: usize) -> Option<DeviceId>;

    /// The first device of the given class.
    fn find_type(&self, class: u8) -> Option<DeviceId>;

    /// Reads the device; returns the number of valid dimensions.
    fn read(&mut self, dev: DeviceId) -> Result<(Phydat, u8), DeviceError>;

    /// Writes `data` to the device; returns the number of dimensions consumed.
    fn write(&mut self, dev: DeviceId, data: &Phydat) -> Result<u8, DeviceError>;
}

/// A registry with no devices.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoDevices;

impl DeviceRegistry for NoDevices {
    fn find_nth(&self, _index: usize) -> Option<DeviceId> {
        None
    }

    fn find_type(&self, _class: u8) -> Option<DeviceId> {
        None
    }

    fn read(&mut self, _dev: DeviceId) -> Result<(Phydat, u8), DeviceError> {
        Err(DeviceError::NoDevice)
    }

    fn write(&mut self, _dev: DeviceId, _data: &Phydat) -> Result<u8, DeviceError> {
        Err(DeviceError::NoDevice)
    }
}

/// One entry of a [`StaticDevices`] registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticDevice {
    /// Human readable name.
    pub name: String,
    /// Device class code.
    pub class: u8,
    /// Current value.
    pub value: Phydat,
    /// Number of valid dimensions in `value`.
    pub dims: u8,
    /// Whether writes are accepted.
    pub writable: bool,
}

/// An in-memory device registry.
#[derive(Clone, Debug, Default)]
pub struct StaticDevices {
    devices: Vec<StaticDevice>,
}

impl StaticDevices {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a device and returns its id.
    pub fn push(&mut self, device: StaticDevice) -> DeviceId {
        let id = DeviceId(self.devices.len() as u32);
        self.devices.push(device);
        id
    }

    /// Looks up a device.
    #[must_use]
    pub fn get(&self, id: DeviceId) -> Option<&StaticDevice> {
        self.devices.get(id.0 as usize)
    }
}

impl DeviceRegistry for StaticDevices {
    fn find_nth(&self, index: usize) -> Option<DeviceId> {
        (index < self.devices.len()).then(|| DeviceId(index as u32))
    }

    fn find_type(&self, class: u8) -> Option<DeviceId> {
        self.devices
            .iter()
            .position(|d| d.class == class)
            .map(|i| DeviceId(i as u32))
    }

    fn read(&mut self, dev: DeviceId) -> Result<(Phydat, u8), DeviceError> {
        let d = self.get(dev).ok_or(DeviceError::NoDevice)?;
        Ok((d.value, d.dims))
    }

    fn write(&mut self, dev: DeviceId, data: &Phydat) -> Result<u8, DeviceError> {
        let d = self
            .devices
            .get_mut(dev.0 as usize)
            .ok_or(DeviceError::NoDevice)?;
        if !d.writable {
            return Err(DeviceError::NotSupported);
        }
        d.value = *data;
        Ok(d.dims)
    }
}

/// Progress of the response being built by the protocol calls during one run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseState {
    /// Message id echoed in the response header.
    pub message_id: u16,
    token: Vec<u8>,
    /// Write position in the response buffer, `None` before the header is written.
    pub cursor: Option<usize>,
    /// Number of the last option written, for delta encoding.
    pub last_option: u16,
    /// Offset of the payload once options are finished.
    pub payload_offset: Option<usize>,
}

impl ResponseState {
    /// Longest token a response header can carry.
    pub const MAX_TOKEN: usize = 8;

    /// Response state for a request with the given message id and token.
    ///
    /// Tokens longer than [`ResponseState::MAX_TOKEN`] are truncated.
    #[must_use]
    pub fn new(message_id: u16, token: &[u8]) -> Self {
        Self {
            message_id,
            token: token[..token.len().min(Self::MAX_TOKEN)].to_vec(),
            ..Self::default()
        }
    }

    /// Request token echoed in the response header, at most [`ResponseState::MAX_TOKEN`] bytes.
    #[must_use]
    pub fn token(&self) -> &[u8] {
        &self.token
    }

    /// Forgets everything written so far, keeping message id and token.
    pub fn reset_progress(&mut self) {
        self.cursor = None;
        self.last_option = 0;
        self.payload_offset = None;
    }
}

/// Everything host calls may affect besides guest memory.
pub struct HostServices<'s> {
    /// Output of the print calls.
    pub console: &'s mut dyn Console,
    /// Sensor/actuator registry.
    pub devices: &'s mut dyn DeviceRegistry,
    /// Time source; also used to time the run.
    pub clock: &'s mut dyn Clock,
    /// Response under construction.
    pub response: ResponseState,
}

impl<'s> HostServices<'s> {
    /// Bundles collaborators with an empty response state.
    pub fn new(
        console: &'s mut dyn Console,
        devices: &'s mut dyn DeviceRegistry,
        clock: &'s mut dyn Clock,
    ) -> Self {
        Self {
            console,
            devices,
            clock,
            response: ResponseState::default(),
        }
    }

    /// Replaces the response state.
    #[must_use]
    pub fn with_response(mut self, response: ResponseState) -> Self {
        self.response = response;
        self
    }
}

impl fmt::Debug for HostServices<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostServices")
            .field("response", &self.response)
            .finish_non_exhaustive()
    }
}
