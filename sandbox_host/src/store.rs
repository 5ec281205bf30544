// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Firmware image store.
//!
//! Bytecode images are looked up by a location string. [`RamStore`] keeps images in memory
//! under `.ram.N` locations; other backends implement [`FirmwareStore`].

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// Default per-image capacity of a [`RamStore`] slot.
pub const DEFAULT_IMAGE_CAPACITY: usize = 2048;

/// Read access to stored bytecode images.
pub trait FirmwareStore {
    /// Returns the image stored at `location`.
    fn find(&self, location: &str) -> Option<&[u8]>;
}

/// The location name of RAM slot `index`.
#[must_use]
pub fn ram_location(index: usize) -> String {
    format!(".ram.{index}")
}

/// Errors when installing an image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// The image exceeds the slot capacity.
    TooLarge {
        /// Image length.
        len: usize,
        /// Slot capacity.
        capacity: usize,
    },
    /// The location is not a `.ram.N` name.
    UnknownLocation,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLarge { len, capacity } => {
                write!(f, "image of {len} bytes exceeds slot capacity {capacity}")
            }
            Self::UnknownLocation => write!(f, "not a RAM slot location"),
        }
    }
}

impl core::error::Error for StoreError {}

/// In-memory store with `.ram.N` slots.
#[derive(Clone, Debug)]
pub struct RamStore {
    capacity: usize,
    images: BTreeMap<String, Vec<u8>>,
}

impl Default for RamStore {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_CAPACITY)
    }
}

impl RamStore {
    /// An empty store whose slots hold at most `capacity` bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            images: BTreeMap::new(),
        }
    }

    /// Per-slot capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stores `image` at `location`, replacing any previous image.
    pub fn install(&mut self, location: &str, image: &[u8]) -> Result<(), StoreError> {
        let index = location
            .strip_prefix(".ram.")
            .ok_or(StoreError::UnknownLocation)?;
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return Err(StoreError::UnknownLocation);
        }
        if image.len() > self.capacity {
            return Err(StoreError::TooLarge {
                len: image.len(),
                capacity: self.capacity,
            });
        }
        self.images.insert(location.into(), image.to_vec());
        tracing::debug!(location, bytes = image.len(), "installed image");
        Ok(())
    }

    /// Removes the image at `location`, returning it.
    pub fn remove(&mut self, location: &str) -> Option<Vec<u8>> {
        self.images.remove(location)
    }

    /// Occupied locations in order.
    pub fn locations(&self) -> impl Iterator<Item = &str> {
        self.images.keys().map(String::as_str)
    }
}

impl FirmwareStore for RamStore {
    fn find(&self, location: &str) -> Option<&[u8]> {
        self.images.get(location).map(Vec::as_slice)
    }
}

/// Errors when copying an image out of a store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadError {
    /// Nothing is stored at the location.
    StorageNotFound {
        /// Requested location.
        location: String,
    },
    /// The destination buffer is shorter than the image.
    DestinationTooSmall {
        /// Image length.
        needed: usize,
        /// Destination length.
        available: usize,
    },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StorageNotFound { location } => write!(f, "no image at {location:?}"),
            Self::DestinationTooSmall { needed, available } => {
                write!(f, "image needs {needed} bytes, destination has {available}")
            }
        }
    }
}

impl core::error::Error for LoadError {}

/// Copies the image at `location` into the front of `dest` and returns its length.
pub fn load_bytecode(
    store: &dyn FirmwareStore,
    dest: &mut [u8],
    location: &str,
) -> Result<usize, LoadError> {
    let Some(image) = store.find(location) else {
        tracing::debug!(location, "no image at location");
        return Err(LoadError::StorageNotFound {
            location: location.into(),
        });
    };
    let available = dest.len();
    let target = dest
        .get_mut(..image.len())
        .ok_or(LoadError::DestinationTooSmall {
            needed: image.len(),
            available,
        })?;
    target.copy_from_slice(image);
    Ok(image.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_and_load() {
        let mut store = RamStore::default();
        store.install(&ram_location(0), &[1, 2, 3]).unwrap();
        let mut dest = [0_u8; 8];
        assert_eq!(load_bytecode(&store, &mut dest, ".ram.0"), Ok(3));
        assert_eq!(&dest[..4], &[1, 2, 3, 0]);
        assert_eq!(store.locations().collect::<Vec<_>>(), [".ram.0"]);
    }

    #[test]
    fn load_errors() {
        let mut store = RamStore::new(4);
        store.install(".ram.1", &[9; 4]).unwrap();
        let mut dest = [0_u8; 2];
        assert_eq!(
            load_bytecode(&store, &mut dest, ".ram.2"),
            Err(LoadError::StorageNotFound {
                location: ".ram.2".into(),
            })
        );
        assert_eq!(
            load_bytecode(&store, &mut dest, ".ram.1"),
            Err(LoadError::DestinationTooSmall {
                needed: 4,
                available: 2,
            })
        );
        assert_eq!(dest, [0, 0]);
    }

    #[test]
    fn install_rejects_bad_slots() {
        let mut store = RamStore::new(4);
        assert_eq!(
            store.install(".ram.0", &[0; 5]),
            Err(StoreError::TooLarge {
                len: 5,
                capacity: 4,
            })
        );
        assert_eq!(
            store.install("/flash/app", &[0]),
            Err(StoreError::UnknownLocation)
        );
        assert_eq!(store.install(".ram.", &[0]), Err(StoreError::UnknownLocation));
        assert!(store.remove(".ram.0").is_none());
    }
}
