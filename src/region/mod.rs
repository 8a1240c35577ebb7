//! Control region: the shared byte buffer an external monitor writes into.
//!
//! The filter only ever reads. Single-byte reads need no synchronisation;
//! a concurrent writer may change a byte between two reads, and the filter
//! acts on whichever value it observed.

mod memory;
#[cfg(unix)]
mod sysv;

pub use memory::InMemoryRegion;
#[cfg(unix)]
pub use sysv::SysvRegion;

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::error::ConfigError;

/// Region length used when the configuration omits one.
pub const DEFAULT_LENGTH: u8 = 8;

/// Errors from attaching a shared memory segment.
#[derive(Debug, Error)]
pub enum RegionError {
    /// `shmget` refused the key/length pair.
    #[error("shmget({key}, {length}, 0666|IPC_CREAT) failed: {source}")]
    Get {
        /// Segment key.
        key: i32,
        /// Requested length.
        length: u8,
        /// OS error.
        #[source]
        source: std::io::Error,
    },

    /// `shmat` could not map the segment.
    #[error("shmat({id}, NULL, 0) failed: {source}")]
    Attach {
        /// Segment id returned by `shmget`.
        id: i32,
        /// OS error.
        #[source]
        source: std::io::Error,
    },

    /// Shared memory is not available on this platform.
    #[error("System V shared memory is not supported on this platform")]
    Unsupported,
}

/// Read-only view of the control region.
pub trait ControlRegion: Send + Sync {
    /// Number of addressable bytes.
    fn len(&self) -> usize;

    /// Current byte at `offset`, or `None` past the end.
    fn read(&self, offset: usize) -> Option<u8>;

    /// Whether the region has no bytes. Never true for a validated spec.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every byte, in offset order.
    fn snapshot(&self) -> Vec<u8> {
        (0..self.len()).filter_map(|i| self.read(i)).collect()
    }
}

/// Validated region declaration: a non-negative System V key and a length
/// in 1..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawRegionSpec")]
pub struct RegionSpec {
    key: i32,
    length: u8,
}

impl RegionSpec {
    /// Validate a key and an optional length (default [`DEFAULT_LENGTH`]).
    pub fn new(key: i64, length: Option<i64>) -> Result<Self, ConfigError> {
        let key = i32::try_from(key)
            .ok()
            .filter(|k| *k >= 0)
            .ok_or(ConfigError::InvalidRegionKey(key))?;
        let length = match length {
            None => DEFAULT_LENGTH,
            Some(n) => match u8::try_from(n) {
                Ok(len) if len >= 1 => len,
                _ => return Err(ConfigError::InvalidRegionLength(n)),
            },
        };
        Ok(Self { key, length })
    }

    /// System V key.
    pub fn key(&self) -> i32 {
        self.key
    }

    /// Length in bytes.
    pub fn length(&self) -> u8 {
        self.length
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRegionSpec {
    key: i64,
    length: Option<i64>,
}

impl TryFrom<RawRegionSpec> for RegionSpec {
    type Error = ConfigError;

    fn try_from(raw: RawRegionSpec) -> Result<Self, Self::Error> {
        Self::new(raw.key, raw.length)
    }
}

/// Attach the shared segment described by `spec`.
#[cfg(unix)]
pub fn attach(spec: RegionSpec) -> Result<Arc<dyn ControlRegion>, RegionError> {
    Ok(Arc::new(SysvRegion::attach(spec)?))
}

/// Attach the shared segment described by `spec`.
#[cfg(not(unix))]
pub fn attach(_spec: RegionSpec) -> Result<Arc<dyn ControlRegion>, RegionError> {
    Err(RegionError::Unsupported)
}
