use std::sync::atomic::{AtomicU8, Ordering};

use super::ControlRegion;

/// Process-local control region backed by atomics.
///
/// Stands in for the shared segment in tests and simulations; `store`
/// plays the part of the external monitor.
#[derive(Debug)]
pub struct InMemoryRegion {
    bytes: Box<[AtomicU8]>,
}

impl InMemoryRegion {
    /// Zero-filled region of `len` bytes.
    pub fn new(len: usize) -> Self {
        Self {
            bytes: (0..len).map(|_| AtomicU8::new(0)).collect(),
        }
    }

    /// Region initialised from `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.iter().map(|b| AtomicU8::new(*b)).collect(),
        }
    }

    /// Write `value` at `offset`. Returns `false` past the end.
    pub fn store(&self, offset: usize, value: u8) -> bool {
        match self.bytes.get(offset) {
            Some(cell) => {
                cell.store(value, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }
}

impl ControlRegion for InMemoryRegion {
    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn read(&self, offset: usize) -> Option<u8> {
        self.bytes.get(offset).map(|cell| cell.load(Ordering::Relaxed))
    }
}
