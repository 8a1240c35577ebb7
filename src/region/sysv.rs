//! System V shared memory attachment.
//!
//! The only module allowed to use `unsafe`. The mapping is created with
//! `0666 | IPC_CREAT` so the external writer and the server can start in
//! either order, and stays mapped until the handle is dropped.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use tracing::{debug, info};

use super::{ControlRegion, RegionError, RegionSpec};

/// Attached System V segment.
#[derive(Debug)]
pub struct SysvRegion {
    id: i32,
    base: NonNull<u8>,
    len: usize,
}

// The mapping is read with volatile byte loads only and never written
// through this handle, so sharing it between threads is sound.
unsafe impl Send for SysvRegion {}
unsafe impl Sync for SysvRegion {}

impl SysvRegion {
    /// Create-or-open the segment for `spec` and map it.
    pub fn attach(spec: RegionSpec) -> Result<Self, RegionError> {
        let len = usize::from(spec.length());

        let id = unsafe { libc::shmget(spec.key(), len, 0o666 | libc::IPC_CREAT) };
        if id == -1 {
            return Err(RegionError::Get {
                key: spec.key(),
                length: spec.length(),
                source: std::io::Error::last_os_error(),
            });
        }

        let addr = unsafe { libc::shmat(id, std::ptr::null(), 0) };
        if addr as isize == -1 {
            return Err(RegionError::Attach {
                id,
                source: std::io::Error::last_os_error(),
            });
        }
        let base = NonNull::new(addr.cast::<u8>()).ok_or_else(|| RegionError::Attach {
            id,
            source: std::io::Error::other("shmat returned a null mapping"),
        })?;

        info!(key = spec.key(), length = len, shm_id = id, "control region attached");
        Ok(Self { id, base, len })
    }

    /// Segment id assigned by the kernel.
    pub fn id(&self) -> i32 {
        self.id
    }
}

impl ControlRegion for SysvRegion {
    fn len(&self) -> usize {
        self.len
    }

    fn read(&self, offset: usize) -> Option<u8> {
        if offset >= self.len {
            return None;
        }
        // SAFETY: offset < len, and the mapping lives as long as `self`.
        Some(unsafe { self.base.as_ptr().add(offset).read_volatile() })
    }
}

impl Drop for SysvRegion {
    fn drop(&mut self) {
        let rc = unsafe { libc::shmdt(self.base.as_ptr().cast::<libc::c_void>()) };
        if rc == -1 {
            debug!(shm_id = self.id, error = %std::io::Error::last_os_error(), "shmdt failed");
        }
    }
}
