//! The shared region: run-control flags and the bounded edge buffer, laid
//! out `#[repr(C)]` in POSIX shared memory.
//!
//! The supervisor calls [`SharedRegion::create`] once and
//! [`SharedRegion::destroy`] once; generators only [`SharedRegion::open`].

use std::ffi::CString;
use std::io;
use std::mem::size_of;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd};
use std::ptr::{self, NonNull};
use std::sync::atomic::{fence, AtomicU32, AtomicU64, Ordering};

use crate::buffer::{BoundedBuffer, WritersGuard};
use crate::error::{Error, Result};

// Published last by `init`; `open` refuses a region without it.
const MAGIC: u32 = 0x4152_4353; // "ARCS"

/// Flags every process can see.
///
/// Single writer role per field:
///   active          supervisor only
///   solution_count  producers only, inside the writers critical section
#[repr(C)]
pub struct RunControl {
    active: AtomicU32,
    solution_count: AtomicU64,
}

impl RunControl {
    fn init(&self) {
        self.active.store(0, Ordering::Relaxed);
        self.solution_count.store(0, Ordering::Relaxed);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire) != 0
    }

    /// Supervisor only.
    pub fn set_active(&self, active: bool) {
        self.active.store(active as u32, Ordering::Release);
    }

    pub fn solution_count(&self) -> u64 {
        self.solution_count.load(Ordering::Acquire)
    }

    // Plain load+store: the writers mutex excludes every other incrementer.
    pub(crate) fn record_solution(&self, _guard: &WritersGuard<'_>) {
        let n = self.solution_count.load(Ordering::Relaxed);
        self.solution_count.store(n + 1, Ordering::Release);
    }
}

#[repr(C)]
pub struct Shared {
    magic: AtomicU32,
    pub(crate) control: RunControl,
    pub(crate) buffer: BoundedBuffer,
}

impl Shared {
    fn init(&self) {
        self.control.init();
        self.buffer.init();

        // Make init visible before the magic becomes valid.
        fence(Ordering::Release);
        self.magic.store(MAGIC, Ordering::Relaxed);
    }

    fn is_published(&self) -> bool {
        let ok = self.magic.load(Ordering::Relaxed) == MAGIC;
        fence(Ordering::Acquire);
        ok
    }
}

enum Backing {
    Anonymous,
    Named { name: CString, owner: bool, unlinked: bool },
}

/// A mapping of the shared region into this process.
pub struct SharedRegion {
    ptr: NonNull<Shared>,
    backing: Backing,
}

// Everything reachable through `ptr` is atomics.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

/// Add the leading '/' POSIX names need.
fn shm_name(name: &str) -> Result<CString> {
    let name = if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{}", name)
    };
    CString::new(name).map_err(|e| {
        Error::backing_store("open", io::Error::new(io::ErrorKind::InvalidInput, e))
    })
}

unsafe fn map(fd: libc::c_int, flags: libc::c_int) -> io::Result<NonNull<Shared>> {
    let p = libc::mmap(
        ptr::null_mut(),
        size_of::<Shared>(),
        libc::PROT_READ | libc::PROT_WRITE,
        flags,
        fd,
        0,
    );
    if p == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    Ok(NonNull::new_unchecked(p as *mut Shared))
}

impl SharedRegion {
    /// Create, size, map and initialise a fresh named region. A stale
    /// region of the same name is removed first.
    pub fn create(name: &str) -> Result<Self> {
        let c_name = shm_name(name)?;

        unsafe {
            libc::shm_unlink(c_name.as_ptr());
        }

        let fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o600,
            )
        };
        if fd < 0 {
            return Err(Error::backing_store("open", io::Error::last_os_error()));
        }
        // SAFETY: shm_open succeeded, we own fd
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        // From here on a failure must not leave the name behind.
        let unlink_on_err = |op, err| {
            unsafe {
                libc::shm_unlink(c_name.as_ptr());
            }
            Error::backing_store(op, err)
        };

        if unsafe { libc::ftruncate(fd.as_raw_fd(), size_of::<Shared>() as libc::off_t) } != 0 {
            return Err(unlink_on_err("truncate", io::Error::last_os_error()));
        }
        let ptr = unsafe { map(fd.as_raw_fd(), libc::MAP_SHARED) }
            .map_err(|e| unlink_on_err("map", e))?;

        let region = SharedRegion {
            ptr,
            backing: Backing::Named {
                name: c_name,
                owner: true,
                unlinked: false,
            },
        };
        region.shared().init();
        tracing::debug!(name, size = size_of::<Shared>(), "shared region created");
        Ok(region)
    }

    /// Map a region that the supervisor already created.
    pub fn open(name: &str) -> Result<Self> {
        let c_name = shm_name(name)?;

        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0o600) };
        if fd < 0 {
            return Err(Error::backing_store("open", io::Error::last_os_error()));
        }
        // SAFETY: shm_open succeeded, we own fd
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(fd.as_raw_fd(), &mut st) } != 0 {
            return Err(Error::backing_store("stat", io::Error::last_os_error()));
        }
        if (st.st_size as usize) < size_of::<Shared>() {
            return Err(Error::backing_store(
                "open",
                io::Error::new(io::ErrorKind::InvalidData, "region is too small"),
            ));
        }

        let ptr = unsafe { map(fd.as_raw_fd(), libc::MAP_SHARED) }
            .map_err(|e| Error::backing_store("map", e))?;
        let region = SharedRegion {
            ptr,
            backing: Backing::Named {
                name: c_name,
                owner: false,
                unlinked: false,
            },
        };

        if !region.shared().is_published() {
            return Err(Error::backing_store(
                "open",
                io::Error::new(io::ErrorKind::InvalidData, "region not initialised"),
            ));
        }
        Ok(region)
    }

    /// An initialised region with no name, shared with threads and with
    /// children forked after this call.
    pub fn anonymous() -> Result<Self> {
        let ptr = unsafe { map(-1, libc::MAP_SHARED | libc::MAP_ANONYMOUS) }
            .map_err(|e| Error::backing_store("map", e))?;
        let region = SharedRegion {
            ptr,
            backing: Backing::Anonymous,
        };
        region.shared().init();
        Ok(region)
    }

    /// Remove the backing name. Only the creator does anything; calling it
    /// again is a no-op. The mapping itself goes away on drop.
    pub fn destroy(&mut self) -> Result<()> {
        match &mut self.backing {
            Backing::Named {
                name,
                owner: true,
                unlinked,
            } if !*unlinked => {
                *unlinked = true;
                if unsafe { libc::shm_unlink(name.as_ptr()) } != 0 {
                    return Err(Error::backing_store("unlink", io::Error::last_os_error()));
                }
                tracing::debug!("shared region unlinked");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn unlink(&mut self) {
        if let Err(e) = self.destroy() {
            tracing::warn!("{}", e);
        }
    }

    pub fn shared(&self) -> &Shared {
        // SAFETY: ptr is a live mapping of size_of::<Shared>() for as long as self
        unsafe { self.ptr.as_ref() }
    }

    pub fn control(&self) -> &RunControl {
        &self.shared().control
    }

    pub fn buffer(&self) -> &BoundedBuffer {
        &self.shared().buffer
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        self.unlink();
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, size_of::<Shared>());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("/arcset_test_{}_{}", tag, std::process::id())
    }

    #[test]
    fn test_anonymous_region_is_initialised() {
        let region = SharedRegion::anonymous().unwrap();
        assert!(region.shared().is_published());
        assert!(!region.control().is_active());
        assert_eq!(region.control().solution_count(), 0);
        assert_eq!(region.buffer().unread(), 0);
    }

    #[test]
    fn test_create_open_destroy() {
        let name = unique_name("lifecycle");
        let mut owner = SharedRegion::create(&name).unwrap();
        owner.control().set_active(true);

        let peer = SharedRegion::open(&name).unwrap();
        assert!(peer.control().is_active());

        owner.destroy().unwrap();
        owner.destroy().unwrap();
        assert!(matches!(
            SharedRegion::open(&name),
            Err(Error::BackingStore { .. })
        ));

        // The existing mapping outlives the name.
        owner.control().set_active(false);
        assert!(!peer.control().is_active());
    }

    #[test]
    fn test_open_missing_region() {
        let err = SharedRegion::open(&unique_name("missing")).err().unwrap();
        assert_eq!(err.os_code(), Some(libc::ENOENT));
    }

    #[test]
    fn test_create_replaces_stale_region() {
        let name = unique_name("stale");
        let first = SharedRegion::create(&name).unwrap();
        first.control().set_active(true);
        std::mem::forget(first);

        let second = SharedRegion::create(&name).unwrap();
        assert!(!second.control().is_active());
    }

    #[test]
    fn test_name_gets_leading_slash() {
        assert_eq!(shm_name("abc").unwrap().as_bytes(), b"/abc");
        assert_eq!(shm_name("/abc").unwrap().as_bytes(), b"/abc");
    }
}
