//! Process-shared counting gate built on a futex word.
//!
//! A `Gate` lives inside the shared region. Every process that maps the
//! region operates on the same count word, so the futex calls use the
//! shared (non-private) variants.
//!
//! Count word layout:
//!   bits 0..30  available permits
//!   bit  30     interrupted flag
//!   bit  31     closed flag
//!
//! `acquire` sleeps in `FUTEX_WAIT` while the word is exactly 0. `close`
//! sets the high bit, which changes the word and makes every sleeper (and
//! every later caller) return `SyncError::Closed`. `interrupt` does the same
//! with the interrupted bit and is safe to call from a signal handler.

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::signal;

const CLOSED: u32 = 1 << 31;
const INTERRUPTED: u32 = 1 << 30;
const PERMITS: u32 = INTERRUPTED - 1;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A blocking wait was cut short by a signal.
    #[error("wait interrupted by signal")]
    Interrupted,
    /// The gate was closed while (or before) waiting.
    #[error("gate closed")]
    Closed,
    #[error("futex {op} failed: {source}")]
    Primitive {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

unsafe fn futex_wait(addr: *const AtomicU32, expected: u32) -> i64 {
    libc::syscall(
        libc::SYS_futex,
        addr,
        libc::FUTEX_WAIT,
        expected,
        std::ptr::null::<libc::timespec>(), // no timeout
        std::ptr::null::<u32>(),
        0,
    ) as i64
}

unsafe fn futex_wake(addr: *const AtomicU32, num_to_wake: i32) -> i64 {
    libc::syscall(
        libc::SYS_futex,
        addr,
        libc::FUTEX_WAKE,
        num_to_wake,
        std::ptr::null::<libc::timespec>(),
        std::ptr::null::<u32>(),
        0,
    ) as i64
}

#[repr(C)]
pub struct Gate {
    word: AtomicU32,
    sleepers: AtomicU32,
}

impl Gate {
    /// Reset to `permits` available, open, nobody sleeping.
    /// Only valid before any other process uses the gate.
    pub(crate) fn init(&self, permits: u32) {
        debug_assert!(permits <= PERMITS);
        self.sleepers.store(0, Ordering::Relaxed);
        self.word.store(permits, Ordering::Release);
    }

    /// Take one permit, blocking while none is available.
    pub fn acquire(&self) -> Result<(), SyncError> {
        loop {
            let w = self.word.load(Ordering::Acquire);
            if w & CLOSED != 0 {
                return Err(SyncError::Closed);
            }
            if w & INTERRUPTED != 0 {
                return Err(SyncError::Interrupted);
            }
            if w & PERMITS > 0 {
                if self
                    .word
                    .compare_exchange_weak(w, w - 1, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
                {
                    return Ok(());
                }
                continue;
            }

            if signal::requested() {
                return Err(SyncError::Interrupted);
            }
            self.sleepers.fetch_add(1, Ordering::SeqCst);
            let ret = unsafe { futex_wait(&self.word, 0) };
            let err = (ret < 0).then(io::Error::last_os_error);
            self.sleepers.fetch_sub(1, Ordering::SeqCst);

            if let Some(err) = err {
                match err.raw_os_error() {
                    // Word was no longer 0 when the kernel looked; retry.
                    Some(libc::EAGAIN) => {}
                    Some(libc::EINTR) => return Err(SyncError::Interrupted),
                    _ => {
                        return Err(SyncError::Primitive {
                            op: "wait",
                            source: err,
                        })
                    }
                }
            }
        }
    }

    /// Return one permit and wake a sleeper if there is one.
    pub fn release(&self) -> Result<(), SyncError> {
        self.word.fetch_add(1, Ordering::SeqCst);
        if self.sleepers.load(Ordering::SeqCst) > 0 {
            self.wake(1)?;
        }
        Ok(())
    }

    /// Close the gate and wake everybody sleeping on it.
    pub fn close(&self) -> Result<(), SyncError> {
        self.word.fetch_or(CLOSED, Ordering::SeqCst);
        self.wake(i32::MAX)
    }

    /// Fail every present and future wait with `SyncError::Interrupted`.
    /// Only atomics and a raw syscall, so callable from a signal handler.
    pub(crate) fn interrupt(&self) {
        self.word.fetch_or(INTERRUPTED, Ordering::SeqCst);
        unsafe {
            futex_wake(&self.word, i32::MAX);
        }
    }

    /// Permits currently available.
    pub(crate) fn value(&self) -> u32 {
        self.word.load(Ordering::Acquire) & PERMITS
    }

    fn wake(&self, n: i32) -> Result<(), SyncError> {
        let ret = unsafe { futex_wake(&self.word, n) };
        if ret < 0 {
            return Err(SyncError::Primitive {
                op: "wake",
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}
