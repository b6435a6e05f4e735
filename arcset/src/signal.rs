//! SIGINT/SIGTERM as a polled cancellation flag.
//!
//! The handler is installed without `SA_RESTART`, so a process sleeping in a
//! futex wait gets `EINTR` back and sees `SyncError::Interrupted`. Loops then
//! check [`requested`] at their top.
//!
//! `EINTR` alone misses a signal that lands just before the wait starts. A
//! reader that must not sleep through one registers its gate with
//! [`WakeOnSignal`]; the handler then flags and wakes that gate too.

use std::io;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::time::Duration;

use crate::gate::Gate;

static REQUESTED: AtomicBool = AtomicBool::new(false);
static INSTALLED: AtomicBool = AtomicBool::new(false);
static WAKE_GATE: AtomicPtr<Gate> = AtomicPtr::new(ptr::null_mut());

extern "C" fn on_signal(_sig: libc::c_int) {
    REQUESTED.store(true, Ordering::SeqCst);
    wake_registered();
}

fn wake_registered() {
    let gate = WAKE_GATE.load(Ordering::SeqCst);
    // Non-null only while a WakeOnSignal borrows a live gate.
    if let Some(gate) = unsafe { gate.as_ref() } {
        gate.interrupt();
    }
}

/// Route SIGINT and SIGTERM to the flag.
pub fn install() -> io::Result<()> {
    for sig in [libc::SIGINT, libc::SIGTERM] {
        unsafe {
            let mut sa: libc::sigaction = std::mem::zeroed();
            sa.sa_sigaction = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
            sa.sa_flags = 0;
            libc::sigemptyset(&mut sa.sa_mask);
            if libc::sigaction(sig, &sa, std::ptr::null_mut()) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
    }
    INSTALLED.store(true, Ordering::SeqCst);
    Ok(())
}

/// Whether [`install`] has run in this process.
pub fn installed() -> bool {
    INSTALLED.load(Ordering::SeqCst)
}

/// Whether an interrupt has arrived.
pub fn requested() -> bool {
    REQUESTED.load(Ordering::SeqCst)
}

/// Sleep for `delay`, returning early if a signal arrives. Returns false if
/// the sleep was cut short.
pub fn sleep(delay: Duration) -> bool {
    let ts = libc::timespec {
        tv_sec: delay.as_secs() as libc::time_t,
        tv_nsec: delay.subsec_nanos() as libc::c_long,
    };
    let ret = unsafe { libc::nanosleep(&ts, std::ptr::null_mut()) };
    ret == 0
}

/// Keeps a gate registered for wake-up by the signal handler. One gate per
/// process; unregistered on drop, before the mapping can go away.
pub struct WakeOnSignal<'a> {
    _gate: PhantomData<&'a Gate>,
}

impl<'a> WakeOnSignal<'a> {
    pub(crate) fn register(gate: &'a Gate) -> Self {
        WAKE_GATE.store(gate as *const Gate as *mut Gate, Ordering::SeqCst);
        // A signal that arrived before registration found nothing to wake.
        if requested() {
            gate.interrupt();
        }
        Self { _gate: PhantomData }
    }
}

impl Drop for WakeOnSignal<'_> {
    fn drop(&mut self) {
        WAKE_GATE.store(ptr::null_mut(), Ordering::SeqCst);
    }
}
