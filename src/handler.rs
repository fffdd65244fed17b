//! Signal handler registration and the handler itself.
//!
//! Functions called from the handler, per
//! <https://man7.org/linux/man-pages/man7/signal-safety.7.html>:
//! - abort
//! - close, open, write
//! - signal
//! - uname
//!
//! `dladdr` isn't on the list but only reads loader state. Demangling
//! allocates; that is the one exception we accept.

use core::ptr;
use core::sync::atomic::Ordering::SeqCst;
use core::sync::atomic::{AtomicBool, AtomicPtr};
use std::io;

use libc::c_int;

use crate::arch;
use crate::config::{self, CrashLogConfig};
use crate::crashlog::{error_message, CrashReporter, FaultContext};
use crate::error::CrashLogError;
use crate::host::CrashHost;
use crate::signal::SIGNALS_TO_HANDLE;
use crate::stdext;

struct Registration {
    host: Box<dyn CrashHost>,
    config: CrashLogConfig,
}

// Published with a single atomic store so the handler never observes a half
// written registration. Only ever set from `Box::into_raw` and never freed.
static REGISTRATION: AtomicPtr<Registration> = AtomicPtr::new(ptr::null_mut());
static ALT_STACK_CREATED: AtomicBool = AtomicBool::new(false);

/// Stack the handler runs on when `create_alt_stack` is set. It has to hold the
/// report buffer plus whatever the host's writers need.
const ALT_STACK_SIZE: usize = 256 * 1024;

/// Installs the crash handler for every signal in [`SIGNALS_TO_HANDLE`].
///
/// Call once at startup. Calling it again replaces the host and configuration
/// and reinstalls the handlers. Setting `CRASHLOG_DISABLE=1` skips
/// installation entirely.
pub fn initialise_crash_log(
    host: impl CrashHost + 'static,
    config: CrashLogConfig,
) -> Result<(), CrashLogError> {
    if config::disabled_by_env() {
        info!("{} is set, not installing crash handlers", config::DISABLE_ENV_VAR);
        return Ok(());
    }

    if config.create_alt_stack() && !ALT_STACK_CREATED.swap(true, SeqCst) {
        // SAFETY: Only reached once per process.
        unsafe { create_alt_stack() }.inspect_err(|_| ALT_STACK_CREATED.store(false, SeqCst))?;
    }
    let on_alt_stack = config.create_alt_stack();

    let registration = Box::into_raw(Box::new(Registration {
        host: Box::new(host),
        config,
    }));
    let previous = REGISTRATION.swap(registration, SeqCst);
    if !previous.is_null() {
        // Leaked on purpose, a crash on another thread may still be using it.
        debug!("replaced previous crash log registration");
    }

    for signum in SIGNALS_TO_HANDLE {
        // SAFETY: `handle_crash` only reads the registration published above.
        unsafe { install_handler(signum, on_alt_stack) }
            .map_err(|source| CrashLogError::InstallHandler { signum, source })?;
    }

    info!(signals = ?SIGNALS_TO_HANDLE, on_alt_stack, "crash handlers installed");
    Ok(())
}

/// Per-thread setup hook. Nothing is needed on Unix: signal dispositions are
/// process wide.
pub fn init_thread() {}

unsafe fn install_handler(signum: c_int, on_alt_stack: bool) -> io::Result<()> {
    let mut action: libc::sigaction = core::mem::zeroed();
    action.sa_sigaction = handle_crash as extern "C" fn(c_int) as libc::sighandler_t;
    // A fault while reporting must go to the default action right away, not
    // wait until we return.
    action.sa_flags = libc::SA_NODEFER | if on_alt_stack { libc::SA_ONSTACK } else { 0 };
    libc::sigemptyset(&mut action.sa_mask);

    if libc::sigaction(signum, &action, ptr::null_mut()) != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Puts every handled signal back to its default action.
fn disarm() {
    for signum in SIGNALS_TO_HANDLE {
        // SAFETY: Resetting to SIG_DFL has no preconditions.
        unsafe { libc::signal(signum, libc::SIG_DFL) };
    }
}

/// Allocates a signal altstack, and puts a guard page at the end.
/// Inspired by https://github.com/rust-lang/rust/pull/69969/files
unsafe fn create_alt_stack() -> Result<(), CrashLogError> {
    let page_size = page_size::get();
    let size = libc::SIGSTKSZ.max(ALT_STACK_SIZE).next_multiple_of(page_size);

    let stackp = libc::mmap(
        ptr::null_mut(),
        size + page_size,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANON,
        -1,
        0,
    );
    if stackp == libc::MAP_FAILED {
        return Err(CrashLogError::AltStack(io::Error::last_os_error()));
    }
    if libc::mprotect(stackp, page_size, libc::PROT_NONE) != 0 {
        return Err(CrashLogError::AltStack(io::Error::last_os_error()));
    }

    let stack = libc::stack_t {
        ss_sp: stackp.add(page_size),
        ss_flags: 0,
        ss_size: size,
    };
    if libc::sigaltstack(&stack, ptr::null_mut()) != 0 {
        return Err(CrashLogError::AltStack(io::Error::last_os_error()));
    }

    debug!(size, "alternate signal stack installed");
    Ok(())
}

/// Entry point for a crash. Never inlined, so it heads the stack trace it
/// prints.
#[inline(never)]
extern "C" fn handle_crash(signum: c_int) {
    disarm();

    let registration = REGISTRATION.load(SeqCst);
    // SAFETY: Set from `Box::into_raw` and never freed.
    let Some(Registration { host, config }) = (unsafe { registration.as_ref() }) else {
        stdext::abort();
    };

    let fault = FaultContext {
        signum,
        message: error_message(),
    };
    // SAFETY: This crate is built with frame pointers, and the chain is
    // validated link by link from here on.
    let mut reporter =
        unsafe { CrashReporter::new(fault, &**host, config).with_stack(arch::get_frame_pointer()) };
    reporter.run();
    reporter.terminate()
}
