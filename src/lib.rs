//! Crash reports from inside a fatal signal handler.
//!
//! [`initialise_crash_log`] installs handlers for the fatal signals in
//! [`SIGNALS_TO_HANDLE`]. When one arrives the handler writes a report with the
//! operating system, the signal, and a stack trace built by walking frame
//! pointers and asking the dynamic loader for symbol names. The report is
//! assembled in a fixed buffer on the handler's stack, printed to stdout, and
//! passed to the host's [`ArtifactWriter`] together with a savegame and
//! screenshot request. The process then aborts.
//!
//! Stack traces need frame pointers in every frame they pass through. Code
//! built without them ends the trace early or not at all.

#[macro_use]
extern crate tracing;

use core::ffi;

mod stdext;

mod arch;
mod config;
pub mod crashlog;
pub mod demangle;
mod error;
mod handler;
pub mod host;
pub mod identify;
pub mod report;
mod signal;
pub mod walk;

pub use arch::FrameLayout;
pub use config::{CrashLogConfig, DISABLE_ENV_VAR};
pub use crashlog::{set_error_message, CrashReporter, CrashState, FaultContext, GeneratedArtifacts};
pub use error::CrashLogError;
pub use handler::{init_thread, initialise_crash_log};
pub use host::{
    ArtifactPath, ArtifactWriter, CrashHost, DefaultHost, DialogPresenter, Environment, OsInfo,
    OsVersion, Preconditions,
};
pub use report::ReportWriter;
pub use signal::{signal_name, SIGNALS_TO_HANDLE};
pub use walk::fp::{FrameWalker, MAX_STACK_FRAMES};

/// A code address, usually a return address found on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addr(*const ());

impl Addr {
    /// The zero address, which ends a frame chain.
    pub const NULL: Addr = Addr(core::ptr::null());

    /// Wraps a raw address read off the stack or handed out by the loader.
    pub fn from_usize(addr: usize) -> Self {
        Addr(core::ptr::with_exposed_provenance(addr))
    }

    /// The address as the `void *` libc functions like `dladdr` take.
    pub fn voidptr(self) -> *const ffi::c_void {
        self.0.cast()
    }

    /// The numeric address, for printing and offset arithmetic.
    pub fn addr(self) -> usize {
        self.0.addr()
    }

    /// Whether this is [`Addr::NULL`].
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}
