//! The crash report state machine.
//!
//! ```text
//! Armed -> Triggered -> Suppressed -> Terminated
//!                    \-> Reporting  -> Terminated
//! ```
//!
//! `Armed` is the state after [`initialise_crash_log`](crate::initialise_crash_log).
//! The signal handler builds a [`CrashReporter`] in `Triggered`, [`CrashReporter::run`]
//! moves it to `Suppressed` or `Reporting`, and [`CrashReporter::terminate`]
//! never returns.

use core::fmt::{self, Write};
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering::SeqCst};

use libc::c_int;

use crate::config::CrashLogConfig;
use crate::error::CrashLogError;
use crate::host::{ArtifactPath, CrashHost};
use crate::identify::Dladdr;
use crate::report::{self, ReportWriter, REPORT_CAPACITY};
use crate::stdext::{self, console};
use crate::walk::FrameWalker;

/// Title of every crash dialog.
pub const CRASH_TITLE: &str = "A serious fault condition occurred. The program will shut down.";

/// Label of the only dialog button.
pub const CRASH_BUTTON: &str = "Quit";

pub const EMERGENCY_SAVE_NOTICE: &str =
    "As you loaded an emergency savegame no crash information will be generated.\n";

pub const MISSING_CONTENT_NOTICE: &str = "As you loaded a savegame for which you do not have the \
     required content no crash information will be generated.\n";

const DIALOG_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashState {
    /// Handlers are installed and nothing has happened yet.
    Armed,
    /// A handled signal arrived.
    Triggered,
    /// A precondition ruled out a useful report.
    Suppressed,
    /// The report was generated and handed to the writers.
    Reporting,
    /// Cleanup ran and the process is aborting.
    Terminated,
}

/// The fault being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultContext<'a> {
    pub signum: c_int,
    pub message: Option<&'a str>,
}

/// Paths of the files written for this crash. Empty if the writer failed or
/// never ran.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GeneratedArtifacts {
    pub crash_log: ArtifactPath,
    pub savegame: ArtifactPath,
    pub screenshot: ArtifactPath,
}

pub struct CrashReporter<'a> {
    fault: FaultContext<'a>,
    host: &'a dyn CrashHost,
    config: &'a CrashLogConfig,
    frame: *const usize,
    artifacts: GeneratedArtifacts,
    state: CrashState,
}

impl<'a> CrashReporter<'a> {
    /// A reporter without a stack to walk; its stack trace section is empty.
    pub fn new(fault: FaultContext<'a>, host: &'a dyn CrashHost, config: &'a CrashLogConfig) -> Self {
        Self {
            fault,
            host,
            config,
            frame: ptr::null(),
            artifacts: GeneratedArtifacts::default(),
            state: CrashState::Triggered,
        }
    }

    /// Walks the frame pointer chain starting at `frame` for the stack trace.
    ///
    /// # Safety
    /// Same contract as [`FrameWalker::new`].
    pub unsafe fn with_stack(mut self, frame: *const usize) -> Self {
        self.frame = frame;
        self
    }

    pub fn state(&self) -> CrashState {
        self.state
    }

    pub fn fault(&self) -> FaultContext<'a> {
        self.fault
    }

    pub fn artifacts(&self) -> &GeneratedArtifacts {
        &self.artifacts
    }

    /// Produces the report, or the short notice if a precondition suppresses it.
    ///
    /// Returns whether a full report was generated and every writer succeeded.
    pub fn run(&mut self) -> bool {
        if let Some(notice) = self.suppression_notice() {
            self.state = CrashState::Suppressed;
            self.host.show_dialog(CRASH_TITLE, notice, CRASH_BUTTON);
            return false;
        }

        self.state = CrashState::Reporting;
        let mut buffer = [0u8; REPORT_CAPACITY];
        let ok = self.make_crash_log(&mut buffer);

        if self.host.gui_active() != Some(false) {
            self.display_crash_dialog();
        }
        ok
    }

    fn suppression_notice(&self) -> Option<&'static str> {
        if self.host.emergency_save_loaded() {
            Some(EMERGENCY_SAVE_NOTICE)
        } else if self.host.save_missing_content() {
            Some(MISSING_CONTENT_NOTICE)
        } else {
            None
        }
    }

    /// Writes the environment, fault and stack trace sections.
    pub fn fill_crash_log(&self, w: &mut ReportWriter<'_>) -> usize {
        self.host.with_os_info(&mut |os| {
            report::write_os_version(w, os);
        });
        report::write_error(w, self.fault.signum, self.fault.message);

        // SAFETY: `frame` is null or was vouched for in `with_stack`.
        let frames = unsafe { FrameWalker::new(self.frame) };
        report::write_stacktrace(w, frames, &Dladdr, self.config.demangle_names())
    }

    /// Fills `buffer` with the report, echoes it and runs every artifact
    /// writer. A failing writer doesn't stop the others.
    ///
    /// Returns whether all writers succeeded.
    pub fn make_crash_log(&mut self, buffer: &mut [u8]) -> bool {
        self.say(format_args!("Crash encountered, generating crash log...\n"));
        let mut w = ReportWriter::new(buffer);
        self.fill_crash_log(&mut w);
        if self.config.echo_to_console() {
            let _ = stdext::write_stdout(w.as_bytes());
        }
        self.say(format_args!("\nCrash log generated.\n\n"));

        let host = self.host;
        let mut ok = true;

        self.say(format_args!("Writing crash log to disk...\n"));
        if let Err(e) = host.write_crash_log(w.as_bytes(), &mut self.artifacts.crash_log) {
            self.artifacts.crash_log.clear();
            self.say_failure("crash log", &e);
            ok = false;
        }

        self.say(format_args!("Writing crash savegame...\n"));
        if let Err(e) = host.write_savegame(&mut self.artifacts.savegame) {
            self.artifacts.savegame.clear();
            self.say_failure("crash savegame", &e);
            ok = false;
        }

        self.say(format_args!("Writing crash screenshot...\n"));
        if let Err(e) = host.write_screenshot(&mut self.artifacts.screenshot) {
            self.artifacts.screenshot.clear();
            self.say_failure("crash screenshot", &e);
            ok = false;
        }

        ok
    }

    /// Writes the dialog body listing the generated files into `w`.
    pub fn write_dialog_message(&self, w: &mut ReportWriter<'_>) -> usize {
        let _ = w.write_str(
            "Please send the generated crash information and the last (auto)save to the \
             developers. This will greatly help debugging.",
        );
        if let Some(url) = self.config.issue_url() {
            let _ = write!(w, " The correct place to do this is {url}.");
        }
        let _ = write!(
            w,
            "\n\nGenerated file(s):\n{}\n{}\n{}",
            self.artifacts.crash_log.as_str(),
            self.artifacts.savegame.as_str(),
            self.artifacts.screenshot.as_str(),
        );
        w.position()
    }

    pub fn display_crash_dialog(&self) {
        let mut buffer = [0u8; DIALOG_CAPACITY];
        let mut w = ReportWriter::new(&mut buffer);
        self.write_dialog_message(&mut w);
        self.host.show_dialog(CRASH_TITLE, w.as_str(), CRASH_BUTTON);
    }

    /// Aborts the process. After a report the host's cleanup hook runs first;
    /// a suppressed crash aborts straight away.
    pub fn terminate(mut self) -> ! {
        let reported = self.state != CrashState::Suppressed;
        self.state = CrashState::Terminated;
        if reported {
            self.host.after_crash_log_cleanup();
        }
        stdext::abort()
    }

    fn say(&self, args: fmt::Arguments<'_>) {
        if self.config.echo_to_console() {
            console!("{args}");
        }
    }

    // io::Error's Display allocates, so OS errors go through strerror_r.
    fn say_failure(&self, what: &str, e: &CrashLogError) {
        if !self.config.echo_to_console() {
            return;
        }
        match e.io_source() {
            Some(source) => match source.raw_os_error() {
                Some(errno) => stdext::with_os_error_str(errno, |msg| {
                    console!("Writing {what} failed: {msg}\n");
                }),
                None => console!("Writing {what} failed: {}\n", source.kind()),
            },
            None => console!("Writing {what} failed: {e}\n"),
        }
    }
}

impl fmt::Debug for CrashReporter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrashReporter")
            .field("fault", &self.fault)
            .field("frame", &self.frame)
            .field("artifacts", &self.artifacts)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

static ERROR_MESSAGE: AtomicPtr<String> = AtomicPtr::new(ptr::null_mut());

/// Sets the message reported in the `Crash reason:` section of a later crash,
/// e.g. the text of a fatal error right before the program aborts.
pub fn set_error_message(message: impl Into<String>) {
    let message = Box::into_raw(Box::new(message.into()));
    // The previous message is leaked: a crash on another thread may be
    // reading it right now.
    ERROR_MESSAGE.swap(message, SeqCst);
}

pub(crate) fn error_message() -> Option<&'static str> {
    let message = ERROR_MESSAGE.load(SeqCst);
    // SAFETY: Only ever set from `Box::into_raw` and never freed.
    unsafe { message.as_ref() }.map(String::as_str)
}
