//! Crashes a forked child for real and checks what it left behind.

#![cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64")))]

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use crashlog::host::{with_uname_os_info, write_file};
use crashlog::{
    initialise_crash_log, set_error_message, ArtifactPath, ArtifactWriter, CrashHost,
    CrashLogConfig, CrashLogError, DefaultHost, DialogPresenter, Environment, OsInfo,
    Preconditions,
};

#[inline(never)]
fn illegal_instruction() {
    unsafe {
        #[cfg(target_arch = "x86_64")]
        core::arch::asm!("ud2");
        #[cfg(target_arch = "aarch64")]
        core::arch::asm!("udf #0");
    }
}

/// Forks, installs `host` in the child and executes an illegal instruction
/// there. Returns the child's wait status.
fn crash_child(host: impl CrashHost + 'static) -> i32 {
    let pid = unsafe { libc::fork() };
    assert!(pid >= 0, "fork failed");
    if pid == 0 {
        set_error_message("Illegal instruction");
        let config = CrashLogConfig::new().with_echo_to_console(false);
        if initialise_crash_log(host, config).is_err() {
            unsafe { libc::_exit(2) };
        }
        illegal_instruction();
        unsafe { libc::_exit(3) };
    }

    let mut status = 0;
    assert_eq!(unsafe { libc::waitpid(pid, &mut status, 0) }, pid);
    status
}

fn assert_aborted(status: i32) {
    assert!(libc::WIFSIGNALED(status), "child exited with {status:#x}");
    assert_eq!(libc::WTERMSIG(status), libc::SIGABRT);
}

/// Writes the crash log like [`DefaultHost`] and leaves a marker file behind
/// when the cleanup hook runs.
struct MarkingHost {
    inner: DefaultHost,
    marker: CString,
    emergency_save: bool,
}

impl MarkingHost {
    fn new(dir: &Path, emergency_save: bool) -> Self {
        Self {
            inner: DefaultHost::new(dir).unwrap(),
            marker: CString::new(dir.join("cleaned-up").as_os_str().as_bytes()).unwrap(),
            emergency_save,
        }
    }
}

impl Environment for MarkingHost {
    fn with_os_info(&self, f: &mut dyn FnMut(&OsInfo<'_>)) {
        with_uname_os_info(f)
    }
}

impl Preconditions for MarkingHost {
    fn emergency_save_loaded(&self) -> bool {
        self.emergency_save
    }
}

impl ArtifactWriter for MarkingHost {
    fn write_crash_log(&self, report: &[u8], path: &mut ArtifactPath) -> Result<(), CrashLogError> {
        self.inner.write_crash_log(report, path)
    }
}

impl DialogPresenter for MarkingHost {
    fn gui_active(&self) -> Option<bool> {
        Some(false)
    }
}

impl CrashHost for MarkingHost {
    fn after_crash_log_cleanup(&self) {
        let _ = write_file(&self.marker, b"");
    }
}

#[test]
fn crash_writes_log_and_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let host = DefaultHost::new(dir.path()).unwrap();

    assert_aborted(crash_child(host));

    let log = std::fs::read_to_string(dir.path().join("crash.log")).unwrap();
    assert!(log.starts_with("Operating system:\n"), "{log}");
    assert!(log.contains(&format!(" Signal:  SIGILL ({})\n", libc::SIGILL)), "{log}");
    assert!(log.contains(" Message: Illegal instruction\n"), "{log}");
    assert!(log.contains("\nStacktrace:\n [00] "), "{log}");
}

#[test]
fn cleanup_runs_after_report() {
    let dir = tempfile::tempdir().unwrap();

    assert_aborted(crash_child(MarkingHost::new(dir.path(), false)));

    assert!(dir.path().join("crash.log").exists());
    assert!(dir.path().join("cleaned-up").exists());
}

#[test]
fn suppressed_crash_aborts_without_cleanup() {
    let dir = tempfile::tempdir().unwrap();

    assert_aborted(crash_child(MarkingHost::new(dir.path(), true)));

    assert!(!dir.path().join("crash.log").exists());
    assert!(!dir.path().join("cleaned-up").exists());
}
