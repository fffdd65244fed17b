//! The things a crash report needs from the application around it.
//!
//! Each trait is one collaborator. An application implements all of them on one
//! type, [`CrashHost`], and hands it to
//! [`initialise_crash_log`](crate::initialise_crash_log). Everything here may
//! be called from a signal handler, so implementations should stay away from
//! locks and the allocator where they can.

use core::ffi::{c_char, CStr};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use crate::error::CrashLogError;
use crate::stdext::console;

/// Operating system version triple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OsVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl OsVersion {
    /// Parses the leading `major.minor.patch` of a release string such as
    /// `6.8.0-45-generic`. Missing components are zero.
    pub fn parse(release: &str) -> Self {
        let mut parts = release.split('.').map(leading_number);
        Self {
            major: parts.next().flatten().unwrap_or(0),
            minor: parts.next().flatten().unwrap_or(0),
            patch: parts.next().flatten().unwrap_or(0),
        }
    }
}

fn leading_number(s: &str) -> Option<u32> {
    let end = s.bytes().position(|b| !b.is_ascii_digit()).unwrap_or(s.len());
    s[..end].parse().ok()
}

/// What the `Operating system:` section reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsInfo<'a> {
    pub name: &'a str,
    pub version: OsVersion,
    /// Machine architecture, `None` if it couldn't be determined.
    pub machine: Option<&'a str>,
    /// Oldest OS version this build supports.
    pub min_version: u32,
    /// Newest OS version this build was made against.
    pub max_version: u32,
}

pub trait Environment {
    /// Calls `f` with a description of the running system.
    fn with_os_info(&self, f: &mut dyn FnMut(&OsInfo<'_>));
}

/// Conditions under which a crash report would be useless.
pub trait Preconditions {
    /// The session was restored from an emergency save.
    fn emergency_save_loaded(&self) -> bool {
        false
    }

    /// The loaded save needs content that isn't installed.
    fn save_missing_content(&self) -> bool {
        false
    }
}

/// Writers for the files left behind by a crash.
///
/// Each writer records the path it wrote to in `path`. The reporter clears
/// the path again if the writer fails.
pub trait ArtifactWriter {
    fn write_crash_log(&self, report: &[u8], path: &mut ArtifactPath) -> Result<(), CrashLogError> {
        let _ = (report, path);
        Err(CrashLogError::Unsupported("crash log"))
    }

    fn write_savegame(&self, path: &mut ArtifactPath) -> Result<(), CrashLogError> {
        let _ = path;
        Err(CrashLogError::Unsupported("savegame"))
    }

    fn write_screenshot(&self, path: &mut ArtifactPath) -> Result<(), CrashLogError> {
        let _ = path;
        Err(CrashLogError::Unsupported("screenshot"))
    }
}

pub trait DialogPresenter {
    /// Whether a graphical front end is running. `None` if unknown.
    fn gui_active(&self) -> Option<bool> {
        None
    }

    /// Shows a modal message and blocks until it is dismissed.
    ///
    /// Without a front end the message goes to stdout.
    fn show_dialog(&self, title: &str, message: &str, button: &str) {
        console!("{title}\n\n{message}\n\n[{button}]\n");
    }
}

/// Everything the crash handler calls into.
pub trait CrashHost: Environment + Preconditions + ArtifactWriter + DialogPresenter + Send + Sync {
    /// Last chance to tear down platform state before the process aborts.
    fn after_crash_log_cleanup(&self) {}
}

/// Capacity of an [`ArtifactPath`], including its nul terminator.
pub const MAX_PATH: usize = 4096;

/// A path in a fixed buffer that is always nul terminated.
#[derive(Clone)]
pub struct ArtifactPath {
    buf: [u8; MAX_PATH],
    len: usize,
}

impl ArtifactPath {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_PATH],
            len: 0,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, CrashLogError> {
        let mut out = Self::new();
        out.push(path.as_os_str().as_bytes())?;
        Ok(out)
    }

    /// Appends `bytes`, leaving the path unchanged if they don't fit.
    pub fn push(&mut self, bytes: &[u8]) -> Result<(), CrashLogError> {
        if bytes.contains(&0) {
            return Err(CrashLogError::PathContainsNul);
        }
        let end = self.len + bytes.len();
        if end >= MAX_PATH {
            return Err(CrashLogError::PathTooLong { capacity: MAX_PATH });
        }
        self.buf[self.len..end].copy_from_slice(bytes);
        self.buf[end] = 0;
        self.len = end;
        Ok(())
    }

    /// Replaces the path with `bytes`.
    pub fn set(&mut self, bytes: &[u8]) -> Result<(), CrashLogError> {
        self.clear();
        self.push(bytes)
    }

    /// Appends `name` as a new path component.
    pub fn join(&mut self, name: &[u8]) -> Result<(), CrashLogError> {
        if self.len > 0 && self.buf[self.len - 1] != b'/' {
            self.push(b"/")?;
        }
        self.push(name)
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.buf[0] = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn as_c_str(&self) -> &CStr {
        // SAFETY: `push` rejects interior nuls and always terminates the buffer.
        unsafe { CStr::from_bytes_with_nul_unchecked(&self.buf[..=self.len]) }
    }

    /// The path as text, or an empty string if it isn't valid UTF-8.
    pub fn as_str(&self) -> &str {
        core::str::from_utf8(self.as_bytes()).unwrap_or("")
    }
}

impl Default for ArtifactPath {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for ArtifactPath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("ArtifactPath")
            .field(&self.as_c_str())
            .finish()
    }
}

impl PartialEq for ArtifactPath {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for ArtifactPath {}

/// Snapshot of `uname(2)`, which is async-signal-safe.
pub struct Uname(libc::utsname);

impl Uname {
    pub fn capture() -> Option<Self> {
        unsafe {
            let mut uts: libc::utsname = core::mem::zeroed();
            (libc::uname(&mut uts) == 0).then_some(Uname(uts))
        }
    }

    pub fn sysname(&self) -> Option<&str> {
        field_str(&self.0.sysname)
    }

    pub fn release(&self) -> Option<&str> {
        field_str(&self.0.release)
    }

    pub fn machine(&self) -> Option<&str> {
        field_str(&self.0.machine)
    }

    pub fn os_info(&self) -> OsInfo<'_> {
        let (min_version, max_version) = supported_os_versions();
        OsInfo {
            name: self.sysname().unwrap_or("unknown"),
            version: self.release().map(OsVersion::parse).unwrap_or_default(),
            machine: self.machine(),
            min_version,
            max_version,
        }
    }
}

impl core::fmt::Debug for Uname {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Uname")
            .field("sysname", &self.sysname())
            .field("release", &self.release())
            .field("machine", &self.machine())
            .finish()
    }
}

fn field_str(field: &[c_char]) -> Option<&str> {
    // SAFETY: c_char and u8 have the same layout.
    let bytes = unsafe { core::slice::from_raw_parts(field.as_ptr().cast::<u8>(), field.len()) };
    let s = CStr::from_bytes_until_nul(bytes).ok()?.to_str().ok()?;
    (!s.is_empty()).then_some(s)
}

/// Reports whatever `uname(2)` says, or placeholders if it fails.
pub fn with_uname_os_info(f: &mut dyn FnMut(&OsInfo<'_>)) {
    match Uname::capture() {
        Some(uname) => f(&uname.os_info()),
        None => {
            let (min_version, max_version) = supported_os_versions();
            f(&OsInfo {
                name: "unknown",
                version: OsVersion::default(),
                machine: None,
                min_version,
                max_version,
            })
        }
    }
}

// Versions are encoded as major * 10000 + minor * 100 + patch. A zero maximum
// means the build doesn't declare one.
#[cfg(target_os = "macos")]
const DEFAULT_OS_VERSIONS: (u32, u32) = (101200, 150000);
#[cfg(target_os = "linux")]
const DEFAULT_OS_VERSIONS: (u32, u32) = (30200, 0);
#[cfg(not(any(target_os = "macos", target_os = "linux")))]
const DEFAULT_OS_VERSIONS: (u32, u32) = (0, 0);

/// The build-time minimum and maximum OS version markers.
///
/// `CRASHLOG_MIN_OS_VERSION` and `CRASHLOG_MAX_OS_VERSION` override the
/// per-target defaults when set at compile time.
pub fn supported_os_versions() -> (u32, u32) {
    let marker = |value: Option<&str>, default: u32| {
        value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
    };
    (
        marker(option_env!("CRASHLOG_MIN_OS_VERSION"), DEFAULT_OS_VERSIONS.0),
        marker(option_env!("CRASHLOG_MAX_OS_VERSION"), DEFAULT_OS_VERSIONS.1),
    )
}

/// Host with no savegames, screenshots or GUI. It writes `crash.log` into a
/// directory and describes the system with `uname(2)`.
#[derive(Debug, Clone)]
pub struct DefaultHost {
    dir: ArtifactPath,
}

/// File name the crash log is written to.
pub const CRASH_LOG_NAME: &str = "crash.log";

impl DefaultHost {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, CrashLogError> {
        let dir = dir.as_ref();
        let mut path = ArtifactPath::from_path(dir)?;
        // Make sure the full file path fits now rather than at crash time.
        path.join(CRASH_LOG_NAME.as_bytes())?;
        debug!(dir = %dir.display(), "crash logs will be written to {}", path.as_str());

        Ok(Self {
            dir: ArtifactPath::from_path(dir)?,
        })
    }

    pub fn dir(&self) -> &ArtifactPath {
        &self.dir
    }
}

impl Environment for DefaultHost {
    fn with_os_info(&self, f: &mut dyn FnMut(&OsInfo<'_>)) {
        with_uname_os_info(f)
    }
}

impl Preconditions for DefaultHost {}

impl DialogPresenter for DefaultHost {}

impl ArtifactWriter for DefaultHost {
    fn write_crash_log(&self, report: &[u8], path: &mut ArtifactPath) -> Result<(), CrashLogError> {
        path.set(self.dir.as_bytes())?;
        path.join(CRASH_LOG_NAME.as_bytes())?;
        write_file(path.as_c_str(), report).map_err(|source| CrashLogError::Io {
            artifact: "crash log",
            source,
        })
    }
}

impl CrashHost for DefaultHost {}

/// Writes `contents` to `path` with raw syscalls, replacing any existing file.
pub fn write_file(path: &CStr, contents: &[u8]) -> io::Result<()> {
    // SAFETY: `path` is nul terminated and `contents` is a valid buffer.
    unsafe {
        let fd = libc::open(
            path.as_ptr(),
            libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC | libc::O_CLOEXEC,
            0o644 as libc::c_uint,
        );
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut rest = contents;
        while !rest.is_empty() {
            let r = libc::write(fd, rest.as_ptr().cast(), rest.len());
            if r < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                libc::close(fd);
                return Err(err);
            }
            rest = &rest[r as usize..];
        }

        if libc::close(fd) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_release() {
        assert_eq!(
            OsVersion::parse("14.2.0"),
            OsVersion { major: 14, minor: 2, patch: 0 }
        );
        assert_eq!(
            OsVersion::parse("6.8.0-45-generic"),
            OsVersion { major: 6, minor: 8, patch: 0 }
        );
        assert_eq!(
            OsVersion::parse("6.18.44-fc-v130"),
            OsVersion { major: 6, minor: 18, patch: 44 }
        );
        assert_eq!(
            OsVersion::parse("23.2"),
            OsVersion { major: 23, minor: 2, patch: 0 }
        );
        assert_eq!(OsVersion::parse("garbage"), OsVersion::default());
    }

    #[test]
    fn artifact_path() {
        let mut path = ArtifactPath::new();
        assert!(path.is_empty());
        assert_eq!(path.as_c_str(), c"");

        path.set(b"/tmp").unwrap();
        path.join(b"crash.log").unwrap();
        assert_eq!(path.as_str(), "/tmp/crash.log");
        assert_eq!(path.as_c_str(), c"/tmp/crash.log");

        path.set(b"/tmp/").unwrap();
        path.join(b"crash.sav").unwrap();
        assert_eq!(path.as_bytes(), b"/tmp/crash.sav");

        path.clear();
        assert!(path.is_empty());
        assert_eq!(path.as_str(), "");
    }

    #[test]
    fn artifact_path_rejects_what_does_not_fit() {
        let mut path = ArtifactPath::new();
        path.set(b"/var/log").unwrap();

        assert!(matches!(
            path.push(&[b'a'; MAX_PATH]),
            Err(CrashLogError::PathTooLong { capacity: MAX_PATH })
        ));
        assert!(matches!(
            path.push(b"a\0b"),
            Err(CrashLogError::PathContainsNul)
        ));
        assert_eq!(path.as_str(), "/var/log");
    }

    #[test]
    fn uname_describes_this_machine() {
        let uname = Uname::capture().expect("uname works");
        let info = uname.os_info();

        assert!(!info.name.is_empty());
        assert!(info.machine.is_some());
        assert_eq!((info.min_version, info.max_version), supported_os_versions());
    }

    #[test]
    fn default_host_writes_crash_log() {
        let dir = tempfile::tempdir().unwrap();
        let host = DefaultHost::new(dir.path()).unwrap();
        let mut path = ArtifactPath::new();

        host.write_crash_log(b"Crash reason:\n", &mut path).unwrap();

        let expected = dir.path().join(CRASH_LOG_NAME);
        assert_eq!(path.as_str(), expected.to_str().unwrap());
        assert_eq!(std::fs::read(&expected).unwrap(), b"Crash reason:\n");
    }

    #[test]
    fn default_host_reports_unwritable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let host = DefaultHost::new(dir.path().join("missing")).unwrap();
        let mut path = ArtifactPath::new();

        let err = host.write_crash_log(b"x", &mut path).unwrap_err();
        assert!(matches!(err, CrashLogError::Io { artifact: "crash log", .. }));
    }

    #[test]
    fn default_host_has_no_savegame_or_screenshot() {
        let dir = tempfile::tempdir().unwrap();
        let host = DefaultHost::new(dir.path()).unwrap();
        let mut path = ArtifactPath::new();

        assert!(matches!(
            host.write_savegame(&mut path),
            Err(CrashLogError::Unsupported("savegame"))
        ));
        assert!(matches!(
            host.write_screenshot(&mut path),
            Err(CrashLogError::Unsupported("screenshot"))
        ));
    }
}
