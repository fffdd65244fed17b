//! Signal numbers and their names.

use libc::c_int;

/// Fatal signals a crash report is produced for.
pub const SIGNALS_TO_HANDLE: [c_int; 6] = [
    libc::SIGSEGV,
    libc::SIGABRT,
    libc::SIGFPE,
    libc::SIGBUS,
    libc::SIGILL,
    libc::SIGSYS,
];

/// Placeholder for signal numbers we have no name for.
pub const UNKNOWN_SIGNAL: &str = "UNKNOWN";

/// Symbolic name of `signum`, e.g. `SIGSEGV`.
///
/// Unlike `strsignal(3)` this is a pure lookup and safe in a signal handler.
/// See <https://man7.org/linux/man-pages/man7/signal.7.html>
pub fn signal_name(signum: c_int) -> &'static str {
    match signum {
        libc::SIGHUP => "SIGHUP",
        libc::SIGINT => "SIGINT",
        libc::SIGQUIT => "SIGQUIT",
        libc::SIGILL => "SIGILL",
        libc::SIGTRAP => "SIGTRAP",
        libc::SIGABRT => "SIGABRT",
        libc::SIGBUS => "SIGBUS",
        libc::SIGFPE => "SIGFPE",
        libc::SIGKILL => "SIGKILL",
        libc::SIGUSR1 => "SIGUSR1",
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGUSR2 => "SIGUSR2",
        libc::SIGPIPE => "SIGPIPE",
        libc::SIGALRM => "SIGALRM",
        libc::SIGTERM => "SIGTERM",
        libc::SIGCHLD => "SIGCHLD",
        libc::SIGCONT => "SIGCONT",
        libc::SIGSTOP => "SIGSTOP",
        libc::SIGTSTP => "SIGTSTP",
        libc::SIGTTIN => "SIGTTIN",
        libc::SIGTTOU => "SIGTTOU",
        libc::SIGURG => "SIGURG",
        libc::SIGXCPU => "SIGXCPU",
        libc::SIGXFSZ => "SIGXFSZ",
        libc::SIGVTALRM => "SIGVTALRM",
        libc::SIGPROF => "SIGPROF",
        libc::SIGWINCH => "SIGWINCH",
        libc::SIGIO => "SIGIO",
        libc::SIGSYS => "SIGSYS",
        #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
        libc::SIGEMT => "SIGEMT",
        #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
        libc::SIGINFO => "SIGINFO",
        _ => UNKNOWN_SIGNAL,
    }
}
