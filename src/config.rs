use std::ffi::OsStr;

/// Setting this environment variable to `1` or `true` turns
/// [`initialise_crash_log`](crate::initialise_crash_log) into a no-op.
pub const DISABLE_ENV_VAR: &str = "CRASHLOG_DISABLE";

/// How crash reports are produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashLogConfig {
    // Allocate a guarded alternate signal stack for the initialising thread and
    // run the handler on it, so stack overflows can still be reported.
    create_alt_stack: bool,
    // Whether to demangle symbol names in stack traces
    demangle_names: bool,
    // Print progress and the report itself to stdout while crashing
    echo_to_console: bool,
    // Where users should send reports, shown in the crash dialog
    issue_url: Option<String>,
}

impl Default for CrashLogConfig {
    fn default() -> Self {
        Self {
            create_alt_stack: false,
            demangle_names: true,
            echo_to_console: true,
            issue_url: None,
        }
    }
}

impl CrashLogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alt_stack(mut self, create_alt_stack: bool) -> Self {
        self.create_alt_stack = create_alt_stack;
        self
    }

    pub fn with_demangle_names(mut self, demangle_names: bool) -> Self {
        self.demangle_names = demangle_names;
        self
    }

    pub fn with_echo_to_console(mut self, echo_to_console: bool) -> Self {
        self.echo_to_console = echo_to_console;
        self
    }

    pub fn with_issue_url(mut self, issue_url: impl Into<String>) -> Self {
        self.issue_url = Some(issue_url.into());
        self
    }

    pub fn create_alt_stack(&self) -> bool {
        self.create_alt_stack
    }

    pub fn demangle_names(&self) -> bool {
        self.demangle_names
    }

    pub fn echo_to_console(&self) -> bool {
        self.echo_to_console
    }

    pub fn issue_url(&self) -> Option<&str> {
        self.issue_url.as_deref()
    }
}

pub(crate) fn disabled_by_env() -> bool {
    is_disable_value(std::env::var_os(DISABLE_ENV_VAR).as_deref())
}

fn is_disable_value(value: Option<&OsStr>) -> bool {
    value.is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}
