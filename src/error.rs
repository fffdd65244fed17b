use std::io;

use libc::c_int;

#[derive(Debug, thiserror::Error)]
pub enum CrashLogError {
    #[error("failed to install crash handler for signal {signum}: {source}")]
    InstallHandler { signum: c_int, source: io::Error },
    #[error("failed to set up the alternate signal stack: {0}")]
    AltStack(io::Error),
    #[error("{0} is not supported by this host")]
    Unsupported(&'static str),
    #[error("path does not fit in {capacity} bytes")]
    PathTooLong { capacity: usize },
    #[error("path contains a nul byte")]
    PathContainsNul,
    #[error("failed to write {artifact}: {source}")]
    Io {
        artifact: &'static str,
        source: io::Error,
    },
}

impl CrashLogError {
    /// The OS error behind this one, if any.
    pub fn io_source(&self) -> Option<&io::Error> {
        match self {
            Self::InstallHandler { source, .. } | Self::Io { source, .. } => Some(source),
            Self::AltStack(source) => Some(source),
            Self::Unsupported(_) | Self::PathTooLong { .. } | Self::PathContainsNul => None,
        }
    }
}
