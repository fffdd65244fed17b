//! Installs the crash handler and then crashes the way it's told to.
//!
//! ```text
//! crash-program [segv|abort|ill|fpe] [output dir]
//! ```

use std::path::PathBuf;

use crashlog::{initialise_crash_log, set_error_message, CrashLogConfig, DefaultHost};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    let registry = tracing_subscriber::Registry::default().with(
        EnvFilter::builder()
            .with_default_directive(tracing::Level::DEBUG.into())
            .from_env()
            .unwrap(),
    );

    let tree_layer = tracing_tree::HierarchicalLayer::new(2)
        .with_targets(true)
        .with_bracketed_fields(true);

    registry.with(tree_layer).init();

    let mut args = std::env::args().skip(1);
    let how = args.next().unwrap_or_else(|| "segv".to_owned());
    let dir = args.next().map(PathBuf::from).unwrap_or_else(std::env::temp_dir);

    let host = DefaultHost::new(&dir).unwrap();
    let config = CrashLogConfig::new()
        .with_alt_stack(true)
        .with_issue_url("https://example.org/issues");
    initialise_crash_log(host, config).unwrap();

    tracing::info!(%how, dir = %dir.display(), "about to crash");
    crash(&how);
}

#[inline(never)]
fn crash(how: &str) {
    match how {
        "segv" => unsafe {
            // Non-null so debug builds don't catch it before the CPU does.
            (0x10 as *mut u32).write_volatile(0xdead);
        },
        "abort" => {
            set_error_message("abort requested on the command line");
            unsafe { libc::abort() };
        }
        "ill" => unsafe {
            libc::raise(libc::SIGILL);
        },
        "fpe" => unsafe {
            libc::raise(libc::SIGFPE);
        },
        other => {
            eprintln!("don't know how to crash with {other:?}, try segv, abort, ill or fpe");
            std::process::exit(2);
        }
    }
}
