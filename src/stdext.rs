use core::ffi::CStr;
use core::fmt;
use core::fmt::Write;

/// Unbuffered stdout that goes straight to `write(2)`, so it can be used from a
/// signal handler without touching std's stdout lock.
pub struct LibCStdoutWriter;

impl Write for LibCStdoutWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        write_stdout(s.as_bytes())
    }
}

/// Writes all of `bytes` to stdout, retrying on short writes and `EINTR`.
pub fn write_stdout(mut bytes: &[u8]) -> fmt::Result {
    while !bytes.is_empty() {
        let r = unsafe { libc::write(libc::STDOUT_FILENO, bytes.as_ptr().cast(), bytes.len()) };
        if r < 0 {
            if errno() == libc::EINTR {
                continue;
            }
            return Err(fmt::Error);
        }
        if r == 0 {
            return Ok(());
        }
        bytes = &bytes[(r as usize)..];
    }
    Ok(())
}

pub fn print(args: fmt::Arguments<'_>) -> fmt::Result {
    LibCStdoutWriter.write_fmt(args)
}

macro_rules! console {
    ($($tt:tt)*) => {{
        // Nothing useful can be done if stdout is gone while crashing.
        let _ = $crate::stdext::print(::core::format_args!($($tt)*));
    }};
}

pub(crate) use console;

pub(crate) fn abort() -> ! {
    // SAFETY: We abort.
    unsafe { libc::abort() };
}

fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Calls `f` with the text for `errno`, formatted into a stack buffer.
pub(crate) fn with_os_error_str<R>(errno: i32, f: impl FnOnce(&str) -> R) -> R {
    let mut buf: [u8; 512] = [0; 512];

    // SAFETY: Our buffer length is passed correctly
    let error = unsafe { libc::strerror_r(errno, buf.as_mut_ptr().cast(), buf.len()) };
    let cstr = if error != 0 {
        c"<strerror_r returned an error>"
    } else {
        // The buffer is zero initialised, so a nul is found even if nothing was written.
        CStr::from_bytes_until_nul(&buf).unwrap_or(c"<unterminated error message>")
    };
    f(cstr
        .to_str()
        .unwrap_or("<error message contained invalid utf8>"))
}
