//! Crash report text.
//!
//! Everything here writes into a [`ReportWriter`], a cursor over a buffer the
//! caller owns. Writes past the end of the buffer are dropped, so a report that
//! doesn't fit is cut short instead of growing or failing. Each section writer
//! returns the cursor position after it is done.

use core::ffi::CStr;
use core::fmt::{self, Write};
use core::mem::size_of;

use crate::demangle::demangle;
use crate::host::OsInfo;
use crate::identify::Resolve;
use crate::signal::signal_name;
use crate::Addr;

/// Size of the buffer a crash report is assembled in.
pub const REPORT_CAPACITY: usize = 64 * 1024;

/// Width of the image name column in stack trace lines.
pub const IMAGE_COLUMN_WIDTH: usize = 20;

/// `0x` plus two hex digits per address byte.
const ADDR_HEX_WIDTH: usize = 2 + 2 * size_of::<usize>();

/// Bounded append-only writer over a fixed buffer.
///
/// Once a write has been cut short every later write is dropped, so the
/// contents are always a prefix of what an unbounded writer would hold.
pub struct ReportWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
    truncated: bool,
}

impl<'a> ReportWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            truncated: false,
        }
    }

    /// Current cursor, always `<= capacity()`.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        if self.truncated {
            0
        } else {
            self.buf.len() - self.pos
        }
    }

    /// Whether some write didn't fit.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Appends as much of `bytes` as fits and returns the new cursor.
    ///
    /// A clipped write never ends inside a UTF-8 sequence.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> usize {
        let n = fitting_prefix(bytes, self.remaining());
        self.append(&bytes[..n], n < bytes.len())
    }

    fn append(&mut self, bytes: &[u8], clipped: bool) -> usize {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        self.truncated |= clipped;
        self.pos
    }

    /// Appends `bytes` left aligned in a column of `width`.
    pub fn write_padded(&mut self, bytes: &[u8], width: usize) -> usize {
        self.write_bytes(bytes);
        for _ in bytes.len()..width {
            self.write_bytes(b" ");
        }
        self.pos
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    /// The written text up to the last complete UTF-8 sequence.
    pub fn as_str(&self) -> &str {
        match core::str::from_utf8(self.as_bytes()) {
            Ok(s) => s,
            // SAFETY: `valid_up_to` marks the end of the longest valid prefix.
            Err(e) => unsafe { core::str::from_utf8_unchecked(&self.as_bytes()[..e.valid_up_to()]) },
        }
    }

    pub fn clear(&mut self) {
        self.pos = 0;
        self.truncated = false;
    }
}

impl Write for ReportWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

/// Length of the longest prefix of `bytes` that fits in `room` without
/// splitting a UTF-8 sequence. For a `str` this lands on a char boundary.
fn fitting_prefix(bytes: &[u8], room: usize) -> usize {
    if bytes.len() <= room {
        return bytes.len();
    }
    let mut n = room;
    while n > 0 && is_continuation(bytes[n]) {
        n -= 1;
    }
    n
}

fn is_continuation(byte: u8) -> bool {
    byte & 0xc0 == 0x80
}

impl fmt::Debug for ReportWriter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportWriter")
            .field("pos", &self.pos)
            .field("capacity", &self.capacity())
            .field("truncated", &self.truncated)
            .finish()
    }
}

/// `Operating system:` section.
pub fn write_os_version(w: &mut ReportWriter<'_>, os: &OsInfo<'_>) -> usize {
    let _ = write!(
        w,
        "Operating system:\n \
         Name:     {}\n \
         Release:  {}.{}.{}\n \
         Machine:  {}\n \
         Min Ver:  {}\n \
         Max Ver:  {}\n",
        os.name,
        os.version.major,
        os.version.minor,
        os.version.patch,
        os.machine.unwrap_or("unknown"),
        os.min_version,
        os.max_version,
    );
    w.position()
}

/// `Crash reason:` section.
pub fn write_error(w: &mut ReportWriter<'_>, signum: libc::c_int, message: Option<&str>) -> usize {
    let _ = write!(
        w,
        "Crash reason:\n \
         Signal:  {} ({})\n \
         Message: {}\n\n",
        signal_name(signum),
        signum,
        message.unwrap_or("<none>"),
    );
    w.position()
}

/// `Stacktrace:` section, one line per frame in walk order.
pub fn write_stacktrace<R: Resolve + ?Sized>(
    w: &mut ReportWriter<'_>,
    frames: impl IntoIterator<Item = Addr>,
    resolver: &R,
    demangle_names: bool,
) -> usize {
    let _ = w.write_str("\nStacktrace:\n");

    for (i, ip) in frames.into_iter().enumerate() {
        let info = resolver.resolve(ip);

        let _ = write!(w, " [{i:02}] ");
        let image = info.and_then(|info| info.image_name()).unwrap_or(&b"???"[..]);
        w.write_padded(image, IMAGE_COLUMN_WIDTH);
        let _ = write!(w, " {:#0width$x}", ip.addr(), width = ADDR_HEX_WIDTH);

        if let Some((name, offset)) = info.and_then(|info| info.symbol_offset(ip)) {
            write_symbol(w, name, offset, demangle_names);
        }
        let _ = w.write_str("\n");
    }

    let _ = w.write_str("\n");
    w.position()
}

fn write_symbol(w: &mut ReportWriter<'_>, name: &CStr, offset: isize, demangle_names: bool) {
    let demangled = if demangle_names {
        name.to_str().ok().and_then(demangle)
    } else {
        None
    };

    let _ = w.write_str(" (");
    match &demangled {
        Some(readable) => {
            let _ = w.write_str(readable);
        }
        None => {
            w.write_bytes(name.to_bytes());
        }
    }
    let _ = write!(w, " + {offset})");
}
