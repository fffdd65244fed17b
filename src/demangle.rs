//! Symbol demangling.

use symbolic_demangle::{Demangle, DemangleOptions};
use symbolic_common::Name;

/// Turns a mangled C++ or Rust symbol into its readable form.
///
/// Returns `None` for names that aren't mangled, that are malformed, or that
/// demangle to themselves; callers print the original name in that case. The
/// returned string is the only heap allocation made while formatting a crash
/// report and should be dropped as soon as its line is written.
pub fn demangle(symbol: &str) -> Option<String> {
    match Name::from(symbol).demangle(DemangleOptions::complete()) {
        Some(demangled) if demangled != symbol => Some(demangled),
        _ => None,
    }
}
