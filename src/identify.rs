//! Address to symbol resolution through the dynamic loader.

use core::ffi::CStr;

use crate::Addr;

/// What the dynamic loader knows about an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolInfo<'a> {
    /// Path of the image containing the address, as the loader recorded it.
    pub image: Option<&'a CStr>,
    /// Nearest symbol at or below the address.
    pub symbol: Option<&'a CStr>,
    /// Start of `symbol`.
    pub symbol_addr: Option<Addr>,
}

impl<'a> SymbolInfo<'a> {
    /// Final path segment of the image, if the image is known.
    pub fn image_name(&self) -> Option<&'a [u8]> {
        self.image.map(|path| file_name(path.to_bytes()))
    }

    /// Symbol name and `addr - symbol start`, if both are known.
    ///
    /// The offset is not bounded: in stripped images the nearest exported
    /// symbol can be very far away.
    pub fn symbol_offset(&self, addr: Addr) -> Option<(&'a CStr, isize)> {
        let name = self.symbol?;
        let base = self.symbol_addr?;
        Some((name, addr.addr().wrapping_sub(base.addr()) as isize))
    }
}

fn file_name(path: &[u8]) -> &[u8] {
    match path.iter().rposition(|&b| b == b'/') {
        Some(slash) => &path[slash + 1..],
        None => path,
    }
}

/// Anything that can map addresses back to symbols.
pub trait Resolve {
    fn resolve(&self, addr: Addr) -> Option<SymbolInfo<'_>>;
}

/// Resolution through `dladdr`, which only reads loader data structures and
/// does not allocate.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dladdr;

impl Resolve for Dladdr {
    fn resolve(&self, addr: Addr) -> Option<SymbolInfo<'_>> {
        identify(addr)
    }
}

/// Asks the dynamic loader which image and symbol contain `addr`.
///
/// The returned strings live as long as the image stays loaded, which during
/// crash reporting is the rest of the process.
pub fn identify(addr: Addr) -> Option<SymbolInfo<'static>> {
    unsafe {
        let mut info: libc::Dl_info = core::mem::zeroed();

        if libc::dladdr(addr.voidptr(), &mut info) == 0 {
            return None;
        }

        let image = (!info.dli_fname.is_null()).then(|| CStr::from_ptr(info.dli_fname));
        let symbol = (!info.dli_sname.is_null()).then(|| CStr::from_ptr(info.dli_sname));
        let symbol_addr = (!info.dli_saddr.is_null()).then(|| Addr::from_usize(info.dli_saddr.addr()));

        Some(SymbolInfo {
            image,
            symbol,
            symbol_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_name_strips_directories() {
        let info = SymbolInfo {
            image: Some(c"/usr/lib/system/libsystem_kernel.dylib"),
            symbol: None,
            symbol_addr: None,
        };
        assert_eq!(info.image_name(), Some(&b"libsystem_kernel.dylib"[..]));

        let bare = SymbolInfo {
            image: Some(c"a.out"),
            ..info
        };
        assert_eq!(bare.image_name(), Some(&b"a.out"[..]));

        let trailing = SymbolInfo {
            image: Some(c"/weird/"),
            ..info
        };
        assert_eq!(trailing.image_name(), Some(&b""[..]));
    }

    #[test]
    fn offset_needs_name_and_base() {
        let addr = Addr::from_usize(0x5010);
        let full = SymbolInfo {
            image: None,
            symbol: Some(c"main"),
            symbol_addr: Some(Addr::from_usize(0x5000)),
        };
        assert_eq!(full.symbol_offset(addr), Some((c"main", 0x10)));

        let no_base = SymbolInfo {
            symbol_addr: None,
            ..full
        };
        assert_eq!(no_base.symbol_offset(addr), None);

        let no_name = SymbolInfo {
            symbol: None,
            ..full
        };
        assert_eq!(no_name.symbol_offset(addr), None);
    }

    #[test]
    fn offset_is_signed() {
        let info = SymbolInfo {
            image: None,
            symbol: Some(c"f"),
            symbol_addr: Some(Addr::from_usize(0x5000)),
        };
        assert_eq!(
            info.symbol_offset(Addr::from_usize(0x4ff0)),
            Some((c"f", -0x10))
        );
    }

    #[inline(never)]
    extern "C" fn known_function() {}

    #[cfg(any(all(target_os = "linux", target_env = "gnu"), target_os = "macos"))]
    #[test]
    fn identifies_own_code() {
        let addr = Addr::from_usize(known_function as usize);
        let info = identify(addr).expect("text of the test binary is mapped");

        assert!(info.image_name().is_some_and(|name| !name.is_empty()));
    }

    #[test]
    fn unmapped_address_is_unknown() {
        assert_eq!(identify(Addr::from_usize(0x10)), None);
        assert_eq!(Dladdr.resolve(Addr::NULL), None);
    }
}
