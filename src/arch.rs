//! Per-architecture frame linkage: where the return address lives, what a sane
//! frame pointer looks like, and how to read the current one.

#[cfg(any(target_arch = "x86_64", target_arch = "x86", target_arch = "aarch64"))]
use core::arch::asm;

/// Describes how a frame record is laid out in memory.
///
/// `frame[0]` always holds the caller's frame pointer. The return address sits
/// `return_address_slot` words above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    /// Word offset of the saved return address from the frame pointer.
    pub return_address_slot: usize,
    /// Power-of-two alignment frame pointers are checked against.
    pub alignment: usize,
    /// Expected value of `fp % alignment`.
    pub alignment_residue: usize,
}

impl FrameLayout {
    /// The layout used by the target this crate was compiled for.
    pub const NATIVE: FrameLayout = FrameLayout {
        return_address_slot: RETURN_ADDRESS_SLOT,
        alignment: 16,
        alignment_residue: ALIGNMENT_RESIDUE,
    };

    pub fn is_aligned(&self, addr: usize) -> bool {
        addr & (self.alignment - 1) == self.alignment_residue
    }
}

// PowerPC keeps the saved link register two words above the back chain.
#[cfg(any(target_arch = "powerpc", target_arch = "powerpc64"))]
const RETURN_ADDRESS_SLOT: usize = 2;
#[cfg(not(any(target_arch = "powerpc", target_arch = "powerpc64")))]
const RETURN_ADDRESS_SLOT: usize = 1;

// i386 pushes the return address and ebp onto a 16 byte aligned stack.
#[cfg(target_arch = "x86")]
const ALIGNMENT_RESIDUE: usize = 8;
#[cfg(not(target_arch = "x86"))]
const ALIGNMENT_RESIDUE: usize = 0;

/// Reads the frame pointer of the calling function.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
pub(crate) fn get_frame_pointer() -> *const usize {
    let out: *const usize;
    unsafe {
        asm!(
            "mov {out}, rbp",
            out = out(reg) out,
            options(nomem, nostack, preserves_flags)
        );
    }
    out
}

#[cfg(target_arch = "x86")]
#[inline(always)]
pub(crate) fn get_frame_pointer() -> *const usize {
    let out: *const usize;
    unsafe {
        asm!(
            "mov {out}, ebp",
            out = out(reg) out,
            options(nomem, nostack, preserves_flags)
        );
    }
    out
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
pub(crate) fn get_frame_pointer() -> *const usize {
    let out: *const usize;
    unsafe {
        asm!(
            "mov {out}, x29",
            out = out(reg) out,
            options(nomem, nostack, preserves_flags)
        );
    }
    out
}

/// We don't know how to read the frame pointer here, so traces come out empty.
#[cfg(not(any(target_arch = "x86_64", target_arch = "x86", target_arch = "aarch64")))]
#[inline(always)]
pub(crate) fn get_frame_pointer() -> *const usize {
    core::ptr::null()
}
