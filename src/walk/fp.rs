//! Frame pointer walker.
//!
//! Follows the chain of saved frame pointers starting at some frame record and
//! yields the return address stored in each one. Every link is checked before
//! it is followed: the next frame pointer has to be strictly above the current
//! one (stacks grow down, so callers live at higher addresses) and has to be
//! aligned the way the architecture aligns frames. The first link that fails
//! either check ends the walk.

use crate::arch::{self, FrameLayout};
use crate::Addr;

/// Upper bound on the number of frames a single walk yields.
pub const MAX_STACK_FRAMES: usize = 64;

/// Iterator over the return addresses of a frame pointer chain.
#[derive(Debug, Clone)]
pub struct FrameWalker {
    frame: *const usize,
    layout: FrameLayout,
    remaining: usize,
}

impl FrameWalker {
    /// Starts walking at the frame of the function this is inlined into.
    ///
    /// # Safety
    /// Every function on the current stack that the walk reaches must keep
    /// frame pointers, otherwise the chain can point at unreadable memory.
    #[inline(always)]
    pub unsafe fn current() -> Self {
        Self::new(arch::get_frame_pointer())
    }

    /// Starts walking at `frame` with the native frame layout.
    ///
    /// # Safety
    /// `frame` must be null or point at a readable frame record whose chain of
    /// increasing, aligned links is readable as well.
    pub unsafe fn new(frame: *const usize) -> Self {
        Self::with_layout(frame, FrameLayout::NATIVE)
    }

    /// # Safety
    /// See [`FrameWalker::new`].
    pub unsafe fn with_layout(frame: *const usize, layout: FrameLayout) -> Self {
        Self {
            frame,
            layout,
            remaining: MAX_STACK_FRAMES,
        }
    }

    fn stop(&mut self) {
        self.frame = core::ptr::null();
    }
}

impl Iterator for FrameWalker {
    type Item = Addr;

    fn next(&mut self) -> Option<Addr> {
        if self.frame.is_null() || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        // SAFETY: `frame` is either the start record the caller vouched for, or
        // a link that passed the monotonicity and alignment checks below.
        let (return_address, next) = unsafe {
            (
                self.frame.add(self.layout.return_address_slot).read(),
                self.frame.read() as *const usize,
            )
        };

        if return_address == 0 {
            self.stop();
            return None;
        }

        if next <= self.frame || !self.layout.is_aligned(next.addr()) {
            self.stop();
        } else {
            self.frame = next;
        }

        Some(Addr::from_usize(return_address))
    }
}

impl core::iter::FusedIterator for FrameWalker {}

#[cfg(test)]
mod tests;
