use super::{FrameWalker, MAX_STACK_FRAMES};
use crate::arch::FrameLayout;
use core::mem::size_of;

const WORD: usize = size_of::<usize>();

/// A fake stack of frame records laid out at increasing, properly aligned
/// addresses, 32 bytes apart.
struct SyntheticStack {
    words: Vec<usize>,
    first: usize,
    stride: usize,
}

impl SyntheticStack {
    fn new(frames: usize) -> Self {
        let layout = FrameLayout::NATIVE;
        let stride = 32 / WORD;
        let words = vec![0usize; (frames + 1) * stride + layout.alignment];
        let base = words.as_ptr().addr();
        let first = (0..layout.alignment)
            .find(|k| layout.is_aligned(base + k * WORD))
            .expect("no aligned slot in synthetic stack");
        Self {
            words,
            first,
            stride,
        }
    }

    fn index(&self, frame: usize) -> usize {
        self.first + frame * self.stride
    }

    fn address(&self, frame: usize) -> usize {
        self.words.as_ptr().addr() + self.index(frame) * WORD
    }

    fn set(&mut self, frame: usize, next: usize, return_address: usize) {
        let idx = self.index(frame);
        self.words[idx] = next;
        self.words[idx + FrameLayout::NATIVE.return_address_slot] = return_address;
    }

    /// Links `frames` records in order, the last one pointing at null.
    fn linked(frames: usize) -> Self {
        let mut stack = Self::new(frames);
        for i in 0..frames {
            let next = if i + 1 == frames {
                0
            } else {
                stack.address(i + 1)
            };
            stack.set(i, next, 0x1000 + i);
        }
        stack
    }

    fn walk(&self, frame: usize) -> Vec<usize> {
        let start = self.words.as_ptr().wrapping_add(self.index(frame));
        unsafe { FrameWalker::new(start) }.map(|a| a.addr()).collect()
    }
}

#[test]
fn null_start_yields_nothing() {
    let frames: Vec<_> = unsafe { FrameWalker::new(core::ptr::null()) }.collect();
    assert!(frames.is_empty());
}

#[test]
fn self_loop_yields_one_frame() {
    let mut stack = SyntheticStack::new(1);
    let own = stack.address(0);
    stack.set(0, own, 0x1234);

    assert_eq!(stack.walk(0), vec![0x1234]);
}

#[test]
fn walk_is_capped() {
    let stack = SyntheticStack::linked(100);
    let frames = stack.walk(0);

    assert_eq!(frames.len(), MAX_STACK_FRAMES);
    assert_eq!(frames.first(), Some(&0x1000));
    assert_eq!(frames.last(), Some(&(0x1000 + MAX_STACK_FRAMES - 1)));
}

#[test]
fn short_chain_ends_at_null_link() {
    let stack = SyntheticStack::linked(5);
    assert_eq!(stack.walk(0), vec![0x1000, 0x1001, 0x1002, 0x1003, 0x1004]);
}

#[test]
fn null_return_address_ends_walk() {
    let mut stack = SyntheticStack::linked(5);
    let next = stack.address(3);
    stack.set(2, next, 0);

    assert_eq!(stack.walk(0), vec![0x1000, 0x1001]);
}

#[test]
fn backwards_link_is_corruption() {
    let mut stack = SyntheticStack::linked(4);
    let back = stack.address(0);
    stack.set(1, back, 0x2001);

    assert_eq!(stack.walk(0), vec![0x1000, 0x2001]);
}

#[test]
fn misaligned_link_is_corruption() {
    let mut stack = SyntheticStack::linked(4);
    let crooked = stack.address(1) + WORD;
    stack.set(0, crooked, 0x3000);

    assert_eq!(stack.walk(0), vec![0x3000]);
}

#[test]
fn walker_is_fused() {
    let stack = SyntheticStack::linked(1);
    let start = stack.words.as_ptr().wrapping_add(stack.index(0));
    let mut walker = unsafe { FrameWalker::new(start) };

    assert_eq!(walker.next().map(|a| a.addr()), Some(0x1000));
    assert!(walker.next().is_none());
    assert!(walker.next().is_none());
}
