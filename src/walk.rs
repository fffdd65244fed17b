//! Stack walking.

pub mod fp;

pub use fp::FrameWalker;
