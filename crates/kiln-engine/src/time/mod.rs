//! Frame timing.
//!
//! The runtime keeps one [`FrameClock`] per window and ticks it once per redraw;
//! apps read the resulting [`FrameTime`] from their frame context.

mod frame_clock;

pub use frame_clock::{FrameClock, FrameTime};
