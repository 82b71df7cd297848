//! Bounded byte rings
//!
//! Two fixed-capacity rings with a drop-oldest overflow policy:
//! - [`RingBuffer`] is snapshot-only and holds the rolling video window.
//! - [`StreamBuffer`] additionally supports consuming reads and backs the
//!   per-stream and mixed audio rings.

pub mod ring;
pub mod stream;

pub use ring::RingBuffer;
pub use stream::StreamBuffer;
