//! Windowed statistics primitives.
//!
//! `window` maintains running moments over a bounded sample window;
//! `ring` is the fixed-capacity buffer that feeds it.

pub mod ring;
pub mod window;
