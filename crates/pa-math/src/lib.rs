//! Purchase Anomaly math utilities.

pub mod math;

pub use math::ring::{RingBuffer, Sample};
pub use math::window::StatsWindow;
