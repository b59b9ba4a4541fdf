//! Detector configuration and validation.
//!
//! Three positive integers drive the whole engine: the purchase window
//! size (capacity of every ring buffer), the network depth (hop radius
//! defining one statistical cohort; depth 2 means direct friends only),
//! and the sigma level for the outlier interval.
//!
//! Neither the window size nor the network depth can change once state
//! exists, since groups and ledgers are sized by them. Attempts to retarget a
//! live configuration are rejected with `UnsupportedOperation`.

use pa_common::{Error, Result};
use serde::{Deserialize, Serialize};

pub const WINDOW_SIZE_DEFAULT: usize = 10;
pub const NETWORK_DEPTH_DEFAULT: u32 = 2;
pub const SIGMA_LEVEL_DEFAULT: u32 = 3;

/// Validated detector parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Capacity of every purchase ring buffer.
    pub window_size: usize,
    /// Hop radius for cohort connectivity.
    pub network_depth: u32,
    /// Sigma multiplier for the outlier interval.
    pub sigma_level: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_size: WINDOW_SIZE_DEFAULT,
            network_depth: NETWORK_DEPTH_DEFAULT,
            sigma_level: SIGMA_LEVEL_DEFAULT,
        }
    }
}

impl DetectorConfig {
    /// Build a validated configuration.
    pub fn new(window_size: usize, network_depth: u32, sigma_level: u32) -> Result<Self> {
        verify_window_size(window_size)?;
        verify_network_depth(network_depth)?;
        verify_sigma_level(sigma_level)?;
        Ok(Self {
            window_size,
            network_depth,
            sigma_level,
        })
    }

    /// Reject a parameter change against an existing state.
    ///
    /// Live resizing of the window or re-depthing of the graph is not
    /// supported; a caller holding a checkpoint with different base
    /// parameters must discard it instead.
    pub fn ensure_matches(&self, other: &DetectorConfig) -> Result<()> {
        if self.window_size != other.window_size {
            return Err(Error::UnsupportedOperation(format!(
                "window_size change {} -> {} requires reprocessing from scratch",
                other.window_size, self.window_size
            )));
        }
        if self.network_depth != other.network_depth {
            return Err(Error::UnsupportedOperation(format!(
                "network_depth change {} -> {} requires reprocessing from scratch",
                other.network_depth, self.network_depth
            )));
        }
        Ok(())
    }
}

pub fn verify_window_size(window_size: usize) -> Result<()> {
    if window_size < 2 {
        return Err(Error::InvalidConfig(format!(
            "window_size {window_size} not valid; must be >= 2"
        )));
    }
    Ok(())
}

pub fn verify_network_depth(network_depth: u32) -> Result<()> {
    if network_depth < 1 {
        return Err(Error::InvalidConfig(format!(
            "network_depth {network_depth} not valid; must be >= 1"
        )));
    }
    Ok(())
}

pub fn verify_sigma_level(sigma_level: u32) -> Result<()> {
    if sigma_level < 1 {
        return Err(Error::InvalidConfig(format!(
            "sigma_level {sigma_level} not valid; must be >= 1"
        )));
    }
    Ok(())
}
