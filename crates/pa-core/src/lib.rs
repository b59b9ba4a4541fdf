//! Purchase Anomaly Core Library
//!
//! This library flags purchases that are statistically anomalous
//! relative to a dynamically maintained peer group's recent spending:
//! - Friendship graph and bounded-depth cohort maintenance
//! - Per-user purchase ledgers and shared group windows
//! - A resume/replay gate for exactly-once event application across
//!   a checkpoint boundary
//!
//! The binary entry point is in `main.rs`.

pub mod checkpoint;
pub mod config;
pub mod directory;
pub mod groups;
pub mod ingest;
pub mod ledger;
pub mod logging;
pub mod output;
pub mod processor;
pub mod run;

pub use checkpoint::{SystemCheckpoint, FORMAT_VERSION};
pub use config::DetectorConfig;
pub use processor::{AnomalyReport, EventProcessor};
