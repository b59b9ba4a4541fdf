//! Checkpoint save/load for the whole detection state.
//!
//! The checkpoint is a versioned JSON envelope around the
//! [`EventProcessor`] aggregate. Saves are atomic (temp file + rename
//! + fsync) so an interrupted write never clobbers the previous good
//! checkpoint. Loads reject any format version other than the current
//! one; the caller falls back to a fresh state, never aborts.

use pa_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::config::DetectorConfig;
use crate::processor::EventProcessor;

/// Checkpoint format version. Bumped on any incompatible layout change.
pub const FORMAT_VERSION: &str = "001_00_00";

/// Externally persisted form of the detection state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemCheckpoint {
    pub version: String,
    pub processor: EventProcessor,
}

impl SystemCheckpoint {
    /// Capture the current state under the current format version.
    pub fn capture(processor: &EventProcessor) -> Self {
        Self {
            version: FORMAT_VERSION.to_string(),
            processor: processor.clone(),
        }
    }

    /// Write the checkpoint atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_vec(self)?;
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("checkpoint.json");
        let tmp_path = path.with_file_name(format!("{}.tmp.{}", file_name, std::process::id()));
        {
            use std::io::Write;
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&content)?;
            let _ = file.sync_all();
        }
        std::fs::rename(&tmp_path, path)?;
        info!(target: "pa_core::checkpoint", path = %path.display(), "checkpoint saved");
        Ok(())
    }

    /// Read and version-check a checkpoint.
    ///
    /// The version field is inspected before the full state is decoded,
    /// so a layout change surfaces as `VersionMismatch` rather than an
    /// opaque decode failure.
    pub fn load(path: &Path) -> Result<SystemCheckpoint> {
        let content = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        let found = value
            .get("version")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("<missing>")
            .to_string();
        if found != FORMAT_VERSION {
            return Err(Error::VersionMismatch {
                found,
                current: FORMAT_VERSION.to_string(),
            });
        }
        let checkpoint: SystemCheckpoint = serde_json::from_value(value)?;
        Ok(checkpoint)
    }

    /// Hand the state back to a run, rejecting base-parameter
    /// disagreement. The resume gate always comes back closed.
    pub fn into_processor(self, requested: &DetectorConfig) -> Result<EventProcessor> {
        requested.ensure_matches(self.processor.config())?;
        Ok(self.processor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn purchase(ts: &str, id: &str, amount: &str) -> String {
        format!(
            r#"{{"event_type":"purchase", "timestamp":"{ts}", "id":"{id}", "amount":"{amount}"}}"#
        )
    }

    fn seeded_processor() -> EventProcessor {
        let mut p = EventProcessor::new(DetectorConfig::new(3, 2, 3).unwrap());
        p.offer_line(&purchase("2017-01-01 13:00:00", "1", "10.00"), false)
            .unwrap();
        p.offer_line(&purchase("2017-01-01 13:00:01", "1", "12.00"), false)
            .unwrap();
        p
    }

    #[test]
    fn test_round_trip_preserves_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.json");

        let p = seeded_processor();
        SystemCheckpoint::capture(&p).save(&path).unwrap();

        let config = DetectorConfig::new(3, 2, 3).unwrap();
        let restored = SystemCheckpoint::load(&path)
            .unwrap()
            .into_processor(&config)
            .unwrap();
        assert_eq!(restored.processed_events(), 2);
        assert_eq!(restored.last_timestamp(), p.last_timestamp());
    }

    #[test]
    fn test_loaded_gate_starts_closed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.json");

        let p = seeded_processor();
        SystemCheckpoint::capture(&p).save(&path).unwrap();
        let config = DetectorConfig::new(3, 2, 3).unwrap();
        let mut restored = SystemCheckpoint::load(&path)
            .unwrap()
            .into_processor(&config)
            .unwrap();

        // Same-second non-marker line must be discarded after a load.
        let same_second = purchase("2017-01-01 13:00:01", "9", "99.00");
        assert!(!restored.offer_line(&same_second, false).unwrap());
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.json");

        let p = seeded_processor();
        let mut checkpoint = SystemCheckpoint::capture(&p);
        checkpoint.version = "000_09_00".to_string();
        checkpoint.save(&path).unwrap();

        let err = SystemCheckpoint::load(&path).unwrap_err();
        assert!(matches!(err, Error::VersionMismatch { found, .. } if found == "000_09_00"));
    }

    #[test]
    fn test_parameter_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.json");

        SystemCheckpoint::capture(&seeded_processor())
            .save(&path)
            .unwrap();

        let other = DetectorConfig::new(10, 2, 3).unwrap();
        let err = SystemCheckpoint::load(&path)
            .unwrap()
            .into_processor(&other)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation(_)));
    }

    #[test]
    fn test_atomic_save_replaces_previous() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.json");

        let p1 = seeded_processor();
        SystemCheckpoint::capture(&p1).save(&path).unwrap();

        let mut p2 = seeded_processor();
        p2.offer_line(&purchase("2017-01-01 13:00:02", "1", "13.00"), false)
            .unwrap();
        SystemCheckpoint::capture(&p2).save(&path).unwrap();

        let restored = SystemCheckpoint::load(&path).unwrap();
        assert_eq!(restored.processor.processed_events(), 3);
        // No temp files left behind.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }
}
