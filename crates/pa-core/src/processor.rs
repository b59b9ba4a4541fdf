//! Event processor: the resume/replay gate plus event dispatch.
//!
//! Two file sources may overlap in time, one of them already partly
//! reflected in a checkpoint. Events carry no unique identifier, only a
//! whole-second timestamp, so the gate guarantees at-most-once
//! application with the `(last_timestamp, last_line, gate_open)` triple:
//!
//! - older than the marker: discard, close the gate;
//! - newer than the marker: apply, advance the marker, open the gate;
//! - equal to the marker with the gate open: apply (same-second run);
//! - equal with the gate closed: byte-compare the raw line against the
//!   marker line. A match means "this was the last line already
//!   applied", so the gate reopens for the *next* line, whatever its
//!   timestamp bucket; a non-match keeps discarding.
//!
//! The first-ever event, or a caller that forces processing for a
//! guaranteed-fresh source, seeds the marker and opens the gate
//! unconditionally, so both passes share one apply path.

use chrono::NaiveDateTime;
use pa_common::{Result, UserId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::VecDeque;
use tracing::{trace, warn};

use crate::config::DetectorConfig;
use crate::directory::UserDirectory;
use crate::groups::GroupRegistry;
use crate::ingest::{decode_line, EventRecord};
use crate::ledger::UserLedger;

/// One detected anomaly, in detection order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub id: UserId,
    pub timestamp: NaiveDateTime,
    pub amount: f64,
    pub mean: f64,
    pub stdev: f64,
}

/// The whole detection state as one explicit aggregate: graph, ledgers,
/// groups, and the resume gate. Exactly one owner per run; checkpoint
/// save/load serializes this value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventProcessor {
    config: DetectorConfig,
    directory: UserDirectory,
    ledger: UserLedger,
    registry: GroupRegistry,

    last_timestamp: Option<NaiveDateTime>,
    last_line: Option<String>,
    /// Not persisted: a loaded checkpoint always starts gated until the
    /// stream catches up to the marker.
    #[serde(skip)]
    gate_open: bool,

    processed_events: u64,

    /// Outbound queue of detected anomalies, drained by the caller.
    #[serde(skip)]
    anomalies: VecDeque<AnomalyReport>,
}

impl EventProcessor {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            directory: UserDirectory::new(),
            ledger: UserLedger::new(config.window_size, config.sigma_level),
            registry: GroupRegistry::new(
                config.window_size,
                config.network_depth,
                config.sigma_level,
            ),
            last_timestamp: None,
            last_line: None,
            gate_open: false,
            processed_events: 0,
            anomalies: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn directory(&self) -> &UserDirectory {
        &self.directory
    }

    pub fn registry(&self) -> &GroupRegistry {
        &self.registry
    }

    /// Timestamp of the last applied event, if any.
    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.last_timestamp
    }

    /// Count of events applied (not merely offered) so far.
    pub fn processed_events(&self) -> u64 {
        self.processed_events
    }

    /// Drain the detected anomalies in detection order.
    pub fn drain_anomalies(&mut self) -> Vec<AnomalyReport> {
        self.anomalies.drain(..).collect()
    }

    /// Decode one raw line and offer it to the gate. Returns whether the
    /// event was applied. Decode and dispatch failures are line-local.
    pub fn offer_line(&mut self, raw_line: &str, force: bool) -> Result<bool> {
        let record = decode_line(raw_line)?;
        self.offer(raw_line, &record, force)
    }

    /// Run one `(raw_line, record)` pair through the gate and, when
    /// admitted, dispatch it.
    pub fn offer(&mut self, raw_line: &str, record: &EventRecord, force: bool) -> Result<bool> {
        if !self.admit(raw_line, record.timestamp(), force) {
            trace!(target: "pa_core::gate", line = raw_line, "discarded by resume gate");
            return Ok(false);
        }
        self.apply(record)?;
        Ok(true)
    }

    /// The gate decision. Updates the marker triple and reports whether
    /// the event may be applied.
    fn admit(&mut self, raw_line: &str, timestamp: NaiveDateTime, force: bool) -> bool {
        let last = match self.last_timestamp {
            Some(last) if !force => last,
            _ => {
                // First-ever event, or a forced one-time source: seed
                // the marker and open up.
                self.mark(raw_line, timestamp);
                self.gate_open = true;
                return true;
            }
        };

        match timestamp.cmp(&last) {
            Ordering::Less => {
                // Anything at this point of a re-read source is already
                // reflected in the checkpoint.
                self.gate_open = false;
                false
            }
            Ordering::Greater => {
                self.mark(raw_line, timestamp);
                self.gate_open = true;
                true
            }
            Ordering::Equal => {
                if self.gate_open {
                    self.mark(raw_line, timestamp);
                    true
                } else {
                    // Same second as the marker while gated: only exact
                    // raw-line identity tells us where the last run
                    // stopped. The matched line itself was already
                    // applied; resume on the next one.
                    if self.last_line.as_deref() == Some(raw_line) {
                        self.gate_open = true;
                    }
                    false
                }
            }
        }
    }

    fn mark(&mut self, raw_line: &str, timestamp: NaiveDateTime) {
        self.last_timestamp = Some(timestamp);
        self.last_line = Some(raw_line.to_string());
    }

    fn apply(&mut self, record: &EventRecord) -> Result<()> {
        self.processed_events += 1;
        match record {
            EventRecord::Befriend { id1, id2, .. } => {
                self.directory.add_friendship(id1, id2)?;
                self.registry.add_friendship(id1, id2, &self.ledger)?;
            }
            EventRecord::Unfriend { id1, id2, .. } => {
                // Directory edge first: the registry's reachability
                // query must see the post-removal graph.
                self.directory.remove_friendship(id1, id2)?;
                self.registry
                    .remove_friendship(id1, id2, &self.directory, &self.ledger)?;
            }
            EventRecord::Purchase {
                timestamp,
                id,
                amount,
            } => {
                self.apply_purchase(id, *amount, *timestamp)?;
            }
        }
        Ok(())
    }

    fn apply_purchase(
        &mut self,
        uid: &UserId,
        amount: f64,
        timestamp: NaiveDateTime,
    ) -> Result<()> {
        if !self.directory.contains(uid) {
            // First encounter via purchase: directory entry only; no
            // group effect until they actually befriend someone.
            self.directory.create_user(uid)?;
        }
        let group_id = match self.registry.group_of(uid) {
            Some(group_id) => group_id,
            None => self.registry.create_solo_group(uid)?,
        };

        // Judge the candidate against history that excludes itself.
        if self.registry.is_anomalous(group_id, amount)? {
            let stats = self.registry.group_stats(group_id)?;
            let report = AnomalyReport {
                id: uid.clone(),
                timestamp,
                amount,
                mean: stats.mean(),
                stdev: stats.stdev(),
            };
            warn!(
                target: "pa_core::anomaly",
                user = %report.id,
                amount = report.amount,
                mean = report.mean,
                stdev = report.stdev,
                group = %group_id,
                "anomalous purchase"
            );
            self.anomalies.push_back(report);
        }

        self.registry
            .record_purchase(group_id, uid, amount, timestamp)?;
        self.ledger.add_purchase(uid, amount, timestamp);
        Ok(())
    }
}
