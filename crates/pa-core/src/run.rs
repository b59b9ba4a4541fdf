//! Batch + stream run orchestration.
//!
//! A run reads two sources through one apply path: the batch file
//! (history, possibly already reflected in a checkpoint) and the stream
//! file (new events, whose anomalies are written out). The resume gate
//! inside the processor decides per line; this module only feeds it,
//! logs per-line failures, and handles checkpoint cadence.

use pa_common::Result;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::checkpoint::SystemCheckpoint;
use crate::config::{verify_network_depth, verify_window_size, DetectorConfig};
use crate::ingest::{decode_header, timestamp_hint};
use crate::output::AnomalyWriter;
use crate::processor::EventProcessor;

/// Everything a run needs, resolved from the CLI.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub batch_file: PathBuf,
    pub stream_file: PathBuf,
    pub output_file: PathBuf,
    pub checkpoint_file: PathBuf,
    pub config: DetectorConfig,
    /// Checkpoint every N applied events; 0 disables autosave.
    pub autosave_every: u64,
    /// Skip checkpoint load and start from an empty state.
    pub no_checkpoint: bool,
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub batch_lines: u64,
    pub stream_lines: u64,
    pub applied_events: u64,
    pub gated_lines: u64,
    pub failed_lines: u64,
    pub anomalies_written: u64,
}

/// Execute a full batch → checkpoint → stream run.
pub fn run(opts: &RunOptions) -> Result<RunSummary> {
    let mut processor = restore_or_fresh(opts);
    let mut summary = RunSummary::default();

    if opts.batch_file.is_file() {
        process_batch(opts, &mut processor, &mut summary)?;
    } else {
        error!(target: "pa_core::run", path = %opts.batch_file.display(), "batch file does not exist; nothing to initialize with");
    }

    // Always persist after the batch pass, even if it applied nothing.
    SystemCheckpoint::capture(&processor).save(&opts.checkpoint_file)?;

    if opts.stream_file.is_file() {
        process_stream(opts, &mut processor, &mut summary)?;
    } else {
        error!(target: "pa_core::run", path = %opts.stream_file.display(), "stream file does not exist; nothing to process");
    }

    SystemCheckpoint::capture(&processor).save(&opts.checkpoint_file)?;
    info!(
        target: "pa_core::run",
        applied = summary.applied_events,
        gated = summary.gated_lines,
        failed = summary.failed_lines,
        anomalies = summary.anomalies_written,
        "run complete"
    );
    Ok(summary)
}

/// Load the checkpoint when present and compatible; otherwise start
/// fresh. Incompatibility is logged and recovered, never fatal.
fn restore_or_fresh(opts: &RunOptions) -> EventProcessor {
    if opts.no_checkpoint || !opts.checkpoint_file.is_file() {
        return EventProcessor::new(opts.config);
    }
    match SystemCheckpoint::load(&opts.checkpoint_file)
        .and_then(|cp| cp.into_processor(&opts.config))
    {
        Ok(processor) => {
            info!(
                target: "pa_core::checkpoint",
                last_timestamp = ?processor.last_timestamp(),
                "checkpoint restored"
            );
            processor
        }
        Err(err) => {
            error!(target: "pa_core::checkpoint", %err, "checkpoint unavailable; reprocessing from scratch");
            EventProcessor::new(opts.config)
        }
    }
}

fn process_batch(
    opts: &RunOptions,
    processor: &mut EventProcessor,
    summary: &mut RunSummary,
) -> Result<()> {
    info!(target: "pa_core::run", path = %opts.batch_file.display(), "reading batch file");
    let reader = BufReader::new(std::fs::File::open(&opts.batch_file)?);

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line_no == 0 {
            handle_header(&line, &opts.config);
            continue;
        }
        summary.batch_lines += 1;
        let applied = offer(processor, &line, line_no, &opts.batch_file, summary)?;
        if autosave_due(applied, opts.autosave_every, processor.processed_events()) {
            autosave(opts, processor);
        }
    }

    // Batch-pass anomalies are diagnostic only; the output file carries
    // stream-pass detections.
    let drained = processor.drain_anomalies();
    if !drained.is_empty() {
        debug!(target: "pa_core::run", count = drained.len(), "anomalies during batch pass (not written)");
    }
    Ok(())
}

fn process_stream(
    opts: &RunOptions,
    processor: &mut EventProcessor,
    summary: &mut RunSummary,
) -> Result<()> {
    info!(target: "pa_core::run", path = %opts.stream_file.display(), "reading stream file");
    if opts.output_file.is_file() {
        warn!(target: "pa_core::run", path = %opts.output_file.display(), "output file exists; overwriting");
    }
    if let Some(parent) = opts.output_file.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = AnomalyWriter::create(&opts.output_file)?;
    let reader = BufReader::new(std::fs::File::open(&opts.stream_file)?);

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        summary.stream_lines += 1;
        let applied = offer(processor, &line, line_no, &opts.stream_file, summary)?;
        if applied {
            let reports = processor.drain_anomalies();
            summary.anomalies_written += reports.len() as u64;
            writer.write_all(&reports)?;
        }
        if autosave_due(applied, opts.autosave_every, processor.processed_events()) {
            autosave(opts, processor);
        }
    }
    writer.flush()?;
    Ok(())
}

/// Feed one line to the processor, with the cheap timestamp pre-filter
/// in front of the full decode. Line-local failures (bad JSON, unknown
/// event, malformed fields) are logged and skipped; anything else
/// aborts the run.
fn offer(
    processor: &mut EventProcessor,
    line: &str,
    line_no: usize,
    source: &Path,
    summary: &mut RunSummary,
) -> Result<bool> {
    if let (Some(hint), Some(last)) = (timestamp_hint(line), processor.last_timestamp()) {
        if hint < last {
            summary.gated_lines += 1;
            return Ok(false);
        }
    }
    match processor.offer_line(line, false) {
        Ok(true) => {
            summary.applied_events += 1;
            Ok(true)
        }
        Ok(false) => {
            summary.gated_lines += 1;
            Ok(false)
        }
        Err(err) if err.is_line_local() => {
            summary.failed_lines += 1;
            error!(
                target: "pa_core::run",
                line_no,
                source = %source.display(),
                %err,
                "problem parsing line; skipping"
            );
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

/// A checkpoint is due only on a line that was actually applied; gated
/// and skipped lines change nothing worth persisting.
fn autosave_due(applied: bool, autosave_every: u64, processed: u64) -> bool {
    applied && autosave_every > 0 && processed % autosave_every == 0
}

fn autosave(opts: &RunOptions, processor: &EventProcessor) {
    info!(
        target: "pa_core::checkpoint",
        applied = processor.processed_events(),
        "auto-saving checkpoint"
    );
    if let Err(err) = SystemCheckpoint::capture(processor).save(&opts.checkpoint_file) {
        error!(target: "pa_core::checkpoint", %err, "autosave failed");
    }
}

/// Validate the batch header and report how it interacts with the
/// CLI-supplied parameters. The run's parameters always win; the header
/// is validated so a corrupt file is noticed.
fn handle_header(line: &str, config: &DetectorConfig) {
    match decode_header(line) {
        Ok(header) => {
            if verify_window_size(header.window_size).is_err()
                || verify_network_depth(header.network_depth).is_err()
            {
                warn!(target: "pa_core::run", ?header, "batch header parameters out of range; ignoring");
                return;
            }
            if header.window_size != config.window_size
                || header.network_depth != config.network_depth
            {
                info!(
                    target: "pa_core::run",
                    header_window = header.window_size,
                    header_depth = header.network_depth,
                    run_window = config.window_size,
                    run_depth = config.network_depth,
                    "batch header parameters overridden by run parameters"
                );
            }
        }
        Err(err) => {
            warn!(target: "pa_core::run", %err, "unreadable batch header; using run parameters");
        }
    }
}
