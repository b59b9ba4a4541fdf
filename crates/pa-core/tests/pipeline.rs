//! End-to-end pipeline tests.
//!
//! These drive the public run entry point over real files: batch
//! initialization, stream detection, checkpoint resume, and the
//! friendship-churn scenarios that reshape social networks mid-stream.

use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

use pa_core::config::DetectorConfig;
use pa_core::run::{run, RunOptions};

fn write_lines(path: &Path, lines: &[String]) {
    let mut file = std::fs::File::create(path).unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
}

fn header(depth: u32, window: usize) -> String {
    format!(r#"{{"D":"{depth}", "T":"{window}"}}"#)
}

fn purchase(ts: &str, id: &str, amount: &str) -> String {
    format!(r#"{{"event_type":"purchase", "timestamp":"{ts}", "id":"{id}", "amount":"{amount}"}}"#)
}

fn befriend(ts: &str, id1: &str, id2: &str) -> String {
    format!(r#"{{"event_type":"befriend", "timestamp":"{ts}", "id1":"{id1}", "id2":"{id2}"}}"#)
}

fn unfriend(ts: &str, id1: &str, id2: &str) -> String {
    format!(r#"{{"event_type":"unfriend", "timestamp":"{ts}", "id1":"{id1}", "id2":"{id2}"}}"#)
}

fn options(dir: &TempDir, window: usize, depth: u32) -> RunOptions {
    RunOptions {
        batch_file: dir.path().join("batch_log.json"),
        stream_file: dir.path().join("stream_log.json"),
        output_file: dir.path().join("flagged_purchases.json"),
        checkpoint_file: dir.path().join("checkpoint.json"),
        config: DetectorConfig::new(window, depth, 3).unwrap(),
        autosave_every: 0,
        no_checkpoint: false,
    }
}

fn flagged_lines(opts: &RunOptions) -> Vec<String> {
    std::fs::read_to_string(&opts.output_file)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn batch_history_feeds_stream_detection() {
    let dir = TempDir::new().unwrap();
    let opts = options(&dir, 4, 2);

    write_lines(
        &opts.batch_file,
        &[
            header(2, 4),
            befriend("2017-01-01 00:00:00", "1", "2"),
            purchase("2017-01-01 00:00:01", "1", "16.83"),
            purchase("2017-01-01 00:00:02", "2", "29.34"),
            purchase("2017-01-01 00:00:03", "1", "59.28"),
            purchase("2017-01-01 00:00:04", "2", "11.20"),
        ],
    );
    write_lines(
        &opts.stream_file,
        &[
            purchase("2017-01-01 00:00:05", "2", "1601.83"),
            purchase("2017-01-01 00:00:06", "1", "30.00"),
        ],
    );

    let summary = run(&opts).unwrap();
    assert_eq!(summary.applied_events, 7);
    assert_eq!(summary.anomalies_written, 1);

    let lines = flagged_lines(&opts);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains(r#""id": "2""#));
    assert!(lines[0].contains(r#""amount": "1601.83""#));
    assert!(lines[0].contains(r#""timestamp":"2017-01-01 00:00:05""#));
}

#[test]
fn befriending_merges_purchase_histories() {
    let dir = TempDir::new().unwrap();
    let opts = options(&dir, 3, 2);

    // 1 and 2 start out as strangers with very different spend levels.
    write_lines(
        &opts.batch_file,
        &[
            header(2, 3),
            purchase("2017-01-01 00:00:01", "1", "10.00"),
            purchase("2017-01-01 00:00:02", "1", "11.00"),
            purchase("2017-01-01 00:00:03", "1", "12.00"),
            purchase("2017-01-01 00:00:04", "2", "1000.00"),
        ],
    );
    // After befriending 1, the merged window is rebuilt from the most
    // recent purchases of both sides ({11, 12, 1000} at window 3), and
    // a purchase far above even that mix is flagged.
    write_lines(
        &opts.stream_file,
        &[
            befriend("2017-01-01 00:00:05", "1", "2"),
            purchase("2017-01-01 00:00:06", "2", "5000.00"),
        ],
    );

    let summary = run(&opts).unwrap();
    assert_eq!(summary.anomalies_written, 1);
    assert!(flagged_lines(&opts)[0].contains(r#""id": "2""#));
}

#[test]
fn unfriending_splits_reachable_subnetworks() {
    let dir = TempDir::new().unwrap();
    let opts = options(&dir, 3, 2);

    // Chain 1-2-3 at depth 2: after 2 unfriends 1, user 1 keeps its
    // own window while 2 and 3 stay together.
    write_lines(
        &opts.batch_file,
        &[
            header(2, 3),
            befriend("2017-01-01 00:00:00", "1", "2"),
            befriend("2017-01-01 00:00:01", "2", "3"),
            purchase("2017-01-01 00:00:02", "1", "10.00"),
            purchase("2017-01-01 00:00:03", "2", "10.00"),
            purchase("2017-01-01 00:00:04", "3", "10.00"),
        ],
    );
    write_lines(
        &opts.stream_file,
        &[
            unfriend("2017-01-01 00:00:05", "1", "2"),
            // 1 is alone now: a single prior purchase is too little
            // history, so nothing is flagged for 1.
            purchase("2017-01-01 00:00:06", "1", "500.00"),
            // 2 and 3 still share a window with enough history.
            purchase("2017-01-01 00:00:07", "3", "500.00"),
        ],
    );

    let summary = run(&opts).unwrap();
    assert_eq!(summary.anomalies_written, 1);
    assert!(flagged_lines(&opts)[0].contains(r#""id": "3""#));
}

#[test]
fn resumed_run_continues_where_it_stopped() {
    let dir = TempDir::new().unwrap();
    let opts = options(&dir, 3, 2);

    write_lines(
        &opts.batch_file,
        &[
            header(2, 3),
            purchase("2017-01-01 00:00:01", "1", "10.00"),
            purchase("2017-01-01 00:00:02", "1", "11.00"),
            purchase("2017-01-01 00:00:03", "1", "12.00"),
        ],
    );
    write_lines(
        &opts.stream_file,
        &[purchase("2017-01-01 00:00:04", "1", "900.00")],
    );

    let first = run(&opts).unwrap();
    assert_eq!(first.applied_events, 4);
    assert_eq!(first.anomalies_written, 1);

    // Extend the stream and run again: only the new event is applied,
    // and only its anomaly is written. The window now holds the first
    // outlier too, so the new purchase has to clear a higher bar.
    write_lines(
        &opts.stream_file,
        &[
            purchase("2017-01-01 00:00:04", "1", "900.00"),
            purchase("2017-01-01 00:00:05", "1", "2000.00"),
        ],
    );
    let second = run(&opts).unwrap();
    assert_eq!(second.applied_events, 1);
    assert_eq!(second.anomalies_written, 1);

    let lines = flagged_lines(&opts);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains(r#""timestamp":"2017-01-01 00:00:05""#));
}

#[test]
fn no_checkpoint_flag_reprocesses_everything() {
    let dir = TempDir::new().unwrap();
    let mut opts = options(&dir, 3, 2);

    write_lines(
        &opts.batch_file,
        &[
            header(2, 3),
            purchase("2017-01-01 00:00:01", "1", "10.00"),
            purchase("2017-01-01 00:00:02", "1", "11.00"),
        ],
    );
    write_lines(&opts.stream_file, &[]);

    assert_eq!(run(&opts).unwrap().applied_events, 2);
    assert_eq!(run(&opts).unwrap().applied_events, 0);

    opts.no_checkpoint = true;
    assert_eq!(run(&opts).unwrap().applied_events, 2);
}

#[test]
fn non_finite_amount_is_a_skipped_line_not_a_poisoned_window() {
    let dir = TempDir::new().unwrap();
    let opts = options(&dir, 3, 2);

    write_lines(
        &opts.batch_file,
        &[
            header(2, 3),
            purchase("2017-01-01 00:00:01", "1", "10.00"),
            purchase("2017-01-01 00:00:02", "1", "10.00"),
            purchase("2017-01-01 00:00:03", "1", "10.00"),
        ],
    );
    // A NaN amount must never enter the window: with it folded in, the
    // moments would stay NaN past eviction and no later purchase could
    // ever be flagged.
    write_lines(
        &opts.stream_file,
        &[
            purchase("2017-01-01 00:00:04", "1", "NaN"),
            purchase("2017-01-01 00:00:05", "1", "100000.00"),
        ],
    );

    let summary = run(&opts).unwrap();
    assert_eq!(summary.failed_lines, 1);
    assert_eq!(summary.applied_events, 4);
    assert_eq!(summary.anomalies_written, 1);
    assert!(flagged_lines(&opts)[0].contains(r#""amount": "100000.00""#));
}

#[test]
fn out_of_order_stream_lines_are_discarded() {
    let dir = TempDir::new().unwrap();
    let opts = options(&dir, 3, 2);

    write_lines(
        &opts.batch_file,
        &[
            header(2, 3),
            purchase("2017-01-01 00:00:05", "1", "10.00"),
        ],
    );
    // The stream replays an older event plus one genuinely new one.
    write_lines(
        &opts.stream_file,
        &[
            purchase("2017-01-01 00:00:03", "1", "99.00"),
            purchase("2017-01-01 00:00:06", "1", "11.00"),
        ],
    );

    let summary = run(&opts).unwrap();
    assert_eq!(summary.applied_events, 2);
    assert_eq!(summary.gated_lines, 1);
}
