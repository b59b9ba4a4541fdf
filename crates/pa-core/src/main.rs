use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

use pa_core::config::{
    DetectorConfig, NETWORK_DEPTH_DEFAULT, SIGMA_LEVEL_DEFAULT, WINDOW_SIZE_DEFAULT,
};
use pa_core::logging::{init_logging, LogFormat, LogLevel};
use pa_core::run::{run, RunOptions};

/// Flag purchases that are anomalously large within a user's social
/// network, reading a batch history file and then a stream of new
/// events.
#[derive(Debug, Parser)]
#[command(name = "pa-core", version, about)]
struct Cli {
    /// Historical events used to initialize state (first line is the
    /// parameter header).
    #[arg(long, default_value = "log_input/batch_log.json")]
    batch_file: PathBuf,

    /// New events to process; anomalies found here are written out.
    #[arg(long, default_value = "log_input/stream_log.json")]
    stream_file: PathBuf,

    /// Where flagged purchases are written, one JSON object per line.
    #[arg(long, default_value = "log_output/flagged_purchases.json")]
    output_file: PathBuf,

    /// Checkpoint location for resumable runs.
    #[arg(long, default_value = "log_output/checkpoint.json")]
    checkpoint_file: PathBuf,

    /// Ignore any existing checkpoint and start from an empty state.
    #[arg(long)]
    no_checkpoint: bool,

    /// Purchases tracked per social network (T).
    #[arg(long, default_value_t = WINDOW_SIZE_DEFAULT)]
    window_size: usize,

    /// Social network depth (D); 2 means direct friends.
    #[arg(long, default_value_t = NETWORK_DEPTH_DEFAULT)]
    network_depth: u32,

    /// Standard deviations above the mean before a purchase is flagged.
    #[arg(long, default_value_t = SIGMA_LEVEL_DEFAULT)]
    sigma_level: u32,

    /// Checkpoint every N applied events (0 disables autosave).
    #[arg(long, default_value_t = 10_000)]
    autosave_every: u64,

    /// Log verbosity: trace, debug, info, warn, error, off.
    #[arg(long, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Log format: human or jsonl.
    #[arg(long, default_value_t = LogFormat::Human)]
    log_format: LogFormat,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level, cli.log_format);

    let config = match DetectorConfig::new(cli.window_size, cli.network_depth, cli.sigma_level) {
        Ok(config) => config,
        Err(err) => {
            error!(target: "pa_core", %err, "invalid run parameters");
            return ExitCode::from(2);
        }
    };

    let opts = RunOptions {
        batch_file: cli.batch_file,
        stream_file: cli.stream_file,
        output_file: cli.output_file,
        checkpoint_file: cli.checkpoint_file,
        config,
        autosave_every: cli.autosave_every,
        no_checkpoint: cli.no_checkpoint,
    };

    match run(&opts) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            error!(target: "pa_core", %err, "run failed");
            ExitCode::FAILURE
        }
    }
}
