use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use table_loader::LoadError;
use table_loader::config::{ConnectionSettings, StoreTier};
use table_loader::execution::{FailurePolicy, LoadObserver, RetryPolicy};
use table_loader::ingestion::{CompositeObserver, LoadOptions, Loader, RunReport, ThroughputLogObserver, TracingObserver};
use table_loader::logging;
use table_loader::record::FlightRecord;
use table_loader::store;

#[derive(Debug, Parser)]
#[command(name = "table-loader", version, about = "Bulk-load flight CSV files into a partitioned table store")]
struct Cli {
    /// Folder holding the files to load (all files must share one schema).
    folder: PathBuf,

    /// Which backing store to write to.
    #[arg(long, default_value_t = StoreTier::Premium)]
    tier: StoreTier,

    /// Connection string for the premium store.
    #[arg(long, env = "PREMIUM_STORAGE_CONNECTION_STRING", hide_env_values = true)]
    premium_connection: Option<String>,

    /// Connection string for the standard store.
    #[arg(long, env = "STANDARD_STORAGE_CONNECTION_STRING", hide_env_values = true)]
    standard_connection: Option<String>,

    /// Target table.
    #[arg(long, default_value = "flights")]
    table: String,

    /// Inserts per batch (1-100).
    #[arg(long, default_value_t = 100)]
    batch_size: usize,

    /// Read at most this many records from each file.
    #[arg(long)]
    max_records: Option<usize>,

    /// Wait before retrying a rate-limited batch, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    backoff_ms: u64,

    /// Retries of a rate-limited batch.
    #[arg(long, default_value_t = 1)]
    retries: u32,

    /// Keep going when a batch fails and report failures at the end.
    #[arg(long)]
    continue_on_error: bool,

    /// Partitions written concurrently.
    #[arg(long, default_value_t = 1)]
    partition_concurrency: usize,

    /// Only load files whose name matches this glob.
    #[arg(long)]
    pattern: Option<String>,

    /// Append `timestamp, elapsed_ms, batch_size` lines to this file.
    #[arg(long)]
    throughput_log: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init().ok();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(report) => {
            info!(
                files = report.files.len(),
                records = report.records_committed(),
                metrics = %report.metrics,
                "done"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            let code = match err.downcast_ref::<LoadError>() {
                Some(load) => {
                    if let LoadError::PartialFailure { report, .. } = load {
                        for file in &report.files {
                            for failed in &file.failed_batches {
                                warn!(
                                    path = %file.path.display(),
                                    partition_key = %failed.partition_key,
                                    size = failed.size,
                                    error = %failed.error,
                                    "batch not loaded"
                                );
                            }
                        }
                    }
                    load.exit_code()
                }
                None => 1,
            };
            error!("{err:#}");
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<RunReport> {
    let settings = ConnectionSettings {
        premium: cli.premium_connection,
        standard: cli.standard_connection,
    };
    let connection = settings.resolve(cli.tier)?;
    let store = store::connect(connection).with_context(|| format!("connecting to the {} store", cli.tier))?;

    let mut observer = CompositeObserver::new(vec![Arc::new(TracingObserver)]);
    if let Some(path) = &cli.throughput_log {
        observer.push(Arc::new(ThroughputLogObserver::new(path)));
    }
    let observer: Arc<dyn LoadObserver> = Arc::new(observer);

    let options = LoadOptions {
        table_name: cli.table,
        batch_size: cli.batch_size,
        max_records_per_file: cli.max_records,
        retry: RetryPolicy {
            max_retries: cli.retries,
            backoff: Duration::from_millis(cli.backoff_ms),
        },
        failure_policy: if cli.continue_on_error {
            FailurePolicy::Continue
        } else {
            FailurePolicy::Abort
        },
        max_concurrent_partitions: cli.partition_concurrency,
        file_pattern: cli.pattern,
        observer: Some(observer),
        ..Default::default()
    };

    let loader: Loader<FlightRecord> = Loader::new(store, options)?;
    Ok(loader.load_directory(&cli.folder).await?)
}
