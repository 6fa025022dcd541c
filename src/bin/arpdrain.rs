//! Drain per-CPU relay files and print the ARP records found in them.

use arpstream::{ArpRecord, Consumer, ConsumerConfig, DEFAULT_RECORDS_PER_READ, FsSource};
use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(name = "arpdrain", version, about = "Drain ARP records from per-CPU relay files")]
struct Cli {
    /// Lane files are named <BASE><N>
    #[arg(short, long, default_value = "/sys/kernel/debug/cpu_arp")]
    base: String,

    /// Number of lanes, defaults to the number of logical CPUs available to this
    /// process. Relay creates a file per configured CPU, so pass this explicitly
    /// when running under a restricted CPU affinity mask or cgroup
    #[arg(short, long)]
    lanes: Option<usize>,

    /// Maximum number of records read from a lane per pass
    #[arg(short, long, default_value_t = DEFAULT_RECORDS_PER_READ)]
    records: usize,

    /// Keep draining, pausing this many milliseconds between passes
    #[arg(short, long)]
    follow: Option<u64>,
}

fn main() -> ExitCode {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConsumerConfig {
        lanes: cli.lanes.unwrap_or_else(num_cpus::get),
        base_name: cli.base,
        records_per_read: cli.records,
    };

    let mut consumer = match Consumer::<ArpRecord, _>::new(config, FsSource::default()) {
        Ok(consumer) => consumer,
        Err(error) => {
            tracing::error!(%error, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(lanes = consumer.lanes(), "Draining lanes");

    loop {
        let report = consumer.drain(|lane, record| println!("cpu{lane}: {record}"));
        tracing::debug!(
            records = report.records(),
            failed = report.errors().count(),
            "Finished pass"
        );

        match cli.follow {
            Some(millis) => std::thread::sleep(Duration::from_millis(millis)),
            None => return ExitCode::SUCCESS,
        }
    }
}
