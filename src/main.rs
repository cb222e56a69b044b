//! builds-e2e - wait for a cluster resource to reach a condition

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use builds_e2e::kube_utils::create_client;
use builds_e2e::poll::{COMPLETION_POLL_INTERVAL, COMPLETION_TIMEOUT};
use builds_e2e::scenario::Expectation;
use builds_e2e::telemetry::init_logging;
use builds_e2e::{Condition, PollSpec};

/// Condition polling for OpenShift builds end-to-end tests
#[derive(Parser, Debug)]
#[command(name = "builds-e2e", version, about, long_about = None)]
struct Cli {
    /// Emit JSON log lines instead of human-readable output
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Wait until a resource reaches its condition
    ///
    /// Exits 0 when the condition is met, non-zero on terminal failure,
    /// retrieval error, timeout or Ctrl-C.
    Wait(WaitArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Target {
    /// Secret exists
    Secret,
    /// Pod phase is Succeeded
    Pod,
    /// Shipwright BuildRun succeeded
    BuildRun,
    /// BuildConfig lastVersion reached --expected-version
    BuildConfig,
}

#[derive(Args, Debug)]
struct WaitArgs {
    /// What to wait for
    #[arg(value_enum)]
    target: Target,

    /// Namespace of the resource
    #[arg(short, long)]
    namespace: String,

    /// Name of the resource
    #[arg(long)]
    name: String,

    /// Time between attempts (e.g. 10s, 2m)
    #[arg(long, value_parser = parse_duration, default_value = "10s")]
    interval: Duration,

    /// Give up after this long (e.g. 5m, 1h)
    #[arg(long, value_parser = parse_duration, default_value = "5m")]
    timeout: Duration,

    /// Wait one interval before the first attempt
    #[arg(long)]
    no_immediate: bool,

    /// BuildConfig version to wait for
    #[arg(long, default_value_t = 1)]
    expected_version: i64,

    /// Path to kubeconfig (defaults to in-cluster or KUBECONFIG)
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,
}

impl WaitArgs {
    fn condition(&self) -> Condition {
        match self.target {
            Target::Secret => Condition::SecretExistence,
            Target::Pod => Condition::PodCompletion,
            Target::BuildRun => Condition::BuildRunCompletion,
            Target::BuildConfig => Condition::BuildConfigProgress {
                expected_version: self.expected_version,
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.json_logs) {
        eprintln!("{e}");
    }

    match cli.command {
        Commands::Wait(args) => run_wait(args).await,
    }
}

async fn run_wait(args: WaitArgs) -> anyhow::Result<()> {
    let spec = PollSpec::new(args.interval, args.timeout, !args.no_immediate)?;
    let expectation = Expectation::new(&args.namespace, &args.name, args.condition(), spec);
    let client = create_client(args.kubeconfig.as_deref()).await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    let report = expectation.eventually(&client, &cancel).await?;
    info!(
        key = %report.key,
        attempts = report.attempts,
        elapsed_ms = report.elapsed.as_millis(),
        "condition met"
    );
    Ok(())
}

/// Parse `<n>s`, `<n>m`, `<n>h` or a bare number of seconds
fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    let (digits, unit) = match input.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => input.split_at(idx),
        None => (input, "s"),
    };
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration {:?}", input))?;
    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        other => return Err(format!("unknown duration unit {:?} in {:?}", other, input)),
    };
    value
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration {:?} out of range", input))
}
