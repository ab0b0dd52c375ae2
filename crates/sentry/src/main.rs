//! `sentry` command line.
//!
//! - `sentry serve --config sentry.yaml`: run the lookup server. SIGHUP reloads
//!   the policy source, Ctrl-C / SIGTERM drains and exits.
//! - `sentry bench --server host:port ...`: run a benchmark and print the report.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use sentry::bench::{BenchmarkCoordinator, BenchmarkJob, KeySource};
use sentry::core::{Result, TracingReporter};
use sentry::server::{config, SentryServer, ServerHandle};

#[derive(Parser, Debug)]
#[command(name = "sentry", version, about = "Policy lookup server and benchmark client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the lookup server
    Serve(ServeArgs),
    /// Benchmark a running server
    Bench(BenchArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Path to the YAML config file
    #[arg(short, long, env = "SENTRY_CONFIG", default_value = "sentry.yaml")]
    config: PathBuf,
}

#[derive(Args, Debug)]
struct BenchArgs {
    /// Target server as host:port
    #[arg(short, long)]
    server: String,

    /// Number of concurrent workers
    #[arg(short, long, default_value_t = 1)]
    concurrency: usize,

    /// Total lookups across all workers (0 = until cancelled)
    #[arg(short, long, default_value_t = 0)]
    limit: u64,

    /// Comma separated keys to look up
    #[arg(short, long, value_delimiter = ',')]
    keys: Vec<String>,

    /// Draw keys at random instead of cycling
    #[arg(long, requires = "keys")]
    random: bool,

    /// Per lookup timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    /// Stop after this many seconds
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Seed for --random
    #[arg(long)]
    seed: Option<u64>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl BenchArgs {
    fn into_job(self) -> BenchmarkJob {
        let keys = match (self.keys.is_empty(), self.random) {
            (true, _) => KeySource::default(),
            (false, true) => KeySource::Random(self.keys),
            (false, false) => KeySource::Fixed(self.keys),
        };

        let mut job = BenchmarkJob::new(self.server)
            .workers(self.concurrency)
            .limit(self.limit)
            .keys(keys)
            .lookup_timeout(Duration::from_millis(self.timeout_ms))
            .duration(self.duration_secs.map(Duration::from_secs));
        if let Some(seed) = self.seed {
            job = job.seed(seed);
        }
        job
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let res = match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Bench(args) => bench(args).await,
    };

    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(kind = e.kind().as_str(), error = %e, "sentry failed");
            ExitCode::FAILURE
        }
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let cfg = config::load_from_file(&args.config)?;
    let handle = SentryServer::start(cfg, Arc::new(TracingReporter)).await?;

    wait_for_signals(&handle).await?;
    handle.shutdown_and_wait().await
}

#[cfg(unix)]
async fn wait_for_signals(handle: &ServerHandle) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => return res.map_err(Into::into),
            _ = terminate.recv() => return Ok(()),
            _ = hangup.recv() => {
                // failures are reported by the server; the old snapshot stays live
                let _ = handle.reload();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signals(_handle: &ServerHandle) -> Result<()> {
    tokio::signal::ctrl_c().await.map_err(Into::into)
}

async fn bench(args: BenchArgs) -> Result<()> {
    let json = args.json;
    let coordinator = BenchmarkCoordinator::new(args.into_job(), Arc::new(TracingReporter));

    let cancel = coordinator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let report = coordinator.run().await?;
    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{report}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bench_flags_build_a_job() {
        let cli = Cli::try_parse_from([
            "sentry", "bench", "--server", "127.0.0.1:7000", "-c", "4", "-l", "1000", "--keys",
            "a,b", "--random", "--seed", "9", "--duration-secs", "3",
        ])
        .unwrap();
        let Command::Bench(args) = cli.command else {
            panic!("expected bench");
        };
        let job = args.into_job();
        assert_eq!(job.target, "127.0.0.1:7000");
        assert_eq!(job.workers, 4);
        assert_eq!(job.limit, 1000);
        assert_eq!(job.keys, KeySource::Random(vec!["a".into(), "b".into()]));
        assert_eq!(job.seed, Some(9));
        assert_eq!(job.duration, Some(Duration::from_secs(3)));
    }

    #[test]
    fn bench_defaults_are_unbounded_single_worker() {
        let cli = Cli::try_parse_from(["sentry", "bench", "--server", "h:1"]).unwrap();
        let Command::Bench(args) = cli.command else {
            panic!("expected bench");
        };
        let job = args.into_job();
        assert_eq!(job.workers, 1);
        assert_eq!(job.limit, 0);
        assert_eq!(job.keys, KeySource::default());
        assert_eq!(job.lookup_timeout, Duration::from_millis(1000));
    }

    #[test]
    fn random_requires_keys() {
        assert!(Cli::try_parse_from(["sentry", "bench", "--server", "h:1", "--random"]).is_err());
    }

    #[test]
    fn serve_takes_a_config_path() {
        let cli = Cli::try_parse_from(["sentry", "serve", "--config", "/etc/sentry.yaml"]).unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.config, PathBuf::from("/etc/sentry.yaml"));
    }
}
