use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Duration, Utc};
use clap::{Args, Parser, Subcommand};
use pgoprof::storage::LocalDirStore;
use pgoprof::{HarnessConfig, Profiler, RetentionPolicy, SnapshotStore, StoreConfig, aggregate_range, profile};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pgoprof")]
#[command(about = "Inspect, merge and prune continuous CPU profile snapshots")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Smoke test: run the capture pipeline against this CLI process
    ///
    /// The CLI is idle while recording, so snapshots hold few samples. Services
    /// profile themselves by embedding `pgoprof::Profiler`.
    Record {
        #[command(flatten)]
        store: StoreArgs,
        /// Seconds between capture starts
        #[arg(long, default_value_t = 60)]
        interval: u64,
        /// Seconds each capture records
        #[arg(long, default_value_t = 10)]
        duration: u64,
        /// Sampling frequency in Hz
        #[arg(long, default_value_t = 100)]
        frequency: i32,
        /// Stop after this span (e.g. 10m); runs until Ctrl-C when omitted
        #[arg(long = "for")]
        run_for: Option<String>,
    },
    /// Merge the snapshots of a time window into one pprof file
    Merge {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        window: WindowArgs,
        /// Maximum number of snapshots to merge
        #[arg(long, default_value_t = 32)]
        retention: usize,
        /// Which snapshots to keep when the window holds more: largest or smallest
        #[arg(long, default_value = "largest")]
        policy: String,
        #[arg(long, short, default_value = "default.pgo")]
        out: PathBuf,
    },
    /// List the snapshots of a time window
    List {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Delete the snapshots of a time window
    Prune {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Print a summary of a pprof file
    Inspect {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct StoreArgs {
    /// Snapshot directory
    #[arg(long)]
    dir: PathBuf,
    /// Application name used as the file prefix
    #[arg(long)]
    app: String,
}

#[derive(Args)]
struct WindowArgs {
    /// Window length ending now, e.g. 30m, 24h, 7d
    #[arg(long, conflicts_with_all = ["from", "to"])]
    since: Option<String>,
    /// Window start (RFC 3339)
    #[arg(long)]
    from: Option<String>,
    /// Window end (RFC 3339), defaults to now
    #[arg(long)]
    to: Option<String>,
}

impl WindowArgs {
    fn resolve(&self) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let now = Utc::now();
        if let Some(since) = &self.since {
            let span = parse_span(since)?;
            let start = now
                .checked_sub_signed(span)
                .ok_or_else(|| anyhow!("span '{}' reaches before the earliest representable time", since))?;
            return Ok((start, now));
        }
        let start = match &self.from {
            Some(raw) => parse_time(raw)?,
            None => DateTime::<Utc>::MIN_UTC,
        };
        let end = match &self.to {
            Some(raw) => parse_time(raw)?,
            None => now,
        };
        if start > end {
            bail!("window start {} is after its end {}", start.to_rfc3339(), end.to_rfc3339());
        }
        Ok((start, end))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Record {
            store,
            interval,
            duration,
            frequency,
            run_for,
        } => {
            let config = HarnessConfig::new()
                .tick_interval(std::time::Duration::from_secs(interval))
                .capture_duration(std::time::Duration::from_secs(duration))
                .sampling_frequency(frequency);
            let run_for = run_for.as_deref().map(parse_span).transpose()?;
            let store = open_store(&store, 32, RetentionPolicy::default()).await?;
            record(store, config, run_for).await
        }
        Command::Merge {
            store,
            window,
            retention,
            policy,
            out,
        } => {
            let policy: RetentionPolicy = policy.parse()?;
            let store = open_store(&store, retention, policy).await?;
            let (start, end) = window.resolve()?;
            merge_window(&store, start, end, &out).await
        }
        Command::List { store, window } => {
            let store = open_store(&store, 32, RetentionPolicy::default()).await?;
            let (start, end) = window.resolve()?;
            for (at, size) in store.list(start, end).await? {
                println!("{}  {:>10}  {}", at.to_rfc3339(), size, store.file_name(at));
            }
            Ok(())
        }
        Command::Prune { store, window } => {
            let store = open_store(&store, 32, RetentionPolicy::default()).await?;
            let (start, end) = window.resolve()?;
            let removed = store.delete_range(start, end).await?;
            println!("removed {} snapshot(s)", removed);
            Ok(())
        }
        Command::Inspect { file, json } => inspect(&file, json),
    }
}

async fn open_store(args: &StoreArgs, retention: usize, policy: RetentionPolicy) -> Result<LocalDirStore> {
    let config = StoreConfig::new(&args.app)
        .retention_capacity(retention)
        .retention_policy(policy);
    LocalDirStore::open(&args.dir, config)
        .await
        .with_context(|| format!("open snapshot directory {}", args.dir.display()))
}

async fn record(store: LocalDirStore, config: HarnessConfig, run_for: Option<Duration>) -> Result<()> {
    let dir = store.dir().display().to_string();
    let mut profiler = Profiler::new(Arc::new(store), config)?;
    let mut errors = profiler.run()?;
    info!(dir = %dir, "recording, press Ctrl-C to stop");

    let deadline = async {
        match run_for.and_then(|span| span.to_std().ok()) {
            Some(span) => tokio::time::sleep(span).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = &mut deadline => break,
            Some(err) = errors.recv() => warn!(error = %err, "capture problem"),
        }
    }

    profiler.shutdown().await?;
    let stats = profiler.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn merge_window(store: &LocalDirStore, start: DateTime<Utc>, end: DateTime<Utc>, out: &Path) -> Result<()> {
    let aggregate = aggregate_range(store, start, end)
        .await
        .context("merge snapshots")?;
    let bytes = aggregate.encode()?;
    std::fs::write(out, &bytes).with_context(|| format!("write {}", out.display()))?;

    println!(
        "wrote {} ({} bytes, {} stacks, {} functions)",
        out.display(),
        bytes.len(),
        aggregate.samples.len(),
        aggregate.functions.len()
    );
    Ok(())
}

fn inspect(file: &Path, json: bool) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("read {}", file.display()))?;
    let summary = profile::decode(&bytes)?.summary();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("file:         {}", file.display());
    println!("sample types: {}", summary.sample_types.join(", "));
    println!("totals:       {:?}", summary.totals);
    println!("samples:      {}", summary.samples);
    println!("functions:    {}", summary.functions);
    println!("locations:    {}", summary.locations);
    println!("duration:     {:.3}s", summary.duration_nanos as f64 / 1e9);
    Ok(())
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("invalid RFC 3339 timestamp '{}'", raw))
}

fn parse_span(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| anyhow!("span '{}' needs a unit (s, m, h, d)", raw))?;
    let (amount, unit) = raw.split_at(split);
    let amount: i64 = amount
        .parse()
        .with_context(|| format!("invalid span '{}'", raw))?;

    let span = match unit {
        "s" => Duration::try_seconds(amount),
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        other => bail!("unknown span unit '{}' in '{}'", other, raw),
    };
    span.ok_or_else(|| anyhow!("span '{}' is out of range", raw))
}
