//! Chronicle — operational CLI
//!
//! Opens a file-backed ledger directory (`entries.jsonl`, `anchors.jsonl`)
//! and runs one operation against it.
//!
//! Usage:
//!   chronicle --dir ./data append EXCHANGE --context SB-1 --payload '{"user":"hi","assistant":"hello"}'
//!   chronicle --dir ./data verify --anchors
//!   chronicle --dir ./data export --format transcript --from 10 --to 20
//!   chronicle import ./export.jsonl
//!   chronicle --dir ./data stats --json
//!
//! Exit codes: 0 success, 1 operational error, 2 integrity failure.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use chronicle_contracts::{
    error::{ErrorContext, LedgerError, LedgerResult},
    timestamp,
};
use chronicle_core::{Ledger, ScanOptions};
use chronicle_policy::{HybridAnchorPolicy, LedgerConfig};
use chronicle_query::QueryExt;
use chronicle_report::{
    activity, anchor_spans, find_learning_opportunities, incident_export, render_transcript,
    session_summary, InsightConfig, LedgerStats,
};
use chronicle_store::{import_file, open_dir};

/// Directory used when neither `--dir` nor the config's `data_dir` is set.
const DEFAULT_DATA_DIR: &str = "chronicle-data";

// ── CLI definition ────────────────────────────────────────────────────────────

/// Chronicle — tamper-evident, hash-chained event ledger.
#[derive(Parser)]
#[command(
    name = "chronicle",
    about = "Append to, verify, and inspect a Chronicle ledger",
    long_about = "Operates on a file-backed Chronicle ledger directory.\n\
                  Integrity failures exit with status 2, other errors with 1."
)]
struct Cli {
    /// Ledger directory (overrides `data_dir` from the config file).
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// TOML config with `[anchor]`, `[anchor.retry]` and `[signing]` sections.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Append one event.
    Append {
        /// Event type tag, e.g. EXCHANGE or CORRECTION.
        event_type: String,
        #[arg(long)]
        context: String,
        #[arg(long, default_value = "human")]
        actor: String,
        /// JSON object payload.
        #[arg(long, default_value = "{}")]
        payload: String,
        /// External urgency score passed to the anchor policy.
        #[arg(long)]
        score: Option<f64>,
    },
    /// Verify the hash chain (and optionally anchors and signatures).
    Verify {
        #[arg(long)]
        from: Option<u64>,
        #[arg(long)]
        to: Option<u64>,
        /// Also re-derive every anchor digest.
        #[arg(long)]
        anchors: bool,
        /// Also check per-entry signatures (needs `[signing]` in the config).
        #[arg(long)]
        signatures: bool,
        /// Give up after this many seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Export a range as JSON Lines or a readable transcript.
    Export {
        #[arg(long, value_enum, default_value_t = ExportFormat::Jsonl)]
        format: ExportFormat,
        #[arg(long)]
        from: Option<u64>,
        #[arg(long)]
        to: Option<u64>,
        /// Write to this file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Read a JSON Lines export and verify it from genesis.
    Import { file: PathBuf },
    /// List entries matching every given filter.
    Query {
        #[arg(long)]
        context: Option<String>,
        /// Event type tag; repeat to match any of several.
        #[arg(long = "type")]
        event_types: Vec<String>,
        #[arg(long)]
        actor: Option<String>,
        /// Substring of the canonical payload JSON.
        #[arg(long)]
        contains: Option<String>,
        /// RFC 3339 lower bound (inclusive).
        #[arg(long)]
        since: Option<String>,
        /// RFC 3339 upper bound (exclusive).
        #[arg(long)]
        until: Option<String>,
    },
    /// Counts by type, actor and context.
    Stats {
        #[arg(long)]
        json: bool,
        /// Also print activity in buckets of this many minutes.
        #[arg(long)]
        bucket_minutes: Option<i64>,
    },
    /// Print everything recorded for one context.
    Session { context: String },
    /// Recurring corrections and uncertainty flags.
    Insights {
        #[arg(long, default_value_t = 3)]
        min_recurrence: usize,
        #[arg(long)]
        json: bool,
    },
    /// Anchor all unanchored entries now, or list anchors.
    Anchor {
        #[arg(long)]
        list: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Jsonl,
    Transcript,
}

/// Integrity outcome of a command that completed without an operational error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Clean,
    IntegrityFailure,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(Outcome::Clean) => {}
        Ok(Outcome::IntegrityFailure) => std::process::exit(2),
        Err(e) => {
            eprintln!("chronicle error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> LedgerResult<Outcome> {
    let config = match &cli.config {
        Some(path) => LedgerConfig::from_file(path)?,
        None => LedgerConfig::default(),
    };
    let dir = cli
        .dir
        .clone()
        .or_else(|| config.data_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    debug!(dir = %dir.display(), "resolved ledger directory");

    match cli.command {
        Command::Import { file } => import(&file),
        Command::Verify {
            from,
            to,
            anchors,
            signatures,
            timeout_secs,
        } => {
            let ledger = match open_ledger(&dir, &config) {
                Ok(ledger) => ledger,
                Err(LedgerError::ChainIntegrity {
                    first_bad_index,
                    reason,
                    ..
                }) => {
                    println!("chain: INVALID at index {} ({})", first_bad_index, reason);
                    return Ok(Outcome::IntegrityFailure);
                }
                Err(e) => return Err(e),
            };
            let mut options = scan_options(from, to);
            if let Some(secs) = timeout_secs {
                options = options.with_timeout(Duration::from_secs(secs));
            }
            verify(&ledger, &options, anchors, signatures)
        }
        command => {
            let ledger = open_ledger(&dir, &config)?;
            execute(&ledger, command)?;
            Ok(Outcome::Clean)
        }
    }
}

fn open_ledger(dir: &Path, config: &LedgerConfig) -> LedgerResult<Ledger> {
    let (entries, anchors) = open_dir(dir)?;
    let mut builder = Ledger::builder(Box::new(entries), Box::new(anchors))
        .policy(Box::new(HybridAnchorPolicy::new(config.anchor.clone())))
        .anchor_mode(config.anchor.mode)
        .retry(config.anchor.retry.clone());
    if let Some(name) = &config.name {
        builder = builder.name(name.clone());
    }
    if let Some(signing) = &config.signing {
        builder = builder.signer(Box::new(signing.signer()?));
    }
    builder.open()
}

fn scan_options(from: Option<u64>, to: Option<u64>) -> ScanOptions {
    match (from, to) {
        (None, None) => ScanOptions::full(),
        (from, to) => ScanOptions::range(range_of(from, to)),
    }
}

fn range_of(from: Option<u64>, to: Option<u64>) -> RangeInclusive<u64> {
    from.unwrap_or(0)..=to.unwrap_or(u64::MAX)
}

fn io_error(operation: &'static str, source: io::Error) -> LedgerError {
    LedgerError::Io {
        ctx: ErrorContext::new(operation),
        source,
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> LedgerResult<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| LedgerError::Serialization {
        ctx: ErrorContext::new("print"),
        reason: e.to_string(),
    })?;
    println!("{}", text);
    Ok(())
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn execute(ledger: &Ledger, command: Command) -> LedgerResult<()> {
    match command {
        Command::Append {
            event_type,
            context,
            actor,
            payload,
            score,
        } => {
            let body: serde_json::Value =
                serde_json::from_str(&payload).map_err(|e| LedgerError::Serialization {
                    ctx: ErrorContext::new("append")
                        .in_context(context.as_str()),
                    reason: format!("payload is not valid JSON: {}", e),
                })?;
            let entry = match score {
                Some(score) => {
                    ledger.append_scored(event_type.as_str(), &context, &actor, &body, score)?
                }
                None => ledger.append(event_type.as_str(), &context, &actor, &body)?,
            };
            ledger.flush_anchors();
            println!("#{} {}", entry.sequence, entry.entry_hash);
        }

        Command::Export {
            format,
            from,
            to,
            output,
        } => {
            let mut writer: Box<dyn Write> = match &output {
                Some(path) => Box::new(BufWriter::new(
                    File::create(path).map_err(|e| io_error("export", e))?,
                )),
                None => Box::new(BufWriter::new(io::stdout().lock())),
            };
            match format {
                ExportFormat::Jsonl => {
                    let written = ledger.export_jsonl(&scan_options(from, to), &mut writer)?;
                    info!(written, "export complete");
                }
                ExportFormat::Transcript => {
                    let text = if from.is_some() || to.is_some() {
                        incident_export(ledger, range_of(from, to))?
                    } else {
                        render_transcript(&ledger.snapshot()?)
                    };
                    writer
                        .write_all(text.as_bytes())
                        .map_err(|e| io_error("export", e))?;
                }
            }
            writer.flush().map_err(|e| io_error("export", e))?;
        }

        Command::Query {
            context,
            event_types,
            actor,
            contains,
            since,
            until,
        } => {
            let mut query = ledger.query();
            if let Some(context) = context {
                query = query.context(context);
            }
            if !event_types.is_empty() {
                query = query.event_types(event_types);
            }
            if let Some(actor) = actor {
                query = query.actor(actor);
            }
            if let Some(needle) = contains {
                query = query.payload_contains(needle);
            }
            if let Some(since) = since {
                query = query.since(parse_time(&since)?);
            }
            if let Some(until) = until {
                query = query.until(parse_time(&until)?);
            }
            print!("{}", render_transcript(&query.collect()?));
        }

        Command::Stats {
            json,
            bucket_minutes,
        } => {
            let entries = ledger.snapshot()?;
            let stats = LedgerStats::from_entries(&entries);
            let buckets = match bucket_minutes {
                Some(minutes) => Some(activity(&entries, chrono::Duration::minutes(minutes))?),
                None => None,
            };
            if json {
                print_json(&serde_json::json!({ "stats": stats, "activity": buckets }))?;
            } else {
                print_stats(&stats);
                for bucket in buckets.iter().flatten() {
                    println!("  {}  {}", timestamp::format(&bucket.start), bucket.count);
                }
            }
        }

        Command::Session { context } => {
            print!("{}", session_summary(ledger, &context)?);
        }

        Command::Insights {
            min_recurrence,
            json,
        } => {
            let config = InsightConfig {
                min_recurrence,
                ..InsightConfig::default()
            };
            let insights = find_learning_opportunities(&ledger.snapshot()?, &config);
            if json {
                print_json(&insights)?;
            } else if insights.is_empty() {
                println!("no recurring patterns (min recurrence {})", min_recurrence);
            } else {
                for insight in &insights {
                    println!("{}", insight);
                }
            }
        }

        Command::Anchor { list } => {
            if list {
                for span in anchor_spans(&ledger.anchors()?) {
                    println!(
                        "{}  {}..={}  {:<8} {}  {}",
                        span.anchor_id,
                        span.from_sequence,
                        span.up_to_sequence,
                        span.trigger_reason.as_str(),
                        timestamp::format(&span.created_at),
                        span.digest_short
                    );
                }
            } else {
                match ledger.anchor_now()? {
                    Some(anchor) => println!(
                        "anchored {}..={} as {}",
                        anchor.from_sequence(),
                        anchor.up_to_sequence,
                        anchor.anchor_id
                    ),
                    None => println!("nothing to anchor"),
                }
            }
        }

        Command::Import { .. } | Command::Verify { .. } => {}
    }
    Ok(())
}

fn verify(
    ledger: &Ledger,
    options: &ScanOptions,
    anchors: bool,
    signatures: bool,
) -> LedgerResult<Outcome> {
    let mut outcome = Outcome::Clean;

    let chain = ledger.verify_with(options)?;
    match chain.first_bad_index {
        None => println!("chain: ok ({} entries checked)", chain.checked),
        Some(index) => {
            println!(
                "chain: INVALID at index {} ({})",
                index,
                chain.reason.as_deref().unwrap_or("unknown")
            );
            outcome = Outcome::IntegrityFailure;
        }
    }

    if anchors {
        let report = ledger.verify_anchors()?;
        match report.first_bad_anchor {
            None => println!("anchors: ok ({} checked)", report.anchors_checked),
            Some(i) => {
                println!(
                    "anchors: INVALID at anchor {} ({})",
                    i,
                    report.reason.as_deref().unwrap_or("unknown")
                );
                outcome = Outcome::IntegrityFailure;
            }
        }
    }

    if signatures {
        let report = ledger.verify_signatures()?;
        println!(
            "signatures: {} verified, {} unsigned, {} invalid",
            report.verified,
            report.unsigned.len(),
            report.invalid.len()
        );
        if !report.invalid.is_empty() {
            println!("  invalid: {:?}", report.invalid);
        }
        if !report.all_valid() {
            outcome = Outcome::IntegrityFailure;
        }
    }

    Ok(outcome)
}

fn import(file: &Path) -> LedgerResult<Outcome> {
    let log = import_file(file, &ScanOptions::full())?;
    let entries = log.entries();
    println!(
        "imported {} records ({} readable) from {}",
        log.records.len(),
        entries.len(),
        file.display()
    );
    print_stats(&LedgerStats::from_entries(&entries));
    match log.verification.first_bad_index {
        None => {
            println!("chain: ok ({} entries checked)", log.verification.checked);
            Ok(Outcome::Clean)
        }
        Some(index) => {
            println!(
                "chain: INVALID at index {} ({})",
                index,
                log.verification.reason.as_deref().unwrap_or("unknown")
            );
            Ok(Outcome::IntegrityFailure)
        }
    }
}

fn parse_time(s: &str) -> LedgerResult<chrono::DateTime<chrono::Utc>> {
    timestamp::parse(s).map_err(|e| LedgerError::Config {
        reason: format!("invalid timestamp '{}': {}", s, e),
    })
}

fn print_stats(stats: &LedgerStats) {
    println!("{} entries", stats.total);
    if let (Some(first), Some(last)) = (stats.first_timestamp, stats.last_timestamp) {
        println!("  {} .. {}", timestamp::format(&first), timestamp::format(&last));
    }
    for (label, counts) in [
        ("by type", &stats.by_event_type),
        ("by actor", &stats.by_actor),
        ("by context", &stats.by_context),
    ] {
        println!("{}:", label);
        for (key, count) in counts {
            println!("  {:<20} {}", key, count);
        }
    }
}
