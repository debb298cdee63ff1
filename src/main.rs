//! CLI entry point for `flightmail`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use flightmail::config::Config;
use flightmail::ingest::{self, IngestedMessage};
use flightmail::model::message::RawMessage;
use flightmail::pipeline::{BatchReport, Pipeline};

#[derive(Parser)]
#[command(
    name = "flightmail",
    version,
    about = "Find flight confirmations in a mailbox and group them by booking"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (overrides the standard search)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Report what would be forwarded without writing it
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify, parse and group every message
    Scan {
        /// MBOX or .eml files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
        /// Write one CSV row per accepted message
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
        /// Write each group's representative to a new MBOX
        #[arg(long, value_name = "FILE")]
        forward_mbox: Option<PathBuf>,
    },
    /// Show the classification score of each message
    Classify {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
        /// Include rejected messages
        #[arg(long)]
        all: bool,
    },
    /// Show the flight data extracted from each accepted message
    Parse {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => flightmail::config::load_config_from(path)?,
        None => flightmail::config::load_config(),
    };
    if cli.dry_run {
        config.general.dry_run = true;
    }

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Scan {
            paths,
            json,
            csv,
            forward_mbox,
        } => cmd_scan(&config, &paths, json, csv.as_deref(), forward_mbox.as_deref()),
        Commands::Classify { paths, json, all } => cmd_classify(&config, &paths, json, all),
        Commands::Parse { paths, json } => cmd_parse(&config, &paths, json),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // Try to set up file logging
    let log_dir = flightmail::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "flightmail.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "flightmail", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Read every input file with a byte progress bar.
fn ingest_all(config: &Config, paths: &[PathBuf]) -> anyhow::Result<Vec<IngestedMessage>> {
    let mut messages = Vec::new();
    for path in paths {
        if !path.exists() {
            anyhow::bail!("File not found: {}", path.display());
        }
        let file_size = std::fs::metadata(path)?.len();
        let pb = ProgressBar::new(file_size);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} Reading [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
                )?
                .progress_chars("#>-"),
        );

        let read = ingest::read_path_limited(
            path,
            config.general.max_message_size,
            Some(&|current, total| {
                pb.set_length(total);
                pb.set_position(current);
            }),
        )?;
        pb.finish_and_clear();
        messages.extend(read);
    }
    ingest::make_ids_unique(&mut messages);
    Ok(messages)
}

fn raw_messages(ingested: &[IngestedMessage]) -> Vec<RawMessage> {
    ingested.iter().map(|m| m.message.clone()).collect()
}

/// Full pipeline: classify, parse, group, then report and export.
fn cmd_scan(
    config: &Config,
    paths: &[PathBuf],
    json: bool,
    csv: Option<&Path>,
    forward_mbox: Option<&Path>,
) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(config)?;
    let ingested = ingest_all(config, paths)?;
    let messages = raw_messages(&ingested);

    let start = Instant::now();
    let report = pipeline.run(&messages);
    let elapsed = start.elapsed();

    if json {
        println!("{}", flightmail::export::json::to_json(&report)?);
    } else {
        print_summary(paths, &report, elapsed);
        print_groups(&report);
    }

    if let Some(csv_path) = csv {
        let rows = flightmail::export::csv::export_csv(&report, csv_path)?;
        eprintln!("  Exported {rows} row(s) to {}", csv_path.display());
    }

    if let Some(output) = forward_mbox {
        let pb = ProgressBar::new(report.groups.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} Forwarding [{bar:40.cyan/blue}] {pos}/{len}")?
                .progress_chars("#>-"),
        );
        let stats = flightmail::export::mbox::forward_representatives(
            &report,
            &ingested,
            output,
            config.general.dry_run,
            &|current, _total| {
                pb.set_position(current as u64);
            },
        )?;
        pb.finish_and_clear();

        use humansize::{format_size, BINARY};
        if stats.dry_run {
            eprintln!(
                "  Dry run: would forward {} message(s) ({})",
                stats.messages,
                format_size(stats.bytes, BINARY)
            );
        } else {
            eprintln!(
                "  Forwarded {} message(s) ({}) to {}",
                stats.messages,
                format_size(stats.bytes, BINARY),
                output.display()
            );
        }
        if stats.skipped > 0 {
            eprintln!("  Skipped {} representative(s) that could not be re-read", stats.skipped);
        }
    }

    Ok(())
}

/// Score breakdown per message.
fn cmd_classify(config: &Config, paths: &[PathBuf], json: bool, all: bool) -> anyhow::Result<()> {
    let classifier = flightmail::classifier::Classifier::new(&config.classifier)?;
    let ingested = ingest_all(config, paths)?;

    let results: Vec<_> = ingested
        .iter()
        .map(|m| (&m.message, classifier.classify(&m.message)))
        .filter(|(_, c)| all || c.is_confirmation)
        .collect();

    if json {
        let items: Vec<_> = results.iter().map(|(_, c)| c).collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    println!();
    println!(
        "  {:<5} {:>6} {:>6} {:>7} {:>7} {:>5}  {:<40}",
        "Total", "Markup", "Domain", "Subject", "Content", "Flight", "Subject line"
    );
    println!("  {}", "-".repeat(84));
    for (message, c) in &results {
        let subject: String = message.subject.chars().take(39).collect();
        println!(
            "  {:<5} {:>6} {:>6} {:>7} {:>7} {:>5}  {:<40}",
            c.total_score,
            c.schema_score,
            c.domain_score,
            c.subject_score,
            c.content_score,
            if c.is_confirmation { "yes" } else { "no" },
            subject
        );
    }
    println!();
    println!(
        "  {} of {} message(s) shown (threshold {})",
        results.len(),
        ingested.len(),
        classifier.threshold()
    );
    println!();
    Ok(())
}

/// Extracted records per accepted message.
fn cmd_parse(config: &Config, paths: &[PathBuf], json: bool) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(config)?;
    let ingested = ingest_all(config, paths)?;

    let outcomes: Vec<_> = ingested
        .iter()
        .map(|m| pipeline.process(&m.message))
        .filter(|o| o.is_accepted())
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
        return Ok(());
    }

    println!();
    println!(
        "  {:<18} {:<10} {:<8} {:<9} {:<11} {:<24}",
        "Strategy", "Reference", "Flight", "Route", "Date", "Passenger"
    );
    println!("  {}", "-".repeat(84));
    for outcome in &outcomes {
        match &outcome.record {
            Some(r) => println!(
                "  {:<18} {:<10} {:<8} {:<9} {:<11} {:<24}",
                r.strategy.label(),
                r.booking_reference.as_deref().unwrap_or("-"),
                r.flight_number.as_deref().unwrap_or("-"),
                r.route().unwrap_or_else(|| "-".into()),
                r.travel_date.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
                r.passenger_name.as_deref().unwrap_or("-"),
            ),
            None => println!("  {:<18} {}", "(no data)", outcome.message_id),
        }
    }
    println!();
    Ok(())
}

/// Print batch counters in a human-readable table.
fn print_summary(paths: &[PathBuf], report: &BatchReport, elapsed: std::time::Duration) {
    let s = &report.stats;
    println!();
    for path in paths {
        println!("  {:<20} {}", "File", path.display());
    }
    println!("  {:<20} {}", "Messages", s.total);
    println!("  {:<20} {}", "Confirmations", s.accepted);
    println!("  {:<20} {}", "Parsed", s.parsed);
    println!("  {:<20} {}", "Unparsed", s.unparsed);
    println!("  {:<20} {}", "Bookings", s.groups);
    println!("  {:<20} {}", "Duplicates", s.duplicates);
    println!("  {:<20} {:.2?}", "Time", elapsed);
    println!();
}

/// Print every group, representative first.
fn print_groups(report: &BatchReport) {
    if report.groups.is_empty() {
        return;
    }
    println!(
        "  {:<4} {:<10} {:<8} {:<9} {:<11} {:<16} {:<6}",
        "#", "Reference", "Flight", "Route", "Date", "Matched by", "Conf."
    );
    println!("  {}", "-".repeat(70));

    for (i, group) in report.groups.iter().enumerate() {
        let record = report
            .outcome(&group.representative)
            .and_then(|o| o.record.as_ref());
        println!(
            "  {:<4} {:<10} {:<8} {:<9} {:<11} {:<16} {:<6}",
            i + 1,
            record.and_then(|r| r.booking_reference.as_deref()).unwrap_or("-"),
            record.and_then(|r| r.flight_number.as_deref()).unwrap_or("-"),
            record.and_then(|r| r.route()).unwrap_or_else(|| "-".into()),
            record
                .and_then(|r| r.travel_date)
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".into()),
            group.strongest.map(|m| m.label()).unwrap_or("-"),
            group.confidence.to_string(),
        );
        for id in &group.message_ids {
            let marker = if *id == group.representative { "*" } else { " " };
            println!("       {marker} {id}");
        }
    }
    println!();
}
