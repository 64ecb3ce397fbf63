//! aeps-sim - synthetic AEPS traffic and one-shot evaluation
//!
//! Usage:
//!   aeps-sim generate --days 15 --scenario nsdl_outage > records.jsonl
//!   aeps-sim evaluate --scenario state_surge --window 7 --sensitivity 2
//!   aeps-sim evaluate --input records.jsonl --config aeps.json --format summary
//!   aeps-sim scenarios

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use aeps_core::{
    Aggregator, EngineConfig, EvaluationReport, EvaluationRequest, Evaluator, InMemorySource,
    MetricRecord,
};
use aeps_sim::{Generator, GeneratorConfig, scenarios};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{Level, info};

#[derive(Parser)]
#[command(name = "aeps-sim")]
#[command(about = "Synthetic AEPS records with incident injection, and engine evaluation")]
struct Cli {
    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct GenerateArgs {
    /// RNG seed
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Days of history including the final day
    #[arg(short, long, default_value = "15")]
    days: u32,

    /// Final generated date (YYYY-MM-DD)
    #[arg(long)]
    end_date: Option<NaiveDate>,

    /// Scenarios to inject (comma-separated, see `scenarios`)
    #[arg(short, long)]
    scenario: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate records as JSON lines
    Generate {
        #[command(flatten)]
        generate: GenerateArgs,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Evaluate generated (or loaded) records for the final day
    Evaluate {
        #[command(flatten)]
        generate: GenerateArgs,

        /// Read JSON-lines records instead of generating them
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Engine configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Date to evaluate; defaults to the final generated date
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Lookback window in days (7..=90)
        #[arg(short, long)]
        window: Option<u32>,

        /// Sensitivity in sigma (1, 2 or 3)
        #[arg(long)]
        sensitivity: Option<u8>,

        /// Movers per list (1..=25)
        #[arg(long)]
        top_n: Option<usize>,

        #[arg(long, default_value = "0")]
        hour_start: u8,

        #[arg(long, default_value = "23")]
        hour_end: u8,

        /// Restrict to aggregators (repeatable)
        #[arg(long = "aggregator")]
        aggregators: Vec<Aggregator>,

        /// Restrict to states (repeatable)
        #[arg(long = "state")]
        states: Vec<String>,

        /// Restrict to banks (repeatable)
        #[arg(long = "bank")]
        banks: Vec<String>,

        #[arg(short, long, default_value = "json")]
        format: OutputFormat,

        /// Print engine metrics after the report
        #[arg(long)]
        metrics: bool,
    },

    /// List available scenarios
    Scenarios,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Summary,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    let result = match cli.command {
        Commands::Generate { generate, output } => run_generate(&generate, output),
        Commands::Evaluate {
            generate,
            input,
            config,
            date,
            window,
            sensitivity,
            top_n,
            hour_start,
            hour_end,
            aggregators,
            states,
            banks,
            format,
            metrics,
        } => run_evaluate(EvaluateArgs {
            generate,
            input,
            config,
            date,
            window,
            sensitivity,
            top_n,
            hours: (hour_start, hour_end),
            aggregators,
            states,
            banks,
            format,
            metrics,
        }),
        Commands::Scenarios => {
            run_scenarios();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn generate_records(args: &GenerateArgs) -> Result<(Vec<MetricRecord>, NaiveDate), Box<dyn std::error::Error>> {
    let mut config = GeneratorConfig {
        seed: args.seed,
        days: args.days,
        ..GeneratorConfig::default()
    };
    if let Some(end) = args.end_date {
        config.end_date = end;
    }
    let end = config.end_date;

    let incidents = match &args.scenario {
        Some(names) => scenarios::resolve(names, end)?,
        None => Vec::new(),
    };
    info!(
        seed = args.seed,
        days = args.days,
        end_date = %end,
        incidents = incidents.len(),
        "Generating records"
    );

    let records = Generator::new(config)?.with_incidents(incidents).generate();
    Ok((records, end))
}

fn run_generate(args: &GenerateArgs, output: Option<PathBuf>) -> CliResult {
    let (records, _) = generate_records(args)?;

    let mut out: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    for record in &records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    info!(records = records.len(), "Records written");
    Ok(())
}

struct EvaluateArgs {
    generate: GenerateArgs,
    input: Option<PathBuf>,
    config: Option<PathBuf>,
    date: Option<NaiveDate>,
    window: Option<u32>,
    sensitivity: Option<u8>,
    top_n: Option<usize>,
    hours: (u8, u8),
    aggregators: Vec<Aggregator>,
    states: Vec<String>,
    banks: Vec<String>,
    format: OutputFormat,
    metrics: bool,
}

fn read_records(path: &Path) -> Result<Vec<MetricRecord>, Box<dyn std::error::Error>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}

fn build_request(args: &EvaluateArgs, date: NaiveDate) -> EvaluationRequest {
    let mut request = EvaluationRequest::for_date(date)
        .hours(args.hours.0, args.hours.1)
        .aggregators(args.aggregators.iter().copied())
        .states(args.states.iter().cloned())
        .banks(args.banks.iter().cloned());
    request.window_days = args.window;
    request.sensitivity = args.sensitivity;
    request.top_n = args.top_n;
    request
}

fn run_evaluate(args: EvaluateArgs) -> CliResult {
    let config = match &args.config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };

    let (records, date) = match &args.input {
        Some(path) => {
            let records = read_records(path)?;
            let last = records.iter().map(MetricRecord::date).max();
            let date = args
                .date
                .or(last)
                .ok_or("input has no records and no --date was given")?;
            (records, date)
        }
        None => {
            let (records, end) = generate_records(&args.generate)?;
            (records, args.date.unwrap_or(end))
        }
    };

    let request = build_request(&args, date);
    let evaluator = Evaluator::new(InMemorySource::new(records), config)?;
    let report = evaluator.evaluate(&request)?;

    match args.format {
        OutputFormat::Json => println!("{}", report.to_json()?),
        OutputFormat::Summary => print_summary(&report),
    }
    if args.metrics {
        print!("{}", aeps_core::metrics::gather_text());
    }
    Ok(())
}

fn print_summary(report: &EvaluationReport) {
    let s = &report.summary;
    println!("Evaluation {} for {}", report.evaluation_id, report.evaluation_date);
    println!(
        "  window {}d, sensitivity {}σ, hours {:02}-{:02}, {} records",
        report.window_days,
        report.sensitivity_sigma,
        report.hours.start(),
        report.hours.end(),
        report.record_count
    );
    match report.health.composite.score() {
        Some(score) => println!(
            "  health {:.1} ({}), txn {} / bio-auth {}",
            score,
            report.health.composite.tier().map(|t| t.to_string()).unwrap_or_default(),
            report.health.transaction.rate_pct,
            report.health.bioauth.rate_pct
        ),
        None => println!("  health undefined"),
    }
    println!(
        "  series {}: {} lower, {} upper, {} insufficient, {} undefined; alert {}",
        s.evaluated, s.lower, s.upper, s.insufficient_data, s.undefined, s.alert
    );

    for o in report.anomalies() {
        let z = o
            .classification
            .flag()
            .and_then(|f| f.z_score)
            .map(|z| format!("{:+.2}", z))
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "  ! {} observed {} (z {}){}",
            o.key(),
            o.observed,
            z,
            if o.partial { " [partial]" } else { "" }
        );
    }

    for rank in [&report.state_movers, &report.bank_movers] {
        for e in &rank.gainers {
            println!("  + {:?} {} {:+.1}%", rank.kind, e.id, e.deviation_pct);
        }
        for e in &rank.decliners {
            println!("  - {:?} {} {:+.1}%", rank.kind, e.id, e.deviation_pct);
        }
    }
}

fn run_scenarios() {
    println!("Available scenarios:");
    for s in scenarios::SCENARIOS {
        println!("  {:<16} {}", s.name, s.description);
    }
}
