//! Ingest pprof profiles and write their call trees as NDJSON.
//!
//! Each input file is parsed as one successive call on a single parser, so
//! cumulative sample types (allocations, contentions) are written as the
//! difference between consecutive files.
//!
//! # Usage
//!
//! ```bash
//! pprof_ingest cpu.pb.gz --app myapp -o cpu.ndjson
//! pprof_ingest heap-1.pb.gz heap-2.pb.gz --label env=prod
//! pprof_ingest profile.pb --config ingest.json --skip-exemplars
//! ```

use clap::Parser;
use pprof_ingest::{Context, IngestConfig, NdjsonPutter, StreamingParser};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Parser, Debug)]
#[command(name = "pprof_ingest")]
#[command(about = "Convert pprof profiles into labeled call trees")]
#[command(version)]
struct Args {
    /// Input profiles (gzip, zstd or uncompressed), parsed in order
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// JSON ingestion settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Application name, stored as the series name prefix
    #[arg(long)]
    app: Option<String>,

    /// Static label added to every series
    #[arg(short, long = "label", value_name = "KEY=VALUE", value_parser = parse_label)]
    labels: Vec<(String, String)>,

    /// Only write the aggregate of samples carrying a profile id
    #[arg(long)]
    skip_exemplars: bool,

    /// Start of the profiled time range, in Unix seconds
    #[arg(long, requires = "until")]
    from: Option<u64>,

    /// End of the profiled time range, in Unix seconds
    #[arg(long, requires = "from")]
    until: Option<u64>,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn parse_label(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

fn time_range(args: &Args) -> (SystemTime, SystemTime) {
    match (args.from, args.until) {
        (Some(from), Some(until)) => (
            UNIX_EPOCH + Duration::from_secs(from),
            UNIX_EPOCH + Duration::from_secs(until),
        ),
        _ => {
            let now = SystemTime::now();
            (now, now)
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => IngestConfig::from_file(path)
            .map_err(|e| format!("Failed to load config '{}': {}", path.display(), e))?,
        None => IngestConfig::default(),
    };
    if let Some(app) = &args.app {
        config.labels.insert("__name__".into(), app.clone());
    }
    config.labels.extend(args.labels.iter().cloned());
    config.skip_exemplars |= args.skip_exemplars;

    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(File::create(path).map_err(|e| {
            format!("Failed to create output file '{}': {}", path.display(), e)
        })?),
        None => Box::new(io::stdout().lock()),
    };
    let putter = NdjsonPutter::new(BufWriter::new(writer));
    let mut parser = StreamingParser::new(config.into_parser_config(putter));

    let (start_time, end_time) = time_range(&args);
    let cx = Context::new();
    for input in &args.inputs {
        let profile = fs::read(input)
            .map_err(|e| format!("Failed to open input file '{}': {}", input.display(), e))?;
        let before = parser.putter().written();
        parser
            .parse(&cx, start_time, end_time, &profile)
            .map_err(|e| format!("Failed to parse '{}': {}", input.display(), e))?;
        eprintln!(
            "Parsed '{}': {} series written, {} retained for diffing",
            input.display(),
            parser.putter().written() - before,
            parser.previous().len()
        );
    }

    parser.putter_mut().flush()?;
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
