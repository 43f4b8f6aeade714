use pprof_wire::{
    Counts, DecodeError, Label, Pass, ProfileVisitor, SampleVisitor, ValueType, decode_profile,
    decode_sample, decompress,
};
use serde::Serialize;
use std::env;
use std::fs;
use std::ops::Range;
use std::process::ExitCode;

/// Collects the header tables and per-column value totals.
#[derive(Default)]
struct Inspector {
    strings: Vec<Range<usize>>,
    sample_types: Vec<ValueType>,
    period_type: ValueType,
    period: i64,
    totals: Vec<i64>,
    column: usize,
}

impl ProfileVisitor for Inspector {
    type Error = DecodeError;

    fn string(&mut self, span: Range<usize>) -> pprof_wire::Result<()> {
        self.strings.push(span);
        Ok(())
    }

    fn sample_type(&mut self, value_type: ValueType) -> pprof_wire::Result<()> {
        self.sample_types.push(value_type);
        Ok(())
    }

    fn period_type(&mut self, value_type: ValueType) -> pprof_wire::Result<()> {
        self.period_type = value_type;
        Ok(())
    }

    fn period(&mut self, period: i64) -> pprof_wire::Result<()> {
        self.period = period;
        Ok(())
    }

    fn sample(&mut self, sample: &[u8]) -> pprof_wire::Result<()> {
        self.column = 0;
        decode_sample(sample, self)
    }
}

impl SampleVisitor for Inspector {
    type Error = DecodeError;

    fn location_id(&mut self, _id: u64) -> pprof_wire::Result<()> {
        Ok(())
    }

    fn value(&mut self, value: i64) -> pprof_wire::Result<()> {
        if let Some(total) = self.totals.get_mut(self.column) {
            *total = total.saturating_add(value);
        }
        self.column += 1;
        Ok(())
    }

    fn label(&mut self, _label: Label) -> pprof_wire::Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct MetricSummary {
    r#type: String,
    unit: String,
    total: i64,
}

#[derive(Serialize)]
struct Summary {
    counts: Counts,
    sample_types: Vec<MetricSummary>,
    period_type: String,
    period: i64,
}

impl Inspector {
    fn resolve(&self, profile: &[u8], index: i64) -> String {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.strings.get(i))
            .map(|span| String::from_utf8_lossy(&profile[span.clone()]).into_owned())
            .unwrap_or_else(|| format!("<string {}>", index))
    }

    fn summarize(&self, profile: &[u8], counts: Counts) -> Summary {
        let sample_types = self
            .sample_types
            .iter()
            .zip(&self.totals)
            .map(|(vt, &total)| MetricSummary {
                r#type: self.resolve(profile, vt.r#type),
                unit: self.resolve(profile, vt.unit),
                total,
            })
            .collect();
        Summary {
            counts,
            sample_types,
            period_type: format!(
                "{}/{}",
                self.resolve(profile, self.period_type.r#type),
                self.resolve(profile, self.period_type.unit)
            ),
            period: self.period,
        }
    }
}

fn inspect(raw: &[u8]) -> pprof_wire::Result<Summary> {
    let profile = decompress(raw)?;
    let mut inspector = Inspector::default();
    let counts = decode_profile(&profile, Pass::Header, &mut inspector)?;
    inspector.totals = vec![0; inspector.sample_types.len()];
    decode_profile(&profile, Pass::Samples, &mut inspector)?;
    Ok(inspector.summarize(&profile, counts))
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    let (path, json) = match args.as_slice() {
        [_, path] => (path, false),
        [_, path, flag] if flag == "--json" => (path, true),
        _ => {
            eprintln!("Usage: {} <profile.pb.gz> [--json]", args[0]);
            return ExitCode::from(2);
        }
    };

    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("Error opening '{}': {}", path, e);
            return ExitCode::FAILURE;
        }
    };

    match inspect(&raw) {
        Ok(summary) if json => match serde_json::to_string_pretty(&summary) {
            Ok(out) => {
                println!("{}", out);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        },
        Ok(summary) => {
            println!("Valid pprof profile: {}", path);
            println!("  Strings: {}", summary.counts.strings);
            println!("  Functions: {}", summary.counts.functions);
            println!("  Locations: {}", summary.counts.locations);
            println!("  Samples: {}", summary.counts.samples);
            for metric in &summary.sample_types {
                println!(
                    "  Sample type: {} ({}), total {}",
                    metric.r#type, metric.unit, metric.total
                );
            }
            if summary.period > 0 {
                println!("  Period: {} {}", summary.period, summary.period_type);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Invalid pprof profile '{}': {}", path, e);
            ExitCode::FAILURE
        }
    }
}
