//! Storage sink contract and the NDJSON sink.

use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::config::Aggregation;
use crate::labels::SeriesKey;
use crate::tree::CallTree;

/// Error returned by a storage sink.
pub type PutError = Box<dyn std::error::Error + Send + Sync>;

// ============================================================================
// Context
// ============================================================================

/// Cancellation and deadline for one call, handed to the storage sink.
///
/// Clones share the cancel flag.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..Self::default()
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Cancelled, or past the deadline.
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

// ============================================================================
// Storage sink
// ============================================================================

/// One series write.
#[derive(Debug, Clone, Copy)]
pub struct PutInput<'a> {
    pub start_time: SystemTime,
    pub end_time: SystemTime,
    pub spy_name: &'a str,
    pub key: &'a SeriesKey,
    pub tree: &'a CallTree,
    pub aggregation: Aggregation,
    pub units: &'a str,
    /// Samples per second, or 0 when unknown.
    pub sample_rate: u32,
}

/// Storage collaborator receiving the trees built from a profile.
pub trait Putter {
    fn put(&mut self, cx: &Context, input: PutInput<'_>) -> Result<(), PutError>;
}

impl<P: Putter + ?Sized> Putter for Box<P> {
    fn put(&mut self, cx: &Context, input: PutInput<'_>) -> Result<(), PutError> {
        (**self).put(cx, input)
    }
}

/// Samples per second for a profile sampled every `period` units.
///
/// `unit` is the period type's unit string, or `None` when the profile has
/// none. Returns 0 when the rate cannot be known.
pub fn sample_rate(period: i64, unit: Option<&str>) -> u32 {
    let Some(unit) = unit else {
        return 0;
    };
    if period <= 0 {
        return 0;
    }
    let unit_nanos: u64 = match unit {
        "microseconds" => 1_000,
        "milliseconds" => 1_000_000,
        "seconds" => 1_000_000_000,
        _ => 1,
    };
    match unit_nanos.checked_mul(period as u64) {
        Some(interval) => (1_000_000_000 / interval) as u32,
        None => 0,
    }
}

// ============================================================================
// NDJSON sink
// ============================================================================

#[derive(Serialize)]
struct PutRecord<'a> {
    from: u64,
    until: u64,
    spy_name: &'a str,
    key: &'a SeriesKey,
    aggregation: Aggregation,
    units: &'a str,
    sample_rate: u32,
    total: u64,
    stacks: Vec<String>,
}

fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Writes every put as one JSON line: the series key, write metadata and
/// the tree as folded stacks.
#[derive(Debug)]
pub struct NdjsonPutter<W: Write> {
    out: W,
    written: usize,
}

impl<W: Write> NdjsonPutter<W> {
    pub fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    /// Number of records written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Putter for NdjsonPutter<W> {
    fn put(&mut self, cx: &Context, input: PutInput<'_>) -> Result<(), PutError> {
        if cx.is_done() {
            return Err("context cancelled".into());
        }
        let record = PutRecord {
            from: unix_seconds(input.start_time),
            until: unix_seconds(input.end_time),
            spy_name: input.spy_name,
            key: input.key,
            aggregation: input.aggregation,
            units: input.units,
            sample_rate: input.sample_rate,
            total: input.tree.total(),
            stacks: input.tree.collapsed(),
        };
        serde_json::to_writer(&mut self.out, &record)?;
        self.out.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }
}
