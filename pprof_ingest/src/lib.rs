//! pprof ingestion pipeline.
//!
//! Turns pprof profiles into weighted call trees, one per retained sample
//! type and label set, and writes them to a storage sink. Profiles are
//! decoded in place with [`pprof_wire`]; scratch state is reused from call
//! to call.
//!
//! Cumulative sample types (allocation totals, contention counters) are
//! monotonically increasing. The parser keeps their trees from one call to
//! the next and writes only the difference.
//!
//! # Example
//!
//! ```no_run
//! use std::time::{Duration, SystemTime};
//! use pprof_ingest::{Context, NdjsonPutter, ParserConfig, StreamingParser};
//!
//! let mut config = ParserConfig::new(NdjsonPutter::new(std::io::stdout()));
//! config.labels.insert("__name__".into(), "myapp".into());
//! let mut parser = StreamingParser::new(config);
//!
//! let profile = std::fs::read("heap.pb.gz").unwrap();
//! let end = SystemTime::now();
//! parser
//!     .parse(&Context::new(), end - Duration::from_secs(10), end, &profile)
//!     .unwrap();
//! ```

use pprof_wire::DecodeError;
use thiserror::Error;

pub mod cache;
pub mod config;
pub mod labels;
pub mod output;
pub mod parser;
pub mod sample;
pub mod strings;
pub mod symbols;
pub mod tree;

#[cfg(test)]
mod fixtures;

pub use cache::{CacheKey, Generation, TreeCache};
pub use config::{
    Aggregation, ConfigError, IngestConfig, ParserConfig, SampleTypeConfig, SampleTypes,
    default_sample_types,
};
pub use labels::{Label, LabelSet, PROFILE_ID, SeriesKey};
pub use output::{Context, NdjsonPutter, PutError, PutInput, Putter, sample_rate};
pub use parser::StreamingParser;
pub use tree::CallTree;

/// Errors that can occur while parsing a profile.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("unknown sample types")]
    UnknownSampleTypes,

    #[error("unknown sample type: {0}")]
    UnknownSampleType(String),

    #[error("sample has {len} values, no value for column {column}")]
    MissingValue { column: usize, len: usize },

    #[error("failed to write profile: {0}")]
    Put(#[source] PutError),

    #[error("parse panic")]
    Panic,
}

/// Result type for parsing operations.
pub type Result<T> = std::result::Result<T, ParseError>;
