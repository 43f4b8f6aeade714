//! Streaming decoder for pprof profiles.
//!
//! This library reads the pprof protobuf message directly from a byte
//! buffer, handing selected fields to a visitor instead of building a full
//! object graph. String and byte fields are zero-copy views into the input.
//!
//! A profile is read in three passes over the same buffer:
//!
//! 1. [`Pass::Header`] - string table, sample types, period type and period.
//! 2. [`Pass::Symbols`] - function and location tables.
//! 3. [`Pass::Samples`] - one raw sample sub-message at a time, decoded
//!    with [`decode_sample`].
//!
//! # Example
//!
//! ```no_run
//! use pprof_wire::{decompress, decode_profile, Pass, ProfileVisitor, ValueType};
//!
//! #[derive(Default)]
//! struct SampleTypes(Vec<ValueType>);
//!
//! impl ProfileVisitor for SampleTypes {
//!     type Error = pprof_wire::DecodeError;
//!
//!     fn sample_type(&mut self, value_type: ValueType) -> pprof_wire::Result<()> {
//!         self.0.push(value_type);
//!         Ok(())
//!     }
//! }
//!
//! let raw = std::fs::read("cpu.pb.gz").unwrap();
//! let profile = decompress(&raw).unwrap();
//! let mut types = SampleTypes::default();
//! let counts = decode_profile(&profile, Pass::Header, &mut types).unwrap();
//! println!("{} sample types, {} samples", types.0.len(), counts.samples);
//! ```

use thiserror::Error;

pub mod decompress;
pub mod profile;
pub mod wire;

pub use decompress::decompress;
pub use profile::{
    Counts, Function, Label, Location, Pass, ProfileVisitor, SampleVisitor, ValueType,
    decode_profile, decode_sample,
};
pub use wire::{Field, Reader, Value, WireType};

/// Errors that can occur while decoding a profile.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to read pprof profile header")]
    ShortHeader,

    #[error("failed to decompress pprof profile: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("unexpected end of data at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("varint at offset {offset} is longer than 10 bytes")]
    VarintOverflow { offset: usize },

    #[error("length {len} at offset {offset} exceeds the {remaining} remaining bytes")]
    LengthOutOfBounds {
        offset: usize,
        len: u64,
        remaining: usize,
    },

    #[error("invalid field number {number} at offset {offset}")]
    InvalidFieldNumber { number: u64, offset: usize },

    #[error("unsupported wire type {wire_type} for field {field}")]
    UnsupportedWireType { field: u32, wire_type: u8 },

    #[error("field {field} has wire type {found:?}, expected {expected}")]
    UnexpectedWireType {
        field: u32,
        found: WireType,
        expected: &'static str,
    },
}

/// Result type for decoding operations.
pub type Result<T> = std::result::Result<T, DecodeError>;
