//! Selective, multi-pass decoding of the pprof `Profile` message.
//!
//! Later passes depend on tables only complete after earlier ones, so the
//! same buffer is walked several times. Each [`Pass`] decodes a disjoint set
//! of top-level fields and skips the rest; framing is validated on every pass.

use std::ops::Range;

use serde::Serialize;

use crate::wire::{Field, Reader};
use crate::{DecodeError, Result};

// ============================================================================
// Field numbers
// ============================================================================

mod tag {
    pub mod profile {
        pub const SAMPLE_TYPE: u32 = 1;
        pub const SAMPLE: u32 = 2;
        pub const LOCATION: u32 = 4;
        pub const FUNCTION: u32 = 5;
        pub const STRING_TABLE: u32 = 6;
        pub const PERIOD_TYPE: u32 = 11;
        pub const PERIOD: u32 = 12;
    }

    pub mod value_type {
        pub const TYPE: u32 = 1;
        pub const UNIT: u32 = 2;
    }

    pub mod sample {
        pub const LOCATION_ID: u32 = 1;
        pub const VALUE: u32 = 2;
        pub const LABEL: u32 = 3;
    }

    pub mod label {
        pub const KEY: u32 = 1;
        pub const STR: u32 = 2;
        pub const NUM: u32 = 3;
    }

    pub mod function {
        pub const ID: u32 = 1;
        pub const NAME: u32 = 2;
    }

    pub mod location {
        pub const ID: u32 = 1;
        pub const LINE: u32 = 4;
    }

    pub mod line {
        pub const FUNCTION_ID: u32 = 1;
    }
}

// ============================================================================
// Decoded records
// ============================================================================

/// A metric descriptor: type and unit, both string table indices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ValueType {
    pub r#type: i64,
    pub unit: i64,
}

/// A function record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Function {
    pub id: u64,
    /// String table index of the function name.
    pub name: i64,
}

/// A location record, reduced to the functions it resolves to.
///
/// A location resolves to one function per line entry. The first line is the
/// primary function; any further lines are inlined frames, kept in decode
/// order. A location without lines has a primary function of 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub id: u64,
    pub primary_function: u64,
    pub extra_functions: Vec<u64>,
}

/// A sample label. `key` and `str` are string table indices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Label {
    pub key: i64,
    pub str: i64,
    pub num: i64,
}

/// Top-level record counts, collected on every pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub strings: usize,
    pub sample_types: usize,
    pub samples: usize,
    pub locations: usize,
    pub functions: usize,
}

/// Which top-level fields a pass hands to its visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// String table, sample types, period type and period.
    Header,
    /// Function and location tables.
    Symbols,
    /// Raw sample sub-messages.
    Samples,
}

// ============================================================================
// Visitors
// ============================================================================

/// Receives the fields selected by a [`Pass`].
///
/// Every method defaults to ignoring its input, so a visitor only implements
/// the callbacks of the pass it is used with.
pub trait ProfileVisitor {
    type Error: From<DecodeError>;

    /// A string table entry, given as a byte range of the decoded buffer.
    fn string(&mut self, _span: Range<usize>) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    fn sample_type(&mut self, _value_type: ValueType) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    fn period_type(&mut self, _value_type: ValueType) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    fn period(&mut self, _period: i64) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    fn function(&mut self, _function: Function) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    fn location(&mut self, _location: Location) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    /// One encoded `Sample` sub-message; decode it with [`decode_sample`].
    fn sample(&mut self, _sample: &[u8]) -> std::result::Result<(), Self::Error> {
        Ok(())
    }
}

/// Receives the contents of one sample, in wire order.
pub trait SampleVisitor {
    type Error: From<DecodeError>;

    fn location_id(&mut self, id: u64) -> std::result::Result<(), Self::Error>;

    fn value(&mut self, value: i64) -> std::result::Result<(), Self::Error>;

    fn label(&mut self, label: Label) -> std::result::Result<(), Self::Error>;
}

// ============================================================================
// Decoding
// ============================================================================

/// Walk the top-level profile message, handing the fields selected by `pass`
/// to `visitor`.
pub fn decode_profile<V: ProfileVisitor>(
    buf: &[u8],
    pass: Pass,
    visitor: &mut V,
) -> std::result::Result<Counts, V::Error> {
    use self::tag::profile::*;

    let mut counts = Counts::default();

    for field in Reader::new(buf) {
        let field = field?;
        match field.number {
            STRING_TABLE => {
                counts.strings += 1;
                if pass == Pass::Header {
                    let bytes = field.bytes()?;
                    visitor.string(field.offset..field.offset + bytes.len())?;
                }
            }
            SAMPLE_TYPE => {
                counts.sample_types += 1;
                if pass == Pass::Header {
                    visitor.sample_type(decode_value_type(field.bytes()?)?)?;
                }
            }
            PERIOD_TYPE if pass == Pass::Header => {
                visitor.period_type(decode_value_type(field.bytes()?)?)?;
            }
            PERIOD if pass == Pass::Header => {
                visitor.period(field.int64()?)?;
            }
            FUNCTION => {
                counts.functions += 1;
                if pass == Pass::Symbols {
                    visitor.function(decode_function(field.bytes()?)?)?;
                }
            }
            LOCATION => {
                counts.locations += 1;
                if pass == Pass::Symbols {
                    visitor.location(decode_location(field.bytes()?)?)?;
                }
            }
            SAMPLE => {
                counts.samples += 1;
                if pass == Pass::Samples {
                    visitor.sample(field.bytes()?)?;
                }
            }
            _ => {}
        }
    }

    Ok(counts)
}

/// Decode one `Sample` sub-message.
///
/// Location ids and values are accepted both as repeated scalars and as
/// packed arrays.
pub fn decode_sample<V: SampleVisitor>(
    buf: &[u8],
    visitor: &mut V,
) -> std::result::Result<(), V::Error> {
    use self::tag::sample::*;

    for field in Reader::new(buf) {
        let field = field?;
        match field.number {
            LOCATION_ID => field.for_each_varint(|id| visitor.location_id(id))?,
            VALUE => field.for_each_varint(|v| visitor.value(v as i64))?,
            LABEL => visitor.label(decode_label(field.bytes()?)?)?,
            _ => {}
        }
    }

    Ok(())
}

fn decode_value_type(buf: &[u8]) -> Result<ValueType> {
    let mut value_type = ValueType::default();
    for_each_field(buf, |field| {
        match field.number {
            tag::value_type::TYPE => value_type.r#type = field.int64()?,
            tag::value_type::UNIT => value_type.unit = field.int64()?,
            _ => {}
        }
        Ok(())
    })?;
    Ok(value_type)
}

fn decode_function(buf: &[u8]) -> Result<Function> {
    let mut function = Function::default();
    for_each_field(buf, |field| {
        match field.number {
            tag::function::ID => function.id = field.varint()?,
            tag::function::NAME => function.name = field.int64()?,
            _ => {}
        }
        Ok(())
    })?;
    Ok(function)
}

fn decode_location(buf: &[u8]) -> Result<Location> {
    let mut location = Location::default();
    let mut lines = 0usize;
    for_each_field(buf, |field| {
        match field.number {
            tag::location::ID => location.id = field.varint()?,
            tag::location::LINE => {
                let function_id = decode_line(field.bytes()?)?;
                if lines == 0 {
                    location.primary_function = function_id;
                } else {
                    location.extra_functions.push(function_id);
                }
                lines += 1;
            }
            _ => {}
        }
        Ok(())
    })?;
    Ok(location)
}

fn decode_line(buf: &[u8]) -> Result<u64> {
    let mut function_id = 0;
    for_each_field(buf, |field| {
        if field.number == tag::line::FUNCTION_ID {
            function_id = field.varint()?;
        }
        Ok(())
    })?;
    Ok(function_id)
}

fn decode_label(buf: &[u8]) -> Result<Label> {
    let mut label = Label::default();
    for_each_field(buf, |field| {
        match field.number {
            tag::label::KEY => label.key = field.int64()?,
            tag::label::STR => label.str = field.int64()?,
            tag::label::NUM => label.num = field.int64()?,
            _ => {}
        }
        Ok(())
    })?;
    Ok(label)
}

fn for_each_field<'a>(buf: &'a [u8], mut f: impl FnMut(Field<'a>) -> Result<()>) -> Result<()> {
    for field in Reader::new(buf) {
        f(field?)?;
    }
    Ok(())
}
