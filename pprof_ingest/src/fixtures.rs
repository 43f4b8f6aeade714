//! Encoded pprof fixtures for tests.

use flate2::Compression;
use flate2::write::GzEncoder;
use prost::Message;
use std::collections::HashMap;
use std::io::Write;

#[derive(Clone, PartialEq, Message)]
struct PbProfile {
    #[prost(message, repeated, tag = "1")]
    sample_type: Vec<PbValueType>,
    #[prost(message, repeated, tag = "2")]
    sample: Vec<PbSample>,
    #[prost(message, repeated, tag = "4")]
    location: Vec<PbLocation>,
    #[prost(message, repeated, tag = "5")]
    function: Vec<PbFunction>,
    #[prost(string, repeated, tag = "6")]
    string_table: Vec<String>,
    #[prost(message, optional, tag = "11")]
    period_type: Option<PbValueType>,
    #[prost(int64, tag = "12")]
    period: i64,
}

#[derive(Clone, PartialEq, Message)]
struct PbValueType {
    #[prost(int64, tag = "1")]
    r#type: i64,
    #[prost(int64, tag = "2")]
    unit: i64,
}

#[derive(Clone, PartialEq, Message)]
struct PbSample {
    #[prost(uint64, repeated, tag = "1")]
    location_id: Vec<u64>,
    #[prost(int64, repeated, tag = "2")]
    value: Vec<i64>,
    #[prost(message, repeated, tag = "3")]
    label: Vec<PbLabel>,
}

#[derive(Clone, PartialEq, Message)]
struct PbUnpackedSample {
    #[prost(uint64, repeated, packed = "false", tag = "1")]
    location_id: Vec<u64>,
    #[prost(int64, repeated, packed = "false", tag = "2")]
    value: Vec<i64>,
    #[prost(message, repeated, tag = "3")]
    label: Vec<PbLabel>,
}

#[derive(Clone, PartialEq, Message)]
struct PbLabel {
    #[prost(int64, tag = "1")]
    key: i64,
    #[prost(int64, tag = "2")]
    str: i64,
    #[prost(int64, tag = "3")]
    num: i64,
}

#[derive(Clone, PartialEq, Message)]
struct PbLocation {
    #[prost(uint64, tag = "1")]
    id: u64,
    #[prost(message, repeated, tag = "4")]
    line: Vec<PbLine>,
}

#[derive(Clone, PartialEq, Message)]
struct PbLine {
    #[prost(uint64, tag = "1")]
    function_id: u64,
    #[prost(int64, tag = "2")]
    line: i64,
}

#[derive(Clone, PartialEq, Message)]
struct PbFunction {
    #[prost(uint64, tag = "1")]
    id: u64,
    #[prost(int64, tag = "2")]
    name: i64,
}

/// Builds pprof profiles with interned strings.
///
/// Frames are named; each distinct frame gets one function and one
/// location. Stacks passed to [`sample`](ProfileBuilder::sample) are
/// root-first and written to the wire leaf-first.
pub struct ProfileBuilder {
    profile: PbProfile,
    strings: HashMap<String, i64>,
    frames: HashMap<String, u64>,
    sparse_ids: bool,
}

impl Default for ProfileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileBuilder {
    pub fn new() -> Self {
        let mut builder = Self {
            profile: PbProfile::default(),
            strings: HashMap::new(),
            frames: HashMap::new(),
            sparse_ids: false,
        };
        builder.string("");
        builder
    }

    /// Number functions and locations with large, non-sequential ids.
    pub fn sparse_ids(mut self) -> Self {
        self.sparse_ids = true;
        self
    }

    pub fn string(&mut self, s: &str) -> i64 {
        if let Some(&index) = self.strings.get(s) {
            return index;
        }
        let index = self.profile.string_table.len() as i64;
        self.profile.string_table.push(s.to_string());
        self.strings.insert(s.to_string(), index);
        index
    }

    pub fn sample_type(mut self, r#type: &str, unit: &str) -> Self {
        let value_type = PbValueType {
            r#type: self.string(r#type),
            unit: self.string(unit),
        };
        self.profile.sample_type.push(value_type);
        self
    }

    pub fn period(mut self, unit_type: &str, unit: &str, period: i64) -> Self {
        self.profile.period_type = Some(PbValueType {
            r#type: self.string(unit_type),
            unit: self.string(unit),
        });
        self.profile.period = period;
        self
    }

    fn next_id(&self, len: usize) -> u64 {
        if self.sparse_ids {
            1000 + 7 * len as u64
        } else {
            len as u64 + 1
        }
    }

    fn function(&mut self, name: &str) -> u64 {
        let id = self.next_id(self.profile.function.len());
        let name = self.string(name);
        self.profile.function.push(PbFunction { id, name });
        id
    }

    /// Location id for `frame`. A frame written `outer+inner` is one
    /// location with `inner` inlined into `outer`.
    pub fn location(&mut self, frame: &str) -> u64 {
        if let Some(&id) = self.frames.get(frame) {
            return id;
        }
        // Line entries list the innermost function first.
        let line = frame
            .split('+')
            .rev()
            .map(|name| PbLine {
                function_id: self.function(name),
                line: 1,
            })
            .collect::<Vec<_>>();
        let id = self.next_id(self.profile.location.len());
        self.profile.location.push(PbLocation { id, line });
        self.frames.insert(frame.to_string(), id);
        id
    }

    /// Add a sample. `stack` is `;`-separated, root first.
    pub fn sample(mut self, stack: &str, values: &[i64], labels: &[(&str, &str)]) -> Self {
        let mut location_id: Vec<u64> = stack
            .split(';')
            .filter(|f| !f.is_empty())
            .map(|frame| self.location(frame))
            .collect();
        location_id.reverse();
        let label = labels
            .iter()
            .map(|(key, value)| PbLabel {
                key: self.string(key),
                str: self.string(value),
                num: 0,
            })
            .collect();
        self.profile.sample.push(PbSample {
            location_id,
            value: values.to_vec(),
            label,
        });
        self
    }

    /// Add a sample referencing raw location ids, leaf first.
    pub fn raw_sample(mut self, location_id: &[u64], values: &[i64], labels: &[(i64, i64)]) -> Self {
        self.profile.sample.push(PbSample {
            location_id: location_id.to_vec(),
            value: values.to_vec(),
            label: labels
                .iter()
                .map(|&(key, str)| PbLabel { key, str, num: 0 })
                .collect(),
        });
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        self.profile.encode_to_vec()
    }

    /// Encode with samples written as unpacked repeated scalars.
    pub fn encode_unpacked(&self) -> Vec<u8> {
        let mut without_samples = self.profile.clone();
        without_samples.sample.clear();
        let mut buf = without_samples.encode_to_vec();
        for sample in &self.profile.sample {
            let unpacked = PbUnpackedSample {
                location_id: sample.location_id.clone(),
                value: sample.value.clone(),
                label: sample.label.clone(),
            };
            buf.push(0x12);
            buf.extend(unpacked.encode_length_delimited_to_vec());
        }
        buf
    }

    pub fn encode_gzip(&self) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&self.encode()).unwrap();
        encoder.finish().unwrap()
    }

    pub fn encode_zstd(&self) -> Vec<u8> {
        zstd::stream::encode_all(&self.encode()[..], 0).unwrap()
    }
}
