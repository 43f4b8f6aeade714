//! The streaming profile parser.
//!
//! A [`StreamingParser`] turns one pprof profile per [`parse`] call into call
//! trees, one per retained sample type and label set, and hands them to its
//! [`Putter`]. Cumulative sample types are written as the difference to the
//! previous call.
//!
//! [`parse`]: StreamingParser::parse

use std::any::Any;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::SystemTime;

use fnv::FnvHashMap;

use pprof_wire::{
    DecodeError, Pass, ProfileVisitor, ValueType, decode_profile, decode_sample, decompress,
};

use crate::cache::{CacheKey, Generation, TreeCache};
use crate::config::{ParserConfig, SampleTypeConfig, SampleTypes};
use crate::labels::{Label, NAME, PROFILE_ID, SeriesKey};
use crate::output::{Context, PutInput, Putter, sample_rate};
use crate::sample::{SampleAccumulator, SampleReader};
use crate::strings::StringTable;
use crate::symbols::SymbolIndex;
use crate::tree::CallTree;
use crate::{ParseError, Result};

type SampleTypeFilter = Box<dyn Fn(&str) -> bool + Send>;

/// Header tables of the profile being parsed.
#[derive(Debug, Default)]
struct Header {
    strings: StringTable,
    sample_types: Vec<ValueType>,
    period_type: ValueType,
    period: i64,
    /// Indices into `sample_types` of the retained metric columns.
    retained: Vec<usize>,
    profile_id: Option<i64>,
}

impl Header {
    fn reset(&mut self) {
        self.strings.clear();
        self.sample_types.clear();
        self.period_type = ValueType::default();
        self.period = 0;
        self.retained.clear();
        self.profile_id = None;
    }
}

impl ProfileVisitor for Header {
    type Error = DecodeError;

    fn string(&mut self, span: std::ops::Range<usize>) -> pprof_wire::Result<()> {
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
}

/// Visitor of the samples pass: accumulates each sample and inserts it into
/// the trees of its retained columns.
struct SamplePass<'a> {
    buf: &'a [u8],
    header: &'a Header,
    symbols: &'a SymbolIndex,
    sample: &'a mut SampleAccumulator,
    cache: &'a mut TreeCache,
    skip_exemplars: bool,
}

impl ProfileVisitor for SamplePass<'_> {
    type Error = ParseError;

    fn sample(&mut self, raw: &[u8]) -> Result<()> {
        self.sample.reset();
        decode_sample(
            raw,
            &mut SampleReader {
                symbols: self.symbols,
                sample: &mut *self.sample,
            },
        )?;
        self.sample.finish();

        let has_exemplar = self
            .header
            .profile_id
            .is_some_and(|key| self.sample.split_exemplar(key));

        let sample = &*self.sample;
        let strings = &self.header.strings;
        let buf = self.buf;
        let frames = move || sample.stack.iter().map(move |&i| strings.resolve(buf, i));

        for &index in &self.header.retained {
            let sample_type = self.header.sample_types[index].r#type;
            let value = sample.value(index).ok_or(ParseError::MissingValue {
                column: index,
                len: sample.values.len(),
            })?;
            // Zero and negative weights leave the trees untouched.
            if value <= 0 {
                continue;
            }
            let value = value as u64;

            if has_exemplar {
                self.cache
                    .insert(sample_type, sample.aggregate_labels(), frames(), value);
                if self.skip_exemplars {
                    continue;
                }
            }
            self.cache.insert(sample_type, &sample.labels, frames(), value);
        }
        Ok(())
    }
}

/// Converts pprof profiles into call trees and writes them to a [`Putter`].
///
/// The parser owns all scratch state and is reused across calls; it must
/// not be shared between concurrent callers.
pub struct StreamingParser<P> {
    putter: P,
    spy_name: String,
    labels: BTreeMap<String, String>,
    skip_exemplars: bool,
    sample_types: SampleTypes,
    filter: Option<SampleTypeFilter>,

    header: Header,
    symbols: SymbolIndex,
    sample: SampleAccumulator,
    cache: TreeCache,
    previous: Generation,
}

impl<P: Putter> StreamingParser<P> {
    pub fn new(config: ParserConfig<P>) -> Self {
        Self {
            putter: config.putter,
            spy_name: config.spy_name,
            labels: config.labels,
            skip_exemplars: config.skip_exemplars,
            sample_types: config.sample_types,
            filter: None,
            header: Header::default(),
            symbols: SymbolIndex::default(),
            sample: SampleAccumulator::default(),
            cache: TreeCache::default(),
            previous: Generation::default(),
        }
    }

    /// Replace the sample type filter. By default a sample type is retained
    /// when it has a configuration entry.
    pub fn set_sample_type_filter(&mut self, filter: impl Fn(&str) -> bool + Send + 'static) {
        self.filter = Some(Box::new(filter));
    }

    /// Restore the default sample type filter.
    pub fn clear_sample_type_filter(&mut self) {
        self.filter = None;
    }

    /// Whether sample type `name` passes the current filter.
    pub fn retains_sample_type(&self, name: &str) -> bool {
        match &self.filter {
            Some(filter) => filter(name),
            None => self.sample_types.contains_key(name),
        }
    }

    pub fn putter(&self) -> &P {
        &self.putter
    }

    pub fn putter_mut(&mut self) -> &mut P {
        &mut self.putter
    }

    pub fn into_putter(self) -> P {
        self.putter
    }

    /// Cumulative series retained by the last successful call.
    pub fn previous(&self) -> &Generation {
        &self.previous
    }

    /// Parse one profile, optionally gzip or zstd compressed, and write its
    /// series for the time range `start_time..end_time`.
    ///
    /// On error nothing about the previous call's state changes, though
    /// series written before the error remain written.
    pub fn parse(
        &mut self,
        cx: &Context,
        start_time: SystemTime,
        end_time: SystemTime,
        profile: &[u8],
    ) -> Result<()> {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.parse_profile(cx, start_time, end_time, profile)
        }));
        match result {
            Ok(result) => result,
            Err(payload) => {
                log::error!("parse panic: {}", panic_message(&*payload));
                Err(ParseError::Panic)
            }
        }
    }

    fn parse_profile(
        &mut self,
        cx: &Context,
        start_time: SystemTime,
        end_time: SystemTime,
        profile: &[u8],
    ) -> Result<()> {
        let profile = decompress(profile)?;
        let buf: &[u8] = &profile;

        self.header.reset();
        let counts = decode_profile(buf, Pass::Header, &mut self.header)?;
        self.select_sample_types(buf)?;
        self.header.profile_id = self.header.strings.position(buf, PROFILE_ID);

        self.symbols.reset(counts.functions, counts.locations);
        decode_profile(buf, Pass::Symbols, &mut self.symbols)?;

        let sample_types = &self.header.sample_types;
        self.cache
            .reset(self.header.retained.iter().map(|&i| sample_types[i].r#type));
        decode_profile(
            buf,
            Pass::Samples,
            &mut SamplePass {
                buf,
                header: &self.header,
                symbols: &self.symbols,
                sample: &mut self.sample,
                cache: &mut self.cache,
                skip_exemplars: self.skip_exemplars,
            },
        )?;

        log::debug!(
            "decoded profile: {} strings, {} functions, {} locations, {} samples, {} series",
            counts.strings,
            counts.functions,
            counts.locations,
            counts.samples,
            self.cache.len()
        );

        let next = self.emit(cx, start_time, end_time, buf)?;
        self.previous = next;
        Ok(())
    }

    fn select_sample_types(&mut self, buf: &[u8]) -> Result<()> {
        let mut retained = std::mem::take(&mut self.header.retained);
        retained.clear();
        for (i, value_type) in self.header.sample_types.iter().enumerate() {
            let name = self.header.strings.resolve(buf, value_type.r#type);
            if self.retains_sample_type(&name) {
                retained.push(i);
            }
        }
        self.header.retained = retained;

        if self.header.retained.is_empty() {
            return Err(ParseError::UnknownSampleTypes);
        }
        Ok(())
    }

    /// Write every tree of the current profile and build the generation the
    /// next call diffs against.
    fn emit(
        &mut self,
        cx: &Context,
        start_time: SystemTime,
        end_time: SystemTime,
        buf: &[u8],
    ) -> Result<Generation> {
        let header = &self.header;
        let period_unit = match header.period_type.unit {
            unit if unit > 0 => header
                .strings
                .get(buf, unit)
                .map(String::from_utf8_lossy),
            _ => None,
        };
        let rate = sample_rate(header.period, period_unit.as_deref());

        // Distinct entries may resolve to the same series, for instance
        // when labels resolve to empty strings. Their trees are merged.
        let mut batch: Vec<Series<'_>> = Vec::with_capacity(self.cache.len());
        let mut positions: FnvHashMap<CacheKey, usize> = FnvHashMap::default();
        for (sample_type, labels, tree) in self.cache.drain() {
            let name = header.strings.resolve(buf, sample_type);
            let Some(config) = self.sample_types.get(name.as_ref()) else {
                return Err(ParseError::UnknownSampleType(name.into_owned()));
            };

            let metric = config.display_name.as_deref().unwrap_or(&name);
            let series = series_key(&self.labels, &header.strings, buf, labels.as_slice(), metric);
            let key = CacheKey {
                sample_type: name.into_owned(),
                series,
            };
            if let Some(&i) = positions.get(&key) {
                log::trace!("merging trees of {}", key.series);
                batch[i].tree.merge(&tree);
                continue;
            }

            let units = match &config.units {
                Some(units) => Cow::Borrowed(units.as_str()),
                None => {
                    let unit = header
                        .sample_types
                        .iter()
                        .find(|value_type| value_type.r#type == sample_type)
                        .map_or(0, |value_type| value_type.unit);
                    header.strings.resolve(buf, unit)
                }
            };
            positions.insert(key.clone(), batch.len());
            batch.push(Series {
                key,
                config,
                units,
                tree,
            });
        }

        let mut next = Generation::default();
        for Series {
            key,
            config,
            units,
            tree,
        } in batch
        {
            let delta;
            let emitted = if config.cumulative {
                let Some(previous) = self.previous.get(&key) else {
                    log::trace!("retaining first sight of {}", key.series);
                    next.insert(key, tree);
                    continue;
                };
                delta = tree.diff(previous);
                &delta
            } else {
                &tree
            };

            self.putter
                .put(
                    cx,
                    PutInput {
                        start_time,
                        end_time,
                        spy_name: &self.spy_name,
                        key: &key.series,
                        tree: emitted,
                        aggregation: config.aggregation,
                        units: &units,
                        sample_rate: if config.sampled { rate } else { 0 },
                    },
                )
                .map_err(ParseError::Put)?;
            log::trace!("wrote {} ({} total)", key.series, emitted.total());

            if config.cumulative {
                next.insert(key, tree);
            }
        }
        Ok(next)
    }
}

/// One series ready to be written.
struct Series<'a> {
    key: CacheKey,
    config: &'a SampleTypeConfig,
    units: Cow<'a, str>,
    tree: CallTree,
}

/// Series key for `labels`: the sample's labels overridden by the static
/// labels, with `.metric` appended to the configured name.
fn series_key(
    static_labels: &BTreeMap<String, String>,
    strings: &StringTable,
    buf: &[u8],
    labels: &[Label],
    metric: &str,
) -> SeriesKey {
    let mut merged = BTreeMap::new();
    for label in labels {
        let key = strings.resolve(buf, label.key);
        let value = strings.resolve(buf, label.value);
        if key.is_empty() || value.is_empty() {
            continue;
        }
        merged.insert(key.into_owned(), value.into_owned());
    }
    merged.extend(
        static_labels
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );
    let name = merged.entry(NAME.to_string()).or_default();
    name.push('.');
    name.push_str(metric);
    SeriesKey::new(merged)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
