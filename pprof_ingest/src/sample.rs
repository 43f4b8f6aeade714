//! Per-sample scratch state.

use pprof_wire::{DecodeError, SampleVisitor};

use crate::labels::Label;
use crate::symbols::SymbolIndex;

/// Resolved contents of the sample being processed.
///
/// One accumulator is reused for every sample of a profile; [`reset`]
/// clears it without releasing its buffers.
///
/// [`reset`]: SampleAccumulator::reset
#[derive(Debug, Default)]
pub struct SampleAccumulator {
    /// Frame name string indices. Leaf-first while decoding, root-first
    /// after [`finish`](SampleAccumulator::finish).
    pub stack: Vec<i64>,
    /// Every value of the sample, in metric column order.
    pub values: Vec<i64>,
    /// Sorted labels, without entries lacking a key or a string value.
    pub labels: Vec<Label>,
    without: Vec<Label>,
}

impl SampleAccumulator {
    pub fn reset(&mut self) {
        self.stack.clear();
        self.values.clear();
        self.labels.clear();
        self.without.clear();
    }

    /// Push the frames of location `id`: the primary function first, then
    /// any inlined functions. Unknown locations and functions are skipped.
    pub fn push_location(&mut self, symbols: &SymbolIndex, id: u64) {
        let Some(location) = symbols.find_location(id) else {
            return;
        };
        let functions =
            std::iter::once(location.primary_function).chain(location.extra_functions.iter().copied());
        for function in functions {
            if function == 0 {
                continue;
            }
            if let Some(name) = symbols.find_function(function) {
                self.stack.push(name);
            }
        }
    }

    pub fn push_value(&mut self, value: i64) {
        self.values.push(value);
    }

    pub fn push_label(&mut self, label: pprof_wire::Label) {
        if label.key == 0 || label.str == 0 {
            return;
        }
        self.labels.push(Label::new(label.key, label.str));
    }

    /// Put the stack in root-to-leaf order and the labels in key order.
    pub fn finish(&mut self) {
        self.stack.reverse();
        self.labels.sort_unstable();
        self.labels.dedup();
    }

    /// Value of metric column `column`.
    pub fn value(&self, column: usize) -> Option<i64> {
        self.values.get(column).copied()
    }

    /// Whether a label with string table key `key` is present.
    pub fn has_label(&self, key: i64) -> bool {
        self.labels.iter().any(|l| l.key == key)
    }

    /// If a label with key `key` is present, prepare the label set without
    /// it for [`aggregate_labels`](SampleAccumulator::aggregate_labels).
    pub fn split_exemplar(&mut self, key: i64) -> bool {
        self.without.clear();
        if !self.has_label(key) {
            return false;
        }
        self.without
            .extend(self.labels.iter().filter(|l| l.key != key));
        true
    }

    /// Labels of the exemplar-free aggregate, as prepared by
    /// [`split_exemplar`](SampleAccumulator::split_exemplar).
    pub fn aggregate_labels(&self) -> &[Label] {
        &self.without
    }
}

/// Decodes one sample into an accumulator, resolving locations as they
/// arrive.
pub struct SampleReader<'a> {
    pub symbols: &'a SymbolIndex,
    pub sample: &'a mut SampleAccumulator,
}

impl SampleVisitor for SampleReader<'_> {
    type Error = DecodeError;

    fn location_id(&mut self, id: u64) -> pprof_wire::Result<()> {
        self.sample.push_location(self.symbols, id);
        Ok(())
    }

    fn value(&mut self, value: i64) -> pprof_wire::Result<()> {
        self.sample.push_value(value);
        Ok(())
    }

    fn label(&mut self, label: pprof_wire::Label) -> pprof_wire::Result<()> {
        self.sample.push_label(label);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pprof_wire::{Function, Location, ProfileVisitor};

    /// Functions 1..=4 named by string indices 11..=14; location 3 has
    /// function 4 inlined into function 3.
    fn symbols() -> SymbolIndex {
        let mut index = SymbolIndex::default();
        index.reset(4, 4);
        for id in 1..=4 {
            index
                .function(Function {
                    id,
                    name: 10 + id as i64,
                })
                .unwrap();
        }
        let locations = [(1, 1, vec![]), (2, 2, vec![]), (3, 4, vec![3]), (4, 0, vec![])];
        for (id, primary_function, extra_functions) in locations {
            index
                .location(Location {
                    id,
                    primary_function,
                    extra_functions,
                })
                .unwrap();
        }
        index
    }

    #[test]
    fn stack_is_reversed_to_root_first() {
        let symbols = symbols();
        let mut sample = SampleAccumulator::default();

        for id in [2, 1] {
            sample.push_location(&symbols, id);
        }
        assert_eq!(sample.stack, vec![12, 11]);

        sample.finish();
        assert_eq!(sample.stack, vec![11, 12]);
    }

    #[test]
    fn inlined_frames_follow_primary_function() {
        let symbols = symbols();
        let mut sample = SampleAccumulator::default();

        for id in [3, 1] {
            sample.push_location(&symbols, id);
        }
        sample.finish();

        assert_eq!(sample.stack, vec![11, 13, 14]);
    }

    #[test]
    fn unresolved_frames_are_skipped() {
        let symbols = symbols();
        let mut sample = SampleAccumulator::default();

        for id in [99, 4, 2] {
            sample.push_location(&symbols, id);
        }

        assert_eq!(sample.stack, vec![12]);
    }

    #[test]
    fn sentinel_labels_are_dropped() {
        let mut sample = SampleAccumulator::default();
        for (key, str) in [(0, 5), (3, 0), (2, 7), (1, 6)] {
            sample.push_label(pprof_wire::Label { key, str, num: 0 });
        }
        sample.finish();

        assert_eq!(sample.labels, vec![Label::new(1, 6), Label::new(2, 7)]);
        assert!(sample.has_label(2));
        assert!(!sample.has_label(3));
    }

    #[test]
    fn exemplar_split_removes_profile_id() {
        let mut sample = SampleAccumulator::default();
        sample.push_label(pprof_wire::Label { key: 4, str: 9, num: 0 });
        sample.push_label(pprof_wire::Label { key: 1, str: 6, num: 0 });
        sample.finish();

        assert!(sample.split_exemplar(4));
        assert_eq!(sample.aggregate_labels(), &[Label::new(1, 6)]);
        assert_eq!(sample.labels.len(), 2);

        assert!(!sample.split_exemplar(7));
        assert!(sample.aggregate_labels().is_empty());
    }

    #[test]
    fn reset_clears_between_samples() {
        let symbols = symbols();
        let mut sample = SampleAccumulator::default();
        sample.push_location(&symbols, 1);
        sample.push_value(5);
        sample.push_label(pprof_wire::Label { key: 1, str: 2, num: 0 });

        sample.reset();

        assert!(sample.stack.is_empty());
        assert!(sample.values.is_empty());
        assert!(sample.labels.is_empty());
        assert_eq!(sample.value(0), None);
    }
}
