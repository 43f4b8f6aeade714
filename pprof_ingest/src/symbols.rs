//! Id-indexed function and location tables.
//!
//! Profiles usually number functions and locations `1..=n` in table order.
//! While that holds, lookups are a vector offset; the first out-of-order id
//! moves the table into a hash map.

use fnv::FnvHashMap;
use pprof_wire::{DecodeError, Function, Location, ProfileVisitor};

#[derive(Debug)]
struct IdTable<T> {
    dense: Vec<T>,
    sparse: FnvHashMap<u64, T>,
    direct: bool,
}

impl<T> Default for IdTable<T> {
    fn default() -> Self {
        Self {
            dense: Vec::new(),
            sparse: FnvHashMap::default(),
            direct: true,
        }
    }
}

impl<T> IdTable<T> {
    fn reset(&mut self, capacity: usize) {
        self.dense.clear();
        self.sparse.clear();
        self.direct = true;
        self.dense.reserve(capacity);
    }

    fn insert(&mut self, id: u64, value: T) {
        if self.direct {
            if id == self.dense.len() as u64 + 1 {
                self.dense.push(value);
                return;
            }
            self.sparse.reserve(self.dense.capacity());
            self.sparse
                .extend((1u64..).zip(self.dense.drain(..)));
            self.direct = false;
        }
        self.sparse.insert(id, value);
    }

    fn get(&self, id: u64) -> Option<&T> {
        if self.direct {
            let index = usize::try_from(id.checked_sub(1)?).ok()?;
            self.dense.get(index)
        } else {
            self.sparse.get(&id)
        }
    }

    fn len(&self) -> usize {
        if self.direct {
            self.dense.len()
        } else {
            self.sparse.len()
        }
    }
}

/// Lookup tables built from the symbols pass of one profile.
///
/// The index is reset and refilled for every profile; its storage is reused.
#[derive(Debug, Default)]
pub struct SymbolIndex {
    functions: IdTable<i64>,
    locations: IdTable<Location>,
}

impl SymbolIndex {
    /// Clear both tables, reserving room for the given record counts.
    pub fn reset(&mut self, functions: usize, locations: usize) {
        self.functions.reset(functions);
        self.locations.reset(locations);
    }

    pub fn find_location(&self, id: u64) -> Option<&Location> {
        self.locations.get(id)
    }

    /// String table index of the name of function `id`.
    pub fn find_function(&self, id: u64) -> Option<i64> {
        self.functions.get(id).copied()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn location_count(&self) -> usize {
        self.locations.len()
    }

    pub fn is_direct_mapped(&self) -> bool {
        self.functions.direct && self.locations.direct
    }
}

impl ProfileVisitor for SymbolIndex {
    type Error = DecodeError;

    fn function(&mut self, function: Function) -> pprof_wire::Result<()> {
        self.functions.insert(function.id, function.name);
        Ok(())
    }

    fn location(&mut self, location: Location) -> pprof_wire::Result<()> {
        self.locations.insert(location.id, location);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(id: u64, primary_function: u64) -> Location {
        Location {
            id,
            primary_function,
            extra_functions: vec![],
        }
    }

    fn fill(index: &mut SymbolIndex, ids: &[u64]) {
        index.reset(ids.len(), ids.len());
        for &id in ids {
            index
                .function(Function {
                    id,
                    name: id as i64 * 10,
                })
                .unwrap();
            index.location(location(id, id)).unwrap();
        }
    }

    #[test]
    fn sequential_ids_stay_direct_mapped() {
        let mut index = SymbolIndex::default();
        fill(&mut index, &[1, 2, 3]);

        assert!(index.is_direct_mapped());
        assert_eq!(index.find_function(2), Some(20));
        assert_eq!(index.find_location(3).map(|l| l.primary_function), Some(3));
        assert_eq!(index.find_function(0), None);
        assert_eq!(index.find_function(4), None);
    }

    #[test]
    fn sparse_ids_fall_back_to_hashing() {
        let mut index = SymbolIndex::default();
        fill(&mut index, &[1, 2, 9000, 3]);

        assert!(!index.is_direct_mapped());
        assert_eq!(index.function_count(), 4);
        assert_eq!(index.find_function(1), Some(10));
        assert_eq!(index.find_function(9000), Some(90000));
        assert_eq!(index.find_location(3).map(|l| l.id), Some(3));
        assert!(index.find_location(4).is_none());
    }

    #[test]
    fn reset_reuses_index_between_profiles() {
        let mut index = SymbolIndex::default();
        fill(&mut index, &[5, 7]);
        assert!(!index.is_direct_mapped());

        fill(&mut index, &[1]);

        assert!(index.is_direct_mapped());
        assert_eq!(index.location_count(), 1);
        assert_eq!(index.find_function(5), None);
        assert_eq!(index.find_function(1), Some(10));
    }
}
