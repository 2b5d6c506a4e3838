//! The cross-join over matched columns.

use smallvec::SmallVec;

pub(crate) type ColumnList = SmallVec<[usize; 4]>;
pub(crate) type Combination = SmallVec<[usize; 5]>;

/// Enumerates the Cartesian product of per-slot matched column lists
/// within one archetype.
///
/// Each yielded combination holds one column index per stream slot. Slot 0
/// is the outermost axis and the last slot the innermost, so combinations
/// come out in a stable order and each semantically matching combination
/// is visited exactly once. If any slot matched no columns the join yields
/// nothing.
pub(crate) struct CrossJoin {
    slots: SmallVec<[ColumnList; 5]>,
    cursor: Combination,
    started: bool,
    done: bool,
}

impl CrossJoin {
    pub fn new(slots: SmallVec<[ColumnList; 5]>) -> Self {
        let done = slots.is_empty() || slots.iter().any(ColumnList::is_empty);
        let cursor = slots.iter().map(|_| 0).collect();
        CrossJoin {
            slots,
            cursor,
            started: false,
            done,
        }
    }

    fn current(&self) -> Combination {
        self.cursor
            .iter()
            .zip(&self.slots)
            .map(|(&at, columns)| columns[at])
            .collect()
    }
}

impl Iterator for CrossJoin {
    type Item = Combination;

    fn next(&mut self) -> Option<Combination> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(self.current());
        }

        // Advance the innermost slot, carrying towards slot 0.
        for slot in (0..self.slots.len()).rev() {
            self.cursor[slot] += 1;
            if self.cursor[slot] < self.slots[slot].len() {
                return Some(self.current());
            }
            if slot == 0 {
                self.done = true;
                return None;
            }
            self.cursor[slot] = 0;
        }
        self.done = true;
        None
    }
}
