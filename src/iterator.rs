// Single-pass cursor over a store's rows in insertion order.
use crate::construct::{RowId, Store};
use crate::record::Record;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Position {
    BeforeFirst,
    At(RowId),
    Exhausted,
}

/// Moves one [`Record`] along the rows of a store.
///
/// The record returned by [`ForwardIter::rec`] is the same instance on every
/// step; only its row identifier changes. A caller that needs a row after the
/// next advance must [`Record::detach`] it first.
#[derive(Debug)]
pub struct ForwardIter<'a> {
    store: &'a Store,
    position: Position,
    rec: Record<'a>,
}

impl<'a> ForwardIter<'a> {
    pub(crate) fn new(store: &'a Store) -> Self {
        Self {
            store,
            position: Position::BeforeFirst,
            rec: Record::new(store, 0),
        }
    }

    /// Advances to the next row. Returns `false` once the rows are exhausted,
    /// and keeps returning `false` afterwards.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        let next = match self.position {
            Position::BeforeFirst => 0,
            Position::At(id) => id + 1,
            Position::Exhausted => return false,
        };
        if next < self.store.len() as RowId {
            self.rec.set_id(next);
            self.position = Position::At(next);
            true
        } else {
            self.position = Position::Exhausted;
            false
        }
    }

    /// The current record.
    ///
    /// # Panics
    /// When called before the first successful [`ForwardIter::next`] or after
    /// the iterator is exhausted.
    pub fn rec(&self) -> &Record<'a> {
        match self.position {
            Position::At(_) => &self.rec,
            Position::BeforeFirst => panic!(
                "forward iterator over '{}' read before the first next()",
                self.store.name()
            ),
            Position::Exhausted => panic!(
                "forward iterator over '{}' read after it was exhausted",
                self.store.name()
            ),
        }
    }

    pub fn store(&self) -> &'a Store {
        self.store
    }

    pub fn is_exhausted(&self) -> bool {
        self.position == Position::Exhausted
    }
}
