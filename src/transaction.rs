use fnv::FnvHashMap;

use crate::handle::TransId;

/// An exclusive, atomic batch of modifications over a fixed set of
/// segments, alive between `begin_trans` and whichever of
/// `commit_trans`/`abort_trans` closes it.
///
/// Segments are referenced by name rather than by a direct reference to
/// their [`crate::segment::SegmentRecord`]: Rust's borrow checker won't
/// let a `Transaction` alias the catalog's owned records the way the
/// source's `trans_t` aliases `segment_t*` pointers, so the catalog is
/// re-consulted by name whenever a transaction operation needs a
/// segment.
#[derive(Debug)]
pub(crate) struct Transaction {
    pub(crate) segnames: Vec<String>,
}

/// The set of in-flight transactions for one [`crate::Rvm`] instance.
#[derive(Default)]
pub(crate) struct TransactionTable {
    transactions: FnvHashMap<TransId, Transaction>,
    next_id: u64,
}

impl TransactionTable {
    pub(crate) fn new() -> Self {
        Self {
            transactions: FnvHashMap::default(),
            next_id: 0,
        }
    }

    pub(crate) fn begin(&mut self, segnames: Vec<String>) -> TransId {
        let id = TransId(self.next_id);
        self.next_id += 1;
        self.transactions.insert(id, Transaction { segnames });
        id
    }

    pub(crate) fn remove(&mut self, id: TransId) -> Option<Transaction> {
        self.transactions.remove(&id)
    }
}
