/// An opaque, caller-facing reference to a mapped segment.
///
/// Stands in for the raw `segbase` pointer the original C interface
/// returned from `rvm_map`. Rather than exposing `Vec<u8>`'s address
/// (unstable across reallocation, and unsound to compare as identity),
/// every segment record is tagged with a generation counter at `map`
/// time; a `SegHandle` just carries that tag. Lookups by handle are a
/// linear scan over the catalog, same as the source's scan by pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegHandle(pub(crate) u64);

/// Identifies a live transaction in the transaction table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransId(pub(crate) u64);

/// The sentinel-aware transaction handle returned by `begin_trans` and
/// accepted by `about_to_modify`/`commit_trans`/`abort_trans`.
///
/// Replaces the C API's two reserved `trans_t` values (`NULL` and
/// `(trans_t)-1`) with a tagged enum, per the source's own redesign
/// note: both `Null` and `Invalid` are no-op inputs everywhere they are
/// accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransHandle {
    /// No transaction (the C API's `NULL`).
    Null,
    /// A request that failed validation (the C API's `(trans_t)-1`).
    Invalid,
    /// A live transaction.
    Real(TransId),
}

impl TransHandle {
    pub(crate) fn real(&self) -> Option<TransId> {
        match self {
            TransHandle::Real(id) => Some(*id),
            _ => None,
        }
    }
}
