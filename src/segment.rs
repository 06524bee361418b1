use std::collections::VecDeque;

use crate::handle::{SegHandle, TransId};

/// A single `(offset, size, pre-image)` undo entry, captured by
/// `about_to_modify` and drained by `commit_trans` (after being copied
/// into the redo log) or `abort_trans` (after being re-applied).
#[derive(Debug, Clone)]
pub struct ModRecord {
    pub offset: u64,
    pub size: u64,
    pub undo: Vec<u8>,
}

/// The in-memory descriptor of one mapped segment.
///
/// ### Invariants
/// - `segbase.len() as u64 == size` at every point observable from
///   outside `map`/`unmap`.
/// - if `cur_trans` is `Some(id)`, exactly one transaction (`id`) holds
///   this segment exclusively.
/// - `mods` is strictly FIFO: `about_to_modify` pushes to the back,
///   `commit_trans` drains front-to-back, `abort_trans` drains
///   back-to-front.
#[derive(Debug)]
pub struct SegmentRecord {
    /// Generation tag handed to callers as a [`SegHandle`]. Stable for
    /// the lifetime of the mapping, even across a resizing reallocation
    /// of `segbase`.
    pub(crate) id: u64,
    pub(crate) segname: String,
    pub(crate) segbase: Vec<u8>,
    pub(crate) cur_trans: Option<TransId>,
    pub(crate) mods: VecDeque<ModRecord>,
}

impl SegmentRecord {
    pub(crate) fn new(id: u64, segname: String, segbase: Vec<u8>) -> Self {
        Self {
            id,
            segname,
            segbase,
            cur_trans: None,
            mods: VecDeque::new(),
        }
    }

    #[inline]
    pub(crate) fn size(&self) -> u64 {
        self.segbase.len() as u64
    }

    #[inline]
    pub(crate) fn handle(&self) -> SegHandle {
        SegHandle(self.id)
    }

    /// Grow the buffer to `new_size`, zero-filling the new tail. No-op if
    /// `new_size` is not larger than the current size: the source never
    /// shrinks a segment, and this preserves that.
    pub(crate) fn grow_to(&mut self, new_size: u64) {
        if new_size > self.size() {
            self.segbase.resize(new_size as usize, 0);
        }
    }

    /// Record the current bytes at `[offset, offset+size)` as an undo
    /// pre-image and push it to the back of the FIFO queue.
    pub(crate) fn capture_undo(&mut self, offset: u64, size: u64) {
        let start = offset as usize;
        let end = (offset + size) as usize;
        let undo = self.segbase[start..end].to_vec();
        self.mods.push_back(ModRecord { offset, size, undo });
    }
}
