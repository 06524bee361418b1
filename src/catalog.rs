use fnv::FnvHashMap;

use crate::handle::SegHandle;
use crate::segment::SegmentRecord;

/// Name→segment-record map for one [`crate::Rvm`] instance.
///
/// ### Invariants
/// - keys are unique segment names;
/// - insertion order carries no meaning, matching the source's use of
///   an unordered sequential-search map.
#[derive(Default)]
pub(crate) struct Catalog {
    segments: FnvHashMap<String, SegmentRecord>,
    next_id: u64,
}

impl Catalog {
    pub(crate) fn new() -> Self {
        Self {
            segments: FnvHashMap::default(),
            next_id: 0,
        }
    }

    pub(crate) fn contains(&self, segname: &str) -> bool {
        self.segments.contains_key(segname)
    }

    pub(crate) fn get(&self, segname: &str) -> Option<&SegmentRecord> {
        self.segments.get(segname)
    }

    pub(crate) fn get_mut(&mut self, segname: &str) -> Option<&mut SegmentRecord> {
        self.segments.get_mut(segname)
    }

    /// Find a segment by its caller-facing handle. Mirrors the source's
    /// linear scan of the segment list by base-pointer identity: there
    /// is no secondary index from handle to name.
    pub(crate) fn get_by_handle(&self, handle: SegHandle) -> Option<&SegmentRecord> {
        self.segments.values().find(|rec| rec.handle() == handle)
    }

    pub(crate) fn get_by_handle_mut(&mut self, handle: SegHandle) -> Option<&mut SegmentRecord> {
        self.segments
            .values_mut()
            .find(|rec| rec.handle() == handle)
    }

    pub(crate) fn name_of_handle(&self, handle: SegHandle) -> Option<String> {
        self.get_by_handle(handle).map(|rec| rec.segname.clone())
    }

    /// Insert a freshly created segment and return the handle assigned
    /// to it.
    pub(crate) fn insert_new(&mut self, segname: String, segbase: Vec<u8>) -> SegHandle {
        let id = self.next_id;
        self.next_id += 1;
        let record = SegmentRecord::new(id, segname.clone(), segbase);
        let handle = record.handle();
        self.segments.insert(segname, record);
        handle
    }

    pub(crate) fn remove(&mut self, segname: &str) -> Option<SegmentRecord> {
        self.segments.remove(segname)
    }

    pub(crate) fn len(&self) -> usize {
        self.segments.len()
    }
}
