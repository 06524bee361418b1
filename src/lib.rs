//! Recoverable virtual memory: durable, transactional updates to named
//! byte-addressable regions ("segments") of an application's own
//! address space.
//!
//! An application names a segment, [`Rvm::map`]s it into memory, edits
//! the returned region between [`Rvm::begin_trans`] and
//! [`Rvm::commit_trans`]/[`Rvm::abort_trans`], and is guaranteed that
//! either every edit of a committed transaction survives a crash or
//! none of them do. Re-mapping a segment after a crash restores the
//! last committed state.
//!
//! ### Log format
//!
//! The redo log (`<prefix>/rvm.log`) is a sequence of transaction
//! blocks. Each block is a `TRANSACTION` header line followed by one or
//! more modification triples: a segment name line, a decimal offset
//! line, a decimal size line, and the raw payload followed by a single
//! `\n`.
//!
//! ```text
//! TRANSACTION
//! segment1
//! 0
//! 3
//! abc
//! ```
//!
//! ### Single-threaded contract
//!
//! Every mutating method takes `&mut self`. There is no internal
//! locking and no `Send`/`Sync` impl: concurrent or multi-process access
//! is out of scope, and the borrow checker enforces that statically
//! rather than at runtime.

mod backing;
mod catalog;
mod config;
mod error;
mod handle;
mod redo_log;
mod segment;
mod transaction;

use std::fs;
use std::path::{Path, PathBuf};

use log::{trace, warn};

pub use config::RvmConfig;
pub use error::{Result, RvmError};
pub use handle::{SegHandle, TransHandle, TransId};

use catalog::Catalog;
use segment::ModRecord;
use transaction::TransactionTable;

/// A process-wide recoverable-virtual-memory instance, rooted at one
/// directory on disk.
///
/// ### Invariants
/// - the directory named by `prefix` exists and is writable;
/// - every segment in the catalog has at most one owning transaction.
pub struct Rvm {
    prefix: PathBuf,
    config: RvmConfig,
    catalog: Catalog,
    transactions: TransactionTable,
}

impl Rvm {
    /// Initialize an RVM instance rooted at `directory`, using the
    /// default [`RvmConfig`] (128-byte name limit, log file `rvm.log`).
    pub fn init<P: AsRef<Path>>(directory: P) -> Result<Self> {
        Self::init_with_config(directory, RvmConfig::default())
    }

    /// Initialize an RVM instance rooted at `directory` with a custom
    /// [`RvmConfig`]. Fails if the path is empty or longer than
    /// `config.name_limit` bytes.
    pub fn init_with_config<P: AsRef<Path>>(directory: P, config: RvmConfig) -> Result<Self> {
        let directory = directory.as_ref();
        let as_str = directory.to_string_lossy();
        if as_str.is_empty() || as_str.len() > config.name_limit {
            return Err(RvmError::InvalidArgument(format!(
                "directory path {:?} exceeds the {}-byte limit",
                directory, config.name_limit
            )));
        }

        fs::create_dir_all(directory)?;

        Ok(Self {
            prefix: directory.to_path_buf(),
            config,
            catalog: Catalog::new(),
            transactions: TransactionTable::new(),
        })
    }

    /// The directory this instance is rooted at.
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Number of segments currently loaded in the catalog.
    pub fn mapped_segment_count(&self) -> usize {
        self.catalog.len()
    }

    fn check_segname(&self, segname: &str) -> Result<()> {
        if segname.len() > self.config.name_limit {
            return Err(RvmError::InvalidArgument(format!(
                "segment name {:?} exceeds the {}-byte limit",
                segname, self.config.name_limit
            )));
        }
        Ok(())
    }

    /// Map a segment of at least `size` bytes, returning a handle that
    /// [`Rvm::data`]/[`Rvm::data_mut`] can resolve to the live buffer.
    ///
    /// See the crate-level docs for the exact create/extend/leave rules
    /// governing the backing file, and the idempotence guarantee for
    /// repeated non-growing calls.
    pub fn map(&mut self, segname: &str, size: u64) -> Result<SegHandle> {
        self.check_segname(segname)?;

        if self.catalog.contains(segname) {
            let owned = self
                .catalog
                .get(segname)
                .map(|rec| rec.cur_trans.is_some())
                .unwrap_or(false);
            if owned {
                return Err(RvmError::InvalidArgument(format!(
                    "segment {:?} is owned by an in-flight transaction",
                    segname
                )));
            }

            let rec = self.catalog.get_mut(segname).expect("checked above");
            if size > rec.size() {
                rec.grow_to(size);
                let path = backing::path_for(&self.prefix, segname);
                backing::ensure_sized(&path, size)?;
            }
            return Ok(rec.handle());
        }

        redo_log::replay_and_truncate(&self.prefix, &self.config.log_file_name, &mut self.catalog)?;

        let path = backing::path_for(&self.prefix, segname);
        backing::ensure_sized(&path, size)?;
        let buf = backing::read_prefix(&path, size)?;
        let handle = self.catalog.insert_new(segname.to_string(), buf);
        trace!("mapped new segment {:?} ({} bytes)", segname, size);
        Ok(handle)
    }

    /// Unmap a segment, releasing its in-memory buffer. The backing file
    /// is left on disk. A no-op if `seg` doesn't name a loaded segment
    /// or the segment is currently owned by a transaction.
    pub fn unmap(&mut self, seg: SegHandle) {
        let segname = match self.catalog.name_of_handle(seg) {
            Some(name) => name,
            None => return,
        };

        let owned = self
            .catalog
            .get(&segname)
            .map(|rec| rec.cur_trans.is_some())
            .unwrap_or(true);
        if owned {
            return;
        }

        if let Err(e) =
            redo_log::replay_and_truncate(&self.prefix, &self.config.log_file_name, &mut self.catalog)
        {
            warn!("replay during unmap of {:?} failed: {}", segname, e);
        }

        self.catalog.remove(&segname);
        trace!("unmapped segment {:?}", segname);
    }

    /// Destroy a segment's backing file. A no-op while the segment is
    /// still mapped.
    pub fn destroy(&mut self, segname: &str) -> Result<()> {
        if self.catalog.contains(segname) {
            return Ok(());
        }
        let path = backing::path_for(&self.prefix, segname);
        backing::remove(&path)?;
        trace!("destroyed backing file for {:?}", segname);
        Ok(())
    }

    /// Begin a transaction over `segs`. Returns [`TransHandle::Invalid`]
    /// if any handle doesn't name a loaded segment, any named segment
    /// already has an owning transaction, or `segs` is empty.
    pub fn begin_trans(&mut self, segs: &[SegHandle]) -> TransHandle {
        if segs.is_empty() {
            return TransHandle::Invalid;
        }

        let mut segnames = Vec::with_capacity(segs.len());
        for &handle in segs {
            let rec = match self.catalog.get_by_handle(handle) {
                Some(rec) => rec,
                None => return TransHandle::Invalid,
            };
            if rec.cur_trans.is_some() {
                return TransHandle::Invalid;
            }
            segnames.push(rec.segname.clone());
        }

        let id = self.transactions.begin(segnames.clone());
        for segname in &segnames {
            if let Some(rec) = self.catalog.get_mut(segname) {
                rec.cur_trans = Some(id);
            }
        }
        TransHandle::Real(id)
    }

    /// Record the current bytes at `[offset, offset+size)` of `seg` as
    /// an undo pre-image, for `tid` to restore on abort. A no-op unless
    /// `tid` is the transaction currently holding `seg`.
    pub fn about_to_modify(&mut self, tid: TransHandle, seg: SegHandle, offset: u64, size: u64) {
        let id = match tid.real() {
            Some(id) => id,
            None => return,
        };

        let segname = match self.catalog.name_of_handle(seg) {
            Some(name) => name,
            None => return,
        };

        let rec = match self.catalog.get_mut(&segname) {
            Some(rec) => rec,
            None => return,
        };

        match rec.cur_trans {
            Some(owner) if owner == id => rec.capture_undo(offset, size),
            _ => warn!(
                "about_to_modify on {:?} ignored: not owned by the calling transaction",
                segname
            ),
        }
    }

    /// Commit `tid`: append every queued modification to the redo log as
    /// its current (post-write) bytes, discard the undo queues, and
    /// release the transaction's segments. A no-op if `tid` is
    /// [`TransHandle::Null`] or [`TransHandle::Invalid`].
    pub fn commit_trans(&mut self, tid: TransHandle) -> Result<()> {
        let id = match tid.real() {
            Some(id) => id,
            None => return Ok(()),
        };

        let trans = match self.transactions.remove(id) {
            Some(trans) => trans,
            None => return Ok(()),
        };

        let mut entries: Vec<(String, ModRecord, Vec<u8>)> = Vec::new();
        for segname in &trans.segnames {
            if let Some(rec) = self.catalog.get_mut(segname) {
                let mods = std::mem::take(&mut rec.mods);
                for modrec in mods {
                    let start = modrec.offset as usize;
                    let end = start + modrec.size as usize;
                    let payload = rec.segbase[start..end].to_vec();
                    entries.push((segname.clone(), modrec, payload));
                }
                rec.cur_trans = None;
            }
        }

        let path = redo_log::log_path(&self.prefix, &self.config.log_file_name);
        redo_log::append_transaction(&path, &entries)?;
        trace!(
            "committed transaction over {} segment(s), {} modification(s)",
            trans.segnames.len(),
            entries.len()
        );
        Ok(())
    }

    /// Abort `tid`: re-apply every queued undo pre-image in reverse
    /// insertion order, discard the undo queues, and release the
    /// transaction's segments. No log record is written. A no-op if
    /// `tid` is [`TransHandle::Null`] or [`TransHandle::Invalid`].
    pub fn abort_trans(&mut self, tid: TransHandle) {
        let id = match tid.real() {
            Some(id) => id,
            None => return,
        };

        let trans = match self.transactions.remove(id) {
            Some(trans) => trans,
            None => return,
        };

        for segname in &trans.segnames {
            if let Some(rec) = self.catalog.get_mut(segname) {
                while let Some(modrec) = rec.mods.pop_back() {
                    let start = modrec.offset as usize;
                    let end = start + modrec.size as usize;
                    rec.segbase[start..end].copy_from_slice(&modrec.undo);
                }
                rec.cur_trans = None;
            }
        }
        trace!("aborted transaction over {} segment(s)", trans.segnames.len());
    }

    /// Borrow the live bytes of a mapped segment, or `None` if `seg`
    /// isn't currently loaded.
    pub fn data(&self, seg: SegHandle) -> Option<&[u8]> {
        self.catalog.get_by_handle(seg).map(|rec| rec.segbase.as_slice())
    }

    /// Mutably borrow the live bytes of a mapped segment, or `None` if
    /// `seg` isn't currently loaded.
    pub fn data_mut(&mut self, seg: SegHandle) -> Option<&mut [u8]> {
        self.catalog
            .get_by_handle_mut(seg)
            .map(|rec| rec.segbase.as_mut_slice())
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    fn write_log(dir: &Path, name: &str, contents: &[u8]) {
        let mut f = fs::File::create(dir.join(name)).unwrap();
        f.write_all(contents).unwrap();
    }

    #[test]
    fn init_rejects_oversize_directory() {
        let oversize = "A".repeat(130);
        assert!(Rvm::init(&oversize).is_err());
    }

    #[test]
    fn init_stores_the_given_prefix() {
        let dir = tempdir().unwrap();
        let rvm = Rvm::init(dir.path()).unwrap();
        assert_eq!(rvm.prefix(), dir.path());
    }

    #[test]
    fn map_creates_backing_file_of_requested_size() {
        let dir = tempdir().unwrap();
        let mut rvm = Rvm::init(dir.path()).unwrap();
        rvm.map("segment1", 10000).unwrap();
        let meta = fs::metadata(dir.path().join("segment1")).unwrap();
        assert_eq!(meta.len(), 10000);
    }

    #[test]
    fn map_loads_existing_file_contents() {
        let dir = tempdir().unwrap();
        write_log(dir.path(), "segment1", b"Hello World!");
        let mut rvm = Rvm::init(dir.path()).unwrap();
        let handle = rvm.map("segment1", 10000).unwrap();
        assert_eq!(&rvm.data(handle).unwrap()[..12], b"Hello World!");
    }

    #[test]
    fn map_replays_pending_log_before_returning() {
        let dir = tempdir().unwrap();
        let log = b"TRANSACTION\nsegment1\n0\n14\nsegment1-value\nsegment2\n0\n14\nsegment2-value\n";
        write_log(dir.path(), "rvm.log", log);

        let mut rvm = Rvm::init(dir.path()).unwrap();
        let h1 = rvm.map("segment1", 14).unwrap();
        let h2 = rvm.map("segment2", 14).unwrap();

        assert_eq!(rvm.data(h1).unwrap(), b"segment1-value");
        assert_eq!(rvm.data(h2).unwrap(), b"segment2-value");
    }

    #[test]
    fn map_is_idempotent_for_non_growing_sizes() {
        let dir = tempdir().unwrap();
        let mut rvm = Rvm::init(dir.path()).unwrap();
        let h1 = rvm.map("segment1", 10000).unwrap();
        let h2 = rvm.map("segment1", 10000).unwrap();
        let h3 = rvm.map("segment1", 5000).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1, h3);
        assert_eq!(rvm.mapped_segment_count(), 1);
    }

    #[test]
    fn map_grows_segment_and_backing_file_when_larger_size_requested() {
        let dir = tempdir().unwrap();
        let mut rvm = Rvm::init(dir.path()).unwrap();
        let h1 = rvm.map("segment1", 10000).unwrap();
        let h2 = rvm.map("segment1", 20000).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(rvm.mapped_segment_count(), 1);
        assert_eq!(rvm.data(h2).unwrap().len(), 20000);
        let meta = fs::metadata(dir.path().join("segment1")).unwrap();
        assert_eq!(meta.len(), 20000);
    }

    #[test]
    fn map_refuses_a_segment_owned_by_a_transaction() {
        let dir = tempdir().unwrap();
        let mut rvm = Rvm::init(dir.path()).unwrap();
        let h = rvm.map("segment1", 20000).unwrap();
        rvm.begin_trans(&[h]);
        assert!(rvm.map("segment1", 20000).is_err());
    }

    #[test]
    fn commit_writes_the_exact_log_format() {
        let dir = tempdir().unwrap();
        let mut rvm = Rvm::init(dir.path()).unwrap();
        let h = rvm.map("segment1", 10).unwrap();

        let tid = rvm.begin_trans(&[h]);
        rvm.about_to_modify(tid, h, 0, 3);
        rvm.data_mut(h).unwrap()[0..3].copy_from_slice(b"abc");
        rvm.commit_trans(tid).unwrap();

        let log = fs::read(dir.path().join("rvm.log")).unwrap();
        assert_eq!(log, b"TRANSACTION\nsegment1\n0\n3\nabc\n".to_vec());
    }

    #[test]
    fn three_modification_commit_matches_the_documented_byte_count() {
        let dir = tempdir().unwrap();
        let mut rvm = Rvm::init(dir.path()).unwrap();
        let h1 = rvm.map("segment1", 20).unwrap();
        let h2 = rvm.map("segment2", 20).unwrap();

        let tid = rvm.begin_trans(&[h1, h2]);
        rvm.about_to_modify(tid, h1, 0, 1);
        rvm.about_to_modify(tid, h1, 1, 1);
        rvm.about_to_modify(tid, h2, 0, 3);
        rvm.data_mut(h1).unwrap()[0] = b'a';
        rvm.data_mut(h1).unwrap()[1] = b'b';
        rvm.data_mut(h2).unwrap()[0..3].copy_from_slice(b"xyz");
        rvm.commit_trans(tid).unwrap();

        let log = fs::read(dir.path().join("rvm.log")).unwrap();
        let expected = b"TRANSACTION\nsegment1\n0\n1\na\nsegment1\n1\n1\nb\nsegment2\n0\n3\nxyz\n";
        assert_eq!(log.len(), expected.len());
        assert_eq!(log, expected.to_vec());
    }

    #[test]
    fn abort_restores_overlapping_writes_across_segments() {
        let dir = tempdir().unwrap();
        let mut rvm = Rvm::init(dir.path()).unwrap();
        let h1 = rvm.map("segment1", 8).unwrap();
        let h2 = rvm.map("segment2", 8).unwrap();
        rvm.data_mut(h1).unwrap().copy_from_slice(b"value-1\0");
        rvm.data_mut(h2).unwrap().copy_from_slice(b"value-2\0");

        let tid = rvm.begin_trans(&[h1, h2]);
        rvm.about_to_modify(tid, h1, 0, 3);
        rvm.about_to_modify(tid, h1, 6, 1);
        rvm.about_to_modify(tid, h2, 6, 1);

        rvm.data_mut(h1).unwrap()[0..7].copy_from_slice(b"abcue-1");
        rvm.data_mut(h1).unwrap()[6] = b'x';
        rvm.data_mut(h2).unwrap()[6] = b'y';

        rvm.abort_trans(tid);

        assert_eq!(&rvm.data(h1).unwrap()[..7], b"value-1");
        assert_eq!(&rvm.data(h2).unwrap()[..7], b"value-2");
    }

    #[test]
    fn commit_clears_undo_queue_and_ownership() {
        let dir = tempdir().unwrap();
        let mut rvm = Rvm::init(dir.path()).unwrap();
        let h = rvm.map("segment1", 10).unwrap();
        let tid = rvm.begin_trans(&[h]);
        rvm.about_to_modify(tid, h, 0, 3);
        rvm.commit_trans(tid).unwrap();

        // segment is free again: a second transaction can claim it
        let tid2 = rvm.begin_trans(&[h]);
        assert_ne!(tid2, TransHandle::Invalid);
    }

    #[test]
    fn begin_trans_is_invalid_over_an_already_owned_segment() {
        let dir = tempdir().unwrap();
        let mut rvm = Rvm::init(dir.path()).unwrap();
        let h = rvm.map("segment1", 10).unwrap();
        let _tid = rvm.begin_trans(&[h]);
        assert_eq!(rvm.begin_trans(&[h]), TransHandle::Invalid);
    }

    #[test]
    fn begin_trans_rejects_an_unmapped_handle() {
        let dir = tempdir().unwrap();
        let mut rvm = Rvm::init(dir.path()).unwrap();
        let h = rvm.map("segment1", 10).unwrap();
        rvm.unmap(h);
        assert_eq!(rvm.begin_trans(&[h]), TransHandle::Invalid);
    }

    #[test]
    fn unmap_replays_a_pending_log_record_into_memory_then_shrinks_log() {
        let dir = tempdir().unwrap();
        let mut rvm = Rvm::init(dir.path()).unwrap();
        let h = rvm.map("segment1", 10000).unwrap();

        let log = b"TRANSACTION\nsegment1\n0\n14\nsegment1-value\n";
        write_log(dir.path(), "rvm.log", log);

        rvm.unmap(h);

        let meta = fs::metadata(dir.path().join("rvm.log")).unwrap();
        assert_eq!(meta.len(), 0);
        let bytes = fs::read(dir.path().join("segment1")).unwrap();
        assert_eq!(&bytes[..14], b"segment1-value");
    }

    #[test]
    fn unmap_is_a_no_op_while_a_transaction_owns_the_segment() {
        let dir = tempdir().unwrap();
        let mut rvm = Rvm::init(dir.path()).unwrap();
        let h = rvm.map("segment1", 10).unwrap();
        let _tid = rvm.begin_trans(&[h]);
        rvm.unmap(h);
        assert_eq!(rvm.mapped_segment_count(), 1);
    }

    #[test]
    fn destroy_removes_the_backing_file_only_once_unmapped() {
        let dir = tempdir().unwrap();
        let mut rvm = Rvm::init(dir.path()).unwrap();
        let h = rvm.map("segment1", 10).unwrap();

        rvm.destroy("segment1").unwrap();
        assert!(dir.path().join("segment1").exists());

        rvm.unmap(h);
        rvm.destroy("segment1").unwrap();
        assert!(!dir.path().join("segment1").exists());
    }

    #[test]
    fn replay_is_idempotent() {
        let dir = tempdir().unwrap();
        let log = b"TRANSACTION\nsegment1\n0\n3\nabc\n";
        write_log(dir.path(), "rvm.log", log);

        let mut rvm = Rvm::init(dir.path()).unwrap();
        let h = rvm.map("segment1", 10).unwrap();
        assert_eq!(&rvm.data(h).unwrap()[..3], b"abc");
        rvm.unmap(h);

        // a second map/unmap cycle against an already-empty log changes nothing
        let h = rvm.map("segment1", 10).unwrap();
        assert_eq!(&rvm.data(h).unwrap()[..3], b"abc");
        rvm.unmap(h);
    }
}
