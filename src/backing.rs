use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

/// Backing-file primitives used by both `map`'s load-or-create path and
/// the log replayer. Does **not** enforce any of RVM's own constraints
/// (name length, exclusion, ...) — simply does what's asked, same
/// division of labor as the source's `disk::segment::Segment` wrapper.
pub(crate) fn path_for(prefix: &Path, segname: &str) -> PathBuf {
    prefix.join(segname)
}

/// Ensure the backing file at `path` exists and is at least `size`
/// bytes, per `map`'s case analysis:
/// - missing: create it zero-filled to exactly `size` bytes;
/// - present and shorter than `size`: extend it (zero-filled tail);
/// - present and already `>= size`: leave it untouched.
///
/// The file is never shrunk, matching the source.
pub(crate) fn ensure_sized(path: &Path, size: u64) -> io::Result<()> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)?;
    let current = file.metadata()?.len();
    if current < size {
        file.set_len(size)?;
    }
    Ok(())
}

/// Read the first `min(len, filesize)` bytes of `path` into a
/// zero-filled buffer of exactly `len` bytes.
pub(crate) fn read_prefix(path: &Path, len: u64) -> io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let filesize = file.metadata()?.len();
    let to_read = filesize.min(len) as usize;
    let mut buf = vec![0u8; len as usize];
    if to_read > 0 {
        file.read_exact_at(&mut buf[..to_read], 0)?;
    }
    Ok(buf)
}

/// Write `data` at `offset` into the backing file at `path`, creating
/// the file if necessary and extending it if `offset + data.len()`
/// exceeds its current length. Used by log replay, which must update
/// the backing file whether or not the segment is currently loaded.
pub(crate) fn write_at(path: &Path, offset: u64, data: &[u8]) -> io::Result<()> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)?;
    let needed = offset + data.len() as u64;
    if file.metadata()?.len() < needed {
        file.set_len(needed)?;
    }
    file.write_all_at(data, offset)
}

/// Unlink the backing file at `path`. A missing file is not an error:
/// `destroy` is specified to be a no-op on an already-absent segment.
pub(crate) fn remove(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
