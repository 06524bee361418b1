use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

mod record;

use log::debug;

use crate::backing;
use crate::catalog::Catalog;
use crate::error::Result;
use crate::segment::ModRecord;

/// Path of the redo log for an RVM instance rooted at `prefix`.
pub(crate) fn log_path(prefix: &Path, log_file_name: &str) -> PathBuf {
    prefix.join(log_file_name)
}

/// Append one transaction's worth of modification triples to the log,
/// each prefixed by a single `TRANSACTION` header line, per the format
/// committed to in §6 of the crate's own format documentation.
///
/// `mods` pairs a segment name with the FIFO queue of modification
/// records committed for it, and the **current** (post-write) bytes at
/// each record's range — the payload is the new value, not the undo
/// pre-image.
pub(crate) fn append_transaction(
    path: &Path,
    mods: &[(String, ModRecord, Vec<u8>)],
) -> Result<()> {
    if mods.is_empty() {
        return Ok(());
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(b"TRANSACTION\n")?;
    for (segname, modrec, payload) in mods {
        writeln!(file, "{}", segname)?;
        writeln!(file, "{}", modrec.offset)?;
        writeln!(file, "{}", modrec.size)?;
        file.write_all(payload)?;
        file.write_all(b"\n")?;
    }
    Ok(())
}

/// Replay every record in the redo log into the backing files and any
/// currently loaded segment, then truncate the log.
///
/// Invoked lazily at `map` time and eagerly at `unmap` time (§4.5).
/// Every record that parses successfully has, by the time this
/// function returns, been applied to its backing file and to every live
/// mapping of the affected segment — so the log is always rewritten to
/// empty afterward; there is nothing left worth retaining.
pub(crate) fn replay_and_truncate(prefix: &Path, log_file_name: &str, catalog: &mut Catalog) -> Result<()> {
    let path = log_path(prefix, log_file_name);

    let buf = match fs::read(&path) {
        Ok(buf) => buf,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    if buf.is_empty() {
        return Ok(());
    }

    let records = record::parse(&buf)?;
    debug!("replaying {} redo record(s) from {:?}", records.len(), path);

    for rec in &records {
        if let Some(seg) = catalog.get_mut(&rec.segname) {
            if rec.offset + rec.size <= seg.size() {
                let start = rec.offset as usize;
                let end = start + rec.size as usize;
                seg.segbase[start..end].copy_from_slice(&rec.payload);
            }
        }

        let file_path = backing::path_for(prefix, &rec.segname);
        backing::write_at(&file_path, rec.offset, &rec.payload)?;
    }

    fs::write(&path, b"")?;
    debug!("truncated {:?} to empty after replay", path);

    Ok(())
}
