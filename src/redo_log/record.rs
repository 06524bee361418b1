use crate::error::{Result, RvmError};

/// One modification triple as it appears on disk: a segment name, an
/// offset, a size, and the raw payload bytes that belong at that
/// offset. Transaction boundaries (the `TRANSACTION` header lines) are
/// not retained past parsing — replay only cares about applying every
/// record in the order it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RedoRecord {
    pub(crate) segname: String,
    pub(crate) offset: u64,
    pub(crate) size: u64,
    pub(crate) payload: Vec<u8>,
}

const TRANSACTION_HEADER: &[u8] = b"TRANSACTION";

/// Parse the full textual contents of a redo log (see the format
/// documented on [`crate::Rvm`]) into an ordered list of modification
/// records.
///
/// Payload bytes are assumed not to contain an embedded `\n` — the
/// format inherited from the original source has no other way to find
/// the end of a payload, so an embedded newline silently truncates the
/// record it belongs to rather than being caught here.
pub(crate) fn parse(buf: &[u8]) -> Result<Vec<RedoRecord>> {
    let mut pos = 0usize;
    let mut records = Vec::new();

    while pos < buf.len() {
        let line = read_line(buf, &mut pos)?;
        if line == TRANSACTION_HEADER {
            continue;
        }

        let segname = String::from_utf8(line.to_vec())
            .map_err(|_| RvmError::CorruptLog("segment name is not valid utf-8".to_string()))?;
        let offset = parse_u64(read_line(buf, &mut pos)?)?;
        let size = parse_u64(read_line(buf, &mut pos)?)?;

        let end = pos
            .checked_add(size as usize)
            .ok_or_else(|| RvmError::CorruptLog("record size overflows".to_string()))?;
        if end > buf.len() {
            return Err(RvmError::CorruptLog(
                "payload runs past end of log".to_string(),
            ));
        }
        let payload = buf[pos..end].to_vec();
        pos = end;

        if buf.get(pos) != Some(&b'\n') {
            return Err(RvmError::CorruptLog(
                "payload missing trailing newline".to_string(),
            ));
        }
        pos += 1;

        records.push(RedoRecord {
            segname,
            offset,
            size,
            payload,
        });
    }

    Ok(records)
}

fn read_line<'a>(buf: &'a [u8], pos: &mut usize) -> Result<&'a [u8]> {
    let rest = &buf[*pos..];
    match rest.iter().position(|&b| b == b'\n') {
        Some(idx) => {
            let line = &rest[..idx];
            *pos += idx + 1;
            Ok(line)
        }
        None => Err(RvmError::CorruptLog("unterminated line".to_string())),
    }
}

fn parse_u64(line: &[u8]) -> Result<u64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| RvmError::CorruptLog("expected a decimal integer".to_string()))
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_single_triple() {
        let log = b"TRANSACTION\nsegment1\n0\n3\nabc\n";
        let records = parse(log).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].segname, "segment1");
        assert_eq!(records[0].offset, 0);
        assert_eq!(records[0].size, 3);
        assert_eq!(records[0].payload, b"abc");
    }

    #[test]
    fn parses_multiple_blocks_and_triples() {
        let log = b"TRANSACTION\nsegment1\n0\n14\nsegment1-value\nsegment2\n0\n14\nsegment2-value\n";
        let records = parse(log).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].segname, "segment1");
        assert_eq!(records[0].payload, b"segment1-value");
        assert_eq!(records[1].segname, "segment2");
        assert_eq!(records[1].payload, b"segment2-value");
    }

    #[test]
    fn empty_log_parses_to_no_records() {
        assert_eq!(parse(b"").unwrap(), Vec::new());
    }

    #[test]
    fn truncated_payload_is_corrupt() {
        let log = b"TRANSACTION\nsegment1\n0\n10\nabc\n";
        assert!(parse(log).is_err());
    }

    #[test]
    fn non_numeric_offset_is_corrupt() {
        let log = b"TRANSACTION\nsegment1\nnot-a-number\n3\nabc\n";
        assert!(parse(log).is_err());
    }
}
