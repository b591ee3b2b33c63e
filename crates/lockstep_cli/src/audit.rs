//! Per-worker audit log writer.

use lockstep_core::CommitInfo;
use serde_json::json;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// On-disk format of an audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditFormat {
    /// Whitespace-separated fields, one commit per line:
    /// `order i j k read new_j new_k`.
    Text,
    /// One JSON object per line with the same fields.
    Json,
}

/// Append-only writer for one worker's share of the audit log.
///
/// Each commit becomes exactly one line, formatted up front and written
/// with a single call so a line is never interleaved.
#[derive(Debug)]
pub struct AuditWriter {
    out: BufWriter<File>,
    format: AuditFormat,
}

impl AuditWriter {
    /// Creates (truncating) the log file at `path`.
    pub fn create(path: &Path, format: AuditFormat) -> io::Result<Self> {
        Ok(Self {
            out: BufWriter::new(File::create(path)?),
            format,
        })
    }

    /// Appends one committed transaction.
    pub fn append(&mut self, info: &CommitInfo) -> io::Result<()> {
        let line = match self.format {
            AuditFormat::Text => format!(
                "{} {} {} {} {} {} {}\n",
                info.order.as_u64(),
                info.read_index,
                info.add_index,
                info.sub_index,
                info.read_value,
                info.add_value,
                info.sub_value,
            ),
            AuditFormat::Json => format!(
                "{}\n",
                json!({
                    "order": info.order.as_u64(),
                    "read": info.read_index,
                    "add": info.add_index,
                    "sub": info.sub_index,
                    "read_value": info.read_value,
                    "add_value": info.add_value,
                    "sub_value": info.sub_value,
                })
            ),
        };
        self.out.write_all(line.as_bytes())
    }

    /// Flushes buffered lines to disk.
    pub fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_core::CommitOrder;
    use tempfile::TempDir;

    fn sample() -> CommitInfo {
        CommitInfo {
            order: CommitOrder::new(1),
            read_index: 0,
            add_index: 1,
            sub_index: 2,
            read_value: 10,
            add_value: 21,
            sub_value: 0,
        }
    }

    #[test]
    fn text_line_matches_reference_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("worker0.log");
        let mut writer = AuditWriter::create(&path, AuditFormat::Text).unwrap();
        writer.append(&sample()).unwrap();
        writer.finish().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "1 0 1 2 10 21 0\n");
    }

    #[test]
    fn json_lines_parse_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("worker0.log");
        let mut writer = AuditWriter::create(&path, AuditFormat::Json).unwrap();
        writer.append(&sample()).unwrap();
        writer.finish().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(contents.trim()).unwrap();
        assert_eq!(parsed["order"], 1);
        assert_eq!(parsed["add_value"], 21);
    }
}
