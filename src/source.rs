//! Recordwalk - Line-delimited JSON source reading
//!
//! Memory-maps the file and indexes line offsets, then parses every
//! non-blank line as one JSON record. Lines that do not parse are skipped
//! and reported, never fatal.

use memmap2::Mmap;
use serde::Serialize;
use serde_json::Value;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Storage backend for the raw bytes
enum SourceStorage {
    /// Memory-mapped file
    Mmap(Mmap),
    /// In-memory buffer (empty files cannot be mapped)
    InMemory(Vec<u8>),
}

impl SourceStorage {
    fn as_bytes(&self) -> &[u8] {
        match self {
            SourceStorage::Mmap(m) => m.as_ref(),
            SourceStorage::InMemory(v) => v.as_slice(),
        }
    }
}

/// A line-delimited file with pre-computed line offsets
pub struct LineSource {
    storage: SourceStorage,
    /// Byte offsets for the start of each line
    line_offsets: Vec<usize>,
}

impl LineSource {
    /// Open a file and build the line index
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut file = File::open(path.as_ref())?;
        let size = file.metadata()?.len();

        let storage = if size == 0 {
            let mut buffer = Vec::new();
            file.read_to_end(&mut buffer)?;
            SourceStorage::InMemory(buffer)
        } else {
            // Memory map the file; the mapping only lives until records are parsed
            SourceStorage::Mmap(unsafe { Mmap::map(&file)? })
        };

        let bytes = storage.as_bytes();
        let mut line_offsets = vec![0];
        for (i, &byte) in bytes.iter().enumerate() {
            if byte == b'\n' && i + 1 < bytes.len() {
                line_offsets.push(i + 1);
            }
        }

        Ok(Self {
            storage,
            line_offsets,
        })
    }

    /// Number of physical lines
    pub fn line_count(&self) -> usize {
        self.line_offsets.len()
    }

    /// Raw bytes of line `index` (0-indexed), without the newline
    pub fn get_line(&self, index: usize) -> Option<&[u8]> {
        let start = *self.line_offsets.get(index)?;
        let data = self.storage.as_bytes();
        let end = match self.line_offsets.get(index + 1) {
            Some(next) => next - 1,
            None => data.len(),
        };
        Some(&data[start.min(end)..end])
    }

    /// Parse every non-blank line as one JSON value
    pub fn parse_records(&self) -> ParsedLines {
        let mut parsed = ParsedLines::default();

        for index in 0..self.line_count() {
            let Some(raw) = self.get_line(index) else {
                continue;
            };
            let line_number = index + 1;

            let text = match std::str::from_utf8(raw) {
                Ok(text) => text.trim(),
                Err(e) => {
                    parsed.skipped.push(SkippedLine {
                        line_number,
                        reason: format!("invalid UTF-8: {}", e),
                    });
                    continue;
                }
            };
            if text.is_empty() {
                continue;
            }

            match serde_json::from_str::<Value>(text) {
                Ok(value) => parsed.records.push(value),
                Err(e) => parsed.skipped.push(SkippedLine {
                    line_number,
                    reason: e.to_string(),
                }),
            }
        }

        parsed
    }
}

/// A line that was dropped during a line-delimited load
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedLine {
    /// 1-based physical line number
    pub line_number: usize,
    pub reason: String,
}

/// Records and diagnostics from one pass over a line-delimited source
#[derive(Debug, Default)]
pub struct ParsedLines {
    pub records: Vec<Value>,
    pub skipped: Vec<SkippedLine>,
}

/// Open and parse a line-delimited JSON file in one step
pub fn read_line_delimited<P: AsRef<Path>>(path: P) -> io::Result<ParsedLines> {
    Ok(LineSource::open(path)?.parse_records())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_line_access() -> io::Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, r#"{{"prompt": "Hello"}}"#)?;
        writeln!(file, r#"{{"prompt": "World"}}"#)?;
        write!(file, r#"{{"prompt": "Test"}}"#)?;

        let source = LineSource::open(file.path())?;
        assert_eq!(source.line_count(), 3);
        assert_eq!(source.get_line(0).unwrap(), br#"{"prompt": "Hello"}"#);
        assert_eq!(source.get_line(2).unwrap(), br#"{"prompt": "Test"}"#);
        assert!(source.get_line(3).is_none());
        Ok(())
    }

    #[test]
    fn test_skips_invalid_and_blank_lines() -> io::Result<()> {
        let mut file = NamedTempFile::new()?;
        write!(file, "{{\"id\":1}}\ninvalid\n\n   \n{{\"id\":2}}\r\n{{bad}}\n{{\"id\":3}}\n")?;

        let parsed = read_line_delimited(file.path())?;
        let ids: Vec<_> = parsed.records.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let skipped: Vec<_> = parsed.skipped.iter().map(|s| s.line_number).collect();
        assert_eq!(skipped, vec![2, 6]);
        Ok(())
    }

    #[test]
    fn test_invalid_utf8_is_skipped() -> io::Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(b"{\"id\":1}\n\xff\xfe\n")?;

        let parsed = read_line_delimited(file.path())?;
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.skipped.len(), 1);
        assert!(parsed.skipped[0].reason.starts_with("invalid UTF-8"));
        Ok(())
    }

    #[test]
    fn test_empty_file() -> io::Result<()> {
        let file = NamedTempFile::new()?;
        let parsed = read_line_delimited(file.path())?;
        assert!(parsed.records.is_empty());
        assert!(parsed.skipped.is_empty());
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let err = read_line_delimited("/definitely/not/here.jsonl").err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
