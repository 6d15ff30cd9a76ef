//! Delimited-text table codec
//!
//! Layout:
//! - first non-blank line is the header
//! - one record per following line, blank lines skipped
//! - LF or CRLF line endings
//!
//! Nested records are flattened to dotted header names (`addr.city`) on
//! write and rebuilt on read.

mod config;
mod line;

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use config::{HeaderMode, QuotePair, TextConfig};
use line::{decode_row, encode_header, encode_row, split_line};

use super::atomic::{create_if_missing, replace_with};
use super::errors::{CodecError, CodecResult};
use super::{RecordCodec, RecordSink, RecordStream};
use crate::observability::{Event, Logger};
use crate::record::Record;

/// Codec for delimited-text files
#[derive(Debug, Clone)]
pub struct TextCodec {
    config: Arc<TextConfig>,
    logger: Logger,
}

impl TextCodec {
    pub fn new(config: TextConfig) -> Self {
        Self {
            config: Arc::new(config),
            logger: Logger::discard(),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &TextConfig {
        &self.config
    }

    fn header_texts(&self, line: &str) -> Vec<String> {
        split_line(line, &self.config)
            .into_iter()
            .map(|c| c.text)
            .collect()
    }

    /// Header of an existing table; empty for a missing or empty file
    fn read_header(&self, path: &Path) -> CodecResult<Vec<String>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CodecError::io(format!("open {}", path.display()), &e)),
        };
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| read_error(path, e))?;
            let line = trim_cr(&line);
            if !line.trim().is_empty() {
                return Ok(self.header_texts(line));
            }
        }
        Ok(Vec::new())
    }

    fn write_table(&self, path: &Path, header: &[String], records: &[Record]) -> CodecResult<()> {
        replace_with(path, |out| {
            if !header.is_empty() {
                writeln!(out, "{}", encode_header(header, &self.config))?;
            }
            for record in records {
                writeln!(out, "{}", encode_row(record, header, &self.config)?)?;
            }
            Ok(())
        })
    }

    /// Rewrites the table under a wider header, padding old rows with
    /// empty cells, then adds `records`.
    fn rewrite_with_header(
        &self,
        path: &Path,
        header: &[String],
        records: &[Record],
    ) -> CodecResult<()> {
        let source = File::open(path).map_err(|e| CodecError::io(format!("open {}", path.display()), &e))?;
        let delimiter = self.config.delimiter;

        replace_with(path, |out| {
            writeln!(out, "{}", encode_header(header, &self.config))?;
            let mut seen_header = false;
            for line in BufReader::new(source).lines() {
                let line = line.map_err(|e| read_error(path, e))?;
                let line = trim_cr(&line);
                if line.trim().is_empty() {
                    continue;
                }
                if !seen_header {
                    seen_header = true;
                    continue;
                }
                let cells = split_line(line, &self.config).len();
                let mut row = String::from(line);
                for _ in cells..header.len() {
                    row.push(delimiter);
                }
                writeln!(out, "{}", row)?;
            }
            for record in records {
                writeln!(out, "{}", encode_row(record, header, &self.config)?)?;
            }
            Ok(())
        })
    }

    /// Adds rows at the end of the file in place
    fn append_rows(&self, path: &Path, header: &[String], records: &[Record]) -> CodecResult<()> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(path)
            .map_err(|e| CodecError::io(format!("open {} for append", path.display()), &e))?;

        let mut chunk = String::new();
        if !ends_with_newline(&mut file).map_err(|e| read_error(path, e))? {
            chunk.push('\n');
        }
        for record in records {
            chunk.push_str(&encode_row(record, header, &self.config)?);
            chunk.push('\n');
        }
        file.write_all(chunk.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| CodecError::io(format!("append to {}", path.display()), &e))
    }

    fn extend_header(&self, header: &mut Vec<String>, records: &[Record], path: &Path) -> bool {
        let before = header.len();
        for record in records {
            for (name, _) in record.flatten() {
                if !header.iter().any(|h| h.eq_ignore_ascii_case(&name)) {
                    header.push(name);
                }
            }
        }
        let added = header.len() - before;
        if added > 0 {
            let path = path.display().to_string();
            let added = added.to_string();
            self.logger.info(
                Event::HeaderRewritten.as_str(),
                &[("path", path.as_str()), ("added", added.as_str())],
            );
        }
        added > 0
    }
}

/// Union of flattened field names, sorted
fn derive_header(records: &[Record]) -> Vec<String> {
    let mut header: Vec<String> = Vec::new();
    for record in records {
        for (name, _) in record.flatten() {
            if !header.iter().any(|h| h.eq_ignore_ascii_case(&name)) {
                header.push(name);
            }
        }
    }
    header.sort();
    header
}

fn trim_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

fn read_error(path: &Path, err: io::Error) -> CodecError {
    if err.kind() == io::ErrorKind::InvalidData {
        CodecError::malformed(path.display().to_string(), err.to_string())
    } else {
        CodecError::io(format!("read {}", path.display()), &err)
    }
}

/// True for an empty file or one whose last byte is `\n`
fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    let len = file.seek(SeekFrom::End(0))?;
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Streams data lines of a text table as records
struct TextStream<R> {
    lines: io::Lines<R>,
    header: Option<Vec<String>>,
    config: Arc<TextConfig>,
    path: PathBuf,
    done: bool,
}

impl<R: BufRead> Iterator for TextStream<R> {
    type Item = CodecResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let line = match self.lines.next() {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(read_error(&self.path, e)));
                }
                Some(Ok(line)) => line,
            };
            let line = trim_cr(&line);
            if line.trim().is_empty() {
                continue;
            }
            if let Some(header) = &self.header {
                return Some(Ok(decode_row(line, header, &self.config)));
            }
            let header = split_line(line, &self.config)
                .into_iter()
                .map(|c| c.text)
                .collect();
            self.header = Some(header);
        }
        None
    }
}

struct TextSink {
    codec: TextCodec,
    path: PathBuf,
    header: Vec<String>,
}

impl RecordSink for TextSink {
    fn commit(self: Box<Self>, records: &[Record]) -> CodecResult<()> {
        let mut header = self.header.clone();
        if header.is_empty() {
            header = derive_header(records);
        } else if self.codec.config.header_mode == HeaderMode::Loose {
            self.codec.extend_header(&mut header, records, &self.path);
        }
        self.codec.write_table(&self.path, &header, records)
    }
}

impl RecordCodec for TextCodec {
    fn default_extension(&self) -> &'static str {
        if self.config.delimiter == ',' {
            "csv"
        } else {
            "txt"
        }
    }

    fn create_empty(&self, path: &Path) -> CodecResult<()> {
        create_if_missing(path, b"")
    }

    fn open_read(&self, path: &Path) -> CodecResult<RecordStream> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Box::new(std::iter::empty())),
            Err(e) => return Err(CodecError::io(format!("open {}", path.display()), &e)),
        };
        Ok(Box::new(TextStream {
            lines: BufReader::new(file).lines(),
            header: None,
            config: Arc::clone(&self.config),
            path: path.to_path_buf(),
            done: false,
        }))
    }

    fn open_write(&self, path: &Path) -> CodecResult<Box<dyn RecordSink>> {
        Ok(Box::new(TextSink {
            codec: self.clone(),
            path: path.to_path_buf(),
            header: self.read_header(path)?,
        }))
    }

    fn append(&self, path: &Path, records: &[Record]) -> CodecResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let header = self.read_header(path)?;
        if header.is_empty() {
            return self.write_table(path, &derive_header(records), records);
        }
        let mut wider = header.clone();
        if self.config.header_mode == HeaderMode::Loose
            && self.extend_header(&mut wider, records, path)
        {
            return self.rewrite_with_header(path, &wider, records);
        }
        self.append_rows(path, &header, records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_all;
    use crate::record::Value;
    use std::fs;
    use tempfile::TempDir;

    fn table(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("t.csv");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_reads_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let path = table(&dir, "A,B,C\r\nmakan'ikan,asin,sekali\r\n\r\n1,2.5,'x'\n");
        let codec = TextCodec::new(TextConfig::default());
        let rows = read_all(&codec, &path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("A"), Some(&Value::from("makan'ikan")));
        assert_eq!(rows[0].get("B"), Some(&Value::from("asin")));
        assert_eq!(rows[0].get("C"), Some(&Value::from("sekali")));
        assert_eq!(rows[1].get("a"), Some(&Value::Int(1)));
        assert_eq!(rows[1].get("b"), Some(&Value::Float(2.5)));
        assert_eq!(rows[1].get("c"), Some(&Value::from("x")));
    }

    #[test]
    fn test_append_to_empty_file_derives_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        let codec = TextCodec::new(TextConfig::default());
        codec.create_empty(&path).unwrap();

        let mut rec = Record::new().with("name", "Ada").with("age", 36);
        rec.set_path("addr.city", "London");
        codec.append(&path, &[rec.clone()]).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "addr.city,age,name\n\"London\",36,\"Ada\"\n"
        );
        assert_eq!(read_all(&codec, &path).unwrap(), vec![rec]);
    }

    #[test]
    fn test_strict_mode_drops_unknown_fields() {
        let dir = TempDir::new().unwrap();
        let path = table(&dir, "id,name\n1,\"a\"");
        let codec = TextCodec::new(TextConfig::default());
        codec
            .append(&path, &[Record::new().with("ID", 2).with("extra", true)])
            .unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "id,name\n1,\"a\"\n2,\n");
    }

    #[test]
    fn test_loose_mode_extends_header_and_pads_rows() {
        let dir = TempDir::new().unwrap();
        let path = table(&dir, "id,name\n1,\"a\"\n");
        let codec =
            TextCodec::new(TextConfig::default().with_header_mode(HeaderMode::Loose));
        codec
            .append(&path, &[Record::new().with("id", 2).with("zip", "N1")])
            .unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "id,name,zip\n1,\"a\",\n2,,\"N1\"\n"
        );
    }

    #[test]
    fn test_loose_append_without_new_fields_is_in_place() {
        let dir = TempDir::new().unwrap();
        let path = table(&dir, "id\n1\n");
        let codec =
            TextCodec::new(TextConfig::default().with_header_mode(HeaderMode::Loose));
        codec.append(&path, &[Record::new().with("id", 2)]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "id\n1\n2\n");
    }

    #[test]
    fn test_sink_keeps_header_on_truncate() {
        let dir = TempDir::new().unwrap();
        let path = table(&dir, "id,name\n1,\"a\"\n");
        let codec = TextCodec::new(TextConfig::default());
        codec.open_write(&path).unwrap().commit(&[]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "id,name\n");
        assert!(read_all(&codec, &path).unwrap().is_empty());
    }

    #[test]
    fn test_sink_logs_header_rewrite() {
        let dir = TempDir::new().unwrap();
        let path = table(&dir, "id\n1\n");
        let (logger, sink) = Logger::memory();
        let codec = TextCodec::new(TextConfig::default().with_header_mode(HeaderMode::Loose))
            .with_logger(logger);
        codec
            .open_write(&path)
            .unwrap()
            .commit(&[Record::new().with("id", 1).with("tag", "x")])
            .unwrap();
        assert!(sink.contains_event("HEADER_REWRITTEN"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "id,tag\n1,\"x\"\n");
    }

    #[test]
    fn test_custom_delimiter_extension() {
        assert_eq!(TextCodec::new(TextConfig::new('|')).default_extension(), "txt");
        assert_eq!(TextCodec::new(TextConfig::default()).default_extension(), "csv");
    }
}
