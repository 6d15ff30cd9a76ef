//! JSON-array table codec
//!
//! The file is a single top-level array of objects. Reading walks the
//! array one element at a time from a buffered reader, so only the
//! current record is ever held in memory. Writing emits one object per
//! line.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::atomic::{create_if_missing, replace_with};
use super::errors::{CodecError, CodecResult};
use super::{read_all, RecordCodec, RecordSink, RecordStream};
use crate::record::Record;

/// Codec for JSON-array files
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        JsonCodec
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayState {
    /// Before the opening bracket
    Start,
    /// Right after `[`
    First,
    /// After an element, expecting `,` or `]`
    Next,
    Done,
}

/// Streams the elements of a top-level JSON array
struct JsonArrayStream<R> {
    reader: R,
    path: String,
    state: ArrayState,
}

impl<R: BufRead> JsonArrayStream<R> {
    fn new(reader: R, path: String) -> Self {
        Self {
            reader,
            path,
            state: ArrayState::Start,
        }
    }

    /// Skips whitespace and returns the next byte without consuming it
    fn peek(&mut self) -> io::Result<Option<u8>> {
        loop {
            let buf = self.reader.fill_buf()?;
            if buf.is_empty() {
                return Ok(None);
            }
            let skip = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
            if skip < buf.len() {
                let next = buf[skip];
                self.reader.consume(skip);
                return Ok(Some(next));
            }
            let len = buf.len();
            self.reader.consume(len);
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> CodecError {
        CodecError::malformed(self.path.clone(), reason)
    }

    fn read_element(&mut self) -> CodecResult<Record> {
        match self.peek()? {
            Some(b'{') => {}
            Some(b) => {
                return Err(self.malformed(format!(
                    "array element must be an object, found {:?}",
                    b as char
                )))
            }
            None => return Err(self.malformed("unexpected end of file inside array")),
        }
        let parsed = {
            let mut de = serde_json::Deserializer::from_reader(&mut self.reader);
            serde_json::Value::deserialize(&mut de)
        };
        let value = parsed.map_err(|e| self.malformed(e.to_string()))?;
        Record::from_json(value).map_err(|e| self.malformed(e.to_string()))
    }

    fn advance(&mut self) -> CodecResult<Option<Record>> {
        loop {
            match self.state {
                ArrayState::Done => return Ok(None),
                ArrayState::Start => match self.peek()? {
                    // zero-byte file reads as an empty table
                    None => {
                        self.state = ArrayState::Done;
                        return Ok(None);
                    }
                    Some(b'[') => {
                        self.reader.consume(1);
                        self.state = ArrayState::First;
                    }
                    Some(_) => return Err(self.malformed("expected a top-level array")),
                },
                ArrayState::First => {
                    if self.peek()? == Some(b']') {
                        self.reader.consume(1);
                        self.state = ArrayState::Done;
                        return Ok(None);
                    }
                    let record = self.read_element()?;
                    self.state = ArrayState::Next;
                    return Ok(Some(record));
                }
                ArrayState::Next => match self.peek()? {
                    Some(b',') => {
                        self.reader.consume(1);
                        let record = self.read_element()?;
                        return Ok(Some(record));
                    }
                    Some(b']') => {
                        self.reader.consume(1);
                        self.state = ArrayState::Done;
                        return Ok(None);
                    }
                    Some(b) => {
                        return Err(
                            self.malformed(format!("expected ',' or ']', found {:?}", b as char))
                        )
                    }
                    None => return Err(self.malformed("unexpected end of file inside array")),
                },
            }
        }
    }
}

impl<R: BufRead> Iterator for JsonArrayStream<R> {
    type Item = CodecResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                self.state = ArrayState::Done;
                Some(Err(e))
            }
        }
    }
}

fn write_array(out: &mut dyn Write, records: &[Record]) -> CodecResult<()> {
    out.write_all(b"[")?;
    for (i, record) in records.iter().enumerate() {
        let sep: &[u8] = if i == 0 { b"\n" } else { b",\n" };
        out.write_all(sep)?;
        serde_json::to_writer(&mut *out, record)
            .map_err(|e| CodecError::Io(format!("serialize record: {}", e)))?;
    }
    let close: &[u8] = if records.is_empty() { b"]\n" } else { b"\n]\n" };
    out.write_all(close)?;
    Ok(())
}

struct JsonSink {
    path: PathBuf,
}

impl RecordSink for JsonSink {
    fn commit(self: Box<Self>, records: &[Record]) -> CodecResult<()> {
        replace_with(&self.path, |out| write_array(out, records))
    }
}

impl RecordCodec for JsonCodec {
    fn default_extension(&self) -> &'static str {
        "json"
    }

    fn create_empty(&self, path: &Path) -> CodecResult<()> {
        create_if_missing(path, b"[]\n")
    }

    fn open_read(&self, path: &Path) -> CodecResult<RecordStream> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Box::new(std::iter::empty())),
            Err(e) => return Err(CodecError::io(format!("open {}", path.display()), &e)),
        };
        Ok(Box::new(JsonArrayStream::new(
            BufReader::new(file),
            path.display().to_string(),
        )))
    }

    fn open_write(&self, path: &Path) -> CodecResult<Box<dyn RecordSink>> {
        Ok(Box::new(JsonSink {
            path: path.to_path_buf(),
        }))
    }

    fn append(&self, path: &Path, records: &[Record]) -> CodecResult<()> {
        let mut all = read_all(self, path)?;
        all.extend_from_slice(records);
        self.open_write(path)?.commit(&all)
    }
}
