//! Line-level parsing and rendering for delimited text
//!
//! A cell is quoted when any part of it sat between a quote pair. Quoted
//! cells always decode as strings. Inside quotes a doubled closing quote
//! stands for one literal closing quote. An opening quote that never
//! closes is taken literally and parsing resumes right after it.
//!
//! Strings holding a line break cannot be stored, and neither can strings
//! holding the delimiter when quoting is off.

use std::fmt::Write;

use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};

use super::config::{QuotePair, TextConfig};
use crate::codec::{CodecError, CodecResult};
use crate::record::{format_timestamp, Record, Value};

/// One raw cell of a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Cell {
    pub text: String,
    pub quoted: bool,
}

/// Splits a line into cells. The trailing `\r` of a CRLF line must be
/// stripped by the caller.
pub(crate) fn split_line(line: &str, cfg: &TextConfig) -> Vec<Cell> {
    let chars: Vec<char> = line.chars().collect();
    let mut cells = Vec::new();
    let mut buf = String::new();
    let mut quoted = false;
    // (closing char, index of the opening char, buffer length at open)
    let mut open: Option<(char, usize, usize)> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if let Some((close, start, mark)) = open {
            if c == close && chars.get(i + 1) == Some(&close) {
                buf.push(close);
                i += 2;
            } else {
                if c == close {
                    open = None;
                    quoted = true;
                } else {
                    buf.push(c);
                }
                i += 1;
            }
            if i >= chars.len() && open.is_some() {
                // unterminated: the opening char is literal, rescan after it
                buf.truncate(mark);
                buf.push(chars[start]);
                open = None;
                i = start + 1;
            }
            continue;
        }

        if let Some(pair) = cfg.opening_quote(c) {
            if i + 1 == chars.len() {
                buf.push(c);
            } else {
                open = Some((pair.close, i, buf.len()));
            }
            i += 1;
            continue;
        }

        if c == cfg.delimiter {
            cells.push(Cell {
                text: std::mem::take(&mut buf),
                quoted,
            });
            quoted = false;
        } else {
            buf.push(c);
        }
        i += 1;
    }

    cells.push(Cell { text: buf, quoted });
    cells
}

fn parse_timestamp(text: &str, format: &str) -> Option<Value> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
        return Some(Value::Timestamp(Utc.from_utc_datetime(&dt)));
    }
    let date = NaiveDate::parse_from_str(text, format).ok()?;
    Some(Value::Timestamp(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?)))
}

/// Decodes one cell for `field`.
///
/// Unquoted text is tried as timestamp, bool, integer and float in that
/// order before falling back to a string.
pub(crate) fn decode_cell(cell: Cell, field: &str, cfg: &TextConfig) -> Value {
    if cell.quoted || cell.text.is_empty() {
        return Value::String(cell.text);
    }
    let text = cell.text.as_str();
    if let Some(ts) = parse_timestamp(text, cfg.date_format_for(field)) {
        return ts;
    }
    match text {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = text.parse::<i64>() {
        return Value::Int(i);
    }
    // require a digit so "nan" and "inf" stay strings
    if text.bytes().any(|b| b.is_ascii_digit()) {
        if let Ok(f) = text.parse::<f64>() {
            return Value::Float(f);
        }
    }
    Value::String(cell.text)
}

/// Builds a record from the cells of one data line
pub(crate) fn decode_row(line: &str, header: &[String], cfg: &TextConfig) -> Record {
    let mut record = Record::new();
    for (idx, cell) in split_line(line, cfg).into_iter().enumerate() {
        let name = header
            .get(idx)
            .cloned()
            .unwrap_or_else(|| idx.to_string());
        let value = decode_cell(cell, &name, cfg);
        record.set_path(&name, value);
    }
    record
}

/// Wraps `text` in the first pair it does not contain, else in the first
/// pair with its closing char doubled
fn quote(text: &str, cfg: &TextConfig) -> Option<String> {
    if let Some(q) = cfg
        .quotes
        .iter()
        .find(|q| !text.contains(q.open) && !text.contains(q.close))
    {
        return Some(format!("{}{}{}", q.open, text, q.close));
    }
    let QuotePair { open, close } = *cfg.quotes.first()?;
    let mut out = String::with_capacity(text.len() + 2);
    out.push(open);
    for c in text.chars() {
        if c == close {
            out.push(close);
        }
        out.push(c);
    }
    out.push(close);
    Some(out)
}

fn encode_text(text: &str, field: &str, cfg: &TextConfig) -> CodecResult<String> {
    if text.contains(['\n', '\r']) {
        return Err(CodecError::unencodable(field, "line breaks cannot be stored in a text cell"));
    }
    let quoted = if cfg.use_quotes { quote(text, cfg) } else { None };
    match quoted {
        Some(cell) => Ok(cell),
        None if text.contains(cfg.delimiter) => Err(CodecError::unencodable(
            field,
            format!("unquoted value contains the delimiter {:?}", cfg.delimiter),
        )),
        None => Ok(text.to_string()),
    }
}

/// Renders one value as a cell
pub(crate) fn encode_cell(value: &Value, field: &str, cfg: &TextConfig) -> CodecResult<String> {
    let cell = match value {
        Value::Null | Value::Record(_) => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        // Debug keeps a trailing ".0" so floats read back as floats
        Value::Float(f) => format!("{:?}", f),
        Value::Timestamp(t) => {
            // an invalid format string fails at render time
            let mut out = String::new();
            match write!(out, "{}", t.format(cfg.date_format_for(field))) {
                Ok(()) => out,
                Err(_) => format_timestamp(t),
            }
        }
        Value::String(s) => return encode_text(s, field, cfg),
        Value::List(_) => return encode_text(&value.to_json().to_string(), field, cfg),
    };
    Ok(cell)
}

/// Renders a record against `header`; absent fields become empty cells
pub(crate) fn encode_row(record: &Record, header: &[String], cfg: &TextConfig) -> CodecResult<String> {
    let mut line = String::new();
    for (idx, name) in header.iter().enumerate() {
        if idx > 0 {
            line.push(cfg.delimiter);
        }
        if let Some(value) = record.get_path(name) {
            line.push_str(&encode_cell(value, name, cfg)?);
        }
    }
    Ok(line)
}

/// Renders the header line
pub(crate) fn encode_header(header: &[String], cfg: &TextConfig) -> String {
    let mut delim = [0u8; 4];
    header.join(&*cfg.delimiter.encode_utf8(&mut delim))
}
