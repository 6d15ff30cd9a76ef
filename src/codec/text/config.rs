//! Delimited-text format settings

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn default_delimiter() -> char {
    ','
}

fn default_use_quotes() -> bool {
    true
}

fn default_quotes() -> Vec<QuotePair> {
    vec![QuotePair::same('"'), QuotePair::same('\'')]
}

fn default_date_format() -> String {
    "%Y-%m-%d %H:%M:%S".to_string()
}

/// Opening and closing quote characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotePair {
    pub open: char,
    pub close: char,
}

impl QuotePair {
    pub fn new(open: char, close: char) -> Self {
        Self { open, close }
    }

    /// Same character opens and closes
    pub fn same(c: char) -> Self {
        Self::new(c, c)
    }
}

/// How the header reacts to fields it does not know
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderMode {
    /// Header is fixed; unknown fields are dropped on write
    #[default]
    Strict,
    /// Unknown fields extend the header; existing rows get empty cells
    Loose,
}

/// Settings for delimited-text tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextConfig {
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Quote string cells on write and honour quotes on read
    #[serde(default = "default_use_quotes")]
    pub use_quotes: bool,

    #[serde(default = "default_quotes")]
    pub quotes: Vec<QuotePair>,

    /// Fallback chrono format for timestamp cells
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// Per-field overrides of `date_format`
    #[serde(default)]
    pub field_date_formats: HashMap<String, String>,

    #[serde(default)]
    pub header_mode: HeaderMode,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            use_quotes: default_use_quotes(),
            quotes: default_quotes(),
            date_format: default_date_format(),
            field_date_formats: HashMap::new(),
            header_mode: HeaderMode::default(),
        }
    }
}

impl TextConfig {
    /// Defaults with the given delimiter
    pub fn new(delimiter: char) -> Self {
        Self {
            delimiter,
            ..Self::default()
        }
    }

    pub fn with_quotes(mut self, enabled: bool) -> Self {
        self.use_quotes = enabled;
        self
    }

    /// Adds a quote pair after the defaults
    pub fn with_quote_pair(mut self, open: char, close: char) -> Self {
        self.quotes.push(QuotePair::new(open, close));
        self
    }

    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = format.into();
        self
    }

    pub fn with_field_date_format(
        mut self,
        field: impl Into<String>,
        format: impl Into<String>,
    ) -> Self {
        self.field_date_formats.insert(field.into(), format.into());
        self
    }

    pub fn with_header_mode(mut self, mode: HeaderMode) -> Self {
        self.header_mode = mode;
        self
    }

    /// Date format for `field`, falling back to the global one
    pub fn date_format_for(&self, field: &str) -> &str {
        self.field_date_formats
            .get(field)
            .or_else(|| {
                self.field_date_formats
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(field))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
            .unwrap_or(&self.date_format)
    }

    pub(crate) fn opening_quote(&self, c: char) -> Option<QuotePair> {
        if !self.use_quotes {
            return None;
        }
        self.quotes.iter().copied().find(|q| q.open == c)
    }
}
