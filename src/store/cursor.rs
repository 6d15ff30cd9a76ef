//! Query cursor
//!
//! A cursor runs one [`QueryPlan`] against one table file. Plans without
//! grouping, aggregation or sorting stream: matches are skipped and taken
//! straight off the codec stream, which stays open between fetches.
//! Everything else materializes the matches once, then drains them.
//!
//! The first error is kept and returned by every later call until
//! [`Cursor::reset`].

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::errors::{StoreError, StoreResult};
use crate::codec::{RecordCodec, RecordStream};
use crate::observability::{Event, Logger};
use crate::query::{aggregate, sort_by, QueryPlan};
use crate::record::Record;

/// Cursor lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Unopened,
    Streaming,
    Exhausted,
    /// Absorbing until reset
    Errored,
}

/// Pull-based reader over one query plan
pub struct Cursor {
    codec: Arc<dyn RecordCodec>,
    path: PathBuf,
    plan: QueryPlan,
    logger: Logger,
    state: CursorState,
    stream: Option<RecordStream>,
    buffer: VecDeque<Record>,
    skipped: usize,
    returned: usize,
    error: Option<StoreError>,
    error_reported: bool,
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("path", &self.path)
            .field("table", &self.plan.table)
            .field("state", &self.state)
            .field("returned", &self.returned)
            .finish()
    }
}

impl Cursor {
    pub(crate) fn new(
        codec: Arc<dyn RecordCodec>,
        path: PathBuf,
        plan: QueryPlan,
        logger: Logger,
    ) -> Self {
        Self {
            codec,
            path,
            plan,
            logger,
            state: CursorState::Unopened,
            stream: None,
            buffer: VecDeque::new(),
            skipped: 0,
            returned: 0,
            error: None,
            error_reported: false,
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns up to `n` records; `0` returns everything left.
    /// An empty vector means the cursor is exhausted.
    pub fn fetch(&mut self, n: usize) -> StoreResult<Vec<Record>> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let result = self.fetch_inner(n);
        if let Err(err) = &result {
            self.fail(err.clone());
        }
        result
    }

    /// Next record, or [`StoreError::Eof`] once exhausted
    pub fn fetch_one(&mut self) -> StoreResult<Record> {
        self.fetch(1)?.into_iter().next().ok_or(StoreError::Eof)
    }

    /// Like [`fetch`](Self::fetch), deserializing each record into `T`
    pub fn fetch_as<T: DeserializeOwned>(&mut self, n: usize) -> StoreResult<Vec<T>> {
        let records = self.fetch(n)?;
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            match record.deserialize_into() {
                Ok(value) => out.push(value),
                Err(e) => {
                    let err = StoreError::from(e);
                    self.fail(err.clone());
                    return Err(err);
                }
            }
        }
        Ok(out)
    }

    /// Next record deserialized into `T`, or [`StoreError::Eof`]
    pub fn fetch_one_as<T: DeserializeOwned>(&mut self) -> StoreResult<T> {
        self.fetch_as(1)?.into_iter().next().ok_or(StoreError::Eof)
    }

    /// Number of records matching the filter.
    ///
    /// Uses a scan of its own, so the cursor position is unaffected.
    /// Grouping, skip and take are not applied.
    pub fn count(&mut self) -> StoreResult<usize> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let result = self.count_matches();
        if let Err(err) = &result {
            self.fail(err.clone());
        }
        result
    }

    /// Iterates the remaining records one fetch at a time
    pub fn records(&mut self) -> Records<'_> {
        Records { cursor: self }
    }

    /// Rewinds to the unopened state and clears any kept error
    pub fn reset(&mut self) {
        self.stream = None;
        self.buffer.clear();
        self.skipped = 0;
        self.returned = 0;
        self.error = None;
        self.error_reported = false;
        self.state = CursorState::Unopened;
    }

    /// Drops the underlying stream; later fetches return nothing
    pub fn close(&mut self) {
        self.stream = None;
        self.buffer.clear();
        if self.state != CursorState::Errored {
            self.state = CursorState::Exhausted;
        }
    }

    fn fail(&mut self, err: StoreError) {
        self.stream = None;
        self.buffer.clear();
        self.state = CursorState::Errored;
        let table = self.plan.table.clone();
        let message = err.to_string();
        self.logger.warn(
            Event::CursorErrored.as_str(),
            &[
                ("table", table.as_str()),
                ("code", err.code()),
                ("error", message.as_str()),
            ],
        );
        self.error = Some(err);
    }

    fn fetch_inner(&mut self, n: usize) -> StoreResult<Vec<Record>> {
        if self.state == CursorState::Unopened {
            self.open()?;
        }
        if self.state == CursorState::Exhausted {
            return Ok(Vec::new());
        }
        let want = if n == 0 { usize::MAX } else { n };
        if self.plan.is_streaming() {
            self.fetch_streaming(want)
        } else {
            Ok(self.drain(want))
        }
    }

    fn open(&mut self) -> StoreResult<()> {
        self.plan.validate()?;
        let stream = self.codec.open_read(&self.path)?;
        if self.plan.is_streaming() {
            self.stream = Some(stream);
        } else {
            self.buffer = self.materialize(stream)?.into();
        }
        self.state = CursorState::Streaming;
        Ok(())
    }

    fn matches(&self, record: &Record) -> StoreResult<bool> {
        match &self.plan.filter {
            Some(filter) => Ok(filter.matches(record)?),
            None => Ok(true),
        }
    }

    fn project(&self, record: Record) -> Record {
        if self.plan.select.is_empty() {
            record
        } else {
            record.project(&self.plan.select)
        }
    }

    fn fetch_streaming(&mut self, want: usize) -> StoreResult<Vec<Record>> {
        let mut out = Vec::new();
        while out.len() < want {
            if self.plan.take > 0 && self.returned >= self.plan.take {
                self.exhaust();
                break;
            }
            let next = match self.stream.as_mut() {
                Some(stream) => stream.next(),
                None => None,
            };
            let record = match next {
                Some(record) => record?,
                None => {
                    self.exhaust();
                    break;
                }
            };
            if !self.matches(&record)? {
                continue;
            }
            if self.skipped < self.plan.skip {
                self.skipped += 1;
                continue;
            }
            self.returned += 1;
            out.push(self.project(record));
        }
        Ok(out)
    }

    fn materialize(&self, stream: RecordStream) -> StoreResult<Vec<Record>> {
        let mut matched = Vec::new();
        for record in stream {
            let record = record?;
            if self.matches(&record)? {
                matched.push(record);
            }
        }

        let mut rows = if self.plan.aggregates.is_empty() {
            matched
        } else {
            aggregate(&matched, &self.plan.aggregates, &self.plan.group_by)?
        };
        sort_by(&mut rows, &self.plan.sort)?;

        let start = self.plan.skip.min(rows.len());
        let end = if self.plan.take == 0 {
            rows.len()
        } else {
            start.saturating_add(self.plan.take).min(rows.len())
        };
        Ok(rows
            .into_iter()
            .skip(start)
            .take(end - start)
            .map(|r| self.project(r))
            .collect())
    }

    fn drain(&mut self, want: usize) -> Vec<Record> {
        let count = want.min(self.buffer.len());
        let out: Vec<Record> = self.buffer.drain(..count).collect();
        if self.buffer.is_empty() {
            self.state = CursorState::Exhausted;
        }
        out
    }

    fn exhaust(&mut self) {
        self.stream = None;
        self.state = CursorState::Exhausted;
    }

    fn count_matches(&self) -> StoreResult<usize> {
        self.plan.validate()?;
        let mut count = 0;
        for record in self.codec.open_read(&self.path)? {
            if self.matches(&record?)? {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Borrowing iterator returned by [`Cursor::records`]
#[derive(Debug)]
pub struct Records<'a> {
    cursor: &'a mut Cursor,
}

impl Iterator for Records<'_> {
    type Item = StoreResult<Record>;

    /// Yields records one by one. A failure is yielded once, then the
    /// iterator ends.
    fn next(&mut self) -> Option<Self::Item> {
        let cursor = &mut *self.cursor;
        if cursor.error.is_some() && cursor.error_reported {
            return None;
        }
        match cursor.fetch_one() {
            Ok(record) => Some(Ok(record)),
            Err(StoreError::Eof) => None,
            Err(err) => {
                cursor.error_reported = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::query::{AggrItem, Filter};
    use crate::record::Value;
    use serde::Deserialize;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn table(dir: &TempDir, rows: serde_json::Value) -> PathBuf {
        let path = dir.path().join("t.json");
        fs::write(&path, rows.to_string()).unwrap();
        path
    }

    fn numbers(dir: &TempDir, n: i64) -> PathBuf {
        let rows: Vec<_> = (0..n).map(|i| json!({"n": i, "odd": i % 2 == 1})).collect();
        table(dir, json!(rows))
    }

    fn cursor(path: PathBuf, plan: QueryPlan) -> Cursor {
        Cursor::new(Arc::new(JsonCodec::new()), path, plan, Logger::discard())
    }

    fn ns(records: &[Record]) -> Vec<i64> {
        records.iter().map(|r| r.get("n").unwrap().as_i64().unwrap()).collect()
    }

    #[test]
    fn test_streaming_fetch_continues_between_calls() {
        let dir = TempDir::new().unwrap();
        let mut c = cursor(numbers(&dir, 10), QueryPlan::new("t"));
        assert_eq!(c.state(), CursorState::Unopened);
        assert_eq!(ns(&c.fetch(3).unwrap()), vec![0, 1, 2]);
        assert_eq!(c.state(), CursorState::Streaming);
        assert_eq!(ns(&c.fetch(3).unwrap()), vec![3, 4, 5]);
        assert_eq!(ns(&c.fetch(0).unwrap()), vec![6, 7, 8, 9]);
        assert!(c.fetch(1).unwrap().is_empty());
        assert_eq!(c.state(), CursorState::Exhausted);
    }

    #[test]
    fn test_fast_path_matches_materialized_slice() {
        let dir = TempDir::new().unwrap();
        let path = numbers(&dir, 10);
        for skip in [0, 1, 5, 12] {
            for take in [0, 1, 3] {
                let plan = QueryPlan::new("t").skip(skip).take(take);
                let fast = cursor(path.clone(), plan.clone()).fetch(0).unwrap();

                let all: Vec<i64> = (0..10).collect();
                let start = skip.min(all.len());
                let end = if take == 0 { all.len() } else { (start + take).min(all.len()) };
                assert_eq!(ns(&fast), all[start..end].to_vec(), "skip={} take={}", skip, take);

                // a no-op sort key forces materialization
                let slow = cursor(path.clone(), plan.sort_by(["n"])).fetch(0).unwrap();
                assert_eq!(fast, slow);
            }
        }
    }

    #[test]
    fn test_filter_skip_take_apply_to_matches() {
        let dir = TempDir::new().unwrap();
        let plan = QueryPlan::new("t")
            .with_filter(Filter::eq("odd", true))
            .skip(1)
            .take(2);
        let mut c = cursor(numbers(&dir, 10), plan);
        assert_eq!(ns(&c.fetch(0).unwrap()), vec![3, 5]);
    }

    #[test]
    fn test_sorted_and_aggregated_plan() {
        let dir = TempDir::new().unwrap();
        let path = table(
            &dir,
            json!([
                {"g": "A", "v": 1}, {"g": "B", "v": 10}, {"g": "A", "v": 5},
                {"g": "A", "v": 9}, {"g": "B", "v": 2}
            ]),
        );
        let plan = QueryPlan::new("t")
            .group_by(["g"])
            .aggregate(AggrItem::sum("v"))
            .sort_by(["-v"]);
        let rows = cursor(path, plan).fetch(0).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("g"), Some(&Value::from("A")));
        assert_eq!(rows[0].get("v"), Some(&Value::Int(15)));
        assert_eq!(rows[1].get("v"), Some(&Value::Int(12)));
    }

    #[test]
    fn test_select_projects_output() {
        let dir = TempDir::new().unwrap();
        let path = table(&dir, json!([{"a": 1, "b": 2, "c": {"d": 3}}]));
        let rec = cursor(path, QueryPlan::new("t").select(["A", "c.d"]))
            .fetch_one()
            .unwrap();
        assert_eq!(rec.len(), 2);
        assert_eq!(rec.get_path("c.d"), Some(&Value::Int(3)));
        assert!(rec.get("b").is_none());
    }

    #[test]
    fn test_fetch_one_eof() {
        let dir = TempDir::new().unwrap();
        let mut c = cursor(numbers(&dir, 1), QueryPlan::new("t"));
        assert!(c.fetch_one().is_ok());
        assert_eq!(c.fetch_one().unwrap_err(), StoreError::Eof);
        // eof is not sticky
        c.reset();
        assert!(c.fetch_one().is_ok());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut c = cursor(dir.path().join("none.json"), QueryPlan::new("t"));
        assert!(c.fetch(0).unwrap().is_empty());
        assert_eq!(c.count().unwrap(), 0);
    }

    #[test]
    fn test_errors_are_sticky_until_reset() {
        let dir = TempDir::new().unwrap();
        let path = table(&dir, json!([{"n": 1}, {"m": 2}]));
        let (logger, sink) = Logger::memory();
        let plan = QueryPlan::new("t").with_filter(Filter::gt("n", 0));
        let mut c = Cursor::new(Arc::new(JsonCodec::new()), path.clone(), plan, logger);

        let err = c.fetch(0).unwrap_err();
        assert_eq!(err.code(), "FLEX_FIELD_NOT_FOUND");
        assert_eq!(c.state(), CursorState::Errored);
        assert_eq!(c.fetch(1).unwrap_err(), err);
        assert_eq!(c.count().unwrap_err(), err);
        assert!(sink.contains_event("CURSOR_ERRORED"));

        fs::write(&path, json!([{"n": 1}, {"n": 2}]).to_string()).unwrap();
        c.reset();
        assert_eq!(c.fetch(0).unwrap().len(), 2);
    }

    #[test]
    fn test_count_ignores_grouping_and_paging() {
        let dir = TempDir::new().unwrap();
        let plan = QueryPlan::new("t")
            .with_filter(Filter::eq("odd", false))
            .group_by(["odd"])
            .take(1);
        let mut c = cursor(numbers(&dir, 10), plan);
        assert_eq!(c.count().unwrap(), 5);
        assert_eq!(c.state(), CursorState::Unopened);
    }

    #[test]
    fn test_fetch_as_typed() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Row {
            n: i64,
            odd: bool,
        }
        let dir = TempDir::new().unwrap();
        let mut c = cursor(numbers(&dir, 3), QueryPlan::new("t"));
        let rows: Vec<Row> = c.fetch_as(2).unwrap();
        assert_eq!(rows, vec![Row { n: 0, odd: false }, Row { n: 1, odd: true }]);
        let last: Row = c.fetch_one_as().unwrap();
        assert_eq!(last.n, 2);
    }

    #[test]
    fn test_iterator_and_close() {
        let dir = TempDir::new().unwrap();
        let path = numbers(&dir, 4);
        let all: Vec<Record> = cursor(path.clone(), QueryPlan::new("t"))
            .records()
            .collect::<StoreResult<_>>()
            .unwrap();
        assert_eq!(all.len(), 4);

        let mut c = cursor(path, QueryPlan::new("t"));
        c.fetch(1).unwrap();
        c.close();
        assert_eq!(c.state(), CursorState::Exhausted);
        assert!(c.fetch(0).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_file_errors_once_in_iterator() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.json");
        fs::write(&path, "[{\"n\": 1}, 7]").unwrap();
        let mut c = cursor(path, QueryPlan::new("t"));
        let results: Vec<_> = c.records().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert_eq!(results[1].as_ref().unwrap_err().code(), "FLEX_CODEC_MALFORMED");
    }
}
