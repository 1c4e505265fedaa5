//! In-memory chart source that serves stored series page by page.
//!
//! Series are stored newest first, the order the broker feed uses. A query
//! is answered by projecting each stored row onto the requested fields and
//! handing out `page_size` rows per request. Used for offline re-runs from a
//! columnar dump, for synthetic data, and as the test double for the feed.

use super::dump::ColumnarDump;
use super::provider::{
    chart_code, ChartField, ChartPage, ChartQuery, ChartRow, ChartSource, DataError, Granularity,
};
use std::collections::HashMap;

/// Status code reported when a query asks for a field the series lacks.
pub const STATUS_FIELD_UNAVAILABLE: i32 = -1;

#[derive(Debug, Clone)]
struct Series {
    fields: Vec<ChartField>,
    rows: Vec<ChartRow>,
}

#[derive(Debug, Clone)]
struct Cursor {
    key: (String, Granularity),
    columns: Vec<usize>,
    offset: usize,
    limit: usize,
}

/// One page handed out, as seen by the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedPage {
    pub code: String,
    pub rows: usize,
    /// Newest and oldest date on the page, if it had a date column.
    pub newest: Option<u32>,
    pub oldest: Option<u32>,
}

/// Replays stored series as a paginated chart feed.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    name: String,
    page_size: usize,
    budget: u32,
    calls: u32,
    series: HashMap<(String, Granularity), Series>,
    cursor: Option<Cursor>,
    failures: HashMap<usize, (i32, String)>,
    served: Vec<ServedPage>,
}

impl ReplaySource {
    pub fn new(page_size: usize) -> Self {
        Self {
            name: "replay".to_string(),
            page_size: page_size.max(1),
            budget: 60,
            calls: 0,
            series: HashMap::new(),
            cursor: None,
            failures: HashMap::new(),
            served: Vec::new(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Requests allowed per budget window. The counter refills after the
    /// window is used up.
    pub fn with_budget(mut self, budget: u32) -> Self {
        self.budget = budget.max(1);
        self
    }

    /// Make the `page`-th served page (1-based, counted across all queries)
    /// fail with a source status.
    pub fn fail_on_page(mut self, page: usize, code: i32, message: &str) -> Self {
        self.failures.insert(page, (code, message.to_string()));
        self
    }

    /// Store a series for `code`. Rows must be newest first and aligned to
    /// `fields`.
    pub fn insert_rows(
        &mut self,
        code: &str,
        granularity: Granularity,
        fields: &[ChartField],
        rows: Vec<ChartRow>,
    ) {
        self.series.insert(
            (code.to_string(), granularity),
            Series {
                fields: fields.to_vec(),
                rows,
            },
        );
    }

    /// Load every stock of a minute-bar dump as minute series.
    pub fn from_dump(dump: &ColumnarDump, page_size: usize) -> Result<Self, DataError> {
        let mut source = Self::new(page_size).named(&format!("replay:{}", dump.name()));
        for code in dump.read_keys()? {
            let columns = dump.read_stock(&code)?;
            let rows = columns
                .to_bars()
                .iter()
                .rev()
                .map(|b| {
                    ChartRow(vec![
                        b.date as f64,
                        b.minute as f64,
                        b.open,
                        b.high,
                        b.low,
                        b.close,
                        b.volume as f64,
                    ])
                })
                .collect();
            source.insert_rows(&chart_code(&code), Granularity::Minute, &ChartField::MINUTE_BAR, rows);
        }
        Ok(source)
    }

    /// Codes with at least one stored series.
    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.series.keys().map(|(c, _)| c.clone()).collect();
        codes.sort();
        codes.dedup();
        codes
    }

    /// Every page handed out so far.
    pub fn served(&self) -> &[ServedPage] {
        &self.served
    }

    fn serve(&mut self) -> Result<ChartPage, DataError> {
        self.calls += 1;
        let page_no = self.served.len() + 1;
        if let Some((code, message)) = self.failures.get(&page_no) {
            self.served.push(ServedPage {
                code: String::new(),
                rows: 0,
                newest: None,
                oldest: None,
            });
            self.cursor = None;
            return Err(DataError::Source {
                code: *code,
                message: message.clone(),
            });
        }

        let Some(cursor) = self.cursor.as_mut() else {
            return Err(DataError::Source {
                code: STATUS_FIELD_UNAVAILABLE,
                message: "no active request".into(),
            });
        };

        let (rows, has_more, date_col) = match self.series.get(&cursor.key) {
            Some(series) => {
                let end = (cursor.offset + self.page_size)
                    .min(series.rows.len())
                    .min(cursor.limit);
                let rows: Vec<ChartRow> = series.rows[cursor.offset.min(end)..end]
                    .iter()
                    .map(|row| ChartRow(cursor.columns.iter().map(|&c| row.0[c]).collect()))
                    .collect();
                cursor.offset = end;
                let has_more = end < series.rows.len().min(cursor.limit);
                let date_col = cursor
                    .columns
                    .iter()
                    .position(|&c| series.fields[c] == ChartField::DATE);
                (rows, has_more, date_col)
            }
            None => (Vec::new(), false, None),
        };

        let date_of = |row: &ChartRow| date_col.and_then(|c| row.int(c));
        self.served.push(ServedPage {
            code: cursor.key.0.clone(),
            rows: rows.len(),
            newest: rows.first().and_then(date_of),
            oldest: rows.last().and_then(date_of),
        });

        Ok(ChartPage { rows, has_more })
    }
}

impl ChartSource for ReplaySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn request(&mut self, query: &ChartQuery) -> Result<ChartPage, DataError> {
        let key = (query.code.clone(), query.granularity);
        let columns = match self.series.get(&key) {
            Some(series) => {
                let mut columns = Vec::with_capacity(query.fields.len());
                for field in &query.fields {
                    match series.fields.iter().position(|f| f == field) {
                        Some(c) => columns.push(c),
                        None => {
                            self.calls += 1;
                            return Err(DataError::Source {
                                code: STATUS_FIELD_UNAVAILABLE,
                                message: format!("field {} not available for {}", field.0, query.code),
                            });
                        }
                    }
                }
                columns
            }
            None => Vec::new(),
        };
        self.cursor = Some(Cursor {
            key,
            columns,
            offset: 0,
            limit: query.max_rows as usize,
        });
        self.serve()
    }

    fn request_next(&mut self) -> Result<ChartPage, DataError> {
        self.serve()
    }

    fn remaining_requests(&self) -> u32 {
        self.budget - (self.calls % self.budget)
    }
}
