//! DART disclosure documents: locate, fetch, extract.
//!
//! A filing page does not carry the disclosure itself. It loads the
//! document through a `viewDoc(rcpNo, dcmNo, eleId, offset, length, dtd)`
//! call, and the viewer serves the document's tables. Each report kind reads
//! a handful of labelled cells out of those tables.

use super::listing::{text_of, DartPortal};
use crate::data::disclosure::{clean_field, row_fields};
use crate::data::paginator::{Sleeper, ThreadSleeper};
use crate::data::provider::DataError;
use crate::domain::DisclosureRow;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Viewer parameters of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub rcp_no: String,
    pub dcm_no: String,
    pub ele_id: String,
    pub offset: String,
    pub length: String,
    pub dtd: String,
}

impl DocumentRef {
    /// Query string for `/report/viewer.do`.
    pub fn query(&self) -> [(&'static str, String); 6] {
        [
            ("rcpNo", self.rcp_no.clone()),
            ("dcmNo", self.dcm_no.clone()),
            ("eleId", self.ele_id.clone()),
            ("offset", self.offset.clone()),
            ("length", self.length.clone()),
            ("dtd", self.dtd.clone()),
        ]
    }
}

/// Finds the document reference inside a filing page.
#[derive(Debug, Clone)]
pub struct DocumentLocator {
    call: Regex,
}

impl DocumentLocator {
    pub fn new() -> Result<Self, DataError> {
        let call = Regex::new(r"viewDoc\(+([^()^]+)\)+")
            .map_err(|e| DataError::Other(format!("invalid viewDoc pattern: {e}")))?;
        Ok(Self { call })
    }

    /// First `viewDoc` call with at least six arguments whose receipt and
    /// document numbers are numeric. Pages list a table of contents first,
    /// whose calls carry placeholders.
    pub fn locate(&self, html: &str) -> Option<DocumentRef> {
        self.call.captures_iter(html).find_map(|caps| {
            let args: Vec<String> = caps[1].split(',').map(clean_argument).collect();
            if args.len() < 6 || !is_integer(&args[0]) || !is_integer(&args[1]) {
                return None;
            }
            let or_zero = |arg: &str| if arg == "null" { "0".to_string() } else { arg.to_string() };
            Some(DocumentRef {
                rcp_no: args[0].clone(),
                dcm_no: args[1].clone(),
                ele_id: or_zero(&args[2]),
                offset: or_zero(&args[3]),
                length: or_zero(&args[4]),
                dtd: args[5].clone(),
            })
        })
    }
}

fn clean_argument(arg: &str) -> String {
    arg.trim()
        .chars()
        .filter(|c| !matches!(c, '\\' | '\'' | '"'))
        .collect()
}

fn is_integer(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Fetches filing pages and the documents they embed.
pub trait ReportFetch {
    /// Filing page at `href`, a portal-absolute path.
    fn fetch_filing(&mut self, href: &str) -> Result<String, DataError>;

    fn fetch_document(&mut self, doc: &DocumentRef) -> Result<String, DataError>;
}

impl ReportFetch for DartPortal {
    fn fetch_filing(&mut self, href: &str) -> Result<String, DataError> {
        self.get_text(&self.url(href), &[], "filing")
    }

    fn fetch_document(&mut self, doc: &DocumentRef) -> Result<String, DataError> {
        self.get_text(&self.url("/report/viewer.do"), &doc.query(), "document")
    }
}

/// Disclosure kinds with a structured document reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// Single sale or supply contract.
    SingleSale,
    /// Paid-in capital increase.
    RightsOffering,
    /// Treasury stock acquisition.
    TreasuryStock,
    /// Convertible bond issue.
    ConvertibleBond,
}

impl ReportKind {
    pub const ALL: [ReportKind; 4] = [
        ReportKind::SingleSale,
        ReportKind::RightsOffering,
        ReportKind::TreasuryStock,
        ReportKind::ConvertibleBond,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ReportKind::SingleSale => "single_sale",
            ReportKind::RightsOffering => "rights_offering",
            ReportKind::TreasuryStock => "treasury_stock",
            ReportKind::ConvertibleBond => "convertible_bond",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Title fragment the portal uses for this kind.
    pub fn title_marker(self) -> &'static str {
        match self {
            ReportKind::SingleSale => "단일판매",
            ReportKind::RightsOffering => "유상증자결정",
            ReportKind::TreasuryStock => "자기주식취득결정",
            ReportKind::ConvertibleBond => "전환사채권발행결정",
        }
    }

    pub fn matches_title(self, title: &str) -> bool {
        title.contains(self.title_marker())
    }

    /// Document parser for this kind.
    pub fn parser(self) -> Result<Box<dyn ReportParser>, DataError> {
        let cells = CellTable::new()?;
        Ok(match self {
            ReportKind::SingleSale => Box::new(SingleSaleParser { cells }),
            ReportKind::RightsOffering => Box::new(RightsOfferingParser { cells }),
            ReportKind::TreasuryStock => Box::new(TreasuryStockParser { cells }),
            ReportKind::ConvertibleBond => Box::new(ConvertibleBondParser { cells }),
        })
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Extracted values in a fixed column order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFields(Vec<(&'static str, String)>);

impl ReportFields {
    pub fn with_defaults(defaults: &[(&'static str, &str)]) -> Self {
        Self(defaults.iter().map(|&(k, v)| (k, v.to_string())).collect())
    }

    /// Overwrite `key`, appending it if it is not a known column.
    pub fn set(&mut self, key: &'static str, value: String) {
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.iter().map(|(k, _)| *k)
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(_, v)| v.as_str())
    }
}

/// Reads one kind of disclosure document.
pub trait ReportParser {
    fn kind(&self) -> ReportKind;

    /// Columns and their values when the document does not state them.
    fn defaults(&self) -> ReportFields;

    fn parse(&self, html: &str) -> ReportFields;
}

/// Cell texts of every table row in a document.
#[derive(Debug, Clone)]
struct CellTable {
    tr: Selector,
    td: Selector,
}

impl CellTable {
    fn new() -> Result<Self, DataError> {
        let parse = |s: &str| {
            Selector::parse(s)
                .map_err(|e| DataError::Other(format!("invalid selector '{s}': {e}")))
        };
        Ok(Self {
            tr: parse("tr")?,
            td: parse("td")?,
        })
    }

    fn rows(&self, html: &str) -> Vec<Vec<String>> {
        let document = Html::parse_document(html);
        let rows = document
            .select(&self.tr)
            .map(|tr| tr.select(&self.td).map(|td: ElementRef<'_>| text_of(td)).collect())
            .collect();
        rows
    }
}

/// Integer cell without thousands separators.
fn integer_cell(cell: &str) -> Option<String> {
    let digits = cell.replace(',', "");
    is_integer(&digits).then_some(digits)
}

/// A cell like `12.5` (digits once the dots are gone).
fn is_decimal_cell(cell: &str) -> bool {
    is_integer(&cell.replace('.', ""))
}

/// Labelled amounts: a label cell names the column, an integer cell in the
/// same row gives its value, and zero leaves the default.
fn label_value_rows(
    rows: &[Vec<String>],
    fields: &mut ReportFields,
    label: impl Fn(&str) -> Option<&'static str>,
    accept_amount: impl Fn(&[String]) -> bool,
) {
    for cells in rows {
        let mut key = None;
        let mut value = None;
        for cell in cells {
            if let Some(k) = label(cell.as_str()) {
                key = Some(k);
            } else if let Some(n) = integer_cell(cell) {
                value = (n != "0" && accept_amount(cells.as_slice())).then_some(n);
            }
        }
        if let (Some(k), Some(v)) = (key, value) {
            fields.set(k, v);
        }
    }
}

pub struct SingleSaleParser {
    cells: CellTable,
}

impl ReportParser for SingleSaleParser {
    fn kind(&self) -> ReportKind {
        ReportKind::SingleSale
    }

    fn defaults(&self) -> ReportFields {
        ReportFields::with_defaults(&[
            ("contract_amount", "0"),
            ("recent_sales", "0"),
            ("sales_ratio", "0.0"),
            ("large_corporation", ""),
        ])
    }

    fn parse(&self, html: &str) -> ReportFields {
        let mut fields = self.defaults();
        for cells in self.cells.rows(html) {
            let mut key = None;
            let mut value = None;
            for cell in &cells {
                if cell.contains("계약금액") {
                    key = Some("contract_amount");
                } else if cell.contains("최근") && cell.contains("매출액") {
                    key = Some("recent_sales");
                } else if cell.contains("매출액") && cell.contains("대비") {
                    key = Some("sales_ratio");
                } else if cell.contains("대규모법인") {
                    key = Some("large_corporation");
                } else if key == Some("large_corporation") {
                    value = Some(cell.clone());
                } else if let Some(n) = integer_cell(cell) {
                    value = (n != "0").then_some(n);
                } else if is_decimal_cell(cell) {
                    value = Some(cell.clone());
                }
            }
            if let (Some(k), Some(v)) = (key, value) {
                fields.set(k, v);
            }
        }
        fields
    }
}

/// Fund purpose labels shared by rights offerings and convertible bonds.
fn fund_label(cell: &str) -> Option<&'static str> {
    if cell.contains("시설자금") {
        Some("facility_fund")
    } else if cell.contains("운영자금") {
        Some("operating_fund")
    } else if cell.contains("취득자금") {
        Some("acquisition_fund")
    } else if cell.contains("기타자금") {
        Some("other_fund")
    } else {
        None
    }
}

const FUND_DEFAULTS: [(&str, &str); 4] = [
    ("facility_fund", "0"),
    ("operating_fund", "0"),
    ("acquisition_fund", "0"),
    ("other_fund", "0"),
];

pub struct RightsOfferingParser {
    cells: CellTable,
}

impl ReportParser for RightsOfferingParser {
    fn kind(&self) -> ReportKind {
        ReportKind::RightsOffering
    }

    fn defaults(&self) -> ReportFields {
        ReportFields::with_defaults(&FUND_DEFAULTS)
    }

    /// Fund rows are label + amount; wider rows belong to other tables.
    fn parse(&self, html: &str) -> ReportFields {
        let mut fields = self.defaults();
        label_value_rows(&self.cells.rows(html), &mut fields, fund_label, |cells| cells.len() <= 2);
        fields
    }
}

pub struct TreasuryStockParser {
    cells: CellTable,
}

impl ReportParser for TreasuryStockParser {
    fn kind(&self) -> ReportKind {
        ReportKind::TreasuryStock
    }

    fn defaults(&self) -> ReportFields {
        ReportFields::with_defaults(&[("planned_shares", "0"), ("planned_amount", "0")])
    }

    fn parse(&self, html: &str) -> ReportFields {
        let mut fields = self.defaults();
        let label = |cell: &str| {
            if cell.contains("취득예정주식") {
                Some("planned_shares")
            } else if cell.contains("취득예정금액") {
                Some("planned_amount")
            } else {
                None
            }
        };
        label_value_rows(&self.cells.rows(html), &mut fields, label, |_| true);
        fields
    }
}

pub struct ConvertibleBondParser {
    cells: CellTable,
}

/// Trailing-cell values longer than this are notes, not values.
const MAX_TERM_CHARS: usize = 20;

impl ReportParser for ConvertibleBondParser {
    fn kind(&self) -> ReportKind {
        ReportKind::ConvertibleBond
    }

    fn defaults(&self) -> ReportFields {
        let mut fields = ReportFields::with_defaults(&[("bond_amount", "0")]);
        for (k, v) in FUND_DEFAULTS {
            fields.set(k, v.to_string());
        }
        for (k, v) in [
            ("coupon_rate", "0.0"),
            ("maturity_rate", "0.0"),
            ("maturity_date", ""),
            ("issue_method", ""),
            ("share_ratio", "0.0"),
        ] {
            fields.set(k, v.to_string());
        }
        fields
    }

    fn parse(&self, html: &str) -> ReportFields {
        let mut fields = self.defaults();
        for cells in self.cells.rows(html) {
            let cells: Vec<String> = cells.into_iter().filter(|c| !c.is_empty()).collect();
            let has = |label: &str| cells.iter().any(|c| c.contains(label));
            let first_integer = || cells.iter().find_map(|c| integer_cell(c)).unwrap_or_default();

            let amount = if has("사채의 권면총액") {
                Some("bond_amount")
            } else {
                cells.iter().find_map(|c| fund_label(c))
            };
            if let Some(key) = amount {
                fields.set(key, first_integer());
                continue;
            }

            let term = [
                ("표면이자율", "coupon_rate"),
                ("만기이자율", "maturity_rate"),
                ("사채만기일", "maturity_date"),
                ("사채발행방법", "issue_method"),
                ("주식총수대비", "share_ratio"),
            ]
            .into_iter()
            .find(|&(label, _)| has(label));
            if let (Some((_, key)), Some(last)) = (term, cells.last()) {
                if last.chars().count() <= MAX_TERM_CHARS {
                    fields.set(key, last.clone());
                }
            }
        }
        fields
    }
}

/// One filing with its document's fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRecord {
    pub row: DisclosureRow,
    pub fields: ReportFields,
}

/// Fetches filings one after another with a politeness pause.
pub struct ReportReader<F: ReportFetch> {
    fetch: F,
    locator: DocumentLocator,
    delay: Duration,
    sleeper: Box<dyn Sleeper>,
    reads: usize,
}

impl<F: ReportFetch> ReportReader<F> {
    pub fn new(fetch: F) -> Result<Self, DataError> {
        Ok(Self {
            fetch,
            locator: DocumentLocator::new()?,
            delay: Duration::from_secs(2),
            sleeper: Box::new(ThreadSleeper),
            reads: 0,
        })
    }

    /// Pause before every filing after the first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Document fields behind the filing at `href`.
    ///
    /// `Ok(None)` when the portal refuses a page or the filing embeds no
    /// document. Transport failures are returned.
    pub fn read(&mut self, href: &str, parser: &dyn ReportParser) -> Result<Option<ReportFields>, DataError> {
        if self.reads > 0 {
            self.sleeper.sleep(self.delay);
        }
        self.reads += 1;

        let filing = match self.fetch.fetch_filing(href) {
            Ok(html) => html,
            Err(DataError::HttpStatus { status, url }) => {
                tracing::warn!(status, url = %url, "filing page refused");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let Some(doc) = self.locator.locate(&filing) else {
            tracing::warn!(href, "filing has no document reference");
            return Ok(None);
        };
        let document = match self.fetch.fetch_document(&doc) {
            Ok(html) => html,
            Err(DataError::HttpStatus { status, url }) => {
                tracing::warn!(status, url = %url, rcp_no = %doc.rcp_no, "document refused");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let fields = parser.parse(&document);
        tracing::debug!(kind = %parser.kind(), rcp_no = %doc.rcp_no, "document read");
        Ok(Some(fields))
    }
}

/// Write records as a tab-delimited table: disclosure columns, then the
/// kind's field columns. The header is written even with no records.
pub fn format_report_table<W: Write>(
    writer: W,
    parser: &dyn ReportParser,
    records: &[ReportRecord],
) -> Result<(), DataError> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(writer);
    let header: Vec<&str> = DisclosureRow::HEADER
        .iter()
        .copied()
        .chain(parser.defaults().names())
        .collect();
    wtr.write_record(&header)
        .map_err(|e| DataError::Other(format!("report header: {e}")))?;
    for record in records {
        let mut line: Vec<String> = row_fields(&record.row).into();
        line.extend(record.fields.values().map(clean_field));
        wtr.write_record(&line)
            .map_err(|e| DataError::Other(format!("report row: {e}")))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write a report table to `path`, creating parent directories.
pub fn write_report_table(
    path: &Path,
    parser: &dyn ReportParser,
    records: &[ReportRecord],
) -> Result<(), DataError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)?;
    format_report_table(std::io::BufWriter::new(file), parser, records)
}
