//! Tab-delimited disclosure files.
//!
//! One row per filing, header `title, href, company, company_id, year,
//! month, day, hour, minute`. Reading is lenient: a row that does not parse
//! or names an impossible date is logged and skipped.

use super::provider::DataError;
use crate::domain::{DisclosureEvent, DisclosureRow};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

/// Rows read from one file plus the number of rows skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisclosureFile {
    pub rows: Vec<DisclosureRow>,
    pub skipped: usize,
}

/// Parse disclosure rows from any reader.
pub fn parse_disclosures<R: Read>(reader: R) -> Result<DisclosureFile, DataError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .quoting(false)
        .from_reader(reader);

    let mut file = DisclosureFile::default();
    for (line, record) in rdr.deserialize::<DisclosureRow>().enumerate() {
        match record {
            Ok(row) if row.to_event().is_some() => file.rows.push(row),
            Ok(row) => {
                tracing::warn!(line = line + 2, title = %row.title, "disclosure row has an impossible date, skipped");
                file.skipped += 1;
            }
            Err(e) => {
                tracing::warn!(line = line + 2, error = %e, "malformed disclosure row, skipped");
                file.skipped += 1;
            }
        }
    }
    Ok(file)
}

/// Read a disclosure file from disk.
pub fn read_disclosures(path: &Path) -> Result<DisclosureFile, DataError> {
    let file = fs::File::open(path)?;
    let parsed = parse_disclosures(file)?;
    tracing::debug!(
        path = %path.display(),
        rows = parsed.rows.len(),
        skipped = parsed.skipped,
        "disclosures loaded"
    );
    Ok(parsed)
}

/// Serialize events as a disclosure file, header first.
///
/// Tabs and line breaks inside titles are stripped so every event stays on
/// one row.
pub fn format_disclosures<W: Write>(writer: W, events: &[DisclosureEvent]) -> Result<(), DataError> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(writer);
    wtr.write_record(DisclosureRow::HEADER)
        .map_err(|e| DataError::Other(format!("disclosure header: {e}")))?;
    for event in events {
        wtr.write_record(row_fields(&event.to_row()))
            .map_err(|e| DataError::Other(format!("disclosure row: {e}")))?;
    }
    wtr.flush()?;
    Ok(())
}

/// One row's cells in [`DisclosureRow::HEADER`] order, cleaned for a
/// tab-delimited line.
pub(crate) fn row_fields(row: &DisclosureRow) -> [String; 9] {
    [
        clean_field(&row.title),
        clean_field(&row.href),
        clean_field(&row.company),
        row.company_id.clone(),
        row.year.to_string(),
        row.month.to_string(),
        row.day.to_string(),
        row.hour.to_string(),
        row.minute.to_string(),
    ]
}

/// Write events to `path`, creating parent directories.
pub fn write_disclosures(path: &Path, events: &[DisclosureEvent]) -> Result<(), DataError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)?;
    format_disclosures(std::io::BufWriter::new(file), events)
}

pub(crate) fn clean_field(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '\t' | '\r' | '\n'))
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn event(title: &str, h: u32, m: u32) -> DisclosureEvent {
        DisclosureEvent {
            title: title.into(),
            href: "/dsaf001/main.do?rcpNo=20190301000123".into(),
            company: "삼성전자".into(),
            company_id: "00126380".into(),
            disclosed_at: NaiveDate::from_ymd_opt(2019, 3, 1)
                .unwrap()
                .and_hms_opt(h, m, 0)
                .unwrap(),
        }
    }

    #[test]
    fn write_then_parse() {
        let mut buf = Vec::new();
        format_disclosures(&mut buf, &[event("단일판매ㆍ공급계약체결", 10, 32)]).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with("title\thref\tcompany\tcompany_id\tyear"));

        let parsed = parse_disclosures(buf.as_slice()).unwrap();
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].hour, 10);
        assert_eq!(parsed.rows[0].to_event().unwrap(), event("단일판매ㆍ공급계약체결", 10, 32));
    }

    #[test]
    fn titles_lose_embedded_tabs() {
        let mut buf = Vec::new();
        format_disclosures(&mut buf, &[event("a\tb\r\nc", 9, 0)]).unwrap();
        let parsed = parse_disclosures(buf.as_slice()).unwrap();
        assert_eq!(parsed.rows[0].title, "abc");
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let text = "title\thref\tcompany\tcompany_id\tyear\tmonth\tday\thour\tminute\n\
                    ok\t/x\tA\t001\t2019\t3\t1\t10\t5\n\
                    short\t/y\n\
                    bad\t/z\tB\t002\t2019\tthree\t1\t10\t5\n\
                    nodate\t/w\tC\t003\t2019\t2\t30\t10\t5\n";
        let parsed = parse_disclosures(text.as_bytes()).unwrap();
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].title, "ok");
        assert_eq!(parsed.skipped, 3);
    }

    #[test]
    fn legacy_hour_header_is_accepted() {
        let text = "title\thref\tcompany\tcompany_id\tyear\tmonth\tday\thout\tminute\n\
                    t\t/x\tA\t001\t2019\t3\t1\t14\t59\n";
        let parsed = parse_disclosures(text.as_bytes()).unwrap();
        assert_eq!(parsed.rows[0].hour, 14);
    }
}
