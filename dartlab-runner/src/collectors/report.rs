//! Disclosure documents → one TSV per report kind.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::NaiveDateTime;
use dartlab_core::dart::{
    write_report_table, ReportFetch, ReportKind, ReportParser, ReportReader, ReportRecord,
};
use dartlab_core::data::read_disclosures;
use dartlab_core::domain::DisclosureRow;
use dartlab_core::matcher::{Eligibility, TradingHours};

use crate::config::ReportsConfig;
use crate::runner::RunError;

/// Result for one report kind.
#[derive(Debug)]
pub struct ReportRun {
    pub kind: ReportKind,
    pub records: Vec<ReportRecord>,
    pub title_mismatch: usize,
    pub outside_hours: usize,
    pub too_old: usize,
    /// Filings whose page or document could not be read.
    pub unreadable: usize,
    pub output: PathBuf,
}

/// Read the configured listing under `root` and write `{kind}.tsv` there
/// for every configured kind.
pub fn collect_reports<F: ReportFetch>(
    reader: &mut ReportReader<F>,
    config: &ReportsConfig,
    hours: &TradingHours,
    now: NaiveDateTime,
    root: &Path,
) -> Result<Vec<ReportRun>, RunError> {
    let input = root.join(&config.input);
    let listing = read_disclosures(&input)?;
    tracing::info!(
        path = %input.display(),
        filings = listing.rows.len(),
        skipped = listing.skipped,
        kinds = config.kinds.len(),
        "report pass started"
    );

    let mut runs = Vec::with_capacity(config.kinds.len());
    for &kind in &config.kinds {
        let parser = kind.parser()?;
        let output = root.join(format!("{kind}.tsv"));
        runs.push(collect_kind(reader, parser.as_ref(), &listing.rows, hours, now, output)?);
    }
    Ok(runs)
}

fn collect_kind<F: ReportFetch>(
    reader: &mut ReportReader<F>,
    parser: &dyn ReportParser,
    rows: &[DisclosureRow],
    hours: &TradingHours,
    now: NaiveDateTime,
    output: PathBuf,
) -> Result<ReportRun, RunError> {
    let started = Instant::now();
    let kind = parser.kind();
    let mut run = ReportRun {
        kind,
        records: Vec::new(),
        title_mismatch: 0,
        outside_hours: 0,
        too_old: 0,
        unreadable: 0,
        output,
    };

    for row in rows {
        if !kind.matches_title(&row.title) {
            run.title_mismatch += 1;
            continue;
        }
        let Some(event) = row.to_event() else {
            run.unreadable += 1;
            continue;
        };
        match hours.classify(event.disclosed_at, now) {
            Eligibility::Eligible => {}
            Eligibility::OutsideHours => {
                run.outside_hours += 1;
                continue;
            }
            Eligibility::TooOld => {
                run.too_old += 1;
                continue;
            }
        }

        match reader.read(&row.href, parser)? {
            Some(fields) => run.records.push(ReportRecord {
                row: row.clone(),
                fields,
            }),
            None => run.unreadable += 1,
        }
    }

    write_report_table(&run.output, parser, &run.records)?;
    tracing::info!(
        kind = %kind,
        records = run.records.len(),
        outside_hours = run.outside_hours,
        too_old = run.too_old,
        unreadable = run.unreadable,
        elapsed_ms = started.elapsed().as_millis() as u64,
        path = %run.output.display(),
        "report table written"
    );
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use dartlab_core::dart::DocumentRef;
    use dartlab_core::data::{write_disclosures, DataError, Sleeper};
    use dartlab_core::domain::DisclosureEvent;
    use std::time::Duration;

    struct NoSleep;
    impl Sleeper for NoSleep {
        fn sleep(&self, _: Duration) {}
    }

    /// Every filing embeds a document numbered after its receipt number;
    /// receipt numbers ending in 9 have no document.
    struct Viewer;

    impl ReportFetch for Viewer {
        fn fetch_filing(&mut self, href: &str) -> Result<String, DataError> {
            let rcp_no = href.rsplit('=').next().unwrap_or_default();
            Ok(format!(
                "<script>viewDoc('{rcp_no}', '1', null, null, null, 'dart3.xsd');</script>"
            ))
        }

        fn fetch_document(&mut self, doc: &DocumentRef) -> Result<String, DataError> {
            if doc.rcp_no.ends_with('9') {
                return Err(DataError::HttpStatus {
                    status: 404,
                    url: doc.rcp_no.clone(),
                });
            }
            let shares = &doc.rcp_no[doc.rcp_no.len() - 3..];
            Ok(format!(
                "<table><tr><td>취득예정주식(주)</td><td>{shares}</td></tr>\
                 <tr><td>취득예정금액(원)</td><td>5,000,000</td></tr></table>"
            ))
        }
    }

    fn event(rcp_no: &str, title: &str, day: u32, hour: u32) -> DisclosureEvent {
        DisclosureEvent {
            title: title.into(),
            href: format!("/dsaf001/main.do?rcpNo={rcp_no}"),
            company: "company".into(),
            company_id: "00126380".into(),
            disclosed_at: NaiveDate::from_ymd_opt(2019, 3, day)
                .unwrap()
                .and_hms_opt(hour, 15, 0)
                .unwrap(),
        }
    }

    #[test]
    fn writes_one_table_per_kind() {
        let dir = tempfile::tempdir().unwrap();
        write_disclosures(
            &dir.path().join("dart_list.tsv"),
            &[
                event("20190304000120", "주요사항보고서(자기주식취득결정)", 4, 10),
                event("20190304000130", "주요사항보고서(자기주식취득결정)", 4, 17),
                event("20190305000139", "주요사항보고서(자기주식취득결정)", 5, 11),
                event("20190305000140", "단일판매ㆍ공급계약체결", 5, 11),
            ],
        )
        .unwrap();
        let config = ReportsConfig {
            kinds: vec![ReportKind::TreasuryStock, ReportKind::ConvertibleBond],
            ..ReportsConfig::default()
        };
        let now = NaiveDate::from_ymd_opt(2019, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut reader = ReportReader::new(Viewer)
            .unwrap()
            .with_sleeper(Box::new(NoSleep));

        let runs =
            collect_reports(&mut reader, &config, &TradingHours::default(), now, dir.path()).unwrap();

        let treasury = &runs[0];
        assert_eq!(treasury.kind, ReportKind::TreasuryStock);
        assert_eq!(treasury.records.len(), 1);
        assert_eq!(treasury.records[0].fields.get("planned_shares"), Some("120"));
        assert_eq!(treasury.records[0].fields.get("planned_amount"), Some("5000000"));
        assert_eq!(treasury.title_mismatch, 1);
        assert_eq!(treasury.outside_hours, 1);
        assert_eq!(treasury.unreadable, 1);

        let table = std::fs::read_to_string(dir.path().join("treasury_stock.tsv")).unwrap();
        assert_eq!(table.lines().count(), 2);
        assert!(table.lines().nth(1).unwrap().ends_with("\t120\t5000000"));

        // No convertible bond filings: header only.
        assert!(runs[1].records.is_empty());
        assert_eq!(runs[1].title_mismatch, 4);
        let cb = std::fs::read_to_string(dir.path().join("convertible_bond.tsv")).unwrap();
        assert_eq!(cb.lines().count(), 1);
    }

    #[test]
    fn missing_listing_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut reader = ReportReader::new(Viewer).unwrap();
        let now = NaiveDate::from_ymd_opt(2019, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let result = collect_reports(
            &mut reader,
            &ReportsConfig::default(),
            &TradingHours::default(),
            now,
            dir.path(),
        );
        assert!(matches!(result, Err(RunError::Data(_))));
    }
}
