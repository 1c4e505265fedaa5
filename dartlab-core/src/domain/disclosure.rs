//! Disclosure events scraped from the DART filing list.

use super::pivot::pivot_date;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// A regulatory filing tied to a company and a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosureEvent {
    pub title: String,
    pub href: String,
    pub company: String,
    pub company_id: String,
    pub disclosed_at: NaiveDateTime,
}

impl DisclosureEvent {
    /// `YYYYMMDD` pivot of the filing day.
    pub fn pivot(&self) -> u32 {
        pivot_date(self.disclosed_at.date())
    }

    pub fn to_row(&self) -> DisclosureRow {
        DisclosureRow {
            title: self.title.clone(),
            href: self.href.clone(),
            company: self.company.clone(),
            company_id: self.company_id.clone(),
            year: self.disclosed_at.year(),
            month: self.disclosed_at.month(),
            day: self.disclosed_at.day(),
            hour: self.disclosed_at.hour(),
            minute: self.disclosed_at.minute(),
        }
    }
}

/// Flat, tab-delimited storage form of a [`DisclosureEvent`].
///
/// Column order is the file header:
/// `title, href, company, company_id, year, month, day, hour, minute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosureRow {
    pub title: String,
    pub href: String,
    pub company: String,
    pub company_id: String,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    /// Older listing files spell this column `hout`.
    #[serde(alias = "hout")]
    pub hour: u32,
    pub minute: u32,
}

impl DisclosureRow {
    /// Column names in file order.
    pub const HEADER: [&'static str; 9] = [
        "title",
        "href",
        "company",
        "company_id",
        "year",
        "month",
        "day",
        "hour",
        "minute",
    ];

    /// Rebuild the event. `None` when the date/time fields are out of range.
    pub fn to_event(&self) -> Option<DisclosureEvent> {
        let disclosed_at = NaiveDate::from_ymd_opt(self.year, self.month, self.day)?
            .and_hms_opt(self.hour, self.minute, 0)?;
        Some(DisclosureEvent {
            title: self.title.clone(),
            href: self.href.clone(),
            company: self.company.clone(),
            company_id: self.company_id.clone(),
            disclosed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> DisclosureEvent {
        DisclosureEvent {
            title: "단일판매ㆍ공급계약체결".into(),
            href: "/dsaf001/main.do?rcpNo=20190301000123".into(),
            company: "삼성전자".into(),
            company_id: "00126380".into(),
            disclosed_at: NaiveDate::from_ymd_opt(2019, 3, 1)
                .unwrap()
                .and_hms_opt(10, 32, 0)
                .unwrap(),
        }
    }

    #[test]
    fn row_roundtrip_preserves_event() {
        let event = sample_event();
        let row = event.to_row();
        assert_eq!(row.hour, 10);
        assert_eq!(row.minute, 32);
        assert_eq!(row.to_event(), Some(event));
    }

    #[test]
    fn invalid_row_has_no_event() {
        let mut row = sample_event().to_row();
        row.month = 13;
        assert!(row.to_event().is_none());
    }

    #[test]
    fn pivot_is_filing_day() {
        assert_eq!(sample_event().pivot(), 20190301);
    }
}
