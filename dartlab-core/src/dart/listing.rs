//! DART daily filing list: fetch, parse, walk.
//!
//! The portal lists each business day's filings in pages of up to
//! `maxResults` rows. A day is paged until the portal answers with a page
//! that has no table rows, a "no data" marker, or a non-success status.
//! Days are walked newest to oldest; weekends are skipped.

use crate::data::paginator::{Sleeper, ThreadSleeper};
use crate::data::provider::DataError;
use crate::domain::DisclosureEvent;
use chrono::{Datelike, Duration as Days, NaiveDate, Weekday};
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;

/// Portal root used when none is configured.
pub const DART_ROOT: &str = "http://dart.fss.or.kr";

/// Rows requested per listing page.
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// Fetches one listing page as HTML.
pub trait ListingFetch {
    /// A non-success HTTP status is reported as [`DataError::HttpStatus`].
    fn fetch_page(&mut self, date: NaiveDate, page: u32, page_size: u32) -> Result<String, DataError>;
}

/// Blocking HTTP client for the portal's daily list.
pub struct DartPortal {
    client: reqwest::blocking::Client,
    root: String,
}

impl DartPortal {
    pub fn new(root: &str) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            root: root.trim_end_matches('/').to_string(),
        })
    }

    /// Portal URL for an absolute path such as `/dsac001/mainAll.do`.
    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.root)
    }

    /// GET `url` and return the body. `what` names the page in logs and
    /// errors.
    pub(crate) fn get_text(
        &self,
        url: &str,
        query: &[(&str, String)],
        what: &str,
    ) -> Result<String, DataError> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();
        tracing::debug!(url = %resp.url(), status = status.as_u16(), what, "portal page");
        if !status.is_success() {
            return Err(DataError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        resp.text()
            .map_err(|e| DataError::ResponseFormatChanged(format!("{what} body: {e}")))
    }
}

impl ListingFetch for DartPortal {
    fn fetch_page(&mut self, date: NaiveDate, page: u32, page_size: u32) -> Result<String, DataError> {
        let query = [
            ("selectDate", date.format("%Y%m%d").to_string()),
            ("maxResults", page_size.to_string()),
            ("currentPage", page.to_string()),
        ];
        self.get_text(&self.url("/dsac001/mainAll.do"), &query, "listing")
    }
}

/// One parsed listing page.
#[derive(Debug, Clone, PartialEq)]
pub enum ListingPage {
    Rows {
        events: Vec<DisclosureEvent>,
        /// Table rows that could not be read.
        skipped: usize,
    },
    /// The table carries the portal's "no data" marker.
    NoData,
    /// Not a listing table at all.
    Invalid,
}

/// Turns listing HTML into events.
pub trait ListingParser {
    fn parse(&self, html: &str) -> ListingPage;
}

/// Table parser for the portal's daily list markup.
///
/// Columns: time `HH:MM`, company link (id after the last `=`), report link
/// and title, submitter, date `YYYY.MM.DD`.
#[derive(Debug, Clone)]
pub struct HtmlListingParser {
    tr: Selector,
    td: Selector,
    a: Selector,
    no_data: Selector,
}

impl HtmlListingParser {
    pub fn new() -> Result<Self, DataError> {
        let parse = |s: &str| {
            Selector::parse(s)
                .map_err(|e| DataError::Other(format!("invalid selector '{s}': {e}")))
        };
        Ok(Self {
            tr: parse("tr")?,
            td: parse("td")?,
            a: parse("a")?,
            no_data: parse("td.no_data")?,
        })
    }

    fn parse_row(&self, tr: ElementRef<'_>) -> Option<DisclosureEvent> {
        let tds: Vec<ElementRef<'_>> = tr.select(&self.td).collect();

        let time = text_of(*tds.first()?);
        let (hour, minute) = time.split_once(':')?;
        let (hour, minute): (u32, u32) = (hour.trim().parse().ok()?, minute.trim().parse().ok()?);

        let company = tds.get(1)?.select(&self.a).next()?;
        let company_id = company.value().attr("href")?.rsplit('=').next()?.trim().to_string();

        let report = tds.get(2)?.select(&self.a).next()?;
        let href = report.value().attr("href")?.trim().to_string();

        let date = text_of(*tds.get(4)?);
        let mut parts = date.split('.').map(|p| p.trim().parse::<u32>());
        let (year, month, day) = (parts.next()?.ok()?, parts.next()?.ok()?, parts.next()?.ok()?);

        let disclosed_at = NaiveDate::from_ymd_opt(year as i32, month, day)?.and_hms_opt(hour, minute, 0)?;
        Some(DisclosureEvent {
            title: text_of(report),
            href,
            company: text_of(company),
            company_id,
            disclosed_at,
        })
    }
}

impl ListingParser for HtmlListingParser {
    fn parse(&self, html: &str) -> ListingPage {
        let document = Html::parse_document(html);
        let trs: Vec<ElementRef<'_>> = document.select(&self.tr).collect();
        if trs.len() < 2 {
            return ListingPage::Invalid;
        }
        if trs[1].select(&self.no_data).next().is_some() {
            return ListingPage::NoData;
        }

        let mut events = Vec::with_capacity(trs.len() - 1);
        let mut skipped = 0;
        for tr in &trs[1..] {
            match self.parse_row(*tr) {
                Some(event) => events.push(event),
                None => {
                    tracing::debug!(row = %text_of(*tr), "unreadable listing row");
                    skipped += 1;
                }
            }
        }
        ListingPage::Rows { events, skipped }
    }
}

/// Element text with all whitespace runs collapsed to one space.
pub(crate) fn text_of(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Result of a listing walk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingOutcome {
    pub events: Vec<DisclosureEvent>,
    pub days: usize,
    pub pages: usize,
    pub skipped_rows: usize,
}

/// Walks the daily list over a date range.
pub struct ListingWalker<F: ListingFetch, P: ListingParser> {
    fetch: F,
    parser: P,
    page_size: u32,
    delay: Duration,
    sleeper: Box<dyn Sleeper>,
}

impl<F: ListingFetch, P: ListingParser> ListingWalker<F, P> {
    pub fn new(fetch: F, parser: P) -> Self {
        Self {
            fetch,
            parser,
            page_size: DEFAULT_PAGE_SIZE,
            delay: Duration::from_secs(3),
            sleeper: Box::new(ThreadSleeper),
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Pause between consecutive page requests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Collect every filing from `from` back to `from - days`, inclusive,
    /// newest day first. Weekend days are not requested.
    ///
    /// A non-success status ends the current day only. Transport failures
    /// abort the walk.
    pub fn walk(&mut self, from: NaiveDate, days: i64) -> Result<ListingOutcome, DataError> {
        let until = from - Days::days(days.max(0));
        let mut outcome = ListingOutcome::default();
        let mut requests = 0usize;

        let mut date = from;
        while date >= until {
            if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                date -= Days::days(1);
                continue;
            }
            tracing::info!(date = %date.format("%Y.%m.%d"), "listing day");
            outcome.days += 1;
            let before = outcome.events.len();

            let mut page = 1;
            loop {
                if requests > 0 {
                    self.sleeper.sleep(self.delay);
                }
                requests += 1;

                let html = match self.fetch.fetch_page(date, page, self.page_size) {
                    Ok(html) => html,
                    Err(DataError::HttpStatus { status, url }) => {
                        tracing::warn!(status, url = %url, "listing page refused, moving to previous day");
                        break;
                    }
                    Err(e) => return Err(e),
                };
                outcome.pages += 1;

                match self.parser.parse(&html) {
                    ListingPage::Rows { events, skipped } => {
                        outcome.events.extend(events);
                        outcome.skipped_rows += skipped;
                        page += 1;
                    }
                    ListingPage::NoData => {
                        tracing::debug!(page, "no more rows");
                        break;
                    }
                    ListingPage::Invalid => {
                        tracing::info!(page, "listing table missing, moving to previous day");
                        break;
                    }
                }
            }
            tracing::debug!(date = %date, filings = outcome.events.len() - before, "listing day done");
            date -= Days::days(1);
        }

        tracing::info!(
            filings = outcome.events.len(),
            days = outcome.days,
            pages = outcome.pages,
            skipped = outcome.skipped_rows,
            "listing walk finished"
        );
        Ok(outcome)
    }
}
