//! Company id → stock code lookup against the portal's company API.

use crate::data::code_cache::CodeLookup;
use crate::data::paginator::{Sleeper, ThreadSleeper};
use crate::data::provider::DataError;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct CompanyResponse {
    #[serde(default)]
    err_code: Option<String>,
    #[serde(default)]
    err_msg: Option<String>,
    #[serde(default)]
    stock_cd: Option<String>,
}

/// Blocking client for `{root}/api/company.json`.
///
/// Every call, successful or not, is followed by a politeness pause.
pub struct DartCompanyLookup {
    client: reqwest::blocking::Client,
    root: String,
    api_key: String,
    delay: Duration,
    sleeper: Box<dyn Sleeper>,
}

impl DartCompanyLookup {
    pub fn new(root: &str, api_key: &str) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            root: root.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            delay: Duration::from_secs(2),
            sleeper: Box::new(ThreadSleeper),
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Resolve `company_id`. `Ok(None)` when the company has no listed stock.
    pub fn resolve(&self, company_id: &str) -> Result<Option<String>, DataError> {
        let url = format!("{}/api/company.json", self.root);
        let resp = self
            .client
            .get(&url)
            .query(&[("auth", self.api_key.as_str()), ("crp_cd", company_id)])
            .send()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DataError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }
        let body: CompanyResponse = resp
            .json()
            .map_err(|e| DataError::ResponseFormatChanged(format!("company response: {e}")))?;
        Ok(parse_stock_code(body))
    }
}

fn parse_stock_code(body: CompanyResponse) -> Option<String> {
    if let Some(code) = body.err_code.as_deref().filter(|c| *c != "000") {
        tracing::debug!(err_code = code, err_msg = body.err_msg.as_deref().unwrap_or(""), "company lookup refused");
        return None;
    }
    body.stock_cd
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

impl CodeLookup for DartCompanyLookup {
    fn lookup(&mut self, company_id: &str) -> Option<String> {
        let result = self.resolve(company_id);
        self.sleeper.sleep(self.delay);
        match result {
            Ok(code) => code,
            Err(e) => {
                tracing::warn!(company_id, error = %e, "company lookup failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: &str) -> CompanyResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn listed_company_has_code() {
        let b = body(r#"{"err_code":"000","err_msg":"정상","crp_nm":"삼성전자","stock_cd":"005930"}"#);
        assert_eq!(parse_stock_code(b), Some("005930".into()));
    }

    #[test]
    fn unlisted_company_has_none() {
        assert_eq!(parse_stock_code(body(r#"{"err_code":"000","stock_cd":" "}"#)), None);
        assert_eq!(parse_stock_code(body(r#"{"err_code":"000"}"#)), None);
    }

    #[test]
    fn api_error_is_none() {
        let b = body(r#"{"err_code":"010","err_msg":"미등록 인증키","stock_cd":"005930"}"#);
        assert_eq!(parse_stock_code(b), None);
    }
}
