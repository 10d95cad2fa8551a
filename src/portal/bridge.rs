//! Cookie-bridged HTTP access to the portal.
//!
//! Full browser automation is expensive and raises the bot-detection
//! profile, so the engine authenticates once through the browser, lifts
//! the cookie set out, and does all polling and the final submission
//! through a plain HTTP client wearing those cookies. Every request
//! carries the Referer of the page that would logically have produced
//! it and the browser's own user-agent string. Re-authenticating
//! invalidates the bridge; cookies must be re-extracted.

use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, COOKIE, REFERER, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::webdriver::{BrowserCookie, BrowserSession};
use super::PortalError;

const ACCEPT_JSON: &str = "application/json, text/javascript, */*; q=0.01";
const REQUESTED_WITH: &str = "XMLHttpRequest";

/// Cookies extracted from an authenticated browser session
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: Vec<BrowserCookie>,
}

impl CookieJar {
    pub fn new(cookies: Vec<BrowserCookie>) -> Self {
        Self { cookies }
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Render the jar as a single `Cookie` header value
    pub fn header_value(&self) -> String {
        self.cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Lightweight HTTP session wearing the browser's cookies
pub struct PortalHttp {
    http: Client,
    headers: HeaderMap,
}

impl PortalHttp {
    /// Build a bridge from a logged-in browser session. `referer` should
    /// be the page the bridged requests would naturally originate from.
    pub async fn from_browser(
        browser: &BrowserSession,
        referer: &str,
    ) -> Result<Self, PortalError> {
        let jar = CookieJar::new(browser.cookies().await?);
        let user_agent = browser.user_agent().await?;
        Ok(Self::new(&jar, &user_agent, referer))
    }

    pub fn new(jar: &CookieJar, user_agent: &str, referer: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_JSON));
        insert_header(&mut headers, "X-Requested-With", REQUESTED_WITH);
        if let Ok(value) = HeaderValue::from_str(referer) {
            headers.insert(REFERER, value);
        }
        if let Ok(value) = HeaderValue::from_str(user_agent) {
            headers.insert(USER_AGENT, value);
        }
        if let Ok(value) = HeaderValue::from_str(&jar.header_value()) {
            headers.insert(COOKIE, value);
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();

        Self { http, headers }
    }

    async fn get_json(&self, url: &str) -> Result<Value, PortalError> {
        let response = self
            .http
            .get(url)
            .headers(self.headers.clone())
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        debug!("GET {} -> {} ({} bytes)", url, status, text.len());

        serde_json::from_str(&text).map_err(|_| {
            PortalError::UnexpectedResponse(format!(
                "non-JSON response ({}): {}",
                status,
                truncate(&text, 200)
            ))
        })
    }

    /// Available appointment dates for a facility, earliest first as the
    /// portal reports them
    pub async fn available_dates(&self, days_url: &str) -> Result<Vec<NaiveDate>, PortalError> {
        let payload = self.get_json(days_url).await?;
        Ok(parse_available_dates(&payload))
    }

    /// Available time slots for a chosen date
    pub async fn available_times(&self, times_url: &str) -> Result<Vec<String>, PortalError> {
        let payload = self.get_json(times_url).await?;
        Ok(parse_available_times(&payload))
    }

    /// POST a form through the bridge, returning status and body for the
    /// caller to interpret
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
        csrf_token: &str,
    ) -> Result<(StatusCode, String), PortalError> {
        let mut headers = self.headers.clone();
        insert_header(&mut headers, "X-CSRF-Token", csrf_token);

        let response = self
            .http
            .post(url)
            .headers(headers)
            .form(form)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        debug!("POST {} -> {} ({} bytes)", url, status, body.len());
        Ok((status, body))
    }
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Pull the date list out of a days payload. A missing or misshapen key
/// yields an empty list, never an error; individual bad entries are
/// skipped. The portal has served the list under both `available_dates`
/// and `dates`.
pub fn parse_available_dates(payload: &Value) -> Vec<NaiveDate> {
    let entries = payload["available_dates"]
        .as_array()
        .or_else(|| payload["dates"].as_array());

    let Some(entries) = entries else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| entry["date"].as_str())
        .filter_map(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
        .collect()
}

/// Pull the time-slot list out of a times payload; same defensive rules
/// as the dates
pub fn parse_available_times(payload: &Value) -> Vec<String> {
    let Some(entries) = payload["available_times"].as_array() else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| entry.as_str())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cookie(name: &str, value: &str, domain: &str) -> BrowserCookie {
        BrowserCookie {
            name: name.to_string(),
            value: value.to_string(),
            domain: Some(domain.to_string()),
            path: None,
        }
    }

    #[test]
    fn jar_renders_single_cookie() {
        let jar = CookieJar::new(vec![cookie("sid", "abc", "x")]);
        assert_eq!(jar.header_value(), "sid=abc");
    }

    #[test]
    fn jar_renders_multiple_cookies() {
        let jar = CookieJar::new(vec![cookie("sid", "abc", "x"), cookie("tok", "42", "x")]);
        assert_eq!(jar.header_value(), "sid=abc; tok=42");
    }

    #[test]
    fn parses_available_dates() {
        let payload = json!({
            "available_dates": [
                { "date": "2024-03-05", "business_day": true },
                { "date": "2024-03-06" }
            ]
        });
        assert_eq!(
            parse_available_dates(&payload),
            vec![
                NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 6).unwrap(),
            ]
        );
    }

    #[test]
    fn falls_back_to_legacy_dates_key() {
        let payload = json!({ "dates": [{ "date": "2024-04-01" }] });
        assert_eq!(
            parse_available_dates(&payload),
            vec![NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()]
        );
    }

    #[test]
    fn missing_keys_yield_empty_lists() {
        assert!(parse_available_dates(&json!({})).is_empty());
        assert!(parse_available_dates(&json!({ "available_dates": "oops" })).is_empty());
        assert!(parse_available_times(&json!({})).is_empty());
        assert!(parse_available_times(&json!(null)).is_empty());
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let payload = json!({
            "available_dates": [
                { "date": "not-a-date" },
                { "nope": true },
                { "date": "2024-03-07" }
            ]
        });
        assert_eq!(
            parse_available_dates(&payload),
            vec![NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()]
        );
    }

    #[test]
    fn parses_available_times() {
        let payload = json!({ "available_times": ["09:00", "14:00", 7] });
        assert_eq!(parse_available_times(&payload), vec!["09:00", "14:00"]);
    }
}
