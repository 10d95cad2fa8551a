//! Builds and submits the reschedule claim form.

use chrono::NaiveDate;
use reqwest::StatusCode;
use tracing::{info, warn};

use super::bridge::PortalHttp;
use super::webdriver::BrowserSession;
use super::PortalError;

/// The portal's unambiguous success phrase
const SUCCESS_PHRASE: &str = "Successfully Scheduled";

/// Substrings that mark a 200 response as a rejection
const ERROR_MARKERS: &[&str] = &[
    "could not be scheduled",
    "error occurred",
    "you cannot schedule",
    "class=\"error\"",
];

/// Hidden form fields scraped from the authenticated appointment page
#[derive(Debug, Clone)]
pub struct RescheduleForm {
    pub utf8: String,
    pub authenticity_token: String,
    pub confirmed_limit_message: String,
    pub use_consulate_appointment_capacity: String,
    pub csrf_token: String,
}

impl RescheduleForm {
    /// Scrape the hidden fields and CSRF token from the page currently
    /// loaded in the browser. Falls back to the authenticity token when
    /// the page carries no dedicated CSRF meta tag.
    pub async fn scrape(browser: &BrowserSession) -> Result<Self, PortalError> {
        let utf8 = hidden_value(browser, "utf8").await?;
        let authenticity_token = hidden_value(browser, "authenticity_token").await?;
        let confirmed_limit_message = hidden_value(browser, "confirmed_limit_message").await?;
        let use_consulate_appointment_capacity =
            hidden_value(browser, "use_consulate_appointment_capacity").await?;

        let csrf_token = match browser.try_find("meta[name=\"csrf-token\"]").await? {
            Some(meta) => meta
                .attribute("content")
                .await?
                .unwrap_or_else(|| authenticity_token.clone()),
            None => {
                warn!("No csrf-token meta tag, falling back to authenticity token");
                authenticity_token.clone()
            }
        };

        Ok(Self {
            utf8,
            authenticity_token,
            confirmed_limit_message,
            use_consulate_appointment_capacity,
            csrf_token,
        })
    }

    /// The full urlencoded field set for one claim
    pub fn fields(&self, facility_id: &str, date: NaiveDate, time: &str) -> Vec<(String, String)> {
        vec![
            ("utf8".to_string(), self.utf8.clone()),
            (
                "authenticity_token".to_string(),
                self.authenticity_token.clone(),
            ),
            (
                "confirmed_limit_message".to_string(),
                self.confirmed_limit_message.clone(),
            ),
            (
                "use_consulate_appointment_capacity".to_string(),
                self.use_consulate_appointment_capacity.clone(),
            ),
            (
                "appointments[consulate_appointment][facility_id]".to_string(),
                facility_id.to_string(),
            ),
            (
                "appointments[consulate_appointment][date]".to_string(),
                date.format("%Y-%m-%d").to_string(),
            ),
            (
                "appointments[consulate_appointment][time]".to_string(),
                time.to_string(),
            ),
        ]
    }
}

async fn hidden_value(browser: &BrowserSession, name: &str) -> Result<String, PortalError> {
    let Some(element) = browser.try_find(&format!("[name='{}']", name)).await? else {
        warn!("Hidden field '{}' not present on the appointment page", name);
        return Ok(String::new());
    };
    Ok(element.attribute("value").await?.unwrap_or_default())
}

/// POST the claim through the bridged session and interpret the outcome
pub async fn submit(
    http: &PortalHttp,
    appointment_url: &str,
    form: &RescheduleForm,
    facility_id: &str,
    date: NaiveDate,
    time: &str,
) -> Result<bool, PortalError> {
    info!("Submitting reschedule claim for {} at {}", date, time);
    let fields = form.fields(facility_id, date, time);
    let (status, body) = http
        .post_form(appointment_url, &fields, &form.csrf_token)
        .await?;

    let accepted = is_success(status, &body);
    if !accepted {
        warn!(
            "Submission not accepted ({}): {}",
            status,
            body.chars().take(200).collect::<String>()
        );
    }
    Ok(accepted)
}

/// Decide whether a submission response is an unambiguous success.
///
/// Anything ambiguous counts as failure; a false COMPLETED is far worse
/// than one wasted retry tick.
pub fn is_success(status: StatusCode, body: &str) -> bool {
    if status != StatusCode::OK {
        return false;
    }
    if body.contains(SUCCESS_PHRASE) {
        return true;
    }
    let lowered = body.to_lowercase();
    !ERROR_MARKERS.iter().any(|marker| lowered.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_phrase_wins() {
        assert!(is_success(
            StatusCode::OK,
            "<p>Successfully Scheduled for 2024-04-01</p>"
        ));
    }

    #[test]
    fn clean_200_is_success() {
        assert!(is_success(StatusCode::OK, "<html><body>ok</body></html>"));
    }

    #[test]
    fn non_200_is_failure() {
        assert!(!is_success(StatusCode::FOUND, "Successfully Scheduled"));
        assert!(!is_success(StatusCode::INTERNAL_SERVER_ERROR, ""));
        assert!(!is_success(StatusCode::BAD_REQUEST, "ok"));
    }

    #[test]
    fn embedded_error_marker_is_failure() {
        assert!(!is_success(
            StatusCode::OK,
            "<div class=\"error\">Something went wrong</div>"
        ));
        assert!(!is_success(
            StatusCode::OK,
            "Your appointment could not be scheduled"
        ));
        assert!(!is_success(StatusCode::OK, "An Error Occurred"));
    }

    #[test]
    fn success_phrase_overrides_error_marker() {
        // some portal skins render both a flash box and the phrase
        assert!(is_success(
            StatusCode::OK,
            "class=\"error\" Successfully Scheduled"
        ));
    }

    #[test]
    fn form_fields_carry_the_chosen_slot() {
        let form = RescheduleForm {
            utf8: "✓".to_string(),
            authenticity_token: "tok".to_string(),
            confirmed_limit_message: "1".to_string(),
            use_consulate_appointment_capacity: "true".to_string(),
            csrf_token: "csrf".to_string(),
        };
        let fields = form.fields("143", NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(), "14:00");
        assert!(fields.contains(&(
            "appointments[consulate_appointment][facility_id]".to_string(),
            "143".to_string()
        )));
        assert!(fields.contains(&(
            "appointments[consulate_appointment][date]".to_string(),
            "2024-04-01".to_string()
        )));
        assert!(fields.contains(&(
            "appointments[consulate_appointment][time]".to_string(),
            "14:00".to_string()
        )));
    }
}
