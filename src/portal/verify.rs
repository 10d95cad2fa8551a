//! Credential verification: a login-only flow that also discovers the
//! portal-internal schedule identifier embedded in the post-login URL.

use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use super::webdriver::{BrowserSession, POST_LOGIN_MARKER};
use super::PortalError;

static SCHEDULE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/schedule/(\d+)/").expect("schedule pattern"));

/// Outcome of a credential check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialCheck {
    /// Login worked and the schedule identifier was discovered
    Verified { schedule_number: String },
    /// Login worked but no schedule identifier could be extracted
    VerifiedWithoutSchedule,
    /// Login failed
    Failed { error: String },
}

/// Extract the numeric schedule identifier from a portal URL
pub fn extract_schedule_number(url: &str) -> Option<String> {
    SCHEDULE_RE
        .captures(url)
        .map(|captures| captures[1].to_string())
}

/// Verify a subject's credentials against the portal.
///
/// Opens its own browser session and releases it on every exit path.
pub async fn verify_credentials(
    webdriver_url: &str,
    portal_base_url: &str,
    email: &str,
    password: &str,
    login_wait: Duration,
) -> CredentialCheck {
    let browser = match BrowserSession::open(webdriver_url).await {
        Ok(browser) => browser,
        Err(e) => {
            return CredentialCheck::Failed {
                error: format!("could not open browser session: {}", e),
            }
        }
    };

    let result = check(&browser, portal_base_url, email, password, login_wait).await;

    if let Err(e) = browser.close().await {
        warn!("Could not close verification browser session: {}", e);
    }

    match result {
        Ok(check) => check,
        Err(e) => CredentialCheck::Failed {
            error: e.to_string(),
        },
    }
}

async fn check(
    browser: &BrowserSession,
    portal_base_url: &str,
    email: &str,
    password: &str,
    login_wait: Duration,
) -> Result<CredentialCheck, PortalError> {
    let login_url = format!("{}/users/sign_in", portal_base_url);
    browser.login(&login_url, email, password, login_wait).await?;

    let url = browser.current_url().await?;
    if let Some(schedule_number) = extract_schedule_number(&url) {
        info!("Schedule number {} discovered for {}", schedule_number, email);
        return Ok(CredentialCheck::Verified { schedule_number });
    }

    // One fallback hop through the primary continue affordance; some
    // accounts land on a groups page without the schedule in the URL
    if let Some(button) = browser.try_find(POST_LOGIN_MARKER).await? {
        button.click().await?;
        sleep(Duration::from_secs(2)).await;

        let url = browser.current_url().await?;
        if let Some(schedule_number) = extract_schedule_number(&url) {
            info!("Schedule number {} discovered for {}", schedule_number, email);
            return Ok(CredentialCheck::Verified { schedule_number });
        }
    }

    warn!("Login worked for {} but no schedule number was found", email);
    Ok(CredentialCheck::VerifiedWithoutSchedule)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_schedule_number_from_path() {
        assert_eq!(
            extract_schedule_number("https://portal.example/en-hn/niv/schedule/48153265/continue_actions"),
            Some("48153265".to_string())
        );
    }

    #[test]
    fn requires_trailing_segment() {
        assert_eq!(extract_schedule_number("https://portal.example/schedule/123"), None);
        assert_eq!(
            extract_schedule_number("https://portal.example/schedule/123/"),
            Some("123".to_string())
        );
    }

    #[test]
    fn ignores_non_numeric_segments() {
        assert_eq!(
            extract_schedule_number("https://portal.example/schedule/abc/appointment"),
            None
        );
        assert_eq!(extract_schedule_number("https://portal.example/account"), None);
    }
}
