//! Minimal client for the W3C WebDriver wire protocol.
//!
//! Talks JSON-over-HTTP to a remote automation host (a Selenium hub or
//! a bare chromedriver). Only the handful of commands the portal
//! workflows need are implemented.

use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::PortalError;

/// Key under which the wire protocol nests element references
const ELEMENT_KEY: &str = "element-6066-11e4-a852-e17af865bccc";

/// CSS selector for the element that appears once login has succeeded
pub const POST_LOGIN_MARKER: &str = ".button.primary.small";

/// Interval between attempts while waiting for an element to appear
const WAIT_POLL: Duration = Duration::from_millis(500);

/// Pause between form interactions; the portal flags instant fills
const FORM_PACING: Duration = Duration::from_millis(800);

/// A cookie as reported by the browser
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

/// One live browser session on the automation host.
///
/// Sessions are never shared between jobs. Callers must `close()` the
/// session on every exit path; the host otherwise keeps the browser
/// alive until its own timeout.
pub struct BrowserSession {
    http: Client,
    base: String,
    session_id: String,
}

/// Handle to a located element within a session
pub struct Element<'a> {
    session: &'a BrowserSession,
    id: String,
}

impl BrowserSession {
    /// Open a new browser session against the remote automation host
    pub async fn open(webdriver_url: &str) -> Result<Self, PortalError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()?;

        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": [
                            "--no-sandbox",
                            "--disable-dev-shm-usage",
                            "--disable-gpu",
                            "--disable-blink-features=AutomationControlled",
                            "--disable-extensions"
                        ],
                        "excludeSwitches": ["enable-logging", "enable-automation"]
                    }
                }
            }
        });

        info!("Opening browser session on {}", webdriver_url);
        let body: Value = http
            .post(format!("{}/session", webdriver_url))
            .json(&capabilities)
            .send()
            .await?
            .json()
            .await?;

        let session_id = body["value"]["sessionId"]
            .as_str()
            .ok_or_else(|| {
                PortalError::WebDriver(format!("no session id in response: {}", body))
            })?
            .to_string();

        debug!("Browser session {} opened", session_id);
        Ok(Self {
            http,
            base: webdriver_url.to_string(),
            session_id,
        })
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, PortalError> {
        let url = format!("{}/session/{}{}", self.base, self.session_id, path);
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        } else {
            // POST commands require a body, even an empty one
            request = request.json(&json!({}));
        }

        let response = request.send().await?;
        let status = response.status();
        let payload: Value = response.json().await?;

        if status != StatusCode::OK {
            let error = payload["value"]["error"].as_str().unwrap_or("unknown");
            let message = payload["value"]["message"].as_str().unwrap_or("");
            if error == "no such element" {
                return Err(PortalError::NoSuchElement(message.to_string()));
            }
            return Err(PortalError::WebDriver(format!("{}: {}", error, message)));
        }
        Ok(payload["value"].clone())
    }

    async fn query(&self, path: &str) -> Result<Value, PortalError> {
        let url = format!("{}/session/{}{}", self.base, self.session_id, path);
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let payload: Value = response.json().await?;
        if status != StatusCode::OK {
            let error = payload["value"]["error"].as_str().unwrap_or("unknown");
            return Err(PortalError::WebDriver(error.to_string()));
        }
        Ok(payload["value"].clone())
    }

    pub async fn goto(&self, url: &str) -> Result<(), PortalError> {
        debug!("Navigating to {}", url);
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    pub async fn current_url(&self) -> Result<String, PortalError> {
        let value = self.query("/url").await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PortalError::WebDriver("current url is not a string".to_string()))
    }

    /// Locate a single element by CSS selector
    pub async fn find(&self, css: &str) -> Result<Element<'_>, PortalError> {
        let value = self
            .command(
                Method::POST,
                "/element",
                Some(json!({ "using": "css selector", "value": css })),
            )
            .await?;
        let id = value[ELEMENT_KEY]
            .as_str()
            .ok_or_else(|| PortalError::NoSuchElement(css.to_string()))?
            .to_string();
        Ok(Element { session: self, id })
    }

    /// Like `find`, but absence is not an error
    pub async fn try_find(&self, css: &str) -> Result<Option<Element<'_>>, PortalError> {
        match self.find(css).await {
            Ok(element) => Ok(Some(element)),
            Err(PortalError::NoSuchElement(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Poll for an element until it appears or `timeout` elapses
    pub async fn wait_for(
        &self,
        css: &str,
        timeout: Duration,
    ) -> Result<Element<'_>, PortalError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.find(css).await {
                Ok(element) => return Ok(element),
                Err(PortalError::NoSuchElement(_)) => {}
                Err(e) => return Err(e),
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(PortalError::WaitTimeout(css.to_string()));
            }
            sleep(WAIT_POLL).await;
        }
    }

    /// All cookies the browser currently holds
    pub async fn cookies(&self) -> Result<Vec<BrowserCookie>, PortalError> {
        let value = self.query("/cookie").await?;
        serde_json::from_value(value)
            .map_err(|e| PortalError::WebDriver(format!("malformed cookie list: {}", e)))
    }

    /// The user-agent string the browser reports to the portal
    pub async fn user_agent(&self) -> Result<String, PortalError> {
        let value = self
            .command(
                Method::POST,
                "/execute/sync",
                Some(json!({ "script": "return navigator.userAgent;", "args": [] })),
            )
            .await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PortalError::WebDriver("user agent is not a string".to_string()))
    }

    /// Drive the portal's login form and wait for the post-login marker.
    ///
    /// `success_wait` bounds how long we wait for the marker; running out
    /// of it means the credentials were rejected or the portal is stuck.
    pub async fn login(
        &self,
        login_url: &str,
        email: &str,
        password: &str,
        success_wait: Duration,
    ) -> Result<(), PortalError> {
        info!("Logging in as {}", email);
        self.goto(login_url).await?;

        let email_field = self.wait_for("#user_email", Duration::from_secs(5)).await?;
        email_field.clear().await?;
        email_field.send_keys(email).await?;
        sleep(FORM_PACING).await;

        let password_field = self.find("#user_password").await?;
        password_field.clear().await?;
        password_field.send_keys(password).await?;
        sleep(FORM_PACING).await;

        // Privacy checkbox is not present on every portal skin
        match self.try_find(".icheckbox").await? {
            Some(checkbox) => {
                checkbox.click().await?;
                sleep(FORM_PACING).await;
            }
            None => warn!("Privacy checkbox not found, continuing without it"),
        }

        self.find("[name='commit']").await?.click().await?;

        self.wait_for(POST_LOGIN_MARKER, success_wait).await?;
        info!("Login successful for {}", email);
        Ok(())
    }

    /// End the session and release the remote browser
    pub async fn close(self) -> Result<(), PortalError> {
        let url = format!("{}/session/{}", self.base, self.session_id);
        self.http.delete(url).send().await?;
        debug!("Browser session {} closed", self.session_id);
        Ok(())
    }
}

impl Element<'_> {
    pub async fn click(&self) -> Result<(), PortalError> {
        self.session
            .command(Method::POST, &format!("/element/{}/click", self.id), None)
            .await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), PortalError> {
        self.session
            .command(Method::POST, &format!("/element/{}/clear", self.id), None)
            .await?;
        Ok(())
    }

    pub async fn send_keys(&self, text: &str) -> Result<(), PortalError> {
        self.session
            .command(
                Method::POST,
                &format!("/element/{}/value", self.id),
                Some(json!({ "text": text })),
            )
            .await?;
        Ok(())
    }

    /// Value of an attribute, or None when the attribute is absent
    pub async fn attribute(&self, name: &str) -> Result<Option<String>, PortalError> {
        let value = self
            .session
            .query(&format!("/element/{}/attribute/{}", self.id, name))
            .await?;
        Ok(value.as_str().map(str::to_string))
    }
}
