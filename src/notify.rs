use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

const PUSH_URL: &str = "https://api.pushover.net/1/messages.json";

/// Fire-and-forget push notifications via Pushover.
///
/// Delivery failures are logged and swallowed; a flaky notification
/// channel must never fail a completed re-schedule.
pub struct Notifier {
    http: Client,
    token: Option<String>,
    user: Option<String>,
}

impl Notifier {
    pub fn new(token: Option<String>, user: Option<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { http, token, user }
    }

    pub async fn send(&self, message: &str) {
        let (Some(token), Some(user)) = (self.token.as_deref(), self.user.as_deref()) else {
            debug!("push notifications not configured, skipping: {}", message);
            return;
        };

        let form = [("token", token), ("user", user), ("message", message)];
        match self.http.post(PUSH_URL).form(&form).send().await {
            Ok(resp) if !resp.status().is_success() => {
                warn!("push notification rejected with status {}", resp.status());
            }
            Ok(_) => debug!("push notification sent"),
            Err(e) => warn!("could not send push notification: {}", e),
        }
    }
}
