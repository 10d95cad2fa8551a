pub mod bridge;
pub mod selector;
pub mod submit;
pub mod verify;
pub mod webdriver;

use thiserror::Error;

/// Errors talking to the automation host or the portal itself
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("automation host request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("automation host error: {0}")]
    WebDriver(String),

    #[error("element not found: {0}")]
    NoSuchElement(String),

    #[error("timed out waiting for {0}")]
    WaitTimeout(String),

    #[error("portal returned unexpected payload: {0}")]
    UnexpectedResponse(String),
}
