use thiserror::Error;

pub mod discord;

/// Errors that can occur while delivering a notification
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("discord webhook URL is required")]
    MissingUrl,
    #[error("invalid webhook URL format, must start with {}", discord::WEBHOOK_PREFIX)]
    InvalidUrl(String),
    #[error("error sending webhook: {0}")]
    Http(#[from] reqwest::Error),
    #[error("error sending message to Discord: HTTP {status}{}", detail(.body))]
    Status {
        status: reqwest::StatusCode,
        body: Option<String>,
    },
}

fn detail(body: &Option<String>) -> String {
    body.as_deref().map(|b| format!(", {b}")).unwrap_or_default()
}

/// Something that can deliver a plain-text status message.
pub trait Notifier {
    /// Send `content` as a single message.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError` if the message could not be delivered.
    fn send(&self, content: &str) -> Result<(), NotifyError>;
}

impl<T: Notifier + ?Sized> Notifier for &T {
    fn send(&self, content: &str) -> Result<(), NotifyError> {
        (**self).send(content)
    }
}
