//! Discord webhook client

use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;
use serde::Serialize;

use super::{Notifier, NotifyError};

/// Every accepted webhook URL starts with this
pub const WEBHOOK_PREFIX: &str = "https://discord.com/api/webhooks/";

/// Display name attached to every message
pub const USERNAME: &str = "Delivr";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Webhook payload
#[derive(Debug, Serialize, Default, Clone, PartialEq, Eq)]
pub struct Message {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content: String,
    pub username: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

/// A rich message block
#[derive(Debug, Serialize, Default, Clone, PartialEq, Eq)]
pub struct Embed {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(v: &u32) -> bool {
    *v == 0
}

/// A labelled value inside an embed
#[derive(Debug, Serialize, Default, Clone, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub inline: bool,
}

impl EmbedField {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            inline,
        }
    }
}

impl Message {
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            username: USERNAME.to_string(),
            embeds: Vec::new(),
        }
    }

    #[must_use]
    pub fn embed(embed: Embed) -> Self {
        Self {
            content: String::new(),
            username: USERNAME.to_string(),
            embeds: vec![embed],
        }
    }
}

/// Check that `url` looks like a Discord webhook.
///
/// # Errors
///
/// Returns `NotifyError::MissingUrl` for an empty URL and
/// `NotifyError::InvalidUrl` when the prefix does not match.
pub fn validate_webhook_url(url: &str) -> Result<(), NotifyError> {
    if url.trim().is_empty() {
        return Err(NotifyError::MissingUrl);
    }
    if !url.starts_with(WEBHOOK_PREFIX) {
        return Err(NotifyError::InvalidUrl(url.to_string()));
    }
    Ok(())
}

/// Posts messages to a single Discord webhook
#[derive(Debug, Clone)]
pub struct DiscordWebhook {
    client: Client,
    url: String,
}

impl DiscordWebhook {
    /// Create a client for `url`.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::MissingUrl`/`NotifyError::InvalidUrl` if the URL
    /// is not a Discord webhook, or `NotifyError::Http` if the HTTP client
    /// cannot be built.
    pub fn new(url: &str) -> Result<Self, NotifyError> {
        validate_webhook_url(url)?;
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send a message made of a single embed.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError` if the request fails or Discord rejects it.
    pub fn send_rich(
        &self,
        title: &str,
        description: &str,
        fields: Vec<EmbedField>,
        color: u32,
    ) -> Result<(), NotifyError> {
        self.post(&Message::embed(Embed {
            title: title.to_string(),
            description: description.to_string(),
            color,
            fields,
        }))
    }

    fn post(&self, message: &Message) -> Result<(), NotifyError> {
        debug!("Posting webhook message ({} embeds)", message.embeds.len());
        let resp = self.client.post(&self.url).json(message).send()?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(NotifyError::Status {
                status,
                body: decode_error_body(&text),
            });
        }
        Ok(())
    }
}

impl Notifier for DiscordWebhook {
    fn send(&self, content: &str) -> Result<(), NotifyError> {
        self.post(&Message::text(content))
    }
}

/// Compact a JSON error body for display; raw text is kept when it is not JSON.
fn decode_error_body(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => Some(value.to_string()),
        Err(_) => Some(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    use super::*;

    /// Client for a local URL, bypassing the Discord prefix check
    fn local_webhook(url: &str) -> DiscordWebhook {
        DiscordWebhook {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build().unwrap(),
            url: url.to_string(),
        }
    }

    /// Answer one request with `status_line` and `body`; the thread returns
    /// the request body it received.
    fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/api/webhooks/1/token", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':')
                    && name.eq_ignore_ascii_case("content-length")
                {
                    length = value.trim().parse().unwrap();
                }
            }
            let mut request = vec![0; length];
            reader.read_exact(&mut request).unwrap();
            write!(
                stream,
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
            stream.flush().unwrap();
            String::from_utf8(request).unwrap()
        });
        (url, handle)
    }

    #[test]
    fn test_send_posts_json() {
        let (url, server) = serve_once("HTTP/1.1 204 No Content", "");
        local_webhook(&url).send("hello").unwrap();
        assert_eq!(
            server.join().unwrap(),
            r#"{"content":"hello","username":"Delivr"}"#
        );
    }

    #[test]
    fn test_send_reports_rejection() {
        let (url, server) = serve_once(
            "HTTP/1.1 400 Bad Request",
            r#"{ "message": "Invalid Form Body", "code": 50035 }"#,
        );
        match local_webhook(&url).send("hello") {
            Err(NotifyError::Status { status, body }) => {
                assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
                let body: serde_json::Value = serde_json::from_str(&body.unwrap()).unwrap();
                assert_eq!(
                    body,
                    serde_json::json!({"message": "Invalid Form Body", "code": 50035})
                );
            }
            other => panic!("Expected Status error, got: {other:?}"),
        }
        assert!(server.join().unwrap().contains(r#""content":"hello""#));
    }

    #[test]
    fn test_rejects_missing_url() {
        assert!(matches!(
            DiscordWebhook::new(""),
            Err(NotifyError::MissingUrl)
        ));
        assert!(matches!(
            DiscordWebhook::new("   "),
            Err(NotifyError::MissingUrl)
        ));
    }

    #[test]
    fn test_rejects_foreign_url() {
        for url in [
            "http://discord.com/api/webhooks/1/abc",
            "https://example.com/api/webhooks/1/abc",
            "YOUR_DISCORD_WEBHOOK_URL_HERE",
            "https://discord.com/api/webhook/1",
        ] {
            match DiscordWebhook::new(url) {
                Err(NotifyError::InvalidUrl(u)) => assert_eq!(u, url),
                other => panic!("Expected InvalidUrl for {url}, got: {other:?}"),
            }
        }
    }

    #[test]
    fn test_accepts_webhook_url() {
        let hook = DiscordWebhook::new("https://discord.com/api/webhooks/123/token").unwrap();
        assert_eq!(hook.url(), "https://discord.com/api/webhooks/123/token");
    }

    #[test]
    fn test_text_message_json() {
        let json = serde_json::to_value(Message::text("hi")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"content": "hi", "username": "Delivr"})
        );
    }

    #[test]
    fn test_embed_message_json() {
        let message = Message::embed(Embed {
            title: "Build".to_string(),
            description: "done".to_string(),
            color: 0x00ff00,
            fields: vec![
                EmbedField::new("status", "ok", true),
                EmbedField::new("took", "1s", false),
            ],
        });
        let json = serde_json::to_value(message).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "username": "Delivr",
                "embeds": [{
                    "title": "Build",
                    "description": "done",
                    "color": 65280,
                    "fields": [
                        {"name": "status", "value": "ok", "inline": true},
                        {"name": "took", "value": "1s"}
                    ]
                }]
            })
        );
    }

    #[test]
    fn test_status_error_display() {
        let err = NotifyError::Status {
            status: reqwest::StatusCode::BAD_REQUEST,
            body: decode_error_body(r#"{ "message": "Invalid Form Body", "code": 50035 }"#),
        };
        let text = err.to_string();
        assert!(text.contains("HTTP 400 Bad Request"), "got: {text}");
        assert!(text.contains("Invalid Form Body"), "got: {text}");
    }

    #[test]
    fn test_decode_error_body() {
        assert_eq!(decode_error_body("  "), None);
        assert_eq!(decode_error_body("nope"), Some("nope".to_string()));
        assert_eq!(
            decode_error_body(r#"{"a": 1}"#),
            Some(r#"{"a":1}"#.to_string())
        );
    }
}
