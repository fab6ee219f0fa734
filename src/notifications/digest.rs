//! Digest delivery: a summary with attachments, sent when a run finds new items.

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use super::NotifyError;

/// Embed color used for webhook digests.
const EMBED_COLOR: u32 = 0x0099ff;

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn csv(file_name: impl Into<String>, content: String) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: "text/csv".to_string(),
            bytes: content.into_bytes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Digest {
    pub subject: String,
    pub summary: String,
    pub attachments: Vec<Attachment>,
}

/// A channel able to deliver digests.
#[async_trait]
pub trait DigestSender: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, digest: &Digest) -> Result<(), NotifyError>;
}

/// Posts digests to a chat webhook (Discord-compatible multipart payload).
pub struct WebhookDigest {
    client: reqwest::Client,
    url: String,
    title_prefix: String,
}

impl WebhookDigest {
    pub fn new(
        url: impl Into<String>,
        title_prefix: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            title_prefix: title_prefix.into(),
        })
    }

    pub fn payload_json(&self, digest: &Digest) -> serde_json::Value {
        let title = if self.title_prefix.is_empty() {
            digest.subject.clone()
        } else {
            format!("({}) {}", self.title_prefix, digest.subject)
        };

        serde_json::json!({
            "embeds": [{
                "title": title,
                "description": digest.summary,
                "color": EMBED_COLOR,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }]
        })
    }
}

#[async_trait]
impl DigestSender for WebhookDigest {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, digest: &Digest) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(&self.payload_json(digest))?;
        let mut form = reqwest::multipart::Form::new().text("payload_json", payload);

        for (index, attachment) in digest.attachments.iter().enumerate() {
            let part = reqwest::multipart::Part::bytes(attachment.bytes.clone())
                .file_name(attachment.file_name.clone())
                .mime_str(&attachment.content_type)?;
            form = form.part(format!("files[{}]", index), part);
        }

        let response = self.client.post(&self.url).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!("Digest '{}' delivered to webhook", digest.subject);
        Ok(())
    }
}

/// Writes digests to the log only. Used when no delivery channel is configured.
pub struct LogDigest;

#[async_trait]
impl DigestSender for LogDigest {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, digest: &Digest) -> Result<(), NotifyError> {
        let attachments: Vec<&str> = digest
            .attachments
            .iter()
            .map(|a| a.file_name.as_str())
            .collect();
        info!(
            "Digest: {} - {} (attachments: {:?})",
            digest.subject, digest.summary, attachments
        );
        Ok(())
    }
}
