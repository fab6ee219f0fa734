//! Notification delivery: live updates to subscribers and digests to operators.

mod digest;
mod live;
mod notifier;

pub use digest::{Attachment, Digest, DigestSender, LogDigest, WebhookDigest};
pub use live::{LiveChannel, LiveMessage, TOPIC_NAMESPACE};
pub use notifier::{NotificationPublisher, Notifier};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Webhook rejected digest with status {status}: {body}")]
    Rejected { status: u16, body: String },
}
