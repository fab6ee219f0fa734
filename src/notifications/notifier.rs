use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{Digest, DigestSender, LiveChannel, NotifyError};
use crate::records::ResultRecord;
use crate::server::metrics;

/// What a job needs to announce new records.
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    /// Push records to the job's live topic. Returns the number of
    /// subscribers reached.
    async fn publish(&self, job_id: &str, records: &[ResultRecord]) -> Result<usize, NotifyError>;

    /// Hand a digest over for delivery. Delivery may complete after this
    /// returns.
    async fn digest(&self, digest: Digest) -> Result<(), NotifyError>;

    /// Close the job's live topic, disconnecting its subscribers.
    async fn close(&self, job_id: &str);
}

/// Live channel plus a set of digest senders.
pub struct Notifier {
    live: Arc<LiveChannel>,
    senders: Vec<Arc<dyn DigestSender>>,
}

impl Notifier {
    pub fn new(live: Arc<LiveChannel>, senders: Vec<Arc<dyn DigestSender>>) -> Self {
        Self { live, senders }
    }

    pub fn live(&self) -> &Arc<LiveChannel> {
        &self.live
    }
}

#[async_trait]
impl NotificationPublisher for Notifier {
    async fn publish(&self, job_id: &str, records: &[ResultRecord]) -> Result<usize, NotifyError> {
        let payload = serde_json::to_string(records)?;
        let topic = LiveChannel::topic_for_job(job_id);
        let delivered = self.live.publish(&topic, payload).await;
        debug!(
            "Published {} records on {} to {} subscribers",
            records.len(),
            topic,
            delivered
        );
        Ok(delivered)
    }

    async fn digest(&self, digest: Digest) -> Result<(), NotifyError> {
        let digest = Arc::new(digest);
        for sender in &self.senders {
            let sender = Arc::clone(sender);
            let digest = Arc::clone(&digest);
            tokio::spawn(async move {
                match sender.send(&digest).await {
                    Ok(()) => metrics::record_digest(sender.name(), true),
                    Err(e) => {
                        metrics::record_digest(sender.name(), false);
                        warn!(
                            "Digest '{}' via {} failed: {}",
                            digest.subject,
                            sender.name(),
                            e
                        );
                    }
                }
            });
        }
        Ok(())
    }

    async fn close(&self, job_id: &str) {
        self.live
            .close_topic(&LiveChannel::topic_for_job(job_id))
            .await;
    }
}
