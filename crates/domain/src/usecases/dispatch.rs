//! Notification dispatcher - durable log plus optional delivery channels

use std::sync::Arc;
use uuid::Uuid;

use crate::{
    model::{
        ChannelOutcome, DeliveryReport, Digest, EmailSettings, NewNotification, UserId,
    },
    ports::{Clock, DigestChannel, SendStatus, Store, StoreError},
    usecases::retry::{BackoffPolicy, retry_with_backoff},
};

/// Errors from dispatching a digest
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The durable notification log could not be written
    #[error("Failed to write notification log: {0}")]
    Log(#[source] StoreError),
}

/// Writes the durable notification and fans the digest out to each channel
///
/// Channels are isolated from one another: a failing channel is logged and
/// reported, never rolls back the log entry and never stops other channels.
pub struct NotificationDispatcher<St, Cl>
where
    St: Store + ?Sized,
    Cl: Clock + ?Sized,
{
    store: Arc<St>,
    clock: Arc<Cl>,
    channels: Vec<Arc<dyn DigestChannel>>,
    log_policy: BackoffPolicy,
}

impl<St, Cl> NotificationDispatcher<St, Cl>
where
    St: Store + ?Sized,
    Cl: Clock + ?Sized,
{
    pub fn new(store: Arc<St>, clock: Arc<Cl>, channels: Vec<Arc<dyn DigestChannel>>) -> Self {
        Self {
            store,
            clock,
            channels,
            log_policy: BackoffPolicy::storage(),
        }
    }

    /// Deliver a digest for a user
    pub async fn deliver(
        &self,
        digest: &Digest,
        user_id: UserId,
        run_id: Option<Uuid>,
        settings: &EmailSettings,
    ) -> Result<DeliveryReport, DispatchError> {
        let record = NewNotification {
            user_id,
            title: digest.title.clone(),
            body: digest.plain_body.clone(),
            kind: NewNotification::KIND_DIGEST.to_string(),
            run_id,
            created_at: self.clock.now(),
        };

        let notification = retry_with_backoff(
            self.log_policy,
            |e: &StoreError| matches!(e, StoreError::Database(_)),
            || self.store.create_notification(&record),
        )
        .await
        .map_err(|e| {
            tracing::error!(user_id, run_id = ?run_id, error = %e, "Failed to write notification log");
            DispatchError::Log(e)
        })?;

        tracing::info!(
            user_id,
            notification_id = notification.id,
            title = %notification.title,
            "Notification saved"
        );

        let mut channels = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let outcome = match channel.send(digest, settings).await {
                Ok(SendStatus::Sent) => {
                    tracing::info!(
                        user_id,
                        channel = channel.name(),
                        entries = digest.entries.len(),
                        "Digest delivered"
                    );
                    ChannelOutcome::Delivered
                }
                Ok(SendStatus::Skipped(reason)) => {
                    tracing::info!(user_id, channel = channel.name(), reason = %reason, "Channel skipped");
                    ChannelOutcome::Skipped { reason }
                }
                Err(e) => {
                    tracing::error!(user_id, channel = channel.name(), error = %e, "Channel delivery failed");
                    ChannelOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            channels.push((channel.name().to_string(), outcome));
        }

        Ok(DeliveryReport {
            notification_id: notification.id,
            channels,
        })
    }
}
