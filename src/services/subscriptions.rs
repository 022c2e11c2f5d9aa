//! Subscriber lifecycle: authorize, unsubscribe and the daily device refresh.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use super::{monitoring::MonitoringApi, scheduler::ScheduledJob, telegram::MessageDelivery};
use crate::{
    error::{AppError, AppResult},
    models::{AccessToken, DeviceId, OutboundMessage, RecipientId, Subscriber, Subscription},
    storage::DeviceRegistry,
};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub removed: Vec<RecipientId>,
    pub failed: Vec<RecipientId>,
}

enum RefreshOutcome {
    Refreshed,
    Removed,
}

pub struct SubscriptionService {
    monitoring: Arc<dyn MonitoringApi>,
    registry: Arc<dyn DeviceRegistry>,
    delivery: Arc<dyn MessageDelivery>,
    reauthorize_message: String,
}

impl SubscriptionService {
    pub fn new(
        monitoring: Arc<dyn MonitoringApi>,
        registry: Arc<dyn DeviceRegistry>,
        delivery: Arc<dyn MessageDelivery>,
        reauthorize_message: String,
    ) -> Self {
        Self {
            monitoring,
            registry,
            delivery,
            reauthorize_message,
        }
    }

    /// Verify the credentials, store them and track every device they reach.
    pub async fn subscribe(
        &self,
        recipient_id: RecipientId,
        login: &str,
        password: &str,
    ) -> AppResult<Subscription> {
        if login.trim().is_empty() || password.is_empty() {
            return Err(AppError::Validation(
                "login and password are required".to_string(),
            ));
        }

        let token = self
            .monitoring
            .authenticate(login, password)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        let device_ids = self.device_ids_for(&token).await?;

        self.registry
            .upsert_subscriber(recipient_id, login, password)
            .await?;
        self.registry
            .replace_devices(recipient_id, &device_ids)
            .await?;

        tracing::info!(
            "Chat {} subscribed to {} device(s)",
            recipient_id,
            device_ids.len()
        );

        Ok(Subscription {
            recipient_id,
            device_ids,
        })
    }

    pub async fn unsubscribe(&self, recipient_id: RecipientId) -> AppResult<()> {
        if !self.registry.remove_subscriber(recipient_id).await? {
            return Err(AppError::SubscriberNotFound);
        }

        tracing::info!("Chat {} unsubscribed", recipient_id);
        Ok(())
    }

    pub async fn subscription(&self, recipient_id: RecipientId) -> AppResult<Subscription> {
        self.registry
            .find_subscriber(recipient_id)
            .await?
            .ok_or(AppError::SubscriberNotFound)?;

        let device_ids = self
            .registry
            .devices_for_subscriber(recipient_id)
            .await?
            .into_iter()
            .collect();

        Ok(Subscription {
            recipient_id,
            device_ids,
        })
    }

    /// Re-verify every subscriber concurrently and resync their devices.
    pub async fn refresh_all(&self) -> AppResult<RefreshReport> {
        let subscribers = self.registry.list_subscribers().await?;

        let refreshes = subscribers.iter().map(|subscriber| async move {
            (subscriber.recipient_id, self.refresh(subscriber).await)
        });

        let mut report = RefreshReport::default();
        for (recipient_id, result) in join_all(refreshes).await {
            match result {
                Ok(RefreshOutcome::Refreshed) => report.refreshed += 1,
                Ok(RefreshOutcome::Removed) => report.removed.push(recipient_id),
                Err(e) => {
                    tracing::warn!(
                        recipient = recipient_id,
                        "Failed to refresh subscription: {}",
                        e
                    );
                    report.failed.push(recipient_id);
                }
            }
        }

        tracing::info!(
            refreshed = report.refreshed,
            removed = report.removed.len(),
            failed = report.failed.len(),
            "Subscriptions refreshed"
        );

        Ok(report)
    }

    async fn refresh(&self, subscriber: &Subscriber) -> AppResult<RefreshOutcome> {
        let recipient_id = subscriber.recipient_id;

        match self
            .monitoring
            .authenticate(&subscriber.login, &subscriber.password)
            .await?
        {
            Some(token) => {
                let device_ids = self.device_ids_for(&token).await?;
                self.registry
                    .replace_devices(recipient_id, &device_ids)
                    .await?;
                Ok(RefreshOutcome::Refreshed)
            }
            None => {
                let message = OutboundMessage::plain(self.reauthorize_message.clone());
                if let Err(e) = self.delivery.deliver(recipient_id, &message).await {
                    tracing::warn!(
                        "Failed to ask chat {} to re-authorize: {}",
                        recipient_id,
                        e
                    );
                }
                self.registry.remove_subscriber(recipient_id).await?;
                tracing::info!(
                    "Removed chat {} after its credentials were rejected",
                    recipient_id
                );
                Ok(RefreshOutcome::Removed)
            }
        }
    }

    async fn device_ids_for(&self, token: &AccessToken) -> AppResult<Vec<DeviceId>> {
        let mut ids: Vec<DeviceId> = self
            .monitoring
            .fetch_tracked_device_universe(token)
            .await?
            .into_iter()
            .map(|device| device.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

#[async_trait]
impl ScheduledJob for SubscriptionService {
    fn name(&self) -> &'static str {
        "refresh-subscriptions"
    }

    async fn run(&self) -> AppResult<()> {
        self.refresh_all().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::{
        services::testing::{device, FakeMonitoring, RecordingDelivery},
        storage::memory::MemoryStore,
    };

    const REAUTHORIZE: &str = "Please authorize again";

    fn service(
        monitoring: FakeMonitoring,
    ) -> (SubscriptionService, Arc<MemoryStore>, Arc<RecordingDelivery>) {
        let store = Arc::new(MemoryStore::new());
        let delivery = Arc::new(RecordingDelivery::new());
        let service = SubscriptionService::new(
            Arc::new(monitoring),
            store.clone(),
            delivery.clone(),
            REAUTHORIZE.to_string(),
        );
        (service, store, delivery)
    }

    #[tokio::test]
    async fn subscribe_tracks_every_reachable_device() {
        let (service, store, _) = service(
            FakeMonitoring::new().with_account("alice", "pw", vec![device(200), device(100)]),
        );

        let subscription = assert_ok!(service.subscribe(1, "alice", "pw").await);

        assert_eq!(subscription.device_ids, vec![100, 200]);
        assert_eq!(store.devices_for_subscriber(1).await.unwrap(), BTreeSet::from([100, 200]));
        assert!(store.find_subscriber(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn subscribe_rejects_bad_credentials() {
        let (service, store, _) =
            service(FakeMonitoring::new().with_account("alice", "pw", vec![device(100)]));

        let err = assert_err!(service.subscribe(1, "alice", "wrong").await);

        assert!(matches!(err, AppError::InvalidCredentials));
        assert!(store.find_subscriber(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn subscribe_requires_login() {
        let (service, _, _) = service(FakeMonitoring::new());

        let err = assert_err!(service.subscribe(1, " ", "pw").await);
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn unsubscribe_unknown_chat_is_not_found() {
        let (service, store, _) = service(FakeMonitoring::new());
        store.subscribe(1, &[100]).await;

        assert_ok!(service.unsubscribe(1).await);
        let err = assert_err!(service.unsubscribe(1).await);
        assert!(matches!(err, AppError::SubscriberNotFound));
        assert!(store.list_tracked_device_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn subscription_lists_devices() {
        let (service, store, _) = service(FakeMonitoring::new());
        store.subscribe(1, &[300, 100]).await;

        let subscription = assert_ok!(service.subscription(1).await);
        assert_eq!(subscription.device_ids, vec![100, 300]);

        let err = assert_err!(service.subscription(2).await);
        assert!(matches!(err, AppError::SubscriberNotFound));
    }

    #[tokio::test]
    async fn refresh_resyncs_devices_and_removes_rejected_subscribers() {
        let (service, store, delivery) = service(
            FakeMonitoring::new().with_account("login", "password", vec![device(500)]),
        );
        // Seeded with "login"/"password", which the fake accepts.
        store.subscribe(1, &[100]).await;
        store
            .upsert_subscriber(2, "revoked", "password")
            .await
            .unwrap();
        store.replace_devices(2, &[200]).await.unwrap();

        let report = assert_ok!(service.refresh_all().await);

        assert_eq!(report.refreshed, 1);
        assert_eq!(report.removed, vec![2]);
        assert!(report.failed.is_empty());
        assert_eq!(store.devices_for_subscriber(1).await.unwrap(), BTreeSet::from([500]));
        assert!(store.find_subscriber(2).await.unwrap().is_none());

        let sent = delivery.sent().await;
        assert_eq!(sent, vec![(2, OutboundMessage::plain(REAUTHORIZE))]);
    }
}
