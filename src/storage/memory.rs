use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use tokio::sync::RwLock;

use super::{DeviceRegistry, NotifiedEventStore};
use crate::{
    error::{AppError, AppResult},
    models::{AlarmIdentity, DeviceId, RecipientId, Subscriber},
};

#[derive(Default)]
pub struct MemoryStore {
    subscribers: RwLock<BTreeMap<RecipientId, Subscriber>>,
    devices: RwLock<BTreeMap<RecipientId, BTreeSet<DeviceId>>>,
    notified: RwLock<HashSet<AlarmIdentity>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a subscriber with the given device set.
    pub async fn subscribe(&self, recipient_id: RecipientId, device_ids: &[DeviceId]) {
        self.upsert_subscriber(recipient_id, "login", "password")
            .await
            .unwrap();
        self.replace_devices(recipient_id, device_ids).await.unwrap();
    }

    pub async fn notified(&self) -> HashSet<AlarmIdentity> {
        self.notified.read().await.clone()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> AppResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceRegistry for MemoryStore {
    async fn upsert_subscriber(
        &self,
        recipient_id: RecipientId,
        login: &str,
        password: &str,
    ) -> AppResult<()> {
        self.check_writable()?;
        let now = Utc::now();
        let mut subscribers = self.subscribers.write().await;
        let created_at = subscribers
            .get(&recipient_id)
            .map(|s| s.created_at)
            .unwrap_or(now);
        subscribers.insert(
            recipient_id,
            Subscriber {
                recipient_id,
                login: login.to_string(),
                password: password.to_string(),
                created_at,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn remove_subscriber(&self, recipient_id: RecipientId) -> AppResult<bool> {
        self.check_writable()?;
        self.devices.write().await.remove(&recipient_id);
        Ok(self.subscribers.write().await.remove(&recipient_id).is_some())
    }

    async fn find_subscriber(&self, recipient_id: RecipientId) -> AppResult<Option<Subscriber>> {
        Ok(self.subscribers.read().await.get(&recipient_id).cloned())
    }

    async fn list_subscribers(&self) -> AppResult<Vec<Subscriber>> {
        Ok(self.subscribers.read().await.values().cloned().collect())
    }

    async fn replace_devices(
        &self,
        recipient_id: RecipientId,
        device_ids: &[DeviceId],
    ) -> AppResult<()> {
        self.check_writable()?;
        self.devices
            .write()
            .await
            .insert(recipient_id, device_ids.iter().copied().collect());
        Ok(())
    }

    async fn devices_for_subscriber(
        &self,
        recipient_id: RecipientId,
    ) -> AppResult<BTreeSet<DeviceId>> {
        Ok(self
            .devices
            .read()
            .await
            .get(&recipient_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn recipients_for_device(&self, device_id: DeviceId) -> AppResult<BTreeSet<RecipientId>> {
        Ok(self
            .devices
            .read()
            .await
            .iter()
            .filter(|(_, devices)| devices.contains(&device_id))
            .map(|(recipient, _)| *recipient)
            .collect())
    }

    async fn list_tracked_device_ids(&self) -> AppResult<BTreeSet<DeviceId>> {
        Ok(self
            .devices
            .read()
            .await
            .values()
            .flatten()
            .copied()
            .collect())
    }
}

#[async_trait]
impl NotifiedEventStore for MemoryStore {
    async fn active_notified_identities(
        &self,
        since: NaiveDateTime,
    ) -> AppResult<HashSet<AlarmIdentity>> {
        Ok(self
            .notified
            .read()
            .await
            .iter()
            .filter(|identity| identity.latch_dt >= since)
            .copied()
            .collect())
    }

    async fn record_new_notifications(&self, identities: &[AlarmIdentity]) -> AppResult<()> {
        self.check_writable()?;
        self.notified.write().await.extend(identities.iter().copied());
        Ok(())
    }

    async fn prune_before(&self, boundary: NaiveDateTime) -> AppResult<u64> {
        self.check_writable()?;
        let mut notified = self.notified.write().await;
        let before = notified.len();
        notified.retain(|identity| identity.latch_dt >= boundary);
        Ok((before - notified.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn recipients_are_resolved_through_device_sets() {
        let store = MemoryStore::new();
        store.subscribe(1, &[100, 200]).await;
        store.subscribe(2, &[200]).await;

        assert_eq!(store.recipients_for_device(200).await.unwrap(), BTreeSet::from([1, 2]));
        assert_eq!(store.recipients_for_device(300).await.unwrap(), BTreeSet::new());
        assert_eq!(store.list_tracked_device_ids().await.unwrap(), BTreeSet::from([100, 200]));

        let by_device = store.recipients_for_devices(&[100, 300]).await.unwrap();
        assert_eq!(by_device.len(), 1);
        assert_eq!(by_device[&100], BTreeSet::from([1]));
    }

    #[tokio::test]
    async fn removing_subscriber_drops_devices() {
        let store = MemoryStore::new();
        store.subscribe(1, &[100]).await;

        assert!(store.remove_subscriber(1).await.unwrap());
        assert!(!store.remove_subscriber(1).await.unwrap());
        assert!(store.list_tracked_device_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn active_identities_respect_retention_boundary() {
        let store = MemoryStore::new();
        let old = AlarmIdentity { limit_id: 1, latch_dt: at(10) };
        let fresh = AlarmIdentity { limit_id: 1, latch_dt: at(29) };
        store.record_new_notifications(&[old, fresh]).await.unwrap();

        let active = store.active_notified_identities(at(28)).await.unwrap();
        assert_eq!(active, HashSet::from([fresh]));

        assert_eq!(store.prune_before(at(28)).await.unwrap(), 1);
        assert_eq!(store.notified().await, HashSet::from([fresh]));
    }
}
