//! Persistence seams consumed by the alarm pipeline.
//!
//! The pipeline only talks to these traits; `postgres` backs them in
//! production and `memory` stands in for tests.

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::{
    error::AppResult,
    models::{AlarmIdentity, DeviceId, RecipientId, Subscriber},
};

#[cfg(test)]
pub mod memory;
pub mod postgres;
pub mod redis;

/// Owns subscribers and their device sets.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn upsert_subscriber(
        &self,
        recipient_id: RecipientId,
        login: &str,
        password: &str,
    ) -> AppResult<()>;

    /// Returns `false` when the subscriber did not exist.
    async fn remove_subscriber(&self, recipient_id: RecipientId) -> AppResult<bool>;

    async fn find_subscriber(&self, recipient_id: RecipientId) -> AppResult<Option<Subscriber>>;

    async fn list_subscribers(&self) -> AppResult<Vec<Subscriber>>;

    async fn replace_devices(
        &self,
        recipient_id: RecipientId,
        device_ids: &[DeviceId],
    ) -> AppResult<()>;

    async fn devices_for_subscriber(&self, recipient_id: RecipientId)
        -> AppResult<BTreeSet<DeviceId>>;

    async fn recipients_for_device(&self, device_id: DeviceId) -> AppResult<BTreeSet<RecipientId>>;

    /// Devices without recipients are absent from the map.
    async fn recipients_for_devices(
        &self,
        device_ids: &[DeviceId],
    ) -> AppResult<HashMap<DeviceId, BTreeSet<RecipientId>>> {
        let mut result = HashMap::with_capacity(device_ids.len());
        for &device_id in device_ids {
            let recipients = self.recipients_for_device(device_id).await?;
            if !recipients.is_empty() {
                result.insert(device_id, recipients);
            }
        }
        Ok(result)
    }

    /// Union of every subscriber's device set.
    async fn list_tracked_device_ids(&self) -> AppResult<BTreeSet<DeviceId>>;
}

/// Owns the record of alarm events that already produced a notification.
#[async_trait]
pub trait NotifiedEventStore: Send + Sync {
    /// Identities latched at or after `since`.
    async fn active_notified_identities(
        &self,
        since: NaiveDateTime,
    ) -> AppResult<HashSet<AlarmIdentity>>;

    /// All-or-nothing; identities already present are ignored.
    async fn record_new_notifications(&self, identities: &[AlarmIdentity]) -> AppResult<()>;

    /// Deletes records latched before `boundary`, returning how many went.
    async fn prune_before(&self, boundary: NaiveDateTime) -> AppResult<u64>;
}
