use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::PgPool;

use super::{DeviceRegistry, NotifiedEventStore};
use crate::{
    error::AppResult,
    models::{AlarmIdentity, DeviceId, RecipientId, Subscriber},
};

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DeviceRegistry for PgStore {
    async fn upsert_subscriber(
        &self,
        recipient_id: RecipientId,
        login: &str,
        password: &str,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscribers (recipient_id, login, password)
            VALUES ($1, $2, $3)
            ON CONFLICT (recipient_id)
            DO UPDATE SET login = EXCLUDED.login, password = EXCLUDED.password, updated_at = NOW()
            "#,
        )
        .bind(recipient_id)
        .bind(login)
        .bind(password)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn remove_subscriber(&self, recipient_id: RecipientId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM subscribers WHERE recipient_id = $1")
            .bind(recipient_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_subscriber(&self, recipient_id: RecipientId) -> AppResult<Option<Subscriber>> {
        let subscriber: Option<Subscriber> =
            sqlx::query_as("SELECT * FROM subscribers WHERE recipient_id = $1")
                .bind(recipient_id)
                .fetch_optional(&self.db)
                .await?;

        Ok(subscriber)
    }

    async fn list_subscribers(&self) -> AppResult<Vec<Subscriber>> {
        let subscribers: Vec<Subscriber> =
            sqlx::query_as("SELECT * FROM subscribers ORDER BY recipient_id")
                .fetch_all(&self.db)
                .await?;

        Ok(subscribers)
    }

    async fn replace_devices(
        &self,
        recipient_id: RecipientId,
        device_ids: &[DeviceId],
    ) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM subscriber_devices WHERE recipient_id = $1")
            .bind(recipient_id)
            .execute(&mut *tx)
            .await?;

        if !device_ids.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO subscriber_devices (recipient_id, device_id)
                SELECT $1, UNNEST($2::BIGINT[])
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(recipient_id)
            .bind(device_ids)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn devices_for_subscriber(
        &self,
        recipient_id: RecipientId,
    ) -> AppResult<BTreeSet<DeviceId>> {
        let rows: Vec<(DeviceId,)> =
            sqlx::query_as("SELECT device_id FROM subscriber_devices WHERE recipient_id = $1")
                .bind(recipient_id)
                .fetch_all(&self.db)
                .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn recipients_for_device(&self, device_id: DeviceId) -> AppResult<BTreeSet<RecipientId>> {
        let rows: Vec<(RecipientId,)> =
            sqlx::query_as("SELECT recipient_id FROM subscriber_devices WHERE device_id = $1")
                .bind(device_id)
                .fetch_all(&self.db)
                .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn recipients_for_devices(
        &self,
        device_ids: &[DeviceId],
    ) -> AppResult<HashMap<DeviceId, BTreeSet<RecipientId>>> {
        if device_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(DeviceId, Vec<RecipientId>)> = sqlx::query_as(
            r#"
            SELECT device_id, ARRAY_AGG(recipient_id)
            FROM subscriber_devices
            WHERE device_id = ANY($1)
            GROUP BY device_id
            "#,
        )
        .bind(device_ids)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(device_id, recipients)| (device_id, recipients.into_iter().collect()))
            .collect())
    }

    async fn list_tracked_device_ids(&self) -> AppResult<BTreeSet<DeviceId>> {
        let rows: Vec<(DeviceId,)> =
            sqlx::query_as("SELECT DISTINCT device_id FROM subscriber_devices")
                .fetch_all(&self.db)
                .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[async_trait]
impl NotifiedEventStore for PgStore {
    async fn active_notified_identities(
        &self,
        since: NaiveDateTime,
    ) -> AppResult<HashSet<AlarmIdentity>> {
        let identities: Vec<AlarmIdentity> = sqlx::query_as(
            "SELECT limit_id, latch_dt FROM notified_alarms WHERE latch_dt >= $1",
        )
        .bind(since)
        .fetch_all(&self.db)
        .await?;

        Ok(identities.into_iter().collect())
    }

    async fn record_new_notifications(&self, identities: &[AlarmIdentity]) -> AppResult<()> {
        if identities.is_empty() {
            return Ok(());
        }

        let (limit_ids, latch_dts): (Vec<i64>, Vec<NaiveDateTime>) = identities
            .iter()
            .map(|identity| (identity.limit_id, identity.latch_dt))
            .unzip();

        sqlx::query(
            r#"
            INSERT INTO notified_alarms (limit_id, latch_dt)
            SELECT * FROM UNNEST($1::BIGINT[], $2::TIMESTAMP[])
            ON CONFLICT (limit_id, latch_dt) DO NOTHING
            "#,
        )
        .bind(&limit_ids)
        .bind(&latch_dts)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn prune_before(&self, boundary: NaiveDateTime) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM notified_alarms WHERE latch_dt < $1")
            .bind(boundary)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
