//! One alarm cycle: fetch → dedup → record → notify.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::Instrument;
use uuid::Uuid;

use super::{
    dedup,
    fanout::NotificationFanout,
    monitoring::MonitoringApi,
    scheduler::ScheduledJob,
};
use crate::{
    config::AlarmConfig,
    error::{AppError, AppResult},
    models::{AccessToken, AlarmEvent, AlarmIdentity, AlarmWindow, Device, DeviceAlarmGroup, DeviceId},
    storage::{DeviceRegistry, NotifiedEventStore},
};

/// Account the cycle uses to read every tracked device.
#[derive(Debug, Clone)]
pub struct AdminCredentials {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub tracked_devices: usize,
    pub fetched_devices: usize,
    pub failed_devices: Vec<DeviceId>,
    pub new_events: usize,
    pub delivered: usize,
    pub failed_deliveries: usize,
}

pub struct AlarmPipeline {
    monitoring: Arc<dyn MonitoringApi>,
    registry: Arc<dyn DeviceRegistry>,
    notified: Arc<dyn NotifiedEventStore>,
    fanout: NotificationFanout,
    admin: AdminCredentials,
    alarms: AlarmConfig,
}

impl AlarmPipeline {
    pub fn new(
        monitoring: Arc<dyn MonitoringApi>,
        registry: Arc<dyn DeviceRegistry>,
        notified: Arc<dyn NotifiedEventStore>,
        fanout: NotificationFanout,
        admin: AdminCredentials,
        alarms: AlarmConfig,
    ) -> Self {
        Self {
            monitoring,
            registry,
            notified,
            fanout,
            admin,
            alarms,
        }
    }

    pub async fn run_cycle(&self) -> AppResult<CycleReport> {
        self.run_cycle_at(Utc::now()).await
    }

    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> AppResult<CycleReport> {
        let cycle_id = Uuid::new_v4();
        let window = AlarmWindow::trailing(&now.with_timezone(&self.alarms.timezone));

        async {
            let report = self.cycle(&window).await?;

            tracing::info!(
                tracked = report.tracked_devices,
                fetched = report.fetched_devices,
                failed = report.failed_devices.len(),
                new_events = report.new_events,
                delivered = report.delivered,
                failed_deliveries = report.failed_deliveries,
                "Alarm cycle completed"
            );

            match self.notified.prune_before(window.start).await {
                Ok(0) => {}
                Ok(pruned) => tracing::debug!("Pruned {} expired notified records", pruned),
                Err(e) => tracing::warn!("Failed to prune notified records: {}", e),
            }

            Ok::<_, AppError>(report)
        }
        .instrument(tracing::info_span!("alarm_cycle", %cycle_id))
        .await
    }

    async fn cycle(&self, window: &AlarmWindow) -> AppResult<CycleReport> {
        let token = self
            .monitoring
            .authenticate(&self.admin.login, &self.admin.password)
            .await?
            .ok_or(AppError::AdminCredentialsRejected)?;

        let tracked_ids = self.registry.list_tracked_device_ids().await?;
        let mut report = CycleReport {
            tracked_devices: tracked_ids.len(),
            ..CycleReport::default()
        };
        if tracked_ids.is_empty() {
            tracing::debug!("No tracked devices, nothing to poll");
            return Ok(report);
        }

        let devices = self.tracked_devices(&token, &tracked_ids).await?;
        let (groups, failed) = self.fetch_alarm_groups(&devices, &token, window).await;
        report.fetched_devices = devices.len() - failed.len();
        report.failed_devices = failed;

        let notified = self
            .notified
            .active_notified_identities(window.start)
            .await?;
        let fresh = dedup::filter_new_events(&notified, &groups);
        report.new_events = fresh.iter().map(|g| g.events.len()).sum();
        if fresh.is_empty() {
            return Ok(report);
        }

        // Resolve recipients before recording so a lookup failure leaves
        // nothing marked as notified.
        let device_ids: Vec<DeviceId> = fresh.iter().map(|g| g.device.id).collect();
        let recipients = self.registry.recipients_for_devices(&device_ids).await?;

        let identities: Vec<AlarmIdentity> = fresh
            .iter()
            .flat_map(|g| g.events.iter().map(AlarmEvent::identity))
            .collect();
        self.notified.record_new_notifications(&identities).await?;

        let fanout = self.fanout.dispatch(&fresh, &recipients).await;
        report.delivered = fanout.delivered.len();
        report.failed_deliveries = fanout.failed.len();

        Ok(report)
    }

    /// Tracked devices the admin account can see, ordered by id.
    async fn tracked_devices(
        &self,
        token: &AccessToken,
        tracked_ids: &BTreeSet<DeviceId>,
    ) -> AppResult<Vec<Device>> {
        let mut devices: Vec<Device> = self
            .monitoring
            .fetch_tracked_device_universe(token)
            .await?
            .into_iter()
            .filter(|device| tracked_ids.contains(&device.id))
            .collect();
        devices.sort_by_key(|device| device.id);
        Ok(devices)
    }

    /// Fetches every device concurrently. A failed device is logged and
    /// left out of this cycle.
    async fn fetch_alarm_groups(
        &self,
        devices: &[Device],
        token: &AccessToken,
        window: &AlarmWindow,
    ) -> (Vec<DeviceAlarmGroup>, Vec<DeviceId>) {
        let fetches = devices.iter().map(|device| async move {
            let result = self
                .monitoring
                .fetch_alarm_events(device.id, token, window)
                .await;
            (device, result)
        });

        let mut groups = Vec::with_capacity(devices.len());
        let mut failed = Vec::new();
        for (device, result) in join_all(fetches).await {
            match result {
                Ok(events) => {
                    let events: Vec<AlarmEvent> =
                        events.into_iter().filter(|e| self.is_targeted(e)).collect();
                    if !events.is_empty() {
                        groups.push(DeviceAlarmGroup::new(device.clone(), events));
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        device_id = device.id,
                        "Failed to fetch alarm history: {}",
                        e
                    );
                    failed.push(device.id);
                }
            }
        }

        (groups, failed)
    }

    fn is_targeted(&self, event: &AlarmEvent) -> bool {
        self.alarms.targeted.is_empty() || self.alarms.targeted.iter().any(|k| k == event.kind())
    }
}

#[async_trait]
impl ScheduledJob for AlarmPipeline {
    fn name(&self) -> &'static str {
        "poll-alarms"
    }

    async fn run(&self) -> AppResult<()> {
        self.run_cycle().await.map(|_| ())
    }
}
