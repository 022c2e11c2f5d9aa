//! In-memory stand-ins for the external collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{monitoring::MonitoringApi, telegram::MessageDelivery};
use crate::{
    error::{AppError, AppResult},
    models::{AccessToken, AlarmEvent, AlarmWindow, Device, DeviceId, OutboundMessage, RecipientId},
};

/// Records delivered messages; chosen recipients fail.
#[derive(Default)]
pub struct RecordingDelivery {
    sent: Mutex<Vec<(RecipientId, OutboundMessage)>>,
    failing: HashSet<RecipientId>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(mut self, recipient: RecipientId) -> Self {
        self.failing.insert(recipient);
        self
    }

    pub async fn sent(&self) -> Vec<(RecipientId, OutboundMessage)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl MessageDelivery for RecordingDelivery {
    async fn deliver(&self, recipient: RecipientId, message: &OutboundMessage) -> AppResult<()> {
        if self.failing.contains(&recipient) {
            return Err(AppError::Upstream {
                service: "Telegram API",
                status: 403,
                body: "Forbidden: bot was blocked by the user".to_string(),
            });
        }
        self.sent.lock().await.push((recipient, message.clone()));
        Ok(())
    }
}

/// Monitoring API keyed by login: the issued token is the login itself.
#[derive(Default)]
pub struct FakeMonitoring {
    accounts: HashMap<String, String>,
    universes: HashMap<String, Vec<Device>>,
    events: HashMap<DeviceId, Vec<AlarmEvent>>,
    failing_devices: HashSet<DeviceId>,
    alarm_fetches: AtomicUsize,
}

impl FakeMonitoring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, login: &str, password: &str, devices: Vec<Device>) -> Self {
        self.accounts.insert(login.to_string(), password.to_string());
        self.universes.insert(login.to_string(), devices);
        self
    }

    pub fn with_events(mut self, device_id: DeviceId, events: Vec<AlarmEvent>) -> Self {
        self.events.insert(device_id, events);
        self
    }

    pub fn failing_device(mut self, device_id: DeviceId) -> Self {
        self.failing_devices.insert(device_id);
        self
    }

    pub fn alarm_fetches(&self) -> usize {
        self.alarm_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MonitoringApi for FakeMonitoring {
    async fn authenticate(&self, login: &str, password: &str) -> AppResult<Option<AccessToken>> {
        match self.accounts.get(login) {
            Some(expected) if expected == password => Ok(AccessToken::new(login)),
            _ => Ok(None),
        }
    }

    async fn fetch_tracked_device_universe(
        &self,
        token: &AccessToken,
    ) -> AppResult<HashSet<Device>> {
        Ok(self
            .universes
            .get(token.as_str())
            .map(|devices| devices.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch_alarm_events(
        &self,
        device_id: DeviceId,
        _token: &AccessToken,
        _window: &AlarmWindow,
    ) -> AppResult<Vec<AlarmEvent>> {
        self.alarm_fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing_devices.contains(&device_id) {
            return Err(AppError::Upstream {
                service: "monitoring API",
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(self.events.get(&device_id).cloned().unwrap_or_default())
    }
}

pub fn device(id: DeviceId) -> Device {
    Device {
        id,
        name: format!("device-{}", id),
        object_name: format!("object-{}", id),
        object_address: format!("street {}", id),
    }
}
