use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::AlarmEvent;

pub type DeviceId = i64;

/// A monitored device as seen in one fetch cycle.
///
/// Equality and hashing use `id` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub object_name: String,
    pub object_address: String,
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Device {}

impl Hash for Device {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A device together with the alarm events fetched for it, in API order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceAlarmGroup {
    pub device: Device,
    pub events: Vec<AlarmEvent>,
}

impl DeviceAlarmGroup {
    pub fn new(device: Device, events: Vec<AlarmEvent>) -> Self {
        Self { device, events }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
