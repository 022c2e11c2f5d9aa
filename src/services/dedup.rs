use std::collections::HashSet;

use crate::models::{AlarmIdentity, DeviceAlarmGroup};

/// Keeps only events whose identity is not in `notified`.
///
/// Devices left without events are dropped. Device order and event order
/// are preserved.
pub fn filter_new_events(
    notified: &HashSet<AlarmIdentity>,
    groups: &[DeviceAlarmGroup],
) -> Vec<DeviceAlarmGroup> {
    groups
        .iter()
        .filter_map(|group| {
            let events: Vec<_> = group
                .events
                .iter()
                .filter(|event| !notified.contains(&event.identity()))
                .cloned()
                .collect();

            (!events.is_empty()).then(|| DeviceAlarmGroup::new(group.device.clone(), events))
        })
        .collect()
}
