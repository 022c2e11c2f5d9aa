use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use futures::future::join_all;

use super::{formatter, telegram::MessageDelivery};
use crate::models::{DeviceAlarmGroup, DeviceId, RecipientId};

/// Outcome of one fan-out, per recipient.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: Vec<RecipientId>,
    pub failed: Vec<RecipientId>,
}

/// Inverts device → recipients into recipient → groups.
///
/// A group shared by several recipients is cloned whole into each of their
/// lists. Empty groups and devices without recipients contribute nothing.
pub fn group_by_recipient(
    groups: &[DeviceAlarmGroup],
    recipients: &HashMap<DeviceId, BTreeSet<RecipientId>>,
) -> BTreeMap<RecipientId, Vec<DeviceAlarmGroup>> {
    let mut by_recipient: BTreeMap<RecipientId, Vec<DeviceAlarmGroup>> = BTreeMap::new();

    for group in groups.iter().filter(|g| !g.is_empty()) {
        let Some(device_recipients) = recipients.get(&group.device.id) else {
            continue;
        };
        for &recipient in device_recipients {
            by_recipient.entry(recipient).or_default().push(group.clone());
        }
    }

    by_recipient
}

/// Sends one aggregated message per recipient, all concurrently.
#[derive(Clone)]
pub struct NotificationFanout {
    delivery: Arc<dyn MessageDelivery>,
}

impl NotificationFanout {
    pub fn new(delivery: Arc<dyn MessageDelivery>) -> Self {
        Self { delivery }
    }

    /// Never fails as a whole; each recipient's failure is logged and
    /// reported.
    pub async fn dispatch(
        &self,
        groups: &[DeviceAlarmGroup],
        recipients: &HashMap<DeviceId, BTreeSet<RecipientId>>,
    ) -> FanoutReport {
        let by_recipient = group_by_recipient(groups, recipients);

        let deliveries = by_recipient
            .into_iter()
            .map(|(recipient, recipient_groups)| async move {
                let message = formatter::notification_message(&recipient_groups);
                let result = self.delivery.deliver(recipient, &message).await;
                (recipient, recipient_groups.len(), result)
            });

        let mut report = FanoutReport::default();
        for (recipient, group_count, result) in join_all(deliveries).await {
            match result {
                Ok(()) => {
                    tracing::debug!(
                        "Notified chat {} about {} device(s)",
                        recipient,
                        group_count
                    );
                    report.delivered.push(recipient);
                }
                Err(e) => {
                    tracing::warn!(
                        recipient = recipient,
                        devices = group_count,
                        "Failed to deliver alarm notification: {}",
                        e
                    );
                    report.failed.push(recipient);
                }
            }
        }

        report
    }
}
