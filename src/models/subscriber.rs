use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::DeviceId;

/// Chat identity that receives notifications.
pub type RecipientId = i64;

/// Stored monitoring-API credentials of an authorized chat.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscriber {
    pub recipient_id: RecipientId,
    pub login: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub recipient_id: RecipientId,
    pub device_ids: Vec<DeviceId>,
}
