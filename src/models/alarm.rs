use std::hash::{Hash, Hasher};

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub type LimitId = i64;

/// Rendering format for latch timestamps.
pub const LATCH_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Year the far-future end of the alarm window is moved to.
const WINDOW_END_YEAR: i32 = 2199;

/// A limit-criterion trigger reported by the monitoring API.
///
/// Two events are the same event when their `(limit_id, latch_dt)` pair
/// matches, whatever the message says.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmEvent {
    pub limit_id: LimitId,
    #[serde(with = "latch_dt")]
    pub latch_dt: NaiveDateTime,
    pub latch_message: String,
}

impl AlarmEvent {
    pub fn identity(&self) -> AlarmIdentity {
        AlarmIdentity {
            limit_id: self.limit_id,
            latch_dt: self.latch_dt,
        }
    }

    /// Message text up to the first `(`, trimmed.
    ///
    /// The API appends location details in parentheses, e.g.
    /// `"Leak detected (Storage 2)"`.
    pub fn kind(&self) -> &str {
        self.latch_message
            .split('(')
            .next()
            .unwrap_or_default()
            .trim()
    }
}

impl PartialEq for AlarmEvent {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for AlarmEvent {}

impl Hash for AlarmEvent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

/// Dedup key of an alarm event, also the persisted notified record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, FromRow)]
pub struct AlarmIdentity {
    pub limit_id: LimitId,
    pub latch_dt: NaiveDateTime,
}

/// Time range requested from the alarm history endpoint.
///
/// `start` doubles as the retention boundary of notified records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl AlarmWindow {
    /// Yesterday 00:00:00 in `now`'s timezone through a far-future sentinel.
    pub fn trailing<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        let yesterday = now.date_naive() - Days::new(1);
        let start = yesterday.and_time(NaiveTime::MIN);
        let end = start.with_year(WINDOW_END_YEAR).unwrap_or_else(|| {
            NaiveDate::from_ymd_opt(WINDOW_END_YEAR, 1, 1)
                .unwrap_or(NaiveDate::MAX)
                .and_time(NaiveTime::MIN)
        });
        Self { start, end }
    }
}

mod latch_dt {
    use chrono::NaiveDateTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    use super::LATCH_FORMAT;

    const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(LATCH_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, LATCH_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(&raw, ISO_FORMAT))
            .map_err(|e| de::Error::custom(format!("invalid latch_dt {raw:?}: {e}")))
    }
}
