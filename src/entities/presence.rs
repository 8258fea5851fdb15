use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::Coordinates;

/// A heartbeat older than this no longer counts as online for matching.
pub const PRESENCE_FRESHNESS_SECS: i64 = 30;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriverPresence {
    pub driver_id: Uuid,
    pub is_online: bool,
    #[serde(default)]
    pub is_limited: bool,
    pub last_lat: Option<f64>,
    pub last_lng: Option<f64>,
    pub vehicle_category: Option<String>,
    pub last_seen_at: DateTime<Utc>,
}

impl DriverPresence {
    pub fn location(&self) -> Option<Coordinates> {
        match (self.last_lat, self.last_lng) {
            (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
            _ => None,
        }
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.is_online && now - self.last_seen_at <= Duration::seconds(PRESENCE_FRESHNESS_SECS)
    }

    /// A driver only receives requests for the category they declared.
    pub fn serves_category(&self, category: &str) -> bool {
        self.vehicle_category.as_deref() == Some(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presence(seconds_ago: i64, online: bool) -> DriverPresence {
        DriverPresence {
            driver_id: Uuid::new_v4(),
            is_online: online,
            is_limited: false,
            last_lat: Some(4.6),
            last_lng: Some(-74.08),
            vehicle_category: None,
            last_seen_at: Utc::now() - Duration::seconds(seconds_ago),
        }
    }

    #[test]
    fn stale_heartbeat_is_not_fresh() {
        let now = Utc::now();
        assert!(presence(10, true).is_fresh_at(now));
        assert!(!presence(PRESENCE_FRESHNESS_SECS + 1, true).is_fresh_at(now));
    }

    #[test]
    fn offline_driver_is_never_fresh() {
        assert!(!presence(1, false).is_fresh_at(Utc::now()));
    }

    #[test]
    fn category_must_match_exactly() {
        let mut driver = presence(1, true);

        driver.vehicle_category = Some("premium".into());
        assert!(driver.serves_category("premium"));
        assert!(!driver.serves_category("standard"));

        driver.vehicle_category = None;
        assert!(!driver.serves_category("standard"));
    }
}
