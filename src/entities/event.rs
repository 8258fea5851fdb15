use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only audit row for everything that happens to a trip.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TripEvent {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl TripEvent {
    pub fn new(
        trip_id: Uuid,
        actor_user_id: Option<Uuid>,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            trip_id,
            actor_user_id,
            event_type: event_type.to_string(),
            payload,
            created_at: Utc::now(),
        }
    }
}
