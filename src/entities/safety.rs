use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::zone::ZoneType;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationLevel {
    None,
    Minor,
    Major,
}

impl DeviationLevel {
    pub fn name(&self) -> String {
        match self {
            Self::None => "NONE".into(),
            Self::Minor => "MINOR".into(),
            Self::Major => "MAJOR".into(),
        }
    }
}

/// Per-trip safety score and the last observations the monitor compares
/// against. The score only ever goes down; recovery is not a concept here.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TripSafetyState {
    pub trip_id: Uuid,
    pub safety_score: i64,
    pub deviation_level: DeviationLevel,
    pub last_zone_type: Option<ZoneType>,
    pub last_location_at: Option<DateTime<Utc>>,
}

impl TripSafetyState {
    pub fn new(trip_id: Uuid) -> Self {
        Self {
            trip_id,
            safety_score: 100,
            deviation_level: DeviationLevel::None,
            last_zone_type: None,
            last_location_at: None,
        }
    }

    /// Applies a penalty and reports which floors were crossed by this
    /// particular decrement, so each side effect fires at most once.
    pub fn deplete(&mut self, penalty: i64) -> Vec<SafetyFloor> {
        let before = self.safety_score;
        self.safety_score = (self.safety_score - penalty.abs()).max(0);

        SafetyFloor::ALL
            .iter()
            .copied()
            .filter(|floor| before > floor.threshold() && self.safety_score <= floor.threshold())
            .collect()
    }
}

/// Escalating floors of the per-trip safety score.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SafetyFloor {
    CheckinRequired,
    SosSuggested,
    TripFlagged,
}

impl SafetyFloor {
    pub const ALL: [SafetyFloor; 3] = [
        SafetyFloor::CheckinRequired,
        SafetyFloor::SosSuggested,
        SafetyFloor::TripFlagged,
    ];

    pub fn threshold(&self) -> i64 {
        match self {
            Self::CheckinRequired => 70,
            Self::SosSuggested => 50,
            Self::TripFlagged => 35,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyAlertKind {
    EnteredRedZone,
    EnteredCautionZone,
    RouteDeviationMinor,
    RouteDeviationMajor,
    TrackingLost,
    OtpFailedMultiple,
    SosSuggested,
}

impl SafetyAlertKind {
    pub fn name(&self) -> String {
        match self {
            Self::EnteredRedZone => "ENTERED_RED_ZONE".into(),
            Self::EnteredCautionZone => "ENTERED_CAUTION_ZONE".into(),
            Self::RouteDeviationMinor => "ROUTE_DEVIATION_MINOR".into(),
            Self::RouteDeviationMajor => "ROUTE_DEVIATION_MAJOR".into(),
            Self::TrackingLost => "TRACKING_LOST".into(),
            Self::OtpFailedMultiple => "OTP_FAILED_MULTIPLE".into(),
            Self::SosSuggested => "SOS_SUGGESTED".into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyAlertStatus {
    Open,
    Acknowledged,
    Resolved,
    Dismissed,
}

impl SafetyAlertStatus {
    pub fn name(&self) -> String {
        match self {
            Self::Open => "OPEN".into(),
            Self::Acknowledged => "ACKNOWLEDGED".into(),
            Self::Resolved => "RESOLVED".into(),
            Self::Dismissed => "DISMISSED".into(),
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "OPEN" => Some(Self::Open),
            "ACKNOWLEDGED" => Some(Self::Acknowledged),
            "RESOLVED" => Some(Self::Resolved),
            "DISMISSED" => Some(Self::Dismissed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SafetyAlert {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub kind: SafetyAlertKind,
    pub severity: i16,
    pub status: SafetyAlertStatus,
    pub message: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<Uuid>,
}

impl SafetyAlert {
    pub fn new(
        trip_id: Uuid,
        kind: SafetyAlertKind,
        severity: i16,
        message: String,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            trip_id,
            kind,
            severity,
            status: SafetyAlertStatus::Open,
            message,
            payload,
            created_at: Utc::now(),
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            resolved_by: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deplete_reports_each_floor_once() {
        let mut state = TripSafetyState::new(Uuid::new_v4());

        let crossed = state.deplete(25);
        assert_eq!(state.safety_score, 75);
        assert!(crossed.is_empty());

        let crossed = state.deplete(10);
        assert_eq!(state.safety_score, 65);
        assert_eq!(crossed, vec![SafetyFloor::CheckinRequired]);

        // still below 70: no repeat
        let crossed = state.deplete(5);
        assert!(crossed.is_empty());

        let crossed = state.deplete(30);
        assert_eq!(state.safety_score, 30);
        assert_eq!(
            crossed,
            vec![SafetyFloor::SosSuggested, SafetyFloor::TripFlagged]
        );
    }

    #[test]
    fn safety_score_floors_at_zero() {
        let mut state = TripSafetyState::new(Uuid::new_v4());
        state.deplete(250);
        assert_eq!(state.safety_score, 0);
    }
}
