use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    Driver,
    Passenger,
}

impl ActorType {
    pub fn name(&self) -> String {
        match self {
            Self::Driver => "DRIVER".into(),
            Self::Passenger => "PASSENGER".into(),
        }
    }
}

/// Participation status derived from the score, fixed thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreStatus {
    None,
    Warning,
    Limited,
    Blocked,
}

impl ScoreStatus {
    pub fn name(&self) -> String {
        match self {
            Self::None => "NONE".into(),
            Self::Warning => "WARNING".into(),
            Self::Limited => "LIMITED".into(),
            Self::Blocked => "BLOCKED".into(),
        }
    }

    pub fn from_score(score: i64) -> Self {
        if score >= 80 {
            Self::None
        } else if score >= 60 {
            Self::Warning
        } else if score >= 40 {
            Self::Limited
        } else {
            Self::Blocked
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserScore {
    pub user_id: Uuid,
    pub actor: ActorType,
    pub score: i64,
    pub status: ScoreStatus,
    pub last_changed_at: DateTime<Utc>,
}

impl UserScore {
    pub fn new(user_id: Uuid, actor: ActorType) -> Self {
        Self {
            user_id,
            actor,
            score: 100,
            status: ScoreStatus::None,
            last_changed_at: Utc::now(),
        }
    }
}

pub fn clamp_score(score: i64) -> i64 {
    score.clamp(0, 100)
}

/// An auto restriction is created only on a first-time crossing into LIMITED
/// or BLOCKED; re-entering the same band never duplicates it.
pub fn auto_restriction_on_transition(
    previous: ScoreStatus,
    next: ScoreStatus,
) -> Option<ScoreStatus> {
    match next {
        ScoreStatus::Limited
            if previous != ScoreStatus::Limited && previous != ScoreStatus::Blocked =>
        {
            Some(ScoreStatus::Limited)
        }
        ScoreStatus::Blocked if previous != ScoreStatus::Blocked => Some(ScoreStatus::Blocked),
        _ => None,
    }
}

/// Every cause that can move a score, with its ledger tag. Dispatch over
/// these is exhaustive on purpose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreEventKind {
    TripCompletedClean,
    TripRecoveryBonus,
    InactivityRecovery,
    DriverCancelLate,
    DriverNoShow,
    PassengerCancelLate,
    PassengerNoShow,
    EnteredRedZone,
    RouteDeviationMinor,
    RouteDeviationMajor,
    TrackingLostMajor,
    OtpFailedMultiple,
    ManualAdjust,
}

impl ScoreEventKind {
    pub fn name(&self) -> String {
        match self {
            Self::TripCompletedClean => "TRIP_COMPLETED_CLEAN".into(),
            Self::TripRecoveryBonus => "TRIP_RECOVERY_BONUS".into(),
            Self::InactivityRecovery => "INACTIVITY_RECOVERY".into(),
            Self::DriverCancelLate => "DRIVER_CANCEL_LATE".into(),
            Self::DriverNoShow => "DRIVER_NO_SHOW".into(),
            Self::PassengerCancelLate => "PASSENGER_CANCEL_LATE".into(),
            Self::PassengerNoShow => "PASSENGER_NO_SHOW".into(),
            Self::EnteredRedZone => "ENTERED_RED_ZONE".into(),
            Self::RouteDeviationMinor => "ROUTE_DEVIATION_MINOR".into(),
            Self::RouteDeviationMajor => "ROUTE_DEVIATION_MAJOR".into(),
            Self::TrackingLostMajor => "TRACKING_LOST_MAJOR".into(),
            Self::OtpFailedMultiple => "OTP_FAILED_MULTIPLE".into(),
            Self::ManualAdjust => "MANUAL_ADJUST".into(),
        }
    }

    /// Only service failures count against the matching reliability term;
    /// safety and OTP penalties already depress the score itself.
    pub fn counts_against_reliability(&self) -> bool {
        matches!(self, Self::DriverCancelLate | Self::DriverNoShow)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScoreEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub actor: ActorType,
    pub kind: ScoreEventKind,
    pub delta: i64,
    pub trip_id: Option<Uuid>,
    pub safety_alert_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionReason {
    LowScoreAuto,
    Manual,
}

impl RestrictionReason {
    pub fn name(&self) -> String {
        match self {
            Self::LowScoreAuto => "LOW_SCORE_AUTO".into(),
            Self::Manual => "MANUAL".into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserRestriction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub actor: ActorType,
    pub status: ScoreStatus,
    pub reason: RestrictionReason,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
}

impl UserRestriction {
    /// Open-ended restrictions stay active until lifted.
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        match self.ends_at {
            Some(ends_at) => ends_at > at,
            None => true,
        }
    }

    pub fn lift(&mut self) {
        self.ends_at = Some(Utc::now());
    }
}

/// Merit badge shown to the user, derived from score alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeTier {
    Excellent,
    Trusted,
    Watchlist,
    Restricted,
}

impl BadgeTier {
    pub fn name(&self) -> String {
        match self {
            Self::Excellent => "EXCELLENT".into(),
            Self::Trusted => "TRUSTED".into(),
            Self::Watchlist => "WATCHLIST".into(),
            Self::Restricted => "RESTRICTED".into(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Excellent => "Excelente",
            Self::Trusted => "Confiable",
            Self::Watchlist => "En observación",
            Self::Restricted => "Restringido",
        }
    }

    pub fn from_score(score: i64) -> Self {
        if score >= 90 {
            Self::Excellent
        } else if score >= 75 {
            Self::Trusted
        } else if score >= 60 {
            Self::Watchlist
        } else {
            Self::Restricted
        }
    }
}

/// Merit level earned from score plus recent performance; feeds matching
/// bonuses, high-tier reservations and commission discounts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelTier {
    Bronze,
    Silver,
    Gold,
    Diamond,
}

impl LevelTier {
    pub fn name(&self) -> String {
        match self {
            Self::Bronze => "BRONZE".into(),
            Self::Silver => "SILVER".into(),
            Self::Gold => "GOLD".into(),
            Self::Diamond => "DIAMOND".into(),
        }
    }

    pub fn parse(name: &str) -> Self {
        match name {
            "DIAMOND" => Self::Diamond,
            "GOLD" => Self::Gold,
            "SILVER" => Self::Silver,
            _ => Self::Bronze,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserLevel {
    pub user_id: Uuid,
    pub actor: ActorType,
    pub tier: LevelTier,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserBadge {
    pub user_id: Uuid,
    pub actor: ActorType,
    pub badge: BadgeTier,
    pub label: String,
    pub updated_at: DateTime<Utc>,
}

/// Recent performance window used for level derivation.
#[derive(Clone, Copy, Debug, Default)]
pub struct Performance {
    pub trips_completed: i64,
    pub late_cancels: i64,
    pub no_shows: i64,
    pub safety_major_alerts: i64,
}

impl Performance {
    pub fn cancel_rate(&self) -> f64 {
        let total = self.trips_completed + self.late_cancels + self.no_shows;
        if total == 0 {
            0.0
        } else {
            self.late_cancels as f64 / total as f64
        }
    }
}

pub fn level_from_performance(score: i64, perf: &Performance, actor: ActorType) -> LevelTier {
    let passenger = actor == ActorType::Passenger;
    let cancel_rate = perf.cancel_rate();

    let diamond = score >= 92
        && perf.trips_completed >= if passenger { 80 } else { 150 }
        && cancel_rate < if passenger { 0.04 } else { 0.03 }
        && (passenger || (perf.safety_major_alerts == 0 && perf.no_shows == 0));
    if diamond {
        return LevelTier::Diamond;
    }

    let gold = score >= 85
        && perf.trips_completed >= 80
        && cancel_rate < if passenger { 0.06 } else { 0.05 }
        && (passenger || perf.safety_major_alerts == 0);
    if gold {
        return LevelTier::Gold;
    }

    let silver = score >= 75
        && perf.trips_completed >= 30
        && cancel_rate < if passenger { 0.10 } else { 0.08 };
    if silver {
        return LevelTier::Silver;
    }

    LevelTier::Bronze
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn reliability_counts_service_failures_only() {
        assert!(ScoreEventKind::DriverCancelLate.counts_against_reliability());
        assert!(ScoreEventKind::DriverNoShow.counts_against_reliability());

        assert!(!ScoreEventKind::EnteredRedZone.counts_against_reliability());
        assert!(!ScoreEventKind::RouteDeviationMajor.counts_against_reliability());
        assert!(!ScoreEventKind::TrackingLostMajor.counts_against_reliability());
        assert!(!ScoreEventKind::OtpFailedMultiple.counts_against_reliability());
    }

    #[test]
    fn score_stays_clamped_for_any_event_sequence() {
        let deltas = [-30, -50, -40, 5, 200, -500, 7, 100];
        let mut score = 100i64;
        for delta in deltas {
            score = clamp_score(score + delta);
            assert!((0..=100).contains(&score));
        }
    }

    #[test]
    fn status_thresholds() {
        assert_eq!(ScoreStatus::from_score(100), ScoreStatus::None);
        assert_eq!(ScoreStatus::from_score(80), ScoreStatus::None);
        assert_eq!(ScoreStatus::from_score(79), ScoreStatus::Warning);
        assert_eq!(ScoreStatus::from_score(60), ScoreStatus::Warning);
        assert_eq!(ScoreStatus::from_score(59), ScoreStatus::Limited);
        assert_eq!(ScoreStatus::from_score(40), ScoreStatus::Limited);
        assert_eq!(ScoreStatus::from_score(39), ScoreStatus::Blocked);
        assert_eq!(ScoreStatus::from_score(0), ScoreStatus::Blocked);
    }

    #[test]
    fn restriction_created_only_on_first_crossing() {
        use ScoreStatus::*;

        assert_eq!(auto_restriction_on_transition(None, Limited), Some(Limited));
        assert_eq!(
            auto_restriction_on_transition(Warning, Blocked),
            Some(Blocked)
        );
        assert_eq!(
            auto_restriction_on_transition(Limited, Blocked),
            Some(Blocked)
        );
        // already in the band: no duplicate
        assert_eq!(auto_restriction_on_transition(Limited, Limited), Option::None);
        assert_eq!(auto_restriction_on_transition(Blocked, Blocked), Option::None);
        // blocked falling "up" into limited is not a crossing
        assert_eq!(auto_restriction_on_transition(Blocked, Limited), Option::None);
        assert_eq!(auto_restriction_on_transition(Warning, Warning), Option::None);
    }

    #[test]
    fn lifted_restriction_is_no_longer_active() {
        let mut restriction = UserRestriction {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            actor: ActorType::Driver,
            status: ScoreStatus::Blocked,
            reason: RestrictionReason::LowScoreAuto,
            starts_at: Utc::now() - Duration::hours(1),
            ends_at: None,
            notes: None,
            created_by: None,
        };

        assert!(restriction.is_active_at(Utc::now()));
        restriction.lift();
        assert!(!restriction.is_active_at(Utc::now() + Duration::seconds(1)));
    }

    #[test]
    fn badge_tiers_follow_thresholds() {
        assert_eq!(BadgeTier::from_score(95), BadgeTier::Excellent);
        assert_eq!(BadgeTier::from_score(80), BadgeTier::Trusted);
        assert_eq!(BadgeTier::from_score(65), BadgeTier::Watchlist);
        assert_eq!(BadgeTier::from_score(30), BadgeTier::Restricted);
    }

    #[test]
    fn driver_level_requires_clean_safety_record() {
        let perf = Performance {
            trips_completed: 200,
            late_cancels: 1,
            no_shows: 0,
            safety_major_alerts: 1,
        };
        // gold/diamond blocked by the major alert, silver still reachable
        assert_eq!(
            level_from_performance(95, &perf, ActorType::Driver),
            LevelTier::Silver
        );

        let clean = Performance {
            safety_major_alerts: 0,
            ..perf
        };
        assert_eq!(
            level_from_performance(95, &clean, ActorType::Driver),
            LevelTier::Diamond
        );
    }

    #[test]
    fn low_volume_driver_stays_bronze() {
        let perf = Performance {
            trips_completed: 3,
            ..Default::default()
        };
        assert_eq!(
            level_from_performance(99, &perf, ActorType::Driver),
            LevelTier::Bronze
        );
    }
}
