use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Postgres};

use crate::entities::LevelTier;
use crate::error::Error;

/// Typed access to the `app_config` table. Every policy struct carries a
/// hardcoded default so a missing or malformed row never takes the engine
/// down; the row only needs to exist to override.
#[derive(Clone)]
pub struct ConfigStore {
    pool: Pool<Postgres>,
}

impl ConfigStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self))]
    pub async fn get<T>(&self, key: &str) -> Result<T, Error>
    where
        T: DeserializeOwned + Default,
    {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT value FROM app_config WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        let value = match row {
            Some((value,)) => value,
            None => return Ok(T::default()),
        };

        match serde_json::from_value(value) {
            Ok(parsed) => Ok(parsed),
            Err(err) => {
                tracing::warn!(key, %err, "malformed config value, using default");
                Ok(T::default())
            }
        }
    }

    #[tracing::instrument(skip(self, value))]
    pub async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO app_config (key, value, updated_at) VALUES ($1, $2, now())
             ON CONFLICT (key) DO UPDATE SET value = $2, updated_at = now()",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

pub mod keys {
    pub const MATCHING_WEIGHTS: &str = "matching_weights";
    pub const PREMIUM_PREFERENCE: &str = "premium_preference";
    pub const DYNAMIC_TOP_N: &str = "dynamic_top_n";
    pub const PEAK_HOURS: &str = "peak_hours";
    pub const COOLDOWN_POLICY: &str = "cooldown_policy";
    pub const RECOVERY_POLICY: &str = "recovery_policy";
    pub const RECOVERY_RULES: &str = "recovery_rules";
    pub const COMMISSION: &str = "commission";
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TierBonus {
    pub bronze: f64,
    pub silver: f64,
    pub gold: f64,
    pub diamond: f64,
}

impl TierBonus {
    pub fn for_tier(&self, tier: LevelTier) -> f64 {
        match tier {
            LevelTier::Bronze => self.bronze,
            LevelTier::Silver => self.silver,
            LevelTier::Gold => self.gold,
            LevelTier::Diamond => self.diamond,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingWeights {
    pub w_score: f64,
    pub w_distance: f64,
    pub w_reliability: f64,
    pub w_status: f64,
    pub w_peak: f64,
    pub w_zone: f64,
    pub w_tier: f64,
    pub limited_penalty: f64,
    pub tier_bonus: TierBonus,
}

impl Default for MatchingWeights {
    fn default() -> Self {
        Self {
            w_score: 0.45,
            w_distance: 0.35,
            w_reliability: 0.15,
            w_status: 0.05,
            w_peak: 0.10,
            w_zone: 0.10,
            w_tier: 0.05,
            limited_penalty: 0.10,
            tier_bonus: TierBonus {
                bronze: 0.05,
                silver: 0.15,
                gold: 0.30,
                diamond: 0.45,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PremiumPreference {
    pub base_bonus: f64,
    pub eligible_additive_bonus: TierBonus,
    pub ineligible_penalty: f64,
}

impl Default for PremiumPreference {
    fn default() -> Self {
        Self {
            base_bonus: 0.5,
            eligible_additive_bonus: TierBonus {
                bronze: 0.02,
                silver: 0.05,
                gold: 0.10,
                diamond: 0.15,
            },
            ineligible_penalty: 0.05,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicTopN {
    pub base: usize,
    pub peak_add: usize,
    pub premium_zone_add: usize,
    pub restricted_passenger_cap: usize,
    pub min: usize,
    pub max: usize,
    pub limited_max_share: f64,
    pub reserve_gold: usize,
    pub reserve_diamond: usize,
}

impl Default for DynamicTopN {
    fn default() -> Self {
        Self {
            base: 15,
            peak_add: 5,
            premium_zone_add: 3,
            restricted_passenger_cap: 10,
            min: 8,
            max: 25,
            limited_max_share: 0.30,
            reserve_gold: 2,
            reserve_diamond: 1,
        }
    }
}

/// One recurring peak window. `end` before `start` wraps past midnight.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeakWindow {
    /// Weekday numbers, Monday = 1 through Sunday = 7.
    pub days: Vec<u32>,
    pub start: String,
    pub end: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakHours {
    pub windows: Vec<PeakWindow>,
    pub driver_min_score: i64,
    pub passenger_min_score: i64,
}

impl Default for PeakHours {
    fn default() -> Self {
        Self {
            windows: vec![
                PeakWindow {
                    days: vec![1, 2, 3, 4, 5],
                    start: "06:30".into(),
                    end: "09:00".into(),
                },
                PeakWindow {
                    days: vec![1, 2, 3, 4, 5],
                    start: "17:00".into(),
                    end: "20:00".into(),
                },
                PeakWindow {
                    days: vec![5, 6],
                    start: "21:00".into(),
                    end: "02:00".into(),
                },
            ],
            driver_min_score: 50,
            passenger_min_score: 45,
        }
    }
}

fn parse_hhmm(value: &str) -> Option<u32> {
    let (h, m) = value.split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

impl PeakHours {
    pub fn is_peak_at(&self, at: DateTime<Utc>) -> bool {
        let day = at.weekday().number_from_monday();
        let minute = at.hour() * 60 + at.minute();

        self.windows.iter().any(|w| {
            let (start, end) = match (parse_hhmm(&w.start), parse_hhmm(&w.end)) {
                (Some(s), Some(e)) => (s, e),
                _ => return false,
            };

            if start <= end {
                w.days.contains(&day) && minute >= start && minute < end
            } else {
                // wraps past midnight: the early-morning side belongs to the
                // window that started the previous day
                let prev_day = if day == 1 { 7 } else { day - 1 };
                (w.days.contains(&day) && minute >= start)
                    || (w.days.contains(&prev_day) && minute < end)
            }
        })
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownPolicy {
    pub driver_limited_hours: i64,
    pub driver_blocked_hours: i64,
    pub passenger_limited_hours: i64,
    pub passenger_blocked_hours: i64,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self {
            driver_limited_hours: 6,
            driver_blocked_hours: 24,
            passenger_limited_hours: 3,
            passenger_blocked_hours: 12,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RecoveryLimits {
    pub cooldown_hours: i64,
    pub max_per_day: i64,
    pub score_cap: i64,
    pub max_per_week: i64,
}

impl RecoveryLimits {
    /// Delta for one inactivity-recovery tick, or None when the user is not
    /// eligible right now.
    pub fn tick_delta(
        &self,
        score: i64,
        last_changed_at: DateTime<Utc>,
        blocked: bool,
        taken_today: i64,
        taken_this_week: i64,
        now: DateTime<Utc>,
    ) -> Option<i64> {
        if blocked || score >= self.score_cap {
            return None;
        }
        if now - last_changed_at < chrono::Duration::hours(self.cooldown_hours) {
            return None;
        }
        if taken_today >= self.max_per_day || taken_this_week >= self.max_per_week {
            return None;
        }

        Some((self.score_cap - score).min(1))
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryPolicy {
    pub driver: RecoveryLimits,
    pub passenger: RecoveryLimits,
    pub min_tick_gap_hours: i64,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            driver: RecoveryLimits {
                cooldown_hours: 12,
                max_per_day: 2,
                score_cap: 88,
                max_per_week: 10,
            },
            passenger: RecoveryLimits {
                cooldown_hours: 8,
                max_per_day: 1,
                score_cap: 84,
                max_per_week: 6,
            },
            min_tick_gap_hours: 24,
        }
    }
}

/// Clean-completion recovery applied when trips finish without incident.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryRules {
    pub limited_clean_trips: i64,
    pub limited_bonus: i64,
    pub blocked_clean_trips: i64,
    pub daily_cap: i64,
}

impl Default for RecoveryRules {
    fn default() -> Self {
        Self {
            limited_clean_trips: 5,
            limited_bonus: 5,
            blocked_clean_trips: 3,
            daily_cap: 6,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CommissionPolicy {
    pub default_bps: i64,
    pub floor_bps: i64,
    pub bronze_discount_bps: i64,
    pub silver_discount_bps: i64,
    pub gold_discount_bps: i64,
    pub diamond_discount_bps: i64,
}

impl Default for CommissionPolicy {
    fn default() -> Self {
        Self {
            default_bps: 1000,
            floor_bps: 200,
            bronze_discount_bps: 0,
            silver_discount_bps: 100,
            gold_discount_bps: 250,
            diamond_discount_bps: 400,
        }
    }
}

impl CommissionPolicy {
    pub fn bps_for_tier(&self, tier: LevelTier) -> i64 {
        let discount = match tier {
            LevelTier::Bronze => self.bronze_discount_bps,
            LevelTier::Silver => self.silver_discount_bps,
            LevelTier::Gold => self.gold_discount_bps,
            LevelTier::Diamond => self.diamond_discount_bps,
        };
        (self.default_bps - discount).max(self.floor_bps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn recovery_tick_honors_every_limit() {
        let limits = RecoveryPolicy::default().driver;
        let now = Utc.with_ymd_and_hms(2026, 3, 3, 12, 0, 0).unwrap();
        let idle_since = now - chrono::Duration::hours(limits.cooldown_hours);

        assert_eq!(limits.tick_delta(55, idle_since, false, 0, 0, now), Some(1));

        // blocked users never tick
        assert_eq!(limits.tick_delta(55, idle_since, true, 0, 0, now), None);
        // already at the cap
        assert_eq!(
            limits.tick_delta(limits.score_cap, idle_since, false, 0, 0, now),
            None
        );
        // score moved too recently
        assert_eq!(
            limits.tick_delta(55, now - chrono::Duration::hours(1), false, 0, 0, now),
            None
        );
        // daily and weekly budgets spent
        assert_eq!(
            limits.tick_delta(55, idle_since, false, limits.max_per_day, 0, now),
            None
        );
        assert_eq!(
            limits.tick_delta(55, idle_since, false, 0, limits.max_per_week, now),
            None
        );
    }

    #[test]
    fn recovery_tick_never_overshoots_the_cap() {
        let limits = RecoveryPolicy::default().driver;
        let now = Utc.with_ymd_and_hms(2026, 3, 3, 12, 0, 0).unwrap();
        let idle_since = now - chrono::Duration::hours(limits.cooldown_hours);

        assert_eq!(
            limits.tick_delta(limits.score_cap - 1, idle_since, false, 0, 0, now),
            Some(1)
        );
    }

    #[test]
    fn peak_window_matches_inside_hours() {
        let peak = PeakHours::default();

        // Tuesday 07:30
        let morning = Utc.with_ymd_and_hms(2026, 3, 3, 7, 30, 0).unwrap();
        assert!(peak.is_peak_at(morning));

        // Tuesday 12:00
        let noon = Utc.with_ymd_and_hms(2026, 3, 3, 12, 0, 0).unwrap();
        assert!(!peak.is_peak_at(noon));
    }

    #[test]
    fn wraparound_window_covers_early_morning_of_next_day() {
        let peak = PeakHours::default();

        // Friday 23:00 falls in the 21:00-02:00 window
        let friday_night = Utc.with_ymd_and_hms(2026, 3, 6, 23, 0, 0).unwrap();
        assert!(peak.is_peak_at(friday_night));

        // Sunday 01:30 belongs to Saturday's window
        let sunday_early = Utc.with_ymd_and_hms(2026, 3, 8, 1, 30, 0).unwrap();
        assert!(peak.is_peak_at(sunday_early));

        // Monday 01:30 does not: Sunday has no night window
        let monday_early = Utc.with_ymd_and_hms(2026, 3, 9, 1, 30, 0).unwrap();
        assert!(!peak.is_peak_at(monday_early));
    }

    #[test]
    fn partial_config_rows_fill_in_defaults() {
        let weights: MatchingWeights =
            serde_json::from_value(serde_json::json!({ "w_score": 0.6 })).unwrap();
        assert_eq!(weights.w_score, 0.6);
        assert_eq!(weights.w_distance, 0.35);
        assert_eq!(weights.tier_bonus.diamond, 0.45);
    }

    #[test]
    fn commission_never_drops_below_floor() {
        let policy = CommissionPolicy {
            diamond_discount_bps: 950,
            ..Default::default()
        };
        assert_eq!(policy.bps_for_tier(LevelTier::Diamond), 200);
        assert_eq!(policy.bps_for_tier(LevelTier::Bronze), 1000);
        assert_eq!(policy.bps_for_tier(LevelTier::Silver), 900);
    }
}
