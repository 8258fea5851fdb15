use super::{Database, Engine};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{types::Json, Executor, Row, Transaction};
use uuid::Uuid;

use crate::{
    api::MeritAPI,
    auth::{Platform, User},
    config::{keys, CommissionPolicy},
    entities::{level_from_performance, ActorType, LevelTier, Performance, UserLevel},
    error::Error,
    gateway::events,
};

/// Window over which recent performance is measured for levels.
const PERFORMANCE_WINDOW_DAYS: i64 = 90;

impl Engine {
    pub(super) async fn load_level(
        &self,
        user_id: &Uuid,
        actor: ActorType,
    ) -> Result<LevelTier, Error> {
        let mut conn = self.pool.acquire().await?;

        let maybe_row = conn
            .fetch_optional(
                sqlx::query("SELECT data FROM user_levels WHERE user_id = $1 AND actor = $2")
                    .bind(user_id)
                    .bind(actor.name()),
            )
            .await?;

        match maybe_row {
            Some(row) => {
                let Json(level): Json<UserLevel> = row.try_get("data")?;
                Ok(level.tier)
            }
            None => Ok(LevelTier::Bronze),
        }
    }

    /// Re-derives the merit level from the trailing performance window and
    /// persists it, announcing changes to the user.
    pub(super) async fn recompute_level(
        &self,
        tx: &mut Transaction<'_, Database>,
        user_id: &Uuid,
        actor: ActorType,
    ) -> Result<LevelTier, Error> {
        let since = Utc::now() - Duration::days(PERFORMANCE_WINDOW_DAYS);
        let role_column = match actor {
            ActorType::Driver => "driver_id",
            ActorType::Passenger => "passenger_id",
        };

        let row = tx
            .fetch_one(
                sqlx::query(&format!(
                    "SELECT COUNT(*) AS total FROM trips
                     WHERE status = 'COMPLETED' AND data->>'{role_column}' = $1
                       AND (data->>'completed_at')::timestamptz >= $2",
                ))
                .bind(user_id.to_string())
                .bind(since),
            )
            .await?;
        let trips_completed: i64 = row.try_get("total")?;

        let cancel_kind = match actor {
            ActorType::Driver => "DRIVER_CANCEL_LATE",
            ActorType::Passenger => "PASSENGER_CANCEL_LATE",
        };
        let no_show_kind = match actor {
            ActorType::Driver => "DRIVER_NO_SHOW",
            ActorType::Passenger => "PASSENGER_NO_SHOW",
        };

        let row = tx
            .fetch_one(
                sqlx::query(
                    "SELECT
                         COUNT(*) FILTER (WHERE kind = $3) AS late_cancels,
                         COUNT(*) FILTER (WHERE kind = $4) AS no_shows,
                         COUNT(*) FILTER (WHERE kind IN ('ROUTE_DEVIATION_MAJOR', 'ENTERED_RED_ZONE', 'TRACKING_LOST_MAJOR')) AS safety_majors
                     FROM score_events
                     WHERE user_id = $1 AND actor = $2 AND created_at >= $5",
                )
                .bind(user_id)
                .bind(actor.name())
                .bind(cancel_kind)
                .bind(no_show_kind)
                .bind(since),
            )
            .await?;

        let perf = Performance {
            trips_completed,
            late_cancels: row.try_get("late_cancels")?,
            no_shows: row.try_get("no_shows")?,
            safety_major_alerts: row.try_get("safety_majors")?,
        };

        let score = self.load_score(user_id, actor).await?;
        let tier = level_from_performance(score.score, &perf, actor);

        let previous = self.load_level(user_id, actor).await?;

        let level = UserLevel {
            user_id: *user_id,
            actor,
            tier,
            updated_at: Utc::now(),
        };

        tx.execute(
            sqlx::query(
                "INSERT INTO user_levels (user_id, actor, data) VALUES ($1, $2, $3)
                 ON CONFLICT (user_id, actor) DO UPDATE SET data = $3",
            )
            .bind(level.user_id)
            .bind(actor.name())
            .bind(Json(&level)),
        )
        .await?;

        if tier != previous {
            self.gateway.emit_user(
                *user_id,
                events::USER_LEVEL_UPDATED,
                serde_json::json!({ "tier": tier.name(), "actor": actor.name() }),
            );
        }

        Ok(tier)
    }
}

#[async_trait]
impl MeritAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn find_level(
        &self,
        user: User,
        user_id: Uuid,
        actor: ActorType,
    ) -> Result<UserLevel, Error> {
        if user.id != user_id {
            self.authorize(user, "read", Platform::default())?;
        }

        let mut conn = self.pool.acquire().await?;

        let maybe_row = conn
            .fetch_optional(
                sqlx::query("SELECT data FROM user_levels WHERE user_id = $1 AND actor = $2")
                    .bind(user_id)
                    .bind(actor.name()),
            )
            .await?;

        match maybe_row {
            Some(row) => {
                let Json(level): Json<UserLevel> = row.try_get("data")?;
                Ok(level)
            }
            None => Ok(UserLevel {
                user_id,
                actor,
                tier: LevelTier::Bronze,
                updated_at: Utc::now(),
            }),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn find_commission_bps(&self, user: User, driver_id: Uuid) -> Result<i64, Error> {
        if user.id != driver_id {
            self.authorize(user, "read", Platform::default())?;
        }

        let policy: CommissionPolicy = self.config.get(keys::COMMISSION).await?;
        let tier = self.load_level(&driver_id, ActorType::Driver).await?;

        Ok(policy.bps_for_tier(tier))
    }
}
