use super::helpers::{
    fetch_active_restrictions, fetch_score_for_update, insert_restriction, insert_score_event,
    update_score,
};
use super::{Database, Engine};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{types::Json, Acquire, Executor, Row, Transaction};
use uuid::Uuid;

use crate::{
    api::ScoreAPI,
    auth::{Platform, User},
    config::{keys, CooldownPolicy, RecoveryLimits, RecoveryPolicy},
    entities::{
        auto_restriction_on_transition, clamp_score, ActorType, BadgeTier, RestrictionReason,
        ScoreEvent, ScoreEventKind, ScoreStatus, UserBadge, UserRestriction, UserScore,
    },
    error::{not_found_error, rate_limited_error, Error},
    gateway::events,
};

impl Engine {
    /// Applies a score delta inside the caller's transaction: clamps the
    /// score, writes the ledger row, opens an auto restriction on a
    /// first-time crossing into LIMITED or BLOCKED, and refreshes the badge.
    #[tracing::instrument(skip(self, tx, payload))]
    pub(super) async fn apply_score_event(
        &self,
        tx: &mut Transaction<'_, Database>,
        user_id: Uuid,
        actor: ActorType,
        kind: ScoreEventKind,
        delta: i64,
        trip_id: Option<Uuid>,
        safety_alert_id: Option<Uuid>,
        payload: serde_json::Value,
    ) -> Result<UserScore, Error> {
        let mut score = fetch_score_for_update(tx, &user_id, actor).await?;

        let previous_status = score.status;
        let previous_badge = BadgeTier::from_score(score.score);

        score.score = clamp_score(score.score + delta);
        score.status = ScoreStatus::from_score(score.score);
        score.last_changed_at = Utc::now();

        update_score(tx, &score).await?;

        let event = ScoreEvent {
            id: Uuid::new_v4(),
            user_id,
            actor,
            kind,
            delta,
            trip_id,
            safety_alert_id,
            payload,
            created_at: Utc::now(),
        };
        insert_score_event(tx, &event).await?;

        if let Some(band) = auto_restriction_on_transition(previous_status, score.status) {
            self.open_auto_restriction(tx, &score, band).await?;
        }

        let badge = BadgeTier::from_score(score.score);
        if badge != previous_badge {
            self.refresh_badge(tx, &score, badge).await?;
        }

        Ok(score)
    }

    async fn open_auto_restriction(
        &self,
        tx: &mut Transaction<'_, Database>,
        score: &UserScore,
        band: ScoreStatus,
    ) -> Result<(), Error> {
        let cooldown: CooldownPolicy = self.config.get(keys::COOLDOWN_POLICY).await?;

        let hours = match (score.actor, band) {
            (ActorType::Driver, ScoreStatus::Blocked) => cooldown.driver_blocked_hours,
            (ActorType::Driver, _) => cooldown.driver_limited_hours,
            (ActorType::Passenger, ScoreStatus::Blocked) => cooldown.passenger_blocked_hours,
            (ActorType::Passenger, _) => cooldown.passenger_limited_hours,
        };

        let now = Utc::now();
        let restriction = UserRestriction {
            id: Uuid::new_v4(),
            user_id: score.user_id,
            actor: score.actor,
            status: band,
            reason: RestrictionReason::LowScoreAuto,
            starts_at: now,
            ends_at: Some(now + Duration::hours(hours)),
            notes: None,
            created_by: None,
        };

        insert_restriction(tx, &restriction).await?;

        let event = match score.actor {
            ActorType::Driver => events::DRIVER_RESTRICTION_UPDATED,
            ActorType::Passenger => events::PASSENGER_RESTRICTION_UPDATED,
        };
        self.gateway.emit_user(
            score.user_id,
            event,
            serde_json::json!({
                "restriction_id": restriction.id,
                "status": band.name(),
                "ends_at": restriction.ends_at,
            }),
        );

        Ok(())
    }

    async fn refresh_badge(
        &self,
        tx: &mut Transaction<'_, Database>,
        score: &UserScore,
        badge: BadgeTier,
    ) -> Result<(), Error> {
        let record = UserBadge {
            user_id: score.user_id,
            actor: score.actor,
            badge,
            label: badge.label().to_string(),
            updated_at: Utc::now(),
        };

        tx.execute(
            sqlx::query(
                "INSERT INTO user_badges (user_id, actor, data) VALUES ($1, $2, $3)
                 ON CONFLICT (user_id, actor) DO UPDATE SET data = $3",
            )
            .bind(record.user_id)
            .bind(record.actor.name())
            .bind(Json(&record)),
        )
        .await?;

        self.gateway.emit_user(
            score.user_id,
            events::USER_BADGE_UPDATED,
            serde_json::json!({
                "badge": badge.name(),
                "label": badge.label(),
            }),
        );

        Ok(())
    }

    /// Loads the stored score without creating the row; unknown users get the
    /// pristine default.
    pub(super) async fn load_score(
        &self,
        user_id: &Uuid,
        actor: ActorType,
    ) -> Result<UserScore, Error> {
        let mut conn = self.pool.acquire().await?;

        let maybe_row = conn
            .fetch_optional(
                sqlx::query("SELECT data FROM user_scores WHERE user_id = $1 AND actor = $2")
                    .bind(user_id)
                    .bind(actor.name()),
            )
            .await?;

        match maybe_row {
            Some(row) => {
                let Json(score): Json<UserScore> = row.try_get("data")?;
                Ok(score)
            }
            None => Ok(UserScore::new(*user_id, actor)),
        }
    }

    /// One inactivity-recovery tick, Ok(None) when the user is not eligible.
    /// Runs when a driver comes online and behind the explicit recovery
    /// endpoint.
    pub(super) async fn inactivity_recovery_tick(
        &self,
        user_id: &Uuid,
        actor: ActorType,
    ) -> Result<Option<UserScore>, Error> {
        let policy: RecoveryPolicy = self.config.get(keys::RECOVERY_POLICY).await?;
        let limits: RecoveryLimits = match actor {
            ActorType::Driver => policy.driver,
            ActorType::Passenger => policy.passenger,
        };

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let now = Utc::now();

        let blocked = fetch_active_restrictions(&mut tx, user_id, actor, now)
            .await?
            .into_iter()
            .any(|r| r.status == ScoreStatus::Blocked);

        let score = fetch_score_for_update(&mut tx, user_id, actor).await?;

        let taken_today = self
            .count_score_events_since(
                &mut tx,
                user_id,
                actor,
                ScoreEventKind::InactivityRecovery,
                now - Duration::hours(policy.min_tick_gap_hours),
            )
            .await?;
        let taken_this_week = self
            .count_score_events_since(
                &mut tx,
                user_id,
                actor,
                ScoreEventKind::InactivityRecovery,
                now - Duration::days(7),
            )
            .await?;

        let delta = match limits.tick_delta(
            score.score,
            score.last_changed_at,
            blocked,
            taken_today,
            taken_this_week,
            now,
        ) {
            Some(delta) => delta,
            None => {
                tx.commit().await?;
                return Ok(None);
            }
        };

        let score = self
            .apply_score_event(
                &mut tx,
                *user_id,
                actor,
                ScoreEventKind::InactivityRecovery,
                delta,
                None,
                None,
                serde_json::json!({}),
            )
            .await?;

        tx.commit().await?;

        Ok(Some(score))
    }

    pub(super) async fn count_score_events_since(
        &self,
        tx: &mut Transaction<'_, Database>,
        user_id: &Uuid,
        actor: ActorType,
        kind: ScoreEventKind,
        since: DateTime<Utc>,
    ) -> Result<i64, Error> {
        let row = tx
            .fetch_one(
                sqlx::query(
                    "SELECT COUNT(*) AS total FROM score_events
                     WHERE user_id = $1 AND actor = $2 AND kind = $3 AND created_at >= $4",
                )
                .bind(user_id)
                .bind(actor.name())
                .bind(kind.name())
                .bind(since),
            )
            .await?;

        Ok(row.try_get("total")?)
    }
}

#[async_trait]
impl ScoreAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn find_score(
        &self,
        user: User,
        user_id: Uuid,
        actor: ActorType,
    ) -> Result<UserScore, Error> {
        if user.id != user_id {
            self.authorize(user, "read", Platform::default())?;
        }

        self.load_score(&user_id, actor).await
    }

    #[tracing::instrument(skip(self))]
    async fn adjust_score(
        &self,
        user: User,
        user_id: Uuid,
        actor: ActorType,
        delta: i64,
        notes: Option<String>,
    ) -> Result<UserScore, Error> {
        self.authorize(user.clone(), "adjust_score", Platform::default())?;

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let score = self
            .apply_score_event(
                &mut tx,
                user_id,
                actor,
                ScoreEventKind::ManualAdjust,
                delta,
                None,
                None,
                serde_json::json!({ "notes": notes, "adjusted_by": user.id }),
            )
            .await?;

        tx.commit().await?;

        Ok(score)
    }

    #[tracing::instrument(skip(self))]
    async fn find_badge(
        &self,
        user: User,
        user_id: Uuid,
        actor: ActorType,
    ) -> Result<UserBadge, Error> {
        if user.id != user_id {
            self.authorize(user, "read", Platform::default())?;
        }

        let score = self.load_score(&user_id, actor).await?;
        let badge = BadgeTier::from_score(score.score);

        Ok(UserBadge {
            user_id,
            actor,
            badge,
            label: badge.label().to_string(),
            updated_at: score.last_changed_at,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn list_restrictions(
        &self,
        user: User,
        user_id: Uuid,
    ) -> Result<Vec<UserRestriction>, Error> {
        if user.id != user_id {
            self.authorize(user, "manage_restrictions", Platform::default())?;
        }

        let mut conn = self.pool.acquire().await?;

        let rows = conn
            .fetch_all(
                sqlx::query("SELECT data FROM user_restrictions WHERE user_id = $1").bind(user_id),
            )
            .await?;

        let mut restrictions = Vec::with_capacity(rows.len());
        for row in rows {
            let Json(restriction): Json<UserRestriction> = row.try_get("data")?;
            restrictions.push(restriction);
        }

        Ok(restrictions)
    }

    #[tracing::instrument(skip(self))]
    async fn lift_restriction(
        &self,
        user: User,
        restriction_id: Uuid,
    ) -> Result<UserRestriction, Error> {
        self.authorize(user, "manage_restrictions", Platform::default())?;

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let Json(mut restriction): Json<UserRestriction> = tx
            .fetch_optional(
                sqlx::query("SELECT data FROM user_restrictions WHERE id = $1 FOR UPDATE")
                    .bind(restriction_id),
            )
            .await?
            .ok_or_else(not_found_error)?
            .try_get("data")?;

        restriction.lift();

        tx.execute(
            sqlx::query("UPDATE user_restrictions SET ends_at = $2, data = $3 WHERE id = $1")
                .bind(restriction.id)
                .bind(restriction.ends_at)
                .bind(Json(&restriction)),
        )
        .await?;

        tx.commit().await?;

        Ok(restriction)
    }

    #[tracing::instrument(skip(self))]
    async fn request_recovery(
        &self,
        user: User,
        user_id: Uuid,
        actor: ActorType,
    ) -> Result<UserScore, Error> {
        if user.id != user_id {
            self.authorize(user.clone(), "adjust_score", Platform::default())?;
        }

        self.inactivity_recovery_tick(&user_id, actor)
            .await?
            .ok_or_else(rate_limited_error)
    }
}
