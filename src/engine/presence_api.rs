use super::{Database, Engine};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{types::Json, Acquire, Executor, Row, Transaction};
use uuid::Uuid;

use crate::{
    api::PresenceAPI,
    auth::{Platform, User},
    config::{keys, PeakHours},
    entities::{ActorType, DriverPresence, ScoreStatus},
    error::{unauthorized_error, Error},
    gateway::events,
    geo::Coordinates,
};

impl Engine {
    pub(super) async fn fetch_presence(
        &self,
        tx: &mut Transaction<'_, Database>,
        driver_id: &Uuid,
    ) -> Result<Option<DriverPresence>, Error> {
        let maybe_row = tx
            .fetch_optional(
                sqlx::query("SELECT data FROM driver_presences WHERE driver_id = $1 FOR UPDATE")
                    .bind(driver_id),
            )
            .await?;

        match maybe_row {
            Some(row) => {
                let Json(presence): Json<DriverPresence> = row.try_get("data")?;
                Ok(Some(presence))
            }
            None => Ok(None),
        }
    }

    async fn upsert_presence(
        &self,
        tx: &mut Transaction<'_, Database>,
        presence: &DriverPresence,
    ) -> Result<(), Error> {
        tx.execute(
            sqlx::query(
                "INSERT INTO driver_presences (driver_id, last_seen_at, data) VALUES ($1, $2, $3)
                 ON CONFLICT (driver_id) DO UPDATE SET last_seen_at = $2, data = $3",
            )
            .bind(presence.driver_id)
            .bind(presence.last_seen_at)
            .bind(Json(presence)),
        )
        .await?;

        Ok(())
    }

    /// Peak-hour participation gate. Blocked users are turned away outright;
    /// during peak windows a minimum score applies as well. Every denial
    /// leaves an audit row and a realtime notification.
    pub(super) async fn check_peak_gate(
        &self,
        user_id: Uuid,
        actor: ActorType,
    ) -> Result<(), Error> {
        let score = self.load_score(&user_id, actor).await?;

        let peak: PeakHours = self.config.get(keys::PEAK_HOURS).await?;
        let now = Utc::now();

        let min_score = match actor {
            ActorType::Driver => peak.driver_min_score,
            ActorType::Passenger => peak.passenger_min_score,
        };

        let denied = score.status == ScoreStatus::Blocked
            || (peak.is_peak_at(now) && score.score < min_score);
        if !denied {
            return Ok(());
        }

        let mut conn = self.pool.acquire().await?;
        conn.execute(
            sqlx::query(
                "INSERT INTO peak_gate_events (id, user_id, actor, created_at, data) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(actor.name())
            .bind(now)
            .bind(Json(serde_json::json!({
                "score": score.score,
                "status": score.status.name(),
                "min_score": min_score,
            }))),
        )
        .await?;

        self.gateway.emit_user(
            user_id,
            events::PEAK_GATE_DENIED,
            serde_json::json!({
                "actor": actor.name(),
                "score": score.score,
            }),
        );

        Err(unauthorized_error())
    }
}

#[async_trait]
impl PresenceAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn heartbeat(
        &self,
        user: User,
        driver_id: Uuid,
        location: Coordinates,
        vehicle_category: Option<String>,
    ) -> Result<DriverPresence, Error> {
        if user.id != driver_id {
            self.authorize(user, "heartbeat", Platform::default())?;
        }

        let score = self.load_score(&driver_id, ActorType::Driver).await?;

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let now = Utc::now();
        let mut presence = self
            .fetch_presence(&mut tx, &driver_id)
            .await?
            .unwrap_or(DriverPresence {
                driver_id,
                is_online: false,
                is_limited: false,
                last_lat: None,
                last_lng: None,
                vehicle_category: None,
                last_seen_at: now,
            });

        presence.is_online = true;
        presence.is_limited = score.status == ScoreStatus::Limited;
        presence.last_lat = Some(location.lat);
        presence.last_lng = Some(location.lng);
        presence.last_seen_at = now;
        if vehicle_category.is_some() {
            presence.vehicle_category = vehicle_category;
        }

        self.upsert_presence(&mut tx, &presence).await?;

        tx.commit().await?;

        Ok(presence)
    }

    #[tracing::instrument(skip(self))]
    async fn set_online(
        &self,
        user: User,
        driver_id: Uuid,
        online: bool,
    ) -> Result<DriverPresence, Error> {
        if user.id != driver_id {
            self.authorize(user, "heartbeat", Platform::default())?;
        }

        if online {
            self.check_peak_gate(driver_id, ActorType::Driver).await?;
            // idle time earns a recovery tick when the driver returns
            self.inactivity_recovery_tick(&driver_id, ActorType::Driver)
                .await?;
        }

        let score = self.load_score(&driver_id, ActorType::Driver).await?;

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let now = Utc::now();
        let mut presence = self
            .fetch_presence(&mut tx, &driver_id)
            .await?
            .unwrap_or(DriverPresence {
                driver_id,
                is_online: false,
                is_limited: false,
                last_lat: None,
                last_lng: None,
                vehicle_category: None,
                last_seen_at: now,
            });

        presence.is_online = online;
        presence.is_limited = score.status == ScoreStatus::Limited;
        presence.last_seen_at = now;

        self.upsert_presence(&mut tx, &presence).await?;

        tx.commit().await?;

        Ok(presence)
    }
}
