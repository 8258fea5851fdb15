use super::helpers::{add_trip_event, fetch_alert_for_update, update_safety_alert};
use super::Engine;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{types::Json, Acquire, Executor, Row};
use uuid::Uuid;

use crate::{
    api::SafetyAPI,
    auth::{Platform, User},
    entities::{SafetyAlert, SafetyAlertStatus, Status, TripEvent},
    error::{invalid_state_error, Error},
};

#[async_trait]
impl SafetyAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn list_alerts(&self, user: User, trip_id: Uuid) -> Result<Vec<SafetyAlert>, Error> {
        let trip = self.fetch_trip(&trip_id).await?;

        self.authorize(user, "read", trip)?;

        let mut conn = self.pool.acquire().await?;
        let rows = conn
            .fetch_all(
                sqlx::query("SELECT data FROM safety_alerts WHERE trip_id = $1").bind(trip_id),
            )
            .await?;

        let mut alerts = Vec::with_capacity(rows.len());
        for row in rows {
            let Json(alert): Json<SafetyAlert> = row.try_get("data")?;
            alerts.push(alert);
        }

        Ok(alerts)
    }

    #[tracing::instrument(skip(self))]
    async fn acknowledge_alert(&self, user: User, alert_id: Uuid) -> Result<SafetyAlert, Error> {
        self.authorize(user.clone(), "review_alerts", Platform::default())?;

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut alert = fetch_alert_for_update(&mut tx, &alert_id).await?;

        if alert.status != SafetyAlertStatus::Open {
            return Err(invalid_state_error());
        }

        alert.status = SafetyAlertStatus::Acknowledged;
        alert.acknowledged_at = Some(Utc::now());
        alert.acknowledged_by = Some(user.id);

        update_safety_alert(&mut tx, &alert).await?;

        tx.commit().await?;

        Ok(alert)
    }

    #[tracing::instrument(skip(self))]
    async fn resolve_alert(&self, user: User, alert_id: Uuid) -> Result<SafetyAlert, Error> {
        self.authorize(user.clone(), "review_alerts", Platform::default())?;

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut alert = fetch_alert_for_update(&mut tx, &alert_id).await?;

        if alert.status == SafetyAlertStatus::Resolved {
            return Err(invalid_state_error());
        }

        alert.status = SafetyAlertStatus::Resolved;
        alert.resolved_at = Some(Utc::now());
        alert.resolved_by = Some(user.id);

        update_safety_alert(&mut tx, &alert).await?;

        tx.commit().await?;

        Ok(alert)
    }

    #[tracing::instrument(skip(self))]
    async fn check_in(&self, user: User, trip_id: Uuid) -> Result<(), Error> {
        let trip = self.fetch_trip(&trip_id).await?;

        self.authorize(user.clone(), "check_in", trip.clone())?;

        if trip.status != Status::InProgress {
            return Err(invalid_state_error());
        }

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        add_trip_event(
            &mut tx,
            &TripEvent::new(
                trip_id,
                Some(user.id),
                "safety.checkin_confirmed",
                serde_json::json!({}),
            ),
        )
        .await?;

        tx.commit().await?;

        Ok(())
    }
}
