use super::helpers::{
    add_trip_event, fetch_safety_state_for_update, insert_safety_alert, upsert_safety_state,
};
use super::{Database, Engine};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, Acquire, Executor, Row, Transaction};
use uuid::Uuid;

use crate::{
    api::LocationAPI,
    auth::{Platform, User},
    entities::{
        classify_point, ActorType, DeviationLevel, GeoZone, RouteBaseline, SafetyAlert,
        SafetyAlertKind, SafetyFloor, ScoreEventKind, Status, Trip, TripEvent, TripSafetyState,
        ZoneType,
    },
    error::{invalid_state_error, not_found_error, rate_limited_error, Error},
    gateway::events,
    geo::Coordinates,
    monitor::TrackingAlertLevel,
};

const PENALTY_RED_ZONE: i64 = 25;
const PENALTY_CAUTION_ZONE: i64 = 10;
const PENALTY_DEVIATION_MINOR: i64 = 5;
const PENALTY_DEVIATION_MAJOR: i64 = 15;
const PENALTY_TRACKING_MINOR: i64 = 5;
const PENALTY_TRACKING_MAJOR: i64 = 15;

const SCORE_ENTERED_RED_ZONE: i64 = -10;
const SCORE_DEVIATION_MINOR: i64 = -5;
const SCORE_DEVIATION_MAJOR: i64 = -15;
const SCORE_TRACKING_LOST_MAJOR: i64 = -10;

impl Engine {
    pub(super) async fn load_zones(&self) -> Result<Vec<GeoZone>, Error> {
        let mut conn = self.pool.acquire().await?;

        let rows = conn
            .fetch_all(sqlx::query("SELECT data FROM geo_zones"))
            .await?;

        let mut zones = Vec::with_capacity(rows.len());
        for row in rows {
            let Json(zone): Json<GeoZone> = row.try_get("data")?;
            zones.push(zone);
        }

        Ok(zones)
    }

    async fn load_baseline(&self, trip_id: &Uuid) -> Result<RouteBaseline, Error> {
        let mut conn = self.pool.acquire().await?;

        let Json(baseline): Json<RouteBaseline> = conn
            .fetch_optional(
                sqlx::query("SELECT data FROM trip_route_baselines WHERE trip_id = $1")
                    .bind(trip_id),
            )
            .await?
            .ok_or_else(not_found_error)?
            .try_get("data")?;

        Ok(baseline)
    }

    /// Writes an alert, depletes the trip's safety score, and handles any
    /// floor crossed by the depletion. The caller owns the transaction and
    /// the state row.
    async fn raise_alert(
        &self,
        tx: &mut Transaction<'_, Database>,
        state: &mut TripSafetyState,
        kind: SafetyAlertKind,
        severity: i16,
        penalty: i64,
        message: &str,
        payload: serde_json::Value,
    ) -> Result<SafetyAlert, Error> {
        let alert = SafetyAlert::new(state.trip_id, kind, severity, message.into(), payload);
        insert_safety_alert(tx, &alert).await?;

        let floors = state.deplete(penalty);
        for floor in floors {
            self.handle_floor(tx, state, floor).await?;
        }

        self.gateway
            .emit_trip(state.trip_id, events::SAFETY_ALERT, serde_json::to_value(&alert)?);
        self.gateway
            .emit_ops(events::SAFETY_ALERT, serde_json::to_value(&alert)?);

        Ok(alert)
    }

    async fn handle_floor(
        &self,
        tx: &mut Transaction<'_, Database>,
        state: &mut TripSafetyState,
        floor: SafetyFloor,
    ) -> Result<(), Error> {
        match floor {
            SafetyFloor::CheckinRequired => {
                add_trip_event(
                    tx,
                    &TripEvent::new(
                        state.trip_id,
                        None,
                        "safety.checkin_required",
                        serde_json::json!({ "safety_score": state.safety_score }),
                    ),
                )
                .await?;
            }
            SafetyFloor::SosSuggested => {
                let alert = SafetyAlert::new(
                    state.trip_id,
                    SafetyAlertKind::SosSuggested,
                    4,
                    "trip safety degraded, SOS suggested".into(),
                    serde_json::json!({ "safety_score": state.safety_score }),
                );
                insert_safety_alert(tx, &alert).await?;

                self.gateway
                    .emit_trip(state.trip_id, events::SAFETY_ALERT, serde_json::to_value(&alert)?);
            }
            SafetyFloor::TripFlagged => {
                add_trip_event(
                    tx,
                    &TripEvent::new(
                        state.trip_id,
                        None,
                        "safety.trip_flagged",
                        serde_json::json!({ "safety_score": state.safety_score }),
                    ),
                )
                .await?;

                self.gateway.emit_ops(
                    events::SAFETY_ALERT,
                    serde_json::json!({
                        "trip_id": state.trip_id,
                        "flagged": true,
                        "safety_score": state.safety_score,
                    }),
                );
            }
        }

        Ok(())
    }

    /// The monitor proper. Failures in here are logged by the caller and
    /// never bounce the location write.
    async fn evaluate_safety(
        &self,
        trip: &Trip,
        location: Coordinates,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        let driver_id = match trip.driver_id {
            Some(driver_id) => driver_id,
            None => return Ok(()),
        };

        let zones = self.load_zones().await?;
        let zone_now = classify_point(location, &zones);

        // route deviation only means something once the passenger is aboard
        let (deviation_m, deviation_trigger) = if trip.status == Status::InProgress {
            let baseline = self.load_baseline(&trip.id).await?;
            let deviation_m = baseline.distance_from_m(location);

            let trigger = {
                let mut deviations = self.deviations.lock().await;
                deviations.entry(trip.id).or_default().observe(deviation_m, now)
            };

            (Some(deviation_m), trigger)
        } else {
            (None, None)
        };

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut state = fetch_safety_state_for_update(&mut tx, &trip.id)
            .await?
            .unwrap_or_else(|| TripSafetyState::new(trip.id));

        // zone transitions fire on entry, not on every ping inside
        let entered = match (state.last_zone_type, zone_now) {
            (previous, Some(zone)) if previous != Some(zone) => Some(zone),
            _ => None,
        };
        state.last_zone_type = zone_now;
        state.last_location_at = Some(now);

        match entered {
            Some(ZoneType::Red) => {
                let alert = self
                    .raise_alert(
                        &mut tx,
                        &mut state,
                        SafetyAlertKind::EnteredRedZone,
                        5,
                        PENALTY_RED_ZONE,
                        "trip entered a red zone",
                        serde_json::json!({ "lat": location.lat, "lng": location.lng }),
                    )
                    .await?;

                self.apply_score_event(
                    &mut tx,
                    driver_id,
                    ActorType::Driver,
                    ScoreEventKind::EnteredRedZone,
                    SCORE_ENTERED_RED_ZONE,
                    Some(trip.id),
                    Some(alert.id),
                    serde_json::json!({}),
                )
                .await?;
            }
            Some(ZoneType::Caution) => {
                self.raise_alert(
                    &mut tx,
                    &mut state,
                    SafetyAlertKind::EnteredCautionZone,
                    3,
                    PENALTY_CAUTION_ZONE,
                    "trip entered a caution zone",
                    serde_json::json!({ "lat": location.lat, "lng": location.lng }),
                )
                .await?;
            }
            _ => {}
        }

        if let Some(trigger) = deviation_trigger {
            match trigger.level {
                DeviationLevel::Major => {
                    let severity = if trigger.repeated { 5 } else { 4 };
                    let alert = self
                        .raise_alert(
                            &mut tx,
                            &mut state,
                            SafetyAlertKind::RouteDeviationMajor,
                            severity,
                            PENALTY_DEVIATION_MAJOR,
                            "sustained major route deviation",
                            serde_json::json!({ "deviation_m": deviation_m.unwrap_or_default() }),
                        )
                        .await?;

                    state.deviation_level = DeviationLevel::Major;

                    self.apply_score_event(
                        &mut tx,
                        driver_id,
                        ActorType::Driver,
                        ScoreEventKind::RouteDeviationMajor,
                        SCORE_DEVIATION_MAJOR,
                        Some(trip.id),
                        Some(alert.id),
                        serde_json::json!({}),
                    )
                    .await?;
                }
                DeviationLevel::Minor => {
                    let alert = self
                        .raise_alert(
                            &mut tx,
                            &mut state,
                            SafetyAlertKind::RouteDeviationMinor,
                            2,
                            PENALTY_DEVIATION_MINOR,
                            "sustained route deviation",
                            serde_json::json!({ "deviation_m": deviation_m.unwrap_or_default() }),
                        )
                        .await?;

                    state.deviation_level = DeviationLevel::Minor;

                    self.apply_score_event(
                        &mut tx,
                        driver_id,
                        ActorType::Driver,
                        ScoreEventKind::RouteDeviationMinor,
                        SCORE_DEVIATION_MINOR,
                        Some(trip.id),
                        Some(alert.id),
                        serde_json::json!({}),
                    )
                    .await?;
                }
                DeviationLevel::None => {}
            }
        } else if matches!(deviation_m, Some(d) if d < crate::monitor::DEVIATION_MINOR_THRESHOLD_M) {
            state.deviation_level = DeviationLevel::None;
        }

        upsert_safety_state(&mut tx, &state).await?;

        tx.commit().await?;

        Ok(())
    }
}

#[async_trait]
impl LocationAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn track_location(
        &self,
        user: User,
        trip_id: Uuid,
        location: Coordinates,
    ) -> Result<(), Error> {
        let trip = self.fetch_trip(&trip_id).await?;

        let driver_user_id = user.id;
        self.authorize(user, "track_location", trip.clone())?;

        if !trip.status.tracks_location() {
            return Err(invalid_state_error());
        }

        let now = Utc::now();

        {
            let mut throttle = self.location_throttle.lock().await;
            if !throttle.admit(trip_id, driver_user_id, now) {
                return Err(rate_limited_error());
            }
        }

        let mut conn = self.pool.acquire().await?;
        conn.execute(
            sqlx::query(
                "INSERT INTO trip_locations (trip_id, lat, lng, recorded_at) VALUES ($1, $2, $3, $4)",
            )
            .bind(trip_id)
            .bind(location.lat)
            .bind(location.lng)
            .bind(now),
        )
        .await?;
        drop(conn);

        // a fresh ping ends any tracking outage
        self.tracking.lock().await.entry(trip_id).or_default().observe_gap(0);

        self.gateway.emit_trip(
            trip_id,
            events::TRIP_LOCATION_UPDATE,
            serde_json::json!({ "lat": location.lat, "lng": location.lng, "at": now }),
        );

        // monitoring problems must never bounce the ping itself
        if let Err(err) = self.evaluate_safety(&trip, location, now).await {
            tracing::warn!(trip_id = %trip_id, code = err.code, "safety evaluation failed");
        }

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn scan_tracking_loss(&self, user: User) -> Result<u64, Error> {
        self.authorize(user, "scan_tracking", Platform::default())?;

        let mut conn = self.pool.acquire().await?;

        let rows = conn
            .fetch_all(sqlx::query(
                "SELECT t.id FROM trips t WHERE t.status IN ('DRIVER_EN_ROUTE', 'IN_PROGRESS')",
            ))
            .await?;
        drop(conn);

        let now = Utc::now();
        let mut flagged = 0u64;

        for row in rows {
            let trip_id: Uuid = row.try_get("id")?;
            let trip = self.fetch_trip(&trip_id).await?;
            let driver_id = match trip.driver_id {
                Some(driver_id) => driver_id,
                None => continue,
            };

            let mut conn = self.pool.acquire().await?;
            let mut tx = conn.begin().await?;

            let mut state = match fetch_safety_state_for_update(&mut tx, &trip_id).await? {
                Some(state) => state,
                None => continue,
            };

            let last_seen = state
                .last_location_at
                .unwrap_or(trip.started_at.unwrap_or(trip.created_at));
            let gap_secs = (now - last_seen).num_seconds();

            let level = {
                let mut tracking = self.tracking.lock().await;
                tracking.entry(trip_id).or_default().observe_gap(gap_secs)
            };

            match level {
                Some(TrackingAlertLevel::Major) => {
                    let alert = self
                        .raise_alert(
                            &mut tx,
                            &mut state,
                            SafetyAlertKind::TrackingLost,
                            4,
                            PENALTY_TRACKING_MAJOR,
                            "location tracking lost",
                            serde_json::json!({ "gap_secs": gap_secs }),
                        )
                        .await?;

                    self.apply_score_event(
                        &mut tx,
                        driver_id,
                        ActorType::Driver,
                        ScoreEventKind::TrackingLostMajor,
                        SCORE_TRACKING_LOST_MAJOR,
                        Some(trip_id),
                        Some(alert.id),
                        serde_json::json!({}),
                    )
                    .await?;

                    upsert_safety_state(&mut tx, &state).await?;
                    tx.commit().await?;
                    flagged += 1;
                }
                Some(TrackingAlertLevel::Minor) => {
                    self.raise_alert(
                        &mut tx,
                        &mut state,
                        SafetyAlertKind::TrackingLost,
                        2,
                        PENALTY_TRACKING_MINOR,
                        "location signal degraded",
                        serde_json::json!({ "gap_secs": gap_secs }),
                    )
                    .await?;

                    upsert_safety_state(&mut tx, &state).await?;
                    tx.commit().await?;
                    flagged += 1;
                }
                _ => {}
            }
        }

        Ok(flagged)
    }
}
