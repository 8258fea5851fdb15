use super::helpers::{
    add_trip_event, fetch_otp_for_update, fetch_trip_for_update, insert_safety_alert, insert_trip,
    update_trip_where_status, upsert_otp, upsert_safety_state,
};
use super::{Database, Engine};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{types::Json, Acquire, Executor, Row, Transaction};
use uuid::Uuid;

use crate::{
    api::TripAPI,
    auth::{Platform, User},
    config::{keys, CommissionPolicy, DynamicTopN, MatchingWeights, PeakHours, PremiumPreference},
    entities::{
        otp, ActorType, CancelPenalty, CancelReason, DriverPresence, OtpAttempt, PremiumZone,
        RouteBaseline, SafetyAlert, SafetyAlertKind, ScoreEventKind, ScoreStatus, Status, Trip,
        TripEvent, TripOtp, TripRequest, TripSafetyState,
    },
    error::{
        attempts_exhausted_error, expired_error, invalid_input_error, invalid_state_error,
        not_found_error, Error,
    },
    fraud::{self, FraudSignal},
    gateway::events,
    geo::haversine_km,
    matching::{rank_candidates, Candidate, MatchingContext},
};

/// Radius scanned for candidate drivers around the pickup point.
pub const SEARCH_RADIUS_KM: f64 = 5.0;
const CANDIDATE_SCAN_LIMIT: i64 = 200;

const SCORE_COMPLETION_DRIVER: i64 = 2;
const SCORE_COMPLETION_PASSENGER: i64 = 1;
const SCORE_PASSENGER_CANCEL_LATE: i64 = -6;
const SCORE_PASSENGER_CANCEL_LIGHT: i64 = -3;
const SCORE_DRIVER_CANCEL_LATE: i64 = -8;
const SCORE_OTP_FAILED_MULTIPLE: i64 = -12;

impl Engine {
    #[tracing::instrument(skip(self))]
    pub(super) async fn fetch_trip(&self, id: &Uuid) -> Result<Trip, Error> {
        let mut conn = self.pool.acquire().await?;

        let Json(trip): Json<Trip> = conn
            .fetch_optional(sqlx::query("SELECT data FROM trips WHERE id = $1").bind(id))
            .await?
            .ok_or_else(not_found_error)?
            .try_get("data")?;

        Ok(trip)
    }

    async fn premium_zone_at(
        &self,
        point: crate::geo::Coordinates,
    ) -> Result<Option<PremiumZone>, Error> {
        let mut conn = self.pool.acquire().await?;

        let rows = conn
            .fetch_all(sqlx::query("SELECT data FROM premium_zones"))
            .await?;

        for row in rows {
            let Json(zone): Json<PremiumZone> = row.try_get("data")?;
            if zone.is_active && zone.contains(point) {
                return Ok(Some(zone));
            }
        }

        Ok(None)
    }

    /// Collects fresh online drivers of the requested category near the
    /// pickup and loads everything the ranking formula wants to know about
    /// them.
    async fn assemble_candidates(
        &self,
        origin: crate::geo::Coordinates,
        vehicle_category: &str,
        premium_zone: Option<&PremiumZone>,
    ) -> Result<Vec<Candidate>, Error> {
        let mut conn = self.pool.acquire().await?;

        let now = Utc::now();
        let rows = conn
            .fetch_all(
                sqlx::query(
                    "SELECT data FROM driver_presences WHERE last_seen_at > $1 LIMIT $2",
                )
                .bind(now - Duration::seconds(crate::entities::PRESENCE_FRESHNESS_SECS))
                .bind(CANDIDATE_SCAN_LIMIT),
            )
            .await?;

        let mut candidates = Vec::new();
        for row in rows {
            let Json(presence): Json<DriverPresence> = row.try_get("data")?;
            if !presence.is_fresh_at(now) || !presence.serves_category(vehicle_category) {
                continue;
            }

            let location = match presence.location() {
                Some(location) => location,
                None => continue,
            };

            let distance_km = haversine_km(origin, location);
            if distance_km > SEARCH_RADIUS_KM {
                continue;
            }

            let score = self.load_score(&presence.driver_id, ActorType::Driver).await?;
            if score.status == ScoreStatus::Blocked {
                continue;
            }

            let tier = self.load_level(&presence.driver_id, ActorType::Driver).await?;
            let penalties_30d = self.count_penalties_30d(&presence.driver_id).await?;

            candidates.push(Candidate {
                driver_id: presence.driver_id,
                score: score.score,
                status: score.status,
                tier,
                distance_km,
                penalties_30d,
                premium_eligible: premium_zone
                    .map(|zone| zone.eligible(ActorType::Driver, score.score)),
            });
        }

        Ok(candidates)
    }

    /// Late cancels and no-shows in the trailing month; safety penalties do
    /// not depress the reliability term.
    async fn count_penalties_30d(&self, driver_id: &Uuid) -> Result<i64, Error> {
        let mut conn = self.pool.acquire().await?;

        let row = conn
            .fetch_one(
                sqlx::query(
                    "SELECT COUNT(*) AS total FROM score_events
                     WHERE user_id = $1 AND actor = 'DRIVER' AND kind IN ($2, $3) AND created_at >= $4",
                )
                .bind(driver_id)
                .bind(ScoreEventKind::DriverCancelLate.name())
                .bind(ScoreEventKind::DriverNoShow.name())
                .bind(Utc::now() - Duration::days(30)),
            )
            .await?;

        Ok(row.try_get("total")?)
    }

    /// Finishes a match inside the caller's transaction: the trip row must
    /// still be in BIDDING or the conditional update bounces.
    pub(super) async fn settle_match(
        &self,
        tx: &mut Transaction<'_, Database>,
        trip: &mut Trip,
        driver_id: Uuid,
        price_final: i64,
        auto: bool,
    ) -> Result<(), Error> {
        trip.match_with(driver_id, price_final)?;
        update_trip_where_status(tx, trip, "BIDDING").await?;

        add_trip_event(
            tx,
            &TripEvent::new(
                trip.id,
                Some(driver_id),
                "trip.matched",
                serde_json::json!({ "price_final": price_final, "auto": auto }),
            ),
        )
        .await?;

        self.gateway.emit_trip(
            trip.id,
            events::TRIP_MATCHED,
            serde_json::json!({
                "driver_id": driver_id,
                "price_final": price_final,
                "auto": auto,
            }),
        );
        self.gateway.emit_driver(
            driver_id,
            events::TRIP_MATCHED,
            serde_json::to_value(&*trip)?,
        );

        Ok(())
    }

    async fn completion_effects(
        &self,
        tx: &mut Transaction<'_, Database>,
        trip: &Trip,
        driver_id: Uuid,
    ) -> Result<i64, Error> {
        let now = Utc::now();

        // a trip is clean when the monitor raised nothing serious
        let row = tx
            .fetch_one(
                sqlx::query(
                    "SELECT COUNT(*) AS total FROM safety_alerts
                     WHERE trip_id = $1 AND (data->>'severity')::int >= 3",
                )
                .bind(trip.id),
            )
            .await?;
        let serious_alerts: i64 = row.try_get("total")?;
        let clean = serious_alerts == 0;

        if clean {
            let driver_score = self
                .apply_score_event(
                    tx,
                    driver_id,
                    ActorType::Driver,
                    ScoreEventKind::TripCompletedClean,
                    SCORE_COMPLETION_DRIVER,
                    Some(trip.id),
                    None,
                    serde_json::json!({}),
                )
                .await?;
            let passenger_score = self
                .apply_score_event(
                    tx,
                    trip.passenger_id,
                    ActorType::Passenger,
                    ScoreEventKind::TripCompletedClean,
                    SCORE_COMPLETION_PASSENGER,
                    Some(trip.id),
                    None,
                    serde_json::json!({}),
                )
                .await?;

            self.completion_recovery(tx, &driver_score, now).await?;
            self.completion_recovery(tx, &passenger_score, now).await?;
        }

        // repeated passenger/driver pairings look like score farming
        let row = tx
            .fetch_one(
                sqlx::query(
                    "SELECT COUNT(*) AS total FROM trips
                     WHERE status = 'COMPLETED'
                       AND data->>'passenger_id' = $1
                       AND data->>'driver_id' = $2
                       AND (data->>'completed_at')::timestamptz >= $3",
                )
                .bind(trip.passenger_id.to_string())
                .bind(driver_id.to_string())
                .bind(now - Duration::hours(24)),
            )
            .await?;
        let pair_count: i64 = row.try_get("total")?;
        if fraud::is_repeated_pair(pair_count) {
            self.fraud
                .report(FraudSignal {
                    user_id: driver_id,
                    trip_id: Some(trip.id),
                    kind: fraud::kinds::REPEATED_PAIR.into(),
                    severity: 3,
                    payload: serde_json::json!({
                        "passenger_id": trip.passenger_id,
                        "completed_today": pair_count,
                    }),
                })
                .await;
        }

        self.recompute_level(tx, &driver_id, ActorType::Driver).await?;
        self.recompute_level(tx, &trip.passenger_id, ActorType::Passenger)
            .await?;

        let policy: CommissionPolicy = self.config.get(keys::COMMISSION).await?;
        let tier = self.load_level(&driver_id, ActorType::Driver).await?;

        Ok(policy.bps_for_tier(tier))
    }

    /// Limited users earn a score bonus every few clean completions, capped
    /// per day.
    async fn completion_recovery(
        &self,
        tx: &mut Transaction<'_, Database>,
        score: &crate::entities::UserScore,
        now: chrono::DateTime<Utc>,
    ) -> Result<(), Error> {
        if score.status != ScoreStatus::Limited {
            return Ok(());
        }

        let rules: crate::config::RecoveryRules = self.config.get(keys::RECOVERY_RULES).await?;

        let clean_recent = self
            .count_score_events_since(
                tx,
                &score.user_id,
                score.actor,
                ScoreEventKind::TripCompletedClean,
                now - Duration::days(30),
            )
            .await?;
        if clean_recent == 0 || clean_recent % rules.limited_clean_trips != 0 {
            return Ok(());
        }

        let row = tx
            .fetch_one(
                sqlx::query(
                    "SELECT COALESCE(SUM(delta), 0) AS total FROM score_events
                     WHERE user_id = $1 AND actor = $2 AND kind = 'TRIP_RECOVERY_BONUS' AND created_at >= $3",
                )
                .bind(score.user_id)
                .bind(score.actor.name())
                .bind(now - Duration::hours(24)),
            )
            .await?;
        let granted_today: i64 = row.try_get("total")?;
        if granted_today >= rules.daily_cap {
            return Ok(());
        }

        let bonus = rules
            .limited_bonus
            .min(rules.daily_cap - granted_today);

        self.apply_score_event(
            tx,
            score.user_id,
            score.actor,
            ScoreEventKind::TripRecoveryBonus,
            bonus,
            None,
            None,
            serde_json::json!({ "clean_streak": clean_recent }),
        )
        .await?;

        Ok(())
    }

    pub(super) async fn forget_trip_monitors(&self, trip_id: &Uuid) {
        self.deviations.lock().await.remove(trip_id);
        self.tracking.lock().await.remove(trip_id);
        self.location_throttle.lock().await.forget_trip(trip_id);
    }
}

#[async_trait]
impl TripAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn request_trip(
        &self,
        user: User,
        passenger_id: Uuid,
        request: TripRequest,
    ) -> Result<Trip, Error> {
        if user.id != passenger_id {
            self.authorize(user.clone(), "request_trip", Platform::default())?;
        }

        self.check_peak_gate(passenger_id, ActorType::Passenger)
            .await?;

        let passenger_score = self.load_score(&passenger_id, ActorType::Passenger).await?;
        let restricted = passenger_score.status == ScoreStatus::Limited;

        let trip = Trip::new(passenger_id, request, restricted);
        let baseline = RouteBaseline::build(trip.id, trip.origin, trip.destination);

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        insert_trip(&mut tx, &trip).await?;

        tx.execute(
            sqlx::query("INSERT INTO trip_route_baselines (trip_id, data) VALUES ($1, $2)")
                .bind(baseline.trip_id)
                .bind(Json(&baseline)),
        )
        .await?;

        upsert_safety_state(&mut tx, &TripSafetyState::new(trip.id)).await?;

        add_trip_event(
            &mut tx,
            &TripEvent::new(
                trip.id,
                Some(passenger_id),
                "trip.requested",
                serde_json::json!({ "price_base": trip.price_base }),
            ),
        )
        .await?;

        tx.commit().await?;

        // fan the request out to ranked nearby drivers
        let premium_zone = self.premium_zone_at(trip.origin).await?;
        let peak: PeakHours = self.config.get(keys::PEAK_HOURS).await?;
        let ctx = MatchingContext {
            weights: self.config.get::<MatchingWeights>(keys::MATCHING_WEIGHTS).await?,
            premium: self.config.get::<PremiumPreference>(keys::PREMIUM_PREFERENCE).await?,
            top_n: self.config.get::<DynamicTopN>(keys::DYNAMIC_TOP_N).await?,
            is_peak: peak.is_peak_at(Utc::now()),
            in_premium_zone: premium_zone.is_some(),
            passenger_restricted: restricted,
            max_distance_km: SEARCH_RADIUS_KM,
        };

        let candidates = self
            .assemble_candidates(trip.origin, &trip.vehicle_category, premium_zone.as_ref())
            .await?;
        let ranked = rank_candidates(candidates, &ctx);

        tracing::info!(trip_id = %trip.id, notified = ranked.len(), "trip fanned out to drivers");

        let payload = serde_json::to_value(&trip)?;
        for candidate in &ranked {
            self.gateway
                .emit_driver(candidate.candidate.driver_id, events::TRIP_CREATED, payload.clone());
        }
        self.gateway
            .emit_user(passenger_id, events::TRIP_CREATED, payload);

        Ok(trip)
    }

    #[tracing::instrument(skip(self))]
    async fn find_trip(&self, user: User, id: Uuid) -> Result<Trip, Error> {
        let trip = self.fetch_trip(&id).await?;

        self.authorize(user, "read", trip.clone())?;

        Ok(trip)
    }

    #[tracing::instrument(skip(self))]
    async fn list_trip_events(&self, user: User, id: Uuid) -> Result<Vec<TripEvent>, Error> {
        let trip = self.fetch_trip(&id).await?;

        self.authorize(user, "read", trip)?;

        let mut conn = self.pool.acquire().await?;
        let rows = conn
            .fetch_all(
                sqlx::query(
                    "SELECT data FROM trip_events WHERE trip_id = $1 ORDER BY created_at ASC",
                )
                .bind(id),
            )
            .await?;

        let mut trip_events = Vec::with_capacity(rows.len());
        for row in rows {
            let Json(event): Json<TripEvent> = row.try_get("data")?;
            trip_events.push(event);
        }

        Ok(trip_events)
    }

    #[tracing::instrument(skip(self))]
    async fn driver_en_route(&self, user: User, id: Uuid) -> Result<Trip, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut trip = fetch_trip_for_update(&mut tx, &id).await?;

        self.authorize(user.clone(), "en_route", trip.clone())?;

        trip.en_route()?;
        update_trip_where_status(&mut tx, &trip, "MATCHED").await?;

        add_trip_event(
            &mut tx,
            &TripEvent::new(trip.id, Some(user.id), "trip.en_route", serde_json::json!({})),
        )
        .await?;

        tx.commit().await?;

        self.gateway
            .emit_trip(trip.id, events::TRIP_DRIVER_EN_ROUTE, serde_json::json!({}));

        Ok(trip)
    }

    #[tracing::instrument(skip(self))]
    async fn driver_arrived(&self, user: User, id: Uuid) -> Result<Trip, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut trip = fetch_trip_for_update(&mut tx, &id).await?;

        self.authorize(user.clone(), "arrive", trip.clone())?;

        trip.arrive()?;
        update_trip_where_status(&mut tx, &trip, "DRIVER_EN_ROUTE").await?;

        let code = otp::generate_code();
        upsert_otp(&mut tx, &TripOtp::new(trip.id, &code)).await?;

        add_trip_event(
            &mut tx,
            &TripEvent::new(trip.id, Some(user.id), "trip.arrived", serde_json::json!({})),
        )
        .await?;

        tx.commit().await?;

        self.gateway
            .emit_trip(trip.id, events::TRIP_ARRIVED, serde_json::json!({}));
        // the code goes to the passenger only; the driver hears it in person
        self.gateway.emit_user(
            trip.passenger_id,
            events::TRIP_OTP_GENERATED,
            serde_json::json!({ "trip_id": trip.id, "code": code }),
        );

        Ok(trip)
    }

    #[tracing::instrument(skip(self, code))]
    async fn verify_otp(&self, user: User, id: Uuid, code: String) -> Result<Trip, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut trip = fetch_trip_for_update(&mut tx, &id).await?;

        self.authorize(user.clone(), "verify_otp", trip.clone())?;

        if trip.status != Status::OtpPending {
            return Err(invalid_state_error());
        }

        let mut stored = fetch_otp_for_update(&mut tx, &id).await?;
        let outcome = stored.verify(&code, Utc::now());
        upsert_otp(&mut tx, &stored).await?;

        match outcome {
            OtpAttempt::Verified => {
                trip.start()?;
                update_trip_where_status(&mut tx, &trip, "OTP_PENDING").await?;

                add_trip_event(
                    &mut tx,
                    &TripEvent::new(trip.id, Some(user.id), "trip.started", serde_json::json!({})),
                )
                .await?;

                tx.commit().await?;

                self.gateway
                    .emit_trip(trip.id, events::TRIP_STARTED, serde_json::json!({}));

                Ok(trip)
            }
            OtpAttempt::Mismatch { attempts, raise_alert } => {
                add_trip_event(
                    &mut tx,
                    &TripEvent::new(
                        trip.id,
                        Some(user.id),
                        "trip.otp.failed",
                        serde_json::json!({ "attempts": attempts }),
                    ),
                )
                .await?;

                if raise_alert && attempts == otp::OTP_ALERT_AFTER_FAILURES {
                    let alert = SafetyAlert::new(
                        trip.id,
                        SafetyAlertKind::OtpFailedMultiple,
                        4,
                        "repeated pickup code failures".into(),
                        serde_json::json!({ "attempts": attempts }),
                    );
                    insert_safety_alert(&mut tx, &alert).await?;

                    self.apply_score_event(
                        &mut tx,
                        trip.passenger_id,
                        ActorType::Passenger,
                        ScoreEventKind::OtpFailedMultiple,
                        SCORE_OTP_FAILED_MULTIPLE,
                        Some(trip.id),
                        Some(alert.id),
                        serde_json::json!({}),
                    )
                    .await?;

                    self.gateway.emit_ops(
                        events::SAFETY_ALERT,
                        serde_json::to_value(&alert)?,
                    );
                    self.fraud
                        .report(FraudSignal {
                            user_id: trip.passenger_id,
                            trip_id: Some(trip.id),
                            kind: fraud::kinds::OTP_ABUSE.into(),
                            severity: 2,
                            payload: serde_json::json!({ "attempts": attempts }),
                        })
                        .await;
                }

                tx.commit().await?;

                Err(invalid_input_error())
            }
            OtpAttempt::Expired => {
                tx.commit().await?;
                Err(expired_error())
            }
            OtpAttempt::AttemptsExhausted => {
                tx.commit().await?;
                Err(attempts_exhausted_error())
            }
        }
    }

    #[tracing::instrument(skip(self))]
    async fn complete_trip(&self, user: User, id: Uuid) -> Result<Trip, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut trip = fetch_trip_for_update(&mut tx, &id).await?;

        self.authorize(user.clone(), "complete", trip.clone())?;

        let driver_id = trip.driver_id.ok_or_else(invalid_input_error)?;

        trip.complete()?;
        update_trip_where_status(&mut tx, &trip, "IN_PROGRESS").await?;

        let commission_bps = self.completion_effects(&mut tx, &trip, driver_id).await?;

        add_trip_event(
            &mut tx,
            &TripEvent::new(
                trip.id,
                Some(user.id),
                "trip.completed",
                serde_json::json!({ "commission_bps": commission_bps }),
            ),
        )
        .await?;

        tx.commit().await?;

        self.forget_trip_monitors(&trip.id).await;

        self.gateway.emit_trip(
            trip.id,
            events::TRIP_COMPLETED,
            serde_json::json!({
                "price_final": trip.price_final,
                "commission_bps": commission_bps,
            }),
        );

        Ok(trip)
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_trip(
        &self,
        user: User,
        id: Uuid,
        reason: CancelReason,
    ) -> Result<Trip, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut trip = fetch_trip_for_update(&mut tx, &id).await?;

        self.authorize(user.clone(), "cancel", trip.clone())?;

        let is_passenger = Some(user.id) != trip.driver_id;
        let expected = trip.status.name();
        let penalty = trip.cancel(user.id, is_passenger, reason)?;

        update_trip_where_status(&mut tx, &trip, &expected).await?;

        match penalty {
            CancelPenalty::Moderate => {
                self.apply_score_event(
                    &mut tx,
                    trip.passenger_id,
                    ActorType::Passenger,
                    ScoreEventKind::PassengerCancelLate,
                    SCORE_PASSENGER_CANCEL_LATE,
                    Some(trip.id),
                    None,
                    serde_json::json!({}),
                )
                .await?;
            }
            CancelPenalty::Light => {
                self.apply_score_event(
                    &mut tx,
                    trip.passenger_id,
                    ActorType::Passenger,
                    ScoreEventKind::PassengerCancelLate,
                    SCORE_PASSENGER_CANCEL_LIGHT,
                    Some(trip.id),
                    None,
                    serde_json::json!({ "light": true }),
                )
                .await?;
            }
            CancelPenalty::Strong => {
                if let Some(driver_id) = trip.driver_id {
                    self.apply_score_event(
                        &mut tx,
                        driver_id,
                        ActorType::Driver,
                        ScoreEventKind::DriverCancelLate,
                        SCORE_DRIVER_CANCEL_LATE,
                        Some(trip.id),
                        None,
                        serde_json::json!({}),
                    )
                    .await?;
                }
            }
            CancelPenalty::None => {}
        }

        add_trip_event(
            &mut tx,
            &TripEvent::new(
                trip.id,
                Some(user.id),
                "trip.cancelled",
                serde_json::json!({ "reason": reason, "is_passenger": is_passenger }),
            ),
        )
        .await?;

        tx.commit().await?;

        self.forget_trip_monitors(&trip.id).await;

        self.gateway.emit_trip(
            trip.id,
            events::TRIP_CANCELLED,
            serde_json::json!({ "reason": reason, "by": user.id }),
        );

        Ok(trip)
    }

    #[tracing::instrument(skip(self))]
    async fn pay_trip(&self, user: User, id: Uuid) -> Result<Trip, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut trip = fetch_trip_for_update(&mut tx, &id).await?;

        self.authorize(user.clone(), "pay", trip.clone())?;

        trip.mark_paid()?;
        update_trip_where_status(&mut tx, &trip, "COMPLETED").await?;

        add_trip_event(
            &mut tx,
            &TripEvent::new(trip.id, Some(user.id), "trip.paid", serde_json::json!({})),
        )
        .await?;

        tx.commit().await?;

        Ok(trip)
    }

    #[tracing::instrument(skip(self, comment))]
    async fn rate_trip(
        &self,
        user: User,
        id: Uuid,
        rating: i16,
        comment: Option<String>,
    ) -> Result<(), Error> {
        if !(1..=5).contains(&rating) {
            return Err(invalid_input_error());
        }

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let trip = fetch_trip_for_update(&mut tx, &id).await?;

        self.authorize(user.clone(), "rate", trip.clone())?;

        if trip.status != Status::Completed {
            return Err(invalid_state_error());
        }

        add_trip_event(
            &mut tx,
            &TripEvent::new(
                trip.id,
                Some(user.id),
                "trip.rated",
                serde_json::json!({ "rating": rating, "comment": comment }),
            ),
        )
        .await?;

        tx.commit().await?;

        Ok(())
    }
}
