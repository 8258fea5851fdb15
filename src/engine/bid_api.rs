use super::helpers::{
    add_trip_event, fetch_bid_for_update, fetch_pending_bids, fetch_trip_for_update, insert_bid,
    update_bid, update_trip_where_status,
};
use super::{Database, Engine};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{types::Json, Acquire, Executor, Row, Transaction};
use uuid::Uuid;

use crate::{
    api::BidAPI,
    auth::{Platform, User},
    entities::{
        select_auto_match, validate_price_offer, ActorType, Bid, BidStatus, Status, Trip,
        TripEvent,
    },
    error::{invalid_input_error, invalid_state_error, Error},
    gateway::events,
};

const SWEEP_BATCH_SIZE: i64 = 50;

impl Engine {
    async fn reject_other_pending_bids(
        &self,
        tx: &mut Transaction<'_, Database>,
        trip_id: &Uuid,
        winner_id: &Uuid,
    ) -> Result<(), Error> {
        let pending = fetch_pending_bids(tx, trip_id).await?;

        for mut bid in pending {
            if bid.id == *winner_id {
                continue;
            }
            bid.status = BidStatus::Rejected;
            update_bid(tx, &bid).await?;
        }

        Ok(())
    }

    /// Settles one trip whose bidding window has closed: the best pending bid
    /// wins, or the trip expires unserved. Ok(false) means another worker got
    /// there first.
    async fn settle_one(&self, trip_id: Uuid) -> Result<bool, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut trip = fetch_trip_for_update(&mut tx, &trip_id).await?;

        if trip.status != Status::Bidding || trip.bidding_expires_at > Utc::now() {
            return Ok(false);
        }

        let pending = fetch_pending_bids(&mut tx, &trip_id).await?;

        match select_auto_match(&pending) {
            Some(winner) => {
                let mut winner = winner.clone();
                winner.status = BidStatus::AutoSelected;
                update_bid(&mut tx, &winner).await?;

                self.reject_other_pending_bids(&mut tx, &trip_id, &winner.id)
                    .await?;
                self.settle_match(&mut tx, &mut trip, winner.driver_id, winner.price_offer, true)
                    .await?;

                tx.commit().await?;
            }
            None => {
                trip.expire()?;
                update_trip_where_status(&mut tx, &trip, "BIDDING").await?;

                add_trip_event(
                    &mut tx,
                    &TripEvent::new(trip.id, None, "trip.expired", serde_json::json!({})),
                )
                .await?;

                tx.commit().await?;

                self.gateway.emit_trip(
                    trip.id,
                    events::TRIP_CANCELLED,
                    serde_json::json!({ "reason": "expired_no_driver" }),
                );
            }
        }

        Ok(true)
    }
}

#[async_trait]
impl BidAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn submit_bid(
        &self,
        user: User,
        trip_id: Uuid,
        driver_id: Uuid,
        price_offer: i64,
        eta_to_pickup_minutes: Option<i64>,
    ) -> Result<Bid, Error> {
        if user.id != driver_id {
            self.authorize(user.clone(), "bid", Platform::default())?;
        }

        self.check_peak_gate(driver_id, ActorType::Driver).await?;

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let trip = fetch_trip_for_update(&mut tx, &trip_id).await?;

        if trip.status != Status::Bidding || trip.bidding_expires_at <= Utc::now() {
            return Err(invalid_state_error());
        }

        validate_price_offer(price_offer, trip.price_base)?;

        // one bid per driver per trip
        let row = tx
            .fetch_one(
                sqlx::query(
                    "SELECT COUNT(*) AS total FROM trip_bids WHERE trip_id = $1 AND driver_id = $2",
                )
                .bind(trip_id)
                .bind(driver_id),
            )
            .await?;
        let existing: i64 = row.try_get("total")?;
        if existing > 0 {
            return Err(invalid_input_error());
        }

        let bid = Bid::new(trip_id, driver_id, price_offer, eta_to_pickup_minutes);
        insert_bid(&mut tx, &bid).await?;

        add_trip_event(
            &mut tx,
            &TripEvent::new(
                trip_id,
                Some(driver_id),
                "trip.bid.received",
                serde_json::json!({ "bid_id": bid.id, "price_offer": price_offer }),
            ),
        )
        .await?;

        tx.commit().await?;

        self.gateway.emit_user(
            trip.passenger_id,
            events::TRIP_BID_RECEIVED,
            serde_json::to_value(&bid)?,
        );

        Ok(bid)
    }

    #[tracing::instrument(skip(self))]
    async fn list_bids(&self, user: User, trip_id: Uuid) -> Result<Vec<Bid>, Error> {
        let trip = self.fetch_trip(&trip_id).await?;

        self.authorize(user, "read", trip)?;

        let mut conn = self.pool.acquire().await?;
        let rows = conn
            .fetch_all(sqlx::query("SELECT data FROM trip_bids WHERE trip_id = $1").bind(trip_id))
            .await?;

        let mut bids = Vec::with_capacity(rows.len());
        for row in rows {
            let Json(bid): Json<Bid> = row.try_get("data")?;
            bids.push(bid);
        }

        Ok(bids)
    }

    #[tracing::instrument(skip(self))]
    async fn accept_bid(&self, user: User, trip_id: Uuid, bid_id: Uuid) -> Result<Trip, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut trip = fetch_trip_for_update(&mut tx, &trip_id).await?;

        self.authorize(user.clone(), "accept_bid", trip.clone())?;

        if trip.status != Status::Bidding {
            return Err(invalid_state_error());
        }

        let mut bid = fetch_bid_for_update(&mut tx, &bid_id).await?;

        if bid.trip_id != trip_id || !bid.is_pending() {
            return Err(invalid_input_error());
        }

        bid.status = BidStatus::Accepted;
        update_bid(&mut tx, &bid).await?;

        self.reject_other_pending_bids(&mut tx, &trip_id, &bid.id)
            .await?;
        self.settle_match(&mut tx, &mut trip, bid.driver_id, bid.price_offer, false)
            .await?;

        tx.commit().await?;

        Ok(trip)
    }

    #[tracing::instrument(skip(self))]
    async fn settle_expired_bidding(&self, user: User) -> Result<u64, Error> {
        self.authorize(user, "settle_bidding", Platform::default())?;

        let mut conn = self.pool.acquire().await?;

        let rows = conn
            .fetch_all(
                sqlx::query(
                    "SELECT id FROM trips
                     WHERE status = 'BIDDING' AND (data->>'bidding_expires_at')::timestamptz <= now()
                     LIMIT $1",
                )
                .bind(SWEEP_BATCH_SIZE),
            )
            .await?;

        drop(conn);

        let mut settled = 0u64;
        for row in rows {
            let trip_id: Uuid = row.try_get("id")?;

            match self.settle_one(trip_id).await {
                Ok(true) => settled += 1,
                Ok(false) => {}
                // a concurrent manual accept is not a sweep failure
                Err(err) if err.code == crate::error::TRANSITION_CONFLICT_CODE => {}
                Err(err) => return Err(err),
            }
        }

        Ok(settled)
    }
}
