use super::Database;

use chrono::{DateTime, Utc};
use sqlx::{types::Json, Executor, Row, Transaction};
use uuid::Uuid;

use crate::{
    entities::{
        ActorType, Bid, SafetyAlert, ScoreEvent, Trip, TripEvent, TripOtp, TripSafetyState,
        UserRestriction, UserScore,
    },
    error::{not_found_error, transition_conflict_error, Error},
};

#[tracing::instrument(skip(tx))]
pub async fn fetch_trip_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<Trip, Error> {
    let Json(trip): Json<Trip> = tx
        .fetch_optional(sqlx::query("SELECT data FROM trips WHERE id = $1 FOR UPDATE").bind(id))
        .await?
        .ok_or_else(not_found_error)?
        .try_get("data")?;

    Ok(trip)
}

#[tracing::instrument(skip(tx))]
pub async fn insert_trip(tx: &mut Transaction<'_, Database>, trip: &Trip) -> Result<(), Error> {
    tx.execute(
        sqlx::query("INSERT INTO trips (id, status, data) VALUES ($1, $2, $3)")
            .bind(trip.id)
            .bind(trip.status.name())
            .bind(Json(trip)),
    )
    .await?;

    Ok(())
}

/// Persists a trip whose status just transitioned, guarded by the status the
/// row must still hold. Zero rows updated means somebody else transitioned
/// the trip first.
#[tracing::instrument(skip(tx, trip))]
pub async fn update_trip_where_status(
    tx: &mut Transaction<'_, Database>,
    trip: &Trip,
    expected: &str,
) -> Result<(), Error> {
    let result = tx
        .execute(
            sqlx::query("UPDATE trips SET status = $2, data = $3 WHERE id = $1 AND status = $4")
                .bind(trip.id)
                .bind(trip.status.name())
                .bind(Json(trip))
                .bind(expected),
        )
        .await?;

    if result.rows_affected() == 0 {
        return Err(transition_conflict_error());
    }

    Ok(())
}

#[tracing::instrument(skip(tx, trip))]
pub async fn update_trip(tx: &mut Transaction<'_, Database>, trip: &Trip) -> Result<(), Error> {
    tx.execute(
        sqlx::query("UPDATE trips SET status = $2, data = $3 WHERE id = $1")
            .bind(trip.id)
            .bind(trip.status.name())
            .bind(Json(trip)),
    )
    .await?;

    Ok(())
}

#[tracing::instrument(skip(tx, event))]
pub async fn add_trip_event(
    tx: &mut Transaction<'_, Database>,
    event: &TripEvent,
) -> Result<(), Error> {
    tx.execute(
        sqlx::query("INSERT INTO trip_events (id, trip_id, created_at, data) VALUES ($1, $2, $3, $4)")
            .bind(event.id)
            .bind(event.trip_id)
            .bind(event.created_at)
            .bind(Json(event)),
    )
    .await?;

    Ok(())
}

#[tracing::instrument(skip(tx))]
pub async fn fetch_bid_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<Bid, Error> {
    let Json(bid): Json<Bid> = tx
        .fetch_optional(sqlx::query("SELECT data FROM trip_bids WHERE id = $1 FOR UPDATE").bind(id))
        .await?
        .ok_or_else(not_found_error)?
        .try_get("data")?;

    Ok(bid)
}

#[tracing::instrument(skip(tx, bid))]
pub async fn insert_bid(tx: &mut Transaction<'_, Database>, bid: &Bid) -> Result<(), Error> {
    tx.execute(
        sqlx::query(
            "INSERT INTO trip_bids (id, trip_id, driver_id, status, data) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(bid.id)
        .bind(bid.trip_id)
        .bind(bid.driver_id)
        .bind(bid.status.name())
        .bind(Json(bid)),
    )
    .await?;

    Ok(())
}

#[tracing::instrument(skip(tx, bid))]
pub async fn update_bid(tx: &mut Transaction<'_, Database>, bid: &Bid) -> Result<(), Error> {
    tx.execute(
        sqlx::query("UPDATE trip_bids SET status = $2, data = $3 WHERE id = $1")
            .bind(bid.id)
            .bind(bid.status.name())
            .bind(Json(bid)),
    )
    .await?;

    Ok(())
}

#[tracing::instrument(skip(tx))]
pub async fn fetch_pending_bids(
    tx: &mut Transaction<'_, Database>,
    trip_id: &Uuid,
) -> Result<Vec<Bid>, Error> {
    let rows = tx
        .fetch_all(
            sqlx::query("SELECT data FROM trip_bids WHERE trip_id = $1 AND status = 'PENDING'")
                .bind(trip_id),
        )
        .await?;

    let mut bids = Vec::with_capacity(rows.len());
    for row in rows {
        let Json(bid): Json<Bid> = row.try_get("data")?;
        bids.push(bid);
    }

    Ok(bids)
}

/// Loads a score row for update, creating the pristine row on first contact.
#[tracing::instrument(skip(tx))]
pub async fn fetch_score_for_update(
    tx: &mut Transaction<'_, Database>,
    user_id: &Uuid,
    actor: ActorType,
) -> Result<UserScore, Error> {
    let maybe_row = tx
        .fetch_optional(
            sqlx::query("SELECT data FROM user_scores WHERE user_id = $1 AND actor = $2 FOR UPDATE")
                .bind(user_id)
                .bind(actor.name()),
        )
        .await?;

    if let Some(row) = maybe_row {
        let Json(score): Json<UserScore> = row.try_get("data")?;
        return Ok(score);
    }

    let score = UserScore::new(*user_id, actor);

    tx.execute(
        sqlx::query(
            "INSERT INTO user_scores (user_id, actor, score, status, data) VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (user_id, actor) DO NOTHING",
        )
        .bind(score.user_id)
        .bind(actor.name())
        .bind(score.score)
        .bind(score.status.name())
        .bind(Json(&score)),
    )
    .await?;

    Ok(score)
}

#[tracing::instrument(skip(tx, score))]
pub async fn update_score(
    tx: &mut Transaction<'_, Database>,
    score: &UserScore,
) -> Result<(), Error> {
    tx.execute(
        sqlx::query(
            "UPDATE user_scores SET score = $3, status = $4, data = $5 WHERE user_id = $1 AND actor = $2",
        )
        .bind(score.user_id)
        .bind(score.actor.name())
        .bind(score.score)
        .bind(score.status.name())
        .bind(Json(score)),
    )
    .await?;

    Ok(())
}

#[tracing::instrument(skip(tx))]
pub async fn fetch_safety_state_for_update(
    tx: &mut Transaction<'_, Database>,
    trip_id: &Uuid,
) -> Result<Option<TripSafetyState>, Error> {
    let maybe_row = tx
        .fetch_optional(
            sqlx::query("SELECT data FROM trip_safety_states WHERE trip_id = $1 FOR UPDATE")
                .bind(trip_id),
        )
        .await?;

    match maybe_row {
        Some(row) => {
            let Json(state): Json<TripSafetyState> = row.try_get("data")?;
            Ok(Some(state))
        }
        None => Ok(None),
    }
}

#[tracing::instrument(skip(tx, state))]
pub async fn upsert_safety_state(
    tx: &mut Transaction<'_, Database>,
    state: &TripSafetyState,
) -> Result<(), Error> {
    tx.execute(
        sqlx::query(
            "INSERT INTO trip_safety_states (trip_id, data) VALUES ($1, $2)
             ON CONFLICT (trip_id) DO UPDATE SET data = $2",
        )
        .bind(state.trip_id)
        .bind(Json(state)),
    )
    .await?;

    Ok(())
}

#[tracing::instrument(skip(tx, alert))]
pub async fn insert_safety_alert(
    tx: &mut Transaction<'_, Database>,
    alert: &SafetyAlert,
) -> Result<(), Error> {
    tx.execute(
        sqlx::query("INSERT INTO safety_alerts (id, trip_id, status, data) VALUES ($1, $2, $3, $4)")
            .bind(alert.id)
            .bind(alert.trip_id)
            .bind(alert.status.name())
            .bind(Json(alert)),
    )
    .await?;

    Ok(())
}

#[tracing::instrument(skip(tx))]
pub async fn fetch_alert_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<SafetyAlert, Error> {
    let Json(alert): Json<SafetyAlert> = tx
        .fetch_optional(
            sqlx::query("SELECT data FROM safety_alerts WHERE id = $1 FOR UPDATE").bind(id),
        )
        .await?
        .ok_or_else(not_found_error)?
        .try_get("data")?;

    Ok(alert)
}

#[tracing::instrument(skip(tx, alert))]
pub async fn update_safety_alert(
    tx: &mut Transaction<'_, Database>,
    alert: &SafetyAlert,
) -> Result<(), Error> {
    tx.execute(
        sqlx::query("UPDATE safety_alerts SET status = $2, data = $3 WHERE id = $1")
            .bind(alert.id)
            .bind(alert.status.name())
            .bind(Json(alert)),
    )
    .await?;

    Ok(())
}

#[tracing::instrument(skip(tx))]
pub async fn fetch_otp_for_update(
    tx: &mut Transaction<'_, Database>,
    trip_id: &Uuid,
) -> Result<TripOtp, Error> {
    let Json(otp): Json<TripOtp> = tx
        .fetch_optional(
            sqlx::query("SELECT data FROM trip_otps WHERE trip_id = $1 FOR UPDATE").bind(trip_id),
        )
        .await?
        .ok_or_else(not_found_error)?
        .try_get("data")?;

    Ok(otp)
}

#[tracing::instrument(skip(tx, otp))]
pub async fn upsert_otp(tx: &mut Transaction<'_, Database>, otp: &TripOtp) -> Result<(), Error> {
    tx.execute(
        sqlx::query(
            "INSERT INTO trip_otps (trip_id, data) VALUES ($1, $2)
             ON CONFLICT (trip_id) DO UPDATE SET data = $2",
        )
        .bind(otp.trip_id)
        .bind(Json(otp)),
    )
    .await?;

    Ok(())
}

#[tracing::instrument(skip(tx, event))]
pub async fn insert_score_event(
    tx: &mut Transaction<'_, Database>,
    event: &ScoreEvent,
) -> Result<(), Error> {
    tx.execute(
        sqlx::query(
            "INSERT INTO score_events (id, user_id, actor, kind, delta, created_at, data) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(event.id)
        .bind(event.user_id)
        .bind(event.actor.name())
        .bind(event.kind.name())
        .bind(event.delta)
        .bind(event.created_at)
        .bind(Json(event)),
    )
    .await?;

    Ok(())
}

#[tracing::instrument(skip(tx, restriction))]
pub async fn insert_restriction(
    tx: &mut Transaction<'_, Database>,
    restriction: &UserRestriction,
) -> Result<(), Error> {
    tx.execute(
        sqlx::query(
            "INSERT INTO user_restrictions (id, user_id, actor, status, ends_at, data) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(restriction.id)
        .bind(restriction.user_id)
        .bind(restriction.actor.name())
        .bind(restriction.status.name())
        .bind(restriction.ends_at)
        .bind(Json(restriction)),
    )
    .await?;

    Ok(())
}

/// Restrictions still in force for a user role at the given moment.
#[tracing::instrument(skip(tx))]
pub async fn fetch_active_restrictions(
    tx: &mut Transaction<'_, Database>,
    user_id: &Uuid,
    actor: ActorType,
    at: DateTime<Utc>,
) -> Result<Vec<UserRestriction>, Error> {
    let rows = tx
        .fetch_all(
            sqlx::query(
                "SELECT data FROM user_restrictions
                 WHERE user_id = $1 AND actor = $2 AND (ends_at IS NULL OR ends_at > $3)",
            )
            .bind(user_id)
            .bind(actor.name())
            .bind(at),
        )
        .await?;

    let mut restrictions = Vec::with_capacity(rows.len());
    for row in rows {
        let Json(restriction): Json<UserRestriction> = row.try_get("data")?;
        restrictions.push(restriction);
    }

    Ok(restrictions)
}
