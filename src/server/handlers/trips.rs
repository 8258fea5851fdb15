use axum::extract::{Extension, Json, Path};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::User;
use crate::entities::{CancelReason, Trip, TripEvent, TripRequest};
use crate::error::Error;
use crate::server::DynAPI;

#[derive(Serialize, Deserialize)]
pub struct CreateParams {
    passenger_id: Uuid,
    request: TripRequest,
}

#[derive(Serialize, Deserialize)]
pub struct VerifyOtpParams {
    code: String,
}

#[derive(Serialize, Deserialize)]
pub struct CancelParams {
    reason: CancelReason,
}

#[derive(Serialize, Deserialize)]
pub struct RateParams {
    rating: i16,
    comment: Option<String>,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Json(params): Json<CreateParams>,
) -> Result<Json<Trip>, Error> {
    let trip = api
        .request_trip(user, params.passenger_id, params.request)
        .await?;

    Ok(trip.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<Trip>, Error> {
    let trip = api.find_trip(user, id).await?;

    Ok(trip.into())
}

pub async fn list_events(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TripEvent>>, Error> {
    let events = api.list_trip_events(user, id).await?;

    Ok(events.into())
}

pub async fn en_route(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<Trip>, Error> {
    let trip = api.driver_en_route(user, id).await?;

    Ok(trip.into())
}

pub async fn arrive(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<Trip>, Error> {
    let trip = api.driver_arrived(user, id).await?;

    Ok(trip.into())
}

pub async fn verify_otp(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(params): Json<VerifyOtpParams>,
) -> Result<Json<Trip>, Error> {
    let trip = api.verify_otp(user, id, params.code).await?;

    Ok(trip.into())
}

pub async fn complete(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<Trip>, Error> {
    let trip = api.complete_trip(user, id).await?;

    Ok(trip.into())
}

pub async fn cancel(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(params): Json<CancelParams>,
) -> Result<Json<Trip>, Error> {
    let trip = api.cancel_trip(user, id, params.reason).await?;

    Ok(trip.into())
}

pub async fn pay(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<Trip>, Error> {
    let trip = api.pay_trip(user, id).await?;

    Ok(trip.into())
}

pub async fn rate(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(params): Json<RateParams>,
) -> Result<(), Error> {
    api.rate_trip(user, id, params.rating, params.comment).await
}
