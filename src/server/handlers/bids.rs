use axum::extract::{Extension, Json, Path};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::User;
use crate::entities::{Bid, Trip};
use crate::error::Error;
use crate::server::DynAPI;

#[derive(Serialize, Deserialize)]
pub struct CreateParams {
    driver_id: Uuid,
    price_offer: i64,
    eta_to_pickup_minutes: Option<i64>,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(params): Json<CreateParams>,
) -> Result<Json<Bid>, Error> {
    let bid = api
        .submit_bid(
            user,
            id,
            params.driver_id,
            params.price_offer,
            params.eta_to_pickup_minutes,
        )
        .await?;

    Ok(bid.into())
}

pub async fn list(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Bid>>, Error> {
    let bids = api.list_bids(user, id).await?;

    Ok(bids.into())
}

pub async fn accept(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path((id, bid_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Trip>, Error> {
    let trip = api.accept_bid(user, id, bid_id).await?;

    Ok(trip.into())
}
