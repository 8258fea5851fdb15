use axum::extract::{Extension, Json, Path};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::User;
use crate::entities::{GeoZone, PremiumZone, ZoneType};
use crate::error::Error;
use crate::geo::Coordinates;
use crate::server::DynAPI;

#[derive(Serialize, Deserialize)]
pub struct CreateParams {
    name: String,
    zone_type: ZoneType,
    polygon: Vec<Coordinates>,
}

#[derive(Serialize, Deserialize)]
pub struct SetActiveParams {
    active: bool,
}

#[derive(Serialize, Deserialize)]
pub struct CreatePremiumParams {
    name: String,
    polygon: Vec<Coordinates>,
    min_driver_score: i64,
    min_passenger_score: i64,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Json(params): Json<CreateParams>,
) -> Result<Json<GeoZone>, Error> {
    let zone = api
        .create_zone(user, params.name, params.zone_type, params.polygon)
        .await?;

    Ok(zone.into())
}

pub async fn list(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<GeoZone>>, Error> {
    let zones = api.list_zones(user).await?;

    Ok(zones.into())
}

pub async fn set_active(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(params): Json<SetActiveParams>,
) -> Result<Json<GeoZone>, Error> {
    let zone = api.set_zone_active(user, id, params.active).await?;

    Ok(zone.into())
}

pub async fn create_premium(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Json(params): Json<CreatePremiumParams>,
) -> Result<Json<PremiumZone>, Error> {
    let zone = api
        .create_premium_zone(
            user,
            params.name,
            params.polygon,
            params.min_driver_score,
            params.min_passenger_score,
        )
        .await?;

    Ok(zone.into())
}

pub async fn list_premium(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<PremiumZone>>, Error> {
    let zones = api.list_premium_zones(user).await?;

    Ok(zones.into())
}
