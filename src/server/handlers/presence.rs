use axum::extract::{Extension, Json, Path};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::User;
use crate::entities::DriverPresence;
use crate::error::Error;
use crate::geo::Coordinates;
use crate::server::DynAPI;

#[derive(Serialize, Deserialize)]
pub struct HeartbeatParams {
    location: Coordinates,
    vehicle_category: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct SetOnlineParams {
    online: bool,
}

pub async fn heartbeat(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(params): Json<HeartbeatParams>,
) -> Result<Json<DriverPresence>, Error> {
    let presence = api
        .heartbeat(user, id, params.location, params.vehicle_category)
        .await?;

    Ok(presence.into())
}

pub async fn set_online(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(params): Json<SetOnlineParams>,
) -> Result<Json<DriverPresence>, Error> {
    let presence = api.set_online(user, id, params.online).await?;

    Ok(presence.into())
}
