use axum::extract::{Extension, Json, Path};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::User;
use crate::error::Error;
use crate::geo::Coordinates;
use crate::server::DynAPI;

#[derive(Serialize, Deserialize)]
pub struct TrackParams {
    location: Coordinates,
}

pub async fn track(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(params): Json<TrackParams>,
) -> Result<(), Error> {
    api.track_location(user, id, params.location).await
}
