use axum::extract::{Extension, Json, Path};
use serde_json::json;
use uuid::Uuid;

use crate::auth::User;
use crate::entities::{ActorType, UserLevel};
use crate::error::Error;
use crate::server::DynAPI;

pub async fn find_level(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path((id, actor)): Path<(Uuid, ActorType)>,
) -> Result<Json<UserLevel>, Error> {
    let level = api.find_level(user, id, actor).await?;

    Ok(level.into())
}

pub async fn find_commission(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, Error> {
    let bps = api.find_commission_bps(user, id).await?;

    Ok(Json(json!({ "commission_bps": bps })))
}
