use axum::extract::{Extension, Json, Path};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::User;
use crate::entities::{ActorType, UserBadge, UserRestriction, UserScore};
use crate::error::Error;
use crate::server::DynAPI;

#[derive(Serialize, Deserialize)]
pub struct AdjustParams {
    delta: i64,
    notes: Option<String>,
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path((id, actor)): Path<(Uuid, ActorType)>,
) -> Result<Json<UserScore>, Error> {
    let score = api.find_score(user, id, actor).await?;

    Ok(score.into())
}

pub async fn adjust(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path((id, actor)): Path<(Uuid, ActorType)>,
    Json(params): Json<AdjustParams>,
) -> Result<Json<UserScore>, Error> {
    let score = api
        .adjust_score(user, id, actor, params.delta, params.notes)
        .await?;

    Ok(score.into())
}

pub async fn request_recovery(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path((id, actor)): Path<(Uuid, ActorType)>,
) -> Result<Json<UserScore>, Error> {
    let score = api.request_recovery(user, id, actor).await?;

    Ok(score.into())
}

pub async fn find_badge(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path((id, actor)): Path<(Uuid, ActorType)>,
) -> Result<Json<UserBadge>, Error> {
    let badge = api.find_badge(user, id, actor).await?;

    Ok(badge.into())
}

pub async fn list_restrictions(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<UserRestriction>>, Error> {
    let restrictions = api.list_restrictions(user, id).await?;

    Ok(restrictions.into())
}

pub async fn lift_restriction(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserRestriction>, Error> {
    let restriction = api.lift_restriction(user, id).await?;

    Ok(restriction.into())
}
