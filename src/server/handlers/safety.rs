use axum::extract::{Extension, Json, Path};
use uuid::Uuid;

use crate::auth::User;
use crate::entities::SafetyAlert;
use crate::error::Error;
use crate::server::DynAPI;

pub async fn list_alerts(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<SafetyAlert>>, Error> {
    let alerts = api.list_alerts(user, id).await?;

    Ok(alerts.into())
}

pub async fn check_in(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<(), Error> {
    api.check_in(user, id).await
}

pub async fn acknowledge(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<SafetyAlert>, Error> {
    let alert = api.acknowledge_alert(user, id).await?;

    Ok(alert.into())
}

pub async fn resolve(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<SafetyAlert>, Error> {
    let alert = api.resolve_alert(user, id).await?;

    Ok(alert.into())
}
