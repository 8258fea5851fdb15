use axum::extract::{Extension, Json, Path};

use crate::auth::User;
use crate::error::Error;
use crate::server::DynAPI;

pub async fn find(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(key): Path<String>,
) -> Result<Json<serde_json::Value>, Error> {
    let value = api.find_config(user, key).await?;

    Ok(value.into())
}

pub async fn update(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(key): Path<String>,
    Json(value): Json<serde_json::Value>,
) -> Result<(), Error> {
    api.update_config(user, key, value).await
}
