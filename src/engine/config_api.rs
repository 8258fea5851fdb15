use super::Engine;

use async_trait::async_trait;
use sqlx::{Executor, Row};

use crate::{
    api::ConfigAPI,
    auth::{Platform, User},
    error::{not_found_error, Error},
};

#[async_trait]
impl ConfigAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn find_config(&self, user: User, key: String) -> Result<serde_json::Value, Error> {
        self.authorize(user, "manage_config", Platform::default())?;

        let mut conn = self.pool.acquire().await?;

        let row = conn
            .fetch_optional(sqlx::query("SELECT value FROM app_config WHERE key = $1").bind(&key))
            .await?
            .ok_or_else(not_found_error)?;

        Ok(row.try_get("value")?)
    }

    #[tracing::instrument(skip(self, value))]
    async fn update_config(
        &self,
        user: User,
        key: String,
        value: serde_json::Value,
    ) -> Result<(), Error> {
        self.authorize(user, "manage_config", Platform::default())?;

        self.config.set(&key, value).await
    }
}
