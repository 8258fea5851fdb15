use super::Engine;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{types::Json, Executor, Row};
use uuid::Uuid;

use crate::{
    api::ZoneAPI,
    auth::{Platform, User},
    entities::{normalize_polygon, GeoZone, PremiumZone, ZoneType},
    error::{not_found_error, Error},
    geo::Coordinates,
};

#[async_trait]
impl ZoneAPI for Engine {
    #[tracing::instrument(skip(self, polygon))]
    async fn create_zone(
        &self,
        user: User,
        name: String,
        zone_type: ZoneType,
        polygon: Vec<Coordinates>,
    ) -> Result<GeoZone, Error> {
        self.authorize(user, "manage_zones", Platform::default())?;

        let zone = GeoZone::new(name, zone_type, polygon)?;

        let mut conn = self.pool.acquire().await?;
        conn.execute(
            sqlx::query("INSERT INTO geo_zones (id, data) VALUES ($1, $2)")
                .bind(zone.id)
                .bind(Json(&zone)),
        )
        .await?;

        Ok(zone)
    }

    #[tracing::instrument(skip(self))]
    async fn list_zones(&self, user: User) -> Result<Vec<GeoZone>, Error> {
        self.authorize(user, "manage_zones", Platform::default())?;

        self.load_zones().await
    }

    #[tracing::instrument(skip(self))]
    async fn set_zone_active(
        &self,
        user: User,
        zone_id: Uuid,
        active: bool,
    ) -> Result<GeoZone, Error> {
        self.authorize(user, "manage_zones", Platform::default())?;

        let mut conn = self.pool.acquire().await?;

        let Json(mut zone): Json<GeoZone> = conn
            .fetch_optional(sqlx::query("SELECT data FROM geo_zones WHERE id = $1").bind(zone_id))
            .await?
            .ok_or_else(not_found_error)?
            .try_get("data")?;

        zone.is_active = active;

        conn.execute(
            sqlx::query("UPDATE geo_zones SET data = $2 WHERE id = $1")
                .bind(zone.id)
                .bind(Json(&zone)),
        )
        .await?;

        Ok(zone)
    }

    #[tracing::instrument(skip(self, polygon))]
    async fn create_premium_zone(
        &self,
        user: User,
        name: String,
        polygon: Vec<Coordinates>,
        min_driver_score: i64,
        min_passenger_score: i64,
    ) -> Result<PremiumZone, Error> {
        self.authorize(user, "manage_zones", Platform::default())?;

        let zone = PremiumZone {
            id: Uuid::new_v4(),
            name,
            is_active: true,
            polygon: normalize_polygon(polygon)?,
            min_driver_score,
            min_passenger_score,
            created_at: Utc::now(),
        };

        let mut conn = self.pool.acquire().await?;
        conn.execute(
            sqlx::query("INSERT INTO premium_zones (id, data) VALUES ($1, $2)")
                .bind(zone.id)
                .bind(Json(&zone)),
        )
        .await?;

        Ok(zone)
    }

    #[tracing::instrument(skip(self))]
    async fn list_premium_zones(&self, user: User) -> Result<Vec<PremiumZone>, Error> {
        self.authorize(user, "manage_zones", Platform::default())?;

        let mut conn = self.pool.acquire().await?;
        let rows = conn
            .fetch_all(sqlx::query("SELECT data FROM premium_zones"))
            .await?;

        let mut zones = Vec::with_capacity(rows.len());
        for row in rows {
            let Json(zone): Json<PremiumZone> = row.try_get("data")?;
            zones.push(zone);
        }

        Ok(zones)
    }
}
