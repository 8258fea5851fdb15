mod bid_api;
mod config_api;
mod fraud_api;
mod helpers;
mod location_api;
mod merit_api;
mod presence_api;
mod safety_api;
mod score_api;
mod trip_api;
mod zone_api;

use std::collections::HashMap;
use std::sync::Arc;

use oso::Oso;
use sqlx::{Executor, Pool, Postgres};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    api::API,
    auth::authorizor,
    config::ConfigStore,
    error::{unauthorized_error, Error},
    fraud::FraudSink,
    gateway::Gateway,
    monitor::{DeviationWindow, PingThrottle, TrackingMonitor},
};

type Database = Postgres;

pub struct Engine {
    pool: Pool<Database>,
    authorizor: Oso,
    config: ConfigStore,
    gateway: Arc<dyn Gateway>,
    fraud: Arc<dyn FraudSink>,
    deviations: Mutex<HashMap<Uuid, DeviationWindow>>,
    tracking: Mutex<HashMap<Uuid, TrackingMonitor>>,
    location_throttle: Mutex<PingThrottle>,
}

impl Engine {
    #[tracing::instrument(name = "Engine::new", skip_all)]
    pub async fn new(
        pool: Pool<Database>,
        gateway: Arc<dyn Gateway>,
        fraud: Arc<dyn FraudSink>,
    ) -> Result<Self, Error> {
        pool.execute(
            "CREATE TABLE IF NOT EXISTS trips (id UUID PRIMARY KEY, status VARCHAR NOT NULL, data JSONB NOT NULL)",
        )
        .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS trip_bids (id UUID PRIMARY KEY, trip_id UUID NOT NULL, driver_id UUID NOT NULL, status VARCHAR NOT NULL, data JSONB NOT NULL)",
        )
        .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS trip_events (id UUID PRIMARY KEY, trip_id UUID NOT NULL, created_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL)",
        )
        .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS trip_route_baselines (trip_id UUID PRIMARY KEY, data JSONB NOT NULL)",
        )
        .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS trip_safety_states (trip_id UUID PRIMARY KEY, data JSONB NOT NULL)",
        )
        .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS safety_alerts (id UUID PRIMARY KEY, trip_id UUID NOT NULL, status VARCHAR NOT NULL, data JSONB NOT NULL)",
        )
        .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS trip_locations (trip_id UUID NOT NULL, lat DOUBLE PRECISION NOT NULL, lng DOUBLE PRECISION NOT NULL, recorded_at TIMESTAMPTZ NOT NULL)",
        )
        .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS trip_otps (trip_id UUID PRIMARY KEY, data JSONB NOT NULL)",
        )
        .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS driver_presences (driver_id UUID PRIMARY KEY, last_seen_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL)",
        )
        .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS user_scores (user_id UUID NOT NULL, actor VARCHAR NOT NULL, score INT8 NOT NULL, status VARCHAR NOT NULL, data JSONB NOT NULL, PRIMARY KEY (user_id, actor))",
        )
        .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS score_events (id UUID PRIMARY KEY, user_id UUID NOT NULL, actor VARCHAR NOT NULL, kind VARCHAR NOT NULL, delta INT8 NOT NULL, created_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL)",
        )
        .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS user_restrictions (id UUID PRIMARY KEY, user_id UUID NOT NULL, actor VARCHAR NOT NULL, status VARCHAR NOT NULL, ends_at TIMESTAMPTZ, data JSONB NOT NULL)",
        )
        .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS user_levels (user_id UUID NOT NULL, actor VARCHAR NOT NULL, data JSONB NOT NULL, PRIMARY KEY (user_id, actor))",
        )
        .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS user_badges (user_id UUID NOT NULL, actor VARCHAR NOT NULL, data JSONB NOT NULL, PRIMARY KEY (user_id, actor))",
        )
        .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS geo_zones (id UUID PRIMARY KEY, data JSONB NOT NULL)",
        )
        .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS premium_zones (id UUID PRIMARY KEY, data JSONB NOT NULL)",
        )
        .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS app_config (key VARCHAR PRIMARY KEY, value JSONB NOT NULL, updated_at TIMESTAMPTZ NOT NULL)",
        )
        .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS peak_gate_events (id UUID PRIMARY KEY, user_id UUID NOT NULL, actor VARCHAR NOT NULL, created_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL)",
        )
        .await?;

        Ok(Self {
            config: ConfigStore::new(pool.clone()),
            pool,
            authorizor: authorizor::new()?,
            gateway,
            fraud,
            deviations: Mutex::new(HashMap::new()),
            tracking: Mutex::new(HashMap::new()),
            location_throttle: Mutex::new(PingThrottle::default()),
        })
    }
}

impl Engine {
    pub fn authorize<Actor, Action, Resource>(
        &self,
        actor: Actor,
        action: Action,
        resource: Resource,
    ) -> Result<(), Error>
    where
        Actor: oso::ToPolar,
        Action: oso::ToPolar,
        Resource: oso::ToPolar,
    {
        if self.authorizor.is_allowed(actor, action, resource)? {
            return Ok(());
        }

        Err(unauthorized_error())
    }
}

impl API for Engine {}
