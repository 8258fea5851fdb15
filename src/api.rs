use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::User;
use crate::entities::{
    ActorType, Bid, CancelReason, DriverPresence, GeoZone, PremiumZone, SafetyAlert, Trip,
    TripEvent, TripRequest, UserBadge, UserLevel, UserRestriction, UserScore, ZoneType,
};
use crate::error::Error;
use crate::geo::Coordinates;

#[async_trait]
pub trait PresenceAPI {
    async fn heartbeat(
        &self,
        user: User,
        driver_id: Uuid,
        location: Coordinates,
        vehicle_category: Option<String>,
    ) -> Result<DriverPresence, Error>;

    async fn set_online(
        &self,
        user: User,
        driver_id: Uuid,
        online: bool,
    ) -> Result<DriverPresence, Error>;
}

#[async_trait]
pub trait TripAPI {
    async fn request_trip(
        &self,
        user: User,
        passenger_id: Uuid,
        request: TripRequest,
    ) -> Result<Trip, Error>;

    async fn find_trip(&self, user: User, id: Uuid) -> Result<Trip, Error>;

    async fn list_trip_events(&self, user: User, id: Uuid) -> Result<Vec<TripEvent>, Error>;

    async fn driver_en_route(&self, user: User, id: Uuid) -> Result<Trip, Error>;

    async fn driver_arrived(&self, user: User, id: Uuid) -> Result<Trip, Error>;

    async fn verify_otp(&self, user: User, id: Uuid, code: String) -> Result<Trip, Error>;

    async fn complete_trip(&self, user: User, id: Uuid) -> Result<Trip, Error>;

    async fn cancel_trip(
        &self,
        user: User,
        id: Uuid,
        reason: CancelReason,
    ) -> Result<Trip, Error>;

    async fn pay_trip(&self, user: User, id: Uuid) -> Result<Trip, Error>;

    async fn rate_trip(
        &self,
        user: User,
        id: Uuid,
        rating: i16,
        comment: Option<String>,
    ) -> Result<(), Error>;
}

#[async_trait]
pub trait BidAPI {
    async fn submit_bid(
        &self,
        user: User,
        trip_id: Uuid,
        driver_id: Uuid,
        price_offer: i64,
        eta_to_pickup_minutes: Option<i64>,
    ) -> Result<Bid, Error>;

    async fn list_bids(&self, user: User, trip_id: Uuid) -> Result<Vec<Bid>, Error>;

    async fn accept_bid(&self, user: User, trip_id: Uuid, bid_id: Uuid) -> Result<Trip, Error>;

    /// Sweeps trips whose bidding window has closed: auto-matches the best
    /// pending bid or expires the trip. Returns how many trips were settled.
    async fn settle_expired_bidding(&self, user: User) -> Result<u64, Error>;
}

#[async_trait]
pub trait LocationAPI {
    async fn track_location(
        &self,
        user: User,
        trip_id: Uuid,
        location: Coordinates,
    ) -> Result<(), Error>;

    /// Raises tracking-loss alerts for in-progress trips that have gone
    /// silent. Returns how many trips were flagged.
    async fn scan_tracking_loss(&self, user: User) -> Result<u64, Error>;
}

#[async_trait]
pub trait SafetyAPI {
    async fn list_alerts(&self, user: User, trip_id: Uuid) -> Result<Vec<SafetyAlert>, Error>;

    async fn acknowledge_alert(&self, user: User, alert_id: Uuid) -> Result<SafetyAlert, Error>;

    async fn resolve_alert(&self, user: User, alert_id: Uuid) -> Result<SafetyAlert, Error>;

    /// Passenger wellbeing confirmation after the trip's safety score fell
    /// below the check-in floor.
    async fn check_in(&self, user: User, trip_id: Uuid) -> Result<(), Error>;
}

#[async_trait]
pub trait ScoreAPI {
    async fn find_score(
        &self,
        user: User,
        user_id: Uuid,
        actor: ActorType,
    ) -> Result<UserScore, Error>;

    async fn adjust_score(
        &self,
        user: User,
        user_id: Uuid,
        actor: ActorType,
        delta: i64,
        notes: Option<String>,
    ) -> Result<UserScore, Error>;

    async fn find_badge(
        &self,
        user: User,
        user_id: Uuid,
        actor: ActorType,
    ) -> Result<UserBadge, Error>;

    async fn list_restrictions(
        &self,
        user: User,
        user_id: Uuid,
    ) -> Result<Vec<UserRestriction>, Error>;

    async fn lift_restriction(&self, user: User, restriction_id: Uuid)
        -> Result<UserRestriction, Error>;

    /// Inactivity-based score recovery, rate limited per policy.
    async fn request_recovery(
        &self,
        user: User,
        user_id: Uuid,
        actor: ActorType,
    ) -> Result<UserScore, Error>;
}

#[async_trait]
pub trait MeritAPI {
    async fn find_level(
        &self,
        user: User,
        user_id: Uuid,
        actor: ActorType,
    ) -> Result<UserLevel, Error>;

    /// Effective commission for a driver in basis points, after the level
    /// discount and the floor.
    async fn find_commission_bps(&self, user: User, driver_id: Uuid) -> Result<i64, Error>;
}

#[async_trait]
pub trait ZoneAPI {
    async fn create_zone(
        &self,
        user: User,
        name: String,
        zone_type: ZoneType,
        polygon: Vec<Coordinates>,
    ) -> Result<GeoZone, Error>;

    async fn list_zones(&self, user: User) -> Result<Vec<GeoZone>, Error>;

    async fn set_zone_active(&self, user: User, zone_id: Uuid, active: bool)
        -> Result<GeoZone, Error>;

    async fn create_premium_zone(
        &self,
        user: User,
        name: String,
        polygon: Vec<Coordinates>,
        min_driver_score: i64,
        min_passenger_score: i64,
    ) -> Result<PremiumZone, Error>;

    async fn list_premium_zones(&self, user: User) -> Result<Vec<PremiumZone>, Error>;
}

#[async_trait]
pub trait ConfigAPI {
    async fn find_config(&self, user: User, key: String) -> Result<serde_json::Value, Error>;

    async fn update_config(
        &self,
        user: User,
        key: String,
        value: serde_json::Value,
    ) -> Result<(), Error>;
}

#[async_trait]
pub trait FraudScanAPI {
    /// Periodic heuristics over recent trips (repeated pairs and the like).
    /// Returns how many signals were emitted.
    async fn run_fraud_scan(&self, user: User) -> Result<u64, Error>;
}

pub trait API:
    PresenceAPI
    + TripAPI
    + BidAPI
    + LocationAPI
    + SafetyAPI
    + ScoreAPI
    + MeritAPI
    + ZoneAPI
    + ConfigAPI
    + FraudScanAPI
{
}
