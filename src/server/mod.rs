mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, patch, post, put},
    Router,
};

use crate::server::handlers::{bids, config, locations, merit, presence, safety, scores, trips, zones};
use crate::{api::API, auth::User};

pub type DynAPI = Arc<dyn API + Send + Sync>;

pub async fn serve(api: DynAPI) {
    let app = Router::new()
        .route("/drivers/:id/heartbeat", post(presence::heartbeat))
        .route("/drivers/:id/online", patch(presence::set_online))
        .route("/drivers/:id/commission", get(merit::find_commission))
        .route("/trips", post(trips::create))
        .route("/trips/:id", get(trips::find))
        .route("/trips/:id/events", get(trips::list_events))
        .route("/trips/:id/en_route", patch(trips::en_route))
        .route("/trips/:id/arrive", patch(trips::arrive))
        .route("/trips/:id/verify_otp", patch(trips::verify_otp))
        .route("/trips/:id/complete", patch(trips::complete))
        .route("/trips/:id/cancel", patch(trips::cancel))
        .route("/trips/:id/pay", patch(trips::pay))
        .route("/trips/:id/rating", post(trips::rate))
        .route("/trips/:id/bids", post(bids::create).get(bids::list))
        .route("/trips/:id/bids/:bid_id/accept", patch(bids::accept))
        .route("/trips/:id/location", post(locations::track))
        .route("/trips/:id/alerts", get(safety::list_alerts))
        .route("/trips/:id/check_in", post(safety::check_in))
        .route("/alerts/:id/acknowledge", patch(safety::acknowledge))
        .route("/alerts/:id/resolve", patch(safety::resolve))
        .route("/users/:id/scores/:actor", get(scores::find).patch(scores::adjust))
        .route("/users/:id/scores/:actor/recovery", post(scores::request_recovery))
        .route("/users/:id/badges/:actor", get(scores::find_badge))
        .route("/users/:id/restrictions", get(scores::list_restrictions))
        .route("/users/:id/levels/:actor", get(merit::find_level))
        .route("/restrictions/:id/lift", patch(scores::lift_restriction))
        .route("/zones", post(zones::create).get(zones::list))
        .route("/zones/:id/active", patch(zones::set_active))
        .route("/premium_zones", post(zones::create_premium).get(zones::list_premium))
        .route("/config/:key", get(config::find).put(config::update))
        .layer(Extension(api))
        .layer(Extension(User::new_system_user()));

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));

    tracing::info!("listening on {}", addr);

    if let Err(err) = axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
    {
        tracing::error!(%err, "server exited");
    }
}
