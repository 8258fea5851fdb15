use std::sync::Arc;
use std::time::Duration;

use crate::api::API;
use crate::auth::User;

const BIDDING_SWEEP_INTERVAL: Duration = Duration::from_secs(1);
const TRACKING_SWEEP_INTERVAL: Duration = Duration::from_secs(5);
const FRAUD_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

type DynAPI = Arc<dyn API + Send + Sync>;

/// Launches the background loops that keep trips moving without client
/// traffic: bidding-window settlement, tracking-loss detection and the
/// periodic fraud scan. Each loop acts as the system user.
pub fn spawn(api: DynAPI) {
    tokio::spawn(settle_bidding_loop(api.clone()));
    tokio::spawn(tracking_loss_loop(api.clone()));
    tokio::spawn(fraud_scan_loop(api));
}

async fn settle_bidding_loop(api: DynAPI) {
    let mut interval = tokio::time::interval(BIDDING_SWEEP_INTERVAL);

    loop {
        interval.tick().await;

        match api.settle_expired_bidding(User::new_system_user()).await {
            Ok(0) => {}
            Ok(settled) => tracing::info!(settled, "settled expired bidding windows"),
            Err(err) => tracing::warn!(?err, "bidding sweep failed"),
        }
    }
}

async fn tracking_loss_loop(api: DynAPI) {
    let mut interval = tokio::time::interval(TRACKING_SWEEP_INTERVAL);

    loop {
        interval.tick().await;

        match api.scan_tracking_loss(User::new_system_user()).await {
            Ok(0) => {}
            Ok(flagged) => tracing::info!(flagged, "flagged trips with tracking loss"),
            Err(err) => tracing::warn!(?err, "tracking sweep failed"),
        }
    }
}

async fn fraud_scan_loop(api: DynAPI) {
    let mut interval = tokio::time::interval(FRAUD_SWEEP_INTERVAL);

    loop {
        interval.tick().await;

        match api.run_fraud_scan(User::new_system_user()).await {
            Ok(0) => {}
            Ok(signals) => tracing::info!(signals, "fraud scan emitted signals"),
            Err(err) => tracing::warn!(?err, "fraud scan failed"),
        }
    }
}
