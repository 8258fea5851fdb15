use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{invalid_input_error, Error};

/// Weight applied to the pickup ETA (in minutes) when ranking bids during
/// auto-match; price units per minute.
pub const AUTO_MATCH_ETA_WEIGHT: i64 = 10;

pub const MIN_PRICE_FACTOR: f64 = 0.7;
pub const MAX_PRICE_FACTOR: f64 = 2.0;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bid {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub driver_id: Uuid,
    pub price_offer: i64,
    pub eta_to_pickup_minutes: Option<i64>,
    pub status: BidStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Pending,
    Accepted,
    Rejected,
    AutoSelected,
}

impl BidStatus {
    pub fn name(&self) -> String {
        match self {
            Self::Pending => "PENDING".into(),
            Self::Accepted => "ACCEPTED".into(),
            Self::Rejected => "REJECTED".into(),
            Self::AutoSelected => "AUTO_SELECTED".into(),
        }
    }
}

impl Bid {
    pub fn new(
        trip_id: Uuid,
        driver_id: Uuid,
        price_offer: i64,
        eta_to_pickup_minutes: Option<i64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            trip_id,
            driver_id,
            price_offer,
            eta_to_pickup_minutes,
            status: BidStatus::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == BidStatus::Pending
    }

    /// Ranking key for auto-match: cheaper and closer wins.
    fn auto_match_key(&self) -> (i64, DateTime<Utc>, Uuid) {
        let score =
            self.price_offer + self.eta_to_pickup_minutes.unwrap_or(0) * AUTO_MATCH_ETA_WEIGHT;
        (score, self.created_at, self.id)
    }
}

/// Offers are only accepted within a band around the base price, both edges
/// inclusive.
pub fn validate_price_offer(price_offer: i64, price_base: i64) -> Result<(), Error> {
    let min = (price_base as f64 * MIN_PRICE_FACTOR).round() as i64;
    let max = (price_base as f64 * MAX_PRICE_FACTOR).round() as i64;

    if price_offer < min || price_offer > max {
        return Err(invalid_input_error());
    }

    Ok(())
}

/// Picks the winning pending bid for an expired bidding window. Ties on the
/// combined score break by earliest creation, then lowest bid id.
pub fn select_auto_match(bids: &[Bid]) -> Option<&Bid> {
    bids.iter()
        .filter(|b| b.is_pending())
        .min_by_key(|b| b.auto_match_key())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn price_band_edges_are_inclusive() {
        let base = 1000;
        assert!(validate_price_offer(700, base).is_ok());
        assert!(validate_price_offer(2000, base).is_ok());
        assert!(validate_price_offer(699, base).is_err());
        assert!(validate_price_offer(2001, base).is_err());
    }

    #[test]
    fn cheapest_weighted_bid_wins() {
        let trip_id = Uuid::new_v4();
        let mut cheap = Bid::new(trip_id, Uuid::new_v4(), 1000, Some(5));
        let pricey = Bid::new(trip_id, Uuid::new_v4(), 1200, Some(1));
        cheap.created_at = pricey.created_at;

        // 1000 + 50 beats 1200 + 10
        let bids = vec![pricey.clone(), cheap.clone()];
        assert_eq!(select_auto_match(&bids).unwrap().id, cheap.id);
    }

    #[test]
    fn missing_eta_counts_as_zero() {
        let trip_id = Uuid::new_v4();
        let no_eta = Bid::new(trip_id, Uuid::new_v4(), 1040, None);
        let with_eta = Bid::new(trip_id, Uuid::new_v4(), 1000, Some(5));

        let bids = vec![with_eta, no_eta.clone()];
        assert_eq!(select_auto_match(&bids).unwrap().id, no_eta.id);
    }

    #[test]
    fn ties_break_by_earliest_creation() {
        let trip_id = Uuid::new_v4();
        let mut early = Bid::new(trip_id, Uuid::new_v4(), 1000, Some(2));
        let late = Bid::new(trip_id, Uuid::new_v4(), 1000, Some(2));
        early.created_at = late.created_at - Duration::seconds(5);

        let bids = vec![late, early.clone()];
        assert_eq!(select_auto_match(&bids).unwrap().id, early.id);
    }

    #[test]
    fn non_pending_bids_are_ignored() {
        let trip_id = Uuid::new_v4();
        let mut rejected = Bid::new(trip_id, Uuid::new_v4(), 900, None);
        rejected.status = BidStatus::Rejected;
        let pending = Bid::new(trip_id, Uuid::new_v4(), 1500, None);

        let bids = vec![rejected, pending.clone()];
        assert_eq!(select_auto_match(&bids).unwrap().id, pending.id);
    }

    #[test]
    fn no_pending_bids_yields_none() {
        assert!(select_auto_match(&[]).is_none());
    }
}
