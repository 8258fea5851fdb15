use chrono::{DateTime, Duration, Utc};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{invalid_input_error, invalid_state_error, Error};
use crate::geo::Coordinates;

/// Bidding window granted to a trip request, shortened for low-trust
/// passengers.
pub const BIDDING_WINDOW_SECS: i64 = 45;
pub const BIDDING_WINDOW_RESTRICTED_SECS: i64 = 25;

#[derive(Clone, Debug, Serialize, Deserialize, PolarClass)]
pub struct Trip {
    #[polar(attribute)]
    pub id: Uuid,
    pub status: Status,
    #[polar(attribute)]
    pub passenger_id: Uuid,
    #[polar(attribute)]
    pub driver_id: Option<Uuid>,
    pub origin: Coordinates,
    pub origin_address: String,
    pub destination: Coordinates,
    pub destination_address: String,
    pub distance_km: Option<f64>,
    pub eta_minutes: Option<i64>,
    pub vehicle_category: String,
    pub price_base: i64,
    pub price_final: Option<i64>,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
    pub bidding_expires_at: DateTime<Utc>,
    pub matched_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<Uuid>,
    pub cancel_reason: Option<CancelReason>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Bidding,
    Matched,
    DriverEnRoute,
    OtpPending,
    InProgress,
    Completed,
    ExpiredNoDriver,
    CancelledByPassenger,
    CancelledByDriver,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    Safety,
    ChangeOfPlans,
    DriverDelay,
    PassengerNoShow,
    Other,
}

impl Status {
    pub fn name(&self) -> String {
        match self {
            Self::Bidding => "BIDDING".into(),
            Self::Matched => "MATCHED".into(),
            Self::DriverEnRoute => "DRIVER_EN_ROUTE".into(),
            Self::OtpPending => "OTP_PENDING".into(),
            Self::InProgress => "IN_PROGRESS".into(),
            Self::Completed => "COMPLETED".into(),
            Self::ExpiredNoDriver => "EXPIRED_NO_DRIVER".into(),
            Self::CancelledByPassenger => "CANCELLED_BY_PASSENGER".into(),
            Self::CancelledByDriver => "CANCELLED_BY_DRIVER".into(),
        }
    }

    /// Location pings are accepted from pickup approach through drop-off.
    pub fn tracks_location(&self) -> bool {
        matches!(self, Self::DriverEnRoute | Self::InProgress)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed
                | Self::ExpiredNoDriver
                | Self::CancelledByPassenger
                | Self::CancelledByDriver
        )
    }
}

impl PolarClass for Status {
    fn get_polar_class_builder() -> oso::ClassBuilder<Status> {
        oso::Class::builder()
            .name("TripStatus")
            .add_attribute_getter("name", |recv: &Status| recv.name())
    }

    fn get_polar_class() -> oso::Class {
        Status::get_polar_class_builder().build()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TripRequest {
    pub origin: Coordinates,
    pub origin_address: String,
    pub destination: Coordinates,
    pub destination_address: String,
    pub distance_km: Option<f64>,
    pub eta_minutes: Option<i64>,
    pub vehicle_category: String,
}

impl Trip {
    pub fn new(passenger_id: Uuid, request: TripRequest, restricted_passenger: bool) -> Self {
        let now = Utc::now();
        let window = if restricted_passenger {
            BIDDING_WINDOW_RESTRICTED_SECS
        } else {
            BIDDING_WINDOW_SECS
        };
        let price_base = base_price(request.distance_km, request.eta_minutes);

        Self {
            id: Uuid::new_v4(),
            status: Status::Bidding,
            passenger_id,
            driver_id: None,
            origin: request.origin,
            origin_address: request.origin_address,
            destination: request.destination,
            destination_address: request.destination_address,
            distance_km: request.distance_km,
            eta_minutes: request.eta_minutes,
            vehicle_category: request.vehicle_category,
            price_base,
            price_final: None,
            paid: false,
            created_at: now,
            bidding_expires_at: now + Duration::seconds(window),
            matched_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            cancelled_by: None,
            cancel_reason: None,
        }
    }

    pub fn is_bidding(&self) -> bool {
        self.status == Status::Bidding
    }

    #[tracing::instrument(skip(self))]
    pub fn match_with(&mut self, driver_id: Uuid, price_final: i64) -> Result<(), Error> {
        match self.status {
            Status::Bidding => {
                self.status = Status::Matched;
                self.driver_id = Some(driver_id);
                self.price_final = Some(price_final);
                self.matched_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn expire(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Bidding => {
                self.status = Status::ExpiredNoDriver;
                self.cancelled_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn en_route(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Matched => {
                self.status = Status::DriverEnRoute;
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn arrive(&mut self) -> Result<(), Error> {
        match self.status {
            Status::DriverEnRoute => {
                self.status = Status::OtpPending;
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn start(&mut self) -> Result<(), Error> {
        match self.status {
            Status::OtpPending => {
                self.status = Status::InProgress;
                self.started_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn complete(&mut self) -> Result<(), Error> {
        match self.status {
            Status::InProgress => {
                self.status = Status::Completed;
                self.completed_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }

    pub fn mark_paid(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Completed => {
                self.paid = true;
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }

    /// Cancellation is allowed from BIDDING, MATCHED and DRIVER_EN_ROUTE
    /// unconditionally, and from IN_PROGRESS only for a safety reason.
    /// Returns the penalty the cancelling party earned.
    #[tracing::instrument(skip(self))]
    pub fn cancel(
        &mut self,
        by: Uuid,
        is_passenger: bool,
        reason: CancelReason,
    ) -> Result<CancelPenalty, Error> {
        let penalty = match self.status {
            Status::Bidding => CancelPenalty::None,
            Status::Matched => {
                if self.driver_id.is_some() && is_passenger {
                    CancelPenalty::Moderate
                } else {
                    CancelPenalty::None
                }
            }
            Status::DriverEnRoute => {
                if is_passenger {
                    CancelPenalty::Light
                } else {
                    CancelPenalty::Strong
                }
            }
            Status::InProgress => {
                if reason != CancelReason::Safety {
                    return Err(invalid_input_error());
                }
                CancelPenalty::None
            }
            _ => return Err(invalid_state_error()),
        };

        self.status = if is_passenger {
            Status::CancelledByPassenger
        } else {
            Status::CancelledByDriver
        };
        self.cancelled_at = Some(Utc::now());
        self.cancelled_by = Some(by);
        self.cancel_reason = Some(reason);

        Ok(penalty)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelPenalty {
    None,
    Light,
    Moderate,
    Strong,
}

/// Fixed fare plus per-km and per-minute components, in minor currency units.
pub fn base_price(distance_km: Option<f64>, eta_minutes: Option<i64>) -> i64 {
    let fixed = 800.0;
    let km_rate = 250.0;
    let min_rate = 80.0;
    let km = distance_km.unwrap_or(5.0);
    let eta = eta_minutes.unwrap_or(10) as f64;
    (fixed + km * km_rate + eta * min_rate).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> TripRequest {
        TripRequest {
            origin: Coordinates {
                lat: -34.6,
                lng: -58.4,
            },
            origin_address: "origin".into(),
            destination: Coordinates {
                lat: -34.7,
                lng: -58.5,
            },
            destination_address: "destination".into(),
            distance_km: Some(5.0),
            eta_minutes: Some(10),
            vehicle_category: "STANDARD".into(),
        }
    }

    #[test]
    fn happy_path_reaches_completed() {
        let mut trip = Trip::new(Uuid::new_v4(), request(), false);
        let driver_id = Uuid::new_v4();

        trip.match_with(driver_id, 2500).unwrap();
        assert_eq!(trip.driver_id, Some(driver_id));
        assert_eq!(trip.price_final, Some(2500));

        trip.en_route().unwrap();
        trip.arrive().unwrap();
        trip.start().unwrap();
        trip.complete().unwrap();

        assert_eq!(trip.status, Status::Completed);
        assert!(trip.completed_at.is_some());
    }

    #[test]
    fn driver_and_final_price_unset_before_match() {
        let trip = Trip::new(Uuid::new_v4(), request(), false);
        assert!(trip.driver_id.is_none());
        assert!(trip.price_final.is_none());
    }

    #[test]
    fn terminal_statuses_do_not_transition() {
        let mut trip = Trip::new(Uuid::new_v4(), request(), false);
        trip.expire().unwrap();

        assert!(trip.status.is_terminal());
        assert!(trip.match_with(Uuid::new_v4(), 1000).is_err());
        assert!(trip.en_route().is_err());
        assert!(trip
            .cancel(trip.passenger_id, true, CancelReason::Other)
            .is_err());
    }

    #[test]
    fn location_accepted_en_route_and_in_progress() {
        assert!(Status::DriverEnRoute.tracks_location());
        assert!(Status::InProgress.tracks_location());
        assert!(!Status::Matched.tracks_location());
        assert!(!Status::OtpPending.tracks_location());
        assert!(!Status::Completed.tracks_location());
    }

    #[test]
    fn expire_only_from_bidding() {
        let mut trip = Trip::new(Uuid::new_v4(), request(), false);
        trip.match_with(Uuid::new_v4(), 1000).unwrap();
        assert!(trip.expire().is_err());
    }

    #[test]
    fn in_progress_cancel_requires_safety_reason() {
        let mut trip = Trip::new(Uuid::new_v4(), request(), false);
        trip.match_with(Uuid::new_v4(), 1000).unwrap();
        trip.en_route().unwrap();
        trip.arrive().unwrap();
        trip.start().unwrap();

        let passenger = trip.passenger_id;
        assert!(trip
            .cancel(passenger, true, CancelReason::ChangeOfPlans)
            .is_err());
        assert_eq!(trip.status, Status::InProgress);

        trip.cancel(passenger, true, CancelReason::Safety).unwrap();
        assert_eq!(trip.status, Status::CancelledByPassenger);
    }

    #[test]
    fn late_driver_cancel_carries_strong_penalty() {
        let mut trip = Trip::new(Uuid::new_v4(), request(), false);
        let driver_id = Uuid::new_v4();
        trip.match_with(driver_id, 1000).unwrap();
        trip.en_route().unwrap();

        let penalty = trip.cancel(driver_id, false, CancelReason::Other).unwrap();
        assert_eq!(penalty, CancelPenalty::Strong);
        assert_eq!(trip.status, Status::CancelledByDriver);
    }

    #[test]
    fn restricted_passenger_gets_shorter_window() {
        let normal = Trip::new(Uuid::new_v4(), request(), false);
        let restricted = Trip::new(Uuid::new_v4(), request(), true);
        assert!(restricted.bidding_expires_at < normal.bidding_expires_at);
    }

    #[test]
    fn base_price_uses_defaults_when_estimates_missing() {
        assert_eq!(base_price(None, None), 800 + 5 * 250 + 10 * 80);
        assert_eq!(base_price(Some(2.0), Some(4)), 800 + 500 + 320);
    }
}
