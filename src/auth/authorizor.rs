use oso::{Oso, PolarClass};

use crate::auth::{Platform, User};
use crate::entities::{Status, Trip};
use crate::error::Error;

pub fn new() -> Result<Oso, Error> {
    let mut o = Oso::new();

    o.register_class(Platform::get_polar_class())?;
    o.register_class(User::get_polar_class())?;
    o.register_class(Trip::get_polar_class())?;
    o.register_class(Status::get_polar_class())?;

    o.load_str(include_str!("rules.polar"))?;

    Ok(o)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::TripRequest;
    use crate::geo::Coordinates;
    use uuid::Uuid;

    fn test_trip(passenger_id: Uuid) -> Trip {
        Trip::new(
            passenger_id,
            TripRequest {
                origin: Coordinates { lat: 4.6, lng: -74.08 },
                origin_address: "".into(),
                destination: Coordinates { lat: 4.7, lng: -74.05 },
                destination_address: "".into(),
                distance_km: Some(5.0),
                eta_minutes: Some(15),
                vehicle_category: "standard".into(),
            },
            false,
        )
    }

    #[test]
    fn platform_trip_relation_test() {
        let authorizor = new().unwrap();

        let trip = test_trip(Uuid::new_v4());

        let result = authorizor.query_rule(
            "has_relation",
            (Platform::default(), "platform", trip.clone()),
        );
        assert!(result.unwrap().next().unwrap().is_ok());
    }

    #[test]
    fn platform_role_test() {
        let authorizor = new().unwrap();

        let system = User {
            id: Uuid::new_v4(),
            roles: vec!["system".into()],
        };

        let result =
            authorizor.query_rule("has_role", (system.clone(), "system", Platform::default()));
        assert!(result.unwrap().next().unwrap().is_ok());
    }

    #[test]
    fn trip_passenger_role_test() {
        let authorizor = new().unwrap();

        let passenger = User {
            id: Uuid::new_v4(),
            roles: vec![],
        };

        let trip = test_trip(passenger.id);

        let result =
            authorizor.query_rule("has_role", (passenger.clone(), "passenger", trip.clone()));
        assert!(result.unwrap().next().unwrap().is_ok());

        let result = authorizor.is_allowed(passenger.clone(), "read", trip.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(passenger.clone(), "cancel", trip.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(passenger.clone(), "accept_bid", trip.clone());
        assert_eq!(result.unwrap(), true);

        // driver-side actions are off limits
        let result = authorizor.is_allowed(passenger.clone(), "complete", trip.clone());
        assert_eq!(result.unwrap(), false);
    }

    #[test]
    fn trip_driver_role_test() {
        let authorizor = new().unwrap();

        let driver = User {
            id: Uuid::new_v4(),
            roles: vec![],
        };

        let mut trip = test_trip(Uuid::new_v4());

        // before the driver is matched

        let result = authorizor.query_rule("has_role", (driver.clone(), "driver", trip.clone()));
        assert!(result.unwrap().next().is_none());

        let result = authorizor.is_allowed(driver.clone(), "read", trip.clone());
        assert_eq!(result.unwrap(), false);

        let result = authorizor.is_allowed(driver.clone(), "complete", trip.clone());
        assert_eq!(result.unwrap(), false);

        trip.match_with(driver.id, 1000).unwrap();

        // after the driver is matched

        let result = authorizor.query_rule("has_role", (driver.clone(), "driver", trip.clone()));
        assert!(result.unwrap().next().unwrap().is_ok());

        let result = authorizor.is_allowed(driver.clone(), "read", trip.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(driver.clone(), "en_route", trip.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(driver.clone(), "verify_otp", trip.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(driver.clone(), "cancel", trip.clone());
        assert_eq!(result.unwrap(), true);

        // passenger-side actions are off limits
        let result = authorizor.is_allowed(driver.clone(), "accept_bid", trip.clone());
        assert_eq!(result.unwrap(), false);
    }

    #[test]
    fn trip_system_role_test() {
        let authorizor = new().unwrap();

        let unprivileged = User {
            id: Uuid::new_v4(),
            roles: vec![],
        };

        let system = User {
            id: Uuid::new_v4(),
            roles: vec!["system".into()],
        };

        let trip = test_trip(Uuid::new_v4());

        let result =
            authorizor.query_rule("has_role", (unprivileged.clone(), "system", trip.clone()));
        assert!(result.unwrap().next().is_none());

        let result = authorizor.query_rule("has_role", (system.clone(), "system", trip.clone()));
        assert!(result.unwrap().next().unwrap().is_ok());

        let result = authorizor.is_allowed(unprivileged.clone(), "read", trip.clone());
        assert_eq!(result.unwrap(), false);

        let result = authorizor.is_allowed(system.clone(), "read", trip.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(system.clone(), "complete", trip.clone());
        assert_eq!(result.unwrap(), true);
    }

    #[test]
    fn platform_admin_role_test() {
        let authorizor = new().unwrap();

        let admin = User {
            id: Uuid::new_v4(),
            roles: vec!["admin".into()],
        };

        let result = authorizor.is_allowed(admin.clone(), "manage_zones", Platform::default());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(admin.clone(), "adjust_score", Platform::default());
        assert_eq!(result.unwrap(), true);

        // platform management does not extend to other users' trips
        let trip = test_trip(Uuid::new_v4());
        let result = authorizor.is_allowed(admin.clone(), "read", trip);
        assert_eq!(result.unwrap(), false);
    }

    #[test]
    fn driver_platform_actions_test() {
        let authorizor = new().unwrap();

        let driver = User {
            id: Uuid::new_v4(),
            roles: vec!["driver".into()],
        };

        let result = authorizor.is_allowed(driver.clone(), "bid", Platform::default());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(driver.clone(), "heartbeat", Platform::default());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(driver.clone(), "manage_zones", Platform::default());
        assert_eq!(result.unwrap(), false);
    }
}
