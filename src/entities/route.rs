use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::{distance_to_polyline_m, Coordinates};

/// Number of segments in the interpolated origin-to-destination baseline.
pub const BASELINE_SEGMENTS: usize = 20;

/// Expected corridor for an in-progress trip. Without an external routing
/// provider the baseline is a straight line sampled into segments, which is
/// enough for the deviation monitor to measure drift against.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteBaseline {
    pub trip_id: Uuid,
    pub polyline: Vec<Coordinates>,
    pub created_at: DateTime<Utc>,
}

impl RouteBaseline {
    pub fn build(trip_id: Uuid, origin: Coordinates, destination: Coordinates) -> Self {
        let mut polyline = Vec::with_capacity(BASELINE_SEGMENTS + 1);
        for i in 0..=BASELINE_SEGMENTS {
            let t = i as f64 / BASELINE_SEGMENTS as f64;
            polyline.push(Coordinates {
                lat: origin.lat + (destination.lat - origin.lat) * t,
                lng: origin.lng + (destination.lng - origin.lng) * t,
            });
        }

        Self {
            trip_id,
            polyline,
            created_at: Utc::now(),
        }
    }

    /// Meters from a reported point to the nearest segment of the baseline.
    pub fn distance_from_m(&self, point: Coordinates) -> f64 {
        distance_to_polyline_m(point, &self.polyline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_samples_both_endpoints() {
        let origin = Coordinates { lat: 4.60, lng: -74.08 };
        let destination = Coordinates { lat: 4.70, lng: -74.05 };
        let baseline = RouteBaseline::build(Uuid::new_v4(), origin, destination);

        assert_eq!(baseline.polyline.len(), BASELINE_SEGMENTS + 1);
        assert_eq!(baseline.polyline[0], origin);
        assert_eq!(baseline.polyline[BASELINE_SEGMENTS], destination);
    }

    #[test]
    fn point_on_route_has_near_zero_distance() {
        let origin = Coordinates { lat: 4.60, lng: -74.08 };
        let destination = Coordinates { lat: 4.70, lng: -74.08 };
        let baseline = RouteBaseline::build(Uuid::new_v4(), origin, destination);

        let midpoint = Coordinates { lat: 4.65, lng: -74.08 };
        assert!(baseline.distance_from_m(midpoint) < 1.0);

        // roughly 0.01 degrees of longitude off the corridor at this latitude
        let off_route = Coordinates { lat: 4.65, lng: -74.07 };
        let d = baseline.distance_from_m(off_route);
        assert!(d > 900.0 && d < 1300.0, "got {d}");
    }
}
