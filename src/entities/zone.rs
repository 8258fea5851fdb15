use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{invalid_input_error, Error};
use crate::geo::{point_in_polygon, Coordinates};

use super::score::ActorType;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneType {
    Red,
    Caution,
    Safe,
}

impl ZoneType {
    pub fn name(&self) -> String {
        match self {
            Self::Red => "RED".into(),
            Self::Caution => "CAUTION".into(),
            Self::Safe => "SAFE".into(),
        }
    }

    /// RED outranks CAUTION outranks SAFE when zones overlap.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Red => 0,
            Self::Caution => 1,
            Self::Safe => 2,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeoZone {
    pub id: Uuid,
    pub name: String,
    pub zone_type: ZoneType,
    pub is_active: bool,
    pub polygon: Vec<Coordinates>,
    pub created_at: DateTime<Utc>,
}

impl GeoZone {
    pub fn new(name: String, zone_type: ZoneType, polygon: Vec<Coordinates>) -> Result<Self, Error> {
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            zone_type,
            is_active: true,
            polygon: normalize_polygon(polygon)?,
            created_at: Utc::now(),
        })
    }

    pub fn contains(&self, point: Coordinates) -> bool {
        point_in_polygon(point, &self.polygon)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PremiumZone {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub polygon: Vec<Coordinates>,
    pub min_driver_score: i64,
    pub min_passenger_score: i64,
    pub created_at: DateTime<Utc>,
}

impl PremiumZone {
    pub fn contains(&self, point: Coordinates) -> bool {
        point_in_polygon(point, &self.polygon)
    }

    pub fn eligible(&self, actor: ActorType, score: i64) -> bool {
        match actor {
            ActorType::Driver => score >= self.min_driver_score,
            ActorType::Passenger => score >= self.min_passenger_score,
        }
    }
}

/// A polygon needs at least three points; the closing point is appended when
/// missing.
pub fn normalize_polygon(mut polygon: Vec<Coordinates>) -> Result<Vec<Coordinates>, Error> {
    if polygon.len() < 3 {
        return Err(invalid_input_error());
    }

    let first = polygon[0];
    let last = polygon[polygon.len() - 1];
    if first != last {
        polygon.push(first);
    }

    Ok(polygon)
}

/// The zone type at a point, evaluated across active zones in priority order.
pub fn classify_point(point: Coordinates, zones: &[GeoZone]) -> Option<ZoneType> {
    let mut active: Vec<&GeoZone> = zones.iter().filter(|z| z.is_active).collect();
    active.sort_by_key(|z| z.zone_type.priority());

    active
        .iter()
        .find(|z| z.contains(point))
        .map(|z| z.zone_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(offset: f64) -> Vec<Coordinates> {
        vec![
            Coordinates {
                lat: offset,
                lng: offset,
            },
            Coordinates {
                lat: offset,
                lng: offset + 1.0,
            },
            Coordinates {
                lat: offset + 1.0,
                lng: offset + 1.0,
            },
            Coordinates {
                lat: offset + 1.0,
                lng: offset,
            },
        ]
    }

    #[test]
    fn polygon_requires_three_points() {
        assert!(normalize_polygon(square(0.0)[..2].to_vec()).is_err());
        assert!(normalize_polygon(square(0.0)).is_ok());
    }

    #[test]
    fn open_polygon_is_closed() {
        let normalized = normalize_polygon(square(0.0)).unwrap();
        assert_eq!(normalized.first(), normalized.last());
        assert_eq!(normalized.len(), 5);
    }

    #[test]
    fn red_wins_over_overlapping_caution() {
        let caution = GeoZone::new("caution".into(), ZoneType::Caution, square(0.0)).unwrap();
        let red = GeoZone::new("red".into(), ZoneType::Red, square(0.0)).unwrap();

        let point = Coordinates { lat: 0.5, lng: 0.5 };
        let zones = vec![caution, red];
        assert_eq!(classify_point(point, &zones), Some(ZoneType::Red));
    }

    #[test]
    fn inactive_zones_are_skipped() {
        let mut red = GeoZone::new("red".into(), ZoneType::Red, square(0.0)).unwrap();
        red.is_active = false;

        let point = Coordinates { lat: 0.5, lng: 0.5 };
        assert_eq!(classify_point(point, &[red]), None);
    }

    #[test]
    fn premium_eligibility_is_per_role() {
        let zone = PremiumZone {
            id: Uuid::new_v4(),
            name: "centro".into(),
            is_active: true,
            polygon: normalize_polygon(square(0.0)).unwrap(),
            min_driver_score: 80,
            min_passenger_score: 70,
            created_at: Utc::now(),
        };

        assert!(zone.eligible(ActorType::Driver, 80));
        assert!(!zone.eligible(ActorType::Driver, 79));
        assert!(zone.eligible(ActorType::Passenger, 70));
        assert!(!zone.eligible(ActorType::Passenger, 69));
    }
}
