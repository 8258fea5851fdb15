use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let r = 6371.0;
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * r * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Ray casting. The polygon is treated as implicitly closed.
pub fn point_in_polygon(point: Coordinates, polygon: &[Coordinates]) -> bool {
    let mut inside = false;
    let mut j = polygon.len() - 1;

    for i in 0..polygon.len() {
        let (xi, yi) = (polygon[i].lng, polygon[i].lat);
        let (xj, yj) = (polygon[j].lng, polygon[j].lat);

        let dy = if (yj - yi).abs() < f64::EPSILON {
            1e-9
        } else {
            yj - yi
        };

        if ((yi > point.lat) != (yj > point.lat))
            && (point.lng < (xj - xi) * (point.lat - yi) / dy + xi)
        {
            inside = !inside;
        }

        j = i;
    }

    inside
}

// Planar projection of the point onto the segment, then haversine for the
// actual distance. Good enough at city scale.
fn distance_point_to_segment_m(p: Coordinates, a: Coordinates, b: Coordinates) -> f64 {
    let (ax, ay, bx, by, px, py) = (a.lng, a.lat, b.lng, b.lat, p.lng, p.lat);
    let (abx, aby) = (bx - ax, by - ay);

    let denom = (abx * abx + aby * aby).max(1e-18);
    let t = (((px - ax) * abx + (py - ay) * aby) / denom).clamp(0.0, 1.0);

    let closest = Coordinates {
        lat: ay + aby * t,
        lng: ax + abx * t,
    };

    haversine_km(p, closest) * 1000.0
}

pub fn distance_to_polyline_m(point: Coordinates, polyline: &[Coordinates]) -> f64 {
    let mut min = f64::INFINITY;

    for window in polyline.windows(2) {
        min = min.min(distance_point_to_segment_m(point, window[0], window[1]));
    }

    if min.is_finite() {
        min
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Coordinates> {
        vec![
            Coordinates { lat: 0.0, lng: 0.0 },
            Coordinates { lat: 0.0, lng: 1.0 },
            Coordinates { lat: 1.0, lng: 1.0 },
            Coordinates { lat: 1.0, lng: 0.0 },
        ]
    }

    #[test]
    fn point_inside_square() {
        assert!(point_in_polygon(Coordinates { lat: 0.5, lng: 0.5 }, &square()));
    }

    #[test]
    fn point_outside_square() {
        assert!(!point_in_polygon(Coordinates { lat: 1.5, lng: 0.5 }, &square()));
        assert!(!point_in_polygon(
            Coordinates {
                lat: 0.5,
                lng: -0.5
            },
            &square()
        ));
    }

    #[test]
    fn haversine_of_identical_points_is_zero() {
        let p = Coordinates {
            lat: -34.6,
            lng: -58.4,
        };
        assert!(haversine_km(p, p) < 1e-9);
    }

    #[test]
    fn haversine_one_degree_of_latitude() {
        let a = Coordinates { lat: 0.0, lng: 0.0 };
        let b = Coordinates { lat: 1.0, lng: 0.0 };
        let km = haversine_km(a, b);
        assert!((km - 111.19).abs() < 0.5, "got {km}");
    }

    #[test]
    fn distance_to_polyline_perpendicular() {
        // baseline along the equator, point ~0.01 deg north => ~1112 m
        let line = vec![
            Coordinates { lat: 0.0, lng: 0.0 },
            Coordinates { lat: 0.0, lng: 1.0 },
        ];
        let p = Coordinates {
            lat: 0.01,
            lng: 0.5,
        };
        let m = distance_to_polyline_m(p, &line);
        assert!((m - 1112.0).abs() < 10.0, "got {m}");
    }

    #[test]
    fn distance_to_polyline_clamps_to_endpoints() {
        let line = vec![
            Coordinates { lat: 0.0, lng: 0.0 },
            Coordinates { lat: 0.0, lng: 1.0 },
        ];
        // beyond the end of the segment, distance is measured to the endpoint
        let p = Coordinates { lat: 0.0, lng: 2.0 };
        let m = distance_to_polyline_m(p, &line);
        assert!((m - 111_190.0).abs() < 600.0, "got {m}");
    }

    #[test]
    fn point_on_polyline_is_zero() {
        let line = vec![
            Coordinates { lat: 0.0, lng: 0.0 },
            Coordinates { lat: 1.0, lng: 1.0 },
        ];
        let m = distance_to_polyline_m(Coordinates { lat: 0.0, lng: 0.0 }, &line);
        assert!(m < 1e-6);
    }
}
