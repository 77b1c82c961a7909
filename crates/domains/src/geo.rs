//! Great-circle distance between two coordinates.

use crate::models::Coordinates;

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometres.
pub fn distance_km(a: Coordinates, b: Coordinates) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Haversine distance in metres.
pub fn distance_m(a: Coordinates, b: Coordinates) -> f64 {
    distance_km(a, b) * 1000.0
}

/// Point `km` kilometres due north of `origin`. Handy for placing fixtures
/// at a known distance.
pub fn offset_north(origin: Coordinates, km: f64) -> Coordinates {
    Coordinates {
        lat: origin.lat + (km / EARTH_RADIUS_KM).to_degrees(),
        lng: origin.lng,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELHI: Coordinates = Coordinates { lat: 28.6139, lng: 77.2090 };
    const MUMBAI: Coordinates = Coordinates { lat: 19.0760, lng: 72.8777 };

    #[test]
    fn zero_for_same_point() {
        assert_eq!(distance_km(DELHI, DELHI), 0.0);
    }

    #[test]
    fn symmetric() {
        assert!((distance_km(DELHI, MUMBAI) - distance_km(MUMBAI, DELHI)).abs() < 1e-9);
    }

    #[test]
    fn delhi_to_mumbai() {
        let d = distance_km(DELHI, MUMBAI);
        assert!((d - 1148.1).abs() < 1.0, "got {d}");
    }

    #[test]
    fn offset_north_round_trips_distance() {
        for km in [0.25, 5.0, 14.9, 20.0] {
            let p = offset_north(DELHI, km);
            assert!((distance_km(DELHI, p) - km).abs() < 1e-6, "{km}");
        }
    }

    #[test]
    fn metres_scale() {
        let p = offset_north(DELHI, 0.35);
        assert!((distance_m(DELHI, p) - 350.0).abs() < 1e-3);
    }
}
