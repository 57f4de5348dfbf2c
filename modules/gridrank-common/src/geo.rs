use std::f64::consts::PI;

const EARTH_RADIUS_MILES: f64 = 3958.8;
const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Miles of latitude per degree, everywhere on the globe.
pub const MILES_PER_DEGREE_LAT: f64 = 69.0;

/// Distance unit for haversine calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceUnit {
    Miles,
    Meters,
}

impl DistanceUnit {
    fn earth_radius(self) -> f64 {
        match self {
            Self::Miles => EARTH_RADIUS_MILES,
            Self::Meters => EARTH_RADIUS_METERS,
        }
    }
}

/// Haversine distance between two lat/lng points in the specified unit.
pub fn haversine_distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64, unit: DistanceUnit) -> f64 {
    let to_rad = |deg: f64| deg * PI / 180.0;

    let dlat = to_rad(lat2 - lat1);
    let dlng = to_rad(lng2 - lng1);

    let a = (dlat / 2.0).sin().powi(2)
        + to_rad(lat1).cos() * to_rad(lat2).cos() * (dlng / 2.0).sin().powi(2);

    let c = 2.0 * a.sqrt().asin();
    unit.earth_radius() * c
}

/// Haversine distance between two lat/lng points in miles.
pub fn haversine_distance_miles(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    haversine_distance(lat1, lng1, lat2, lng2, DistanceUnit::Miles)
}

/// Miles of longitude per degree at the given latitude.
pub fn miles_per_degree_lng(lat: f64) -> f64 {
    MILES_PER_DEGREE_LAT * (lat * PI / 180.0).cos()
}

/// Round a coordinate to seven decimal places (~1 cm precision).
pub fn round_coord(value: f64) -> f64 {
    (value * 1e7).round() / 1e7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boca_raton_to_delray_beach() {
        // ~8.5 miles apart along the Florida coast
        let d = haversine_distance_miles(26.3683, -80.1289, 26.4615, -80.0728);
        assert!(d > 7.0 && d < 9.0, "unexpected distance: {d}");
    }

    #[test]
    fn fifty_meters_is_about_0_031_miles() {
        // Two points ~50m apart on a north-south line
        let d_m = haversine_distance(26.4615, -80.0728, 26.46195, -80.0728, DistanceUnit::Meters);
        let d_mi = haversine_distance_miles(26.4615, -80.0728, 26.46195, -80.0728);
        assert!((d_m - 50.0).abs() < 1.0, "meters: {d_m}");
        assert!((d_mi - 0.031).abs() < 0.001, "miles: {d_mi}");
    }

    #[test]
    fn zero_distance() {
        assert_eq!(haversine_distance_miles(26.0, -80.0, 26.0, -80.0), 0.0);
    }

    #[test]
    fn lng_degree_shrinks_toward_poles() {
        assert!(miles_per_degree_lng(0.0) > miles_per_degree_lng(45.0));
        assert!(miles_per_degree_lng(45.0) > miles_per_degree_lng(80.0));
    }

    #[test]
    fn round_coord_seven_places() {
        assert_eq!(round_coord(26.123456789), 26.1234568);
        assert_eq!(round_coord(-80.00000004), -80.0);
    }
}
