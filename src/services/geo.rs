/// Mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

const KM_PER_MILE: f64 = 1.60934;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Miles,
    Kilometers,
}

impl Unit {
    pub fn from_param(param: &str) -> Unit {
        match param {
            "mi" => Unit::Miles,
            _ => Unit::Kilometers,
        }
    }

    pub fn from_km(self, km: f64) -> f64 {
        match self {
            Unit::Miles => km / KM_PER_MILE,
            Unit::Kilometers => km,
        }
    }

    pub fn to_km(self, value: f64) -> f64 {
        match self {
            Unit::Miles => value * KM_PER_MILE,
            Unit::Kilometers => value,
        }
    }
}

/// Great-circle distance between two (latitude, longitude) points in km.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Parse the `:latlng` path segment (`"34.1,-118.1"`).
pub fn parse_latlng(param: &str) -> Option<(f64, f64)> {
    let (lat, lng) = param.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lng: f64 = lng.trim().parse().ok()?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return None;
    }
    Some((lat, lng))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_for_same_point() {
        assert!(haversine_km(34.0, -118.0, 34.0, -118.0).abs() < 1e-9);
    }

    #[test]
    fn known_city_pair_distance() {
        // Los Angeles to San Francisco, roughly 559 km great-circle.
        let km = haversine_km(34.0522, -118.2437, 37.7749, -122.4194);
        assert!((km - 559.0).abs() < 5.0, "got {}", km);
    }

    #[test]
    fn unit_conversions_round_trip() {
        let km = Unit::Miles.to_km(100.0);
        assert!((Unit::Miles.from_km(km) - 100.0).abs() < 1e-9);
        assert_eq!(Unit::Kilometers.to_km(42.0), 42.0);
    }

    #[test]
    fn latlng_parsing() {
        assert_eq!(parse_latlng("34.5,-118.25"), Some((34.5, -118.25)));
        assert_eq!(parse_latlng("34.5"), None);
        assert_eq!(parse_latlng("91,0"), None);
        assert_eq!(parse_latlng("a,b"), None);
    }
}
