//! Great-circle distance helpers

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two `(lat, lon)` points in kilometres.
pub fn haversine_km(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = (from.0.to_radians(), from.1.to_radians());
    let (lat2, lon2) = (to.0.to_radians(), to.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Sum of segment lengths along an ordered track.
pub fn track_length_km<I>(points: I) -> f64
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut points = points.into_iter();
    let Some(mut prev) = points.next() else {
        return 0.0;
    };
    let mut total = 0.0;
    for point in points {
        total += haversine_km(prev, point);
        prev = point;
    }
    total
}

/// Distance in metres, for displacement filtering
pub fn distance_m(from: (f64, f64), to: (f64, f64)) -> f64 {
    haversine_km(from, to) * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn same_point_is_zero() {
        assert_eq!(haversine_km((45.0, -122.0), (45.0, -122.0)), 0.0);
    }

    #[test]
    fn one_degree_of_latitude() {
        assert_relative_eq!(haversine_km((0.0, 0.0), (1.0, 0.0)), 111.195, epsilon = 1e-3);
    }

    #[test]
    fn symmetric() {
        let a = (42.177377, -80.034476);
        let b = (42.2, -80.1);
        assert_relative_eq!(haversine_km(a, b), haversine_km(b, a));
    }

    #[test]
    fn track_sums_segments() {
        let track = [(45.0, -122.0), (45.001, -122.001), (45.002, -122.002)];
        let expected =
            haversine_km(track[0], track[1]) + haversine_km(track[1], track[2]);
        assert_relative_eq!(track_length_km(track), expected);
        assert!(expected > 0.25 && expected < 0.3);
    }

    #[test]
    fn short_tracks() {
        assert_eq!(track_length_km(std::iter::empty()), 0.0);
        assert_eq!(track_length_km([(1.0, 2.0)]), 0.0);
    }
}
