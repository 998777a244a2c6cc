const EARTH_RADIUS_KM: f64 = 6371.0;

/// Distance in kilometres between two coordinates using the equirectangular
/// approximation. Good enough for ranking pharmacies within a city; not for
/// navigation.
pub fn equirectangular_distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let x = (lon2 - lon1).to_radians() * ((lat1_rad + lat2_rad) / 2.0).cos();
    let y = lat2_rad - lat1_rad;
    (x * x + y * y).sqrt() * EARTH_RADIUS_KM
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_for_identical_points() {
        assert_eq!(equirectangular_distance_km(13.75, 100.5, 13.75, 100.5), 0.0);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = equirectangular_distance_km(13.0, 100.5, 14.0, 100.5);
        assert!((d - 111.2).abs() < 1.0, "got {d}");
    }

    #[test]
    fn closer_point_ranks_first() {
        let buyer = (13.7563, 100.5018);
        let near = equirectangular_distance_km(buyer.0, buyer.1, 13.76, 100.51);
        let far = equirectangular_distance_km(buyer.0, buyer.1, 14.2, 101.0);
        assert!(near < far);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = equirectangular_distance_km(13.7, 100.5, 18.8, 98.9);
        let b = equirectangular_distance_km(18.8, 98.9, 13.7, 100.5);
        assert!((a - b).abs() < 1e-9);
    }
}
