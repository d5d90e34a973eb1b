//! Proximity annotation
//!
//! Every trace point gets the tags of the recognized places within the near
//! distance. Previous annotations are discarded, not merged.

use crate::distance::planar_distance_m;
use crate::types::{PlaceTagRecord, TracePoint};

/// Joins trace points against recognized places
pub struct ProximityAnnotator;

impl ProximityAnnotator {
    /// Overwrite `near` on every point with tags of places closer than `near_distance` meters.
    ///
    /// Returns the number of points that ended up with at least one tag.
    pub fn annotate(points: &mut [TracePoint], places: &[PlaceTagRecord], near_distance: f64) -> usize {
        let mut tagged = 0;
        for point in points.iter_mut() {
            point.near.clear();
            for place in places {
                let d = planar_distance_m(
                    point.latitude,
                    point.longitude,
                    place.latitude,
                    place.longitude,
                );
                if d < near_distance && !point.near.contains(&place.tag) {
                    point.near.push(place.tag.clone());
                }
            }
            if !point.near.is_empty() {
                tagged += 1;
            }
        }
        tagged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::meters_to_lat_degrees;
    use crate::types::LocationSample;
    use pretty_assertions::assert_eq;

    const BASE_LAT: f64 = 39.9042;
    const BASE_LON: f64 = 116.4074;

    fn place(tag: &str, lat: f64, lon: f64) -> PlaceTagRecord {
        PlaceTagRecord {
            latitude: lat,
            longitude: lon,
            tag: tag.to_string(),
            ratio: 0.8,
            estimate_time: 3600,
            user_id: "u".to_string(),
        }
    }

    fn point_north_of_base(meters: f64) -> TracePoint {
        TracePoint::new(
            "u",
            LocationSample::new(0, BASE_LAT + meters_to_lat_degrees(meters), BASE_LON),
        )
    }

    #[test]
    fn test_far_points_get_no_tags() {
        let places = vec![place("home", BASE_LAT, BASE_LON)];
        let mut points = vec![point_north_of_base(300.0), point_north_of_base(-300.0)];

        let tagged = ProximityAnnotator::annotate(&mut points, &places, 200.0);

        assert_eq!(tagged, 0);
        assert!(points.iter().all(|p| p.near.is_empty()));
    }

    #[test]
    fn test_moving_closer_attaches_tag() {
        let places = vec![place("home", BASE_LAT, BASE_LON)];
        let mut points = vec![point_north_of_base(150.0), point_north_of_base(-300.0)];

        let tagged = ProximityAnnotator::annotate(&mut points, &places, 200.0);

        assert_eq!(tagged, 1);
        assert_eq!(points[0].near, vec!["home".to_string()]);
        assert!(points[1].near.is_empty());
    }

    #[test]
    fn test_previous_annotations_overwritten() {
        let places = vec![place("office", BASE_LAT, BASE_LON)];
        let mut point = point_north_of_base(1000.0);
        point.near = vec!["home".to_string()];
        let mut points = vec![point];

        ProximityAnnotator::annotate(&mut points, &places, 200.0);
        assert!(points[0].near.is_empty());
    }

    #[test]
    fn test_no_duplicate_tags() {
        // Two stored records of the same tag near each other.
        let places = vec![
            place("home", BASE_LAT, BASE_LON),
            place("home", BASE_LAT + meters_to_lat_degrees(20.0), BASE_LON),
            place("office", BASE_LAT, BASE_LON + 0.0005),
        ];
        let mut points = vec![point_north_of_base(10.0)];

        ProximityAnnotator::annotate(&mut points, &places, 200.0);
        assert_eq!(points[0].near, vec!["home".to_string(), "office".to_string()]);
    }

    #[test]
    fn test_boundary_is_exclusive() {
        let places = vec![place("home", BASE_LAT, BASE_LON)];
        let mut points = vec![point_north_of_base(0.0)];

        ProximityAnnotator::annotate(&mut points, &places, 0.0);
        assert!(points[0].near.is_empty());
    }
}
