use geo::{Distance, Haversine, Point};
use itertools::Itertools;

use crate::position::Coordinates;

const MAP_SEARCH_URL: &str = "https://www.google.com/maps/search/?api=1&query=";

fn to_point(coordinates: &Coordinates) -> Point<f64> {
    Point::new(coordinates.longitude, coordinates.latitude)
}

/// Great-circle distance in meters on the mean earth sphere.
pub fn distance_in_meters(from: &Coordinates, to: &Coordinates) -> f64 {
    Haversine::distance(to_point(from), to_point(to))
}

/// Distance rounded to the nearest meter, which is what we display.
pub fn get_distance(from: &Coordinates, to: &Coordinates) -> u64 {
    distance_in_meters(from, to).round() as u64
}

/// Index of the point closest to `from`. The earliest one wins on ties.
pub fn find_nearest<'a>(
    from: &Coordinates,
    points: impl IntoIterator<Item = &'a Coordinates>,
) -> Option<usize> {
    points
        .into_iter()
        .map(|point| distance_in_meters(from, point))
        .position_min_by(|a, b| a.total_cmp(b))
}

pub fn map_search_url(coordinates: &Coordinates) -> String {
    format!(
        "{}{},{}",
        MAP_SEARCH_URL, coordinates.latitude, coordinates.longitude
    )
}
