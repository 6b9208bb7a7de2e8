pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const EARTH_RADIUS_M: f64 = EARTH_RADIUS_KM * 1000.0;

fn to_radians(degrees: f64) -> f64 {
    degrees * std::f64::consts::PI / 180.0
}

fn to_degrees(radians: f64) -> f64 {
    radians * 180.0 / std::f64::consts::PI
}

/// Central angle between two WGS84 coordinates (haversine formula), in radians.
fn central_angle(
    latitude_1: f64,
    longitude_1: f64,
    latitude_2: f64,
    longitude_2: f64,
) -> f64 {
    let lat1_rad = to_radians(latitude_1);
    let lat2_rad = to_radians(latitude_2);

    let dlat = lat2_rad - lat1_rad;
    let dlon = to_radians(longitude_2) - to_radians(longitude_1);

    let a = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Great-circle distance in kilometers.
pub fn haversine_distance(
    latitude_1: f64,
    longitude_1: f64,
    latitude_2: f64,
    longitude_2: f64,
) -> f64 {
    EARTH_RADIUS_KM * central_angle(latitude_1, longitude_1, latitude_2, longitude_2)
}

/// Great-circle distance in meters.
pub fn haversine_distance_m(
    latitude_1: f64,
    longitude_1: f64,
    latitude_2: f64,
    longitude_2: f64,
) -> f64 {
    EARTH_RADIUS_M * central_angle(latitude_1, longitude_1, latitude_2, longitude_2)
}

/// Initial bearing from the first to the second coordinate, normalized to
/// `[0, 360)` degrees clockwise from north.
pub fn bearing(
    latitude_1: f64,
    longitude_1: f64,
    latitude_2: f64,
    longitude_2: f64,
) -> f64 {
    let lat1_rad = to_radians(latitude_1);
    let lat2_rad = to_radians(latitude_2);
    let dlon = to_radians(longitude_2) - to_radians(longitude_1);

    let y = dlon.sin() * lat2_rad.cos();
    let x = lat1_rad.cos() * lat2_rad.sin() - lat1_rad.sin() * lat2_rad.cos() * dlon.cos();

    (to_degrees(y.atan2(x)) + 360.0) % 360.0
}

/// Moves a coordinate `distance_m` meters along `bearing_deg`. Used to place
/// positions at an exact distance from a point.
pub fn destination(
    latitude: f64,
    longitude: f64,
    bearing_deg: f64,
    distance_m: f64,
) -> (f64, f64) {
    let lat_rad = to_radians(latitude);
    let lon_rad = to_radians(longitude);
    let bearing_rad = to_radians(bearing_deg);
    let angular = distance_m / EARTH_RADIUS_M;

    let lat2 = (lat_rad.sin() * angular.cos()
        + lat_rad.cos() * angular.sin() * bearing_rad.cos())
    .asin();
    let lon2 = lon_rad
        + (bearing_rad.sin() * angular.sin() * lat_rad.cos())
            .atan2(angular.cos() - lat_rad.sin() * lat2.sin());

    (to_degrees(lat2), to_degrees(lon2))
}
