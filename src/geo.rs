//! Distance and bearing primitives.
//!
//! Platform-agnostic geometry shared by keypoint detection and
//! navigation. All coordinates use WGS84 (lat/lon in degrees).

/// Earth radius in meters (WGS84 mean).
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Haversine distance between two coordinates in meters.
pub fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let h = (dlat / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Initial bearing from the first coordinate to the second, in degrees [0, 360).
pub fn bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let y = dlon.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlon.cos();

    normalize_degrees(y.atan2(x).to_degrees())
}

/// Wrap an angle in degrees into [0, 360).
pub fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Circular mean of a set of bearings in degrees, normalized to [0, 360).
///
/// Averages the unit vectors rather than the raw angles, so 350° and 10°
/// average to 0° instead of 180°. Returns 0 for an empty input.
pub fn circular_mean(bearings: impl IntoIterator<Item = f64>) -> f64 {
    let (sin_sum, cos_sum) = bearings
        .into_iter()
        .map(f64::to_radians)
        .fold((0.0, 0.0), |(s, c), b| (s + b.sin(), c + b.cos()));

    if sin_sum == 0.0 && cos_sum == 0.0 {
        return 0.0;
    }

    normalize_degrees(sin_sum.atan2(cos_sum).to_degrees())
}

/// Signed smallest difference `to - from` in degrees, in (-180, 180].
///
/// Positive means a clockwise (rightward) change.
pub fn signed_delta(from: f64, to: f64) -> f64 {
    let mut delta = (to - from).rem_euclid(360.0);
    if delta > 180.0 {
        delta -= 360.0;
    }
    delta
}

/// Offset a coordinate by `distance_m` along `bearing_deg`.
///
/// Spherical destination-point formula; lays out test positions at known
/// distances from a keypoint.
#[cfg(test)]
pub(crate) fn destination(lat: f64, lon: f64, bearing_deg: f64, distance_m: f64) -> (f64, f64) {
    let delta = distance_m / EARTH_RADIUS_M;
    let theta = bearing_deg.to_radians();
    let phi1 = lat.to_radians();
    let lambda1 = lon.to_radians();

    let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).asin();
    let lambda2 = lambda1
        + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());

    (phi2.to_degrees(), lambda2.to_degrees())
}
