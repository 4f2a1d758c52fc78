//! Route data model.
//!
//! Serializable structures for position samples, breadcrumbs and routes.
//! The JSON shape matches what the app persists, so a stored route can
//! cross the JNI boundary unchanged.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geo::haversine;

/// A raw position fix from the platform's location fusion layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Meters.
    pub altitude: f32,
    /// Direction of travel in degrees [0, 360).
    pub bearing: f32,
    /// Milliseconds.
    pub timestamp: i64,
}

impl PositionSample {
    pub fn new(latitude: f64, longitude: f64, altitude: f32, bearing: f32, timestamp: i64) -> Self {
        Self { latitude, longitude, altitude, bearing, timestamp }
    }

    /// True if every field can safely enter distance and bearing math.
    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.altitude.is_finite()
            && self.bearing.is_finite()
    }

    pub fn distance_to(&self, lat: f64, lon: f64) -> f64 {
        haversine(self.latitude, self.longitude, lat, lon)
    }
}

/// What a keypoint asks the user to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeypointType {
    #[default]
    None,
    TurnLeft,
    TurnRight,
    TurnAround,
    StairsUp,
    StairsDown,
    Elevator,
    Door,
    Landmark,
}

/// A recorded point along a route. Keypoints are breadcrumbs with
/// `is_keypoint` set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f32,
    pub timestamp: i64,
    /// 1-based position in the recording.
    pub step_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    #[serde(default)]
    pub bearing: f32,
    #[serde(default)]
    pub is_keypoint: bool,
    #[serde(default)]
    pub keypoint_type: KeypointType,
}

impl LocationPoint {
    /// A plain breadcrumb for `sample`.
    pub fn breadcrumb(sample: &PositionSample, step_number: u32) -> Self {
        Self {
            latitude: sample.latitude,
            longitude: sample.longitude,
            altitude: sample.altitude,
            timestamp: sample.timestamp,
            step_number,
            instruction: None,
            bearing: sample.bearing,
            is_keypoint: false,
            keypoint_type: KeypointType::None,
        }
    }

    /// Promote this point to a keypoint of the given type.
    pub fn into_keypoint(self, keypoint_type: KeypointType, instruction: impl Into<String>) -> Self {
        Self {
            is_keypoint: true,
            keypoint_type,
            instruction: Some(instruction.into()),
            ..self
        }
    }

    pub fn distance_to(&self, other: &LocationPoint) -> f64 {
        haversine(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

/// A recorded route: the full breadcrumb trail with keypoints marked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub start_location: String,
    #[serde(default)]
    pub end_location: String,
    /// Seconds.
    #[serde(default)]
    pub duration: u32,
    /// Meters.
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub steps: u32,
    pub locations: Vec<LocationPoint>,
    /// Milliseconds since the epoch.
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl Route {
    /// A route over `locations` with its aggregates computed and all other
    /// metadata left empty.
    pub fn new(name: impl Into<String>, locations: Vec<LocationPoint>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            description: String::new(),
            start_location: String::new(),
            end_location: String::new(),
            duration: trail_duration_secs(&locations),
            distance: trail_length(&locations),
            steps: u32::try_from(locations.len()).unwrap_or(u32::MAX),
            locations,
            created_at: 0,
            updated_at: 0,
            is_active: true,
        }
    }

    /// The keypoint subsequence, in breadcrumb order.
    pub fn keypoints(&self) -> impl Iterator<Item = &LocationPoint> {
        self.locations.iter().filter(|p| p.is_keypoint)
    }

    pub fn keypoint_count(&self) -> usize {
        self.keypoints().count()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Aggregates over a breadcrumb trail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RouteStats {
    /// Seconds between the first and last breadcrumb.
    pub duration_secs: u32,
    pub distance_m: f64,
    pub steps: u32,
    pub keypoints: u32,
    pub average_speed_mps: f64,
}

/// Total length of a breadcrumb trail in meters.
pub fn trail_length(points: &[LocationPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| w[0].distance_to(&w[1]))
        .sum()
}

/// Whole seconds spanned by a breadcrumb trail.
pub fn trail_duration_secs(points: &[LocationPoint]) -> u32 {
    match (points.first(), points.last()) {
        (Some(first), Some(last)) => {
            let millis = last.timestamp.saturating_sub(first.timestamp).max(0);
            u32::try_from(millis / 1000).unwrap_or(u32::MAX)
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crumb(lat: f64, lon: f64, step: u32, timestamp: i64) -> LocationPoint {
        LocationPoint::breadcrumb(&PositionSample::new(lat, lon, 0.0, 0.0, timestamp), step)
    }

    #[test]
    fn keypoint_type_uses_persisted_names() {
        let json = serde_json::to_string(&KeypointType::StairsUp).unwrap();
        assert_eq!(json, "\"STAIRS_UP\"");
        let parsed: KeypointType = serde_json::from_str("\"TURN_AROUND\"").unwrap();
        assert_eq!(parsed, KeypointType::TurnAround);
    }

    #[test]
    fn route_json_round_trip_preserves_keypoints() {
        let route = Route {
            id: 7,
            name: "Lab to lift".into(),
            description: String::new(),
            start_location: "Lab".into(),
            end_location: "Lift".into(),
            duration: 30,
            distance: 22.5,
            steps: 3,
            locations: vec![
                crumb(1.0, 1.0, 1, 0).into_keypoint(KeypointType::None, "Start here"),
                crumb(1.0001, 1.0, 2, 1000),
                crumb(1.0002, 1.0, 3, 2000).into_keypoint(KeypointType::Elevator, "Take the elevator"),
            ],
            created_at: 1_700_000_000_000,
            updated_at: 1_700_000_000_000,
            is_active: true,
        };

        let json = route.to_json().unwrap();
        assert!(json.contains("\"keypointType\":\"ELEVATOR\""), "{json}");
        let parsed = Route::from_json(&json).unwrap();
        assert_eq!(parsed.name, route.name);
        assert_eq!(parsed.locations.len(), 3);
        assert!((parsed.locations[2].latitude - 1.0002).abs() < 1e-12);
        assert_eq!(parsed.locations[2].instruction.as_deref(), Some("Take the elevator"));
        assert_eq!(parsed.keypoint_count(), 2);
    }

    #[test]
    fn route_from_minimal_json() {
        let json = r#"{
            "name": "Corridor",
            "locations": [
                {"latitude": 1.0, "longitude": 2.0, "altitude": 0.0, "timestamp": 0, "stepNumber": 1,
                 "isKeypoint": true, "keypointType": "NONE"},
                {"latitude": 1.0, "longitude": 2.0001, "altitude": 0.0, "timestamp": 1000, "stepNumber": 2}
            ]
        }"#;
        let route = Route::from_json(json).unwrap();
        assert!(route.is_active);
        assert_eq!(route.locations[1].keypoint_type, KeypointType::None);
        assert!(!route.locations[1].is_keypoint);
        assert_eq!(route.keypoints().count(), 1);
    }

    #[test]
    fn trail_length_and_duration() {
        let trail = vec![
            crumb(0.0, 0.0, 1, 1_000),
            crumb(0.0001, 0.0, 2, 6_000),
            crumb(0.0002, 0.0, 3, 11_500),
        ];
        let len = trail_length(&trail);
        assert!((len - 22.24).abs() < 0.05, "got {len}");
        assert_eq!(trail_duration_secs(&trail), 10);
        assert_eq!(trail_duration_secs(&[]), 0);
    }

    #[test]
    fn duration_of_extreme_timestamps_saturates() {
        let trail = vec![crumb(0.0, 0.0, 1, i64::MIN), crumb(0.0001, 0.0, 2, i64::MAX)];
        assert_eq!(trail_duration_secs(&trail), u32::MAX);
        let backwards = vec![crumb(0.0, 0.0, 1, i64::MAX), crumb(0.0001, 0.0, 2, i64::MIN)];
        assert_eq!(trail_duration_secs(&backwards), 0);
    }

    #[test]
    fn non_finite_sample_detected() {
        assert!(PositionSample::new(1.0, 2.0, 0.0, 10.0, 0).is_finite());
        assert!(!PositionSample::new(f64::NAN, 2.0, 0.0, 10.0, 0).is_finite());
        assert!(!PositionSample::new(1.0, 2.0, 0.0, f32::INFINITY, 0).is_finite());
    }
}
