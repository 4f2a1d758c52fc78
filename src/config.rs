//! Tunable thresholds for keypoint detection and navigation.
//!
//! Defaults are tuned for indoor walking. A config arrives from the app
//! as JSON; any missing field falls back to its default.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Complete configuration for recording and navigation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub detector: DetectorConfig,
    pub navigation: NavigationConfig,
}

/// Thresholds used while recording a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Bearing change, in degrees, that counts as a turn.
    pub turn_threshold_deg: f64,
    /// Bearing change above which a turn is a turn-around.
    pub turn_around_threshold_deg: f64,
    /// Altitude change, in meters, that counts as stairs.
    pub stairs_threshold_m: f64,
    /// Minimum gap between consecutive keypoints.
    pub min_keypoint_spacing_m: f64,
    /// Number of raw bearings averaged into the smoothed bearing.
    pub bearing_window: usize,
    /// Average speed below which the user is assumed to have paused at a door.
    pub slow_movement_mps: f64,
    /// A keypoint of the same type within this radius is a duplicate.
    pub duplicate_radius_m: f64,
    /// Use the wrap-corrected bearing delta for turns instead of the raw one.
    pub circular_turn_delta: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            turn_threshold_deg: 20.0,
            turn_around_threshold_deg: 150.0,
            stairs_threshold_m: 1.0,
            min_keypoint_spacing_m: 1.5,
            bearing_window: 2,
            slow_movement_mps: 0.3,
            duplicate_radius_m: 1.0,
            circular_turn_delta: false,
        }
    }
}

/// Thresholds used while navigating a recorded route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Distance at which a keypoint counts as reached.
    pub arrival_distance_m: f64,
    /// Distance at which the approach warning is given.
    pub approach_distance_m: f64,
    /// Below this the approach is "very close".
    pub very_close_m: f64,
    /// Below this the approach is "close".
    pub close_m: f64,
    /// Timestamped fixes implying a faster speed than this are dropped.
    pub max_plausible_speed_mps: f64,
    /// Within this distance of the route's last location the user is near
    /// the destination.
    pub near_destination_m: f64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            arrival_distance_m: 0.5,
            approach_distance_m: 2.0,
            very_close_m: 1.0,
            close_m: 1.5,
            max_plausible_speed_mps: 7.0,
            near_destination_m: 5.0,
        }
    }
}

impl Config {
    /// Parse and validate a config from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every threshold is a finite positive number.
    pub fn validate(&self) -> Result<()> {
        let d = &self.detector;
        let n = &self.navigation;
        let values = [
            ("detector.turn_threshold_deg", d.turn_threshold_deg),
            ("detector.turn_around_threshold_deg", d.turn_around_threshold_deg),
            ("detector.stairs_threshold_m", d.stairs_threshold_m),
            ("detector.min_keypoint_spacing_m", d.min_keypoint_spacing_m),
            ("detector.slow_movement_mps", d.slow_movement_mps),
            ("detector.duplicate_radius_m", d.duplicate_radius_m),
            ("navigation.arrival_distance_m", n.arrival_distance_m),
            ("navigation.approach_distance_m", n.approach_distance_m),
            ("navigation.very_close_m", n.very_close_m),
            ("navigation.close_m", n.close_m),
            ("navigation.max_plausible_speed_mps", n.max_plausible_speed_mps),
            ("navigation.near_destination_m", n.near_destination_m),
        ];

        for (name, value) in values {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::Config(format!("{name} must be a positive number, got {value}")));
            }
        }

        if d.bearing_window == 0 {
            return Err(Error::Config("detector.bearing_window must be at least 1".into()));
        }

        Ok(())
    }
}
