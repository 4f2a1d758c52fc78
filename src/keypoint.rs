//! Keypoint detection while recording a route.
//!
//! Watches the stream of recorded positions and marks the ones where the
//! user turned, changed floor or paused (most often at a door). Turns are
//! found from the change in smoothed bearing, floors from the change in
//! altitude, pauses from the average speed over the last two breadcrumbs.

use std::collections::VecDeque;

use log::{debug, warn};

use crate::config::DetectorConfig;
use crate::geo::{circular_mean, signed_delta};
use crate::model::{KeypointType, LocationPoint, PositionSample};

/// Instruction recorded on a keypoint of the given type.
pub fn keypoint_instruction(keypoint_type: KeypointType) -> &'static str {
    match keypoint_type {
        KeypointType::None => "Continue straight",
        KeypointType::TurnLeft => "Turn left",
        KeypointType::TurnRight => "Turn right",
        KeypointType::TurnAround => "Turn around",
        KeypointType::StairsUp => "Go up the stairs",
        KeypointType::StairsDown => "Go down the stairs",
        KeypointType::Elevator => "Take the elevator",
        KeypointType::Door => "Go through the door",
        KeypointType::Landmark => "Continue past the landmark",
    }
}

/// Stateful keypoint detector for one recording session.
#[derive(Debug, Clone)]
pub struct KeypointDetector {
    config: DetectorConfig,
    last_keypoint: Option<LocationPoint>,
    bearing_history: VecDeque<f64>,
}

impl Default for KeypointDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

impl KeypointDetector {
    pub fn new(config: DetectorConfig) -> Self {
        let window = config.bearing_window.max(1);
        Self {
            config,
            last_keypoint: None,
            bearing_history: VecDeque::with_capacity(window + 1),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// The most recently emitted keypoint, if any.
    pub fn last_keypoint(&self) -> Option<&LocationPoint> {
        self.last_keypoint.as_ref()
    }

    /// Decide whether `current` is a keypoint.
    ///
    /// `previous` is the breadcrumb recorded just before `current` (`None`
    /// for the first sample of a recording) and `history` is every
    /// breadcrumb recorded so far, not including `current`.
    ///
    /// The first sample always yields a "Start here" keypoint. After that a
    /// keypoint is only emitted at least `min_keypoint_spacing_m` away from
    /// the previous one. The returned point carries the smoothed bearing.
    pub fn detect_keypoint(
        &mut self,
        current: &PositionSample,
        previous: Option<&LocationPoint>,
        history: &[LocationPoint],
    ) -> Option<LocationPoint> {
        if !current.is_finite() {
            warn!("Dropping non-finite sample at t={}", current.timestamp);
            return None;
        }

        let smoothed = self.push_bearing(f64::from(current.bearing));
        let step_number = u32::try_from(history.len() + 1).unwrap_or(u32::MAX);
        let mut point = LocationPoint::breadcrumb(current, step_number);
        point.bearing = smoothed as f32;

        let Some(previous) = previous else {
            let start = LocationPoint { step_number: 1, ..point }
                .into_keypoint(KeypointType::None, "Start here");
            debug!("Start keypoint at {}, {}", start.latitude, start.longitude);
            self.last_keypoint = Some(start.clone());
            return Some(start);
        };

        if let Some(last) = &self.last_keypoint {
            let spacing = point.distance_to(last);
            if !spacing.is_finite() || spacing < self.config.min_keypoint_spacing_m {
                return None;
            }
        }

        let keypoint_type = self.classify(&point, previous, history);
        if keypoint_type == KeypointType::None {
            return None;
        }

        let keypoint = point.into_keypoint(keypoint_type, keypoint_instruction(keypoint_type));
        debug!(
            "Keypoint detected: {:?} at {}, {}",
            keypoint_type, keypoint.latitude, keypoint.longitude
        );
        self.last_keypoint = Some(keypoint.clone());
        Some(keypoint)
    }

    /// Forget the previous recording.
    pub fn reset(&mut self) {
        self.last_keypoint = None;
        self.bearing_history.clear();
    }

    fn classify(
        &self,
        current: &LocationPoint,
        previous: &LocationPoint,
        history: &[LocationPoint],
    ) -> KeypointType {
        let cur_bearing = f64::from(current.bearing);
        let prev_bearing = f64::from(previous.bearing);
        // The raw delta misreads turns across north; the circular one does not.
        let bearing_change = if self.config.circular_turn_delta {
            signed_delta(prev_bearing, cur_bearing)
        } else {
            cur_bearing - prev_bearing
        };

        if bearing_change.abs() > self.config.turn_threshold_deg {
            return if bearing_change.abs() > self.config.turn_around_threshold_deg {
                KeypointType::TurnAround
            } else if bearing_change > 0.0 {
                KeypointType::TurnRight
            } else {
                KeypointType::TurnLeft
            };
        }

        let elevation_change = f64::from(current.altitude - previous.altitude);
        if elevation_change.abs() > self.config.stairs_threshold_m {
            return if elevation_change > 0.0 {
                KeypointType::StairsUp
            } else {
                KeypointType::StairsDown
            };
        }

        if history.len() >= 2 {
            let speed = average_speed(&history[history.len() - 2..]);
            if speed < self.config.slow_movement_mps {
                return KeypointType::Door;
            }
        }

        KeypointType::None
    }

    fn push_bearing(&mut self, bearing: f64) -> f64 {
        self.bearing_history.push_back(bearing);
        while self.bearing_history.len() > self.config.bearing_window.max(1) {
            self.bearing_history.pop_front();
        }
        circular_mean(self.bearing_history.iter().copied())
    }
}

/// Average speed in m/s along a breadcrumb run. Zero if no time elapsed.
fn average_speed(points: &[LocationPoint]) -> f64 {
    let (distance, millis) = points
        .windows(2)
        .fold((0.0, 0_i64), |(d, t), w| {
            let step = w[1].timestamp.saturating_sub(w[0].timestamp);
            (d + w[0].distance_to(&w[1]), t.saturating_add(step))
        });

    if millis > 0 {
        distance / (millis as f64 / 1000.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::destination;

    const ORIGIN: (f64, f64) = (51.5200, -0.1300);

    /// A sample `north_m` meters north of the origin.
    fn at(north_m: f64, bearing: f32, altitude: f32, timestamp: i64) -> PositionSample {
        let (lat, lon) = destination(ORIGIN.0, ORIGIN.1, 0.0, north_m);
        PositionSample::new(lat, lon, altitude, bearing, timestamp)
    }

    /// Feed samples the way a recorder does and collect emitted keypoints.
    fn run(detector: &mut KeypointDetector, samples: &[PositionSample]) -> Vec<LocationPoint> {
        let mut history: Vec<LocationPoint> = Vec::new();
        let mut keypoints = Vec::new();
        for sample in samples {
            if let Some(k) = detector.detect_keypoint(sample, history.last(), &history) {
                keypoints.push(k);
            }
            let step = history.len() as u32 + 1;
            history.push(LocationPoint::breadcrumb(sample, step));
        }
        keypoints
    }

    #[test]
    fn first_sample_is_start_marker() {
        let mut detector = KeypointDetector::default();
        let k = detector.detect_keypoint(&at(0.0, 123.0, 0.0, 0), None, &[]).unwrap();
        assert!(k.is_keypoint);
        assert_eq!(k.keypoint_type, KeypointType::None);
        assert_eq!(k.instruction.as_deref(), Some("Start here"));
        assert_eq!(k.step_number, 1);
        assert_eq!(detector.last_keypoint(), Some(&k));
    }

    #[test]
    fn straight_walk_has_only_start() {
        let mut detector = KeypointDetector::default();
        let samples: Vec<_> = (0..10)
            .map(|i| at(f64::from(i) * 1.2, 0.0, 0.0, i64::from(i) * 1000))
            .collect();
        let keypoints = run(&mut detector, &samples);
        assert_eq!(keypoints.len(), 1);
        assert_eq!(keypoints[0].instruction.as_deref(), Some("Start here"));
    }

    #[test]
    fn bearing_increase_is_right_turn() {
        let mut detector = KeypointDetector::default();
        let samples = [
            at(0.0, 0.0, 0.0, 0),
            at(3.0, 0.0, 0.0, 2500),
            at(6.0, 90.0, 0.0, 5000),
        ];
        let keypoints = run(&mut detector, &samples);
        assert_eq!(keypoints.len(), 2);
        let turn = &keypoints[1];
        assert_eq!(turn.keypoint_type, KeypointType::TurnRight);
        assert_eq!(turn.instruction.as_deref(), Some("Turn right"));
        assert_eq!(turn.step_number, 3);
        // Smoothed over the last two raw bearings
        assert!((turn.bearing - 45.0).abs() < 1e-3, "got {}", turn.bearing);
    }

    #[test]
    fn bearing_decrease_is_left_turn() {
        let mut detector = KeypointDetector::default();
        let samples = [
            at(0.0, 90.0, 0.0, 0),
            at(3.0, 90.0, 0.0, 2500),
            at(6.0, 0.0, 0.0, 5000),
        ];
        let keypoints = run(&mut detector, &samples);
        assert_eq!(keypoints[1].keypoint_type, KeypointType::TurnLeft);
    }

    #[test]
    fn large_bearing_change_is_turn_around() {
        // With a two-sample window the smoothed bearing moves at most 90°
        // per sample, so an unsmoothed detector is needed for a clean 170°.
        let config = DetectorConfig { bearing_window: 1, ..DetectorConfig::default() };
        let mut detector = KeypointDetector::new(config);
        let samples = [
            at(0.0, 0.0, 0.0, 0),
            at(3.0, 0.0, 0.0, 2500),
            at(6.0, 170.0, 0.0, 5000),
        ];
        let keypoints = run(&mut detector, &samples);
        assert_eq!(keypoints[1].keypoint_type, KeypointType::TurnAround);
        assert_eq!(keypoints[1].instruction.as_deref(), Some("Turn around"));
    }

    #[test]
    fn raw_delta_misreads_turn_across_north() {
        let samples = [
            at(0.0, 350.0, 0.0, 0),
            at(3.0, 350.0, 0.0, 2500),
            at(6.0, 40.0, 0.0, 5000),
        ];

        let mut raw = KeypointDetector::default();
        assert_eq!(run(&mut raw, &samples)[1].keypoint_type, KeypointType::TurnAround);

        let config = DetectorConfig { circular_turn_delta: true, ..DetectorConfig::default() };
        let mut circular = KeypointDetector::new(config);
        assert_eq!(run(&mut circular, &samples)[1].keypoint_type, KeypointType::TurnRight);
    }

    #[test]
    fn altitude_change_is_stairs() {
        let mut detector = KeypointDetector::default();
        let samples = [
            at(0.0, 0.0, 0.0, 0),
            at(3.0, 0.0, 0.0, 2500),
            at(6.0, 0.0, 1.5, 5000),
            at(9.0, 0.0, 1.5, 7500),
            at(12.0, 0.0, 0.2, 10000),
        ];
        let keypoints = run(&mut detector, &samples);
        let types: Vec<_> = keypoints.iter().map(|k| k.keypoint_type).collect();
        assert_eq!(
            types,
            vec![KeypointType::None, KeypointType::StairsUp, KeypointType::StairsDown]
        );
        assert_eq!(keypoints[1].instruction.as_deref(), Some("Go up the stairs"));
    }

    #[test]
    fn slow_movement_is_door() {
        let mut detector = KeypointDetector::default();
        let samples = [
            at(0.0, 0.0, 0.0, 0),
            // 2 m in 10 s is 0.2 m/s
            at(2.0, 0.0, 0.0, 10_000),
            at(2.2, 0.0, 0.0, 11_000),
        ];
        let keypoints = run(&mut detector, &samples);
        assert_eq!(keypoints.len(), 2);
        assert_eq!(keypoints[1].keypoint_type, KeypointType::Door);
        assert_eq!(keypoints[1].instruction.as_deref(), Some("Go through the door"));
    }

    #[test]
    fn extreme_timestamps_do_not_overflow() {
        let crumbs = [
            LocationPoint::breadcrumb(&at(0.0, 0.0, 0.0, i64::MIN), 1),
            LocationPoint::breadcrumb(&at(2.0, 0.0, 0.0, i64::MAX), 2),
            LocationPoint::breadcrumb(&at(4.0, 0.0, 0.0, i64::MIN), 3),
        ];
        assert!(average_speed(&crumbs) < 1e-9);

        let mut detector = KeypointDetector::default();
        let samples = [
            at(0.0, 0.0, 0.0, i64::MIN),
            at(2.0, 0.0, 0.0, i64::MAX),
            at(4.0, 0.0, 0.0, i64::MIN),
        ];
        // A gap that long reads as a pause.
        let keypoints = run(&mut detector, &samples);
        assert_eq!(keypoints.len(), 2);
        assert_eq!(keypoints[1].keypoint_type, KeypointType::Door);
    }

    #[test]
    fn turn_too_close_to_last_keypoint_is_suppressed() {
        let mut detector = KeypointDetector::default();
        let samples = [
            at(0.0, 0.0, 0.0, 0),
            at(0.5, 0.0, 0.0, 500),
            at(1.0, 90.0, 0.0, 1000),
        ];
        let keypoints = run(&mut detector, &samples);
        assert_eq!(keypoints.len(), 1);
    }

    #[test]
    fn emitted_keypoints_respect_minimum_spacing() {
        let mut detector = KeypointDetector::default();
        // Zig-zag every 0.8 m with alternating bearings and altitudes.
        let samples: Vec<_> = (0..60)
            .map(|i| {
                let bearing = if i % 2 == 0 { 10.0 } else { 100.0 };
                let altitude = if i % 3 == 0 { 0.0 } else { 2.0 };
                at(f64::from(i) * 0.8, bearing, altitude, i64::from(i) * 700)
            })
            .collect();
        let keypoints = run(&mut detector, &samples);
        assert!(keypoints.len() > 3, "expected several keypoints, got {}", keypoints.len());
        for pair in keypoints.windows(2) {
            let gap = pair[0].distance_to(&pair[1]);
            assert!(gap >= 1.5, "keypoints only {gap:.2} m apart");
        }
    }

    #[test]
    fn non_finite_sample_is_ignored() {
        let mut detector = KeypointDetector::default();
        let bad = PositionSample::new(f64::NAN, 0.0, 0.0, 0.0, 0);
        assert!(detector.detect_keypoint(&bad, None, &[]).is_none());
        assert!(detector.bearing_history.is_empty());
        assert!(detector.last_keypoint().is_none());
    }

    #[test]
    fn reset_clears_state() {
        let mut detector = KeypointDetector::default();
        run(&mut detector, &[at(0.0, 0.0, 0.0, 0), at(3.0, 90.0, 0.0, 2000)]);
        assert!(detector.last_keypoint().is_some());
        detector.reset();
        assert!(detector.last_keypoint().is_none());
        assert!(detector.bearing_history.is_empty());
    }

    #[test]
    fn every_type_has_instruction() {
        assert_eq!(keypoint_instruction(KeypointType::None), "Continue straight");
        assert_eq!(keypoint_instruction(KeypointType::Elevator), "Take the elevator");
        assert_eq!(keypoint_instruction(KeypointType::Landmark), "Continue past the landmark");
    }
}
