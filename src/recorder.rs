//! Route recording.
//!
//! Collects the breadcrumb trail of a walk, runs keypoint detection on
//! every fix and, when the walk is over, merges the detected keypoints
//! into the trail to produce a [`Route`].

use log::{debug, info, warn};
use serde::Deserialize;

use crate::config::DetectorConfig;
use crate::error::{Error, Result};
use crate::keypoint::KeypointDetector;
use crate::model::{trail_duration_secs, trail_length, KeypointType, LocationPoint, PositionSample, Route, RouteStats};

/// Metadata supplied when a recording is saved.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RouteMeta {
    pub name: String,
    pub description: String,
    pub start_location: String,
    pub end_location: String,
    /// Milliseconds since the epoch.
    pub saved_at: i64,
}

/// One recording session.
#[derive(Debug, Clone)]
pub struct RouteRecorder {
    detector: KeypointDetector,
    breadcrumbs: Vec<LocationPoint>,
    keypoints: Vec<LocationPoint>,
    recording: bool,
}

impl Default for RouteRecorder {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

impl RouteRecorder {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            detector: KeypointDetector::new(config),
            breadcrumbs: Vec::new(),
            keypoints: Vec::new(),
            recording: false,
        }
    }

    /// Start a fresh recording, discarding any previous one.
    pub fn start(&mut self) {
        self.breadcrumbs.clear();
        self.keypoints.clear();
        self.detector.reset();
        self.recording = true;
        info!("Recording started");
    }

    /// Stop accepting fixes. The trail is kept until the next `start`.
    pub fn stop(&mut self) {
        self.recording = false;
        self.detector.reset();
        info!(
            "Recording stopped with {} breadcrumbs and {} keypoints",
            self.breadcrumbs.len(),
            self.keypoints.len()
        );
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn breadcrumbs(&self) -> &[LocationPoint] {
        &self.breadcrumbs
    }

    pub fn keypoints(&self) -> &[LocationPoint] {
        &self.keypoints
    }

    /// Record a fix. Returns the keypoint it produced, if any.
    pub fn record(&mut self, sample: &PositionSample) -> Option<LocationPoint> {
        if !self.recording {
            debug!("Ignoring fix while not recording");
            return None;
        }
        if !sample.is_finite() {
            warn!("Ignoring non-finite fix at t={}", sample.timestamp);
            return None;
        }

        let detected = self
            .detector
            .detect_keypoint(sample, self.breadcrumbs.last(), &self.breadcrumbs);

        let step_number = u32::try_from(self.breadcrumbs.len() + 1).unwrap_or(u32::MAX);
        let mut crumb = LocationPoint::breadcrumb(sample, step_number);
        crumb.instruction = Some(
            if step_number == 1 { "Start here" } else { "Continue following the path" }.to_string(),
        );
        self.breadcrumbs.push(crumb);

        let keypoint = detected?;
        if self.is_duplicate(&keypoint) {
            debug!("Skipping duplicate {:?} keypoint", keypoint.keypoint_type);
            return None;
        }

        self.keypoints.push(keypoint.clone());
        Some(keypoint)
    }

    fn is_duplicate(&self, keypoint: &LocationPoint) -> bool {
        let radius = self.detector.config().duplicate_radius_m;
        self.keypoints
            .iter()
            .any(|k| k.keypoint_type == keypoint.keypoint_type && k.distance_to(keypoint) < radius)
    }

    pub fn stats(&self) -> RouteStats {
        let duration_secs = trail_duration_secs(&self.breadcrumbs);
        let distance_m = trail_length(&self.breadcrumbs);
        RouteStats {
            duration_secs,
            distance_m,
            steps: u32::try_from(self.breadcrumbs.len()).unwrap_or(u32::MAX),
            keypoints: u32::try_from(self.keypoints.len()).unwrap_or(u32::MAX),
            average_speed_mps: if duration_secs > 0 {
                distance_m / f64::from(duration_secs)
            } else {
                0.0
            },
        }
    }

    /// Build the route to persist.
    ///
    /// The first and last breadcrumbs become start and arrival keypoints,
    /// and every detected keypoint is copied onto its nearest breadcrumb.
    pub fn finish(&self, meta: RouteMeta) -> Result<Route> {
        if self.breadcrumbs.len() < 2 {
            return Err(Error::NotEnoughLocations(self.breadcrumbs.len()));
        }

        let mut route = Route::new(meta.name, self.merged_locations());
        route.description = meta.description;
        route.start_location = meta.start_location;
        route.end_location = meta.end_location;
        route.created_at = meta.saved_at;
        route.updated_at = meta.saved_at;

        info!(
            "Route \"{}\" built with {} locations and {} keypoints",
            route.name,
            route.locations.len(),
            route.keypoint_count()
        );
        Ok(route)
    }

    fn merged_locations(&self) -> Vec<LocationPoint> {
        let mut locations = self.breadcrumbs.clone();

        if let Some(first) = locations.first_mut() {
            *first = first.clone().into_keypoint(KeypointType::None, "Start here");
        }
        if let Some(last) = locations.last_mut() {
            *last = last.clone().into_keypoint(KeypointType::None, "You have arrived");
        }

        for keypoint in &self.keypoints {
            if let Some(i) = nearest_index(keypoint, &locations) {
                let instruction = keypoint.instruction.clone().unwrap_or_default();
                locations[i] = locations[i].clone().into_keypoint(keypoint.keypoint_type, instruction);
            }
        }

        locations
    }
}

/// Record a complete sample list in one go and build its route.
pub fn record_route(config: DetectorConfig, samples: &[PositionSample], meta: RouteMeta) -> Result<Route> {
    let mut recorder = RouteRecorder::new(config);
    recorder.start();
    for sample in samples {
        recorder.record(sample);
    }
    recorder.stop();
    recorder.finish(meta)
}

fn nearest_index(target: &LocationPoint, points: &[LocationPoint]) -> Option<usize> {
    points
        .iter()
        .enumerate()
        .map(|(i, p)| (i, p.distance_to(target)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}
