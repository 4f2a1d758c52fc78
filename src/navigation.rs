//! Turn-by-turn navigation along a recorded route.
//!
//! Replays the keypoints of a [`Route`] against live position fixes.
//! Each fix moves the engine through at most one transition (arrival,
//! approach or plain movement) and spoken guidance goes out through an
//! [`InstructionSink`] supplied by the caller. Platform-agnostic.

use std::collections::HashSet;

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::config::NavigationConfig;
use crate::error::{Error, Ignored, Result};
use crate::geo::haversine;
use crate::model::{KeypointType, LocationPoint, PositionSample, Route};

const START_TEXT: &str = "Starting navigation. Follow the path to your destination.";
const STOP_TEXT: &str = "Navigation stopped";
const MOVING_TEXT: &str = "Continue toward the next keypoint";
const DESTINATION_TEXT: &str = "You have arrived at your destination";

/// Where the engine is in the route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NavigationStatus {
    #[default]
    Idle,
    Starting,
    Moving,
    Approaching,
    MovingToNext,
    Arrived,
}

/// Coarse distance band reported with an approach warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Proximity {
    VeryClose,
    Close,
    Approaching,
}

impl Proximity {
    pub fn label(self) -> &'static str {
        match self {
            Proximity::VeryClose => "very close",
            Proximity::Close => "close",
            Proximity::Approaching => "approaching",
        }
    }
}

/// Something the user should hear now.
///
/// A sink should treat every announcement as "speak now", interrupting
/// whatever it was saying. An arrival carries a follow-up to speak right
/// after the arrival text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Announcement {
    Started {
        text: String,
    },
    Approach {
        index: usize,
        keypoint_type: KeypointType,
        proximity: Proximity,
        text: String,
    },
    Arrival {
        index: usize,
        keypoint_type: KeypointType,
        text: String,
        follow_up: String,
    },
    Stopped {
        text: String,
    },
}

impl Announcement {
    pub fn text(&self) -> &str {
        match self {
            Announcement::Started { text }
            | Announcement::Approach { text, .. }
            | Announcement::Arrival { text, .. }
            | Announcement::Stopped { text } => text,
        }
    }

    pub fn follow_up(&self) -> Option<&str> {
        match self {
            Announcement::Arrival { follow_up, .. } => Some(follow_up),
            _ => None,
        }
    }
}

/// Receives announcements, typically a text-to-speech engine.
pub trait InstructionSink {
    fn announce(&mut self, announcement: &Announcement);
}

impl<F> InstructionSink for F
where
    F: FnMut(&Announcement),
{
    fn announce(&mut self, announcement: &Announcement) {
        self(announcement);
    }
}

/// A sink that keeps every announcement, for callers that poll.
#[derive(Debug, Clone, Default)]
pub struct AnnouncementLog {
    entries: Vec<Announcement>,
}

impl AnnouncementLog {
    pub fn entries(&self) -> &[Announcement] {
        &self.entries
    }

    /// Remove and return everything announced so far.
    pub fn take(&mut self) -> Vec<Announcement> {
        std::mem::take(&mut self.entries)
    }
}

impl InstructionSink for AnnouncementLog {
    fn announce(&mut self, announcement: &Announcement) {
        self.entries.push(announcement.clone());
    }
}

/// The transition a position update caused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Reached keypoint `index`. `finished` is set for the last keypoint.
    Arrival { index: usize, finished: bool },
    /// Came within approach distance of keypoint `index`.
    Approach { index: usize, proximity: Proximity },
    /// Still on the way to the current keypoint.
    Moving,
}

/// Read-only view of the engine for UI polling.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationSnapshot {
    pub is_navigating: bool,
    pub status: NavigationStatus,
    pub current_keypoint_index: usize,
    pub total_keypoints: usize,
    pub current_keypoint: Option<LocationPoint>,
    pub next_keypoint: Option<LocationPoint>,
    pub distance_to_next: f64,
    pub distance_to_next_text: String,
    pub progress: f64,
    pub estimated_time_remaining_secs: u32,
    pub is_near_destination: bool,
    pub current_instruction: String,
}

#[derive(Debug, Clone, Default)]
struct NavigationState {
    current_keypoint_index: usize,
    reached_keypoints: HashSet<usize>,
    is_approaching_keypoint: bool,
    status: NavigationStatus,
}

#[derive(Debug, Clone, Copy)]
struct Fix {
    latitude: f64,
    longitude: f64,
    timestamp: i64,
}

/// Navigation state machine for one user.
pub struct NavigationEngine<S> {
    config: NavigationConfig,
    sink: S,
    keypoints: Vec<LocationPoint>,
    navigating: bool,
    state: NavigationState,
    distance_to_next: f64,
    progress: f64,
    current_instruction: String,
    route_duration_secs: u32,
    destination: Option<(f64, f64)>,
    last_position: Option<(f64, f64)>,
    last_fix: Option<Fix>,
}

impl<S: InstructionSink> NavigationEngine<S> {
    pub fn new(config: NavigationConfig, sink: S) -> Self {
        Self {
            config,
            sink,
            keypoints: Vec::new(),
            navigating: false,
            state: NavigationState::default(),
            distance_to_next: 0.0,
            progress: 0.0,
            current_instruction: String::new(),
            route_duration_secs: 0,
            destination: None,
            last_position: None,
            last_fix: None,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Begin guiding the user along `route`, targeting its first keypoint.
    ///
    /// A route without locations or without keypoints is rejected and the
    /// engine is left as it was.
    pub fn start_navigation(&mut self, route: &Route) -> Result<()> {
        if route.locations.is_empty() {
            error!("Route {} has no locations", route.id);
            return Err(Error::InvalidRoute("route has no locations"));
        }

        let keypoints: Vec<LocationPoint> = route.keypoints().cloned().collect();
        if keypoints.is_empty() {
            error!("Route {} has no keypoints", route.id);
            return Err(Error::InvalidRoute("route has no keypoints"));
        }

        info!("Navigation started on \"{}\" with {} keypoints", route.name, keypoints.len());
        self.keypoints = keypoints;
        self.navigating = true;
        self.state = NavigationState {
            status: NavigationStatus::Starting,
            ..NavigationState::default()
        };
        self.distance_to_next = 0.0;
        self.progress = 0.0;
        self.current_instruction.clear();
        self.route_duration_secs = route.duration;
        self.destination = route.locations.last().map(|p| (p.latitude, p.longitude));
        self.last_position = None;
        self.last_fix = None;

        self.sink.announce(&Announcement::Started { text: START_TEXT.to_string() });
        Ok(())
    }

    /// End the session. Does nothing if no session is active.
    pub fn stop_navigation(&mut self) {
        let was_navigating = self.navigating;

        self.keypoints.clear();
        self.navigating = false;
        self.state = NavigationState::default();
        self.distance_to_next = 0.0;
        self.progress = 0.0;
        self.current_instruction.clear();
        self.route_duration_secs = 0;
        self.destination = None;
        self.last_position = None;
        self.last_fix = None;

        if was_navigating {
            info!("Navigation stopped");
            self.sink.announce(&Announcement::Stopped { text: STOP_TEXT.to_string() });
        }
    }

    /// Feed a position fix without a timestamp.
    pub fn update_position(
        &mut self,
        latitude: f64,
        longitude: f64,
        altitude: f32,
    ) -> core::result::Result<Transition, Ignored> {
        if !self.navigating || self.keypoints.is_empty() {
            return Err(Ignored::NotNavigating);
        }
        if self.state.status == NavigationStatus::Arrived {
            return Err(Ignored::Finished);
        }
        if !(latitude.is_finite() && longitude.is_finite() && altitude.is_finite()) {
            warn!("Dropping non-finite fix ({latitude}, {longitude}, {altitude})");
            return Err(Ignored::NonFiniteFix);
        }

        let index = self.state.current_keypoint_index;
        let target = &self.keypoints[index];
        let distance = haversine(latitude, longitude, target.latitude, target.longitude);
        if !distance.is_finite() {
            warn!("Dropping fix with non-finite distance to keypoint {index}");
            return Err(Ignored::NonFiniteFix);
        }

        self.distance_to_next = distance;
        self.last_position = Some((latitude, longitude));
        let progress = index as f64 / self.keypoints.len() as f64 * 100.0;
        self.progress = progress.clamp(0.0, 100.0);

        debug!(
            "Navigation: target={index} type={:?} next={:?} distance={distance:.2}",
            target.keypoint_type,
            self.keypoints.get(index + 1).map(|k| k.keypoint_type)
        );

        // Arrival is checked first so it wins however the thresholds are set.
        let transition = if distance <= self.config.arrival_distance_m
            && !self.state.reached_keypoints.contains(&index)
        {
            self.arrive(index)
        } else if distance <= self.config.approach_distance_m && !self.state.is_approaching_keypoint {
            self.approach(index, distance)
        } else {
            self.state.status = NavigationStatus::Moving;
            self.current_instruction = MOVING_TEXT.to_string();
            Transition::Moving
        };

        Ok(transition)
    }

    /// Feed a timestamped fix.
    ///
    /// Timestamps must increase: a fix no newer than the last accepted one
    /// is dropped. A fix that implies travelling faster than
    /// `max_plausible_speed_mps` since the last accepted fix is dropped as a
    /// position jump.
    pub fn update_fix(&mut self, sample: &PositionSample) -> core::result::Result<Transition, Ignored> {
        if let Some(last) = self.last_fix {
            if sample.timestamp <= last.timestamp {
                debug!("Dropping fix at t={} not after t={}", sample.timestamp, last.timestamp);
                return Err(Ignored::OutOfOrderFix);
            }
            // Positive by the check above; saturates only on absurd gaps.
            let elapsed_ms = sample.timestamp.saturating_sub(last.timestamp);
            if sample.is_finite() {
                let speed_mps = sample.distance_to(last.latitude, last.longitude) / (elapsed_ms as f64 / 1000.0);
                if speed_mps > self.config.max_plausible_speed_mps {
                    warn!("Dropping position jump at {speed_mps:.1} m/s");
                    return Err(Ignored::ImplausibleJump { speed_mps });
                }
            }
        }

        let transition = self.update_position(sample.latitude, sample.longitude, sample.altitude)?;
        self.last_fix = Some(Fix {
            latitude: sample.latitude,
            longitude: sample.longitude,
            timestamp: sample.timestamp,
        });
        Ok(transition)
    }

    fn arrive(&mut self, index: usize) -> Transition {
        self.state.reached_keypoints.insert(index);
        self.state.is_approaching_keypoint = false;

        let keypoint_type = self.keypoints[index].keypoint_type;
        let text = arrival_instruction(keypoint_type).to_string();
        debug!("Arrived at keypoint {index}: {keypoint_type:?}");

        let finished = index + 1 >= self.keypoints.len();
        let follow_up = if finished {
            self.state.status = NavigationStatus::Arrived;
            self.progress = 100.0;
            self.current_instruction = DESTINATION_TEXT.to_string();
            info!("Navigation completed, arrived at destination");
            DESTINATION_TEXT.to_string()
        } else {
            self.state.current_keypoint_index = index + 1;
            self.state.status = NavigationStatus::MovingToNext;
            self.current_instruction = text.clone();
            next_instruction(self.keypoints[index + 1].keypoint_type).to_string()
        };

        self.sink.announce(&Announcement::Arrival {
            index,
            keypoint_type,
            text,
            follow_up,
        });
        Transition::Arrival { index, finished }
    }

    fn approach(&mut self, index: usize, distance: f64) -> Transition {
        self.state.is_approaching_keypoint = true;
        self.state.status = NavigationStatus::Approaching;

        let keypoint_type = self.keypoints[index].keypoint_type;
        let proximity = self.proximity(distance);
        let text = approach_instruction(keypoint_type).to_string();
        self.current_instruction = text.clone();
        debug!("Approaching keypoint {index}: {keypoint_type:?} ({})", proximity.label());

        self.sink.announce(&Announcement::Approach {
            index,
            keypoint_type,
            proximity,
            text,
        });
        Transition::Approach { index, proximity }
    }

    fn proximity(&self, distance: f64) -> Proximity {
        if distance < self.config.very_close_m {
            Proximity::VeryClose
        } else if distance < self.config.close_m {
            Proximity::Close
        } else {
            Proximity::Approaching
        }
    }

    pub fn status(&self) -> NavigationStatus {
        self.state.status
    }

    pub fn is_navigating(&self) -> bool {
        self.navigating
    }

    pub fn is_navigation_complete(&self) -> bool {
        self.state.status == NavigationStatus::Arrived
    }

    /// The keypoint currently being walked to.
    pub fn current_keypoint(&self) -> Option<&LocationPoint> {
        self.keypoints.get(self.state.current_keypoint_index)
    }

    /// The keypoint after the current one.
    pub fn next_keypoint(&self) -> Option<&LocationPoint> {
        self.keypoints.get(self.state.current_keypoint_index + 1)
    }

    pub fn current_keypoint_index(&self) -> usize {
        self.state.current_keypoint_index
    }

    pub fn total_keypoints(&self) -> usize {
        self.keypoints.len()
    }

    /// Meters to the current keypoint as of the last accepted fix.
    pub fn distance_to_next(&self) -> f64 {
        self.distance_to_next
    }

    /// Percentage of keypoints passed, in [0, 100].
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// [`Self::distance_to_next`] as spoken text.
    pub fn distance_to_next_text(&self) -> String {
        format_distance(self.distance_to_next)
    }

    /// Recorded route duration scaled by the share of the route left.
    pub fn estimated_time_remaining_secs(&self) -> u32 {
        let remaining = (100.0 - self.progress) / 100.0;
        (remaining * f64::from(self.route_duration_secs)) as u32
    }

    /// Whether the last fix lies within `near_destination_m` of the
    /// route's final location.
    pub fn is_near_destination(&self) -> bool {
        match (self.last_position, self.destination) {
            (Some((lat, lon)), Some((dest_lat, dest_lon))) => {
                haversine(lat, lon, dest_lat, dest_lon) <= self.config.near_destination_m
            }
            _ => false,
        }
    }

    pub fn current_instruction(&self) -> &str {
        &self.current_instruction
    }

    pub fn snapshot(&self) -> NavigationSnapshot {
        NavigationSnapshot {
            is_navigating: self.navigating,
            status: self.state.status,
            current_keypoint_index: self.state.current_keypoint_index,
            total_keypoints: self.keypoints.len(),
            current_keypoint: self.current_keypoint().cloned(),
            next_keypoint: self.next_keypoint().cloned(),
            distance_to_next: self.distance_to_next,
            distance_to_next_text: self.distance_to_next_text(),
            progress: self.progress,
            estimated_time_remaining_secs: self.estimated_time_remaining_secs(),
            is_near_destination: self.is_near_destination(),
            current_instruction: self.current_instruction.clone(),
        }
    }
}

/// Distance for speech: centimeters under a meter, whole meters under
/// ten, tens of meters beyond.
pub fn format_distance(meters: f64) -> String {
    if meters < 1.0 {
        format!("{} cm", (meters * 100.0) as i64)
    } else if meters < 10.0 {
        format!("{} meters", meters as i64)
    } else {
        format!("{} meters", (meters / 10.0) as i64 * 10)
    }
}

/// Spoken on reaching a keypoint.
pub fn arrival_instruction(keypoint_type: KeypointType) -> &'static str {
    match keypoint_type {
        KeypointType::None => "Continue straight",
        KeypointType::TurnLeft => "Turn left now",
        KeypointType::TurnRight => "Turn right now",
        KeypointType::TurnAround => "Turn around now",
        KeypointType::StairsUp => "Go up the stairs",
        KeypointType::StairsDown => "Go down the stairs",
        KeypointType::Elevator => "Take the elevator",
        KeypointType::Door => "Go through the door",
        KeypointType::Landmark => "Continue past the landmark",
    }
}

/// Spoken when a keypoint comes within approach distance.
pub fn approach_instruction(keypoint_type: KeypointType) -> &'static str {
    match keypoint_type {
        KeypointType::None => "Continue straight",
        KeypointType::TurnLeft => "Get ready to turn left",
        KeypointType::TurnRight => "Get ready to turn right",
        KeypointType::TurnAround => "Get ready to turn around",
        KeypointType::StairsUp => "Approaching stairs going up",
        KeypointType::StairsDown => "Approaching stairs going down",
        KeypointType::Elevator => "Approaching elevator",
        KeypointType::Door => "Approaching door",
        KeypointType::Landmark => "Approaching landmark",
    }
}

/// Spoken after an arrival, describing the new target.
pub fn next_instruction(keypoint_type: KeypointType) -> &'static str {
    match keypoint_type {
        KeypointType::None => "Continue straight",
        KeypointType::TurnLeft => "Now turn left and continue",
        KeypointType::TurnRight => "Now turn right and continue",
        KeypointType::TurnAround => "Now turn around and continue",
        KeypointType::StairsUp => "Now go up the stairs",
        KeypointType::StairsDown => "Now go down the stairs",
        KeypointType::Elevator => "Now take the elevator",
        KeypointType::Door => "Now go through the door",
        KeypointType::Landmark => "Now continue past the landmark",
    }
}
