//! Indoor route recording and turn-by-turn navigation core.
//!
//! Recording turns a stream of position fixes into a [`Route`] with
//! keypoints at turns, stairs and doors. Navigation replays those keypoints
//! against live fixes and announces what to do next.

pub mod android_jni;
pub mod config;
pub mod error;
pub mod geo;
pub mod gpx;
pub mod keypoint;
pub mod model;
pub mod navigation;
pub mod recorder;
pub mod session;

pub use config::{Config, DetectorConfig, NavigationConfig};
pub use error::{Error, Ignored, Result};
pub use keypoint::KeypointDetector;
pub use model::{KeypointType, LocationPoint, PositionSample, Route, RouteStats};
pub use navigation::{Announcement, InstructionSink, NavigationEngine, NavigationStatus, Transition};
pub use recorder::{RouteMeta, RouteRecorder};
pub use session::SessionHandle;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
