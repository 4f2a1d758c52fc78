//! JNI bindings for the Android app.
//!
//! Each public function here corresponds to an `external fun` declaration
//! in RustBridge.kt. The function names follow JNI naming conventions:
//! Java_<package>_<class>_<method> with dots replaced by underscores.
//!
//! Structured data crosses the boundary as JSON. A navigation engine lives
//! behind an opaque `long` handle created by `navCreate` and released by
//! `navDestroy`; the Kotlin side must not use a handle from two threads at
//! once or after it has been destroyed.

use jni::objects::{JClass, JString};
use jni::sys::{jdouble, jfloat, jlong, jstring};
use jni::JNIEnv;
use log::{error, trace};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{PositionSample, Route};
use crate::navigation::{AnnouncementLog, NavigationEngine};
use crate::recorder::{record_route, RouteMeta};

type Engine = NavigationEngine<AnnouncementLog>;

fn read_string(env: &mut JNIEnv, value: &JString) -> Result<String> {
    let java = env.get_string(value).map_err(|e| Error::Jni(e.to_string()))?;
    Ok(java.into())
}

/// Convert a result into a Java string, or null after logging the error.
fn respond(env: &mut JNIEnv, result: Result<String>) -> jstring {
    let created = result.and_then(|text| env.new_string(text).map_err(|e| Error::Jni(e.to_string())));
    match created {
        Ok(java) => java.into_raw(),
        Err(e) => {
            error!("{e}");
            std::ptr::null_mut()
        }
    }
}

fn engine_mut<'a>(handle: jlong) -> Result<&'a mut Engine> {
    // SAFETY: handles are only produced by `navCreate` and the Kotlin side
    // guarantees exclusive use until `navDestroy`.
    unsafe { (handle as *mut Engine).as_mut() }.ok_or_else(|| Error::Jni("null navigation handle".into()))
}

/// Drain the engine's announcements as a JSON array.
fn drain(engine: &mut Engine) -> Result<String> {
    Ok(serde_json::to_string(&engine.sink_mut().take())?)
}

/// Feed one fix and drain whatever it caused. Ignored fixes yield `[]`.
fn apply_fix(engine: &mut Engine, sample: &PositionSample) -> Result<String> {
    if let Err(reason) = engine.update_fix(sample) {
        trace!("Fix ignored: {reason}");
    }
    drain(engine)
}

/// Returns the rust-core library version.
/// Maps to: RustBridge.version() -> String
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_example_fyp_RustBridge_version(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    respond(&mut env, Ok(crate::VERSION.to_string()))
}

/// Routes `log` output to logcat. Safe to call more than once.
/// Maps to: RustBridge.initLogging()
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_example_fyp_RustBridge_initLogging(
    _env: JNIEnv,
    _class: JClass,
) {
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(log::LevelFilter::Debug)
            .with_tag("innav"),
    );
}

/// Runs a recorded sample list through keypoint detection and returns the
/// resulting route as JSON, or null if the recording is unusable.
/// Maps to: RustBridge.buildRoute(configJson, samplesJson, metaJson) -> String?
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_example_fyp_RustBridge_buildRoute(
    mut env: JNIEnv,
    _class: JClass,
    config_json: JString,
    samples_json: JString,
    meta_json: JString,
) -> jstring {
    let result = (|| -> Result<String> {
        let config = parse_config(&read_string(&mut env, &config_json)?)?;
        let samples: Vec<PositionSample> = serde_json::from_str(&read_string(&mut env, &samples_json)?)?;
        let meta: RouteMeta = serde_json::from_str(&read_string(&mut env, &meta_json)?)?;

        record_route(config.detector, &samples, meta)?.to_json()
    })();
    respond(&mut env, result)
}

/// Parses a GPX document into position samples as JSON.
/// Maps to: RustBridge.importGpx(gpxText) -> String?
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_example_fyp_RustBridge_importGpx(
    mut env: JNIEnv,
    _class: JClass,
    gpx_text: JString,
) -> jstring {
    let result = read_string(&mut env, &gpx_text)
        .and_then(|text| crate::gpx::samples_from_str(&text))
        .and_then(|samples| Ok(serde_json::to_string(&samples)?));
    respond(&mut env, result)
}

/// Creates a navigation engine and returns its handle, or 0 on bad config.
/// Maps to: RustBridge.navCreate(configJson) -> Long
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_example_fyp_RustBridge_navCreate(
    mut env: JNIEnv,
    _class: JClass,
    config_json: JString,
) -> jlong {
    match read_string(&mut env, &config_json).and_then(|json| parse_config(&json)) {
        Ok(config) => {
            let engine = Engine::new(config.navigation, AnnouncementLog::default());
            Box::into_raw(Box::new(engine)) as jlong
        }
        Err(e) => {
            error!("{e}");
            0
        }
    }
}

/// Starts navigating a route. Returns the announcements as JSON, or null
/// if the route was rejected.
/// Maps to: RustBridge.navStart(handle, routeJson) -> String?
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_example_fyp_RustBridge_navStart(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
    route_json: JString,
) -> jstring {
    let result = (|| -> Result<String> {
        let route = Route::from_json(&read_string(&mut env, &route_json)?)?;
        let engine = engine_mut(handle)?;
        engine.start_navigation(&route)?;
        drain(engine)
    })();
    respond(&mut env, result)
}

/// Feeds a position fix. Returns the announcements it caused as JSON.
/// Maps to: RustBridge.navUpdate(handle, lat, lon, alt, bearing, timestamp) -> String?
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_example_fyp_RustBridge_navUpdate(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
    latitude: jdouble,
    longitude: jdouble,
    altitude: jfloat,
    bearing: jfloat,
    timestamp: jlong,
) -> jstring {
    let sample = PositionSample::new(latitude, longitude, altitude, bearing, timestamp);
    let result = engine_mut(handle).and_then(|engine| apply_fix(engine, &sample));
    respond(&mut env, result)
}

/// Returns the engine's state as JSON for the UI.
/// Maps to: RustBridge.navSnapshot(handle) -> String?
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_example_fyp_RustBridge_navSnapshot(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jstring {
    let result = engine_mut(handle).and_then(|engine| Ok(serde_json::to_string(&engine.snapshot())?));
    respond(&mut env, result)
}

/// Stops navigation. Returns the announcements as JSON.
/// Maps to: RustBridge.navStop(handle) -> String?
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_example_fyp_RustBridge_navStop(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jstring {
    let result = engine_mut(handle).and_then(|engine| {
        engine.stop_navigation();
        drain(engine)
    });
    respond(&mut env, result)
}

/// Releases a navigation engine. The handle is invalid afterwards.
/// Maps to: RustBridge.navDestroy(handle)
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_example_fyp_RustBridge_navDestroy(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
) {
    if handle != 0 {
        // SAFETY: the handle came from `Box::into_raw` in `navCreate` and is
        // not used again by the Kotlin side.
        drop(unsafe { Box::from_raw(handle as *mut Engine) });
    }
}

/// An empty string means "use the defaults".
fn parse_config(json: &str) -> Result<Config> {
    if json.trim().is_empty() {
        Ok(Config::default())
    } else {
        Config::from_json(json)
    }
}
