//! Error types.

/// Errors surfaced by the recording and navigation APIs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid route: {0}")]
    InvalidRoute(&'static str),

    #[error("not enough locations recorded: {0} (need at least 2)")]
    NotEnoughLocations(usize),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GPX parse error: {0}")]
    Gpx(String),

    #[error("navigation session closed")]
    SessionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JNI error: {0}")]
    Jni(String),
}

pub type Result<T> = core::result::Result<T, Error>;

/// Why a position update produced no transition.
///
/// None of these are failures: late callbacks after a stop, fixes after
/// arrival and bad fixes are all expected in the field.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum Ignored {
    #[error("no active navigation session")]
    NotNavigating,

    #[error("destination already reached")]
    Finished,

    #[error("fix has non-finite coordinates")]
    NonFiniteFix,

    #[error("fix is not newer than the last accepted fix")]
    OutOfOrderFix,

    #[error("fix implies implausible speed of {speed_mps:.1} m/s")]
    ImplausibleJump { speed_mps: f64 },
}
