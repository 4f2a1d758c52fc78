//! GPX track import.
//!
//! Wraps the `gpx` crate and turns recorded tracks into position samples,
//! so a walk logged by another tool can be replayed through the recorder
//! or fed to a navigation session in tests.

use std::io::Read;

use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::geo::bearing;
use crate::model::PositionSample;

/// Interval used when a track has no timestamps.
const SYNTHETIC_INTERVAL_MS: i64 = 1000;

/// Parse a GPX document and return every track point as a sample.
///
/// Segments and tracks are flattened in document order. The bearing of
/// each sample is the initial bearing from the point before it; the first
/// point takes the bearing of the first leg. Points without `<time>` are
/// spaced one second after their predecessor.
pub fn samples_from_gpx<R: Read>(reader: R) -> Result<Vec<PositionSample>> {
    let gpx = gpx::read(reader).map_err(|e| Error::Gpx(e.to_string()))?;

    let points: Vec<_> = gpx
        .tracks
        .iter()
        .flat_map(|t| t.segments.iter())
        .flat_map(|seg| seg.points.iter())
        .collect();

    let mut samples: Vec<PositionSample> = Vec::with_capacity(points.len());
    for (i, wp) in points.iter().enumerate() {
        let lat = wp.point().y();
        let lon = wp.point().x();
        let heading = match (i.checked_sub(1).map(|j| points[j]), points.get(1)) {
            (Some(prev), _) => bearing(prev.point().y(), prev.point().x(), lat, lon),
            (None, Some(next)) => bearing(lat, lon, next.point().y(), next.point().x()),
            (None, None) => 0.0,
        };
        let timestamp = match wp.time.clone() {
            Some(t) => {
                let at = OffsetDateTime::from(t);
                i64::try_from(at.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
            }
            None => synthetic_timestamp(samples.last()),
        };

        samples.push(PositionSample {
            latitude: lat,
            longitude: lon,
            altitude: wp.elevation.unwrap_or(0.0) as f32,
            bearing: heading as f32,
            timestamp,
        });
    }

    Ok(samples)
}

/// One interval after `prev`, or zero for the first point.
fn synthetic_timestamp(prev: Option<&PositionSample>) -> i64 {
    prev.map_or(0, |p| p.timestamp.saturating_add(SYNTHETIC_INTERVAL_MS))
}

/// Parse GPX from text. Convenience wrapper for JNI.
pub fn samples_from_str(text: &str) -> Result<Vec<PositionSample>> {
    samples_from_gpx(text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORRIDOR_GPX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test"
     xmlns="http://www.topografix.com/GPX/1/1">
  <trk>
    <name>Corridor</name>
    <trkseg>
      <trkpt lat="48.20000" lon="16.37000"><ele>171</ele><time>2024-03-01T10:00:00Z</time></trkpt>
      <trkpt lat="48.20001" lon="16.37000"><ele>171</ele><time>2024-03-01T10:00:01Z</time></trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="48.20001" lon="16.37002"><ele>174</ele><time>2024-03-01T10:00:03Z</time></trkpt>
    </trkseg>
  </trk>
</gpx>"#;

    #[test]
    fn flattens_segments_with_times() {
        let samples = samples_from_str(CORRIDOR_GPX).unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[1].timestamp - samples[0].timestamp, 1000);
        assert_eq!(samples[2].timestamp - samples[0].timestamp, 3000);
        assert_eq!(samples[0].timestamp, 1_709_287_200_000);
        assert!((samples[2].altitude - 174.0).abs() < 1e-6);
    }

    #[test]
    fn bearings_follow_the_track() {
        let samples = samples_from_str(CORRIDOR_GPX).unwrap();
        // First point copies the first leg, which heads north.
        assert!(samples[0].bearing.abs() < 0.5, "got {}", samples[0].bearing);
        assert!(samples[1].bearing.abs() < 0.5, "got {}", samples[1].bearing);
        assert!((samples[2].bearing - 90.0).abs() < 0.5, "got {}", samples[2].bearing);
    }

    #[test]
    fn synthesizes_missing_times() {
        let gpx = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test"
     xmlns="http://www.topografix.com/GPX/1/1">
  <trk>
    <trkseg>
      <trkpt lat="48.0" lon="16.0"></trkpt>
      <trkpt lat="48.00001" lon="16.0"></trkpt>
    </trkseg>
  </trk>
</gpx>"#;

        let samples = samples_from_str(gpx).unwrap();
        assert_eq!(samples[0].timestamp, 0);
        assert_eq!(samples[1].timestamp, 1000);
        assert_eq!(samples[0].altitude, 0.0);
    }

    #[test]
    fn synthetic_time_saturates() {
        let last = PositionSample::new(0.0, 0.0, 0.0, 0.0, i64::MAX - 10);
        assert_eq!(synthetic_timestamp(Some(&last)), i64::MAX);
        assert_eq!(synthetic_timestamp(None), 0);
    }

    #[test]
    fn empty_gpx_has_no_samples() {
        let empty = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test"
     xmlns="http://www.topografix.com/GPX/1/1">
</gpx>"#;

        assert!(samples_from_str(empty).unwrap().is_empty());
    }

    #[test]
    fn invalid_xml_returns_error() {
        assert!(matches!(samples_from_str("not xml at all"), Err(Error::Gpx(_))));
    }
}
