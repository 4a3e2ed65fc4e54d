//! Latitude/longitude pairing and bounds.
//!
//! The API transmits each coordinate as an optional decimal string. A record
//! is mappable only when both halves are present and valid; a lone half is
//! reported as [`CoreError::MalformedCoordinate`] so callers can log it and
//! treat the record as unmapped.

use serde::Serialize;

use crate::error::CoreError;
use crate::types::DbId;

/// Base URL of the external map link shown on detail panels.
pub const MAP_LINK_BASE: &str = "https://www.google.com/maps/search/?api=1&query=";

/// A validated WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    /// External map link centred on this position.
    pub fn map_link(&self) -> String {
        format!("{MAP_LINK_BASE}{},{}", self.lat, self.lng)
    }
}

/// Pair two optional string-encoded coordinates.
///
/// Empty or whitespace-only strings count as absent.
///
/// * both absent -> `Ok(None)`
/// * both present and valid -> `Ok(Some(..))`
/// * anything else -> [`CoreError::MalformedCoordinate`]
pub fn pair_coordinates(
    record_id: DbId,
    latitude: Option<&str>,
    longitude: Option<&str>,
) -> Result<Option<Coordinates>, CoreError> {
    let latitude = latitude.map(str::trim).filter(|s| !s.is_empty());
    let longitude = longitude.map(str::trim).filter(|s| !s.is_empty());

    let malformed = |reason: String| CoreError::MalformedCoordinate { record_id, reason };

    match (latitude, longitude) {
        (None, None) => Ok(None),
        (Some(_), None) => Err(malformed("latitude present without longitude".into())),
        (None, Some(_)) => Err(malformed("longitude present without latitude".into())),
        (Some(lat), Some(lng)) => {
            let lat = parse_component(lat, 90.0).map_err(|e| malformed(format!("latitude {e}")))?;
            let lng =
                parse_component(lng, 180.0).map_err(|e| malformed(format!("longitude {e}")))?;
            Ok(Some(Coordinates { lat, lng }))
        }
    }
}

fn parse_component(raw: &str, limit: f64) -> Result<f64, String> {
    let value: f64 = raw
        .parse()
        .map_err(|_| format!("{raw:?} is not a number"))?;
    if !value.is_finite() {
        return Err(format!("{raw:?} is not finite"));
    }
    if value.abs() > limit {
        return Err(format!("{value} is outside +/-{limit}"));
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Bounds
// ---------------------------------------------------------------------------

/// Axis-aligned box enclosing a set of positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Bounds {
    /// Smallest box containing every position, or `None` for an empty set.
    pub fn enclosing<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Coordinates>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let init = Bounds {
            south: first.lat,
            west: first.lng,
            north: first.lat,
            east: first.lng,
        };
        Some(iter.fold(init, |b, p| Bounds {
            south: b.south.min(p.lat),
            west: b.west.min(p.lng),
            north: b.north.max(p.lat),
            east: b.east.max(p.lng),
        }))
    }

    pub fn contains(&self, p: Coordinates) -> bool {
        p.lat >= self.south && p.lat <= self.north && p.lng >= self.west && p.lng <= self.east
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
