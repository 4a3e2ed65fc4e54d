//! The seam between the reconciler and whatever draws the map.

use bansos_core::coordinates::{Bounds, Coordinates};
use bansos_core::status::{EconomicStatus, UNKNOWN_STATUS_COLOR};
use bansos_core::types::DbId;

/// Visual style of a marker, derived from the record's economic status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerStyle {
    /// `None` when the income could not be classified.
    pub status: Option<EconomicStatus>,
    pub color: &'static str,
}

impl MarkerStyle {
    pub fn for_status(status: Option<EconomicStatus>) -> Self {
        Self {
            status,
            color: status.map_or(UNKNOWN_STATUS_COLOR, |s| s.color()),
        }
    }
}

/// Everything a surface needs to draw or redraw one marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerSpec {
    pub record_id: DbId,
    pub position: Coordinates,
    pub style: MarkerStyle,
}

/// Viewport fit request issued after the marker set changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitRequest {
    pub bounds: Bounds,
    pub padding_px: u32,
    pub max_zoom: u8,
}

/// A live map that can host markers.
///
/// Handles are opaque to the reconciler and owned by it exclusively: a
/// surface only ever receives back handles it issued.
pub trait MapSurface {
    type Handle;

    fn add_marker(&mut self, marker: &MarkerSpec) -> Self::Handle;

    /// Move and/or restyle an existing marker in place.
    fn update_marker(&mut self, handle: &mut Self::Handle, marker: &MarkerSpec);

    fn remove_marker(&mut self, handle: Self::Handle);

    fn fit_bounds(&mut self, request: FitRequest);
}
