//! Detail panel content for a single recipient.
//!
//! [`render`] is a pure function of the record: no network access, no
//! shared state. The map layer calls it lazily when a marker is opened.

use serde::Serialize;

use crate::coordinates::Coordinates;
use crate::format::format_rupiah;
use crate::recipient::RecipientRecord;
use crate::status::{EconomicStatus, UNKNOWN_STATUS_COLOR, UNKNOWN_STATUS_LABEL};
use crate::types::{DbId, Timestamp};

/// Default number of photo thumbnails shown before the overflow indicator.
pub const DEFAULT_PHOTO_CAP: usize = 3;

/// Display limits for the detail panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelConfig {
    pub photo_cap: usize,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            photo_cap: DEFAULT_PHOTO_CAP,
        }
    }
}

/// Status badge; `status` is `None` when income could not be classified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusBadge {
    pub status: Option<EconomicStatus>,
    pub text: &'static str,
    pub color: &'static str,
}

impl StatusBadge {
    pub fn for_status(status: Option<EconomicStatus>) -> Self {
        match status {
            Some(s) => Self {
                status,
                text: s.label(),
                color: s.color(),
            },
            None => Self {
                status: None,
                text: UNKNOWN_STATUS_LABEL,
                color: UNKNOWN_STATUS_COLOR,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoThumbnail {
    pub photo_id: DbId,
    pub url: String,
}

/// Everything the detail view shows for one recipient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailPanel {
    pub record_id: DbId,
    pub head_name: String,
    pub badge: StatusBadge,
    /// `"{village}, {district}"`.
    pub location_line: String,
    pub full_address: String,
    pub family_members: u32,
    pub aid_type: String,
    /// Formatted Rupiah amount, or the raw string if it does not parse.
    pub income: String,
    pub coordinates: Option<Coordinates>,
    pub map_link: Option<String>,
    pub thumbnails: Vec<PhotoThumbnail>,
    /// Photos beyond the cap, shown as "+K more". Zero when all fit.
    pub more_photos: usize,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl DetailPanel {
    /// Overflow indicator text, e.g. `"+2 more"`.
    pub fn overflow_label(&self) -> Option<String> {
        (self.more_photos > 0).then(|| format!("+{} more", self.more_photos))
    }
}

/// Render the detail panel for `record`.
pub fn render(record: &RecipientRecord, config: &PanelConfig) -> DetailPanel {
    let coordinates = record.map_position();
    let income = match record.income() {
        Ok(amount) => format_rupiah(amount),
        Err(_) => record.monthly_income.clone(),
    };

    let thumbnails = record
        .photos
        .iter()
        .take(config.photo_cap)
        .map(|p| PhotoThumbnail {
            photo_id: p.id,
            url: p.file_path.clone(),
        })
        .collect();

    DetailPanel {
        record_id: record.id,
        head_name: record.head_name.clone(),
        badge: StatusBadge::for_status(record.economic_status()),
        location_line: format!("{}, {}", record.village, record.district_name),
        full_address: record.address.clone(),
        family_members: record.family_members,
        aid_type: record.aid_type_name.clone(),
        income,
        coordinates,
        map_link: coordinates.map(|c| c.map_link()),
        thumbnails,
        more_photos: record.photos.len().saturating_sub(config.photo_cap),
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
