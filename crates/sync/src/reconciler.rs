//! Incremental marker reconciliation.
//!
//! [`MarkerReconciler`] owns the `record id -> marker handle` mapping. Each
//! [`reconcile`](MarkerReconciler::reconcile) pass diffs the incoming records
//! against that mapping and touches only markers whose record appeared,
//! disappeared, moved, or changed status. All surface calls for a pass are
//! issued synchronously within the call, so no intermediate state is ever
//! observable between passes.
//!
//! Detail panels are rendered lazily on [`open_panel`](MarkerReconciler::open_panel)
//! and stored on the marker entry; each entry holds at most one render.

use std::collections::{HashMap, HashSet};

use bansos_core::coordinates::{Bounds, Coordinates};
use bansos_core::panel::{render, DetailPanel, PanelConfig};
use bansos_core::recipient::RecipientRecord;
use bansos_core::types::DbId;

use crate::surface::{FitRequest, MapSurface, MarkerSpec, MarkerStyle};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Map-wide constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapConfig {
    /// Padding around fitted bounds, in pixels.
    pub fit_padding_px: u32,
    /// Zoom ceiling when fitting bounds (keeps a single marker from
    /// zooming in to street level).
    pub max_fit_zoom: u8,
    /// Initial view for a freshly created surface.
    pub default_center: Coordinates,
    pub default_zoom: u8,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            fit_padding_px: 50,
            max_fit_zoom: 14,
            default_center: Coordinates {
                lat: -7.15,
                lng: 111.88,
            },
            default_zoom: 12,
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// What a single reconcile pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
    /// Records excluded because their coordinates were malformed.
    pub malformed: usize,
    pub viewport_fitted: bool,
}

impl ReconcileReport {
    /// `true` when the pass issued no surface calls at all.
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.removed == 0 && !self.viewport_fitted
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

struct MarkerEntry<H> {
    handle: H,
    position: Coordinates,
    style: MarkerStyle,
    record: RecipientRecord,
    panel: Option<DetailPanel>,
}

/// Owns the markers drawn for a record set on one [`MapSurface`].
pub struct MarkerReconciler<S: MapSurface> {
    entries: HashMap<DbId, MarkerEntry<S::Handle>>,
    config: MapConfig,
    panel_config: PanelConfig,
}

impl<S: MapSurface> Default for MarkerReconciler<S> {
    fn default() -> Self {
        Self::new(MapConfig::default(), PanelConfig::default())
    }
}

impl<S: MapSurface> MarkerReconciler<S> {
    pub fn new(config: MapConfig, panel_config: PanelConfig) -> Self {
        Self {
            entries: HashMap::new(),
            config,
            panel_config,
        }
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Number of markers currently on the surface.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_tracked(&self, record_id: DbId) -> bool {
        self.entries.contains_key(&record_id)
    }

    /// Tracked record ids in ascending order.
    pub fn tracked_ids(&self) -> Vec<DbId> {
        let mut ids: Vec<DbId> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn handle(&self, record_id: DbId) -> Option<&S::Handle> {
        self.entries.get(&record_id).map(|e| &e.handle)
    }

    pub fn position(&self, record_id: DbId) -> Option<Coordinates> {
        self.entries.get(&record_id).map(|e| e.position)
    }

    /// Bring the surface in line with `records`.
    ///
    /// Records without coordinates are left off the map; records with
    /// malformed coordinates are logged and left off. When a record id
    /// appears more than once the first occurrence wins.
    ///
    /// The viewport is not refitted on every non-empty pass. It is refitted
    /// only when a marker was added, removed, or moved; a pass that merely
    /// restyles markers, or changes nothing, leaves the user's pan and zoom
    /// alone and issues no `fit_bounds` call.
    pub fn reconcile(&mut self, surface: &mut S, records: &[RecipientRecord]) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        // 1. Desired set, in input order.
        let mut desired: Vec<(&RecipientRecord, MarkerSpec)> = Vec::with_capacity(records.len());
        let mut seen: HashSet<DbId> = HashSet::with_capacity(records.len());
        for record in records {
            if !seen.insert(record.id) {
                tracing::warn!(record_id = record.id, "Duplicate recipient id, keeping first");
                continue;
            }
            let position = match record.coordinates() {
                Ok(Some(p)) => p,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(record_id = record.id, error = %e, "Excluding record from map");
                    report.malformed += 1;
                    continue;
                }
            };
            let spec = MarkerSpec {
                record_id: record.id,
                position,
                style: MarkerStyle::for_status(record.economic_status()),
            };
            desired.push((record, spec));
        }
        let desired_ids: HashSet<DbId> = desired.iter().map(|(_, s)| s.record_id).collect();

        // 2. Removals.
        let mut stale: Vec<DbId> = self
            .entries
            .keys()
            .filter(|id| !desired_ids.contains(*id))
            .copied()
            .collect();
        stale.sort_unstable();
        for id in stale {
            if let Some(entry) = self.entries.remove(&id) {
                surface.remove_marker(entry.handle);
                report.removed += 1;
            }
        }

        // 3 + 4. Creations and in-place updates.
        let mut moved = false;
        for (record, spec) in &desired {
            match self.entries.get_mut(&spec.record_id) {
                Some(entry) => {
                    let position_changed = entry.position != spec.position;
                    if position_changed || entry.style != spec.style {
                        surface.update_marker(&mut entry.handle, spec);
                        entry.position = spec.position;
                        entry.style = spec.style;
                        report.updated += 1;
                        moved |= position_changed;
                    } else {
                        report.unchanged += 1;
                    }
                    if entry.record != **record {
                        entry.record = (*record).clone();
                        if entry.panel.is_some() {
                            entry.panel = Some(render(&entry.record, &self.panel_config));
                        }
                    }
                }
                None => {
                    let handle = surface.add_marker(spec);
                    self.entries.insert(
                        spec.record_id,
                        MarkerEntry {
                            handle,
                            position: spec.position,
                            style: spec.style,
                            record: (*record).clone(),
                            panel: None,
                        },
                    );
                    report.created += 1;
                }
            }
        }

        // 5. Viewport.
        let set_changed = report.created > 0 || report.removed > 0 || moved;
        if set_changed {
            if let Some(bounds) = Bounds::enclosing(desired.iter().map(|(_, s)| s.position)) {
                surface.fit_bounds(FitRequest {
                    bounds,
                    padding_px: self.config.fit_padding_px,
                    max_zoom: self.config.max_fit_zoom,
                });
                report.viewport_fitted = true;
            }
        }

        tracing::debug!(
            created = report.created,
            updated = report.updated,
            removed = report.removed,
            unchanged = report.unchanged,
            malformed = report.malformed,
            "Markers reconciled",
        );
        report
    }

    /// Render (or re-render) the detail panel for a marker.
    ///
    /// Any previous render for the same marker is replaced. Returns `None`
    /// if the record has no marker.
    pub fn open_panel(&mut self, record_id: DbId) -> Option<&DetailPanel> {
        let entry = self.entries.get_mut(&record_id)?;
        entry.panel = Some(render(&entry.record, &self.panel_config));
        entry.panel.as_ref()
    }

    /// The currently open panel for a marker, if any.
    pub fn panel(&self, record_id: DbId) -> Option<&DetailPanel> {
        self.entries.get(&record_id)?.panel.as_ref()
    }

    pub fn close_panel(&mut self, record_id: DbId) {
        if let Some(entry) = self.entries.get_mut(&record_id) {
            entry.panel = None;
        }
    }

    /// Remove every marker from the surface, e.g. when the view is torn
    /// down. The reconciler can be reused afterwards.
    pub fn clear(&mut self, surface: &mut S) -> usize {
        let count = self.entries.len();
        for (_, entry) in self.entries.drain() {
            surface.remove_marker(entry.handle);
        }
        count
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
