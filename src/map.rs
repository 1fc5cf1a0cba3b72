use serde::Serialize;

use crate::geo::{self, LngLatBounds, RegionStyle, TooltipContent, Viewport};
use crate::model::{FeatureCollection, Severity};

const INITIAL_FIT_PADDING_PX: f64 = 40.0;
const REGION_FIT_PADDING_PX: f64 = 60.0;
const MAX_FIT_ZOOM: f64 = 10.0;
const DEFAULT_SURFACE_PX: (f64, f64) = (1280.0, 720.0);
const INSPECTOR_SOURCE: &str = "AI geospatial analysis";

pub type RegionId = usize;

/// One renderable polygon region: derived content plus the normalized ring
/// the surface draws. Regions with unusable geometry keep an empty ring and
/// no bounds; they are listed but never drawn or fitted.
#[derive(Debug, Clone, Serialize)]
pub struct OverlayRegion {
    pub id: RegionId,
    pub name: String,
    pub severity: Option<Severity>,
    pub style: RegionStyle,
    pub tooltip: TooltipContent,
    pub ring: Vec<[f64; 2]>,
    pub bounds: Option<LngLatBounds>,
    pub confidence: String,
    pub description: String,
}

/// A viewport change the surface should apply, with the animation flag the
/// interaction calls for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraMove {
    pub viewport: Viewport,
    pub animate: bool,
}

/// Full detail view for one inspected region.
#[derive(Debug, Clone, Serialize)]
pub struct InspectorView {
    pub name: String,
    pub severity_label: String,
    pub confidence: String,
    pub description: String,
    pub source: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct MapSnapshot {
    pub regions: Vec<OverlayRegion>,
    pub emphasized: Option<RegionId>,
    pub selected: Option<RegionId>,
    pub inspected: Option<RegionId>,
    pub viewport: Option<Viewport>,
}

/// Interaction state for the map surface: which region is emphasized,
/// selected, or inspected, and the current auto-fit viewport. All styling is
/// derived through `geo`; this layer only binds it to per-region state.
pub struct MapViewState {
    regions: Vec<OverlayRegion>,
    emphasized: Option<RegionId>,
    selected: Option<RegionId>,
    inspected: Option<RegionId>,
    viewport: Option<Viewport>,
    surface_px: (f64, f64),
}

impl Default for MapViewState {
    fn default() -> Self {
        Self::new()
    }
}

impl MapViewState {
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
            emphasized: None,
            selected: None,
            inspected: None,
            viewport: None,
            surface_px: DEFAULT_SURFACE_PX,
        }
    }

    pub fn set_surface_size(&mut self, width_px: f64, height_px: f64) {
        if width_px > 0.0 && height_px > 0.0 {
            self.surface_px = (width_px, height_px);
        }
    }

    /// Rebuild the overlays for a new result and auto-fit the viewport
    /// across every renderable feature. Empty or fully-degenerate input
    /// leaves no overlays and no fit, never an error.
    pub fn load(&mut self, collection: &FeatureCollection) {
        self.clear();
        self.regions = collection
            .features
            .iter()
            .enumerate()
            .map(|(id, feature)| {
                let ring = feature
                    .geometry
                    .exterior()
                    .and_then(geo::closed_ring)
                    .unwrap_or_default();
                OverlayRegion {
                    id,
                    name: feature.properties.name.clone(),
                    severity: feature.properties.severity,
                    style: geo::style_for(feature.properties.severity),
                    tooltip: geo::tooltip_for(&feature.properties),
                    bounds: geo::feature_bounds(feature),
                    ring,
                    confidence: feature.properties.confidence.clone(),
                    description: feature.properties.description.clone(),
                }
            })
            .collect();

        self.viewport = geo::collection_bounds(collection).map(|bounds| {
            geo::fit_bounds(&bounds, INITIAL_FIT_PADDING_PX, self.surface_px, MAX_FIT_ZOOM)
        });
    }

    pub fn clear(&mut self) {
        self.regions.clear();
        self.emphasized = None;
        self.selected = None;
        self.inspected = None;
        self.viewport = None;
    }

    pub fn regions(&self) -> &[OverlayRegion] {
        &self.regions
    }

    /// Current style for one region: its base style, emphasized while the
    /// pointer is over it. Other regions are unaffected.
    pub fn region_style(&self, id: RegionId) -> Option<RegionStyle> {
        let region = self.regions.get(id)?;
        if self.emphasized == Some(id) {
            Some(geo::emphasized(region.style))
        } else {
            Some(region.style)
        }
    }

    pub fn pointer_enter(&mut self, id: RegionId) -> bool {
        if id >= self.regions.len() {
            return false;
        }
        self.emphasized = Some(id);
        true
    }

    pub fn pointer_leave(&mut self, id: RegionId) -> bool {
        if self.emphasized == Some(id) {
            self.emphasized = None;
            true
        } else {
            false
        }
    }

    /// Region click: mark it selected and fit the viewport to its bounds.
    /// Regions without usable bounds are selected but produce no camera
    /// move.
    pub fn select(&mut self, id: RegionId) -> Option<CameraMove> {
        let region = self.regions.get(id)?;
        self.selected = Some(id);
        let bounds: LngLatBounds = region.bounds?;
        let viewport = geo::fit_bounds(
            &bounds,
            REGION_FIT_PADDING_PX,
            self.surface_px,
            MAX_FIT_ZOOM,
        );
        self.viewport = Some(viewport);
        Some(CameraMove {
            viewport,
            animate: true,
        })
    }

    /// "Investigate" from the tooltip: opens the detail modal without
    /// touching the selection (the surface stops the click before the
    /// region handler sees it).
    pub fn open_inspector(&mut self, id: RegionId) -> bool {
        if id >= self.regions.len() {
            return false;
        }
        self.inspected = Some(id);
        true
    }

    pub fn close_inspector(&mut self) {
        self.inspected = None;
    }

    pub fn inspector_view(&self) -> Option<InspectorView> {
        let region = self.regions.get(self.inspected?)?;
        Some(InspectorView {
            name: region.tooltip.name.clone(),
            severity_label: region.tooltip.severity_label.clone(),
            confidence: region.tooltip.confidence.clone(),
            description: region.description.clone(),
            source: INSPECTOR_SOURCE,
        })
    }

    pub fn snapshot(&self) -> MapSnapshot {
        MapSnapshot {
            regions: self.regions.clone(),
            emphasized: self.emphasized,
            selected: self.selected,
            inspected: self.inspected,
            viewport: self.viewport,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{
        fallback_feature_collection, Feature, FeatureProperties, PolygonGeometry,
    };

    use super::*;

    fn loaded() -> MapViewState {
        let mut state = MapViewState::new();
        state.load(&fallback_feature_collection());
        state
    }

    #[test]
    fn load_builds_styled_overlays_and_fits_viewport() {
        let state = loaded();
        assert_eq!(state.regions().len(), 3);
        assert_eq!(state.regions()[0].style.color, "#ef4444");
        assert_eq!(state.regions()[1].style.color, "#f97316");
        assert_eq!(state.regions()[2].style.color, "#3b82f6");
        let viewport = state.snapshot().viewport.unwrap();
        assert!(viewport.zoom <= MAX_FIT_ZOOM);
    }

    #[test]
    fn empty_collection_renders_nothing_without_error() {
        let mut state = MapViewState::new();
        state.load(&FeatureCollection::new(Vec::new()));
        assert!(state.regions().is_empty());
        assert!(state.snapshot().viewport.is_none());
        assert!(state.select(0).is_none());
    }

    #[test]
    fn only_one_region_is_emphasized_at_a_time() {
        let mut state = loaded();
        assert!(state.pointer_enter(0));
        assert!(state.pointer_enter(2));
        assert_eq!(state.snapshot().emphasized, Some(2));
        assert_eq!(state.region_style(2).unwrap().weight, 3.0);
        assert_eq!(state.region_style(0).unwrap(), state.regions()[0].style);

        // Leaving a region that is not emphasized changes nothing.
        assert!(!state.pointer_leave(0));
        assert!(state.pointer_leave(2));
        assert_eq!(state.region_style(2).unwrap(), state.regions()[2].style);
    }

    #[test]
    fn select_fits_viewport_to_region_bounds() {
        let mut state = loaded();
        let before = state.snapshot().viewport.unwrap();
        let camera = state.select(1).unwrap();
        assert!(camera.animate);
        assert_ne!(camera.viewport, before);
        assert_eq!(state.snapshot().selected, Some(1));
        // Region fit centers on the Bangalore hub.
        assert!((camera.viewport.center[0] - 77.60).abs() < 0.1);
    }

    #[test]
    fn inspector_opens_without_changing_selection() {
        let mut state = loaded();
        state.select(0);
        assert!(state.open_inspector(2));
        let snapshot = state.snapshot();
        assert_eq!(snapshot.selected, Some(0));
        assert_eq!(snapshot.inspected, Some(2));

        let view = state.inspector_view().unwrap();
        assert_eq!(view.name, "Hyderabad Secondary Node");
        assert_eq!(view.severity_label, "Low");
        assert_eq!(view.source, INSPECTOR_SOURCE);

        state.close_inspector();
        assert!(state.inspector_view().is_none());
    }

    #[test]
    fn degenerate_geometry_is_listed_but_never_fitted() {
        let mut state = MapViewState::new();
        state.load(&FeatureCollection::new(vec![Feature::new(
            PolygonGeometry::new(vec![vec![[0.0, 0.0], [1.0, 1.0]]]),
            FeatureProperties {
                name: "Broken".into(),
                severity: None,
                confidence: String::new(),
                description: String::new(),
            },
        )]));
        assert_eq!(state.regions().len(), 1);
        assert!(state.regions()[0].ring.is_empty());
        assert!(state.snapshot().viewport.is_none());
        // Selecting it is informational only; no camera move is produced.
        assert!(state.select(0).is_none());
        assert_eq!(state.snapshot().selected, Some(0));
    }

    #[test]
    fn out_of_range_ids_are_ignored() {
        let mut state = loaded();
        assert!(!state.pointer_enter(99));
        assert!(!state.open_inspector(99));
        assert!(state.select(99).is_none());
    }
}
