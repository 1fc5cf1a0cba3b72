use serde::Serialize;

use crate::model::{Feature, FeatureCollection, FeatureProperties, Severity};

const BASE_FILL_OPACITY: f64 = 0.25;
const BASE_WEIGHT: f64 = 1.5;
const EMPHASIS_FILL_OPACITY: f64 = 0.45;
const EMPHASIS_WEIGHT: f64 = 3.0;

const TILE_SIZE: f64 = 256.0;

/// Visual style for one polygon region. Fixed per severity class, never per
/// feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegionStyle {
    pub color: &'static str,
    pub fill_opacity: f64,
    pub weight: f64,
}

pub fn style_for(severity: Option<Severity>) -> RegionStyle {
    let color = match severity {
        Some(Severity::High) => "#ef4444",
        Some(Severity::Medium) => "#f97316",
        Some(Severity::Low) => "#3b82f6",
        None => "#9ca3af",
    };
    RegionStyle {
        color,
        fill_opacity: BASE_FILL_OPACITY,
        weight: BASE_WEIGHT,
    }
}

/// Hover emphasis for a single region. Derived from that region's base style
/// alone; unrelated regions are untouched.
pub fn emphasized(base: RegionStyle) -> RegionStyle {
    RegionStyle {
        color: base.color,
        fill_opacity: EMPHASIS_FILL_OPACITY,
        weight: EMPHASIS_WEIGHT,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TooltipContent {
    pub name: String,
    pub severity_label: String,
    pub confidence: String,
}

pub fn tooltip_for(properties: &FeatureProperties) -> TooltipContent {
    let name = if properties.name.trim().is_empty() {
        "Identified Zone".to_string()
    } else {
        properties.name.clone()
    };
    let confidence = if properties.confidence.trim().is_empty() {
        "98%".to_string()
    } else {
        properties.confidence.clone()
    };
    TooltipContent {
        name,
        severity_label: properties
            .severity
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| "Unclassified".to_string()),
        confidence,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LngLatBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl LngLatBounds {
    fn around(position: [f64; 2]) -> Self {
        Self {
            west: position[0],
            south: position[1],
            east: position[0],
            north: position[1],
        }
    }

    fn extend(&mut self, position: [f64; 2]) {
        self.west = self.west.min(position[0]);
        self.east = self.east.max(position[0]);
        self.south = self.south.min(position[1]);
        self.north = self.north.max(position[1]);
    }

    pub fn center(&self) -> [f64; 2] {
        [(self.west + self.east) / 2.0, (self.south + self.north) / 2.0]
    }

    pub fn is_degenerate(&self) -> bool {
        self.east <= self.west && self.north <= self.south
    }
}

/// Validate and normalize one polygon ring. Rings with non-finite
/// coordinates or too few vertices are rejected; an open ring (first vertex
/// != last) is closed by appending the first vertex.
pub fn closed_ring(ring: &[[f64; 2]]) -> Option<Vec<[f64; 2]>> {
    if ring
        .iter()
        .any(|p| !p[0].is_finite() || !p[1].is_finite())
    {
        return None;
    }
    let closed = ring.first() == ring.last();
    if closed {
        if ring.len() < 4 {
            return None;
        }
        Some(ring.to_vec())
    } else {
        if ring.len() < 3 {
            return None;
        }
        let mut normalized = ring.to_vec();
        normalized.push(ring[0]);
        Some(normalized)
    }
}

pub fn feature_bounds(feature: &Feature) -> Option<LngLatBounds> {
    let ring = closed_ring(feature.geometry.exterior()?)?;
    let mut vertices = ring.iter();
    let mut bounds = LngLatBounds::around(*vertices.next()?);
    for vertex in vertices {
        bounds.extend(*vertex);
    }
    Some(bounds)
}

/// Bounding box across every renderable feature. Malformed geometry is
/// excluded; zero usable features yields `None`, never an error.
pub fn collection_bounds(collection: &FeatureCollection) -> Option<LngLatBounds> {
    let mut merged: Option<LngLatBounds> = None;
    for feature in &collection.features {
        if let Some(bounds) = feature_bounds(feature) {
            match merged.as_mut() {
                Some(total) => {
                    total.extend([bounds.west, bounds.south]);
                    total.extend([bounds.east, bounds.north]);
                }
                None => merged = Some(bounds),
            }
        }
    }
    merged
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub center: [f64; 2],
    pub zoom: f64,
}

/// Web-Mercator viewport fit with fixed pixel padding and a zoom cap.
/// Degenerate bounds (a single point) fall back to the cap.
pub fn fit_bounds(
    bounds: &LngLatBounds,
    padding_px: f64,
    viewport_px: (f64, f64),
    max_zoom: f64,
) -> Viewport {
    let center = bounds.center();

    let span_x = mercator_x(bounds.east) - mercator_x(bounds.west);
    let span_y = mercator_y(bounds.south) - mercator_y(bounds.north);
    let usable_w = (viewport_px.0 - 2.0 * padding_px).max(1.0);
    let usable_h = (viewport_px.1 - 2.0 * padding_px).max(1.0);

    let zoom = if span_x <= 0.0 || span_y <= 0.0 {
        max_zoom
    } else {
        let zoom_x = (usable_w / (TILE_SIZE * span_x)).log2();
        let zoom_y = (usable_h / (TILE_SIZE * span_y)).log2();
        zoom_x.min(zoom_y).clamp(0.0, max_zoom)
    };

    Viewport { center, zoom }
}

fn mercator_x(lng: f64) -> f64 {
    lng / 360.0 + 0.5
}

fn mercator_y(lat: f64) -> f64 {
    // Clamp to the Mercator-safe range before projecting.
    let lat = lat.clamp(-85.051_128, 85.051_128);
    let phi = lat.to_radians();
    0.5 - (phi.tan() + 1.0 / phi.cos()).ln() / (2.0 * std::f64::consts::PI)
}
