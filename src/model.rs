use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const HIGH_RISK_THRESHOLD: u8 = 75;

const DEFAULT_RISK_SCORE: u8 = 50;
const DEFAULT_SUMMARY: &str = "Analysis complete. Review the extracted data.";
const DEFAULT_FEATURE_NAME: &str = "Unknown Location";
const DEFAULT_ENTITY_LABEL: &str = "LOC";

/// Severity classification carried by every mapped region. Drives map color
/// and narrative framing downstream; absence is legal and means "unstyled".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "High" => Some(Severity::High),
            "Medium" => Some(Severity::Medium),
            "Low" => Some(Severity::Low),
            _ => None,
        }
    }
}

/// A named entity extracted from the document. Labels are an open set
/// (ORG, LOC, TECH, DMG, URG, ...), so they stay plain strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonGeometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<Vec<[f64; 2]>>,
}

impl PolygonGeometry {
    pub fn new(rings: Vec<Vec<[f64; 2]>>) -> Self {
        Self {
            kind: "Polygon".to_string(),
            coordinates: rings,
        }
    }

    /// The exterior ring, when present. Positions are `[lng, lat]`.
    pub fn exterior(&self) -> Option<&[[f64; 2]]> {
        self.coordinates.first().map(|ring| ring.as_slice())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureProperties {
    pub name: String,
    #[serde(default)]
    pub severity: Option<Severity>,
    pub confidence: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: PolygonGeometry,
    pub properties: FeatureProperties,
}

impl Feature {
    pub fn new(geometry: PolygonGeometry, properties: FeatureProperties) -> Self {
        Self {
            kind: "Feature".to_string(),
            geometry,
            properties,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            kind: "FeatureCollection".to_string(),
            features,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// The unit of state driving the whole UI after ingestion. Immutable once
/// constructed; a new analysis replaces the previous result wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(rename = "taskId")]
    pub task_id: String,
    #[serde(rename = "documentId")]
    pub document_id: String,
    pub summary: String,
    #[serde(rename = "riskScore")]
    pub risk_score: u8,
    pub entities: Vec<Entity>,
    pub indicators: Vec<String>,
    #[serde(rename = "geospatialData")]
    pub geospatial_data: FeatureCollection,
    pub timestamp: DateTime<Utc>,
    pub processing_time_ms: Option<u64>,
    pub model_used: Option<String>,
}

impl AnalysisResult {
    /// Normalize a raw upstream payload into a displayable result. Every
    /// field is defaulted independently; this never fails. A payload that
    /// yields zero usable features gets the fixed fallback collection
    /// substituted wholesale.
    pub fn from_raw(
        raw: &Value,
        task_id: String,
        document_id: String,
        processing_time_ms: Option<u64>,
        model_used: Option<String>,
    ) -> Self {
        let summary = raw
            .get("summary")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SUMMARY)
            .to_string();

        let risk_score = normalize_risk_score(raw.get("riskScore"));

        let entities = raw
            .get("entities")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(normalize_entity).collect())
            .unwrap_or_default();

        let indicators = raw
            .get("indicators")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let features: Vec<Feature> = raw
            .get("geospatialData")
            .and_then(|geo| geo.get("features"))
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(normalize_feature).collect())
            .unwrap_or_default();

        let geospatial_data = if features.is_empty() {
            fallback_feature_collection()
        } else {
            FeatureCollection::new(features)
        };

        Self {
            task_id,
            document_id,
            summary,
            risk_score,
            entities,
            indicators,
            geospatial_data,
            timestamp: Utc::now(),
            processing_time_ms,
            model_used,
        }
    }

    pub fn is_high_risk(&self) -> bool {
        self.risk_score >= HIGH_RISK_THRESHOLD
    }
}

fn normalize_risk_score(value: Option<&Value>) -> u8 {
    let score = match value {
        Some(v) => match (v.as_i64(), v.as_f64()) {
            (Some(n), _) => n,
            (None, Some(f)) if f.is_finite() => f as i64,
            _ => i64::from(DEFAULT_RISK_SCORE),
        },
        None => i64::from(DEFAULT_RISK_SCORE),
    };
    score.clamp(0, 100) as u8
}

fn normalize_entity(value: &Value) -> Option<Entity> {
    let obj = value.as_object()?;
    let text = obj
        .get("text")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("Unknown")
        .to_string();
    let label = obj
        .get("label")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_ENTITY_LABEL.to_string());
    Some(Entity { text, label })
}

fn normalize_feature(value: &Value) -> Option<Feature> {
    let geometry = value.get("geometry")?;
    let kind = geometry
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("Polygon");
    if kind != "Polygon" {
        return None;
    }
    let coordinates: Vec<Vec<[f64; 2]>> =
        serde_json::from_value(geometry.get("coordinates").cloned().unwrap_or(Value::Null))
            .unwrap_or_default();

    let props = value.get("properties");
    let string_prop = |key: &str, default: &str| -> String {
        props
            .and_then(|p| p.get(key))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(default)
            .to_string()
    };

    let severity = props
        .and_then(|p| p.get("severity"))
        .and_then(Value::as_str)
        .and_then(Severity::parse);

    Some(Feature::new(
        PolygonGeometry::new(coordinates),
        FeatureProperties {
            name: string_prop("name", DEFAULT_FEATURE_NAME),
            severity,
            confidence: string_prop("confidence", "0%"),
            description: string_prop("description", ""),
        },
    ))
}

pub fn generate_task_id() -> String {
    format!("task_{}", Utc::now().timestamp_millis())
}

pub fn document_id_for(file_name: &str) -> String {
    let sanitized: String = file_name
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    format!("doc_{sanitized}")
}

/// The fixed demo result substituted on any ingestion failure. Field values
/// mirror the service's canned audit so visual verification stays possible
/// without a live upstream.
pub fn fallback_result(task_id: String, document_id: String) -> AnalysisResult {
    AnalysisResult {
        task_id,
        document_id,
        summary: "Integrated audit complete. High-risk zones identified in coastal \
                  infrastructure, with cascading moderate alerts in logistics hubs and \
                  low-level monitoring active for secondary residential clusters."
            .to_string(),
        risk_score: 78,
        entities: vec![
            Entity {
                text: "Chennai Terminal".into(),
                label: "LOC".into(),
            },
            Entity {
                text: "Bangalore Logistics".into(),
                label: "LOC".into(),
            },
            Entity {
                text: "Hyderabad Node".into(),
                label: "LOC".into(),
            },
            Entity {
                text: "LogiCorp".into(),
                label: "ORG".into(),
            },
        ],
        indicators: vec![
            "Chennai: CRITICAL STRUCTURAL FAILURE".into(),
            "Bangalore: THERMAL DEVIATION DETECTED".into(),
            "Hyderabad: OPERATIONAL - MONITORING ACTIVE".into(),
        ],
        geospatial_data: fallback_feature_collection(),
        timestamp: Utc::now(),
        processing_time_ms: Some(0),
        model_used: Some("fallback".into()),
    }
}

pub fn fallback_feature_collection() -> FeatureCollection {
    FeatureCollection::new(vec![
        Feature::new(
            PolygonGeometry::new(vec![vec![
                [80.28, 13.10],
                [80.30, 13.11],
                [80.31, 13.09],
                [80.29, 13.08],
                [80.28, 13.10],
            ]]),
            FeatureProperties {
                name: "Chennai High-Risk Terminal".into(),
                severity: Some(Severity::High),
                confidence: "99.8%".into(),
                description: "Primary sector with documented structural collapse.".into(),
            },
        ),
        Feature::new(
            PolygonGeometry::new(vec![vec![
                [77.58, 12.96],
                [77.60, 12.98],
                [77.62, 12.97],
                [77.61, 12.95],
                [77.58, 12.96],
            ]]),
            FeatureProperties {
                name: "Bangalore Logistics Hub".into(),
                severity: Some(Severity::Medium),
                confidence: "92.4%".into(),
                description: "Secondary anomaly detected in storage temperature regulation."
                    .into(),
            },
        ),
        Feature::new(
            PolygonGeometry::new(vec![vec![
                [78.47, 17.38],
                [78.49, 17.40],
                [78.51, 17.39],
                [78.50, 17.37],
                [78.47, 17.38],
            ]]),
            FeatureProperties {
                name: "Hyderabad Secondary Node".into(),
                severity: Some(Severity::Low),
                confidence: "95.0%".into(),
                description: "Standard operational status. No immediate risk detected.".into(),
            },
        ),
    ])
}
