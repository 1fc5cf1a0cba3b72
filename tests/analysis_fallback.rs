use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use httptest::matchers::{all_of, request};
use httptest::responders::{json_encoded, status_code};
use httptest::{Expectation, Server};
use parking_lot::Mutex;
use serde_json::json;
use tempfile::tempdir;

use disaster_ai_lib::analyzer::{AnalysisClient, AnalysisMode, DocumentAnalyzer};
use disaster_ai_lib::config::AppConfig;
use disaster_ai_lib::geo;
use disaster_ai_lib::ingestion::{IngestionGate, IngestionObserver};
use disaster_ai_lib::map::MapViewState;
use disaster_ai_lib::model::{AnalysisResult, Severity};
use disaster_ai_lib::telemetry::TelemetryClient;

#[derive(Default)]
struct RecordingObserver {
    started: AtomicUsize,
    completed: AtomicUsize,
    last_result: Mutex<Option<AnalysisResult>>,
}

impl IngestionObserver for RecordingObserver {
    fn processing_started(&self, _task_id: &str) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn processing_complete(&self, result: &AnalysisResult) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        *self.last_result.lock() = Some(result.clone());
    }
}

fn gate_against(server: &Server) -> (IngestionGate, tempfile::TempDir) {
    std::env::remove_var("TELEMETRY_ENABLED");
    let mut config = AppConfig::from_env();
    config.analysis_api_key = Some("test-key".to_string().into());
    config.analysis_endpoint = server.url("/v1/models").to_string();
    config.analysis_model = "geo-model".into();
    config.analysis_cache_enabled = false;

    let dir = tempdir().unwrap();
    let telemetry = TelemetryClient::new(dir.path(), &config).unwrap();
    let analyzer = AnalysisClient::maybe_new(&config)
        .expect("client creation")
        .expect("api key configured");
    let gate = IngestionGate::new(
        Some(Arc::new(analyzer) as Arc<dyn DocumentAnalyzer>),
        telemetry,
    );
    (gate, dir)
}

#[tokio::test]
async fn failing_service_degrades_to_displayable_fallback() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of!(
            request::method("POST"),
            request::path("/v1/models/geo-model:analyze")
        ))
        .respond_with(status_code(400)),
    );

    let (gate, _dir) = gate_against(&server);
    let observer = RecordingObserver::default();

    let result = gate
        .begin_ingestion(
            &observer,
            "incident-report.pdf",
            b"%PDF-1.7 sample content",
            "application/pdf",
            AnalysisMode::Comprehensive,
        )
        .await;

    // The user-visible outcome is indistinguishable from success.
    assert_eq!(observer.started.load(Ordering::SeqCst), 1);
    assert_eq!(observer.completed.load(Ordering::SeqCst), 1);
    assert_eq!(result.risk_score, 78);
    assert!(result.is_high_risk());
    assert!(result.summary.contains("Integrated audit complete"));

    let features = &result.geospatial_data.features;
    assert_eq!(features.len(), 3);
    let chennai = features
        .iter()
        .find(|f| f.properties.name == "Chennai High-Risk Terminal")
        .expect("fallback region present");
    assert_eq!(chennai.properties.severity, Some(Severity::High));

    // The fallback renders end to end: styled overlays plus a fitted view.
    let mut map = MapViewState::new();
    map.load(&result.geospatial_data);
    let snapshot = map.snapshot();
    assert_eq!(snapshot.regions.len(), 3);
    assert_eq!(snapshot.regions[0].style.color, "#ef4444");
    assert!(snapshot.viewport.is_some());
}

#[tokio::test]
async fn unclosed_rings_from_upstream_never_break_the_fit() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of!(
            request::method("POST"),
            request::path("/v1/models/geo-model:analyze")
        ))
        .respond_with(json_encoded(json!({
            "summary": "Single open-ring zone detected.",
            "riskScore": 64,
            "geospatialData": {
                "type": "FeatureCollection",
                "features": [{
                    "type": "Feature",
                    "geometry": {
                        "type": "Polygon",
                        // First vertex != last vertex.
                        "coordinates": [[[80.0, 13.0], [80.2, 13.1], [80.3, 12.9]]]
                    },
                    "properties": { "name": "Open Ring Zone", "severity": "Medium" }
                }]
            }
        }))),
    );

    let (gate, _dir) = gate_against(&server);
    let observer = RecordingObserver::default();

    let result = gate
        .begin_ingestion(
            &observer,
            "zones.png",
            b"png-bytes",
            "image/png",
            AnalysisMode::Quick,
        )
        .await;

    assert_eq!(result.risk_score, 64);
    assert_eq!(result.geospatial_data.features.len(), 1);

    let bounds = geo::collection_bounds(&result.geospatial_data)
        .expect("open ring is normalized, not excluded");
    assert!(bounds.west >= 79.9 && bounds.east <= 80.4);

    let mut map = MapViewState::new();
    map.load(&result.geospatial_data);
    let region = &map.snapshot().regions[0];
    assert_eq!(region.ring.first(), region.ring.last());
    assert_eq!(region.style.color, "#f97316");
}
