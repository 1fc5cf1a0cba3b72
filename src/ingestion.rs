use std::sync::Arc;
use std::time::Instant;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;
use tracing::{info, warn};

use crate::analyzer::{AnalysisMode, AnalysisRequest, DocumentAnalyzer};
use crate::model::{self, AnalysisResult};
use crate::telemetry::TelemetryClient;

/// Receives lifecycle notifications around one ingestion. The command layer
/// adapts this to webview events; tests record the calls directly.
pub trait IngestionObserver: Send + Sync {
    fn processing_started(&self, task_id: &str);
    fn processing_complete(&self, result: &AnalysisResult);
}

/// The single entry point for new analyses. Infallible to the caller: every
/// failure path (no analyzer configured, transport, parse) collapses into
/// the fixed fallback result, and the UI always reaches a displayable state.
pub struct IngestionGate {
    analyzer: Option<Arc<dyn DocumentAnalyzer>>,
    telemetry: TelemetryClient,
}

impl IngestionGate {
    pub fn new(analyzer: Option<Arc<dyn DocumentAnalyzer>>, telemetry: TelemetryClient) -> Self {
        Self { analyzer, telemetry }
    }

    pub fn has_analyzer(&self) -> bool {
        self.analyzer.is_some()
    }

    pub async fn begin_ingestion(
        &self,
        observer: &dyn IngestionObserver,
        file_name: &str,
        bytes: &[u8],
        mime_type: &str,
        mode: AnalysisMode,
    ) -> AnalysisResult {
        let task_id = model::generate_task_id();
        let document_id = model::document_id_for(file_name);

        // Observers learn about the ingestion before any I/O happens.
        observer.processing_started(&task_id);
        let _ = self.telemetry.record(
            "analysis_started",
            json!({
                "taskId": task_id,
                "mimeType": mime_type,
                "sizeBytes": bytes.len(),
                "mode": mode.as_str(),
            }),
        );

        let started = Instant::now();
        let result = match &self.analyzer {
            Some(analyzer) => {
                let request = AnalysisRequest {
                    document_data: STANDARD.encode(bytes),
                    mime_type: mime_type.to_string(),
                    mode,
                };
                match analyzer.analyze(&request).await {
                    Ok(raw) => AnalysisResult::from_raw(
                        &raw,
                        task_id.clone(),
                        document_id.clone(),
                        Some(started.elapsed().as_millis() as u64),
                        Some(analyzer.model_name().to_string()),
                    ),
                    Err(err) => {
                        warn!(%task_id, ?err, "analysis failed; substituting fallback result");
                        self.record_fallback(&task_id, &err.to_string());
                        model::fallback_result(task_id.clone(), document_id.clone())
                    }
                }
            }
            None => {
                warn!(%task_id, "no analysis key configured; substituting fallback result");
                self.record_fallback(&task_id, "analyzer unavailable");
                model::fallback_result(task_id.clone(), document_id.clone())
            }
        };

        info!(
            %task_id,
            risk_score = result.risk_score,
            feature_count = result.geospatial_data.features.len(),
            "ingestion complete"
        );
        let _ = self.telemetry.record(
            "analysis_complete",
            json!({
                "taskId": task_id,
                "riskScore": result.risk_score,
                "featureCount": result.geospatial_data.features.len(),
                "modelUsed": result.model_used,
            }),
        );
        let _ = self.telemetry.flush();

        observer.processing_complete(&result);
        result
    }

    fn record_fallback(&self, task_id: &str, reason: &str) {
        let _ = self.telemetry.record(
            "analysis_fallback",
            json!({ "taskId": task_id, "reason": reason }),
        );
    }
}
