use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use serde_json::{json, Value};
use tauri::Emitter;
use tracing::warn;

use crate::config::PublicAppConfig;
use crate::geo::RegionStyle;
use crate::ingestion::IngestionObserver;
use crate::map::{CameraMove, InspectorView, MapSnapshot};
use crate::model::AnalysisResult;
use crate::monitor::{AlertMessage, DisasterEvent};
use crate::settings::{RuntimeSettings, UpdateRuntimeSettingsPayload};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct AppHealth {
    pub telemetry_buffer_path: String,
    pub telemetry_queue_depth: usize,
    pub analyzer_ready: bool,
    pub has_result: bool,
    pub ingestion_in_flight: bool,
    pub config: PublicAppConfig,
}

/// Forwards ingestion lifecycle notifications to the webview.
pub struct EventObserver {
    app: tauri::AppHandle,
}

impl EventObserver {
    pub fn new(app: tauri::AppHandle) -> Self {
        Self { app }
    }
}

impl IngestionObserver for EventObserver {
    fn processing_started(&self, task_id: &str) {
        if let Err(err) = self
            .app
            .emit("analysis://started", json!({ "taskId": task_id }))
        {
            warn!(?err, "failed to emit analysis started event");
        }
    }

    fn processing_complete(&self, result: &AnalysisResult) {
        if let Err(err) = self.app.emit("analysis://complete", result) {
            warn!(?err, "failed to emit analysis complete event");
        }
    }
}

#[tauri::command]
pub async fn app_health(state: tauri::State<'_, AppState>) -> Result<AppHealth, String> {
    Ok(state.app_health())
}

/// Run one document through the ingestion gate. Structurally single-flight:
/// a second call while a result exists returns that result untouched, and a
/// call racing an in-flight ingestion is rejected.
#[tauri::command]
pub async fn analyze_document(
    app: tauri::AppHandle,
    state: tauri::State<'_, AppState>,
    file_name: String,
    mime_type: String,
    document: String,
) -> Result<AnalysisResult, String> {
    if let Some(existing) = state.current_result() {
        return Ok(existing);
    }
    if !state.try_begin_ingestion() {
        return Err("an analysis is already in progress".into());
    }

    let bytes = STANDARD.decode(document.as_bytes()).unwrap_or_else(|err| {
        warn!(?err, "document payload is not valid base64; analyzing empty body");
        Vec::new()
    });
    let mode = state.settings.lock().analysis_mode;
    let observer = EventObserver::new(app);

    let result = state
        .gate
        .begin_ingestion(&observer, &file_name, &bytes, &mime_type, mode)
        .await;
    state.install_result(result.clone());
    state.finish_ingestion();
    Ok(result)
}

#[tauri::command]
pub async fn current_analysis(
    state: tauri::State<'_, AppState>,
) -> Result<Option<AnalysisResult>, String> {
    Ok(state.current_result())
}

#[tauri::command]
pub async fn reset_analysis(state: tauri::State<'_, AppState>) -> Result<(), String> {
    state.reset();
    Ok(())
}

#[tauri::command]
pub fn map_snapshot(state: tauri::State<'_, AppState>) -> MapSnapshot {
    state.map.lock().snapshot()
}

#[tauri::command]
pub fn set_map_surface(state: tauri::State<'_, AppState>, width: f64, height: f64) {
    state.map.lock().set_surface_size(width, height);
}

#[tauri::command]
pub fn hover_region(state: tauri::State<'_, AppState>, id: usize) -> Option<RegionStyle> {
    let mut map = state.map.lock();
    if map.pointer_enter(id) {
        map.region_style(id)
    } else {
        None
    }
}

#[tauri::command]
pub fn leave_region(state: tauri::State<'_, AppState>, id: usize) -> Option<RegionStyle> {
    let mut map = state.map.lock();
    map.pointer_leave(id);
    map.region_style(id)
}

#[tauri::command]
pub fn select_region(state: tauri::State<'_, AppState>, id: usize) -> Option<CameraMove> {
    state.map.lock().select(id)
}

/// "Investigate" inside the tooltip. Separate from `select_region` so the
/// surface can stop the click before the region handler fires.
#[tauri::command]
pub fn inspect_region(state: tauri::State<'_, AppState>, id: usize) -> Option<InspectorView> {
    let mut map = state.map.lock();
    if map.open_inspector(id) {
        map.inspector_view()
    } else {
        None
    }
}

#[tauri::command]
pub fn close_inspector(state: tauri::State<'_, AppState>) {
    state.map.lock().close_inspector();
}

#[tauri::command]
pub async fn gesture_press(
    app: tauri::AppHandle,
    state: tauri::State<'_, AppState>,
) -> Result<bool, String> {
    let telemetry = state.telemetry.clone();
    let confirm_app = app.clone();
    let accepted = state.gesture.lock().press(
        move || {
            let _ = telemetry.record("gesture_publish", json!({}));
            let _ = telemetry.flush();
            if let Err(err) = confirm_app.emit("gesture://confirmed", ()) {
                warn!(?err, "failed to emit gesture confirmation");
            }
        },
        move |report| {
            if let Err(err) = app.emit("gesture://progress", &report) {
                warn!(?err, "failed to emit gesture progress");
            }
        },
    );
    Ok(accepted)
}

#[tauri::command]
pub async fn gesture_release(state: tauri::State<'_, AppState>) -> Result<bool, String> {
    Ok(state.gesture.lock().release())
}

#[tauri::command]
pub async fn monitor_events(
    state: tauri::State<'_, AppState>,
) -> Result<Vec<DisasterEvent>, String> {
    state
        .monitor
        .active_events()
        .await
        .map_err(|err| err.to_string())
}

#[tauri::command]
pub async fn monitor_alerts(
    state: tauri::State<'_, AppState>,
) -> Result<Vec<AlertMessage>, String> {
    state
        .monitor
        .active_alerts()
        .await
        .map_err(|err| err.to_string())
}

#[tauri::command]
pub fn runtime_settings(state: tauri::State<'_, AppState>) -> RuntimeSettings {
    state.settings.lock().runtime_profile()
}

#[tauri::command]
pub fn update_runtime_settings(
    state: tauri::State<'_, AppState>,
    payload: UpdateRuntimeSettingsPayload,
) -> Result<RuntimeSettings, String> {
    state
        .update_settings(&payload)
        .map_err(|err| err.to_string())
}

#[tauri::command]
pub fn record_telemetry_event(
    state: tauri::State<'_, AppState>,
    name: String,
    payload: Value,
    flush: bool,
) -> Result<(), String> {
    state
        .record_telemetry_event(name, payload, flush)
        .map_err(|err| err.to_string())
}
