pub mod analyzer;
pub mod commands;
pub mod config;
pub mod errors;
pub mod geo;
pub mod gesture;
pub mod ingestion;
pub mod map;
pub mod model;
pub mod monitor;
pub mod settings;
pub mod telemetry;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tauri::Emitter;
use tauri::Manager;
use tokio::sync::watch;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::analyzer::{AnalysisClient, DocumentAnalyzer};
use crate::commands::AppHealth;
use crate::config::AppConfig;
use crate::errors::AppResult;
use crate::gesture::{GestureConfig, GestureDriver};
use crate::ingestion::IngestionGate;
use crate::map::MapViewState;
use crate::model::AnalysisResult;
use crate::monitor::{FeedSupervisor, MonitorClient};
use crate::settings::{settings_path, RuntimeSettings, UpdateRuntimeSettingsPayload, UserSettings};
use crate::telemetry::TelemetryClient;

pub struct AppState {
    pub(crate) config: AppConfig,
    pub(crate) telemetry: TelemetryClient,
    /// The single current-result cell. Replaced wholesale by ingestion or
    /// reset; every display surface reads from here.
    pub(crate) store: Mutex<Option<AnalysisResult>>,
    ingesting: AtomicBool,
    pub(crate) map: Mutex<MapViewState>,
    pub(crate) gate: IngestionGate,
    pub(crate) monitor: MonitorClient,
    pub(crate) gesture: Mutex<GestureDriver>,
    pub(crate) settings: Mutex<UserSettings>,
    settings_file: PathBuf,
    shutdown: watch::Sender<bool>,
}

impl AppState {
    fn initialize(app: &tauri::AppHandle) -> AppResult<Self> {
        init_tracing();
        let config = AppConfig::from_env();
        let data_dir = app.path().app_data_dir()?;
        std::fs::create_dir_all(&data_dir)?;

        let telemetry = TelemetryClient::new(&data_dir, &config)?;
        let settings_file = settings_path(&data_dir, &config);
        let settings = UserSettings::load(&settings_file, &config)?;
        telemetry.set_enabled(settings.telemetry_enabled);

        let analyzer = AnalysisClient::maybe_new(&config)?
            .map(|client| Arc::new(client) as Arc<dyn DocumentAnalyzer>);
        let gate = IngestionGate::new(analyzer, telemetry.clone());
        let monitor = MonitorClient::new(&config)?;
        let gesture = GestureDriver::new(GestureConfig::new(Duration::from_millis(
            settings.hold_duration_ms,
        )));
        let (shutdown, _) = watch::channel(false);

        if let Err(err) = telemetry.record(
            "app_start",
            json!({
                "version": env!("CARGO_PKG_VERSION"),
                "analyzerReady": gate.has_analyzer(),
                "telemetryEnabled": settings.telemetry_enabled,
            }),
        ) {
            warn!(?err, "failed to queue telemetry bootstrap event");
        }
        if let Err(err) = telemetry.flush() {
            warn!(?err, "failed to flush telemetry queue");
        }

        Ok(Self {
            config,
            telemetry,
            store: Mutex::new(None),
            ingesting: AtomicBool::new(false),
            map: Mutex::new(MapViewState::new()),
            gate,
            monitor,
            gesture: Mutex::new(gesture),
            settings: Mutex::new(settings),
            settings_file,
            shutdown,
        })
    }

    /// Forward the realtime feed to the webview for the dashboard panel.
    fn spawn_feed(&self, app: tauri::AppHandle) {
        let supervisor = FeedSupervisor::new(
            &self.config,
            self.monitor.clone(),
            self.telemetry.clone(),
            self.shutdown.subscribe(),
        );
        tauri::async_runtime::spawn(async move {
            supervisor
                .run(move |message| {
                    if let Err(err) = app.emit("monitor://message", &message) {
                        warn!(?err, "failed to forward feed message");
                    }
                })
                .await;
        });
    }

    pub fn current_result(&self) -> Option<AnalysisResult> {
        self.store.lock().clone()
    }

    /// Claim the ingestion slot. Returns `false` when another ingestion is
    /// already in flight.
    pub fn try_begin_ingestion(&self) -> bool {
        !self.ingesting.swap(true, Ordering::SeqCst)
    }

    pub fn finish_ingestion(&self) {
        self.ingesting.store(false, Ordering::SeqCst);
    }

    /// Replace the current result wholesale and rebuild the map overlays.
    pub fn install_result(&self, result: AnalysisResult) {
        self.map.lock().load(&result.geospatial_data);
        *self.store.lock() = Some(result);
    }

    pub fn reset(&self) {
        *self.store.lock() = None;
        self.map.lock().clear();
        self.finish_ingestion();
    }

    pub fn app_health(&self) -> AppHealth {
        AppHealth {
            telemetry_buffer_path: self.telemetry.buffer_path().to_string_lossy().to_string(),
            telemetry_queue_depth: self.telemetry.queue_depth(),
            analyzer_ready: self.gate.has_analyzer(),
            has_result: self.store.lock().is_some(),
            ingestion_in_flight: self.ingesting.load(Ordering::SeqCst),
            config: self.config.public_profile(),
        }
    }

    pub fn update_settings(
        &self,
        payload: &UpdateRuntimeSettingsPayload,
    ) -> AppResult<RuntimeSettings> {
        let mut settings = self.settings.lock();
        let previous_hold = settings.hold_duration_ms;
        settings.apply_patch(payload);
        settings.persist(&self.settings_file)?;
        self.telemetry.set_enabled(settings.telemetry_enabled);
        if settings.hold_duration_ms != previous_hold {
            // Rebuilding the driver aborts any in-flight sampler, so a new
            // hold duration never mixes with an old gesture.
            *self.gesture.lock() = GestureDriver::new(GestureConfig::new(
                Duration::from_millis(settings.hold_duration_ms),
            ));
        }
        Ok(settings.runtime_profile())
    }

    pub fn record_telemetry_event(
        &self,
        name: String,
        payload: Value,
        flush: bool,
    ) -> AppResult<()> {
        self.telemetry.record(name, payload)?;
        if flush {
            self.telemetry.flush()?;
        }
        Ok(())
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,disaster_ai_lib=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            let handle = app.handle();
            let state = AppState::initialize(handle)
                .map_err(|err| -> Box<dyn std::error::Error> { Box::new(err) })?;
            state.spawn_feed(handle.clone());
            app.manage(state);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::app_health,
            commands::analyze_document,
            commands::current_analysis,
            commands::reset_analysis,
            commands::map_snapshot,
            commands::set_map_surface,
            commands::hover_region,
            commands::leave_region,
            commands::select_region,
            commands::inspect_region,
            commands::close_inspector,
            commands::gesture_press,
            commands::gesture_release,
            commands::monitor_events,
            commands::monitor_alerts,
            commands::runtime_settings,
            commands::update_runtime_settings,
            commands::record_telemetry_event
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
