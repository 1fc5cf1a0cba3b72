use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::errors::AppResult;
use crate::telemetry::TelemetryClient;

/// Alert precedence used by the monitoring backend, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Black,
    Red,
    Orange,
    Yellow,
    Green,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Black => "black",
            AlertLevel::Red => "red",
            AlertLevel::Orange => "orange",
            AlertLevel::Yellow => "yellow",
            AlertLevel::Green => "green",
        }
    }

    /// Numeric precedence, higher is more severe.
    pub fn precedence(&self) -> u8 {
        match self {
            AlertLevel::Black => 5,
            AlertLevel::Red => 4,
            AlertLevel::Orange => 3,
            AlertLevel::Yellow => 2,
            AlertLevel::Green => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisasterEvent {
    pub event_id: String,
    pub disaster_type: String,
    pub location: String,
    /// `[lng, lat]`, matching the geospatial payload convention.
    pub coordinates: [f64; 2],
    pub timestamp: DateTime<Utc>,
    pub alert_level: AlertLevel,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub magnitude: Option<f64>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertMessage {
    pub alert_id: String,
    pub event_id: String,
    pub disaster_type: String,
    pub location: String,
    pub alert_level: AlertLevel,
    pub priority: u32,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub acknowledged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    DisasterEvent,
    Alert,
    SystemStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedAction {
    New,
    Update,
}

/// One incremental message from the monitoring backend, either streamed or
/// synthesized from a REST poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedMessage {
    #[serde(rename = "type")]
    pub kind: FeedKind,
    pub action: FeedAction,
    pub data: Value,
}

const STREAM_CATEGORIES: &str = "disasters,alerts,system";

/// Connection URL for the stream endpoint. The backend requires a unique
/// client id; a fresh one per (re)connection keeps stale subscriptions from
/// accumulating server-side.
pub fn stream_connect_url(base: &str) -> String {
    let suffix: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}client_id=desk_{suffix}&categories={STREAM_CATEGORIES}")
}

/// Parse one streamed frame. Unknown message types (including the backend's
/// connection and subscription acknowledgements) and malformed frames are
/// skipped, never fatal to the stream loop.
pub fn parse_feed_message(text: &str) -> Option<FeedMessage> {
    match serde_json::from_str::<FeedMessage>(text) {
        Ok(message) => Some(message),
        Err(err) => {
            warn!(?err, "skipping unparseable feed frame");
            None
        }
    }
}

/// Uniform messages out of a REST poll so downstream consumers see one
/// stream shape regardless of transport.
pub fn synthesize_poll_messages(
    events: &[DisasterEvent],
    alerts: &[AlertMessage],
) -> Vec<FeedMessage> {
    let mut messages = Vec::with_capacity(events.len() + alerts.len());
    for event in events {
        messages.push(FeedMessage {
            kind: FeedKind::DisasterEvent,
            action: FeedAction::Update,
            data: serde_json::to_value(event).unwrap_or(Value::Null),
        });
    }
    for alert in alerts {
        messages.push(FeedMessage {
            kind: FeedKind::Alert,
            action: FeedAction::Update,
            data: serde_json::to_value(alert).unwrap_or(Value::Null),
        });
    }
    messages
}

#[derive(Clone)]
pub struct MonitorClient {
    http: Client,
    api_base: String,
}

impl MonitorClient {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("disaster-ai/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            api_base: config.monitor_api_base.trim_end_matches('/').to_string(),
        })
    }

    pub async fn active_events(&self) -> AppResult<Vec<DisasterEvent>> {
        let url = format!("{}/disasters/events", self.api_base);
        let response = self.http.get(&url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    pub async fn active_alerts(&self) -> AppResult<Vec<AlertMessage>> {
        let url = format!("{}/disasters/alerts", self.api_base);
        let response = self.http.get(&url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

/// Keeps the realtime feed alive: websocket while it lasts, fixed-backoff
/// reconnects on drop, and REST polling while the stream is unavailable.
pub struct FeedSupervisor {
    client: MonitorClient,
    stream_url: String,
    reconnect: Duration,
    poll: Duration,
    telemetry: TelemetryClient,
    shutdown: watch::Receiver<bool>,
}

impl FeedSupervisor {
    pub fn new(
        config: &AppConfig,
        client: MonitorClient,
        telemetry: TelemetryClient,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            client,
            stream_url: config.monitor_stream_url.clone(),
            reconnect: Duration::from_secs(config.stream_reconnect_secs),
            poll: Duration::from_secs(config.monitor_poll_secs),
            telemetry,
            shutdown,
        }
    }

    pub async fn run<F>(mut self, sink: F)
    where
        F: Fn(FeedMessage) + Send + Sync + 'static,
    {
        let mut last_poll: Option<Instant> = None;
        loop {
            if *self.shutdown.borrow() {
                return;
            }

            match connect_async(stream_connect_url(&self.stream_url).as_str()).await {
                Ok((mut stream, _)) => {
                    info!(url = %self.stream_url, "monitor stream connected");
                    loop {
                        tokio::select! {
                            changed = self.shutdown.changed() => {
                                if changed.is_err() || *self.shutdown.borrow() {
                                    return;
                                }
                            }
                            frame = stream.next() => match frame {
                                Some(Ok(Message::Text(text))) => {
                                    if let Some(message) = parse_feed_message(&text) {
                                        sink(message);
                                    }
                                }
                                Some(Ok(Message::Close(_))) | None => break,
                                Some(Ok(_)) => {}
                                Some(Err(err)) => {
                                    warn!(?err, "monitor stream error");
                                    break;
                                }
                            }
                        }
                    }
                    warn!("monitor stream dropped; reconnecting");
                    let _ = self
                        .telemetry
                        .record("feed_reconnect", json!({ "url": self.stream_url }));
                }
                Err(err) => {
                    warn!(?err, "monitor stream unavailable");
                    let poll_due = last_poll
                        .map(|at| at.elapsed() >= self.poll)
                        .unwrap_or(true);
                    if poll_due {
                        last_poll = Some(Instant::now());
                        self.poll_once(&sink).await;
                    }
                }
            }

            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        return;
                    }
                }
                _ = sleep(self.reconnect) => {}
            }
        }
    }

    async fn poll_once<F>(&self, sink: &F)
    where
        F: Fn(FeedMessage) + Send + Sync + 'static,
    {
        let events = match self.client.active_events().await {
            Ok(events) => events,
            Err(err) => {
                warn!(?err, "disaster event poll failed");
                Vec::new()
            }
        };
        let alerts = match self.client.active_alerts().await {
            Ok(alerts) => alerts,
            Err(err) => {
                warn!(?err, "alert poll failed");
                Vec::new()
            }
        };
        for message in synthesize_poll_messages(&events, &alerts) {
            sink(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use httptest::matchers::request;
    use httptest::responders::json_encoded;
    use httptest::{Expectation, Server};

    use super::*;

    fn sample_event() -> DisasterEvent {
        DisasterEvent {
            event_id: "evt_1f2e3d4c5b6a".into(),
            disaster_type: "flood".into(),
            location: "Chennai".into(),
            coordinates: [80.27, 13.08],
            timestamp: "2026-08-01T12:00:00Z".parse().unwrap(),
            alert_level: AlertLevel::Red,
            status: "active".into(),
            magnitude: None,
            description: "Coastal flooding".into(),
        }
    }

    fn sample_alert() -> AlertMessage {
        AlertMessage {
            alert_id: "alr_9a8b7c6d".into(),
            event_id: "evt_1f2e3d4c5b6a".into(),
            disaster_type: "flood".into(),
            location: "Chennai".into(),
            alert_level: AlertLevel::Orange,
            priority: 2,
            message: "Evacuation advisory for low-lying wards".into(),
            timestamp: "2026-08-01T12:05:00Z".parse().unwrap(),
            acknowledged: false,
        }
    }

    #[test]
    fn connect_urls_carry_client_id_and_categories() {
        let url = stream_connect_url("ws://127.0.0.1:8000/ws/updates");
        assert!(url.starts_with("ws://127.0.0.1:8000/ws/updates?client_id=desk_"));
        assert!(url.ends_with("&categories=disasters,alerts,system"));

        let nested = stream_connect_url("ws://host/ws?token=abc");
        assert!(nested.contains("?token=abc&client_id=desk_"));
    }

    #[test]
    fn alert_levels_order_by_precedence() {
        assert!(AlertLevel::Black.precedence() > AlertLevel::Red.precedence());
        assert!(AlertLevel::Yellow.precedence() > AlertLevel::Green.precedence());
        assert_eq!(
            serde_json::to_value(AlertLevel::Orange).unwrap(),
            serde_json::json!("orange")
        );
    }

    #[test]
    fn parses_stream_frames_and_skips_unknown_kinds() {
        let frame = r#"{
            "type": "disaster_event",
            "action": "new",
            "data": { "event_id": "evt_1" }
        }"#;
        let message = parse_feed_message(frame).unwrap();
        assert_eq!(message.kind, FeedKind::DisasterEvent);
        assert_eq!(message.action, FeedAction::New);
        assert_eq!(message.data["event_id"], "evt_1");

        assert!(parse_feed_message(r#"{ "type": "heartbeat", "action": "new", "data": {} }"#).is_none());
        assert!(parse_feed_message("not json").is_none());
    }

    #[test]
    fn poll_messages_mirror_the_stream_shape() {
        let messages = synthesize_poll_messages(&[sample_event()], &[sample_alert()]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].kind, FeedKind::DisasterEvent);
        assert_eq!(messages[0].action, FeedAction::Update);
        assert_eq!(messages[1].kind, FeedKind::Alert);
        assert_eq!(messages[1].data["alert_id"], "alr_9a8b7c6d");

        // Round-trips through the wire encoding used by the stream.
        let encoded = serde_json::to_string(&messages[0]).unwrap();
        assert_eq!(parse_feed_message(&encoded).unwrap(), messages[0]);
    }

    #[tokio::test]
    async fn fetches_events_and_alerts_from_rest() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::path("/api/disasters/events"))
                .respond_with(json_encoded(vec![sample_event()])),
        );
        server.expect(
            Expectation::matching(request::path("/api/disasters/alerts"))
                .respond_with(json_encoded(vec![sample_alert()])),
        );

        std::env::remove_var("MONITOR_API_BASE");
        let mut config = AppConfig::from_env();
        config.monitor_api_base = server.url("/api").to_string();
        let client = MonitorClient::new(&config).unwrap();

        let events = client.active_events().await.unwrap();
        assert_eq!(events, vec![sample_event()]);
        let alerts = client.active_alerts().await.unwrap();
        assert_eq!(alerts[0].alert_level, AlertLevel::Orange);
    }
}
