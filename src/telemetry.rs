use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::AppConfig;
use crate::errors::AppResult;

const BUFFER_FILE_NAME: &str = "diagnostics-buffer.jsonl";

/// Local, append-only diagnostics buffer. Analysis failures are collapsed to
/// fallback results at the ingestion boundary, so this file is the only place
/// those failures remain visible.
#[derive(Clone)]
pub struct TelemetryClient {
    enabled: Arc<AtomicBool>,
    queue: Arc<Mutex<Vec<TelemetryEvent>>>,
    buffer_path: PathBuf,
    batch_size: usize,
    max_file_bytes: u64,
    max_file_count: usize,
}

#[derive(Debug, Serialize)]
pub struct TelemetryEvent {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl TelemetryClient {
    pub fn new<P: AsRef<Path>>(data_dir: P, config: &AppConfig) -> AppResult<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;
        let buffer_path = data_dir.join(BUFFER_FILE_NAME);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&buffer_path)?;

        Ok(Self {
            enabled: Arc::new(AtomicBool::new(config.telemetry_enabled_by_default)),
            queue: Arc::new(Mutex::new(Vec::new())),
            buffer_path,
            batch_size: config.telemetry_batch_size,
            max_file_bytes: config.telemetry_buffer_max_bytes,
            max_file_count: config.telemetry_buffer_max_files,
        })
    }

    pub fn record(&self, name: impl Into<String>, payload: serde_json::Value) -> AppResult<()> {
        if !self.enabled.load(Ordering::Relaxed) {
            return Ok(());
        }

        let mut queue = self.queue.lock();
        queue.push(TelemetryEvent {
            name: name.into(),
            timestamp: Utc::now(),
            payload,
        });
        if queue.len() >= self.batch_size {
            self.persist_locked(&mut queue)?;
        }
        Ok(())
    }

    pub fn flush(&self) -> AppResult<()> {
        let mut queue = self.queue.lock();
        self.persist_locked(&mut queue)
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn buffer_path(&self) -> &Path {
        &self.buffer_path
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn persist_locked(&self, queue: &mut Vec<TelemetryEvent>) -> AppResult<()> {
        if queue.is_empty() {
            return Ok(());
        }

        let mut encoded = Vec::with_capacity(queue.len());
        let mut incoming_bytes = 0_u64;
        for event in queue.iter() {
            let line = serde_json::to_vec(event)?;
            incoming_bytes += (line.len() + 1) as u64;
            encoded.push(line);
        }

        self.rotate_if_needed(incoming_bytes)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.buffer_path)?;
        for line in &encoded {
            file.write_all(line)?;
            file.write_all(b"\n")?;
        }
        file.flush()?;

        queue.clear();
        Ok(())
    }

    fn rotate_if_needed(&self, incoming_bytes: u64) -> AppResult<()> {
        let current_size = fs::metadata(&self.buffer_path)
            .map(|m| m.len())
            .unwrap_or(0);
        if current_size + incoming_bytes <= self.max_file_bytes {
            return Ok(());
        }

        if self.max_file_count > 1 {
            let rotated_name = format!(
                "diagnostics-buffer-{}.jsonl",
                Utc::now().format("%Y%m%d%H%M%S")
            );
            let rotated_path = self
                .buffer_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(rotated_name);
            if self.buffer_path.exists() {
                fs::rename(&self.buffer_path, &rotated_path)?;
            }
            self.prune_rotations()?;
        }

        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.buffer_path)?;
        Ok(())
    }

    fn prune_rotations(&self) -> AppResult<()> {
        let parent = self.buffer_path.parent().unwrap_or_else(|| Path::new("."));
        let mut rotations = fs::read_dir(parent)?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.starts_with("diagnostics-buffer-") && name.ends_with(".jsonl") {
                    Some((entry.path(), entry.metadata().ok()?.modified().ok()?))
                } else {
                    None
                }
            })
            .collect::<Vec<_>>();

        rotations.sort_by_key(|(_, modified)| *modified);
        let allowed = self.max_file_count.saturating_sub(1);
        if rotations.len() > allowed {
            let excess = rotations.len() - allowed;
            for (path, _) in rotations.into_iter().take(excess) {
                let _ = fs::remove_file(path);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    fn test_config() -> AppConfig {
        std::env::remove_var("TELEMETRY_ENABLED");
        let mut config = AppConfig::from_env();
        config.telemetry_enabled_by_default = true;
        config.telemetry_batch_size = 1;
        config.telemetry_buffer_max_bytes = 1024;
        config.telemetry_buffer_max_files = 3;
        config
    }

    #[test]
    fn writes_events_to_disk() {
        let dir = tempdir().unwrap();
        let client = TelemetryClient::new(dir.path(), &test_config()).unwrap();
        client
            .record("analysis_fallback", json!({ "reason": "upstream 500" }))
            .unwrap();
        client.flush().unwrap();

        let buffer = fs::read_to_string(client.buffer_path()).unwrap();
        assert!(buffer.contains("analysis_fallback"));
        assert!(buffer.contains("upstream 500"));
    }

    #[test]
    fn disabled_client_drops_events() {
        let dir = tempdir().unwrap();
        let client = TelemetryClient::new(dir.path(), &test_config()).unwrap();
        client.set_enabled(false);
        client.record("ignored", json!({})).unwrap();
        client.flush().unwrap();

        assert_eq!(client.queue_depth(), 0);
        let buffer = fs::read_to_string(client.buffer_path()).unwrap();
        assert!(buffer.is_empty());
    }

    #[test]
    fn rotates_when_exceeding_capacity() {
        let dir = tempdir().unwrap();
        let mut config = test_config();
        config.telemetry_buffer_max_bytes = 64;
        let client = TelemetryClient::new(dir.path(), &config).unwrap();
        for i in 0..4 {
            client
                .record(
                    "big",
                    json!({ "payload": "0123456789abcdef0123456789abcdef", "idx": i }),
                )
                .unwrap();
            client.flush().unwrap();
        }

        let rotated = fs::read_dir(dir.path())
            .unwrap()
            .filter(|entry| {
                entry
                    .as_ref()
                    .map(|e| {
                        e.file_name()
                            .to_string_lossy()
                            .starts_with("diagnostics-buffer-")
                    })
                    .unwrap_or(false)
            })
            .count();
        assert!(rotated >= 1);
    }
}
