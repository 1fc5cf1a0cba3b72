use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::interval;

const PROGRESS_SAMPLE_INTERVAL: Duration = Duration::from_millis(30);
const DEFAULT_SETTLE: Duration = Duration::from_millis(1_000);
const DEFAULT_LINGER: Duration = Duration::from_millis(3_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GesturePhase {
    Idle,
    Holding,
    Publishing,
    Published,
}

/// Emitted by the state machine on timed transitions. `Fire` is produced at
/// most once per completed hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureEvent {
    Fire,
    Settled,
    Rearmed,
}

#[derive(Debug, Clone)]
pub struct GestureLabels {
    pub idle: String,
    pub publishing: String,
    pub published: String,
}

impl Default for GestureLabels {
    fn default() -> Self {
        Self {
            idle: "Hold to publish".into(),
            publishing: "Publishing".into(),
            published: "Published".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GestureConfig {
    pub hold: Duration,
    pub settle: Duration,
    pub linger: Duration,
    pub labels: GestureLabels,
}

impl GestureConfig {
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            settle: DEFAULT_SETTLE,
            linger: DEFAULT_LINGER,
            labels: GestureLabels::default(),
        }
    }
}

/// Press-and-hold confirmation state machine. All timed transitions are
/// driven by elapsed-time queries against the caller-supplied clock, so the
/// machine is deterministic and testable without timers.
#[derive(Debug)]
pub struct HoldGesture {
    config: GestureConfig,
    phase: GesturePhase,
    pressed_at: Option<Instant>,
    fired_at: Option<Instant>,
    settled_at: Option<Instant>,
}

impl HoldGesture {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            phase: GesturePhase::Idle,
            pressed_at: None,
            fired_at: None,
            settled_at: None,
        }
    }

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    pub fn label(&self) -> &str {
        match self.phase {
            GesturePhase::Idle | GesturePhase::Holding => &self.config.labels.idle,
            GesturePhase::Publishing => &self.config.labels.publishing,
            GesturePhase::Published => &self.config.labels.published,
        }
    }

    /// Begin holding. A press anywhere but `Idle` is a no-op; that is the
    /// double-fire guard.
    pub fn press(&mut self, now: Instant) -> bool {
        if self.phase != GesturePhase::Idle {
            return false;
        }
        self.phase = GesturePhase::Holding;
        self.pressed_at = Some(now);
        true
    }

    /// End the press. Releasing before the hold duration elapses cancels the
    /// gesture entirely; releasing after it is a no-op because the hold has
    /// already committed. Returns `true` when the gesture was cancelled.
    pub fn release(&mut self, now: Instant) -> bool {
        // A release racing the deadline must not swallow a completed hold.
        self.tick(now);
        if self.phase == GesturePhase::Holding {
            self.phase = GesturePhase::Idle;
            self.pressed_at = None;
            true
        } else {
            false
        }
    }

    /// Advance timed transitions. At most one event per call.
    pub fn tick(&mut self, now: Instant) -> Option<GestureEvent> {
        match self.phase {
            GesturePhase::Holding => {
                let pressed_at = self.pressed_at?;
                if now.duration_since(pressed_at) >= self.config.hold {
                    self.phase = GesturePhase::Publishing;
                    self.fired_at = Some(pressed_at + self.config.hold);
                    return Some(GestureEvent::Fire);
                }
                None
            }
            GesturePhase::Publishing => {
                let fired_at = self.fired_at?;
                if now.duration_since(fired_at) >= self.config.settle {
                    self.phase = GesturePhase::Published;
                    self.settled_at = Some(fired_at + self.config.settle);
                    return Some(GestureEvent::Settled);
                }
                None
            }
            GesturePhase::Published => {
                let settled_at = self.settled_at?;
                if now.duration_since(settled_at) >= self.config.linger {
                    self.phase = GesturePhase::Idle;
                    self.pressed_at = None;
                    self.fired_at = None;
                    self.settled_at = None;
                    return Some(GestureEvent::Rearmed);
                }
                None
            }
            GesturePhase::Idle => None,
        }
    }

    /// Visual progress in `[0, 1]`. Purely informational; the transition to
    /// `Publishing` is driven by `tick`, not by progress reaching 1.0.
    pub fn progress(&self, now: Instant) -> f64 {
        match self.phase {
            GesturePhase::Idle => 0.0,
            GesturePhase::Holding => self
                .pressed_at
                .map(|pressed_at| {
                    let elapsed = now.duration_since(pressed_at).as_secs_f64();
                    (elapsed / self.config.hold.as_secs_f64()).min(1.0)
                })
                .unwrap_or(0.0),
            GesturePhase::Publishing | GesturePhase::Published => 1.0,
        }
    }
}

/// Progress sample delivered to the rendering surface on every tick of the
/// sampler task.
#[derive(Debug, Clone, Serialize)]
pub struct GestureReport {
    pub phase: GesturePhase,
    pub progress: f64,
    pub label: String,
    /// Set on the sample where the settle delay completes; the surface maps
    /// it to a haptic pulse where the platform supports one.
    pub pulse: bool,
}

/// Owns the gesture state machine plus the sampling task that animates it.
/// Every exit path (early release, natural completion, teardown) stops the
/// sampler so no callback can fire into a torn-down view.
pub struct GestureDriver {
    gesture: Arc<Mutex<HoldGesture>>,
    sampler: Mutex<Option<JoinHandle<()>>>,
}

impl GestureDriver {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            gesture: Arc::new(Mutex::new(HoldGesture::new(config))),
            sampler: Mutex::new(None),
        }
    }

    pub fn phase(&self) -> GesturePhase {
        self.gesture.lock().phase()
    }

    /// Start a hold. `action` runs exactly once if the hold completes;
    /// `report` receives progress samples until the gesture re-arms.
    pub fn press<A, R>(&self, action: A, report: R) -> bool
    where
        A: FnOnce() + Send + 'static,
        R: Fn(GestureReport) + Send + 'static,
    {
        let now = Instant::now();
        if !self.gesture.lock().press(now) {
            return false;
        }

        let gesture = Arc::clone(&self.gesture);
        let mut action = Some(action);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(PROGRESS_SAMPLE_INTERVAL);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let (event, sample) = {
                    let mut machine = gesture.lock();
                    let event = machine.tick(now);
                    if machine.phase() == GesturePhase::Idle && event.is_none() {
                        // Cancelled by an early release.
                        return;
                    }
                    let sample = GestureReport {
                        phase: machine.phase(),
                        progress: machine.progress(now),
                        label: machine.label().to_string(),
                        pulse: event == Some(GestureEvent::Settled),
                    };
                    (event, sample)
                };
                report(sample);
                match event {
                    Some(GestureEvent::Fire) => {
                        if let Some(action) = action.take() {
                            action();
                        }
                    }
                    Some(GestureEvent::Rearmed) => return,
                    _ => {}
                }
            }
        });

        if let Some(stale) = self.sampler.lock().replace(handle) {
            stale.abort();
        }
        true
    }

    /// End the press. Returns `true` when this release cancelled the hold.
    pub fn release(&self) -> bool {
        let cancelled = self.gesture.lock().release(Instant::now());
        if cancelled {
            if let Some(handle) = self.sampler.lock().take() {
                handle.abort();
            }
        }
        cancelled
    }
}

impl Drop for GestureDriver {
    fn drop(&mut self) {
        if let Some(handle) = self.sampler.lock().take() {
            handle.abort();
        }
    }
}
