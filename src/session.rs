use serde::Serialize;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Wall-clock bookkeeping for one listening session.
///
/// Time only accumulates while playback is running, so a paused session
/// reports what was actually heard.
#[derive(Debug, Clone, Default)]
pub struct SessionClock {
    started_at: Option<SystemTime>,
    ended_at: Option<SystemTime>,
    running_since: Option<Instant>,
    accumulated: Duration,
}

/// What the session sink receives. Timestamps are Unix milliseconds; user
/// and preset identifiers are attached by whoever persists the record.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub started_at: Option<u64>,
    pub ended_at: Option<u64>,
    pub duration_seconds: f64,
}

impl SessionClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn start(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(SystemTime::now());
        }
        self.ended_at = None;
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    pub fn pause(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
        }
    }

    /// Pause and stamp the end time. A later `start` reopens the session.
    pub fn stop(&mut self) {
        self.pause();
        if self.started_at.is_some() && self.ended_at.is_none() {
            self.ended_at = Some(SystemTime::now());
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.accumulated + self.running_since.map(|s| s.elapsed()).unwrap_or_default()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            started_at: self.started_at.map(unix_millis),
            ended_at: self.ended_at.map(unix_millis),
            duration_seconds: self.elapsed().as_secs_f64(),
        }
    }
}

fn unix_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}
