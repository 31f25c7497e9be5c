use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;

use crate::peaks::Peaks;
use crate::types::RunStatus;

/// Number of one-second windows kept by the rate meter
const RATE_HISTORY: usize = 5;
const RATE_WINDOW_MS: i64 = 1000;

/// Accepted samples per second.
///
/// Once a window of at least one second has passed, the rate is the
/// difference between the current cumulative count and the count recorded
/// at the previous window boundary.
#[derive(Clone, Debug, Default)]
pub struct SampleRateMeter {
    window_start_ms: Option<i64>,
    boundary_counts: VecDeque<usize>,
    rate: usize,
}

impl SampleRateMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the cumulative accepted count at time `now_ms`
    pub fn observe(&mut self, now_ms: i64, total_count: usize) -> usize {
        let start = *self.window_start_ms.get_or_insert(now_ms);
        if now_ms - start >= RATE_WINDOW_MS {
            let previous = self.boundary_counts.back().copied().unwrap_or(0);
            self.rate = total_count.saturating_sub(previous);
            self.boundary_counts.push_back(total_count);
            while self.boundary_counts.len() > RATE_HISTORY {
                self.boundary_counts.pop_front();
            }
            self.window_start_ms = Some(now_ms);
        }
        self.rate
    }

    pub fn rate(&self) -> usize {
        self.rate
    }

    pub fn history_len(&self) -> usize {
        self.boundary_counts.len()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Snapshot for whatever renders the run
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub status: RunStatus,
    pub countdown_remaining: Option<u32>,
    // Latest accepted fix
    pub speed_kmh: f64,
    pub gps_accuracy_m: Option<f64>,
    pub sample_count: usize,
    pub sample_rate_hz: usize,
    pub error: Option<String>,
    // Results, once complete
    pub curve_points: usize,
    pub peaks: Option<Peaks>,
}

impl LiveStatus {
    pub fn new(status: RunStatus) -> Self {
        Self {
            timestamp: current_timestamp(),
            status,
            countdown_remaining: None,
            speed_kmh: 0.0,
            gps_accuracy_m: None,
            sample_count: 0,
            sample_rate_hz: 0,
            error: None,
            curve_points: 0,
            peaks: None,
        }
    }

    /// Speed rounded to whole km/h
    pub fn display_speed(&self) -> i64 {
        self.speed_kmh.round() as i64
    }

    /// Accuracy rounded to whole meters, "N/A" without a fix
    pub fn display_accuracy(&self) -> String {
        match self.gps_accuracy_m {
            Some(acc) => format!("{}m", acc.round()),
            None => "N/A".to_string(),
        }
    }

    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

pub fn current_timestamp() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
