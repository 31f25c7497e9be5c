use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{DynoError, DynoResult};

pub const DEFAULT_MASS_KG: f64 = 1500.0;
pub const DEFAULT_VEHICLE_NAME: &str = "My Vehicle";

/// One position fix as delivered by the acquisition source.
///
/// Field names on the wire follow the browser geolocation shape
/// (`timestamp`, `accuracy`) so recorded logs replay unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Ground speed in m/s. Null, missing or negative on the wire reads as 0.
    #[serde(default, deserialize_with = "speed_or_zero")]
    pub speed: f64,
    #[serde(rename = "timestamp")]
    pub timestamp_millis: i64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "accuracy")]
    pub accuracy_meters: f64,
}

impl RawSample {
    /// Build a sample from a fix whose speed may be missing.
    ///
    /// Missing, negative or non-finite speeds are stored as 0.
    pub fn new(
        speed: Option<f64>,
        timestamp_millis: i64,
        latitude: f64,
        longitude: f64,
        accuracy_meters: f64,
    ) -> Self {
        Self {
            speed: clean_speed(speed),
            timestamp_millis,
            latitude,
            longitude,
            accuracy_meters,
        }
    }

    /// Sample carrying only speed and time (position fields zeroed)
    pub fn at(speed: f64, timestamp_millis: i64) -> Self {
        Self::new(Some(speed), timestamp_millis, 0.0, 0.0, 0.0)
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed * 3.6
    }
}

fn clean_speed(speed: Option<f64>) -> f64 {
    speed.filter(|s| s.is_finite() && *s >= 0.0).unwrap_or(0.0)
}

fn speed_or_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer).map(clean_speed)
}

/// One point of the computed power curve
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DerivedPoint {
    #[serde(rename = "power")]
    pub power_hp: f64,
    #[serde(rename = "torque")]
    pub torque_nm: f64,
    #[serde(rename = "speed")]
    pub speed_kmh: f64,
    /// Seconds since the first raw sample of the run
    #[serde(rename = "time")]
    pub elapsed_seconds: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    #[serde(rename = "mass")]
    pub mass_kg: f64,
    pub name: String,
}

impl Vehicle {
    pub fn new(name: impl Into<String>, mass_kg: f64) -> DynoResult<Self> {
        if !mass_kg.is_finite() || mass_kg <= 0.0 {
            return Err(DynoError::InvalidParameters(format!(
                "vehicle mass must be a positive number of kg, got {}",
                mass_kg
            )));
        }
        Ok(Self {
            mass_kg,
            name: name.into(),
        })
    }
}

impl Default for Vehicle {
    fn default() -> Self {
        Self {
            mass_kg: DEFAULT_MASS_KG,
            name: DEFAULT_VEHICLE_NAME.to_string(),
        }
    }
}

/// Lifecycle of a single dyno run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Nothing in progress
    Idle,
    /// Countdown running
    Ready,
    /// Acquisition active
    Recording,
    /// Estimator running over the collected samples
    Processing,
    /// Curve available, may be saved
    Complete,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunStatus::Idle => "idle",
            RunStatus::Ready => "ready",
            RunStatus::Recording => "recording",
            RunStatus::Processing => "processing",
            RunStatus::Complete => "complete",
        };
        f.write_str(label)
    }
}

/// A saved run. Field names on disk match the historic collection format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestRun {
    pub id: String,
    pub vehicle: Vehicle,
    /// ISO-8601 save time
    pub date: String,
    #[serde(rename = "maxPower")]
    pub max_power_hp: f64,
    #[serde(rename = "maxTorque")]
    pub max_torque_nm: f64,
    pub data: Vec<DerivedPoint>,
}

impl TestRun {
    /// One-line listing: name and rounded peaks
    pub fn headline(&self) -> String {
        format!(
            "{}: {} HP / {} Nm",
            self.vehicle.name,
            self.max_power_hp.round(),
            self.max_torque_nm.round()
        )
    }
}

static RUN_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Time-based id, unique within the process
pub fn generate_run_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let seq = RUN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{}{}", to_base36(millis), to_base36(seq))
}

pub fn iso_timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
