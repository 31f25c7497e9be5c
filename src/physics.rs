/// Virtual Dyno Physics Engine
/// Converts consecutive GPS speed samples into wheel power and torque
/// using vehicle mass plus rolling and aerodynamic resistance

use crate::types::{DerivedPoint, RawSample, Vehicle};

pub const GRAVITY: f64 = 9.81; // m/s²
pub const AIR_DENSITY: f64 = 1.225; // kg/m³
pub const DRAG_COEFFICIENT: f64 = 0.3;
pub const FRONTAL_AREA: f64 = 2.2; // m²
pub const ROLLING_RESISTANCE: f64 = 0.015;
pub const WHEEL_RADIUS: f64 = 0.3; // m
pub const KW_TO_HP: f64 = 1.34102;
/// Angular velocity used when the vehicle is stationary (rad/s).
/// Keeps torque finite at zero speed; produces a step at v = 0.
pub const STATIONARY_ANGULAR_VELOCITY: f64 = 0.1;

/// Force and power components for one sample pair, before clamping
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ForceBreakdown {
    pub rolling_n: f64,
    pub drag_n: f64,
    pub accel_n: f64,
    pub total_n: f64,
    pub power_w: f64,
    pub torque_nm: f64,
}

/// Forces at speed `speed_ms` under acceleration `accel_ms2`
///
/// Physics:
///   F_roll  = Crr × m × g
///   F_drag  = ½ × ρ × Cd × A × v²
///   F_accel = m × a
///   P = (F_roll + F_drag + F_accel) × v
///   τ = P / ω, ω = v / r_wheel
pub fn resolve_forces(mass_kg: f64, speed_ms: f64, accel_ms2: f64) -> ForceBreakdown {
    let rolling_n = ROLLING_RESISTANCE * mass_kg * GRAVITY;
    let drag_n = 0.5 * AIR_DENSITY * DRAG_COEFFICIENT * FRONTAL_AREA * speed_ms * speed_ms;
    let accel_n = mass_kg * accel_ms2;
    let total_n = rolling_n + drag_n + accel_n;

    let power_w = total_n * speed_ms;

    let angular_velocity = if speed_ms > 0.0 {
        speed_ms / WHEEL_RADIUS
    } else {
        STATIONARY_ANGULAR_VELOCITY
    };
    let torque_nm = power_w / angular_velocity;

    ForceBreakdown {
        rolling_n,
        drag_n,
        accel_n,
        total_n,
        power_w,
        torque_nm,
    }
}

pub fn watts_to_hp(power_w: f64) -> f64 {
    (power_w / 1000.0) * KW_TO_HP
}

/// Seconds from `from` to `to`, in floating point so any pair of
/// timestamps is representable
fn millis_between(from: i64, to: i64) -> f64 {
    (to as f64 - from as f64) / 1000.0
}

/// Estimate the power/torque curve of a run.
///
/// Each output point comes from a consecutive pair `(prev, current)`.
/// Pairs with a non-positive time step are skipped; they cover duplicate
/// and out-of-order fixes from merged acquisition feeds. Elapsed time is
/// always measured from `samples[0]`. Power and torque are clamped at 0,
/// so deceleration shows up as zero effort rather than negative values.
pub fn estimate(samples: &[RawSample], vehicle: &Vehicle) -> Vec<DerivedPoint> {
    if samples.len() < 2 {
        return Vec::new();
    }

    let first_timestamp = samples[0].timestamp_millis;
    let mut points = Vec::with_capacity(samples.len() - 1);

    for pair in samples.windows(2) {
        let (prev, current) = (&pair[0], &pair[1]);

        let delta_time = millis_between(prev.timestamp_millis, current.timestamp_millis);
        if delta_time <= 0.0 {
            continue;
        }

        let acceleration = (current.speed - prev.speed) / delta_time;
        let forces = resolve_forces(vehicle.mass_kg, current.speed, acceleration);

        points.push(DerivedPoint {
            power_hp: watts_to_hp(forces.power_w).max(0.0),
            torque_nm: forces.torque_nm.max(0.0),
            speed_kmh: current.speed_kmh(),
            elapsed_seconds: millis_between(first_timestamp, current.timestamp_millis),
        });
    }

    points
}
