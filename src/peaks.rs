use serde::{Deserialize, Serialize};

use crate::types::DerivedPoint;

/// Peak power and peak torque of a curve.
///
/// The two maxima are tracked independently and usually come from
/// different points, as on a rolling-road chart.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Peaks {
    pub max_power_hp: f64,
    pub max_torque_nm: f64,
}

pub fn find_peaks(points: &[DerivedPoint]) -> Peaks {
    points.iter().fold(Peaks::default(), |peaks, point| Peaks {
        max_power_hp: peaks.max_power_hp.max(point.power_hp),
        max_torque_nm: peaks.max_torque_nm.max(point.torque_nm),
    })
}
