use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::Parser;
use flate2::read::GzDecoder;
use gps_dyno::{estimate, find_peaks, DerivedPoint, RawSample, SampleBuffer, Vehicle};
use serde::Deserialize;
use serde_json::json;

#[derive(Parser, Debug)]
struct Args {
    /// Path to a recorded sample log (.json or .json.gz)
    #[arg(long)]
    log: PathBuf,

    /// Vehicle mass in kg
    #[arg(long, default_value = "1500")]
    mass: f64,

    /// Vehicle name
    #[arg(long, default_value = "My Vehicle")]
    name: String,

    /// Write the curve and peaks as JSON here instead of printing a table
    #[arg(long)]
    output: Option<PathBuf>,
}

/// Either a bare list of fixes or `{"readings": [...]}`
#[derive(Deserialize)]
#[serde(untagged)]
enum SampleLog {
    Bare(Vec<RawSample>),
    Wrapped { readings: Vec<RawSample> },
}

impl SampleLog {
    fn into_samples(self) -> Vec<RawSample> {
        match self {
            SampleLog::Bare(samples) => samples,
            SampleLog::Wrapped { readings } => readings,
        }
    }
}

fn load_log(path: &Path) -> anyhow::Result<Vec<RawSample>> {
    let file = File::open(path)?;
    let log: SampleLog = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let gz = GzDecoder::new(file);
        serde_json::from_reader(BufReader::new(gz))?
    } else {
        serde_json::from_reader(BufReader::new(file))?
    };
    Ok(log.into_samples())
}

/// Apply the acquisition-boundary duplicate filter to a recorded log
fn dedupe(samples: Vec<RawSample>) -> (Vec<RawSample>, usize) {
    let total = samples.len();
    let mut buffer = SampleBuffer::new();
    for sample in samples {
        buffer.push(sample);
    }
    let kept = buffer.samples().to_vec();
    let dropped = total - kept.len();
    (kept, dropped)
}

fn print_table(points: &[DerivedPoint]) {
    println!("{:>8} {:>9} {:>9} {:>10}", "time s", "km/h", "HP", "Nm");
    for p in points {
        println!(
            "{:>8.2} {:>9.1} {:>9.1} {:>10.1}",
            p.elapsed_seconds, p.speed_kmh, p.power_hp, p.torque_nm
        );
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let vehicle = Vehicle::new(args.name.clone(), args.mass)?;
    let raw = load_log(&args.log)?;
    let (samples, dropped) = dedupe(raw);
    log::info!(
        "[replay] {} fixes from {} ({} duplicates dropped)",
        samples.len(),
        args.log.display(),
        dropped
    );

    let points = estimate(&samples, &vehicle);
    let peaks = find_peaks(&points);

    match &args.output {
        Some(path) => {
            let summary = json!({
                "vehicle": vehicle,
                "samples": samples.len(),
                "duplicates_dropped": dropped,
                "maxPower": peaks.max_power_hp,
                "maxTorque": peaks.max_torque_nm,
                "data": points,
            });
            std::fs::write(path, serde_json::to_string_pretty(&summary)?)?;
            println!("Wrote {} points to {}", points.len(), path.display());
        }
        None => print_table(&points),
    }

    println!("Max power: {:.0} HP", peaks.max_power_hp);
    println!("Max torque: {:.0} Nm", peaks.max_torque_nm);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const LOG: &str = r#"[
        {"speed": 0, "timestamp": 0, "latitude": 0, "longitude": 0, "accuracy": 5},
        {"speed": 10, "timestamp": 1000, "latitude": 0, "longitude": 0, "accuracy": 5},
        {"speed": 10, "timestamp": 1000, "latitude": 0, "longitude": 0, "accuracy": 5},
        {"speed": 20, "timestamp": 2000, "latitude": 0, "longitude": 0, "accuracy": 5}
    ]"#;

    #[test]
    fn test_load_plain_and_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("run.json");
        std::fs::write(&plain, LOG).unwrap();
        assert_eq!(load_log(&plain).unwrap().len(), 4);

        let wrapped = dir.path().join("wrapped.json");
        std::fs::write(&wrapped, format!(r#"{{"readings": {}}}"#, LOG)).unwrap();
        assert_eq!(load_log(&wrapped).unwrap().len(), 4);
    }

    #[test]
    fn test_load_gz() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(LOG.as_bytes()).unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();

        let samples = load_log(&path).unwrap();
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[3].speed, 20.0);
    }

    #[test]
    fn test_log_with_unknown_speed_replays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gaps.json");
        std::fs::write(
            &path,
            r#"{"readings": [
                {"speed": null, "timestamp": 0, "latitude": 0, "longitude": 0, "accuracy": 5},
                {"speed": -2, "timestamp": 500, "latitude": 0, "longitude": 0, "accuracy": 5},
                {"speed": 8, "timestamp": 1000, "latitude": 0, "longitude": 0, "accuracy": 5}
            ]}"#,
        )
        .unwrap();

        let samples = load_log(&path).unwrap();
        assert_eq!(samples[0].speed, 0.0);
        assert_eq!(samples[1].speed, 0.0);

        let points = estimate(&samples, &Vehicle::default());
        assert_eq!(points.len(), 2);
        assert!(points.iter().all(|p| p.power_hp >= 0.0 && p.torque_nm >= 0.0));
    }

    #[test]
    fn test_dedupe_then_estimate() {
        let samples: Vec<RawSample> = serde_json::from_str(LOG).unwrap();
        let (kept, dropped) = dedupe(samples);
        assert_eq!(dropped, 1);

        let points = estimate(&kept, &Vehicle::default());
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].speed_kmh, 72.0);
    }
}
