use std::sync::Arc;
use std::time::Duration;

use gps_dyno::{
    drive_run, estimate, find_peaks, DynoConfig, JsonFileRepository, RawSample, RunPlan,
    RunRepository, RunSession, RunStatus, SimulatedProvider, TrackingFeed, Vehicle,
};

fn simulated_session(
    store: &std::path::Path,
) -> (
    RunSession<TrackingFeed, JsonFileRepository>,
    tokio::sync::mpsc::Receiver<gps_dyno::FeedEvent>,
) {
    let config = DynoConfig {
        store_dir: store.to_path_buf(),
        vehicle: Vehicle::new("Track Car", 1250.0).unwrap(),
        ..DynoConfig::default()
    };
    let provider = Arc::new(SimulatedProvider::new(50.0, 5.0));
    let (feed, events) = TrackingFeed::new(provider, config.poll_interval(), config.feed_capacity);
    let session = RunSession::new(feed, JsonFileRepository::in_dir(store), &config);
    (session, events)
}

#[tokio::test(start_paused = true)]
async fn saved_run_reads_back_identically() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, mut events) = simulated_session(dir.path());

    let plan = RunPlan {
        record_for: Duration::from_secs(4),
        ..RunPlan::default()
    };
    let status = drive_run(&mut session, &mut events, &plan).await.unwrap();
    assert_eq!(status, RunStatus::Complete);

    let saved = session.save().unwrap().expect("run with data saves");
    assert_eq!(saved.vehicle.name, "Track Car");
    assert_eq!(saved.data, session.derived());

    // Fresh repository on the same directory, as after a restart
    let reloaded = JsonFileRepository::in_dir(dir.path()).load().unwrap();
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded[0], saved);

    let (restarted, _events) = simulated_session(dir.path());
    assert_eq!(restarted.saved_runs(), reloaded.as_slice());
}

#[tokio::test(start_paused = true)]
async fn second_run_is_listed_first_and_deletable() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, mut events) = simulated_session(dir.path());
    let plan = RunPlan {
        record_for: Duration::from_secs(2),
        ..RunPlan::default()
    };

    drive_run(&mut session, &mut events, &plan).await.unwrap();
    let first = session.save().unwrap().unwrap();
    drive_run(&mut session, &mut events, &plan).await.unwrap();
    let second = session.save().unwrap().unwrap();

    let ids: Vec<&str> = session.saved_runs().iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);

    assert!(session.delete_run(&second.id).unwrap());
    let on_disk = JsonFileRepository::in_dir(dir.path()).load().unwrap();
    assert_eq!(on_disk.len(), 1);
    assert_eq!(on_disk[0].id, first.id);
}

#[test]
fn stored_peaks_match_curve() {
    let samples: Vec<RawSample> = [0.0, 6.0, 11.5, 16.0, 19.8, 22.9, 25.1]
        .iter()
        .enumerate()
        .map(|(i, v)| RawSample::at(*v, i as i64 * 500))
        .collect();
    let vehicle = Vehicle::new("Hatch", 1100.0).unwrap();

    let points = estimate(&samples, &vehicle);
    let peaks = find_peaks(&points);

    assert_eq!(points.len(), samples.len() - 1);
    let best_power = points.iter().map(|p| p.power_hp).fold(0.0, f64::max);
    let best_torque = points.iter().map(|p| p.torque_nm).fold(0.0, f64::max);
    assert_eq!(peaks.max_power_hp, best_power);
    assert_eq!(peaks.max_torque_nm, best_torque);
}
