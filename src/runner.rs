use log::{debug, info, warn};
use std::path::PathBuf;
use tokio::sync::mpsc::Receiver;
use tokio::time::{interval, interval_at, sleep, Duration, Instant};

use crate::acquisition::{FeedEvent, SampleFeed};
use crate::countdown::CountdownTick;
use crate::error::DynoResult;
use crate::session::RunSession;
use crate::store::RunRepository;
use crate::types::RunStatus;

/// How long to record and where to mirror the live status
#[derive(Clone, Debug)]
pub struct RunPlan {
    pub countdown_tick: Duration,
    pub record_for: Duration,
    /// Written every `status_every` while the run is live
    pub status_path: Option<PathBuf>,
    pub status_every: Duration,
}

impl Default for RunPlan {
    fn default() -> Self {
        Self {
            countdown_tick: Duration::from_secs(1),
            record_for: Duration::from_secs(10),
            status_path: None,
            status_every: Duration::from_secs(1),
        }
    }
}

/// Drive one run on the current task: start, countdown, record for
/// `plan.record_for`, then stop. Acquisition events are drained from
/// `events` the whole time so nothing queues up between runs.
///
/// Returns the final status; `Complete` unless acquisition failed to start.
pub async fn drive_run<F, R>(
    session: &mut RunSession<F, R>,
    events: &mut Receiver<FeedEvent>,
    plan: &RunPlan,
) -> DynoResult<RunStatus>
where
    F: SampleFeed,
    R: RunRepository,
{
    if !session.start()? {
        return Ok(session.status());
    }

    let mut ticker = interval_at(Instant::now() + plan.countdown_tick, plan.countdown_tick);
    while session.status() == RunStatus::Ready {
        tokio::select! {
            _ = ticker.tick() => {
                match session.tick()? {
                    CountdownTick::Remaining(n) => info!("[run] {}...", n),
                    CountdownTick::Elapsed => info!("[run] go!"),
                    CountdownTick::Inactive => {}
                }
            }
            Some(event) = events.recv() => {
                session.handle_event(event);
            }
        }
    }

    if session.status() != RunStatus::Recording {
        return Ok(session.status());
    }

    let deadline = sleep(plan.record_for);
    tokio::pin!(deadline);
    let mut status_ticker = interval(plan.status_every);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            maybe_event = events.recv() => match maybe_event {
                Some(event) => {
                    session.handle_event(event);
                }
                None => {
                    warn!("[run] feed channel closed, stopping early");
                    break;
                }
            },
            _ = status_ticker.tick() => {
                let status = session.live_status();
                debug!(
                    "[run] {} km/h, {} samples @ {} Hz, accuracy {}",
                    status.display_speed(),
                    status.sample_count,
                    status.sample_rate_hz,
                    status.display_accuracy()
                );
                write_status(session, plan);
            }
        }
    }

    session.stop();
    // Drop what the producers queued before they were aborted. A send that
    // races the abort lands later and is rejected by generation.
    while events.try_recv().is_ok() {}
    write_status(session, plan);

    Ok(session.status())
}

fn write_status<F: SampleFeed, R: RunRepository>(session: &RunSession<F, R>, plan: &RunPlan) {
    if let Some(path) = &plan.status_path {
        let path = path.to_string_lossy();
        if let Err(e) = session.live_status().save(&path) {
            warn!("[run] could not write live status to {}: {}", path, e);
        }
    }
}
