use log::{debug, info, warn};

use crate::acquisition::{FeedEvent, FeedSource, SampleBuffer, SampleFeed};
use crate::config::DynoConfig;
use crate::countdown::{Countdown, CountdownTick};
use crate::error::{DynoError, DynoResult};
use crate::live_status::{LiveStatus, SampleRateMeter};
use crate::peaks::{find_peaks, Peaks};
use crate::physics;
use crate::store::{load_or_empty, RunRepository};
use crate::types::{
    generate_run_id, iso_timestamp_now, DerivedPoint, RawSample, RunStatus, TestRun, Vehicle,
};

/// One dyno run at a time: countdown, recording, processing, save.
///
/// All mutation happens on the owner's thread; acquisition events are
/// handed in through [`RunSession::handle_event`].
pub struct RunSession<F: SampleFeed, R: RunRepository> {
    status: RunStatus,
    vehicle: Vehicle,
    countdown_ticks: u32,
    countdown: Option<Countdown>,
    buffer: SampleBuffer,
    rate: SampleRateMeter,
    derived: Vec<DerivedPoint>,
    last_error: Option<DynoError>,
    feed: F,
    repository: R,
    saved: Vec<TestRun>,
}

impl<F: SampleFeed, R: RunRepository> RunSession<F, R> {
    /// Create an idle session. Saved runs are read once here; an unreadable
    /// collection starts empty.
    pub fn new(feed: F, repository: R, config: &DynoConfig) -> Self {
        let saved = load_or_empty(&repository);
        debug!("[session] {} saved runs loaded", saved.len());

        Self {
            status: RunStatus::Idle,
            vehicle: config.vehicle.clone(),
            countdown_ticks: config.countdown_ticks,
            countdown: None,
            buffer: SampleBuffer::new(),
            rate: SampleRateMeter::new(),
            derived: Vec::new(),
            last_error: None,
            feed,
            repository,
            saved,
        }
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn vehicle(&self) -> &Vehicle {
        &self.vehicle
    }

    pub fn update_vehicle(&mut self, vehicle: Vehicle) -> DynoResult<()> {
        let vehicle = Vehicle::new(vehicle.name, vehicle.mass_kg)?;
        info!("[session] vehicle set to {} ({} kg)", vehicle.name, vehicle.mass_kg);
        self.vehicle = vehicle;
        Ok(())
    }

    pub fn samples(&self) -> &[RawSample] {
        self.buffer.samples()
    }

    pub fn sample_count(&self) -> usize {
        self.buffer.len()
    }

    pub fn latest_sample(&self) -> Option<&RawSample> {
        self.buffer.last()
    }

    pub fn derived(&self) -> &[DerivedPoint] {
        &self.derived
    }

    pub fn last_error(&self) -> Option<&DynoError> {
        self.last_error.as_ref()
    }

    pub fn countdown_remaining(&self) -> Option<u32> {
        self.countdown
            .as_ref()
            .filter(|c| c.is_active())
            .map(|c| c.remaining())
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    /// Saved runs, newest first
    pub fn saved_runs(&self) -> &[TestRun] {
        &self.saved
    }

    pub fn find_run(&self, id: &str) -> Option<&TestRun> {
        self.saved.iter().find(|run| run.id == id)
    }

    /// Begin the countdown (Idle/Complete → Ready).
    ///
    /// Returns `Ok(false)` when a run is already in progress. Fails with
    /// `Unsupported` when the feed has no location capability; that error
    /// stays visible through [`RunSession::last_error`].
    pub fn start(&mut self) -> DynoResult<bool> {
        match self.status {
            RunStatus::Idle | RunStatus::Complete => {}
            other => {
                debug!("[session] start ignored while {}", other);
                return Ok(false);
            }
        }

        if !self.feed.is_supported() {
            let err = DynoError::Unsupported("geolocation is not supported".to_string());
            warn!("[session] cannot start: {}", err);
            self.last_error = Some(err.clone());
            return Err(err);
        }

        self.clear_run();
        self.last_error = None;
        self.status = RunStatus::Ready;
        info!("[session] countdown from {}", self.countdown_ticks);

        if self.countdown_ticks == 0 {
            self.begin_recording()?;
        } else {
            self.countdown = Some(Countdown::new(self.countdown_ticks));
        }
        Ok(true)
    }

    /// Advance the countdown by one tick; enters Recording when it elapses
    pub fn tick(&mut self) -> DynoResult<CountdownTick> {
        if self.status != RunStatus::Ready {
            return Ok(CountdownTick::Inactive);
        }

        let tick = match self.countdown.as_mut() {
            Some(countdown) => countdown.tick(),
            None => CountdownTick::Inactive,
        };

        if tick == CountdownTick::Elapsed {
            self.begin_recording()?;
        }
        Ok(tick)
    }

    fn begin_recording(&mut self) -> DynoResult<()> {
        self.countdown = None;
        match self.feed.begin() {
            Ok(()) => {
                self.status = RunStatus::Recording;
                info!("[session] recording");
                Ok(())
            }
            Err(e) => {
                warn!("[session] acquisition failed to start: {}", e);
                self.last_error = Some(e.clone());
                self.status = RunStatus::Idle;
                Err(e)
            }
        }
    }

    /// Route one acquisition event. Returns true if a sample was accepted.
    ///
    /// Events left over from an earlier acquisition (a producer that sent
    /// just before it was aborted) are dropped by generation.
    pub fn handle_event(&mut self, event: FeedEvent) -> bool {
        if event.generation() != self.feed.generation() {
            debug!(
                "[session] stale event from generation {} dropped",
                event.generation()
            );
            return false;
        }

        match event {
            FeedEvent::Sample { sample, .. } => self.accept_sample(sample),
            FeedEvent::Failed { error, source, .. } => {
                if error.is_permanent() {
                    warn!("[session] {:?} feed lost capability: {}", source, error);
                    self.last_error = Some(error.into());
                } else if source == FeedSource::Watch {
                    warn!("[session] watch error: {}", error);
                    self.last_error = Some(DynoError::Internal(error.to_string()));
                } else {
                    debug!("[session] poll error ignored: {}", error);
                }
                false
            }
        }
    }

    /// Append a fix to the run. Only accepted while recording; a fix with
    /// the same timestamp as the previous accepted one is dropped.
    pub fn accept_sample(&mut self, sample: RawSample) -> bool {
        if self.status != RunStatus::Recording {
            return false;
        }

        let timestamp = sample.timestamp_millis;
        if !self.buffer.push(sample) {
            debug!("[session] duplicate fix at {} dropped", timestamp);
            return false;
        }
        self.rate.observe(timestamp, self.buffer.len());
        true
    }

    /// Finish recording and compute the curve (Recording → Processing → Complete).
    /// No-op in any other state.
    pub fn stop(&mut self) -> bool {
        if self.status != RunStatus::Recording {
            debug!("[session] stop ignored while {}", self.status);
            return false;
        }

        self.feed.halt();
        self.status = RunStatus::Processing;

        self.derived = physics::estimate(self.buffer.samples(), &self.vehicle);
        self.rate.reset();
        self.status = RunStatus::Complete;

        info!(
            "[session] run complete: {} samples, {} curve points",
            self.buffer.len(),
            self.derived.len()
        );
        true
    }

    /// Abandon whatever is in progress and return to Idle
    pub fn reset(&mut self) {
        if self.feed.is_active() {
            self.feed.halt();
        }
        if let Some(mut countdown) = self.countdown.take() {
            countdown.cancel();
        }
        self.clear_run();
        self.status = RunStatus::Idle;
        info!("[session] reset");
    }

    fn clear_run(&mut self) {
        self.countdown = None;
        self.buffer.clear();
        self.rate.reset();
        self.derived.clear();
    }

    /// Peaks of the current curve, once complete
    pub fn peaks(&self) -> Option<Peaks> {
        if self.status == RunStatus::Complete && !self.derived.is_empty() {
            Some(find_peaks(&self.derived))
        } else {
            None
        }
    }

    /// Persist the completed run as the newest saved run.
    ///
    /// `Ok(None)` when there is nothing to save. On a write failure the
    /// in-memory collection is left as it was.
    pub fn save(&mut self) -> DynoResult<Option<TestRun>> {
        if self.status != RunStatus::Complete || self.derived.is_empty() {
            debug!("[session] nothing to save");
            return Ok(None);
        }

        let peaks = find_peaks(&self.derived);
        let run = TestRun {
            id: generate_run_id(),
            vehicle: self.vehicle.clone(),
            date: iso_timestamp_now(),
            max_power_hp: peaks.max_power_hp,
            max_torque_nm: peaks.max_torque_nm,
            data: self.derived.clone(),
        };

        let mut updated = Vec::with_capacity(self.saved.len() + 1);
        updated.push(run.clone());
        updated.extend(self.saved.iter().cloned());

        self.repository.store(&updated)?;
        self.saved = updated;

        info!("[session] saved run {} ({})", run.id, run.headline());
        Ok(Some(run))
    }

    /// Remove a saved run. Returns false if no run has that id.
    pub fn delete_run(&mut self, id: &str) -> DynoResult<bool> {
        if self.find_run(id).is_none() {
            return Ok(false);
        }

        let updated: Vec<TestRun> = self
            .saved
            .iter()
            .filter(|run| run.id != id)
            .cloned()
            .collect();

        self.repository.store(&updated)?;
        self.saved = updated;
        info!("[session] deleted run {}", id);
        Ok(true)
    }

    pub fn live_status(&self) -> LiveStatus {
        let mut status = LiveStatus::new(self.status);
        status.countdown_remaining = self.countdown_remaining();
        status.sample_count = self.buffer.len();
        status.sample_rate_hz = self.rate.rate();
        status.error = self.last_error.as_ref().map(|e| e.to_string());

        if let Some(latest) = self.buffer.last() {
            status.speed_kmh = latest.speed_kmh();
            status.gps_accuracy_m = Some(latest.accuracy_meters);
        }

        if self.status == RunStatus::Complete {
            status.curve_points = self.derived.len();
            status.peaks = self.peaks();
        }
        status
    }
}
