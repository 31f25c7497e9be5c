use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant};

use crate::error::{DynoError, DynoResult};
use crate::types::RawSample;

/// Failure reported by a position provider
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PositionError {
    /// The platform cannot deliver positions at all
    #[error("position tracking unsupported: {0}")]
    Unsupported(String),

    #[error("position request timed out")]
    Timeout,

    #[error("position unavailable: {0}")]
    Unavailable(String),
}

impl PositionError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, PositionError::Unsupported(_))
    }
}

impl From<PositionError> for DynoError {
    fn from(err: PositionError) -> Self {
        match err {
            PositionError::Unsupported(reason) => DynoError::Unsupported(reason),
            other => DynoError::Internal(other.to_string()),
        }
    }
}

/// Source of position fixes (GNSS receiver, platform location service, replay)
pub trait PositionProvider: Send + Sync + 'static {
    fn is_supported(&self) -> bool;

    /// One-shot read of the current fix
    fn current_position(&self) -> Result<RawSample, PositionError>;

    /// Open a continuous watch. Fixes arrive until the receiver is dropped.
    fn watch_position(&self) -> Result<Receiver<Result<RawSample, PositionError>>, PositionError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedSource {
    Watch,
    Poll,
}

/// One acquisition event, tagged with the feed generation that produced it
#[derive(Clone, Debug, PartialEq)]
pub enum FeedEvent {
    Sample {
        sample: RawSample,
        source: FeedSource,
        generation: u64,
    },
    Failed {
        error: PositionError,
        source: FeedSource,
        generation: u64,
    },
}

impl FeedEvent {
    pub fn generation(&self) -> u64 {
        match self {
            FeedEvent::Sample { generation, .. } | FeedEvent::Failed { generation, .. } => {
                *generation
            }
        }
    }
}

/// Ordered sample store at the acquisition boundary.
///
/// A fix whose timestamp equals the most recently accepted one is dropped.
/// Out-of-order fixes are kept; the estimator skips those pairs.
#[derive(Clone, Debug, Default)]
pub struct SampleBuffer {
    samples: Vec<RawSample>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the sample was a duplicate
    pub fn push(&mut self, sample: RawSample) -> bool {
        if let Some(last) = self.samples.last() {
            if last.timestamp_millis == sample.timestamp_millis {
                return false;
            }
        }
        self.samples.push(sample);
        true
    }

    pub fn samples(&self) -> &[RawSample] {
        &self.samples
    }

    pub fn last(&self) -> Option<&RawSample> {
        self.samples.last()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Live subscription to both producer tasks.
/// Dropping the handle aborts them.
pub struct AcquisitionHandle {
    watch: JoinHandle<()>,
    poll: JoinHandle<()>,
}

impl Drop for AcquisitionHandle {
    fn drop(&mut self) {
        self.watch.abort();
        self.poll.abort();
    }
}

/// Spawn the watch forwarder and the periodic poll, both writing into `tx`.
/// Every event they send carries `generation`.
///
/// Must be called from inside a tokio runtime.
pub fn start_acquisition(
    provider: Arc<dyn PositionProvider>,
    tx: Sender<FeedEvent>,
    poll_period: Duration,
    generation: u64,
) -> DynoResult<AcquisitionHandle> {
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|e| DynoError::Internal(format!("no async runtime for acquisition: {}", e)))?;

    if !provider.is_supported() {
        return Err(DynoError::Unsupported(
            "position provider reports no location capability".to_string(),
        ));
    }

    let fixes = provider.watch_position()?;

    let watch = runtime.spawn(watch_loop(fixes, tx.clone(), generation));
    let poll = runtime.spawn(poll_loop(provider, tx, poll_period, generation));

    info!(
        "[acquisition] watch and {}ms poll started (generation {})",
        poll_period.as_millis(),
        generation
    );
    Ok(AcquisitionHandle { watch, poll })
}

async fn watch_loop(
    mut fixes: Receiver<Result<RawSample, PositionError>>,
    tx: Sender<FeedEvent>,
    generation: u64,
) {
    let mut fix_count = 0u64;

    while let Some(fix) = fixes.recv().await {
        let event = match fix {
            Ok(sample) => {
                fix_count += 1;
                FeedEvent::Sample {
                    sample,
                    source: FeedSource::Watch,
                    generation,
                }
            }
            Err(error) => FeedEvent::Failed {
                error,
                source: FeedSource::Watch,
                generation,
            },
        };

        if tx.send(event).await.is_err() {
            debug!("[watch] feed closed after {} fixes", fix_count);
            return;
        }
    }

    debug!("[watch] provider ended watch after {} fixes", fix_count);
}

async fn poll_loop(
    provider: Arc<dyn PositionProvider>,
    tx: Sender<FeedEvent>,
    period: Duration,
    generation: u64,
) {
    let mut ticker = interval(period);
    let mut sample_count = 0u64;

    loop {
        ticker.tick().await;

        let event = match provider.current_position() {
            Ok(sample) => FeedEvent::Sample {
                sample,
                source: FeedSource::Poll,
                generation,
            },
            Err(error) if error.is_permanent() => {
                warn!("[poll] {}, polling stopped", error);
                let _ = tx
                    .send(FeedEvent::Failed {
                        error,
                        source: FeedSource::Poll,
                        generation,
                    })
                    .await;
                return;
            }
            Err(error) => {
                debug!("[poll] ignored: {}", error);
                continue;
            }
        };

        match tx.try_send(event) {
            Ok(_) => {
                sample_count += 1;
                if sample_count % 100 == 0 {
                    debug!("[poll] {} samples", sample_count);
                }
            }
            Err(TrySendError::Closed(_)) => {
                debug!("[poll] feed closed after {} samples", sample_count);
                return;
            }
            Err(TrySendError::Full(_)) => {
                // Watch feed is the primary source, drop the redundant poll
            }
        }
    }
}

/// Acquisition as seen by the run session
pub trait SampleFeed {
    fn is_supported(&self) -> bool;

    /// Start delivering samples. Restarts if already active.
    fn begin(&mut self) -> DynoResult<()>;

    /// Stop delivering samples. Safe to call when inactive.
    fn halt(&mut self);

    fn is_active(&self) -> bool;

    /// Bumped by every `begin`; events from earlier generations are stale
    fn generation(&self) -> u64;
}

/// Provider-backed feed writing into a single event channel
pub struct TrackingFeed {
    provider: Arc<dyn PositionProvider>,
    tx: Sender<FeedEvent>,
    poll_period: Duration,
    generation: u64,
    handle: Option<AcquisitionHandle>,
}

impl TrackingFeed {
    /// Returns the feed and the receiving end its events arrive on
    pub fn new(
        provider: Arc<dyn PositionProvider>,
        poll_period: Duration,
        capacity: usize,
    ) -> (Self, Receiver<FeedEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let feed = Self {
            provider,
            tx,
            poll_period,
            generation: 0,
            handle: None,
        };
        (feed, rx)
    }
}

impl SampleFeed for TrackingFeed {
    fn is_supported(&self) -> bool {
        self.provider.is_supported()
    }

    fn begin(&mut self) -> DynoResult<()> {
        self.halt();
        self.generation += 1;
        let handle = start_acquisition(
            self.provider.clone(),
            self.tx.clone(),
            self.poll_period,
            self.generation,
        )?;
        self.handle = Some(handle);
        Ok(())
    }

    fn halt(&mut self) {
        if let Some(handle) = self.handle.take() {
            drop(handle);
            info!("[acquisition] stopped");
        }
    }

    fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    fn generation(&self) -> u64 {
        self.generation
    }
}

/// Deterministic speed trace shared by the watch and poll paths
#[derive(Clone, Copy, Debug)]
struct SimulatedTrack {
    epoch: Instant,
    epoch_millis: i64,
    top_speed_ms: f64,
    time_constant_s: f64,
    fix_interval: Duration,
}

impl SimulatedTrack {
    fn fix_now(&self) -> RawSample {
        let step = self.fix_interval.as_millis().max(1) as i64;
        let elapsed_ms = self.epoch.elapsed().as_millis() as i64;
        let fix_ms = (elapsed_ms / step) * step;

        let t = fix_ms as f64 / 1000.0;
        let decay = (-t / self.time_constant_s).exp();
        let speed = self.top_speed_ms * (1.0 - decay);
        // Rough northward track from a fixed origin
        let distance_m = self.top_speed_ms * (t - self.time_constant_s * (1.0 - decay));

        RawSample::new(
            Some(speed),
            self.epoch_millis + fix_ms,
            37.7749 + distance_m / 111_320.0,
            -122.4194,
            4.0 + (t * 0.7).sin().abs() * 2.0,
        )
    }
}

/// Synthetic full-throttle run for demos and tests.
///
/// Speed follows `v(t) = top_speed * (1 - e^(-t / tau))` from the moment
/// the provider is created. Timestamps are quantised to the fix interval the
/// way a GNSS chip reports them, so watch and poll overlap on the same fix.
pub struct SimulatedProvider {
    track: SimulatedTrack,
    watch_period: Duration,
    fail_every: u64,
    polls: AtomicU64,
}

impl SimulatedProvider {
    pub fn new(top_speed_ms: f64, time_constant_s: f64) -> Self {
        Self {
            track: SimulatedTrack {
                epoch: Instant::now(),
                epoch_millis: chrono::Utc::now().timestamp_millis(),
                top_speed_ms,
                time_constant_s: time_constant_s.max(0.1),
                fix_interval: Duration::from_millis(100),
            },
            watch_period: Duration::from_millis(200),
            fail_every: 0,
            polls: AtomicU64::new(0),
        }
    }

    pub fn with_fix_interval(mut self, fix_interval: Duration) -> Self {
        self.track.fix_interval = fix_interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_watch_period(mut self, watch_period: Duration) -> Self {
        self.watch_period = watch_period.max(Duration::from_millis(1));
        self
    }

    /// Make every n-th poll fail with a transient error
    pub fn with_poll_failures(mut self, every: u64) -> Self {
        self.fail_every = every;
        self
    }
}

impl PositionProvider for SimulatedProvider {
    fn is_supported(&self) -> bool {
        true
    }

    fn current_position(&self) -> Result<RawSample, PositionError> {
        let n = self.polls.fetch_add(1, Ordering::Relaxed) + 1;
        if self.fail_every > 0 && n % self.fail_every == 0 {
            return Err(PositionError::Timeout);
        }
        Ok(self.track.fix_now())
    }

    fn watch_position(&self) -> Result<Receiver<Result<RawSample, PositionError>>, PositionError> {
        let (tx, rx) = mpsc::channel(64);
        let track = self.track;
        let period = self.watch_period;

        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                if tx.send(Ok(track.fix_now())).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}

/// Provider for platforms without location capability
#[derive(Clone, Debug, Default)]
pub struct UnsupportedProvider;

impl PositionProvider for UnsupportedProvider {
    fn is_supported(&self) -> bool {
        false
    }

    fn current_position(&self) -> Result<RawSample, PositionError> {
        Err(PositionError::Unsupported(
            "geolocation is not available".to_string(),
        ))
    }

    fn watch_position(&self) -> Result<Receiver<Result<RawSample, PositionError>>, PositionError> {
        Err(PositionError::Unsupported(
            "geolocation is not available".to_string(),
        ))
    }
}
