// GPS Dyno
// Power and torque curves from GPS speed samples of an acceleration run

pub mod acquisition;
pub mod config;
pub mod countdown;
pub mod error;
pub mod live_status;
pub mod peaks;
pub mod physics;
pub mod runner;
pub mod session;
pub mod store;
pub mod types;

pub use acquisition::{
    FeedEvent, FeedSource, PositionError, PositionProvider, SampleBuffer, SampleFeed,
    SimulatedProvider, TrackingFeed, UnsupportedProvider,
};
pub use config::DynoConfig;
pub use error::{DynoError, DynoResult};
pub use live_status::{LiveStatus, SampleRateMeter};
pub use peaks::{find_peaks, Peaks};
pub use physics::estimate;
pub use runner::{drive_run, RunPlan};
pub use session::RunSession;
pub use store::{JsonFileRepository, MemoryRepository, RunRepository};
pub use types::{DerivedPoint, RawSample, RunStatus, TestRun, Vehicle};
