pub mod calibration;
pub mod config;
pub mod model;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod time;
pub mod tracking;
pub mod usecase;

pub use calibration::{calibrate_or_fallback, compute_density, DisplayQuery, DpiDisplay, FixedDisplay};
pub use config::{DisplayConfig, TrackerConfig};
pub use model::calibration::{Calibration, DisplayGeometry};
pub use model::ledger::{DayRecord, Ledger};
pub use model::sample::Sample;
pub use repository::{default_data_dir, FileLedgerRepository, InMemoryLedgerRepository, LedgerRepository};
pub use scheduler::FlushScheduler;
pub use service::tracking_service::{FlushOutcome, FlushStats, TrackerState, TrackingService};
pub use time::{parse_day, parse_duration, Bucket, Clock, SystemClock};
pub use tracking::{to_physical, DistanceAccumulator, DistanceUnit, SharedAccumulator};
pub use usecase::report::ReportUseCase;
