pub mod optimizer;
pub mod params;
pub mod queue;
pub mod review;
pub mod scheduler;

pub use optimizer::{OptimizationOutcome, ParameterOptimizer};
pub use params::ParameterStore;
pub use queue::{DailyUsage, QueuedItem, ReviewSchedule};
pub use review::ReviewService;
pub use scheduler::{ReviewResult, Scheduler, SchedulerError};
