use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::srs::types::{
    LearnerParameterSet, DEFAULT_DESIRED_RETENTION, DEFAULT_LEARNING_DELAY_MINUTES,
    DEFAULT_MAXIMUM_INTERVAL_DAYS, DEFAULT_MAX_REVIEWS_PER_DAY, DEFAULT_NEW_CARDS_PER_DAY,
    DEFAULT_RELEARNING_DELAY_MINUTES,
};

const MIN_DESIRED_RETENTION: f64 = 0.7;
const MAX_DESIRED_RETENTION: f64 = 0.99;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub scheduler: SchedulerConfig,
    pub optimizer: OptimizerConfig,
    pub worker: WorkerConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            logging: LoggingConfig::from_env(),
            scheduler: SchedulerConfig::from_env(),
            optimizer: OptimizerConfig::from_env(),
            worker: WorkerConfig::from_env(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `vocab_srs=debug,info`.
    pub level: String,
    pub file_logs: bool,
    pub dir: PathBuf,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            level: std::env::var("RUST_LOG").unwrap_or(defaults.level),
            file_logs: env_flag("ENABLE_FILE_LOGS").unwrap_or(defaults.file_logs),
            dir: std::env::var("LOG_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.dir),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logs: false,
            dir: PathBuf::from("./logs"),
        }
    }
}

/// Defaults applied to every learner until they are changed or tuned.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub desired_retention: f64,
    pub maximum_interval_days: u32,
    pub new_cards_per_day: u32,
    pub max_reviews_per_day: u32,
    pub learning_delay_minutes: u32,
    pub relearning_delay_minutes: u32,
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let desired_retention = env_parse::<f64>("SRS_DESIRED_RETENTION")
            .filter(|v| v.is_finite())
            .map(|v| v.clamp(MIN_DESIRED_RETENTION, MAX_DESIRED_RETENTION))
            .unwrap_or(defaults.desired_retention);

        Self {
            desired_retention,
            maximum_interval_days: env_parse::<u32>("SRS_MAXIMUM_INTERVAL_DAYS")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.maximum_interval_days),
            new_cards_per_day: env_parse("SRS_NEW_CARDS_PER_DAY")
                .unwrap_or(defaults.new_cards_per_day),
            max_reviews_per_day: env_parse("SRS_MAX_REVIEWS_PER_DAY")
                .unwrap_or(defaults.max_reviews_per_day),
            learning_delay_minutes: env_parse("SRS_LEARNING_DELAY_MINUTES")
                .unwrap_or(defaults.learning_delay_minutes),
            relearning_delay_minutes: env_parse("SRS_RELEARNING_DELAY_MINUTES")
                .unwrap_or(defaults.relearning_delay_minutes),
        }
    }

    pub fn default_parameter_set(&self) -> LearnerParameterSet {
        LearnerParameterSet {
            desired_retention: self.desired_retention,
            maximum_interval_days: self.maximum_interval_days,
            new_cards_per_day: self.new_cards_per_day,
            max_reviews_per_day: self.max_reviews_per_day,
            learning_delay_minutes: self.learning_delay_minutes,
            relearning_delay_minutes: self.relearning_delay_minutes,
            ..LearnerParameterSet::default()
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            desired_retention: DEFAULT_DESIRED_RETENTION,
            maximum_interval_days: DEFAULT_MAXIMUM_INTERVAL_DAYS,
            new_cards_per_day: DEFAULT_NEW_CARDS_PER_DAY,
            max_reviews_per_day: DEFAULT_MAX_REVIEWS_PER_DAY,
            learning_delay_minutes: DEFAULT_LEARNING_DELAY_MINUTES,
            relearning_delay_minutes: DEFAULT_RELEARNING_DELAY_MINUTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    pub min_samples: usize,
    pub max_iterations: usize,
    pub restarts: usize,
    pub seed: u64,
    pub deadline: Duration,
}

impl OptimizerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_samples: env_parse("SRS_MIN_SAMPLES_FOR_OPTIMIZATION")
                .unwrap_or(defaults.min_samples),
            max_iterations: env_parse::<usize>("OPTIMIZATION_MAX_ITERATIONS")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.max_iterations),
            restarts: env_parse("OPTIMIZATION_RESTARTS").unwrap_or(defaults.restarts),
            seed: env_parse("OPTIMIZATION_SEED").unwrap_or(defaults.seed),
            deadline: env_parse::<u64>("OPTIMIZATION_DEADLINE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.deadline),
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            min_samples: 50,
            max_iterations: 200,
            restarts: 3,
            seed: 42,
            deadline: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub leader: bool,
    pub enable_optimization: bool,
    pub optimization_schedule: String,
    pub active_days: i64,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            leader: env_flag("WORKER_LEADER").unwrap_or(defaults.leader),
            enable_optimization: env_flag("ENABLE_OPTIMIZATION_WORKER")
                .unwrap_or(defaults.enable_optimization),
            optimization_schedule: std::env::var("OPTIMIZATION_SCHEDULE")
                .unwrap_or(defaults.optimization_schedule),
            active_days: env_parse::<i64>("OPTIMIZATION_ACTIVE_DAYS")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.active_days),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            leader: false,
            enable_optimization: true,
            optimization_schedule: "0 0 3 * * *".to_string(),
            active_days: 7,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
}
