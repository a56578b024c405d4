pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod nbyte;
pub mod rules;
pub mod scanner;
pub mod types;

pub use client::{QueueApi, SonarrClient};
pub use config::{Config, ConfigStore};
pub use error::ApiError;
pub use metrics::{DerivedMetrics, derive};
pub use monitor::{Monitor, MonitorHandle};
pub use rules::{Condition, ConditionKind, Rule, RuleSet, VERDICT_WITHOUT_RULES, evaluate};
pub use scanner::{ScanReport, scan_cycle};
pub use types::{ItemId, MonitorEvent, QueueItem};
