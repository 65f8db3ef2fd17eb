//! CRM Dashboard - controllers for the lead pipeline, task schedule and
//! account settings views
//!
//! Each controller wraps one [`crm_sync::OptimisticMutator`] and exposes the
//! view's actions in domain terms. Remote access goes through
//! [`http::HttpDataAccess`] in production and
//! [`crm_sync::InMemoryDataAccess`] in tests and the simulator.

#![warn(unreachable_pub)]

pub mod account;
pub mod config;
pub mod console;
pub mod http;
pub mod lead;
pub mod pipeline;
pub mod schedule;
pub mod settings;
pub mod simulator;
pub mod task;
pub mod telemetry;

pub use account::{AccountProfile, ACCOUNT_ID, PREFERENCES};
pub use config::{ApiConfig, ConfigError, DashboardConfig, LoggingConfig, NotificationConfig};
pub use http::HttpDataAccess;
pub use lead::{Lead, LeadDraft, LeadStage};
pub use pipeline::PipelineBoard;
pub use schedule::TaskSchedule;
pub use settings::AccountSettings;
pub use simulator::{run_simulator, SimulationReport, SimulatorConfig};
pub use task::{Priority, Task, TaskDraft, TaskStatus};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
