//! Plugin cron jobs.

pub mod expression;
pub mod scheduler;

pub use expression::CronSchedule;
pub use scheduler::{CronHandler, CronJobInfo, CronJobKey, CronJobSpec, CronScheduler, JobOutcome};
