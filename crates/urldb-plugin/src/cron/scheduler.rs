//! Cron scheduler for plugin jobs.
//!
//! A single ticker (a one-second `tokio-cron-scheduler` job) calls
//! [`CronScheduler::tick`], which fires every due job on its own task under a
//! timeout. Jobs of disabled plugins stay registered but paused.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};

use urldb_core::error::AppError;

use super::expression::CronSchedule;
use crate::api::context::PluginContext;
use crate::error::{HandlerError, ScheduleParseError};
use crate::hooks::dispatcher::panic_message;
use crate::logs::{LogLevel, PluginLogBook};
use crate::stats::{PluginStats, StatEvent};

/// Body of a scheduled job.
#[async_trait]
pub trait CronHandler: Send + Sync {
    /// Runs the job once.
    async fn run(&self, ctx: &PluginContext) -> Result<(), HandlerError>;
}

/// Jobs are scoped per plugin: `(plugin, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CronJobKey {
    /// Owning plugin.
    pub plugin: String,
    /// Job name, unique within the plugin.
    pub name: String,
}

impl CronJobKey {
    /// Creates a key.
    pub fn new(plugin: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for CronJobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.plugin, self.name)
    }
}

/// How one execution ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Returned `Ok`.
    Succeeded,
    /// Returned an error.
    Failed(String),
    /// Exceeded the job timeout and was aborted.
    TimedOut,
    /// Panicked.
    Panicked(String),
}

/// A job declaration ready to be scheduled.
#[derive(Clone)]
pub struct CronJobSpec {
    /// Job name.
    pub name: String,
    /// Parsed schedule.
    pub schedule: CronSchedule,
    /// Job body.
    pub handler: Arc<dyn CronHandler>,
}

struct JobEntry {
    schedule: CronSchedule,
    handler: Arc<dyn CronHandler>,
    context: PluginContext,
    next_fire_at: Option<DateTime<Utc>>,
    paused: bool,
    last_run_at: Option<DateTime<Utc>>,
    last_outcome: Option<JobOutcome>,
}

/// Read-only view of a job for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct CronJobInfo {
    /// Owning plugin.
    pub plugin: String,
    /// Job name.
    pub name: String,
    /// Cron expression.
    pub schedule: String,
    /// Next due time, if the expression ever fires again.
    pub next_fire_at: Option<DateTime<Utc>>,
    /// Whether the owning plugin is disabled.
    pub paused: bool,
    /// Last start time.
    pub last_run_at: Option<DateTime<Utc>>,
    /// Last result.
    pub last_outcome: Option<JobOutcome>,
}

struct SchedulerState {
    jobs: RwLock<HashMap<CronJobKey, JobEntry>>,
    job_timeout: Duration,
    log_book: Arc<PluginLogBook>,
    stats: Arc<PluginStats>,
}

/// Scheduler for every plugin's cron jobs.
pub struct CronScheduler {
    state: Arc<SchedulerState>,
    engine: Mutex<Option<JobScheduler>>,
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler")
            .field("job_timeout", &self.state.job_timeout)
            .finish()
    }
}

impl CronScheduler {
    /// Creates a scheduler whose jobs are aborted after `job_timeout`.
    pub fn new(
        job_timeout: Duration,
        log_book: Arc<PluginLogBook>,
        stats: Arc<PluginStats>,
    ) -> Self {
        Self {
            state: Arc::new(SchedulerState {
                jobs: RwLock::new(HashMap::new()),
                job_timeout,
                log_book,
                stats,
            }),
            engine: Mutex::new(None),
        }
    }

    /// Parses a schedule for `plugin`'s job `name`.
    pub fn parse_schedule(
        plugin: &str,
        name: &str,
        schedule: &str,
    ) -> Result<CronSchedule, ScheduleParseError> {
        CronSchedule::parse(schedule).map_err(|reason| ScheduleParseError {
            plugin: plugin.to_string(),
            job: name.to_string(),
            schedule: schedule.to_string(),
            reason,
        })
    }

    /// Registers a job, replacing any job with the same `(plugin, name)`.
    ///
    /// The schedule is validated before anything is stored.
    pub async fn register(
        &self,
        name: &str,
        schedule: &str,
        context: PluginContext,
        handler: Arc<dyn CronHandler>,
    ) -> Result<(), ScheduleParseError> {
        let schedule = Self::parse_schedule(context.plugin_name(), name, schedule)?;
        self.insert(
            CronJobSpec {
                name: name.to_string(),
                schedule,
                handler,
            },
            context,
        )
        .await;
        Ok(())
    }

    async fn insert(&self, spec: CronJobSpec, context: PluginContext) {
        let key = CronJobKey::new(context.plugin_name(), &spec.name);
        let next_fire_at = spec.schedule.next_after(Utc::now());
        let expression = spec.schedule.expression().to_string();

        let mut jobs = self.state.jobs.write().await;
        let replaced = jobs
            .insert(
                key.clone(),
                JobEntry {
                    schedule: spec.schedule,
                    handler: spec.handler,
                    context,
                    next_fire_at,
                    paused: false,
                    last_run_at: None,
                    last_outcome: None,
                },
            )
            .is_some();

        info!(
            plugin = %key.plugin,
            job = %key.name,
            schedule = %expression,
            replaced,
            "Cron job registered"
        );
    }

    /// Installs `plugin`'s declared jobs and resumes paused ones.
    ///
    /// A job already present with the same schedule keeps its next fire
    /// time. Jobs of `plugin` missing from `specs` are removed.
    pub async fn activate_plugin(
        &self,
        plugin: &str,
        specs: &[CronJobSpec],
        context: &PluginContext,
    ) {
        let now = Utc::now();
        let mut jobs = self.state.jobs.write().await;
        jobs.retain(|key, _| key.plugin != plugin || specs.iter().any(|s| s.name == key.name));

        for spec in specs {
            let key = CronJobKey::new(plugin, &spec.name);
            let unchanged = jobs
                .get(&key)
                .is_some_and(|e| e.schedule.expression() == spec.schedule.expression());
            if unchanged {
                if let Some(entry) = jobs.get_mut(&key) {
                    entry.handler = spec.handler.clone();
                    entry.context = context.clone();
                    entry.paused = false;
                    if entry.next_fire_at.is_none_or(|at| at < now) {
                        entry.next_fire_at = entry.schedule.next_after(now);
                    }
                }
            } else {
                jobs.insert(
                    key,
                    JobEntry {
                        schedule: spec.schedule.clone(),
                        handler: spec.handler.clone(),
                        context: context.clone(),
                        next_fire_at: spec.schedule.next_after(now),
                        paused: false,
                        last_run_at: None,
                        last_outcome: None,
                    },
                );
            }
        }

        info!(plugin = %plugin, jobs = specs.len(), "Cron jobs active");
    }

    /// Pauses every job of `plugin` without unregistering it.
    pub async fn pause_plugin(&self, plugin: &str) -> usize {
        let mut jobs = self.state.jobs.write().await;
        let mut paused = 0;
        for (key, entry) in jobs.iter_mut() {
            if key.plugin == plugin {
                entry.paused = true;
                paused += 1;
            }
        }
        info!(plugin = %plugin, paused, "Cron jobs paused");
        paused
    }

    /// Removes every job of `plugin`.
    pub async fn remove_plugin(&self, plugin: &str) -> usize {
        let mut jobs = self.state.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|key, _| key.plugin != plugin);
        let removed = before - jobs.len();
        info!(plugin = %plugin, removed, "Cron jobs removed");
        removed
    }

    /// Fires every unpaused job due at `now` and advances its schedule.
    ///
    /// Returns the spawned executions so callers (and tests) can await them.
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<(CronJobKey, JoinHandle<JobOutcome>)> {
        fire_due(&self.state, now).await
    }

    /// Fires one job immediately, paused or not, under the same isolation.
    pub async fn run_now(&self, plugin: &str, name: &str) -> Option<JoinHandle<JobOutcome>> {
        let key = CronJobKey::new(plugin, name);
        let (handler, context) = {
            let jobs = self.state.jobs.read().await;
            let entry = jobs.get(&key)?;
            (entry.handler.clone(), entry.context.clone())
        };
        info!(plugin = %plugin, job = %name, "Cron job triggered manually");
        Some(execute(self.state.clone(), key, handler, context))
    }

    /// Lists jobs, optionally for one plugin, ordered by key.
    pub async fn jobs(&self, plugin: Option<&str>) -> Vec<CronJobInfo> {
        let jobs = self.state.jobs.read().await;
        let mut list: Vec<CronJobInfo> = jobs
            .iter()
            .filter(|(key, _)| plugin.is_none_or(|p| key.plugin == p))
            .map(|(key, e)| CronJobInfo {
                plugin: key.plugin.clone(),
                name: key.name.clone(),
                schedule: e.schedule.expression().to_string(),
                next_fire_at: e.next_fire_at,
                paused: e.paused,
                last_run_at: e.last_run_at,
                last_outcome: e.last_outcome.clone(),
            })
            .collect();
        list.sort_by(|a, b| (&a.plugin, &a.name).cmp(&(&b.plugin, &b.name)));
        list
    }

    /// Starts the one-second ticker.
    pub async fn start(&self) -> Result<(), AppError> {
        let mut engine = self.engine.lock().await;
        if engine.is_some() {
            return Ok(());
        }

        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {e}")))?;

        let state = Arc::clone(&self.state);
        let ticker = Job::new_async("* * * * * *", move |_uuid, _lock| {
            let state = Arc::clone(&state);
            Box::pin(async move {
                fire_due(&state, Utc::now()).await;
            })
        })
        .map_err(|e| AppError::internal(format!("Failed to create cron ticker: {e}")))?;

        scheduler
            .add(ticker)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add cron ticker: {e}")))?;
        scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {e}")))?;

        *engine = Some(scheduler);
        info!("Plugin cron scheduler started");
        Ok(())
    }

    /// Stops the ticker. Running jobs are left to finish.
    pub async fn shutdown(&self) -> Result<(), AppError> {
        let Some(mut scheduler) = self.engine.lock().await.take() else {
            return Ok(());
        };
        scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to stop scheduler: {e}")))?;
        info!("Plugin cron scheduler stopped");
        Ok(())
    }
}

async fn fire_due(
    state: &Arc<SchedulerState>,
    now: DateTime<Utc>,
) -> Vec<(CronJobKey, JoinHandle<JobOutcome>)> {
    let due: Vec<(CronJobKey, Arc<dyn CronHandler>, PluginContext)> = {
        let mut jobs = state.jobs.write().await;
        jobs.iter_mut()
            .filter(|(_, e)| !e.paused && e.next_fire_at.is_some_and(|at| at <= now))
            .map(|(key, entry)| {
                entry.next_fire_at = entry.schedule.next_after(now);
                (key.clone(), entry.handler.clone(), entry.context.clone())
            })
            .collect()
    };

    if !due.is_empty() {
        debug!(jobs = due.len(), "Cron tick firing due jobs");
    }

    due.into_iter()
        .map(|(key, handler, context)| {
            let handle = execute(state.clone(), key.clone(), handler, context);
            (key, handle)
        })
        .collect()
}

fn execute(
    state: Arc<SchedulerState>,
    key: CronJobKey,
    handler: Arc<dyn CronHandler>,
    context: PluginContext,
) -> JoinHandle<JobOutcome> {
    tokio::spawn(async move {
        let started = Utc::now();
        state.stats.record(&key.plugin, StatEvent::CronRun);

        let task = tokio::spawn(async move { handler.run(&context).await });
        let abort = task.abort_handle();

        let outcome = match tokio::time::timeout(state.job_timeout, task).await {
            Err(_) => {
                abort.abort();
                JobOutcome::TimedOut
            }
            Ok(Err(join)) if join.is_panic() => {
                JobOutcome::Panicked(panic_message(join.into_panic().as_ref()))
            }
            Ok(Err(join)) => JobOutcome::Failed(join.to_string()),
            Ok(Ok(Err(err))) => JobOutcome::Failed(err.message),
            Ok(Ok(Ok(()))) => JobOutcome::Succeeded,
        };

        let source = format!("cron:{}", key.name);
        match &outcome {
            JobOutcome::Succeeded => {
                debug!(plugin = %key.plugin, job = %key.name, "Cron job completed");
            }
            JobOutcome::TimedOut => {
                warn!(plugin = %key.plugin, job = %key.name, timeout = ?state.job_timeout, "Cron job timed out");
                state.stats.record(&key.plugin, StatEvent::CronTimedOut);
                state.log_book.append(
                    &key.plugin,
                    LogLevel::Warn,
                    format!("job '{}' timed out after {:?}", key.name, state.job_timeout),
                    Some(&source),
                );
            }
            JobOutcome::Failed(message) | JobOutcome::Panicked(message) => {
                error!(plugin = %key.plugin, job = %key.name, error = %message, "Cron job failed");
                state.stats.record(&key.plugin, StatEvent::CronFailed);
                state.log_book.append(
                    &key.plugin,
                    LogLevel::Error,
                    format!("job '{}' failed: {message}", key.name),
                    Some(&source),
                );
            }
        }

        if let Some(entry) = state.jobs.write().await.get_mut(&key) {
            entry.last_run_at = Some(started);
            entry.last_outcome = Some(outcome.clone());
        }

        outcome
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::api::context::HostServices;
    use crate::traits::cron_fn;

    fn scheduler(timeout: Duration) -> CronScheduler {
        CronScheduler::new(
            timeout,
            Arc::new(PluginLogBook::default()),
            Arc::new(PluginStats::new()),
        )
    }

    fn context(plugin: &str) -> PluginContext {
        PluginContext::new(plugin, Arc::new(HostServices::in_memory(std::env::temp_dir())))
    }

    fn counting(counter: Arc<AtomicUsize>) -> Arc<dyn CronHandler> {
        Arc::new(cron_fn(move |_ctx| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }))
    }

    #[tokio::test]
    async fn test_same_job_name_is_scoped_per_plugin() {
        let cron = scheduler(Duration::from_secs(5));
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        cron.register("x", "* * * * * *", context("a"), counting(a.clone()))
            .await
            .unwrap();
        cron.register("x", "* * * * * *", context("b"), counting(b.clone()))
            .await
            .unwrap();
        assert_eq!(cron.jobs(None).await.len(), 2);

        cron.remove_plugin("a").await;
        let fired = cron.tick(Utc::now() + chrono::Duration::seconds(2)).await;
        for (_, handle) in fired {
            assert_eq!(handle.await.unwrap(), JobOutcome::Succeeded);
        }
        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_paused_jobs_do_not_fire_until_resumed() {
        let cron = scheduler(Duration::from_secs(5));
        let runs = Arc::new(AtomicUsize::new(0));
        let spec = CronJobSpec {
            name: "sweep".to_string(),
            schedule: CronScheduler::parse_schedule("a", "sweep", "* * * * * *").unwrap(),
            handler: counting(runs.clone()),
        };
        let ctx = context("a");
        cron.activate_plugin("a", std::slice::from_ref(&spec), &ctx).await;
        cron.pause_plugin("a").await;

        let later = Utc::now() + chrono::Duration::seconds(2);
        assert!(cron.tick(later).await.is_empty());

        cron.activate_plugin("a", &[spec], &ctx).await;
        let fired = cron.tick(Utc::now() + chrono::Duration::seconds(3)).await;
        assert_eq!(fired.len(), 1);
        for (_, handle) in fired {
            handle.await.unwrap();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_and_panicking_jobs_are_contained() {
        let cron = scheduler(Duration::from_millis(50));
        let slow: Arc<dyn CronHandler> = Arc::new(cron_fn(|_ctx| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
        }));
        let panics: Arc<dyn CronHandler> =
            Arc::new(cron_fn(|_ctx| Box::pin(async { panic!("cron exploded") })));
        cron.register("slow", "0 0 * * *", context("a"), slow).await.unwrap();
        cron.register("bad", "0 0 * * *", context("a"), panics).await.unwrap();

        let slow = cron.run_now("a", "slow").await.unwrap().await.unwrap();
        assert_eq!(slow, JobOutcome::TimedOut);
        match cron.run_now("a", "bad").await.unwrap().await.unwrap() {
            JobOutcome::Panicked(message) => assert!(message.contains("cron exploded")),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(cron.run_now("a", "missing").await.is_none());

        let info = cron.jobs(Some("a")).await;
        assert_eq!(info[0].name, "bad");
        assert!(info[0].last_run_at.is_some());
    }

    #[tokio::test]
    async fn test_schedules_fire_independently() {
        use chrono::Timelike;

        let cron = scheduler(Duration::from_secs(5));
        let fast = Arc::new(AtomicUsize::new(0));
        let hourly = Arc::new(AtomicUsize::new(0));
        cron.register("poll", "*/5 * * * *", context("feeds"), counting(fast.clone()))
            .await
            .unwrap();
        cron.register("digest", "0 * * * *", context("mailer"), counting(hourly.clone()))
            .await
            .unwrap();

        // Two hours of five-minute ticks.
        let every_five = CronSchedule::parse("*/5 * * * *").unwrap();
        let mut at = every_five.next_after(Utc::now()).unwrap();
        for _ in 0..24 {
            let fired = cron.tick(at).await;
            let mut plugins: Vec<String> = fired.iter().map(|(k, _)| k.plugin.clone()).collect();
            plugins.sort();
            if at.minute() == 0 {
                assert_eq!(plugins, vec!["feeds", "mailer"], "at {at}");
            } else {
                assert_eq!(plugins, vec!["feeds"], "at {at}");
            }
            for (_, handle) in fired {
                assert_eq!(handle.await.unwrap(), JobOutcome::Succeeded);
            }
            at += chrono::Duration::minutes(5);
        }

        assert_eq!(fast.load(Ordering::SeqCst), 24);
        assert_eq!(hourly.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invalid_schedule_names_the_job() {
        let err = CronScheduler::parse_schedule("a", "nightly", "61 * * * *").unwrap_err();
        assert_eq!(err.job, "nightly");
        assert_eq!(err.plugin, "a");
    }
}
