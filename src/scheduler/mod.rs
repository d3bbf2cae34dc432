//! Background jobs: periodic vehicle updates and daily history cleanup.

use crate::config::{SchedulerConfig, MAX_UPDATE_INTERVAL_MINUTES};
use crate::service::{ChargingService, StatusSnapshot};
use crate::sources::SourceResult;
use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub const UPDATE_JOB_ID: &str = "update_vehicles";
pub const CLEANUP_JOB_ID: &str = "daily_cleanup";

/// One scheduled job, as reported by `/api/scheduler`
#[derive(Clone, Debug, Serialize)]
pub struct JobInfo {
    pub id: String,
    pub name: String,
    pub next_run_time: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub update_interval_minutes: u64,
    pub next_run_time: Option<DateTime<Utc>>,
    pub jobs: Vec<JobInfo>,
}

#[derive(Clone, Copy, Debug, Default)]
struct NextRuns {
    update: Option<DateTime<Utc>>,
    cleanup: Option<DateTime<Utc>>,
}

pub struct ChargingScheduler {
    service: Arc<ChargingService>,
    config: SchedulerConfig,
    handles: Mutex<Vec<JoinHandle<()>>>,
    next_runs: Arc<RwLock<NextRuns>>,
}

impl ChargingScheduler {
    pub fn new(service: Arc<ChargingService>, config: SchedulerConfig) -> Self {
        Self {
            service,
            config,
            handles: Mutex::new(Vec::new()),
            next_runs: Arc::new(RwLock::new(NextRuns::default())),
        }
    }

    fn update_period(&self) -> Duration {
        let minutes = self
            .config
            .update_interval_minutes
            .clamp(1, MAX_UPDATE_INTERVAL_MINUTES);
        Duration::from_secs(minutes * 60)
    }

    /// Spawn both jobs. The first vehicle update runs immediately.
    pub fn start(&self) {
        let mut handles = self.handles.lock().expect("Scheduler lock poisoned");
        if !handles.is_empty() {
            warn!("Scheduler already running");
            return;
        }

        handles.push(self.spawn_update_job());
        handles.push(self.spawn_cleanup_job());

        info!(
            update_interval_minutes = self.config.update_interval_minutes,
            cleanup_hour = self.config.cleanup_hour,
            "Scheduler started"
        );
    }

    fn spawn_update_job(&self) -> JoinHandle<()> {
        let service = Arc::clone(&self.service);
        let next_runs = Arc::clone(&self.next_runs);
        let period = self.update_period();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let next = chrono::Duration::from_std(period)
                    .ok()
                    .map(|p| Utc::now() + p);
                next_runs.write().expect("NextRuns lock poisoned").update = next;

                // Failures are logged and reported by the service
                if let Err(e) = service.update_cycle().await {
                    debug!(error = %e, "Scheduled update failed");
                }
            }
        })
    }

    fn spawn_cleanup_job(&self) -> JoinHandle<()> {
        let service = Arc::clone(&self.service);
        let next_runs = Arc::clone(&self.next_runs);
        let hour = self.config.cleanup_hour;
        let retention_days = self.config.retention_days;

        tokio::spawn(async move {
            loop {
                let now = Local::now().naive_local();
                let next = next_daily_run(now, hour);
                let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

                next_runs.write().expect("NextRuns lock poisoned").cleanup = Local
                    .from_local_datetime(&next)
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc));

                tokio::time::sleep(wait).await;

                info!(retention_days = retention_days, "Running database cleanup");
                match service.cleanup_old_data(retention_days) {
                    Ok(removed) => info!(removed = removed, "Database cleanup completed"),
                    Err(e) => error!(error = %e, "Database cleanup failed"),
                }
            }
        })
    }

    /// Abort both jobs. In-flight cycles are cancelled.
    pub fn stop(&self) {
        let mut handles = self.handles.lock().expect("Scheduler lock poisoned");
        if handles.is_empty() {
            warn!("Scheduler not running");
            return;
        }

        for handle in handles.drain(..) {
            handle.abort();
        }
        *self.next_runs.write().expect("NextRuns lock poisoned") = NextRuns::default();

        info!("Scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.handles.lock().expect("Scheduler lock poisoned").is_empty()
    }

    /// Run one update cycle now, outside the schedule
    pub async fn trigger_manual_update(&self) -> SourceResult<StatusSnapshot> {
        info!("Manual update triggered");
        self.service.update_cycle().await
    }

    /// When the next periodic update is due, if running
    pub fn next_run_time(&self) -> Option<DateTime<Utc>> {
        if !self.is_running() {
            return None;
        }
        self.next_runs.read().expect("NextRuns lock poisoned").update
    }

    pub fn status(&self) -> SchedulerStatus {
        let is_running = self.is_running();
        let next = *self.next_runs.read().expect("NextRuns lock poisoned");

        let jobs = if is_running {
            vec![
                JobInfo {
                    id: UPDATE_JOB_ID.to_string(),
                    name: "Update vehicle data".to_string(),
                    next_run_time: next.update,
                },
                JobInfo {
                    id: CLEANUP_JOB_ID.to_string(),
                    name: "Daily database cleanup".to_string(),
                    next_run_time: next.cleanup,
                },
            ]
        } else {
            Vec::new()
        };

        SchedulerStatus {
            is_running,
            update_interval_minutes: self.config.update_interval_minutes,
            next_run_time: if is_running { next.update } else { None },
            jobs,
        }
    }
}

impl Drop for ChargingScheduler {
    fn drop(&mut self) {
        if let Ok(mut handles) = self.handles.lock() {
            for handle in handles.drain(..) {
                handle.abort();
            }
        }
    }
}

/// Next occurrence of `hour:00` strictly after `now`
pub fn next_daily_run(now: NaiveDateTime, hour: u32) -> NaiveDateTime {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date().and_time(at);
    if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    }
}
