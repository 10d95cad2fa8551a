//! The scheduling engine: startup reconciliation, the periodic scan
//! loop, and one-shot job dispatch into the automation workflow.

pub mod dispatch;
pub mod workflow;

use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::api::reschedule::models::{LogState, ScheduleStatus};
use crate::api::subject::models::SubjectStatus;
use crate::config::Config;
use crate::db::models::ReScheduleRow;
use crate::db::re_schedule_repository::ReScheduleRepository;
use crate::db::subject_repository::SubjectRepository;
use crate::notify::Notifier;
use crate::portal::verify::{verify_credentials, CredentialCheck};
use crate::security::Secrets;
use dispatch::DispatchMap;
use workflow::log_job;

/// Bounded page of SCHEDULED rows loaded during startup reconciliation
const RECONCILE_PAGE: i64 = 500;

/// Bounded page of PENDING rows considered per scan tick
const SCAN_PAGE: i64 = 100;

/// Injectable time source; `fixed` exists for deterministic tests
#[derive(Clone)]
pub struct Clock(Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>);

impl Clock {
    pub fn system() -> Self {
        Self(Arc::new(Utc::now))
    }

    #[allow(dead_code)]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self(Arc::new(move || at))
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.0)()
    }
}

pub(crate) struct EngineInner {
    pub pool: Pool<Postgres>,
    pub config: Arc<Config>,
    pub secrets: Arc<Secrets>,
    pub dispatch: DispatchMap,
    pub notifier: Notifier,
    pub clock: Clock,
}

/// Handle to the scheduling engine.
///
/// Explicitly constructed at the composition root and passed around by
/// clone; there is no global instance.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn new(pool: Pool<Postgres>, config: Arc<Config>, secrets: Arc<Secrets>, clock: Clock) -> Self {
        let notifier = Notifier::new(config.pushover_token.clone(), config.pushover_user.clone());
        Self {
            inner: Arc::new(EngineInner {
                pool,
                config,
                secrets,
                dispatch: DispatchMap::new(),
                notifier,
                clock,
            }),
        }
    }

    /// Recover jobs left in SCHEDULED by a previous process.
    ///
    /// A crash loses the in-memory timers, so on start every SCHEDULED
    /// job either gets failed as overdue or re-verified and re-armed.
    pub async fn reconcile_on_startup(&self) {
        let jobs = match ReScheduleRepository::list_by_status(
            &self.inner.pool,
            ScheduleStatus::Scheduled,
            RECONCILE_PAGE,
        )
        .await
        {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("Startup reconciliation could not load SCHEDULED jobs: {:?}", e);
                return;
            }
        };

        info!("Reconciling {} SCHEDULED re-schedules", jobs.len());
        for job in jobs {
            let now = self.inner.clock.now();
            if job.start_datetime <= now {
                warn!("Re-schedule {} is overdue, failing it", job.id);
                if let Err(e) = ReScheduleRepository::mark(
                    &self.inner.pool,
                    job.id,
                    ScheduleStatus::Failed,
                    Some("Re-schedule process could not be completed and is now overdue"),
                    None,
                )
                .await
                {
                    error!("Could not mark re-schedule {} overdue: {:?}", job.id, e);
                }
                continue;
            }

            // Credential verification talks to the portal; run it off the
            // reconciliation path so one slow login never delays the rest
            let engine = self.clone();
            tokio::spawn(async move { engine.verify_and_schedule(job).await });
        }
    }

    /// Verify the subject's credentials, then arm the one-shot dispatch
    /// at the job's start time
    async fn verify_and_schedule(&self, job: ReScheduleRow) {
        let pool = &self.inner.pool;

        let subject = match SubjectRepository::get_with_credentials(pool, job.subject_id).await {
            Ok(Some(subject)) => subject,
            Ok(None) => {
                warn!("Subject {} for re-schedule {} not found", job.subject_id, job.id);
                self.fail_job(job.id, "Subject no longer exists").await;
                return;
            }
            Err(e) => {
                error!("Could not load subject for re-schedule {}: {:?}", job.id, e);
                return;
            }
        };

        let password = match self.inner.secrets.decrypt_password(&subject.password) {
            Ok(password) => password,
            Err(e) => {
                self.fail_job(job.id, &e).await;
                log_job(pool, job.id, LogState::Error, &e).await;
                return;
            }
        };

        let check = verify_credentials(
            &self.inner.config.webdriver_url,
            &self.inner.config.portal_base_url,
            &subject.email,
            &password,
            Duration::from_secs(self.inner.config.login_wait_secs),
        )
        .await;

        match check {
            CredentialCheck::Failed { error } => {
                warn!("Credential check failed for re-schedule {}: {}", job.id, error);
                log_job(pool, job.id, LogState::Error, "Attempt to login failed").await;
                self.fail_job(job.id, "Failed to login with current credentials").await;
                if let Err(e) =
                    SubjectRepository::update_status(pool, subject.id, SubjectStatus::LoginPending.as_str())
                        .await
                {
                    error!("Could not demote subject {}: {:?}", subject.id, e);
                }
            }
            check => {
                if let CredentialCheck::Verified { schedule_number } = &check {
                    if subject.schedule_number.as_deref() != Some(schedule_number) {
                        if let Err(e) =
                            SubjectRepository::update_schedule_number(pool, subject.id, schedule_number)
                                .await
                        {
                            error!("Could not persist schedule number for subject {}: {:?}", subject.id, e);
                        }
                    }
                }
                if self.dispatch_at(job.id, job.start_datetime) {
                    info!("Re-schedule {} armed for {}", job.id, job.start_datetime);
                }
            }
        }
    }

    /// Spawn the periodic scan loop. Stops when the shutdown channel
    /// flips; individual scan failures are logged and never kill it.
    pub fn spawn_scan_loop(&self, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let period = Duration::from_secs(engine.inner.config.scan_interval_secs);
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!("Scan loop started with interval {:?}", period);

            loop {
                tokio::select! {
                    _ = ticker.tick() => engine.scan().await,
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Scan loop stopping");
                            break;
                        }
                    }
                }
            }
        })
    }

    /// One scan pass: pick up PENDING jobs whose window has opened and
    /// dispatch each exactly once
    async fn scan(&self) {
        let pending = match ReScheduleRepository::list_by_status(
            &self.inner.pool,
            ScheduleStatus::Pending,
            SCAN_PAGE,
        )
        .await
        {
            Ok(pending) => pending,
            Err(e) => {
                error!("Scan could not list PENDING re-schedules: {:?}", e);
                return;
            }
        };

        let now = self.inner.clock.now();
        let due: Vec<_> = pending
            .into_iter()
            .filter(|job| job.start_datetime <= now)
            .collect();

        if due.is_empty() {
            return;
        }
        info!("Scan found {} due re-schedules", due.len());

        for job in due {
            // Admission through the dispatch map; a duplicate id is a
            // no-op, so a tick racing the status transition cannot
            // dispatch the same job twice
            if !self.dispatch_at(job.id, now) {
                continue;
            }

            match ReScheduleRepository::transition(
                &self.inner.pool,
                job.id,
                ScheduleStatus::Pending,
                ScheduleStatus::Scheduled,
            )
            .await
            {
                Ok(true) => info!("Re-schedule {} moved to SCHEDULED", job.id),
                Ok(false) => warn!(
                    "Re-schedule {} changed status under the scan, leaving it to the workflow",
                    job.id
                ),
                // The dispatch entry stays; if the workflow cannot take
                // the job it exits cleanly and the next scan retries
                Err(e) => error!("Could not advance re-schedule {}: {:?}", job.id, e),
            }
        }
    }

    /// Register the one-shot dispatch that runs the automation workflow
    fn dispatch_at(&self, id: i32, run_at: DateTime<Utc>) -> bool {
        let inner = self.inner.clone();
        let now = self.inner.clock.now();
        self.inner.dispatch.schedule(id, run_at, now, move |cancel| async move {
            workflow::process(inner.clone(), id, cancel).await;
            inner.dispatch.remove(id);
        })
    }

    /// Cancel a job's dispatch entry (job deletion, external failure).
    /// An already-running workflow only gets the cooperative signal.
    pub fn cancel_dispatch(&self, id: i32) {
        self.inner.dispatch.cancel(id);
    }

    /// Re-run the credential check for a subject on demand, persisting
    /// the discovered schedule number and the resulting subject status.
    /// Returns None when the subject does not exist.
    pub async fn verify_subject(
        &self,
        subject_id: i32,
    ) -> Result<Option<CredentialCheck>, sqlx::Error> {
        let pool = &self.inner.pool;
        let Some(subject) = SubjectRepository::get_with_credentials(pool, subject_id).await? else {
            return Ok(None);
        };

        let password = match self.inner.secrets.decrypt_password(&subject.password) {
            Ok(password) => password,
            Err(error) => return Ok(Some(CredentialCheck::Failed { error })),
        };

        let check = verify_credentials(
            &self.inner.config.webdriver_url,
            &self.inner.config.portal_base_url,
            &subject.email,
            &password,
            Duration::from_secs(self.inner.config.login_wait_secs),
        )
        .await;

        match &check {
            CredentialCheck::Verified { schedule_number } => {
                SubjectRepository::update_schedule_number(pool, subject_id, schedule_number).await?;
                SubjectRepository::update_status(pool, subject_id, SubjectStatus::Active.as_str())
                    .await?;
            }
            CredentialCheck::VerifiedWithoutSchedule => {
                SubjectRepository::update_status(pool, subject_id, SubjectStatus::Active.as_str())
                    .await?;
            }
            CredentialCheck::Failed { .. } => {
                SubjectRepository::update_status(
                    pool,
                    subject_id,
                    SubjectStatus::LoginPending.as_str(),
                )
                .await?;
            }
        }
        Ok(Some(check))
    }

    async fn fail_job(&self, id: i32, error: &str) {
        if let Err(e) = ReScheduleRepository::mark(
            &self.inner.pool,
            id,
            ScheduleStatus::Failed,
            Some(error),
            None,
        )
        .await
        {
            error!("Could not mark re-schedule {} FAILED: {:?}", id, e);
        }
    }
}
