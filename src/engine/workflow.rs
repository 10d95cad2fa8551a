//! One job execution: log in through the browser, bridge the cookies,
//! and poll the portal for an acceptable slot until the window closes.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::api::reschedule::models::{LogState, ScheduleStatus};
use crate::api::subject::models::SubjectStatus;
use crate::db::log_repository::LogRepository;
use crate::db::models::{ReScheduleRow, SubjectRow};
use crate::db::re_schedule_repository::ReScheduleRepository;
use crate::db::subject_repository::SubjectRepository;
use crate::portal::bridge::PortalHttp;
use crate::portal::selector::{select_date, select_time, SelectionError};
use crate::portal::submit::{submit, RescheduleForm};
use crate::portal::webdriver::BrowserSession;
use crate::portal::PortalError;

use super::dispatch::CancelFlag;
use super::EngineInner;

use sqlx::{Pool, Postgres};

/// How often and how long to retry taking the job when the dispatch
/// entry beat the SCHEDULED transition to the database
const TAKE_RETRIES: u32 = 5;
const TAKE_RETRY_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub(crate) enum WorkflowError {
    /// Deterministic configuration problem; never retried
    #[error("{0}")]
    Validation(String),

    /// The portal rejected or timed out the login
    #[error("login failed: {0}")]
    Auth(String),

    #[error(transparent)]
    Portal(#[from] PortalError),

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Run one re-schedule job to a terminal status.
///
/// Every outcome path releases the browser session; unclassified errors
/// are caught here, logged, and fail the job.
pub(crate) async fn process(inner: Arc<EngineInner>, id: i32, cancel: CancelFlag) {
    let pool = inner.pool.clone();

    if !take_job(&pool, id).await {
        return;
    }

    let job = match ReScheduleRepository::get(&pool, id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            warn!("Re-schedule {} vanished before processing", id);
            return;
        }
        Err(e) => {
            error!("Could not load re-schedule {}: {:?}", id, e);
            return;
        }
    };

    info!("Processing re-schedule {}", id);

    let mut session: Option<BrowserSession> = None;
    let result = run(&inner, &job, &cancel, &mut session).await;

    // Guaranteed cleanup: the remote browser is released no matter how
    // the workflow ended
    if let Some(browser) = session.take() {
        if let Err(e) = browser.close().await {
            warn!("Could not close browser session for re-schedule {}: {}", id, e);
        }
    }

    match result {
        Ok(()) => {}
        Err(WorkflowError::Auth(message)) => {
            warn!("Re-schedule {} login failed: {}", id, message);
            log_job(&pool, id, LogState::Error, &message).await;
            fail(&inner, id, &message).await;
            if let Err(e) = SubjectRepository::update_status(
                &pool,
                job.subject_id,
                SubjectStatus::LoginPending.as_str(),
            )
            .await
            {
                error!("Could not demote subject {}: {:?}", job.subject_id, e);
            }
        }
        Err(e) => {
            let message = e.to_string();
            error!("Re-schedule {} failed: {}", id, message);
            log_job(&pool, id, LogState::Error, &message).await;
            fail(&inner, id, &message).await;
        }
    }
}

/// Move the job SCHEDULED -> PROCESSING, retrying briefly because the
/// scan registers the dispatch entry before the SCHEDULED update lands
async fn take_job(pool: &Pool<Postgres>, id: i32) -> bool {
    for attempt in 0..TAKE_RETRIES {
        match ReScheduleRepository::transition(
            pool,
            id,
            ScheduleStatus::Scheduled,
            ScheduleStatus::Processing,
        )
        .await
        {
            Ok(true) => return true,
            Ok(false) if attempt + 1 < TAKE_RETRIES => sleep(TAKE_RETRY_DELAY).await,
            Ok(false) => {}
            Err(e) => {
                error!("Could not take re-schedule {}: {:?}", id, e);
                return false;
            }
        }
    }
    warn!("Re-schedule {} is not in SCHEDULED status, skipping dispatch", id);
    false
}

async fn run(
    inner: &Arc<EngineInner>,
    job: &ReScheduleRow,
    cancel: &CancelFlag,
    session: &mut Option<BrowserSession>,
) -> Result<(), WorkflowError> {
    let pool = &inner.pool;
    let config = &inner.config;

    let subject = load_subject(inner, job).await?;
    let password = inner
        .secrets
        .decrypt_password(&subject.password)
        .map_err(WorkflowError::Validation)?;
    let Some(schedule_number) = subject.schedule_number.as_deref() else {
        return Err(WorkflowError::Validation(
            "Subject email, password or schedule number missing".to_string(),
        ));
    };
    if subject.min_date.is_none() && subject.max_date.is_none() {
        return Err(WorkflowError::Validation(
            "Subject has no date boundaries configured".to_string(),
        ));
    }

    let base = config.portal_base_url.as_str();
    let facility = config.facility_id.as_str();
    let login_url = format!("{base}/users/sign_in");
    let appointment_url = format!("{base}/schedule/{schedule_number}/appointment");
    let days_url = format!(
        "{base}/schedule/{schedule_number}/appointment/days/{facility}.json?appointments[expedite]=false"
    );

    let browser = session.insert(BrowserSession::open(&config.webdriver_url).await?);

    log_job(pool, job.id, LogState::Info, "Trying to login to the portal").await;
    browser
        .login(
            &login_url,
            &subject.email,
            &password,
            Duration::from_secs(config.login_wait_secs),
        )
        .await
        .map_err(|e| match e {
            PortalError::WaitTimeout(_) => WorkflowError::Auth(
                "Login did not reach the post-login page in time".to_string(),
            ),
            other => WorkflowError::Portal(other),
        })?;
    log_job(pool, job.id, LogState::Info, "Login successful").await;

    log_job(pool, job.id, LogState::Info, "Redirecting to the appointment page").await;
    browser.goto(&appointment_url).await?;
    acknowledge_interstitial(browser, pool, job.id).await?;

    // Authenticate once, poll cheaply: everything past this point goes
    // through the cookie bridge instead of the browser
    let form = RescheduleForm::scrape(browser).await?;
    let bridge = PortalHttp::from_browser(browser, &appointment_url).await?;

    let deadline = job.end_datetime;
    let poll_interval = Duration::from_secs(config.poll_interval_secs);
    let mut date_found = false;

    loop {
        if cancel.is_cancelled() {
            info!("Re-schedule {} observed cancellation, stopping", job.id);
            log_job(pool, job.id, LogState::Warning, "Processing cancelled").await;
            return Ok(());
        }
        // The deadline is only consulted between passes; a pass that is
        // underway always completes
        if inner.clock.now() > deadline {
            break;
        }

        sleep(poll_interval).await;

        let dates = match bridge.available_dates(&days_url).await {
            Ok(dates) => dates,
            Err(e) => {
                log_job(pool, job.id, LogState::Error, &format!("Date poll failed: {}", e)).await;
                continue;
            }
        };
        if dates.is_empty() {
            record_miss(pool, job.id, "No dates available").await;
            continue;
        }
        log_job(
            pool,
            job.id,
            LogState::Info,
            &format!("Earliest date available: {}", dates[0]),
        )
        .await;

        let chosen_date = match select_date(&dates, subject.min_date, subject.max_date) {
            Ok(Some(date)) => date,
            Ok(None) => {
                record_miss(pool, job.id, "No suitable date found").await;
                continue;
            }
            Err(SelectionError::MissingBounds) => {
                return Err(WorkflowError::Validation(
                    "Subject has no date boundaries configured".to_string(),
                ));
            }
        };
        date_found = true;

        let times_url = format!(
            "{base}/schedule/{schedule_number}/appointment/times/{facility}.json?date={chosen_date}&appointments[expedite]=false"
        );
        let times = match bridge.available_times(&times_url).await {
            Ok(times) => times,
            Err(e) => {
                log_job(pool, job.id, LogState::Error, &format!("Time poll failed: {}", e)).await;
                continue;
            }
        };
        let Some(time_slot) = select_time(&times) else {
            record_miss(pool, job.id, "No suitable time found").await;
            continue;
        };

        log_job(
            pool,
            job.id,
            LogState::Info,
            &format!("Performing reschedule for {} at {}", chosen_date, time_slot),
        )
        .await;

        match submit(&bridge, &appointment_url, &form, facility, chosen_date, time_slot).await {
            Ok(true) => {
                let now = inner.clock.now();
                ReScheduleRepository::mark(
                    pool,
                    job.id,
                    ScheduleStatus::Completed,
                    None,
                    Some(now),
                )
                .await?;
                log_job(pool, job.id, LogState::Success, "Reschedule performed successfully")
                    .await;
                inner
                    .notifier
                    .send(&format!(
                        "Successfully rescheduled {} {} for {} at {}",
                        subject.name, subject.last_name, chosen_date, time_slot
                    ))
                    .await;
                info!("Re-schedule {} completed: {} {}", job.id, chosen_date, time_slot);
                return Ok(());
            }
            Ok(false) => {
                log_job(
                    pool,
                    job.id,
                    LogState::Error,
                    "Submission was not accepted, will retry",
                )
                .await;
            }
            Err(e) => {
                log_job(pool, job.id, LogState::Error, &format!("Submission failed: {}", e))
                    .await;
            }
        }
    }

    // Window elapsed without a completed claim
    let message = if date_found {
        "Window elapsed before a submission was accepted"
    } else {
        "No suitable date found within the window"
    };
    ReScheduleRepository::mark(
        pool,
        job.id,
        ScheduleStatus::NotFound,
        Some(message),
        Some(inner.clock.now()),
    )
    .await?;
    log_job(pool, job.id, LogState::Error, message).await;
    info!("Re-schedule {} closed as NOT_FOUND", job.id);
    Ok(())
}

async fn load_subject(
    inner: &Arc<EngineInner>,
    job: &ReScheduleRow,
) -> Result<SubjectRow, WorkflowError> {
    let subject = SubjectRepository::get_with_credentials(&inner.pool, job.subject_id)
        .await?
        .ok_or_else(|| {
            WorkflowError::Validation(format!("Subject {} not found", job.subject_id))
        })?;
    if subject.email.is_empty() || subject.password.is_empty() {
        return Err(WorkflowError::Validation(
            "Subject email, password or schedule number missing".to_string(),
        ));
    }
    Ok(subject)
}

/// The portal shows a one-time confirmation notice on the first visit to
/// the appointment page; tick it and move on
async fn acknowledge_interstitial(
    browser: &BrowserSession,
    pool: &Pool<Postgres>,
    job_id: i32,
) -> Result<(), PortalError> {
    if browser.try_find("[name='confirmed_limit_message']").await?.is_none() {
        return Ok(());
    }

    log_job(pool, job_id, LogState::Info, "Acknowledging confirmation notice").await;
    if let Some(checkbox) = browser.try_find(".icheckbox").await? {
        checkbox.click().await?;
        sleep(Duration::from_secs(2)).await;
    }
    if let Some(commit) = browser.try_find("[name='commit']").await? {
        commit.click().await?;
    }
    Ok(())
}

/// Record a per-tick miss on the job row and in its log
async fn record_miss(pool: &Pool<Postgres>, id: i32, message: &str) {
    info!("Re-schedule {}: {}", id, message);
    if let Err(e) = ReScheduleRepository::set_error(pool, id, message).await {
        error!("Could not record error for re-schedule {}: {:?}", id, e);
    }
    log_job(pool, id, LogState::Error, message).await;
}

/// Best-effort append to the job log. A failing log sink is reported to
/// tracing and nowhere else, so it can never recurse or take down a
/// workflow.
pub(crate) async fn log_job(pool: &Pool<Postgres>, id: i32, state: LogState, content: &str) {
    if let Err(e) = LogRepository::append(pool, id, state, content).await {
        error!("Could not append log for re-schedule {}: {:?}", id, e);
    }
}

async fn fail(inner: &Arc<EngineInner>, id: i32, error: &str) {
    if let Err(e) = ReScheduleRepository::mark(
        &inner.pool,
        id,
        ScheduleStatus::Failed,
        Some(error),
        Some(inner.clock.now()),
    )
    .await
    {
        error!("Could not mark re-schedule {} FAILED: {:?}", id, e);
    }
}
