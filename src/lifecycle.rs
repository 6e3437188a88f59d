use chrono::Utc;
use rocket::tokio::{task, time};
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument, warn};

use crate::config::{PublishPolicy, SchedulerConfig};
use crate::db::{self, GenerationInput, NewSchedule};
use crate::engine::{
    self, ALGORITHM_VERSION, CoverageWarning, EngineOptions, GenerationOutcome, OverTargetNotice,
};
use crate::error::AppError;
use crate::models::{Assignment, Schedule, ScheduleId, ScheduleStatus, WorkerId, WorkerShift};
use crate::validation::validate_semester;

/// A freshly persisted draft together with what the engine reported while building it.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedSchedule {
    pub schedule: Schedule,
    pub assignments: Vec<Assignment>,
    pub warnings: Vec<CoverageWarning>,
    pub over_target: Vec<OverTargetNotice>,
}

/// Runs the engine for `semester` and stores the result as a new draft.
///
/// The engine works on a snapshot loaded before it starts and runs on the blocking pool,
/// bounded by the configured generation timeout. Nothing is written unless the engine
/// finishes in time; the schedule, its assignments and its warnings are then written in
/// a single transaction.
#[instrument(skip(pool, config))]
pub async fn create_schedule(
    pool: &Pool<Sqlite>,
    config: &SchedulerConfig,
    semester: &str,
    generated_by: Option<WorkerId>,
    notes: Option<String>,
) -> Result<GeneratedSchedule, AppError> {
    create_schedule_with(pool, config, semester, generated_by, notes, |semester, input, options| {
        engine::generate(
            semester,
            &input.shifts,
            &input.availability,
            &input.workers,
            options,
        )
    })
    .await
}

/// [`create_schedule`] with the proposal step supplied by the caller.
pub(crate) async fn create_schedule_with<F>(
    pool: &Pool<Sqlite>,
    config: &SchedulerConfig,
    semester: &str,
    generated_by: Option<WorkerId>,
    notes: Option<String>,
    propose: F,
) -> Result<GeneratedSchedule, AppError>
where
    F: FnOnce(&str, &GenerationInput, &EngineOptions) -> Result<GenerationOutcome, AppError>
        + Send
        + 'static,
{
    let semester = validate_semester(semester)?;
    let input = db::load_generation_input(pool, &semester).await?;
    let options = config.engine_options();

    let engine_semester = semester.clone();
    let run = task::spawn_blocking(move || propose(&engine_semester, &input, &options));

    let outcome = match time::timeout(config.generation_timeout, run).await {
        Ok(joined) => joined??,
        Err(_) => {
            warn!(
                timeout_secs = config.generation_timeout.as_secs_f64(),
                "Schedule generation exceeded its time limit"
            );
            return Err(AppError::Timeout(format!(
                "Schedule generation for '{}' did not finish within {:?}",
                semester, config.generation_timeout
            )));
        }
    };

    let new_schedule = NewSchedule {
        semester: semester.clone(),
        created_at: Utc::now(),
        generated_by,
        algorithm_version: ALGORITHM_VERSION.to_string(),
        notes,
    };

    let (schedule, assignments) =
        db::insert_generated_schedule(pool, &new_schedule, &outcome).await?;

    info!(
        schedule_id = schedule.id,
        assignments = assignments.len(),
        warnings = outcome.warnings.len(),
        "Draft schedule created"
    );

    Ok(GeneratedSchedule {
        schedule,
        assignments,
        warnings: outcome.warnings,
        over_target: outcome.over_target,
    })
}

/// Moves a draft to published. Published is terminal, so a second call fails with
/// [`AppError::InvalidState`] and leaves the original `published_at` untouched.
#[instrument(skip(pool))]
pub async fn publish_schedule(
    pool: &Pool<Sqlite>,
    policy: PublishPolicy,
    id: ScheduleId,
) -> Result<Schedule, AppError> {
    let exclusive = policy == PublishPolicy::Exclusive;

    if db::mark_schedule_published(pool, id, Utc::now(), exclusive).await? {
        let schedule = db::get_schedule(pool, id).await?;
        info!(schedule_id = id, semester = %schedule.semester, "Schedule published");
        return Ok(schedule);
    }

    // The compare-and-set did nothing; work out why.
    let schedule = db::get_schedule(pool, id).await?;
    if schedule.status == ScheduleStatus::Published {
        return Err(AppError::InvalidState(format!(
            "Schedule {} is already {}",
            id, schedule.status
        )));
    }

    Err(AppError::InvalidState(format!(
        "Another schedule for '{}' is already published",
        schedule.semester
    )))
}

#[instrument(skip(pool))]
pub async fn delete_schedule(pool: &Pool<Sqlite>, id: ScheduleId) -> Result<(), AppError> {
    if db::delete_schedule(pool, id).await? {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("Schedule with id {} not found", id)))
    }
}

pub async fn get_schedule(pool: &Pool<Sqlite>, id: ScheduleId) -> Result<Schedule, AppError> {
    db::get_schedule(pool, id).await
}

pub async fn list_schedules(
    pool: &Pool<Sqlite>,
    semester: Option<&str>,
) -> Result<Vec<Schedule>, AppError> {
    let semester = semester.map(validate_semester).transpose()?;
    db::list_schedules(pool, semester.as_deref()).await
}

/// Administrative view of a schedule's assignments, regardless of status.
pub async fn schedule_assignments(
    pool: &Pool<Sqlite>,
    id: ScheduleId,
) -> Result<Vec<Assignment>, AppError> {
    db::get_schedule(pool, id).await?;
    db::get_schedule_assignments(pool, id).await
}

pub async fn schedule_warnings(
    pool: &Pool<Sqlite>,
    id: ScheduleId,
) -> Result<Vec<CoverageWarning>, AppError> {
    db::get_schedule(pool, id).await?;
    db::get_schedule_warnings(pool, id).await
}

/// What a worker sees for a semester: assignments of published schedules only.
pub async fn worker_schedule(
    pool: &Pool<Sqlite>,
    worker_id: WorkerId,
    semester: &str,
) -> Result<Vec<WorkerShift>, AppError> {
    let semester = validate_semester(semester)?;
    db::get_published_worker_shifts(pool, worker_id, &semester).await
}
