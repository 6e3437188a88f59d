use chrono::{DateTime, NaiveTime, Utc};
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument, warn};

use crate::auth::Role;
use crate::database::CONSTRAINT_MARKER;
use crate::engine::{CoverageWarning, GenerationOutcome};
use crate::error::AppError;
use crate::models::{
    Assignment, Availability, DbAssignment, DbAvailability, DbSchedule, DbShift, DbWorker,
    PreferenceRank, Schedule, ScheduleId, ScheduleStatus, Shift, ShiftId, ShiftType, Worker,
    WorkerId, WorkerShift, collect_rows,
};

const WORKER_COLUMNS: &str = "id, display_name, role, active, desired_weekly_hours";
const SHIFT_COLUMNS: &str =
    "id, day_of_week, start_time, end_time, shift_type, required_workers, active";
const SCHEDULE_COLUMNS: &str =
    "id, semester, status, created_at, published_at, generated_by, algorithm_version, notes";

/// Turns trigger and uniqueness failures into [`AppError::ConstraintViolation`].
fn map_write_error(err: sqlx::Error) -> AppError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() || db_err.message().contains(CONSTRAINT_MARKER) {
            return AppError::ConstraintViolation(db_err.message().to_string());
        }
    }
    AppError::Database(err)
}

// Workers

#[instrument(skip(pool))]
pub async fn create_worker(
    pool: &Pool<Sqlite>,
    display_name: &str,
    role: Role,
    desired_weekly_hours: Option<u32>,
) -> Result<WorkerId, AppError> {
    info!("Creating worker");
    let res = sqlx::query(
        "INSERT INTO workers (display_name, role, desired_weekly_hours) VALUES (?, ?, ?)",
    )
    .bind(display_name)
    .bind(role.as_str())
    .bind(desired_weekly_hours)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn find_worker(pool: &Pool<Sqlite>, id: WorkerId) -> Result<Option<Worker>, AppError> {
    let row = sqlx::query_as::<_, DbWorker>(&format!(
        "SELECT {} FROM workers WHERE id = ?",
        WORKER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(Worker::try_from).transpose()
}

#[instrument(skip(pool))]
pub async fn get_worker(pool: &Pool<Sqlite>, id: WorkerId) -> Result<Worker, AppError> {
    find_worker(pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Worker with id {} not found", id)))
}

#[instrument(skip(pool))]
pub async fn list_workers(
    pool: &Pool<Sqlite>,
    include_inactive: bool,
) -> Result<Vec<Worker>, AppError> {
    info!("Listing workers");
    let query = if include_inactive {
        format!("SELECT {} FROM workers ORDER BY id", WORKER_COLUMNS)
    } else {
        format!(
            "SELECT {} FROM workers WHERE active IS 1 ORDER BY id",
            WORKER_COLUMNS
        )
    };

    let rows = sqlx::query_as::<_, DbWorker>(&query)
        .fetch_all(pool)
        .await?;

    collect_rows(rows)
}

#[instrument(skip(pool))]
pub async fn set_worker_active(
    pool: &Pool<Sqlite>,
    id: WorkerId,
    active: bool,
) -> Result<(), AppError> {
    info!("Updating worker active flag");
    let res = sqlx::query("UPDATE workers SET active = ? WHERE id = ?")
        .bind(active)
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Worker with id {} not found", id)));
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn set_worker_desired_hours(
    pool: &Pool<Sqlite>,
    id: WorkerId,
    desired_weekly_hours: Option<u32>,
) -> Result<(), AppError> {
    info!("Updating worker desired hours");
    let res = sqlx::query("UPDATE workers SET desired_weekly_hours = ? WHERE id = ?")
        .bind(desired_weekly_hours)
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Worker with id {} not found", id)));
    }
    Ok(())
}

// Shift catalog

#[derive(Debug, Clone)]
pub struct NewShift {
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub shift_type: ShiftType,
    pub required_workers: u32,
}

#[instrument(skip(pool))]
pub async fn create_shift(pool: &Pool<Sqlite>, shift: &NewShift) -> Result<ShiftId, AppError> {
    info!("Creating shift");
    let res = sqlx::query(
        "INSERT INTO shifts (day_of_week, start_time, end_time, shift_type, required_workers)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(i64::from(shift.day_of_week))
    .bind(shift.start_time)
    .bind(shift.end_time)
    .bind(shift.shift_type.as_str())
    .bind(shift.required_workers)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn get_shift(pool: &Pool<Sqlite>, id: ShiftId) -> Result<Shift, AppError> {
    let row = sqlx::query_as::<_, DbShift>(&format!(
        "SELECT {} FROM shifts WHERE id = ?",
        SHIFT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(shift) => Shift::try_from(shift),
        _ => Err(AppError::NotFound(format!("Shift with id {} not found", id))),
    }
}

#[instrument(skip(pool))]
pub async fn list_shifts(
    pool: &Pool<Sqlite>,
    include_inactive: bool,
) -> Result<Vec<Shift>, AppError> {
    let mut conn = pool.acquire().await?;
    fetch_shifts(&mut conn, include_inactive).await
}

async fn fetch_shifts(
    conn: &mut SqliteConnection,
    include_inactive: bool,
) -> Result<Vec<Shift>, AppError> {
    let query = if include_inactive {
        format!(
            "SELECT {} FROM shifts ORDER BY day_of_week, start_time, id",
            SHIFT_COLUMNS
        )
    } else {
        format!(
            "SELECT {} FROM shifts WHERE active IS 1 ORDER BY day_of_week, start_time, id",
            SHIFT_COLUMNS
        )
    };

    let rows = sqlx::query_as::<_, DbShift>(&query)
        .fetch_all(&mut *conn)
        .await?;

    collect_rows(rows)
}

#[instrument(skip(pool))]
pub async fn set_shift_active(
    pool: &Pool<Sqlite>,
    id: ShiftId,
    active: bool,
) -> Result<(), AppError> {
    info!("Updating shift active flag");
    let res = sqlx::query("UPDATE shifts SET active = ? WHERE id = ?")
        .bind(active)
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Shift with id {} not found", id)));
    }
    Ok(())
}

/// Rewrites a shift's window, type and staffing. Schedules already generated keep their
/// assignments as they were.
#[instrument(skip(pool))]
pub async fn update_shift(pool: &Pool<Sqlite>, id: ShiftId, shift: &NewShift) -> Result<(), AppError> {
    info!("Updating shift");
    let res = sqlx::query(
        "UPDATE shifts
         SET day_of_week = ?, start_time = ?, end_time = ?, shift_type = ?, required_workers = ?
         WHERE id = ?",
    )
    .bind(i64::from(shift.day_of_week))
    .bind(shift.start_time)
    .bind(shift.end_time)
    .bind(shift.shift_type.as_str())
    .bind(shift.required_workers)
    .bind(id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Shift with id {} not found", id)));
    }
    Ok(())
}

// Availability store

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityEntry {
    pub shift_id: ShiftId,
    pub is_available: bool,
    pub preference_rank: Option<PreferenceRank>,
}

/// Replaces every availability row of `worker_id` for `semester` with `entries`.
#[instrument(skip(pool, entries), fields(entries = entries.len()))]
pub async fn replace_availability(
    pool: &Pool<Sqlite>,
    worker_id: WorkerId,
    semester: &str,
    entries: &[AvailabilityEntry],
) -> Result<u64, AppError> {
    info!("Replacing availability submission");
    let mut tx = pool.begin().await?;

    let removed = sqlx::query("DELETE FROM availability WHERE worker_id = ? AND semester = ?")
        .bind(worker_id)
        .bind(semester)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    for entry in entries {
        sqlx::query(
            "INSERT INTO availability (worker_id, shift_id, semester, is_available, preference_rank)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(worker_id)
        .bind(entry.shift_id)
        .bind(semester)
        .bind(entry.is_available)
        .bind(entry.preference_rank.map(PreferenceRank::get))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(removed, stored = entries.len(), "Availability replaced");

    Ok(entries.len() as u64)
}

#[instrument(skip(pool))]
pub async fn get_worker_availability(
    pool: &Pool<Sqlite>,
    worker_id: WorkerId,
    semester: &str,
) -> Result<Vec<Availability>, AppError> {
    let rows = sqlx::query_as::<_, DbAvailability>(
        "SELECT worker_id, shift_id, semester, is_available, preference_rank
         FROM availability
         WHERE worker_id = ? AND semester = ?
         ORDER BY shift_id",
    )
    .bind(worker_id)
    .bind(semester)
    .fetch_all(pool)
    .await?;

    collect_rows(rows)
}

async fn fetch_semester_availability(
    conn: &mut SqliteConnection,
    semester: &str,
) -> Result<Vec<Availability>, AppError> {
    let rows = sqlx::query_as::<_, DbAvailability>(
        "SELECT worker_id, shift_id, semester, is_available, preference_rank
         FROM availability
         WHERE semester = ?
         ORDER BY worker_id, shift_id",
    )
    .bind(semester)
    .fetch_all(&mut *conn)
    .await?;

    collect_rows(rows)
}

async fn fetch_all_workers(conn: &mut SqliteConnection) -> Result<Vec<Worker>, AppError> {
    let rows = sqlx::query_as::<_, DbWorker>(&format!(
        "SELECT {} FROM workers ORDER BY id",
        WORKER_COLUMNS
    ))
    .fetch_all(&mut *conn)
    .await?;

    collect_rows(rows)
}

/// Consistent view of everything the engine reads for one semester.
#[derive(Debug, Clone)]
pub struct GenerationInput {
    pub shifts: Vec<Shift>,
    pub availability: Vec<Availability>,
    pub workers: Vec<Worker>,
}

#[instrument(skip(pool))]
pub async fn load_generation_input(
    pool: &Pool<Sqlite>,
    semester: &str,
) -> Result<GenerationInput, AppError> {
    info!("Loading generation snapshot");
    let mut tx = pool.begin().await?;

    let shifts = fetch_shifts(&mut tx, false).await?;
    let availability = fetch_semester_availability(&mut tx, semester).await?;
    let workers = fetch_all_workers(&mut tx).await?;

    tx.commit().await?;

    Ok(GenerationInput {
        shifts,
        availability,
        workers,
    })
}

// Schedules

#[derive(Debug, Clone)]
pub struct NewSchedule {
    pub semester: String,
    pub created_at: DateTime<Utc>,
    pub generated_by: Option<WorkerId>,
    pub algorithm_version: String,
    pub notes: Option<String>,
}

/// Writes a draft schedule, its assignments and its coverage warnings in one transaction.
/// Any failure rolls the whole write back.
#[instrument(skip(pool, schedule, outcome), fields(semester = %schedule.semester, assignments = outcome.assignments.len()))]
pub async fn insert_generated_schedule(
    pool: &Pool<Sqlite>,
    schedule: &NewSchedule,
    outcome: &GenerationOutcome,
) -> Result<(Schedule, Vec<Assignment>), AppError> {
    info!("Persisting generated schedule");
    let mut tx = pool.begin().await?;

    let schedule_id = sqlx::query(
        "INSERT INTO schedules (semester, status, created_at, generated_by, algorithm_version, notes)
         VALUES (?, 'draft', ?, ?, ?, ?)",
    )
    .bind(&schedule.semester)
    .bind(schedule.created_at)
    .bind(schedule.generated_by)
    .bind(&schedule.algorithm_version)
    .bind(&schedule.notes)
    .execute(&mut *tx)
    .await
    .map_err(map_write_error)?
    .last_insert_rowid();

    for proposed in &outcome.assignments {
        sqlx::query(
            "INSERT INTO schedule_assignments (schedule_id, shift_id, worker_id, assignment_score)
             VALUES (?, ?, ?, ?)",
        )
        .bind(schedule_id)
        .bind(proposed.shift_id)
        .bind(proposed.worker_id)
        .bind(proposed.score.map(PreferenceRank::get))
        .execute(&mut *tx)
        .await
        .map_err(map_write_error)?;
    }

    for warning in &outcome.warnings {
        insert_coverage_warning(&mut tx, schedule_id, warning).await?;
    }

    let stored = fetch_schedule(&mut tx, schedule_id).await?;
    let assignments = fetch_schedule_assignments(&mut tx, schedule_id).await?;

    tx.commit().await?;
    info!(schedule_id, "Schedule persisted");

    Ok((stored, assignments))
}

async fn insert_coverage_warning(
    conn: &mut SqliteConnection,
    schedule_id: ScheduleId,
    warning: &CoverageWarning,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO schedule_conflicts
         (schedule_id, conflict_type, severity, shift_id, assigned, required, description)
         VALUES (?, 'understaffed', 'warning', ?, ?, ?, ?)",
    )
    .bind(schedule_id)
    .bind(warning.shift_id)
    .bind(warning.assigned)
    .bind(warning.required)
    .bind(&warning.message)
    .execute(&mut *conn)
    .await
    .map_err(map_write_error)?;

    Ok(())
}

async fn fetch_schedule(
    conn: &mut SqliteConnection,
    id: ScheduleId,
) -> Result<Schedule, AppError> {
    let row = sqlx::query_as::<_, DbSchedule>(&format!(
        "SELECT {} FROM schedules WHERE id = ?",
        SCHEDULE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(schedule) => Schedule::try_from(schedule),
        _ => Err(AppError::NotFound(format!(
            "Schedule with id {} not found",
            id
        ))),
    }
}

async fn fetch_schedule_assignments(
    conn: &mut SqliteConnection,
    schedule_id: ScheduleId,
) -> Result<Vec<Assignment>, AppError> {
    let rows = sqlx::query_as::<_, DbAssignment>(
        "SELECT id, schedule_id, worker_id, shift_id, assignment_score
         FROM schedule_assignments
         WHERE schedule_id = ?
         ORDER BY shift_id, worker_id",
    )
    .bind(schedule_id)
    .fetch_all(&mut *conn)
    .await?;

    collect_rows(rows)
}

#[instrument(skip(pool))]
pub async fn get_schedule(pool: &Pool<Sqlite>, id: ScheduleId) -> Result<Schedule, AppError> {
    let mut conn = pool.acquire().await?;
    fetch_schedule(&mut conn, id).await
}

#[instrument(skip(pool))]
pub async fn list_schedules(
    pool: &Pool<Sqlite>,
    semester: Option<&str>,
) -> Result<Vec<Schedule>, AppError> {
    info!("Listing schedules");
    let rows = match semester {
        Some(semester) => {
            sqlx::query_as::<_, DbSchedule>(&format!(
                "SELECT {} FROM schedules WHERE semester = ? ORDER BY created_at DESC, id DESC",
                SCHEDULE_COLUMNS
            ))
            .bind(semester)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, DbSchedule>(&format!(
                "SELECT {} FROM schedules ORDER BY created_at DESC, id DESC",
                SCHEDULE_COLUMNS
            ))
            .fetch_all(pool)
            .await?
        }
    };

    collect_rows(rows)
}

/// Assignments of a schedule. Unknown schedule ids yield an empty list.
#[instrument(skip(pool))]
pub async fn get_schedule_assignments(
    pool: &Pool<Sqlite>,
    schedule_id: ScheduleId,
) -> Result<Vec<Assignment>, AppError> {
    let mut conn = pool.acquire().await?;
    fetch_schedule_assignments(&mut conn, schedule_id).await
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbCoverageWarning {
    pub shift_id: Option<i64>,
    pub assigned: Option<i64>,
    pub required: Option<i64>,
    pub description: Option<String>,
}

impl TryFrom<DbCoverageWarning> for CoverageWarning {
    type Error = AppError;

    fn try_from(row: DbCoverageWarning) -> Result<Self, Self::Error> {
        let count = |value: Option<i64>, column: &str| {
            u32::try_from(value.unwrap_or_default()).map_err(|_| {
                AppError::Internal(format!("Stored coverage warning has a negative {}", column))
            })
        };

        Ok(Self {
            shift_id: row.shift_id.unwrap_or_default(),
            assigned: count(row.assigned, "assigned count")?,
            required: count(row.required, "required count")?,
            message: row.description.unwrap_or_default(),
        })
    }
}

#[instrument(skip(pool))]
pub async fn get_schedule_warnings(
    pool: &Pool<Sqlite>,
    schedule_id: ScheduleId,
) -> Result<Vec<CoverageWarning>, AppError> {
    let rows = sqlx::query_as::<_, DbCoverageWarning>(
        "SELECT shift_id, assigned, required, description
         FROM schedule_conflicts
         WHERE schedule_id = ? AND conflict_type = 'understaffed'
         ORDER BY shift_id",
    )
    .bind(schedule_id)
    .fetch_all(pool)
    .await?;

    collect_rows(rows)
}

/// Compare-and-set from draft to published. Returns whether this call made the transition.
///
/// With `exclusive` set, the transition also requires that no other schedule of the same
/// semester is published; the check and the update are a single statement.
#[instrument(skip(pool))]
pub async fn mark_schedule_published(
    pool: &Pool<Sqlite>,
    id: ScheduleId,
    published_at: DateTime<Utc>,
    exclusive: bool,
) -> Result<bool, AppError> {
    info!("Publishing schedule");
    let query = if exclusive {
        "UPDATE schedules SET status = 'published', published_at = ?
         WHERE id = ? AND status = 'draft'
           AND NOT EXISTS (
               SELECT 1 FROM schedules other
               WHERE other.semester = schedules.semester
                 AND other.status = 'published'
           )"
    } else {
        "UPDATE schedules SET status = 'published', published_at = ?
         WHERE id = ? AND status = 'draft'"
    };

    let res = sqlx::query(query)
        .bind(published_at)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(res.rows_affected() == 1)
}

async fn count_published(conn: &mut SqliteConnection, semester: &str) -> Result<i64, AppError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM schedules WHERE semester = ? AND status = 'published'",
    )
    .bind(semester)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count)
}

/// Removes a schedule with its assignments and warnings. Returns false if it did not exist.
#[instrument(skip(pool))]
pub async fn delete_schedule(pool: &Pool<Sqlite>, id: ScheduleId) -> Result<bool, AppError> {
    info!("Deleting schedule");
    let mut tx = pool.begin().await?;

    let assignments = sqlx::query("DELETE FROM schedule_assignments WHERE schedule_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    sqlx::query("DELETE FROM schedule_conflicts WHERE schedule_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let schedules = sqlx::query("DELETE FROM schedules WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if schedules == 0 {
        tx.rollback().await?;
        warn!("Schedule to delete does not exist");
        return Ok(false);
    }

    tx.commit().await?;
    info!(assignments, "Schedule deleted");
    Ok(true)
}

#[derive(sqlx::FromRow, Clone)]
struct DbWorkerShift {
    schedule_id: Option<i64>,
    assignment_score: Option<i64>,
    #[sqlx(flatten)]
    shift: DbShift,
}

/// Assignments of `worker_id` in published schedules of `semester`. Drafts are never shown.
#[instrument(skip(pool))]
pub async fn get_published_worker_shifts(
    pool: &Pool<Sqlite>,
    worker_id: WorkerId,
    semester: &str,
) -> Result<Vec<WorkerShift>, AppError> {
    let rows = sqlx::query_as::<_, DbWorkerShift>(
        "SELECT a.schedule_id, a.assignment_score,
                s.id, s.day_of_week, s.start_time, s.end_time, s.shift_type,
                s.required_workers, s.active
         FROM schedule_assignments a
         JOIN schedules sc ON sc.id = a.schedule_id
         JOIN shifts s ON s.id = a.shift_id
         WHERE a.worker_id = ? AND sc.semester = ? AND sc.status = ?
         ORDER BY s.day_of_week, s.start_time, s.id",
    )
    .bind(worker_id)
    .bind(semester)
    .bind(ScheduleStatus::Published.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(WorkerShift {
                schedule_id: row.schedule_id.unwrap_or_default(),
                assignment_score: row
                    .assignment_score
                    .map(PreferenceRank::try_from)
                    .transpose()?,
                shift: Shift::try_from(row.shift)?,
            })
        })
        .collect()
}

/// Everything a schedule report reads, loaded inside one read transaction so a concurrent
/// delete is seen either entirely or not at all.
#[derive(Debug, Clone)]
pub struct ReportInput {
    pub schedule: Schedule,
    pub assignments: Vec<Assignment>,
    pub shifts: Vec<Shift>,
    pub workers: Vec<Worker>,
    pub published_in_semester: i64,
}

#[instrument(skip(pool))]
pub async fn load_report_input(
    pool: &Pool<Sqlite>,
    schedule_id: ScheduleId,
) -> Result<ReportInput, AppError> {
    let mut tx = pool.begin().await?;

    let schedule = fetch_schedule(&mut tx, schedule_id).await?;
    let assignments = fetch_schedule_assignments(&mut tx, schedule_id).await?;
    let shifts = fetch_shifts(&mut tx, true).await?;
    let workers = fetch_all_workers(&mut tx).await?;
    let published_in_semester = count_published(&mut tx, &schedule.semester).await?;

    tx.commit().await?;

    Ok(ReportInput {
        schedule,
        assignments,
        shifts,
        workers,
        published_in_semester,
    })
}
