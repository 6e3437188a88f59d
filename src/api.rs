use chrono::NaiveTime;
use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::{Deserialize, Serialize, json::Json};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::{Caller, Permission, Role};
use crate::config::SchedulerConfig;
use crate::db::{self, NewShift};
use crate::engine::CoverageWarning;
use crate::error::AppError;
use crate::lifecycle::{self, GeneratedSchedule};
use crate::models::{
    Assignment, Availability, Schedule, ScheduleId, Shift, ShiftId, ShiftType, Worker, WorkerId,
    WorkerShift,
};
use crate::reporting::{self, AvailabilitySummary, ScheduleReport};
use crate::submission::{self, AvailabilityRequest};
use crate::validation::{FieldErrors, JsonValidateExt, ToValidationResponse, ValidationResponse};

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

// Workers

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateWorkerRequest {
    #[validate(length(min = 1, max = 100, message = "Display name must be 1-100 characters"))]
    pub display_name: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[validate(range(min = 1, max = 40, message = "Desired hours must be between 1 and 40"))]
    pub desired_weekly_hours: Option<u32>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct UpdateWorkerRequest {
    #[validate(range(min = 1, max = 40, message = "Desired hours must be between 1 and 40"))]
    pub desired_weekly_hours: Option<u32>,
    #[serde(default)]
    pub clear_desired_hours: bool,
    pub active: Option<bool>,
}

#[post("/workers", data = "<request>")]
pub async fn api_create_worker(
    request: Json<CreateWorkerRequest>,
    caller: Caller,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<Worker>>, AppError> {
    caller.require_permission(Permission::ManageWorkers)?;
    let request = request.validated()?;

    let id = db::create_worker(
        db,
        request.display_name.trim(),
        request.role.unwrap_or(Role::Worker),
        request.desired_weekly_hours,
    )
    .await?;

    let worker = db::get_worker(db, id).await?;
    Ok(Custom(Status::Created, Json(worker)))
}

#[get("/workers?<include_inactive>")]
pub async fn api_list_workers(
    include_inactive: Option<bool>,
    caller: Caller,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Worker>>, AppError> {
    caller.require_permission(Permission::ManageWorkers)?;
    let workers = db::list_workers(db, include_inactive.unwrap_or(false)).await?;
    Ok(Json(workers))
}

#[get("/workers/<id>")]
pub async fn api_get_worker(
    id: WorkerId,
    caller: Caller,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Worker>, AppError> {
    caller.require_permission(Permission::ManageWorkers)?;
    Ok(Json(db::get_worker(db, id).await?))
}

#[put("/workers/<id>", data = "<request>")]
pub async fn api_update_worker(
    id: WorkerId,
    request: Json<UpdateWorkerRequest>,
    caller: Caller,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Worker>, AppError> {
    caller.require_permission(Permission::ManageWorkers)?;
    let request = request.validated()?;

    if request.clear_desired_hours {
        db::set_worker_desired_hours(db, id, None).await?;
    } else if let Some(hours) = request.desired_weekly_hours {
        db::set_worker_desired_hours(db, id, Some(hours)).await?;
    }

    if let Some(active) = request.active {
        db::set_worker_active(db, id, active).await?;
    }

    Ok(Json(db::get_worker(db, id).await?))
}

// Shift catalog

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateShiftRequest {
    #[validate(range(max = 6, message = "Day of week must be between 0 (Monday) and 6 (Sunday)"))]
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub shift_type: ShiftType,
    #[validate(range(min = 1, max = 50, message = "Required workers must be between 1 and 50"))]
    pub required_workers: u32,
}

impl CreateShiftRequest {
    fn into_new_shift(self) -> Result<NewShift, AppError> {
        let mut errors = FieldErrors::new();
        if self.end_time <= self.start_time {
            errors.add(
                "end_time",
                "shift_window",
                "Shift must end after it starts on the same day".to_string(),
            );
        }
        errors.into_result()?;

        Ok(NewShift {
            day_of_week: self.day_of_week,
            start_time: self.start_time,
            end_time: self.end_time,
            shift_type: self.shift_type,
            required_workers: self.required_workers,
        })
    }
}

#[post("/shifts", data = "<request>")]
pub async fn api_create_shift(
    request: Json<CreateShiftRequest>,
    caller: Caller,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<Shift>>, AppError> {
    caller.require_permission(Permission::ManageShifts)?;
    let shift = request.validated()?.into_new_shift()?;

    let id = db::create_shift(db, &shift).await?;

    Ok(Custom(Status::Created, Json(db::get_shift(db, id).await?)))
}

#[get("/shifts?<include_inactive>")]
pub async fn api_list_shifts(
    include_inactive: Option<bool>,
    caller: Caller,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Shift>>, AppError> {
    let include_inactive = include_inactive.unwrap_or(false);
    if include_inactive {
        caller.require_permission(Permission::ManageShifts)?;
    }
    Ok(Json(db::list_shifts(db, include_inactive).await?))
}

/// Inactive shifts are only visible to callers who manage the catalog.
#[get("/shifts/<id>")]
pub async fn api_get_shift(
    id: ShiftId,
    caller: Caller,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Shift>, AppError> {
    let shift = db::get_shift(db, id).await?;
    if !shift.active && !caller.role.has_permission(Permission::ManageShifts) {
        return Err(AppError::NotFound(format!("Shift with id {} not found", id)));
    }
    Ok(Json(shift))
}

#[put("/shifts/<id>", data = "<request>")]
pub async fn api_update_shift(
    id: ShiftId,
    request: Json<CreateShiftRequest>,
    caller: Caller,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Shift>, AppError> {
    caller.require_permission(Permission::ManageShifts)?;
    let shift = request.validated()?.into_new_shift()?;

    db::update_shift(db, id, &shift).await?;
    Ok(Json(db::get_shift(db, id).await?))
}

#[post("/shifts/<id>/activate")]
pub async fn api_activate_shift(
    id: ShiftId,
    caller: Caller,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Shift>, AppError> {
    caller.require_permission(Permission::ManageShifts)?;
    db::set_shift_active(db, id, true).await?;
    Ok(Json(db::get_shift(db, id).await?))
}

/// Shifts are deactivated, never removed, so past schedules keep their references.
#[delete("/shifts/<id>")]
pub async fn api_deactivate_shift(
    id: ShiftId,
    caller: Caller,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, AppError> {
    caller.require_permission(Permission::ManageShifts)?;
    db::set_shift_active(db, id, false).await?;
    Ok(Status::NoContent)
}

// Availability

#[put("/availability/<semester>", data = "<request>")]
pub async fn api_submit_availability(
    semester: &str,
    request: Json<AvailabilityRequest>,
    caller: Caller,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Availability>>, AppError> {
    caller.require_permission(Permission::SubmitOwnAvailability)?;
    let stored =
        submission::submit_availability(db, caller.id, semester, request.into_inner()).await?;
    Ok(Json(stored))
}

#[get("/availability/<semester>")]
pub async fn api_get_availability(
    semester: &str,
    caller: Caller,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Availability>>, AppError> {
    caller.require_permission(Permission::SubmitOwnAvailability)?;
    Ok(Json(
        submission::worker_availability(db, caller.id, semester).await?,
    ))
}

#[get("/availability/<semester>/workers/<worker_id>")]
pub async fn api_get_worker_availability(
    semester: &str,
    worker_id: WorkerId,
    caller: Caller,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Availability>>, AppError> {
    caller.require_permission(Permission::ViewAllAvailability)?;
    db::get_worker(db, worker_id).await?;
    Ok(Json(
        submission::worker_availability(db, worker_id, semester).await?,
    ))
}

#[get("/availability/<semester>/summary")]
pub async fn api_availability_summary(
    semester: &str,
    caller: Caller,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<AvailabilitySummary>, AppError> {
    caller.require_permission(Permission::ViewAllAvailability)?;
    Ok(Json(reporting::availability_summary(db, semester).await?))
}

// Schedules

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct GenerateScheduleRequest {
    #[validate(length(min = 1, max = 50, message = "Semester must be 1-50 characters"))]
    pub semester: String,
    #[validate(length(max = 500, message = "Notes must be at most 500 characters"))]
    pub notes: Option<String>,
}

#[post("/schedules/generate", data = "<request>")]
pub async fn api_generate_schedule(
    request: Json<GenerateScheduleRequest>,
    caller: Caller,
    db: &State<Pool<Sqlite>>,
    config: &State<SchedulerConfig>,
) -> Result<Custom<Json<GeneratedSchedule>>, AppError> {
    caller.require_permission(Permission::GenerateSchedules)?;
    let request = request.validated()?;

    let generated = lifecycle::create_schedule(
        db,
        config,
        &request.semester,
        Some(caller.id),
        request.notes,
    )
    .await?;

    Ok(Custom(Status::Created, Json(generated)))
}

#[get("/schedules?<semester>")]
pub async fn api_list_schedules(
    semester: Option<&str>,
    caller: Caller,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Schedule>>, AppError> {
    caller.require_permission(Permission::ViewDraftSchedules)?;
    Ok(Json(lifecycle::list_schedules(db, semester).await?))
}

#[get("/schedules/<id>")]
pub async fn api_get_schedule(
    id: ScheduleId,
    caller: Caller,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Schedule>, AppError> {
    caller.require_permission(Permission::ViewDraftSchedules)?;
    Ok(Json(lifecycle::get_schedule(db, id).await?))
}

#[get("/schedules/<id>/assignments")]
pub async fn api_schedule_assignments(
    id: ScheduleId,
    caller: Caller,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Assignment>>, AppError> {
    caller.require_permission(Permission::ViewDraftSchedules)?;
    Ok(Json(lifecycle::schedule_assignments(db, id).await?))
}

#[get("/schedules/<id>/warnings")]
pub async fn api_schedule_warnings(
    id: ScheduleId,
    caller: Caller,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<CoverageWarning>>, AppError> {
    caller.require_permission(Permission::ViewDraftSchedules)?;
    Ok(Json(lifecycle::schedule_warnings(db, id).await?))
}

#[post("/schedules/<id>/publish")]
pub async fn api_publish_schedule(
    id: ScheduleId,
    caller: Caller,
    db: &State<Pool<Sqlite>>,
    config: &State<SchedulerConfig>,
) -> Result<Json<Schedule>, AppError> {
    caller.require_permission(Permission::PublishSchedules)?;
    Ok(Json(
        lifecycle::publish_schedule(db, config.publish_policy, id).await?,
    ))
}

#[delete("/schedules/<id>")]
pub async fn api_delete_schedule(
    id: ScheduleId,
    caller: Caller,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, AppError> {
    caller.require_permission(Permission::DeleteSchedules)?;
    lifecycle::delete_schedule(db, id).await?;
    Ok(Status::NoContent)
}

#[get("/schedules/<id>/report")]
pub async fn api_schedule_report(
    id: ScheduleId,
    caller: Caller,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<ScheduleReport>, AppError> {
    caller.require_permission(Permission::ViewReports)?;
    Ok(Json(reporting::schedule_report(db, id).await?))
}

#[get("/my-schedule/<semester>")]
pub async fn api_my_schedule(
    semester: &str,
    caller: Caller,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<WorkerShift>>, AppError> {
    caller.require_permission(Permission::ViewOwnSchedule)?;
    Ok(Json(
        lifecycle::worker_schedule(db, caller.id, semester).await?,
    ))
}

// Catchers

#[catch(400)]
pub fn bad_request_api() -> Custom<Json<ValidationResponse>> {
    Status::BadRequest.to_validation_response()
}

#[catch(401)]
pub fn unauthorized_api() -> Custom<Json<ValidationResponse>> {
    tracing::warn!("Unauthenticated API request");
    Status::Unauthorized.to_validation_response()
}

#[catch(403)]
pub fn forbidden_api() -> Custom<Json<ValidationResponse>> {
    tracing::warn!("Forbidden API request");
    Status::Forbidden.to_validation_response()
}

#[catch(404)]
pub fn not_found_api() -> Custom<Json<ValidationResponse>> {
    Status::NotFound.to_validation_response()
}

#[catch(422)]
pub fn unprocessable_api() -> Custom<Json<ValidationResponse>> {
    Status::UnprocessableEntity.to_validation_response()
}

#[catch(500)]
pub fn internal_error_api() -> Custom<Json<ValidationResponse>> {
    Status::InternalServerError.to_validation_response()
}
