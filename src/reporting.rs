//! Read-side coverage and fairness metrics.
//!
//! Everything here is recomputed from persisted rows on each call and never writes.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument, warn};

use crate::db::{self, ReportInput};
use crate::error::AppError;
use crate::models::{
    Availability, ScheduleId, ScheduleStatus, Shift, ShiftId, Worker, WorkerId,
};
use crate::validation::validate_semester;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffingLevel {
    FullyStaffed,
    PartiallyStaffed,
    UnderStaffed,
}

impl StaffingLevel {
    /// At or above required is full, at least half is partial, anything less is under.
    pub fn classify(assigned: u32, required: u32) -> Self {
        if assigned >= required {
            StaffingLevel::FullyStaffed
        } else if assigned * 2 >= required {
            StaffingLevel::PartiallyStaffed
        } else {
            StaffingLevel::UnderStaffed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShiftCoverage {
    pub shift_id: ShiftId,
    pub label: String,
    pub assigned: u32,
    pub required: u32,
    pub coverage_percent: f64,
    pub level: StaffingLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerHours {
    pub worker_id: WorkerId,
    pub display_name: String,
    pub shifts: u32,
    pub assigned_minutes: i64,
    pub assigned_hours: f64,
    pub desired_weekly_hours: Option<u32>,
    /// Assigned minus desired, in hours. Absent when the worker has no target.
    pub hours_over_target: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleReport {
    pub schedule_id: ScheduleId,
    pub semester: String,
    pub status: ScheduleStatus,
    pub shifts: Vec<ShiftCoverage>,
    pub fully_staffed_shifts: usize,
    pub total_shifts: usize,
    /// Fraction of shifts meeting their requirement, 0.0 when there are no shifts.
    pub aggregate_coverage: f64,
    pub total_assignments: usize,
    /// Mean assignment score; assignments without a stated preference count as 5.
    pub average_preference_score: Option<f64>,
    pub worker_hours: Vec<WorkerHours>,
    pub data_quality_warnings: Vec<String>,
}

/// Builds the report for one schedule from already loaded rows.
///
/// Shifts covered are the currently active ones plus any shift that holds an assignment
/// in this schedule, so deactivating a shift after generation does not hide its staffing.
pub fn build_report(input: &ReportInput) -> ScheduleReport {
    let mut per_shift: HashMap<ShiftId, u32> = HashMap::new();
    let mut per_worker: HashMap<WorkerId, (u32, i64)> = HashMap::new();
    let shifts_by_id: HashMap<ShiftId, &Shift> = input.shifts.iter().map(|s| (s.id, s)).collect();

    let mut data_quality_warnings = Vec::new();
    let mut score_total = 0u64;

    for assignment in &input.assignments {
        *per_shift.entry(assignment.shift_id).or_default() += 1;
        score_total += u64::from(assignment.effective_score());

        let minutes = match shifts_by_id.get(&assignment.shift_id) {
            Some(shift) => shift.duration_minutes(),
            None => {
                data_quality_warnings.push(format!(
                    "Assignment {} references unknown shift {}",
                    assignment.id, assignment.shift_id
                ));
                0
            }
        };
        let entry = per_worker.entry(assignment.worker_id).or_default();
        entry.0 += 1;
        entry.1 += minutes;
    }

    let mut reported: Vec<&Shift> = input
        .shifts
        .iter()
        .filter(|s| s.active || per_shift.contains_key(&s.id))
        .collect();
    reported.sort_by_key(|s| (s.day_of_week, s.start_time, s.id));

    let shifts: Vec<ShiftCoverage> = reported
        .into_iter()
        .map(|shift| {
            let assigned = per_shift.get(&shift.id).copied().unwrap_or(0);
            ShiftCoverage {
                shift_id: shift.id,
                label: shift.label(),
                assigned,
                required: shift.required_workers,
                coverage_percent: percent(assigned, shift.required_workers),
                level: StaffingLevel::classify(assigned, shift.required_workers),
            }
        })
        .collect();

    let fully_staffed_shifts = shifts
        .iter()
        .filter(|s| s.level == StaffingLevel::FullyStaffed)
        .count();
    let aggregate_coverage = if shifts.is_empty() {
        0.0
    } else {
        fully_staffed_shifts as f64 / shifts.len() as f64
    };

    let average_preference_score = if input.assignments.is_empty() {
        None
    } else {
        Some(score_total as f64 / input.assignments.len() as f64)
    };

    let worker_hours = worker_hours(&input.workers, &per_worker);

    if input.published_in_semester > 1 {
        data_quality_warnings.push(format!(
            "{} schedules are published for semester '{}'",
            input.published_in_semester, input.schedule.semester
        ));
    }

    ScheduleReport {
        schedule_id: input.schedule.id,
        semester: input.schedule.semester.clone(),
        status: input.schedule.status,
        total_shifts: shifts.len(),
        shifts,
        fully_staffed_shifts,
        aggregate_coverage,
        total_assignments: input.assignments.len(),
        average_preference_score,
        worker_hours,
        data_quality_warnings,
    }
}

fn percent(assigned: u32, required: u32) -> f64 {
    if required == 0 {
        return 100.0;
    }
    f64::from(assigned) * 100.0 / f64::from(required)
}

// Schedulable workers are always listed so that unscheduled ones show up in the fairness audit.
fn worker_hours(workers: &[Worker], per_worker: &HashMap<WorkerId, (u32, i64)>) -> Vec<WorkerHours> {
    let mut listed: Vec<&Worker> = workers
        .iter()
        .filter(|w| w.is_schedulable() || per_worker.contains_key(&w.id))
        .collect();
    listed.sort_by_key(|w| w.id);

    listed
        .into_iter()
        .map(|worker| {
            let (shifts, minutes) = per_worker.get(&worker.id).copied().unwrap_or((0, 0));
            let assigned_hours = minutes as f64 / 60.0;
            WorkerHours {
                worker_id: worker.id,
                display_name: worker.display_name.clone(),
                shifts,
                assigned_minutes: minutes,
                assigned_hours,
                desired_weekly_hours: worker.desired_weekly_hours,
                hours_over_target: worker
                    .desired_weekly_hours
                    .map(|desired| assigned_hours - f64::from(desired)),
            }
        })
        .collect()
}

/// Loads and reports on a schedule. A schedule deleted before the read transaction began
/// yields `NotFound`; one deleted after sees a complete report of the prior state.
#[instrument(skip(pool))]
pub async fn schedule_report(
    pool: &Pool<Sqlite>,
    schedule_id: ScheduleId,
) -> Result<ScheduleReport, AppError> {
    let input = db::load_report_input(pool, schedule_id).await?;
    let report = build_report(&input);

    if !report.data_quality_warnings.is_empty() {
        warn!(
            schedule_id,
            warnings = ?report.data_quality_warnings,
            "Schedule report raised data-quality warnings"
        );
    }
    info!(
        schedule_id,
        aggregate_coverage = report.aggregate_coverage,
        "Schedule report computed"
    );

    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShiftAvailability {
    pub shift_id: ShiftId,
    pub label: String,
    pub required: u32,
    pub available_workers: u32,
    pub top_preference_count: u32,
    /// Whether availability alone could staff the shift.
    pub adequately_staffed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilitySummary {
    pub semester: String,
    pub respondents: usize,
    pub shifts: Vec<ShiftAvailability>,
}

pub fn summarize_availability(
    semester: &str,
    shifts: &[Shift],
    availability: &[Availability],
    workers: &[Worker],
) -> AvailabilitySummary {
    let schedulable: HashSet<WorkerId> = workers
        .iter()
        .filter(|w| w.is_schedulable())
        .map(|w| w.id)
        .collect();

    let mut counts: BTreeMap<ShiftId, (u32, u32)> = BTreeMap::new();
    let mut respondents: HashSet<WorkerId> = HashSet::new();

    for row in availability
        .iter()
        .filter(|a| a.semester == semester && schedulable.contains(&a.worker_id))
    {
        respondents.insert(row.worker_id);
        if !row.is_available {
            continue;
        }
        let entry = counts.entry(row.shift_id).or_default();
        entry.0 += 1;
        if row.preference_rank.is_some_and(|rank| rank.is_top()) {
            entry.1 += 1;
        }
    }

    let mut active_shifts: Vec<&Shift> = shifts.iter().filter(|s| s.active).collect();
    active_shifts.sort_by_key(|s| (s.day_of_week, s.start_time, s.id));

    AvailabilitySummary {
        semester: semester.to_string(),
        respondents: respondents.len(),
        shifts: active_shifts
            .into_iter()
            .map(|shift| {
                let (available, top) = counts.get(&shift.id).copied().unwrap_or((0, 0));
                ShiftAvailability {
                    shift_id: shift.id,
                    label: shift.label(),
                    required: shift.required_workers,
                    available_workers: available,
                    top_preference_count: top,
                    adequately_staffed: available >= shift.required_workers,
                }
            })
            .collect(),
    }
}

#[instrument(skip(pool))]
pub async fn availability_summary(
    pool: &Pool<Sqlite>,
    semester: &str,
) -> Result<AvailabilitySummary, AppError> {
    let semester = validate_semester(semester)?;
    let input = db::load_generation_input(pool, &semester).await?;

    Ok(summarize_availability(
        &semester,
        &input.shifts,
        &input.availability,
        &input.workers,
    ))
}
