use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::auth::Role;
use crate::error::AppError;

pub type WorkerId = i64;
pub type ShiftId = i64;
pub type ScheduleId = i64;

/// Score contributed to averages by an assignment with no stated preference.
pub const NEUTRAL_PREFERENCE_SCORE: u8 = 5;

const DAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// A preference rank between 1 (most preferred) and 5 (least preferred).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PreferenceRank(u8);

impl PreferenceRank {
    pub const MOST_PREFERRED: PreferenceRank = PreferenceRank(1);

    pub fn new(rank: u8) -> Result<Self, AppError> {
        if (1..=5).contains(&rank) {
            Ok(Self(rank))
        } else {
            Err(AppError::Validation(format!(
                "Preference rank must be between 1 and 5, got {}",
                rank
            )))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn is_top(self) -> bool {
        self == Self::MOST_PREFERRED
    }
}

impl TryFrom<u8> for PreferenceRank {
    type Error = AppError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<i64> for PreferenceRank {
    type Error = AppError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| AppError::Validation(format!("Preference rank {} out of range", value)))
            .and_then(Self::new)
    }
}

impl From<PreferenceRank> for u8 {
    fn from(rank: PreferenceRank) -> Self {
        rank.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Worker {
    pub id: WorkerId,
    pub display_name: String,
    pub role: Role,
    pub active: bool,
    pub desired_weekly_hours: Option<u32>,
}

impl Worker {
    pub fn desired_weekly_minutes(&self) -> Option<i64> {
        self.desired_weekly_hours.map(|hours| i64::from(hours) * 60)
    }

    /// Only active workers in the worker role are ever placed on shifts.
    pub fn is_schedulable(&self) -> bool {
        self.active && self.role == Role::Worker
    }
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbWorker {
    pub id: Option<i64>,
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub active: Option<bool>,
    pub desired_weekly_hours: Option<i64>,
}

impl TryFrom<DbWorker> for Worker {
    type Error = AppError;

    fn try_from(worker: DbWorker) -> Result<Self, Self::Error> {
        let role = Role::from_str(&worker.role.unwrap_or_default())?;
        let desired_weekly_hours = worker
            .desired_weekly_hours
            .map(u32::try_from)
            .transpose()
            .map_err(|_| AppError::Internal("Stored desired hours are negative".to_string()))?;

        Ok(Self {
            id: worker.id.unwrap_or_default(),
            display_name: worker.display_name.unwrap_or_default(),
            role,
            active: worker.active.unwrap_or_default(),
            desired_weekly_hours,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftType {
    Weekday,
    Weekend,
    Rotating,
}

impl ShiftType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftType::Weekday => "weekday",
            ShiftType::Weekend => "weekend",
            ShiftType::Rotating => "rotating",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, AppError> {
        match s {
            "weekday" => Ok(ShiftType::Weekday),
            "weekend" => Ok(ShiftType::Weekend),
            "rotating" => Ok(ShiftType::Rotating),
            _ => Err(AppError::Validation(format!("Unknown shift type: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Shift {
    pub id: ShiftId,
    /// 0 = Monday .. 6 = Sunday
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub shift_type: ShiftType,
    pub required_workers: u32,
    pub active: bool,
}

impl Shift {
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }

    pub fn day_name(&self) -> &'static str {
        DAY_NAMES
            .get(usize::from(self.day_of_week))
            .copied()
            .unwrap_or("Unknown")
    }

    /// Two shifts overlap when they fall on the same day and their windows intersect.
    /// Back-to-back shifts (one ends when the other starts) do not overlap.
    pub fn overlaps(&self, other: &Shift) -> bool {
        self.day_of_week == other.day_of_week
            && self.start_time < other.end_time
            && other.start_time < self.end_time
    }

    pub fn label(&self) -> String {
        format!(
            "{} {}-{}",
            self.day_name(),
            self.start_time.format("%H:%M"),
            self.end_time.format("%H:%M")
        )
    }
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbShift {
    pub id: Option<i64>,
    pub day_of_week: Option<i64>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub shift_type: Option<String>,
    pub required_workers: Option<i64>,
    pub active: Option<bool>,
}

impl TryFrom<DbShift> for Shift {
    type Error = AppError;

    fn try_from(shift: DbShift) -> Result<Self, Self::Error> {
        let id = shift.id.unwrap_or_default();
        let corrupt = |field: &str| AppError::Internal(format!("Shift {} has invalid {}", id, field));

        Ok(Self {
            id,
            day_of_week: u8::try_from(shift.day_of_week.unwrap_or_default())
                .map_err(|_| corrupt("day_of_week"))?,
            start_time: shift.start_time.ok_or_else(|| corrupt("start_time"))?,
            end_time: shift.end_time.ok_or_else(|| corrupt("end_time"))?,
            shift_type: ShiftType::from_str(&shift.shift_type.unwrap_or_default())
                .map_err(|_| corrupt("shift_type"))?,
            required_workers: u32::try_from(shift.required_workers.unwrap_or(1))
                .map_err(|_| corrupt("required_workers"))?,
            active: shift.active.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Availability {
    pub worker_id: WorkerId,
    pub shift_id: ShiftId,
    pub semester: String,
    pub is_available: bool,
    pub preference_rank: Option<PreferenceRank>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbAvailability {
    pub worker_id: Option<i64>,
    pub shift_id: Option<i64>,
    pub semester: Option<String>,
    pub is_available: Option<bool>,
    pub preference_rank: Option<i64>,
}

impl TryFrom<DbAvailability> for Availability {
    type Error = AppError;

    fn try_from(row: DbAvailability) -> Result<Self, Self::Error> {
        Ok(Self {
            worker_id: row.worker_id.unwrap_or_default(),
            shift_id: row.shift_id.unwrap_or_default(),
            semester: row.semester.unwrap_or_default(),
            is_available: row.is_available.unwrap_or_default(),
            preference_rank: row
                .preference_rank
                .map(PreferenceRank::try_from)
                .transpose()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    Draft,
    Published,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Draft => "draft",
            ScheduleStatus::Published => "published",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, AppError> {
        match s {
            "draft" => Ok(ScheduleStatus::Draft),
            "published" => Ok(ScheduleStatus::Published),
            _ => Err(AppError::Internal(format!("Unknown schedule status: {}", s))),
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schedule {
    pub id: ScheduleId,
    pub semester: String,
    pub status: ScheduleStatus,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub generated_by: Option<WorkerId>,
    pub algorithm_version: String,
    pub notes: Option<String>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbSchedule {
    pub id: Option<i64>,
    pub semester: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub generated_by: Option<i64>,
    pub algorithm_version: Option<String>,
    pub notes: Option<String>,
}

impl TryFrom<DbSchedule> for Schedule {
    type Error = AppError;

    fn try_from(db: DbSchedule) -> Result<Self, Self::Error> {
        Ok(Self {
            id: db.id.unwrap_or_default(),
            semester: db.semester.unwrap_or_default(),
            status: ScheduleStatus::from_str(&db.status.unwrap_or_default())?,
            created_at: db.created_at.unwrap_or_else(Utc::now),
            published_at: db.published_at,
            generated_by: db.generated_by,
            algorithm_version: db.algorithm_version.unwrap_or_default(),
            notes: db.notes,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    pub id: i64,
    pub schedule_id: ScheduleId,
    pub worker_id: WorkerId,
    pub shift_id: ShiftId,
    /// The worker's preference rank at generation time; `None` means no stated preference.
    pub assignment_score: Option<PreferenceRank>,
}

impl Assignment {
    pub fn effective_score(&self) -> u8 {
        self.assignment_score
            .map_or(NEUTRAL_PREFERENCE_SCORE, PreferenceRank::get)
    }
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbAssignment {
    pub id: Option<i64>,
    pub schedule_id: Option<i64>,
    pub worker_id: Option<i64>,
    pub shift_id: Option<i64>,
    pub assignment_score: Option<i64>,
}

impl TryFrom<DbAssignment> for Assignment {
    type Error = AppError;

    fn try_from(db: DbAssignment) -> Result<Self, Self::Error> {
        Ok(Self {
            id: db.id.unwrap_or_default(),
            schedule_id: db.schedule_id.unwrap_or_default(),
            worker_id: db.worker_id.unwrap_or_default(),
            shift_id: db.shift_id.unwrap_or_default(),
            assignment_score: db
                .assignment_score
                .map(PreferenceRank::try_from)
                .transpose()?,
        })
    }
}

/// Published assignment joined with its shift, as shown to the worker holding it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerShift {
    pub schedule_id: ScheduleId,
    pub shift: Shift,
    pub assignment_score: Option<PreferenceRank>,
}

pub fn collect_rows<D, T>(rows: Vec<D>) -> Result<Vec<T>, AppError>
where
    T: TryFrom<D, Error = AppError>,
{
    rows.into_iter().map(T::try_from).collect()
}
