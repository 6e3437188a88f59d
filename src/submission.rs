use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};
use validator::Validate;

use crate::db::{self, AvailabilityEntry};
use crate::error::AppError;
use crate::models::{Availability, PreferenceRank, Shift, ShiftId, WorkerId};
use crate::validation::{FieldErrors, validate_semester};

/// One entry as it arrives over the wire. Ranks are kept wide so that an out-of-range
/// value is reported as a field error instead of a deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityEntryRequest {
    pub shift_id: ShiftId,
    pub is_available: bool,
    #[serde(default)]
    pub preference_rank: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AvailabilityRequest {
    #[validate(length(max = 500, message = "Too many availability entries"))]
    pub entries: Vec<AvailabilityEntryRequest>,
}

/// A checked, wholesale availability submission for one worker and semester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilitySubmission {
    pub worker_id: WorkerId,
    pub semester: String,
    pub entries: Vec<AvailabilityEntry>,
}

impl AvailabilitySubmission {
    /// Checks `request` against the active shift catalog. Every problem found is reported,
    /// not just the first.
    pub fn parse(
        worker_id: WorkerId,
        semester: &str,
        request: AvailabilityRequest,
        active_shifts: &[Shift],
    ) -> Result<Self, AppError> {
        let semester = validate_semester(semester)?;
        request.validate()?;

        let known: HashMap<ShiftId, &Shift> = active_shifts
            .iter()
            .filter(|s| s.active)
            .map(|s| (s.id, s))
            .collect();

        let mut errors = FieldErrors::new();
        let mut seen: HashSet<ShiftId> = HashSet::new();
        let mut entries = Vec::with_capacity(request.entries.len());

        for (index, raw) in request.entries.into_iter().enumerate() {
            if !known.contains_key(&raw.shift_id) {
                errors.add(
                    "shift_id",
                    "unknown_shift",
                    format!("Entry {}: shift {} does not exist or is inactive", index, raw.shift_id),
                );
                continue;
            }
            if !seen.insert(raw.shift_id) {
                errors.add(
                    "shift_id",
                    "duplicate_shift",
                    format!("Entry {}: shift {} appears more than once", index, raw.shift_id),
                );
                continue;
            }

            let preference_rank = match raw.preference_rank {
                Some(_) if !raw.is_available => {
                    errors.add(
                        "preference_rank",
                        "rank_without_availability",
                        format!(
                            "Entry {}: a preference rank requires the shift to be marked available",
                            index
                        ),
                    );
                    continue;
                }
                Some(rank) => match PreferenceRank::try_from(rank) {
                    Ok(rank) => Some(rank),
                    Err(_) => {
                        errors.add(
                            "preference_rank",
                            "rank_out_of_range",
                            format!("Entry {}: preference rank must be between 1 and 5, got {}", index, rank),
                        );
                        continue;
                    }
                },
                None => None,
            };

            entries.push(AvailabilityEntry {
                shift_id: raw.shift_id,
                is_available: raw.is_available,
                preference_rank,
            });
        }

        errors.into_result()?;

        Ok(Self {
            worker_id,
            semester,
            entries,
        })
    }
}

/// Validates and stores a worker's availability, replacing whatever they submitted
/// before for the same semester.
#[instrument(skip(pool, request), fields(entries = request.entries.len()))]
pub async fn submit_availability(
    pool: &Pool<Sqlite>,
    worker_id: WorkerId,
    semester: &str,
    request: AvailabilityRequest,
) -> Result<Vec<Availability>, AppError> {
    let active_shifts = db::list_shifts(pool, false).await?;
    let submission = AvailabilitySubmission::parse(worker_id, semester, request, &active_shifts)?;

    let stored = db::replace_availability(
        pool,
        submission.worker_id,
        &submission.semester,
        &submission.entries,
    )
    .await?;
    info!(stored, semester = %submission.semester, "Availability submission accepted");

    db::get_worker_availability(pool, submission.worker_id, &submission.semester).await
}

pub async fn worker_availability(
    pool: &Pool<Sqlite>,
    worker_id: WorkerId,
    semester: &str,
) -> Result<Vec<Availability>, AppError> {
    let semester = validate_semester(semester)?;
    db::get_worker_availability(pool, worker_id, &semester).await
}
