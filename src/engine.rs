//! Greedy, scarcity-first shift assignment.
//!
//! Shifts with the fewest candidates relative to their staffing requirement are filled
//! first so that popular shifts cannot drain the workers a hard-to-fill shift depends on.
//! Within a shift, candidates are taken by preference rank, then by the hours they have
//! already been given in this run, then by worker id. The result is deterministic for a
//! given input and every individual assignment can be explained from those three keys.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::AppError;
use crate::models::{
    Availability, NEUTRAL_PREFERENCE_SCORE, PreferenceRank, Shift, ShiftId, Worker, WorkerId,
};

pub const ALGORITHM_VERSION: &str = "greedy-scarcity-v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// How far above a worker's desired weekly minutes the soft cap sits.
    pub hour_tolerance_minutes: i64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            hour_tolerance_minutes: 3 * 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedAssignment {
    pub worker_id: WorkerId,
    pub shift_id: ShiftId,
    pub score: Option<PreferenceRank>,
}

/// A shift left below its staffing requirement. Not an error: the draft is still produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageWarning {
    pub shift_id: ShiftId,
    pub assigned: u32,
    pub required: u32,
    pub message: String,
}

impl CoverageWarning {
    fn for_shift(shift: &Shift, assigned: u32) -> Self {
        Self {
            shift_id: shift.id,
            assigned,
            required: shift.required_workers,
            message: format!(
                "{}: {}/{} staffed",
                shift.label(),
                assigned,
                shift.required_workers
            ),
        }
    }
}

/// Recorded whenever the hour cap had to be relaxed to keep a shift from going short.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverTargetNotice {
    pub worker_id: WorkerId,
    pub shift_id: ShiftId,
    pub assigned_minutes: i64,
    pub desired_minutes: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationOutcome {
    pub assignments: Vec<ProposedAssignment>,
    pub warnings: Vec<CoverageWarning>,
    pub over_target: Vec<OverTargetNotice>,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    worker_id: WorkerId,
    rank: Option<PreferenceRank>,
    desired_minutes: Option<i64>,
}

impl Candidate {
    /// Missing ranks sort with the least preferred.
    fn sort_rank(&self) -> u8 {
        self.rank.map_or(NEUTRAL_PREFERENCE_SCORE, PreferenceRank::get)
    }
}

#[derive(Debug, Default)]
struct Ledger<'a> {
    minutes: i64,
    held: Vec<&'a Shift>,
}

impl Ledger<'_> {
    fn clashes_with(&self, shift: &Shift) -> bool {
        self.held.iter().any(|held| held.overlaps(shift))
    }
}

/// Running state of one generation run. Lives only for the duration of [`generate`].
struct Run<'a> {
    ledgers: HashMap<WorkerId, Ledger<'a>>,
    outcome: GenerationOutcome,
}

impl<'a> Run<'a> {
    fn minutes_of(&self, worker_id: WorkerId) -> i64 {
        self.ledgers.get(&worker_id).map_or(0, |l| l.minutes)
    }

    fn clashes(&self, worker_id: WorkerId, shift: &Shift) -> bool {
        self.ledgers
            .get(&worker_id)
            .is_some_and(|l| l.clashes_with(shift))
    }

    fn exceeds_cap(&self, candidate: &Candidate, shift: &Shift, tolerance: i64) -> bool {
        match candidate.desired_minutes {
            Some(desired) => {
                self.minutes_of(candidate.worker_id) + shift.duration_minutes() > desired + tolerance
            }
            None => false,
        }
    }

    fn accept(&mut self, candidate: &Candidate, shift: &'a Shift) {
        let ledger = self.ledgers.entry(candidate.worker_id).or_default();
        ledger.minutes += shift.duration_minutes();
        ledger.held.push(shift);

        self.outcome.assignments.push(ProposedAssignment {
            worker_id: candidate.worker_id,
            shift_id: shift.id,
            score: candidate.rank,
        });
    }
}

/// Builds a proposed set of assignments for `semester`.
///
/// Only active shifts, active workers in the worker role and availability rows of `semester` are considered.
/// Fails with [`AppError::InsufficientData`] when there is nothing to schedule against,
/// rather than returning an empty proposal that could pass for a deliberate one.
#[instrument(skip(shifts, availability, workers), fields(shifts = shifts.len(), rows = availability.len()))]
pub fn generate(
    semester: &str,
    shifts: &[Shift],
    availability: &[Availability],
    workers: &[Worker],
    options: &EngineOptions,
) -> Result<GenerationOutcome, AppError> {
    let active_shifts: Vec<&Shift> = shifts.iter().filter(|s| s.active).collect();
    if active_shifts.is_empty() {
        return Err(AppError::InsufficientData(format!(
            "No active shifts exist to schedule for semester '{}'",
            semester
        )));
    }

    let rows: Vec<&Availability> = availability
        .iter()
        .filter(|a| a.semester == semester)
        .collect();
    if rows.is_empty() {
        return Err(AppError::InsufficientData(format!(
            "No availability has been submitted for semester '{}'",
            semester
        )));
    }

    let schedulable: HashMap<WorkerId, &Worker> = workers
        .iter()
        .filter(|w| w.is_schedulable())
        .map(|w| (w.id, w))
        .collect();

    let mut candidates: HashMap<ShiftId, Vec<Candidate>> =
        active_shifts.iter().map(|s| (s.id, Vec::new())).collect();
    let mut seen: HashSet<(WorkerId, ShiftId)> = HashSet::new();

    for row in rows {
        if !row.is_available {
            continue;
        }
        let Some(worker) = schedulable.get(&row.worker_id) else {
            continue;
        };
        let Some(pool) = candidates.get_mut(&row.shift_id) else {
            continue;
        };
        if !seen.insert((row.worker_id, row.shift_id)) {
            continue;
        }

        pool.push(Candidate {
            worker_id: worker.id,
            rank: row.preference_rank,
            desired_minutes: worker.desired_weekly_minutes(),
        });
    }

    let scarcity = |shift: &Shift| {
        let candidate_count = candidates.get(&shift.id).map_or(0, Vec::len) as i64;
        i64::from(shift.required_workers) - candidate_count
    };

    let mut order = active_shifts.clone();
    order.sort_by_key(|s| (Reverse(scarcity(s)), s.id));

    let mut run = Run {
        ledgers: HashMap::new(),
        outcome: GenerationOutcome::default(),
    };

    for shift in order {
        let mut ranked = candidates.remove(&shift.id).unwrap_or_default();
        ranked.sort_by_key(|c| (c.sort_rank(), run.minutes_of(c.worker_id), c.worker_id));

        let required = shift.required_workers as usize;
        let mut filled = 0usize;
        let mut capped: Vec<Candidate> = Vec::new();

        for candidate in &ranked {
            if filled >= required {
                break;
            }
            if run.clashes(candidate.worker_id, shift) {
                debug!(worker_id = candidate.worker_id, shift_id = shift.id, "Skipping candidate with overlapping shift");
                continue;
            }
            if run.exceeds_cap(candidate, shift, options.hour_tolerance_minutes) {
                capped.push(*candidate);
                continue;
            }
            run.accept(candidate, shift);
            filled += 1;
        }

        // Under-filling is worse than modest over-hours: fall back to capped candidates.
        for candidate in &capped {
            if filled >= required {
                break;
            }
            run.accept(candidate, shift);
            filled += 1;

            let notice = OverTargetNotice {
                worker_id: candidate.worker_id,
                shift_id: shift.id,
                assigned_minutes: run.minutes_of(candidate.worker_id),
                desired_minutes: candidate.desired_minutes.unwrap_or_default(),
            };
            warn!(
                worker_id = notice.worker_id,
                shift_id = notice.shift_id,
                assigned_minutes = notice.assigned_minutes,
                desired_minutes = notice.desired_minutes,
                "Relaxed hour cap to staff shift"
            );
            run.outcome.over_target.push(notice);
        }

        if filled < required {
            let warning = CoverageWarning::for_shift(shift, filled as u32);
            debug!(shift_id = shift.id, message = %warning.message, "Shift left under-staffed");
            run.outcome.warnings.push(warning);
        }
    }

    run.outcome.warnings.sort_by_key(|w| w.shift_id);

    info!(
        semester = %semester,
        assignments = run.outcome.assignments.len(),
        warnings = run.outcome.warnings.len(),
        relaxed = run.outcome.over_target.len(),
        "Generated schedule proposal"
    );

    Ok(run.outcome)
}
