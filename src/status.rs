//! Completion tracking across the evaluators of a project.
//!
//! Two different numbers come out of here and must not be confused with rubric scores:
//! the project status classification and the dashboard completion percentage (workflow
//! progress). Whether aggregated scores may be shown at all is decided by the quorum gate.

use crate::error::{EvaluationError, Result};
use crate::evaluation::{EvaluationRecord, EvaluationStatus, Evaluations};
use crate::evaluator::EvaluatorBindings;
use crate::report::round_percent;
use serde::{Deserialize, Serialize};

/// Completed evaluations required before results are shown under the fixed policy.
pub const DEFAULT_QUORUM: usize = 3;

/// Classification of a whole project, derived from its bound roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Pending,
    InProgress,
    Completed,
}

impl ProjectStatus {
    /// The stored spelling of the status.
    pub fn as_str(&self) -> &str {
        match self {
            ProjectStatus::Pending => "pending",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::Completed => "completed",
        }
    }
}

/// Status of a single role: no record at all reads as pending.
pub fn evaluator_status(record: Option<&EvaluationRecord>) -> EvaluationStatus {
    record
        .map(EvaluationRecord::effective_status)
        .unwrap_or(EvaluationStatus::Pending)
}

/// Per-status tally over the currently bound roles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationCounts {
    pub bound: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
}

impl EvaluationCounts {
    /// Counts the bound roles by the status of their records. Unbound roles are ignored.
    pub fn tally(bindings: &EvaluatorBindings, evaluations: &Evaluations) -> Self {
        let mut counts = EvaluationCounts::default();
        for (role, _) in bindings.iter() {
            counts.bound += 1;
            match evaluator_status(evaluations.get(&role)) {
                EvaluationStatus::Pending => counts.pending += 1,
                EvaluationStatus::InProgress => counts.in_progress += 1,
                EvaluationStatus::Completed => counts.completed += 1,
            }
        }
        counts
    }

    /// Completed once every bound role is completed, pending while nothing has started,
    /// in progress otherwise. A project with nobody bound is pending.
    pub fn status(&self) -> ProjectStatus {
        if self.bound > 0 && self.completed == self.bound {
            ProjectStatus::Completed
        } else if self.completed > 0 || self.in_progress > 0 {
            ProjectStatus::InProgress
        } else {
            ProjectStatus::Pending
        }
    }

    /// Progress-bar percentage: an evaluation in progress counts half. 0 with nobody bound.
    pub fn completion_percentage(&self) -> u32 {
        if self.bound == 0 {
            return 0;
        }
        let done = self.completed as f64 + self.in_progress as f64 * 0.5;
        round_percent(done / self.bound as f64 * 100.0)
    }
}

/// Completed records across every role, bound or not. This is what the quorum counts.
pub fn completed_records(evaluations: &Evaluations) -> usize {
    evaluations
        .values()
        .filter(|record| record.is_completed())
        .count()
}

/// How many completed evaluations unlock the results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuorumPolicy {
    /// A fixed count, regardless of how many roles are bound.
    Fixed(usize),
    /// The number of evaluators bound when the first evaluation started; the current bound
    /// count when no snapshot exists. Never less than one.
    EvaluatorsAtStart,
}

impl Default for QuorumPolicy {
    fn default() -> Self {
        QuorumPolicy::Fixed(DEFAULT_QUORUM)
    }
}

impl QuorumPolicy {
    /// Completed evaluations needed, given the start snapshot and the current bound count.
    pub fn required(&self, snapshot: Option<usize>, bound_now: usize) -> usize {
        match self {
            QuorumPolicy::Fixed(count) => *count,
            QuorumPolicy::EvaluatorsAtStart => snapshot.unwrap_or(bound_now).max(1),
        }
    }
}

/// Fails with `QuorumNotMet` unless `completed` reaches `required`.
pub fn ensure_quorum(completed: usize, required: usize) -> Result<()> {
    if completed >= required {
        Ok(())
    } else {
        Err(EvaluationError::QuorumNotMet {
            completed,
            required,
        })
    }
}
