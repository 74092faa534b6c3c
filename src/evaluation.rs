use crate::criterion_key::CriterionKey;
use crate::evaluator::EvaluatorRole;
use crate::rubric::Rubric;
use crate::serde_helpers::{keyed_entries, lenient_timestamp, value_to_f64};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Progress of one evaluator on one project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    InProgress,
    Completed,
    /// Also what any unrecognised stored status reads as.
    #[default]
    #[serde(other)]
    Pending,
}

impl EvaluationStatus {
    /// The stored spelling of the status.
    pub fn as_str(&self) -> &str {
        match self {
            EvaluationStatus::Pending => "pending",
            EvaluationStatus::InProgress => "in_progress",
            EvaluationStatus::Completed => "completed",
        }
    }
}

/// One evaluator's ratings by criterion.
pub type Ratings = BTreeMap<CriterionKey, f64>;
pub type Justifications = BTreeMap<CriterionKey, String>;
/// A project's evaluation records, one per role.
pub type Evaluations = BTreeMap<EvaluatorRole, EvaluationRecord>;

/// One evaluator's ratings and justifications for a project.
///
/// The record is created on the first rating or justification change, overwritten with the
/// latest snapshot on every draft save, and finalized by `submit`. Who may call the
/// mutators is decided by the caller-aware workflow in `Project`; the record itself only
/// tracks state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRecord {
    #[serde(default)]
    pub status: EvaluationStatus,
    #[serde(default, deserialize_with = "read_ratings")]
    pub ratings: Ratings,
    #[serde(default, deserialize_with = "read_justifications")]
    pub justifications: Justifications,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub submitted_at: Option<DateTime<Utc>>,
}

fn read_ratings<'de, D>(deserializer: D) -> Result<Ratings, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(keyed_entries::<D, CriterionKey>(deserializer, "rating")?
        .into_iter()
        .map(|(key, value)| (key, value_to_f64(&value)))
        .collect())
}

fn read_justifications<'de, D>(deserializer: D) -> Result<Justifications, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(keyed_entries::<D, CriterionKey>(deserializer, "justification")?
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(text) => Some((key, text)),
            Value::Null => None,
            other => {
                warn!("Dropping non-text justification for {}: {}", key, other);
                None
            }
        })
        .collect())
}

/// Reads the `evaluations` map of a project, dropping unknown roles and unreadable records.
pub fn read_evaluations<'de, D>(deserializer: D) -> Result<Evaluations, D::Error>
where
    D: Deserializer<'de>,
{
    let mut evaluations = Evaluations::new();
    for (role, value) in keyed_entries::<D, EvaluatorRole>(deserializer, "evaluation role")? {
        match serde_json::from_value::<EvaluationRecord>(value) {
            Ok(record) => {
                evaluations.insert(role, record);
            }
            Err(e) => warn!("Dropping unreadable {} evaluation: {}", role, e),
        }
    }
    Ok(evaluations)
}

impl EvaluationRecord {
    /// A pending record with nothing entered.
    pub fn new() -> Self {
        EvaluationRecord::default()
    }

    pub fn is_completed(&self) -> bool {
        self.status == EvaluationStatus::Completed
    }

    /// True once any rating or non-blank justification has been entered.
    pub fn has_activity(&self) -> bool {
        !self.ratings.is_empty() || self.justifications.values().any(|j| !j.trim().is_empty())
    }

    /// Status as the tracker sees it: a record stored as pending but carrying ratings is
    /// already in progress.
    pub fn effective_status(&self) -> EvaluationStatus {
        match self.status {
            EvaluationStatus::Completed => EvaluationStatus::Completed,
            EvaluationStatus::InProgress => EvaluationStatus::InProgress,
            EvaluationStatus::Pending if self.has_activity() => EvaluationStatus::InProgress,
            EvaluationStatus::Pending => EvaluationStatus::Pending,
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        if self.status == EvaluationStatus::Pending {
            self.status = EvaluationStatus::InProgress;
        }
        self.last_updated = Some(now);
    }

    /// Sets one rating. Non-finite values are stored as zero.
    pub fn set_rating(&mut self, key: CriterionKey, value: f64, now: DateTime<Utc>) {
        let value = if value.is_finite() { value } else { 0.0 };
        self.ratings.insert(key, value);
        self.touch(now);
    }

    /// Sets one justification, replacing any earlier text for the same criterion.
    pub fn set_justification(&mut self, key: CriterionKey, text: &str, now: DateTime<Utc>) {
        self.justifications.insert(key, text.to_string());
        self.touch(now);
    }

    /// Marks the snapshot as saved without submitting it.
    pub fn save_draft(&mut self, now: DateTime<Utc>) {
        if self.has_activity() {
            self.touch(now);
        } else {
            self.last_updated = Some(now);
        }
    }

    /// Finalizes the record and copies its ratings and justifications into the rubric.
    ///
    /// Keys that no longer address a criterion are skipped. Returns how many were skipped.
    pub fn submit(&mut self, rubric: &mut Rubric, now: DateTime<Utc>) -> usize {
        let mut orphaned = 0;
        for (key, rating) in &self.ratings {
            match rubric.criterion_mut(*key) {
                Some(criterion) => criterion.rating = criterion.clamp_rating(*rating),
                None => orphaned += 1,
            }
        }
        for (key, text) in &self.justifications {
            match rubric.criterion_mut(*key) {
                Some(criterion) => criterion.justification = Some(text.clone()),
                None => orphaned += 1,
            }
        }
        if orphaned > 0 {
            debug!("Submit skipped {} keys outside the current rubric", orphaned);
        }
        self.status = EvaluationStatus::Completed;
        self.last_updated = Some(now);
        self.submitted_at = Some(now);
        orphaned
    }

    /// Returns a completed record to in-progress so it can be edited again.
    pub fn reopen(&mut self, now: DateTime<Utc>) {
        if self.status == EvaluationStatus::Completed {
            self.status = EvaluationStatus::InProgress;
            self.submitted_at = None;
            self.last_updated = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rubric::{Criterion, Section};
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 9, 30, 0).unwrap()
    }

    fn rubric() -> Rubric {
        Rubric::new(vec![Section {
            section: "Quality".into(),
            weight: 1.0,
            criteria: vec![
                Criterion {
                    description: "Clarity".into(),
                    max_rating: 5.0,
                    ..Default::default()
                },
                Criterion {
                    description: "Depth".into(),
                    max_rating: 5.0,
                    ..Default::default()
                },
            ],
        }])
    }

    #[test]
    fn first_rating_moves_pending_to_in_progress() {
        let mut record = EvaluationRecord::new();
        assert_eq!(record.effective_status(), EvaluationStatus::Pending);
        record.set_rating(CriterionKey::new(0, 1), 4.0, now());
        assert_eq!(record.status, EvaluationStatus::InProgress);
        assert_eq!(record.last_updated, Some(now()));
    }

    #[test]
    fn justification_alone_counts_as_activity() {
        let mut record = EvaluationRecord::new();
        record.set_justification(CriterionKey::new(0, 0), "well argued", now());
        assert_eq!(record.effective_status(), EvaluationStatus::InProgress);
    }

    #[test]
    fn blank_draft_stays_pending() {
        let mut record = EvaluationRecord::new();
        record.save_draft(now());
        assert_eq!(record.effective_status(), EvaluationStatus::Pending);
    }

    #[test]
    fn submit_copies_into_rubric_and_skips_orphans() {
        let mut table = rubric();
        let mut record = EvaluationRecord::new();
        record.set_rating(CriterionKey::new(0, 0), 3.0, now());
        record.set_rating(CriterionKey::new(4, 0), 5.0, now());
        record.set_justification(CriterionKey::new(0, 0), "ok", now());
        let orphaned = record.submit(&mut table, now());
        assert_eq!(orphaned, 1);
        assert!(record.is_completed());
        assert_eq!(record.submitted_at, Some(now()));
        assert_eq!(table.sections[0].criteria[0].rating, 3.0);
        assert_eq!(
            table.sections[0].criteria[0].justification.as_deref(),
            Some("ok")
        );
        assert_eq!(table.sections[0].criteria[1].rating, 0.0);
    }

    #[test]
    fn submit_clamps_ratings_copied_into_rubric() {
        let mut table = rubric();
        let mut record = EvaluationRecord::new();
        record.set_rating(CriterionKey::new(0, 0), 12.0, now());
        record.set_rating(CriterionKey::new(0, 1), -2.0, now());
        record.submit(&mut table, now());
        assert_eq!(table.sections[0].criteria[0].rating, 5.0);
        assert_eq!(table.sections[0].criteria[1].rating, 0.0);
        assert!(table.validate().is_empty());
    }

    #[test]
    fn resubmitting_identical_data_is_stable() {
        let mut table = rubric();
        let mut record = EvaluationRecord::new();
        record.set_rating(CriterionKey::new(0, 1), 2.0, now());
        record.submit(&mut table, now());
        let (first_table, first_record) = (table.clone(), record.clone());
        record.submit(&mut table, now());
        assert_eq!(table, first_table);
        assert_eq!(record, first_record);
    }

    #[test]
    fn reopen_only_affects_completed_records() {
        let mut table = rubric();
        let mut record = EvaluationRecord::new();
        record.reopen(now());
        assert_eq!(record.status, EvaluationStatus::Pending);
        record.set_rating(CriterionKey::new(0, 0), 1.0, now());
        record.submit(&mut table, now());
        record.reopen(now());
        assert_eq!(record.status, EvaluationStatus::InProgress);
        assert!(record.submitted_at.is_none());
    }

    #[test]
    fn reads_stored_record_with_string_keys() {
        let record: EvaluationRecord = serde_json::from_value(json!({
            "status": "in_progress",
            "ratings": { "0-0": 4, "0-1": "2", "bogus": 5 },
            "justifications": { "0-0": "solid", "1-0": 7 },
            "lastUpdated": "2024-05-02T09:30:00Z",
            "submittedAt": null
        }))
        .unwrap();
        assert_eq!(record.status, EvaluationStatus::InProgress);
        assert_eq!(record.ratings.len(), 2);
        assert_eq!(record.ratings[&CriterionKey::new(0, 1)], 2.0);
        assert_eq!(record.justifications.len(), 1);
        assert_eq!(record.last_updated, Some(now()));

        let written = serde_json::to_value(&record).unwrap();
        assert_eq!(written["ratings"]["0-0"], json!(4.0));
        assert_eq!(written["status"], json!("in_progress"));
    }

    #[test]
    fn unknown_status_reads_as_pending() {
        let record: EvaluationRecord =
            serde_json::from_value(json!({ "status": "archived" })).unwrap();
        assert_eq!(record.status, EvaluationStatus::Pending);
    }
}
