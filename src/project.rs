use crate::access::Caller;
use crate::binding::{assign_evaluators, BindingReport};
use crate::criterion_key::CriterionKey;
use crate::error::{EvaluationError, Result, StoreError};
use crate::evaluation::{read_evaluations, EvaluationRecord, EvaluationStatus, Evaluations};
use crate::evaluator::{EvaluatorBindings, EvaluatorRole};
use crate::report::{ProjectResults, ScoreReport};
use crate::rubric::{read_rubric, Rubric, RubricIssue};
use crate::scoring::{compare_evaluators, score};
use crate::serde_helpers::{lenient_string, lenient_timestamp};
use crate::status::{
    completed_records, ensure_quorum, evaluator_status, EvaluationCounts, ProjectStatus,
    QuorumPolicy,
};
use crate::store::{evaluation_fields, to_value, DocumentStore};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A document of the `projects` collection.
///
/// Fields:
/// - `evaluation_table`: the rubric, carrying the values of the last submit.
/// - `evaluators`: role bindings; only bound roles count towards the project status.
/// - `evaluations`: one record per role that has started evaluating.
/// - `evaluator_count_at_start`: bound evaluators when the first record was written, used
///   by `QuorumPolicy::EvaluatorsAtStart`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDocument {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub project_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub project_description: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub created_by: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "read_rubric")]
    pub evaluation_table: Rubric,
    #[serde(default)]
    pub evaluators: EvaluatorBindings,
    #[serde(default, deserialize_with = "read_evaluations")]
    pub evaluations: Evaluations,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator_count_at_start: Option<usize>,
}

impl ProjectDocument {
    /// Tally of the bound roles by record status.
    pub fn counts(&self) -> EvaluationCounts {
        EvaluationCounts::tally(&self.evaluators, &self.evaluations)
    }

    /// Project status over the bound roles.
    pub fn status(&self) -> ProjectStatus {
        self.counts().status()
    }

    /// Dashboard progress, rounded to a whole percent.
    pub fn completion_percentage(&self) -> u32 {
        self.counts().completion_percentage()
    }
}

/// A project together with the store it lives in.
///
/// Every mutation takes the calling identity explicitly, checks it against the bindings,
/// and is written to the store before the local copy changes. A failed write leaves the
/// local copy untouched.
#[derive(Clone)]
pub struct Project {
    pub document: ProjectDocument,
    store: Arc<dyn DocumentStore>,
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

impl Project {
    /// Wraps a document already read from `store`.
    pub fn new(document: ProjectDocument, store: Arc<dyn DocumentStore>) -> Self {
        Project { document, store }
    }

    /// Reads the project with the given id.
    pub fn load(store: Arc<dyn DocumentStore>, id: &str) -> std::result::Result<Self, StoreError> {
        let document = store.fetch_project(id)?;
        Ok(Project::new(document, store))
    }

    /// Replaces the local copy with the stored document.
    /// Replaces the local copy with the stored document.
    pub fn reload(&mut self) -> std::result::Result<(), StoreError> {
        self.document = self.store.fetch_project(&self.document.id)?;
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.document.id
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn rubric(&self) -> &Rubric {
        &self.document.evaluation_table
    }

    /// The role's evaluation record, if it has one.
    pub fn record(&self, role: EvaluatorRole) -> Option<&EvaluationRecord> {
        self.document.evaluations.get(&role)
    }

    pub fn evaluator_status(&self, role: EvaluatorRole) -> EvaluationStatus {
        evaluator_status(self.record(role))
    }

    pub fn counts(&self) -> EvaluationCounts {
        self.document.counts()
    }

    pub fn status(&self) -> ProjectStatus {
        self.document.status()
    }

    pub fn completion_percentage(&self) -> u32 {
        self.document.completion_percentage()
    }

    /// Roles of this project the caller evaluates.
    pub fn roles_of(&self, caller: &Caller) -> Vec<EvaluatorRole> {
        caller.roles_in(&self.document.evaluators)
    }

    fn ensure_admin(caller: &Caller) -> Result<()> {
        if caller.is_admin() {
            Ok(())
        } else {
            Err(EvaluationError::AdminOnly(caller.uid.clone()))
        }
    }

    // The record the caller is about to change, or a fresh one if the role has none yet.
    fn writable_record(&self, caller: &Caller, role: EvaluatorRole) -> Result<EvaluationRecord> {
        caller.authorize_record_write(&self.document.evaluators, role)?;
        if !self.document.evaluators.is_bound(role) {
            return Err(EvaluationError::UnboundRole(role));
        }
        let record = self.record(role).cloned().unwrap_or_default();
        if record.is_completed() && !caller.is_admin() {
            return Err(EvaluationError::RecordFinalized(role));
        }
        Ok(record)
    }

    // Writes the record, plus the evaluator snapshot when this is the first record and the
    // rubric on submit. Nothing is committed locally unless the store accepted the write.
    fn persist_record(
        &mut self,
        role: EvaluatorRole,
        record: EvaluationRecord,
        rubric: Option<Rubric>,
    ) -> Result<()> {
        let snapshot = match self.document.evaluator_count_at_start {
            Some(_) => None,
            None => Some(self.document.evaluators.bound_count()),
        };
        if snapshot.is_none() && rubric.is_none() {
            self.store
                .update_evaluation(&self.document.id, role, &record)?;
        } else {
            let mut fields = evaluation_fields(role, &record)?;
            if let Some(count) = snapshot {
                fields.insert("evaluatorCountAtStart".to_string(), Value::from(count));
            }
            if let Some(rubric) = &rubric {
                fields.insert("evaluationTable".to_string(), to_value(rubric)?);
            }
            self.store.patch_project(&self.document.id, fields)?;
        }

        if snapshot.is_some() {
            self.document.evaluator_count_at_start = snapshot;
        }
        if let Some(rubric) = rubric {
            self.document.evaluation_table = rubric;
        }
        self.document.evaluations.insert(role, record);
        Ok(())
    }

    /// Sets one rating of the role's record and saves it right away.
    ///
    /// A rating outside `[0, maxRating]` of its criterion is rejected and nothing is written.
    pub fn record_rating(
        &mut self,
        caller: &Caller,
        role: EvaluatorRole,
        key: CriterionKey,
        value: f64,
    ) -> Result<()> {
        let mut record = self.writable_record(caller, role)?;
        match self.rubric().criterion(key) {
            Some(criterion) if !criterion.accepts(value) => {
                return Err(EvaluationError::RatingOutOfRange {
                    key,
                    rating: value,
                    max_rating: criterion.max_rating,
                });
            }
            Some(_) => {}
            None => debug!("Rating {} does not address a criterion of project {}", key, self.id()),
        }
        record.set_rating(key, value, Utc::now());
        self.persist_record(role, record, None)
    }

    /// Sets one justification of the role's record and saves it right away.
    pub fn record_justification(
        &mut self,
        caller: &Caller,
        role: EvaluatorRole,
        key: CriterionKey,
        text: &str,
    ) -> Result<()> {
        let mut record = self.writable_record(caller, role)?;
        record.set_justification(key, text, Utc::now());
        self.persist_record(role, record, None)
    }

    /// Saves the role's current snapshot without submitting it.
    pub fn save_draft(&mut self, caller: &Caller, role: EvaluatorRole) -> Result<()> {
        let mut record = self.writable_record(caller, role)?;
        record.save_draft(Utc::now());
        self.persist_record(role, record, None)
    }

    /// Completes the role's evaluation and copies its values into the evaluation table.
    ///
    /// Submitting an already completed record again changes nothing. Returns how many
    /// ratings or justifications no longer matched a criterion.
    pub fn submit(&mut self, caller: &Caller, role: EvaluatorRole) -> Result<usize> {
        let mut record = match self.writable_record(caller, role) {
            Err(EvaluationError::RecordFinalized(_)) => {
                debug!("{} evaluation of {} already submitted", role, self.id());
                return Ok(0);
            }
            other => other?,
        };
        let mut rubric = self.document.evaluation_table.clone();
        let orphaned = record.submit(&mut rubric, Utc::now());
        if orphaned > 0 {
            warn!(
                "{} evaluation of {} had {} values outside the current rubric",
                role,
                self.id(),
                orphaned
            );
        }
        self.persist_record(role, record, Some(rubric))?;
        info!("{} evaluation of project {} submitted", role, self.id());
        Ok(orphaned)
    }

    /// Returns a completed evaluation to in-progress. Admins only.
    pub fn reopen(&mut self, caller: &Caller, role: EvaluatorRole) -> Result<()> {
        Self::ensure_admin(caller)?;
        let mut record = match self.record(role) {
            Some(record) if record.is_completed() => record.clone(),
            _ => return Ok(()),
        };
        record.reopen(Utc::now());
        self.persist_record(role, record, None)?;
        info!("{} evaluation of project {} reopened by {}", role, self.id(), caller.uid);
        Ok(())
    }

    /// Applies an authoring change to the evaluation table and saves it. Admins only.
    ///
    /// Existing ratings are keyed by position; changing the shape of the table while
    /// evaluations exist can make them point at different criteria. Returns the authoring
    /// problems of the resulting table.
    pub fn edit_rubric<F>(&mut self, caller: &Caller, edit: F) -> Result<Vec<RubricIssue>>
    where
        F: FnOnce(&mut Rubric),
    {
        Self::ensure_admin(caller)?;
        let mut rubric = self.document.evaluation_table.clone();
        edit(&mut rubric);
        let reshaped = !rubric.keys().eq(self.document.evaluation_table.keys());
        if reshaped && !self.document.evaluations.is_empty() {
            warn!(
                "Evaluation table of {} reshaped while {} evaluations exist",
                self.id(),
                self.document.evaluations.len()
            );
        }
        self.store
            .update_evaluation_table(&self.document.id, &rubric)?;
        let issues = rubric.validate();
        self.document.evaluation_table = rubric;
        Ok(issues)
    }

    /// Rebinds the evaluator roles and updates the affected users. Admins only.
    pub fn assign_evaluators(
        &mut self,
        caller: &Caller,
        bindings: EvaluatorBindings,
    ) -> Result<BindingReport> {
        Self::ensure_admin(caller)?;
        let mut document = self.document.clone();
        document.evaluators = bindings;
        let report = assign_evaluators(self.store.as_ref(), document, &self.document.evaluators)?;
        self.document = report.project.clone();
        Ok(report)
    }

    /// Deletes the project document. Admins only.
    pub fn delete(self, caller: &Caller) -> Result<()> {
        Self::ensure_admin(caller)?;
        self.store.delete_project(&self.document.id)?;
        Ok(())
    }

    /// Full-precision scores of every completed evaluation, once the quorum is met.
    pub fn results(&self, policy: QuorumPolicy) -> Result<ProjectResults> {
        let completed = completed_records(&self.document.evaluations);
        let required = policy.required(
            self.document.evaluator_count_at_start,
            self.document.evaluators.bound_count(),
        );
        ensure_quorum(completed, required)?;

        let rubric = &self.document.evaluation_table;
        let finished: Vec<(EvaluatorRole, &EvaluationRecord)> = self
            .document
            .evaluations
            .iter()
            .filter(|(_, record)| record.is_completed())
            .map(|(role, record)| (*role, record))
            .collect();
        Ok(ProjectResults {
            project_id: self.document.id.clone(),
            project_name: self.document.project_name.clone(),
            completed,
            required,
            cards: finished
                .iter()
                .map(|(role, record)| (*role, score(rubric, &record.ratings)))
                .collect(),
            comparison: compare_evaluators(
                rubric,
                finished.iter().map(|(role, record)| (*role, &record.ratings)),
            ),
            rubric: rubric.clone(),
        })
    }

    /// Rounded form of `results`.
    pub fn score_report(&self, policy: QuorumPolicy) -> Result<ScoreReport> {
        self.results(policy).map(|results| ScoreReport::from(&results))
    }
}
