use crate::access::Caller;
use crate::binding::{assign_evaluators, BindingReport};
use crate::error::{EvaluationError, Result};
use crate::evaluator::EvaluatorBindings;
use crate::project::{Project, ProjectDocument};
use crate::rubric::{Rubric, RubricIssue};
use crate::store::DocumentStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::from_reader;
use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

/// A project as authored by an administrator, before it exists in the store.
///
/// ```json
/// {
///   "projectName": "Bridge",
///   "projectDescription": "Pedestrian bridge",
///   "evaluationTable": [{"section": "Design", "weight": 1, "criteria": [{"description": "Clarity", "maxRating": 10}]}],
///   "evaluators": {"PV1": {"email": "ana@x.org", "uid": "ana"}}
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDraft {
    pub project_name: String,
    #[serde(default)]
    pub project_description: String,
    #[serde(default)]
    pub evaluation_table: Rubric,
    #[serde(default)]
    pub evaluators: EvaluatorBindings,
}

impl ProjectDraft {
    /// Loads a `ProjectDraft` from a JSON file.
    pub fn load_from_json(file_path: &str) -> std::result::Result<Self, Box<dyn Error>> {
        let file = File::open(file_path)?;
        let reader = BufReader::new(file);
        let draft: ProjectDraft = from_reader(reader)?;
        Ok(draft)
    }

    /// Authoring problems of the draft's rubric.
    pub fn validate(&self) -> Vec<RubricIssue> {
        self.evaluation_table.validate()
    }

    /// The document to create, without id and with no evaluations yet.
    pub fn into_document(self, created_by: &str) -> ProjectDocument {
        ProjectDocument {
            id: String::new(),
            project_name: self.project_name,
            project_description: self.project_description,
            created_by: created_by.to_string(),
            created_at: Some(Utc::now()),
            evaluation_table: self.evaluation_table,
            evaluators: self.evaluators,
            evaluations: Default::default(),
            evaluator_count_at_start: None,
        }
    }

    /// Creates the project and assigns its evaluators. Admins only.
    pub fn create(
        self,
        store: Arc<dyn DocumentStore>,
        caller: &Caller,
    ) -> Result<(Project, BindingReport)> {
        if !caller.is_admin() {
            return Err(EvaluationError::AdminOnly(caller.uid.clone()));
        }
        let document = self.into_document(&caller.uid);
        let report = assign_evaluators(store.as_ref(), document, &EvaluatorBindings::new())?;
        Ok((Project::new(report.project.clone(), store), report))
    }
}
