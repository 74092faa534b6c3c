use crate::access::Caller;
use crate::error::StoreError;
use crate::evaluation::EvaluationRecord;
use crate::evaluator::EvaluatorRole;
use crate::notification::Notification;
use crate::project::{Project, ProjectDocument};
use crate::rest_store::RestStore;
use crate::rubric::Rubric;
use crate::user::User;
use crate::StoreCredentials;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;
use log::warn;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

// Collection names.
pub const USERS: &str = "users";
pub const PROJECTS: &str = "projects";
pub const NOTIFICATIONS: &str = "notifications";

/// The hosted document database, seen through the operations the evaluation workflow needs.
///
/// `patch_project` and `patch_user` are field-level updates: each key of `fields` replaces
/// one field, and a dotted key such as `evaluations.PV1` replaces a nested field. Two
/// evaluators writing their own role therefore touch disjoint fields of the same project
/// and the last write per field wins.
pub trait DocumentStore: Send + Sync {
    fn fetch_project(&self, id: &str) -> Result<ProjectDocument, StoreError>;

    fn fetch_projects(&self) -> Result<Vec<ProjectDocument>, StoreError>;

    /// Writes the whole project. An empty id creates a new document; the id is returned.
    fn save_project(&self, project: &ProjectDocument) -> Result<String, StoreError>;

    fn patch_project(&self, id: &str, fields: Map<String, Value>) -> Result<(), StoreError>;

    fn delete_project(&self, id: &str) -> Result<(), StoreError>;

    fn fetch_user(&self, uid: &str) -> Result<User, StoreError>;

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    fn patch_user(&self, uid: &str, fields: Map<String, Value>) -> Result<(), StoreError>;

    fn create_notification(&self, notification: &Notification) -> Result<String, StoreError>;

    /// Overwrites one role's evaluation record and nothing else.
    fn update_evaluation(
        &self,
        project_id: &str,
        role: EvaluatorRole,
        record: &EvaluationRecord,
    ) -> Result<(), StoreError> {
        self.patch_project(project_id, evaluation_fields(role, record)?)
    }

    /// Overwrites the project's rubric.
    fn update_evaluation_table(&self, project_id: &str, rubric: &Rubric) -> Result<(), StoreError> {
        let mut fields = Map::new();
        fields.insert("evaluationTable".to_string(), to_value(rubric)?);
        self.patch_project(project_id, fields)
    }

    /// Overwrites a user's `assignedProjects` list.
    fn update_assigned_projects(
        &self,
        uid: &str,
        assigned_projects: &BTreeSet<String>,
    ) -> Result<(), StoreError> {
        let mut fields = Map::new();
        fields.insert("assignedProjects".to_string(), to_value(assigned_projects)?);
        self.patch_user(uid, fields)
    }

    /// Projects visible to the caller: all of them for an admin, otherwise the ones listed
    /// in the caller's `assignedProjects`. Stale entries pointing at deleted projects are
    /// skipped.
    fn fetch_projects_for_caller(&self, caller: &Caller) -> Result<Vec<ProjectDocument>, StoreError> {
        if caller.is_admin() {
            return self.fetch_projects();
        }
        let user = self.fetch_user(&caller.uid)?;
        let mut projects = Vec::with_capacity(user.assigned_projects.len());
        for id in &user.assigned_projects {
            match self.fetch_project(id) {
                Ok(project) => projects.push(project),
                Err(StoreError::NotFound(_)) => {
                    warn!("User {} is assigned to missing project {}", caller.uid, id)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(projects)
    }
}

/// Field path of one role's record inside a project document.
pub fn evaluation_field(role: EvaluatorRole) -> String {
    format!("evaluations.{}", role.as_str())
}

/// Patch fields replacing one role's record.
pub fn evaluation_fields(
    role: EvaluatorRole,
    record: &EvaluationRecord,
) -> Result<Map<String, Value>, StoreError> {
    let mut fields = Map::new();
    fields.insert(evaluation_field(role), to_value(record)?);
    Ok(fields)
}

pub(crate) fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Malformed(e.to_string()))
}

/// Outcome of fetching several projects.
pub enum StoreResultProjects {
    Ok(Vec<Project>),
    ErrConnection(String),
    ErrCredentials(String),
}

/// Outcome of fetching one project.
pub enum StoreResultSingleProject {
    Ok(Project),
    ErrConnection(String),
    ErrCredentials(String),
}

/// Entry point for working against the hosted store with a set of credentials.
pub struct Store {}

impl Store {
    /// Fetches the projects visible to `caller`.
    pub fn fetch_projects_with_credentials(
        info: &StoreCredentials,
        caller: &Caller,
    ) -> StoreResultProjects {
        let store: Arc<dyn DocumentStore> = Arc::new(RestStore::new(info.clone()));
        match store.fetch_projects_for_caller(caller) {
            Ok(documents) => StoreResultProjects::Ok(
                documents
                    .into_iter()
                    .map(|document| Project::new(document, Arc::clone(&store)))
                    .collect(),
            ),
            Err(StoreError::PermissionDenied(msg)) => StoreResultProjects::ErrCredentials(
                format!("Failed to fetch projects: permission denied for {}", msg),
            ),
            Err(e) => {
                StoreResultProjects::ErrConnection(format!("Failed to fetch projects: {}", e))
            }
        }
    }

    /// Fetches one project by id.
    pub fn fetch_single_project_with_credentials(
        info: &StoreCredentials,
        project_id: &str,
    ) -> StoreResultSingleProject {
        let store: Arc<dyn DocumentStore> = Arc::new(RestStore::new(info.clone()));
        match Project::load(store, project_id) {
            Ok(project) => StoreResultSingleProject::Ok(project),
            Err(StoreError::PermissionDenied(msg)) => StoreResultSingleProject::ErrCredentials(
                format!("Failed to fetch project: permission denied for {}", msg),
            ),
            Err(e) => {
                StoreResultSingleProject::ErrConnection(format!("Failed to fetch project: {}", e))
            }
        }
    }

    /// Lets the caller pick one of their projects from a terminal menu.
    pub fn choose_project(caller: &Caller) -> Result<Option<Project>, String> {
        let credentials = StoreCredentials::credentials()?;
        let projects = match Store::fetch_projects_with_credentials(&credentials, caller) {
            StoreResultProjects::Ok(projects) => projects,
            StoreResultProjects::ErrConnection(msg) => {
                return Err(format!("Connection error: {}", msg))
            }
            StoreResultProjects::ErrCredentials(msg) => {
                return Err(format!("Credential error: {}", msg))
            }
        };

        let mut menu_str: Vec<String> = projects
            .iter()
            .map(|project| {
                format!(
                    "{} [{} - {}%]",
                    project.document.project_name,
                    project.status().as_str(),
                    project.completion_percentage()
                )
            })
            .collect();
        menu_str.push("EXIT".to_string());

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Choose a project")
            .items(&menu_str)
            .default(0)
            .interact()
            .map_err(|e| e.to_string())?;

        if selection == menu_str.len() - 1 {
            return Ok(None);
        }
        Ok(projects.into_iter().nth(selection))
    }
}
