//! Binding evaluators to a project.
//!
//! The project document and the users' `assignedProjects` back-references live in
//! different documents and cannot be written atomically. The project is saved first; every
//! user update and notification after that is attempted independently and a failure is
//! reported instead of aborting the rest. `BindingReport::retry` re-runs only the failed
//! steps.

use crate::error::{Result, StoreError};
use crate::evaluator::{EvaluatorBinding, EvaluatorBindings, EvaluatorRole};
use crate::notification::Notification;
use crate::project::ProjectDocument;
use crate::store::{to_value, DocumentStore};
use chrono::Utc;
use log::{info, warn};
use serde_json::Map;
use std::collections::BTreeSet;

type StoreResult<T> = std::result::Result<T, StoreError>;

/// The step of the assignment that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingStep {
    /// No user could be found for a binding given only by email.
    ResolveUser,
    /// Adding the project to the user's `assignedProjects`.
    AssignProject,
    /// Removing the project from a user who lost every role in it.
    UnassignProject,
    Notify,
}

#[derive(Debug, Clone, PartialEq)]
/// One step of the assignment that did not go through.
pub struct BindingFailure {
    pub step: BindingStep,
    /// `None` for an unassignment, which concerns the user rather than a role.
    pub role: Option<EvaluatorRole>,
    pub uid: String,
    pub email: String,
    pub error: String,
}

/// Outcome of an assignment: the saved project and whatever did not go through.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingReport {
    pub project: ProjectDocument,
    pub failures: Vec<BindingFailure>,
}

impl BindingReport {
    /// True when every step succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Re-runs the failed steps against the saved project.
    pub fn retry(&self, store: &dyn DocumentStore) -> Result<BindingReport> {
        let mut project = self.project.clone();
        let mut failures = Vec::new();
        for failure in &self.failures {
            match (failure.step, failure.role) {
                (BindingStep::ResolveUser, Some(role)) => {
                    match resolve_uid(store, &failure.email) {
                        Ok(Some(uid)) => {
                            project
                                .evaluators
                                .bind(role, EvaluatorBinding::new(&failure.email, &uid));
                            save_bindings(store, &project)?;
                            link_role(store, &project, role, &uid, &failure.email, &mut failures);
                        }
                        Ok(None) => failures.push(failure.clone()),
                        Err(e) => failures.push(BindingFailure {
                            error: e.to_string(),
                            ..failure.clone()
                        }),
                    }
                }
                (BindingStep::AssignProject, Some(role)) => {
                    link_role(store, &project, role, &failure.uid, &failure.email, &mut failures)
                }
                (BindingStep::Notify, Some(role)) => {
                    if let Err(e) = notify(store, &project, role, &failure.uid) {
                        failures.push(BindingFailure {
                            error: e.to_string(),
                            ..failure.clone()
                        });
                    }
                }
                _ => {
                    if let Err(e) = unlink_user(store, &failure.uid, &project.id) {
                        failures.push(BindingFailure {
                            error: e.to_string(),
                            ..failure.clone()
                        });
                    }
                }
            }
        }
        Ok(BindingReport { project, failures })
    }
}

fn resolve_uid(store: &dyn DocumentStore, email: &str) -> StoreResult<Option<String>> {
    if email.trim().is_empty() {
        return Ok(None);
    }
    Ok(store.find_user_by_email(email)?.map(|user| user.id))
}

// Adds the project to the user's back-references; true if it was not there yet.
fn link_user(store: &dyn DocumentStore, uid: &str, project_id: &str) -> StoreResult<bool> {
    let mut user = store.fetch_user(uid)?;
    if !user.assign_project(project_id) {
        return Ok(false);
    }
    store.update_assigned_projects(uid, &user.assigned_projects)?;
    Ok(true)
}

fn unlink_user(store: &dyn DocumentStore, uid: &str, project_id: &str) -> StoreResult<()> {
    let mut user = store.fetch_user(uid)?;
    if user.unassign_project(project_id) {
        store.update_assigned_projects(uid, &user.assigned_projects)?;
    }
    Ok(())
}

fn notify(
    store: &dyn DocumentStore,
    project: &ProjectDocument,
    role: EvaluatorRole,
    uid: &str,
) -> StoreResult<()> {
    let notification =
        Notification::assignment(uid, &project.id, &project.project_name, role, Utc::now());
    store.create_notification(&notification)?;
    Ok(())
}

// Links one role's user and notifies them when the link is new.
fn link_role(
    store: &dyn DocumentStore,
    project: &ProjectDocument,
    role: EvaluatorRole,
    uid: &str,
    email: &str,
    failures: &mut Vec<BindingFailure>,
) {
    let failure = |step: BindingStep, e: StoreError| BindingFailure {
        step,
        role: Some(role),
        uid: uid.to_string(),
        email: email.to_string(),
        error: e.to_string(),
    };
    match link_user(store, uid, &project.id) {
        Ok(true) => {
            if let Err(e) = notify(store, project, role, uid) {
                warn!("Could not notify {} about project {}: {}", uid, project.id, e);
                failures.push(failure(BindingStep::Notify, e));
            }
        }
        Ok(false) => {}
        Err(e) => {
            warn!("Could not assign project {} to {}: {}", project.id, uid, e);
            failures.push(failure(BindingStep::AssignProject, e));
        }
    }
}

// Writes only the bindings of an existing project, or the whole document for a new one.
fn save_bindings(store: &dyn DocumentStore, project: &ProjectDocument) -> StoreResult<String> {
    if project.id.is_empty() {
        return store.save_project(project);
    }
    let mut fields = Map::new();
    fields.insert("evaluators".to_string(), to_value(&project.evaluators)?);
    store.patch_project(&project.id, fields)?;
    Ok(project.id.clone())
}

fn bound_uids(bindings: &EvaluatorBindings) -> BTreeSet<String> {
    bindings
        .iter()
        .filter(|(_, binding)| !binding.uid.is_empty())
        .map(|(_, binding)| binding.uid.clone())
        .collect()
}

/// Saves `project` with its new bindings, then brings the affected users in line.
///
/// `previous` holds the bindings before the change; users found there and nowhere in the
/// new bindings lose the back-reference. Bindings given only by email are resolved to a
/// user first. Fails only if the project itself cannot be saved.
pub fn assign_evaluators(
    store: &dyn DocumentStore,
    mut project: ProjectDocument,
    previous: &EvaluatorBindings,
) -> Result<BindingReport> {
    let mut failures = Vec::new();

    let unresolved: Vec<(EvaluatorRole, EvaluatorBinding)> = project
        .evaluators
        .iter()
        .filter(|(_, binding)| binding.uid.is_empty())
        .map(|(role, binding)| (role, binding.clone()))
        .collect();
    for (role, binding) in unresolved {
        match resolve_uid(store, &binding.email) {
            Ok(Some(uid)) => project
                .evaluators
                .bind(role, EvaluatorBinding::new(&binding.email, &uid)),
            outcome => {
                let error = match outcome {
                    Err(e) => e.to_string(),
                    _ => format!("no user with email {}", binding.email),
                };
                failures.push(BindingFailure {
                    step: BindingStep::ResolveUser,
                    role: Some(role),
                    uid: String::new(),
                    email: binding.email.clone(),
                    error,
                });
            }
        }
    }

    project.id = save_bindings(store, &project)?;
    info!(
        "Saved {} evaluators of project {} ({})",
        project.evaluators.bound_count(),
        project.id,
        project.project_name
    );

    let bindings: Vec<(EvaluatorRole, EvaluatorBinding)> = project
        .evaluators
        .iter()
        .filter(|(_, binding)| !binding.uid.is_empty())
        .map(|(role, binding)| (role, binding.clone()))
        .collect();
    for (role, binding) in bindings {
        link_role(store, &project, role, &binding.uid, &binding.email, &mut failures);
    }

    let still_bound = bound_uids(&project.evaluators);
    for uid in bound_uids(previous).difference(&still_bound) {
        if let Err(e) = unlink_user(store, uid, &project.id) {
            warn!("Could not unassign project {} from {}: {}", project.id, uid, e);
            failures.push(BindingFailure {
                step: BindingStep::UnassignProject,
                role: None,
                uid: uid.clone(),
                email: String::new(),
                error: e.to_string(),
            });
        }
    }

    Ok(BindingReport { project, failures })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::InMemoryStore;
    use crate::store::NOTIFICATIONS;
    use crate::user::{User, UserRole};

    fn store() -> InMemoryStore {
        let store = InMemoryStore::new();
        for (uid, email) in [("ana", "ana@x.org"), ("bo", "bo@x.org"), ("cy", "cy@x.org")] {
            store
                .insert_user(&User::new(uid, email, UserRole::Evaluator))
                .unwrap();
        }
        store
    }

    fn project(bindings: &[(EvaluatorRole, &str, &str)]) -> ProjectDocument {
        let mut project = ProjectDocument {
            project_name: "Bridge".into(),
            ..Default::default()
        };
        for (role, email, uid) in bindings {
            project
                .evaluators
                .bind(*role, EvaluatorBinding::new(email, uid));
        }
        project
    }

    #[test]
    fn new_project_links_users_and_notifies_once() {
        let store = store();
        let report = assign_evaluators(
            &store,
            project(&[
                (EvaluatorRole::Pv1, "ana@x.org", "ana"),
                (EvaluatorRole::Pv2, "bo@x.org", ""),
            ]),
            &EvaluatorBindings::new(),
        )
        .unwrap();
        assert!(report.is_complete());
        let id = report.project.id.clone();
        assert!(!id.is_empty());
        assert!(store.fetch_user("ana").unwrap().is_assigned_to(&id));
        assert!(store.fetch_user("bo").unwrap().is_assigned_to(&id));
        assert_eq!(
            report.project.evaluators.get(EvaluatorRole::Pv2).unwrap().uid,
            "bo"
        );
        assert_eq!(store.documents(NOTIFICATIONS).len(), 2);

        // Saving the same bindings again neither duplicates nor re-notifies.
        let again = assign_evaluators(&store, report.project.clone(), &report.project.evaluators)
            .unwrap();
        assert!(again.is_complete());
        assert_eq!(store.fetch_user("ana").unwrap().assigned_projects.len(), 1);
        assert_eq!(store.documents(NOTIFICATIONS).len(), 2);
    }

    #[test]
    fn unknown_email_is_reported_and_retried() {
        let store = store();
        let report = assign_evaluators(
            &store,
            project(&[(EvaluatorRole::Vk, "dee@x.org", "")]),
            &EvaluatorBindings::new(),
        )
        .unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].step, BindingStep::ResolveUser);

        store
            .insert_user(&User::new("dee", "dee@x.org", UserRole::Evaluator))
            .unwrap();
        let retried = report.retry(&store).unwrap();
        assert!(retried.is_complete());
        assert_eq!(
            retried.project.evaluators.get(EvaluatorRole::Vk).unwrap().uid,
            "dee"
        );
        let stored = store.fetch_project(&retried.project.id).unwrap();
        assert_eq!(stored.evaluators, retried.project.evaluators);
        assert!(store.fetch_user("dee").unwrap().is_assigned_to(&stored.id));
    }

    #[test]
    fn replaced_evaluator_loses_back_reference() {
        let store = store();
        let first = assign_evaluators(
            &store,
            project(&[(EvaluatorRole::Pv1, "ana@x.org", "ana")]),
            &EvaluatorBindings::new(),
        )
        .unwrap();
        let previous = first.project.evaluators.clone();
        let mut changed = first.project.clone();
        changed
            .evaluators
            .bind(EvaluatorRole::Pv1, EvaluatorBinding::new("cy@x.org", "cy"));
        let second = assign_evaluators(&store, changed, &previous).unwrap();
        assert!(second.is_complete());
        assert!(!store.fetch_user("ana").unwrap().is_assigned_to(&first.project.id));
        assert!(store.fetch_user("cy").unwrap().is_assigned_to(&first.project.id));
    }

    #[test]
    fn failed_notification_is_retried_alone() {
        let store = store();
        store.fail_notifications(true);
        let report = assign_evaluators(
            &store,
            project(&[(EvaluatorRole::Pv1, "ana@x.org", "ana")]),
            &EvaluatorBindings::new(),
        )
        .unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].step, BindingStep::Notify);
        assert!(store.fetch_user("ana").unwrap().is_assigned_to(&report.project.id));

        store.fail_notifications(false);
        assert!(report.retry(&store).unwrap().is_complete());
        assert_eq!(store.documents(NOTIFICATIONS).len(), 1);
    }
}
