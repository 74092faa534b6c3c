use crate::serde_helpers::lenient_string;
use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Account role as stored on the user document. Anything other than `admin` is treated as
/// an evaluator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    #[default]
    #[serde(other)]
    Evaluator,
}

/// A document of the `users` collection.
///
/// `assigned_projects` is a denormalized back-reference maintained by the assignment saga,
/// letting evaluators discover their projects without querying the whole collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: String,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default, deserialize_with = "read_assigned_projects")]
    pub assigned_projects: BTreeSet<String>,
}

fn read_assigned_projects<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(id) if !id.is_empty() => Some(id),
                other => {
                    warn!("Ignoring assigned project entry {}", other);
                    None
                }
            })
            .collect(),
        Value::Null => BTreeSet::new(),
        other => {
            warn!("Expected a list of assigned projects, found {}", other);
            BTreeSet::new()
        }
    })
}

impl User {
    /// A user with no assigned projects.
    pub fn new(id: &str, email: &str, role: UserRole) -> Self {
        User {
            id: id.to_string(),
            email: email.to_string(),
            role,
            assigned_projects: BTreeSet::new(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Adds the project to the user's assignments. Returns `false` if it was already there.
    pub fn assign_project(&mut self, project_id: &str) -> bool {
        self.assigned_projects.insert(project_id.to_string())
    }

    /// Removes a project id. Returns false if it was not there.
    pub fn unassign_project(&mut self, project_id: &str) -> bool {
        self.assigned_projects.remove(project_id)
    }

    pub fn is_assigned_to(&self, project_id: &str) -> bool {
        self.assigned_projects.contains(project_id)
    }
}
