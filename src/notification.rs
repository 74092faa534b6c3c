use crate::evaluator::EvaluatorRole;
use crate::serde_helpers::{lenient_string, lenient_timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A document of the `notifications` collection.
///
/// Only creation happens here; delivery and the read flag are handled by the clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(default, skip_serializing_if = "String::is_empty", deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub project_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Notification {
    /// Tells a user they were bound to a role of a project.
    pub fn assignment(
        user_id: &str,
        project_id: &str,
        project_name: &str,
        role: EvaluatorRole,
        now: DateTime<Utc>,
    ) -> Self {
        Notification {
            id: String::new(),
            user_id: user_id.to_string(),
            project_id: project_id.to_string(),
            message: format!(
                "You have been assigned as {} evaluator of project \"{}\"",
                role, project_name
            ),
            read: false,
            created_at: Some(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn assignment_message_names_role_and_project() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let notification = Notification::assignment("u1", "p1", "Bridge", EvaluatorRole::Vk, now);
        assert_eq!(
            notification.message,
            "You have been assigned as VK evaluator of project \"Bridge\""
        );
        assert!(!notification.read);

        let stored = serde_json::to_value(&notification).unwrap();
        assert_eq!(stored["userId"], json!("u1"));
        assert_eq!(stored["projectId"], json!("p1"));
        assert!(stored.get("id").is_none());
    }
}
