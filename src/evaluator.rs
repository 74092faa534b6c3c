use crate::serde_helpers::{keyed_entries, lenient_string};
use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The evaluator roles a project can bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EvaluatorRole {
    #[serde(rename = "PV1")]
    Pv1,
    #[serde(rename = "PV2")]
    Pv2,
    #[serde(rename = "VK")]
    Vk,
}

impl EvaluatorRole {
    pub const ALL: [EvaluatorRole; 3] = [EvaluatorRole::Pv1, EvaluatorRole::Pv2, EvaluatorRole::Vk];

    /// Key of the role in stored documents: `PV1`, `PV2` or `VK`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluatorRole::Pv1 => "PV1",
            EvaluatorRole::Pv2 => "PV2",
            EvaluatorRole::Vk => "VK",
        }
    }
}

impl fmt::Display for EvaluatorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvaluatorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PV1" => Ok(EvaluatorRole::Pv1),
            "PV2" => Ok(EvaluatorRole::Pv2),
            "VK" => Ok(EvaluatorRole::Vk),
            other => Err(format!("unknown evaluator role {}", other)),
        }
    }
}

/// The user a role is bound to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorBinding {
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub uid: String,
}

impl EvaluatorBinding {
    /// A binding by email and uid.
    pub fn new(email: &str, uid: &str) -> Self {
        EvaluatorBinding {
            email: email.to_string(),
            uid: uid.to_string(),
        }
    }

    /// A binding with neither email nor uid counts as unbound.
    pub fn is_empty(&self) -> bool {
        self.email.trim().is_empty() && self.uid.trim().is_empty()
    }
}

/// Role to user bindings of one project.
///
/// A role is either absent or bound to exactly one identity. Empty bindings found in stored
/// documents are dropped on read.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EvaluatorBindings {
    bindings: BTreeMap<EvaluatorRole, EvaluatorBinding>,
}

impl EvaluatorBindings {
    pub fn new() -> Self {
        EvaluatorBindings::default()
    }

    /// Binds `role`, replacing any previous binding. An empty binding unbinds the role.
    pub fn bind(&mut self, role: EvaluatorRole, binding: EvaluatorBinding) {
        if binding.is_empty() {
            self.bindings.remove(&role);
        } else {
            self.bindings.insert(role, binding);
        }
    }

    /// Removes the role's binding, returning it if there was one.
    pub fn unbind(&mut self, role: EvaluatorRole) -> Option<EvaluatorBinding> {
        self.bindings.remove(&role)
    }

    pub fn get(&self, role: EvaluatorRole) -> Option<&EvaluatorBinding> {
        self.bindings.get(&role)
    }

    pub fn is_bound(&self, role: EvaluatorRole) -> bool {
        self.bindings.contains_key(&role)
    }

    /// Number of roles with a non-empty binding.
    pub fn bound_count(&self) -> usize {
        self.bindings.len()
    }

    /// Bound roles with their bindings, in role order.
    pub fn iter(&self) -> impl Iterator<Item = (EvaluatorRole, &EvaluatorBinding)> {
        self.bindings.iter().map(|(role, binding)| (*role, binding))
    }

    /// Roles bound to the given identity. A binding without uid falls back to the email.
    pub fn roles_for(&self, uid: &str, email: &str) -> Vec<EvaluatorRole> {
        self.iter()
            .filter(|(_, binding)| {
                if binding.uid.is_empty() {
                    !email.is_empty() && binding.email.eq_ignore_ascii_case(email)
                } else {
                    binding.uid == uid
                }
            })
            .map(|(role, _)| role)
            .collect()
    }
}

impl<'de> Deserialize<'de> for EvaluatorBindings {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut bindings = EvaluatorBindings::new();
        for (role, value) in keyed_entries::<D, EvaluatorRole>(deserializer, "evaluator role")? {
            match serde_json::from_value::<EvaluatorBinding>(value) {
                Ok(binding) => bindings.bind(role, binding),
                Err(e) => warn!("Dropping unreadable binding for {}: {}", role, e),
            }
        }
        Ok(bindings)
    }
}
