use crate::error::{EvaluationError, Result};
use crate::evaluator::{EvaluatorBindings, EvaluatorRole};
use crate::user::{User, UserRole};
use serde::{Deserialize, Serialize};

/// Identity of whoever is calling, as supplied by the auth provider.
///
/// Passed explicitly into every workflow call so the evaluation core never reaches for
/// ambient session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub uid: String,
    pub email: String,
    pub role: UserRole,
}

impl Caller {
    /// Creates a caller with an explicit account role.
    pub fn new(uid: &str, email: &str, role: UserRole) -> Self {
        Caller {
            uid: uid.to_string(),
            email: email.to_string(),
            role,
        }
    }

    /// Shorthand for an administrator.
    pub fn admin(uid: &str, email: &str) -> Self {
        Caller::new(uid, email, UserRole::Admin)
    }

    /// Shorthand for an evaluator.
    pub fn evaluator(uid: &str, email: &str) -> Self {
        Caller::new(uid, email, UserRole::Evaluator)
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Roles of the project bound to this caller.
    pub fn roles_in(&self, bindings: &EvaluatorBindings) -> Vec<EvaluatorRole> {
        bindings.roles_for(&self.uid, &self.email)
    }

    /// Admins may write every record; anyone else only the records of roles bound to them.
    pub fn authorize_record_write(
        &self,
        bindings: &EvaluatorBindings,
        role: EvaluatorRole,
    ) -> Result<()> {
        if self.is_admin() || self.roles_in(bindings).contains(&role) {
            Ok(())
        } else {
            Err(EvaluationError::Unauthorized {
                uid: self.uid.clone(),
                role,
            })
        }
    }
}

impl From<&User> for Caller {
    fn from(user: &User) -> Self {
        Caller {
            uid: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}
