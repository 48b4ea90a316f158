use serde::{Deserialize, Serialize};

use crate::UserId;

/// Caller information supplied by the authentication layer on every check.
///
/// The engine never authenticates; it only authorizes against these fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    user_id: UserId,
    job: String,
    grade: i32,
    superuser: bool,
}

impl CallerIdentity {
    /// Creates a caller identity from session data.
    #[must_use]
    pub fn new(user_id: UserId, job: impl Into<String>, grade: i32) -> Self {
        Self {
            user_id,
            job: job.into(),
            grade,
            superuser: false,
        }
    }

    /// Marks the identity as superuser, bypassing all grant checks.
    #[must_use]
    pub fn with_superuser(mut self, superuser: bool) -> Self {
        self.superuser = superuser;
        self
    }

    /// Returns the caller's account id.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns the caller's current job.
    #[must_use]
    pub fn job(&self) -> &str {
        self.job.as_str()
    }

    /// Returns the caller's grade inside the current job.
    #[must_use]
    pub fn grade(&self) -> i32 {
        self.grade
    }

    /// Returns whether the caller bypasses grant checks.
    #[must_use]
    pub fn is_superuser(&self) -> bool {
        self.superuser
    }
}
