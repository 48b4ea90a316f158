use std::collections::BTreeSet;
use std::fmt::Debug;

use citadel_core::{AppError, AppResult, GrantId, TargetId, UserId};
use serde::{Deserialize, Serialize};

use crate::AccessLevel;

/// Maximum length of a job name inside a job grant.
pub const MAX_JOB_NAME_LENGTH: usize = 50;

/// Common shape of job and user grants used by reconciliation.
pub trait AccessGrant: Clone + Debug {
    /// Caller-meaningful identity used for matching.
    type Key: Ord + Clone + Debug;

    /// Access level family of the grant.
    type Level: AccessLevel;

    /// Returns the natural key of the grant.
    fn natural_key(&self) -> Self::Key;

    /// Returns the server-assigned id, if the grant was persisted.
    fn grant_id(&self) -> Option<GrantId>;

    /// Returns the grant with the provided server-assigned id.
    fn with_grant_id(self, grant_id: GrantId) -> Self;

    /// Returns the granted level.
    fn access(&self) -> Self::Level;
}

/// Natural key of a job grant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobGrantKey {
    /// Job name.
    pub job: String,
    /// Minimum grade threshold.
    pub minimum_grade: i32,
}

/// Any member of `job` at grade >= `minimum_grade` has at least `access`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobAccessGrant<L> {
    /// Row id, absent until persisted.
    pub id: Option<GrantId>,
    /// Protected resource.
    pub target_id: TargetId,
    /// Job name.
    pub job: String,
    /// Minimum grade threshold, inclusive.
    pub minimum_grade: i32,
    /// Granted level.
    pub access: L,
}

impl<L: AccessLevel> JobAccessGrant<L> {
    /// Creates a validated, not yet persisted job grant.
    pub fn new(
        target_id: TargetId,
        job: impl Into<String>,
        minimum_grade: i32,
        access: L,
    ) -> AppResult<Self> {
        let grant = Self {
            id: None,
            target_id,
            job: job.into().trim().to_owned(),
            minimum_grade,
            access,
        };
        grant.validate()?;

        Ok(grant)
    }

    /// Checks the job name bounds and the grade threshold.
    ///
    /// Bounds apply to the trimmed name, the form stored and matched.
    pub fn validate(&self) -> AppResult<()> {
        let job = self.job.trim();
        if job.is_empty() {
            return Err(AppError::Validation(
                "job grant job name must not be empty".to_owned(),
            ));
        }

        if job.chars().count() > MAX_JOB_NAME_LENGTH {
            return Err(AppError::Validation(format!(
                "job grant job name '{job}' exceeds {MAX_JOB_NAME_LENGTH} characters"
            )));
        }

        if self.minimum_grade < 0 {
            return Err(AppError::Validation(format!(
                "job grant minimum grade must be >= 0, got {} for job '{}'",
                self.minimum_grade, self.job
            )));
        }

        Ok(())
    }

    /// Returns whether a member of `job` at `grade` is covered by this grant.
    #[must_use]
    pub fn covers(&self, job: &str, grade: i32) -> bool {
        self.job == job && self.minimum_grade <= grade
    }
}

impl<L: AccessLevel> AccessGrant for JobAccessGrant<L> {
    type Key = JobGrantKey;
    type Level = L;

    fn natural_key(&self) -> Self::Key {
        JobGrantKey {
            job: self.job.clone(),
            minimum_grade: self.minimum_grade,
        }
    }

    fn grant_id(&self) -> Option<GrantId> {
        self.id
    }

    fn with_grant_id(mut self, grant_id: GrantId) -> Self {
        self.id = Some(grant_id);
        self
    }

    fn access(&self) -> Self::Level {
        self.access
    }
}

/// User `user_id` has at least `access`, independent of their job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccessGrant<L> {
    /// Row id, absent until persisted.
    pub id: Option<GrantId>,
    /// Protected resource.
    pub target_id: TargetId,
    /// Granted user.
    pub user_id: UserId,
    /// Granted level.
    pub access: L,
}

impl<L: AccessLevel> UserAccessGrant<L> {
    /// Creates a not yet persisted user grant.
    #[must_use]
    pub fn new(target_id: TargetId, user_id: UserId, access: L) -> Self {
        Self {
            id: None,
            target_id,
            user_id,
            access,
        }
    }
}

impl<L: AccessLevel> AccessGrant for UserAccessGrant<L> {
    type Key = UserId;
    type Level = L;

    fn natural_key(&self) -> Self::Key {
        self.user_id
    }

    fn grant_id(&self) -> Option<GrantId> {
        self.id
    }

    fn with_grant_id(mut self, grant_id: GrantId) -> Self {
        self.id = Some(grant_id);
        self
    }

    fn access(&self) -> Self::Level {
        self.access
    }
}

/// Job and user grants of one target, either current or desired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessSet<L> {
    /// Job-based grants.
    pub jobs: Vec<JobAccessGrant<L>>,
    /// User-based grants.
    pub users: Vec<UserAccessGrant<L>>,
}

impl<L> Default for AccessSet<L> {
    fn default() -> Self {
        Self {
            jobs: Vec::new(),
            users: Vec::new(),
        }
    }
}

impl<L: AccessLevel> AccessSet<L> {
    /// Creates an access set from both dimensions.
    #[must_use]
    pub fn new(jobs: Vec<JobAccessGrant<L>>, users: Vec<UserAccessGrant<L>>) -> Self {
        Self { jobs, users }
    }

    /// Converts raw transport input into a validated desired set for a target.
    pub fn from_input(target_id: TargetId, input: AccessSetInput) -> AppResult<Self> {
        let jobs = input
            .jobs
            .into_iter()
            .map(|grant| {
                let access = grant.access.resolve::<L>()?;
                JobAccessGrant::new(target_id, grant.job, grant.minimum_grade, access)
            })
            .collect::<AppResult<Vec<_>>>()?;

        let users = input
            .users
            .into_iter()
            .map(|grant| {
                let access = grant.access.resolve::<L>()?;
                Ok(UserAccessGrant::new(
                    target_id,
                    UserId::new(grant.user_id)?,
                    access,
                ))
            })
            .collect::<AppResult<Vec<_>>>()?;

        let set = Self { jobs, users };
        set.validate()?;

        Ok(set)
    }

    /// Validates every grant and rejects duplicate natural keys.
    ///
    /// Job keys are compared on trimmed names.
    pub fn validate(&self) -> AppResult<()> {
        let mut job_keys = BTreeSet::new();
        for grant in &self.jobs {
            grant.validate()?;
            let key = JobGrantKey {
                job: grant.job.trim().to_owned(),
                minimum_grade: grant.minimum_grade,
            };
            if !job_keys.insert(key) {
                return Err(AppError::Validation(format!(
                    "duplicate job grant for job '{}' at minimum grade {}",
                    grant.job.trim(),
                    grant.minimum_grade
                )));
            }
        }

        let mut user_keys = BTreeSet::new();
        for grant in &self.users {
            if !user_keys.insert(grant.user_id) {
                return Err(AppError::Validation(format!(
                    "duplicate user grant for user {}",
                    grant.user_id
                )));
            }
        }

        Ok(())
    }

    /// Rewrites every grant to belong to `target_id` and trims job names.
    #[must_use]
    pub fn for_target(mut self, target_id: TargetId) -> Self {
        for grant in &mut self.jobs {
            grant.target_id = target_id;
            let trimmed = grant.job.trim();
            if trimmed.len() != grant.job.len() {
                grant.job = trimmed.to_owned();
            }
        }
        for grant in &mut self.users {
            grant.target_id = target_id;
        }
        self
    }

    /// Returns whether both dimensions are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty() && self.users.is_empty()
    }

    /// Returns the number of grants across both dimensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len() + self.users.len()
    }
}

/// Raw access value accepted from transport: storage number or name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccessValueInput {
    /// Stable storage value.
    Number(i16),
    /// Transport name such as `"edit"`.
    Name(String),
}

impl AccessValueInput {
    fn resolve<L: AccessLevel>(&self) -> AppResult<L> {
        match self {
            Self::Number(value) => L::from_storage(*value),
            Self::Name(value) => value.trim().parse::<L>(),
        }
    }
}

/// Raw job grant as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobGrantInput {
    /// Job name.
    pub job: String,
    /// Minimum grade threshold.
    pub minimum_grade: i32,
    /// Requested level.
    pub access: AccessValueInput,
}

/// Raw user grant as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGrantInput {
    /// Granted user.
    pub user_id: i32,
    /// Requested level.
    pub access: AccessValueInput,
}

/// Raw desired access set as submitted by a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessSetInput {
    /// Job grants.
    #[serde(default)]
    pub jobs: Vec<JobGrantInput>,
    /// User grants.
    #[serde(default)]
    pub users: Vec<UserGrantInput>,
}
