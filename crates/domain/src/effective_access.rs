use chrono::{DateTime, Utc};
use citadel_core::{CallerIdentity, TargetId, UserId};
use serde::{Deserialize, Serialize};

use crate::{AccessLevel, JobAccessGrant};

/// Ownership fields of a protected resource, read from its own table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTarget {
    /// Resource id.
    pub id: TargetId,
    /// Job that created the resource.
    pub owning_job: Option<String>,
    /// User that created the resource.
    pub creator_user_id: Option<UserId>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl AccessTarget {
    /// Returns whether `caller` created the resource under their current job.
    #[must_use]
    pub fn is_owned_by(&self, caller: &CallerIdentity) -> bool {
        self.creator_user_id == Some(caller.user_id())
            && self.owning_job.as_deref() == Some(caller.job())
    }
}

/// Everything needed to decide one caller's access to one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessSnapshot<L> {
    /// Ownership fields of the target.
    pub target: AccessTarget,
    /// Level of the caller's direct user grant, if any.
    pub user_grant: Option<L>,
    /// Job grants of the caller's job on the target.
    pub job_grants: Vec<JobAccessGrant<L>>,
}

/// Outcome of effective-access resolution, naming the rule that decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum AccessDecision<L> {
    /// Caller bypasses grant checks.
    Superuser,
    /// Caller created the target under their current job.
    Owner,
    /// A direct user grant decided.
    UserGrant {
        /// Granted level.
        access: L,
    },
    /// The most senior job grant the caller qualifies for decided.
    JobGrant {
        /// Threshold of the governing grant.
        minimum_grade: i32,
        /// Granted level.
        access: L,
    },
    /// Target is soft-deleted.
    Deleted,
    /// Target does not exist.
    MissingTarget,
    /// No rule grants anything.
    NoGrant,
}

impl<L: AccessLevel> AccessDecision<L> {
    /// Returns whether the decision satisfies `required`.
    #[must_use]
    pub fn allows(&self, required: L) -> bool {
        match self {
            Self::Superuser | Self::Owner => true,
            Self::UserGrant { access } | Self::JobGrant { access, .. } => access.allows(required),
            Self::Deleted | Self::MissingTarget | Self::NoGrant => false,
        }
    }
}

/// Picks the job grant with the highest threshold the caller still meets.
#[must_use]
pub fn governing_job_grant<'a, L: AccessLevel>(
    grants: &'a [JobAccessGrant<L>],
    job: &str,
    grade: i32,
) -> Option<&'a JobAccessGrant<L>> {
    grants
        .iter()
        .filter(|grant| grant.covers(job, grade))
        .max_by_key(|grant| grant.minimum_grade)
}

/// Resolves effective access, first matching rule wins.
///
/// Order: superuser, missing target, soft delete, ownership, direct user
/// grant, job grant. A user grant is authoritative even when it denies.
#[must_use]
pub fn decide_access<L: AccessLevel>(
    caller: &CallerIdentity,
    snapshot: Option<&AccessSnapshot<L>>,
) -> AccessDecision<L> {
    if caller.is_superuser() {
        return AccessDecision::Superuser;
    }

    let Some(snapshot) = snapshot else {
        return AccessDecision::MissingTarget;
    };

    if snapshot.target.deleted_at.is_some() {
        return AccessDecision::Deleted;
    }

    if snapshot.target.is_owned_by(caller) {
        return AccessDecision::Owner;
    }

    if let Some(access) = snapshot.user_grant {
        return AccessDecision::UserGrant { access };
    }

    governing_job_grant(&snapshot.job_grants, caller.job(), caller.grade())
        .map(|grant| AccessDecision::JobGrant {
            minimum_grade: grant.minimum_grade,
            access: grant.access,
        })
        .unwrap_or(AccessDecision::NoGrant)
}
