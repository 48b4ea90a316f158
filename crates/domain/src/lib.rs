//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod access_level;
mod effective_access;
mod grant;
mod ownership_scope;
mod reconciliation;
mod resource;

pub use access_level::{
    AccessLevel, DocumentAccessLevel, TemplateAccessLevel, ThreadAccessLevel,
};
pub use effective_access::{
    AccessDecision, AccessSnapshot, AccessTarget, decide_access, governing_job_grant,
};
pub use grant::{
    AccessGrant, AccessSet, AccessSetInput, AccessValueInput, JobAccessGrant, JobGrantInput,
    JobGrantKey, MAX_JOB_NAME_LENGTH, UserAccessGrant, UserGrantInput,
};
pub use ownership_scope::{CreatorRef, OwnershipScope, OwnershipScopes, has_ownership_access};
pub use reconciliation::{GrantDiff, ReconciliationPlan, diff_grants};
pub use resource::ResourceKind;
