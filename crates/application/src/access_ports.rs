use async_trait::async_trait;

use citadel_core::{AppResult, CallerIdentity, GrantId, TargetId};
use citadel_domain::{AccessLevel, AccessSet, AccessSnapshot, JobAccessGrant, UserAccessGrant};

/// Ties store operations to a transaction handle owned by the caller.
///
/// The caller opens the transaction, runs its own row mutation and the
/// access writes through the same handle, then commits once. Dropping the
/// handle without committing must discard every write made through it.
pub trait TransactionScope: Send + Sync {
    /// Open transaction handle.
    type Tx: Send;
}

/// Repository port for job-based grants of one resource family.
#[async_trait]
pub trait JobGrantStore<L: AccessLevel>: TransactionScope {
    /// Lists grants of a target ordered by job, then minimum grade.
    async fn list_job_grants(
        &self,
        tx: &mut Self::Tx,
        target_id: TargetId,
    ) -> AppResult<Vec<JobAccessGrant<L>>>;

    /// Inserts one grant and returns its assigned id.
    async fn create_job_grant(
        &self,
        tx: &mut Self::Tx,
        target_id: TargetId,
        grant: &JobAccessGrant<L>,
    ) -> AppResult<GrantId>;

    /// Updates one grant by id. The grant must carry an id.
    async fn update_job_grant(
        &self,
        tx: &mut Self::Tx,
        target_id: TargetId,
        grant: &JobAccessGrant<L>,
    ) -> AppResult<()>;

    /// Deletes every listed grant of the target and returns the row count.
    async fn delete_job_grants(
        &self,
        tx: &mut Self::Tx,
        target_id: TargetId,
        grant_ids: &[GrantId],
    ) -> AppResult<u64>;

    /// Deletes all job grants of the target.
    async fn clear_job_grants(&self, tx: &mut Self::Tx, target_id: TargetId) -> AppResult<u64>;
}

/// Repository port for user-based grants of one resource family.
#[async_trait]
pub trait UserGrantStore<L: AccessLevel>: TransactionScope {
    /// Lists grants of a target ordered by user id.
    async fn list_user_grants(
        &self,
        tx: &mut Self::Tx,
        target_id: TargetId,
    ) -> AppResult<Vec<UserAccessGrant<L>>>;

    /// Inserts one grant and returns its assigned id.
    async fn create_user_grant(
        &self,
        tx: &mut Self::Tx,
        target_id: TargetId,
        grant: &UserAccessGrant<L>,
    ) -> AppResult<GrantId>;

    /// Updates one grant by id. The grant must carry an id.
    async fn update_user_grant(
        &self,
        tx: &mut Self::Tx,
        target_id: TargetId,
        grant: &UserAccessGrant<L>,
    ) -> AppResult<()>;

    /// Deletes every listed grant of the target and returns the row count.
    async fn delete_user_grants(
        &self,
        tx: &mut Self::Tx,
        target_id: TargetId,
        grant_ids: &[GrantId],
    ) -> AppResult<u64>;

    /// Deletes all user grants of the target.
    async fn clear_user_grants(&self, tx: &mut Self::Tx, target_id: TargetId) -> AppResult<u64>;
}

/// Port serializing writers of one target.
#[async_trait]
pub trait AccessTargetStore: TransactionScope {
    /// Locks the target row until the transaction ends.
    ///
    /// Fails with `NotFound` when the target does not exist.
    async fn lock_target(&self, tx: &mut Self::Tx, target_id: TargetId) -> AppResult<()>;
}

/// Read-only port used by effective-access checks.
#[async_trait]
pub trait EffectiveAccessRepository<L: AccessLevel>: Send + Sync {
    /// Loads ownership fields plus the caller's user grant and job grants.
    ///
    /// Returns `None` when the target does not exist.
    async fn load_access_snapshot(
        &self,
        target_id: TargetId,
        caller: &CallerIdentity,
    ) -> AppResult<Option<AccessSnapshot<L>>>;

    /// Returns the subset of `target_ids` the non-superuser caller reaches at
    /// `required` or above, evaluated in a single round-trip.
    async fn list_accessible_targets(
        &self,
        target_ids: &[TargetId],
        caller: &CallerIdentity,
        required: L,
    ) -> AppResult<Vec<TargetId>>;

    /// Lists the committed grants of a target.
    async fn list_access(&self, target_id: TargetId) -> AppResult<AccessSet<L>>;
}
