use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use citadel_application::{
    AccessTargetStore, EffectiveAccessRepository, JobGrantStore, TransactionScope, UserGrantStore,
};
use citadel_core::{AppError, AppResult, CallerIdentity, GrantId, TargetId};
use citadel_domain::{
    AccessLevel, AccessSet, AccessSnapshot, AccessTarget, JobAccessGrant, UserAccessGrant,
    decide_access,
};


/// In-memory grant store and read path for one resource family.
///
/// Writers are serialized by a store-wide lock held for the life of an
/// [`InMemoryTransaction`]. Readers only ever see committed state.
pub struct InMemoryAccessStore<L> {
    committed: RwLock<AccessState<L>>,
    writer: Arc<Mutex<()>>,
}

impl<L: AccessLevel> Default for InMemoryAccessStore<L> {
    fn default() -> Self {
        Self::new()
    }
}

/// Staged copy of the store, applied by [`InMemoryAccessStore::commit`].
///
/// Dropping it without committing discards every write.
pub struct InMemoryTransaction<L> {
    staged: AccessState<L>,
    _writer: OwnedMutexGuard<()>,
}

#[derive(Debug, Clone)]
struct AccessState<L> {
    targets: HashMap<TargetId, AccessTarget>,
    jobs: BTreeMap<GrantId, JobAccessGrant<L>>,
    users: BTreeMap<GrantId, UserAccessGrant<L>>,
    next_grant_id: i64,
}

impl<L> Default for AccessState<L> {
    fn default() -> Self {
        Self {
            targets: HashMap::new(),
            jobs: BTreeMap::new(),
            users: BTreeMap::new(),
            next_grant_id: 1,
        }
    }
}

impl<L: AccessLevel> AccessState<L> {
    fn allocate_id(&mut self) -> GrantId {
        let grant_id = GrantId::new(self.next_grant_id);
        self.next_grant_id += 1;
        grant_id
    }

    fn job_grants(&self, target_id: TargetId) -> Vec<JobAccessGrant<L>> {
        let mut grants: Vec<JobAccessGrant<L>> = self
            .jobs
            .values()
            .filter(|grant| grant.target_id == target_id)
            .cloned()
            .collect();
        grants.sort_by(|left, right| {
            left.job
                .cmp(&right.job)
                .then(left.minimum_grade.cmp(&right.minimum_grade))
        });
        grants
    }

    fn user_grants(&self, target_id: TargetId) -> Vec<UserAccessGrant<L>> {
        let mut grants: Vec<UserAccessGrant<L>> = self
            .users
            .values()
            .filter(|grant| grant.target_id == target_id)
            .cloned()
            .collect();
        grants.sort_by_key(|grant| grant.user_id);
        grants
    }

    fn snapshot(&self, target_id: TargetId, caller: &CallerIdentity) -> Option<AccessSnapshot<L>> {
        let target = self.targets.get(&target_id)?.clone();
        let user_grant = self
            .users
            .values()
            .find(|grant| grant.target_id == target_id && grant.user_id == caller.user_id())
            .map(|grant| grant.access);
        let job_grants = self
            .jobs
            .values()
            .filter(|grant| grant.target_id == target_id && grant.job == caller.job())
            .cloned()
            .collect();

        Some(AccessSnapshot {
            target,
            user_grant,
            job_grants,
        })
    }

    fn job_key_taken(&self, grant: &JobAccessGrant<L>, target_id: TargetId) -> bool {
        self.jobs.iter().any(|(grant_id, stored)| {
            Some(*grant_id) != grant.id
                && stored.target_id == target_id
                && stored.job == grant.job
                && stored.minimum_grade == grant.minimum_grade
        })
    }

    fn user_key_taken(&self, grant: &UserAccessGrant<L>, target_id: TargetId) -> bool {
        self.users.iter().any(|(grant_id, stored)| {
            Some(*grant_id) != grant.id
                && stored.target_id == target_id
                && stored.user_id == grant.user_id
        })
    }
}

impl<L: AccessLevel> InMemoryAccessStore<L> {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            committed: RwLock::new(AccessState::default()),
            writer: Arc::new(Mutex::new(())),
        }
    }

    /// Inserts or replaces a target's ownership fields.
    ///
    /// Waits for any open transaction to finish first.
    pub async fn insert_target(&self, target: AccessTarget) {
        let _writer = self.writer.lock().await;
        self.committed.write().await.targets.insert(target.id, target);
    }

    /// Opens a transaction, waiting for any other open transaction to finish.
    pub async fn begin(&self) -> InMemoryTransaction<L> {
        let writer = Arc::clone(&self.writer).lock_owned().await;
        let staged = self.committed.read().await.clone();

        InMemoryTransaction {
            staged,
            _writer: writer,
        }
    }

    /// Publishes every write staged in `transaction`.
    pub async fn commit(&self, transaction: InMemoryTransaction<L>) {
        let InMemoryTransaction { staged, _writer } = transaction;
        *self.committed.write().await = staged;
    }
}

impl<L: AccessLevel> TransactionScope for InMemoryAccessStore<L> {
    type Tx = InMemoryTransaction<L>;
}

#[async_trait]
impl<L: AccessLevel> AccessTargetStore for InMemoryAccessStore<L> {
    async fn lock_target(
        &self,
        tx: &mut InMemoryTransaction<L>,
        target_id: TargetId,
    ) -> AppResult<()> {
        if tx.staged.targets.contains_key(&target_id) {
            return Ok(());
        }

        Err(AppError::NotFound(format!(
            "{} target {target_id} does not exist",
            L::FAMILY
        )))
    }
}

#[async_trait]
impl<L: AccessLevel> JobGrantStore<L> for InMemoryAccessStore<L> {
    async fn list_job_grants(
        &self,
        tx: &mut InMemoryTransaction<L>,
        target_id: TargetId,
    ) -> AppResult<Vec<JobAccessGrant<L>>> {
        Ok(tx.staged.job_grants(target_id))
    }

    async fn create_job_grant(
        &self,
        tx: &mut InMemoryTransaction<L>,
        target_id: TargetId,
        grant: &JobAccessGrant<L>,
    ) -> AppResult<GrantId> {
        let grant = JobAccessGrant {
            id: None,
            target_id,
            ..grant.clone()
        };
        if tx.staged.job_key_taken(&grant, target_id) {
            return Err(AppError::DuplicateGrant(format!(
                "job '{}' at minimum grade {} on target {target_id}",
                grant.job, grant.minimum_grade
            )));
        }

        let grant_id = tx.staged.allocate_id();
        tx.staged.jobs.insert(
            grant_id,
            JobAccessGrant {
                id: Some(grant_id),
                ..grant
            },
        );

        Ok(grant_id)
    }

    async fn update_job_grant(
        &self,
        tx: &mut InMemoryTransaction<L>,
        target_id: TargetId,
        grant: &JobAccessGrant<L>,
    ) -> AppResult<()> {
        let grant_id = grant.id.ok_or_else(|| {
            AppError::Internal(format!(
                "cannot update job grant of target {target_id} without a persisted id"
            ))
        })?;

        if tx.staged.job_key_taken(grant, target_id) {
            return Err(AppError::DuplicateGrant(format!(
                "job '{}' at minimum grade {} on target {target_id}",
                grant.job, grant.minimum_grade
            )));
        }

        match tx.staged.jobs.get_mut(&grant_id) {
            Some(stored) if stored.target_id == target_id => {
                stored.job.clone_from(&grant.job);
                stored.minimum_grade = grant.minimum_grade;
                stored.access = grant.access;
                Ok(())
            }
            _ => Err(AppError::NotFound(format!(
                "job grant {grant_id} of target {target_id} does not exist"
            ))),
        }
    }

    async fn delete_job_grants(
        &self,
        tx: &mut InMemoryTransaction<L>,
        target_id: TargetId,
        grant_ids: &[GrantId],
    ) -> AppResult<u64> {
        let before = tx.staged.jobs.len();
        tx.staged.jobs.retain(|grant_id, grant| {
            grant.target_id != target_id || !grant_ids.contains(grant_id)
        });

        Ok(removed_count(before, tx.staged.jobs.len()))
    }

    async fn clear_job_grants(
        &self,
        tx: &mut InMemoryTransaction<L>,
        target_id: TargetId,
    ) -> AppResult<u64> {
        let before = tx.staged.jobs.len();
        tx.staged.jobs.retain(|_, grant| grant.target_id != target_id);

        Ok(removed_count(before, tx.staged.jobs.len()))
    }
}

#[async_trait]
impl<L: AccessLevel> UserGrantStore<L> for InMemoryAccessStore<L> {
    async fn list_user_grants(
        &self,
        tx: &mut InMemoryTransaction<L>,
        target_id: TargetId,
    ) -> AppResult<Vec<UserAccessGrant<L>>> {
        Ok(tx.staged.user_grants(target_id))
    }

    async fn create_user_grant(
        &self,
        tx: &mut InMemoryTransaction<L>,
        target_id: TargetId,
        grant: &UserAccessGrant<L>,
    ) -> AppResult<GrantId> {
        let grant = UserAccessGrant {
            id: None,
            target_id,
            ..grant.clone()
        };
        if tx.staged.user_key_taken(&grant, target_id) {
            return Err(AppError::DuplicateGrant(format!(
                "user {} on target {target_id}",
                grant.user_id
            )));
        }

        let grant_id = tx.staged.allocate_id();
        tx.staged.users.insert(
            grant_id,
            UserAccessGrant {
                id: Some(grant_id),
                ..grant
            },
        );

        Ok(grant_id)
    }

    async fn update_user_grant(
        &self,
        tx: &mut InMemoryTransaction<L>,
        target_id: TargetId,
        grant: &UserAccessGrant<L>,
    ) -> AppResult<()> {
        let grant_id = grant.id.ok_or_else(|| {
            AppError::Internal(format!(
                "cannot update user grant of target {target_id} without a persisted id"
            ))
        })?;

        if tx.staged.user_key_taken(grant, target_id) {
            return Err(AppError::DuplicateGrant(format!(
                "user {} on target {target_id}",
                grant.user_id
            )));
        }

        match tx.staged.users.get_mut(&grant_id) {
            Some(stored) if stored.target_id == target_id => {
                stored.user_id = grant.user_id;
                stored.access = grant.access;
                Ok(())
            }
            _ => Err(AppError::NotFound(format!(
                "user grant {grant_id} of target {target_id} does not exist"
            ))),
        }
    }

    async fn delete_user_grants(
        &self,
        tx: &mut InMemoryTransaction<L>,
        target_id: TargetId,
        grant_ids: &[GrantId],
    ) -> AppResult<u64> {
        let before = tx.staged.users.len();
        tx.staged.users.retain(|grant_id, grant| {
            grant.target_id != target_id || !grant_ids.contains(grant_id)
        });

        Ok(removed_count(before, tx.staged.users.len()))
    }

    async fn clear_user_grants(
        &self,
        tx: &mut InMemoryTransaction<L>,
        target_id: TargetId,
    ) -> AppResult<u64> {
        let before = tx.staged.users.len();
        tx.staged.users.retain(|_, grant| grant.target_id != target_id);

        Ok(removed_count(before, tx.staged.users.len()))
    }
}

#[async_trait]
impl<L: AccessLevel> EffectiveAccessRepository<L> for InMemoryAccessStore<L> {
    async fn load_access_snapshot(
        &self,
        target_id: TargetId,
        caller: &CallerIdentity,
    ) -> AppResult<Option<AccessSnapshot<L>>> {
        Ok(self.committed.read().await.snapshot(target_id, caller))
    }

    async fn list_accessible_targets(
        &self,
        target_ids: &[TargetId],
        caller: &CallerIdentity,
        required: L,
    ) -> AppResult<Vec<TargetId>> {
        let state = self.committed.read().await;

        Ok(target_ids
            .iter()
            .copied()
            .filter(|target_id| {
                decide_access(caller, state.snapshot(*target_id, caller).as_ref()).allows(required)
            })
            .collect())
    }

    async fn list_access(&self, target_id: TargetId) -> AppResult<AccessSet<L>> {
        let state = self.committed.read().await;

        Ok(AccessSet::new(
            state.job_grants(target_id),
            state.user_grants(target_id),
        ))
    }
}

fn removed_count(before: usize, after: usize) -> u64 {
    u64::try_from(before.saturating_sub(after)).unwrap_or(u64::MAX)
}
