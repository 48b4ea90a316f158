use std::marker::PhantomData;
use std::sync::Arc;

use citadel_core::{AppError, AppResult, GrantId, TargetId};
use citadel_domain::{AccessGrant, AccessLevel, AccessSet, ReconciliationPlan};
use tracing::{debug, info, warn};

use crate::{AccessTargetStore, JobGrantStore, UserGrantStore};


/// Keeps the stored grants of a target equal to a caller-supplied desired set.
///
/// Every operation runs inside the caller's transaction so the caller's own
/// row mutation and the access writes commit together.
pub struct AccessReconciler<L, S> {
    store: Arc<S>,
    level: PhantomData<fn() -> L>,
}

impl<L, S> Clone for AccessReconciler<L, S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            level: PhantomData,
        }
    }
}

impl<L, S> AccessReconciler<L, S>
where
    L: AccessLevel,
    S: JobGrantStore<L> + UserGrantStore<L> + AccessTargetStore,
{
    /// Creates a reconciler over the grant stores of one resource family.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            level: PhantomData,
        }
    }

    /// Lists the grants of a target as seen by the transaction.
    pub async fn current_access(
        &self,
        tx: &mut S::Tx,
        target_id: TargetId,
    ) -> AppResult<AccessSet<L>> {
        let jobs = self.store.list_job_grants(tx, target_id).await?;
        let users = self.store.list_user_grants(tx, target_id).await?;

        Ok(AccessSet::new(jobs, users))
    }

    /// Applies the minimal writes turning the stored grants into `desired`.
    ///
    /// Job names are trimmed and the desired set is validated before any
    /// store access. The target row
    /// is locked before current grants are read so concurrent reconciliations
    /// of the same target serialize. Writes run as create, update, delete.
    /// Created grants in the returned plan carry their assigned ids.
    pub async fn reconcile(
        &self,
        tx: &mut S::Tx,
        target_id: TargetId,
        desired: AccessSet<L>,
    ) -> AppResult<ReconciliationPlan<L>> {
        let desired = desired.for_target(target_id);
        desired.validate()?;

        self.store.lock_target(tx, target_id).await?;
        let current = self.current_access(tx, target_id).await?;
        let mut plan = ReconciliationPlan::compute(current, desired);

        if plan.is_empty() {
            debug!(
                family = L::FAMILY,
                target_id = %target_id,
                "access already matches desired set"
            );
            return Ok(plan);
        }

        self.apply_plan(tx, target_id, &mut plan).await?;

        info!(
            family = L::FAMILY,
            target_id = %target_id,
            created_jobs = plan.to_create.jobs.len(),
            created_users = plan.to_create.users.len(),
            updated_jobs = plan.to_update.jobs.len(),
            updated_users = plan.to_update.users.len(),
            deleted_jobs = plan.to_delete.jobs.len(),
            deleted_users = plan.to_delete.users.len(),
            "reconciled target access"
        );

        Ok(plan)
    }

    /// Removes every grant of a target and reports what was removed.
    pub async fn reset_access(
        &self,
        tx: &mut S::Tx,
        target_id: TargetId,
    ) -> AppResult<ReconciliationPlan<L>> {
        self.store.lock_target(tx, target_id).await?;
        let current = self.current_access(tx, target_id).await?;

        if !current.jobs.is_empty() {
            self.store.clear_job_grants(tx, target_id).await?;
        }
        if !current.users.is_empty() {
            self.store.clear_user_grants(tx, target_id).await?;
        }

        info!(
            family = L::FAMILY,
            target_id = %target_id,
            removed = current.len(),
            "reset target access"
        );

        Ok(ReconciliationPlan::removing(current))
    }

    async fn apply_plan(
        &self,
        tx: &mut S::Tx,
        target_id: TargetId,
        plan: &mut ReconciliationPlan<L>,
    ) -> AppResult<()> {
        for grant in &mut plan.to_create.jobs {
            let grant_id = self.store.create_job_grant(tx, target_id, grant).await?;
            grant.id = Some(grant_id);
        }
        for grant in &mut plan.to_create.users {
            let grant_id = self.store.create_user_grant(tx, target_id, grant).await?;
            grant.id = Some(grant_id);
        }

        for grant in &plan.to_update.jobs {
            self.store.update_job_grant(tx, target_id, grant).await?;
        }
        for grant in &plan.to_update.users {
            self.store.update_user_grant(tx, target_id, grant).await?;
        }

        let job_ids = persisted_ids(&plan.to_delete.jobs)?;
        if !job_ids.is_empty() {
            let deleted = self
                .store
                .delete_job_grants(tx, target_id, &job_ids)
                .await?;
            warn_on_short_delete::<L>(target_id, "job", job_ids.len(), deleted);
        }

        let user_ids = persisted_ids(&plan.to_delete.users)?;
        if !user_ids.is_empty() {
            let deleted = self
                .store
                .delete_user_grants(tx, target_id, &user_ids)
                .await?;
            warn_on_short_delete::<L>(target_id, "user", user_ids.len(), deleted);
        }

        Ok(())
    }
}

fn persisted_ids<G: AccessGrant>(grants: &[G]) -> AppResult<Vec<GrantId>> {
    grants
        .iter()
        .map(|grant| {
            grant.grant_id().ok_or_else(|| {
                AppError::Internal(format!(
                    "cannot delete grant {:?} without a persisted id",
                    grant.natural_key()
                ))
            })
        })
        .collect()
}

fn warn_on_short_delete<L: AccessLevel>(
    target_id: TargetId,
    dimension: &str,
    requested: usize,
    deleted: u64,
) {
    if u64::try_from(requested).unwrap_or(u64::MAX) != deleted {
        warn!(
            family = L::FAMILY,
            target_id = %target_id,
            dimension,
            requested,
            deleted,
            "deleted fewer grants than planned"
        );
    }
}
