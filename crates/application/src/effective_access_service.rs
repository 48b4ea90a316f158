use std::collections::BTreeSet;
use std::sync::Arc;

use citadel_core::{AppError, AppResult, CallerIdentity, TargetId};
use citadel_domain::{AccessDecision, AccessLevel, AccessSet, decide_access};
use tracing::debug;

use crate::EffectiveAccessRepository;


/// Application service answering "can this caller reach this target".
///
/// Every check re-reads the store; nothing is cached between calls.
pub struct EffectiveAccessService<L> {
    repository: Arc<dyn EffectiveAccessRepository<L>>,
}

impl<L> Clone for EffectiveAccessService<L> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
        }
    }
}

impl<L: AccessLevel> EffectiveAccessService<L> {
    /// Creates a new service from a repository implementation.
    #[must_use]
    pub fn new(repository: Arc<dyn EffectiveAccessRepository<L>>) -> Self {
        Self { repository }
    }

    /// Resolves which rule governs the caller's access to a target.
    pub async fn decide(
        &self,
        target_id: TargetId,
        caller: &CallerIdentity,
    ) -> AppResult<AccessDecision<L>> {
        if caller.is_superuser() {
            return Ok(AccessDecision::Superuser);
        }

        let snapshot = self
            .repository
            .load_access_snapshot(target_id, caller)
            .await?;
        let decision = decide_access(caller, snapshot.as_ref());

        debug!(
            family = L::FAMILY,
            target_id = %target_id,
            user_id = %caller.user_id(),
            decision = ?decision,
            "resolved effective access"
        );

        Ok(decision)
    }

    /// Returns whether the caller reaches the target at `required` or above.
    pub async fn can_access(
        &self,
        target_id: TargetId,
        caller: &CallerIdentity,
        required: L,
    ) -> AppResult<bool> {
        Ok(self.decide(target_id, caller).await?.allows(required))
    }

    /// Ensures the caller reaches the target at `required` or above.
    pub async fn require_access(
        &self,
        target_id: TargetId,
        caller: &CallerIdentity,
        required: L,
    ) -> AppResult<()> {
        if self.can_access(target_id, caller, required).await? {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "user {} is missing '{}' access to {} {}",
            caller.user_id(),
            required,
            L::FAMILY,
            target_id
        )))
    }

    /// Filters `target_ids` down to those the caller reaches at `required`.
    ///
    /// Runs one store round-trip regardless of the number of ids. The result
    /// is deduplicated and sorted ascending.
    pub async fn can_access_any(
        &self,
        target_ids: &[TargetId],
        caller: &CallerIdentity,
        required: L,
    ) -> AppResult<Vec<TargetId>> {
        let unique: Vec<TargetId> = target_ids
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if unique.is_empty() || caller.is_superuser() {
            return Ok(unique);
        }

        let mut allowed = self
            .repository
            .list_accessible_targets(&unique, caller, required)
            .await?;
        allowed.sort();
        allowed.dedup();

        Ok(allowed)
    }

    /// Lists the committed grants of a target.
    pub async fn list_access(&self, target_id: TargetId) -> AppResult<AccessSet<L>> {
        self.repository.list_access(target_id).await
    }
}
