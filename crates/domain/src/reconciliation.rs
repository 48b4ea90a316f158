use std::collections::BTreeMap;

use citadel_core::UserId;
use serde::{Deserialize, Serialize};

use crate::{AccessGrant, AccessLevel, AccessSet};

/// Three-way diff of one grant dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantDiff<G> {
    /// Desired grants without a current counterpart.
    pub to_create: Vec<G>,
    /// Desired grants whose level changed, carrying the current row id.
    pub to_update: Vec<G>,
    /// Current grants without a desired counterpart.
    pub to_delete: Vec<G>,
    /// Number of grants present on both sides with equal level.
    pub unchanged: usize,
}

impl<G> Default for GrantDiff<G> {
    fn default() -> Self {
        Self {
            to_create: Vec::new(),
            to_update: Vec::new(),
            to_delete: Vec::new(),
            unchanged: 0,
        }
    }
}

/// Matches `current` against `desired` by natural key.
///
/// `desired` must not contain duplicate natural keys. Updates and deletes come
/// out in natural-key order of `current`; creates keep the order of `desired`.
#[must_use]
pub fn diff_grants<G: AccessGrant>(mut current: Vec<G>, desired: Vec<G>) -> GrantDiff<G> {
    if current.is_empty() {
        return GrantDiff {
            to_create: desired,
            ..GrantDiff::default()
        };
    }

    current.sort_by_key(|grant| grant.natural_key());

    let positions: BTreeMap<G::Key, usize> = desired
        .iter()
        .enumerate()
        .map(|(position, grant)| (grant.natural_key(), position))
        .collect();
    let mut consumed = vec![false; desired.len()];
    let mut diff = GrantDiff::default();

    for existing in current {
        let Some(&position) = positions.get(&existing.natural_key()) else {
            diff.to_delete.push(existing);
            continue;
        };

        consumed[position] = true;
        let wanted = &desired[position];
        if wanted.access() == existing.access() {
            diff.unchanged += 1;
            continue;
        }

        let merged = match existing.grant_id() {
            Some(grant_id) => wanted.clone().with_grant_id(grant_id),
            None => wanted.clone(),
        };
        diff.to_update.push(merged);
    }

    diff.to_create = desired
        .into_iter()
        .zip(consumed)
        .filter_map(|(grant, used)| (!used).then_some(grant))
        .collect();

    diff
}

/// Writes needed to turn the stored grants of a target into a desired set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationPlan<L> {
    /// Grants to insert.
    pub to_create: AccessSet<L>,
    /// Grants to update in place.
    pub to_update: AccessSet<L>,
    /// Grants to remove.
    pub to_delete: AccessSet<L>,
}

impl<L> Default for ReconciliationPlan<L> {
    fn default() -> Self {
        Self {
            to_create: AccessSet::default(),
            to_update: AccessSet::default(),
            to_delete: AccessSet::default(),
        }
    }
}

impl<L: AccessLevel> ReconciliationPlan<L> {
    /// Computes the plan for both dimensions independently.
    #[must_use]
    pub fn compute(current: AccessSet<L>, desired: AccessSet<L>) -> Self {
        let jobs = diff_grants(current.jobs, desired.jobs);
        let users = diff_grants(current.users, desired.users);

        Self {
            to_create: AccessSet::new(jobs.to_create, users.to_create),
            to_update: AccessSet::new(jobs.to_update, users.to_update),
            to_delete: AccessSet::new(jobs.to_delete, users.to_delete),
        }
    }

    /// Plan removing every current grant.
    #[must_use]
    pub fn removing(current: AccessSet<L>) -> Self {
        Self {
            to_delete: current,
            ..Self::default()
        }
    }

    /// Returns whether the plan performs no writes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    /// Returns the total number of writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.to_create.len() + self.to_update.len() + self.to_delete.len()
    }

    /// Users whose explicit grant is removed by this plan.
    #[must_use]
    pub fn revoked_user_ids(&self) -> Vec<UserId> {
        self.to_delete
            .users
            .iter()
            .map(|grant| grant.user_id)
            .collect()
    }

    /// Users who receive a new explicit grant through this plan.
    #[must_use]
    pub fn granted_user_ids(&self) -> Vec<UserId> {
        self.to_create
            .users
            .iter()
            .map(|grant| grant.user_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use citadel_core::{GrantId, TargetId, UserId};
    use proptest::prelude::*;

    use super::ReconciliationPlan;
    use crate::{
        AccessGrant, AccessLevel, AccessSet, DocumentAccessLevel, JobAccessGrant, JobGrantKey,
        UserAccessGrant,
    };

    const TARGET: TargetId = TargetId::new(1);

    fn job(
        id: Option<i64>,
        name: &str,
        minimum_grade: i32,
        access: DocumentAccessLevel,
    ) -> JobAccessGrant<DocumentAccessLevel> {
        JobAccessGrant {
            id: id.map(GrantId::new),
            target_id: TARGET,
            job: name.to_owned(),
            minimum_grade,
            access,
        }
    }

    fn user(
        id: Option<i64>,
        user_id: i32,
        access: DocumentAccessLevel,
    ) -> UserAccessGrant<DocumentAccessLevel> {
        UserAccessGrant {
            id: id.map(GrantId::new),
            target_id: TARGET,
            user_id: UserId::new(user_id).unwrap_or_else(|error| panic!("{error}")),
            access,
        }
    }

    #[test]
    fn empty_current_creates_everything() {
        let desired = AccessSet::new(
            vec![job(None, "police", 2, DocumentAccessLevel::Edit)],
            Vec::new(),
        );

        let plan = ReconciliationPlan::compute(AccessSet::default(), desired.clone());
        assert_eq!(plan.to_create, desired);
        assert!(plan.to_update.is_empty());
        assert!(plan.to_delete.is_empty());
    }

    #[test]
    fn changed_user_level_becomes_update_with_original_id() {
        let current = AccessSet::new(
            Vec::new(),
            vec![user(Some(11), 42, DocumentAccessLevel::View)],
        );
        let desired = AccessSet::new(
            Vec::new(),
            vec![user(None, 42, DocumentAccessLevel::Admin)],
        );

        let plan = ReconciliationPlan::compute(current, desired);
        assert!(plan.to_create.is_empty());
        assert!(plan.to_delete.is_empty());
        assert_eq!(
            plan.to_update.users,
            vec![user(Some(11), 42, DocumentAccessLevel::Admin)]
        );
    }

    #[test]
    fn stale_job_grant_is_deleted() {
        let current = AccessSet::new(
            vec![job(Some(3), "ems", 0, DocumentAccessLevel::View)],
            Vec::new(),
        );

        let plan = ReconciliationPlan::compute(current.clone(), AccessSet::default());
        assert_eq!(plan.to_delete, current);
        assert!(plan.to_create.is_empty());
        assert!(plan.to_update.is_empty());
    }

    #[test]
    fn grade_change_is_delete_plus_create() {
        let current = AccessSet::new(
            vec![job(Some(3), "police", 1, DocumentAccessLevel::View)],
            Vec::new(),
        );
        let desired = AccessSet::new(
            vec![job(None, "police", 2, DocumentAccessLevel::View)],
            Vec::new(),
        );

        let plan = ReconciliationPlan::compute(current, desired);
        assert_eq!(plan.to_create.jobs.len(), 1);
        assert_eq!(plan.to_delete.jobs.len(), 1);
        assert!(plan.to_update.is_empty());
    }

    #[test]
    fn revoked_and_granted_users_follow_plan() {
        let current = AccessSet::new(
            Vec::new(),
            vec![
                user(Some(1), 5, DocumentAccessLevel::View),
                user(Some(2), 6, DocumentAccessLevel::View),
            ],
        );
        let desired = AccessSet::new(
            Vec::new(),
            vec![
                user(None, 6, DocumentAccessLevel::View),
                user(None, 8, DocumentAccessLevel::Edit),
            ],
        );

        let plan = ReconciliationPlan::compute(current, desired);
        let revoked: Vec<i32> = plan.revoked_user_ids().iter().map(UserId::as_i32).collect();
        let granted: Vec<i32> = plan.granted_user_ids().iter().map(UserId::as_i32).collect();
        assert_eq!(revoked, vec![5]);
        assert_eq!(granted, vec![8]);
        assert_eq!(plan.len(), 2);
    }

    fn level_strategy() -> impl Strategy<Value = DocumentAccessLevel> {
        prop::sample::select(DocumentAccessLevel::all().to_vec())
    }

    fn job_map_strategy()
    -> impl Strategy<Value = BTreeMap<(String, i32), DocumentAccessLevel>> {
        prop::collection::btree_map(
            (prop::sample::select(vec!["police", "ems", "doj"]).prop_map(str::to_owned), 0..4_i32),
            level_strategy(),
            0..8,
        )
    }

    fn user_map_strategy() -> impl Strategy<Value = BTreeMap<i32, DocumentAccessLevel>> {
        prop::collection::btree_map(1..12_i32, level_strategy(), 0..8)
    }

    fn build_set(
        jobs: &BTreeMap<(String, i32), DocumentAccessLevel>,
        users: &BTreeMap<i32, DocumentAccessLevel>,
        with_ids: bool,
    ) -> AccessSet<DocumentAccessLevel> {
        let mut next_id = 100_i64;
        let mut assign = || {
            next_id += 1;
            with_ids.then_some(next_id)
        };

        // Reverse insertion order so matching never depends on input order.
        let jobs = jobs
            .iter()
            .rev()
            .map(|((name, grade), access)| job(assign(), name, *grade, *access))
            .collect();
        let users = users
            .iter()
            .rev()
            .map(|(user_id, access)| user(assign(), *user_id, *access))
            .collect();

        AccessSet::new(jobs, users)
    }

    fn apply(
        current: &AccessSet<DocumentAccessLevel>,
        plan: &ReconciliationPlan<DocumentAccessLevel>,
    ) -> AccessSet<DocumentAccessLevel> {
        let mut jobs: BTreeMap<JobGrantKey, JobAccessGrant<DocumentAccessLevel>> = current
            .jobs
            .iter()
            .map(|grant| (grant.natural_key(), grant.clone()))
            .collect();
        let mut users: BTreeMap<UserId, UserAccessGrant<DocumentAccessLevel>> = current
            .users
            .iter()
            .map(|grant| (grant.user_id, grant.clone()))
            .collect();

        let mut next_id = 10_000_i64;
        for grant in &plan.to_create.jobs {
            next_id += 1;
            jobs.insert(grant.natural_key(), grant.clone().with_grant_id(GrantId::new(next_id)));
        }
        for grant in &plan.to_create.users {
            next_id += 1;
            users.insert(grant.user_id, grant.clone().with_grant_id(GrantId::new(next_id)));
        }
        for grant in &plan.to_update.jobs {
            jobs.insert(grant.natural_key(), grant.clone());
        }
        for grant in &plan.to_update.users {
            users.insert(grant.user_id, grant.clone());
        }
        for grant in &plan.to_delete.jobs {
            jobs.remove(&grant.natural_key());
        }
        for grant in &plan.to_delete.users {
            users.remove(&grant.user_id);
        }

        AccessSet::new(jobs.into_values().collect(), users.into_values().collect())
    }

    fn levels_by_key(
        set: &AccessSet<DocumentAccessLevel>,
    ) -> (
        BTreeMap<JobGrantKey, DocumentAccessLevel>,
        BTreeMap<UserId, DocumentAccessLevel>,
    ) {
        (
            set.jobs
                .iter()
                .map(|grant| (grant.natural_key(), grant.access))
                .collect(),
            set.users
                .iter()
                .map(|grant| (grant.user_id, grant.access))
                .collect(),
        )
    }

    proptest! {
        /// Applying a plan yields exactly the desired set, with consistent counts.
        #[test]
        fn plan_makes_current_equal_desired(
            current_jobs in job_map_strategy(),
            current_users in user_map_strategy(),
            desired_jobs in job_map_strategy(),
            desired_users in user_map_strategy(),
        ) {
            let current = build_set(&current_jobs, &current_users, true);
            let desired = build_set(&desired_jobs, &desired_users, false);

            let plan = ReconciliationPlan::compute(current.clone(), desired.clone());
            let applied = apply(&current, &plan);
            prop_assert_eq!(levels_by_key(&applied), levels_by_key(&desired));

            let unchanged = desired.len() - plan.to_create.len() - plan.to_update.len();
            prop_assert_eq!(
                plan.to_delete.len() + unchanged + plan.to_update.len(),
                current.len()
            );
            prop_assert!(plan.to_update.jobs.iter().all(|grant| grant.id.is_some()));
            prop_assert!(plan.to_update.users.iter().all(|grant| grant.id.is_some()));
        }

        /// A second reconciliation with the same desired set is a no-op.
        #[test]
        fn reconciliation_is_idempotent(
            current_jobs in job_map_strategy(),
            current_users in user_map_strategy(),
            desired_jobs in job_map_strategy(),
            desired_users in user_map_strategy(),
        ) {
            let current = build_set(&current_jobs, &current_users, true);
            let desired = build_set(&desired_jobs, &desired_users, false);

            let plan = ReconciliationPlan::compute(current.clone(), desired.clone());
            let applied = apply(&current, &plan);
            let second = ReconciliationPlan::compute(applied, desired);
            prop_assert!(second.is_empty());
        }

        /// Equal sets in any order produce an empty plan.
        #[test]
        fn equal_sets_produce_empty_plan(
            jobs in job_map_strategy(),
            users in user_map_strategy(),
        ) {
            let current = build_set(&jobs, &users, true);
            let mut desired = build_set(&jobs, &users, false);
            desired.jobs.reverse();
            desired.users.reverse();

            let plan = ReconciliationPlan::compute(current, desired);
            prop_assert!(plan.is_empty());
        }
    }
}
