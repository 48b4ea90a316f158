use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Transaction};

use citadel_application::{
    AccessTargetStore, EffectiveAccessRepository, JobGrantStore, TransactionScope, UserGrantStore,
};
use citadel_core::{AppError, AppResult, CallerIdentity, GrantId, TargetId, UserId};
use citadel_domain::{
    AccessLevel, AccessSet, AccessSnapshot, AccessTarget, JobAccessGrant, UserAccessGrant,
};

use crate::GrantTables;

mod jobs;
mod resolve;
mod users;

#[cfg(test)]
mod tests;

/// Maximum number of ids bound to a single delete statement.
const DELETE_CHUNK_SIZE: usize = 1_000;

/// PostgreSQL-backed grant store and read path for one resource family.
pub struct PostgresAccessStore<L> {
    pool: PgPool,
    queries: Arc<AccessQueries>,
    level: PhantomData<fn() -> L>,
}

impl<L> Clone for PostgresAccessStore<L> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            queries: Arc::clone(&self.queries),
            level: PhantomData,
        }
    }
}

impl<L: AccessLevel> PostgresAccessStore<L> {
    /// Creates a store with the provided connection pool and table mapping.
    #[must_use]
    pub fn new(pool: PgPool, tables: &GrantTables) -> Self {
        Self {
            pool,
            queries: Arc::new(AccessQueries::build(tables)),
            level: PhantomData,
        }
    }

    /// Opens a transaction to pass to reconciler calls.
    pub async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|error| AppError::Query(format!("failed to begin transaction: {error}")))
    }
}

/// SQL text for one table mapping, built once per store.
#[derive(Debug)]
struct AccessQueries {
    lock_target: String,
    load_snapshot: String,
    list_job_grants: String,
    insert_job_grant: String,
    update_job_grant: String,
    delete_job_grants: String,
    clear_job_grants: String,
    list_user_grants: String,
    insert_user_grant: String,
    update_user_grant: String,
    delete_user_grants: String,
    clear_user_grants: String,
    accessible_targets: String,
}

impl AccessQueries {
    fn build(tables: &GrantTables) -> Self {
        let targets = tables.target_table();
        let jobs = tables.job_table();
        let users = tables.user_table();

        Self {
            lock_target: format!("SELECT id FROM {targets} WHERE id = $1 FOR UPDATE"),
            load_snapshot: format!(
                r#"
                SELECT
                    targets.id,
                    targets.creator_job,
                    targets.creator_id,
                    targets.deleted_at,
                    user_grants.access AS user_access,
                    job_grants.id AS job_grant_id,
                    job_grants.minimum_grade AS job_minimum_grade,
                    job_grants.access AS job_access
                FROM {targets} AS targets
                LEFT JOIN {users} AS user_grants
                    ON user_grants.target_id = targets.id AND user_grants.user_id = $2
                LEFT JOIN {jobs} AS job_grants
                    ON job_grants.target_id = targets.id AND job_grants.job = $3
                WHERE targets.id = $1
                ORDER BY job_grants.minimum_grade
                "#
            ),
            list_job_grants: format!(
                r#"
                SELECT id, target_id, job, minimum_grade, access
                FROM {jobs}
                WHERE target_id = $1
                ORDER BY job, minimum_grade
                "#
            ),
            insert_job_grant: format!(
                r#"
                INSERT INTO {jobs} (target_id, job, minimum_grade, access)
                VALUES ($1, $2, $3, $4)
                RETURNING id
                "#
            ),
            update_job_grant: format!(
                r#"
                UPDATE {jobs}
                SET job = $3, minimum_grade = $4, access = $5
                WHERE id = $1 AND target_id = $2
                "#
            ),
            delete_job_grants: format!(
                "DELETE FROM {jobs} WHERE target_id = $1 AND id = ANY($2)"
            ),
            clear_job_grants: format!("DELETE FROM {jobs} WHERE target_id = $1"),
            list_user_grants: format!(
                r#"
                SELECT id, target_id, user_id, access
                FROM {users}
                WHERE target_id = $1
                ORDER BY user_id
                "#
            ),
            insert_user_grant: format!(
                r#"
                INSERT INTO {users} (target_id, user_id, access)
                VALUES ($1, $2, $3)
                RETURNING id
                "#
            ),
            update_user_grant: format!(
                r#"
                UPDATE {users}
                SET user_id = $3, access = $4
                WHERE id = $1 AND target_id = $2
                "#
            ),
            delete_user_grants: format!(
                "DELETE FROM {users} WHERE target_id = $1 AND id = ANY($2)"
            ),
            clear_user_grants: format!("DELETE FROM {users} WHERE target_id = $1"),
            accessible_targets: format!(
                r#"
                SELECT targets.id
                FROM {targets} AS targets
                LEFT JOIN {users} AS user_grants
                    ON user_grants.target_id = targets.id AND user_grants.user_id = $2
                LEFT JOIN LATERAL (
                    SELECT job_grants.access
                    FROM {jobs} AS job_grants
                    WHERE job_grants.target_id = targets.id
                      AND job_grants.job = $3
                      AND job_grants.minimum_grade <= $4
                    ORDER BY job_grants.minimum_grade DESC
                    LIMIT 1
                ) AS governing ON TRUE
                WHERE targets.id = ANY($1)
                  AND targets.deleted_at IS NULL
                  AND (
                      (targets.creator_id = $2 AND targets.creator_job = $3)
                      OR user_grants.access >= $5
                      OR (user_grants.access IS NULL AND governing.access >= $5)
                  )
                ORDER BY targets.id
                "#
            ),
        }
    }
}

#[derive(Debug, FromRow)]
struct JobGrantRow {
    id: i64,
    target_id: i64,
    job: String,
    minimum_grade: i32,
    access: i16,
}

#[derive(Debug, FromRow)]
struct UserGrantRow {
    id: i64,
    target_id: i64,
    user_id: i32,
    access: i16,
}

/// One target row joined with the caller's user grant and one of the
/// caller's job grants; job columns are null when the job has none.
#[derive(Debug, FromRow)]
struct SnapshotRow {
    id: i64,
    creator_job: Option<String>,
    creator_id: Option<i32>,
    deleted_at: Option<DateTime<Utc>>,
    user_access: Option<i16>,
    job_grant_id: Option<i64>,
    job_minimum_grade: Option<i32>,
    job_access: Option<i16>,
}

fn stored_level<L: AccessLevel>(grant_id: i64, value: i16) -> AppResult<L> {
    L::from_storage(value).map_err(|error| {
        AppError::Internal(format!("stored {} grant {grant_id} is invalid: {error}", L::FAMILY))
    })
}

fn stored_user(grant_id: i64, value: i32) -> AppResult<UserId> {
    UserId::new(value)
        .map_err(|error| AppError::Internal(format!("stored grant {grant_id} is invalid: {error}")))
}

impl JobGrantRow {
    fn into_grant<L: AccessLevel>(self) -> AppResult<JobAccessGrant<L>> {
        Ok(JobAccessGrant {
            access: stored_level(self.id, self.access)?,
            id: Some(GrantId::new(self.id)),
            target_id: TargetId::new(self.target_id),
            job: self.job,
            minimum_grade: self.minimum_grade,
        })
    }
}

impl UserGrantRow {
    fn into_grant<L: AccessLevel>(self) -> AppResult<UserAccessGrant<L>> {
        Ok(UserAccessGrant {
            id: Some(GrantId::new(self.id)),
            target_id: TargetId::new(self.target_id),
            user_id: stored_user(self.id, self.user_id)?,
            access: stored_level(self.id, self.access)?,
        })
    }
}

/// Maps a uniqueness violation to `DuplicateGrant`, anything else to `Query`.
fn map_grant_write_error(error: sqlx::Error, action: &str, grant: &str) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::DuplicateGrant(grant.to_owned());
    }

    AppError::Query(format!("failed to {action}: {error}"))
}

fn raw_ids(grant_ids: &[GrantId]) -> Vec<i64> {
    grant_ids.iter().map(GrantId::as_i64).collect()
}

fn missing_id(kind: &str, target_id: TargetId) -> AppError {
    AppError::Internal(format!(
        "cannot update {kind} grant of target {target_id} without a persisted id"
    ))
}

impl<L: AccessLevel> TransactionScope for PostgresAccessStore<L> {
    type Tx = PgConnection;
}

#[async_trait]
impl<L: AccessLevel> AccessTargetStore for PostgresAccessStore<L> {
    async fn lock_target(&self, tx: &mut PgConnection, target_id: TargetId) -> AppResult<()> {
        sqlx::query_scalar::<_, i64>(self.queries.lock_target.as_str())
            .bind(target_id.as_i64())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|error| AppError::Query(format!("failed to lock target: {error}")))?
            .ok_or_else(|| {
                AppError::NotFound(format!("{} target {target_id} does not exist", L::FAMILY))
            })?;

        Ok(())
    }
}

#[async_trait]
impl<L: AccessLevel> JobGrantStore<L> for PostgresAccessStore<L> {
    async fn list_job_grants(
        &self,
        tx: &mut PgConnection,
        target_id: TargetId,
    ) -> AppResult<Vec<JobAccessGrant<L>>> {
        self.list_job_grants_impl(tx, target_id).await
    }

    async fn create_job_grant(
        &self,
        tx: &mut PgConnection,
        target_id: TargetId,
        grant: &JobAccessGrant<L>,
    ) -> AppResult<GrantId> {
        self.create_job_grant_impl(tx, target_id, grant).await
    }

    async fn update_job_grant(
        &self,
        tx: &mut PgConnection,
        target_id: TargetId,
        grant: &JobAccessGrant<L>,
    ) -> AppResult<()> {
        self.update_job_grant_impl(tx, target_id, grant).await
    }

    async fn delete_job_grants(
        &self,
        tx: &mut PgConnection,
        target_id: TargetId,
        grant_ids: &[GrantId],
    ) -> AppResult<u64> {
        self.delete_job_grants_impl(tx, target_id, grant_ids).await
    }

    async fn clear_job_grants(
        &self,
        tx: &mut PgConnection,
        target_id: TargetId,
    ) -> AppResult<u64> {
        self.clear_job_grants_impl(tx, target_id).await
    }
}

#[async_trait]
impl<L: AccessLevel> UserGrantStore<L> for PostgresAccessStore<L> {
    async fn list_user_grants(
        &self,
        tx: &mut PgConnection,
        target_id: TargetId,
    ) -> AppResult<Vec<UserAccessGrant<L>>> {
        self.list_user_grants_impl(tx, target_id).await
    }

    async fn create_user_grant(
        &self,
        tx: &mut PgConnection,
        target_id: TargetId,
        grant: &UserAccessGrant<L>,
    ) -> AppResult<GrantId> {
        self.create_user_grant_impl(tx, target_id, grant).await
    }

    async fn update_user_grant(
        &self,
        tx: &mut PgConnection,
        target_id: TargetId,
        grant: &UserAccessGrant<L>,
    ) -> AppResult<()> {
        self.update_user_grant_impl(tx, target_id, grant).await
    }

    async fn delete_user_grants(
        &self,
        tx: &mut PgConnection,
        target_id: TargetId,
        grant_ids: &[GrantId],
    ) -> AppResult<u64> {
        self.delete_user_grants_impl(tx, target_id, grant_ids).await
    }

    async fn clear_user_grants(
        &self,
        tx: &mut PgConnection,
        target_id: TargetId,
    ) -> AppResult<u64> {
        self.clear_user_grants_impl(tx, target_id).await
    }
}

#[async_trait]
impl<L: AccessLevel> EffectiveAccessRepository<L> for PostgresAccessStore<L> {
    async fn load_access_snapshot(
        &self,
        target_id: TargetId,
        caller: &CallerIdentity,
    ) -> AppResult<Option<AccessSnapshot<L>>> {
        self.load_access_snapshot_impl(target_id, caller).await
    }

    async fn list_accessible_targets(
        &self,
        target_ids: &[TargetId],
        caller: &CallerIdentity,
        required: L,
    ) -> AppResult<Vec<TargetId>> {
        self.list_accessible_targets_impl(target_ids, caller, required)
            .await
    }

    async fn list_access(&self, target_id: TargetId) -> AppResult<AccessSet<L>> {
        self.list_access_impl(target_id).await
    }
}

impl SnapshotRow {
    fn job_grant<L: AccessLevel>(&self, job: &str) -> AppResult<Option<JobAccessGrant<L>>> {
        let (Some(grant_id), Some(minimum_grade), Some(access)) =
            (self.job_grant_id, self.job_minimum_grade, self.job_access)
        else {
            return Ok(None);
        };

        Ok(Some(JobAccessGrant {
            id: Some(GrantId::new(grant_id)),
            target_id: TargetId::new(self.id),
            job: job.to_owned(),
            minimum_grade,
            access: stored_level(grant_id, access)?,
        }))
    }

    fn into_target(self) -> AppResult<AccessTarget> {
        let creator_user_id = match self.creator_id {
            Some(value) => Some(UserId::new(value).map_err(|error| {
                AppError::Internal(format!("stored target {} is invalid: {error}", self.id))
            })?),
            None => None,
        };

        Ok(AccessTarget {
            id: TargetId::new(self.id),
            owning_job: self.creator_job,
            creator_user_id,
            deleted_at: self.deleted_at,
        })
    }
}
