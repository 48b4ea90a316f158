use tracing::debug;

use super::*;

impl<L: AccessLevel> PostgresAccessStore<L> {
    pub(super) async fn list_job_grants_impl(
        &self,
        tx: &mut PgConnection,
        target_id: TargetId,
    ) -> AppResult<Vec<JobAccessGrant<L>>> {
        let rows = sqlx::query_as::<_, JobGrantRow>(self.queries.list_job_grants.as_str())
            .bind(target_id.as_i64())
            .fetch_all(&mut *tx)
            .await
            .map_err(|error| AppError::Query(format!("failed to list job grants: {error}")))?;

        rows.into_iter().map(JobGrantRow::into_grant::<L>).collect()
    }

    pub(super) async fn create_job_grant_impl(
        &self,
        tx: &mut PgConnection,
        target_id: TargetId,
        grant: &JobAccessGrant<L>,
    ) -> AppResult<GrantId> {
        let grant_id = sqlx::query_scalar::<_, i64>(self.queries.insert_job_grant.as_str())
            .bind(target_id.as_i64())
            .bind(grant.job.as_str())
            .bind(grant.minimum_grade)
            .bind(grant.access.storage_value())
            .fetch_one(&mut *tx)
            .await
            .map_err(|error| {
                map_grant_write_error(error, "create job grant", &describe_job_grant(grant))
            })?;

        Ok(GrantId::new(grant_id))
    }

    pub(super) async fn update_job_grant_impl(
        &self,
        tx: &mut PgConnection,
        target_id: TargetId,
        grant: &JobAccessGrant<L>,
    ) -> AppResult<()> {
        let grant_id = grant.id.ok_or_else(|| missing_id("job", target_id))?;

        let result = sqlx::query(self.queries.update_job_grant.as_str())
            .bind(grant_id.as_i64())
            .bind(target_id.as_i64())
            .bind(grant.job.as_str())
            .bind(grant.minimum_grade)
            .bind(grant.access.storage_value())
            .execute(&mut *tx)
            .await
            .map_err(|error| {
                map_grant_write_error(error, "update job grant", &describe_job_grant(grant))
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "job grant {grant_id} of target {target_id} does not exist"
            )));
        }

        Ok(())
    }

    pub(super) async fn delete_job_grants_impl(
        &self,
        tx: &mut PgConnection,
        target_id: TargetId,
        grant_ids: &[GrantId],
    ) -> AppResult<u64> {
        let mut deleted = 0;
        for chunk in grant_ids.chunks(DELETE_CHUNK_SIZE) {
            let result = sqlx::query(self.queries.delete_job_grants.as_str())
                .bind(target_id.as_i64())
                .bind(raw_ids(chunk))
                .execute(&mut *tx)
                .await
                .map_err(|error| {
                    AppError::Query(format!("failed to delete job grants: {error}"))
                })?;
            deleted += result.rows_affected();
        }

        debug!(
            family = L::FAMILY,
            target_id = %target_id,
            requested = grant_ids.len(),
            deleted,
            "deleted job grants"
        );

        Ok(deleted)
    }

    pub(super) async fn clear_job_grants_impl(
        &self,
        tx: &mut PgConnection,
        target_id: TargetId,
    ) -> AppResult<u64> {
        let result = sqlx::query(self.queries.clear_job_grants.as_str())
            .bind(target_id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(|error| AppError::Query(format!("failed to clear job grants: {error}")))?;

        Ok(result.rows_affected())
    }
}

fn describe_job_grant<L: AccessLevel>(grant: &JobAccessGrant<L>) -> String {
    format!(
        "job '{}' at minimum grade {} on target {}",
        grant.job, grant.minimum_grade, grant.target_id
    )
}
