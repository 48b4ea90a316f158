use super::*;

impl<L: AccessLevel> PostgresAccessStore<L> {
    /// Reads the target, the caller's user grant and the caller's job
    /// grants in one statement so the decision sees a single snapshot.
    pub(super) async fn load_access_snapshot_impl(
        &self,
        target_id: TargetId,
        caller: &CallerIdentity,
    ) -> AppResult<Option<AccessSnapshot<L>>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(self.queries.load_snapshot.as_str())
            .bind(target_id.as_i64())
            .bind(caller.user_id().as_i32())
            .bind(caller.job())
            .fetch_all(&self.pool)
            .await
            .map_err(|error| AppError::Query(format!("failed to load access target: {error}")))?;

        let job_grants = rows
            .iter()
            .filter_map(|row| row.job_grant::<L>(caller.job()).transpose())
            .collect::<AppResult<Vec<_>>>()?;

        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };

        let user_grant = row
            .user_access
            .map(|value| stored_level::<L>(row.id, value))
            .transpose()?;
        let target = row.into_target()?;

        Ok(Some(AccessSnapshot {
            target,
            user_grant,
            job_grants,
        }))
    }

    pub(super) async fn list_accessible_targets_impl(
        &self,
        target_ids: &[TargetId],
        caller: &CallerIdentity,
        required: L,
    ) -> AppResult<Vec<TargetId>> {
        if target_ids.is_empty() {
            return Ok(Vec::new());
        }

        let raw_target_ids: Vec<i64> = target_ids.iter().map(TargetId::as_i64).collect();
        let rows = sqlx::query_scalar::<_, i64>(self.queries.accessible_targets.as_str())
            .bind(raw_target_ids)
            .bind(caller.user_id().as_i32())
            .bind(caller.job())
            .bind(caller.grade())
            .bind(required.storage_value())
            .fetch_all(&self.pool)
            .await
            .map_err(|error| {
                AppError::Query(format!("failed to filter accessible targets: {error}"))
            })?;

        Ok(rows.into_iter().map(TargetId::new).collect())
    }

    pub(super) async fn list_access_impl(&self, target_id: TargetId) -> AppResult<AccessSet<L>> {
        let mut connection = self.acquire().await?;
        let jobs = self.list_job_grants_impl(&mut connection, target_id).await?;
        let users = self.list_user_grants_impl(&mut connection, target_id).await?;

        Ok(AccessSet::new(jobs, users))
    }

    async fn acquire(&self) -> AppResult<sqlx::pool::PoolConnection<Postgres>> {
        self.pool
            .acquire()
            .await
            .map_err(|error| AppError::Query(format!("failed to acquire connection: {error}")))
    }
}
