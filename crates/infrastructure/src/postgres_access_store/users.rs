use tracing::debug;

use super::*;

impl<L: AccessLevel> PostgresAccessStore<L> {
    pub(super) async fn list_user_grants_impl(
        &self,
        tx: &mut PgConnection,
        target_id: TargetId,
    ) -> AppResult<Vec<UserAccessGrant<L>>> {
        let rows = sqlx::query_as::<_, UserGrantRow>(self.queries.list_user_grants.as_str())
            .bind(target_id.as_i64())
            .fetch_all(&mut *tx)
            .await
            .map_err(|error| AppError::Query(format!("failed to list user grants: {error}")))?;

        rows.into_iter().map(UserGrantRow::into_grant::<L>).collect()
    }

    pub(super) async fn create_user_grant_impl(
        &self,
        tx: &mut PgConnection,
        target_id: TargetId,
        grant: &UserAccessGrant<L>,
    ) -> AppResult<GrantId> {
        let grant_id = sqlx::query_scalar::<_, i64>(self.queries.insert_user_grant.as_str())
            .bind(target_id.as_i64())
            .bind(grant.user_id.as_i32())
            .bind(grant.access.storage_value())
            .fetch_one(&mut *tx)
            .await
            .map_err(|error| {
                map_grant_write_error(
                    error,
                    "create user grant",
                    &format!("user {} on target {target_id}", grant.user_id),
                )
            })?;

        Ok(GrantId::new(grant_id))
    }

    pub(super) async fn update_user_grant_impl(
        &self,
        tx: &mut PgConnection,
        target_id: TargetId,
        grant: &UserAccessGrant<L>,
    ) -> AppResult<()> {
        let grant_id = grant.id.ok_or_else(|| missing_id("user", target_id))?;

        let result = sqlx::query(self.queries.update_user_grant.as_str())
            .bind(grant_id.as_i64())
            .bind(target_id.as_i64())
            .bind(grant.user_id.as_i32())
            .bind(grant.access.storage_value())
            .execute(&mut *tx)
            .await
            .map_err(|error| {
                map_grant_write_error(
                    error,
                    "update user grant",
                    &format!("user {} on target {target_id}", grant.user_id),
                )
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "user grant {grant_id} of target {target_id} does not exist"
            )));
        }

        Ok(())
    }

    pub(super) async fn delete_user_grants_impl(
        &self,
        tx: &mut PgConnection,
        target_id: TargetId,
        grant_ids: &[GrantId],
    ) -> AppResult<u64> {
        let mut deleted = 0;
        for chunk in grant_ids.chunks(DELETE_CHUNK_SIZE) {
            let result = sqlx::query(self.queries.delete_user_grants.as_str())
                .bind(target_id.as_i64())
                .bind(raw_ids(chunk))
                .execute(&mut *tx)
                .await
                .map_err(|error| {
                    AppError::Query(format!("failed to delete user grants: {error}"))
                })?;
            deleted += result.rows_affected();
        }

        debug!(
            family = L::FAMILY,
            target_id = %target_id,
            requested = grant_ids.len(),
            deleted,
            "deleted user grants"
        );

        Ok(deleted)
    }

    pub(super) async fn clear_user_grants_impl(
        &self,
        tx: &mut PgConnection,
        target_id: TargetId,
    ) -> AppResult<u64> {
        let result = sqlx::query(self.queries.clear_user_grants.as_str())
            .bind(target_id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(|error| AppError::Query(format!("failed to clear user grants: {error}")))?;

        Ok(result.rows_affected())
    }
}
