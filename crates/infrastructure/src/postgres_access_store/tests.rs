use std::sync::Arc;

use citadel_application::{
    AccessReconciler, EffectiveAccessRepository, EffectiveAccessService, UserGrantStore,
};
use citadel_core::{AppError, CallerIdentity, TargetId, UserId};
use citadel_domain::{
    AccessSet, DocumentAccessLevel, JobAccessGrant, ResourceKind, UserAccessGrant,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::{DELETE_CHUNK_SIZE, PostgresAccessStore};
use crate::{GrantTables, MIGRATOR};

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres access store tests: {error}");
    }

    Some(pool)
}

async fn insert_document(pool: &PgPool, creator_id: i32, creator_job: &str) -> TargetId {
    let inserted = sqlx::query_scalar::<_, i64>(
        r#"
            INSERT INTO documents (title, creator_id, creator_job)
            VALUES ('access test', $1, $2)
            RETURNING id
            "#,
    )
    .bind(creator_id)
    .bind(creator_job)
    .fetch_one(pool)
    .await;

    match inserted {
        Ok(id) => TargetId::new(id),
        Err(error) => panic!("failed to insert document: {error}"),
    }
}

fn store(pool: &PgPool) -> Arc<PostgresAccessStore<DocumentAccessLevel>> {
    Arc::new(PostgresAccessStore::new(
        pool.clone(),
        &GrantTables::for_kind(ResourceKind::Document),
    ))
}

fn user(value: i32) -> UserId {
    UserId::new(value).unwrap_or_else(|error| panic!("invalid user id: {error}"))
}

fn job(
    target_id: TargetId,
    name: &str,
    minimum_grade: i32,
    access: DocumentAccessLevel,
) -> JobAccessGrant<DocumentAccessLevel> {
    JobAccessGrant::new(target_id, name, minimum_grade, access)
        .unwrap_or_else(|error| panic!("invalid job grant: {error}"))
}

#[tokio::test]
async fn reconcile_persists_and_second_pass_is_noop() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let store = store(&pool);
    let reconciler: AccessReconciler<DocumentAccessLevel, _> =
        AccessReconciler::new(store.clone());
    let target_id = insert_document(&pool, 900, "doj").await;
    let desired = AccessSet::new(
        vec![
            job(target_id, "police", 2, DocumentAccessLevel::View),
            job(target_id, "police", 5, DocumentAccessLevel::Edit),
        ],
        vec![UserAccessGrant::new(
            target_id,
            user(42),
            DocumentAccessLevel::Admin,
        )],
    );

    let Ok(mut transaction) = store.begin().await else {
        panic!("failed to begin transaction");
    };
    let first = reconciler
        .reconcile(&mut *transaction, target_id, desired.clone())
        .await;
    let Ok(first) = first else {
        panic!("first reconcile failed");
    };
    assert_eq!(first.to_create.len(), 3);
    assert!(transaction.commit().await.is_ok());

    let Ok(mut transaction) = store.begin().await else {
        panic!("failed to begin transaction");
    };
    let second = reconciler
        .reconcile(&mut *transaction, target_id, desired)
        .await;
    assert!(second.is_ok_and(|plan| plan.is_empty()));
    assert!(transaction.commit().await.is_ok());
}

#[tokio::test]
async fn dropped_transaction_discards_writes() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let store = store(&pool);
    let reconciler: AccessReconciler<DocumentAccessLevel, _> =
        AccessReconciler::new(store.clone());
    let service: EffectiveAccessService<DocumentAccessLevel> =
        EffectiveAccessService::new(store.clone());
    let target_id = insert_document(&pool, 901, "doj").await;

    {
        let Ok(mut transaction) = store.begin().await else {
            panic!("failed to begin transaction");
        };
        let plan = reconciler
            .reconcile(
                &mut *transaction,
                target_id,
                AccessSet::new(
                    vec![job(target_id, "police", 0, DocumentAccessLevel::View)],
                    Vec::new(),
                ),
            )
            .await;
        assert!(plan.is_ok());
    }

    let committed = service.list_access(target_id).await;
    assert!(committed.is_ok_and(|set| set.is_empty()));
}

#[tokio::test]
async fn lock_target_reports_missing_target() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let store = store(&pool);
    let reconciler: AccessReconciler<DocumentAccessLevel, _> =
        AccessReconciler::new(store.clone());

    let Ok(mut transaction) = store.begin().await else {
        panic!("failed to begin transaction");
    };
    let result = reconciler
        .reconcile(&mut *transaction, TargetId::new(i64::MAX), AccessSet::default())
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn batch_filter_matches_single_checks() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let store = store(&pool);
    let reconciler: AccessReconciler<DocumentAccessLevel, _> =
        AccessReconciler::new(store.clone());
    let service: EffectiveAccessService<DocumentAccessLevel> =
        EffectiveAccessService::new(store.clone());

    let open = insert_document(&pool, 902, "doj").await;
    let blocked = insert_document(&pool, 902, "doj").await;
    let senior_only = insert_document(&pool, 902, "doj").await;
    let owned = insert_document(&pool, 77, "police").await;
    let deleted = insert_document(&pool, 902, "doj").await;

    let Ok(mut transaction) = store.begin().await else {
        panic!("failed to begin transaction");
    };
    for (target_id, desired) in [
        (
            open,
            AccessSet::new(
                vec![job(open, "police", 1, DocumentAccessLevel::Edit)],
                Vec::new(),
            ),
        ),
        (
            blocked,
            AccessSet::new(
                vec![job(blocked, "police", 0, DocumentAccessLevel::Admin)],
                vec![UserAccessGrant::new(
                    blocked,
                    user(77),
                    DocumentAccessLevel::Blocked,
                )],
            ),
        ),
        (
            senior_only,
            AccessSet::new(
                vec![job(senior_only, "police", 9, DocumentAccessLevel::View)],
                Vec::new(),
            ),
        ),
        (
            deleted,
            AccessSet::new(
                vec![job(deleted, "police", 0, DocumentAccessLevel::View)],
                Vec::new(),
            ),
        ),
    ] {
        let result = reconciler
            .reconcile(&mut *transaction, target_id, desired)
            .await;
        assert!(result.is_ok());
    }
    assert!(transaction.commit().await.is_ok());

    let soft_delete = sqlx::query("UPDATE documents SET deleted_at = now() WHERE id = $1")
        .bind(deleted.as_i64())
        .execute(&pool)
        .await;
    assert!(soft_delete.is_ok());

    let caller = CallerIdentity::new(user(77), "police", 3);
    let candidates = [open, blocked, senior_only, owned, deleted];

    let batch = service
        .can_access_any(&candidates, &caller, DocumentAccessLevel::View)
        .await
        .unwrap_or_else(|error| panic!("batch filter failed: {error}"));

    let mut single = Vec::new();
    for target_id in candidates {
        let allowed = service
            .can_access(target_id, &caller, DocumentAccessLevel::View)
            .await
            .unwrap_or_else(|error| panic!("single check failed: {error}"));
        if allowed {
            single.push(target_id);
        }
    }
    single.sort();

    assert_eq!(batch, single);
    assert_eq!(batch, vec![open, owned]);
}

#[tokio::test]
async fn duplicate_insert_maps_to_duplicate_grant() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let store = store(&pool);
    let target_id = insert_document(&pool, 903, "doj").await;
    let grant = job(target_id, "police", 3, DocumentAccessLevel::View);

    let Ok(mut transaction) = store.begin().await else {
        panic!("failed to begin transaction");
    };
    let first = citadel_application::JobGrantStore::create_job_grant(
        store.as_ref(),
        &mut *transaction,
        target_id,
        &grant,
    )
    .await;
    assert!(first.is_ok());

    let second = citadel_application::JobGrantStore::create_job_grant(
        store.as_ref(),
        &mut *transaction,
        target_id,
        &grant,
    )
    .await;
    assert!(matches!(second, Err(AppError::DuplicateGrant(_))));
}

#[tokio::test]
async fn deletes_span_multiple_chunks() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let store = store(&pool);
    let reconciler: AccessReconciler<DocumentAccessLevel, _> =
        AccessReconciler::new(store.clone());
    let service: EffectiveAccessService<DocumentAccessLevel> =
        EffectiveAccessService::new(store.clone());
    let target_id = insert_document(&pool, 904, "doj").await;
    let grant_count = DELETE_CHUNK_SIZE + 3;
    let max_user = i32::try_from(grant_count).unwrap_or_else(|error| panic!("{error}"));

    let users = (1..=max_user)
        .map(|value| UserAccessGrant::new(target_id, user(value), DocumentAccessLevel::View))
        .collect();
    let Ok(mut transaction) = store.begin().await else {
        panic!("failed to begin transaction");
    };
    let seeded = reconciler
        .reconcile(&mut *transaction, target_id, AccessSet::new(Vec::new(), users))
        .await;
    assert!(seeded.is_ok_and(|plan| plan.to_create.users.len() == grant_count));
    assert!(transaction.commit().await.is_ok());

    {
        let Ok(mut transaction) = store.begin().await else {
            panic!("failed to begin transaction");
        };
        let grant_ids: Vec<_> = store
            .list_user_grants(&mut *transaction, target_id)
            .await
            .unwrap_or_else(|error| panic!("list failed: {error}"))
            .into_iter()
            .filter_map(|grant| grant.id)
            .collect();
        assert_eq!(grant_ids.len(), grant_count);

        let deleted = store
            .delete_user_grants(&mut *transaction, target_id, &grant_ids)
            .await;
        assert!(matches!(deleted, Ok(count) if count == grant_count as u64));

        let remaining = store.list_user_grants(&mut *transaction, target_id).await;
        assert!(remaining.is_ok_and(|grants| grants.is_empty()));
    }

    let Ok(mut transaction) = store.begin().await else {
        panic!("failed to begin transaction");
    };
    let revoked = reconciler
        .reconcile(&mut *transaction, target_id, AccessSet::default())
        .await;
    assert!(revoked.is_ok_and(|plan| plan.to_delete.users.len() == grant_count));
    assert!(transaction.commit().await.is_ok());

    let committed = service.list_access(target_id).await;
    assert!(committed.is_ok_and(|set| set.is_empty()));
}

#[tokio::test]
async fn snapshot_carries_user_grant_and_every_caller_job_grant() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let store = store(&pool);
    let reconciler: AccessReconciler<DocumentAccessLevel, _> =
        AccessReconciler::new(store.clone());
    let target_id = insert_document(&pool, 905, "doj").await;
    let bare_target = insert_document(&pool, 905, "doj").await;

    let Ok(mut transaction) = store.begin().await else {
        panic!("failed to begin transaction");
    };
    let seeded = reconciler
        .reconcile(
            &mut *transaction,
            target_id,
            AccessSet::new(
                vec![
                    job(target_id, "police", 5, DocumentAccessLevel::Admin),
                    job(target_id, "police", 0, DocumentAccessLevel::View),
                    job(target_id, "ems", 0, DocumentAccessLevel::Edit),
                ],
                vec![UserAccessGrant::new(
                    target_id,
                    user(77),
                    DocumentAccessLevel::Comment,
                )],
            ),
        )
        .await;
    assert!(seeded.is_ok());
    assert!(transaction.commit().await.is_ok());

    let caller = CallerIdentity::new(user(77), "police", 3);
    let snapshot = store
        .load_access_snapshot(target_id, &caller)
        .await
        .unwrap_or_else(|error| panic!("snapshot failed: {error}"));
    let Some(snapshot) = snapshot else {
        panic!("target should exist");
    };
    assert_eq!(snapshot.target.creator_user_id, Some(user(905)));
    assert_eq!(snapshot.user_grant, Some(DocumentAccessLevel::Comment));
    let grades: Vec<i32> = snapshot
        .job_grants
        .iter()
        .map(|grant| grant.minimum_grade)
        .collect();
    assert_eq!(grades, vec![0, 5]);
    assert!(snapshot.job_grants.iter().all(|grant| grant.job == "police"));

    let bare = store.load_access_snapshot(bare_target, &caller).await;
    assert!(matches!(
        bare,
        Ok(Some(ref snapshot)) if snapshot.user_grant.is_none() && snapshot.job_grants.is_empty()
    ));

    let missing = store
        .load_access_snapshot(TargetId::new(i64::MAX), &caller)
        .await;
    assert!(matches!(missing, Ok(None)));
}
