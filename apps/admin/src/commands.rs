use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use citadel_application::{AccessProviderRegistry, AccessReconciler, EffectiveAccessService};
use citadel_core::{AppError, AppResult, CallerIdentity, TargetId, UserId};
use citadel_domain::{
    AccessLevel, AccessSet, AccessSetInput, DocumentAccessLevel, ReconciliationPlan, ResourceKind,
    TemplateAccessLevel, ThreadAccessLevel,
};
use citadel_infrastructure::{GrantTables, PostgresAccessStore};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use tracing::info;

/// Access administration for documents, document templates and messenger threads.
#[derive(Debug, Parser)]
#[command(name = "citadel-admin")]
pub struct AdminCli {
    #[command(subcommand)]
    pub command: AdminCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum AdminCommand {
    /// Apply pending migrations and exit
    Migrate,
    /// Check one caller against one target through the provider registry
    Check {
        /// documents, document_templates or messenger_threads
        #[arg(value_parser = parse_kind)]
        kind: ResourceKind,
        #[arg(value_parser = parse_target_id)]
        target_id: TargetId,
        /// Required access level name
        level: String,
        #[command(flatten)]
        caller: CallerArgs,
    },
    #[command(flatten)]
    Family(FamilyCommand),
}

/// Commands that need the typed access level of one family.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum FamilyCommand {
    /// Print the job and user grants of a target
    Grants {
        #[arg(value_parser = parse_kind)]
        kind: ResourceKind,
        #[arg(value_parser = parse_target_id)]
        target_id: TargetId,
    },
    /// Print which of the listed targets the caller reaches
    Filter {
        #[arg(value_parser = parse_kind)]
        kind: ResourceKind,
        /// Required access level name
        level: String,
        #[command(flatten)]
        caller: CallerArgs,
        /// Candidate target ids, comma or space separated
        #[arg(value_parser = parse_target_id, value_delimiter = ',', required = true)]
        target_ids: Vec<TargetId>,
    },
    /// Reconcile a target's grants to the set in a JSON file
    SetAccess {
        #[arg(value_parser = parse_kind)]
        kind: ResourceKind,
        #[arg(value_parser = parse_target_id)]
        target_id: TargetId,
        input_path: PathBuf,
    },
    /// Remove every grant of a target
    ResetAccess {
        #[arg(value_parser = parse_kind)]
        kind: ResourceKind,
        #[arg(value_parser = parse_target_id)]
        target_id: TargetId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct CallerArgs {
    #[arg(value_parser = parse_user_id)]
    user_id: UserId,
    job: String,
    grade: i32,
    /// Bypass every grant check
    #[arg(long)]
    superuser: bool,
}

impl CallerArgs {
    fn identity(&self) -> CallerIdentity {
        CallerIdentity::new(self.user_id, self.job.trim(), self.grade)
            .with_superuser(self.superuser)
    }
}

impl FamilyCommand {
    fn kind(&self) -> ResourceKind {
        match self {
            Self::Grants { kind, .. }
            | Self::Filter { kind, .. }
            | Self::SetAccess { kind, .. }
            | Self::ResetAccess { kind, .. } => *kind,
        }
    }
}

#[derive(Debug, Serialize)]
struct ReconcileReport<'a, L> {
    kind: &'static str,
    target_id: TargetId,
    plan: &'a ReconciliationPlan<L>,
    revoked_user_ids: Vec<UserId>,
    granted_user_ids: Vec<UserId>,
}

impl AdminCommand {
    pub async fn run(self, pool: &PgPool, registry: &AccessProviderRegistry) -> AppResult<()> {
        match self {
            Self::Migrate => {
                info!("migrations are up to date");
                Ok(())
            }
            Self::Check {
                kind,
                target_id,
                level,
                caller,
            } => {
                let caller = caller.identity();
                let allowed = registry
                    .can_user_access_target(kind.as_str(), target_id, &caller, level.as_str())
                    .await?;

                print_json(&json!({
                    "kind": kind.as_str(),
                    "target_id": target_id,
                    "user_id": caller.user_id(),
                    "required": level,
                    "allowed": allowed,
                }))
            }
            Self::Family(command) => match command.kind() {
                ResourceKind::Document => run_family::<DocumentAccessLevel>(pool, command).await,
                ResourceKind::DocumentTemplate => {
                    run_family::<TemplateAccessLevel>(pool, command).await
                }
                ResourceKind::MessengerThread => {
                    run_family::<ThreadAccessLevel>(pool, command).await
                }
            },
        }
    }
}

async fn run_family<L>(pool: &PgPool, command: FamilyCommand) -> AppResult<()>
where
    L: AccessLevel + Serialize,
{
    let kind = command.kind();
    let store = Arc::new(PostgresAccessStore::<L>::new(
        pool.clone(),
        &GrantTables::for_kind(kind),
    ));

    match command {
        FamilyCommand::Grants { target_id, .. } => {
            let service: EffectiveAccessService<L> = EffectiveAccessService::new(store);
            let access = service.list_access(target_id).await?;
            print_json(&access)
        }
        FamilyCommand::Filter {
            level,
            caller,
            target_ids,
            ..
        } => {
            let required = L::from_str(level.trim())?;
            let service: EffectiveAccessService<L> = EffectiveAccessService::new(store);
            let allowed = service
                .can_access_any(&target_ids, &caller.identity(), required)
                .await?;

            print_json(&json!({
                "kind": kind.as_str(),
                "required": required.as_str(),
                "allowed": allowed,
            }))
        }
        FamilyCommand::SetAccess {
            target_id,
            input_path,
            ..
        } => {
            let raw = tokio::fs::read_to_string(&input_path).await.map_err(|error| {
                AppError::Validation(format!(
                    "failed to read access file '{}': {error}",
                    input_path.display()
                ))
            })?;
            let input: AccessSetInput = serde_json::from_str(raw.as_str()).map_err(|error| {
                AppError::Validation(format!(
                    "invalid access file '{}': {error}",
                    input_path.display()
                ))
            })?;
            let desired = AccessSet::<L>::from_input(target_id, input)?;

            let reconciler: AccessReconciler<L, _> = AccessReconciler::new(store.clone());
            let mut transaction = store.begin().await?;
            let plan = reconciler
                .reconcile(&mut *transaction, target_id, desired)
                .await?;
            commit(transaction).await?;

            print_report(kind, target_id, &plan)
        }
        FamilyCommand::ResetAccess { target_id, .. } => {
            let reconciler: AccessReconciler<L, _> = AccessReconciler::new(store.clone());
            let mut transaction = store.begin().await?;
            let plan = reconciler
                .reset_access(&mut *transaction, target_id)
                .await?;
            commit(transaction).await?;

            print_report(kind, target_id, &plan)
        }
    }
}

async fn commit(transaction: sqlx::Transaction<'static, sqlx::Postgres>) -> AppResult<()> {
    transaction
        .commit()
        .await
        .map_err(|error| AppError::Query(format!("failed to commit transaction: {error}")))
}

fn print_report<L>(
    kind: ResourceKind,
    target_id: TargetId,
    plan: &ReconciliationPlan<L>,
) -> AppResult<()>
where
    L: AccessLevel + Serialize,
{
    print_json(&ReconcileReport {
        kind: kind.as_str(),
        target_id,
        plan,
        revoked_user_ids: plan.revoked_user_ids(),
        granted_user_ids: plan.granted_user_ids(),
    })
}

fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|error| AppError::Internal(format!("failed to render output: {error}")))?;
    println!("{rendered}");

    Ok(())
}

fn parse_kind(value: &str) -> AppResult<ResourceKind> {
    ResourceKind::from_str(value.trim())
}

fn parse_target_id(value: &str) -> AppResult<TargetId> {
    value
        .trim()
        .parse::<i64>()
        .map(TargetId::new)
        .map_err(|error| AppError::Validation(format!("invalid target id '{value}': {error}")))
}

fn parse_user_id(value: &str) -> AppResult<UserId> {
    let raw = value
        .trim()
        .parse::<i32>()
        .map_err(|error| AppError::Validation(format!("invalid user id '{value}': {error}")))?;

    UserId::new(raw)
}
