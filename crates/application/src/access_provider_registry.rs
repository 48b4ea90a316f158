use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use citadel_core::{AppError, AppResult, CallerIdentity, TargetId};
use citadel_domain::AccessLevel;

use crate::EffectiveAccessService;


/// Coarse cross-resource access check exposed to other subsystems.
#[async_trait]
pub trait AccessProvider: Send + Sync {
    /// Returns whether the caller reaches the target at the named level.
    ///
    /// `required` is the transport name of a level of the provider's family;
    /// unknown names are validation errors.
    async fn can_user_access_target(
        &self,
        target_id: TargetId,
        caller: &CallerIdentity,
        required: &str,
    ) -> AppResult<bool>;
}

#[async_trait]
impl<L: AccessLevel> AccessProvider for EffectiveAccessService<L> {
    async fn can_user_access_target(
        &self,
        target_id: TargetId,
        caller: &CallerIdentity,
        required: &str,
    ) -> AppResult<bool> {
        let required = required.trim().parse::<L>()?;
        self.can_access(target_id, caller, required).await
    }
}

/// Map from resource-type key to its access provider.
///
/// Populated once during startup; read-only afterwards.
#[derive(Clone, Default)]
pub struct AccessProviderRegistry {
    providers: HashMap<String, Arc<dyn AccessProvider>>,
}

impl AccessProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider, rejecting a key that is already taken.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        provider: Arc<dyn AccessProvider>,
    ) -> AppResult<()> {
        let kind = kind.into();
        if kind.trim().is_empty() {
            return Err(AppError::Validation(
                "access provider key must not be empty".to_owned(),
            ));
        }

        if self.providers.contains_key(&kind) {
            return Err(AppError::Conflict(format!(
                "access provider '{kind}' is already registered"
            )));
        }

        self.providers.insert(kind, provider);
        Ok(())
    }

    /// Returns the provider registered under `kind`.
    #[must_use]
    pub fn provider(&self, kind: &str) -> Option<Arc<dyn AccessProvider>> {
        self.providers.get(kind).cloned()
    }

    /// Returns whether `kind` has a provider.
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.providers.contains_key(kind)
    }

    /// Returns registered keys in ascending order.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Dispatches an access check to the provider of `kind`.
    pub async fn can_user_access_target(
        &self,
        kind: &str,
        target_id: TargetId,
        caller: &CallerIdentity,
        required: &str,
    ) -> AppResult<bool> {
        let provider = self.providers.get(kind).ok_or_else(|| {
            AppError::NotFound(format!("no access provider registered for '{kind}'"))
        })?;

        provider
            .can_user_access_target(target_id, caller, required)
            .await
    }
}

static GLOBAL_REGISTRY: OnceLock<AccessProviderRegistry> = OnceLock::new();

/// Installs the process-wide registry. Fails if one was already installed.
pub fn install_global_registry(
    registry: AccessProviderRegistry,
) -> AppResult<&'static AccessProviderRegistry> {
    GLOBAL_REGISTRY.set(registry).map_err(|_| {
        AppError::Conflict("access provider registry is already installed".to_owned())
    })?;

    GLOBAL_REGISTRY.get().ok_or_else(|| {
        AppError::Internal("access provider registry vanished after install".to_owned())
    })
}

/// Returns the process-wide registry, if installed.
#[must_use]
pub fn global_registry() -> Option<&'static AccessProviderRegistry> {
    GLOBAL_REGISTRY.get()
}
