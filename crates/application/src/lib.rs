//! Application services and ports.

#![forbid(unsafe_code)]

mod access_ports;
mod access_provider_registry;
mod access_reconciler;
mod effective_access_service;

pub use access_ports::{
    AccessTargetStore, EffectiveAccessRepository, JobGrantStore, TransactionScope,
    UserGrantStore,
};
pub use access_provider_registry::{
    AccessProvider, AccessProviderRegistry, global_registry, install_global_registry,
};
pub use access_reconciler::AccessReconciler;
pub use effective_access_service::EffectiveAccessService;
