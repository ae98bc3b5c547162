//! Mode-to-adapter routing.

use std::sync::Arc;

use shopreel_models::{GenerationMode, ProviderKind};

use crate::adapter::ProviderAdapter;
use crate::avatarly::AvatarlyAdapter;
use crate::error::ProviderResult;
use crate::vireo::VireoAdapter;

/// Holds one adapter instance per provider and routes modes to them.
///
/// Constructed once at process startup and shared by reference; adapters are
/// stateless so a single instance serves all workers.
#[derive(Clone)]
pub struct ProviderRouter {
    vireo: Arc<dyn ProviderAdapter>,
    avatarly: Arc<dyn ProviderAdapter>,
}

impl ProviderRouter {
    /// Build a router from explicit adapters (tests inject fakes here).
    pub fn new(vireo: Arc<dyn ProviderAdapter>, avatarly: Arc<dyn ProviderAdapter>) -> Self {
        Self { vireo, avatarly }
    }

    /// Build the production router from environment variables.
    pub fn from_env() -> ProviderResult<Self> {
        Ok(Self {
            vireo: Arc::new(VireoAdapter::from_env()?),
            avatarly: Arc::new(AvatarlyAdapter::from_env()?),
        })
    }

    /// The adapter responsible for a generation mode.
    pub fn adapter_for(&self, mode: &GenerationMode) -> Arc<dyn ProviderAdapter> {
        self.adapter(mode.provider())
    }

    /// The adapter for a provider kind.
    pub fn adapter(&self, kind: ProviderKind) -> Arc<dyn ProviderAdapter> {
        match kind {
            ProviderKind::Vireo => Arc::clone(&self.vireo),
            ProviderKind::Avatarly => Arc::clone(&self.avatarly),
        }
    }
}
