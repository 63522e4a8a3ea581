//! Shared application state.

use crate::config::Config;
use crate::gateway::HttpProviderGateway;
use promptguard_core::{
    ChatOrchestrator, DatasetCurator, InteractionLedger, OrchestratorConfig, PromptCatalog,
    ProviderGateway, ResponseCache, SafetyFilter, SecretStore, SessionStore,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub catalog: Arc<PromptCatalog>,
    pub ledger: Arc<InteractionLedger>,
    pub cache: Arc<ResponseCache>,
    pub curator: Arc<DatasetCurator>,
    pub orchestrator: Arc<ChatOrchestrator>,
    pub config: Config,
}

impl AppState {
    /// Wire the full stack against the configured HTTP gateway.
    pub fn new(config: Config, master_key_hex: &str) -> promptguard_core::Result<Self> {
        let gateway: Arc<dyn ProviderGateway> =
            Arc::new(HttpProviderGateway::new(config.gateway_url.clone()));
        Self::with_gateway(config, master_key_hex, gateway)
    }

    /// Wire the full stack with an injected gateway (used by tests).
    pub fn with_gateway(
        config: Config,
        master_key_hex: &str,
        gateway: Arc<dyn ProviderGateway>,
    ) -> promptguard_core::Result<Self> {
        let secrets = Arc::new(SecretStore::from_hex_key(master_key_hex)?);

        let sessions = Arc::new(SessionStore::open(&config.db_path)?);
        let catalog = Arc::new(PromptCatalog::open(&config.db_path, secrets.clone())?);
        let ledger = Arc::new(InteractionLedger::open(&config.db_path)?);
        let cache = Arc::new(ResponseCache::new(config.cache.to_cache_config()));
        let curator = Arc::new(DatasetCurator::open(
            &config.db_path,
            ledger.clone(),
            catalog.clone(),
        )?);

        let safety = SafetyFilter::new(config.allowed_link_domains.clone());
        let orchestrator = Arc::new(ChatOrchestrator::new(
            catalog.clone(),
            sessions.clone(),
            ledger.clone(),
            cache.clone(),
            gateway,
            safety,
            secrets,
            OrchestratorConfig {
                capture_prompt_for_training: config.capture_prompt_for_training,
            },
        ));

        Ok(Self {
            sessions,
            catalog,
            ledger,
            cache,
            curator,
            orchestrator,
            config,
        })
    }

    /// Spawn the cache sweeper and the session expiry sweep.
    pub fn spawn_background_tasks(self: &Arc<Self>) {
        let _ = self.cache.spawn_sweeper();

        let state = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if let Err(e) = state.sessions.expire_idle(chrono::Utc::now()) {
                    tracing::warn!(target: "promptguard::session", "Idle sweep failed: {}", e);
                }
            }
        });
    }
}
