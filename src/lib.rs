pub mod cache;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod handlers;
pub mod logging;
pub mod protocol;
pub mod providers;
pub mod sampling;
pub mod server;
pub mod subscriptions;
pub mod transport;

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use cache::ResponseCache;
use config::ServerConfig;
use connection::manager::ConnectionManager;
use dispatch::cancel::CancellationRegistry;
use logging::ClientLogLevel;
use protocol::registry::MethodRegistry;
use protocol::types::{LogLevel, ServerInfo};
use providers::{
    Authenticator, CompletionService, PromptRegistry, ResourceRegistry, RootRegistry, ToolRegistry,
};
use subscriptions::SubscriptionManager;

/// Shared server state passed to every handler and background task.
///
/// Registries are populated at startup; the optional collaborators
/// (completion service, authenticator) are write-once. Everything here is
/// shared across all connections for the process lifetime.
pub struct ServerContext {
    pub config: Arc<ServerConfig>,
    pub server_info: ServerInfo,
    pub methods: Arc<MethodRegistry>,
    pub tools: Arc<ToolRegistry>,
    pub resources: Arc<ResourceRegistry>,
    pub prompts: Arc<PromptRegistry>,
    pub roots: Arc<RootRegistry>,
    pub cache: Arc<ResponseCache>,
    pub subscriptions: Arc<SubscriptionManager>,
    pub cancels: Arc<CancellationRegistry>,
    pub connections: Arc<ConnectionManager>,
    pub log_level: Arc<ClientLogLevel>,
    pub started_at: Instant,
    completion: OnceLock<Arc<dyn CompletionService>>,
    authenticator: OnceLock<Arc<dyn Authenticator>>,
}

impl ServerContext {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let config = Arc::new(config);
        let cache = Arc::new(ResponseCache::new(
            config.cache_size_limit,
            config.compaction_margin,
            config.cache_default_expiration,
        ));
        let subscriptions = Arc::new(SubscriptionManager::new(cache.clone()));
        let cancels = Arc::new(CancellationRegistry::new());
        let connections = Arc::new(ConnectionManager::new(
            config.max_connections,
            config.idle_timeout,
            cancels.clone(),
            subscriptions.clone(),
        ));

        Arc::new(Self {
            config,
            server_info: ServerInfo {
                name: "flowd".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            methods: Arc::new(MethodRegistry::standard()),
            tools: Arc::new(ToolRegistry::new()),
            resources: Arc::new(ResourceRegistry::new()),
            prompts: Arc::new(PromptRegistry::new()),
            roots: Arc::new(RootRegistry::new()),
            cache,
            subscriptions,
            cancels,
            connections,
            log_level: Arc::new(ClientLogLevel::new(LogLevel::Info)),
            started_at: Instant::now(),
            completion: OnceLock::new(),
            authenticator: OnceLock::new(),
        })
    }

    /// Install the completion service. Startup-only; a second call is ignored.
    pub fn set_completion_service(&self, service: Arc<dyn CompletionService>) {
        let _ = self.completion.set(service);
    }

    pub fn completion_service(&self) -> Option<&Arc<dyn CompletionService>> {
        self.completion.get()
    }

    /// Install the authentication hook. Startup-only; a second call is ignored.
    pub fn set_authenticator(&self, authenticator: Arc<dyn Authenticator>) {
        let _ = self.authenticator.set(authenticator);
    }

    pub fn authenticator(&self) -> Option<&Arc<dyn Authenticator>> {
        self.authenticator.get()
    }
}
