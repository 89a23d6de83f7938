use crate::application::overrides::OverrideService;
use crate::config::Settings;
use crate::error::Error;
use crate::infrastructure::{log_messages::application, InMemoryBackendStore, InMemoryRuleStore};
use crate::proxy::types::RequestSizeLimit;
use crate::proxy::{AdminAuthConfig, ProxyConfig, ProxyForwarder, ProxyService};
use crate::Result;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, instrument, warn};

/// Main application struct that coordinates all components
pub struct Application {
    settings: Settings,
    overrides: OverrideService,
}

impl Application {
    #[instrument]
    pub async fn new() -> Result<Self> {
        let settings = Settings::new()?;
        Self::with_settings(settings)
    }

    /// Wire stores, forwarder and service from already loaded settings.
    pub fn with_settings(settings: Settings) -> Result<Self> {
        let backends = settings.resolve_backends()?;
        if backends.is_empty() {
            warn!("{}", application::NO_BACKENDS);
        }
        for backend in &backends {
            info!(backend = %backend.key, base_url = %backend.base_url, "Backend configured");
        }

        let overrides = OverrideService::new(
            Arc::new(InMemoryRuleStore::new()),
            Arc::new(InMemoryBackendStore::new(backends)),
            ProxyForwarder::new(),
        );

        Ok(Self {
            settings,
            overrides,
        })
    }

    /// The fully layered router, without a listener.
    pub fn router(&self) -> Result<Router> {
        let max_request_size = RequestSizeLimit::try_new(self.settings.proxy.max_request_size)
            .map_err(|e| Error::invalid_input("proxy.max_request_size", e))?;
        let config = ProxyConfig { max_request_size };
        let admin_auth = AdminAuthConfig::from_user_key(self.settings.admin.user_key.as_deref());

        Ok(ProxyService::new(self.overrides.clone(), config).into_router(admin_auth))
    }

    #[instrument(skip(self))]
    pub async fn run(self) -> Result<()> {
        let router = self.router()?;
        let listener = TcpListener::bind(self.settings.bind_address()).await?;

        info!(address = %listener.local_addr()?, "{}", application::LISTENING);

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("{}", application::SHUTTING_DOWN),
        Err(e) => {
            warn!(error = %e, "Unable to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
