//! ServerBuilder for fluent API to build the HTTP server

use super::handlers::AppState;
use super::reconciler::spawn_reconciler;
use super::router::build_routes;
use crate::config::AppConfig;
use crate::core::clock::{Clock, SystemClock};
use crate::core::events::EventBus;
use crate::core::store::LedgerStore;
use crate::gateway::PaymentGateway;
use crate::service::LedgerService;
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Builder for the ledger HTTP server
///
/// # Example
///
/// ```ignore
/// ServerBuilder::new()
///     .with_config(config)
///     .with_store(InMemoryStore::new())
///     .with_gateway(MockGateway::new())
///     .serve("127.0.0.1:3000")
///     .await?;
/// ```
pub struct ServerBuilder {
    config: AppConfig,
    store: Option<Arc<dyn LedgerStore>>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
    custom_routes: Vec<Router>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            store: None,
            gateway: None,
            clock: Arc::new(SystemClock),
            event_bus: None,
            custom_routes: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the storage backend (required)
    pub fn with_store(mut self, store: impl LedgerStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Set an already shared storage backend
    pub fn with_shared_store(mut self, store: Arc<dyn LedgerStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the payment provider (required)
    pub fn with_gateway(mut self, gateway: impl PaymentGateway + 'static) -> Self {
        self.gateway = Some(Arc::new(gateway));
        self
    }

    pub fn with_shared_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Replace the wall clock, mostly for tests
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Use an existing event bus so callers can subscribe before serving
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Add routes next to the ledger API
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Build the service that backs every route
    pub fn build_service(&mut self) -> Result<LedgerService> {
        let store = self
            .store
            .clone()
            .ok_or_else(|| anyhow::anyhow!("A store is required. Call .with_store()"))?;
        let gateway = self
            .gateway
            .clone()
            .ok_or_else(|| anyhow::anyhow!("A payment gateway is required. Call .with_gateway()"))?;
        let events = self
            .event_bus
            .get_or_insert_with(|| EventBus::new(self.config.server.event_bus_capacity))
            .clone();

        Ok(LedgerService::new(
            store,
            gateway,
            self.clock.clone(),
            events,
            &self.config,
        ))
    }

    /// Build the router without starting the reconciler
    pub fn build(mut self) -> Result<Router> {
        let service = self.build_service()?;
        Ok(self.router(service))
    }

    fn router(&mut self, service: LedgerService) -> Router {
        let mut app = build_routes(AppState { service });
        for custom in std::mem::take(&mut self.custom_routes) {
            app = app.merge(custom);
        }
        app.layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Serve the application with graceful shutdown
    ///
    /// This will:
    /// - Bind to the provided address
    /// - Start the background payment reconciler
    /// - Handle SIGTERM and SIGINT (Ctrl+C) for graceful shutdown
    pub async fn serve(mut self, addr: &str) -> Result<()> {
        let service = self.build_service()?;
        let reconciler = spawn_reconciler(
            service.clone(),
            Duration::from_secs(self.config.reconcile.interval_secs),
        );
        let app = self.router(service);
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        if let Some(handle) = reconciler {
            handle.abort();
        }
        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}
