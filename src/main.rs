use anyhow::Result;
use rentledger::config::{AppConfig, PaymentProvider, StorageBackend};
use rentledger::core::store::LedgerStore;
use rentledger::gateway::{MockGateway, PaymentGateway, StripeGateway};
use rentledger::server::ServerBuilder;
use rentledger::storage::InMemoryStore;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rentledger=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;
    config.validate()?;

    let store = build_store(&config).await?;
    let gateway: Arc<dyn PaymentGateway> = match config.payments.provider {
        PaymentProvider::Stripe => Arc::new(StripeGateway::from_config(&config.payments)?),
        PaymentProvider::Mock => {
            tracing::warn!("using the mock payment provider; no real charges are made");
            Arc::new(MockGateway::new())
        }
    };

    tracing::info!(
        storage = ?config.storage.backend,
        provider = gateway.name(),
        "starting rent ledger"
    );

    let bind = config.server.bind.clone();
    ServerBuilder::new()
        .with_config(config)
        .with_shared_store(store)
        .with_shared_gateway(gateway)
        .serve(&bind)
        .await
}

async fn build_store(config: &AppConfig) -> Result<Arc<dyn LedgerStore>> {
    match config.storage.backend {
        StorageBackend::InMemory => Ok(Arc::new(InMemoryStore::new())),
        #[cfg(feature = "mongodb_backend")]
        StorageBackend::Mongodb => {
            let store = rentledger::storage::MongoStore::connect(
                &config.storage.mongodb_uri,
                &config.storage.database,
            )
            .await?;
            store.ensure_indexes().await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "mongodb_backend"))]
        StorageBackend::Mongodb => Err(anyhow::anyhow!(
            "storage backend 'mongodb' requires the mongodb_backend feature"
        )),
    }
}
