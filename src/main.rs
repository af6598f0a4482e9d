//! Adress storefront server

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adress_storefront::domain::events::EventPublisher;
use adress_storefront::payment::MaibClient;
use adress_storefront::persistence::{MemoryRowStore, PgRowStore, RowStore};
use adress_storefront::services::auth::PROFILES_TABLE;
use adress_storefront::services::orders::ORDERS_TABLE;
use adress_storefront::{router, AppConfig, AppState};

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    if config.json_logs {
        tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init();
    }

    let store: Arc<dyn RowStore> = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new().max_connections(10).connect(url).await?;
            sqlx::migrate!("./migrations").run(&db).await?;
            Arc::new(PgRowStore::new(db))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, keeping rows in memory");
            let store = MemoryRowStore::new()
                .with_unique("adezive", "sku")
                .with_unique(PROFILES_TABLE, "email")
                .with_unique(ORDERS_TABLE, "pay_id");
            Arc::new(store)
        }
    };

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, events will only be logged");
                None
            }
        },
        None => None,
    };
    let events = EventPublisher::new(nats, config.nats_subject_prefix.clone());
    tracing::info!(broker = events.is_connected(), "event publisher ready");

    if !config.maib.is_configured() {
        tracing::warn!("MAIB credentials missing, card payments are disabled");
    }
    let gateway = Arc::new(MaibClient::new(config.maib.clone()));

    let state = AppState::new(store, gateway, events)
        .with_redirect_trust(config.redirect_trust)
        .with_registration_bonus(config.registration_bonus);
    let sessions = state.sessions.clone();
    let (idle, retention) = (config.session_idle, config.device_retention);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            tick.tick().await;
            sessions.sweep(idle, retention).await;
        }
    });
    let app = router(state);

    let addr = config.socket_addr();
    tracing::info!("Adress storefront listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
