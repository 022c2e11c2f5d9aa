use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod error;
mod models;
mod services;
mod storage;

use config::Config;
use services::{
    fanout::NotificationFanout,
    monitoring::MonitoringClient,
    pipeline::{AdminCredentials, AlarmPipeline},
    scheduler::Scheduler,
    subscriptions::SubscriptionService,
    telegram::TelegramClient,
};
use storage::{postgres::PgStore, redis::RedisClient};

#[derive(Clone)]
pub struct AppState {
    pub subscriptions: Arc<SubscriptionService>,
    pub admin_token: Option<Arc<str>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "alarm_notifier=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load();
    tracing::info!("Starting notifier in {} mode", config.server.environment);
    if config.server.admin_token.is_none() {
        tracing::warn!("ADMIN_API_TOKEN is not set, the admin API is unauthenticated");
    }

    // Initialize database pool
    let db = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database_url())
        .await?;
    tracing::info!("Connected to PostgreSQL");

    // Run migrations
    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("Database migrations completed");

    // Redis only guards job runs across instances
    let redis = match RedisClient::new(&config.redis_url()).await {
        Ok(redis) => {
            tracing::info!("Connected to Redis");
            Some(redis)
        }
        Err(e) => {
            tracing::warn!("Redis unavailable, jobs will run without locks: {}", e);
            None
        }
    };

    // External collaborators
    let monitoring = Arc::new(MonitoringClient::new(&config.monitoring)?);
    let telegram = Arc::new(TelegramClient::new(&config.telegram)?);
    let store = Arc::new(PgStore::new(db));

    let pipeline = Arc::new(AlarmPipeline::new(
        monitoring.clone(),
        store.clone(),
        store.clone(),
        NotificationFanout::new(telegram.clone()),
        AdminCredentials {
            login: config.monitoring.admin_login.clone(),
            password: config.monitoring.admin_password.clone(),
        },
        config.alarms.clone(),
    ));

    let subscriptions = Arc::new(SubscriptionService::new(
        monitoring,
        store,
        telegram,
        config.alarms.reauthorize_message.clone(),
    ));

    // Background jobs
    let scheduler = Scheduler::new(redis, config.scheduler.lock_ttl);
    scheduler.spawn(pipeline, config.scheduler.poll_interval);
    scheduler.spawn(
        subscriptions.clone(),
        config.scheduler.subscription_refresh_interval,
    );

    // Create app state
    let state = AppState {
        subscriptions,
        admin_token: config.server.admin_token.as_deref().map(Arc::from),
    };

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, api::app(state)).await?;

    Ok(())
}
