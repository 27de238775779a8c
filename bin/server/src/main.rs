use axum::routing::post;
use relaybot_ai::Providers;
use relaybot_dispatch::Router;
use relaybot_server::{
    config::ServerConfig,
    db::SqliteSessionStore,
    queue::EventQueue,
    telegram::{self, TelegramTransport, WebhookState},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,relaybot=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!(
        provider = ?config.provider.kind,
        models = ?config.provider.chat_models,
        open_access = config.bot.allowed_users.is_universal(),
        "Loaded configuration"
    );

    // Open the session database and run migrations
    let store = SqliteSessionStore::connect(&config.database_url)
        .await
        .expect("failed to open session database");

    let providers = Providers::from_settings(&config.provider);
    let transport = Arc::new(TelegramTransport::new(
        reqwest::Client::new(),
        &config.telegram.api_url,
        &config.telegram.token,
    ));
    let router = Router::new(
        config.router_config(),
        Arc::new(store),
        providers,
        config.bot.allowed_users.clone(),
        transport,
    );

    let queue = EventQueue::new(Arc::new(router));
    let state = Arc::new(WebhookState::new(
        queue.clone(),
        config.telegram.webhook_secret.clone(),
    ));
    if config.telegram.webhook_secret.is_none() {
        tracing::warn!("no webhook secret configured, accepting unauthenticated updates");
    }

    let app = axum::Router::new()
        .route("/webhook", post(telegram::receive))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // Updates accepted before the signal are still answered.
    queue.shutdown().await;
    tracing::info!("conversation workers drained");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
