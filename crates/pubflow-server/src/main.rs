mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use pubflow_pipeline::{spawn_workers, BudgetGate, Notifier, StageContext};
use pubflow_reddit::TokenBucket;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(pubflow_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = pubflow_db::PoolConfig::from_app_config(&config);
    let pool = pubflow_db::connect_pool(&config.database_url, pool_config).await?;
    pubflow_db::run_migrations(&pool).await?;

    let notifier = Notifier::new(
        config.notify_webhook_url.clone(),
        config.http_request_timeout_secs,
    )?;
    let enrich = pubflow_enrich::EnrichClient::new(
        &config.enrich_base_url,
        &config.enrich_api_key,
        config.http_request_timeout_secs,
    )?;
    let ghost = pubflow_ghost::GhostClient::new(
        &config.ghost_base_url,
        &config.ghost_admin_key,
        config.http_request_timeout_secs,
    )?;

    let context = Arc::new(StageContext {
        config: Arc::clone(&config),
        pool: pool.clone(),
        bucket: TokenBucket::new(config.bucket_capacity, config.bucket_refill_per_sec),
        gate: BudgetGate::new(
            pool.clone(),
            config.calls_per_day,
            config.tokens_per_day,
            notifier.clone(),
        ),
        enrich,
        ghost: ghost.clone(),
        notifier: notifier.clone(),
        reddit_auth_base_url: pubflow_reddit::DEFAULT_AUTH_BASE_URL.to_string(),
        reddit_api_base_url: pubflow_reddit::DEFAULT_API_BASE_URL.to_string(),
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = spawn_workers(Arc::clone(&context), shutdown_rx);

    let ghost = Arc::new(ghost);
    let _scheduler =
        scheduler::build_scheduler(pool.clone(), Arc::clone(&config), Arc::clone(&ghost)).await?;

    let auth = AuthState::new(&config);
    let app = build_app(
        AppState {
            pool,
            ghost,
            notifier,
            config: Arc::clone(&config),
        },
        auth,
        default_rate_limit_state(),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The HTTP surface is down; stop the stage workers before exiting so
    // in-flight tasks finish cleanly rather than being left active.
    shutdown_tx.send(true).ok();
    for worker in workers {
        worker.await?;
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
