use liquidity_pool_engine::config::Config;
use liquidity_pool_engine::engine::LiquidityPoolEngine;
use liquidity_pool_engine::http;
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() {
    init_logging();

    let config_path = std::env::var("LIQUIDITY_POOL_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.yaml"));

    let config = Config::load(&config_path).unwrap_or_else(|err| {
        panic!("failed to load config from {}: {err}", config_path.display());
    });

    let addr = format!("{}:{}", config.app.host, config.app.port);
    let debug = config.app.debug;

    let engine = LiquidityPoolEngine::new(config);
    let router = http::router(engine);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|err| panic!("failed to bind {addr}: {err}"));

    info!(%addr, debug, "liquidity pool engine listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    info!("shutdown signal received");
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(cfg!(debug_assertions))
        .json()
        .init()
}
