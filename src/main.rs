mod auth;
mod config;
mod db;
mod error;
mod filter;
mod http_api;
mod models;
mod pagination;
mod schema;
mod services;

use std::sync::Arc;

use config::{Config, StoreBackend};
use db::{MemoryStore, MySqlStore};
use http_api::AppState;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 古いログファイルを削除
fn cleanup_old_logs(log_dir: &str, max_age_days: u64) {
    let log_path = std::path::Path::new(log_dir);
    if !log_path.exists() {
        return;
    }

    let max_age = std::time::Duration::from_secs(max_age_days * 24 * 60 * 60);
    let now = std::time::SystemTime::now();

    if let Ok(entries) = std::fs::read_dir(log_path) {
        for entry in entries.flatten() {
            let expired = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age > max_age);
            if expired {
                let _ = std::fs::remove_file(entry.path());
            }
        }
    }
}

/// 定期的にログをクリーンアップするバックグラウンドタスク
fn spawn_log_cleanup_task(log_dir: String, max_age_days: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(24 * 60 * 60)); // 24時間ごと
        loop {
            interval.tick().await;
            cleanup_old_logs(&log_dir, max_age_days);
            tracing::debug!("Log cleanup completed");
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 設定読み込み
    let config = Config::from_env()?;

    // 起動時に古いログを削除 + 定期クリーンアップ開始
    cleanup_old_logs(&config.log_dir, config.log_retention_days);
    spawn_log_cleanup_task(config.log_dir.clone(), config.log_retention_days);

    // ロギング初期化（コンソール + ファイル）
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &config.log_dir, "driver-api.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_ansi(true),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ストア初期化
    let state = match config.store_backend {
        StoreBackend::MySql => {
            info!("Connecting to database...");
            let store = MySqlStore::connect(&config.database_url).await?;
            info!("Database connected successfully");
            AppState::with_store(Arc::new(store))
        }
        StoreBackend::Memory => {
            info!("Using in-memory store; data is lost on restart");
            AppState::with_store(Arc::new(MemoryStore::new()))
        }
    };

    let router = http_api::create_router(state);

    if let Err(e) = start_http_server(
        config.http_port,
        router,
        config.tls_cert_path.clone(),
        config.tls_key_path.clone(),
    )
    .await
    {
        tracing::error!("HTTP server error: {}", e);
        return Err(e);
    }

    Ok(())
}

/// Start the API server, over HTTPS when both TLS paths are set
async fn start_http_server(
    port: u16,
    router: axum::Router,
    tls_cert_path: Option<String>,
    tls_key_path: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    match (tls_cert_path, tls_key_path) {
        (Some(cert_path), Some(key_path)) => {
            info!("HTTP API server listening on {} (HTTPS)", addr);
            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(&cert_path, &key_path)
                .await
                .map_err(|e| format!("Failed to load TLS config: {}", e))?;

            axum_server::bind_rustls(addr, tls_config)
                .serve(router.into_make_service())
                .await?;
        }
        _ => {
            info!("HTTP API server listening on {}", addr);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, router).await?;
        }
    }

    Ok(())
}
