//! 主应用程序入口
//!
//! 装配实时中枢、命令路由器与各个协作者适配器，启动 Axum 服务。

use std::sync::Arc;

use application::{EventRouter, RealtimeHub};
use config::AppConfig;
use infrastructure::{create_pg_pool, JwtAuthenticator, PgChatDirectory, PgMessageStore};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env();
    config.validate()?;

    tracing::info!(
        "连接数据库: {}",
        config.database.url.split('@').next_back().unwrap_or("unknown")
    );
    let pg_pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;

    // 运行迁移
    sqlx::migrate!("../../migrations").run(&pg_pool).await?;

    // 协作者适配器
    let authenticator = Arc::new(JwtAuthenticator::new(config.jwt.clone()));
    let directory = Arc::new(PgChatDirectory::new(pg_pool.clone()));
    let store = Arc::new(PgMessageStore::new(pg_pool));

    // 实时核心
    let hub = Arc::new(RealtimeHub::new(&config.realtime));
    let event_router = Arc::new(EventRouter::new(
        hub.clone(),
        directory.clone(),
        store,
        config.realtime.collaborator_timeout(),
    ));

    let state = AppState::new(
        hub,
        event_router,
        authenticator,
        directory,
        config.realtime.clone(),
    );

    // 启动 Web 服务器
    let app = router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("聊天服务器启动在 http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
