//! HTTP 服务：axum 路由、CORS 与启动
//!
//! AppState 持有已构建的 Agent 与检索库（Arc 共享，无全局单例）；任一为 None 时相应接口返回 503。

pub mod error;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::agent::AgentComponents;
use crate::config::ServerSection;
use crate::memory::{ChunkingConfig, RetrievalStore};
use crate::react::Agent;

pub use error::ServiceError;

pub struct AppState {
    pub agent: Option<Arc<Agent>>,
    pub retrieval: Option<Arc<RetrievalStore>>,
    pub chunking: ChunkingConfig,
}

impl AppState {
    pub fn new(
        agent: Option<Arc<Agent>>,
        retrieval: Option<Arc<RetrievalStore>>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            agent,
            retrieval,
            chunking,
        }
    }

    pub fn from_components(components: AgentComponents, chunking: ChunkingConfig) -> Self {
        Self::new(
            Some(Arc::new(components.agent)),
            Some(components.retrieval),
            chunking,
        )
    }
}

/// 允许的来源列表；含 "*" 时放开所有来源（此时不允许携带凭证）
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o.trim() == "*") {
        return CorsLayer::new()
            .allow_origin(AllowOrigin::any())
            .allow_methods(AllowMethods::any())
            .allow_headers(AllowHeaders::any());
    }
    let list: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o.trim()) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(list))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn router(state: Arc<AppState>, server: &ServerSection) -> Router {
    Router::new()
        .route("/search", post(routes::search))
        .route("/upload", post(routes::upload))
        .route("/health", get(routes::health))
        .route("/tools", get(routes::tools))
        .layer(DefaultBodyLimit::max(server.max_upload_mb.saturating_mul(1024 * 1024)))
        .layer(cors_layer(&server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>, server: &ServerSection) -> anyhow::Result<()> {
    let host: std::net::IpAddr = server.host.parse()?;
    let addr = SocketAddr::new(host, server.port);
    let app = router(state, server);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Study Assistant API listening");
    axum::serve(listener, app).await?;
    Ok(())
}
