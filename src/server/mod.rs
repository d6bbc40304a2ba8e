// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP SERVER - Streaming NDJSON da sessão de pesquisa
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//!
//! Superfície HTTP mínima sobre o motor de pesquisa.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `POST /api/research` - Sessão de pesquisa com resposta
//!   `application/x-ndjson` (um evento JSON por linha)
//!
//! ## Uso
//!
//! ```bash
//! deep-research-engine --server --port 3000
//! curl -N -X POST localhost:3000/api/research \
//!     -H 'Content-Type: application/json' \
//!     -d '{"query": "história do transistor", "isDeep": true, "depth": 2, "breadth": 3}'
//! ```

#[allow(missing_docs)]
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::engine::ResearchEngine;

/// Estado compartilhado entre os handlers.
pub struct AppState {
    /// Motor de pesquisa da aplicação.
    pub engine: Arc<ResearchEngine>,
}

/// Inicia o servidor HTTP no endereço especificado.
///
/// Entry point chamado de main.rs quando `--server` é passado.
pub async fn start_server(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    use axum::routing::{get, post};
    use axum::Router;
    use tower_http::cors::CorsLayer;

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/research", post(handlers::research))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("🌐 Research server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
