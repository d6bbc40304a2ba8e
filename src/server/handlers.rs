// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HANDLERS HTTP
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Json, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::AppState;
use crate::events::to_ndjson;
use crate::types::ResearchOptions;

/// Corpo do request de pesquisa: a pergunta mais as opções da sessão.
#[derive(Debug, Deserialize)]
pub struct ResearchRequest {
    /// Pergunta em linguagem natural.
    pub query: String,
    /// Opções da sessão (isDeep, depth, breadth, modelId, maxConcurrency).
    #[serde(flatten)]
    pub options: ResearchOptions,
}

/// `GET /health`
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
    }))
}

/// `POST /api/research`
///
/// Responde com `application/x-ndjson`: um [`EventRecord`] por linha,
/// na ordem de emissão do motor. A desconexão do cliente cancela a
/// sessão cooperativamente via drop guard do token.
///
/// [`EventRecord`]: crate::events::EventRecord
pub async fn research(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResearchRequest>,
) -> Response {
    let session_id = Uuid::new_v4();
    log::info!(
        "📥 Research request {}: \"{}\" (deep={})",
        session_id,
        request.query,
        request.options.is_deep
    );

    let cancel = CancellationToken::new();
    let rx = state
        .engine
        .stream(request.query, request.options, cancel.clone());

    // O guard cancela a sessão quando o stream de resposta é dropado
    // (cliente desconectou antes do `complete`)
    let mut guard = Some(cancel.drop_guard());
    let body_stream = ReceiverStream::new(rx).map(move |event| {
        if matches!(event, crate::events::EventRecord::Complete { .. }) {
            // Sessão terminou normalmente: desarma o guard
            if let Some(guard) = guard.take() {
                guard.disarm();
            }
        }
        Ok::<_, std::convert::Infallible>(to_ndjson(&event))
    });

    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(body_stream),
    )
        .into_response()
}
