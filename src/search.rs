// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CLIENTE DE BUSCA
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Trait e implementações para busca web com scraping de conteúdo.
// A implementação HTTP fala o protocolo do Firecrawl (search + scrape).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::SearchProviderConfig;
use crate::ratelimit::{AcquireResult, RateLimiter};
use crate::types::{SearchDoc, Source};
use crate::utils::normalize_query;

/// Máximo de retries para erros transientes (rede, timeout, 5xx).
const MAX_TRANSIENT_RETRIES: u32 = 2;

/// Máximo de retries para respostas 429 do provedor.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Erros que podem ocorrer em operações de busca.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Erro retornado pela API de busca (4xx que não seja 429).
    ///
    /// Exemplos: API key inválida, query malformada.
    #[error("Search API error: {0}")]
    ApiError(String),

    /// Limite de requisições excedido no provedor, mesmo após retries.
    #[error("Rate limit exceeded")]
    RateLimitError,

    /// Erro de rede (DNS, conexão recusada, 5xx).
    #[error("Network error: {0}")]
    NetworkError(String),

    /// A requisição excedeu o deadline configurado.
    #[error("Request timed out")]
    TimeoutError,

    /// Erro ao interpretar a resposta do provedor.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A sessão foi cancelada durante a chamada.
    #[error("Cancelled")]
    Cancelled,
}

impl SearchError {
    /// Erros que valem retry interno antes de desistir da sub-query.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SearchError::NetworkError(_) | SearchError::TimeoutError | SearchError::ParseError(_)
        )
    }
}

/// Resultado de uma busca: documentos em ordem de ranking e as fontes
/// derivadas deles.
///
/// Zero documentos NÃO é erro; a resposta simplesmente vem vazia.
#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    /// Documentos na ordem do provedor.
    pub docs: Vec<SearchDoc>,
    /// Fontes derivadas (uma por documento com URL válida).
    pub sources: Vec<Source>,
}

impl SearchResponse {
    /// Monta a resposta a partir dos documentos, derivando as fontes.
    pub fn from_docs(docs: Vec<SearchDoc>) -> Self {
        let sources = docs.iter().filter_map(Source::from_doc).collect();
        Self { docs, sources }
    }
}

/// Trait principal para clientes de busca.
///
/// Qualquer provedor de busca web implementa esta interface; o motor
/// só conhece a trait.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Executa uma busca web para a query fornecida.
    async fn search(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse, SearchError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// IMPLEMENTAÇÃO FIRECRAWL
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cliente para a API de busca Firecrawl (search + scrape numa chamada).
pub struct FirecrawlClient {
    /// Configuração do provedor.
    config: SearchProviderConfig,
    /// Cliente HTTP.
    client: reqwest::Client,
    /// Gate de requisições compartilhado com o cliente LLM.
    limiter: Arc<RateLimiter>,
}

impl FirecrawlClient {
    /// Cria um novo cliente Firecrawl.
    ///
    /// # Argumentos
    /// * `config` - Configuração do provedor (chave, URL base, timeout).
    /// * `limiter` - Rate limiter compartilhado da sessão.
    pub fn new(config: SearchProviderConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            limiter,
        }
    }

    /// Uma tentativa de busca, sem retries.
    async fn search_once(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse, SearchError> {
        match self.limiter.acquire(cancel).await {
            AcquireResult::Acquired => {}
            AcquireResult::Cancelled => return Err(SearchError::Cancelled),
        }

        let body = serde_json::json!({
            "query": query,
            "limit": self.config.limit,
            "country": "us",
            "lang": "en",
            "scrapeOptions": {
                "formats": ["markdown", "links"],
                "onlyMainContent": true,
            },
            "timeout": self.config.timeout_ms,
        });

        log::debug!("🔍 Firecrawl search: {}", query);

        let request = self
            .client
            .post(format!("{}/v1/search", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&body)
            .timeout(Duration::from_millis(self.config.timeout_ms))
            .send();

        let response = tokio::select! {
            result = request => result.map_err(|e| {
                if e.is_timeout() {
                    SearchError::TimeoutError
                } else {
                    SearchError::NetworkError(e.to_string())
                }
            })?,
            _ = cancel.cancelled() => return Err(SearchError::Cancelled),
        };

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            self.limiter.signal_rate_limit_error(retry_after);
            return Err(SearchError::RateLimitError);
        }
        if status.is_server_error() {
            return Err(SearchError::NetworkError(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SearchError::ApiError(format!("{}: {}", status, error_text)));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SearchError::ParseError(e.to_string()))?;

        let docs = parse_search_payload(&value);
        log::info!("✅ Search \"{}\": {} docs", query, docs.len());

        Ok(SearchResponse::from_docs(docs))
    }
}

#[async_trait]
impl SearchClient for FirecrawlClient {
    async fn search(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse, SearchError> {
        let mut transient_retries = 0;
        let mut rate_limit_retries = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(SearchError::Cancelled);
            }

            match self.search_once(query, cancel).await {
                Ok(response) => return Ok(response),
                Err(SearchError::RateLimitError) if rate_limit_retries < MAX_RATE_LIMIT_RETRIES => {
                    rate_limit_retries += 1;
                    log::warn!(
                        "⚠️ Search rate limited, retry {}/{}",
                        rate_limit_retries,
                        MAX_RATE_LIMIT_RETRIES
                    );
                    // O acquire da próxima tentativa respeita o backoff
                    // já elevado pelo signal_rate_limit_error
                }
                Err(e) if e.is_transient() && transient_retries < MAX_TRANSIENT_RETRIES => {
                    transient_retries += 1;
                    log::warn!(
                        "⚠️ Search transient error ({}), retry {}/{}",
                        e,
                        transient_retries,
                        MAX_TRANSIENT_RETRIES
                    );
                    let backoff = self.limiter.current_backoff();
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = cancel.cancelled() => return Err(SearchError::Cancelled),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Projeta a resposta dinâmica do provedor em documentos tipados.
///
/// Tolerante a drift de schema: aceita `description` ou `snippet`,
/// `markdown` opcional, e descarta entradas sem URL válida preservando
/// a ordem do provedor.
pub fn parse_search_payload(value: &serde_json::Value) -> Vec<SearchDoc> {
    let Some(data) = value.get("data").and_then(|d| d.as_array()) else {
        return Vec::new();
    };

    let mut docs = Vec::new();
    for item in data {
        let url = item
            .get("url")
            .and_then(|u| u.as_str())
            .unwrap_or_default()
            .trim();
        if url.is_empty() || url::Url::parse(url).is_err() {
            continue;
        }

        let title = item
            .get("title")
            .and_then(|t| t.as_str())
            .unwrap_or_default();
        let snippet = item
            .get("description")
            .or_else(|| item.get("snippet"))
            .and_then(|s| s.as_str())
            .unwrap_or_default();
        let main_text = item
            .get("markdown")
            .and_then(|m| m.as_str())
            .unwrap_or_default();

        docs.push(SearchDoc {
            url: url.to_string(),
            title: title.to_string(),
            snippet: snippet.to_string(),
            main_text: main_text.to_string(),
            rank: docs.len(),
        });
    }

    docs
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// IMPLEMENTAÇÃO MOCK PARA TESTES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cliente mock para testes unitários e de integração.
///
/// Respostas podem ser roteirizadas por query (fila FIFO por query
/// normalizada); queries sem roteiro recebem a resposta padrão.
#[derive(Default)]
pub struct MockSearchClient {
    scripted: StdMutex<HashMap<String, VecDeque<Result<SearchResponse, SearchError>>>>,
    default_response: Option<SearchResponse>,
    calls: StdMutex<Vec<String>>,
}

impl MockSearchClient {
    /// Cria um mock que devolve respostas vazias.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cria um mock com uma resposta padrão para qualquer query.
    pub fn with_default(response: SearchResponse) -> Self {
        Self {
            default_response: Some(response),
            ..Self::default()
        }
    }

    /// Enfileira uma resposta roteirizada para uma query específica.
    pub fn enqueue(&self, query: &str, result: Result<SearchResponse, SearchError>) {
        self.scripted
            .lock()
            .expect("scripted lock poisoned")
            .entry(normalize_query(query))
            .or_default()
            .push_back(result);
    }

    /// Queries efetivamente buscadas, em ordem de chegada.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }
}

#[async_trait]
impl SearchClient for MockSearchClient {
    async fn search(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse, SearchError> {
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(query.to_string());

        let scripted = self
            .scripted
            .lock()
            .expect("scripted lock poisoned")
            .get_mut(&normalize_query(query))
            .and_then(|queue| queue.pop_front());

        match scripted {
            Some(result) => result,
            None => Ok(self.default_response.clone().unwrap_or_default()),
        }
    }
}

/// Constrói um documento de busca para testes.
pub fn mock_doc(url: &str, title: &str, snippet: &str, rank: usize) -> SearchDoc {
    SearchDoc {
        url: url.to_string(),
        title: title.to_string(),
        snippet: snippet.to_string(),
        main_text: format!("{} — full extracted text.", snippet),
        rank,
    }
}
