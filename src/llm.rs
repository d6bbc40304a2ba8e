// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CLIENTE LLM
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Trait e implementações para chat completions endereçadas por um
// identificador de modelo. A implementação HTTP fala o protocolo
// compatível com OpenAI (OpenRouter por padrão).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::LlmProviderConfig;
use crate::ratelimit::{AcquireResult, RateLimiter};

/// Máximo de retries para erros transientes.
const MAX_TRANSIENT_RETRIES: u32 = 2;

/// Máximo de retries para respostas 429 do provedor.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Erros do cliente LLM.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Erro retornado pela API (4xx que não seja 401/429).
    #[error("LLM API error: {0}")]
    ApiError(String),

    /// 401 persistente mesmo após recarregar credenciais.
    #[error("Unauthenticated")]
    Unauthenticated,

    /// Limite de requisições excedido, mesmo após retries.
    #[error("Rate limit exceeded")]
    RateLimitError,

    /// A requisição excedeu o deadline configurado.
    #[error("Request timed out")]
    TimeoutError,

    /// Resposta sem conteúdo utilizável.
    #[error("Empty or missing completion content")]
    BadResponse,

    /// Erro de rede (DNS, conexão recusada, 5xx).
    #[error("Network error: {0}")]
    NetworkError(String),

    /// A sessão foi cancelada durante a chamada.
    #[error("Cancelled")]
    Cancelled,
}

impl LlmError {
    /// Erros que valem retry interno.
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::NetworkError(_) | LlmError::TimeoutError)
    }
}

/// Mensagem de chat com papel e conteúdo.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatMessage {
    /// Papel: "system", "user" ou "assistant".
    pub role: String,
    /// Conteúdo textual da mensagem.
    pub content: String,
}

impl ChatMessage {
    /// Mensagem com papel "system".
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    /// Mensagem com papel "user".
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Formato de resposta pedido ao modelo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// Texto livre.
    #[default]
    Text,
    /// JSON — o prompt DEVE instruir o modelo a emitir JSON; o parsing
    /// continua sendo responsabilidade do caller.
    Json,
}

/// Parâmetros de uma chamada de chat completion.
#[derive(Debug, Clone)]
pub struct ChatParams {
    /// Temperatura de amostragem.
    pub temperature: f32,
    /// Máximo de tokens de saída.
    pub max_tokens: u32,
    /// Formato de resposta esperado.
    pub response_format: ResponseFormat,
}

impl Default for ChatParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 4_000,
            response_format: ResponseFormat::Text,
        }
    }
}

impl ChatParams {
    /// Parâmetros para estágios que pedem JSON estruturado.
    pub fn json() -> Self {
        Self {
            response_format: ResponseFormat::Json,
            ..Self::default()
        }
    }
}

/// Hook plugável para recarregar credenciais após um 401.
///
/// Devolve a nova chave, ou `None` quando não há credencial nova.
pub type CredentialsReloadHook = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Trait principal para clientes LLM.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Uma chamada de chat completion: mensagens ordenadas entram,
    /// um texto único sai.
    async fn chat(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        params: &ChatParams,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// IMPLEMENTAÇÃO OPENROUTER (API COMPATÍVEL COM OPENAI)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cliente para APIs de chat completions compatíveis com OpenAI.
pub struct OpenRouterClient {
    config: LlmProviderConfig,
    /// Chave corrente; trocável pelo hook de reload após 401.
    api_key: StdMutex<String>,
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    reload_hook: Option<CredentialsReloadHook>,
}

impl OpenRouterClient {
    /// Cria um novo cliente.
    ///
    /// # Argumentos
    /// * `config` - Configuração do provedor (chave, URL base, timeout).
    /// * `limiter` - Rate limiter compartilhado da sessão.
    pub fn new(config: LlmProviderConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            api_key: StdMutex::new(config.api_key.clone()),
            config,
            client: reqwest::Client::new(),
            limiter,
            reload_hook: None,
        }
    }

    /// Instala o hook de recarga de credenciais.
    pub fn with_reload_hook(mut self, hook: CredentialsReloadHook) -> Self {
        self.reload_hook = Some(hook);
        self
    }

    /// Tenta recarregar a credencial. Retorna `true` quando houve troca.
    fn reload_credentials(&self) -> bool {
        let Some(hook) = &self.reload_hook else {
            return false;
        };
        match hook() {
            Some(new_key) => {
                log::info!("🔑 LLM credentials reloaded after 401");
                *self.api_key.lock().expect("api_key lock poisoned") = new_key;
                true
            }
            None => false,
        }
    }

    /// Uma tentativa de chat completion, sem retries.
    async fn chat_once(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        params: &ChatParams,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        match self.limiter.acquire(cancel).await {
            AcquireResult::Acquired => {}
            AcquireResult::Cancelled => return Err(LlmError::Cancelled),
        }

        let mut body = serde_json::json!({
            "model": model_id,
            "messages": messages,
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
        });
        if params.response_format == ResponseFormat::Json {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }

        let api_key = self.api_key.lock().expect("api_key lock poisoned").clone();

        log::debug!("💬 LLM chat: model={} messages={}", model_id, messages.len());

        let request = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .timeout(Duration::from_millis(self.config.timeout_ms))
            .send();

        let response = tokio::select! {
            result = request => result.map_err(|e| {
                if e.is_timeout() {
                    LlmError::TimeoutError
                } else {
                    LlmError::NetworkError(e.to_string())
                }
            })?,
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
        };

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(LlmError::Unauthenticated);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            self.limiter.signal_rate_limit_error(retry_after);
            return Err(LlmError::RateLimitError);
        }
        if status.is_server_error() {
            return Err(LlmError::NetworkError(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError(format!("{}: {}", status, error_text)));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        extract_completion_text(&value).ok_or(LlmError::BadResponse)
    }
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    async fn chat(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        params: &ChatParams,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        let mut transient_retries = 0;
        let mut rate_limit_retries = 0;
        let mut reloaded = false;

        loop {
            if cancel.is_cancelled() {
                return Err(LlmError::Cancelled);
            }

            match self.chat_once(model_id, messages, params, cancel).await {
                Ok(text) => return Ok(text),
                Err(LlmError::Unauthenticated) if !reloaded => {
                    reloaded = true;
                    if !self.reload_credentials() {
                        return Err(LlmError::Unauthenticated);
                    }
                }
                Err(LlmError::RateLimitError) if rate_limit_retries < MAX_RATE_LIMIT_RETRIES => {
                    rate_limit_retries += 1;
                    log::warn!(
                        "⚠️ LLM rate limited, retry {}/{}",
                        rate_limit_retries,
                        MAX_RATE_LIMIT_RETRIES
                    );
                }
                Err(e) if e.is_transient() && transient_retries < MAX_TRANSIENT_RETRIES => {
                    transient_retries += 1;
                    log::warn!(
                        "⚠️ LLM transient error ({}), retry {}/{}",
                        e,
                        transient_retries,
                        MAX_TRANSIENT_RETRIES
                    );
                    let backoff = self.limiter.current_backoff();
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Extrai `choices[0].message.content` de uma resposta dinâmica.
pub fn extract_completion_text(value: &serde_json::Value) -> Option<String> {
    let content = value
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()?;
    if content.trim().is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// IMPLEMENTAÇÃO MOCK PARA TESTES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cliente mock para testes unitários e de integração.
///
/// Respostas resolvem nesta ordem: fila roteirizada (FIFO), depois rotas
/// por substring do conteúdo (útil quando chamadas concorrentes chegam
/// em ordem imprevisível), depois a resposta padrão. Guarda as mensagens
/// recebidas para inspeção.
#[derive(Default)]
pub struct MockLlmClient {
    scripted: StdMutex<VecDeque<Result<String, LlmError>>>,
    routes: StdMutex<Vec<(String, String)>>,
    default_response: String,
    calls: StdMutex<Vec<Vec<ChatMessage>>>,
}

impl MockLlmClient {
    /// Cria um mock que devolve uma resposta vazia padrão.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cria um mock com resposta padrão fixa.
    pub fn with_default(response: impl Into<String>) -> Self {
        Self {
            default_response: response.into(),
            ..Self::default()
        }
    }

    /// Enfileira uma resposta roteirizada.
    pub fn enqueue(&self, result: Result<String, LlmError>) {
        self.scripted
            .lock()
            .expect("scripted lock poisoned")
            .push_back(result);
    }

    /// Registra uma rota: a primeira rota cujo `needle` aparece em alguma
    /// mensagem da chamada responde por ela.
    pub fn respond_when(&self, needle: impl Into<String>, response: impl Into<String>) {
        self.routes
            .lock()
            .expect("routes lock poisoned")
            .push((needle.into(), response.into()));
    }

    /// Mensagens recebidas em cada chamada, na ordem.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }

    /// Número de chamadas feitas até agora.
    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock poisoned").len()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn chat(
        &self,
        _model_id: &str,
        messages: &[ChatMessage],
        _params: &ChatParams,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }

        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(messages.to_vec());

        let scripted = self
            .scripted
            .lock()
            .expect("scripted lock poisoned")
            .pop_front();
        if let Some(result) = scripted {
            return result;
        }

        let routed = self
            .routes
            .lock()
            .expect("routes lock poisoned")
            .iter()
            .find(|(needle, _)| messages.iter().any(|m| m.content.contains(needle)))
            .map(|(_, response)| response.clone());
        if let Some(response) = routed {
            return Ok(response);
        }

        Ok(self.default_response.clone())
    }
}
