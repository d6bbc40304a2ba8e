// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CONFIGURAÇÃO DOS PROVEDORES E DO MOTOR
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Configurações do provedor de busca, do provedor LLM, do rate limiter e
// do motor de pesquisa. Todas podem ser definidas via variáveis de ambiente.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuração do provedor de busca web.
#[derive(Debug, Clone)]
pub struct SearchProviderConfig {
    /// Bearer token da API de busca (obrigatório em produção).
    pub api_key: String,

    /// URL base HTTPS da API de busca.
    /// Padrão: endpoint Firecrawl.
    pub base_url: String,

    /// Deadline por requisição em milissegundos.
    /// Padrão: 45000
    pub timeout_ms: u64,

    /// Máximo de resultados pedidos por busca.
    /// Padrão: 5
    pub limit: usize,
}

impl Default for SearchProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.firecrawl.dev".to_string(),
            timeout_ms: 45_000,
            limit: 5,
        }
    }
}

/// Configuração do provedor LLM (API compatível com chat completions).
#[derive(Debug, Clone)]
pub struct LlmProviderConfig {
    /// Bearer token da API LLM (obrigatório em produção).
    pub api_key: String,

    /// URL base HTTPS da API LLM.
    /// Padrão: OpenRouter.
    pub base_url: String,

    /// Deadline por requisição em milissegundos.
    /// Padrão: 60000
    pub timeout_ms: u64,

    /// Modelo usado quando o caller não especifica um.
    /// Padrão: "openai/o3-mini"
    pub default_model: String,
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            timeout_ms: 60_000,
            default_model: "openai/o3-mini".to_string(),
        }
    }
}

/// Parâmetros do rate limiter compartilhado pelos dois provedores.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Máximo de aquisições por janela rolante de 60 segundos.
    /// Padrão: 5
    pub rpm: u32,

    /// Backoff inicial após sinal de rate limit, em milissegundos.
    /// Padrão: 1000
    pub initial_backoff_ms: u64,

    /// Teto do backoff exponencial em milissegundos.
    /// Padrão: 60000
    pub max_backoff_ms: u64,

    /// Fator multiplicativo do backoff a cada sinal consecutivo.
    /// Padrão: 2.0
    pub multiplier: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rpm: 5,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            multiplier: 2.0,
        }
    }
}

/// Limites operacionais do motor de pesquisa.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sub-queries paralelas em voo no mesmo nível.
    /// Padrão: 2
    pub max_concurrency: usize,

    /// Teto de segurança para o `depth` pedido pelo caller.
    /// Padrão: 5
    pub max_depth: u32,

    /// Teto de segurança para o `breadth` pedido pelo caller.
    /// Padrão: 5
    pub max_breadth: u32,

    /// Capacidade do buffer do stream de eventos (backpressure além disso).
    /// Padrão: 64
    pub event_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 2,
            max_depth: 5,
            max_breadth: 5,
            event_buffer_size: 64,
        }
    }
}

/// Configuração completa, injetada nos construtores dos componentes.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Provedor de busca.
    pub search: SearchProviderConfig,
    /// Provedor LLM.
    pub llm: LlmProviderConfig,
    /// Rate limiter.
    pub rate_limit: RateLimitConfig,
    /// Motor.
    pub engine: EngineConfig,
}

/// Carrega a configuração do provedor de busca a partir do ambiente.
///
/// Variáveis suportadas:
/// - `SEARCH_API_KEY`: bearer token (obrigatório em produção)
/// - `SEARCH_BASE_URL`: URL base da API - padrão: Firecrawl
/// - `SEARCH_TIMEOUT_MS`: deadline por requisição - padrão: 45000
/// - `SEARCH_LIMIT`: resultados por busca - padrão: 5
pub fn load_search_config() -> SearchProviderConfig {
    let mut config = SearchProviderConfig::default();

    if let Ok(key) = std::env::var("SEARCH_API_KEY") {
        let key = key.trim().to_string();
        if !key.is_empty() {
            config.api_key = key;
            log::info!("📦 SEARCH_API_KEY=***");
        }
    }

    if let Ok(url) = std::env::var("SEARCH_BASE_URL") {
        let url = url.trim().to_string();
        if !url.is_empty() {
            config.base_url = url.clone();
            log::info!("📦 SEARCH_BASE_URL={}", url);
        }
    }

    if let Ok(timeout_str) = std::env::var("SEARCH_TIMEOUT_MS") {
        if let Ok(timeout) = timeout_str.parse::<u64>() {
            if timeout > 0 {
                config.timeout_ms = timeout;
                log::info!("📦 SEARCH_TIMEOUT_MS={}", timeout);
            }
        }
    }

    if let Ok(limit_str) = std::env::var("SEARCH_LIMIT") {
        if let Ok(limit) = limit_str.parse::<usize>() {
            if limit > 0 {
                config.limit = limit;
                log::info!("📦 SEARCH_LIMIT={}", limit);
            }
        }
    }

    config
}

/// Carrega a configuração do provedor LLM a partir do ambiente.
///
/// Variáveis suportadas:
/// - `LLM_API_KEY`: bearer token (obrigatório em produção)
/// - `LLM_BASE_URL`: URL base da API - padrão: OpenRouter
/// - `LLM_TIMEOUT_MS`: deadline por requisição - padrão: 60000
/// - `LLM_MODEL`: modelo padrão - padrão: "openai/o3-mini"
pub fn load_llm_config() -> LlmProviderConfig {
    let mut config = LlmProviderConfig::default();

    if let Ok(key) = std::env::var("LLM_API_KEY") {
        let key = key.trim().to_string();
        if !key.is_empty() {
            config.api_key = key;
            log::info!("📦 LLM_API_KEY=***");
        }
    }

    if let Ok(url) = std::env::var("LLM_BASE_URL") {
        let url = url.trim().to_string();
        if !url.is_empty() {
            config.base_url = url.clone();
            log::info!("📦 LLM_BASE_URL={}", url);
        }
    }

    if let Ok(timeout_str) = std::env::var("LLM_TIMEOUT_MS") {
        if let Ok(timeout) = timeout_str.parse::<u64>() {
            if timeout > 0 {
                config.timeout_ms = timeout;
                log::info!("📦 LLM_TIMEOUT_MS={}", timeout);
            }
        }
    }

    if let Ok(model) = std::env::var("LLM_MODEL") {
        let model = model.trim().to_string();
        if !model.is_empty() {
            config.default_model = model;
            log::info!("📦 LLM_MODEL={}", config.default_model);
        }
    }

    config
}

/// Carrega os parâmetros do rate limiter a partir do ambiente.
///
/// Variáveis suportadas:
/// - `RATE_LIMIT_RPM`: aquisições por janela de 60 s - padrão: 5
/// - `RATE_LIMIT_INITIAL_BACKOFF_MS`: backoff inicial - padrão: 1000
/// - `RATE_LIMIT_MAX_BACKOFF_MS`: teto do backoff - padrão: 60000
/// - `RATE_LIMIT_MULTIPLIER`: fator do backoff - padrão: 2.0
pub fn load_rate_limit_config() -> RateLimitConfig {
    let mut config = RateLimitConfig::default();

    if let Ok(rpm_str) = std::env::var("RATE_LIMIT_RPM") {
        if let Ok(rpm) = rpm_str.parse::<u32>() {
            if rpm > 0 {
                config.rpm = rpm;
                log::info!("📦 RATE_LIMIT_RPM={}", rpm);
            }
        }
    }

    if let Ok(ms_str) = std::env::var("RATE_LIMIT_INITIAL_BACKOFF_MS") {
        if let Ok(ms) = ms_str.parse::<u64>() {
            if ms > 0 {
                config.initial_backoff_ms = ms;
                log::info!("📦 RATE_LIMIT_INITIAL_BACKOFF_MS={}", ms);
            }
        }
    }

    if let Ok(ms_str) = std::env::var("RATE_LIMIT_MAX_BACKOFF_MS") {
        if let Ok(ms) = ms_str.parse::<u64>() {
            if ms > 0 {
                config.max_backoff_ms = ms;
                log::info!("📦 RATE_LIMIT_MAX_BACKOFF_MS={}", ms);
            }
        }
    }

    if let Ok(mult_str) = std::env::var("RATE_LIMIT_MULTIPLIER") {
        if let Ok(mult) = mult_str.parse::<f64>() {
            if mult >= 1.0 {
                config.multiplier = mult;
                log::info!("📦 RATE_LIMIT_MULTIPLIER={}", mult);
            }
        }
    }

    config
}

/// Carrega os limites do motor a partir do ambiente.
///
/// Variáveis suportadas:
/// - `ENGINE_MAX_CONCURRENCY`: sub-queries paralelas - padrão: 2
/// - `ENGINE_MAX_DEPTH`: teto do depth - padrão: 5
/// - `ENGINE_MAX_BREADTH`: teto do breadth - padrão: 5
/// - `ENGINE_EVENT_BUFFER`: capacidade do buffer de eventos - padrão: 64
pub fn load_engine_config() -> EngineConfig {
    let mut config = EngineConfig::default();

    if let Ok(max_str) = std::env::var("ENGINE_MAX_CONCURRENCY") {
        if let Ok(max) = max_str.parse::<usize>() {
            if max > 0 {
                config.max_concurrency = max;
                log::info!("📦 ENGINE_MAX_CONCURRENCY={}", max);
            }
        }
    }

    if let Ok(max_str) = std::env::var("ENGINE_MAX_DEPTH") {
        if let Ok(max) = max_str.parse::<u32>() {
            if max > 0 {
                config.max_depth = max;
                log::info!("📦 ENGINE_MAX_DEPTH={}", max);
            }
        }
    }

    if let Ok(max_str) = std::env::var("ENGINE_MAX_BREADTH") {
        if let Ok(max) = max_str.parse::<u32>() {
            if max > 0 {
                config.max_breadth = max;
                log::info!("📦 ENGINE_MAX_BREADTH={}", max);
            }
        }
    }

    if let Ok(size_str) = std::env::var("ENGINE_EVENT_BUFFER") {
        if let Ok(size) = size_str.parse::<usize>() {
            if size > 0 {
                config.event_buffer_size = size;
                log::info!("📦 ENGINE_EVENT_BUFFER={}", size);
            }
        }
    }

    config
}

/// Carrega a configuração completa a partir do ambiente.
pub fn load_config() -> Config {
    Config {
        search: load_search_config(),
        llm: load_llm_config(),
        rate_limit: load_rate_limit_config(),
        engine: load_engine_config(),
    }
}
