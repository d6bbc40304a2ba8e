//! # Deep Research Engine
//!
//! Motor de pesquisa profunda iterativa: recebe uma pergunta em linguagem
//! natural, expande-a numa árvore de sub-queries, busca a web para cada
//! uma, extrai aprendizados estruturados e perguntas de follow-up via LLM,
//! recursa nos follow-ups até uma profundidade limitada e sintetiza um
//! relatório final em Markdown ancorado nos aprendizados e fontes
//! coletados. O progresso é transmitido incrementalmente ao consumidor
//! como NDJSON.
//!
//! ## Arquitetura
//!
//! Componentes, das folhas para a raiz:
//!
//! 1. [`RateLimiter`](ratelimit::RateLimiter) - gate de requisições
//!    compartilhado pelos dois adaptadores externos
//! 2. [`SearchClient`](search::SearchClient) - busca web + scraping
//! 3. [`LlmClient`](llm::LlmClient) - chat completions por model id
//! 4. [`QueryPlanner`](planner::QueryPlanner) - pergunta → queries SERP
//! 5. [`ResultProcessor`](processor::ResultProcessor) - resultados →
//!    aprendizados + follow-ups
//! 6. [`ReportWriter`](report::ReportWriter) - relatório final
//! 7. [`ResearchEngine`](engine::ResearchEngine) - orquestração
//!    depth × breadth e emissão do stream de eventos
//!
//! ## Exemplo de Uso
//!
//! ```rust,ignore
//! use deep_research_engine::prelude::*;
//!
//! let engine = Arc::new(ResearchEngine::new(search_client, llm_client, config));
//! let mut rx = engine.stream("história do transistor".into(), options, cancel);
//! while let Some(event) = rx.recv().await {
//!     print!("{}", to_ndjson(&event));
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Tipos fundamentais compartilhados por todo o sistema.
///
/// Define as estruturas de dados básicas:
/// - [`types::ResearchOptions`]: Opções imutáveis da sessão
/// - [`types::SerpQuery`]: Query de busca planejada
/// - [`types::SearchDoc`] / [`types::Source`]: Resultados e fontes
/// - [`types::Learning`]: Aprendizado extraído
/// - [`types::ProgressSnapshot`]: Snapshot de progresso
pub mod types;

/// Configuração dos provedores, do rate limiter e do motor.
///
/// Registros simples com `Default` + loaders `load_*_config()` que leem
/// variáveis de ambiente e logam cada override.
pub mod config;

/// Rate limiter compartilhado (janela rolante + backoff exponencial).
pub mod ratelimit;

/// Clientes para busca web.
///
/// Define a trait `SearchClient` e implementações para:
/// - Firecrawl (search + scrape)
/// - Mock roteirizável para testes
pub mod search;

/// Clientes para Large Language Models (LLMs).
///
/// Define a trait `LlmClient` e implementações para:
/// - APIs compatíveis com OpenAI (OpenRouter por padrão)
/// - Mock roteirizável para testes
pub mod llm;

/// Templates de prompt dos estágios LLM (contrato JSON incluído).
pub mod prompts;

/// Planejamento de queries SERP a partir da pergunta e dos aprendizados.
pub mod planner;

/// Extração de aprendizados e follow-ups dos resultados de busca.
pub mod processor;

/// Síntese do relatório final em Markdown (com fallback determinístico).
pub mod report;

/// Protocolo de eventos da sessão e canal NDJSON limitado.
pub mod events;

/// Orquestração da sessão: modos raso e profundo, progresso, cancelamento.
pub mod engine;

/// Utilitários: extração tolerante de JSON e processamento de texto.
pub mod utils;

/// Servidor HTTP com streaming NDJSON.
pub mod server;

// Re-exports principais
pub use engine::{EngineError, EnginePhase, ResearchEngine};
pub use events::{to_ndjson, EventRecord};
pub use types::ResearchOptions;

/// Versão da biblioteca.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude com imports comuns para uso rápido.
///
/// ```rust,ignore
/// use deep_research_engine::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{load_config, Config, EngineConfig};
    pub use crate::engine::{EngineError, EnginePhase, ResearchEngine};
    pub use crate::events::{event_channel, to_ndjson, ErrorKind, EventRecord};
    pub use crate::llm::{ChatMessage, ChatParams, LlmClient};
    pub use crate::ratelimit::RateLimiter;
    pub use crate::search::SearchClient;
    pub use crate::types::*;
}
