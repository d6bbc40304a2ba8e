// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TIPOS COMPARTILHADOS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Modelo de dados central do motor de pesquisa: opções de sessão, queries
// SERP, documentos de busca, fontes deduplicadas e snapshot de progresso.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use serde::{Deserialize, Serialize};

/// Comprimento máximo de uma query SERP em caracteres.
pub const MAX_QUERY_LEN: usize = 512;

/// Tamanho máximo de um aprendizado em caracteres (entradas maiores são
/// truncadas com reticências pelo ResultProcessor).
pub const MAX_LEARNING_LEN: usize = 500;

/// Serviço externo padrão para favicons.
const FAVICON_SERVICE: &str = "https://www.google.com/s2/favicons";

/// Opções de uma sessão de pesquisa.
///
/// Construídas uma vez a partir do request e imutáveis durante a sessão.
/// `depth` e `breadth` só têm efeito quando `is_deep = true`.
///
/// # Exemplo
/// ```rust
/// use deep_research_engine::types::ResearchOptions;
///
/// let opts = ResearchOptions {
///     is_deep: true,
///     depth: 2,
///     breadth: 3,
///     ..ResearchOptions::default()
/// };
/// assert_eq!(opts.max_concurrency, 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchOptions {
    /// Modo profundo (expansão iterativa) ou raso (uma busca, um relatório).
    #[serde(default)]
    pub is_deep: bool,

    /// Níveis de expansão de follow-ups permitidos (1 a 5).
    #[serde(default = "default_depth")]
    pub depth: u32,

    /// Fan-out por nó: quantas queries SERP gerar em cada planejamento (1 a 5).
    #[serde(default = "default_breadth")]
    pub breadth: u32,

    /// Identificador do modelo LLM a usar na sessão.
    #[serde(default)]
    pub model_id: String,

    /// Máximo de sub-queries em voo simultâneo no mesmo nível.
    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,
}

fn default_depth() -> u32 {
    2
}

fn default_breadth() -> u32 {
    3
}

fn default_concurrency() -> usize {
    2
}

impl Default for ResearchOptions {
    fn default() -> Self {
        Self {
            is_deep: false,
            depth: default_depth(),
            breadth: default_breadth(),
            model_id: String::new(),
            max_concurrency: default_concurrency(),
        }
    }
}

/// Query SERP planejada: o texto da busca e o objetivo de pesquisa
/// que a justifica.
///
/// Produzida pelo QueryPlanner e consumida uma única vez pelo SearchClient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerpQuery {
    /// Texto da query (não vazio, até [`MAX_QUERY_LEN`] caracteres).
    pub query: String,
    /// Objetivo de pesquisa desta query.
    pub research_goal: String,
}

impl SerpQuery {
    /// Cria uma query truncando o texto ao limite de caracteres.
    pub fn new(query: impl Into<String>, research_goal: impl Into<String>) -> Self {
        let mut query: String = query.into();
        if query.chars().count() > MAX_QUERY_LEN {
            query = query.chars().take(MAX_QUERY_LEN).collect();
        }
        Self {
            query,
            research_goal: research_goal.into(),
        }
    }
}

/// Documento retornado por uma busca web.
///
/// Vive apenas dentro do processamento de uma query; o que sobrevive à
/// sessão é a [`Source`] derivada dele.
#[derive(Debug, Clone)]
pub struct SearchDoc {
    /// URL do documento (válida; docs sem URL são filtrados pelo cliente).
    pub url: String,
    /// Título da página.
    pub title: String,
    /// Snippet/descrição retornada pelo provedor.
    pub snippet: String,
    /// Texto principal extraído (markdown). Pode ser vazio.
    pub main_text: String,
    /// Posição no ranking do provedor (0 = primeiro).
    pub rank: usize,
}

/// Fonte consultada, deduplicada por URL dentro da sessão.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// URL (chave única na sessão).
    pub url: String,
    /// Título da página.
    pub title: String,
    /// Host em minúsculas, sem o prefixo `www.`.
    pub domain: String,
    /// URL de favicon via serviço externo.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    /// Relevância estimada pela posição no ranking (0.1 a 0.95).
    pub relevance: f32,
}

impl Source {
    /// Deriva uma fonte a partir de um documento de busca.
    ///
    /// Retorna `None` quando a URL do documento é inválida.
    pub fn from_doc(doc: &SearchDoc) -> Option<Self> {
        let domain = domain_from_url(&doc.url)?;
        let relevance = (0.9 - 0.05 * doc.rank as f32).clamp(0.1, 0.95);
        Some(Self {
            url: doc.url.clone(),
            title: doc.title.clone(),
            favicon: Some(format!("{}?domain={}&sz=64", FAVICON_SERVICE, domain)),
            domain,
            relevance,
        })
    }
}

/// Extrai o domínio de uma URL: host em minúsculas, sem `www.` inicial.
///
/// # Exemplo
/// ```rust
/// use deep_research_engine::types::domain_from_url;
///
/// let domain = domain_from_url("https://www.Example.COM/a?x=1");
/// assert_eq!(domain.as_deref(), Some("example.com"));
/// ```
pub fn domain_from_url(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Aprendizado extraído dos resultados de busca.
///
/// Uma sentença densa em informação, anexada à sessão e nunca mutada.
#[derive(Debug, Clone, PartialEq)]
pub struct Learning {
    /// Conteúdo do aprendizado.
    pub content: String,
}

impl Learning {
    /// Cria um aprendizado a partir de texto já validado.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Snapshot de progresso da sessão.
///
/// Emitido continuamente pelo ResearchEngine com semântica last-writer:
/// cada evento carrega uma CÓPIA, nunca uma referência compartilhada.
#[derive(Debug, Clone, Default)]
pub struct ProgressSnapshot {
    /// Porcentagem concluída (0.0 a 100.0).
    pub progress: f64,
    /// Descrição curta da etapa atual.
    pub status: String,
    /// Nível atual em modo profundo.
    pub current_depth: u32,
    /// Profundidade total da sessão.
    pub total_depth: u32,
    /// Queries planejadas no nó corrente.
    pub current_breadth: u32,
    /// Breadth configurado da sessão.
    pub total_breadth: u32,
    /// Sub-queries concluídas até agora.
    pub completed_queries: usize,
    /// Sub-queries conhecidas até agora (cresce conforme novos níveis
    /// são planejados).
    pub total_queries: usize,
    /// Query sendo buscada neste instante.
    pub current_query: Option<String>,
}

impl ProgressSnapshot {
    /// Recalcula a porcentagem a partir dos contadores.
    ///
    /// Clientes toleram o progresso estagnar ou recuar fracionalmente
    /// quando `total_queries` cresce mais rápido que `completed_queries`.
    pub fn recompute(&mut self) {
        self.progress =
            100.0 * self.completed_queries as f64 / self.total_queries.max(1) as f64;
    }
}
