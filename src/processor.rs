// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RESULT PROCESSOR
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Extrai aprendizados e perguntas de follow-up dos resultados de uma
// query via LLM. Qualquer falha degrada para listas vazias: uma
// sub-query sem aprendizados nunca derruba a sessão.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::llm::{ChatMessage, ChatParams, LlmClient};
use crate::prompts::get_processor_prompt;
use crate::types::{Learning, SearchDoc, SerpQuery, MAX_LEARNING_LEN};
use crate::utils::{extract_json, normalize_query, truncate_chars, truncate_with_ellipsis};

/// Orçamento de caracteres por documento no bloco de conteúdo.
const DOC_CHAR_BUDGET: usize = 25_000;

/// Orçamento total de caracteres do bloco concatenado.
const CONTEXT_CHAR_BUDGET: usize = 150_000;

/// Resultado do processamento de uma query.
#[derive(Debug, Clone, Default)]
pub struct ProcessedResults {
    /// Aprendizados extraídos (até o limite pedido, deduplicados).
    pub learnings: Vec<Learning>,
    /// Follow-ups sugeridos (até o limite pedido).
    pub follow_up_questions: Vec<SerpQuery>,
}

/// Processador de resultados de busca.
pub struct ResultProcessor {
    llm_client: Arc<dyn LlmClient>,
}

impl ResultProcessor {
    /// Cria um novo processador sobre o cliente LLM fornecido.
    pub fn new(llm_client: Arc<dyn LlmClient>) -> Self {
        Self { llm_client }
    }

    /// Extrai aprendizados e follow-ups dos documentos de uma query.
    ///
    /// Sem conteúdo utilizável o LLM nem é chamado; falhas de chamada
    /// ou de parse devolvem listas vazias.
    pub async fn process(
        &self,
        model_id: &str,
        query: &str,
        docs: &[SearchDoc],
        num_learnings: usize,
        num_follow_ups: usize,
        cancel: &CancellationToken,
    ) -> ProcessedResults {
        let contents = build_contents_block(docs);
        if contents.is_empty() {
            log::debug!("📭 ResultProcessor: no content for \"{}\"", query);
            return ProcessedResults::default();
        }

        let pair = get_processor_prompt(query, &contents, num_learnings, num_follow_ups);
        let messages = vec![
            ChatMessage::system(pair.system),
            ChatMessage::user(pair.user),
        ];

        let text = match self
            .llm_client
            .chat(model_id, &messages, &ChatParams::json(), cancel)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                log::warn!("⚠️ ResultProcessor: LLM call failed for \"{}\": {}", query, e);
                return ProcessedResults::default();
            }
        };

        let results = parse_processed_results(&text, num_learnings, num_follow_ups);
        log::debug!(
            "📚 ResultProcessor: \"{}\" -> {} learnings, {} follow-ups",
            query,
            results.learnings.len(),
            results.follow_up_questions.len()
        );
        results
    }
}

/// Concatena o conteúdo dos documentos dentro dos orçamentos de contexto.
///
/// Preferência por `main_text`; snippet como fallback. Cada documento é
/// truncado individualmente antes do truncamento do bloco total.
fn build_contents_block(docs: &[SearchDoc]) -> String {
    let mut parts = Vec::new();
    for doc in docs {
        let content = if doc.main_text.trim().is_empty() {
            doc.snippet.trim()
        } else {
            doc.main_text.trim()
        };
        if content.is_empty() {
            continue;
        }
        parts.push(truncate_chars(content, DOC_CHAR_BUDGET).to_string());
    }

    let block = parts.join("\n\n---\n\n");
    truncate_chars(&block, CONTEXT_CHAR_BUDGET).to_string()
}

/// Parseia a saída do LLM em aprendizados e follow-ups saneados.
fn parse_processed_results(
    text: &str,
    num_learnings: usize,
    num_follow_ups: usize,
) -> ProcessedResults {
    let Some(value) = extract_json(text) else {
        return ProcessedResults::default();
    };

    let mut seen = HashSet::new();
    let mut learnings = Vec::new();
    if let Some(items) = value.get("learnings").and_then(|l| l.as_array()) {
        for item in items {
            let Some(content) = item.as_str() else { continue };
            let content = content.trim();
            if content.is_empty() {
                continue;
            }
            let content = truncate_with_ellipsis(content, MAX_LEARNING_LEN);
            if !seen.insert(content.to_lowercase()) {
                continue;
            }
            learnings.push(Learning::new(content));
            if learnings.len() == num_learnings {
                break;
            }
        }
    }

    let mut seen_queries = HashSet::new();
    let mut follow_ups = Vec::new();
    if let Some(items) = value.get("followUpQuestions").and_then(|f| f.as_array()) {
        for item in items {
            // Tolera tanto objetos {query, goal} quanto strings puras
            let (query, goal) = match item {
                serde_json::Value::String(s) => (s.as_str(), ""),
                _ => {
                    let Some(query) = item.get("query").and_then(|q| q.as_str()) else {
                        continue;
                    };
                    let goal = item
                        .get("goal")
                        .or_else(|| item.get("researchGoal"))
                        .and_then(|g| g.as_str())
                        .unwrap_or_default();
                    (query, goal)
                }
            };
            let query = query.trim();
            if query.is_empty() {
                continue;
            }
            if !seen_queries.insert(normalize_query(query)) {
                continue;
            }
            follow_ups.push(SerpQuery::new(query, goal));
            if follow_ups.len() == num_follow_ups {
                break;
            }
        }
    }

    ProcessedResults {
        learnings,
        follow_up_questions: follow_ups,
    }
}
