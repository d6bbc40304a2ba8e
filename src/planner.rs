// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// QUERY PLANNER
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Transforma (pergunta, aprendizados anteriores) em até N queries SERP
// distintas via LLM. Falhas de chamada ou de parse caem no fallback:
// a pergunta literal do usuário como query única.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::llm::{ChatMessage, ChatParams, LlmClient};
use crate::prompts::get_planner_prompt;
use crate::types::{Learning, SerpQuery};
use crate::utils::{extract_json, normalize_query};

/// Planejador de queries SERP.
///
/// Estateless entre invocações; o estado da sessão (aprendizados) chega
/// por parâmetro a cada chamada.
pub struct QueryPlanner {
    llm_client: Arc<dyn LlmClient>,
}

impl QueryPlanner {
    /// Cria um novo planejador sobre o cliente LLM fornecido.
    pub fn new(llm_client: Arc<dyn LlmClient>) -> Self {
        Self { llm_client }
    }

    /// Gera até `num_queries` queries SERP distintas.
    ///
    /// Nunca falha: qualquer erro de LLM ou de parse degrada para a
    /// pergunta literal como query única. O slice retornado vem
    /// deduplicado por query normalizada e truncado a `num_queries`.
    pub async fn plan(
        &self,
        model_id: &str,
        user_query: &str,
        num_queries: usize,
        prior_learnings: &[Learning],
        cancel: &CancellationToken,
    ) -> Vec<SerpQuery> {
        let pair = get_planner_prompt(user_query, num_queries, prior_learnings);
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
                log::warn!("⚠️ QueryPlanner: LLM call failed ({}), using literal query", e);
                return vec![fallback_query(user_query)];
            }
        };

        let queries = parse_planned_queries(&text, num_queries);
        if queries.is_empty() {
            log::warn!("⚠️ QueryPlanner: no usable queries in LLM output, using literal query");
            return vec![fallback_query(user_query)];
        }

        log::debug!("🧭 QueryPlanner: {} queries for \"{}\"", queries.len(), user_query);
        queries
    }
}

/// Fallback determinístico: a pergunta literal do usuário.
fn fallback_query(user_query: &str) -> SerpQuery {
    SerpQuery::new(user_query, "direct answer")
}

/// Parseia a saída do LLM em queries deduplicadas e truncadas.
///
/// Tolerante a drift de chaves: aceita `researchGoal`, `research_goal`
/// ou `goal` para o objetivo.
fn parse_planned_queries(text: &str, num_queries: usize) -> Vec<SerpQuery> {
    let Some(value) = extract_json(text) else {
        return Vec::new();
    };
    let Some(items) = value.get("queries").and_then(|q| q.as_array()) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut queries = Vec::new();

    for item in items {
        let Some(query) = item.get("query").and_then(|q| q.as_str()) else {
            continue;
        };
        let query = query.trim();
        if query.is_empty() {
            continue;
        }
        if !seen.insert(normalize_query(query)) {
            continue;
        }

        let goal = item
            .get("researchGoal")
            .or_else(|| item.get("research_goal"))
            .or_else(|| item.get("goal"))
            .and_then(|g| g.as_str())
            .unwrap_or_default();

        queries.push(SerpQuery::new(query, goal));
        if queries.len() == num_queries {
            break;
        }
    }

    queries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlmClient};

    fn planner_with(response: &str) -> QueryPlanner {
        QueryPlanner::new(Arc::new(MockLlmClient::with_default(response)))
    }

    #[tokio::test]
    async fn test_plan_happy_path() {
        let planner = planner_with(
            r#"{"queries": [
                {"query": "solid state battery energy density 2025", "researchGoal": "current numbers"},
                {"query": "solid electrolyte manufacturing challenges", "researchGoal": "bottlenecks"}
            ]}"#,
        );
        let cancel = CancellationToken::new();

        let queries = planner.plan("m", "solid state batteries", 3, &[], &cancel).await;
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].research_goal, "current numbers");
    }

    #[tokio::test]
    async fn test_plan_fenced_output() {
        let planner = planner_with(
            "Sure!\n```json\n{\"queries\": [{\"query\": \"a\", \"goal\": \"g\"}]}\n```",
        );
        let cancel = CancellationToken::new();

        let queries = planner.plan("m", "topic", 3, &[], &cancel).await;
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].query, "a");
        assert_eq!(queries[0].research_goal, "g");
    }

    #[tokio::test]
    async fn test_plan_dedup_and_truncate() {
        let planner = planner_with(
            r#"{"queries": [
                {"query": "Same Query", "researchGoal": "1"},
                {"query": "same   query", "researchGoal": "2"},
                {"query": "other", "researchGoal": "3"},
                {"query": "yet another", "researchGoal": "4"}
            ]}"#,
        );
        let cancel = CancellationToken::new();

        let queries = planner.plan("m", "topic", 2, &[], &cancel).await;
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].query, "Same Query");
        assert_eq!(queries[1].query, "other");
    }

    #[tokio::test]
    async fn test_plan_malformed_falls_back() {
        let planner = planner_with("I cannot produce JSON today, sorry.");
        let cancel = CancellationToken::new();

        let queries = planner.plan("m", "who invented the transistor?", 4, &[], &cancel).await;
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].query, "who invented the transistor?");
        assert_eq!(queries[0].research_goal, "direct answer");
    }

    #[tokio::test]
    async fn test_plan_empty_array_falls_back() {
        let planner = planner_with(r#"{"queries": []}"#);
        let cancel = CancellationToken::new();

        let queries = planner.plan("m", "q", 4, &[], &cancel).await;
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].query, "q");
    }

    #[tokio::test]
    async fn test_plan_llm_error_falls_back() {
        let mock = MockLlmClient::new();
        mock.enqueue(Err(LlmError::BadResponse));
        let planner = QueryPlanner::new(Arc::new(mock));
        let cancel = CancellationToken::new();

        let queries = planner.plan("m", "q", 2, &[], &cancel).await;
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].query, "q");
    }

    #[tokio::test]
    async fn test_plan_deterministic_for_same_inputs() {
        let response = r#"{"queries": [{"query": "a", "researchGoal": "g"}]}"#;
        let cancel = CancellationToken::new();

        let first = planner_with(response).plan("m", "q", 2, &[], &cancel).await;
        let second = planner_with(response).plan("m", "q", 2, &[], &cancel).await;
        assert_eq!(first, second);
    }
}
