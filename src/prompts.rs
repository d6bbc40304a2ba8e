//! # Prompts dos Estágios LLM
//!
//! Este módulo centraliza os templates de prompt dos três estágios
//! mediados por LLM. Os schemas JSON embutidos nos prompts fazem parte
//! do contrato: o QueryPlanner e o ResultProcessor parseiam exatamente
//! as chaves pedidas aqui.
//!
//! ## Prompts Disponíveis
//!
//! - `get_planner_prompt` - Gera queries SERP a partir da pergunta
//! - `get_processor_prompt` - Extrai aprendizados e follow-ups dos resultados
//! - `get_report_prompt` - Sintetiza o relatório final em Markdown

use std::fmt;

use crate::types::{Learning, Source};

/// Par de prompts (sistema + usuário) para enviar ao LLM
#[derive(Debug, Clone)]
pub struct PromptPair {
    /// Prompt de sistema que define o comportamento do LLM
    pub system: String,
    /// Prompt do usuário com a tarefa concreta
    pub user: String,
}

impl PromptPair {
    /// Cria um novo par de prompts
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    /// Retorna o total de caracteres nos prompts
    pub fn total_chars(&self) -> usize {
        self.system.len() + self.user.len()
    }
}

impl fmt::Display for PromptPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[System: {} chars, User: {} chars]",
            self.system.len(),
            self.user.len()
        )
    }
}

/// Diretiva fixa de assistente de pesquisa, compartilhada pelos estágios.
pub const RESEARCH_SYSTEM_PROMPT: &str = "You are an advanced research assistant. \
Be comprehensive and evidence-based; ground every claim in the provided material \
and cite sources where applicable. Prefer dense, information-rich statements over \
filler prose.";

// ============================================================================
// PROMPT 1: Query Planner
// ============================================================================

/// Gera o prompt de planejamento de queries SERP.
///
/// O modelo recebe a pergunta do usuário (e os aprendizados anteriores,
/// verbatim, quando existem) e deve responder com um objeto JSON:
/// `{"queries": [{"query": "...", "researchGoal": "..."}]}`.
///
/// # Arguments
/// * `user_query` - Pergunta original do usuário
/// * `num_queries` - Máximo de queries a gerar
/// * `prior_learnings` - Aprendizados acumulados na sessão
pub fn get_planner_prompt(
    user_query: &str,
    num_queries: usize,
    prior_learnings: &[Learning],
) -> PromptPair {
    let mut user = format!(
        "Given the following research topic, generate up to {num_queries} distinct web \
search queries that together cover the topic. Each query must attack a different \
aspect; avoid near-duplicates.\n\nResearch topic: {user_query}\n"
    );

    if !prior_learnings.is_empty() {
        user.push_str("\nLearnings gathered so far (use them to go deeper, not to repeat):\n");
        for learning in prior_learnings {
            user.push_str("- ");
            user.push_str(&learning.content);
            user.push('\n');
        }
    }

    user.push_str(
        "\nRespond with a JSON object of this exact shape and nothing else:\n\
{\"queries\": [{\"query\": \"<search query>\", \"researchGoal\": \"<what this query should uncover>\"}]}\n",
    );

    PromptPair::new(RESEARCH_SYSTEM_PROMPT, user)
}

// ============================================================================
// PROMPT 2: Result Processor
// ============================================================================

/// Gera o prompt de extração de aprendizados e follow-ups.
///
/// O modelo recebe o conteúdo concatenado dos resultados de uma query e
/// deve responder com um objeto JSON:
/// `{"learnings": [...], "followUpQuestions": [{"query", "goal"}]}`.
///
/// # Arguments
/// * `query` - Query SERP que originou os resultados
/// * `contents_block` - Conteúdo concatenado (já truncado pelo caller)
/// * `num_learnings` - Máximo de aprendizados
/// * `num_follow_ups` - Máximo de perguntas de follow-up
pub fn get_processor_prompt(
    query: &str,
    contents_block: &str,
    num_learnings: usize,
    num_follow_ups: usize,
) -> PromptPair {
    let user = format!(
        "The following contents were retrieved for the search query \"{query}\".\n\n\
<contents>\n{contents_block}\n</contents>\n\n\
Extract at most {num_learnings} learnings from the contents. Each learning must be a \
single, information-dense sentence with concrete entities, numbers and dates where \
present. Then propose at most {num_follow_ups} follow-up search queries that would \
deepen the research.\n\n\
Respond with a JSON object of this exact shape and nothing else:\n\
{{\"learnings\": [\"<sentence>\"], \"followUpQuestions\": [{{\"query\": \"<search query>\", \"goal\": \"<what it should uncover>\"}}]}}\n"
    );

    PromptPair::new(RESEARCH_SYSTEM_PROMPT, user)
}

// ============================================================================
// PROMPT 3: Report Writer
// ============================================================================

/// Gera o prompt do relatório final.
///
/// O modelo produz Markdown com as seções Introduction, Main Findings,
/// Analysis e Conclusion. A seção `## Sources` NÃO é pedida aqui: ela é
/// anexada mecanicamente pelo ReportWriter.
///
/// # Arguments
/// * `user_query` - Pergunta original do usuário
/// * `learnings` - Todos os aprendizados da sessão
/// * `sources` - Fontes deduplicadas da sessão
pub fn get_report_prompt(
    user_query: &str,
    learnings: &[Learning],
    sources: &[Source],
) -> PromptPair {
    let mut user = format!(
        "Write a final research report in Markdown answering the question below. \
Structure it with exactly these sections, as level-2 headings: \
Introduction, Main Findings, Analysis, Conclusion. Do NOT add a Sources section; \
it is appended separately. Only reference URLs listed under <sources>.\n\n\
Question: {user_query}\n\n<learnings>\n"
    );

    for learning in learnings {
        user.push_str("- ");
        user.push_str(&learning.content);
        user.push('\n');
    }

    user.push_str("</learnings>\n\n<sources>\n");
    for source in sources {
        user.push_str(&format!("- {} ({})\n", source.url, source.title));
    }
    user.push_str("</sources>\n");

    PromptPair::new(RESEARCH_SYSTEM_PROMPT, user)
}
