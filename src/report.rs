// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// REPORT WRITER
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Sintetiza o relatório final em Markdown a partir dos aprendizados e
// fontes da sessão. A seção `## Sources` é sempre anexada mecanicamente;
// se o LLM falhar, um relatório determinístico é gerado no lugar.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::llm::{ChatMessage, ChatParams, LlmClient};
use crate::prompts::get_report_prompt;
use crate::types::{Learning, ResearchOptions, Source};

/// Escritor do relatório final.
pub struct ReportWriter {
    llm_client: Arc<dyn LlmClient>,
    /// Parâmetros da sessão para o cabeçalho do relatório de fallback.
    session_params: Option<(u32, u32)>,
}

impl ReportWriter {
    /// Cria um novo escritor sobre o cliente LLM fornecido.
    pub fn new(llm_client: Arc<dyn LlmClient>) -> Self {
        Self {
            llm_client,
            session_params: None,
        }
    }

    /// Registra depth/breadth da sessão para o cabeçalho do fallback.
    pub fn with_session_options(mut self, options: &ResearchOptions) -> Self {
        if options.is_deep {
            self.session_params = Some((options.depth, options.breadth));
        }
        self
    }

    /// Produz o relatório final em Markdown, `## Sources` incluída.
    ///
    /// Nunca falha: se a chamada ao LLM falhar, devolve o relatório
    /// determinístico com a lista de aprendizados.
    pub async fn write(
        &self,
        model_id: &str,
        user_query: &str,
        learnings: &[Learning],
        sources: &[Source],
        cancel: &CancellationToken,
    ) -> String {
        let pair = get_report_prompt(user_query, learnings, sources);
        let messages = vec![
            ChatMessage::system(pair.system),
            ChatMessage::user(pair.user),
        ];

        let body = match self
            .llm_client
            .chat(model_id, &messages, &ChatParams::default(), cancel)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                log::warn!("⚠️ ReportWriter: LLM call failed ({}), using fallback report", e);
                self.fallback_body(user_query, learnings)
            }
        };

        let mut report = body.trim_end().to_string();
        report.push_str(&sources_section(sources));
        report
    }

    /// Relatório determinístico: título, parâmetros e aprendizados em lista.
    fn fallback_body(&self, user_query: &str, learnings: &[Learning]) -> String {
        let mut body = format!("# Research Report: {}\n", user_query);

        if let Some((depth, breadth)) = self.session_params {
            body.push_str(&format!(
                "\n## Research Parameters\n- **Query**: {}\n- **Depth**: {}\n- **Breadth**: {}\n",
                user_query, depth, breadth
            ));
        }

        body.push_str("\n## Main Findings\n");
        if learnings.is_empty() {
            body.push_str("No findings were collected during this session.\n");
        } else {
            for learning in learnings {
                body.push_str(&format!("- {}\n", learning.content));
            }
        }

        body
    }
}

/// Seção mecânica de fontes: uma bullet por URL, na ordem de descoberta.
fn sources_section(sources: &[Source]) -> String {
    let mut section = String::from("\n\n## Sources\n");
    for source in sources {
        section.push_str(&format!("- {}\n", source.url));
    }
    section
}
