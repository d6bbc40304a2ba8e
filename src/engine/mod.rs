// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RESEARCH ENGINE - ORQUESTRAÇÃO DEPTH × BREADTH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Dirige uma sessão de ponta a ponta e emite o stream de eventos.
// Dois modos:
// - Raso: uma busca, um relatório.
// - Profundo: expansão breadth-first com fronteira plana de (query, nível),
//   sub-queries do mesmo nível com paralelismo limitado.
//
// Erros por sub-query são recuperáveis (log + skip); falha do
// ReportWriter cai no relatório determinístico; cancelamento aborta
// prontamente com um único evento error{cancelled}.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

mod state;

pub use state::{EnginePhase, SessionState};

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::events::{
    event_channel, CompleteMetrics, ErrorKind, EventEmitter, EventRecord, StartOptions,
};
use crate::llm::LlmClient;
use crate::planner::QueryPlanner;
use crate::processor::ResultProcessor;
use crate::report::ReportWriter;
use crate::search::SearchClient;
use crate::types::{ResearchOptions, SerpQuery};
use crate::utils::format_search_results;

/// Erros rejeitados antes de qualquer evento `start`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Query vazia ou depth/breadth/concorrência fora dos limites.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Aborto interno da sessão.
enum Abort {
    Cancelled,
}

/// Motor de pesquisa profunda iterativa.
///
/// Possui os clientes externos via trait objects e nenhum estado entre
/// sessões; todo estado por sessão vive em [`SessionState`].
pub struct ResearchEngine {
    search_client: Arc<dyn SearchClient>,
    llm_client: Arc<dyn LlmClient>,
    config: EngineConfig,
    default_model_id: String,
}

impl ResearchEngine {
    /// Cria um novo motor sobre os clientes fornecidos.
    pub fn new(
        search_client: Arc<dyn SearchClient>,
        llm_client: Arc<dyn LlmClient>,
        config: EngineConfig,
    ) -> Self {
        Self {
            search_client,
            llm_client,
            config,
            default_model_id: String::new(),
        }
    }

    /// Modelo usado quando as opções não especificam um.
    pub fn with_default_model(mut self, model_id: impl Into<String>) -> Self {
        self.default_model_id = model_id.into();
        self
    }

    /// Valida as opções contra os tetos configurados.
    ///
    /// Rejeição acontece ANTES de qualquer evento `start`.
    fn validate(&self, query: &str, options: &ResearchOptions) -> Result<(), EngineError> {
        if query.trim().is_empty() {
            return Err(EngineError::InvalidInput("query must not be empty".into()));
        }
        if options.depth < 1 || options.depth > self.config.max_depth {
            return Err(EngineError::InvalidInput(format!(
                "depth must be in [1, {}], got {}",
                self.config.max_depth, options.depth
            )));
        }
        if options.breadth < 1 || options.breadth > self.config.max_breadth {
            return Err(EngineError::InvalidInput(format!(
                "breadth must be in [1, {}], got {}",
                self.config.max_breadth, options.breadth
            )));
        }
        if options.max_concurrency < 1 {
            return Err(EngineError::InvalidInput(
                "maxConcurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Executa uma sessão completa, emitindo eventos no `emitter`.
    ///
    /// Retorna `Err` apenas para entrada inválida (nenhum evento emitido);
    /// qualquer outro desfecho é reportado pelo próprio stream.
    pub async fn run(
        &self,
        query: &str,
        options: ResearchOptions,
        emitter: &EventEmitter,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        self.validate(query, &options)?;

        let mut options = options;
        if options.model_id.is_empty() {
            options.model_id = self.default_model_id.clone();
        }

        let started = tokio::time::Instant::now();
        let model_id = options.model_id.clone();
        let session = Arc::new(StdMutex::new(SessionState::new(options.clone())));

        lock(&session).transition(EnginePhase::Planning);
        emitter
            .emit(EventRecord::Start {
                query: query.to_string(),
                options: StartOptions::from(&options),
                timestamp: chrono::Utc::now().to_rfc3339(),
            })
            .await;

        log::info!(
            "🚀 Research session started: \"{}\" (deep={}, {}x{})",
            query,
            options.is_deep,
            options.depth,
            options.breadth
        );

        let outcome = if options.is_deep {
            self.run_deep(query, &session, emitter, cancel).await
        } else {
            self.run_shallow(query, &session, emitter, cancel).await
        };

        if let Err(Abort::Cancelled) = outcome {
            lock(&session).transition(EnginePhase::Cancelled);
            emitter
                .emit(EventRecord::Error {
                    content: "research session cancelled".into(),
                    kind: Some(ErrorKind::Cancelled),
                })
                .await;
            log::info!("🛑 Research session cancelled: \"{}\"", query);
            return Ok(());
        }

        // Relatório final (fallback interno garante um corpo determinístico)
        lock(&session).transition(EnginePhase::Writing);
        let (learnings, sources) = {
            let state = lock(&session);
            (state.learnings.clone(), state.sources.clone())
        };

        let writer = ReportWriter::new(self.llm_client.clone()).with_session_options(&options);
        let report = writer
            .write(&model_id, query, &learnings, &sources, cancel)
            .await;

        if cancel.is_cancelled() {
            lock(&session).transition(EnginePhase::Cancelled);
            emitter
                .emit(EventRecord::Error {
                    content: "research session cancelled".into(),
                    kind: Some(ErrorKind::Cancelled),
                })
                .await;
            return Ok(());
        }

        emitter.emit(EventRecord::Content { content: report }).await;
        emitter
            .emit(EventRecord::Complete {
                metrics: Some(CompleteMetrics {
                    total_time_seconds: started.elapsed().as_secs_f64(),
                    model_id: model_id.clone(),
                }),
            })
            .await;
        lock(&session).transition(EnginePhase::Done);

        log::info!(
            "✅ Research session done: \"{}\" ({} learnings, {} sources)",
            query,
            learnings.len(),
            sources.len()
        );
        Ok(())
    }

    /// Conveniência: roda a sessão numa task e devolve o receiver do stream.
    ///
    /// Entrada inválida vira um único evento `error{fatal}` no stream,
    /// sem `start` antes.
    pub fn stream(
        self: &Arc<Self>,
        query: String,
        options: ResearchOptions,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<EventRecord> {
        let (emitter, rx) = event_channel(self.config.event_buffer_size);
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.run(&query, options, &emitter, &cancel).await {
                emitter
                    .emit(EventRecord::Error {
                        content: e.to_string(),
                        kind: Some(ErrorKind::Fatal),
                    })
                    .await;
            }
        });
        rx
    }

    /// Modo raso: uma busca, um relatório.
    async fn run_shallow(
        &self,
        query: &str,
        session: &Arc<StdMutex<SessionState>>,
        emitter: &EventEmitter,
        cancel: &CancellationToken,
    ) -> Result<(), Abort> {
        let model_id = lock(session).options.model_id.clone();
        lock(session).transition(EnginePhase::Searching);
        lock(session).mark_query_visited(query);

        let docs = match self.search_client.search(query, cancel).await {
            Ok(response) => {
                emitter
                    .emit(EventRecord::SearchResults {
                        content: format_search_results(query, &response.docs),
                    })
                    .await;

                let fresh = lock(session).add_sources(response.sources);
                if !fresh.is_empty() {
                    emitter.emit(EventRecord::Sources { sources: fresh }).await;
                }
                response.docs
            }
            Err(crate::search::SearchError::Cancelled) => return Err(Abort::Cancelled),
            Err(e) => {
                log::warn!("⚠️ Shallow search failed for \"{}\": {}", query, e);
                Vec::new()
            }
        };

        if cancel.is_cancelled() {
            return Err(Abort::Cancelled);
        }

        // Extração interna de aprendizados; modo raso não emite eventos
        // `learning`
        let processor = ResultProcessor::new(self.llm_client.clone());
        let results = processor
            .process(&model_id, query, &docs, 5, 0, cancel)
            .await;
        {
            let mut state = lock(session);
            for learning in results.learnings {
                state.add_learning(learning);
            }
            state.note_planned(1);
            state.note_completed();
        }

        if cancel.is_cancelled() {
            return Err(Abort::Cancelled);
        }
        Ok(())
    }

    /// Modo profundo: expansão breadth-first por níveis.
    async fn run_deep(
        &self,
        query: &str,
        session: &Arc<StdMutex<SessionState>>,
        emitter: &EventEmitter,
        cancel: &CancellationToken,
    ) -> Result<(), Abort> {
        let options = lock(session).options.clone();
        let depth = options.depth;
        let breadth = options.breadth as usize;
        // Limites por sub-query encolhem com a profundidade da sessão
        let num_learnings = std::cmp::max(2, (5 / depth) as usize);
        let num_follow_ups = std::cmp::max(1, (3 / depth) as usize);

        let planner = Arc::new(QueryPlanner::new(self.llm_client.clone()));
        let processor = Arc::new(ResultProcessor::new(self.llm_client.clone()));

        let mut frontier: Vec<String> = vec![query.to_string()];

        for level in 1..=depth {
            if frontier.is_empty() {
                break;
            }
            if cancel.is_cancelled() {
                return Err(Abort::Cancelled);
            }

            {
                let mut state = lock(session);
                if state.phase == EnginePhase::Searching {
                    state.transition(EnginePhase::Planning);
                }
                state.progress.current_depth = level;
                state.progress.status = format!("Planning level {}/{}", level, depth);
            }
            log::debug!("🧭 Level {}/{}: {} node(s)", level, depth, frontier.len());

            let mut next_frontier = Vec::new();

            for node in std::mem::take(&mut frontier) {
                // Duplicatas da fronteira são descartadas no dequeue
                if !lock(session).mark_node_visited(&node) {
                    continue;
                }
                if cancel.is_cancelled() {
                    return Err(Abort::Cancelled);
                }

                let prior_learnings = lock(session).learnings.clone();
                let planned = planner
                    .plan(&options.model_id, &node, breadth, &prior_learnings, cancel)
                    .await;

                // Queries já buscadas na sessão saem antes da contagem
                let fresh: Vec<SerpQuery> = {
                    let mut state = lock(session);
                    let fresh: Vec<SerpQuery> = planned
                        .into_iter()
                        .filter(|sq| state.mark_query_visited(&sq.query))
                        .collect();
                    state.note_planned(fresh.len());
                    state.progress.current_breadth = fresh.len() as u32;
                    fresh
                };

                if fresh.is_empty() {
                    continue;
                }

                lock(session).transition_to_searching();

                // Sub-queries do nó com paralelismo limitado
                let semaphore = Arc::new(Semaphore::new(options.max_concurrency));
                let mut workers: JoinSet<(usize, Vec<SerpQuery>)> = JoinSet::new();

                for (index, sq) in fresh.into_iter().enumerate() {
                    let semaphore = semaphore.clone();
                    let search_client = self.search_client.clone();
                    let processor = processor.clone();
                    let session = session.clone();
                    let emitter = emitter.clone();
                    let cancel = cancel.clone();
                    let model_id = options.model_id.clone();

                    workers.spawn(async move {
                        let _permit = match semaphore.acquire().await {
                            Ok(permit) => permit,
                            Err(_) => return (index, Vec::new()),
                        };
                        let follow_ups = process_sub_query(
                            search_client,
                            processor,
                            &session,
                            &emitter,
                            &cancel,
                            &model_id,
                            &sq,
                            num_learnings,
                            num_follow_ups,
                        )
                        .await;
                        (index, follow_ups)
                    });
                }

                // Follow-ups preservam a ordem retornada pelo LLM por nó
                let mut collected: Vec<(usize, Vec<SerpQuery>)> = Vec::new();
                while let Some(joined) = workers.join_next().await {
                    match joined {
                        Ok(entry) => collected.push(entry),
                        Err(e) => log::error!("❌ Sub-query worker panicked: {}", e),
                    }
                }
                collected.sort_by_key(|(index, _)| *index);

                if level < depth {
                    for (_, follow_ups) in collected {
                        for follow_up in follow_ups {
                            next_frontier.push(follow_up.query);
                        }
                    }
                }
            }

            if cancel.is_cancelled() {
                return Err(Abort::Cancelled);
            }
            frontier = next_frontier;
        }

        Ok(())
    }
}

/// Busca e processa uma sub-query, emitindo seus eventos na ordem:
/// progress (query corrente) → sources → learnings → progress (conclusão).
///
/// Falhas são registradas e a sub-query é pulada; a sessão continua.
#[allow(clippy::too_many_arguments)]
async fn process_sub_query(
    search_client: Arc<dyn SearchClient>,
    processor: Arc<ResultProcessor>,
    session: &Arc<StdMutex<SessionState>>,
    emitter: &EventEmitter,
    cancel: &CancellationToken,
    model_id: &str,
    sq: &SerpQuery,
    num_learnings: usize,
    num_follow_ups: usize,
) -> Vec<SerpQuery> {
    if cancel.is_cancelled() {
        return Vec::new();
    }

    let snapshot = {
        let mut state = lock(session);
        state.progress.current_query = Some(sq.query.clone());
        state.progress.status = format!("Searching: {}", sq.query);
        state.progress.clone()
    };
    emitter.emit(EventRecord::from_snapshot(&snapshot)).await;

    let mut follow_ups = Vec::new();

    match search_client.search(&sq.query, cancel).await {
        Ok(response) => {
            let fresh = lock(session).add_sources(response.sources);
            if !fresh.is_empty() && !cancel.is_cancelled() {
                emitter.emit(EventRecord::Sources { sources: fresh }).await;
            }

            let results = processor
                .process(
                    model_id,
                    &sq.query,
                    &response.docs,
                    num_learnings,
                    num_follow_ups,
                    cancel,
                )
                .await;

            for learning in results.learnings {
                if cancel.is_cancelled() {
                    break;
                }
                lock(session).add_learning(learning.clone());
                emitter
                    .emit(EventRecord::Learning {
                        content: learning.content,
                    })
                    .await;
            }

            follow_ups = results.follow_up_questions;
        }
        Err(crate::search::SearchError::Cancelled) => {}
        Err(e) => {
            // Recuperável: a sub-query é pulada e a sessão continua
            log::warn!("⚠️ Sub-query \"{}\" failed, skipping: {}", sq.query, e);
        }
    }

    let snapshot = finish_sub_query(session);
    if !cancel.is_cancelled() {
        emitter.emit(EventRecord::from_snapshot(&snapshot)).await;
    }
    follow_ups
}

/// Conclui a contagem de uma sub-query e devolve o snapshot atualizado.
fn finish_sub_query(session: &Arc<StdMutex<SessionState>>) -> crate::types::ProgressSnapshot {
    let mut state = lock(session);
    state.note_completed();
    state.progress.status = "Sub-query completed".into();
    state.progress.clone()
}

/// Lock de conveniência; as seções críticas são curtas e sem await.
fn lock(session: &Arc<StdMutex<SessionState>>) -> std::sync::MutexGuard<'_, SessionState> {
    session.lock().expect("session lock poisoned")
}

impl SessionState {
    /// Entra em `Searching` apenas se ainda não está lá.
    fn transition_to_searching(&mut self) {
        if self.phase != EnginePhase::Searching {
            self.transition(EnginePhase::Searching);
        }
    }
}
