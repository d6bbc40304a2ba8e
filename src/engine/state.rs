// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ESTADO DA SESSÃO DE PESQUISA
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::collections::HashSet;

use crate::types::{Learning, ProgressSnapshot, ResearchOptions, Source};
use crate::utils::normalize_query;

/// Fase da sessão - transições explícitas
///
/// A máquina de estados garante que a sessão só pode estar em uma fase
/// válida; `can_transition_to` documenta o grafo completo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    /// Sessão criada, `run` ainda não chamado.
    Idle,
    /// Emitiu `start`; planejando queries do nível corrente.
    Planning,
    /// Sub-queries do nível em busca/processamento concorrente.
    Searching,
    /// Chamando o ReportWriter.
    Writing,
    /// Terminal: `complete` emitido.
    Done,
    /// Terminal: erro fatal durante a orquestração.
    Failed,
    /// Terminal: sessão cancelada pelo consumidor.
    Cancelled,
}

impl EnginePhase {
    /// Verifica se a fase é terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EnginePhase::Done | EnginePhase::Failed | EnginePhase::Cancelled
        )
    }

    /// Verifica se uma transição é válida.
    pub fn can_transition_to(&self, target: &EnginePhase) -> bool {
        matches!(
            (self, target),
            (EnginePhase::Idle, EnginePhase::Planning)
                | (EnginePhase::Planning, EnginePhase::Searching)
                | (EnginePhase::Planning, EnginePhase::Writing)
                | (EnginePhase::Planning, EnginePhase::Failed)
                | (EnginePhase::Planning, EnginePhase::Cancelled)
                | (EnginePhase::Searching, EnginePhase::Planning)
                | (EnginePhase::Searching, EnginePhase::Writing)
                | (EnginePhase::Searching, EnginePhase::Cancelled)
                | (EnginePhase::Searching, EnginePhase::Failed)
                | (EnginePhase::Writing, EnginePhase::Done)
                | (EnginePhase::Writing, EnginePhase::Failed)
                | (EnginePhase::Writing, EnginePhase::Cancelled)
        )
    }
}

/// Estado privado do ResearchEngine durante uma sessão.
///
/// Mutado por múltiplos workers sob um mutex; todos os acessos são
/// seções críticas curtas, sem awaits segurando o lock. Fontes e
/// aprendizados são append-only; eventos carregam cópias.
#[derive(Debug)]
pub struct SessionState {
    /// Opções imutáveis da sessão.
    pub options: ResearchOptions,
    /// Fase corrente da máquina de estados.
    pub phase: EnginePhase,
    /// Aprendizados acumulados, em ordem de chegada.
    pub learnings: Vec<Learning>,
    /// Fontes deduplicadas, em ordem de descoberta.
    pub sources: Vec<Source>,
    /// URLs já emitidas (chave da deduplicação de fontes).
    seen_urls: HashSet<String>,
    /// Sub-queries já buscadas, normalizadas.
    visited_queries: HashSet<String>,
    /// Nós da fronteira já planejados, normalizados.
    visited_nodes: HashSet<String>,
    /// Snapshot de progresso (last-writer).
    pub progress: ProgressSnapshot,
}

impl SessionState {
    /// Cria o estado inicial de uma sessão.
    pub fn new(options: ResearchOptions) -> Self {
        let progress = ProgressSnapshot {
            total_depth: options.depth,
            total_breadth: options.breadth,
            ..ProgressSnapshot::default()
        };
        Self {
            options,
            phase: EnginePhase::Idle,
            learnings: Vec::new(),
            sources: Vec::new(),
            seen_urls: HashSet::new(),
            visited_queries: HashSet::new(),
            visited_nodes: HashSet::new(),
            progress,
        }
    }

    /// Avança a máquina de estados.
    pub fn transition(&mut self, target: EnginePhase) {
        debug_assert!(
            self.phase.can_transition_to(&target),
            "invalid phase transition {:?} -> {:?}",
            self.phase,
            target
        );
        log::debug!("🔀 Session phase: {:?} -> {:?}", self.phase, target);
        self.phase = target;
    }

    /// Check-and-insert atômico no conjunto de sub-queries buscadas.
    ///
    /// Retorna `true` quando a query ainda não tinha sido buscada
    /// (o caller pode prosseguir com ela). Garante que nenhuma query
    /// normalizada é buscada duas vezes na sessão.
    pub fn mark_query_visited(&mut self, query: &str) -> bool {
        self.visited_queries.insert(normalize_query(query))
    }

    /// Check-and-insert atômico no conjunto de nós da fronteira.
    ///
    /// Follow-ups duplicados são descartados aqui, no dequeue.
    pub fn mark_node_visited(&mut self, query: &str) -> bool {
        self.visited_nodes.insert(normalize_query(query))
    }

    /// Anexa fontes deduplicando por URL; devolve apenas as NOVAS
    /// (na ordem recebida), prontas para emissão em lote.
    pub fn add_sources(&mut self, sources: Vec<Source>) -> Vec<Source> {
        let mut fresh = Vec::new();
        for source in sources {
            if self.seen_urls.insert(source.url.clone()) {
                self.sources.push(source.clone());
                fresh.push(source);
            }
        }
        fresh
    }

    /// Anexa um aprendizado à sessão.
    pub fn add_learning(&mut self, learning: Learning) {
        self.learnings.push(learning);
    }

    /// Registra `count` novas sub-queries planejadas.
    pub fn note_planned(&mut self, count: usize) {
        self.progress.total_queries += count;
        self.progress.recompute();
    }

    /// Registra a conclusão de uma sub-query.
    pub fn note_completed(&mut self) {
        self.progress.completed_queries += 1;
        self.progress.recompute();
    }
}
