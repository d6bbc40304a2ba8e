// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PROTOCOLO DE EVENTOS - Stream NDJSON incremental
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// União etiquetada dos eventos da sessão e o canal limitado que os leva
// até o consumidor. Cada evento vira uma linha JSON terminada em \n.
// Buffer cheio aplica backpressure no worker produtor; descartar eventos
// seria violação de correção (fontes seriam perdidas).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::types::{ProgressSnapshot, ResearchOptions, Source};

/// Opções ecoadas no evento `start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOptions {
    pub is_deep: bool,
    pub depth: u32,
    pub breadth: u32,
    pub model_id: String,
}

impl From<&ResearchOptions> for StartOptions {
    fn from(options: &ResearchOptions) -> Self {
        Self {
            is_deep: options.is_deep,
            depth: options.depth,
            breadth: options.breadth,
            model_id: options.model_id.clone(),
        }
    }
}

/// Par corrente/total usado nos detalhes de progresso.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentTotal {
    pub current: u32,
    pub total: u32,
}

/// Contadores de queries nos detalhes de progresso.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueriesDetail {
    pub current: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_query: Option<String>,
}

/// Detalhamento opcional de um evento `progress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressDetails {
    pub depth: CurrentTotal,
    pub breadth: CurrentTotal,
    pub queries: QueriesDetail,
}

/// Classe de erro exposta ao consumidor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Cancelled,
    Transient,
    Fatal,
}

/// Métricas do evento `complete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteMetrics {
    pub total_time_seconds: f64,
    pub model_id: String,
}

/// Evento da sessão de pesquisa, etiquetado por `type`.
///
/// Campos ausentes são omitidos da serialização. Consumidores devem
/// tratar valores de `type` desconhecidos como ignoráveis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventRecord {
    /// Primeiro evento da sessão.
    Start {
        query: String,
        options: StartOptions,
        timestamp: String,
    },
    /// Atualização de progresso (semântica last-writer).
    Progress {
        progress: f64,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<ProgressDetails>,
    },
    /// Bloco Markdown com os principais resultados (apenas modo raso).
    SearchResults { content: String },
    /// Fontes recém-descobertas (URLs únicas na sessão).
    Sources { sources: Vec<Source> },
    /// Um aprendizado extraído.
    Learning { content: String },
    /// Relatório final em Markdown, seção `## Sources` incluída.
    Content { content: String },
    /// Erro visível ao consumidor.
    Error {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        kind: Option<ErrorKind>,
    },
    /// Último evento da sessão.
    Complete {
        #[serde(skip_serializing_if = "Option::is_none")]
        metrics: Option<CompleteMetrics>,
    },
}

impl EventRecord {
    /// Monta um evento `progress` a partir de uma CÓPIA do snapshot.
    pub fn from_snapshot(snapshot: &ProgressSnapshot) -> Self {
        EventRecord::Progress {
            progress: snapshot.progress,
            status: snapshot.status.clone(),
            details: Some(ProgressDetails {
                depth: CurrentTotal {
                    current: snapshot.current_depth,
                    total: snapshot.total_depth,
                },
                breadth: CurrentTotal {
                    current: snapshot.current_breadth,
                    total: snapshot.total_breadth,
                },
                queries: QueriesDetail {
                    current: snapshot.completed_queries,
                    total: snapshot.total_queries,
                    current_query: snapshot.current_query.clone(),
                },
            }),
        }
    }
}

/// Serializa um evento como uma linha NDJSON (JSON + `\n`).
pub fn to_ndjson(event: &EventRecord) -> String {
    let mut line = serde_json::to_string(event).unwrap_or_else(|e| {
        log::error!("❌ Event serialization failed: {}", e);
        String::from("{\"type\":\"error\",\"content\":\"event serialization failed\"}")
    });
    line.push('\n');
    line
}

/// Decodifica uma linha NDJSON; `None` para linhas vazias, malformadas
/// ou de tipos desconhecidos (ignoráveis por contrato).
pub fn parse_ndjson_line(line: &str) -> Option<EventRecord> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    serde_json::from_str(line).ok()
}

/// Lado produtor do stream de eventos.
///
/// `emit` aplica backpressure: com o buffer cheio o worker produtor
/// fica suspenso até o consumidor drenar.
#[derive(Clone)]
pub struct EventEmitter {
    tx: mpsc::Sender<EventRecord>,
}

impl EventEmitter {
    /// Emite um evento, aguardando espaço no buffer.
    ///
    /// Consumidor desconectado não é erro fatal: o evento é descartado
    /// e a sessão segue até o cancelamento ser observado.
    pub async fn emit(&self, event: EventRecord) {
        if self.tx.send(event).await.is_err() {
            log::debug!("📪 Event consumer disconnected");
        }
    }
}

/// Cria o canal de eventos com o buffer limitado configurado.
pub fn event_channel(buffer: usize) -> (EventEmitter, mpsc::Receiver<EventRecord>) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (EventEmitter { tx }, rx)
}
