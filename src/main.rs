// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DEEP RESEARCH ENGINE CLI
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// CLI para execução de sessões de pesquisa.
//
// Uso:
//   deep-research-engine "qual é a história do transistor?"
//   deep-research-engine --deep --depth 2 --breadth 3 "pergunta complexa"
//   deep-research-engine --server --port 3000
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use deep_research_engine::config::{load_config, Config};
use deep_research_engine::engine::ResearchEngine;
use deep_research_engine::events::{to_ndjson, ErrorKind, EventRecord};
use deep_research_engine::llm::{CredentialsReloadHook, OpenRouterClient};
use deep_research_engine::ratelimit::RateLimiter;
use deep_research_engine::search::FirecrawlClient;
use deep_research_engine::server::{start_server, AppState};
use deep_research_engine::types::ResearchOptions;

/// Flags aceitas pela CLI.
struct CliArgs {
    server: bool,
    port: u16,
    options: ResearchOptions,
    question: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Inicializar logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match parse_args(std::env::args().skip(1).collect()) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            print_usage();
            std::process::exit(1);
        }
    };

    let config = load_config();
    let engine = build_engine(&config);

    if args.server {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], args.port));
        let state = Arc::new(AppState { engine });
        return start_server(addr, state).await;
    }

    log::info!(
        "🔬 Deep Research Engine v{} | question: {}",
        deep_research_engine::VERSION,
        args.question
    );

    let cancel = CancellationToken::new();
    let mut rx = engine.stream(args.question, args.options, cancel.clone());

    // Ctrl-C cancela a sessão cooperativamente
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let mut failed = false;
    while let Some(event) = rx.recv().await {
        if matches!(
            event,
            EventRecord::Error {
                kind: Some(ErrorKind::Fatal),
                ..
            }
        ) {
            failed = true;
        }
        print!("{}", to_ndjson(&event));
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

/// Monta o motor com os clientes HTTP reais e o rate limiter compartilhado.
fn build_engine(config: &Config) -> Arc<ResearchEngine> {
    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));

    let search_client = Arc::new(FirecrawlClient::new(config.search.clone(), limiter.clone()));

    // Hook de recarga: relê a chave do ambiente após um 401
    let reload_hook: CredentialsReloadHook = Arc::new(|| {
        std::env::var("LLM_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
    });
    let llm_client =
        Arc::new(OpenRouterClient::new(config.llm.clone(), limiter).with_reload_hook(reload_hook));

    Arc::new(
        ResearchEngine::new(search_client, llm_client, config.engine.clone())
            .with_default_model(config.llm.default_model.clone()),
    )
}

/// Parse manual dos argumentos.
fn parse_args(args: Vec<String>) -> Result<CliArgs, String> {
    let mut server = false;
    let mut port: u16 = 3000;
    let mut options = ResearchOptions::default();
    let mut question_parts = Vec::new();

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--server" => server = true,
            "--deep" => options.is_deep = true,
            "--port" => port = next_value(&mut iter, "--port")?,
            "--depth" => options.depth = next_value(&mut iter, "--depth")?,
            "--breadth" => options.breadth = next_value(&mut iter, "--breadth")?,
            "--concurrency" => options.max_concurrency = next_value(&mut iter, "--concurrency")?,
            "--model" => {
                options.model_id = iter
                    .next()
                    .ok_or_else(|| "--model requires a value".to_string())?;
            }
            "--help" | "-h" => return Err(String::new()),
            other => question_parts.push(other.to_string()),
        }
    }

    let question = question_parts.join(" ");
    if !server && question.is_empty() {
        return Err("A research question is required".into());
    }

    Ok(CliArgs {
        server,
        port,
        options,
        question,
    })
}

/// Consome e parseia o valor de uma flag numérica.
fn next_value<T: std::str::FromStr>(
    iter: &mut impl Iterator<Item = String>,
    flag: &str,
) -> Result<T, String> {
    iter.next()
        .ok_or_else(|| format!("{} requires a value", flag))?
        .parse::<T>()
        .map_err(|_| format!("{} requires a numeric value", flag))
}

fn print_usage() {
    eprintln!("Deep Research Engine v{}", deep_research_engine::VERSION);
    eprintln!();
    eprintln!("Uso: deep-research-engine [opções] <pergunta>");
    eprintln!();
    eprintln!("Opções:");
    eprintln!("  --deep                Modo profundo (expansão iterativa)");
    eprintln!("  --depth <1-5>         Níveis de expansão (padrão: 2)");
    eprintln!("  --breadth <1-5>       Queries por planejamento (padrão: 3)");
    eprintln!("  --model <id>          Modelo LLM (padrão: LLM_MODEL do ambiente)");
    eprintln!("  --concurrency <n>     Sub-queries paralelas (padrão: 2)");
    eprintln!("  --server              Sobe o servidor HTTP em vez da CLI");
    eprintln!("  --port <n>            Porta do servidor (padrão: 3000)");
    eprintln!();
    eprintln!("Exemplo:");
    eprintln!("  deep-research-engine --deep --depth 2 --breadth 3 \\");
    eprintln!("      \"quais os últimos avanços em baterias de estado sólido?\"");
}
