// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RATE LIMITER
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Gate estilo token-bucket compartilhado pelos clientes de busca e LLM:
// no máximo N aquisições por janela rolante de 60 s, com backoff
// exponencial compartilhado quando um provedor sinaliza rate limit.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::collections::VecDeque;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::RateLimitConfig;

/// Janela rolante de aquisições.
const WINDOW: Duration = Duration::from_secs(60);

/// Resultado de uma tentativa de aquisição.
///
/// `acquire` nunca falha: ou o caller obtém um token, ou a sessão
/// foi cancelada enquanto esperava.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    /// Token obtido; o caller pode chamar o provedor.
    Acquired,
    /// Sessão cancelada durante a espera.
    Cancelled,
}

/// Timestamps das aquisições dentro da janela corrente.
#[derive(Debug, Default)]
struct WindowState {
    acquired_at: VecDeque<Instant>,
}

/// Estado de backoff compartilhado entre todos os workers.
#[derive(Debug)]
struct BackoffState {
    /// Backoff corrente (dobra a cada sinal consecutivo).
    current: Duration,
    /// Instante até o qual novas aquisições devem esperar.
    blocked_until: Option<Instant>,
    /// Sinais consecutivos sem reset de janela.
    consecutive_signals: u32,
}

/// Gate de requisições para os provedores externos.
///
/// Compartilhado entre SearchClient e LlmClient de uma sessão (e
/// opcionalmente entre sessões, clonando o mesmo `Arc`). Um sinal de
/// rate limit observado por um worker eleva o backoff para todos.
///
/// # Exemplo
/// ```rust,ignore
/// let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));
/// match limiter.acquire(&cancel).await {
///     AcquireResult::Acquired => { /* chamar o provedor */ }
///     AcquireResult::Cancelled => return,
/// }
/// ```
pub struct RateLimiter {
    config: RateLimitConfig,
    /// Mutex FIFO segurado durante a espera: serializa rajadas de
    /// chegadas tardias na ordem de chegada.
    window: Mutex<WindowState>,
    backoff: StdMutex<BackoffState>,
}

impl RateLimiter {
    /// Cria um rate limiter com a configuração fornecida.
    pub fn new(config: RateLimitConfig) -> Self {
        let initial = Duration::from_millis(config.initial_backoff_ms);
        Self {
            config,
            window: Mutex::new(WindowState::default()),
            backoff: StdMutex::new(BackoffState {
                current: initial,
                blocked_until: None,
                consecutive_signals: 0,
            }),
        }
    }

    /// Suspende o caller até haver um token disponível ou a sessão
    /// ser cancelada.
    pub async fn acquire(&self, cancel: &CancellationToken) -> AcquireResult {
        let mut window = tokio::select! {
            guard = self.window.lock() => guard,
            _ = cancel.cancelled() => return AcquireResult::Cancelled,
        };

        loop {
            let now = Instant::now();

            while let Some(front) = window.acquired_at.front() {
                if now.duration_since(*front) >= WINDOW {
                    window.acquired_at.pop_front();
                } else {
                    break;
                }
            }

            // Janela esvaziou por completo: reset do backoff
            if window.acquired_at.is_empty() {
                self.reset_backoff(now);
            }

            let mut wait = self.blocked_for(now);

            if wait.is_zero() && window.acquired_at.len() < self.config.rpm as usize {
                window.acquired_at.push_back(now);
                return AcquireResult::Acquired;
            }

            if wait.is_zero() {
                // Janela cheia: espera a aquisição mais antiga expirar
                let oldest = *window.acquired_at.front().expect("window is non-empty");
                wait = WINDOW.saturating_sub(now.duration_since(oldest));
            }

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => return AcquireResult::Cancelled,
            }
        }
    }

    /// Registra um erro de rate limit sinalizado pelo provedor.
    ///
    /// Usa `retry_after` quando o provedor informou, senão o backoff
    /// corrente; o backoff dobra a cada sinal consecutivo, com teto.
    /// Sinais simultâneos de vários workers colapsam numa única espera
    /// compartilhada (o maior `blocked_until` vence).
    pub fn signal_rate_limit_error(&self, retry_after: Option<Duration>) {
        let now = Instant::now();
        let mut backoff = self.backoff.lock().expect("backoff lock poisoned");

        let wait = retry_after.unwrap_or(backoff.current);
        let until = now + wait;
        backoff.blocked_until = Some(match backoff.blocked_until {
            Some(existing) if existing > until => existing,
            _ => until,
        });

        backoff.consecutive_signals += 1;
        let next = backoff.current.mul_f64(self.config.multiplier);
        backoff.current = next.min(Duration::from_millis(self.config.max_backoff_ms));

        log::warn!(
            "⏳ Rate limit signalled (consecutive: {}), backing off {:?}",
            backoff.consecutive_signals,
            wait
        );
    }

    /// Backoff corrente (exposto para os retries internos dos clientes).
    pub fn current_backoff(&self) -> Duration {
        self.backoff.lock().expect("backoff lock poisoned").current
    }

    /// Quanto falta do bloqueio por backoff, se houver.
    fn blocked_for(&self, now: Instant) -> Duration {
        let mut backoff = self.backoff.lock().expect("backoff lock poisoned");
        match backoff.blocked_until {
            Some(until) if until > now => until.duration_since(now),
            Some(_) => {
                backoff.blocked_until = None;
                Duration::ZERO
            }
            None => Duration::ZERO,
        }
    }

    fn reset_backoff(&self, now: Instant) {
        let mut backoff = self.backoff.lock().expect("backoff lock poisoned");
        let expired = match backoff.blocked_until {
            None => true,
            Some(until) => until <= now,
        };
        if expired {
            backoff.current = Duration::from_millis(self.config.initial_backoff_ms);
            backoff.consecutive_signals = 0;
        }
    }
}
