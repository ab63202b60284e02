use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Default)]
pub struct AppMetrics {
    turns_total: AtomicU64,
    fallback_total: AtomicU64,
    empty_rejected_total: AtomicU64,
    conversations_opened_total: AtomicU64,
    conversations_ended_total: AtomicU64,
    total_latency_micros: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub turns_total: u64,
    pub fallback_total: u64,
    pub empty_rejected_total: u64,
    pub conversations_opened_total: u64,
    pub conversations_ended_total: u64,
    pub avg_latency_micros: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_turn(&self) {
        self.turns_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fallback(&self) {
        self.fallback_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_empty_rejected(&self) {
        self.empty_rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_conversation_opened(&self) {
        self.conversations_opened_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_conversations_ended(&self, count: u64) {
        self.conversations_ended_total
            .fetch_add(count, Ordering::Relaxed);
    }

    /// Saturates instead of wrapping on absurd durations.
    pub fn observe_latency(&self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        let _ = self.total_latency_micros.fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |total| Some(total.saturating_add(micros)),
        );
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let turns = self.turns_total.load(Ordering::Relaxed);
        let latency = self.total_latency_micros.load(Ordering::Relaxed);

        MetricsSnapshot {
            turns_total: turns,
            fallback_total: self.fallback_total.load(Ordering::Relaxed),
            empty_rejected_total: self.empty_rejected_total.load(Ordering::Relaxed),
            conversations_opened_total: self.conversations_opened_total.load(Ordering::Relaxed),
            conversations_ended_total: self.conversations_ended_total.load(Ordering::Relaxed),
            avg_latency_micros: if turns == 0 {
                0.0
            } else {
                latency as f64 / turns as f64
            },
        }
    }
}

/// Installs the JSON subscriber once per process. Logs go to stderr so an
/// interactive session on stdout stays readable.
pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,intelli_api=info,intelli_agents=info",
                service_name
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(std::io::stderr)
            .init();
    });
}
