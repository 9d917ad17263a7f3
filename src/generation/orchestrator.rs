//! Fallback chain over generation providers
//!
//! Strict configured order, exactly one attempt per provider, each bounded
//! by its own timeout. Failures are values, not errors: every attempt is
//! recorded with its latency, and when the whole chain fails the static
//! degraded response takes over, so `generate` is infallible.

use super::provider::{GenerationProvider, GenerationRequest, StaticFallback};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Name used for the degraded terminal stage in outcomes and attempts
pub const FALLBACK_PROVIDER: &str = "static-fallback";

/// Record of one provider attempt, kept in chain order
#[derive(Debug, Clone, Serialize)]
pub struct ProviderAttempt {
    pub provider: String,
    pub latency_ms: f64,
    /// None means success; otherwise the failure rendered as text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Final result of running the chain
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub answer: String,
    /// Name of the provider that answered, or `FALLBACK_PROVIDER`
    pub provider: String,
    pub degraded: bool,
    pub attempts: Vec<ProviderAttempt>,
    /// Total wall-clock time across all attempts
    pub total_ms: f64,
}

struct ChainLink {
    provider: Arc<dyn GenerationProvider>,
    timeout: Duration,
}

/// Ordered provider chain with a built-in degraded terminal stage
pub struct FallbackChain {
    links: Vec<ChainLink>,
}

impl FallbackChain {
    pub fn new() -> Self {
        Self { links: Vec::new() }
    }

    pub fn push(&mut self, provider: Arc<dyn GenerationProvider>, timeout: Duration) {
        self.links.push(ChainLink { provider, timeout });
    }

    pub fn with_provider(
        mut self,
        provider: Arc<dyn GenerationProvider>,
        timeout: Duration,
    ) -> Self {
        self.push(provider, timeout);
        self
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Run the chain. Never fails: exhausting every provider produces the
    /// static degraded response.
    pub async fn generate(&self, request: &GenerationRequest) -> GenerationOutcome {
        let chain_start = Instant::now();
        let mut attempts = Vec::with_capacity(self.links.len());

        for link in &self.links {
            let name = link.provider.name().to_string();
            let start = Instant::now();

            let result =
                tokio::time::timeout(link.timeout, link.provider.generate(request)).await;
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

            match result {
                Ok(Ok(answer)) => {
                    tracing::info!("Provider '{}' answered in {:.0}ms", name, latency_ms);
                    attempts.push(ProviderAttempt {
                        provider: name.clone(),
                        latency_ms,
                        error: None,
                    });
                    return GenerationOutcome {
                        answer,
                        provider: name,
                        degraded: false,
                        attempts,
                        total_ms: chain_start.elapsed().as_secs_f64() * 1000.0,
                    };
                }
                Ok(Err(e)) => {
                    tracing::warn!("Provider '{}' failed after {:.0}ms: {}", name, latency_ms, e);
                    attempts.push(ProviderAttempt {
                        provider: name,
                        latency_ms,
                        error: Some(e.to_string()),
                    });
                }
                Err(_) => {
                    tracing::warn!(
                        "Provider '{}' timed out after {:.0}ms",
                        name,
                        link.timeout.as_millis()
                    );
                    attempts.push(ProviderAttempt {
                        provider: name,
                        latency_ms,
                        error: Some(format!("timed out after {}ms", link.timeout.as_millis())),
                    });
                }
            }
        }

        tracing::warn!(
            "All {} providers failed, returning degraded response",
            self.links.len()
        );
        GenerationOutcome {
            answer: StaticFallback::render(request),
            provider: FALLBACK_PROVIDER.to_string(),
            degraded: true,
            attempts,
            total_ms: chain_start.elapsed().as_secs_f64() * 1000.0,
        }
    }
}

impl Default for FallbackChain {
    fn default() -> Self {
        Self::new()
    }
}
