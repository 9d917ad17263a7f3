//! Answer generation with a provider fallback chain
//!
//! Providers are tried strictly in configured order, one attempt each with
//! a per-provider timeout. When every remote provider fails, a static
//! degraded response built from the retrieved context is returned instead;
//! generation never surfaces an error to the caller.

mod orchestrator;
mod provider;

pub use orchestrator::{FallbackChain, GenerationOutcome, ProviderAttempt, FALLBACK_PROVIDER};
pub use provider::{
    build_prompt, GenerationProvider, GenerationRequest, OpenAiCompatProvider, ProviderError,
    StaticFallback, SYSTEM_PROMPT,
};
