//! SynthesisGateway - the service boundary for replies and plan synthesis
//!
//! The session only depends on the [`SynthesisGateway`] trait, so tests can
//! substitute scripted gateways. [`LlmGateway`] is the production
//! implementation on top of an [`LlmClient`](crate::llm::LlmClient).

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{StructuredPlan, Turn};
use crate::llm::LlmError;

mod llm_gateway;
mod schema;

pub use llm_gateway::{EMPTY_REPLY, LlmGateway, RECORD_PLAN_TOOL, render_transcript};
pub use schema::plan_schema;

/// Errors crossing the gateway boundary
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("LLM request failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
}

/// Conversational replies and structured synthesis
///
/// Both calls are fallible and may be slow. Callers decide how failures
/// degrade; implementations must not retry forever.
#[async_trait]
pub trait SynthesisGateway: Send + Sync {
    /// Produce the assistant reply to `message`, given the turns before it
    async fn converse(&self, history: &[Turn], message: &str) -> Result<String, GatewayError>;

    /// Derive a plan from the full conversation
    ///
    /// `Ok(None)` means there was not enough information or the model output
    /// could not be read as a plan.
    async fn synthesize(&self, history: &[Turn]) -> Result<Option<StructuredPlan>, GatewayError>;
}

/// Gateway for commands that only read or reset a session
///
/// Every call fails with [`GatewayError::Unavailable`].
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineGateway;

#[async_trait]
impl SynthesisGateway for OfflineGateway {
    async fn converse(&self, _history: &[Turn], _message: &str) -> Result<String, GatewayError> {
        Err(GatewayError::Unavailable("offline".to_string()))
    }

    async fn synthesize(&self, _history: &[Turn]) -> Result<Option<StructuredPlan>, GatewayError> {
        Err(GatewayError::Unavailable("offline".to_string()))
    }
}
