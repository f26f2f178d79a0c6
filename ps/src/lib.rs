//! PlanSmith - conversational project planning
//!
//! A user talks with a project-manager assistant. After each exchange the
//! conversation is synthesized in the background into a [`StructuredPlan`],
//! which the user can then hand-edit inside a cancellable transaction.
//!
//! # Modules
//!
//! - [`domain`] - dialogue turns and the structured plan document
//! - [`session`] - conversation log, session orchestration, edit transactions
//! - [`gateway`] - the conversation/synthesis service boundary
//! - [`llm`] - provider clients used by the gateway
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface
//! - [`repl`] - interactive chat presentation
//! - [`export`] - markdown export

pub mod cli;
pub mod config;
pub mod domain;
pub mod export;
pub mod gateway;
pub mod llm;
pub mod repl;
pub mod session;

// Re-export commonly used types
pub use config::{Config, LlmConfig, SessionConfig, StorageConfig};
pub use domain::{Role, StructuredPlan, Turn};
pub use gateway::{GatewayError, LlmGateway, OfflineGateway, SynthesisGateway};
pub use llm::{AnthropicClient, LlmClient, LlmError, OpenAIClient, create_client};
pub use session::{
    ConversationLog, EditTransaction, PlanEdit, PlanSession, SessionError, SessionEvent, SessionStatus,
    SynthesisOutcome,
};
