//! Orchestration services for the commitment and decision engine.
//!
//! Each service owns a pool handle and runs its writes for one message inside a single
//! `UnitOfWork`. The model call, when enabled, happens before the transaction begins.

pub mod commitments;
pub mod decisions;
pub mod extraction;
pub mod llm;
pub mod locks;
pub mod operations;
pub mod retry;
pub mod runtime;

pub use commitments::{CommitmentService, SentMessage, SentMessageOutcome};
pub use decisions::DecisionService;
pub use extraction::{ExtractionPipeline, ModelExtractor};
pub use llm::{HttpLlmClient, LlmClient};
pub use locks::ConversationLocks;
pub use operations::OperationsService;
pub use runtime::AgentRuntime;
