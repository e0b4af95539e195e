pub mod config;
pub mod conflict;
pub mod decision;
pub mod domain;
pub mod errors;
pub mod extraction;
pub mod operations;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use conflict::{CommitmentConflict, ConflictResult, ConflictType};
pub use decision::{Evaluation, EvaluationContext, GuardOutcome};
pub use domain::commitment::{
    Commitment, CommitmentCandidate, CommitmentId, CommitmentStatus, CommitmentTerms,
    CommitmentTopic, CommitmentType,
};
pub use domain::conversation::ConversationId;
pub use domain::decision::{
    AutomationPatternStats, Decision, DecisionLog, DecisionLogId, DecisionResult, DraftId,
    EvidencePackage, HumanAction, OutcomeLabel, PolicyRule, ReasonCode,
};
pub use domain::operational::{
    GuestStay, OcAction, OcCandidate, OcPriority, OcStatus, OcTopic, OperationalCommitment,
    OperationalCommitmentId, StaffAction, StaffNotificationItem,
};
pub use domain::risk::{RiskSeverity, RiskSignal, RiskSignalId, RiskSignalType};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use extraction::{
    ExtractedCandidates, ExtractionError, ExtractionRequest, ExtractionSource, RuleBasedExtractor,
};
