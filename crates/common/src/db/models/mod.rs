//! Canonical store document models

pub mod conversation;
pub mod edital;
pub mod job_execution;
pub mod user;

pub use conversation::{ChatMessage, Conversation, MessageRole};
pub use edital::{
    EditalDocument, EditalFields, ExtractionChunk, ExtractionStatus, FailedChunk,
};
pub use job_execution::{JobError, JobExecution, JobStatus, ResultSummary};
pub use user::{User, UserPublic};
