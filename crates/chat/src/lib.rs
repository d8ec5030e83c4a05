//! Fomentos RAG chat engine
//!
//! Conversation state + query expansion + retrieval + grounded generation.
//! Answers come from indexed edital chunks only; every assistant turn
//! records the chunk ids that grounded it.

pub mod context;
pub mod engine;
pub mod expansion;

pub use engine::{ChatEngine, SendMessageResult};
