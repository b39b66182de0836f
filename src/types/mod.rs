//! Type definitions module
//!
//! Message types exchanged with text-generation collaborators.

pub mod messages;

// Re-export commonly used types
pub use messages::{ChatMessage, FinishReason, Generation, GenerationParams, Role, TokenUsage};
