//! LLM integration module.
//!
//! Provides OpenAI-compatible clients for chat completions and embeddings,
//! and the prompts used to ask multiple-choice questions.

mod client;
mod embeddings;
mod prompts;

pub use client::{
    ChatCompletionRequest, CompletionService, LlmClient, Message, Role, completion_text,
};
pub use embeddings::{EmbeddingRequest, EmbeddingService, OpenAiEmbedder};
pub use prompts::Prompts;
