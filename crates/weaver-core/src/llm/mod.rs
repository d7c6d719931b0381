//! LLM integration - OpenAI-compatible chat completions
//!
//! This module provides:
//! - HTTP client for `/chat/completions` (OpenAI, DeepSeek, OpenRouter)
//! - Request/response types matching the OpenAI-compatible API
//! - The [`CompletionTransport`] seam used by the relationship oracle
//! - A scripted transport for tests and dry runs

mod client;
mod transport;
mod types;

pub use client::{LlmClient, LlmClientBuilder};
pub use transport::{CompletionTransport, ScriptedTransport};
pub use types::{ChatRequest, ChatResponse, Choice, FinishReason, LlmResponse, Message, MessageRole, Usage};
