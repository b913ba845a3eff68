//! LLM integration.
//!
//! An OpenAI-compatible chat completion client behind the [`LlmProvider`]
//! trait. The capability layer wraps a provider to run executor templates.
//!
//! ```ignore
//! use compose_forge::llm::{GenerationRequest, LiteLlmClient, LlmProvider, Message};
//!
//! let client = LiteLlmClient::from_env()?;
//! let request = GenerationRequest::new("gpt-4o-mini", vec![Message::user("Hello")]);
//! let response = client.generate(request).await?;
//! ```

mod client;

pub use client::{
    Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message, Usage,
};
