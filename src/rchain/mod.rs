//! Provider-facing LLM plumbing.
//!
//! Typed messages, the [`chat_models::ChatModel`] seam, and one adapter per
//! provider wire format.

/// Assistant replies and the embedded image directive.
pub mod ai;
pub mod anthropic;
/// Chat model trait, connectors and resolved handles.
pub mod chat_models;
pub(crate) mod chat_runtime;
pub mod google;
/// Incoming request, history turn and attachment types.
pub mod human;
/// Provider-neutral message representation.
pub mod message;
/// Chat-completions adapter for OpenAI and Mistral.
pub mod openai;
/// Provider identities, endpoints, credentials and errors.
pub mod provider;
pub(crate) mod sse;
/// Server-side tool descriptors.
pub mod tools;
/// Image format handling for vision-capable models.
pub mod vision;
