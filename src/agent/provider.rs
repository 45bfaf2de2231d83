//! The Provider capability: the model-calling interface leaf agents
//! drive. An external collaborator in the design's terms — only the
//! shape the core depends on is specified here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::stream::Reader;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    #[serde(default)]
    pub allowed_callers: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    pub response_format: Option<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Chunk {
    TextDelta(String),
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    Usage(Usage),
    /// A recoverable, mid-stream provider error: the stream keeps going
    /// (more chunks, or a clean end-of-stream, may still follow) rather
    /// than the whole `stream()` call having failed outright.
    Error(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderMessage {
    pub role: String,
    pub content: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Response {
    pub message: ProviderMessage,
    pub usage: Usage,
}

/// Model-calling collaborator. `stream` drives the `Calling` state of the
/// leaf agent; `complete` is a non-streaming convenience used by tests
/// and simple tools.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn complete(&self, messages: &[ProviderMessage], options: &CompletionOptions) -> Result<Response>;

    async fn stream(&self, messages: &[ProviderMessage], options: &CompletionOptions) -> Result<Reader<Chunk>>;
}
