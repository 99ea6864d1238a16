//! AI completion transport abstraction.
//!
//! The engine never talks HTTP itself; it hands a [`ChatRequest`] to a
//! [`ChatTransport`] and consumes the resulting frame stream. Tests script
//! the stream; production wires this to the streaming chat endpoint.

use crate::error::Result;
use crate::frame::StreamFrame;
use crate::node::{ChatNode, Role};
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A pinned, boxed stream of frame results.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<StreamFrame>> + Send>>;

/// One `{role, content}` entry of the outgoing message history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl From<&ChatNode> for WireMessage {
    fn from(node: &ChatNode) -> Self {
        Self {
            role: node.role,
            content: node.content.clone(),
        }
    }
}

/// A completion request reconstructed from the active branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Root-to-leaf message history of the branch being continued.
    pub messages: Vec<WireMessage>,
    /// Ordered node-id list of that branch, so the backend can attach the
    /// reply to the right turn.
    pub branch_path: Vec<String>,
    /// Externally supplied context payload, opaque to the engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_context: Option<serde_json::Value>,
    /// Optional mode tag (e.g. a tutoring mode), also opaque.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

/// A transport that streams completions for chat requests.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Start a completion and return its frame stream.
    async fn stream_chat(&self, request: &ChatRequest) -> Result<FrameStream>;
}
