//! Conversation node model.
//!
//! A [`ChatNode`] is one turn in a conversation tree. Nodes reference their
//! predecessor through `parent_id`, so a flat node list encodes a full
//! branching history; any node can become the root of a new branch by
//! giving it a second child.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Prefix for locally generated (not yet durable) node ids.
pub const LOCAL_ID_PREFIX: &str = "local-";

// ============================================================================
// Roles
// ============================================================================

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

// ============================================================================
// Opaque payloads
// ============================================================================

/// A visualization hint attached to an assistant turn.
///
/// Produced by the completion backend, consumed by the animation pipeline.
/// The engine stores and forwards it without interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationSuggestion {
    pub description: String,
    pub topic: String,
}

/// A document attachment carried on a user turn, passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfAttachment {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    /// Opaque handle or inline payload, depending on the uploader.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

// ============================================================================
// ChatNode
// ============================================================================

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatNode {
    pub id: String,
    /// Turn this one continues; `None` for a root turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub role: Role,
    /// Mutable only while the node is ephemeral (streaming in).
    pub content: String,
    /// Creation time, epoch milliseconds. Tie-break for sibling ordering.
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_animation: Option<AnimationSuggestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_attachments: Option<Vec<PdfAttachment>>,
}

impl ChatNode {
    /// Whether this node's id was generated locally (ephemeral, or persisted
    /// locally after a store failure).
    pub fn is_local(&self) -> bool {
        self.id.starts_with(LOCAL_ID_PREFIX)
    }
}

/// Fields a caller supplies when asking the durable store for a new node.
///
/// Id and timestamp are assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_animation: Option<AnimationSuggestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_attachments: Option<Vec<PdfAttachment>>,
}

impl NodeDraft {
    /// A plain text draft with no attachments.
    pub fn text(parent_id: Option<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            parent_id,
            role,
            content: content.into(),
            suggested_animation: None,
            pdf_attachments: None,
        }
    }

    /// Materialize the draft into a node with the given id and timestamp.
    pub fn into_node(self, id: String, created_at: i64) -> ChatNode {
        ChatNode {
            id,
            parent_id: self.parent_id,
            role: self.role,
            content: self.content,
            created_at,
            suggested_animation: self.suggested_animation,
            pdf_attachments: self.pdf_attachments,
        }
    }
}

// ============================================================================
// Session metadata
// ============================================================================

/// A named container owning one conversation tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMeta {
    pub id: String,
    pub title: String,
    /// Epoch milliseconds.
    pub created_at: i64,
}

impl ChatMeta {
    /// A fresh session with a generated id and the default title.
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: "New chat".to_string(),
            created_at: now_millis(),
        }
    }
}

impl Default for ChatMeta {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Id and time helpers
// ============================================================================

/// Current time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a unique node id (8 hex characters), falling back to a full UUID
/// on collision.
pub fn generate_node_id(existing: &HashSet<String>) -> String {
    for _ in 0..100 {
        let uuid = uuid::Uuid::new_v4();
        let id = uuid.simple().to_string()[..8].to_string();
        if !existing.contains(&id) {
            return id;
        }
    }
    uuid::Uuid::new_v4().to_string()
}

/// Generate an id for an ephemeral (not yet durable) node.
pub fn generate_local_id() -> String {
    format!("{LOCAL_ID_PREFIX}{}", uuid::Uuid::new_v4().simple())
}
