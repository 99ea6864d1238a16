//! Streaming ingestion controller.
//!
//! One [`ChatController`] owns one session's node store and drives the
//! send/receive cycle:
//!
//! ```text
//! Idle -> Sending -> Streaming -> Finalizing -> Complete
//!            \            \
//!             +------------+--> Errored
//! ```
//!
//! The user turn is persisted *before* the completion request goes out, so
//! the backend always has a durable anchor to attach the reply to. The
//! reply streams into a single ephemeral node that is atomically swapped
//! for its persisted counterpart on the terminal `done` frame.
//!
//! Precondition: one send per controller at a time. The caller enforces
//! this at the UI level; a second send while one is in flight is rejected
//! with a session error. Separate controllers share no state and may
//! stream concurrently.

use crate::branch::{active_branch, branch_path};
use crate::chat_store::ChatStore;
use crate::error::{Error, Result};
use crate::frame::StreamFrame;
use crate::node::{
    generate_local_id, now_millis, ChatMeta, ChatNode, NodeDraft, PdfAttachment, Role,
};
use crate::store::NodeStore;
use crate::title::derive_title;
use crate::transport::{ChatRequest, ChatTransport, WireMessage};
use crate::tree::{build_tree, TreeNode};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Fixed content of the synthetic assistant node inserted on failure.
pub const ERROR_REPLY: &str =
    "Sorry, something went wrong while generating a response. Please try again.";

// ============================================================================
// Phases, events, cancellation
// ============================================================================

/// Where a send cycle currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPhase {
    Idle,
    Sending,
    Streaming,
    Finalizing,
    Complete,
    Errored,
}

/// Notifications emitted while a send cycle runs; the UI renders from these.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Phase(SendPhase),
    /// A node was appended to the store (user, ephemeral, or synthetic).
    NodeAdded { node_id: String },
    /// Streamed text was appended to the ephemeral node.
    Chunk { node_id: String, delta: String },
    /// The cached session title changed.
    TitleChanged { title: String },
}

/// Cancellation flag for an in-flight stream.
///
/// Cheap to clone; typically tied to session deactivation. Firing it
/// mid-stream takes the same path as a terminal `error` frame.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Send inputs/outputs
// ============================================================================

/// One outgoing user message.
#[derive(Debug, Clone, Default)]
pub struct SendRequest {
    pub text: String,
    /// Opaque context payload forwarded to the transport untouched.
    pub workspace_context: Option<serde_json::Value>,
    /// Optional mode tag, also opaque.
    pub mode: Option<String>,
    pub pdf_attachments: Option<Vec<PdfAttachment>>,
}

impl SendRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// How a send cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    /// Id of the node `active_node_id` points at after the cycle.
    pub final_node_id: String,
    /// True when the cycle took the error path (error frame, transport
    /// failure, or cancellation) and the final node is the synthetic reply.
    pub errored: bool,
    /// False when the final assistant content lives only in memory because
    /// the durable save failed (local-authoritative reconciliation).
    pub persisted: bool,
}

// ============================================================================
// Controller
// ============================================================================

/// Per-session conversation state and the send/receive state machine.
#[derive(Debug)]
pub struct ChatController {
    meta: ChatMeta,
    nodes: NodeStore,
    active_node_id: Option<String>,
    /// Set once the user explicitly renames the session; derived titles
    /// never overwrite an explicit one.
    user_renamed: bool,
    phase: SendPhase,
}

impl ChatController {
    /// Controller for a fresh, empty session.
    pub fn new(meta: ChatMeta) -> Self {
        Self {
            meta,
            nodes: NodeStore::new(),
            active_node_id: None,
            user_renamed: false,
            phase: SendPhase::Idle,
        }
    }

    /// Controller over nodes loaded from the durable store. The active
    /// pointer starts at the last loaded node, matching persisted order.
    pub fn from_loaded(meta: ChatMeta, loaded: Vec<ChatNode>) -> Self {
        let nodes = NodeStore::from_nodes(loaded);
        let active_node_id = nodes.nodes().last().map(|n| n.id.clone());
        Self {
            meta,
            nodes,
            active_node_id,
            user_renamed: false,
            phase: SendPhase::Idle,
        }
    }

    pub fn meta(&self) -> &ChatMeta {
        &self.meta
    }

    pub fn nodes(&self) -> &[ChatNode] {
        self.nodes.nodes()
    }

    pub fn active_node_id(&self) -> Option<&str> {
        self.active_node_id.as_deref()
    }

    pub fn phase(&self) -> SendPhase {
        self.phase
    }

    pub fn title(&self) -> &str {
        &self.meta.title
    }

    pub fn chat_id(&self) -> &str {
        &self.meta.id
    }

    /// Move the active pointer to another node (branch switching).
    pub fn set_active_node(&mut self, node_id: &str) -> Result<()> {
        if !self.nodes.contains(node_id) {
            return Err(Error::dangling(node_id));
        }
        self.active_node_id = Some(node_id.to_string());
        Ok(())
    }

    /// The displayed branch, root to leaf.
    pub fn active_branch(&self) -> Vec<&ChatNode> {
        active_branch(self.nodes.nodes(), self.active_node_id.as_deref())
    }

    /// The displayed branch as ids only.
    pub fn branch_path(&self) -> Vec<String> {
        branch_path(self.nodes.nodes(), self.active_node_id.as_deref())
    }

    /// The full forest for branch-navigation views.
    pub fn tree(&self) -> Vec<TreeNode> {
        build_tree(self.nodes.nodes())
    }

    /// Record an explicit user rename. Derived titles will no longer apply.
    pub fn rename(&mut self, title: impl Into<String>) {
        self.meta.title = title.into();
        self.user_renamed = true;
    }

    /// Whether the user has explicitly renamed this session.
    pub fn user_renamed(&self) -> bool {
        self.user_renamed
    }

    /// Install a higher-quality derived title, unless the user renamed.
    ///
    /// The rename in the durable store is attempted but never fails the
    /// caller; a rejection is logged.
    pub async fn refine_title(&mut self, title: impl Into<String>, store: &dyn ChatStore) {
        if self.user_renamed {
            return;
        }
        let title = title.into();
        self.meta.title = title.clone();
        if let Err(e) = store.rename_chat(&self.meta.id, &title).await {
            tracing::warn!(chat = %self.meta.id, error = %e, "title refinement not persisted");
        }
    }

    /// Drive one full send/receive cycle.
    ///
    /// Returns `Ok` with an errored outcome when the stream fails terminally
    /// (the synthetic reply is in place and the user may resend); returns
    /// `Err` only when the cycle could not start: a send already in flight,
    /// or the initial user-node save rejected.
    ///
    /// Reconciliation is local-authoritative: after streaming, a failed
    /// durable save keeps the in-memory content and completes the cycle
    /// (the node keeps its `local-` id).
    pub async fn send(
        &mut self,
        request: SendRequest,
        transport: &dyn ChatTransport,
        store: &dyn ChatStore,
        cancel: &CancelToken,
        mut on_event: impl FnMut(ChatEvent) + Send,
    ) -> Result<SendOutcome> {
        if self.nodes.ephemeral_id().is_some() {
            return Err(Error::session("a send is already in flight"));
        }
        let was_empty = self.nodes.is_empty();
        self.set_phase(SendPhase::Sending, &mut on_event);

        // 1. Durable anchor first: persist the user turn before the AI call.
        let user_draft = NodeDraft {
            parent_id: self.active_node_id.clone(),
            role: Role::User,
            content: request.text.clone(),
            suggested_animation: None,
            pdf_attachments: request.pdf_attachments.clone(),
        };
        let user_node = match store.save_node(&self.meta.id, user_draft).await {
            Ok(node) => node,
            Err(e) => {
                self.set_phase(SendPhase::Errored, &mut on_event);
                return Err(e);
            }
        };
        let user_id = user_node.id.clone();
        self.nodes.append(user_node)?;
        self.active_node_id = Some(user_id.clone());
        on_event(ChatEvent::NodeAdded {
            node_id: user_id.clone(),
        });

        // First exchange: derive a cheap title now; a refined one may follow.
        if was_empty && !self.user_renamed {
            let title = derive_title(&request.text);
            self.meta.title = title.clone();
            on_event(ChatEvent::TitleChanged {
                title: title.clone(),
            });
            if let Err(e) = store.rename_chat(&self.meta.id, &title).await {
                tracing::warn!(chat = %self.meta.id, error = %e, "derived title not persisted");
            }
        }

        // 2. Outgoing history = the active branch.
        let branch = active_branch(self.nodes.nodes(), self.active_node_id.as_deref());
        let wire = ChatRequest {
            messages: branch.iter().map(|n| WireMessage::from(*n)).collect(),
            branch_path: branch.iter().map(|n| n.id.clone()).collect(),
            workspace_context: request.workspace_context.clone(),
            mode: request.mode.clone(),
        };

        // 3. The single ephemeral node renders during streaming.
        let local_id = generate_local_id();
        self.nodes.append_ephemeral(ChatNode {
            id: local_id.clone(),
            parent_id: Some(user_id.clone()),
            role: Role::Assistant,
            content: String::new(),
            created_at: now_millis(),
            suggested_animation: None,
            pdf_attachments: None,
        })?;
        self.active_node_id = Some(local_id.clone());
        on_event(ChatEvent::NodeAdded {
            node_id: local_id.clone(),
        });

        self.set_phase(SendPhase::Streaming, &mut on_event);
        let mut stream = match transport.stream_chat(&wire).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(chat = %self.meta.id, error = %e, "completion request failed");
                return self.fail_send(&user_id, store, &mut on_event).await;
            }
        };

        // 4-6. Consume frames until a terminal one.
        loop {
            if cancel.is_cancelled() {
                tracing::debug!(chat = %self.meta.id, "stream cancelled");
                return self.fail_send(&user_id, store, &mut on_event).await;
            }
            match stream.next().await {
                Some(Ok(StreamFrame::Chunk { content })) => {
                    self.nodes.append_ephemeral_content(&content)?;
                    on_event(ChatEvent::Chunk {
                        node_id: local_id.clone(),
                        delta: content,
                    });
                }
                Some(Ok(StreamFrame::Done {
                    content,
                    suggested_animation,
                    ..
                })) => {
                    return self
                        .finalize_send(&user_id, content, suggested_animation, store, &mut on_event)
                        .await;
                }
                Some(Ok(StreamFrame::Error { content })) => {
                    tracing::warn!(chat = %self.meta.id, message = %content, "error frame");
                    return self.fail_send(&user_id, store, &mut on_event).await;
                }
                Some(Err(e)) => {
                    tracing::warn!(chat = %self.meta.id, error = %e, "stream failed");
                    return self.fail_send(&user_id, store, &mut on_event).await;
                }
                None => {
                    tracing::warn!(chat = %self.meta.id, "stream ended without terminal frame");
                    return self.fail_send(&user_id, store, &mut on_event).await;
                }
            }
        }
    }

    /// Terminal `done`: persist the final reply and swap out the ephemeral
    /// node. The `done` content is authoritative over accumulated chunks
    /// (the backend may strip trailing markers from the final text).
    async fn finalize_send(
        &mut self,
        user_id: &str,
        content: String,
        suggested_animation: Option<crate::node::AnimationSuggestion>,
        store: &dyn ChatStore,
        on_event: &mut (impl FnMut(ChatEvent) + Send),
    ) -> Result<SendOutcome> {
        self.set_phase(SendPhase::Finalizing, on_event);
        let draft = NodeDraft {
            parent_id: Some(user_id.to_string()),
            role: Role::Assistant,
            content: content.clone(),
            suggested_animation,
            pdf_attachments: None,
        };
        let (final_node_id, persisted) = match store.save_node(&self.meta.id, draft).await {
            Ok(persisted_node) => {
                let id = persisted_node.id.clone();
                self.nodes.replace_ephemeral(persisted_node)?;
                (id, true)
            }
            Err(e) => {
                // Local-authoritative: keep the streamed content in memory.
                tracing::warn!(chat = %self.meta.id, error = %e, "final reply not persisted; keeping local node");
                let id = self.nodes.finalize_ephemeral_local(content)?;
                (id, false)
            }
        };
        self.active_node_id = Some(final_node_id.clone());
        self.set_phase(SendPhase::Complete, on_event);
        Ok(SendOutcome {
            final_node_id,
            errored: false,
            persisted,
        })
    }

    /// Error path: drop the ephemeral node, insert the synthetic reply.
    async fn fail_send(
        &mut self,
        user_id: &str,
        store: &dyn ChatStore,
        on_event: &mut (impl FnMut(ChatEvent) + Send),
    ) -> Result<SendOutcome> {
        self.nodes.remove_ephemeral()?;
        let draft = NodeDraft::text(Some(user_id.to_string()), Role::Assistant, ERROR_REPLY);
        let (node, persisted) = match store.save_node(&self.meta.id, draft).await {
            Ok(node) => (node, true),
            Err(e) => {
                tracing::warn!(chat = %self.meta.id, error = %e, "synthetic reply not persisted; keeping local node");
                let draft =
                    NodeDraft::text(Some(user_id.to_string()), Role::Assistant, ERROR_REPLY);
                (draft.into_node(generate_local_id(), now_millis()), false)
            }
        };
        let node_id = node.id.clone();
        self.nodes.append(node)?;
        self.active_node_id = Some(node_id.clone());
        on_event(ChatEvent::NodeAdded {
            node_id: node_id.clone(),
        });
        self.set_phase(SendPhase::Errored, on_event);
        Ok(SendOutcome {
            final_node_id: node_id,
            errored: true,
            persisted,
        })
    }

    fn set_phase(&mut self, phase: SendPhase, on_event: &mut impl FnMut(ChatEvent)) {
        self.phase = phase;
        on_event(ChatEvent::Phase(phase));
    }
}
