//! Durable chat store contract and implementations.
//!
//! The engine treats persistence as an external collaborator behind the
//! [`ChatStore`] trait: it persists a finalized turn at most once, and it
//! receives back the store-assigned node (id + timestamp). Two
//! implementations ship with the crate: an in-memory store for tests and
//! fallback, and a JSONL store matching the on-disk session format — one
//! file per chat, a header line followed by one node per line.

use crate::error::{Error, Result};
use crate::node::{generate_node_id, now_millis, ChatMeta, ChatNode, NodeDraft};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

// ============================================================================
// Contract
// ============================================================================

/// Durable storage for chats and their nodes.
///
/// `save_node` is called at most once per finalized turn; the store assigns
/// the node's id and timestamp and returns the completed node.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Create a new, empty chat.
    async fn create_chat(&self) -> Result<ChatMeta>;

    /// Load every node of a chat, in persisted order.
    async fn load_nodes(&self, chat_id: &str) -> Result<Vec<ChatNode>>;

    /// Durably save one node and return it with store-assigned id/timestamp.
    async fn save_node(&self, chat_id: &str, draft: NodeDraft) -> Result<ChatNode>;

    /// Rename a chat.
    async fn rename_chat(&self, chat_id: &str, title: &str) -> Result<()>;

    /// List all chats, most recently created first.
    async fn list_chats(&self) -> Result<Vec<ChatMeta>>;
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Default)]
struct MemoryChat {
    meta: ChatMeta,
    nodes: Vec<ChatNode>,
}

/// In-memory [`ChatStore`]; state lives for the process only.
#[derive(Debug, Default)]
pub struct MemoryChatStore {
    chats: Mutex<HashMap<String, MemoryChat>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn create_chat(&self) -> Result<ChatMeta> {
        let meta = ChatMeta::new();
        let mut chats = self.chats.lock().await;
        chats.insert(
            meta.id.clone(),
            MemoryChat {
                meta: meta.clone(),
                nodes: Vec::new(),
            },
        );
        Ok(meta)
    }

    async fn load_nodes(&self, chat_id: &str) -> Result<Vec<ChatNode>> {
        let chats = self.chats.lock().await;
        let chat = chats
            .get(chat_id)
            .ok_or_else(|| Error::SessionNotFound { id: chat_id.into() })?;
        Ok(chat.nodes.clone())
    }

    async fn save_node(&self, chat_id: &str, draft: NodeDraft) -> Result<ChatNode> {
        let mut chats = self.chats.lock().await;
        let chat = chats
            .get_mut(chat_id)
            .ok_or_else(|| Error::SessionNotFound { id: chat_id.into() })?;
        let existing: HashSet<String> = chat.nodes.iter().map(|n| n.id.clone()).collect();
        let node = draft.into_node(generate_node_id(&existing), now_millis());
        chat.nodes.push(node.clone());
        Ok(node)
    }

    async fn rename_chat(&self, chat_id: &str, title: &str) -> Result<()> {
        let mut chats = self.chats.lock().await;
        let chat = chats
            .get_mut(chat_id)
            .ok_or_else(|| Error::SessionNotFound { id: chat_id.into() })?;
        chat.meta.title = title.to_string();
        Ok(())
    }

    async fn list_chats(&self) -> Result<Vec<ChatMeta>> {
        let chats = self.chats.lock().await;
        let mut metas: Vec<ChatMeta> = chats.values().map(|c| c.meta.clone()).collect();
        metas.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(metas)
    }
}

// ============================================================================
// JSONL store
// ============================================================================

/// File-backed [`ChatStore`]: one `<chat-id>.jsonl` per chat under a root
/// directory. Line 1 is the [`ChatMeta`] header; each further line is one
/// node. Unparseable node lines are skipped with a warning so a damaged
/// file still loads.
#[derive(Debug, Clone)]
pub struct JsonlChatStore {
    root: PathBuf,
}

impl JsonlChatStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn chat_path(&self, chat_id: &str) -> PathBuf {
        // chat ids are UUIDs we minted; keep path construction defensive anyway
        let safe: String = chat_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect();
        self.root.join(format!("{safe}.jsonl"))
    }

    async fn read_chat(&self, chat_id: &str) -> Result<(ChatMeta, Vec<ChatNode>)> {
        let path = self.chat_path(chat_id);
        if !path.exists() {
            return Err(Error::SessionNotFound { id: chat_id.into() });
        }
        let content = tokio::fs::read_to_string(&path).await?;
        parse_chat_file(&content, &path)
    }

    async fn write_chat(&self, meta: &ChatMeta, nodes: &[ChatNode]) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let mut content = String::new();
        content.push_str(&serde_json::to_string(meta)?);
        content.push('\n');
        for node in nodes {
            content.push_str(&serde_json::to_string(node)?);
            content.push('\n');
        }
        tokio::fs::write(self.chat_path(&meta.id), content).await?;
        Ok(())
    }
}

fn parse_chat_file(content: &str, path: &Path) -> Result<(ChatMeta, Vec<ChatNode>)> {
    let mut lines = content.lines();
    let meta: ChatMeta = lines
        .next()
        .map(serde_json::from_str)
        .transpose()?
        .ok_or_else(|| Error::persistence(format!("empty chat file: {}", path.display())))?;

    let mut nodes = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ChatNode>(line) {
            Ok(node) => nodes.push(node),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping bad node line"),
        }
    }
    Ok((meta, nodes))
}

#[async_trait]
impl ChatStore for JsonlChatStore {
    async fn create_chat(&self) -> Result<ChatMeta> {
        let meta = ChatMeta::new();
        self.write_chat(&meta, &[]).await?;
        Ok(meta)
    }

    async fn load_nodes(&self, chat_id: &str) -> Result<Vec<ChatNode>> {
        let (_, nodes) = self.read_chat(chat_id).await?;
        Ok(nodes)
    }

    async fn save_node(&self, chat_id: &str, draft: NodeDraft) -> Result<ChatNode> {
        let (meta, mut nodes) = self.read_chat(chat_id).await?;
        let existing: HashSet<String> = nodes.iter().map(|n| n.id.clone()).collect();
        let node = draft.into_node(generate_node_id(&existing), now_millis());
        nodes.push(node.clone());
        self.write_chat(&meta, &nodes).await?;
        Ok(node)
    }

    async fn rename_chat(&self, chat_id: &str, title: &str) -> Result<()> {
        let (mut meta, nodes) = self.read_chat(chat_id).await?;
        meta.title = title.to_string();
        self.write_chat(&meta, &nodes).await
    }

    async fn list_chats(&self) -> Result<Vec<ChatMeta>> {
        let mut metas = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(metas),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "jsonl") {
                continue;
            }
            let content = tokio::fs::read_to_string(&path).await?;
            match content
                .lines()
                .next()
                .map(serde_json::from_str::<ChatMeta>)
            {
                Some(Ok(meta)) => metas.push(meta),
                Some(Err(e)) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping bad chat header");
                }
                None => {}
            }
        }
        metas.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(metas)
    }
}
