//! Shared test doubles: a scripted transport and a fault-injecting store.

#![allow(dead_code)]

use async_trait::async_trait;
use mimir_chat::chat_store::{ChatStore, MemoryChatStore};
use mimir_chat::error::{Error, Result};
use mimir_chat::frame::StreamFrame;
use mimir_chat::node::{ChatMeta, ChatNode, NodeDraft};
use mimir_chat::transport::{ChatRequest, ChatTransport, FrameStream};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Transport that plays back pre-scripted frame sequences, one script per
/// `stream_chat` call, and records every request it sees.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Vec<Result<StreamFrame>>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the frames for the next call.
    pub fn script(&self, frames: Vec<Result<StreamFrame>>) {
        self.scripts.lock().unwrap().push_back(frames);
    }

    /// Convenience: chunks followed by a `done` with the final text.
    pub fn script_reply(&self, chunks: &[&str], final_text: &str) {
        let mut frames: Vec<Result<StreamFrame>> = chunks
            .iter()
            .map(|c| {
                Ok(StreamFrame::Chunk {
                    content: (*c).to_string(),
                })
            })
            .collect();
        frames.push(Ok(StreamFrame::Done {
            content: final_text.to_string(),
            suggested_animation: None,
            node_id: None,
        }));
        self.script(frames);
    }

    /// Requests observed so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<FrameStream> {
        self.requests.lock().unwrap().push(request.clone());
        let frames = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::transport("no scripted response"))?;
        Ok(Box::pin(futures::stream::iter(frames)))
    }
}

/// Store wrapper that can be told to reject saves or renames.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryChatStore,
    fail_save: AtomicBool,
    fail_rename: AtomicBool,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_save.store(fail, Ordering::Relaxed);
    }

    pub fn fail_renames(&self, fail: bool) {
        self.fail_rename.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl ChatStore for FaultyStore {
    async fn create_chat(&self) -> Result<ChatMeta> {
        self.inner.create_chat().await
    }

    async fn load_nodes(&self, chat_id: &str) -> Result<Vec<ChatNode>> {
        self.inner.load_nodes(chat_id).await
    }

    async fn save_node(&self, chat_id: &str, draft: NodeDraft) -> Result<ChatNode> {
        if self.fail_save.load(Ordering::Relaxed) {
            return Err(Error::persistence("injected save failure"));
        }
        self.inner.save_node(chat_id, draft).await
    }

    async fn rename_chat(&self, chat_id: &str, title: &str) -> Result<()> {
        if self.fail_rename.load(Ordering::Relaxed) {
            return Err(Error::persistence("injected rename failure"));
        }
        self.inner.rename_chat(chat_id, title).await
    }

    async fn list_chats(&self) -> Result<Vec<ChatMeta>> {
        self.inner.list_chats().await
    }
}
