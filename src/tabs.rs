//! Multi-session tab manager.
//!
//! Tracks the set of currently open sessions, which one is live, and one
//! [`ChatController`] per open tab so independent sessions can stream
//! concurrently. Focusing a tab reloads its nodes from the durable store;
//! closing the last tab clears all conversation state and deliberately does
//! not create a replacement session. Every tab-list change is mirrored to
//! the [`TabCache`].

use crate::chat_store::ChatStore;
use crate::controller::{CancelToken, ChatController};
use crate::error::Result;
use crate::node::ChatMeta;
use crate::tab_cache::{CachedTab, CachedTabs, TabCache};
use std::collections::HashMap;

/// One open tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tab {
    pub id: String,
    pub title: String,
}

/// The set of open sessions and the pointer to the live one.
#[derive(Debug, Default)]
pub struct TabManager {
    /// Open tabs in opening order; the last entry is the most recent.
    tabs: Vec<Tab>,
    active: Option<String>,
    controllers: HashMap<String, ChatController>,
    cancels: HashMap<String, CancelToken>,
    cache: Option<TabCache>,
}

impl TabManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// A manager whose tab list is mirrored to `cache` on every change.
    pub fn with_cache(cache: TabCache) -> Self {
        Self {
            cache: Some(cache),
            ..Self::default()
        }
    }

    /// Rebuild the tab bar from the cache, then reload the cached active
    /// session's nodes from the store. Cached titles are used as-is so the
    /// bar renders without a listing round trip; a session that no longer
    /// loads is dropped from the bar with a warning.
    pub async fn restore(&mut self, store: &dyn ChatStore) -> Result<()> {
        let Some(cache) = self.cache.clone() else {
            return Ok(());
        };
        let cached = cache.load().await;
        for tab in cached.open_tabs {
            self.tabs.push(Tab {
                id: tab.id,
                title: tab.title,
            });
        }
        if let Some(active) = cached.active_session_id {
            if self.tabs.iter().any(|t| t.id == active) {
                if let Err(e) = self.focus(&active, store).await {
                    tracing::warn!(chat = %active, error = %e, "cached active session failed to load");
                    self.remove_tab(&active);
                    self.active = None;
                }
            }
        }
        self.save_cache().await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn active_session_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Controller of the live session, if any.
    pub fn active_controller(&mut self) -> Option<&mut ChatController> {
        let id = self.active.clone()?;
        self.controllers.get_mut(&id)
    }

    /// Controller of any open session (for background streaming).
    pub fn controller(&mut self, chat_id: &str) -> Option<&mut ChatController> {
        self.controllers.get_mut(chat_id)
    }

    /// Cancellation token tied to an open session's lifetime.
    pub fn cancel_token(&self, chat_id: &str) -> Option<CancelToken> {
        self.cancels.get(chat_id).cloned()
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Open a session as a new tab, or focus it if already open. Either way
    /// the session's nodes are reloaded from the durable store.
    pub async fn open_or_focus(&mut self, chat_id: &str, store: &dyn ChatStore) -> Result<()> {
        if !self.tabs.iter().any(|t| t.id == chat_id) {
            let title = store
                .list_chats()
                .await?
                .into_iter()
                .find(|m| m.id == chat_id)
                .map(|m| m.title)
                .unwrap_or_else(|| "New chat".to_string());
            self.tabs.push(Tab {
                id: chat_id.to_string(),
                title,
            });
        }
        self.focus(chat_id, store).await?;
        self.save_cache().await;
        Ok(())
    }

    /// Create a fresh session, open it as a tab, and focus it.
    pub async fn new_session(&mut self, store: &dyn ChatStore) -> Result<ChatMeta> {
        let meta = store.create_chat().await?;
        self.tabs.push(Tab {
            id: meta.id.clone(),
            title: meta.title.clone(),
        });
        self.controllers
            .insert(meta.id.clone(), ChatController::new(meta.clone()));
        self.cancels
            .insert(meta.id.clone(), CancelToken::new());
        self.active = Some(meta.id.clone());
        self.save_cache().await;
        Ok(meta)
    }

    /// Close a tab. An in-flight stream for that session is cancelled. If
    /// the closed tab was live, the most recently opened remaining tab takes
    /// over (with a fresh node reload); with no tabs left, all conversation
    /// state clears — no replacement session is created.
    pub async fn close(&mut self, chat_id: &str, store: &dyn ChatStore) -> Result<()> {
        if let Some(cancel) = self.cancels.remove(chat_id) {
            cancel.cancel();
        }
        self.remove_tab(chat_id);
        self.controllers.remove(chat_id);

        if self.active.as_deref() == Some(chat_id) {
            self.active = None;
            if let Some(next) = self.tabs.last().map(|t| t.id.clone()) {
                if let Err(e) = self.focus(&next, store).await {
                    tracing::warn!(chat = %next, error = %e, "failed to load next tab after close");
                }
            }
        }
        self.save_cache().await;
        Ok(())
    }

    /// Rename a session: tab bar, controller (marking the explicit rename so
    /// derived titles stop applying), durable store, cache.
    pub async fn rename(&mut self, chat_id: &str, title: &str, store: &dyn ChatStore) -> Result<()> {
        if let Some(tab) = self.tabs.iter_mut().find(|t| t.id == chat_id) {
            tab.title = title.to_string();
        }
        if let Some(controller) = self.controllers.get_mut(chat_id) {
            controller.rename(title);
        }
        store.rename_chat(chat_id, title).await?;
        self.save_cache().await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Make `chat_id` live: full node reload, fresh branch state.
    async fn focus(&mut self, chat_id: &str, store: &dyn ChatStore) -> Result<()> {
        let nodes = store.load_nodes(chat_id).await?;
        let title = self
            .tabs
            .iter()
            .find(|t| t.id == chat_id)
            .map(|t| t.title.clone())
            .unwrap_or_else(|| "New chat".to_string());
        // The engine only needs id + title here; created_at is unknown for a
        // reloaded session and unused past listing.
        let meta = ChatMeta {
            id: chat_id.to_string(),
            title: title.clone(),
            created_at: 0,
        };
        let was_renamed = self
            .controllers
            .get(chat_id)
            .is_some_and(ChatController::user_renamed);
        let mut controller = ChatController::from_loaded(meta, nodes);
        if was_renamed {
            // keep the rename guard across the reload
            controller.rename(title);
        }
        self.controllers.insert(chat_id.to_string(), controller);
        self.cancels
            .entry(chat_id.to_string())
            .or_insert_with(CancelToken::new);
        self.active = Some(chat_id.to_string());
        Ok(())
    }

    fn remove_tab(&mut self, chat_id: &str) {
        self.tabs.retain(|t| t.id != chat_id);
    }

    async fn save_cache(&self) {
        let Some(cache) = &self.cache else {
            return;
        };
        let state = CachedTabs {
            open_tabs: self
                .tabs
                .iter()
                .map(|t| CachedTab {
                    id: t.id.clone(),
                    title: t.title.clone(),
                })
                .collect(),
            active_session_id: self.active.clone(),
        };
        if let Err(e) = cache.save(&state).await {
            tracing::warn!(error = %e, "tab cache not written");
        }
    }
}
