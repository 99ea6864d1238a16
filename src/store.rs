//! Append-only per-session node store.
//!
//! One [`NodeStore`] holds the flat node list for a single session, plus an
//! id index for O(1) lookup. Appends are the only growth operation; the one
//! sanctioned in-place mutation is streaming text into the ephemeral node,
//! and the one sanctioned replacement is swapping that ephemeral node for
//! its persisted counterpart.

use crate::error::{Error, Result};
use crate::node::ChatNode;
use std::collections::HashMap;

/// Flat, append-only collection of a session's nodes.
#[derive(Debug, Default)]
pub struct NodeStore {
    nodes: Vec<ChatNode>,
    index: HashMap<String, usize>,
    /// Id of the single in-flight ephemeral node, if any.
    ephemeral_id: Option<String>,
}

impl NodeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from nodes loaded out of the durable store.
    ///
    /// Later duplicates of an id are dropped with a warning rather than
    /// rejected, so a damaged remote history still loads.
    pub fn from_nodes(loaded: Vec<ChatNode>) -> Self {
        let mut store = Self::new();
        for node in loaded {
            if store.index.contains_key(&node.id) {
                tracing::warn!(id = %node.id, "dropping duplicate node id on load");
                continue;
            }
            store.index.insert(node.id.clone(), store.nodes.len());
            store.nodes.push(node);
        }
        store
    }

    /// All nodes in append order.
    pub fn nodes(&self) -> &[ChatNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by id.
    pub fn get(&self, id: &str) -> Option<&ChatNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Id of the in-flight ephemeral node, if one exists.
    pub fn ephemeral_id(&self) -> Option<&str> {
        self.ephemeral_id.as_deref()
    }

    /// Append a persisted (durable) node.
    pub fn append(&mut self, node: ChatNode) -> Result<()> {
        if self.index.contains_key(&node.id) {
            return Err(Error::session(format!("duplicate node id: {}", node.id)));
        }
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    /// Append the session's single ephemeral node.
    ///
    /// At most one ephemeral node may exist at a time; a second append is a
    /// session error, not a silent replacement.
    pub fn append_ephemeral(&mut self, node: ChatNode) -> Result<()> {
        if let Some(existing) = &self.ephemeral_id {
            return Err(Error::session(format!(
                "ephemeral node already in flight: {existing}"
            )));
        }
        let id = node.id.clone();
        self.append(node)?;
        self.ephemeral_id = Some(id);
        Ok(())
    }

    /// Append streamed text to the ephemeral node's content in place.
    ///
    /// Monotonic: content only ever grows until the node is finalized.
    pub fn append_ephemeral_content(&mut self, delta: &str) -> Result<()> {
        let id = self
            .ephemeral_id
            .clone()
            .ok_or_else(|| Error::session("no ephemeral node to stream into"))?;
        let idx = self.index[&id];
        self.nodes[idx].content.push_str(delta);
        Ok(())
    }

    /// Atomically replace the ephemeral node with its persisted counterpart.
    ///
    /// The replacement occupies the same position and must carry the same
    /// `parent_id`, so branch length and sibling order are unaffected; only
    /// the node's identity and content change.
    pub fn replace_ephemeral(&mut self, persisted: ChatNode) -> Result<()> {
        let old_id = self
            .ephemeral_id
            .take()
            .ok_or_else(|| Error::session("no ephemeral node to replace"))?;
        let idx = self.index[&old_id];
        if persisted.parent_id != self.nodes[idx].parent_id {
            self.ephemeral_id = Some(old_id);
            return Err(Error::session("persisted node changed parent"));
        }
        if persisted.id != old_id && self.index.contains_key(&persisted.id) {
            self.ephemeral_id = Some(old_id);
            return Err(Error::session(format!(
                "duplicate node id: {}",
                persisted.id
            )));
        }
        self.index.remove(&old_id);
        self.index.insert(persisted.id.clone(), idx);
        self.nodes[idx] = persisted;
        Ok(())
    }

    /// Finalize the ephemeral node in place, keeping its local id.
    ///
    /// Used by the local-authoritative reconciliation path when the durable
    /// save of the final assistant turn fails: the streamed content stands.
    pub fn finalize_ephemeral_local(&mut self, content: String) -> Result<String> {
        let id = self
            .ephemeral_id
            .take()
            .ok_or_else(|| Error::session("no ephemeral node to finalize"))?;
        let idx = self.index[&id];
        self.nodes[idx].content = content;
        Ok(id)
    }

    /// Remove the ephemeral node entirely (error path).
    pub fn remove_ephemeral(&mut self) -> Result<ChatNode> {
        let id = self
            .ephemeral_id
            .take()
            .ok_or_else(|| Error::session("no ephemeral node to remove"))?;
        let idx = self.index.remove(&id).ok_or_else(|| Error::dangling(id))?;
        let removed = self.nodes.remove(idx);
        for slot in self.index.values_mut() {
            if *slot > idx {
                *slot -= 1;
            }
        }
        Ok(removed)
    }

    /// Drop all nodes and the ephemeral slot.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
        self.ephemeral_id = None;
    }
}
