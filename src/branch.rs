//! Active-branch reconstruction.
//!
//! A branch is the root-to-leaf path selected by `active_node_id`. It is
//! recomputed on demand from the flat node list: build the id index once,
//! walk parent pointers up to a root, reverse. Lookups that fail degrade to
//! an empty branch; this path must never take the session down because the
//! remote store served a stale or partial node set.

use crate::node::ChatNode;
use std::collections::{HashMap, HashSet};

/// Reconstruct the active branch in root-to-leaf order.
///
/// Returns an empty vec when `active_node_id` is `None`, does not resolve,
/// or the walk revisits an id (cyclic parent data).
pub fn active_branch<'a>(nodes: &'a [ChatNode], active_node_id: Option<&str>) -> Vec<&'a ChatNode> {
    let Some(leaf_id) = active_node_id else {
        return Vec::new();
    };
    let index: HashMap<&str, &ChatNode> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let mut chain: Vec<&ChatNode> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut cursor = index.get(leaf_id).copied();
    while let Some(node) = cursor {
        if !seen.insert(node.id.as_str()) {
            // Cyclic parent data; fail soft.
            return Vec::new();
        }
        chain.push(node);
        cursor = node
            .parent_id
            .as_deref()
            .and_then(|pid| index.get(pid).copied());
    }
    chain.reverse();
    chain
}

/// The active branch as a list of node ids only.
///
/// Always agrees in order and length with [`active_branch`] on the same
/// inputs; the backend uses this list to know which branch a new message
/// continues.
pub fn branch_path(nodes: &[ChatNode], node_id: Option<&str>) -> Vec<String> {
    active_branch(nodes, node_id)
        .into_iter()
        .map(|n| n.id.clone())
        .collect()
}
