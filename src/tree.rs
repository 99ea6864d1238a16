//! Forest construction for branch-navigation views.
//!
//! Turns a session's flat node list into one or more root subtrees. The
//! parent-pointer data comes from an eventually-consistent remote store, so
//! the builder validates rather than trusts: unresolvable parents make a
//! node an extra root, and nodes caught in a parent cycle are isolated as
//! synthetic roots instead of hanging the traversal. No input node is ever
//! dropped.

use crate::node::ChatNode;
use std::collections::{HashMap, HashSet};

/// A node placed in the forest, carrying its depth and ordered children.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub node: ChatNode,
    /// Distance from the subtree root; roots are depth 0.
    pub depth: usize,
    /// Children ordered by `(created_at, id)` ascending.
    pub children: Vec<TreeNode>,
}

/// Group nodes by `parent_id` into a deterministic forest.
///
/// Every input node appears exactly once in the output. Roots (and the
/// children of each node) are ordered by `(created_at, id)` ascending, so
/// sibling order is stable across rebuilds even when timestamps tie.
pub fn build_tree(nodes: &[ChatNode]) -> Vec<TreeNode> {
    let index: HashMap<&str, &ChatNode> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let mut children: HashMap<&str, Vec<&ChatNode>> = HashMap::new();
    let mut roots: Vec<&ChatNode> = Vec::new();
    for node in nodes {
        match node.parent_id.as_deref() {
            Some(parent) if index.contains_key(parent) => {
                children.entry(parent).or_default().push(node);
            }
            // Missing parent: orphan, promoted to root rather than dropped.
            _ => roots.push(node),
        }
    }
    for list in children.values_mut() {
        sort_siblings(list);
    }
    sort_siblings(&mut roots);

    let mut placed: HashSet<&str> = HashSet::new();
    let mut forest: Vec<TreeNode> = roots
        .iter()
        .map(|root| attach(root, 0, &children, &mut placed))
        .collect();

    // Anything still unplaced sits on a parent cycle. Isolate each cycle by
    // promoting its smallest member to a synthetic root.
    let mut leftovers: Vec<&ChatNode> = nodes.iter().filter(|n| !placed.contains(n.id.as_str())).collect();
    sort_siblings(&mut leftovers);
    for node in leftovers {
        if !placed.contains(node.id.as_str()) {
            forest.push(attach(node, 0, &children, &mut placed));
        }
    }
    forest
}

fn sort_siblings(list: &mut [&ChatNode]) {
    list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

fn attach<'a>(
    node: &'a ChatNode,
    depth: usize,
    children: &HashMap<&'a str, Vec<&'a ChatNode>>,
    placed: &mut HashSet<&'a str>,
) -> TreeNode {
    placed.insert(node.id.as_str());
    let kids = children
        .get(node.id.as_str())
        .map(|list| {
            list.iter()
                .filter(|child| !placed.contains(child.id.as_str()))
                .copied()
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    TreeNode {
        node: node.clone(),
        depth,
        children: kids
            .into_iter()
            .map(|child| attach(child, depth + 1, children, placed))
            .collect(),
    }
}

/// Total number of nodes in a forest.
pub fn count_nodes(forest: &[TreeNode]) -> usize {
    forest.iter().map(|t| 1 + count_nodes(&t.children)).sum()
}
