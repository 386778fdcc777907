//! Revision trees: walking up to the root of a paste's tree and collecting
//! every revision below it.

use std::collections::{HashSet, VecDeque};
use std::fmt::Write;

use tracing::{debug, warn};

use crate::models::Paste;
use crate::store::PasteStore;

/// A materialized revision tree. Nodes are stored flat in breadth-first
/// order with the root at index 0; `parent` and `children` are indices
/// into `nodes`.
#[derive(Debug, Clone)]
pub struct RevisionTree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub paste: Paste,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub depth: usize,
}

impl RevisionTree {
    pub fn root(&self) -> &Paste {
        &self.nodes[0].paste
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[cfg(test)]
    pub fn contains(&self, id: i64) -> bool {
        self.nodes.iter().any(|node| node.paste.id == id)
    }

    /// Node indices in depth-first pre-order, children in creation order.
    pub fn preorder(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![0];
        while let Some(index) = stack.pop() {
            order.push(index);
            stack.extend(self.nodes[index].children.iter().rev());
        }
        order
    }

    /// Render the tree as indented plain text, one paste per line, with
    /// `current` marked.
    pub fn render_text(&self, store: &PasteStore, current: Option<i64>) -> String {
        let mut out = String::new();
        for index in self.preorder() {
            let node = &self.nodes[index];
            let marker = if Some(node.paste.id) == current { "*" } else { "-" };
            // writing to a String cannot fail
            let _ = writeln!(
                out,
                "{indent}{marker} {id} [{language}] {created}",
                indent = "  ".repeat(node.depth),
                id = store.identifier(&node.paste),
                language = node.paste.language,
                created = node.paste.created_at.format("%Y-%m-%d %H:%M:%S"),
            );
        }
        out
    }
}

/// Find the root of the tree containing the paste named by `identifier`.
///
/// The walk stops at a paste without a parent, or at the last paste whose
/// parent no longer exists. Returns `None` only when the identifier itself
/// does not resolve.
pub async fn resolve_root(
    store: &mut PasteStore,
    identifier: &str,
) -> crate::AppResult<Option<Paste>> {
    let Some(start) = store.get(identifier).await? else {
        return Ok(None);
    };
    resolve_root_of(store, start).await.map(Some)
}

/// Walk `parent_id` links upward from `start`.
pub async fn resolve_root_of(store: &mut PasteStore, start: Paste) -> crate::AppResult<Paste> {
    let mut visited = HashSet::from([start.id]);
    let mut current = start;

    while let Some(parent_id) = current.parent_id {
        if !visited.insert(parent_id) {
            warn!("cycle in revision links at paste {parent_id}, stopping");
            break;
        }
        match store.get_by_id(parent_id).await? {
            Some(parent) => current = parent,
            None => {
                debug!(
                    "paste '{id}' has a dangling parent, treating it as the root",
                    id = store.identifier(&current)
                );
                break;
            }
        }
    }

    Ok(current)
}

/// Collect every paste below `root`, breadth first, without recursion.
pub async fn build_tree(store: &mut PasteStore, root: Paste) -> crate::AppResult<RevisionTree> {
    let mut seen = HashSet::from([root.id]);
    let mut nodes = vec![TreeNode {
        paste: root,
        parent: None,
        children: Vec::new(),
        depth: 0,
    }];
    let mut queue = VecDeque::from([0usize]);

    while let Some(index) = queue.pop_front() {
        let children = store.children(&nodes[index].paste).await?;
        let depth = nodes[index].depth + 1;
        for child in children {
            if !seen.insert(child.id) {
                continue;
            }
            let child_index = nodes.len();
            nodes.push(TreeNode {
                paste: child,
                parent: Some(index),
                children: Vec::new(),
                depth,
            });
            nodes[index].children.push(child_index);
            queue.push_back(child_index);
        }
    }

    Ok(RevisionTree { nodes })
}
