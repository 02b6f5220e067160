//! The usage tree as an arena.
//!
//! Nodes are addressed by `NodeId` and never move in the arena; removing a
//! node only unlinks it. Children of a removed node keep a parent link that
//! no longer resolves, and such a dangling parent reads as "no parent".

use std::collections::HashMap;

use olx_core::{Error, Result, UsageKey};

/// Opaque index of a node in a `UsageTree`.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Clone, Debug)]
struct Node {
    usage: UsageKey,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    removed: bool,
}

/// Parent/child structure of the usages in one course.
#[derive(Clone, Debug, Default)]
pub struct UsageTree {
    nodes: Vec<Node>,
    index: HashMap<UsageKey, NodeId>,
}

impl UsageTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a usage with no parent.
    pub fn insert_root(&mut self, usage: UsageKey) -> Result<NodeId> {
        self.push(usage, None)
    }

    /// Add a usage as the last child of `parent`.
    pub fn insert_child(&mut self, parent: NodeId, usage: UsageKey) -> Result<NodeId> {
        self.live(parent)?;
        let id = self.push(usage, Some(parent))?;
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    fn push(&mut self, usage: UsageKey, parent: Option<NodeId>) -> Result<NodeId> {
        if self.index.contains_key(&usage) {
            return Err(Error::DuplicateUsage { usage });
        }
        let id = NodeId(self.nodes.len());
        self.index.insert(usage.clone(), id);
        self.nodes.push(Node {
            usage,
            parent,
            children: Vec::new(),
            removed: false,
        });
        Ok(id)
    }

    fn live(&self, id: NodeId) -> Result<&Node> {
        match self.nodes.get(id.0) {
            Some(node) if !node.removed => Ok(node),
            Some(node) => Err(Error::UnknownUsage {
                usage: node.usage.clone(),
            }),
            None => Err(Error::Other {
                message: format!("node {} is not part of this tree", id.0),
            }),
        }
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).filter(|node| !node.removed)
    }

    pub fn get(&self, usage: &UsageKey) -> Option<NodeId> {
        self.index.get(usage).copied()
    }

    pub fn contains(&self, usage: &UsageKey) -> bool {
        self.index.contains_key(usage)
    }

    pub fn usage(&self, id: NodeId) -> Option<&UsageKey> {
        self.node(id).map(|node| &node.usage)
    }

    /// The parent of a node, or `None` at a root or a dangling link.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.node(id)?.parent?;
        self.node(parent).map(|_| parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map_or(&[], |node| node.children.as_slice())
    }

    /// Parent usage of a usage, resolved through the index.
    pub fn parent_usage(&self, usage: &UsageKey) -> Option<&UsageKey> {
        let id = self.get(usage)?;
        self.parent(id).and_then(|parent| self.usage(parent))
    }

    /// Child usages of a usage, in order.
    pub fn child_usages(&self, usage: &UsageKey) -> Vec<UsageKey> {
        let Some(id) = self.get(usage) else {
            return Vec::new();
        };
        self.children(id)
            .iter()
            .filter_map(|child| self.usage(*child).cloned())
            .collect()
    }

    /// Walk from a node's parent up to its root.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.parent(id),
        }
    }

    /// Every node below `id`, in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Nodes without a live parent.
    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len())
            .map(NodeId)
            .filter(|id| self.node(*id).is_some() && self.parent(*id).is_none())
    }

    /// Re-parent `id` under `new_parent` at `position` (appended if `None`).
    ///
    /// The node is unlinked from its old parent first. Fails with `Cycle` if
    /// `new_parent` is `id` or one of its descendants.
    pub fn move_child(
        &mut self,
        id: NodeId,
        new_parent: NodeId,
        position: Option<usize>,
    ) -> Result<()> {
        let usage = self.live(id)?.usage.clone();
        let parent_usage = self.live(new_parent)?.usage.clone();

        let creates_cycle =
            id == new_parent || self.ancestors(new_parent).any(|ancestor| ancestor == id);
        if creates_cycle {
            return Err(Error::Cycle {
                usage,
                parent: parent_usage,
            });
        }

        if let Some(old) = self.nodes[id.0].parent {
            self.nodes[old.0].children.retain(|child| *child != id);
        }
        let siblings = &mut self.nodes[new_parent.0].children;
        let at = position.unwrap_or(siblings.len()).min(siblings.len());
        siblings.insert(at, id);
        self.nodes[id.0].parent = Some(new_parent);
        Ok(())
    }

    /// Unlink a node from the tree. Its children are left with a dangling
    /// parent and become roots.
    pub fn remove(&mut self, id: NodeId) -> Result<UsageKey> {
        let usage = self.live(id)?.usage.clone();
        if let Some(parent) = self.nodes[id.0].parent {
            self.nodes[parent.0].children.retain(|child| *child != id);
        }
        self.nodes[id.0].removed = true;
        self.index.remove(&usage);
        Ok(usage)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Iterator over the ancestors of a node, nearest first.
pub struct Ancestors<'a> {
    tree: &'a UsageTree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.tree.parent(current);
        Some(current)
    }
}
