//! Weighted call tree.
//!
//! Stacks are inserted root-first. Every node carries the weight of the
//! stacks ending at it (`self_value`) and of all stacks passing through it
//! (`total`).

use indextree::{Arena, NodeEdge, NodeId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub name: Box<str>,
    pub self_value: u64,
    pub total: u64,
}

#[derive(Debug, Clone)]
pub struct CallTree {
    arena: Arena<Frame>,
    root: NodeId,
}

impl Default for CallTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CallTree {
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(Frame::default());
        Self { arena, root }
    }

    /// Add `value` along the root-to-leaf path `stack`. Weights saturate at
    /// `u64::MAX`.
    pub fn insert_stack<I>(&mut self, stack: I, value: u64)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut node = self.root;
        self.add_total(node, value);
        for name in stack {
            node = self.child_or_insert(node, name.as_ref());
            self.add_total(node, value);
        }
        let frame = self.arena[node].get_mut();
        frame.self_value = frame.self_value.saturating_add(value);
    }

    /// Add every stack of `other` into `self`.
    pub fn merge(&mut self, other: &CallTree) {
        other.for_each_stack(|path, value| self.insert_stack(path, value));
    }

    fn add_total(&mut self, node: NodeId, value: u64) {
        let frame = self.arena[node].get_mut();
        frame.total = frame.total.saturating_add(value);
    }

    fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        parent
            .children(&self.arena)
            .find(|&child| &*self.arena[child].get().name == name)
    }

    fn child_or_insert(&mut self, parent: NodeId, name: &str) -> NodeId {
        if let Some(child) = self.child(parent, name) {
            return child;
        }
        let child = self.arena.new_node(Frame {
            name: name.into(),
            ..Default::default()
        });
        parent.append(child, &mut self.arena);
        child
    }

    fn find(&self, path: &[&str]) -> Option<NodeId> {
        path.iter()
            .try_fold(self.root, |node, name| self.child(node, name))
    }

    /// Sum of all inserted weight.
    pub fn total(&self) -> u64 {
        self.arena[self.root].get().total
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Weight of stacks ending exactly at `path`.
    pub fn self_value(&self, path: &[&str]) -> u64 {
        self.find(path)
            .map_or(0, |node| self.arena[node].get().self_value)
    }

    /// Weight of stacks passing through `path`.
    pub fn total_value(&self, path: &[&str]) -> u64 {
        self.find(path).map_or(0, |node| self.arena[node].get().total)
    }

    /// Visit every stack with a nonzero self weight, root-first.
    pub fn for_each_stack(&self, mut f: impl FnMut(&[&str], u64)) {
        let mut path: Vec<&str> = Vec::new();
        for edge in self.root.traverse(&self.arena) {
            match edge {
                NodeEdge::Start(node) => {
                    let frame = self.arena[node].get();
                    if node != self.root {
                        path.push(&frame.name);
                    }
                    if frame.self_value > 0 {
                        f(&path[..], frame.self_value);
                    }
                }
                NodeEdge::End(node) => {
                    if node != self.root {
                        path.pop();
                    }
                }
            }
        }
    }

    /// `self` minus `older`, per stack, saturating at zero. Neither tree is
    /// modified.
    pub fn diff(&self, older: &CallTree) -> CallTree {
        let mut delta = CallTree::new();
        self.for_each_stack(|path, value| {
            let value = value.saturating_sub(older.self_value(path));
            if value > 0 {
                delta.insert_stack(path, value);
            }
        });
        delta
    }

    /// Folded stacks, one `a;b;c weight` line per stack, sorted.
    pub fn collapsed(&self) -> Vec<String> {
        let mut lines = Vec::new();
        self.for_each_stack(|path, value| lines.push(format!("{} {}", path.join(";"), value)));
        lines.sort();
        lines
    }
}
