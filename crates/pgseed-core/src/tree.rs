//! Arena-backed record of the categories inserted during one session.

use serde::Serialize;
use uuid::Uuid;

use crate::InsertedCategory;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub id: Uuid,
    pub name: String,
    /// Top-level categories sit at depth 1.
    pub depth: usize,
    pub children: Vec<usize>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryTree {
    nodes: Vec<TreeNode>,
    roots: Vec<usize>,
}

impl CategoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends top-level categories and returns their node handles.
    pub fn add_roots(&mut self, categories: &[InsertedCategory]) -> Vec<usize> {
        let handles = self.push_nodes(categories, 1);
        self.roots.extend(handles.iter().copied());
        handles
    }

    /// Appends children under `parent`. Unknown parents are ignored and yield no handles.
    pub fn add_children(&mut self, parent: usize, categories: &[InsertedCategory]) -> Vec<usize> {
        let Some(depth) = self.nodes.get(parent).map(|n| n.depth + 1) else {
            return Vec::new();
        };
        let handles = self.push_nodes(categories, depth);
        self.nodes[parent].children.extend(handles.iter().copied());
        handles
    }

    pub fn node(&self, handle: usize) -> Option<&TreeNode> {
        self.nodes.get(handle)
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    /// Indented pre-order listing, two spaces per level below the roots.
    pub fn render(&self) -> String {
        let mut lines = Vec::with_capacity(self.nodes.len());
        let mut stack = self.roots.iter().rev().copied().collect::<Vec<_>>();
        while let Some(handle) = stack.pop() {
            let node = &self.nodes[handle];
            lines.push(format!(
                "{}- {} ({})",
                "  ".repeat(node.depth.saturating_sub(1)),
                node.name,
                node.id
            ));
            stack.extend(node.children.iter().rev().copied());
        }
        lines.join("\n")
    }

    fn push_nodes(&mut self, categories: &[InsertedCategory], depth: usize) -> Vec<usize> {
        categories
            .iter()
            .map(|category| {
                self.nodes.push(TreeNode {
                    id: category.id,
                    name: category.name.clone(),
                    depth,
                    children: Vec::new(),
                });
                self.nodes.len() - 1
            })
            .collect()
    }
}
