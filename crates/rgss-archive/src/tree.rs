//! Virtual directory tree over the entry table.

use std::collections::btree_map::{BTreeMap, Entry};

use rgss_common::path;

use crate::entry::EntryRecord;
use crate::{Error, Result};

/// Index of a node in a [`VirtualTree`].
pub type NodeId = usize;

/// Kind of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum NodeKind {
    Directory,
    File,
}

/// A node of the tree.
#[derive(Debug, Clone)]
pub enum Node {
    Directory {
        name: String,
        parent: Option<NodeId>,
        children: BTreeMap<String, NodeId>,
    },
    File {
        name: String,
        parent: NodeId,
        /// Position in the accepted entry list.
        entry: usize,
    },
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Self::Directory { name, .. } | Self::File { name, .. } => name,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Directory { .. } => NodeKind::Directory,
            Self::File { .. } => NodeKind::File,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        match self {
            Self::Directory { parent, .. } => *parent,
            Self::File { parent, .. } => Some(*parent),
        }
    }
}

/// Directories and files of an archive, built from entry paths.
///
/// Nodes live in one arena; [`VirtualTree::ROOT`] is the unnamed root
/// directory. Children are kept sorted by name.
#[derive(Debug, Clone)]
pub struct VirtualTree {
    nodes: Vec<Node>,
}

impl Default for VirtualTree {
    fn default() -> Self {
        Self {
            nodes: vec![Node::Directory {
                name: String::new(),
                parent: None,
                children: BTreeMap::new(),
            }],
        }
    }
}

impl VirtualTree {
    pub const ROOT: NodeId = 0;

    /// Build the tree, creating intermediate directories on demand.
    ///
    /// Fails with [`Error::DuplicatePath`] when two entries share a path or a
    /// file and a directory claim the same name.
    pub fn build(entries: &[EntryRecord]) -> Result<Self> {
        let mut tree = Self::default();
        for (index, entry) in entries.iter().enumerate() {
            tree.insert(entry.path(), index)?;
        }
        Ok(tree)
    }

    fn insert(&mut self, full_path: &str, entry: usize) -> Result<()> {
        let conflict = || Error::DuplicatePath(full_path.to_string());
        let mut components = full_path.split(path::SEPARATOR).peekable();
        let mut current = Self::ROOT;

        while let Some(component) = components.next() {
            let is_last = components.peek().is_none();
            let next_id = self.nodes.len();

            let Node::Directory { children, .. } = &mut self.nodes[current] else {
                return Err(conflict());
            };

            match children.entry(component.to_string()) {
                Entry::Occupied(slot) => {
                    if is_last {
                        return Err(conflict());
                    }
                    current = *slot.get();
                }
                Entry::Vacant(slot) => {
                    slot.insert(next_id);
                    let node = if is_last {
                        Node::File {
                            name: component.to_string(),
                            parent: current,
                            entry,
                        }
                    } else {
                        Node::Directory {
                            name: component.to_string(),
                            parent: Some(current),
                            children: BTreeMap::new(),
                        }
                    };
                    self.nodes.push(node);
                    current = next_id;
                }
            }
        }
        Ok(())
    }

    /// Find the node at `path`. The empty path and `/` name the root.
    pub fn lookup(&self, path: &str) -> Option<NodeId> {
        path::components(path)
            .into_iter()
            .try_fold(Self::ROOT, |node, name| self.child(node, name))
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Get the named child of a directory.
    pub fn child(&self, dir: NodeId, name: &str) -> Option<NodeId> {
        match self.nodes.get(dir)? {
            Node::Directory { children, .. } => children.get(name).copied(),
            Node::File { .. } => None,
        }
    }

    /// Children of a directory in name order; empty for files.
    pub fn children(&self, dir: NodeId) -> impl Iterator<Item = (&str, NodeId)> + '_ {
        let children = match self.nodes.get(dir) {
            Some(Node::Directory { children, .. }) => Some(children),
            _ => None,
        };
        children
            .into_iter()
            .flatten()
            .map(|(name, id)| (name.as_str(), *id))
    }

    /// Number of nodes, the root included.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree holds nothing but the root.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }
}
