//! In-memory directory tree
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. The parent
//! id on each node is a plain lookup used to rebuild display paths; it does
//! not own anything. File records live in a second arena addressed by
//! [`FileId`] so the packer can mutate them while the node structure is
//! borrowed read-only.

use crate::codec::SizeField;
use crate::error::{PackError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Handle to a node in a [`Tree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Handle to a file record in a [`Tree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(usize);

impl FileId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Data layout of one regular file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Where the content is read from, relative to the pack directory
    pub input_path: PathBuf,

    /// File size in bytes
    pub size: u64,

    /// Image offset of the first data block
    pub start_block: u64,

    /// One size field per full block, in file order
    pub block_sizes: Vec<SizeField>,

    /// Fragment table index, assigned when the tail is flushed
    pub fragment: Option<u32>,

    /// Offset of the tail inside its fragment block
    pub fragment_offset: u32,
}

impl FileRecord {
    pub fn new<P: Into<PathBuf>>(input_path: P, size: u64) -> Self {
        FileRecord {
            input_path: input_path.into(),
            size,
            start_block: 0,
            block_sizes: Vec::new(),
            fragment: None,
            fragment_offset: 0,
        }
    }

    /// Number of full blocks the file occupies
    pub fn full_blocks(&self, block_size: u32) -> u64 {
        self.size / block_size as u64
    }

    /// Length of the trailing partial block (0 if none)
    pub fn tail_len(&self, block_size: u32) -> u64 {
        self.size % block_size as u64
    }
}

/// Node payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Directory with its children in stored order
    Directory(Vec<NodeId>),
    /// Regular file
    File(FileId),
    /// Symlinks, devices, sockets, fifos
    Other,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
}

/// Read-only view of the node arena
#[derive(Debug, Clone, Default)]
pub struct Nodes(Vec<Node>);

impl Nodes {
    pub fn get(&self, id: NodeId) -> &Node {
        &self.0[id.0]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Children of a directory node, empty for anything else
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.0[id.0].kind {
            NodeKind::Directory(children) => children,
            _ => &[],
        }
    }

    pub fn file_id(&self, id: NodeId) -> Option<FileId> {
        match self.0[id.0].kind {
            NodeKind::File(file) => Some(file),
            _ => None,
        }
    }

    /// Display path of a node, rebuilt from parent ids
    pub fn path_of(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);

        while let Some(node_id) = current {
            let node = &self.0[node_id.0];
            if node.parent.is_some() {
                parts.push(node.name.as_str());
            }
            current = node.parent;
        }

        parts.reverse();
        parts.join("/")
    }
}

/// Directory tree with file records
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Nodes,
    files: Vec<FileRecord>,
}

impl Tree {
    /// Create a tree holding only an empty root directory
    pub fn new() -> Self {
        Tree {
            nodes: Nodes(vec![Node {
                name: String::new(),
                parent: None,
                kind: NodeKind::Directory(Vec::new()),
            }]),
            files: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn add_dir(&mut self, parent: NodeId, name: &str) -> Result<NodeId> {
        self.insert(parent, name, NodeKind::Directory(Vec::new()))
    }

    pub fn add_file<P: Into<PathBuf>>(
        &mut self,
        parent: NodeId,
        name: &str,
        input_path: P,
        size: u64,
    ) -> Result<NodeId> {
        let file = FileId(self.files.len());
        let id = self.insert(parent, name, NodeKind::File(file))?;
        self.files.push(FileRecord::new(input_path, size));
        Ok(id)
    }

    pub fn add_other(&mut self, parent: NodeId, name: &str) -> Result<NodeId> {
        self.insert(parent, name, NodeKind::Other)
    }

    fn insert(&mut self, parent: NodeId, name: &str, kind: NodeKind) -> Result<NodeId> {
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(PackError::InvalidTree(format!("invalid entry name '{}'", name)));
        }

        let siblings = match self.nodes.0.get(parent.0).map(|n| &n.kind) {
            Some(NodeKind::Directory(children)) => children,
            Some(_) => {
                return Err(PackError::InvalidTree(format!(
                    "'{}' is not a directory",
                    self.path_of(parent)
                )))
            }
            None => return Err(PackError::InvalidTree(format!("no such node {:?}", parent))),
        };

        if siblings.iter().any(|&c| self.nodes.get(c).name == name) {
            return Err(PackError::InvalidTree(format!(
                "duplicate entry '{}' in '{}'",
                name,
                self.path_of(parent)
            )));
        }

        let id = NodeId(self.nodes.0.len());
        self.nodes.0.push(Node {
            name: name.to_string(),
            parent: Some(parent),
            kind,
        });
        if let NodeKind::Directory(children) = &mut self.nodes.0[parent.0].kind {
            children.push(id);
        }
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> &Nodes {
        &self.nodes
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.children(id)
    }

    pub fn file_id(&self, id: NodeId) -> Option<FileId> {
        self.nodes.file_id(id)
    }

    pub fn file(&self, id: FileId) -> &FileRecord {
        &self.files[id.0]
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn path_of(&self, id: NodeId) -> String {
        self.nodes.path_of(id)
    }

    /// Look up a node by its slash separated path below the root
    pub fn lookup(&self, path: &str) -> Option<NodeId> {
        let mut current = self.root();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = *self
                .children(current)
                .iter()
                .find(|&&c| self.nodes.get(c).name == part)?;
        }
        Some(current)
    }

    /// Borrow the node structure and the file records separately
    pub fn split_mut(&mut self) -> (&Nodes, &mut [FileRecord]) {
        (&self.nodes, &mut self.files)
    }

    /// Build a tree from a directory on disk
    ///
    /// Children are sorted by name. Input paths are stored relative to
    /// `root`, so the result is meant to be packed with `root` as the pack
    /// directory. Symlinks are not followed and, like sockets and devices,
    /// become [`NodeKind::Other`].
    pub fn scan<P: AsRef<Path>>(root: P) -> Result<Tree> {
        let root = root.as_ref();
        let mut tree = Tree::new();
        let mut dirs: HashMap<PathBuf, NodeId> = HashMap::new();
        dirs.insert(PathBuf::new(), tree.root());

        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()));

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                PackError::input(path, e.into())
            })?;

            let rel = entry
                .path()
                .strip_prefix(root)
                .map_err(|_| {
                    PackError::InvalidTree(format!("{} escapes scan root", entry.path().display()))
                })?
                .to_path_buf();
            let parent_rel = rel.parent().map(Path::to_path_buf).unwrap_or_default();
            let parent = *dirs.get(&parent_rel).ok_or_else(|| {
                PackError::InvalidTree(format!("parent of {} was not scanned", rel.display()))
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type();

            if file_type.is_dir() {
                let id = tree.add_dir(parent, &name)?;
                dirs.insert(rel, id);
            } else if file_type.is_file() {
                let size = entry
                    .metadata()
                    .map_err(|e| PackError::input(entry.path(), e.into()))?
                    .len();
                tree.add_file(parent, &name, rel, size)?;
            } else {
                tree.add_other(parent, &name)?;
            }
        }

        debug!(
            "Scanned {:?}: {} nodes, {} regular files",
            root,
            tree.nodes.len(),
            tree.files.len()
        );
        Ok(tree)
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}
