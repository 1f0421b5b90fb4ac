//! Depth-first traversal feeding regular files to the packer

use crate::error::Result;
use crate::io::OutputSink;
use crate::packer::Packer;
use crate::tree::{FileId, FileRecord, NodeId, NodeKind, Nodes, Tree};
use std::io::Write;
use tracing::warn;

/// Receives every regular file found by [`walk`]
pub trait FileVisitor {
    fn visit_file(&mut self, files: &mut [FileRecord], id: FileId) -> Result<()>;
}

impl<S: OutputSink> FileVisitor for Packer<S> {
    fn visit_file(&mut self, files: &mut [FileRecord], id: FileId) -> Result<()> {
        self.process(files, id)
    }
}

/// Visit all regular files below the root, pre-order, children in stored order
///
/// When `progress` is given, a `packing /<path>` line is written to it before
/// each file. Other node kinds are skipped. The first visitor error stops
/// the walk.
pub fn walk<V: FileVisitor + ?Sized>(
    tree: &mut Tree,
    mut progress: Option<&mut dyn Write>,
    visitor: &mut V,
) -> Result<()> {
    let root = tree.root();
    let (nodes, files) = tree.split_mut();
    walk_node(nodes, files, root, &mut progress, visitor)
}

fn walk_node<V: FileVisitor + ?Sized>(
    nodes: &Nodes,
    files: &mut [FileRecord],
    id: NodeId,
    progress: &mut Option<&mut dyn Write>,
    visitor: &mut V,
) -> Result<()> {
    match &nodes.get(id).kind {
        NodeKind::Directory(children) => {
            for &child in children {
                walk_node(nodes, files, child, progress, visitor)?;
            }
            Ok(())
        }
        NodeKind::File(file) => {
            if let Some(out) = progress.as_mut() {
                if let Err(e) = writeln!(out, "packing /{}", nodes.path_of(id)) {
                    warn!("Failed to write progress line: {}", e);
                }
            }
            visitor.visit_file(files, *file)
        }
        NodeKind::Other => Ok(()),
    }
}
