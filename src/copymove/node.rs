//
// Source tree snapshots.
//
use std::collections::VecDeque;
use std::sync::Arc;

use crate::davheaders::Depth;
use crate::fs::{DavCollection, DavDocument, Entry, FsResult};

/// How many levels of children to include in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthLimit {
    Finite(u32),
    Infinity,
}

impl DepthLimit {
    fn is_exhausted(&self) -> bool {
        matches!(self, DepthLimit::Finite(0))
    }

    fn lower(&self) -> DepthLimit {
        match self {
            DepthLimit::Finite(n) => DepthLimit::Finite(n.saturating_sub(1)),
            DepthLimit::Infinity => DepthLimit::Infinity,
        }
    }
}

impl From<Depth> for DepthLimit {
    fn from(depth: Depth) -> DepthLimit {
        match depth {
            Depth::Zero => DepthLimit::Finite(0),
            Depth::One => DepthLimit::Finite(1),
            Depth::Infinity => DepthLimit::Infinity,
        }
    }
}

/// A frozen snapshot of a source collection subtree.
///
/// The snapshot is taken in full before the engine mutates anything, so a
/// copy of a collection into its own descendant cannot observe (and then
/// re-copy) entries the operation itself created. Levels beyond the depth
/// limit are simply absent and never visited.
pub struct CollectionNode {
    pub collection: Arc<dyn DavCollection>,
    pub documents: Vec<Arc<dyn DavDocument>>,
    pub collections: Vec<CollectionNode>,
}

struct Build {
    collection: Arc<dyn DavCollection>,
    documents: Vec<Arc<dyn DavDocument>>,
    children: Vec<usize>,
}

impl CollectionNode {
    /// Snapshot `collection`, breadth-first, up to `depth` levels of
    /// children. A depth of zero yields the bare collection.
    pub async fn materialize(
        collection: Arc<dyn DavCollection>,
        depth: DepthLimit,
    ) -> FsResult<CollectionNode> {
        let mut arena = vec![Build {
            collection,
            documents: Vec::new(),
            children: Vec::new(),
        }];
        let mut queue = VecDeque::from([(0usize, depth)]);

        while let Some((idx, budget)) = queue.pop_front() {
            if budget.is_exhausted() {
                continue;
            }
            let collection = arena[idx].collection.clone();
            for child in collection.get_children().await? {
                match child {
                    Entry::Document(doc) => arena[idx].documents.push(doc),
                    Entry::Collection(col) => {
                        let ci = arena.len();
                        arena.push(Build {
                            collection: col,
                            documents: Vec::new(),
                            children: Vec::new(),
                        });
                        arena[idx].children.push(ci);
                        queue.push_back((ci, budget.lower()));
                    }
                }
            }
        }

        let mut arena: Vec<Option<Build>> = arena.into_iter().map(Some).collect();
        Ok(assemble(&mut arena, 0))
    }

    /// Documents in the snapshot, counting recursively.
    pub fn document_count(&self) -> usize {
        self.documents.len()
            + self
                .collections
                .iter()
                .map(|c| c.document_count())
                .sum::<usize>()
    }

    /// Sub-collections in the snapshot, counting recursively.
    pub fn collection_count(&self) -> usize {
        self.collections.len()
            + self
                .collections
                .iter()
                .map(|c| c.collection_count())
                .sum::<usize>()
    }
}

fn assemble(arena: &mut [Option<Build>], idx: usize) -> CollectionNode {
    let build = arena[idx].take().expect("node assembled twice");
    let collections = build
        .children
        .clone()
        .into_iter()
        .map(|ci| assemble(arena, ci))
        .collect();
    CollectionNode {
        collection: build.collection,
        documents: build.documents,
        collections,
    }
}
