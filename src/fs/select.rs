//! Path selection.
//!
//! Resolves a request path against a filesystem, segment by segment, into a
//! four-state [`Selection`]. The distinction between "exactly the last
//! segment is absent" (a valid create point) and "anything earlier is
//! absent" (a structurally invalid destination, 409 territory) is made here,
//! once, so the rest of the crate never re-derives it.

use std::sync::Arc;

use crate::davpath::DavPath;
use crate::fs::{DavCollection, DavDocument, DavEntry, DavFileSystem, Entry, FsError, FsResult};

/// Outcome of resolving a path.
pub enum Selection {
    /// All segments resolved, ending on a collection.
    Collection(Arc<dyn DavCollection>),
    /// All segments resolved, ending on a document.
    Document {
        document: Arc<dyn DavDocument>,
        parent: Arc<dyn DavCollection>,
    },
    /// Exactly the last segment is absent. `parent` is where a new entry
    /// with this name could be created.
    Missing {
        parent: Arc<dyn DavCollection>,
        name: String,
        dir_intent: bool,
    },
    /// More than one trailing segment is absent, or a segment with
    /// directory intent resolved to a document. `names` holds the
    /// unresolved remainder, starting at the first offending segment.
    MissingPath {
        last: Arc<dyn DavCollection>,
        names: Vec<String>,
    },
}

impl std::fmt::Debug for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Selection::Collection(c) => write!(f, "Collection({:?})", c.path()),
            Selection::Document { document, .. } => write!(f, "Document({:?})", document.path()),
            Selection::Missing { parent, name, .. } => {
                write!(f, "Missing({:?} + {:?})", parent.path(), name)
            }
            Selection::MissingPath { last, names } => {
                write!(f, "MissingPath({:?} + {:?})", last.path(), names)
            }
        }
    }
}

/// Resolve `path` against `fs`, starting at its root collection.
pub async fn select(fs: &dyn DavFileSystem, path: &DavPath) -> FsResult<Selection> {
    trace!("FS: select {path:?}");
    let mut stack: Vec<Arc<dyn DavCollection>> = vec![fs.root()];
    let segments = path.segments();
    let count = segments.len();

    for (i, seg) in segments.iter().enumerate() {
        let last = i + 1 == count;
        match seg.name.as_str() {
            "." => continue,
            ".." => {
                // DavPath construction rejects paths that climb above the
                // root, so the stack cannot underflow here.
                if stack.len() <= 1 {
                    debug_assert!(false, "`..` below root in {path:?}");
                    return Err(FsError::GeneralFailure);
                }
                stack.pop();
                continue;
            }
            _ => {}
        }

        let current = stack.last().unwrap().clone();
        match current.get_child(&seg.name).await? {
            Some(Entry::Collection(col)) => stack.push(col),
            Some(Entry::Document(document)) => {
                if last && !seg.dir_intent {
                    return Ok(Selection::Document {
                        document,
                        parent: current,
                    });
                }
                // A document where a collection was required.
                return Ok(Selection::MissingPath {
                    last: current,
                    names: remainder(&segments, i),
                });
            }
            None => {
                if last {
                    return Ok(Selection::Missing {
                        parent: current,
                        name: seg.name.clone(),
                        dir_intent: seg.dir_intent,
                    });
                }
                return Ok(Selection::MissingPath {
                    last: current,
                    names: remainder(&segments, i),
                });
            }
        }
    }

    Ok(Selection::Collection(stack.pop().unwrap()))
}

fn remainder(segments: &[crate::davpath::PathSegment], from: usize) -> Vec<String> {
    segments[from..].iter().map(|s| s.name.clone()).collect()
}
