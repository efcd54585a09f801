//
// Per-node outcome records. The engine returns a result tree isomorphic to
// the processed source tree; the handler flattens it into a multi-status
// body.
//
use url::Url;

use crate::errors::DavError;
use crate::fs::PropName;

/// What happened to one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    /// Destination was missing and has been created.
    Created,
    /// Destination existed, was deleted, and has been recreated.
    Overwritten,
    /// Destination existed and was overwritten or merged in place.
    Updated,
    /// Destination exists but overwriting was not allowed.
    CannotOverwrite,
    /// Creating or writing the destination failed.
    CreateFailed,
    /// Deleting the existing destination failed.
    TargetDeleteFailed,
    /// Post-processing (e.g. deleting a moved source) failed.
    CleanupFailed,
    /// The node itself was written, but some properties were not applied.
    PropSetFailed,
    /// Source and destination kinds do not match (document vs collection).
    OverwriteFailed,
    /// The node was never attempted because its parent collection failed.
    ParentFailed,
    /// Administrative wrapper node, not an operation of its own.
    Ignored,
}

impl ActionStatus {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ActionStatus::Created
                | ActionStatus::Overwritten
                | ActionStatus::Updated
                | ActionStatus::Ignored
        )
    }
}

/// Outcome for a single processed node.
#[derive(Debug)]
pub struct ActionResult {
    pub status: ActionStatus,
    /// Name of the node within its parent.
    pub name: String,
    /// Destination URL the status applies to.
    pub href: Url,
    /// The fault behind a failure status, if one was caught.
    pub error: Option<DavError>,
    /// Property names that could not be applied (`PropSetFailed`).
    pub failed_props: Vec<PropName>,
}

impl ActionResult {
    pub fn new(status: ActionStatus, name: impl Into<String>, href: Url) -> ActionResult {
        ActionResult {
            status,
            name: name.into(),
            href,
            error: None,
            failed_props: Vec::new(),
        }
    }

    pub fn with_error(
        status: ActionStatus,
        name: impl Into<String>,
        href: Url,
        error: DavError,
    ) -> ActionResult {
        ActionResult {
            error: Some(error),
            ..ActionResult::new(status, name, href)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Swap one status for another, leaving everything else alone.
    pub(crate) fn relabel(mut self, from: ActionStatus, to: ActionStatus) -> ActionResult {
        if self.status == from {
            self.status = to;
        }
        self
    }
}

/// Outcome for a collection node, with nested child outcomes.
#[derive(Debug)]
pub struct CollectionActionResult {
    pub result: ActionResult,
    pub documents: Vec<ActionResult>,
    pub collections: Vec<CollectionActionResult>,
}

impl CollectionActionResult {
    pub fn leaf(result: ActionResult) -> CollectionActionResult {
        CollectionActionResult {
            result,
            documents: Vec::new(),
            collections: Vec::new(),
        }
    }

    /// Did this node and every descendant succeed?
    pub fn is_success(&self) -> bool {
        self.result.is_success() && self.children_succeeded()
    }

    /// Did every descendant succeed (ignoring this node's own status)?
    pub fn children_succeeded(&self) -> bool {
        self.documents.iter().all(|d| d.is_success())
            && self.collections.iter().all(|c| c.is_success())
    }

    /// Number of document results, counting recursively.
    pub fn document_count(&self) -> usize {
        self.documents.len()
            + self
                .collections
                .iter()
                .map(|c| c.document_count())
                .sum::<usize>()
    }

    /// Number of collection results below this one, counting recursively.
    pub fn collection_count(&self) -> usize {
        self.collections.len()
            + self
                .collections
                .iter()
                .map(|c| c.collection_count())
                .sum::<usize>()
    }

    pub(crate) fn relabel(mut self, from: ActionStatus, to: ActionStatus) -> CollectionActionResult {
        self.result = self.result.relabel(from, to);
        self
    }
}
