//! The COPY/MOVE engine.
//!
//! [`CopyMoveEngine`] walks a frozen [`CollectionNode`] snapshot of the
//! source tree against a destination [`Target`], creating, overwriting and
//! deleting through a [`TargetActions`] implementation, and aggregates a
//! [`CollectionActionResult`] tree. Three action families are provided:
//! same-filesystem ([`InFsActions`]), cross-filesystem ([`CrossFsActions`])
//! and cross-server over HTTP ([`RemoteActions`]).

mod engine;
mod local;
mod node;
mod remote;
mod result;
mod target;

pub use engine::CopyMoveEngine;
pub use local::{CrossFsActions, FsCol, FsDoc, FsMissing, InFsActions};
pub use node::{CollectionNode, DepthLimit};
pub use remote::{HttpClientFactory, RemoteActions, RemoteClient, RemoteCol, RemoteDoc, RemoteMissing};
#[cfg(any(docsrs, feature = "reqwest-client"))]
pub use remote::{ReqwestClient, ReqwestFactory};
pub use result::{ActionResult, ActionStatus, CollectionActionResult};
#[cfg(all(test, feature = "memfs"))]
pub(crate) use remote::tests::MockClient;
pub use target::{
    CollectionTarget, DocumentTarget, ExistingBehaviour, MissingTarget, Target, TargetActions,
    TargetFuture, TargetOf, TransferMode,
};

/// Preferred routing for a COPY/MOVE destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// Use native backend primitives when source and destination share a
    /// filesystem; stream otherwise.
    #[default]
    Fastest,
    /// Always stream through document contents, even within one filesystem.
    CrossFilesystem,
    /// Always talk WebDAV to the destination, even for local URLs.
    CrossServer,
}
