//! The target abstraction.
//!
//! A target is the engine's view of "the thing currently occupying the
//! destination path", in one of three mutually exclusive shapes: missing,
//! document, or collection. A backend supplies all three shapes together
//! through an implementation of [`TargetActions`], whose associated types
//! tie the shapes to each other at compile time. Targets of different
//! backends can therefore never be mixed within one operation.
//!
//! State transitions are expressed through ownership: deleting a document
//! or collection target consumes it and yields a fresh missing target, and
//! creating a collection consumes the missing target it grew out of. A
//! deleted target cannot be touched again.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use url::Url;
use xmltree::Element;

use crate::copymove::result::CollectionActionResult;
use crate::errors::DavError;
use crate::fs::{DavCollection, DavDocument, PropName};

/// Boxed future returned by target operations.
pub type TargetFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, DavError>> + Send + 'a>>;

/// Is the source retained (COPY) or consumed (MOVE)?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Copy,
    Move,
}

/// How an implementation deals with an existing destination document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingBehaviour {
    /// The backend can overwrite atomically in place.
    OverwriteInPlace,
    /// Delete the destination first, then create it from scratch.
    DeleteTarget,
}

/// The three shapes a destination can take.
#[derive(Debug)]
pub enum Target<M, D, C> {
    Missing(M),
    Document(D),
    Collection(C),
}

/// Shorthand for the target sum type of one actions implementation.
pub type TargetOf<A> = Target<
    <A as TargetActions>::Missing,
    <A as TargetActions>::Doc,
    <A as TargetActions>::Col,
>;

impl<M: MissingTarget, D: DocumentTarget, C: CollectionTarget> Target<M, D, C> {
    pub fn name(&self) -> &str {
        match self {
            Target::Missing(t) => t.name(),
            Target::Document(t) => t.name(),
            Target::Collection(t) => t.name(),
        }
    }

    pub fn url(&self) -> &Url {
        match self {
            Target::Missing(t) => t.url(),
            Target::Document(t) => t.url(),
            Target::Collection(t) => t.url(),
        }
    }
}

/// An empty destination slot.
pub trait MissingTarget: Sized + Send + 'static {
    type Col: CollectionTarget;

    fn name(&self) -> &str;
    fn url(&self) -> &Url;

    /// Create a collection in this slot. Consumes the slot; the returned
    /// collection target reports `created() == true`.
    fn create_collection(self) -> TargetFuture<'static, Self::Col>;
}

/// An existing destination document.
pub trait DocumentTarget: Sized + Send + Sync + 'static {
    type Missing: MissingTarget;

    fn name(&self) -> &str;
    fn url(&self) -> &Url;

    /// Delete the document, yielding the now-empty slot.
    fn delete(self) -> TargetFuture<'static, Self::Missing>;

    /// Apply properties. Returns the names that could not be applied.
    fn set_props(&self, props: Vec<Element>) -> TargetFuture<'_, Vec<PropName>>;
}

/// An existing destination collection.
pub trait CollectionTarget: Sized + Send + Sync + 'static {
    type Missing: MissingTarget;
    type Doc: DocumentTarget;

    fn name(&self) -> &str;
    fn url(&self) -> &Url;

    /// True when this collection was created during the current engine run.
    /// Children of a freshly created collection are known to be missing, so
    /// the engine skips the existence probe for them.
    fn created(&self) -> bool;

    /// A missing target for a child slot, without probing.
    fn missing(&self, name: &str) -> Self::Missing;

    /// Probe a child slot and classify what occupies it.
    fn get<'a>(
        &'a self,
        name: &'a str,
    ) -> TargetFuture<'a, Target<Self::Missing, Self::Doc, Self>>;

    /// Delete the collection and everything below it, yielding the
    /// now-empty slot.
    fn delete(self) -> TargetFuture<'static, Self::Missing>;

    /// Apply properties. Returns the names that could not be applied.
    fn set_props(&self, props: Vec<Element>) -> TargetFuture<'_, Vec<PropName>>;
}

/// The operations the engine drives against one backend.
///
/// One implementation covers one (backend, transfer mode) pair; the target
/// shapes it produces are bound through the associated types.
pub trait TargetActions: Send + Sync + 'static {
    type Missing: MissingTarget<Col = Self::Col>;
    type Doc: DocumentTarget<Missing = Self::Missing>;
    type Col: CollectionTarget<Missing = Self::Missing, Doc = Self::Doc>;

    fn mode(&self) -> TransferMode;

    fn existing_behaviour(&self) -> ExistingBehaviour;

    /// Create the destination document and fill it from `source`. For MOVE,
    /// the source document is deleted after a successful write.
    fn put<'a>(
        &'a self,
        source: &'a Arc<dyn DavDocument>,
        target: Self::Missing,
    ) -> TargetFuture<'a, Self::Doc>;

    /// Overwrite an existing destination document in place. Only invoked
    /// when [`existing_behaviour`](Self::existing_behaviour) is
    /// [`ExistingBehaviour::OverwriteInPlace`].
    fn overwrite<'a>(
        &'a self,
        source: &'a Arc<dyn DavDocument>,
        target: &'a Self::Doc,
    ) -> TargetFuture<'a, ()>;

    /// Invoked once all children of a collection have been processed,
    /// with the (child-complete) result tree of that collection. For MOVE,
    /// this deletes the emptied source collection, but only when every
    /// child succeeded; anything left behind must stay reachable.
    fn cleanup<'a>(
        &'a self,
        source: &'a Arc<dyn DavCollection>,
        target: &'a Self::Col,
        result: &'a CollectionActionResult,
    ) -> TargetFuture<'a, ()>;
}

/// Append a trailing slash so the URL names a collection and child joins
/// append instead of replacing the last segment.
pub(crate) fn collection_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Child URL within a collection URL. The name is percent-encoded as one
/// path segment, so `#`, `?` and `/` cannot change the URL structure.
pub(crate) fn child_url(base: &Url, name: &str) -> Url {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(name);
    }
    url
}
