//! The recursive execution engine.
//!
//! One engine run processes one COPY or MOVE: it walks the frozen source
//! snapshot depth-first against the destination targets and records an
//! [`ActionResult`] per node. Node processing is *total* over faults: every
//! error raised by a target operation is caught at the node that raised it
//! and folded into that node's result, so one unreadable document in a
//! thousand costs exactly one failure entry, never the whole operation.
//! Only cancellation escapes as an error, and it aborts the run without a
//! result tree.
//!
//! Everything runs sequentially. WebDAV demands a deterministic, fully
//! ordered multi-status response, and the destination tree is being mutated
//! while the walk is in progress; fanning out siblings concurrently would
//! buy little and cost both properties.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::copymove::node::{CollectionNode, DepthLimit};
use crate::copymove::result::{ActionResult, ActionStatus, CollectionActionResult};
use crate::copymove::target::{
    child_url, collection_url, CollectionTarget, DocumentTarget, ExistingBehaviour, MissingTarget,
    Target, TargetActions, TargetOf,
};
use crate::errors::DavError;
use crate::fs::{DavCollection, DavDocument, DavEntry, Entry};
use crate::DavResult;

/// Drives one COPY or MOVE operation against a [`TargetActions`] backend.
pub struct CopyMoveEngine<A: TargetActions> {
    actions: A,
    allow_overwrite: bool,
    cancel: CancellationToken,
}

impl<A: TargetActions> CopyMoveEngine<A> {
    pub fn new(actions: A, allow_overwrite: bool) -> CopyMoveEngine<A> {
        CopyMoveEngine {
            actions,
            allow_overwrite,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach a cancellation token. The engine checks it between node
    /// visits; a cancelled run returns [`DavError::Cancelled`] instead of
    /// a partial result tree.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> CopyMoveEngine<A> {
        self.cancel = cancel;
        self
    }

    pub fn actions(&self) -> &A {
        &self.actions
    }

    /// Process a source entry against the destination target.
    ///
    /// A lone document is wrapped into a synthetic collection result (the
    /// wrapper node carries [`ActionStatus::Ignored`]) so callers always
    /// get the same result shape back.
    pub async fn execute(
        &self,
        source: &Entry,
        depth: DepthLimit,
        target: TargetOf<A>,
    ) -> DavResult<CollectionActionResult> {
        match source {
            Entry::Document(doc) => {
                let href = target.url().clone();
                let result = self.execute_document(doc, target).await?;
                let wrapper = ActionResult::new(ActionStatus::Ignored, result.name.clone(), href);
                Ok(CollectionActionResult {
                    result: wrapper,
                    documents: vec![result],
                    collections: Vec::new(),
                })
            }
            Entry::Collection(col) => {
                let node = CollectionNode::materialize(col.clone(), depth).await?;
                self.execute_collection(&node, target).await
            }
        }
    }

    /// Process one document node.
    pub async fn execute_document(
        &self,
        source: &Arc<dyn DavDocument>,
        target: TargetOf<A>,
    ) -> DavResult<ActionResult> {
        self.check_cancel()?;
        let name = target.name().to_string();
        let href = target.url().clone();
        debug!("engine: document {:?} -> {href}", source.path());

        Ok(match target {
            Target::Missing(missing) => self.document_to_missing(source, missing).await,
            Target::Document(existing) => {
                if !self.allow_overwrite {
                    return Ok(ActionResult::new(ActionStatus::CannotOverwrite, name, href));
                }
                match self.actions.existing_behaviour() {
                    ExistingBehaviour::DeleteTarget => match existing.delete().await {
                        Ok(missing) => self
                            .document_to_missing(source, missing)
                            .await
                            .relabel(ActionStatus::Created, ActionStatus::Overwritten),
                        Err(e) => ActionResult::with_error(
                            ActionStatus::TargetDeleteFailed,
                            name,
                            href,
                            e,
                        ),
                    },
                    ExistingBehaviour::OverwriteInPlace => {
                        match self.actions.overwrite(source, &existing).await {
                            Ok(()) => {
                                self.apply_doc_props(source, &existing, ActionStatus::Updated)
                                    .await
                            }
                            Err(e) => ActionResult::with_error(
                                ActionStatus::CreateFailed,
                                name,
                                href,
                                e,
                            ),
                        }
                    }
                }
            }
            // Never silently replace a collection with a document.
            Target::Collection(_) => ActionResult::new(ActionStatus::OverwriteFailed, name, href),
        })
    }

    /// Process one collection node, recursively.
    pub fn execute_collection<'a>(
        &'a self,
        node: &'a CollectionNode,
        target: TargetOf<A>,
    ) -> Pin<Box<dyn Future<Output = DavResult<CollectionActionResult>> + Send + 'a>> {
        Box::pin(async move {
            self.check_cancel()?;
            let name = target.name().to_string();
            let href = target.url().clone();
            debug!("engine: collection {:?} -> {href}", node.collection.path());

            match target {
                Target::Missing(missing) => match missing.create_collection().await {
                    Ok(col) => self.process_children(node, col).await,
                    Err(e) => Ok(parent_failed_tree(
                        node,
                        ActionResult::with_error(ActionStatus::CreateFailed, name, href.clone(), e),
                        &href,
                    )),
                },
                Target::Collection(col) => {
                    if !self.allow_overwrite {
                        return Ok(parent_failed_tree(
                            node,
                            ActionResult::new(ActionStatus::CannotOverwrite, name, href.clone()),
                            &href,
                        ));
                    }
                    if self.actions.existing_behaviour() == ExistingBehaviour::DeleteTarget {
                        match col.delete().await {
                            Ok(missing) => {
                                let result = self
                                    .execute_collection(node, Target::Missing(missing))
                                    .await?;
                                Ok(result
                                    .relabel(ActionStatus::Created, ActionStatus::Overwritten))
                            }
                            Err(e) => Ok(parent_failed_tree(
                                node,
                                ActionResult::with_error(
                                    ActionStatus::TargetDeleteFailed,
                                    name,
                                    href.clone(),
                                    e,
                                ),
                                &href,
                            )),
                        }
                    } else {
                        // Merge into the existing collection.
                        let result = self.process_children(node, col).await?;
                        Ok(result.relabel(ActionStatus::Created, ActionStatus::Updated))
                    }
                }
                // Never silently replace a document with a collection.
                Target::Document(_) => Ok(parent_failed_tree(
                    node,
                    ActionResult::new(ActionStatus::OverwriteFailed, name, href.clone()),
                    &href,
                )),
            }
        })
    }

    /// Children first, then the collection's own properties, then cleanup.
    async fn process_children(
        &self,
        node: &CollectionNode,
        col: A::Col,
    ) -> DavResult<CollectionActionResult> {
        let name = col.name().to_string();
        let href = col.url().clone();

        let mut documents = Vec::with_capacity(node.documents.len());
        for doc in &node.documents {
            self.check_cancel()?;
            let child_name = doc.name();
            let child_target = match self.child_target(&col, &child_name, &href).await {
                Ok(target) => target,
                Err(result) => {
                    documents.push(result);
                    continue;
                }
            };
            documents.push(self.execute_document(doc, child_target).await?);
        }

        let mut collections = Vec::with_capacity(node.collections.len());
        for child_node in &node.collections {
            self.check_cancel()?;
            let child_name = child_node.collection.name();
            let child_target = match self.child_target(&col, &child_name, &href).await {
                Ok(target) => target,
                Err(result) => {
                    let base = collection_url(child_url(&href, &child_name));
                    collections.push(parent_failed_tree(child_node, result, &base));
                    continue;
                }
            };
            collections.push(self.execute_collection(child_node, child_target).await?);
        }

        let own = self
            .apply_col_props(&node.collection, &col, name.clone(), href.clone())
            .await;
        let mut result = CollectionActionResult {
            result: own,
            documents,
            collections,
        };

        if let Err(e) = self.actions.cleanup(&node.collection, &col, &result).await {
            result.result = ActionResult::with_error(ActionStatus::CleanupFailed, name, href, e);
        }
        Ok(result)
    }

    /// Locate the destination slot for one child. On a freshly created
    /// collection every child is known to be missing and the probe is
    /// skipped; the skip is only ever an optimization, never the other way
    /// around. A failed probe becomes that child's failure result.
    async fn child_target(
        &self,
        col: &A::Col,
        child_name: &str,
        base: &Url,
    ) -> Result<TargetOf<A>, ActionResult> {
        if col.created() {
            return Ok(Target::Missing(col.missing(child_name)));
        }
        col.get(child_name).await.map_err(|e| {
            ActionResult::with_error(
                ActionStatus::CreateFailed,
                child_name.to_string(),
                child_url(base, child_name),
                e,
            )
        })
    }

    async fn document_to_missing(
        &self,
        source: &Arc<dyn DavDocument>,
        missing: A::Missing,
    ) -> ActionResult {
        let name = missing.name().to_string();
        let href = missing.url().clone();
        match self.actions.put(source, missing).await {
            Ok(created) => {
                self.apply_doc_props(source, &created, ActionStatus::Created)
                    .await
            }
            Err(e) => ActionResult::with_error(ActionStatus::CreateFailed, name, href, e),
        }
    }

    /// Propagate writable source properties after a successful write. A
    /// property failure demotes the status but the written entry stays: the
    /// engine's contract is partial success, not rollback.
    async fn apply_doc_props(
        &self,
        source: &Arc<dyn DavDocument>,
        target: &A::Doc,
        ok_status: ActionStatus,
    ) -> ActionResult {
        let name = target.name().to_string();
        let href = target.url().clone();
        let props = match source.writeable_props().await {
            Ok(props) => props,
            Err(e) => {
                return ActionResult::with_error(ActionStatus::PropSetFailed, name, href, e.into())
            }
        };
        if props.is_empty() {
            return ActionResult::new(ok_status, name, href);
        }
        match target.set_props(props).await {
            Ok(failed) if failed.is_empty() => ActionResult::new(ok_status, name, href),
            Ok(failed) => {
                let mut result = ActionResult::new(ActionStatus::PropSetFailed, name, href);
                result.failed_props = failed;
                result
            }
            Err(e) => ActionResult::with_error(ActionStatus::PropSetFailed, name, href, e),
        }
    }

    async fn apply_col_props(
        &self,
        source: &Arc<dyn DavCollection>,
        target: &A::Col,
        name: String,
        href: Url,
    ) -> ActionResult {
        let props = match source.writeable_props().await {
            Ok(props) => props,
            Err(e) => {
                return ActionResult::with_error(ActionStatus::PropSetFailed, name, href, e.into())
            }
        };
        if props.is_empty() {
            return ActionResult::new(ActionStatus::Created, name, href);
        }
        match target.set_props(props).await {
            Ok(failed) if failed.is_empty() => ActionResult::new(ActionStatus::Created, name, href),
            Ok(failed) => {
                let mut result = ActionResult::new(ActionStatus::PropSetFailed, name, href);
                result.failed_props = failed;
                result
            }
            Err(e) => ActionResult::with_error(ActionStatus::PropSetFailed, name, href, e),
        }
    }

    fn check_cancel(&self) -> DavResult<()> {
        if self.cancel.is_cancelled() {
            debug!("engine: cancelled");
            return Err(DavError::Cancelled);
        }
        Ok(())
    }
}

/// Result tree for a subtree that was never attempted: the node itself
/// carries the failure, every descendant is marked `ParentFailed`. This
/// keeps the result tree isomorphic to the snapshot even when a whole
/// branch fails at its root.
fn parent_failed_tree(
    node: &CollectionNode,
    own: ActionResult,
    base: &Url,
) -> CollectionActionResult {
    let documents = node
        .documents
        .iter()
        .map(|doc| {
            let name = doc.name();
            let href = child_url(base, &name);
            ActionResult::new(ActionStatus::ParentFailed, name, href)
        })
        .collect();
    let collections = node
        .collections
        .iter()
        .map(|child| {
            let name = child.collection.name();
            let href = collection_url(child_url(base, &name));
            let own = ActionResult::new(ActionStatus::ParentFailed, name, href.clone());
            parent_failed_tree(child, own, &href)
        })
        .collect();
    CollectionActionResult {
        result: own,
        documents,
        collections,
    }
}

#[cfg(test)]
#[cfg(all(feature = "memfs", feature = "localfs"))]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use xmltree::Element;

    use crate::copymove::local::{CrossFsActions, FsCol, FsDoc, FsMissing, InFsActions};
    use crate::copymove::target::TransferMode;
    use crate::davpath::DavPath;
    use crate::fs::localfs::LocalFs;
    use crate::fs::testutil::{read_doc, write_doc};
    use crate::fs::memfs::MemFs;
    use crate::fs::{
        DavCollection, DavEntry, DavFile, DavFileSystem, DavMetaData, DeleteResult, FsError,
        FsFuture, PropName,
    };

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn dest_url() -> Url {
        url("http://host/dst/")
    }

    /// Wraps a document whose content cannot be read.
    struct FailingDoc(Arc<dyn DavDocument>);

    impl DavEntry for FailingDoc {
        fn name(&self) -> String {
            self.0.name()
        }
        fn path(&self) -> DavPath {
            self.0.path()
        }
        fn parent(&self) -> Option<Arc<dyn DavCollection>> {
            self.0.parent()
        }
        fn fs_id(&self) -> crate::fs::FsId {
            self.0.fs_id()
        }
        fn metadata(&self) -> FsFuture<'_, Box<dyn DavMetaData>> {
            self.0.metadata()
        }
        fn delete(&self) -> FsFuture<'_, DeleteResult> {
            self.0.delete()
        }
        fn writeable_props(&self) -> FsFuture<'_, Vec<Element>> {
            self.0.writeable_props()
        }
        fn patch_props(&self, props: Vec<Element>) -> FsFuture<'_, Vec<PropName>> {
            self.0.patch_props(props)
        }
    }

    impl DavDocument for FailingDoc {
        fn open_read(&self) -> FsFuture<'_, Box<dyn DavFile>> {
            async move { Err(FsError::Forbidden) }.boxed()
        }
        fn create(&self) -> FsFuture<'_, Box<dyn DavFile>> {
            self.0.create()
        }
        fn copy_to<'a>(
            &'a self,
            dest: &'a dyn DavCollection,
            name: &'a str,
        ) -> FsFuture<'a, Arc<dyn DavDocument>> {
            self.0.copy_to(dest, name)
        }
        fn move_to<'a>(
            &'a self,
            dest: &'a dyn DavCollection,
            name: &'a str,
        ) -> FsFuture<'a, Arc<dyn DavDocument>> {
            self.0.move_to(dest, name)
        }
    }

    async fn read_child(col: &Arc<dyn DavCollection>, name: &str) -> Vec<u8> {
        match col.get_child(name).await.unwrap() {
            Some(Entry::Document(d)) => read_doc(&d).await,
            other => panic!("expected document {name}, got {other:?}"),
        }
    }

    /// src/{x.txt, y.txt, sub/{z.txt}, empty/}
    async fn source_tree(fs: &MemFs) -> Arc<dyn DavCollection> {
        let src = fs.root().create_collection("src").await.unwrap();
        let x = src.create_document("x.txt").await.unwrap();
        write_doc(&x, b"xx").await;
        let y = src.create_document("y.txt").await.unwrap();
        write_doc(&y, b"yy").await;
        let sub = src.create_collection("sub").await.unwrap();
        let z = sub.create_document("z.txt").await.unwrap();
        write_doc(&z, b"zz").await;
        src.create_collection("empty").await.unwrap();
        src
    }

    #[tokio::test]
    async fn copy_document_to_missing() {
        let fs = MemFs::new();
        let root = fs.root();
        let a = root.create_collection("a").await.unwrap();
        let b = a.create_document("b.txt").await.unwrap();
        write_doc(&b, b"hello").await;
        let c = root.create_collection("c").await.unwrap();

        let engine = CopyMoveEngine::new(InFsActions::new(TransferMode::Copy), true);
        let target = FsCol::existing(c.clone(), url("http://host/c/")).missing("b.txt");
        let result = engine
            .execute(
                &Entry::Document(b),
                DepthLimit::Infinity,
                Target::Missing(target),
            )
            .await
            .unwrap();

        assert_eq!(result.result.status, ActionStatus::Ignored);
        assert_eq!(result.documents.len(), 1);
        assert_eq!(result.documents[0].status, ActionStatus::Created);
        assert_eq!(result.documents[0].href.as_str(), "http://host/c/b.txt");
        assert_eq!(read_child(&c, "b.txt").await, b"hello");
    }

    #[tokio::test]
    async fn overwrite_gating_leaves_destination_alone() {
        let fs = MemFs::new();
        let root = fs.root();
        let src = root.create_document("src").await.unwrap();
        write_doc(&src, b"new").await;
        let dst = root.create_document("dst").await.unwrap();
        write_doc(&dst, b"old").await;

        let engine = CopyMoveEngine::new(InFsActions::new(TransferMode::Copy), false);
        let target = Target::Document(FsDoc::new(dst, url("http://host/dst")));
        let result = engine.execute_document(&src, target).await.unwrap();

        assert_eq!(result.status, ActionStatus::CannotOverwrite);
        assert_eq!(read_child(&root, "dst").await, b"old");
    }

    #[tokio::test]
    async fn overwrite_gating_applies_to_collections() {
        let fs = MemFs::new();
        let src = source_tree(&fs).await;
        let dst = fs.root().create_collection("dst").await.unwrap();

        let engine = CopyMoveEngine::new(InFsActions::new(TransferMode::Copy), false);
        let target = Target::Collection(FsCol::existing(dst.clone(), dest_url()));
        let result = engine
            .execute(&Entry::Collection(src), DepthLimit::Infinity, target)
            .await
            .unwrap();

        assert_eq!(result.result.status, ActionStatus::CannotOverwrite);
        // Shape is preserved, children are marked, destination untouched.
        assert_eq!(result.document_count(), 3);
        assert_eq!(result.collection_count(), 2);
        assert!(result
            .documents
            .iter()
            .all(|d| d.status == ActionStatus::ParentFailed));
        assert!(dst.get_children().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn type_mismatch_is_overwrite_failed() {
        let fs = MemFs::new();
        let root = fs.root();
        let src_doc = root.create_document("doc").await.unwrap();
        write_doc(&src_doc, b"data").await;
        let src_col = root.create_collection("col").await.unwrap();
        let dst_doc = root.create_document("dst_doc").await.unwrap();
        write_doc(&dst_doc, b"keep").await;
        let dst_col = root.create_collection("dst_col").await.unwrap();
        dst_col.create_document("inner").await.unwrap();

        let engine = CopyMoveEngine::new(InFsActions::new(TransferMode::Copy), true);

        // Document over collection.
        let target = Target::Collection(FsCol::existing(dst_col.clone(), dest_url()));
        let result = engine.execute_document(&src_doc, target).await.unwrap();
        assert_eq!(result.status, ActionStatus::OverwriteFailed);
        assert!(dst_col.get_child("inner").await.unwrap().is_some());

        // Collection over document.
        let target = Target::Document(FsDoc::new(dst_doc, url("http://host/dst_doc")));
        let result = engine
            .execute(&Entry::Collection(src_col), DepthLimit::Infinity, target)
            .await
            .unwrap();
        assert_eq!(result.result.status, ActionStatus::OverwriteFailed);
        assert_eq!(read_child(&root, "dst_doc").await, b"keep");
    }

    #[tokio::test]
    async fn tree_copy_is_isomorphic() {
        let fs = MemFs::new();
        let src = source_tree(&fs).await;
        let dst = fs.root().create_collection("dst").await.unwrap();

        let engine = CopyMoveEngine::new(InFsActions::new(TransferMode::Copy), true);
        let target = FsCol::existing(dst.clone(), dest_url()).missing("copy");
        let result = engine
            .execute(
                &Entry::Collection(src),
                DepthLimit::Infinity,
                Target::Missing(target),
            )
            .await
            .unwrap();

        assert!(result.is_success(), "{result:?}");
        assert_eq!(result.result.status, ActionStatus::Created);
        assert_eq!(result.document_count(), 3);
        assert_eq!(result.collection_count(), 2);

        let copy = match dst.get_child("copy").await.unwrap() {
            Some(Entry::Collection(c)) => c,
            other => panic!("expected collection, got {other:?}"),
        };
        assert_eq!(read_child(&copy, "x.txt").await, b"xx");
        assert!(copy.get_child("empty").await.unwrap().is_some());
        let sub = match copy.get_child("sub").await.unwrap() {
            Some(Entry::Collection(c)) => c,
            other => panic!("expected collection, got {other:?}"),
        };
        assert_eq!(read_child(&sub, "z.txt").await, b"zz");
    }

    #[tokio::test]
    async fn partial_failure_stays_local() {
        let src_fs = MemFs::new();
        let dst_fs = MemFs::new();
        let src = src_fs.root().create_collection("src").await.unwrap();
        let d1 = src.create_document("a").await.unwrap();
        write_doc(&d1, b"1").await;
        let d2 = src.create_document("b").await.unwrap();
        write_doc(&d2, b"2").await;
        let d3 = src.create_document("c").await.unwrap();
        write_doc(&d3, b"3").await;

        let node = CollectionNode {
            collection: src.clone(),
            documents: vec![d1, Arc::new(FailingDoc(d2)), d3],
            collections: Vec::new(),
        };

        let engine = CopyMoveEngine::new(CrossFsActions::new(TransferMode::Copy), true);
        let target = FsCol::existing(dst_fs.root(), url("http://host/")).missing("dst");
        let result = engine
            .execute_collection(&node, Target::Missing(target))
            .await
            .unwrap();

        let statuses: Vec<_> = result.documents.iter().map(|d| d.status).collect();
        assert_eq!(
            statuses,
            vec![
                ActionStatus::Created,
                ActionStatus::CreateFailed,
                ActionStatus::Created,
            ]
        );
        // Only the failing leaf is marked; the collection result is not.
        assert_eq!(result.result.status, ActionStatus::Created);
        assert!(!result.children_succeeded());
        assert!(result.documents[1].error.is_some());
    }

    #[tokio::test]
    async fn move_deletes_emptied_source() {
        let fs = MemFs::new();
        let src = source_tree(&fs).await;
        let dst = fs.root().create_collection("dst").await.unwrap();

        let engine = CopyMoveEngine::new(InFsActions::new(TransferMode::Move), true);
        let target = FsCol::existing(dst.clone(), dest_url()).missing("moved");
        let result = engine
            .execute(
                &Entry::Collection(src),
                DepthLimit::Infinity,
                Target::Missing(target),
            )
            .await
            .unwrap();

        assert!(result.is_success(), "{result:?}");
        assert!(fs.root().get_child("src").await.unwrap().is_none());
        let moved = match dst.get_child("moved").await.unwrap() {
            Some(Entry::Collection(c)) => c,
            other => panic!("expected collection, got {other:?}"),
        };
        assert_eq!(read_child(&moved, "x.txt").await, b"xx");
    }

    #[tokio::test]
    async fn failed_move_keeps_source_collection() {
        let src_fs = MemFs::new();
        let dst_fs = MemFs::new();
        let src = src_fs.root().create_collection("src").await.unwrap();
        let good = src.create_document("good").await.unwrap();
        write_doc(&good, b"ok").await;
        let bad = src.create_document("bad").await.unwrap();
        write_doc(&bad, b"nope").await;

        let node = CollectionNode {
            collection: src.clone(),
            documents: vec![good, Arc::new(FailingDoc(bad))],
            collections: Vec::new(),
        };

        let engine = CopyMoveEngine::new(CrossFsActions::new(TransferMode::Move), true);
        let target = FsCol::existing(dst_fs.root(), url("http://host/")).missing("dst");
        let result = engine
            .execute_collection(&node, Target::Missing(target))
            .await
            .unwrap();

        assert!(!result.children_succeeded());
        // The source collection must survive: it still holds the straggler.
        let src = match src_fs.root().get_child("src").await.unwrap() {
            Some(Entry::Collection(c)) => c,
            other => panic!("expected collection, got {other:?}"),
        };
        assert!(src.get_child("bad").await.unwrap().is_some());
        assert!(src.get_child("good").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn prop_failure_does_not_roll_back_creation() {
        // memfs carries properties, localfs cannot store any; the document
        // is created anyway and only the status reports the loss.
        let src_fs = MemFs::new();
        let src = src_fs.root().create_document("pic").await.unwrap();
        write_doc(&src, b"bytes").await;
        let mut color = Element::new("color");
        color.namespace = Some("urn:example".to_string());
        assert!(src.patch_props(vec![color]).await.unwrap().is_empty());

        let dir = tempfile::tempdir().unwrap();
        let dst_fs = LocalFs::new(dir.path(), false);

        let engine = CopyMoveEngine::new(CrossFsActions::new(TransferMode::Copy), true);
        let target = FsCol::existing(dst_fs.root(), url("http://host/")).missing("pic");
        let result = engine
            .execute_document(&src, Target::Missing(target))
            .await
            .unwrap();

        assert_eq!(result.status, ActionStatus::PropSetFailed);
        assert!(result.failed_props.iter().any(|p| p.name == "color"));
        assert_eq!(read_child(&dst_fs.root(), "pic").await, b"bytes");
    }

    #[tokio::test]
    async fn delete_target_overwrite_is_overwritten() {
        let src_fs = MemFs::new();
        let dst_fs = MemFs::new();
        let src = src_fs.root().create_document("f").await.unwrap();
        write_doc(&src, b"new").await;
        let dst = dst_fs.root().create_document("f").await.unwrap();
        write_doc(&dst, b"old").await;

        let engine = CopyMoveEngine::new(CrossFsActions::new(TransferMode::Copy), true);
        let target = Target::Document(FsDoc::new(dst, url("http://host/f")));
        let result = engine.execute_document(&src, target).await.unwrap();

        assert_eq!(result.status, ActionStatus::Overwritten);
        assert_eq!(read_child(&dst_fs.root(), "f").await, b"new");
    }

    #[tokio::test]
    async fn in_place_overwrite_is_updated() {
        let fs = MemFs::new();
        let root = fs.root();
        let src = root.create_document("src").await.unwrap();
        write_doc(&src, b"new").await;
        let dst = root.create_document("dst").await.unwrap();
        write_doc(&dst, b"old").await;

        let engine = CopyMoveEngine::new(InFsActions::new(TransferMode::Copy), true);
        let target = Target::Document(FsDoc::new(dst, url("http://host/dst")));
        let result = engine.execute_document(&src, target).await.unwrap();

        assert_eq!(result.status, ActionStatus::Updated);
        assert_eq!(read_child(&root, "dst").await, b"new");
    }

    #[tokio::test]
    async fn merge_into_existing_collection() {
        let fs = MemFs::new();
        let src = source_tree(&fs).await;
        let dst = fs.root().create_collection("dst").await.unwrap();
        let keep = dst.create_document("keep.txt").await.unwrap();
        write_doc(&keep, b"kept").await;

        let engine = CopyMoveEngine::new(InFsActions::new(TransferMode::Copy), true);
        let target = Target::Collection(FsCol::existing(dst.clone(), dest_url()));
        let result = engine
            .execute(&Entry::Collection(src), DepthLimit::Infinity, target)
            .await
            .unwrap();

        assert_eq!(result.result.status, ActionStatus::Updated);
        assert!(result.children_succeeded());
        assert_eq!(read_child(&dst, "keep.txt").await, b"kept");
        assert_eq!(read_child(&dst, "x.txt").await, b"xx");
        assert!(dst.get_child("sub").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_create_marks_children_parent_failed() {
        let fs = MemFs::new();
        let src = source_tree(&fs).await;
        let dst = fs.root().create_collection("dst").await.unwrap();

        let engine = CopyMoveEngine::new(InFsActions::new(TransferMode::Copy), true);
        // A name the backend refuses keeps the whole subtree unprocessed.
        let target = FsMissing::new(dst, "bad/name", url("http://host/dst/bad"));
        let result = engine
            .execute(
                &Entry::Collection(src),
                DepthLimit::Infinity,
                Target::Missing(target),
            )
            .await
            .unwrap();

        assert_eq!(result.result.status, ActionStatus::CreateFailed);
        assert!(result.result.error.is_some());
        assert_eq!(result.document_count(), 3);
        assert_eq!(result.collection_count(), 2);
        assert!(result
            .documents
            .iter()
            .all(|d| d.status == ActionStatus::ParentFailed));
        assert!(result
            .collections
            .iter()
            .all(|c| c.result.status == ActionStatus::ParentFailed));
    }

    #[tokio::test]
    async fn depth_zero_copies_bare_collection() {
        let fs = MemFs::new();
        let src = source_tree(&fs).await;
        let dst = fs.root().create_collection("dst").await.unwrap();

        let engine = CopyMoveEngine::new(InFsActions::new(TransferMode::Copy), true);
        let target = FsCol::existing(dst.clone(), dest_url()).missing("copy");
        let result = engine
            .execute(
                &Entry::Collection(src),
                DepthLimit::Finite(0),
                Target::Missing(target),
            )
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(result.document_count(), 0);
        assert_eq!(result.collection_count(), 0);
        let copy = match dst.get_child("copy").await.unwrap() {
            Some(Entry::Collection(c)) => c,
            other => panic!("expected collection, got {other:?}"),
        };
        assert!(copy.get_children().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancellation_is_terminal() {
        let fs = MemFs::new();
        let src = source_tree(&fs).await;
        let dst = fs.root().create_collection("dst").await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let engine = CopyMoveEngine::new(InFsActions::new(TransferMode::Copy), true)
            .with_cancellation(cancel);
        let target = FsCol::existing(dst, dest_url()).missing("copy");
        let err = engine
            .execute(
                &Entry::Collection(src),
                DepthLimit::Infinity,
                Target::Missing(target),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DavError::Cancelled));
    }
}
