//
// Target actions for local destinations. One target triple, two action
// families: InFsActions uses the backend's native copy/rename primitives
// and may overwrite in place, CrossFsActions streams document contents
// between two filesystems and recreates destinations from scratch.
//
use std::sync::Arc;

use url::Url;
use xmltree::Element;

use crate::copymove::result::CollectionActionResult;
use crate::copymove::target::*;
use crate::errors::DavError;
use crate::fs::{DavCollection, DavDocument, DavEntry, PropName};

pub(crate) const COPY_BUF_SIZE: usize = 65536;

/// An empty slot in a local destination collection.
pub struct FsMissing {
    parent: Arc<dyn DavCollection>,
    name: String,
    url: Url,
}

/// An existing local destination document.
pub struct FsDoc {
    doc: Arc<dyn DavDocument>,
    name: String,
    url: Url,
}

/// An existing local destination collection.
pub struct FsCol {
    col: Arc<dyn DavCollection>,
    name: String,
    url: Url,
    created: bool,
}

impl FsMissing {
    pub fn new(parent: Arc<dyn DavCollection>, name: impl Into<String>, url: Url) -> FsMissing {
        FsMissing {
            parent,
            name: name.into(),
            url,
        }
    }
}

impl FsDoc {
    pub fn new(doc: Arc<dyn DavDocument>, url: Url) -> FsDoc {
        FsDoc {
            name: doc.name(),
            doc,
            url,
        }
    }
}

impl FsCol {
    /// Wrap a collection that already existed before this operation.
    pub fn existing(col: Arc<dyn DavCollection>, url: Url) -> FsCol {
        FsCol {
            name: col.name(),
            col,
            url: collection_url(url),
            created: false,
        }
    }
}

impl MissingTarget for FsMissing {
    type Col = FsCol;

    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn create_collection(self) -> TargetFuture<'static, FsCol> {
        Box::pin(async move {
            let col = self.parent.create_collection(&self.name).await?;
            Ok(FsCol {
                col,
                name: self.name,
                url: collection_url(self.url),
                created: true,
            })
        })
    }
}

impl DocumentTarget for FsDoc {
    type Missing = FsMissing;

    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn delete(self) -> TargetFuture<'static, FsMissing> {
        Box::pin(async move {
            let parent = self
                .doc
                .parent()
                .ok_or(DavError::Fs(crate::fs::FsError::GeneralFailure))?;
            let res = self.doc.delete().await?;
            if !res.is_success() {
                return Err(DavError::Status(res.status));
            }
            Ok(FsMissing {
                parent,
                name: self.name,
                url: self.url,
            })
        })
    }

    fn set_props(&self, props: Vec<Element>) -> TargetFuture<'_, Vec<PropName>> {
        Box::pin(async move { Ok(self.doc.patch_props(props).await?) })
    }
}

impl CollectionTarget for FsCol {
    type Missing = FsMissing;
    type Doc = FsDoc;

    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn created(&self) -> bool {
        self.created
    }

    fn missing(&self, name: &str) -> FsMissing {
        FsMissing {
            parent: self.col.clone(),
            name: name.to_string(),
            url: child_url(&self.url, name),
        }
    }

    fn get<'a>(&'a self, name: &'a str) -> TargetFuture<'a, Target<FsMissing, FsDoc, FsCol>> {
        Box::pin(async move {
            match self.col.get_child(name).await? {
                Some(crate::fs::Entry::Collection(col)) => Ok(Target::Collection(FsCol {
                    col,
                    name: name.to_string(),
                    url: collection_url(child_url(&self.url, name)),
                    created: false,
                })),
                Some(crate::fs::Entry::Document(doc)) => Ok(Target::Document(FsDoc {
                    doc,
                    name: name.to_string(),
                    url: child_url(&self.url, name),
                })),
                None => Ok(Target::Missing(self.missing(name))),
            }
        })
    }

    fn delete(self) -> TargetFuture<'static, FsMissing> {
        Box::pin(async move {
            let parent = self
                .col
                .parent()
                .ok_or(DavError::Fs(crate::fs::FsError::Forbidden))?;
            let res = self.col.delete().await?;
            if !res.is_success() {
                return Err(DavError::Status(res.status));
            }
            Ok(FsMissing {
                parent,
                name: self.name,
                url: self.url,
            })
        })
    }

    fn set_props(&self, props: Vec<Element>) -> TargetFuture<'_, Vec<PropName>> {
        Box::pin(async move { Ok(self.col.patch_props(props).await?) })
    }
}

/// Actions for a destination on the *same* filesystem as the source.
pub struct InFsActions {
    mode: TransferMode,
}

impl InFsActions {
    pub fn new(mode: TransferMode) -> InFsActions {
        InFsActions { mode }
    }
}

impl TargetActions for InFsActions {
    type Missing = FsMissing;
    type Doc = FsDoc;
    type Col = FsCol;

    fn mode(&self) -> TransferMode {
        self.mode
    }

    fn existing_behaviour(&self) -> ExistingBehaviour {
        ExistingBehaviour::OverwriteInPlace
    }

    fn put<'a>(
        &'a self,
        source: &'a Arc<dyn DavDocument>,
        target: FsMissing,
    ) -> TargetFuture<'a, FsDoc> {
        Box::pin(async move {
            let doc = match self.mode {
                TransferMode::Copy => source.copy_to(&*target.parent, &target.name).await?,
                TransferMode::Move => source.move_to(&*target.parent, &target.name).await?,
            };
            Ok(FsDoc {
                doc,
                name: target.name,
                url: target.url,
            })
        })
    }

    fn overwrite<'a>(
        &'a self,
        source: &'a Arc<dyn DavDocument>,
        target: &'a FsDoc,
    ) -> TargetFuture<'a, ()> {
        Box::pin(async move {
            let parent = target
                .doc
                .parent()
                .ok_or(DavError::Fs(crate::fs::FsError::GeneralFailure))?;
            let name = target.doc.name();
            match self.mode {
                TransferMode::Copy => source.copy_to(&*parent, &name).await?,
                TransferMode::Move => source.move_to(&*parent, &name).await?,
            };
            Ok(())
        })
    }

    fn cleanup<'a>(
        &'a self,
        source: &'a Arc<dyn DavCollection>,
        _target: &'a FsCol,
        result: &'a CollectionActionResult,
    ) -> TargetFuture<'a, ()> {
        Box::pin(move_cleanup(self.mode, source, result))
    }
}

/// Actions for a destination on a *different* filesystem: stream contents,
/// delete sources explicitly.
pub struct CrossFsActions {
    mode: TransferMode,
}

impl CrossFsActions {
    pub fn new(mode: TransferMode) -> CrossFsActions {
        CrossFsActions { mode }
    }
}

impl TargetActions for CrossFsActions {
    type Missing = FsMissing;
    type Doc = FsDoc;
    type Col = FsCol;

    fn mode(&self) -> TransferMode {
        self.mode
    }

    fn existing_behaviour(&self) -> ExistingBehaviour {
        ExistingBehaviour::DeleteTarget
    }

    fn put<'a>(
        &'a self,
        source: &'a Arc<dyn DavDocument>,
        target: FsMissing,
    ) -> TargetFuture<'a, FsDoc> {
        Box::pin(async move {
            let doc = target.parent.create_document(&target.name).await?;
            stream_copy(source, &doc).await?;
            if self.mode == TransferMode::Move {
                delete_source(&**source).await?;
            }
            Ok(FsDoc {
                doc,
                name: target.name,
                url: target.url,
            })
        })
    }

    fn overwrite<'a>(
        &'a self,
        source: &'a Arc<dyn DavDocument>,
        target: &'a FsDoc,
    ) -> TargetFuture<'a, ()> {
        Box::pin(async move {
            stream_copy(source, &target.doc).await?;
            if self.mode == TransferMode::Move {
                delete_source(&**source).await?;
            }
            Ok(())
        })
    }

    fn cleanup<'a>(
        &'a self,
        source: &'a Arc<dyn DavCollection>,
        _target: &'a FsCol,
        result: &'a CollectionActionResult,
    ) -> TargetFuture<'a, ()> {
        Box::pin(move_cleanup(self.mode, source, result))
    }
}

/// Copy document contents, chunk by chunk.
pub(crate) async fn stream_copy(
    source: &Arc<dyn DavDocument>,
    dest: &Arc<dyn DavDocument>,
) -> Result<(), DavError> {
    let mut src = source.open_read().await?;
    let mut dst = dest.create().await?;
    loop {
        let chunk = src.read_bytes(COPY_BUF_SIZE).await?;
        if chunk.is_empty() {
            break;
        }
        dst.write_bytes(chunk).await?;
    }
    dst.flush().await?;
    Ok(())
}

/// Delete a source entry after a successful MOVE step.
pub(crate) async fn delete_source<E: DavEntry + ?Sized>(source: &E) -> Result<(), DavError> {
    let res = source.delete().await?;
    if !res.is_success() {
        return Err(DavError::Status(res.status));
    }
    Ok(())
}

/// MOVE deletes the emptied source collection once all children are done.
/// A partial failure leaves the source in place: whatever was not moved
/// must stay reachable.
pub(crate) async fn move_cleanup(
    mode: TransferMode,
    source: &Arc<dyn DavCollection>,
    result: &CollectionActionResult,
) -> Result<(), DavError> {
    if mode == TransferMode::Move && result.children_succeeded() {
        delete_source(&**source).await?;
    }
    Ok(())
}

#[cfg(test)]
#[cfg(feature = "memfs")]
mod tests {
    use super::*;
    use crate::copymove::result::{ActionResult, ActionStatus};
    use crate::fs::testutil::{read_doc, write_doc};
    use crate::fs::memfs::MemFs;
    use crate::fs::DavFileSystem;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn in_fs_put_copies_natively() {
        let fs = MemFs::new();
        let root = fs.root();
        let src = root.create_document("src.txt").await.unwrap();
        write_doc(&src, b"hello").await;

        let actions = InFsActions::new(TransferMode::Copy);
        let missing = FsMissing::new(root.clone(), "dst.txt", url("http://x/dst.txt"));
        let doc = actions.put(&src, missing).await.unwrap();
        assert_eq!(doc.url().as_str(), "http://x/dst.txt");

        match root.get_child("dst.txt").await.unwrap() {
            Some(crate::fs::Entry::Document(d)) => assert_eq!(read_doc(&d).await, b"hello"),
            other => panic!("expected document, got {other:?}"),
        }
        assert!(root.get_child("src.txt").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cross_fs_move_streams_and_deletes_source() {
        let src_fs = MemFs::new();
        let dst_fs = MemFs::new();
        assert_ne!(src_fs.fs_id(), dst_fs.fs_id());

        let src = src_fs.root().create_document("a").await.unwrap();
        write_doc(&src, b"payload").await;

        let actions = CrossFsActions::new(TransferMode::Move);
        let missing = FsMissing::new(dst_fs.root(), "a", url("http://y/a"));
        actions.put(&src, missing).await.unwrap();

        match dst_fs.root().get_child("a").await.unwrap() {
            Some(crate::fs::Entry::Document(d)) => assert_eq!(read_doc(&d).await, b"payload"),
            other => panic!("expected document, got {other:?}"),
        }
        assert!(src_fs.root().get_child("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cleanup_keeps_source_on_child_failure() {
        let fs = MemFs::new();
        let root = fs.root();
        let col = root.create_collection("col").await.unwrap();
        col.create_document("straggler").await.unwrap();

        let actions = InFsActions::new(TransferMode::Move);
        let target = FsCol::existing(root.clone(), url("http://x/"));

        let mut result = CollectionActionResult::leaf(ActionResult::new(
            ActionStatus::Created,
            "col",
            url("http://x/col/"),
        ));
        result.documents.push(ActionResult::new(
            ActionStatus::CreateFailed,
            "straggler",
            url("http://x/col/straggler"),
        ));
        actions.cleanup(&col, &target, &result).await.unwrap();
        assert!(root.get_child("col").await.unwrap().is_some());

        result.documents[0].status = ActionStatus::Created;
        actions.cleanup(&col, &target, &result).await.unwrap();
        assert!(root.get_child("col").await.unwrap().is_none());
    }
}
