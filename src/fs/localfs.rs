//! Local filesystem access.
//!
//! This implementation is stateless: entries are value-like snapshots of a
//! path below the base directory, and every operation goes straight to
//! `tokio::fs`. There is no dead-property store, so `writeable_props`
//! reports nothing and `patch_props` fails every property it is given.

use std::io;
#[cfg(unix)]
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::{Bytes, BytesMut};
use futures_util::{FutureExt, TryFutureExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use xmltree::Element;

use crate::davpath::DavPath;
use crate::fs::*;

/// Local filesystem implementation.
///
/// If `public` is set to true, all files and directories created will be
/// publically readable (mode 644/755), otherwise they will be private
/// (mode 600/700). Umask still overrides this.
#[derive(Clone)]
pub struct LocalFs {
    inner: Arc<LocalInner>,
}

struct LocalInner {
    basedir: PathBuf,
    public: bool,
}

impl LocalFs {
    /// Create a new local filesystem backend serving `base`.
    pub fn new(base: impl Into<PathBuf>, public: bool) -> LocalFs {
        LocalFs {
            inner: Arc::new(LocalInner {
                basedir: base.into(),
                public,
            }),
        }
    }
}

impl DavFileSystem for LocalFs {
    fn root(&self) -> Arc<dyn DavCollection> {
        Arc::new(LocalCollection {
            fs: self.inner.clone(),
            rel: PathBuf::new(),
        })
    }

    fn fs_id(&self) -> FsId {
        FsId::from_ptr(Arc::as_ptr(&self.inner))
    }
}

impl LocalInner {
    fn abs_path(&self, rel: &PathBuf) -> PathBuf {
        self.basedir.join(rel)
    }
}

fn check_name(name: &str) -> FsResult<()> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\0')
        || name == "."
        || name == ".."
    {
        return Err(FsError::Forbidden);
    }
    Ok(())
}

fn entry_name(rel: &PathBuf) -> String {
    rel.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn entry_path(rel: &PathBuf, dir: bool) -> DavPath {
    let mut s = String::from("/");
    let mut first = true;
    for c in rel.components() {
        if !first {
            s.push('/');
        }
        s.push_str(&c.as_os_str().to_string_lossy());
        first = false;
    }
    if dir && !s.ends_with('/') {
        s.push('/');
    }
    // Built from single validated names, cannot fail.
    DavPath::new(&s).unwrap()
}

fn parent_of(fs: &Arc<LocalInner>, rel: &PathBuf) -> Option<Arc<dyn DavCollection>> {
    rel.parent().map(|p| {
        Arc::new(LocalCollection {
            fs: fs.clone(),
            rel: p.to_path_buf(),
        }) as Arc<dyn DavCollection>
    })
}

pub(crate) struct LocalCollection {
    fs: Arc<LocalInner>,
    rel: PathBuf,
}

pub(crate) struct LocalDocument {
    fs: Arc<LocalInner>,
    rel: PathBuf,
}

#[derive(Debug)]
struct LocalFsFile(tokio::fs::File);

impl DavEntry for LocalCollection {
    fn name(&self) -> String {
        entry_name(&self.rel)
    }

    fn path(&self) -> DavPath {
        entry_path(&self.rel, true)
    }

    fn parent(&self) -> Option<Arc<dyn DavCollection>> {
        parent_of(&self.fs, &self.rel)
    }

    fn fs_id(&self) -> FsId {
        FsId::from_ptr(Arc::as_ptr(&self.fs))
    }

    fn metadata(&self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        async move {
            let meta = tokio::fs::metadata(self.fs.abs_path(&self.rel)).await?;
            Ok(Box::new(meta) as _)
        }
        .boxed()
    }

    fn delete(&self) -> FsFuture<'_, DeleteResult> {
        async move {
            trace!("FS: remove_dir {:?}", self.path());
            if self.rel.as_os_str().is_empty() {
                return Ok(DeleteResult::failed(
                    http::StatusCode::FORBIDDEN,
                    self.path(),
                ));
            }
            match tokio::fs::remove_dir_all(self.fs.abs_path(&self.rel)).await {
                Ok(()) => Ok(DeleteResult::ok()),
                Err(e) => Ok(DeleteResult::failed(
                    FsError::from(e).statuscode(),
                    self.path(),
                )),
            }
        }
        .boxed()
    }

    fn writeable_props(&self) -> FsFuture<'_, Vec<Element>> {
        async move { Ok(Vec::new()) }.boxed()
    }

    fn patch_props(&self, props: Vec<Element>) -> FsFuture<'_, Vec<PropName>> {
        // No property store.
        async move { Ok(props.iter().map(PropName::from).collect()) }.boxed()
    }
}

impl DavCollection for LocalCollection {
    fn get_child<'a>(&'a self, name: &'a str) -> FsFuture<'a, Option<Entry>> {
        async move {
            check_name(name)?;
            let rel = self.rel.join(name);
            let meta = match tokio::fs::metadata(self.fs.abs_path(&rel)).await {
                Ok(meta) => meta,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            Ok(Some(if meta.is_dir() {
                Entry::Collection(Arc::new(LocalCollection {
                    fs: self.fs.clone(),
                    rel,
                }))
            } else {
                Entry::Document(Arc::new(LocalDocument {
                    fs: self.fs.clone(),
                    rel,
                }))
            }))
        }
        .boxed()
    }

    fn get_children(&self) -> FsFuture<'_, Vec<Entry>> {
        async move {
            trace!("FS: read_dir {:?}", self.path());
            let mut read_dir = tokio::fs::read_dir(self.fs.abs_path(&self.rel)).await?;
            let mut entries = Vec::new();
            while let Some(entry) = read_dir.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let meta = match entry.metadata().await {
                    Ok(meta) => meta,
                    Err(e) => {
                        debug!("read_dir: metadata for {name:?} failed: {e}");
                        continue;
                    }
                };
                let rel = self.rel.join(&name);
                entries.push(if meta.is_dir() {
                    Entry::Collection(Arc::new(LocalCollection {
                        fs: self.fs.clone(),
                        rel,
                    }) as Arc<dyn DavCollection>)
                } else {
                    Entry::Document(Arc::new(LocalDocument {
                        fs: self.fs.clone(),
                        rel,
                    }) as Arc<dyn DavDocument>)
                });
            }
            entries.sort_by_key(|e| e.name());
            Ok(entries)
        }
        .boxed()
    }

    fn create_document<'a>(&'a self, name: &'a str) -> FsFuture<'a, Arc<dyn DavDocument>> {
        async move {
            trace!("FS: create_document {:?} {name}", self.path());
            check_name(name)?;
            let rel = self.rel.join(name);
            let mut opt = tokio::fs::OpenOptions::new();
            opt.write(true).create_new(true);
            #[cfg(unix)]
            if self.fs.public {
                opt.mode(0o644);
            } else {
                opt.mode(0o600);
            }
            opt.open(self.fs.abs_path(&rel)).await?;
            Ok(Arc::new(LocalDocument {
                fs: self.fs.clone(),
                rel,
            }) as Arc<dyn DavDocument>)
        }
        .boxed()
    }

    fn create_collection<'a>(&'a self, name: &'a str) -> FsFuture<'a, Arc<dyn DavCollection>> {
        async move {
            trace!("FS: create_dir {:?} {name}", self.path());
            check_name(name)?;
            let rel = self.rel.join(name);
            #[allow(unused_mut)]
            let mut dir = tokio::fs::DirBuilder::new();
            #[cfg(unix)]
            dir.mode(if self.fs.public { 0o755 } else { 0o700 });
            dir.create(self.fs.abs_path(&rel)).await?;
            Ok(Arc::new(LocalCollection {
                fs: self.fs.clone(),
                rel,
            }) as Arc<dyn DavCollection>)
        }
        .boxed()
    }
}

impl DavEntry for LocalDocument {
    fn name(&self) -> String {
        entry_name(&self.rel)
    }

    fn path(&self) -> DavPath {
        entry_path(&self.rel, false)
    }

    fn parent(&self) -> Option<Arc<dyn DavCollection>> {
        parent_of(&self.fs, &self.rel)
    }

    fn fs_id(&self) -> FsId {
        FsId::from_ptr(Arc::as_ptr(&self.fs))
    }

    fn metadata(&self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        async move {
            let meta = tokio::fs::metadata(self.fs.abs_path(&self.rel)).await?;
            Ok(Box::new(meta) as _)
        }
        .boxed()
    }

    fn delete(&self) -> FsFuture<'_, DeleteResult> {
        async move {
            trace!("FS: remove_file {:?}", self.path());
            match tokio::fs::remove_file(self.fs.abs_path(&self.rel)).await {
                Ok(()) => Ok(DeleteResult::ok()),
                Err(e) => Ok(DeleteResult::failed(
                    FsError::from(e).statuscode(),
                    self.path(),
                )),
            }
        }
        .boxed()
    }

    fn writeable_props(&self) -> FsFuture<'_, Vec<Element>> {
        async move { Ok(Vec::new()) }.boxed()
    }

    fn patch_props(&self, props: Vec<Element>) -> FsFuture<'_, Vec<PropName>> {
        async move { Ok(props.iter().map(PropName::from).collect()) }.boxed()
    }
}

impl DavDocument for LocalDocument {
    fn open_read(&self) -> FsFuture<'_, Box<dyn DavFile>> {
        async move {
            trace!("FS: open {:?}", self.path());
            let file = tokio::fs::OpenOptions::new()
                .read(true)
                .open(self.fs.abs_path(&self.rel))
                .await?;
            Ok(Box::new(LocalFsFile(file)) as Box<dyn DavFile>)
        }
        .boxed()
    }

    fn create(&self) -> FsFuture<'_, Box<dyn DavFile>> {
        async move {
            trace!("FS: create {:?}", self.path());
            let mut opt = tokio::fs::OpenOptions::new();
            opt.write(true).truncate(true).create(true);
            #[cfg(unix)]
            if self.fs.public {
                opt.mode(0o644);
            } else {
                opt.mode(0o600);
            }
            let file = opt.open(self.fs.abs_path(&self.rel)).await?;
            Ok(Box::new(LocalFsFile(file)) as Box<dyn DavFile>)
        }
        .boxed()
    }

    fn copy_to<'a>(
        &'a self,
        dest: &'a dyn DavCollection,
        name: &'a str,
    ) -> FsFuture<'a, Arc<dyn DavDocument>> {
        async move {
            check_name(name)?;
            let rel = rel_of(&dest.path()).join(name);
            let p_from = self.fs.abs_path(&self.rel);
            let p_to = self.fs.abs_path(&rel);
            trace!("FS: copy {p_from:?} {p_to:?}");
            if let Err(e) = tokio::fs::copy(&p_from, &p_to).await {
                debug!("copy({p_from:?}, {p_to:?}) failed: {e}");
                return Err(e.into());
            }
            Ok(Arc::new(LocalDocument {
                fs: self.fs.clone(),
                rel,
            }) as Arc<dyn DavDocument>)
        }
        .boxed()
    }

    fn move_to<'a>(
        &'a self,
        dest: &'a dyn DavCollection,
        name: &'a str,
    ) -> FsFuture<'a, Arc<dyn DavDocument>> {
        async move {
            check_name(name)?;
            let rel = rel_of(&dest.path()).join(name);
            let p_from = self.fs.abs_path(&self.rel);
            let p_to = self.fs.abs_path(&rel);
            trace!("FS: rename {p_from:?} {p_to:?}");
            match tokio::fs::rename(&p_from, &p_to).await {
                Ok(()) => {}
                Err(e) => {
                    // webdav allows a rename from a directory to a file.
                    // note that this check is racy, and I'm not quite sure what
                    // we should do if the source is a symlink. anyway ...
                    #[cfg(unix)]
                    if e.raw_os_error() == Some(libc::ENOTDIR) && p_from.is_dir() {
                        let _ = tokio::fs::remove_file(&p_to).await;
                        tokio::fs::rename(p_from, p_to).await?;
                        return Ok(Arc::new(LocalDocument {
                            fs: self.fs.clone(),
                            rel,
                        }) as Arc<dyn DavDocument>);
                    }
                    return Err(e.into());
                }
            }
            Ok(Arc::new(LocalDocument {
                fs: self.fs.clone(),
                rel,
            }) as Arc<dyn DavDocument>)
        }
        .boxed()
    }
}

/// Relative os path of another entry on this filesystem.
fn rel_of(path: &DavPath) -> PathBuf {
    let mut rel = PathBuf::new();
    for seg in path.segments() {
        rel.push(seg.name);
    }
    rel
}

impl DavFile for LocalFsFile {
    fn read_bytes(&mut self, count: usize) -> FsFuture<'_, Bytes> {
        async move {
            let mut buf = BytesMut::with_capacity(count);
            self.0.read_buf(&mut buf).await?;
            Ok(buf.freeze())
        }
        .boxed()
    }

    fn write_bytes(&mut self, buf: Bytes) -> FsFuture<'_, ()> {
        async move { Ok(self.0.write_all(&buf).await?) }.boxed()
    }

    fn flush(&mut self) -> FsFuture<'_, ()> {
        self.0.sync_all().map_err(Into::into).boxed()
    }
}

impl DavMetaData for std::fs::Metadata {
    fn len(&self) -> u64 {
        self.len()
    }
    fn created(&self) -> FsResult<SystemTime> {
        self.created().map_err(|e| e.into())
    }
    fn modified(&self) -> FsResult<SystemTime> {
        self.modified().map_err(|e| e.into())
    }
    fn is_dir(&self) -> bool {
        self.is_dir()
    }
    fn is_file(&self) -> bool {
        self.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::testutil::{read_doc, write_doc};

    #[tokio::test]
    async fn create_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path(), false);
        let root = fs.root();

        let sub = root.create_collection("sub").await.unwrap();
        let doc = sub.create_document("file.txt").await.unwrap();
        write_doc(&doc, b"content").await;

        assert_eq!(doc.path().as_str(), "/sub/file.txt");
        assert_eq!(read_doc(&doc).await, b"content");

        let children = root.get_children().await.unwrap();
        assert_eq!(children.len(), 1);
        assert!(children[0].is_collection());

        assert!(sub.delete().await.unwrap().is_success());
        assert!(root.get_child("sub").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_document_requires_absence() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path(), false);
        let root = fs.root();
        root.create_document("x").await.unwrap();
        assert!(matches!(
            root.create_document("x").await,
            Err(FsError::Exists)
        ));
    }

    #[tokio::test]
    async fn native_copy_and_move() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path(), false);
        let root = fs.root();
        let src = root.create_document("a").await.unwrap();
        write_doc(&src, b"abc").await;
        let dst = root.create_collection("d").await.unwrap();

        let copied = src.copy_to(&*dst, "b").await.unwrap();
        assert_eq!(read_doc(&copied).await, b"abc");
        assert!(root.get_child("a").await.unwrap().is_some());

        let moved = src.move_to(&*dst, "c").await.unwrap();
        assert_eq!(read_doc(&moved).await, b"abc");
        assert!(root.get_child("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn no_property_store() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path(), false);
        let root = fs.root();
        let doc = root.create_document("x").await.unwrap();
        assert!(doc.writeable_props().await.unwrap().is_empty());
        let mut el = Element::new("color");
        el.namespace = Some("urn:example".to_string());
        let failed = doc.patch_props(vec![el]).await.unwrap();
        assert_eq!(failed.len(), 1);
    }

    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;

    #[cfg(unix)]
    #[tokio::test]
    async fn public_mode_bits() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path(), true);
        let root = fs.root();
        root.create_document("pub.txt").await.unwrap();
        let meta = std::fs::metadata(dir.path().join("pub.txt")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o644 & !umask_bits());
    }

    #[cfg(unix)]
    fn umask_bits() -> u32 {
        // The umask also applies to our mode bits; read it without changing it.
        unsafe {
            let cur = libc::umask(0);
            libc::umask(cur);
            cur as u32
        }
    }
}
