//! Ephemeral in-memory filesystem.
//!
//! Supports DAV dead properties, so this is the backend that exercises
//! property propagation. The whole tree lives under one `RwLock`; every
//! operation re-navigates from the root, which makes entries robust against
//! concurrent deletion of what they point at (they simply start returning
//! `NotFound`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use futures_util::FutureExt;
use http::StatusCode;
use parking_lot::RwLock;
use xmltree::Element;

use crate::davpath::DavPath;
use crate::fs::*;
use crate::util::systemtime_to_rfc3339;
use crate::xmltree_ext::{dav_text, NS_DAV};

/// DAV: properties that are computed, never stored.
const LIVE_PROPS: &[&str] = &[
    "resourcetype",
    "getcontentlength",
    "getlastmodified",
    "getetag",
];

/// In-memory filesystem.
#[derive(Clone)]
pub struct MemFs {
    inner: Arc<MemInner>,
}

struct MemInner {
    root: RwLock<MemNode>,
}

struct MemNode {
    kind: MemKind,
    created: SystemTime,
    modified: SystemTime,
    props: Vec<Element>,
}

enum MemKind {
    Dir(HashMap<String, MemNode>),
    File(Vec<u8>),
}

impl MemNode {
    fn new_dir() -> MemNode {
        let now = SystemTime::now();
        MemNode {
            kind: MemKind::Dir(HashMap::new()),
            created: now,
            modified: now,
            props: Vec::new(),
        }
    }

    fn new_file() -> MemNode {
        let now = SystemTime::now();
        MemNode {
            kind: MemKind::File(Vec::new()),
            created: now,
            modified: now,
            props: Vec::new(),
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.kind, MemKind::Dir(_))
    }

    fn len(&self) -> u64 {
        match &self.kind {
            MemKind::Dir(_) => 0,
            MemKind::File(data) => data.len() as u64,
        }
    }
}

impl MemFs {
    pub fn new() -> MemFs {
        MemFs {
            inner: Arc::new(MemInner {
                root: RwLock::new(MemNode::new_dir()),
            }),
        }
    }
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl DavFileSystem for MemFs {
    fn root(&self) -> Arc<dyn DavCollection> {
        Arc::new(MemCollection {
            fs: self.inner.clone(),
            path: Vec::new(),
        })
    }

    fn fs_id(&self) -> FsId {
        FsId::from_ptr(Arc::as_ptr(&self.inner))
    }
}

impl MemInner {
    fn with_node<T>(
        &self,
        path: &[String],
        f: impl FnOnce(&MemNode) -> FsResult<T>,
    ) -> FsResult<T> {
        let root = self.root.read();
        let mut node = &*root;
        for seg in path {
            node = match &node.kind {
                MemKind::Dir(children) => children.get(seg).ok_or(FsError::NotFound)?,
                MemKind::File(_) => return Err(FsError::NotADirectory),
            };
        }
        f(node)
    }

    fn with_node_mut<T>(
        &self,
        path: &[String],
        f: impl FnOnce(&mut MemNode) -> FsResult<T>,
    ) -> FsResult<T> {
        let mut root = self.root.write();
        let mut node = &mut *root;
        for seg in path {
            node = match &mut node.kind {
                MemKind::Dir(children) => children.get_mut(seg).ok_or(FsError::NotFound)?,
                MemKind::File(_) => return Err(FsError::NotADirectory),
            };
        }
        f(node)
    }

    /// Navigate to a directory node and hand out its child map.
    fn with_dir_mut<T>(
        &self,
        path: &[String],
        f: impl FnOnce(&mut HashMap<String, MemNode>) -> FsResult<T>,
    ) -> FsResult<T> {
        self.with_node_mut(path, |node| match &mut node.kind {
            MemKind::Dir(children) => f(children),
            MemKind::File(_) => Err(FsError::NotADirectory),
        })
    }
}

fn join_path(path: &[String], name: &str) -> Vec<String> {
    let mut p = path.to_vec();
    p.push(name.to_string());
    p
}

fn check_name(name: &str) -> FsResult<()> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(FsError::Forbidden);
    }
    Ok(())
}

fn dav_path(path: &[String], dir: bool) -> DavPath {
    let mut s = format!("/{}", path.join("/"));
    if dir && !s.ends_with('/') {
        s.push('/');
    }
    // Built from single validated segments, cannot fail.
    DavPath::new(&s).unwrap()
}

/// Path segments of another entry on this filesystem.
fn segments_of(entry_path: &DavPath) -> Vec<String> {
    entry_path.segments().into_iter().map(|s| s.name).collect()
}

fn upsert_prop(props: &mut Vec<Element>, el: Element) {
    let name = PropName::from(&el);
    props.retain(|p| PropName::from(p) != name);
    props.push(el);
}

fn writeable_props_of(node: &MemNode) -> Vec<Element> {
    let mut props = node.props.clone();
    let has_creationdate = props
        .iter()
        .any(|p| p.name == "creationdate" && p.namespace.as_deref() == Some(NS_DAV));
    if !has_creationdate {
        props.push(dav_text("creationdate", &systemtime_to_rfc3339(node.created)));
    }
    props
}

fn patch_props_of(node: &mut MemNode, props: Vec<Element>) -> Vec<PropName> {
    let mut failed = Vec::new();
    for el in props {
        let live = el.namespace.as_deref() == Some(NS_DAV) && LIVE_PROPS.contains(&el.name.as_str());
        if live {
            failed.push(PropName::from(&el));
        } else {
            upsert_prop(&mut node.props, el);
        }
    }
    failed
}

#[derive(Debug, Clone)]
struct MemMetaData {
    len: u64,
    created: SystemTime,
    modified: SystemTime,
    is_dir: bool,
}

impl DavMetaData for MemMetaData {
    fn len(&self) -> u64 {
        self.len
    }
    fn created(&self) -> FsResult<SystemTime> {
        Ok(self.created)
    }
    fn modified(&self) -> FsResult<SystemTime> {
        Ok(self.modified)
    }
    fn is_dir(&self) -> bool {
        self.is_dir
    }
}

pub(crate) struct MemCollection {
    fs: Arc<MemInner>,
    path: Vec<String>,
}

pub(crate) struct MemDocument {
    fs: Arc<MemInner>,
    path: Vec<String>,
}

impl DavEntry for MemCollection {
    fn name(&self) -> String {
        self.path.last().cloned().unwrap_or_default()
    }

    fn path(&self) -> DavPath {
        dav_path(&self.path, true)
    }

    fn parent(&self) -> Option<Arc<dyn DavCollection>> {
        if self.path.is_empty() {
            return None;
        }
        let mut path = self.path.clone();
        path.pop();
        Some(Arc::new(MemCollection {
            fs: self.fs.clone(),
            path,
        }))
    }

    fn fs_id(&self) -> FsId {
        FsId::from_ptr(Arc::as_ptr(&self.fs))
    }

    fn metadata(&self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        async move {
            self.fs.with_node(&self.path, |node| {
                Ok(Box::new(MemMetaData {
                    len: node.len(),
                    created: node.created,
                    modified: node.modified,
                    is_dir: true,
                }) as Box<dyn DavMetaData>)
            })
        }
        .boxed()
    }

    fn delete(&self) -> FsFuture<'_, DeleteResult> {
        async move {
            if self.path.is_empty() {
                return Ok(DeleteResult::failed(StatusCode::FORBIDDEN, self.path()));
            }
            let (parent, name) = (&self.path[..self.path.len() - 1], self.name());
            let res = self.fs.with_dir_mut(parent, |children| {
                children.remove(&name).ok_or(FsError::NotFound)?;
                Ok(())
            });
            Ok(match res {
                Ok(()) => DeleteResult::ok(),
                Err(e) => DeleteResult::failed(e.statuscode(), self.path()),
            })
        }
        .boxed()
    }

    fn writeable_props(&self) -> FsFuture<'_, Vec<Element>> {
        async move { self.fs.with_node(&self.path, |node| Ok(writeable_props_of(node))) }.boxed()
    }

    fn patch_props(&self, props: Vec<Element>) -> FsFuture<'_, Vec<PropName>> {
        async move {
            self.fs
                .with_node_mut(&self.path, |node| Ok(patch_props_of(node, props)))
        }
        .boxed()
    }
}

impl DavCollection for MemCollection {
    fn get_child<'a>(&'a self, name: &'a str) -> FsFuture<'a, Option<Entry>> {
        async move {
            check_name(name)?;
            let is_dir = match self.fs.with_node(&self.path, |node| match &node.kind {
                MemKind::Dir(children) => Ok(children.get(name).map(|c| c.is_dir())),
                MemKind::File(_) => Err(FsError::NotADirectory),
            })? {
                Some(is_dir) => is_dir,
                None => return Ok(None),
            };
            let path = join_path(&self.path, name);
            Ok(Some(if is_dir {
                Entry::Collection(Arc::new(MemCollection {
                    fs: self.fs.clone(),
                    path,
                }))
            } else {
                Entry::Document(Arc::new(MemDocument {
                    fs: self.fs.clone(),
                    path,
                }))
            }))
        }
        .boxed()
    }

    fn get_children(&self) -> FsFuture<'_, Vec<Entry>> {
        async move {
            let mut names = self.fs.with_node(&self.path, |node| match &node.kind {
                MemKind::Dir(children) => Ok(children
                    .iter()
                    .map(|(name, node)| (name.clone(), node.is_dir()))
                    .collect::<Vec<_>>()),
                MemKind::File(_) => Err(FsError::NotADirectory),
            })?;
            names.sort();
            Ok(names
                .into_iter()
                .map(|(name, is_dir)| {
                    let path = join_path(&self.path, &name);
                    if is_dir {
                        Entry::Collection(Arc::new(MemCollection {
                            fs: self.fs.clone(),
                            path,
                        }) as Arc<dyn DavCollection>)
                    } else {
                        Entry::Document(Arc::new(MemDocument {
                            fs: self.fs.clone(),
                            path,
                        }) as Arc<dyn DavDocument>)
                    }
                })
                .collect())
        }
        .boxed()
    }

    fn create_document<'a>(&'a self, name: &'a str) -> FsFuture<'a, Arc<dyn DavDocument>> {
        async move {
            trace!("FS: create_document {:?} {name}", self.path());
            check_name(name)?;
            self.fs.with_dir_mut(&self.path, |children| {
                if children.contains_key(name) {
                    return Err(FsError::Exists);
                }
                children.insert(name.to_string(), MemNode::new_file());
                Ok(())
            })?;
            Ok(Arc::new(MemDocument {
                fs: self.fs.clone(),
                path: join_path(&self.path, name),
            }) as Arc<dyn DavDocument>)
        }
        .boxed()
    }

    fn create_collection<'a>(&'a self, name: &'a str) -> FsFuture<'a, Arc<dyn DavCollection>> {
        async move {
            trace!("FS: create_collection {:?} {name}", self.path());
            check_name(name)?;
            self.fs.with_dir_mut(&self.path, |children| {
                if children.contains_key(name) {
                    return Err(FsError::Exists);
                }
                children.insert(name.to_string(), MemNode::new_dir());
                Ok(())
            })?;
            Ok(Arc::new(MemCollection {
                fs: self.fs.clone(),
                path: join_path(&self.path, name),
            }) as Arc<dyn DavCollection>)
        }
        .boxed()
    }
}

impl DavEntry for MemDocument {
    fn name(&self) -> String {
        self.path.last().cloned().unwrap_or_default()
    }

    fn path(&self) -> DavPath {
        dav_path(&self.path, false)
    }

    fn parent(&self) -> Option<Arc<dyn DavCollection>> {
        let mut path = self.path.clone();
        path.pop();
        Some(Arc::new(MemCollection {
            fs: self.fs.clone(),
            path,
        }))
    }

    fn fs_id(&self) -> FsId {
        FsId::from_ptr(Arc::as_ptr(&self.fs))
    }

    fn metadata(&self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        async move {
            self.fs.with_node(&self.path, |node| {
                Ok(Box::new(MemMetaData {
                    len: node.len(),
                    created: node.created,
                    modified: node.modified,
                    is_dir: node.is_dir(),
                }) as Box<dyn DavMetaData>)
            })
        }
        .boxed()
    }

    fn delete(&self) -> FsFuture<'_, DeleteResult> {
        async move {
            let (parent, name) = (&self.path[..self.path.len() - 1], self.name());
            let res = self.fs.with_dir_mut(parent, |children| {
                children.remove(&name).ok_or(FsError::NotFound)?;
                Ok(())
            });
            Ok(match res {
                Ok(()) => DeleteResult::ok(),
                Err(e) => DeleteResult::failed(e.statuscode(), self.path()),
            })
        }
        .boxed()
    }

    fn writeable_props(&self) -> FsFuture<'_, Vec<Element>> {
        async move { self.fs.with_node(&self.path, |node| Ok(writeable_props_of(node))) }.boxed()
    }

    fn patch_props(&self, props: Vec<Element>) -> FsFuture<'_, Vec<PropName>> {
        async move {
            self.fs
                .with_node_mut(&self.path, |node| Ok(patch_props_of(node, props)))
        }
        .boxed()
    }
}

impl DavDocument for MemDocument {
    fn open_read(&self) -> FsFuture<'_, Box<dyn DavFile>> {
        async move {
            // Check the node exists and is a file before handing out a handle.
            self.fs.with_node(&self.path, |node| match node.kind {
                MemKind::File(_) => Ok(()),
                MemKind::Dir(_) => Err(FsError::NotADirectory),
            })?;
            Ok(Box::new(MemFile {
                fs: self.fs.clone(),
                path: self.path.clone(),
                pos: 0,
            }) as Box<dyn DavFile>)
        }
        .boxed()
    }

    fn create(&self) -> FsFuture<'_, Box<dyn DavFile>> {
        async move {
            self.fs.with_node_mut(&self.path, |node| match &mut node.kind {
                MemKind::File(data) => {
                    data.clear();
                    node.modified = SystemTime::now();
                    Ok(())
                }
                MemKind::Dir(_) => Err(FsError::NotADirectory),
            })?;
            Ok(Box::new(MemFile {
                fs: self.fs.clone(),
                path: self.path.clone(),
                pos: 0,
            }) as Box<dyn DavFile>)
        }
        .boxed()
    }

    fn copy_to<'a>(
        &'a self,
        dest: &'a dyn DavCollection,
        name: &'a str,
    ) -> FsFuture<'a, Arc<dyn DavDocument>> {
        async move {
            trace!("FS: copy {:?} -> {:?} {name}", self.path(), dest.path());
            check_name(name)?;
            let (data, props, created) = self.fs.with_node(&self.path, |node| match &node.kind {
                MemKind::File(data) => Ok((data.clone(), node.props.clone(), node.created)),
                MemKind::Dir(_) => Err(FsError::NotADirectory),
            })?;
            let dest_path = segments_of(&dest.path());
            self.fs.with_dir_mut(&dest_path, |children| {
                let mut node = MemNode::new_file();
                node.kind = MemKind::File(data);
                node.props = props;
                node.created = created;
                children.insert(name.to_string(), node);
                Ok(())
            })?;
            Ok(Arc::new(MemDocument {
                fs: self.fs.clone(),
                path: join_path(&dest_path, name),
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
            trace!("FS: rename {:?} -> {:?} {name}", self.path(), dest.path());
            check_name(name)?;
            let (parent, own_name) = (&self.path[..self.path.len() - 1], self.name());
            let node = self.fs.with_dir_mut(parent, |children| {
                children.remove(&own_name).ok_or(FsError::NotFound)
            })?;
            let dest_path = segments_of(&dest.path());
            self.fs.with_dir_mut(&dest_path, |children| {
                children.insert(name.to_string(), node);
                Ok(())
            })?;
            Ok(Arc::new(MemDocument {
                fs: self.fs.clone(),
                path: join_path(&dest_path, name),
            }) as Arc<dyn DavDocument>)
        }
        .boxed()
    }
}

struct MemFile {
    fs: Arc<MemInner>,
    path: Vec<String>,
    pos: usize,
}

impl DavFile for MemFile {
    fn read_bytes(&mut self, count: usize) -> FsFuture<'_, Bytes> {
        async move {
            let pos = self.pos;
            let chunk = self.fs.with_node(&self.path, |node| match &node.kind {
                MemKind::File(data) => {
                    let end = (pos + count).min(data.len());
                    Ok(Bytes::copy_from_slice(&data[pos.min(data.len())..end]))
                }
                MemKind::Dir(_) => Err(FsError::NotADirectory),
            })?;
            self.pos += chunk.len();
            Ok(chunk)
        }
        .boxed()
    }

    fn write_bytes(&mut self, buf: Bytes) -> FsFuture<'_, ()> {
        async move {
            self.fs.with_node_mut(&self.path, |node| match &mut node.kind {
                MemKind::File(data) => {
                    data.extend_from_slice(&buf);
                    Ok(())
                }
                MemKind::Dir(_) => Err(FsError::NotADirectory),
            })
        }
        .boxed()
    }

    fn flush(&mut self) -> FsFuture<'_, ()> {
        async move {
            self.fs.with_node_mut(&self.path, |node| {
                node.modified = SystemTime::now();
                Ok(())
            })
        }
        .boxed()
    }
}
