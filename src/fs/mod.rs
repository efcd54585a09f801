//! Filesystem interface.
//!
//! The engine does not talk to disks or HTTP directly; it drives the
//! entry-based abstraction defined here. An entry is either a collection
//! (directory-like, can enumerate and create children) or a document
//! (byte-stream leaf). Entries are value-like snapshots: cheap to clone,
//! holding a shared handle to their filesystem, and only navigationally
//! linked to their parent.
//!
//! Two backends are included: [`localfs`] serves a directory on the local
//! filesystem, [`memfs`] is an ephemeral in-memory filesystem that also
//! stores dead properties.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use http::StatusCode;
use xmltree::Element;

use crate::davpath::DavPath;
pub use crate::errors::{FsError, FsResult};

pub mod select;

#[cfg(any(docsrs, feature = "localfs"))]
pub mod localfs;
#[cfg(any(docsrs, feature = "memfs"))]
pub mod memfs;

/// Boxed future returned by the filesystem traits.
pub type FsFuture<'a, T> = Pin<Box<dyn Future<Output = FsResult<T>> + Send + 'a>>;

/// Identity of a filesystem instance.
///
/// Two entries with equal ids live in the same backing filesystem, which
/// enables native copy/move fast paths between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FsId(usize);

impl FsId {
    pub(crate) fn from_ptr<T: ?Sized>(p: *const T) -> FsId {
        FsId(p as *const () as usize)
    }
}

/// Outcome of deleting an entry.
///
/// Deletion does not return a `Result`: backends fold their native errors
/// into a status code, optionally naming the entry that made a recursive
/// delete stop.
#[derive(Debug, Clone)]
pub struct DeleteResult {
    pub status: StatusCode,
    pub failed: Option<DavPath>,
}

impl DeleteResult {
    pub fn ok() -> DeleteResult {
        DeleteResult {
            status: StatusCode::NO_CONTENT,
            failed: None,
        }
    }

    pub fn failed(status: StatusCode, path: DavPath) -> DeleteResult {
        DeleteResult {
            status,
            failed: Some(path),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Qualified name of a property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropName {
    pub namespace: Option<String>,
    pub name: String,
}

impl From<&Element> for PropName {
    fn from(el: &Element) -> PropName {
        PropName {
            namespace: el.namespace.clone(),
            name: el.name.clone(),
        }
    }
}

impl fmt::Display for PropName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A filesystem backend.
pub trait DavFileSystem: Send + Sync {
    /// The root collection.
    fn root(&self) -> Arc<dyn DavCollection>;

    /// Instance identity, see [`FsId`].
    fn fs_id(&self) -> FsId;
}

/// Metadata of an entry.
pub trait DavMetaData: fmt::Debug + Send + Sync {
    fn len(&self) -> u64;
    fn created(&self) -> FsResult<SystemTime>;
    fn modified(&self) -> FsResult<SystemTime>;
    fn is_dir(&self) -> bool;

    fn is_file(&self) -> bool {
        !self.is_dir()
    }
}

/// Operations common to collections and documents.
pub trait DavEntry: Send + Sync {
    /// Name of the entry within its parent. Empty for the root collection.
    fn name(&self) -> String;

    /// Path of the entry, from the filesystem root.
    fn path(&self) -> DavPath;

    /// Parent collection. `None` for the root. This is a navigational
    /// back-pointer, not an ownership edge.
    fn parent(&self) -> Option<Arc<dyn DavCollection>>;

    /// Identity of the filesystem this entry belongs to.
    fn fs_id(&self) -> FsId;

    fn metadata(&self) -> FsFuture<'_, Box<dyn DavMetaData>>;

    /// Delete the entry, recursively for collections.
    fn delete(&self) -> FsFuture<'_, DeleteResult>;

    /// All properties of this entry that could be written back to another
    /// entry, as XML elements. Backends without property storage return an
    /// empty list.
    fn writeable_props(&self) -> FsFuture<'_, Vec<Element>>;

    /// Apply properties to this entry. Returns the names of the properties
    /// that could not be applied; an empty list means full success.
    fn patch_props(&self, props: Vec<Element>) -> FsFuture<'_, Vec<PropName>>;
}

/// A directory-like entry.
pub trait DavCollection: DavEntry {
    /// Look up a direct child by name.
    fn get_child<'a>(&'a self, name: &'a str) -> FsFuture<'a, Option<Entry>>;

    /// Enumerate all direct children, in a stable order.
    fn get_children(&self) -> FsFuture<'_, Vec<Entry>>;

    /// Create an empty child document. The child must not exist yet.
    fn create_document<'a>(&'a self, name: &'a str) -> FsFuture<'a, Arc<dyn DavDocument>>;

    /// Create a child collection. The child must not exist yet.
    fn create_collection<'a>(&'a self, name: &'a str) -> FsFuture<'a, Arc<dyn DavCollection>>;
}

/// A file-like entry.
pub trait DavDocument: DavEntry {
    /// Open the document for reading.
    fn open_read(&self) -> FsFuture<'_, Box<dyn DavFile>>;

    /// Truncate the document and open it for writing.
    fn create(&self) -> FsFuture<'_, Box<dyn DavFile>>;

    /// Copy this document to a collection *on the same filesystem*, using
    /// the backend's native copy primitive. Overwrites an existing child.
    fn copy_to<'a>(
        &'a self,
        dest: &'a dyn DavCollection,
        name: &'a str,
    ) -> FsFuture<'a, Arc<dyn DavDocument>>;

    /// Move this document to a collection *on the same filesystem*, using
    /// the backend's native rename primitive. Overwrites an existing child.
    fn move_to<'a>(
        &'a self,
        dest: &'a dyn DavCollection,
        name: &'a str,
    ) -> FsFuture<'a, Arc<dyn DavDocument>>;
}

/// An open document.
pub trait DavFile: Send {
    /// Read up to `count` bytes. An empty buffer means end-of-file.
    fn read_bytes(&mut self, count: usize) -> FsFuture<'_, Bytes>;

    fn write_bytes(&mut self, buf: Bytes) -> FsFuture<'_, ()>;

    fn flush(&mut self) -> FsFuture<'_, ()>;
}

/// Either kind of entry, as returned by child lookups.
#[derive(Clone)]
pub enum Entry {
    Collection(Arc<dyn DavCollection>),
    Document(Arc<dyn DavDocument>),
}

impl Entry {
    pub fn name(&self) -> String {
        match self {
            Entry::Collection(c) => c.name(),
            Entry::Document(d) => d.name(),
        }
    }

    pub fn path(&self) -> DavPath {
        match self {
            Entry::Collection(c) => c.path(),
            Entry::Document(d) => d.path(),
        }
    }

    pub fn fs_id(&self) -> FsId {
        match self {
            Entry::Collection(c) => c.fs_id(),
            Entry::Document(d) => d.fs_id(),
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Entry::Collection(_))
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Entry::Collection(c) => write!(f, "Collection({:?})", c.path()),
            Entry::Document(d) => write!(f, "Document({:?})", d.path()),
        }
    }
}
