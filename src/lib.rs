//! ## Async WebDAV COPY/MOVE engine
//!
//! [Webdav] (RFC4918) COPY and MOVE look deceptively simple and are
//! anything but: they walk arbitrary-depth collection trees, decide per
//! node whether to create, overwrite or reject, carry dead properties
//! along, survive partial failures without corrupting either side, and
//! have to do all of that whether the destination is the same backend, a
//! different backend, or a different server reached over HTTP.
//!
//! This library implements that engine:
//!
//! - a [path selection][crate::fs::select] walk that resolves request
//!   paths against a [filesystem backend][crate::fs::DavFileSystem] into
//!   found/missing/invalid outcomes;
//! - a three-shape [target abstraction][crate::copymove::Target] (missing,
//!   document, collection) with same-filesystem, cross-filesystem and
//!   cross-server implementations;
//! - the [recursive execution engine][crate::copymove::CopyMoveEngine]
//!   itself, which processes a frozen snapshot of the source tree and
//!   returns a result tree with one status per node, ready to be rendered
//!   as a `207 Multi-Status` body.
//!
//! The thin HTTP layer on top, [`DavHandler`], works with the standard
//! types from the `http` and `http_body` crates, so it plugs into
//! hyper-style servers directly.
//!
//! ## Backends.
//!
//! Included are two filesystems:
//!
//! - `LocalFs`: serves a directory on the local filesystem
//! - `MemFs`: ephemeral in-memory filesystem. supports DAV properties.
//!
//! Custom backends implement the traits in [`fs`]; custom destinations
//! (object stores, archives, ...) implement
//! [`TargetActions`][crate::copymove::TargetActions].
//!
//! ## Example.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dav_engine::{DavHandler, FileSystem, ProcessingMode};
//! use dav_engine::copymove::ReqwestFactory;
//!
//! let handler = DavHandler::builder(FileSystem::local("/tmp", false))
//!     .strip_prefix("/dav")
//!     .processing_mode(ProcessingMode::Fastest)
//!     .client_factory(Arc::new(ReqwestFactory::new()))
//!     .build();
//! // handler.handle(request).await -> http::Response
//! ```
//!
//! [Webdav]: http://www.webdav.org/specs/rfc4918.html

#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

mod davhandler;
mod davheaders;
mod errors;
mod multistatus;
mod util;
mod xmltree_ext;

pub mod body;
pub mod copymove;
pub mod davpath;
pub mod fs;

pub use crate::davhandler::{DavBuilder, DavHandler, FileSystem};
pub use crate::davpath::DavPath;
pub use crate::errors::{DavError, DavResult, FsError, FsResult, RemoteError};
pub use crate::copymove::ProcessingMode;
pub use crate::util::{DavMethod, DavMethodSet};
