//
// This module contains the main entry point of the library,
// DavHandler.
//
use std::error::Error as StdError;
use std::io;
#[cfg(any(docsrs, feature = "localfs"))]
use std::path::PathBuf;
use std::sync::Arc;

use bytes::buf::Buf;
use http::{Request, Response, StatusCode};
use http_body::Body as HttpBody;

use crate::body::Body;
use crate::copymove::{HttpClientFactory, ProcessingMode};
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::fs::DavFileSystem;
use crate::util::{dav_method, DavMethod, DavMethodSet};
use crate::DavResult;

pub mod handle_copymove;
pub mod handle_options;

/// Configuration of the handler.
#[derive(Clone)]
pub struct DavBuilder {
    /// Prefix to be stripped off when handling request.
    prefix: String,
    /// Filesystem backend.
    fs: FileSystem,
    /// Set of allowed methods (Defaults to OPTIONS/COPY/MOVE).
    allow: DavMethodSet,
    /// Destination routing preference.
    mode: ProcessingMode,
    /// Client factory for cross-server destinations.
    client_factory: Option<Arc<dyn HttpClientFactory>>,
}

/// File system backend.
#[derive(Clone)]
pub enum FileSystem {
    #[cfg(any(docsrs, feature = "memfs"))]
    Mem,
    #[cfg(any(docsrs, feature = "localfs"))]
    Local {
        /// Path to the root directory.
        base: PathBuf,
        public: bool,
    },
}

impl FileSystem {
    /// Serve a local directory
    #[cfg(any(docsrs, feature = "localfs"))]
    pub fn local(path: impl Into<PathBuf>, public: bool) -> Self {
        FileSystem::Local {
            base: path.into(),
            public,
        }
    }

    fn build(self) -> Arc<dyn DavFileSystem> {
        match self {
            #[cfg(any(docsrs, feature = "memfs"))]
            FileSystem::Mem => Arc::new(crate::fs::memfs::MemFs::new()),
            #[cfg(any(docsrs, feature = "localfs"))]
            FileSystem::Local { base, public } => {
                Arc::new(crate::fs::localfs::LocalFs::new(base, public))
            }
        }
    }
}

impl DavBuilder {
    /// Create a new configuration builder.
    pub fn new(fs: FileSystem) -> DavBuilder {
        Self {
            prefix: String::new(),
            fs,
            allow: DavMethodSet::COPY_MOVE,
            mode: ProcessingMode::default(),
            client_factory: None,
        }
    }

    /// Use the configuration that was built to generate a DavHandler.
    pub fn build(self) -> DavHandler {
        self.into()
    }

    /// Prefix to be stripped off before translating the rest of
    /// the request path to a filesystem path.
    pub fn strip_prefix(self, prefix: impl Into<String>) -> Self {
        let mut this = self;
        this.prefix = prefix.into();
        this
    }

    /// Which methods to allow (default is OPTIONS/COPY/MOVE).
    pub fn methods(self, allow: DavMethodSet) -> Self {
        let mut this = self;
        this.allow = allow;
        this
    }

    /// How to route destinations, see [`ProcessingMode`].
    pub fn processing_mode(self, mode: ProcessingMode) -> Self {
        let mut this = self;
        this.mode = mode;
        this
    }

    /// HTTP client factory for cross-server destinations. Without one,
    /// cross-server requests fail outright.
    pub fn client_factory(self, factory: Arc<dyn HttpClientFactory>) -> Self {
        let mut this = self;
        this.client_factory = Some(factory);
        this
    }
}

/// The COPY/MOVE handler struct.
///
/// The `builder` and `build` methods are used to instantiate a handler.
///
/// The `handle` method does the actual work.
#[derive(Clone)]
pub struct DavHandler {
    pub(crate) prefix: Arc<String>,
    pub(crate) fs: Arc<dyn DavFileSystem>,
    pub(crate) allow: DavMethodSet,
    pub(crate) mode: ProcessingMode,
    pub(crate) client_factory: Option<Arc<dyn HttpClientFactory>>,
}

impl From<DavBuilder> for DavHandler {
    fn from(cfg: DavBuilder) -> Self {
        Self {
            prefix: Arc::new(cfg.prefix),
            fs: cfg.fs.build(),
            allow: cfg.allow,
            mode: cfg.mode,
            client_factory: cfg.client_factory,
        }
    }
}

impl DavHandler {
    /// Return a configuration builder.
    pub fn builder(fs: FileSystem) -> DavBuilder {
        DavBuilder::new(fs)
    }

    /// Handle a webdav COPY/MOVE/OPTIONS request.
    pub async fn handle<ReqBody, ReqData, ReqError>(&self, req: Request<ReqBody>) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
    {
        // Turn any DavError results into a HTTP error response.
        match self.handle2(req).await {
            Ok(resp) => {
                debug!("== END REQUEST result OK");
                resp
            }
            Err(err) => {
                debug!("== END REQUEST result {:?}", err);
                let mut resp = Response::builder()
                    .header("Content-Length", "0")
                    .status(err.statuscode());
                if err.must_close() {
                    resp = resp.header("connection", "close");
                }
                resp.body(Body::empty()).unwrap()
            }
        }
    }

    // helper.
    pub(crate) fn path(&self, req: &Request<()>) -> DavPath {
        // This never fails (has been checked before)
        DavPath::from_uri_and_prefix(req.uri(), &self.prefix).unwrap()
    }

    // drain request body and return it.
    pub(crate) async fn read_request<ReqBody, ReqData, ReqError>(
        &self,
        body: ReqBody,
        max_size: usize,
    ) -> DavResult<Vec<u8>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let mut data = Vec::new();
        futures_util::pin_mut!(body);
        while let Some(res) = body.data().await {
            let mut buf = res.map_err(|_| {
                DavError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "UnexpectedEof",
                ))
            })?;
            while buf.has_remaining() {
                if data.len() + buf.remaining() > max_size {
                    return Err(StatusCode::PAYLOAD_TOO_LARGE.into());
                }
                let b = buf.chunk();
                let l = b.len();
                data.extend_from_slice(b);
                buf.advance(l);
            }
        }
        Ok(data)
    }

    // internal dispatcher.
    async fn handle2<ReqBody, ReqData, ReqError>(
        &self,
        req: Request<ReqBody>,
    ) -> DavResult<Response<Body>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let (req, body) = {
            let (parts, body) = req.into_parts();
            (Request::from_parts(parts, ()), body)
        };

        // translate HTTP method to Webdav method.
        let method = match dav_method(req.method()) {
            Ok(m) => m,
            Err(e) => {
                debug!("refusing method {} request {}", req.method(), req.uri());
                return Err(e);
            }
        };

        // see if method is allowed.
        if !self.allow.contains(method) {
            debug!(
                "method {} not allowed on request {}",
                req.method(),
                req.uri()
            );
            return Err(DavError::StatusClose(StatusCode::METHOD_NOT_ALLOWED));
        }

        // make sure the request path is valid.
        let path = DavPath::from_uri_and_prefix(req.uri(), &self.prefix)?;

        // None of the methods served here accept a body.
        let body_data = self.read_request(body, 65536).await?;
        if !body_data.is_empty() {
            return Err(StatusCode::UNSUPPORTED_MEDIA_TYPE.into());
        }

        debug!("== START REQUEST {:?} {}", method, path);

        match method {
            DavMethod::OPTIONS => self.handle_options(&req).await,
            DavMethod::COPY | DavMethod::MOVE => self.handle_copymove(&req, method).await,
            _ => Err(DavError::StatusClose(StatusCode::METHOD_NOT_ALLOWED)),
        }
    }
}
