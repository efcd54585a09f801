//
// Errors.
//
use std::error::Error;
use std::fmt;
use std::io;

use http::StatusCode;
use url::Url;

/// Faults from a filesystem backend.
///
/// This is a closed vocabulary on purpose: backends map their native errors
/// onto it, and the rest of the crate only ever has to translate these
/// values into HTTP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NotFound,
    Forbidden,
    Exists,
    NotADirectory,
    InsufficientStorage,
    NotImplemented,
    GeneralFailure,
}

pub type FsResult<T> = Result<T, FsError>;

impl FsError {
    pub fn statuscode(&self) -> StatusCode {
        match self {
            FsError::NotFound => StatusCode::NOT_FOUND,
            FsError::Forbidden => StatusCode::FORBIDDEN,
            FsError::Exists => StatusCode::PRECONDITION_FAILED,
            FsError::NotADirectory => StatusCode::CONFLICT,
            FsError::InsufficientStorage => StatusCode::INSUFFICIENT_STORAGE,
            FsError::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            FsError::GeneralFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Error for FsError {}

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => FsError::NotFound,
            io::ErrorKind::PermissionDenied => FsError::Forbidden,
            io::ErrorKind::AlreadyExists => FsError::Exists,
            _ => FsError::GeneralFailure,
        }
    }
}

impl From<FsError> for io::Error {
    fn from(e: FsError) -> Self {
        let kind = match e {
            FsError::NotFound => io::ErrorKind::NotFound,
            FsError::Forbidden => io::ErrorKind::PermissionDenied,
            FsError::Exists => io::ErrorKind::AlreadyExists,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, e.to_string())
    }
}

/// A failed HTTP interaction with a remote WebDAV server.
///
/// Carries the resource URLs the failure applies to, so that the handler can
/// report them individually in a multi-status body.
#[derive(Debug, Clone)]
pub struct RemoteError {
    pub urls: Vec<Url>,
    pub status: Option<StatusCode>,
    pub message: String,
}

impl RemoteError {
    pub fn status(url: Url, status: StatusCode) -> Self {
        Self {
            urls: vec![url],
            status: Some(status),
            message: String::new(),
        }
    }

    pub fn transport(url: Url, message: impl Into<String>) -> Self {
        Self {
            urls: vec![url],
            status: None,
            message: message.into(),
        }
    }

    pub fn statuscode(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::BAD_GATEWAY)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "remote returned {status}")?,
            None => write!(f, "remote request failed: {}", self.message)?,
        }
        if let Some(url) = self.urls.first() {
            write!(f, " ({url})")?;
        }
        Ok(())
    }
}

impl Error for RemoteError {}

/// Union of everything that can go wrong while handling a request.
#[derive(Debug)]
pub enum DavError {
    Status(StatusCode),
    StatusClose(StatusCode),
    UnknownDavMethod,
    InvalidPath,
    ForbiddenPath,
    XmlParse(xmltree::ParseError),
    Fs(FsError),
    Io(io::Error),
    Remote(RemoteError),
    /// Cross-server request, but no HTTP client factory was configured.
    NoRemoteClient,
    Cancelled,
}

pub type DavResult<T> = Result<T, DavError>;

impl DavError {
    pub fn statuscode(&self) -> StatusCode {
        match self {
            DavError::Status(s) => *s,
            DavError::StatusClose(s) => *s,
            DavError::UnknownDavMethod => StatusCode::NOT_IMPLEMENTED,
            DavError::InvalidPath => StatusCode::BAD_REQUEST,
            DavError::ForbiddenPath => StatusCode::FORBIDDEN,
            DavError::XmlParse(_) => StatusCode::BAD_GATEWAY,
            DavError::Fs(e) => e.statuscode(),
            DavError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DavError::Remote(e) => e.statuscode(),
            DavError::NoRemoteClient => StatusCode::INTERNAL_SERVER_ERROR,
            DavError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the connection should be closed after this error. We only do
    /// that for errors where the request body might not have been drained.
    pub fn must_close(&self) -> bool {
        matches!(self, DavError::StatusClose(_))
    }
}

impl fmt::Display for DavError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DavError::Status(s) => write!(f, "{s}"),
            DavError::StatusClose(s) => write!(f, "{s}"),
            DavError::UnknownDavMethod => write!(f, "method not implemented"),
            DavError::InvalidPath => write!(f, "invalid path"),
            DavError::ForbiddenPath => write!(f, "path not under prefix"),
            DavError::XmlParse(e) => write!(f, "XML parse error: {e}"),
            DavError::Fs(e) => write!(f, "filesystem error: {e}"),
            DavError::Io(e) => write!(f, "I/O error: {e}"),
            DavError::Remote(e) => write!(f, "{e}"),
            DavError::NoRemoteClient => write!(f, "no remote client factory configured"),
            DavError::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl Error for DavError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DavError::Fs(e) => Some(e),
            DavError::Io(e) => Some(e),
            DavError::Remote(e) => Some(e),
            DavError::XmlParse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StatusCode> for DavError {
    fn from(s: StatusCode) -> Self {
        DavError::Status(s)
    }
}

impl From<FsError> for DavError {
    fn from(e: FsError) -> Self {
        DavError::Fs(e)
    }
}

impl From<io::Error> for DavError {
    fn from(e: io::Error) -> Self {
        DavError::Io(e)
    }
}

impl From<RemoteError> for DavError {
    fn from(e: RemoteError) -> Self {
        DavError::Remote(e)
    }
}

impl From<xmltree::ParseError> for DavError {
    fn from(e: xmltree::ParseError) -> Self {
        DavError::XmlParse(e)
    }
}
