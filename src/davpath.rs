//! Request paths.
//!
//! A [`DavPath`] is the percent-decoded path of a request URL, relative to
//! the configured prefix. It deliberately keeps `.` and `..` segments as-is:
//! resolving them against the filesystem is the job of the selection walk in
//! [`crate::fs::select`], not of the path type.

use std::fmt;

use percent_encoding::{percent_decode, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::errors::DavError;
use crate::DavResult;

/// Characters that need escaping when a path is turned back into a URL.
const PATH_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'%')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// URL path, with prefix stripped.
#[derive(Clone, PartialEq, Eq)]
pub struct DavPath {
    path: String,
    prefix: String,
}

/// One slash-separated element of a path.
///
/// `dir_intent` is set when the segment was followed by a `/` in the request,
/// i.e. the client asserted the segment names a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub name: String,
    pub dir_intent: bool,
}

impl DavPath {
    /// Build a path from an already-decoded string (must start with `/`).
    pub fn new(path: &str) -> DavResult<DavPath> {
        if !path.starts_with('/') {
            return Err(DavError::InvalidPath);
        }
        if !stays_below_root(path) {
            return Err(DavError::ForbiddenPath);
        }
        Ok(DavPath {
            path: path.to_string(),
            prefix: String::new(),
        })
    }

    /// Build a path from a request URI, stripping `prefix`.
    pub fn from_uri_and_prefix(uri: &http::Uri, prefix: &str) -> DavResult<DavPath> {
        Self::from_raw_path(uri.path(), prefix)
    }

    /// Build a path from an absolute URL (e.g. a `Destination` header),
    /// stripping `prefix`.
    pub fn from_url_and_prefix(url: &url::Url, prefix: &str) -> DavResult<DavPath> {
        Self::from_raw_path(url.path(), prefix)
    }

    /// Build a path from a still-encoded absolute path, stripping `prefix`.
    pub(crate) fn from_encoded_path(raw: &str, prefix: &str) -> DavResult<DavPath> {
        Self::from_raw_path(raw, prefix)
    }

    /// Do two paths name the same resource? Trailing slashes don't count.
    pub fn names_same_resource(&self, other: &DavPath) -> bool {
        let a = self.path.trim_end_matches('/');
        let b = other.path.trim_end_matches('/');
        a == b
    }

    /// Is `other` strictly below this path?
    pub fn is_ancestor_of(&self, other: &DavPath) -> bool {
        let base = format!("{}/", self.path.trim_end_matches('/'));
        other.path.starts_with(&base) && !self.names_same_resource(other)
    }

    fn from_raw_path(raw: &str, prefix: &str) -> DavResult<DavPath> {
        let decoded = percent_decode(raw.as_bytes())
            .decode_utf8()
            .map_err(|_| DavError::InvalidPath)?;
        if !decoded.starts_with('/') {
            return Err(DavError::InvalidPath);
        }
        let prefix = prefix.trim_end_matches('/');
        let path = if prefix.is_empty() {
            decoded.into_owned()
        } else if let Some(rest) = decoded.strip_prefix(prefix) {
            if rest.is_empty() {
                "/".to_string()
            } else if rest.starts_with('/') {
                rest.to_string()
            } else {
                return Err(DavError::ForbiddenPath);
            }
        } else {
            return Err(DavError::ForbiddenPath);
        };
        if !stays_below_root(&path) {
            return Err(DavError::ForbiddenPath);
        }
        Ok(DavPath {
            path,
            prefix: prefix.to_string(),
        })
    }

    /// The decoded path, without prefix.
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Does the path name a collection (trailing slash)?
    pub fn is_collection(&self) -> bool {
        self.path.ends_with('/')
    }

    /// Add a trailing slash if there is none.
    pub fn add_slash(&mut self) {
        if !self.is_collection() {
            self.path.push('/');
        }
    }

    /// The last path segment, without trailing slash. Empty for the root.
    pub fn file_name(&self) -> &str {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("")
    }

    /// Path of the parent collection, always with a trailing slash.
    pub fn parent(&self) -> DavPath {
        let trimmed = self.path.trim_end_matches('/');
        let end = trimmed.rfind('/').map(|i| i + 1).unwrap_or(1);
        DavPath {
            path: trimmed[..end].to_string(),
            prefix: self.prefix.clone(),
        }
    }

    /// Append one segment. A segment must not contain `/`.
    pub fn join(&self, name: &str) -> DavPath {
        let mut path = self.path.clone();
        if !path.ends_with('/') {
            path.push('/');
        }
        path.push_str(name);
        DavPath {
            path,
            prefix: self.prefix.clone(),
        }
    }

    /// Split into segments, preserving directory intent markers.
    ///
    /// Empty segments from doubled slashes are dropped; the root path yields
    /// no segments at all.
    pub fn segments(&self) -> Vec<PathSegment> {
        let trailing_slash = self.path.ends_with('/');
        let parts: Vec<&str> = self
            .path
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        let last = parts.len().saturating_sub(1);
        parts
            .iter()
            .enumerate()
            .map(|(i, name)| PathSegment {
                name: name.to_string(),
                dir_intent: i < last || trailing_slash,
            })
            .collect()
    }

    /// The path as it appears on the wire, re-encoded, without prefix.
    pub fn as_url_string(&self) -> String {
        utf8_percent_encode(&self.path, PATH_ENCODE_SET).to_string()
    }

    /// The path as it appears on the wire, re-encoded, with prefix.
    pub fn with_prefix(&self) -> String {
        format!("{}{}", self.prefix, self.as_url_string())
    }
}

/// `..` segments are allowed, but the path must never climb above the root.
fn stays_below_root(path: &str) -> bool {
    let mut depth: i32 = 0;
    for seg in path.split('/').filter(|s| !s.is_empty()) {
        match seg {
            "." => {}
            ".." => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => depth += 1,
        }
    }
    true
}

impl fmt::Display for DavPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl fmt::Debug for DavPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_and_strip_prefix() {
        let uri: http::Uri = "/dav/a%20b/c".parse().unwrap();
        let path = DavPath::from_uri_and_prefix(&uri, "/dav").unwrap();
        assert_eq!(path.as_str(), "/a b/c");
        assert_eq!(path.as_url_string(), "/a%20b/c");
        assert_eq!(path.with_prefix(), "/dav/a%20b/c");
    }

    #[test]
    fn prefix_mismatch() {
        let uri: http::Uri = "/other/a".parse().unwrap();
        assert!(DavPath::from_uri_and_prefix(&uri, "/dav").is_err());
    }

    #[test]
    fn segments_have_dir_intent() {
        let path = DavPath::new("/a/b/").unwrap();
        let segs = path.segments();
        assert_eq!(segs.len(), 2);
        assert!(segs[0].dir_intent);
        assert!(segs[1].dir_intent);

        let path = DavPath::new("/a/b").unwrap();
        let segs = path.segments();
        assert!(segs[0].dir_intent);
        assert!(!segs[1].dir_intent);
    }

    #[test]
    fn root_is_collection() {
        let path = DavPath::new("/").unwrap();
        assert!(path.is_collection());
        assert!(path.segments().is_empty());
        assert_eq!(path.file_name(), "");
    }

    #[test]
    fn parent_and_join() {
        let path = DavPath::new("/a/b/c").unwrap();
        assert_eq!(path.parent().as_str(), "/a/b/");
        assert_eq!(path.parent().parent().as_str(), "/a/");
        assert_eq!(path.parent().join("d").as_str(), "/a/b/d");
        assert_eq!(path.file_name(), "c");
    }
}
