//! Target actions for a destination on a foreign server.
//!
//! The same target contract as the local families, implemented by issuing
//! real WebDAV requests through a [`RemoteClient`]: `PUT` for documents,
//! `MKCOL` for collections, `PROPFIND` with `Depth: 0` as the existence
//! probe, `PROPPATCH` for property propagation and plain `DELETE`.
//!
//! The source side is always local; for MOVE the local source is deleted
//! after the corresponding remote write succeeded. Response bodies are
//! inspected for `<error>` or `<multistatus>` payloads where the protocol
//! allows them; absent or malformed bodies mean the HTTP status line is
//! trusted as-is.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use async_stream::stream;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use url::Url;
use xmltree::{Element, XMLNode};

use crate::body::Body;
use crate::copymove::local::{delete_source, move_cleanup, COPY_BUF_SIZE};
use crate::copymove::result::CollectionActionResult;
use crate::copymove::target::*;
use crate::errors::{DavError, RemoteError};
use crate::fs::{DavCollection, DavDocument, DavFile, PropName};
use crate::xmltree_ext::{child, children, dav_element, parse_status_line, text_of, write_document, NS_DAV};
use crate::DavResult;

/// Boxed future returned by [`RemoteClient`].
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RemoteError>> + Send + 'a>>;

/// Minimal HTTP client contract. Request bodies may be streamed; response
/// bodies are buffered (they are multistatus documents, not payloads).
pub trait RemoteClient: Send + Sync {
    fn send<'a>(&'a self, req: Request<Body>) -> RemoteFuture<'a, Response<Bytes>>;
}

/// Produces a configured client for a destination authority.
///
/// A handler without one of these cannot serve cross-server requests at
/// all; that is a configuration error, not a per-request condition.
pub trait HttpClientFactory: Send + Sync {
    fn create(&self, base: &Url) -> DavResult<Arc<dyn RemoteClient>>;
}

const PROPFIND_RESOURCETYPE: &str = "<?xml version=\"1.0\" encoding=\"utf-8\" ?>\n\
    <D:propfind xmlns:D=\"DAV:\"><D:prop><D:resourcetype/></D:prop></D:propfind>";

/// An empty slot on the remote server.
pub struct RemoteMissing {
    client: Arc<dyn RemoteClient>,
    name: String,
    url: Url,
}

/// An existing remote document.
pub struct RemoteDoc {
    client: Arc<dyn RemoteClient>,
    name: String,
    url: Url,
}

/// An existing remote collection.
pub struct RemoteCol {
    client: Arc<dyn RemoteClient>,
    name: String,
    url: Url,
    created: bool,
}

impl std::fmt::Debug for RemoteMissing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteMissing")
            .field("name", &self.name)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for RemoteDoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteDoc")
            .field("name", &self.name)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for RemoteCol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCol")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}

fn request(method: &str, url: &Url) -> http::request::Builder {
    Request::builder().method(method).uri(url.as_str())
}

fn build_err(url: &Url, e: impl std::fmt::Display) -> DavError {
    RemoteError::transport(url.clone(), e.to_string()).into()
}

/// Probe `url` with a `PROPFIND Depth: 0` asking only for the resource
/// type, and classify the slot. A 404 means the slot is empty.
pub(crate) async fn resolve(
    client: &Arc<dyn RemoteClient>,
    url: Url,
    name: String,
) -> Result<Target<RemoteMissing, RemoteDoc, RemoteCol>, DavError> {
    debug!("remote: PROPFIND {url}");
    let req = request("PROPFIND", &url)
        .header("Depth", "0")
        .header("Content-Type", "application/xml; charset=utf-8")
        .body(Body::from(PROPFIND_RESOURCETYPE))
        .map_err(|e| build_err(&url, e))?;
    let resp = client.send(req).await?;

    if resp.status() == StatusCode::NOT_FOUND {
        return Ok(Target::Missing(RemoteMissing {
            client: client.clone(),
            name,
            url,
        }));
    }
    if !resp.status().is_success() {
        return Err(RemoteError::status(url, resp.status()).into());
    }

    let root = Element::parse(resp.body().as_ref())?;
    let restype = first_propstat_prop(&root)
        .and_then(|prop| child(prop, NS_DAV, "resourcetype"))
        .ok_or_else(|| build_err(&url, "no resourcetype in PROPFIND response"))?;
    if child(restype, NS_DAV, "collection").is_some() {
        Ok(Target::Collection(RemoteCol {
            client: client.clone(),
            name,
            url: collection_url(url),
            created: false,
        }))
    } else {
        Ok(Target::Document(RemoteDoc {
            client: client.clone(),
            name,
            url,
        }))
    }
}

fn first_propstat_prop(multistatus: &Element) -> Option<&Element> {
    let response = children(multistatus, NS_DAV, "response").into_iter().next()?;
    children(response, NS_DAV, "propstat")
        .into_iter()
        .find_map(|ps| child(ps, NS_DAV, "prop"))
}

/// Check a MKCOL/DELETE-style response: an `<error>` or `<multistatus>`
/// body wins over the status line, anything else falls back to it.
fn check_simple_response(url: &Url, resp: &Response<Bytes>) -> Result<(), DavError> {
    if !resp.body().is_empty() {
        if let Ok(root) = Element::parse(resp.body().as_ref()) {
            if root.namespace.as_deref() == Some(NS_DAV) && root.name == "error" {
                return Err(RemoteError {
                    urls: vec![url.clone()],
                    status: Some(resp.status()),
                    message: "server reported a DAV error".to_string(),
                }
                .into());
            }
            if root.namespace.as_deref() == Some(NS_DAV) && root.name == "multistatus" {
                if let Some(err) = multistatus_failure(url, &root) {
                    return Err(err.into());
                }
                return Ok(());
            }
        }
    }
    if resp.status().is_success() {
        Ok(())
    } else {
        Err(RemoteError::status(url.clone(), resp.status()).into())
    }
}

/// Extract the failed hrefs from a multistatus body, if any.
fn multistatus_failure(base: &Url, multistatus: &Element) -> Option<RemoteError> {
    let mut urls = Vec::new();
    let mut status = None;
    for response in children(multistatus, NS_DAV, "response") {
        let code = child(response, NS_DAV, "status")
            .and_then(|s| parse_status_line(&text_of(s)));
        if let Some(code) = code {
            if !code.is_success() {
                status.get_or_insert(code);
                if let Some(href) = child(response, NS_DAV, "href") {
                    if let Ok(url) = base.join(&text_of(href)) {
                        urls.push(url);
                    }
                }
            }
        }
    }
    status.map(|code| RemoteError {
        urls: if urls.is_empty() {
            vec![base.clone()]
        } else {
            urls
        },
        status: Some(code),
        message: String::new(),
    })
}

/// Turn an open source document into a streaming request body.
fn doc_body(mut file: Box<dyn DavFile>) -> Body {
    Body::stream(stream! {
        loop {
            match file.read_bytes(COPY_BUF_SIZE).await {
                Ok(chunk) if chunk.is_empty() => break,
                Ok(chunk) => yield Ok(chunk),
                Err(e) => {
                    yield Err(io::Error::from(e));
                    break;
                }
            }
        }
    })
}

/// Send a PROPPATCH with a `<set>` of all given properties, returning the
/// names the server rejected.
async fn proppatch(
    client: &Arc<dyn RemoteClient>,
    url: &Url,
    props: Vec<Element>,
) -> Result<Vec<PropName>, DavError> {
    if props.is_empty() {
        return Ok(Vec::new());
    }
    debug!("remote: PROPPATCH {url} ({} props)", props.len());
    let mut prop = dav_element("prop");
    prop.children
        .extend(props.into_iter().map(XMLNode::Element));
    let mut set = dav_element("set");
    set.children.push(XMLNode::Element(prop));
    let mut update = dav_element("propertyupdate");
    update.children.push(XMLNode::Element(set));
    let body = write_document(update)?;

    let req = request("PROPPATCH", url)
        .header("Content-Type", "application/xml; charset=utf-8")
        .body(Body::from(body))
        .map_err(|e| build_err(url, e))?;
    let resp = client.send(req).await?;
    if !resp.status().is_success() {
        return Err(RemoteError::status(url.clone(), resp.status()).into());
    }
    if resp.body().is_empty() {
        return Ok(Vec::new());
    }
    let root = match Element::parse(resp.body().as_ref()) {
        Ok(root) => root,
        // Trust the 2xx status line when the body is not multistatus.
        Err(_) => return Ok(Vec::new()),
    };
    let mut failed = Vec::new();
    for response in children(&root, NS_DAV, "response") {
        for propstat in children(response, NS_DAV, "propstat") {
            let ok = child(propstat, NS_DAV, "status")
                .and_then(|s| parse_status_line(&text_of(s)))
                .map(|code| code.is_success())
                .unwrap_or(true);
            if ok {
                continue;
            }
            if let Some(prop) = child(propstat, NS_DAV, "prop") {
                failed.extend(
                    crate::xmltree_ext::elements(prop)
                        .into_iter()
                        .map(PropName::from),
                );
            }
        }
    }
    Ok(failed)
}

async fn delete_remote(
    client: &Arc<dyn RemoteClient>,
    url: &Url,
) -> Result<(), DavError> {
    debug!("remote: DELETE {url}");
    let req = request("DELETE", url)
        .body(Body::empty())
        .map_err(|e| build_err(url, e))?;
    let resp = client.send(req).await?;
    check_simple_response(url, &resp)
}

impl MissingTarget for RemoteMissing {
    type Col = RemoteCol;

    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn create_collection(self) -> TargetFuture<'static, RemoteCol> {
        Box::pin(async move {
            debug!("remote: MKCOL {}", self.url);
            let req = request("MKCOL", &self.url)
                .body(Body::empty())
                .map_err(|e| build_err(&self.url, e))?;
            let resp = self.client.send(req).await?;
            check_simple_response(&self.url, &resp)?;
            Ok(RemoteCol {
                client: self.client,
                name: self.name,
                url: collection_url(self.url),
                created: true,
            })
        })
    }
}

impl DocumentTarget for RemoteDoc {
    type Missing = RemoteMissing;

    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn delete(self) -> TargetFuture<'static, RemoteMissing> {
        Box::pin(async move {
            delete_remote(&self.client, &self.url).await?;
            Ok(RemoteMissing {
                client: self.client,
                name: self.name,
                url: self.url,
            })
        })
    }

    fn set_props(&self, props: Vec<Element>) -> TargetFuture<'_, Vec<PropName>> {
        Box::pin(async move { proppatch(&self.client, &self.url, props).await })
    }
}

impl CollectionTarget for RemoteCol {
    type Missing = RemoteMissing;
    type Doc = RemoteDoc;

    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn created(&self) -> bool {
        self.created
    }

    fn missing(&self, name: &str) -> RemoteMissing {
        RemoteMissing {
            client: self.client.clone(),
            name: name.to_string(),
            url: child_url(&self.url, name),
        }
    }

    fn get<'a>(
        &'a self,
        name: &'a str,
    ) -> TargetFuture<'a, Target<RemoteMissing, RemoteDoc, RemoteCol>> {
        Box::pin(async move {
            resolve(&self.client, child_url(&self.url, name), name.to_string()).await
        })
    }

    fn delete(self) -> TargetFuture<'static, RemoteMissing> {
        Box::pin(async move {
            delete_remote(&self.client, &self.url).await?;
            Ok(RemoteMissing {
                client: self.client,
                name: self.name,
                url: self.url,
            })
        })
    }

    fn set_props(&self, props: Vec<Element>) -> TargetFuture<'_, Vec<PropName>> {
        Box::pin(async move { proppatch(&self.client, &self.url, props).await })
    }
}

/// Actions for a destination on another WebDAV server.
pub struct RemoteActions {
    mode: TransferMode,
    client: Arc<dyn RemoteClient>,
}

impl RemoteActions {
    pub fn new(mode: TransferMode, client: Arc<dyn RemoteClient>) -> RemoteActions {
        RemoteActions { mode, client }
    }

    /// Classify the destination URL itself, as the starting target for an
    /// engine run.
    pub fn resolve_target(&self, url: Url) -> TargetFuture<'_, TargetOf<RemoteActions>> {
        let name = url_name(&url);
        Box::pin(async move { resolve(&self.client, url, name).await })
    }

    async fn put_document(
        &self,
        source: &Arc<dyn DavDocument>,
        name: String,
        url: Url,
        overwrite: bool,
    ) -> Result<RemoteDoc, DavError> {
        debug!("remote: PUT {url} (overwrite: {overwrite})");
        let file = source.open_read().await?;
        let mut req = request("PUT", &url).header("Content-Type", "application/octet-stream");
        if overwrite {
            req = req.header("Overwrite", "T");
        }
        let req = req
            .body(doc_body(file))
            .map_err(|e| build_err(&url, e))?;
        let resp = self.client.send(req).await?;
        if !resp.status().is_success() {
            return Err(RemoteError::status(url, resp.status()).into());
        }
        if self.mode == TransferMode::Move {
            delete_source(&**source).await?;
        }
        Ok(RemoteDoc {
            client: self.client.clone(),
            name,
            url,
        })
    }
}

impl TargetActions for RemoteActions {
    type Missing = RemoteMissing;
    type Doc = RemoteDoc;
    type Col = RemoteCol;

    fn mode(&self) -> TransferMode {
        self.mode
    }

    fn existing_behaviour(&self) -> ExistingBehaviour {
        ExistingBehaviour::DeleteTarget
    }

    fn put<'a>(
        &'a self,
        source: &'a Arc<dyn DavDocument>,
        target: RemoteMissing,
    ) -> TargetFuture<'a, RemoteDoc> {
        Box::pin(async move {
            self.put_document(source, target.name, target.url, false)
                .await
        })
    }

    fn overwrite<'a>(
        &'a self,
        source: &'a Arc<dyn DavDocument>,
        target: &'a RemoteDoc,
    ) -> TargetFuture<'a, ()> {
        Box::pin(async move {
            self.put_document(source, target.name.clone(), target.url.clone(), true)
                .await?;
            Ok(())
        })
    }

    fn cleanup<'a>(
        &'a self,
        source: &'a Arc<dyn DavCollection>,
        _target: &'a RemoteCol,
        result: &'a CollectionActionResult,
    ) -> TargetFuture<'a, ()> {
        Box::pin(move_cleanup(self.mode, source, result))
    }
}

/// Last path segment of a URL, percent-decoded.
fn url_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| {
            percent_encoding::percent_decode_str(s)
                .decode_utf8_lossy()
                .into_owned()
        })
        .unwrap_or_default()
}

/// [`RemoteClient`] backed by reqwest.
#[cfg(any(docsrs, feature = "reqwest-client"))]
pub struct ReqwestClient {
    client: reqwest::Client,
}

#[cfg(any(docsrs, feature = "reqwest-client"))]
impl ReqwestClient {
    pub fn new() -> ReqwestClient {
        ReqwestClient {
            client: reqwest::Client::new(),
        }
    }
}

#[cfg(any(docsrs, feature = "reqwest-client"))]
impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(docsrs, feature = "reqwest-client"))]
impl RemoteClient for ReqwestClient {
    fn send<'a>(&'a self, req: Request<Body>) -> RemoteFuture<'a, Response<Bytes>> {
        Box::pin(async move {
            let url = Url::parse(&req.uri().to_string())
                .map_err(|e| RemoteError::transport(fallback_url(), e.to_string()))?;
            let transport = |e: &dyn std::fmt::Display| {
                RemoteError::transport(url.clone(), e.to_string())
            };

            let (parts, body) = req.into_parts();
            let body = reqwest::Body::wrap_stream(body);
            let req = Request::from_parts(parts, body);
            let req = reqwest::Request::try_from(req).map_err(|e| transport(&e))?;

            let resp = self.client.execute(req).await.map_err(|e| transport(&e))?;
            let status = resp.status();
            let headers = resp.headers().clone();
            let bytes = resp.bytes().await.map_err(|e| transport(&e))?;

            let mut out = Response::builder().status(status);
            if let Some(h) = out.headers_mut() {
                *h = headers;
            }
            out.body(bytes).map_err(|e| transport(&e))
        })
    }
}

#[cfg(any(docsrs, feature = "reqwest-client"))]
fn fallback_url() -> Url {
    // Infallible: literal URL.
    Url::parse("http://invalid./").unwrap()
}

/// [`HttpClientFactory`] handing out [`ReqwestClient`]s that share one
/// connection pool.
#[cfg(any(docsrs, feature = "reqwest-client"))]
#[derive(Default)]
pub struct ReqwestFactory {
    client: reqwest::Client,
}

#[cfg(any(docsrs, feature = "reqwest-client"))]
impl ReqwestFactory {
    pub fn new() -> ReqwestFactory {
        ReqwestFactory {
            client: reqwest::Client::new(),
        }
    }
}

#[cfg(any(docsrs, feature = "reqwest-client"))]
impl HttpClientFactory for ReqwestFactory {
    fn create(&self, _base: &Url) -> DavResult<Arc<dyn RemoteClient>> {
        Ok(Arc::new(ReqwestClient {
            client: self.client.clone(),
        }))
    }
}

#[cfg(test)]
#[cfg(feature = "memfs")]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use futures_util::StreamExt;

    use crate::fs::testutil::write_doc;
    use crate::fs::memfs::MemFs;
    use crate::fs::DavFileSystem;

    /// Scripted client: canned responses per (method, path), plus a log of
    /// every request including its collected body.
    pub(crate) struct MockClient {
        responses: HashMap<(String, String), (u16, &'static str)>,
        pub(crate) log: Mutex<Vec<(String, String, Vec<u8>)>>,
    }

    impl MockClient {
        pub(crate) fn new() -> MockClient {
            MockClient {
                responses: HashMap::new(),
                log: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn respond(
            mut self,
            method: &str,
            path: &str,
            status: u16,
            body: &'static str,
        ) -> Self {
            self.responses
                .insert((method.to_string(), path.to_string()), (status, body));
            self
        }

        pub(crate) fn requests(&self) -> Vec<(String, String)> {
            self.log
                .lock()
                .unwrap()
                .iter()
                .map(|(m, p, _)| (m.clone(), p.clone()))
                .collect()
        }
    }

    impl RemoteClient for MockClient {
        fn send<'a>(&'a self, req: Request<Body>) -> RemoteFuture<'a, Response<Bytes>> {
            Box::pin(async move {
                let method = req.method().to_string();
                let path = req.uri().path().to_string();
                let mut body = Vec::new();
                let mut stream = req.into_body();
                while let Some(chunk) = stream.next().await {
                    body.extend_from_slice(&chunk.expect("request body error"));
                }
                self.log
                    .lock()
                    .unwrap()
                    .push((method.clone(), path.clone(), body));

                let (status, body) = self
                    .responses
                    .get(&(method, path))
                    .copied()
                    .unwrap_or((500, ""));
                Ok(Response::builder()
                    .status(status)
                    .body(Bytes::from_static(body.as_bytes()))
                    .unwrap())
            })
        }
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    const MULTISTATUS_COLLECTION: &str = "<?xml version=\"1.0\"?>\
        <D:multistatus xmlns:D=\"DAV:\"><D:response>\
        <D:href>/dst/col/</D:href>\
        <D:propstat><D:prop><D:resourcetype><D:collection/></D:resourcetype></D:prop>\
        <D:status>HTTP/1.1 200 OK</D:status></D:propstat>\
        </D:response></D:multistatus>";

    const MULTISTATUS_DOCUMENT: &str = "<?xml version=\"1.0\"?>\
        <D:multistatus xmlns:D=\"DAV:\"><D:response>\
        <D:href>/dst/file.txt</D:href>\
        <D:propstat><D:prop><D:resourcetype/></D:prop>\
        <D:status>HTTP/1.1 200 OK</D:status></D:propstat>\
        </D:response></D:multistatus>";

    #[tokio::test]
    async fn probe_classifies_404_as_missing() {
        let client: Arc<dyn RemoteClient> =
            Arc::new(MockClient::new().respond("PROPFIND", "/dst/x", 404, ""));
        let target = resolve(&client, url("http://remote/dst/x"), "x".to_string())
            .await
            .unwrap();
        assert!(matches!(target, Target::Missing(_)));
    }

    #[tokio::test]
    async fn probe_classifies_by_resourcetype() {
        let client: Arc<dyn RemoteClient> = Arc::new(
            MockClient::new()
                .respond("PROPFIND", "/dst/col", 207, MULTISTATUS_COLLECTION)
                .respond("PROPFIND", "/dst/file.txt", 207, MULTISTATUS_DOCUMENT),
        );
        let target = resolve(&client, url("http://remote/dst/col"), "col".to_string())
            .await
            .unwrap();
        match target {
            Target::Collection(col) => assert!(col.url().path().ends_with('/')),
            _ => panic!("expected collection"),
        }
        let target = resolve(
            &client,
            url("http://remote/dst/file.txt"),
            "file.txt".to_string(),
        )
        .await
        .unwrap();
        assert!(matches!(target, Target::Document(_)));
    }

    #[tokio::test]
    async fn probe_error_carries_status() {
        let client: Arc<dyn RemoteClient> =
            Arc::new(MockClient::new().respond("PROPFIND", "/dst/x", 403, ""));
        let err = resolve(&client, url("http://remote/dst/x"), "x".to_string())
            .await
            .unwrap_err();
        match err {
            DavError::Remote(e) => assert_eq!(e.status, Some(StatusCode::FORBIDDEN)),
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn put_streams_source_and_deletes_on_move() {
        let fs = MemFs::new();
        let src = fs.root().create_document("a.txt").await.unwrap();
        write_doc(&src, b"remote payload").await;

        let mock = Arc::new(MockClient::new().respond("PUT", "/dst/a.txt", 201, ""));
        let client: Arc<dyn RemoteClient> = mock.clone();
        let actions = RemoteActions::new(TransferMode::Move, client.clone());
        let missing = RemoteMissing {
            client,
            name: "a.txt".to_string(),
            url: url("http://remote/dst/a.txt"),
        };
        actions.put(&src, missing).await.unwrap();

        let log = mock.log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, "PUT");
        assert_eq!(log[0].2, b"remote payload");
        drop(log);
        // MOVE removed the local source.
        assert!(fs.root().get_child("a.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mkcol_reports_dav_error_body() {
        let client: Arc<dyn RemoteClient> = Arc::new(MockClient::new().respond(
            "MKCOL",
            "/dst/col",
            207,
            "<?xml version=\"1.0\"?><D:multistatus xmlns:D=\"DAV:\"><D:response>\
             <D:href>/dst/col</D:href><D:status>HTTP/1.1 409 Conflict</D:status>\
             </D:response></D:multistatus>",
        ));
        let missing = RemoteMissing {
            client,
            name: "col".to_string(),
            url: url("http://remote/dst/col"),
        };
        let err = missing.create_collection().await.unwrap_err();
        match err {
            DavError::Remote(e) => {
                assert_eq!(e.status, Some(StatusCode::CONFLICT));
                assert_eq!(e.urls[0].path(), "/dst/col");
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mkcol_trusts_status_without_body() {
        let client: Arc<dyn RemoteClient> =
            Arc::new(MockClient::new().respond("MKCOL", "/dst/col", 201, ""));
        let missing = RemoteMissing {
            client,
            name: "col".to_string(),
            url: url("http://remote/dst/col"),
        };
        let col = missing.create_collection().await.unwrap();
        assert!(col.created());
        assert_eq!(col.url().as_str(), "http://remote/dst/col/");
    }

    #[tokio::test]
    async fn proppatch_collects_failed_names() {
        let client: Arc<dyn RemoteClient> = Arc::new(MockClient::new().respond(
            "PROPPATCH",
            "/dst/a",
            207,
            "<?xml version=\"1.0\"?><D:multistatus xmlns:D=\"DAV:\" xmlns:x=\"urn:example\">\
             <D:response><D:href>/dst/a</D:href>\
             <D:propstat><D:prop><x:color/></D:prop>\
             <D:status>HTTP/1.1 200 OK</D:status></D:propstat>\
             <D:propstat><D:prop><x:flavor/></D:prop>\
             <D:status>HTTP/1.1 409 Conflict</D:status></D:propstat>\
             </D:response></D:multistatus>",
        ));
        let doc = RemoteDoc {
            client,
            name: "a".to_string(),
            url: url("http://remote/dst/a"),
        };
        let mut color = Element::new("color");
        color.namespace = Some("urn:example".to_string());
        let mut flavor = Element::new("flavor");
        flavor.namespace = Some("urn:example".to_string());

        let failed = doc.set_props(vec![color, flavor]).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].name, "flavor");
        assert_eq!(failed[0].namespace.as_deref(), Some("urn:example"));
    }

    #[tokio::test]
    async fn engine_skips_probes_below_created_collections() {
        let fs = MemFs::new();
        let src = fs.root().create_collection("src").await.unwrap();
        let a = src.create_document("a.txt").await.unwrap();
        write_doc(&a, b"aa").await;
        let b = src.create_document("b.txt").await.unwrap();
        write_doc(&b, b"bb").await;

        let mock = Arc::new(
            MockClient::new()
                .respond("MKCOL", "/dst/", 201, "")
                .respond("PUT", "/dst/a.txt", 201, "")
                .respond("PUT", "/dst/b.txt", 201, "")
                .respond("PROPPATCH", "/dst/", 200, "")
                .respond("PROPPATCH", "/dst/a.txt", 200, "")
                .respond("PROPPATCH", "/dst/b.txt", 200, ""),
        );
        let client: Arc<dyn RemoteClient> = mock.clone();
        let actions = RemoteActions::new(TransferMode::Copy, client.clone());
        let engine = crate::copymove::CopyMoveEngine::new(actions, true);
        let missing = RemoteMissing {
            client,
            name: "dst".to_string(),
            url: url("http://remote/dst/"),
        };
        let result = engine
            .execute(
                &crate::fs::Entry::Collection(src),
                crate::copymove::DepthLimit::Infinity,
                Target::Missing(missing),
            )
            .await
            .unwrap();

        assert!(result.is_success(), "{result:?}");
        assert_eq!(result.document_count(), 2);
        // Freshly created destination: MKCOL, then straight PUTs, and the
        // source's creationdate propagated per document and the collection.
        let methods: Vec<_> = mock.requests().into_iter().map(|(m, _)| m).collect();
        assert!(!methods.contains(&"PROPFIND".to_string()));
        assert_eq!(
            methods
                .iter()
                .filter(|m| m.as_str() == "PROPPATCH")
                .count(),
            3
        );
        assert_eq!(methods.iter().filter(|m| m.as_str() == "PUT").count(), 2);
    }

    #[tokio::test]
    async fn get_probes_child_slots() {
        let mock = Arc::new(
            MockClient::new()
                .respond("PROPFIND", "/dst/col/gone", 404, "")
                .respond("MKCOL", "/dst/col", 201, ""),
        );
        let client: Arc<dyn RemoteClient> = mock.clone();
        let missing = RemoteMissing {
            client,
            name: "col".to_string(),
            url: url("http://remote/dst/col"),
        };
        let col = missing.create_collection().await.unwrap();
        let target = col.get("gone").await.unwrap();
        match &target {
            Target::Missing(m) => assert_eq!(m.url().as_str(), "http://remote/dst/col/gone"),
            _ => panic!("expected missing"),
        }
        assert_eq!(
            mock.requests(),
            vec![
                ("MKCOL".to_string(), "/dst/col".to_string()),
                ("PROPFIND".to_string(), "/dst/col/gone".to_string()),
            ]
        );
    }
}
