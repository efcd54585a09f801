//
// COPY and MOVE. This is only the routing: parse the Destination, Depth
// and Overwrite headers, resolve both sides, pick the target actions
// (same-filesystem, cross-filesystem, or cross-server), and hand over to
// the engine. The engine's result tree is rendered by `multistatus`.
//
use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};
use url::Url;

use crate::body::Body;
use crate::copymove::{
    CopyMoveEngine, CrossFsActions, DepthLimit, FsCol, FsDoc, FsMissing, InFsActions,
    ProcessingMode, RemoteActions, Target, TargetActions, TransferMode,
};
use crate::davheaders::{Depth, Destination, Overwrite};
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::fs::select::{select, Selection};
use crate::fs::{DavEntry, Entry};
use crate::multistatus;
use crate::util::DavMethod;
use crate::DavResult;

/// A parsed `Destination` header: a full URL, or just an absolute path
/// (which some clients send; it always names this server).
enum Dest {
    Url(Url),
    Path(String),
}

impl crate::DavHandler {
    pub(crate) async fn handle_copymove(
        &self,
        req: &Request<()>,
        method: DavMethod,
    ) -> DavResult<Response<Body>> {
        let mode = if method == DavMethod::MOVE {
            TransferMode::Move
        } else {
            TransferMode::Copy
        };
        let path = self.path(req);

        let dest = req
            .headers()
            .typed_get::<Destination>()
            .ok_or(DavError::Status(StatusCode::BAD_REQUEST))?;
        let dest = parse_destination(&dest.0)?;

        let depth = req
            .headers()
            .typed_get::<Depth>()
            .unwrap_or(Depth::Infinity);
        match (mode, depth) {
            // MOVE is always deep, COPY is all-or-nothing.
            (TransferMode::Move, Depth::Zero | Depth::One) => {
                return Err(StatusCode::BAD_REQUEST.into())
            }
            (TransferMode::Copy, Depth::One) => return Err(StatusCode::BAD_REQUEST.into()),
            _ => {}
        }

        let overwrite = req
            .headers()
            .typed_get::<Overwrite>()
            .unwrap_or(Overwrite(true))
            .0;

        let source = match select(&*self.fs, &path).await? {
            Selection::Collection(col) => Entry::Collection(col),
            Selection::Document { document, .. } => Entry::Document(document),
            Selection::Missing { .. } | Selection::MissingPath { .. } => {
                return Err(StatusCode::NOT_FOUND.into())
            }
        };

        let cross_server = self.mode == ProcessingMode::CrossServer
            || match &dest {
                Dest::Path(_) => false,
                Dest::Url(url) => !same_authority(req, url),
            };
        if cross_server {
            let url = match dest {
                Dest::Url(url) => url,
                // A bare path cannot name another server.
                Dest::Path(_) => return Err(StatusCode::BAD_GATEWAY.into()),
            };
            debug!("copymove: cross-server to {url}");
            return self.copymove_remote(source, depth, overwrite, mode, url).await;
        }

        let dest_path = match &dest {
            Dest::Url(url) => DavPath::from_url_and_prefix(url, &self.prefix)?,
            Dest::Path(raw) => DavPath::from_encoded_path(raw, &self.prefix)?,
        };
        if path.names_same_resource(&dest_path) {
            return Err(StatusCode::FORBIDDEN.into());
        }
        // A MOVE into the moved subtree would delete the destination's
        // new ancestor out from under it.
        if mode == TransferMode::Move && path.is_ancestor_of(&dest_path) {
            return Err(StatusCode::CONFLICT.into());
        }

        let href = destination_href(req, &dest_path);
        let (target, dest_existed, dest_fs_id) = match select(&*self.fs, &dest_path).await? {
            Selection::Collection(col) => {
                let id = col.fs_id();
                (Target::Collection(FsCol::existing(col, href)), true, id)
            }
            Selection::Document { document, .. } => {
                let id = document.fs_id();
                (Target::Document(FsDoc::new(document, href)), true, id)
            }
            Selection::Missing { parent, name, .. } => {
                let id = parent.fs_id();
                (Target::Missing(FsMissing::new(parent, name, href)), false, id)
            }
            // Intermediate ancestors must exist already.
            Selection::MissingPath { .. } => return Err(StatusCode::CONFLICT.into()),
        };

        let same_fs = source.fs_id() == dest_fs_id;
        let result = if same_fs && self.mode == ProcessingMode::Fastest {
            debug!("copymove: native transfer within one filesystem");
            self.run_local(InFsActions::new(mode), overwrite, &source, depth, target)
                .await?
        } else {
            debug!("copymove: streaming transfer (same_fs: {same_fs})");
            self.run_local(CrossFsActions::new(mode), overwrite, &source, depth, target)
                .await?
        };
        multistatus::render(&result, dest_existed)
    }

    async fn run_local<A>(
        &self,
        actions: A,
        overwrite: bool,
        source: &Entry,
        depth: Depth,
        target: crate::copymove::TargetOf<A>,
    ) -> DavResult<crate::copymove::CollectionActionResult>
    where
        A: TargetActions,
    {
        let engine = CopyMoveEngine::new(actions, overwrite);
        engine.execute(source, DepthLimit::from(depth), target).await
    }

    async fn copymove_remote(
        &self,
        source: Entry,
        depth: Depth,
        overwrite: bool,
        mode: TransferMode,
        url: Url,
    ) -> DavResult<Response<Body>> {
        let factory = self.client_factory.as_ref().ok_or(DavError::NoRemoteClient)?;
        let client = factory.create(&url)?;
        let engine = CopyMoveEngine::new(RemoteActions::new(mode, client), overwrite);
        let target = engine.actions().resolve_target(url).await?;
        let dest_existed = !matches!(target, Target::Missing(_));
        let result = engine
            .execute(&source, DepthLimit::from(depth), target)
            .await?;
        multistatus::render(&result, dest_existed)
    }
}

fn parse_destination(raw: &str) -> DavResult<Dest> {
    if raw.starts_with('/') {
        return Ok(Dest::Path(raw.to_string()));
    }
    match Url::parse(raw) {
        Ok(url) if url.host_str().is_some() => Ok(Dest::Url(url)),
        _ => Err(StatusCode::BAD_REQUEST.into()),
    }
}

/// Does the destination URL point at the server this request was sent to?
/// Without a Host header there is nothing to compare against, and the
/// destination is assumed to be local.
fn same_authority(req: &Request<()>, url: &Url) -> bool {
    let host = match req.headers().typed_get::<headers::Host>() {
        Some(host) => host,
        None => return true,
    };
    let same_host = url
        .host_str()
        .map(|h| h.eq_ignore_ascii_case(host.hostname()))
        .unwrap_or(false);
    same_host && host.port() == url.port()
}

/// Absolute URL for a local destination, used as the href in results.
fn destination_href(req: &Request<()>, dest_path: &DavPath) -> Url {
    let host = req
        .headers()
        .get("host")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    Url::parse(&format!("http://{}{}", host, dest_path.with_prefix()))
        .unwrap_or_else(|_| Url::parse("http://localhost/").unwrap())
}
