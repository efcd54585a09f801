use headers::HeaderMapExt;
use http::{Request, Response};

use crate::body::Body;
use crate::util::DavMethod;
use crate::DavResult;

impl crate::DavHandler {
    pub(crate) async fn handle_options(&self, req: &Request<()>) -> DavResult<Response<Body>> {
        let mut res = Response::new(Body::empty());

        let h = res.headers_mut();
        // Class 1 compliance: this handler does not do locking.
        h.insert("DAV", "1".parse().unwrap());
        h.insert("MS-Author-Via", "DAV".parse().unwrap());
        h.typed_insert(headers::ContentLength(0));

        let path = self.path(req);
        let mut v = Vec::new();
        let mut mm = |m: &str, y: DavMethod| {
            if self.allow.contains(y) {
                v.push(m.to_string());
            }
        };
        mm("OPTIONS", DavMethod::OPTIONS);
        mm("COPY", DavMethod::COPY);
        // The root itself cannot be moved away.
        if path.as_url_string() != "/" {
            mm("MOVE", DavMethod::MOVE);
        }

        let a = v.join(",").parse().unwrap();
        res.headers_mut().insert("allow", a);

        Ok(res)
    }
}

#[cfg(test)]
#[cfg(feature = "memfs")]
mod tests {
    use http::{Request, StatusCode};

    use crate::body::Body;
    use crate::davhandler::{DavHandler, FileSystem};

    #[tokio::test]
    async fn advertises_copy_and_move() {
        let handler = DavHandler::builder(FileSystem::Mem).build();
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/a")
            .body(Body::empty())
            .unwrap();
        let resp = handler.handle(req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["DAV"], "1");
        let allow = resp.headers()["allow"].to_str().unwrap();
        assert!(allow.contains("COPY"));
        assert!(allow.contains("MOVE"));

        let req = Request::builder()
            .method("OPTIONS")
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let resp = handler.handle(req).await;
        let allow = resp.headers()["allow"].to_str().unwrap();
        assert!(!allow.contains("MOVE"));
    }
}
