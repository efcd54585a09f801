//
// Render the engine's result tree into an HTTP response: a plain status
// for clean or trivially failed operations, a 207 multi-status body with
// one <response> per failed node otherwise.
//
use std::io;

use http::{Response, StatusCode};
use xml::writer::{EmitterConfig, XmlEvent};

use crate::body::Body;
use crate::copymove::{ActionResult, ActionStatus, CollectionActionResult};
use crate::xmltree_ext::status_line;
use crate::DavResult;

/// The status code a single result maps to.
pub(crate) fn status_of(result: &ActionResult) -> StatusCode {
    match result.status {
        ActionStatus::Created => StatusCode::CREATED,
        ActionStatus::Overwritten | ActionStatus::Updated => StatusCode::NO_CONTENT,
        ActionStatus::Ignored => StatusCode::OK,
        ActionStatus::CannotOverwrite => StatusCode::PRECONDITION_FAILED,
        ActionStatus::OverwriteFailed => StatusCode::CONFLICT,
        ActionStatus::PropSetFailed | ActionStatus::ParentFailed => StatusCode::FAILED_DEPENDENCY,
        ActionStatus::CreateFailed
        | ActionStatus::TargetDeleteFailed
        | ActionStatus::CleanupFailed => result
            .error
            .as_ref()
            .map(|e| e.statuscode())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Render a finished engine run. `dest_existed` selects between 201 and 204
/// for the clean case, per RFC 4918.
pub(crate) fn render(
    result: &CollectionActionResult,
    dest_existed: bool,
) -> DavResult<Response<Body>> {
    if !result.result.is_success() {
        // The operation failed at its root; a plain status says it all.
        return Ok(plain(status_of(&result.result)));
    }
    // A lone-document operation sits under a synthetic Ignored wrapper;
    // unwrap it so a plain failure gets a plain status, not a 207.
    if result.result.status == ActionStatus::Ignored
        && result.documents.len() == 1
        && result.collections.is_empty()
        && !result.documents[0].is_success()
    {
        return Ok(plain(status_of(&result.documents[0])));
    }

    let mut failures = Vec::new();
    collect(result, &mut failures);
    if failures.is_empty() {
        let status = if dest_existed {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::CREATED
        };
        return Ok(plain(status));
    }

    let mut buf = Vec::new();
    let mut writer = EmitterConfig::new()
        .write_document_declaration(true)
        .create_writer(&mut buf);
    let xml_err = |e: xml::writer::Error| io::Error::new(io::ErrorKind::Other, e.to_string());

    writer
        .write(XmlEvent::start_element("D:multistatus").ns("D", "DAV:"))
        .map_err(xml_err)?;
    for failure in failures {
        writer
            .write(XmlEvent::start_element("D:response"))
            .map_err(xml_err)?;
        writer
            .write(XmlEvent::start_element("D:href"))
            .map_err(xml_err)?;
        writer
            .write(XmlEvent::characters(failure.href.as_str()))
            .map_err(xml_err)?;
        writer.write(XmlEvent::end_element()).map_err(xml_err)?;
        writer
            .write(XmlEvent::start_element("D:status"))
            .map_err(xml_err)?;
        writer
            .write(XmlEvent::characters(&status_line(status_of(failure))))
            .map_err(xml_err)?;
        writer.write(XmlEvent::end_element()).map_err(xml_err)?;
        if let Some(error) = &failure.error {
            writer
                .write(XmlEvent::start_element("D:responsedescription"))
                .map_err(xml_err)?;
            writer
                .write(XmlEvent::characters(&error.to_string()))
                .map_err(xml_err)?;
            writer.write(XmlEvent::end_element()).map_err(xml_err)?;
        }
        writer.write(XmlEvent::end_element()).map_err(xml_err)?;
    }
    writer.write(XmlEvent::end_element()).map_err(xml_err)?;

    Ok(Response::builder()
        .status(StatusCode::MULTI_STATUS)
        .header("content-type", "application/xml; charset=utf-8")
        .body(Body::from(buf))
        .unwrap())
}

fn plain(status: StatusCode) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("content-length", "0")
        .body(Body::empty())
        .unwrap()
}

/// Collect the failed nodes, depth-first. `ParentFailed` entries are left
/// out: the failure of their ancestor is already reported, and repeating it
/// per descendant only pads the response.
fn collect<'a>(result: &'a CollectionActionResult, out: &mut Vec<&'a ActionResult>) {
    push_failure(&result.result, out);
    for doc in &result.documents {
        push_failure(doc, out);
    }
    for col in &result.collections {
        collect(col, out);
    }
}

fn push_failure<'a>(result: &'a ActionResult, out: &mut Vec<&'a ActionResult>) {
    if !result.is_success() && result.status != ActionStatus::ParentFailed {
        out.push(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn result(status: ActionStatus, href: &str) -> ActionResult {
        ActionResult::new(status, "x", Url::parse(href).unwrap())
    }

    #[test]
    fn clean_run_is_created_or_no_content() {
        let tree = CollectionActionResult::leaf(result(ActionStatus::Created, "http://h/a/"));
        assert_eq!(
            render(&tree, false).unwrap().status(),
            StatusCode::CREATED
        );
        assert_eq!(
            render(&tree, true).unwrap().status(),
            StatusCode::NO_CONTENT
        );
    }

    #[test]
    fn lone_document_failure_is_plain_status() {
        let mut tree = CollectionActionResult::leaf(result(ActionStatus::Ignored, "http://h/a"));
        tree.documents
            .push(result(ActionStatus::CannotOverwrite, "http://h/a"));
        assert_eq!(
            render(&tree, true).unwrap().status(),
            StatusCode::PRECONDITION_FAILED
        );
    }

    #[test]
    fn root_refusal_is_plain_status() {
        let tree =
            CollectionActionResult::leaf(result(ActionStatus::CannotOverwrite, "http://h/a/"));
        assert_eq!(
            render(&tree, true).unwrap().status(),
            StatusCode::PRECONDITION_FAILED
        );
    }

    #[tokio::test]
    async fn child_failures_become_multistatus() {
        use futures_util::StreamExt;

        let mut tree = CollectionActionResult::leaf(result(ActionStatus::Created, "http://h/a/"));
        tree.documents
            .push(result(ActionStatus::Created, "http://h/a/ok.txt"));
        tree.documents.push(ActionResult::with_error(
            ActionStatus::CreateFailed,
            "bad.txt",
            Url::parse("http://h/a/bad.txt").unwrap(),
            crate::fs::FsError::Forbidden.into(),
        ));

        let resp = render(&tree, false).unwrap();
        assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
        let mut body = Vec::new();
        let mut stream = resp.into_body();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk.unwrap());
        }
        let body = String::from_utf8(body).unwrap();
        assert!(body.contains("http://h/a/bad.txt"));
        assert!(body.contains("HTTP/1.1 403 Forbidden"));
        assert!(!body.contains("ok.txt"));
    }
}
