//
// Helpers on top of xmltree::Element for building and picking apart
// DAV: namespaced XML documents.
//
use std::collections::HashMap;

use http::StatusCode;
use xml::EmitterConfig;
use xmltree::{Element, Namespace, XMLNode};

use crate::DavResult;

pub const NS_DAV: &str = "DAV:";

/// Create an element in the DAV: namespace.
pub fn dav_element(name: &str) -> Element {
    let mut el = Element::new(name);
    el.prefix = Some("D".to_string());
    el.namespace = Some(NS_DAV.to_string());
    el
}

/// Create a DAV: element with character content.
pub fn dav_text(name: &str, text: &str) -> Element {
    let mut el = dav_element(name);
    el.children.push(XMLNode::Text(text.to_string()));
    el
}

/// First direct child element with the given namespace and local name.
pub fn child<'a>(el: &'a Element, ns: &str, name: &str) -> Option<&'a Element> {
    el.children.iter().find_map(|node| match node {
        XMLNode::Element(e) if e.name == name && e.namespace.as_deref() == Some(ns) => Some(e),
        _ => None,
    })
}

/// All direct child elements with the given namespace and local name.
pub fn children<'a>(el: &'a Element, ns: &str, name: &str) -> Vec<&'a Element> {
    el.children
        .iter()
        .filter_map(|node| match node {
            XMLNode::Element(e) if e.name == name && e.namespace.as_deref() == Some(ns) => Some(e),
            _ => None,
        })
        .collect()
}

/// All direct child elements, whatever their name.
pub fn elements<'a>(el: &'a Element) -> Vec<&'a Element> {
    el.children
        .iter()
        .filter_map(|node| match node {
            XMLNode::Element(e) => Some(e),
            _ => None,
        })
        .collect()
}

/// Concatenated character content of an element.
pub fn text_of(el: &Element) -> String {
    let mut s = String::new();
    for node in &el.children {
        if let XMLNode::Text(t) = node {
            s.push_str(t);
        }
    }
    s.trim().to_string()
}

/// Serialize a document. All namespaces used anywhere in the tree are
/// declared on the root element, with `D` reserved for DAV:.
pub fn write_document(mut root: Element) -> DavResult<Vec<u8>> {
    let mut uris = Vec::new();
    collect_namespaces(&root, &mut uris);

    let mut prefixes = HashMap::new();
    let mut decls = Namespace::empty();
    let mut n = 0;
    for uri in uris {
        let prefix = if uri == NS_DAV {
            "D".to_string()
        } else {
            n += 1;
            format!("ns{n}")
        };
        decls.put(prefix.clone(), uri.clone());
        prefixes.insert(uri, prefix);
    }
    apply_prefixes(&mut root, &prefixes);
    root.namespaces = Some(decls);

    let mut buf = Vec::new();
    let config = EmitterConfig::new()
        .write_document_declaration(true)
        .perform_indent(false);
    root.write_with_config(&mut buf, config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    Ok(buf)
}

fn collect_namespaces(el: &Element, uris: &mut Vec<String>) {
    if let Some(ns) = &el.namespace {
        if !uris.contains(ns) {
            uris.push(ns.clone());
        }
    }
    for node in &el.children {
        if let XMLNode::Element(e) = node {
            collect_namespaces(e, uris);
        }
    }
}

fn apply_prefixes(el: &mut Element, prefixes: &HashMap<String, String>) {
    if let Some(ns) = &el.namespace {
        el.prefix = prefixes.get(ns).cloned();
    }
    el.namespaces = None;
    for node in &mut el.children {
        if let XMLNode::Element(e) = node {
            apply_prefixes(e, prefixes);
        }
    }
}

/// Parse a `<D:status>HTTP/1.1 424 Failed Dependency</D:status>` line.
pub fn parse_status_line(s: &str) -> Option<StatusCode> {
    let code: u16 = s.split_whitespace().nth(1)?.parse().ok()?;
    StatusCode::from_u16(code).ok()
}

/// Render a status line the way it appears in multistatus bodies.
pub fn status_line(code: StatusCode) -> String {
    match code.canonical_reason() {
        Some(reason) => format!("HTTP/1.1 {} {}", code.as_u16(), reason),
        None => format!("HTTP/1.1 {}", code.as_u16()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_reparse() {
        let mut prop = dav_element("prop");
        let mut custom = Element::new("color");
        custom.namespace = Some("urn:example".to_string());
        custom.children.push(XMLNode::Text("blue".to_string()));
        prop.children.push(XMLNode::Element(custom));
        let mut root = dav_element("propertyupdate");
        root.children.push(XMLNode::Element(prop));

        let buf = write_document(root).unwrap();
        let parsed = Element::parse(&buf[..]).unwrap();
        assert_eq!(parsed.name, "propertyupdate");
        let prop = child(&parsed, NS_DAV, "prop").unwrap();
        let color = child(prop, "urn:example", "color").unwrap();
        assert_eq!(text_of(color), "blue");
    }

    #[test]
    fn status_lines() {
        assert_eq!(
            parse_status_line("HTTP/1.1 424 Failed Dependency"),
            Some(StatusCode::FAILED_DEPENDENCY)
        );
        assert_eq!(parse_status_line("garbage"), None);
        assert_eq!(status_line(StatusCode::CONFLICT), "HTTP/1.1 409 Conflict");
    }
}
