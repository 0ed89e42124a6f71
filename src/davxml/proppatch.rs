//! PROPPATCH request bodies, parsed with `xmltree`.
use xmltree::{Element, EmitterConfig, XMLNode};

use crate::davxml::text;
use crate::errors::DavError;
use crate::fs::PropPatchAction;
use crate::props::{PropName, PropValue, NS_DAV_URI};
use crate::DavResult;

fn is_dav(elem: &Element, name: &str) -> bool {
    elem.name == name && elem.namespace.as_deref() == Some(NS_DAV_URI)
}

fn elements(elem: &Element) -> impl Iterator<Item = &Element> {
    elem.children.iter().filter_map(|n| n.as_element())
}

// Child nodes serialized as markup. Text is escaped again.
fn children_to_string(elem: &Element) -> DavResult<String> {
    let mut out = String::new();
    for node in &elem.children {
        match node {
            XMLNode::Element(child) => {
                let mut buf = Vec::new();
                let config = EmitterConfig::new()
                    .write_document_declaration(false)
                    .perform_indent(false);
                child
                    .write_with_config(&mut buf, config)
                    .map_err(|e| DavError::InvalidRequest(format!("Invalid property value: {}", e)))?;
                out.push_str(&String::from_utf8_lossy(&buf));
            }
            XMLNode::Text(t) | XMLNode::CData(t) => out.push_str(&text(t)),
            _ => {}
        }
    }
    Ok(out)
}

fn value_of(elem: &Element) -> DavResult<PropValue> {
    let mut attributes: Vec<(String, String)> = elem
        .attributes
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    attributes.sort();

    let nested = elements(elem).next().is_some();
    let value = if nested || !attributes.is_empty() {
        PropValue::Xml {
            attributes,
            content: children_to_string(elem)?,
        }
    } else {
        match elem.get_text() {
            Some(t) if !t.is_empty() => PropValue::Text(t.into_owned()),
            _ => PropValue::Empty,
        }
    };
    Ok(value)
}

/// Decode a PROPPATCH body into the list of changes, in document order.
///
/// When a property is named more than once the last action wins.
pub fn decode(body: &[u8]) -> DavResult<Vec<PropPatchAction>> {
    let root = Element::parse(body)?;
    if !is_dav(&root, "propertyupdate") {
        return Err(DavError::InvalidRequest(
            "Expected a propertyupdate element".into(),
        ));
    }

    let mut actions: Vec<PropPatchAction> = Vec::new();
    for op in elements(&root) {
        let set = if is_dav(op, "set") {
            true
        } else if is_dav(op, "remove") {
            false
        } else {
            continue;
        };
        for prop in elements(op).filter(|e| is_dav(e, "prop")) {
            for elem in elements(prop) {
                let name = PropName::new(
                    elem.namespace.clone().unwrap_or_default(),
                    elem.name.clone(),
                );
                let value = if set { Some(value_of(elem)?) } else { None };
                actions.retain(|a| a.name != name);
                actions.push(PropPatchAction { name, value });
            }
        }
    }
    Ok(actions)
}
