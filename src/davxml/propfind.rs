//! PROPFIND request bodies.
//!
//! Only the tags matter here, so the body is scanned instead of parsed:
//! find the `propfind` element, collect the namespace declarations, then
//! enumerate the start tags inside `<prop>`.
use std::collections::HashMap;

use regex::Regex;

use crate::davxml::body_str;
use crate::errors::DavError;
use crate::props::PropName;
use crate::DavResult;

/// What a PROPFIND asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum PropfindRequest {
    /// All properties (also: empty body).
    AllProp,
    /// Names of all properties, without values.
    PropName,
    /// These properties.
    Prop(Vec<PropName>),
}

lazy_static! {
    static ref RE_PROPFIND: Regex =
        Regex::new(r"<(?:[A-Za-z_][\w.-]*:)?propfind((?:\s[^>]*)?)>").unwrap();
    static ref RE_XMLNS: Regex =
        Regex::new(r#"xmlns(?::([A-Za-z_][\w.-]*))?\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap();
    static ref RE_ALLPROP: Regex = Regex::new(r"<(?:[A-Za-z_][\w.-]*:)?allprop[\s/>]").unwrap();
    static ref RE_PROPNAME: Regex =
        Regex::new(r"<(?:[A-Za-z_][\w.-]*:)?propname[\s/>]").unwrap();
    static ref RE_PROP: Regex = Regex::new(
        r"(?s)<(?:[A-Za-z_][\w.-]*:)?prop((?:\s[^>]*)?)>(.*?)</(?:[A-Za-z_][\w.-]*:)?prop\s*>"
    )
    .unwrap();
    static ref RE_PROP_EMPTY: Regex =
        Regex::new(r"<(?:[A-Za-z_][\w.-]*:)?prop(?:\s[^>]*)?/>").unwrap();
    static ref RE_TAG: Regex =
        Regex::new(r"<([A-Za-z_][\w.-]*)(?::([A-Za-z_][\w.-]*))?((?:\s[^>]*?)?)/?>").unwrap();
}

// Namespace declarations in a run of attributes. The default namespace
// is stored under the empty alias.
fn declarations(attrs: &str) -> HashMap<String, String> {
    RE_XMLNS
        .captures_iter(attrs)
        .map(|c| {
            let alias = c.get(1).map(|m| m.as_str()).unwrap_or("").to_string();
            let url = c.get(2).or_else(|| c.get(3)).map(|m| m.as_str()).unwrap_or("");
            (alias, url.to_string())
        })
        .collect()
}

/// Decode a PROPFIND body.
pub fn decode(body: &[u8]) -> DavResult<PropfindRequest> {
    let body = body_str(body)?;
    if body.trim().is_empty() {
        return Ok(PropfindRequest::AllProp);
    }

    let root = RE_PROPFIND
        .captures(body)
        .ok_or_else(|| DavError::InvalidRequest("Missing propfind element".into()))?;

    // aliases may be declared anywhere; the default namespace is taken
    // from <propfind>, overridden by <prop>.
    let mut aliases: HashMap<String, String> = declarations(body)
        .into_iter()
        .filter(|(alias, _)| !alias.is_empty())
        .collect();
    let mut default_ns = declarations(&root[1]).remove("").unwrap_or_default();

    if RE_ALLPROP.is_match(body) {
        return Ok(PropfindRequest::AllProp);
    }
    if RE_PROPNAME.is_match(body) {
        return Ok(PropfindRequest::PropName);
    }

    let prop = match RE_PROP.captures(body) {
        Some(prop) => prop,
        None if RE_PROP_EMPTY.is_match(body) => return Ok(PropfindRequest::Prop(Vec::new())),
        None => return Err(DavError::InvalidRequest("Missing prop element".into())),
    };
    let mut prop_decl = declarations(&prop[1]);
    if let Some(ns) = prop_decl.remove("") {
        default_ns = ns;
    }
    aliases.extend(prop_decl);

    let mut names = Vec::new();
    for tag in RE_TAG.captures_iter(&prop[2]) {
        let (prefix, local) = match tag.get(2) {
            Some(local) => (Some(&tag[1]), local.as_str()),
            None => (None, &tag[1]),
        };
        let inline = declarations(&tag[3]);
        let ns = match prefix {
            Some(prefix) => inline
                .get(prefix)
                .or_else(|| aliases.get(prefix))
                .cloned()
                .ok_or_else(|| {
                    DavError::InvalidRequest(format!("Unknown namespace prefix {}", prefix))
                })?,
            None => inline.get("").cloned().unwrap_or_else(|| default_ns.clone()),
        };
        let name = PropName::new(ns, local);
        if !names.contains(&name) {
            names.push(name);
        }
    }
    Ok(PropfindRequest::Prop(names))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(body: &str) -> Vec<PropName> {
        match decode(body.as_bytes()).unwrap() {
            PropfindRequest::Prop(p) => p,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn empty_body_is_allprop() {
        assert_eq!(decode(b"").unwrap(), PropfindRequest::AllProp);
        assert_eq!(decode(b"  \n").unwrap(), PropfindRequest::AllProp);
    }

    #[test]
    fn allprop_and_propname() {
        let b = r#"<?xml version="1.0"?><D:propfind xmlns:D="DAV:"><D:allprop/></D:propfind>"#;
        assert_eq!(decode(b.as_bytes()).unwrap(), PropfindRequest::AllProp);
        let b = r#"<propfind xmlns="DAV:"><propname/></propfind>"#;
        assert_eq!(decode(b.as_bytes()).unwrap(), PropfindRequest::PropName);
    }

    #[test]
    fn aliases_and_default_namespace() {
        let p = props(
            r#"<?xml version="1.0" encoding="utf-8" ?>
            <D:propfind xmlns:D="DAV:" xmlns:oc="http://owncloud.org/ns">
              <D:prop>
                <D:getcontentlength/>
                <D:getetag/>
                <oc:fileid/>
              </D:prop>
            </D:propfind>"#,
        );
        assert_eq!(
            p,
            vec![
                PropName::dav("getcontentlength"),
                PropName::dav("getetag"),
                PropName::oc("fileid"),
            ]
        );

        let p = props(r#"<propfind xmlns="DAV:"><prop><resourcetype/></prop></propfind>"#);
        assert_eq!(p, vec![PropName::dav("resourcetype")]);
    }

    #[test]
    fn inline_and_null_namespace() {
        let p = props(
            r#"<D:propfind xmlns:D="DAV:"><D:prop>
                 <foo xmlns="http://example.com/ns"/>
                 <bar xmlns=""/>
                 <baz/>
               </D:prop></D:propfind>"#,
        );
        assert_eq!(p[0], PropName::new("http://example.com/ns", "foo"));
        assert_eq!(p[1], PropName::new("", "bar"));
        assert!(p[1].is_null_namespace());
        assert!(p[2].is_null_namespace());
    }

    #[test]
    fn malformed() {
        assert!(decode(b"<foo/>").is_err());
        assert!(decode(b"<D:propfind xmlns:D=\"DAV:\"></D:propfind>").is_err());
        assert!(decode(b"<D:propfind xmlns:D=\"DAV:\"><D:prop><x:foo/></D:prop></D:propfind>")
            .is_err());
        assert!(decode(&[0xff, 0xfe]).is_err());
    }
}
