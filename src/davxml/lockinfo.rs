//! LOCK request bodies.
use regex::Regex;

use crate::davxml::body_str;
use crate::errors::DavError;
use crate::fs::LockScope;
use crate::DavResult;

/// A decoded `<lockinfo>`.
#[derive(Debug, Clone, PartialEq)]
pub struct LockInfo {
    pub scope: LockScope,
    /// Content of `<owner>`, as markup, with the DAV: namespace written as `d:`.
    pub owner: Option<String>,
}

lazy_static! {
    static ref RE_LOCKINFO: Regex =
        Regex::new(r"<(?:[A-Za-z_][\w.-]*:)?lockinfo((?:\s[^>]*)?)>").unwrap();
    static ref RE_SCOPE: Regex = Regex::new(
        r"<(?:[A-Za-z_][\w.-]*:)?lockscope(?:\s[^>]*)?>\s*<(?:[A-Za-z_][\w.-]*:)?(exclusive|shared)[\s/>]"
    )
    .unwrap();
    static ref RE_OWNER: Regex = Regex::new(
        r"(?s)<(?:[A-Za-z_][\w.-]*:)?owner(?:\s[^>]*)?>(.*?)</(?:[A-Za-z_][\w.-]*:)?owner\s*>"
    )
    .unwrap();
    static ref RE_DAV_ALIAS: Regex =
        Regex::new(r#"xmlns:([A-Za-z_][\w.-]*)\s*=\s*["']DAV:["']"#).unwrap();
    static ref RE_DAV_DEFAULT: Regex = Regex::new(r#"xmlns\s*=\s*["']DAV:["']"#).unwrap();
    static ref RE_UNPREFIXED: Regex = Regex::new(r"<(/?)([A-Za-z_][\w.-]*[\s/>])").unwrap();
    static ref RE_NS_DECL: Regex =
        Regex::new(r#"xmlns:([A-Za-z_][\w.-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap();
}

// Rewrite the owner markup so that DAV: elements use the `d` alias that
// responses declare.
fn normalize_owner(owner: &str, body: &str) -> String {
    if let Some(alias) = RE_DAV_ALIAS.captures(body).map(|c| c[1].to_string()) {
        if alias == "d" {
            return owner.to_string();
        }
        let re = Regex::new(&format!(r"<(/?){}:", regex::escape(&alias)));
        return match re {
            Ok(re) => re.replace_all(owner, "<${1}d:").into_owned(),
            Err(_) => owner.to_string(),
        };
    }
    if RE_DAV_DEFAULT.is_match(body) {
        return RE_UNPREFIXED.replace_all(owner, "<${1}d:${2}").into_owned();
    }
    owner.to_string()
}

// The owner markup is echoed inside responses that only declare `d`.
// Every other prefix it uses but does not declare itself gets its
// declaration copied onto the elements that use it.
fn declare_prefixes(owner: &str, body: &str) -> String {
    let mut owner = owner.to_string();
    for c in RE_NS_DECL.captures_iter(body) {
        let alias = &c[1];
        let url = c.get(2).or_else(|| c.get(3)).map(|m| m.as_str()).unwrap_or_default();
        if alias == "d" || url == "DAV:" || owner.contains(&format!("xmlns:{}", alias)) {
            continue;
        }
        let re = match Regex::new(&format!(r"<{}:[\w.-]+", regex::escape(alias))) {
            Ok(re) => re,
            Err(_) => continue,
        };
        let decl = c[0].to_string();
        owner = re
            .replace_all(&owner, |m: &regex::Captures| format!("{} {}", &m[0], decl))
            .into_owned();
    }
    owner
}

/// Decode a LOCK body. An empty body is a refresh and yields `None`.
pub fn decode(body: &[u8]) -> DavResult<Option<LockInfo>> {
    let body = body_str(body)?;
    if body.trim().is_empty() {
        return Ok(None);
    }
    if !RE_LOCKINFO.is_match(body) {
        return Err(DavError::InvalidRequest("Missing lockinfo element".into()));
    }

    let scope = match RE_SCOPE.captures(body) {
        Some(c) if &c[1] == "shared" => LockScope::Shared,
        Some(_) => LockScope::Exclusive,
        None => return Err(DavError::InvalidRequest("Missing lock scope".into())),
    };
    let owner = RE_OWNER
        .captures(body)
        .map(|c| c[1].trim().to_string())
        .filter(|o| !o.is_empty())
        .map(|o| declare_prefixes(&normalize_owner(&o, body), body));

    Ok(Some(LockInfo { scope, owner }))
}
