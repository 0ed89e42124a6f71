//! Writing multistatus responses and lock documents.
//!
//! The body of the document is written first; the root element, which
//! carries the namespace declarations, is put in front of it when the
//! document is finished, since the set of namespaces is only known then.
use std::fmt::Write;

use http::StatusCode;

use crate::davxml::{attr, text, XML_DECL};
use crate::fs::{DavLock, LockScope};
use crate::props::{NamespaceRegistry, PropMap, PropName, PropValue};
use crate::util::{datetime_to_httpdate, quote_etag};

pub(crate) fn status_line(status: StatusCode) -> String {
    format!(
        "HTTP/1.1 {} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    )
}

/// Builds one multistatus document.
pub(crate) struct MultistatusWriter {
    ns: NamespaceRegistry,
    body: String,
    unix_creationdate: bool,
}

impl MultistatusWriter {
    pub fn new() -> MultistatusWriter {
        MultistatusWriter {
            ns: NamespaceRegistry::new(),
            body: String::new(),
            unix_creationdate: false,
        }
    }

    /// Render `creationdate` as a unix timestamp. Some legacy clients
    /// cannot parse anything else.
    pub fn unix_creationdate(mut self, yes: bool) -> Self {
        self.unix_creationdate = yes;
        self
    }

    // element name with alias, plus the attribute to use for the null namespace.
    fn tag(&mut self, name: &PropName) -> (String, &'static str) {
        match self.ns.alias(&name.ns) {
            Some(alias) => (format!("{}:{}", alias, name.name), ""),
            None => (name.name.to_string(), " xmlns=\"\""),
        }
    }

    fn write_name(&mut self, name: &PropName) {
        let (tag, xmlns) = self.tag(name);
        let _ = writeln!(self.body, "<{}{}/>", tag, xmlns);
    }

    fn write_prop(&mut self, name: &PropName, value: &PropValue) {
        let (tag, xmlns) = self.tag(name);
        let content = match value {
            PropValue::Empty => {
                let _ = writeln!(self.body, "<{}{}/>", tag, xmlns);
                return;
            }
            PropValue::Collection => "<d:collection/>".to_string(),
            PropValue::Text(t) if name.is_dav("getetag") => text(&quote_etag(t)),
            PropValue::Text(t) => text(t),
            PropValue::Date(d) if self.unix_creationdate && name.is_dav("creationdate") => {
                d.unix_timestamp().to_string()
            }
            PropValue::Date(d) => datetime_to_httpdate(*d),
            PropValue::Xml {
                attributes,
                content,
            } => {
                let _ = write!(self.body, "<{}{}", tag, xmlns);
                for (k, v) in attributes {
                    let _ = write!(self.body, " {}=\"{}\"", k, attr(v));
                }
                let _ = writeln!(self.body, ">{}</{}>", content, tag);
                return;
            }
        };
        let _ = writeln!(self.body, "<{}{}>{}</{}>", tag, xmlns, content, tag);
    }

    fn open_response(&mut self, href: &str) {
        let _ = writeln!(self.body, "<d:response><d:href>{}</d:href>", text(href));
    }

    fn close_propstat(&mut self, status: StatusCode) {
        let _ = writeln!(
            self.body,
            "</d:prop><d:status>{}</d:status></d:propstat>",
            status_line(status)
        );
    }

    /// Add the PROPFIND result of one resource.
    ///
    /// `requested` is `None` for allprop, in which case no 404 block is
    /// written. With `names_only` the values are left out.
    pub fn add_propfind_response(
        &mut self,
        href: &str,
        props: &PropMap,
        requested: Option<&[PropName]>,
        names_only: bool,
    ) {
        let is_collection = props.is_collection();
        let content_type = PropName::dav("getcontenttype");
        let shown = |n: &PropName| !(is_collection && *n == content_type);

        let found: Vec<&(PropName, PropValue)> = match requested {
            None => props.iter().filter(|(n, _)| shown(n)).collect(),
            Some(req) => req
                .iter()
                .filter(|n| shown(n))
                .filter_map(|n| props.iter().find(|(pn, _)| pn == n))
                .collect(),
        };
        let missing: Vec<&PropName> = match requested {
            None => Vec::new(),
            Some(req) => req
                .iter()
                .filter(|n| !shown(n) || !props.contains(n))
                .collect(),
        };

        self.open_response(href);
        if !found.is_empty() || missing.is_empty() {
            self.body.push_str("<d:propstat><d:prop>\n");
            for (name, value) in found {
                if names_only {
                    self.write_name(name);
                } else {
                    self.write_prop(name, value);
                }
            }
            self.close_propstat(StatusCode::OK);
        }
        if !missing.is_empty() {
            self.body.push_str("<d:propstat><d:prop>\n");
            for name in missing {
                self.write_name(name);
            }
            self.close_propstat(StatusCode::NOT_FOUND);
        }
        self.body.push_str("</d:response>\n");
    }

    /// Add the PROPPATCH result of one resource, one propstat per status.
    pub fn add_proppatch_response(&mut self, href: &str, results: &[(PropName, StatusCode)]) {
        self.open_response(href);
        let mut statuses: Vec<StatusCode> = Vec::new();
        for (_, s) in results {
            if !statuses.contains(s) {
                statuses.push(*s);
            }
        }
        for status in statuses {
            self.body.push_str("<d:propstat><d:prop>\n");
            for (name, _) in results.iter().filter(|(_, s)| *s == status) {
                self.write_name(name);
            }
            self.close_propstat(status);
        }
        self.body.push_str("</d:response>\n");
    }

    /// The complete document.
    pub fn finish(self) -> String {
        format!(
            "{}<d:multistatus{}>\n{}</d:multistatus>\n",
            XML_DECL,
            self.ns.declarations(),
            self.body
        )
    }
}

/// `<d:activelock>` for one lock.
pub(crate) fn activelock_xml(lock: &DavLock, root_href: &str) -> String {
    let scope = match lock.scope {
        LockScope::Exclusive => "<d:exclusive/>",
        LockScope::Shared => "<d:shared/>",
    };
    let mut s = String::new();
    let _ = write!(
        s,
        "<d:activelock><d:locktype><d:write/></d:locktype><d:lockscope>{}</d:lockscope><d:depth>infinity</d:depth>",
        scope
    );
    if let Some(owner) = &lock.owner {
        let _ = write!(s, "<d:owner>{}</d:owner>", owner);
    }
    let _ = write!(
        s,
        "<d:timeout>Second-{}</d:timeout><d:locktoken><d:href>{}</d:href></d:locktoken><d:lockroot><d:href>{}</d:href></d:lockroot></d:activelock>",
        lock.timeout.as_secs(),
        text(&lock.token),
        text(root_href)
    );
    s
}

/// Content of `<d:lockdiscovery>`.
pub(crate) fn lockdiscovery_content(locks: &[(DavLock, String)]) -> String {
    locks
        .iter()
        .map(|(l, href)| activelock_xml(l, href))
        .collect()
}

/// Content of `<d:supportedlock>`.
pub(crate) fn supportedlock_content() -> String {
    ["exclusive", "shared"]
        .iter()
        .map(|scope| {
            format!(
                "<d:lockentry><d:lockscope><d:{}/></d:lockscope><d:locktype><d:write/></d:locktype></d:lockentry>",
                scope
            )
        })
        .collect()
}

/// Body of a successful LOCK.
pub(crate) fn lock_response_body(lock: &DavLock, root_href: &str) -> String {
    format!(
        "{}<d:prop xmlns:d=\"DAV:\"><d:lockdiscovery>{}</d:lockdiscovery></d:prop>\n",
        XML_DECL,
        activelock_xml(lock, root_href)
    )
}
