//! Utility module to handle the path part of an URL as a resource path.
//!
//! A [`DavPath`] is the normalized, base-URI-relative form of a request
//! path: repeated slashes are collapsed, segments are percent-decoded and
//! `..` is refused. Storage backends see it through [`DavPath::as_rel_str`],
//! responses use [`DavPath::as_url_string`].

use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::errors::DavError;
use crate::DavResult;

// Characters that are percent-encoded when a path is written back out.
const PATH_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Path information relative to a prefix.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DavPath {
    prefix: String,
    segments: Vec<String>,
    collection: bool,
}

impl fmt::Display for DavPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_url_string())
    }
}

impl fmt::Debug for DavPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.as_url_string())
    }
}

// normalize the prefix: "" or "/foo" (leading slash, no trailing slash).
fn normalize_prefix(prefix: &str) -> String {
    let p = prefix.trim_end_matches('/');
    if p.is_empty() {
        String::new()
    } else if p.starts_with('/') {
        p.to_string()
    } else {
        format!("/{}", p)
    }
}

impl DavPath {
    /// Resolve a request path against a base URI.
    ///
    /// Returns `Ok(None)` when the path is not below `prefix`, and an
    /// error when the path is not acceptable (`..`, bad encoding).
    pub fn from_str_and_prefix(path: &str, prefix: &str) -> DavResult<Option<DavPath>> {
        let prefix = normalize_prefix(prefix);
        if !path.starts_with('/') {
            return Err(DavError::InvalidRequest(format!("Invalid path: {}", path)));
        }
        let rest = match path.strip_prefix(prefix.as_str()) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => return Ok(None),
        };

        let collection = rest.is_empty() || rest.ends_with('/');
        let mut segments = Vec::new();
        for raw in rest.split('/') {
            if raw.is_empty() {
                continue;
            }
            let seg = percent_decode_str(raw)
                .decode_utf8()
                .map_err(|_| DavError::InvalidRequest("Invalid path encoding".into()))?;
            match seg.as_ref() {
                "." => continue,
                ".." => {
                    return Err(DavError::InvalidRequest(
                        "Path segments \"..\" are not allowed".into(),
                    ))
                }
                s if s.contains('/') || s.contains('\0') => {
                    return Err(DavError::InvalidRequest("Invalid path segment".into()))
                }
                _ => segments.push(seg.into_owned()),
            }
        }

        Ok(Some(DavPath {
            prefix,
            collection: collection || segments.is_empty(),
            segments,
        }))
    }

    /// Resolve the path part of a request URI against a base URI.
    pub fn from_uri_and_prefix(uri: &http::Uri, prefix: &str) -> DavResult<Option<DavPath>> {
        DavPath::from_str_and_prefix(uri.path(), prefix)
    }

    /// Resolve a `Destination` header value or an `If` resource tag.
    ///
    /// Both absolute URLs and absolute paths are accepted. The result
    /// must be below `prefix`.
    pub fn from_destination(value: &str, prefix: &str) -> DavResult<DavPath> {
        let value = value.trim();
        let path = if value.starts_with('/') {
            value.split(['?', '#']).next().unwrap_or_default().to_string()
        } else {
            url::Url::parse(value)
                .map_err(|_| DavError::InvalidRequest(format!("Invalid URL: {}", value)))?
                .path()
                .to_string()
        };
        DavPath::from_str_and_prefix(&path, prefix)?.ok_or_else(|| {
            DavError::InvalidRequest(format!("{} is outside of the base URI", value))
        })
    }

    /// The decoded path relative to the base URI, without leading or
    /// trailing slash. The root is the empty string.
    pub fn as_rel_str(&self) -> String {
        self.segments.join("/")
    }

    /// The base URI plus the percent-encoded path. Collections end in a slash.
    pub fn as_url_string(&self) -> String {
        let mut s = self.prefix.clone();
        for seg in &self.segments {
            s.push('/');
            s.extend(utf8_percent_encode(seg, PATH_ENCODE_SET));
        }
        if self.collection || self.segments.is_empty() {
            s.push('/');
        }
        s
    }

    /// The base URI this path is relative to.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether the request path ended in a slash.
    pub fn is_collection(&self) -> bool {
        self.collection
    }

    pub fn add_slash(&mut self) {
        self.collection = true;
    }

    /// Last segment, `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(|s| s.as_str())
    }

    /// The parent collection. The parent of the root is the root.
    pub fn parent(&self) -> DavPath {
        let mut segments = self.segments.clone();
        segments.pop();
        DavPath {
            prefix: self.prefix.clone(),
            segments,
            collection: true,
        }
    }

    /// Append a (decoded) segment.
    pub fn push_segment(&mut self, segment: &str) {
        self.segments.push(segment.to_string());
        self.collection = false;
    }

    /// Is this path equal to or below `other`.
    pub fn is_within(&self, other: &DavPath) -> bool {
        self.segments.len() >= other.segments.len()
            && self.segments[..other.segments.len()] == other.segments[..]
    }

    /// Same resource, ignoring a trailing slash.
    pub fn same_resource(&self, other: &DavPath) -> bool {
        self.segments == other.segments
    }
}
