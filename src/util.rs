use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bitflags::bitflags;
use headers::Header;
use time::OffsetDateTime;

use crate::errors::DavError;
use crate::DavResult;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DavMethod: u32 {
        const HEAD = 0x0001;
        const GET = 0x0002;
        const PUT = 0x0004;
        const OPTIONS = 0x0010;
        const PROPFIND = 0x0020;
        const PROPPATCH = 0x0040;
        const MKCOL = 0x0080;
        const COPY = 0x0100;
        const MOVE = 0x0200;
        const DELETE = 0x0400;
        const LOCK = 0x0800;
        const UNLOCK = 0x1000;

        const HTTP_RO = Self::HEAD.bits() | Self::GET.bits() | Self::OPTIONS.bits();
        const HTTP_RW = Self::HTTP_RO.bits() | Self::PUT.bits();
        const WEBDAV_RO = Self::HTTP_RO.bits() | Self::PROPFIND.bits();
        const WEBDAV_BODY = Self::PUT.bits() | Self::PROPFIND.bits()
            | Self::PROPPATCH.bits() | Self::LOCK.bits();
    }
}

impl DavMethod {
    pub const WEBDAV_RW: Self = Self::all();
}

/// A set of methods. Used to configure which methods a handler accepts.
pub type DavMethodSet = DavMethod;

// Name and flag, in the order they are advertised in `Allow`.
pub(crate) const METHOD_NAMES: &[(&str, DavMethod)] = &[
    ("GET", DavMethod::GET),
    ("HEAD", DavMethod::HEAD),
    ("PUT", DavMethod::PUT),
    ("DELETE", DavMethod::DELETE),
    ("COPY", DavMethod::COPY),
    ("MOVE", DavMethod::MOVE),
    ("MKCOL", DavMethod::MKCOL),
    ("PROPFIND", DavMethod::PROPFIND),
    ("PROPPATCH", DavMethod::PROPPATCH),
    ("LOCK", DavMethod::LOCK),
    ("UNLOCK", DavMethod::UNLOCK),
    ("OPTIONS", DavMethod::OPTIONS),
];

// translate method into our own enum that has webdav methods as well.
pub fn dav_method(m: &http::Method) -> DavResult<DavMethod> {
    let m = match *m {
        http::Method::HEAD => DavMethod::HEAD,
        http::Method::GET => DavMethod::GET,
        http::Method::PUT => DavMethod::PUT,
        http::Method::DELETE => DavMethod::DELETE,
        http::Method::OPTIONS => DavMethod::OPTIONS,
        _ => match m.as_str() {
            "PROPFIND" => DavMethod::PROPFIND,
            "PROPPATCH" => DavMethod::PROPPATCH,
            "MKCOL" => DavMethod::MKCOL,
            "COPY" => DavMethod::COPY,
            "MOVE" => DavMethod::MOVE,
            "LOCK" => DavMethod::LOCK,
            "UNLOCK" => DavMethod::UNLOCK,
            _ => {
                return Err(DavError::MethodNotAllowed(format!(
                    "Method {} is not supported",
                    m
                )));
            }
        },
    };
    Ok(m)
}

/// Comma separated list of the methods in `set`, for the `Allow` header.
pub(crate) fn allow_header(set: DavMethodSet) -> String {
    METHOD_NAMES
        .iter()
        .filter(|(_, m)| set.contains(*m))
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn systemtime_to_httpdate(t: SystemTime) -> String {
    let d = headers::Date::from(t);
    let mut v = Vec::new();
    d.encode(&mut v);
    v[0].to_str().unwrap_or_default().to_owned()
}

/// Render a timestamp the way HTTP dates are written, converted to GMT.
pub fn datetime_to_httpdate(t: OffsetDateTime) -> String {
    systemtime_to_httpdate(SystemTime::from(t))
}

pub fn unix_to_systemtime(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH
    }
}

/// Wrap an etag in double quotes, unless it already is.
pub fn quote_etag(etag: &str) -> String {
    let etag = etag.trim();
    if etag.len() >= 2 && etag.starts_with('"') && etag.ends_with('"') {
        etag.to_string()
    } else if etag.starts_with("W/\"") {
        etag.to_string()
    } else {
        format!("\"{}\"", etag)
    }
}

/// Strip quotes, whitespace and the weak marker from an etag for comparison.
pub fn bare_etag(etag: &str) -> &str {
    let etag = etag.trim();
    let etag = etag.strip_prefix("W/").unwrap_or(etag);
    etag.trim_matches(|c| c == '"' || c == ' ')
}
