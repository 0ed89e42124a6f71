//! The WebDAV XML wire codec.
//!
//! Request bodies of PROPFIND and LOCK are only scanned for the few tags
//! that matter, with regular expressions. PROPPATCH bodies carry values
//! with attributes and nested markup that must survive a round trip, so
//! they go through a real parser (`xmltree`). Responses are written out
//! as text.
pub(crate) mod lockinfo;
pub(crate) mod multistatus;
pub(crate) mod propfind;
pub(crate) mod proppatch;

use xml::escape::{escape_str_attribute, escape_str_pcdata};

pub(crate) const XML_DECL: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n";

/// Escape text content.
pub(crate) fn text(s: &str) -> String {
    escape_str_pcdata(s).into_owned()
}

/// Escape an attribute value.
pub(crate) fn attr(s: &str) -> String {
    escape_str_attribute(s).into_owned()
}

/// The body of an error response.
pub(crate) fn error_body(message: &str) -> String {
    format!(
        "{}<d:error xmlns:d=\"DAV:\" xmlns:s=\"http://sabredav.org/ns\">\n<s:message>{}</s:message>\n</d:error>\n",
        XML_DECL,
        text(message)
    )
}

/// Turn a request body into a str. Bodies that are not UTF-8 are malformed.
pub(crate) fn body_str(body: &[u8]) -> crate::DavResult<&str> {
    std::str::from_utf8(body)
        .map_err(|_| crate::errors::DavError::InvalidRequest("Request body is not UTF-8".into()))
}
