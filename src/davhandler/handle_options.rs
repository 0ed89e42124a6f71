use headers::HeaderMapExt;
use http::header::HeaderValue;
use http::Response;

use crate::body::Body;
use crate::errors::DavError;
use crate::util::allow_header;
use crate::DavResult;

impl crate::DavHandler {
    // OPTIONS never looks at the storage, so it also works for paths
    // that do not exist (yet).
    pub(crate) fn handle_options(&self) -> DavResult<Response<Body>> {
        let mut res = Response::new(Body::empty());

        let allow = HeaderValue::from_str(&allow_header(self.allow))
            .map_err(|e| DavError::Internal(e.to_string()))?;

        let h = res.headers_mut();
        // We advertise level 2 even if LOCK is not allowed here, since
        // there might be LOCK/UNLOCK support in another part of the URL space.
        h.insert("DAV", HeaderValue::from_static("1, 2, 3"));
        h.insert("MS-Author-Via", HeaderValue::from_static("DAV"));
        h.insert("Accept-Ranges", HeaderValue::from_static("bytes"));
        h.insert("Allow", allow);
        h.typed_insert(headers::ContentLength(0));

        Ok(res)
    }
}
