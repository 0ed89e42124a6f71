use std::time::SystemTime;

use base64::Engine;
use headers::HeaderMapExt;
use http::header::{self, HeaderValue};
use http::{Response, StatusCode};

use crate::body::Body;
use crate::davhandler::RequestContext;
use crate::davheaders;
use crate::errors::DavError;
use crate::fs::{Checksum, HashAlgorithm, PutStream};
use crate::props::PropName;
use crate::util::{quote_etag, unix_to_systemtime};
use crate::DavResult;

// The checksum a client sent along with the body, if any.
fn request_checksum(ctx: &RequestContext) -> DavResult<Option<Checksum>> {
    if let Some(md5) = ctx.headers.typed_get::<davheaders::ContentMd5>() {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(md5.0.as_bytes())
            .map_err(|_| DavError::InvalidRequest("Malformed Content-MD5 header".into()))?;
        if raw.len() != 16 {
            return Err(DavError::InvalidRequest("Malformed Content-MD5 header".into()));
        }
        let hex = raw.iter().map(|b| format!("{:02x}", b)).collect();
        return Ok(Some(Checksum {
            algorithm: HashAlgorithm::Md5,
            hex,
        }));
    }
    // unknown algorithms are not an error, they are just not checked.
    Ok(ctx
        .headers
        .typed_get::<davheaders::OcChecksum>()
        .and_then(|c| Checksum::from_vendor_header(&c.0)))
}

// The modification time an ownCloud client asks us to set.
fn request_mtime(ctx: &RequestContext) -> DavResult<Option<SystemTime>> {
    match ctx.headers.typed_get::<davheaders::OcMtime>() {
        Some(mtime) => {
            let secs = mtime
                .0
                .trim()
                .parse::<i64>()
                .map_err(|_| DavError::InvalidRequest("Malformed X-OC-MTime header".into()))?;
            Ok(Some(unix_to_systemtime(secs)))
        }
        None => Ok(None),
    }
}

impl crate::DavHandler {
    pub(crate) async fn handle_put(
        &self,
        ctx: RequestContext,
        body: PutStream<'_>,
    ) -> DavResult<Response<Body>> {
        if ctx.headers.contains_key(header::CONTENT_RANGE) {
            return Err(DavError::NotImplemented(
                "Content-Range on PUT is not supported".into(),
            ));
        }
        let chunked = ctx
            .headers
            .get(header::TRANSFER_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false);
        if chunked && self.reject_chunked_put {
            return Err(DavError::Internal(
                "chunked PUT bodies are rejected by configuration".into(),
            ));
        }
        if ctx.path.is_collection() {
            return Err(DavError::MethodNotAllowed(
                "Cannot PUT to a collection".into(),
            ));
        }
        let checksum = request_checksum(&ctx)?;
        let mtime = request_mtime(&ctx)?;

        let path = &ctx.path;
        let _guard = self.uri_locks.lock(&[path]).await;

        ctx.cond.check_lock(self.storage(), path, path).await?;

        let want = [
            PropName::dav("resourcetype"),
            PropName::dav("getetag"),
            PropName::dav("getlastmodified"),
        ];
        let current = self.props(path, &want).await?;
        if let Some(props) = &current {
            if props.is_collection() {
                return Err(DavError::MethodNotAllowed(
                    "Cannot PUT to a collection".into(),
                ));
            }
        }
        ctx.cond.check_if_match(
            current.as_ref().and_then(|p| p.etag()),
            current.is_some(),
        )?;
        ctx.cond.check_if_unmodified_since(
            current
                .as_ref()
                .and_then(|p| p.last_modified())
                .map(Into::into),
        )?;

        if !self.has_parent(path).await? {
            return Err(DavError::Conflict("Parent collection does not exist".into()));
        }

        let created = self.storage.put(path, body, checksum).await?;
        trace!("put {:?} created {}", path, created);

        let mut res = Response::new(Body::empty());
        *res.status_mut() = if created {
            StatusCode::CREATED
        } else {
            StatusCode::NO_CONTENT
        };

        if let Some(mtime) = mtime {
            if self.storage.touch(path, mtime).await? {
                res.headers_mut()
                    .insert("x-oc-mtime", HeaderValue::from_static("accepted"));
            }
        }

        if let Some(props) = self.props(path, &want[1..2]).await? {
            if let Some(etag) = props.etag() {
                let etag = quote_etag(etag);
                if let Ok(v) = HeaderValue::from_str(&etag) {
                    res.headers_mut().insert(header::ETAG, v.clone());
                    res.headers_mut().typed_insert(davheaders::OcEtag(etag));
                }
            }
        }
        Ok(res)
    }
}
