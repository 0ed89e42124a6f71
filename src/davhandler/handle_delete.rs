use headers::HeaderMapExt;
use http::{Response, StatusCode};

use crate::body::Body;
use crate::davhandler::RequestContext;
use crate::davheaders::Depth;
use crate::errors::DavError;
use crate::DavResult;

impl crate::DavHandler {
    pub(crate) async fn handle_delete(&self, ctx: RequestContext) -> DavResult<Response<Body>> {
        // only "infinity" delete is allowed: a partial recursive delete
        // has no defined outcome.
        let depth_ok = match ctx.headers.typed_get::<Depth>() {
            Some(depth) => depth == Depth::Infinity,
            None => !ctx.headers.contains_key("depth"),
        };
        if !depth_ok {
            return Err(DavError::InvalidRequest(
                "DELETE only supports Depth: infinity".into(),
            ));
        }

        let path = &ctx.path;
        let _guard = self.uri_locks.lock(&[path]).await;

        ctx.cond.check_lock(self.storage(), path, path).await?;
        if !self.storage.exists(path).await? {
            return Err(DavError::NotFound("Resource not found".into()));
        }
        self.storage.delete(path).await?;

        let mut res = Response::new(Body::empty());
        *res.status_mut() = StatusCode::NO_CONTENT;
        Ok(res)
    }
}
