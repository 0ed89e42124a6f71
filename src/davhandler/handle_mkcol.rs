use headers::HeaderMapExt;
use http::{Response, StatusCode};

use crate::body::Body;
use crate::davhandler::RequestContext;
use crate::davheaders;
use crate::errors::DavError;
use crate::DavResult;

impl crate::DavHandler {
    pub(crate) async fn handle_mkcol(&self, ctx: RequestContext) -> DavResult<Response<Body>> {
        let mut path = ctx.path.clone();
        let _guard = self.uri_locks.lock(&[&path]).await;

        ctx.cond.check_lock(self.storage(), &path, &path).await?;
        if self.storage.exists(&path).await? {
            return Err(DavError::MethodNotAllowed(
                "Resource already exists".into(),
            ));
        }
        if !self.has_parent(&path).await? {
            return Err(DavError::Conflict("Parent collection does not exist".into()));
        }
        self.storage.mkcol(&path).await?;

        let mut res = Response::new(Body::empty());
        if !path.is_collection() {
            path.add_slash();
            res.headers_mut()
                .typed_insert(davheaders::ContentLocation(path.as_url_string()));
        }
        *res.status_mut() = StatusCode::CREATED;
        Ok(res)
    }
}
