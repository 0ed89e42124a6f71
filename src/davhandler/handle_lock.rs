use std::time::{Duration, SystemTime};

use futures_util::stream;
use headers::HeaderMapExt;
use http::header::{self, HeaderValue};
use http::{Response, StatusCode};

use crate::body::Body;
use crate::davhandler::RequestContext;
use crate::davheaders;
use crate::davpath::DavPath;
use crate::davxml::lockinfo;
use crate::davxml::multistatus::lock_response_body;
use crate::errors::DavError;
use crate::fs::{DavLock, PutStream};
use crate::props::PropName;
use crate::DavResult;

fn new_token() -> String {
    format!("opaquelocktoken:{}", uuid::Uuid::new_v4())
}

fn lock_response(lock: &DavLock, root: &DavPath, status: StatusCode) -> Response<Body> {
    let mut res = Response::new(Body::from(lock_response_body(lock, &root.as_url_string())));
    *res.status_mut() = status;
    let h = res.headers_mut();
    h.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/xml; charset=utf-8"),
    );
    h.typed_insert(davheaders::LockToken(lock.token.clone()));
    res
}

impl crate::DavHandler {
    pub(crate) async fn handle_lock(
        &self,
        ctx: RequestContext,
        body: &[u8],
    ) -> DavResult<Response<Body>> {
        let info = lockinfo::decode(body)?;
        let timeout = ctx
            .headers
            .typed_get::<davheaders::Timeout>()
            .map(|t| t.duration(self.lock_timeout))
            .unwrap_or(self.lock_timeout);

        let mut path = ctx.path.clone();
        let _guard = self.uri_locks.lock(&[&path]).await;

        // a token the client holds on this URI turns any LOCK into a refresh.
        let held = match ctx.cond.submitted_token() {
            Some(token) => self.held_lock(&path, token).await?,
            None => None,
        };
        let info = match info {
            Some(info) if held.is_none() => info,
            _ => return self.refresh_lock(&ctx, &path, timeout).await,
        };

        // conflicts with existing locks are decided by the lock table.
        ctx.cond.check_if(self.storage(), &path).await?;

        let props = self.props(&path, &[PropName::dav("resourcetype")]).await?;
        if props.as_ref().map(|p| p.is_collection()).unwrap_or(false) {
            path.add_slash();
        }

        let lock = DavLock::new(new_token(), info.scope, info.owner, timeout);
        if !self.storage.lock(&path, &lock).await? {
            return Err(DavError::Locked("Resource is already locked".into()));
        }
        debug!("locked {:?} {:?} {}", path, lock.scope, lock.token);

        // locking an unmapped URL creates an empty resource.
        let status = if props.is_none() {
            let empty: PutStream = Box::pin(stream::empty());
            if let Err(e) = self.storage.put(&path, empty, None).await {
                let _ = self.storage.unlock(&path, &lock.token).await;
                return Err(e.into());
            }
            StatusCode::CREATED
        } else {
            StatusCode::OK
        };

        Ok(lock_response(&lock, &path, status))
    }

    // LOCK without a body: extend the lock the client holds a token for.
    async fn refresh_lock(
        &self,
        ctx: &RequestContext,
        path: &DavPath,
        timeout: Duration,
    ) -> DavResult<Response<Body>> {
        let token = ctx
            .cond
            .submitted_token()
            .ok_or_else(|| DavError::InvalidRequest("Lock refresh without a lock token".into()))?;

        let (root, mut lock) = self.held_lock(path, token).await?.ok_or_else(|| {
            DavError::PreconditionFailed("No lock with this token".into())
        })?;

        lock.timeout = timeout;
        lock.expires_at = SystemTime::now() + timeout;
        if !self.storage.lock(&root, &lock).await? {
            return Err(DavError::Locked("Lock could not be refreshed".into()));
        }
        debug!("refreshed lock {} on {:?}", lock.token, root);
        Ok(lock_response(&lock, &root, StatusCode::OK))
    }

    // The lock holding `token` on the resource, or on its parent.
    async fn held_lock(
        &self,
        path: &DavPath,
        token: &str,
    ) -> DavResult<Option<(DavPath, DavLock)>> {
        if let Some(lock) = self.storage.get_lock(path, Some(token)).await? {
            return Ok(Some((path.clone(), lock)));
        }
        if path.is_root() {
            return Ok(None);
        }
        let parent = path.parent();
        Ok(self
            .storage
            .get_lock(&parent, Some(token))
            .await?
            .map(|lock| (parent, lock)))
    }

    pub(crate) async fn handle_unlock(&self, ctx: RequestContext) -> DavResult<Response<Body>> {
        let token = ctx
            .cond
            .lock_token
            .as_deref()
            .ok_or_else(|| DavError::InvalidRequest("Missing Lock-Token header".into()))?;

        let path = &ctx.path;
        let _guard = self.uri_locks.lock(&[path]).await;

        if self.storage.get_lock(path, Some(token)).await?.is_none() {
            return Err(DavError::Conflict(
                "Lock token does not match a lock on this resource".into(),
            ));
        }
        self.storage.unlock(path, token).await?;
        debug!("unlocked {:?} {}", path, token);

        let mut res = Response::new(Body::empty());
        *res.status_mut() = StatusCode::NO_CONTENT;
        Ok(res)
    }
}
