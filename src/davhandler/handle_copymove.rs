use headers::HeaderMapExt;
use http::{Response, StatusCode};

use crate::body::Body;
use crate::davhandler::RequestContext;
use crate::davheaders::{self, Depth};
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::props::PropName;
use crate::util::DavMethod;
use crate::DavResult;

impl crate::DavHandler {
    pub(crate) async fn handle_copymove(&self, ctx: RequestContext) -> DavResult<Response<Body>> {
        let is_move = ctx.method == DavMethod::MOVE;

        let dest = match ctx.headers.typed_get::<davheaders::Destination>() {
            Some(dest) => DavPath::from_destination(&dest.0, &self.prefix)?,
            None => return Err(DavError::InvalidRequest("Missing Destination header".into())),
        };
        if ctx.path.same_resource(&dest) {
            return Err(DavError::Forbidden(
                "Source and destination are the same resource".into(),
            ));
        }
        if is_move && ctx.path.is_root() {
            return Err(DavError::Forbidden("Cannot move the root collection".into()));
        }
        if dest.is_within(&ctx.path) {
            return Err(DavError::Forbidden("Cannot copy a collection into itself".into()));
        }

        let depth = match ctx.headers.typed_get::<Depth>() {
            Some(Depth::One) => {
                return Err(DavError::InvalidRequest("Depth: 1 is not allowed here".into()));
            }
            None if ctx.headers.contains_key("depth") => {
                return Err(DavError::InvalidRequest("Malformed Depth header".into()));
            }
            Some(d) => d,
            None => Depth::Infinity,
        };

        let src = &ctx.path;
        let _guard = self.uri_locks.lock(&[src, &dest]).await;

        // the If header speaks about the request URI, the source.
        ctx.cond.check_lock(self.storage(), src, &dest).await?;
        if is_move {
            ctx.cond.check_locked(self.storage(), src).await?;
        }

        let want = [PropName::dav("resourcetype")];
        let src_props = self
            .props(src, &want)
            .await?
            .ok_or_else(|| DavError::NotFound("Source not found".into()))?;
        let dest_props = self.props(&dest, &want).await?;
        let dest_exists = dest_props.is_some();

        if dest_exists && !ctx.cond.overwrite {
            return Err(DavError::PreconditionFailed(
                "Destination exists and Overwrite is F".into(),
            ));
        }
        if !self.has_parent(&dest).await? {
            return Err(DavError::Conflict(
                "Parent of destination does not exist".into(),
            ));
        }

        // depth 0 on a collection only concerns the collection itself,
        // never its members. An existing destination collection is left alone.
        if depth == Depth::Zero && src_props.is_collection() {
            let dest_is_collection = dest_props.map(|p| p.is_collection()).unwrap_or(false);
            let status = if dest_is_collection {
                StatusCode::NO_CONTENT
            } else {
                if is_move {
                    return Err(DavError::InvalidRequest(
                        "MOVE of a collection requires Depth: infinity".into(),
                    ));
                }
                if dest_exists {
                    self.storage.delete(&dest).await?;
                }
                self.storage.mkcol(&dest).await?;
                if dest_exists {
                    StatusCode::NO_CONTENT
                } else {
                    StatusCode::CREATED
                }
            };
            debug!("{:?} depth 0 {:?} -> {:?}: {}", ctx.method, src, dest, status);
            let mut res = Response::new(Body::empty());
            *res.status_mut() = status;
            return Ok(res);
        }

        let overwritten = if is_move {
            self.storage.move_(src, &dest).await?
        } else {
            self.storage.copy(src, &dest).await?
        };
        debug!("{:?} {:?} -> {:?} overwritten {}", ctx.method, src, dest, overwritten);

        let mut res = Response::new(Body::empty());
        *res.status_mut() = if overwritten || dest_exists {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::CREATED
        };
        Ok(res)
    }
}
