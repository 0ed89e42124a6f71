use headers::HeaderMapExt;
use http::header::{self, HeaderValue};
use http::{Response, StatusCode};

use crate::body::Body;
use crate::davhandler::RequestContext;
use crate::davheaders;
use crate::davpath::DavPath;
use crate::davxml::multistatus::{self, MultistatusWriter};
use crate::davxml::propfind::{self, PropfindRequest};
use crate::davxml::proppatch;
use crate::errors::DavError;
use crate::fs::Depth;
use crate::props::{PropMap, PropName, PropValue, EXTENDED_PROPERTIES};
use crate::DavResult;

// The Windows WebDAV redirector only understands unix creation dates.
const MINIREDIR: &str = "Microsoft-WebDAV-MiniRedir";

fn multistatus_response(w: MultistatusWriter) -> Response<Body> {
    let mut res = Response::new(Body::from(w.finish()));
    *res.status_mut() = StatusCode::MULTI_STATUS;
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/xml; charset=utf-8"),
    );
    res
}

// allprop does not include the properties that are expensive to compute.
fn strip_extended(props: PropMap) -> PropMap {
    props
        .into_iter()
        .filter(|(n, _)| !EXTENDED_PROPERTIES.contains(n))
        .collect()
}

impl crate::DavHandler {
    pub(crate) async fn handle_propfind(
        &self,
        ctx: RequestContext,
        body: &[u8],
    ) -> DavResult<Response<Body>> {
        // absent and "infinity" are served as 1.
        let depth = match ctx.headers.typed_get::<davheaders::Depth>() {
            Some(davheaders::Depth::Zero) => Depth::Zero,
            Some(_) => Depth::One,
            None if ctx.headers.contains_key("depth") => {
                return Err(DavError::InvalidRequest("Malformed Depth header".into()));
            }
            None => Depth::One,
        };

        let (requested, names_only) = match propfind::decode(body)? {
            PropfindRequest::AllProp => (None, false),
            PropfindRequest::PropName => (None, true),
            PropfindRequest::Prop(names) => (Some(names), false),
        };
        let requested = requested.as_deref();
        debug!("propfind {:?} depth {:?} props {:?}", ctx.path, depth, requested);

        let mut path = ctx.path.clone();
        let props = self
            .storage
            .propfind(&path, requested, depth)
            .await?
            .ok_or_else(|| DavError::NotFound("Resource not found".into()))?;

        let mut res = Response::new(Body::empty());
        self.fixpath(&mut res, &mut path, props.is_collection());
        let is_collection = props.is_collection();

        let mut w = MultistatusWriter::new().unix_creationdate(ctx.user_agent().contains(MINIREDIR));
        let props = self.complete_props(&path, props, requested).await?;
        w.add_propfind_response(&path.as_url_string(), &props, requested, names_only);

        if depth == Depth::One && is_collection {
            for entry in self.storage.list(&path, requested).await? {
                let mut child = path.clone();
                child.push_segment(&entry.name);
                // some backends only return partial information from list.
                let props = match entry.props {
                    Some(props) => props,
                    None => match self.storage.propfind(&child, requested, Depth::Zero).await? {
                        Some(props) => props,
                        None => continue,
                    },
                };
                if props.is_collection() {
                    child.add_slash();
                }
                let props = self.complete_props(&child, props, requested).await?;
                w.add_propfind_response(&child.as_url_string(), &props, requested, names_only);
            }
        }

        let mut ms = multistatus_response(w);
        if let Some(loc) = res.headers_mut().remove(header::CONTENT_LOCATION) {
            ms.headers_mut().insert(header::CONTENT_LOCATION, loc);
        }
        Ok(ms)
    }

    // Trim allprop results, and answer the lock properties the storage
    // does not know about.
    async fn complete_props(
        &self,
        path: &DavPath,
        props: PropMap,
        requested: Option<&[PropName]>,
    ) -> DavResult<PropMap> {
        let requested = match requested {
            Some(r) => r,
            None => return Ok(strip_extended(props)),
        };
        let mut props = props;

        let supportedlock = PropName::dav("supportedlock");
        if requested.contains(&supportedlock) && !props.contains(&supportedlock) {
            props.insert(
                supportedlock,
                PropValue::Xml {
                    attributes: Vec::new(),
                    content: multistatus::supportedlock_content(),
                },
            );
        }

        let lockdiscovery = PropName::dav("lockdiscovery");
        if requested.contains(&lockdiscovery) && !props.contains(&lockdiscovery) {
            let locks = match self.storage.get_lock(path, None).await? {
                Some(lock) => vec![(lock, path.as_url_string())],
                None => Vec::new(),
            };
            props.insert(
                lockdiscovery,
                PropValue::Xml {
                    attributes: Vec::new(),
                    content: multistatus::lockdiscovery_content(&locks),
                },
            );
        }
        Ok(props)
    }

    pub(crate) async fn handle_proppatch(
        &self,
        ctx: RequestContext,
        body: &[u8],
    ) -> DavResult<Response<Body>> {
        let actions = proppatch::decode(body)?;

        let mut path = ctx.path.clone();
        let _guard = self.uri_locks.lock(&[&path]).await;

        ctx.cond.check_lock(self.storage(), &path, &path).await?;
        let props = self
            .props(&path, &[PropName::dav("resourcetype")])
            .await?
            .ok_or_else(|| DavError::NotFound("Resource not found".into()))?;
        if props.is_collection() {
            path.add_slash();
        }

        let results = self.storage.proppatch(&path, actions).await?;
        debug!("proppatch {:?}: {:?}", path, results);

        let mut w = MultistatusWriter::new();
        w.add_proppatch_response(&path.as_url_string(), &results);
        Ok(multistatus_response(w))
    }
}
