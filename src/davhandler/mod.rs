//
// This module contains the main entry point of the library,
// DavHandler.
//
use std::collections::HashMap;
use std::error::Error as StdError;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Buf;
use futures_util::stream::Stream;
use headers::HeaderMapExt;
use http::{HeaderMap, Request, Response, StatusCode};
use http_body::Body as HttpBody;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::body::{Body, StreamBody};
use crate::conditional::ConditionalContext;
use crate::davheaders;
use crate::davpath::DavPath;
use crate::davxml;
use crate::errors::DavError;
use crate::fs::*;
use crate::ls::LockSystem;
use crate::props::{PropMap, PropName};
use crate::util::{allow_header, dav_method, DavMethod, DavMethodSet};
use crate::DavResult;

pub(crate) mod handle_copymove;
pub(crate) mod handle_delete;
pub(crate) mod handle_gethead;
use handle_gethead::READ_BUF_SIZE;
pub(crate) mod handle_lock;
pub(crate) mod handle_mkcol;
pub(crate) mod handle_options;
pub(crate) mod handle_props;
pub(crate) mod handle_put;

// Bodies of requests other than PUT are read into memory, up to this size.
const MAX_BODY_SIZE: usize = 65536;

/// Default, and maximum, lock timeout.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(3600);

/// Configuration of the handler.
#[derive(Clone)]
pub struct DavBuilder {
    /// Prefix to be stripped off when handling request.
    prefix: String,
    /// Storage backend.
    storage: Arc<dyn DavStorage>,
    /// Lock table.
    ls: LockSystem,
    /// Set of allowed methods (Defaults to "all methods")
    allow: DavMethodSet,
    /// Compress GET responses on the fly.
    gzip: bool,
    /// Hand path-backed content to the front-end with X-Sendfile.
    sendfile: bool,
    /// Refuse chunked PUT bodies.
    reject_chunked_put: bool,
    /// Does GET on a collection return an index.
    autoindex: bool,
    /// read buffer size in bytes
    read_buf_size: usize,
    /// Default and maximum lock timeout.
    lock_timeout: Duration,
}

impl DavBuilder {
    /// Create a new configuration builder.
    pub fn new(storage: Arc<dyn DavStorage>) -> DavBuilder {
        Self {
            prefix: String::new(),
            storage,
            ls: LockSystem::default(),
            allow: DavMethodSet::WEBDAV_RW,
            gzip: true,
            sendfile: false,
            reject_chunked_put: false,
            autoindex: true,
            read_buf_size: READ_BUF_SIZE,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Use the configuration that was built to generate a DavHandler.
    pub fn build(self) -> DavHandler {
        self.into()
    }

    /// The base URI. Requests outside of it are not handled.
    pub fn strip_prefix(self, prefix: impl Into<String>) -> Self {
        let mut this = self;
        this.prefix = prefix.into();
        this
    }

    /// Set the locksystem to use.
    pub fn locksystem(self, ls: LockSystem) -> Self {
        let mut this = self;
        this.ls = ls;
        this
    }

    /// Which methods to allow (default is all methods).
    pub fn methods(self, allow: DavMethodSet) -> Self {
        let mut this = self;
        this.allow = allow;
        this
    }

    /// Compress responses on the fly (default true).
    pub fn gzip(self, gzip: bool) -> Self {
        let mut this = self;
        this.gzip = gzip;
        this
    }

    /// Let the front-end send files that live on the local filesystem
    /// (default false).
    pub fn sendfile(self, sendfile: bool) -> Self {
        let mut this = self;
        this.sendfile = sendfile;
        this
    }

    /// Answer PUTs with a chunked body with 500, for front-ends that
    /// do not pass them on correctly (default false).
    pub fn reject_chunked_put(self, reject: bool) -> Self {
        let mut this = self;
        this.reject_chunked_put = reject;
        this
    }

    /// Does a GET on a collection produce an index (default true).
    pub fn autoindex(self, autoindex: bool) -> Self {
        let mut this = self;
        this.autoindex = autoindex;
        this
    }

    /// Read buffer size in bytes
    pub fn read_buf_size(self, size: usize) -> Self {
        let mut this = self;
        this.read_buf_size = size.max(512);
        this
    }

    /// Default and maximum lock timeout.
    pub fn lock_timeout(self, timeout: Duration) -> Self {
        let mut this = self;
        this.lock_timeout = timeout;
        this
    }
}

/// The webdav handler struct.
///
/// The `builder` and `build` methods are used to instantiate a handler.
///
/// The `handle` and `handle_route` methods are the methods that do the actual work.
#[derive(Clone)]
pub struct DavHandler {
    pub(crate) prefix: Arc<String>,
    pub(crate) storage: Arc<dyn DavStorage>,
    pub(crate) allow: DavMethodSet,
    pub(crate) gzip: bool,
    pub(crate) sendfile: bool,
    pub(crate) reject_chunked_put: bool,
    pub(crate) autoindex: bool,
    pub(crate) read_buf_size: usize,
    pub(crate) lock_timeout: Duration,
    pub(crate) uri_locks: Arc<UriLocks>,
}

impl From<DavBuilder> for DavHandler {
    fn from(cfg: DavBuilder) -> Self {
        Self {
            prefix: Arc::new(cfg.prefix),
            storage: cfg.ls.build(cfg.storage),
            allow: cfg.allow,
            gzip: cfg.gzip,
            sendfile: cfg.sendfile,
            reject_chunked_put: cfg.reject_chunked_put,
            autoindex: cfg.autoindex,
            read_buf_size: cfg.read_buf_size,
            lock_timeout: cfg.lock_timeout,
            uri_locks: Arc::new(UriLocks::default()),
        }
    }
}

/// Everything a method handler knows about one request.
pub(crate) struct RequestContext {
    pub method: DavMethod,
    pub path: DavPath,
    pub headers: HeaderMap,
    pub cond: ConditionalContext,
}

impl RequestContext {
    pub fn user_agent(&self) -> &str {
        self.headers
            .get(http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    pub fn is_head(&self) -> bool {
        self.method == DavMethod::HEAD
    }
}

/// Serializes the requests that change a resource.
///
/// Each path gets an async mutex; a slot is dropped again when nobody
/// holds or waits for it.
#[derive(Default)]
pub(crate) struct UriLocks {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

pub(crate) struct UriGuard {
    guards: Vec<OwnedMutexGuard<()>>,
    keys: Vec<String>,
    table: Arc<UriLocks>,
}

impl UriLocks {
    /// Lock a set of paths. Always taken in sorted order, so two requests
    /// that need the same paths cannot deadlock.
    pub async fn lock(self: &Arc<Self>, paths: &[&DavPath]) -> UriGuard {
        let mut keys: Vec<String> = paths.iter().map(|p| p.as_rel_str()).collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            let slot = self.slots.lock().entry(key.clone()).or_default().clone();
            guards.push(slot.lock_owned().await);
        }
        UriGuard {
            guards,
            keys,
            table: self.clone(),
        }
    }
}

impl Drop for UriGuard {
    fn drop(&mut self) {
        self.guards.clear();
        let mut slots = self.table.slots.lock();
        for key in &self.keys {
            if slots.get(key).map(|s| Arc::strong_count(s) == 1).unwrap_or(false) {
                slots.remove(key);
            }
        }
    }
}

impl DavHandler {
    /// Return a configuration builder.
    pub fn builder(storage: Arc<dyn DavStorage>) -> DavBuilder {
        DavBuilder::new(storage)
    }

    /// Handle a webdav request.
    ///
    /// Requests outside of the base URI get a 404.
    pub async fn handle<ReqBody, ReqData, ReqError>(&self, req: Request<ReqBody>) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: HttpBody<Data = ReqData, Error = ReqError> + Send + 'static,
    {
        self.handle_inner(req).await
    }

    /// Handle a webdav request, if it is below the base URI.
    ///
    /// Otherwise the request is handed back, so that the caller can
    /// try the next route.
    pub async fn handle_route<ReqBody, ReqData, ReqError>(
        &self,
        req: Request<ReqBody>,
    ) -> Result<Response<Body>, Request<ReqBody>>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: HttpBody<Data = ReqData, Error = ReqError> + Send + 'static,
    {
        if let Ok(None) = DavPath::from_uri_and_prefix(req.uri(), &self.prefix) {
            debug!("{} is not below {}", req.uri(), self.prefix);
            return Err(req);
        }
        Ok(self.handle_inner(req).await)
    }

    /// Handles a request with a `Stream` body instead of a `HttpBody`.
    /// Used with webserver frameworks that have not
    /// opted to use the `http_body` crate just yet.
    pub async fn handle_stream<ReqBody, ReqData, ReqError>(
        &self,
        req: Request<ReqBody>,
    ) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: Stream<Item = Result<ReqData, ReqError>> + Send + 'static,
    {
        let req = {
            let (parts, body) = req.into_parts();
            Request::from_parts(parts, StreamBody::new(body))
        };
        self.handle_inner(req).await
    }
}

// Hand the request body to the storage as a stream of chunks.
fn put_stream<'a, ReqBody, ReqData, ReqError>(body: ReqBody) -> PutStream<'a>
where
    ReqData: Buf + Send + 'static,
    ReqError: StdError + Send + Sync + 'static,
    ReqBody: HttpBody<Data = ReqData, Error = ReqError> + Send + 'a,
{
    Box::pin(async_stream::stream! {
        pin_utils::pin_mut!(body);
        while let Some(res) = body.data().await {
            match res {
                Ok(mut buf) => {
                    let len = buf.remaining();
                    yield Ok(buf.copy_to_bytes(len));
                }
                Err(e) => {
                    yield Err(io::Error::new(io::ErrorKind::UnexpectedEof, e));
                    break;
                }
            }
        }
    })
}

impl DavHandler {
    pub(crate) fn storage(&self) -> &dyn DavStorage {
        &*self.storage
    }

    // helper.
    pub(crate) async fn props<'a>(
        &'a self,
        path: &'a DavPath,
        names: &'a [PropName],
    ) -> DavResult<Option<PropMap>> {
        trace!("propfind {:?} {:?}", path, names);
        Ok(self.storage.propfind(path, Some(names), Depth::Zero).await?)
    }

    // helper.
    pub(crate) async fn has_parent<'a>(&'a self, path: &'a DavPath) -> DavResult<bool> {
        let parent = path.parent();
        let names = [PropName::dav("resourcetype")];
        Ok(self
            .props(&parent, &names)
            .await?
            .map(|p| p.is_collection())
            .unwrap_or(false))
    }

    // See if this is a collection and if so, if we have
    // to fixup the path by adding a slash at the end.
    pub(crate) fn fixpath(&self, res: &mut Response<Body>, path: &mut DavPath, is_collection: bool) {
        if is_collection && !path.is_collection() {
            path.add_slash();
            res.headers_mut()
                .typed_insert(davheaders::ContentLocation(path.as_url_string()));
        }
    }

    // drain request body and return it.
    pub(crate) async fn read_request<ReqBody, ReqData, ReqError>(
        &self,
        body: ReqBody,
        max_size: usize,
    ) -> DavResult<Vec<u8>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let mut data = Vec::new();
        pin_utils::pin_mut!(body);
        while let Some(res) = body.data().await {
            let mut buf = res.map_err(|_| {
                DavError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "UnexpectedEof"))
            })?;
            while buf.has_remaining() {
                if data.len() + buf.remaining() > max_size {
                    return Err(DavError::PayloadTooLarge("Request body too large".into()));
                }
                let b = buf.chunk();
                let l = b.len();
                data.extend_from_slice(b);
                buf.advance(l);
            }
        }
        Ok(data)
    }

    // Turn an error into a response. This is the only place that happens.
    fn error_response(&self, err: &DavError, is_ms: bool, is_head: bool) -> Response<Body> {
        let status = err.statuscode();
        if status.is_server_error() {
            error!("request failed: {}", err);
        }

        let mut resp = Response::builder().status(status);
        if is_ms && status == StatusCode::NOT_FOUND {
            // This is an attempt to convince Windows to not
            // cache a 404 NOT_FOUND for 30-60 seconds.
            //
            // That is a problem since windows caches the NOT_FOUND in a
            // case-insensitive way. So if "www" does not exist, but "WWW" does,
            // and you do a "dir www" and then a "dir WWW" the second one
            // will fail.
            resp = resp
                .header("Cache-Control", "no-store, no-cache, must-revalidate")
                .header("Pragma", "no-cache")
                .header("Expires", "0")
                .header("Vary", "*");
        }
        match err {
            DavError::RangeNotSatisfiable { size } => {
                resp = resp.header("Content-Range", format!("bytes */{}", size));
            }
            DavError::MethodNotAllowed(_) => {
                resp = resp.header("Allow", allow_header(self.allow));
            }
            _ => {}
        }
        if err.must_close() {
            resp = resp.header("connection", "close");
        }

        let body = if is_head {
            Body::empty()
        } else {
            resp = resp.header("Content-Type", "application/xml; charset=utf-8");
            Body::from(davxml::error_body(&err.message()))
        };
        resp.body(body).unwrap_or_else(|_| {
            let mut r = Response::new(Body::empty());
            *r.status_mut() = status;
            r
        })
    }

    // internal dispatcher.
    async fn handle_inner<ReqBody, ReqData, ReqError>(
        &self,
        req: Request<ReqBody>,
    ) -> Response<Body>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError> + Send + 'static,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let is_ms = req
            .headers()
            .get("user-agent")
            .and_then(|s| s.to_str().ok())
            .map(|s| s.contains("Microsoft"))
            .unwrap_or(false);
        let is_head = req.method() == http::Method::HEAD;

        // Turn any DavError results into a HTTP error response.
        match self.handle2(req).await {
            Ok(resp) => {
                debug!("== END REQUEST result {}", resp.status());
                resp
            }
            Err(err) => {
                debug!("== END REQUEST result {:?}", err);
                self.error_response(&err, is_ms, is_head)
            }
        }
    }

    // internal dispatcher part 2.
    async fn handle2<ReqBody, ReqData, ReqError>(
        &self,
        req: Request<ReqBody>,
    ) -> DavResult<Response<Body>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError> + Send + 'static,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let (parts, body) = req.into_parts();

        // debug when running the webdav litmus tests.
        if log_enabled!(log::Level::Debug) {
            if let Some(t) = parts.headers.typed_get::<davheaders::XLitmus>() {
                debug!("X-Litmus: {:?}", t);
            }
        }

        // translate HTTP method to Webdav method.
        let method = match dav_method(&parts.method) {
            Ok(m) => m,
            Err(e) => {
                debug!("refusing method {} request {}", parts.method, parts.uri);
                return Err(e);
            }
        };

        // see if method is allowed.
        if !self.allow.contains(method) {
            debug!("method {} not allowed on request {}", parts.method, parts.uri);
            return Err(DavError::MethodNotAllowed(format!(
                "Method {} is not allowed",
                parts.method
            )));
        }

        // make sure the request path is valid.
        let path = DavPath::from_uri_and_prefix(&parts.uri, &self.prefix)?
            .ok_or_else(|| DavError::NotFound("Not below the base URI".into()))?;

        // PUT is the only handler that reads the body itself. All the
        // other handlers either expected no body, or a pre-read Vec<u8>.
        let (body_strm, body_data) = if method == DavMethod::PUT {
            (Some(body), Vec::new())
        } else {
            (None, self.read_request(body, MAX_BODY_SIZE).await?)
        };

        // Not all methods accept a body.
        if !DavMethod::WEBDAV_BODY.contains(method) && !body_data.is_empty() {
            return Err(DavError::UnsupportedMediaType(
                "This method does not take a request body".into(),
            ));
        }

        debug!("== START REQUEST {:?} {}", method, path);

        // no storage access, and no preconditions, for OPTIONS.
        if method == DavMethod::OPTIONS {
            return self.handle_options();
        }

        let ctx = RequestContext {
            method,
            cond: ConditionalContext::from_headers(&parts.headers)?,
            path,
            headers: parts.headers,
        };

        if method == DavMethod::PUT {
            return match body_strm {
                Some(body) => self.handle_put(ctx, put_stream(body)).await,
                None => Err(DavError::Internal("PUT without body stream".into())),
            };
        }
        if method == DavMethod::HEAD || method == DavMethod::GET {
            self.handle_get(ctx).await
        } else if method == DavMethod::PROPFIND {
            self.handle_propfind(ctx, &body_data).await
        } else if method == DavMethod::PROPPATCH {
            self.handle_proppatch(ctx, &body_data).await
        } else if method == DavMethod::MKCOL {
            self.handle_mkcol(ctx).await
        } else if method == DavMethod::DELETE {
            self.handle_delete(ctx).await
        } else if method == DavMethod::COPY || method == DavMethod::MOVE {
            self.handle_copymove(ctx).await
        } else if method == DavMethod::LOCK {
            self.handle_lock(ctx, &body_data).await
        } else if method == DavMethod::UNLOCK {
            self.handle_unlock(ctx).await
        } else {
            Err(DavError::MethodNotAllowed(format!(
                "Method {:?} is not supported",
                method
            )))
        }
    }
}
