//! Conditional requests: the `If` header and lock tokens, `If-Match`,
//! `If-None-Match` and `If-Unmodified-Since`.
use std::time::SystemTime;

use headers::{Header, HeaderMapExt};
use http::HeaderMap;

use crate::davheaders::{self, If, IfItem};
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::fs::{DavStorage, Depth};
use crate::props::PropName;
use crate::util::bare_etag;
use crate::DavResult;

const NO_LOCK: &str = "DAV:no-lock";

// A header that is present must parse.
fn typed<H: Header>(headers: &HeaderMap) -> DavResult<Option<H>> {
    if !headers.contains_key(H::name()) {
        return Ok(None);
    }
    headers
        .typed_get::<H>()
        .map(Some)
        .ok_or_else(|| DavError::InvalidRequest(format!("Malformed {} header", H::name())))
}

fn raw(headers: &HeaderMap, name: http::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
}

/// The conditional headers of one request, parsed once.
#[derive(Debug, Clone)]
pub(crate) struct ConditionalContext {
    pub if_header: Option<If>,
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
    pub if_unmodified_since: Option<headers::IfUnmodifiedSince>,
    pub lock_token: Option<String>,
    pub overwrite: bool,
}

impl ConditionalContext {
    pub fn from_headers(headers: &HeaderMap) -> DavResult<ConditionalContext> {
        Ok(ConditionalContext {
            if_header: typed::<If>(headers)?,
            if_match: raw(headers, http::header::IF_MATCH),
            if_none_match: raw(headers, http::header::IF_NONE_MATCH),
            // an unparseable date is ignored, as HTTP says.
            if_unmodified_since: headers.typed_get::<headers::IfUnmodifiedSince>(),
            lock_token: typed::<davheaders::LockToken>(headers)?.map(|t| t.0),
            overwrite: typed::<davheaders::Overwrite>(headers)?
                .map(|o| o.0)
                .unwrap_or(true),
        })
    }

    // The token the client proves lock ownership with.
    pub fn submitted_token(&self) -> Option<&str> {
        self.if_header
            .as_ref()
            .and_then(|h| h.first_token())
            .or(self.lock_token.as_deref())
    }

    /// Evaluate the `If` header against the request URI: the resource tag
    /// must cover it, an entity tag must match, `DAV:no-lock` always fails.
    pub async fn check_if(&self, storage: &dyn DavStorage, uri: &DavPath) -> DavResult<()> {
        let if_header = match &self.if_header {
            Some(h) => h,
            None => return Ok(()),
        };

        let mut tagged = uri.clone();
        if let Some(tag) = if_header.first_resource_tag() {
            let root = DavPath::from_destination(tag, uri.prefix())?;
            if !uri.is_within(&root) {
                return Err(DavError::InvalidRequest(
                    "If header resource does not cover the request URI".into(),
                ));
            }
            tagged = root;
        }

        if let Some(etag) = if_header.first_etag() {
            let want = [PropName::dav("getetag")];
            let current = storage
                .propfind(&tagged, Some(&want[..]), Depth::Zero)
                .await?
                .and_then(|p| p.etag().map(|e| e.to_string()));
            match current {
                Some(c) if bare_etag(&c) == bare_etag(etag) => {}
                _ => return Err(DavError::PreconditionFailed("ETag does not match".into())),
            }
        }

        let no_lock = if_header.0.iter().flat_map(|l| l.conditions.iter()).any(|c| {
            !c.not && matches!(&c.item, IfItem::StateToken(t) if t == NO_LOCK)
        });
        if no_lock {
            return Err(DavError::PreconditionFailed("Resource must not be locked".into()));
        }
        Ok(())
    }

    /// The lock on `path`, or inherited from its parent, must be matched
    /// by the submitted token.
    pub async fn check_locked(&self, storage: &dyn DavStorage, path: &DavPath) -> DavResult<()> {
        let parent = if path.is_root() {
            None
        } else {
            Some(path.parent())
        };
        let mut lock = storage.get_lock(path, None).await?;
        if lock.is_none() {
            if let Some(parent) = &parent {
                lock = storage.get_lock(parent, None).await?;
            }
        }
        if lock.is_none() {
            return Ok(());
        }

        let token = match self.submitted_token() {
            Some(token) => token,
            None => {
                debug!("{:?} is locked and no token was given", path);
                return Err(DavError::Locked("Resource is locked".into()));
            }
        };
        if storage.get_lock(path, Some(token)).await?.is_some() {
            return Ok(());
        }
        if let Some(parent) = &parent {
            if storage.get_lock(parent, Some(token)).await?.is_some() {
                return Ok(());
            }
        }
        Err(DavError::InvalidRequest("Lock token does not match".into()))
    }

    /// Check the `If` header against the request URI `uri`, then the lock
    /// state of `path`, before `path` is changed.
    pub async fn check_lock(
        &self,
        storage: &dyn DavStorage,
        uri: &DavPath,
        path: &DavPath,
    ) -> DavResult<()> {
        self.check_if(storage, uri).await?;
        self.check_locked(storage, path).await
    }

    /// `If-Match`: the current etag must be one of the listed ones.
    pub fn check_if_match(&self, current_etag: Option<&str>, exists: bool) -> DavResult<()> {
        let if_match = match &self.if_match {
            Some(m) => m,
            None => return Ok(()),
        };
        let ok = if if_match == "*" {
            exists
        } else {
            let current = current_etag.map(bare_etag);
            if_match.split(',').any(|e| Some(bare_etag(e)) == current)
        };
        if ok {
            Ok(())
        } else {
            Err(DavError::PreconditionFailed("If-Match failed".into()))
        }
    }

    /// `If-Unmodified-Since`: the resource must not have changed since.
    pub fn check_if_unmodified_since(&self, modified: Option<SystemTime>) -> DavResult<()> {
        match (&self.if_unmodified_since, modified) {
            (Some(since), Some(modified)) if !since.precondition_passes(modified) => Err(
                DavError::PreconditionFailed("Resource was modified".into()),
            ),
            _ => Ok(()),
        }
    }

    /// `If-None-Match` on GET/HEAD: does the client already have this version.
    pub fn not_modified(&self, current_etag: Option<&str>) -> bool {
        match (&self.if_none_match, current_etag) {
            (Some(inm), Some(current)) => {
                inm == "*" || inm.split(',').any(|e| bare_etag(e) == bare_etag(current))
            }
            _ => false,
        }
    }
}
