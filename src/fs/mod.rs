//! Contains the structs and traits that define a storage backend.
//!
//! You only need this if you are going to implement your own backend.
//! The engine never keeps resource state itself: existence, content and
//! properties are asked from the [`DavStorage`] on every request.
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use futures_util::future::{self, BoxFuture};
use futures_util::stream::BoxStream;
use http::StatusCode;

use crate::davpath::DavPath;
pub use crate::errors::{FsError, FsResult};
use crate::props::{PropMap, PropName, PropValue};

#[cfg(any(docsrs, feature = "memfs"))]
pub(crate) mod memfs;

/// Future returned by almost all of the DavStorage methods.
pub type FsFuture<'a, T> = BoxFuture<'a, FsResult<T>>;

/// Convenience alias for a boxed Stream.
pub type FsStream<T> = BoxStream<'static, io::Result<T>>;

/// Request body of a PUT, as handed to the storage.
pub type PutStream<'a> = BoxStream<'a, io::Result<Bytes>>;

/// How deep an operation reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
}

/// Content of a resource, as returned by [`DavStorage::get`].
///
/// Exactly one source: an in-memory buffer, a file on the local
/// filesystem, or a generic stream.
pub enum Content {
    Bytes(Bytes),
    Path(PathBuf),
    Stream {
        stream: FsStream<Bytes>,
        size: Option<u64>,
    },
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Content::Bytes(b) => write!(f, "Content::Bytes({} bytes)", b.len()),
            Content::Path(p) => write!(f, "Content::Path({:?})", p),
            Content::Stream { size, .. } => write!(f, "Content::Stream(size {:?})", size),
        }
    }
}

/// One change requested by PROPPATCH. `value` is `None` for a removal.
#[derive(Debug, Clone, PartialEq)]
pub struct PropPatchAction {
    pub name: PropName,
    pub value: Option<PropValue>,
}

/// Hash algorithms a client can send a content checksum in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
}

/// Checksum of a PUT body, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub algorithm: HashAlgorithm,
    pub hex: String,
}

impl Checksum {
    /// Parse the vendor checksum header value, `alg:hex`.
    /// Unknown algorithms yield `None`.
    pub fn from_vendor_header(value: &str) -> Option<Checksum> {
        let (alg, hex) = value.trim().split_once(':')?;
        let algorithm = match alg.to_ascii_uppercase().as_str() {
            "MD5" => HashAlgorithm::Md5,
            "SHA1" | "SHA-1" => HashAlgorithm::Sha1,
            _ => return None,
        };
        let hex = hex.trim().to_ascii_lowercase();
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(Checksum { algorithm, hex })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScope {
    Exclusive,
    Shared,
}

/// A webdav lock.
#[derive(Debug, Clone, PartialEq)]
pub struct DavLock {
    /// Opaque; never parsed.
    pub token: String,
    pub scope: LockScope,
    /// Raw XML of the `<owner>` element content, if the client sent one.
    pub owner: Option<String>,
    pub timeout: Duration,
    pub expires_at: SystemTime,
}

impl DavLock {
    pub fn new(
        token: impl Into<String>,
        scope: LockScope,
        owner: Option<String>,
        timeout: Duration,
    ) -> DavLock {
        DavLock {
            token: token.into(),
            scope,
            owner,
            timeout,
            expires_at: SystemTime::now() + timeout,
        }
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at <= now
    }
}

/// A child of a collection, as returned by [`DavStorage::list`].
///
/// `props` may be `None` when the backend cannot cheaply provide them;
/// the engine then asks `propfind` for that entry.
#[derive(Debug, Clone)]
pub struct ListEntry {
    pub name: String,
    pub props: Option<PropMap>,
}

/// The storage trait.
///
/// All paths are normalized [`DavPath`]s relative to the base URI.
///
/// The locking methods have "always unlocked" defaults, so a backend
/// that does not need locking only implements the data operations; wrap
/// it in [`Locking`](crate::Locking) to get a real lock table.
pub trait DavStorage: Send + Sync {
    /// Does a resource exist at `path`.
    fn exists<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, bool>;

    /// Content of a (non-collection) resource. `None` if there is none.
    fn get<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Option<Content>>;

    /// Properties of a resource.
    ///
    /// `props` is the list of requested properties, `None` for "all".
    /// Returns `None` if and only if the resource does not exist.
    /// Requested properties the backend does not know are left out.
    fn propfind<'a>(
        &'a self,
        path: &'a DavPath,
        props: Option<&'a [PropName]>,
        depth: Depth,
    ) -> FsFuture<'a, Option<PropMap>>;

    /// Apply property changes, returning the status per property.
    fn proppatch<'a>(
        &'a self,
        _path: &'a DavPath,
        changes: Vec<PropPatchAction>,
    ) -> FsFuture<'a, Vec<(PropName, StatusCode)>> {
        let res = changes
            .into_iter()
            .map(|c| (c.name, StatusCode::FORBIDDEN))
            .collect();
        Box::pin(future::ready(Ok(res)))
    }

    /// Store the body at `path`. Returns `true` if the resource was created,
    /// `false` if it was updated.
    ///
    /// Names matching [`is_noise_file`] must be answered with `Ok(false)`
    /// and not be stored.
    fn put<'a>(
        &'a self,
        path: &'a DavPath,
        body: PutStream<'a>,
        checksum: Option<Checksum>,
    ) -> FsFuture<'a, bool>;

    /// Delete a resource, recursively.
    fn delete<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()>;

    /// Copy a resource, recursively. Returns `true` if the destination
    /// existed and was overwritten.
    fn copy<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, bool>;

    /// Move a resource. Returns `true` if the destination was overwritten.
    fn move_<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, bool>;

    /// Create a collection.
    fn mkcol<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()>;

    /// Children of a collection, in order, without `.` and `..`.
    fn list<'a>(
        &'a self,
        path: &'a DavPath,
        props: Option<&'a [PropName]>,
    ) -> FsFuture<'a, Vec<ListEntry>>;

    /// Set the modification time. Returns `false` if not supported.
    fn touch<'a>(&'a self, _path: &'a DavPath, _mtime: SystemTime) -> FsFuture<'a, bool> {
        Box::pin(future::ready(Ok(false)))
    }

    /// Acquire or refresh a lock.
    ///
    /// Must be atomic: if a conflicting lock exists the call returns
    /// `Ok(false)` and nothing changes. A lock with the token of an
    /// existing lock on `path` refreshes it.
    fn lock<'a>(&'a self, _path: &'a DavPath, _lock: &'a DavLock) -> FsFuture<'a, bool> {
        Box::pin(future::ready(Ok(true)))
    }

    /// Release a lock.
    fn unlock<'a>(&'a self, _path: &'a DavPath, _token: &'a str) -> FsFuture<'a, ()> {
        Box::pin(future::ready(Ok(())))
    }

    /// The lock on `path`. With a token, only the lock holding that token.
    /// Without, the strongest lock (exclusive before shared).
    fn get_lock<'a>(
        &'a self,
        _path: &'a DavPath,
        _token: Option<&'a str>,
    ) -> FsFuture<'a, Option<DavLock>> {
        Box::pin(future::ready(Ok(None)))
    }
}

lazy_static! {
    static ref NOISE_FILE: regex::Regex = regex::Regex::new(
        r"^(?:\.DS_Store|\._.*|Thumbs\.db|desktop\.ini|~\$.*|\.~lock\..*#|\..*\.sw[a-p])$"
    )
    .unwrap();
}

/// Editor lock files and OS metadata that should never be stored.
pub fn is_noise_file(name: &str) -> bool {
    NOISE_FILE.is_match(name)
}
