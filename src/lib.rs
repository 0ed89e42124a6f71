//! ## Generic async Webdav protocol engine
//!
//! [`Webdav`] (RFC4918) is defined as
//! HTTP (GET/HEAD/PUT/DELETE) plus a bunch of extension methods (PROPFIND, etc).
//! These extension methods are used to manage collections (like unix directories),
//! get information on collections (like unix `ls` or `readdir`), rename and
//! copy items, lock/unlock items, etc.
//!
//! A `handler` is a piece of code that takes a `http::Request`, processes it in some
//! way, and then generates a `http::Response`. This library is a `handler` that maps
//! the HTTP/Webdav protocol onto a storage backend. The backend is anything that
//! implements [`DavStorage`](fs::DavStorage); the engine itself keeps no resource
//! state and asks the backend for existence, content and properties on every request.
//!
//! ## What the engine does.
//!
//! - request dispatch, with the base URI stripped and the path normalized.
//! - PROPFIND / PROPPATCH, including dead properties in any namespace.
//! - locking: shared and exclusive write locks, the `If` header, lock refresh.
//! - preconditions: `If-Match`, `If-None-Match`, `If-Unmodified-Since`, `Overwrite`.
//! - GET with single byte ranges, on-the-fly gzip compression, and `X-Sendfile`
//!   delegation to a front-end server.
//! - ownCloud / Nextcloud client quirks: the `OC-Checksum` and `X-OC-MTime`
//!   headers, `OC-ETag`, and their property namespaces.
//!
//! ## Backends.
//!
//! - [`MemStorage`]: ephemeral in-memory storage. supports DAV properties.
//!
//! Locking is either left to the storage ([`LockSystem::Storage`], whose
//! default is "never locked"), or done by the engine in memory
//! ([`LockSystem::Mem`]).
//!
//! ## Example.
//!
//! Example server using [hyper] that serves an in-memory storage.
//!
//! ```no_run
//! use std::convert::Infallible;
//! use dav_engine::{DavHandler, LockSystem, MemStorage};
//!
//! #[tokio::main]
//! async fn main() {
//!     let addr = ([127, 0, 0, 1], 4918).into();
//!
//!     let dav_server = DavHandler::builder(MemStorage::new())
//!         .locksystem(LockSystem::Mem)
//!         .build();
//!
//!     let make_service = hyper::service::make_service_fn(move |_| {
//!         let dav_server = dav_server.clone();
//!         async move {
//!             let func = move |req| {
//!                 let dav_server = dav_server.clone();
//!                 async move {
//!                     Ok::<_, Infallible>(dav_server.handle(req).await)
//!                 }
//!             };
//!             Ok::<_, Infallible>(hyper::service::service_fn(func))
//!         }
//!     });
//!
//!     println!("Serving on {}", addr);
//!     let _ = hyper::Server::bind(&addr)
//!         .serve(make_service)
//!         .await
//!         .map_err(|e| eprintln!("server error: {}", e));
//! }
//! ```
//!
//! [`Webdav`]: https://tools.ietf.org/html/rfc4918
//! [hyper]: https://hyper.rs/

#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

mod conditional;
mod davhandler;
mod davxml;
mod errors;
mod util;

pub mod body;
pub mod davheaders;
pub mod davpath;
pub mod fs;
pub mod ls;
pub mod props;

#[cfg(all(test, feature = "memfs"))]
mod tests;

/// Result type of the engine.
pub type DavResult<T> = Result<T, DavError>;

pub use crate::davhandler::{DavBuilder, DavHandler, DEFAULT_LOCK_TIMEOUT};
pub use crate::errors::{DavError, FsError, FsResult};
#[cfg(any(docsrs, feature = "memfs"))]
#[cfg_attr(docsrs, doc(cfg(feature = "memfs")))]
pub use crate::fs::memfs::MemStorage;
pub use crate::ls::{LockSystem, Locking, MemLs};
pub use crate::util::{DavMethod, DavMethodSet};
