//! Locking.
//!
//! The lock operations are part of [`DavStorage`]. Their default
//! implementations pretend nothing is ever locked; [`Locking`] wraps any
//! storage and answers them from an in-memory lock table instead.
use std::sync::Arc;
use std::time::SystemTime;

use http::StatusCode;

use crate::davpath::DavPath;
use crate::fs::*;
use crate::props::{PropMap, PropName};

pub(crate) mod memls;

pub use memls::MemLs;

/// Which lock table a handler uses.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LockSystem {
    /// Whatever the storage implements (by default: no locking).
    #[default]
    Storage,
    /// An in-memory lock table in front of the storage.
    Mem,
}

impl LockSystem {
    pub(crate) fn build(self, storage: Arc<dyn DavStorage>) -> Arc<dyn DavStorage> {
        match self {
            LockSystem::Storage => storage,
            LockSystem::Mem => Arc::new(Locking::new(storage)),
        }
    }
}

/// Storage decorator that adds an in-memory lock table.
///
/// Data operations go to the wrapped storage. Locks below a deleted or
/// moved path are dropped.
pub struct Locking {
    inner: Arc<dyn DavStorage>,
    ls: MemLs,
}

impl Locking {
    pub fn new(inner: Arc<dyn DavStorage>) -> Locking {
        Locking {
            inner,
            ls: MemLs::new(),
        }
    }
}

impl DavStorage for Locking {
    fn exists<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, bool> {
        self.inner.exists(path)
    }

    fn get<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Option<Content>> {
        self.inner.get(path)
    }

    fn propfind<'a>(
        &'a self,
        path: &'a DavPath,
        props: Option<&'a [PropName]>,
        depth: Depth,
    ) -> FsFuture<'a, Option<PropMap>> {
        self.inner.propfind(path, props, depth)
    }

    fn proppatch<'a>(
        &'a self,
        path: &'a DavPath,
        changes: Vec<PropPatchAction>,
    ) -> FsFuture<'a, Vec<(PropName, StatusCode)>> {
        self.inner.proppatch(path, changes)
    }

    fn put<'a>(
        &'a self,
        path: &'a DavPath,
        body: PutStream<'a>,
        checksum: Option<Checksum>,
    ) -> FsFuture<'a, bool> {
        self.inner.put(path, body, checksum)
    }

    fn delete<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            self.inner.delete(path).await?;
            self.ls.remove_below(path);
            Ok(())
        })
    }

    fn copy<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, bool> {
        self.inner.copy(from, to)
    }

    fn move_<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, bool> {
        Box::pin(async move {
            let overwritten = self.inner.move_(from, to).await?;
            self.ls.remove_below(from);
            Ok(overwritten)
        })
    }

    fn mkcol<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        self.inner.mkcol(path)
    }

    fn list<'a>(
        &'a self,
        path: &'a DavPath,
        props: Option<&'a [PropName]>,
    ) -> FsFuture<'a, Vec<ListEntry>> {
        self.inner.list(path, props)
    }

    fn touch<'a>(&'a self, path: &'a DavPath, mtime: SystemTime) -> FsFuture<'a, bool> {
        self.inner.touch(path, mtime)
    }

    fn lock<'a>(&'a self, path: &'a DavPath, lock: &'a DavLock) -> FsFuture<'a, bool> {
        Box::pin(async move { Ok(self.ls.acquire(path, lock)) })
    }

    fn unlock<'a>(&'a self, path: &'a DavPath, token: &'a str) -> FsFuture<'a, ()> {
        Box::pin(async move {
            if self.ls.release(path, token) {
                Ok(())
            } else {
                Err(FsError::Conflict("No matching lock".into()))
            }
        })
    }

    fn get_lock<'a>(
        &'a self,
        path: &'a DavPath,
        token: Option<&'a str>,
    ) -> FsFuture<'a, Option<DavLock>> {
        Box::pin(async move { Ok(self.ls.lookup(path, token)) })
    }
}

#[cfg(all(test, feature = "memfs"))]
mod tests {
    use super::*;
    use crate::fs::memfs::MemStorage;
    use std::time::Duration;

    fn p(s: &str) -> DavPath {
        DavPath::from_str_and_prefix(s, "").unwrap().unwrap()
    }

    #[tokio::test]
    async fn default_storage_is_never_locked() {
        let fs = LockSystem::Storage.build(MemStorage::new());
        let l = DavLock::new("t", LockScope::Exclusive, None, Duration::from_secs(10));
        assert!(fs.lock(&p("/a"), &l).await.unwrap());
        assert!(fs.get_lock(&p("/a"), None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_drops_locks() {
        let mem = MemStorage::new();
        mem.insert_collection("dir");
        mem.insert_file("dir/f", b"x");
        let fs = LockSystem::Mem.build(mem);
        let l = DavLock::new("t", LockScope::Exclusive, None, Duration::from_secs(10));
        assert!(fs.lock(&p("/dir/f"), &l).await.unwrap());
        assert!(fs.get_lock(&p("/dir/f"), None).await.unwrap().is_some());
        fs.delete(&p("/dir")).await.unwrap();
        assert!(fs.get_lock(&p("/dir/f"), None).await.unwrap().is_none());
    }
}
