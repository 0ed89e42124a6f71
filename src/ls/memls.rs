//! Simple in-memory lock table.
//!
//! Locks are keyed by the path relative to the base URI. A lock on a
//! collection also covers its direct children; that is checked by looking
//! at the parent entry as well. Expired locks are dropped lazily.
use std::collections::HashMap;
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::davpath::DavPath;
use crate::fs::{DavLock, LockScope};

/// Ephemeral in-memory lock table.
#[derive(Debug, Default)]
pub struct MemLs {
    locks: Mutex<HashMap<String, Vec<DavLock>>>,
}

fn prune(locks: &mut HashMap<String, Vec<DavLock>>, key: &str, now: SystemTime) {
    if let Some(list) = locks.get_mut(key) {
        list.retain(|l| !l.is_expired(now));
        if list.is_empty() {
            locks.remove(key);
        }
    }
}

// keys whose locks apply to `path`: the path itself and its parent.
fn covering_keys(path: &DavPath) -> Vec<String> {
    let key = path.as_rel_str();
    if path.is_root() {
        vec![key]
    } else {
        vec![key, path.parent().as_rel_str()]
    }
}

impl MemLs {
    pub fn new() -> MemLs {
        MemLs::default()
    }

    /// Acquire or refresh a lock.
    ///
    /// The conflict check and the insert happen under one guard, so two
    /// concurrent requests can never both get an exclusive lock.
    pub fn acquire(&self, path: &DavPath, lock: &DavLock) -> bool {
        let now = SystemTime::now();
        let mut locks = self.locks.lock();
        let keys = covering_keys(path);
        for k in &keys {
            prune(&mut locks, k, now);
        }

        // refresh.
        let key = path.as_rel_str();
        if let Some(existing) = locks
            .get_mut(&key)
            .and_then(|list| list.iter_mut().find(|l| l.token == lock.token))
        {
            existing.timeout = lock.timeout;
            existing.expires_at = lock.expires_at;
            return true;
        }

        let conflict = keys
            .iter()
            .filter_map(|k| locks.get(k))
            .flatten()
            .any(|l| lock.scope == LockScope::Exclusive || l.scope == LockScope::Exclusive);
        if conflict {
            debug!("MemLs: lock conflict on {:?}", path);
            return false;
        }

        locks.entry(key).or_default().push(lock.clone());
        true
    }

    /// Release the lock holding `token` on `path`. Returns false if there
    /// was no such lock.
    pub fn release(&self, path: &DavPath, token: &str) -> bool {
        let mut locks = self.locks.lock();
        let key = path.as_rel_str();
        let found = match locks.get_mut(&key) {
            Some(list) => {
                let before = list.len();
                list.retain(|l| l.token != token);
                list.len() != before
            }
            None => false,
        };
        prune(&mut locks, &key, SystemTime::now());
        found
    }

    /// The lock on `path` itself (not its parent).
    pub fn lookup(&self, path: &DavPath, token: Option<&str>) -> Option<DavLock> {
        let mut locks = self.locks.lock();
        let key = path.as_rel_str();
        prune(&mut locks, &key, SystemTime::now());
        let list = locks.get(&key)?;
        match token {
            Some(t) => list.iter().find(|l| l.token == t).cloned(),
            None => list
                .iter()
                .find(|l| l.scope == LockScope::Exclusive)
                .or_else(|| list.first())
                .cloned(),
        }
    }

    /// Drop all locks on `path` and below.
    pub fn remove_below(&self, path: &DavPath) {
        let base = path.as_rel_str();
        let mut locks = self.locks.lock();
        locks.retain(|k, _| {
            !(base.is_empty()
                || *k == base
                || (k.starts_with(&base) && k.as_bytes().get(base.len()) == Some(&b'/')))
        });
    }
}
