//! Simple in-memory storage.
//!
//! This implementation has state, so if you create a new instance in
//! a handler(), it will be empty every time. Clone the handler (or the
//! `Arc<MemStorage>`) instead.
//!
//! Supports dead properties, content checksums, an optional quota and
//! setting the modification time.
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use http::StatusCode;
use parking_lot::RwLock;
use sha1::{Digest, Sha1};
use time::OffsetDateTime;

use crate::davpath::DavPath;
use crate::fs::*;
use crate::props::{PropMap, PropName, PropValue, NS_DAV_URI};

/// Ephemeral in-memory storage.
#[derive(Debug)]
pub struct MemStorage {
    tree: RwLock<BTreeMap<String, MemNode>>,
    quota: Option<u64>,
}

#[derive(Debug, Clone)]
struct MemNode {
    data: Option<Bytes>,
    props: PropMap,
    mtime: SystemTime,
    crtime: SystemTime,
}

impl MemNode {
    fn new_collection() -> MemNode {
        let now = SystemTime::now();
        MemNode {
            data: None,
            props: PropMap::new(),
            mtime: now,
            crtime: now,
        }
    }

    fn new_file(data: Bytes) -> MemNode {
        MemNode {
            data: Some(data),
            ..MemNode::new_collection()
        }
    }

    fn is_collection(&self) -> bool {
        self.data.is_none()
    }

    fn len(&self) -> u64 {
        self.data.as_ref().map(|d| d.len() as u64).unwrap_or(0)
    }
}

// is `key` the same as `base`, or below it.
fn is_below(key: &str, base: &str) -> bool {
    base.is_empty()
        || key == base
        || (key.len() > base.len() && key.starts_with(base) && key.as_bytes()[base.len()] == b'/')
}

fn parent_key(key: &str) -> &str {
    key.rsplit_once('/').map(|(p, _)| p).unwrap_or("")
}

fn checksum_hex(algorithm: HashAlgorithm, data: &[u8]) -> String {
    match algorithm {
        HashAlgorithm::Md5 => format!("{:x}", md5::compute(data)),
        HashAlgorithm::Sha1 => {
            let mut hasher = Sha1::new();
            hasher.update(data);
            format!("{:x}", hasher.finalize())
        }
    }
}

impl MemStorage {
    /// Create a new, empty storage that only contains the root collection.
    pub fn new() -> Arc<MemStorage> {
        Arc::new(MemStorage::default())
    }

    /// Same as `new`, but refuse to store more than `bytes` of content.
    pub fn with_quota(bytes: u64) -> Arc<MemStorage> {
        let mut fs = MemStorage::default();
        fs.quota = Some(bytes);
        Arc::new(fs)
    }

    fn used_bytes(tree: &BTreeMap<String, MemNode>, base: &str) -> u64 {
        tree.iter()
            .filter(|(k, _)| is_below(k, base))
            .map(|(_, n)| n.len())
            .sum()
    }

    // live properties plus dead properties of a node.
    fn node_props(&self, tree: &BTreeMap<String, MemNode>, key: &str, node: &MemNode) -> PropMap {
        let mut props = PropMap::new();
        let name = key.rsplit('/').next().unwrap_or_default();

        if node.is_collection() {
            props.insert(PropName::dav("resourcetype"), PropValue::Collection);
            let used = MemStorage::used_bytes(tree, key);
            props.insert(PropName::dav("quota-used-bytes"), PropValue::Text(used.to_string()));
            if let Some(quota) = self.quota {
                let free = quota.saturating_sub(MemStorage::used_bytes(tree, ""));
                props.insert(
                    PropName::dav("quota-available-bytes"),
                    PropValue::Text(free.to_string()),
                );
            }
        } else {
            props.insert(PropName::dav("resourcetype"), PropValue::Empty);
            let ct = mime_guess::from_path(name).first_or_octet_stream();
            props.insert(PropName::dav("getcontenttype"), PropValue::Text(ct.to_string()));
            props.insert(
                PropName::dav("getcontentlength"),
                PropValue::Text(node.len().to_string()),
            );
        }
        props.insert(
            PropName::dav("getlastmodified"),
            PropValue::Date(OffsetDateTime::from(node.mtime)),
        );
        props.insert(PropName::dav("displayname"), PropValue::text(name));

        let etag = match &node.data {
            Some(data) => format!("{:x}", md5::compute(data)),
            None => {
                let t = OffsetDateTime::from(node.mtime).unix_timestamp_nanos();
                format!("{:x}", t)
            }
        };
        props.insert(PropName::dav("getetag"), PropValue::Text(etag));
        props.insert(
            PropName::dav("creationdate"),
            PropValue::Date(OffsetDateTime::from(node.crtime)),
        );
        let hidden = if name.starts_with('.') { "1" } else { "0" };
        props.insert(PropName::dav("ishidden"), PropValue::text(hidden));

        for (name, value) in node.props.iter() {
            props.insert(name.clone(), value.clone());
        }
        props
    }

    fn select(props: PropMap, wanted: Option<&[PropName]>) -> PropMap {
        match wanted {
            None => props,
            Some(wanted) => props.into_iter().filter(|(n, _)| wanted.contains(n)).collect(),
        }
    }

    // parent of `key` must exist and be a collection.
    fn check_parent(tree: &BTreeMap<String, MemNode>, key: &str) -> FsResult<()> {
        match tree.get(parent_key(key)) {
            Some(p) if p.is_collection() => Ok(()),
            Some(_) => Err(FsError::Conflict("Parent is not a collection".into())),
            None => Err(FsError::Conflict("Parent collection does not exist".into())),
        }
    }

    fn copy_tree(tree: &mut BTreeMap<String, MemNode>, from: &str, to: &str) -> FsResult<bool> {
        if !tree.contains_key(from) {
            return Err(FsError::NotFound);
        }
        if from == to || is_below(to, from) {
            return Err(FsError::Forbidden);
        }
        MemStorage::check_parent(tree, to)?;

        let overwritten = tree.contains_key(to);
        tree.retain(|k, _| !is_below(k, to));

        let copies: Vec<(String, MemNode)> = tree
            .iter()
            .filter(|(k, _)| is_below(k, from))
            .map(|(k, n)| (format!("{}{}", to, &k[from.len()..]), n.clone()))
            .collect();
        for (k, n) in copies {
            tree.insert(k, n);
        }
        Ok(overwritten)
    }
}

impl Default for MemStorage {
    fn default() -> Self {
        let mut tree = BTreeMap::new();
        tree.insert(String::new(), MemNode::new_collection());
        MemStorage {
            tree: RwLock::new(tree),
            quota: None,
        }
    }
}

impl DavStorage for MemStorage {
    fn exists<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, bool> {
        Box::pin(async move { Ok(self.tree.read().contains_key(&path.as_rel_str())) })
    }

    fn get<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Option<Content>> {
        Box::pin(async move {
            let tree = self.tree.read();
            let node = tree.get(&path.as_rel_str()).ok_or(FsError::NotFound)?;
            Ok(node.data.clone().map(Content::Bytes))
        })
    }

    fn propfind<'a>(
        &'a self,
        path: &'a DavPath,
        props: Option<&'a [PropName]>,
        _depth: Depth,
    ) -> FsFuture<'a, Option<PropMap>> {
        Box::pin(async move {
            trace!("MemStorage: propfind {:?}", path);
            let key = path.as_rel_str();
            let tree = self.tree.read();
            Ok(tree
                .get(&key)
                .map(|node| MemStorage::select(self.node_props(&tree, &key, node), props)))
        })
    }

    fn proppatch<'a>(
        &'a self,
        path: &'a DavPath,
        changes: Vec<PropPatchAction>,
    ) -> FsFuture<'a, Vec<(PropName, StatusCode)>> {
        Box::pin(async move {
            let mut tree = self.tree.write();
            let node = tree.get_mut(&path.as_rel_str()).ok_or(FsError::NotFound)?;

            // live properties are computed, they cannot be changed.
            let refused = changes.iter().any(|c| c.name.ns == NS_DAV_URI);
            if refused {
                return Ok(changes
                    .into_iter()
                    .map(|c| {
                        let status = if c.name.ns == NS_DAV_URI {
                            StatusCode::FORBIDDEN
                        } else {
                            StatusCode::FAILED_DEPENDENCY
                        };
                        (c.name, status)
                    })
                    .collect());
            }

            let mut res = Vec::new();
            for change in changes {
                match change.value {
                    Some(value) => node.props.insert(change.name.clone(), value),
                    None => {
                        node.props.remove(&change.name);
                    }
                }
                res.push((change.name, StatusCode::OK));
            }
            Ok(res)
        })
    }

    fn put<'a>(
        &'a self,
        path: &'a DavPath,
        mut body: PutStream<'a>,
        checksum: Option<Checksum>,
    ) -> FsFuture<'a, bool> {
        Box::pin(async move {
            if path.file_name().map(is_noise_file).unwrap_or(false) {
                debug!("MemStorage: not storing {:?}", path);
                return Ok(false);
            }
            let key = path.as_rel_str();
            {
                let tree = self.tree.read();
                MemStorage::check_parent(&tree, &key)?;
                if tree.get(&key).map(|n| n.is_collection()).unwrap_or(false) {
                    return Err(FsError::Forbidden);
                }
            }

            let mut buf = BytesMut::new();
            while let Some(chunk) = body.next().await {
                buf.extend_from_slice(&chunk?);
            }
            let data = buf.freeze();

            if let Some(checksum) = checksum {
                if checksum_hex(checksum.algorithm, &data) != checksum.hex {
                    return Err(FsError::ChecksumMismatch);
                }
            }

            let mut tree = self.tree.write();
            // the parent may have gone away while we were reading.
            MemStorage::check_parent(&tree, &key)?;
            if let Some(quota) = self.quota {
                let old = tree.get(&key).map(|n| n.len()).unwrap_or(0);
                let used = MemStorage::used_bytes(&tree, "") - old;
                if used + data.len() as u64 > quota {
                    return Err(FsError::InsufficientStorage);
                }
            }
            match tree.get_mut(&key) {
                Some(node) => {
                    node.data = Some(data);
                    node.mtime = SystemTime::now();
                    Ok(false)
                }
                None => {
                    tree.insert(key, MemNode::new_file(data));
                    Ok(true)
                }
            }
        })
    }

    fn delete<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            if path.is_root() {
                return Err(FsError::Forbidden);
            }
            let key = path.as_rel_str();
            let mut tree = self.tree.write();
            if !tree.contains_key(&key) {
                return Err(FsError::NotFound);
            }
            tree.retain(|k, _| !is_below(k, &key));
            Ok(())
        })
    }

    fn copy<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, bool> {
        Box::pin(async move {
            trace!("MemStorage: copy {:?} {:?}", from, to);
            let mut tree = self.tree.write();
            MemStorage::copy_tree(&mut tree, &from.as_rel_str(), &to.as_rel_str())
        })
    }

    fn move_<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, bool> {
        Box::pin(async move {
            trace!("MemStorage: move {:?} {:?}", from, to);
            if from.is_root() {
                return Err(FsError::Forbidden);
            }
            let from = from.as_rel_str();
            let mut tree = self.tree.write();
            let overwritten = MemStorage::copy_tree(&mut tree, &from, &to.as_rel_str())?;
            tree.retain(|k, _| !is_below(k, &from));
            Ok(overwritten)
        })
    }

    fn mkcol<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let key = path.as_rel_str();
            let mut tree = self.tree.write();
            if tree.contains_key(&key) {
                return Err(FsError::Exists);
            }
            MemStorage::check_parent(&tree, &key)?;
            tree.insert(key, MemNode::new_collection());
            Ok(())
        })
    }

    fn list<'a>(
        &'a self,
        path: &'a DavPath,
        props: Option<&'a [PropName]>,
    ) -> FsFuture<'a, Vec<ListEntry>> {
        Box::pin(async move {
            let key = path.as_rel_str();
            let tree = self.tree.read();
            match tree.get(&key) {
                Some(n) if n.is_collection() => {}
                Some(_) => return Err(FsError::Forbidden),
                None => return Err(FsError::NotFound),
            }
            let entries = tree
                .iter()
                .filter(|(k, _)| !k.is_empty() && *k != &key && parent_key(k) == key)
                .map(|(k, node)| {
                    let name = k.rsplit('/').next().unwrap_or_default().to_string();
                    // collections are left for the caller to look up.
                    let props = if node.is_collection() {
                        None
                    } else {
                        Some(MemStorage::select(self.node_props(&tree, k, node), props))
                    };
                    ListEntry { name, props }
                })
                .collect();
            Ok(entries)
        })
    }

    fn touch<'a>(&'a self, path: &'a DavPath, mtime: SystemTime) -> FsFuture<'a, bool> {
        Box::pin(async move {
            let mut tree = self.tree.write();
            let node = tree.get_mut(&path.as_rel_str()).ok_or(FsError::NotFound)?;
            node.mtime = mtime;
            Ok(true)
        })
    }
}

// used by the tests to put content in place without going through a PUT.
#[cfg(test)]
impl MemStorage {
    pub(crate) fn insert_file(&self, key: &str, data: &[u8]) {
        self.tree
            .write()
            .insert(key.to_string(), MemNode::new_file(Bytes::copy_from_slice(data)));
    }

    pub(crate) fn insert_collection(&self, key: &str) {
        self.tree.write().insert(key.to_string(), MemNode::new_collection());
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.tree.read().contains_key(key)
    }

    pub(crate) fn content(&self, key: &str) -> Option<Bytes> {
        self.tree.read().get(key).and_then(|n| n.data.clone())
    }
}
