//! Property names, values and the namespace alias registry.
//!
//! A property is keyed by its `(namespace, local name)` pair. The pair is
//! carried as a [`PropName`] end to end; the joined `namespace:name` form
//! only exists for logging and for storage backends that want a flat key.

use std::borrow::Cow;
use std::fmt;

use time::OffsetDateTime;

pub const NS_DAV_URI: &str = "DAV:";
pub const NS_OWNCLOUD_URI: &str = "http://owncloud.org/ns";
pub const NS_NEXTCLOUD_URI: &str = "http://nextcloud.org/ns";
pub const NS_SABREDAV_URI: &str = "http://sabredav.org/ns";
pub const NS_MS_URI: &str = "urn:schemas-microsoft-com:";

// Namespaces that always get the same alias in responses.
const WELL_KNOWN_ALIASES: &[(&str, &str)] = &[
    (NS_DAV_URI, "d"),
    (NS_OWNCLOUD_URI, "oc"),
    (NS_NEXTCLOUD_URI, "nc"),
    (NS_SABREDAV_URI, "s"),
    (NS_MS_URI, "win"),
];

/// Name of a property. An empty namespace is the XML null namespace.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropName {
    pub ns: Cow<'static, str>,
    pub name: Cow<'static, str>,
}

impl PropName {
    pub fn new(ns: impl Into<String>, name: impl Into<String>) -> PropName {
        PropName {
            ns: Cow::Owned(ns.into()),
            name: Cow::Owned(name.into()),
        }
    }

    /// A property in the `DAV:` namespace.
    pub const fn dav(name: &'static str) -> PropName {
        PropName {
            ns: Cow::Borrowed(NS_DAV_URI),
            name: Cow::Borrowed(name),
        }
    }

    pub const fn oc(name: &'static str) -> PropName {
        PropName {
            ns: Cow::Borrowed(NS_OWNCLOUD_URI),
            name: Cow::Borrowed(name),
        }
    }

    pub fn is_dav(&self, name: &str) -> bool {
        self.ns == NS_DAV_URI && self.name == name
    }

    pub fn is_null_namespace(&self) -> bool {
        self.ns.is_empty()
    }

    /// The canonical `namespace:name` key.
    pub fn key(&self) -> String {
        format!("{}:{}", self.ns, self.name)
    }

    /// Parse a canonical key. Namespace URLs contain colons themselves,
    /// so the split happens at the rightmost one.
    pub fn from_key(key: &str) -> Option<PropName> {
        let (ns, name) = key.rsplit_once(':')?;
        if name.is_empty() {
            return None;
        }
        Some(PropName::new(ns, name))
    }
}

impl fmt::Debug for PropName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl fmt::Display for PropName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Returned when the client asks for all properties.
pub const BASIC_PROPERTIES: &[PropName] = &[
    PropName::dav("resourcetype"),
    PropName::dav("getcontenttype"),
    PropName::dav("getlastmodified"),
    PropName::dav("getcontentlength"),
    PropName::dav("displayname"),
];

/// Only returned when requested explicitly.
pub const EXTENDED_PROPERTIES: &[PropName] = &[
    PropName::dav("getetag"),
    PropName::dav("creationdate"),
    PropName::dav("lastaccessed"),
    PropName::dav("ishidden"),
    PropName::dav("quota-used-bytes"),
    PropName::dav("quota-available-bytes"),
];

/// Value of a property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Text(String),
    /// A point in time, with its offset. Rendered in GMT.
    Date(OffsetDateTime),
    /// `resourcetype` of a collection.
    Collection,
    /// Present, but without a value.
    Empty,
    /// Extension properties: attributes of the property element plus its
    /// content as an XML fragment (already escaped).
    Xml {
        attributes: Vec<(String, String)>,
        content: String,
    },
}

impl PropValue {
    pub fn text(s: impl Into<String>) -> PropValue {
        PropValue::Text(s.into())
    }
}

/// Properties of one resource, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropMap(Vec<(PropName, PropValue)>);

impl PropMap {
    pub fn new() -> PropMap {
        PropMap(Vec::new())
    }

    /// Insert or replace.
    pub fn insert(&mut self, name: PropName, value: PropValue) {
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &PropName) -> Option<&PropValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn remove(&mut self, name: &PropName) -> Option<PropValue> {
        let idx = self.0.iter().position(|(n, _)| n == name)?;
        Some(self.0.remove(idx).1)
    }

    pub fn contains(&self, name: &PropName) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(PropName, PropValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A resource is a collection only if its resourcetype says so.
    pub fn is_collection(&self) -> bool {
        matches!(
            self.get(&PropName::dav("resourcetype")),
            Some(PropValue::Collection)
        )
    }

    /// The etag as text, if any.
    pub fn etag(&self) -> Option<&str> {
        match self.get(&PropName::dav("getetag")) {
            Some(PropValue::Text(t)) => Some(t.as_str()),
            _ => None,
        }
    }

    pub fn last_modified(&self) -> Option<OffsetDateTime> {
        match self.get(&PropName::dav("getlastmodified")) {
            Some(PropValue::Date(d)) => Some(*d),
            _ => None,
        }
    }

    pub fn content_length(&self) -> Option<u64> {
        match self.get(&PropName::dav("getcontentlength")) {
            Some(PropValue::Text(t)) => t.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        match self.get(&PropName::dav("getcontenttype")) {
            Some(PropValue::Text(t)) => Some(t.as_str()),
            _ => None,
        }
    }
}

impl FromIterator<(PropName, PropValue)> for PropMap {
    fn from_iter<T: IntoIterator<Item = (PropName, PropValue)>>(iter: T) -> Self {
        let mut map = PropMap::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

impl IntoIterator for PropMap {
    type Item = (PropName, PropValue);
    type IntoIter = std::vec::IntoIter<(PropName, PropValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Response-scoped mapping from namespace URL to alias.
///
/// `DAV:` is always `d`; a few well-known vendor namespaces get their
/// customary alias, everything else gets `rns0`, `rns1`, ... in order of
/// first use. The null namespace never gets an alias.
#[derive(Debug, Clone)]
pub struct NamespaceRegistry {
    entries: Vec<(String, String)>,
    next: usize,
}

impl Default for NamespaceRegistry {
    fn default() -> Self {
        NamespaceRegistry::new()
    }
}

impl NamespaceRegistry {
    pub fn new() -> NamespaceRegistry {
        NamespaceRegistry {
            entries: vec![(NS_DAV_URI.to_string(), "d".to_string())],
            next: 0,
        }
    }

    /// Alias for `ns`, allocating one if needed. `None` for the null namespace.
    pub fn alias(&mut self, ns: &str) -> Option<String> {
        if ns.is_empty() {
            return None;
        }
        if let Some((_, alias)) = self.entries.iter().find(|(url, _)| url == ns) {
            return Some(alias.clone());
        }
        let alias = match WELL_KNOWN_ALIASES.iter().find(|(url, _)| *url == ns) {
            Some((_, alias)) => alias.to_string(),
            None => {
                let a = format!("rns{}", self.next);
                self.next += 1;
                a
            }
        };
        self.entries.push((ns.to_string(), alias.clone()));
        Some(alias)
    }

    /// The `xmlns:alias="url"` declarations, in allocation order.
    pub fn declarations(&self) -> String {
        self.entries
            .iter()
            .map(|(url, alias)| {
                format!(
                    " xmlns:{}=\"{}\"",
                    alias,
                    xml::escape::escape_str_attribute(url)
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_splits_at_rightmost_colon() {
        let p = PropName::new("http://example.com/ns", "foo");
        assert_eq!(p.key(), "http://example.com/ns:foo");
        assert_eq!(PropName::from_key(&p.key()), Some(p));
        assert_eq!(PropName::from_key("DAV::getetag"), Some(PropName::dav("getetag")));
        assert_eq!(PropName::from_key("nocolon"), None);
    }

    #[test]
    fn propmap_insert_replaces() {
        let mut m = PropMap::new();
        m.insert(PropName::dav("getetag"), PropValue::text("a"));
        m.insert(PropName::dav("resourcetype"), PropValue::Collection);
        m.insert(PropName::dav("getetag"), PropValue::text("b"));
        assert_eq!(m.len(), 2);
        assert_eq!(m.etag(), Some("b"));
        assert!(m.is_collection());
    }

    #[test]
    fn registry_aliases() {
        let mut r = NamespaceRegistry::new();
        assert_eq!(r.alias("DAV:").as_deref(), Some("d"));
        assert_eq!(r.alias("urn:x").as_deref(), Some("rns0"));
        assert_eq!(r.alias(NS_OWNCLOUD_URI).as_deref(), Some("oc"));
        assert_eq!(r.alias("urn:y").as_deref(), Some("rns1"));
        assert_eq!(r.alias("urn:x").as_deref(), Some("rns0"));
        assert_eq!(r.alias(""), None);
        assert_eq!(
            r.declarations(),
            " xmlns:d=\"DAV:\" xmlns:rns0=\"urn:x\" xmlns:oc=\"http://owncloud.org/ns\" xmlns:rns1=\"urn:y\""
        );
    }
}
