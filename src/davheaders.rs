use std::time::Duration;

use headers::Header;
use http::header::{HeaderName, HeaderValue};

lazy_static! {
    static ref DEPTH: HeaderName = HeaderName::from_static("depth");
    static ref TIMEOUT: HeaderName = HeaderName::from_static("timeout");
    static ref OVERWRITE: HeaderName = HeaderName::from_static("overwrite");
    static ref DESTINATION: HeaderName = HeaderName::from_static("destination");
    static ref IF: HeaderName = HeaderName::from_static("if");
}

// helper.
fn one<'i, I>(values: &mut I) -> Result<&'i HeaderValue, headers::Error>
where
    I: Iterator<Item = &'i HeaderValue>,
{
    let v = values.next().ok_or_else(invalid)?;
    if values.next().is_some() {
        Err(invalid())
    } else {
        Ok(v)
    }
}

// helper
fn invalid() -> headers::Error {
    headers::Error::invalid()
}

// helper
fn map_invalid(_e: impl std::error::Error) -> headers::Error {
    headers::Error::invalid()
}

// Simple string-valued headers.
macro_rules! header {
    ($tname:ident, $hname:ident, $sname:expr) => {
        lazy_static! {
            pub static ref $hname: HeaderName = HeaderName::from_static($sname);
        }

        #[derive(Debug, Clone, PartialEq)]
        pub struct $tname(pub String);

        impl Header for $tname {
            fn name() -> &'static HeaderName {
                &$hname
            }

            fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
            where
                I: Iterator<Item = &'i HeaderValue>,
            {
                one(values)?
                    .to_str()
                    .map(|x| $tname(x.trim().to_owned()))
                    .map_err(map_invalid)
            }

            fn encode<E>(&self, values: &mut E)
            where
                E: Extend<HeaderValue>,
            {
                if let Ok(value) = HeaderValue::from_str(&self.0) {
                    values.extend(std::iter::once(value))
                }
            }
        }
    };
}

header!(ContentLocation, CONTENT_LOCATION, "content-location");
header!(ContentMd5, CONTENT_MD5, "content-md5");
header!(XLitmus, X_LITMUS, "x-litmus");
// ownCloud / Nextcloud desktop clients: "SHA1:<hex>".
header!(OcChecksum, OC_CHECKSUM, "oc-checksum");
// ownCloud / Nextcloud desktop clients: modification time as unix timestamp.
header!(OcMtime, X_OC_MTIME, "x-oc-mtime");
header!(OcEtag, OC_ETAG, "oc-etag");
header!(XSendfile, X_SENDFILE, "x-sendfile");

/// Depth: header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl Header for Depth {
    fn name() -> &'static HeaderName {
        &DEPTH
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = one(values)?;
        match value.as_bytes() {
            b"0" => Ok(Depth::Zero),
            b"1" => Ok(Depth::One),
            v if v.eq_ignore_ascii_case(b"infinity") => Ok(Depth::Infinity),
            _ => Err(invalid()),
        }
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let value = match *self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        };
        values.extend(std::iter::once(HeaderValue::from_static(value)));
    }
}

/// Overwrite: header. Absent means `T`.
#[derive(Debug, Clone, PartialEq)]
pub struct Overwrite(pub bool);

impl Header for Overwrite {
    fn name() -> &'static HeaderName {
        &OVERWRITE
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let line = one(values)?;
        match line.as_bytes() {
            b"F" | b"f" => Ok(Overwrite(false)),
            b"T" | b"t" => Ok(Overwrite(true)),
            _ => Err(invalid()),
        }
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let value = if self.0 { "T" } else { "F" };
        values.extend(std::iter::once(HeaderValue::from_static(value)));
    }
}

/// Destination: header. Either an absolute URL or an absolute path.
#[derive(Debug, Clone, PartialEq)]
pub struct Destination(pub String);

impl Header for Destination {
    fn name() -> &'static HeaderName {
        &DESTINATION
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let s = one(values)?.to_str().map_err(map_invalid)?.trim();
        if s.starts_with('/') || s.contains("://") {
            Ok(Destination(s.to_string()))
        } else {
            Err(invalid())
        }
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        if let Ok(value) = HeaderValue::from_str(&self.0) {
            values.extend(std::iter::once(value))
        }
    }
}

/// Lock-Token: header, `<token>`. The token itself is opaque.
#[derive(Debug, Clone, PartialEq)]
pub struct LockToken(pub String);

lazy_static! {
    static ref LOCK_TOKEN: HeaderName = HeaderName::from_static("lock-token");
}

impl Header for LockToken {
    fn name() -> &'static HeaderName {
        &LOCK_TOKEN
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let s = one(values)?.to_str().map_err(map_invalid)?.trim();
        match s.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
            Some(token) if !token.trim().is_empty() => Ok(LockToken(token.trim().to_string())),
            _ => Err(invalid()),
        }
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        if let Ok(value) = HeaderValue::from_str(&format!("<{}>", self.0)) {
            values.extend(std::iter::once(value))
        }
    }
}

/// One entry of a Timeout: header.
#[derive(Debug, Clone, PartialEq)]
pub enum DavTimeout {
    Seconds(u32),
    Infinite,
}

/// Timeout: header, a list of preferred timeouts.
#[derive(Debug, Clone)]
pub struct Timeout(pub Vec<DavTimeout>);

impl Timeout {
    /// First usable value, capped at `max`.
    pub fn duration(&self, max: Duration) -> Duration {
        match self.0.first() {
            Some(DavTimeout::Seconds(n)) => Duration::from_secs(*n as u64).min(max),
            Some(DavTimeout::Infinite) | None => max,
        }
    }
}

impl Header for Timeout {
    fn name() -> &'static HeaderName {
        &TIMEOUT
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = one(values)?;
        let mut v = Vec::new();
        let words = value.to_str().map_err(map_invalid)?.split(',');
        for word in words {
            let word = word.trim();
            let w = if word.eq_ignore_ascii_case("infinite") {
                DavTimeout::Infinite
            } else if let Some(n) = word
                .get(..7)
                .filter(|p| p.eq_ignore_ascii_case("second-"))
                .map(|_| &word[7..])
            {
                DavTimeout::Seconds(n.parse::<u32>().map_err(map_invalid)?)
            } else {
                return Err(invalid());
            };
            v.push(w);
        }
        Ok(Timeout(v))
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let value = self
            .0
            .iter()
            .map(|s| match s {
                DavTimeout::Seconds(n) => format!("Second-{}", n),
                DavTimeout::Infinite => "Infinite".to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        if let Ok(value) = HeaderValue::from_str(&value) {
            values.extend(std::iter::once(value))
        }
    }
}

/// One condition inside an `If:` list.
#[derive(Debug, Clone, PartialEq)]
pub enum IfItem {
    StateToken(String),
    ETag(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfCondition {
    pub not: bool,
    pub item: IfItem,
}

/// A parenthesized list, optionally tagged with a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct IfList {
    pub resource_tag: Option<String>,
    pub conditions: Vec<IfCondition>,
}

impl IfList {
    fn new(resource_tag: Option<String>) -> IfList {
        IfList {
            resource_tag,
            conditions: Vec::new(),
        }
    }
}

/// If: header (RFC 4918, section 10.4).
#[derive(Debug, Clone, PartialEq)]
pub struct If(pub Vec<IfList>);

impl If {
    /// First state token that is not negated.
    pub fn first_token(&self) -> Option<&str> {
        self.conditions().find_map(|c| match &c.item {
            IfItem::StateToken(t) if !c.not => Some(t.as_str()),
            _ => None,
        })
    }

    /// First entity tag that is not negated.
    pub fn first_etag(&self) -> Option<&str> {
        self.conditions().find_map(|c| match &c.item {
            IfItem::ETag(t) if !c.not => Some(t.as_str()),
            _ => None,
        })
    }

    /// The resource tag of the first tagged list.
    pub fn first_resource_tag(&self) -> Option<&str> {
        self.0.iter().find_map(|l| l.resource_tag.as_deref())
    }

    fn conditions(&self) -> impl Iterator<Item = &IfCondition> {
        self.0.iter().flat_map(|l| l.conditions.iter())
    }

    pub fn parse(s: &str) -> Option<If> {
        let mut lists = Vec::new();
        let mut tag: Option<String> = None;
        let mut rest = s.trim_start();

        while !rest.is_empty() {
            if let Some(r) = rest.strip_prefix('<') {
                let end = r.find('>')?;
                tag = Some(r[..end].trim().to_string());
                rest = r[end + 1..].trim_start();
                if !rest.starts_with('(') {
                    return None;
                }
                continue;
            }
            let r = rest.strip_prefix('(')?;
            let mut list = IfList::new(tag.clone());
            let mut inner = r.trim_start();
            loop {
                let mut not = false;
                if inner.get(..3).map_or(false, |w| w.eq_ignore_ascii_case("not")) {
                    not = true;
                    inner = inner[3..].trim_start();
                }
                if let Some(r) = inner.strip_prefix('<') {
                    let end = r.find('>')?;
                    list.conditions.push(IfCondition {
                        not,
                        item: IfItem::StateToken(r[..end].trim().to_string()),
                    });
                    inner = r[end + 1..].trim_start();
                } else if let Some(r) = inner.strip_prefix('[') {
                    let end = r.find(']')?;
                    list.conditions.push(IfCondition {
                        not,
                        item: IfItem::ETag(r[..end].trim().to_string()),
                    });
                    inner = r[end + 1..].trim_start();
                } else if let Some(r) = inner.strip_prefix(')') {
                    if not || list.conditions.is_empty() {
                        return None;
                    }
                    rest = r.trim_start();
                    break;
                } else {
                    return None;
                }
            }
            lists.push(list);
        }

        if lists.is_empty() {
            None
        } else {
            Some(If(lists))
        }
    }
}

impl Header for If {
    fn name() -> &'static HeaderName {
        &IF
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let s = one(values)?.to_str().map_err(map_invalid)?;
        If::parse(s).ok_or_else(invalid)
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let mut s = String::new();
        for list in &self.0 {
            if let Some(tag) = &list.resource_tag {
                s.push_str(&format!("<{}> ", tag));
            }
            s.push('(');
            let conds = list
                .conditions
                .iter()
                .map(|c| {
                    let not = if c.not { "Not " } else { "" };
                    match &c.item {
                        IfItem::StateToken(t) => format!("{}<{}>", not, t),
                        IfItem::ETag(t) => format!("{}[{}]", not, t),
                    }
                })
                .collect::<Vec<_>>()
                .join(" ");
            s.push_str(&conds);
            s.push_str(") ");
        }
        if let Ok(value) = HeaderValue::from_str(s.trim_end()) {
            values.extend(std::iter::once(value))
        }
    }
}
