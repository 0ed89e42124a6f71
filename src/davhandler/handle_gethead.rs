use std::io::{self, SeekFrom, Write};
use std::time::SystemTime;

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures_util::stream::{self, StreamExt};
use headers::HeaderMapExt;
use http::header::{self, HeaderValue};
use http::{Response, StatusCode};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::body::Body;
use crate::davhandler::RequestContext;
use crate::davheaders;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::fs::{Content, FsStream};
use crate::props::{PropMap, PropName, BASIC_PROPERTIES};
use crate::util::{datetime_to_httpdate, quote_etag};
use crate::DavResult;

pub(crate) const READ_BUF_SIZE: usize = 16384;

// Larger resources are never compressed.
const GZIP_MAX_SIZE: u64 = 8 * 1024 * 1024;

// Compressing these again only costs CPU.
const COMPRESSED_EXTENSIONS: &[&str] = &[
    "7z", "apk", "avi", "br", "bz2", "docx", "epub", "flac", "gif", "gz", "heic", "jpeg", "jpg",
    "m4a", "mkv", "mov", "mp3", "mp4", "odp", "ods", "odt", "ogg", "opus", "png", "pptx", "rar",
    "webm", "webp", "xlsx", "xz", "zip", "zst",
];

/// Parse a `Range` header against a resource of `size` bytes.
///
/// Returns the half-open byte range to send, or `None` for a full
/// response (no header, several ranges, or a header we do not understand).
pub(crate) fn parse_range(value: Option<&str>, size: u64) -> DavResult<Option<(u64, u64)>> {
    let spec = match value.and_then(|v| v.trim().strip_prefix("bytes=")) {
        Some(spec) => spec.trim(),
        None => return Ok(None),
    };
    if spec.contains(',') {
        return Ok(None);
    }
    let (start, end) = match spec.split_once('-') {
        Some(se) => se,
        None => return Ok(None),
    };
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        // suffix range: the last N bytes.
        let n: u64 = match end.parse() {
            Ok(n) => n,
            Err(_) => return Ok(None),
        };
        if n == 0 || size == 0 {
            return Err(DavError::RangeNotSatisfiable { size });
        }
        return Ok(Some((size.saturating_sub(n), size)));
    }

    let start: u64 = match start.parse() {
        Ok(s) => s,
        Err(_) => return Ok(None),
    };
    if start >= size {
        return Err(DavError::RangeNotSatisfiable { size });
    }
    let end = if end.is_empty() {
        size
    } else {
        match end.parse::<u64>() {
            Ok(e) if e >= start => e.saturating_add(1).min(size),
            _ => return Ok(None),
        }
    };
    Ok(Some((start, end)))
}

// Should this response be compressed on the fly.
fn want_gzip(ctx: &RequestContext, name: Option<&str>, size: Option<u64>) -> bool {
    let accepts = ctx
        .headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|enc| {
            let mut parts = enc.split(';');
            let coding = parts.next().unwrap_or("").trim();
            let refused = parts.any(|p| {
                let p = p.trim().replace(' ', "");
                p == "q=0" || p == "q=0.0" || p == "q=0.00" || p == "q=0.000"
            });
            coding.eq_ignore_ascii_case("gzip") && !refused
        });
    if !accepts {
        return false;
    }
    match size {
        Some(size) if size < GZIP_MAX_SIZE => {}
        _ => return false,
    }
    let ext = name
        .and_then(|n| n.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match ext {
        Some(ext) => !COMPRESSED_EXTENSIONS.contains(&ext.as_str()),
        None => true,
    }
}

// Compress a stream of chunks incrementally; only one chunk of output is
// buffered at a time.
fn gzip_stream(input: FsStream<Bytes>) -> FsStream<Bytes> {
    Box::pin(async_stream::stream! {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut input = input;
        while let Some(chunk) = input.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            if let Err(e) = encoder.write_all(&chunk) {
                yield Err(e);
                return;
            }
            let out = std::mem::take(encoder.get_mut());
            if !out.is_empty() {
                yield Ok(Bytes::from(out));
            }
        }
        match encoder.finish() {
            Ok(rest) => yield Ok(Bytes::from(rest)),
            Err(e) => yield Err(e),
        }
    })
}

// Read `len` bytes starting at `start` of a local file.
fn file_stream(path: std::path::PathBuf, start: u64, len: u64, bufsize: usize) -> FsStream<Bytes> {
    Box::pin(async_stream::stream! {
        let mut file = match tokio::fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) => {
                yield Err(e);
                return;
            }
        };
        if start > 0 {
            if let Err(e) = file.seek(SeekFrom::Start(start)).await {
                yield Err(e);
                return;
            }
        }
        let mut left = len;
        let mut buf = vec![0u8; bufsize];
        while left > 0 {
            let want = std::cmp::min(left, bufsize as u64) as usize;
            match file.read(&mut buf[..want]).await {
                Ok(0) => {
                    yield Err(io::Error::new(io::ErrorKind::UnexpectedEof, "file shrunk while reading"));
                    return;
                }
                Ok(n) => {
                    left -= n as u64;
                    yield Ok(Bytes::copy_from_slice(&buf[..n]));
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
    })
}

// Skip `start` bytes of a stream and stop after `len` bytes.
fn slice_stream(input: FsStream<Bytes>, start: u64, len: u64) -> FsStream<Bytes> {
    Box::pin(async_stream::stream! {
        let mut input = input;
        let mut skip = start;
        let mut left = len;
        while left > 0 {
            let mut chunk = match input.next().await {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    yield Err(e);
                    return;
                }
                None => return,
            };
            if skip >= chunk.len() as u64 {
                skip -= chunk.len() as u64;
                continue;
            }
            let _ = chunk.split_to(skip as usize);
            skip = 0;
            if chunk.len() as u64 > left {
                chunk.truncate(left as usize);
            }
            left -= chunk.len() as u64;
            yield Ok(chunk);
        }
    })
}

impl crate::DavHandler {
    pub(crate) async fn handle_get(&self, ctx: RequestContext) -> DavResult<Response<Body>> {
        let mut want = BASIC_PROPERTIES.to_vec();
        want.push(PropName::dav("getetag"));
        let props = self
            .props(&ctx.path, &want)
            .await?
            .ok_or_else(|| DavError::NotFound("Resource not found".into()))?;

        if props.is_collection() {
            return self.handle_autoindex(ctx).await;
        }

        let mut res = Response::new(Body::empty());
        let etag = props.etag().map(quote_etag);

        {
            let h = res.headers_mut();
            if let Some(etag) = &etag {
                if let Ok(v) = HeaderValue::from_str(etag) {
                    h.insert(header::ETAG, v);
                }
            }
            if let Some(modified) = props.last_modified() {
                h.typed_insert(headers::LastModified::from(SystemTime::from(modified)));
            }
        }

        if ctx.cond.not_modified(etag.as_deref()) {
            trace!("{:?} not modified", ctx.path);
            *res.status_mut() = StatusCode::NOT_MODIFIED;
            return Ok(res);
        }

        let content = self
            .storage
            .get(&ctx.path)
            .await?
            .ok_or_else(|| DavError::NotFound("Resource has no content".into()))?;

        let content_type = match props.content_type() {
            Some(ct) => ct.to_string(),
            None => mime_guess::from_path(ctx.path.file_name().unwrap_or(""))
                .first_or_octet_stream()
                .to_string(),
        };
        if let Ok(v) = HeaderValue::from_str(&content_type) {
            res.headers_mut().insert(header::CONTENT_TYPE, v);
        }

        // the front-end sends the file, we are done.
        if let Content::Path(p) = &content {
            if self.sendfile {
                debug!("X-Sendfile {:?}", p);
                res.headers_mut()
                    .typed_insert(davheaders::XSendfile(p.to_string_lossy().into_owned()));
                return Ok(res);
            }
        }

        let size = match &content {
            Content::Bytes(b) => Some(b.len() as u64),
            Content::Path(p) => Some(tokio::fs::metadata(p).await?.len()),
            Content::Stream { size, .. } => *size,
        };

        let range = match size {
            Some(size) => {
                res.headers_mut()
                    .insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
                let value = ctx.headers.get(header::RANGE).and_then(|v| v.to_str().ok());
                parse_range(value, size)?
            }
            None => None,
        };

        let (start, len) = match (range, size) {
            (Some((start, end)), Some(size)) => {
                *res.status_mut() = StatusCode::PARTIAL_CONTENT;
                res.headers_mut().insert(
                    header::CONTENT_RANGE,
                    HeaderValue::from_str(&format!("bytes {}-{}/{}", start, end - 1, size))
                        .map_err(|e| DavError::Internal(e.to_string()))?,
                );
                (start, Some(end - start))
            }
            _ => (0, size),
        };

        let gzip = self.gzip
            && range.is_none()
            && !ctx.is_head()
            && want_gzip(&ctx, ctx.path.file_name(), size);

        if gzip {
            res.headers_mut()
                .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            res.headers_mut()
                .insert(header::VARY, HeaderValue::from_static("Accept-Encoding"));
        } else if let Some(len) = len {
            res.headers_mut().typed_insert(headers::ContentLength(len));
        }

        if ctx.is_head() {
            return Ok(res);
        }

        let full = size.unwrap_or(u64::MAX);
        let len = len.unwrap_or(u64::MAX);
        let strm: FsStream<Bytes> = match content {
            Content::Bytes(b) => {
                let end = std::cmp::min(start.saturating_add(len), b.len() as u64);
                let slice = b.slice(start as usize..end as usize);
                Box::pin(stream::once(async move { Ok::<_, io::Error>(slice) }))
            }
            Content::Path(p) => file_stream(p, start, len, self.read_buf_size),
            Content::Stream { stream, .. } => {
                if start == 0 && len == full {
                    stream
                } else {
                    slice_stream(stream, start, len)
                }
            }
        };

        *res.body_mut() = if gzip {
            Body::stream(gzip_stream(strm))
        } else {
            Body::stream(strm)
        };
        Ok(res)
    }

    // GET on a collection: a small HTML index.
    async fn handle_autoindex(&self, ctx: RequestContext) -> DavResult<Response<Body>> {
        if !self.autoindex {
            return Err(DavError::Forbidden("Directory listing is disabled".into()));
        }
        let mut path = ctx.path.clone();
        let mut res = Response::new(Body::empty());
        self.fixpath(&mut res, &mut path, true);

        let want = [
            PropName::dav("resourcetype"),
            PropName::dav("getcontentlength"),
            PropName::dav("getlastmodified"),
        ];
        let mut rows = Vec::new();
        for entry in self.storage.list(&path, Some(&want[..])).await? {
            let mut child = path.clone();
            child.push_segment(&entry.name);
            let props = match entry.props {
                Some(props) => props,
                None => match self.props(&child, &want).await? {
                    Some(props) => props,
                    None => continue,
                },
            };
            if props.is_collection() {
                child.add_slash();
            }
            rows.push((entry.name, child, props));
        }
        // collections first, then by name.
        rows.sort_by(|a, b| {
            b.2.is_collection()
                .cmp(&a.2.is_collection())
                .then_with(|| a.0.cmp(&b.0))
        });

        let html = index_html(&path, &rows);
        let h = res.headers_mut();
        h.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        h.typed_insert(headers::ContentLength(html.len() as u64));
        if !ctx.is_head() {
            *res.body_mut() = Body::from(html);
        }
        Ok(res)
    }
}

fn index_html(path: &DavPath, rows: &[(String, DavPath, PropMap)]) -> String {
    let title = htmlescape::encode_minimal(&format!("/{}", path.as_rel_str()));
    let mut w = String::new();
    w.push_str("<!DOCTYPE html>\n<html><head>\n<meta charset=\"utf-8\">\n");
    w.push_str(&format!("<title>Index of {}</title>\n", title));
    w.push_str("</head><body>\n");
    w.push_str(&format!("<h1>Index of {}</h1>\n", title));
    w.push_str("<table>\n<tr><th>Name</th><th>Last modified</th><th>Size</th></tr>\n");
    if !path.is_root() {
        let parent = path.parent().as_url_string();
        w.push_str(&format!(
            "<tr><td><a href=\"{}\">Parent Directory</a></td><td></td><td></td></tr>\n",
            htmlescape::encode_attribute(&parent)
        ));
    }
    for (name, child, props) in rows {
        let mut name = htmlescape::encode_minimal(name);
        if props.is_collection() {
            name.push('/');
        }
        let modified = props
            .last_modified()
            .map(datetime_to_httpdate)
            .unwrap_or_default();
        let size = match props.content_length() {
            Some(n) if !props.is_collection() => n.to_string(),
            _ => String::new(),
        };
        w.push_str(&format!(
            "<tr><td><a href=\"{}\">{}</a></td><td>{}</td><td>{}</td></tr>\n",
            htmlescape::encode_attribute(&child.as_url_string()),
            name,
            modified,
            size
        ));
    }
    w.push_str("</table>\n</body></html>\n");
    w
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges() {
        let r = |v: &str, size| parse_range(Some(v), size);
        assert_eq!(r("bytes=0-", 10).unwrap(), Some((0, 10)));
        assert_eq!(r("bytes=2-4", 10).unwrap(), Some((2, 5)));
        assert_eq!(r("bytes=5-100", 10).unwrap(), Some((5, 10)));
        assert_eq!(r("bytes=-3", 10).unwrap(), Some((7, 10)));
        assert_eq!(r("bytes=-30", 10).unwrap(), Some((0, 10)));
        // not understood: full response.
        assert_eq!(r("bytes=0-1,4-5", 10).unwrap(), None);
        assert_eq!(r("items=0-1", 10).unwrap(), None);
        assert_eq!(r("bytes=4-2", 10).unwrap(), None);
        assert_eq!(parse_range(None, 10).unwrap(), None);

        let e = r("bytes=20-", 10).unwrap_err();
        assert_eq!(e.statuscode(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert!(r("bytes=10-", 10).is_err());

        let huge = format!("bytes=0-{}", u64::MAX);
        assert_eq!(r(&huge, 10).unwrap(), Some((0, 10)));
    }

    #[tokio::test]
    async fn gzip_is_incremental_and_valid() {
        use flate2::read::GzDecoder;
        use std::io::Read;

        let chunks: Vec<io::Result<Bytes>> = (0..20)
            .map(|i| Ok(Bytes::from(format!("chunk number {} of the payload\n", i))))
            .collect();
        let input: FsStream<Bytes> = Box::pin(stream::iter(chunks));
        let out: Vec<Bytes> = gzip_stream(input)
            .map(|c| c.unwrap())
            .collect::<Vec<_>>()
            .await;
        let compressed: Vec<u8> = out.iter().flat_map(|b| b.iter().copied()).collect();

        let mut text = String::new();
        GzDecoder::new(&compressed[..]).read_to_string(&mut text).unwrap();
        assert!(text.starts_with("chunk number 0 of"));
        assert!(text.ends_with("chunk number 19 of the payload\n"));
    }

    #[tokio::test]
    async fn slicing_a_stream() {
        let chunks: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"0123")),
            Ok(Bytes::from_static(b"4567")),
            Ok(Bytes::from_static(b"89")),
        ];
        let input: FsStream<Bytes> = Box::pin(stream::iter(chunks));
        let out: Vec<u8> = slice_stream(input, 3, 5)
            .map(|c| c.unwrap())
            .collect::<Vec<_>>()
            .await
            .iter()
            .flat_map(|b| b.iter().copied())
            .collect();
        assert_eq!(out, b"34567");
    }
}
