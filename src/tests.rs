// End-to-end tests: requests in, responses out, with an in-memory backend.
use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::fs::memfs::MemStorage;
use crate::{DavHandler, LockSystem};

fn setup() -> (Arc<MemStorage>, DavHandler) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mem = MemStorage::new();
    let dav = DavHandler::builder(mem.clone())
        .locksystem(LockSystem::Mem)
        .build();
    (mem, dav)
}

fn req(method: &str, uri: &str, headers: &[(&str, &str)], body: impl Into<Body>) -> Request<Body> {
    let mut b = Request::builder().method(method).uri(uri);
    for (k, v) in headers {
        b = b.header(*k, *v);
    }
    b.body(body.into()).unwrap()
}

async fn body_bytes(res: Response<Body>) -> Bytes {
    let chunks: Vec<_> = res.into_body().collect().await;
    let mut data = Vec::new();
    for chunk in chunks {
        data.extend_from_slice(&chunk.unwrap());
    }
    Bytes::from(data)
}

async fn body_string(res: Response<Body>) -> String {
    String::from_utf8(body_bytes(res).await.to_vec()).unwrap()
}

fn header<'a>(res: &'a Response<Body>, name: &str) -> Option<&'a str> {
    res.headers().get(name).and_then(|v| v.to_str().ok())
}

const LOCK_EXCLUSIVE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:lockinfo xmlns:D="DAV:">
  <D:lockscope><D:exclusive/></D:lockscope>
  <D:locktype><D:write/></D:locktype>
  <D:owner><D:href>mailto:alice@example.com</D:href></D:owner>
</D:lockinfo>"#;

const LOCK_SHARED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:lockinfo xmlns:D="DAV:">
  <D:lockscope><D:shared/></D:lockscope>
  <D:locktype><D:write/></D:locktype>
</D:lockinfo>"#;

#[tokio::test]
async fn options_never_touches_storage() {
    let (_mem, dav) = setup();
    let res = dav.handle(req("OPTIONS", "/does/not/exist", &[], "")).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(header(&res, "dav"), Some("1, 2, 3"));
    assert_eq!(header(&res, "accept-ranges"), Some("bytes"));
    let allow = header(&res, "allow").unwrap();
    assert!(allow.contains("PROPFIND"));
    assert!(allow.contains("UNLOCK"));
}

#[tokio::test]
async fn propfind_nonexistent_is_404() {
    let (_mem, dav) = setup();
    for depth in ["0", "1"] {
        let res = dav
            .handle(req("PROPFIND", "/nope.txt", &[("depth", depth)], ""))
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body = body_string(res).await;
        assert!(!body.contains("multistatus"));
        assert!(body.contains("<s:message>"));
    }
}

#[tokio::test]
async fn propfind_single_file() {
    let (mem, dav) = setup();
    mem.insert_file("a.txt", b"0123456789");
    let body = r#"<?xml version="1.0"?>
<d:propfind xmlns:d="DAV:"><d:prop><d:getcontentlength/><d:getetag/><d:nosuchprop/></d:prop></d:propfind>"#;
    let res = dav
        .handle(req("PROPFIND", "/a.txt", &[("depth", "0")], body))
        .await;
    assert_eq!(res.status(), StatusCode::MULTI_STATUS);
    assert_eq!(
        header(&res, "content-type"),
        Some("application/xml; charset=utf-8")
    );
    let xml = body_string(res).await;
    let etag = format!("{:x}", md5::compute(b"0123456789"));
    assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<d:multistatus xmlns:d=\"DAV:\">"));
    assert!(xml.contains("<d:href>/a.txt</d:href>"));
    assert!(xml.contains("<d:getcontentlength>10</d:getcontentlength>"));
    assert!(xml.contains(&format!("<d:getetag>\"{}\"</d:getetag>", etag)));
    assert!(xml.contains("<d:nosuchprop/>"));
    assert!(xml.contains("HTTP/1.1 404 Not Found"));
}

#[tokio::test]
async fn propfind_depth_one_lists_children() {
    let (mem, dav) = setup();
    mem.insert_collection("dir");
    mem.insert_collection("dir/sub");
    mem.insert_file("dir/f.txt", b"x");
    let res = dav.handle(req("PROPFIND", "/dir", &[("depth", "1")], "")).await;
    assert_eq!(res.status(), StatusCode::MULTI_STATUS);
    assert_eq!(header(&res, "content-location"), Some("/dir/"));
    let xml = body_string(res).await;
    assert!(xml.contains("<d:href>/dir/</d:href>"));
    assert!(xml.contains("<d:href>/dir/sub/</d:href>"));
    assert!(xml.contains("<d:href>/dir/f.txt</d:href>"));
    assert!(xml.contains("<d:collection/>"));
    // allprop leaves out the extended properties.
    assert!(!xml.contains("quota-used-bytes"));
    // collections have no content type.
    assert_eq!(xml.matches("getcontenttype").count(), 2);
}

#[tokio::test]
async fn propfind_lock_properties() {
    let (mem, dav) = setup();
    mem.insert_file("f", b"x");
    let res = dav.handle(req("LOCK", "/f", &[], LOCK_EXCLUSIVE)).await;
    assert_eq!(res.status(), StatusCode::OK);

    let body = r#"<?xml version="1.0"?>
<propfind xmlns="DAV:"><prop><supportedlock/><lockdiscovery/></prop></propfind>"#;
    let res = dav.handle(req("PROPFIND", "/f", &[("depth", "0")], body)).await;
    let xml = body_string(res).await;
    assert!(xml.contains("<d:lockentry><d:lockscope><d:shared/>"));
    assert!(xml.contains("<d:activelock>"));
    assert!(xml.contains("mailto:alice@example.com"));
}

#[tokio::test]
async fn propfind_creationdate_for_miniredir() {
    let (mem, dav) = setup();
    mem.insert_file("f", b"x");
    let body = r#"<propfind xmlns="DAV:"><prop><creationdate/></prop></propfind>"#;
    let res = dav
        .handle(req(
            "PROPFIND",
            "/f",
            &[("depth", "0"), ("user-agent", "Microsoft-WebDAV-MiniRedir/10.0")],
            body,
        ))
        .await;
    let xml = body_string(res).await;
    let start = xml.find("<d:creationdate>").unwrap() + "<d:creationdate>".len();
    let end = xml.find("</d:creationdate>").unwrap();
    assert!(xml[start..end].parse::<i64>().is_ok());
}

#[tokio::test]
async fn malformed_propfind_is_400() {
    let (mem, dav) = setup();
    mem.insert_file("f", b"x");
    let res = dav
        .handle(req("PROPFIND", "/f", &[("depth", "0")], "<foo/>"))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn exclusive_then_shared_lock_is_423() {
    let (mem, dav) = setup();
    mem.insert_file("f.txt", b"data");

    let res = dav.handle(req("LOCK", "/f.txt", &[], LOCK_EXCLUSIVE)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let token = header(&res, "lock-token").unwrap().to_string();
    assert!(token.starts_with("<opaquelocktoken:"));
    let xml = body_string(res).await;
    assert!(xml.contains("<d:prop xmlns:d=\"DAV:\"><d:lockdiscovery>"));
    assert!(xml.contains("<d:exclusive/>"));

    let res = dav.handle(req("LOCK", "/f.txt", &[], LOCK_SHARED)).await;
    assert_eq!(res.status(), StatusCode::LOCKED);
}

#[tokio::test]
async fn shared_locks_coexist() {
    let (mem, dav) = setup();
    mem.insert_file("f.txt", b"data");
    let res = dav.handle(req("LOCK", "/f.txt", &[], LOCK_SHARED)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let first = header(&res, "lock-token").unwrap().to_string();

    // a second client, without any token.
    let res = dav.handle(req("LOCK", "/f.txt", &[], LOCK_SHARED)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let second = header(&res, "lock-token").unwrap().to_string();
    assert_ne!(first, second);

    let res = dav.handle(req("LOCK", "/f.txt", &[], LOCK_EXCLUSIVE)).await;
    assert_eq!(res.status(), StatusCode::LOCKED);
}

#[tokio::test]
async fn lock_with_body_and_held_token_refreshes() {
    let (mem, dav) = setup();
    mem.insert_file("f.txt", b"data");
    let res = dav.handle(req("LOCK", "/f.txt", &[], LOCK_EXCLUSIVE)).await;
    let token = header(&res, "lock-token").unwrap().to_string();

    // the scope of the held lock wins over the one in the body.
    let if_hdr = format!("({})", token);
    let res = dav
        .handle(req(
            "LOCK",
            "/f.txt",
            &[("if", if_hdr.as_str()), ("timeout", "Second-90")],
            LOCK_SHARED,
        ))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(header(&res, "lock-token"), Some(token.as_str()));
    let xml = body_string(res).await;
    assert!(xml.contains("<d:exclusive/>"));
    assert!(xml.contains("Second-90"));
}

#[tokio::test]
async fn lock_guards_writes() {
    let (mem, dav) = setup();
    mem.insert_file("f.txt", b"data");
    let res = dav.handle(req("LOCK", "/f.txt", &[], LOCK_EXCLUSIVE)).await;
    let token = header(&res, "lock-token").unwrap().to_string();

    let res = dav.handle(req("PUT", "/f.txt", &[], "new")).await;
    assert_eq!(res.status(), StatusCode::LOCKED);
    assert_eq!(mem.content("f.txt").unwrap(), &b"data"[..]);

    let res = dav
        .handle(req("PUT", "/f.txt", &[("if", "(<opaquelocktoken:wrong>)")], "new"))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let if_hdr = format!("({})", token);
    let res = dav
        .handle(req("PUT", "/f.txt", &[("if", if_hdr.as_str())], "new"))
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(mem.content("f.txt").unwrap(), &b"new"[..]);

    let res = dav
        .handle(req("PUT", "/f.txt", &[("if", "(<DAV:no-lock>)")], "x"))
        .await;
    assert_eq!(res.status(), StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn tagged_if_header() {
    let (mem, dav) = setup();
    mem.insert_file("f.txt", b"data");
    let res = dav.handle(req("LOCK", "/f.txt", &[], LOCK_EXCLUSIVE)).await;
    let token = header(&res, "lock-token").unwrap().to_string();

    // naming an unlocked ancestor does not get around the lock.
    let res = dav
        .handle(req("PUT", "/f.txt", &[("if", "</> (<opaquelocktoken:bogus>)")], "pwned"))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(mem.content("f.txt").unwrap(), &b"data"[..]);

    // the tagged resource must cover the request URI.
    let outside = format!("</other.txt> ({})", token);
    let res = dav
        .handle(req("PUT", "/f.txt", &[("if", outside.as_str())], "new"))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let tagged = format!("</f.txt> ({})", token);
    let res = dav
        .handle(req("PUT", "/f.txt", &[("if", tagged.as_str())], "new"))
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(mem.content("f.txt").unwrap(), &b"new"[..]);

    // MOVE proves ownership of the source with a tag naming it.
    let res = dav
        .handle(req(
            "MOVE",
            "/f.txt",
            &[("destination", "/g.txt"), ("if", tagged.as_str())],
            "",
        ))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert!(!mem.contains("f.txt"));
    assert_eq!(mem.content("g.txt").unwrap(), &b"new"[..]);
}

#[tokio::test]
async fn lock_refresh_and_unlock() {
    let (mem, dav) = setup();
    mem.insert_file("f.txt", b"data");
    let res = dav
        .handle(req("LOCK", "/f.txt", &[("timeout", "Second-60")], LOCK_EXCLUSIVE))
        .await;
    let token = header(&res, "lock-token").unwrap().to_string();
    assert!(body_string(res).await.contains("Second-60"));

    // refresh: no body, token in the If header.
    let if_hdr = format!("({})", token);
    let res = dav
        .handle(req(
            "LOCK",
            "/f.txt",
            &[("if", if_hdr.as_str()), ("timeout", "Second-120")],
            "",
        ))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(body_string(res).await.contains("Second-120"));

    let res = dav.handle(req("LOCK", "/f.txt", &[], "")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = dav.handle(req("UNLOCK", "/f.txt", &[], "")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = dav
        .handle(req("UNLOCK", "/f.txt", &[("lock-token", "<opaquelocktoken:nope>")], ""))
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = dav
        .handle(req("UNLOCK", "/f.txt", &[("lock-token", token.as_str())], ""))
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = dav.handle(req("PUT", "/f.txt", &[], "free")).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn lock_on_unmapped_url_creates_resource() {
    let (mem, dav) = setup();
    let res = dav.handle(req("LOCK", "/new.txt", &[], LOCK_EXCLUSIVE)).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert!(mem.contains("new.txt"));
    assert_eq!(mem.content("new.txt").unwrap().len(), 0);
}

#[tokio::test]
async fn ranges() {
    let (mem, dav) = setup();
    let data = b"abcdefghijklmnopqrst";
    mem.insert_file("r.bin", data);
    let size = data.len();

    let res = dav.handle(req("GET", "/r.bin", &[("range", "bytes=0-")], "")).await;
    assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        header(&res, "content-range"),
        Some(format!("bytes 0-{}/{}", size - 1, size).as_str())
    );
    assert_eq!(header(&res, "content-length"), Some(size.to_string().as_str()));
    assert_eq!(body_bytes(res).await, &data[..]);

    let res = dav.handle(req("GET", "/r.bin", &[("range", "bytes=2-4")], "")).await;
    assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(body_bytes(res).await, &b"cde"[..]);

    let res = dav.handle(req("GET", "/r.bin", &[("range", "bytes=-3")], "")).await;
    assert_eq!(body_bytes(res).await, &b"rst"[..]);

    let beyond = format!("bytes={}-", size + 10);
    let res = dav.handle(req("GET", "/r.bin", &[("range", beyond.as_str())], "")).await;
    assert_eq!(res.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(
        header(&res, "content-range"),
        Some(format!("bytes */{}", size).as_str())
    );

    // multiple ranges: full response.
    let res = dav
        .handle(req("GET", "/r.bin", &[("range", "bytes=0-1,4-5")], ""))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_bytes(res).await, &data[..]);
}

#[tokio::test]
async fn get_and_head() {
    let (mem, dav) = setup();
    mem.insert_file("page.html", b"<p>hi</p>");
    let res = dav.handle(req("GET", "/page.html", &[], "")).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(header(&res, "content-type"), Some("text/html"));
    assert_eq!(header(&res, "accept-ranges"), Some("bytes"));
    let etag = header(&res, "etag").unwrap().to_string();
    assert!(etag.starts_with('"'));
    assert_eq!(body_bytes(res).await, &b"<p>hi</p>"[..]);

    let res = dav.handle(req("HEAD", "/page.html", &[], "")).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(header(&res, "content-length"), Some("9"));
    assert!(body_bytes(res).await.is_empty());

    let res = dav
        .handle(req("GET", "/page.html", &[("if-none-match", etag.as_str())], ""))
        .await;
    assert_eq!(res.status(), StatusCode::NOT_MODIFIED);

    let res = dav.handle(req("GET", "/missing", &[], "")).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn gzip_when_accepted() {
    use flate2::read::GzDecoder;
    use std::io::Read;

    let (mem, dav) = setup();
    let text = "all work and no play makes jack a dull boy\n".repeat(100);
    mem.insert_file("notes.txt", text.as_bytes());
    mem.insert_file("photo.jpg", b"not really a jpeg");

    let res = dav
        .handle(req("GET", "/notes.txt", &[("accept-encoding", "gzip, deflate")], ""))
        .await;
    assert_eq!(header(&res, "content-encoding"), Some("gzip"));
    assert_eq!(header(&res, "vary"), Some("Accept-Encoding"));
    let compressed = body_bytes(res).await;
    assert!(compressed.len() < text.len());
    let mut plain = String::new();
    GzDecoder::new(&compressed[..]).read_to_string(&mut plain).unwrap();
    assert_eq!(plain, text);

    let res = dav
        .handle(req("GET", "/photo.jpg", &[("accept-encoding", "gzip")], ""))
        .await;
    assert_eq!(header(&res, "content-encoding"), None);

    // never together with a range.
    let res = dav
        .handle(req(
            "GET",
            "/notes.txt",
            &[("accept-encoding", "gzip"), ("range", "bytes=0-9")],
            "",
        ))
        .await;
    assert_eq!(header(&res, "content-encoding"), None);
    assert_eq!(body_bytes(res).await, &text.as_bytes()[..10]);
}

#[tokio::test]
async fn autoindex() {
    let (mem, dav) = setup();
    mem.insert_collection("docs");
    mem.insert_file("docs/a <b>.txt", b"x");
    let res = dav.handle(req("GET", "/docs/", &[], "")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let html = body_string(res).await;
    assert!(html.contains("Index of /docs"));
    assert!(html.contains("a &lt;b&gt;.txt"));
    assert!(html.contains("<td>1</td></tr>"));

    let dav = DavHandler::builder(mem.clone()).autoindex(false).build();
    let res = dav.handle(req("GET", "/docs/", &[], "")).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn proppatch_then_propfind_round_trip() {
    let (mem, dav) = setup();
    mem.insert_file("f", b"x");
    let patch = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propertyupdate xmlns:d="DAV:" xmlns:z="http://example.com/ns">
  <d:set><d:prop><z:foo lang="en">bar</z:foo></d:prop></d:set>
</d:propertyupdate>"#;
    let res = dav.handle(req("PROPPATCH", "/f", &[], patch)).await;
    assert_eq!(res.status(), StatusCode::MULTI_STATUS);
    let xml = body_string(res).await;
    assert!(xml.contains("HTTP/1.1 200 OK"));

    let find = r#"<?xml version="1.0"?>
<d:propfind xmlns:d="DAV:" xmlns:z="http://example.com/ns"><d:prop><z:foo/></d:prop></d:propfind>"#;
    let res = dav.handle(req("PROPFIND", "/f", &[("depth", "0")], find)).await;
    let xml = body_string(res).await;
    assert!(xml.contains("=\"http://example.com/ns\""));
    assert!(xml.contains(" lang=\"en\">bar</"));
    assert!(!xml.contains("404"));

    // live properties cannot be changed.
    let patch = r#"<d:propertyupdate xmlns:d="DAV:"><d:set><d:prop>
<d:getetag>x</d:getetag></d:prop></d:set></d:propertyupdate>"#;
    let res = dav.handle(req("PROPPATCH", "/f", &[], patch)).await;
    assert!(body_string(res).await.contains("HTTP/1.1 403 Forbidden"));

    let res = dav.handle(req("PROPPATCH", "/missing", &[], "<broken")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn mkcol_twice_is_405() {
    let (_mem, dav) = setup();
    let res = dav.handle(req("MKCOL", "/col", &[], "")).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    for _ in 0..2 {
        let res = dav.handle(req("MKCOL", "/col", &[], "")).await;
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(header(&res, "allow").is_some());
    }

    let res = dav.handle(req("MKCOL", "/a/b", &[], "")).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = dav.handle(req("MKCOL", "/withbody", &[], "<x/>")).await;
    assert_eq!(res.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn put_with_content_md5() {
    let (mem, dav) = setup();
    let res = dav
        .handle(req(
            "PUT",
            "/doc.txt",
            &[("content-md5", "XUFAKrxLKna5cZ2REBfFkg==")],
            "hello",
        ))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(
        header(&res, "etag"),
        Some("\"5d41402abc4b2a76b9719d911017c592\"")
    );
    assert!(header(&res, "oc-etag").is_some());

    let res = dav.handle(req("PUT", "/doc.txt", &[], "world")).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(mem.content("doc.txt").unwrap(), &b"world"[..]);

    // wrong checksum.
    let res = dav
        .handle(req(
            "PUT",
            "/doc.txt",
            &[("content-md5", "XUFAKrxLKna5cZ2REBfFkg==")],
            "other",
        ))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(mem.content("doc.txt").unwrap(), &b"world"[..]);
}

#[tokio::test]
async fn put_vendor_headers() {
    let (mem, dav) = setup();
    let res = dav
        .handle(req(
            "PUT",
            "/v.txt",
            &[
                ("oc-checksum", "SHA1:aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"),
                ("x-oc-mtime", "1500000000"),
            ],
            "hello",
        ))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(header(&res, "x-oc-mtime"), Some("accepted"));

    let res = dav.handle(req("GET", "/v.txt", &[], "")).await;
    assert_eq!(
        header(&res, "last-modified"),
        Some("Fri, 14 Jul 2017 02:40:00 GMT")
    );

    // a bad mtime is refused before anything is stored.
    let res = dav
        .handle(req("PUT", "/n.txt", &[("x-oc-mtime", "notanumber")], "hello"))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(!mem.contains("n.txt"));

    // editor noise is accepted and dropped.
    let res = dav.handle(req("PUT", "/.DS_Store", &[], "junk")).await;
    assert!(res.status().is_success());
    assert!(!mem.contains(".DS_Store"));
}

#[tokio::test]
async fn put_preconditions() {
    let (mem, dav) = setup();
    mem.insert_file("p.txt", b"one");
    let res = dav
        .handle(req("PUT", "/p.txt", &[("if-match", "\"stale\"")], "two"))
        .await;
    assert_eq!(res.status(), StatusCode::PRECONDITION_FAILED);

    let etag = format!("\"{:x}\"", md5::compute(b"one"));
    let res = dav
        .handle(req("PUT", "/p.txt", &[("if-match", etag.as_str())], "two"))
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = dav
        .handle(req(
            "PUT",
            "/p.txt",
            &[("if-unmodified-since", "Thu, 01 Jan 1998 00:00:00 GMT")],
            "three",
        ))
        .await;
    assert_eq!(res.status(), StatusCode::PRECONDITION_FAILED);

    let res = dav
        .handle(req("PUT", "/p.txt", &[("content-range", "bytes 0-1/3")], "xx"))
        .await;
    assert_eq!(res.status(), StatusCode::NOT_IMPLEMENTED);

    let res = dav.handle(req("PUT", "/no/parent.txt", &[], "x")).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let strict = DavHandler::builder(mem.clone()).reject_chunked_put(true).build();
    let res = strict
        .handle(req("PUT", "/c.txt", &[("transfer-encoding", "chunked")], "x"))
        .await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!mem.contains("c.txt"));
}

#[tokio::test]
async fn move_onto_itself_is_403() {
    let (mem, dav) = setup();
    mem.insert_file("a.txt", b"keep");
    let res = dav
        .handle(req("MOVE", "/a.txt", &[("destination", "/a.txt")], ""))
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(mem.content("a.txt").unwrap(), &b"keep"[..]);
}

#[tokio::test]
async fn copy_and_move() {
    let (mem, dav) = setup();
    mem.insert_collection("src");
    mem.insert_file("src/f.txt", b"data");

    let res = dav
        .handle(req("COPY", "/src/", &[("destination", "http://example.com/dst/")], ""))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(mem.content("dst/f.txt").unwrap(), &b"data"[..]);

    let res = dav
        .handle(req(
            "COPY",
            "/src/",
            &[("destination", "/dst/"), ("overwrite", "F")],
            "",
        ))
        .await;
    assert_eq!(res.status(), StatusCode::PRECONDITION_FAILED);

    let res = dav
        .handle(req("MOVE", "/src/f.txt", &[("destination", "/dst/f.txt")], ""))
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(!mem.contains("src/f.txt"));

    let res = dav
        .handle(req("MOVE", "/dst/f.txt", &[("destination", "/g.txt")], ""))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = dav.handle(req("COPY", "/g.txt", &[], "")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = dav
        .handle(req("COPY", "/g.txt", &[("destination", "/x.txt"), ("depth", "1")], ""))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn copy_collection_depth_zero() {
    let (mem, dav) = setup();
    mem.insert_collection("a");
    mem.insert_file("a/one.txt", b"1");
    mem.insert_collection("b");
    mem.insert_file("b/two.txt", b"2");

    // existing destination: nothing happens.
    let res = dav
        .handle(req("COPY", "/a/", &[("destination", "/b/"), ("depth", "0")], ""))
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(mem.contains("b/two.txt"));
    assert!(!mem.contains("b/one.txt"));

    // new destination: an empty collection.
    let res = dav
        .handle(req("COPY", "/a/", &[("destination", "/c/"), ("depth", "0")], ""))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert!(mem.contains("c"));
    assert!(!mem.contains("c/one.txt"));

    // an existing file is replaced by the collection.
    mem.insert_file("f", b"file");
    let res = dav
        .handle(req("COPY", "/a/", &[("destination", "/f"), ("depth", "0")], ""))
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(mem.contains("f"));
    assert_eq!(mem.content("f"), None);
}

#[tokio::test]
async fn delete() {
    let (mem, dav) = setup();
    mem.insert_collection("d");
    mem.insert_file("d/f", b"x");

    let res = dav.handle(req("DELETE", "/d/", &[("depth", "1")], "")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(mem.contains("d/f"));

    let res = dav
        .handle(req("DELETE", "/d/", &[("depth", "infinity")], ""))
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(!mem.contains("d"));
    assert!(!mem.contains("d/f"));

    let res = dav.handle(req("DELETE", "/d/", &[], "")).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn base_uri() {
    let mem = MemStorage::new();
    mem.insert_file("f.txt", b"x");
    let dav = DavHandler::builder(mem).strip_prefix("/dav").build();

    let res = dav.handle(req("GET", "/dav/f.txt", &[], "")).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = dav.handle(req("GET", "/other/f.txt", &[], "")).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let routed = dav.handle_route(req("GET", "/other/f.txt", &[], "")).await;
    assert!(routed.is_err());

    let res = dav.handle(req("GET", "/dav/../etc/passwd", &[], "")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = dav.handle(req("PROPFIND", "/dav/f.txt", &[("depth", "0")], "")).await;
    assert!(body_string(res).await.contains("<d:href>/dav/f.txt</d:href>"));
}

#[tokio::test]
async fn method_restrictions() {
    let mem = MemStorage::new();
    let dav = DavHandler::builder(mem)
        .methods(crate::DavMethodSet::WEBDAV_RO)
        .build();
    let res = dav.handle(req("PUT", "/f", &[], "x")).await;
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    let allow = header(&res, "allow").unwrap();
    assert!(allow.contains("PROPFIND"));
    assert!(!allow.contains("PUT"));

    let res = dav.handle(req("BREW", "/f", &[], "")).await;
    assert!(res.status().is_client_error());
}
