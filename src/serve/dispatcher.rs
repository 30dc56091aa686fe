//! Request dispatcher
//!
//! Resolves a request path under the root, runs conditional and range
//! negotiation for files, and falls back to index files or an on-demand
//! archive for directories. Every failure ends in one call to the outcome
//! reporter.

use hyper::{HeaderMap, Response, StatusCode};
use std::path::Path;
use std::sync::Arc;

use super::archive::{apply_archive_headers, build_archive, read_manifest, ArchiveManifest, TempArchive};
use super::descriptor::{ResourceDescriptor, ResourceKind};
use super::outcome::{report_error, Events, Reply};
use super::path_guard::{is_outside, resolve};
use super::streamer::{stream_range, Completion};
use crate::config::ServerConfig;
use crate::error::{ConfigError, ServeError};
use crate::http::date::{format_http_date, http_date_now};
use crate::http::encoding::{accepts_encoding, ARCHIVE_ENCODING};
use crate::http::mime;
use crate::http::precondition::{evaluate_freshness, evaluate_preconditions};
use crate::http::range::resolve_range_for_request;
use crate::http::response::build_response;
use crate::http::{ByteRange, HeaderSet, PreconditionVerdict, RangeResolution, ServeBody};
use crate::logger;

/// One request as handed over by the transport
#[derive(Debug, Clone)]
pub struct PipeRequest {
    /// Path relative to the root; a leading `/` is ignored
    pub path: String,
    /// Status for a successful, non-partial response
    pub status: StatusCode,
    /// Extra response headers, overriding the server defaults
    pub headers: HeaderSet,
    pub request_headers: HeaderMap,
    /// Offered as the attachment name of a directory archive
    pub download_name: Option<String>,
}

impl PipeRequest {
    pub fn new(path: impl Into<String>, request_headers: HeaderMap) -> Self {
        Self {
            path: path.into(),
            status: StatusCode::OK,
            headers: HeaderSet::new(),
            request_headers,
            download_name: None,
        }
    }

    #[must_use]
    pub const fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HeaderSet) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_download_name(mut self, name: Option<String>) -> Self {
        self.download_name = name;
        self
    }
}

/// Static file and archive server over one root directory
#[derive(Debug, Clone)]
pub struct Server {
    config: Arc<ServerConfig>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Serve the working directory with default options
    pub fn with_defaults() -> Result<Self, ConfigError> {
        ServerConfig::with_defaults().map(Self::new)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Serve one request.
    ///
    /// Returns the response to send, or [`Reply::Deferred`] when an error
    /// subscriber in `events` took over. Success is published once the body
    /// has been fully streamed.
    pub async fn pipe(&self, request: PipeRequest, events: &Events) -> Reply {
        let mut headers = self.response_headers(&request.headers);
        match self.dispatch(&request, &mut headers, events).await {
            Ok(response) => Reply::Response(response),
            Err(error) => report_error(events, &error, headers),
        }
    }

    /// Defaults overlaid with the per-call headers, stamped with `Date`
    fn response_headers(&self, extra: &HeaderSet) -> HeaderSet {
        let mut headers = self.config.default_headers().clone();
        headers.merge(extra);
        headers.insert("Date", http_date_now());
        headers
    }

    async fn dispatch(
        &self,
        request: &PipeRequest,
        headers: &mut HeaderSet,
        events: &Events,
    ) -> Result<Response<ServeBody>, ServeError> {
        let root = self.config.root();
        let path = resolve(root, &request.path);
        if is_outside(&path, root) {
            logger::log_warning(&format!("Rejected path outside root: {}", request.path));
            return Err(ServeError::PathViolation(path));
        }

        let descriptor = ResourceDescriptor::stat(&path).await.map_err(|e| {
            logger::log_debug(&format!("stat {}: {e}", path.display()));
            ServeError::NotFound(path.clone())
        })?;

        match descriptor.kind {
            ResourceKind::File => self.serve_file(&descriptor, request, headers, events),
            ResourceKind::Directory => self.serve_directory(&descriptor, request, headers, events).await,
            ResourceKind::Other => Err(ServeError::UnsupportedType(path)),
        }
    }

    /// Conditional and range negotiation for a regular file
    fn serve_file(
        &self,
        descriptor: &ResourceDescriptor,
        request: &PipeRequest,
        headers: &mut HeaderSet,
        events: &Events,
    ) -> Result<Response<ServeBody>, ServeError> {
        let tag = descriptor.entity_tag();
        let mtime = descriptor.modified_at_ms;
        let size = descriptor.size;
        let conditions = &request.request_headers;

        if evaluate_preconditions(mtime, Some(&tag), conditions) == PreconditionVerdict::PreconditionFailed {
            return Err(ServeError::PreconditionFailed);
        }

        if evaluate_freshness(mtime, Some(&tag), conditions) == PreconditionVerdict::NotModified {
            headers.insert("Last-Modified", format_http_date(mtime));
            headers.insert("Etag", tag);
            return Err(ServeError::NotModified);
        }

        let resolution = if self.config.accept_ranges() {
            resolve_range_for_request(conditions, mtime, Some(&tag), size)
        } else {
            RangeResolution::Full
        };
        let range = match resolution {
            RangeResolution::Unsatisfiable => {
                headers.insert("Content-Range", format!("bytes */{size}"));
                return Err(ServeError::RangeUnsatisfiable);
            }
            RangeResolution::Partial(range) => {
                headers.insert("Content-Range", range.content_range(size));
                Some(range)
            }
            RangeResolution::Full => None,
        };

        headers.insert("Last-Modified", format_http_date(mtime));
        headers.insert("Etag", tag);
        headers.insert("Content-Disposition", format!("filename={}", descriptor.basename()));

        Ok(serve_entity(descriptor, range, request.status, headers, events, None))
    }

    async fn serve_directory(
        &self,
        descriptor: &ResourceDescriptor,
        request: &PipeRequest,
        headers: &mut HeaderSet,
        events: &Events,
    ) -> Result<Response<ServeBody>, ServeError> {
        let directory = &descriptor.canonical_path;

        if let Some(index) = self.find_index_file(directory).await? {
            return self.serve_file(&index, request, headers, events);
        }

        if !accepts_encoding(&request.request_headers, ARCHIVE_ENCODING) {
            logger::log_debug(&format!("Client refuses {ARCHIVE_ENCODING}, cannot archive {}", directory.display()));
            return Err(ServeError::UnsupportedEncoding(ARCHIVE_ENCODING));
        }

        let contents = read_manifest(directory).await?;
        apply_archive_headers(headers, request.download_name.as_deref());
        let manifest = ArchiveManifest::parse(&contents).inspect_err(|e| {
            logger::log_error(&format!("{} in {}", e, directory.display()));
        })?;

        let (temp, archive) = build_archive(directory.clone(), manifest, self.config.temp_dir().to_path_buf()).await?;
        headers.insert_if_absent("Content-Type", mime::ZIP);
        Ok(serve_entity(&archive, None, request.status, headers, events, Some(temp)))
    }

    /// First configured index file that exists as a regular file, in order
    async fn find_index_file(&self, directory: &Path) -> Result<Option<ResourceDescriptor>, ServeError> {
        for name in self.config.index_files() {
            let candidate = resolve(directory, name);
            if is_outside(&candidate, directory) {
                logger::log_warning(&format!("Index file '{name}' escapes {}", directory.display()));
                return Err(ServeError::PathViolation(candidate));
            }
            if let Ok(found) = ResourceDescriptor::stat(&candidate).await {
                if found.is_file() {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }
}

/// Write the status line and headers and stream the body
fn serve_entity(
    descriptor: &ResourceDescriptor,
    range: Option<ByteRange>,
    status: StatusCode,
    headers: &mut HeaderSet,
    events: &Events,
    temp: Option<TempArchive>,
) -> Response<ServeBody> {
    let (status, start, len) = match range {
        Some(range) => (StatusCode::PARTIAL_CONTENT, range.start, range.byte_count()),
        None => (status, 0, descriptor.size),
    };

    let media_type = headers
        .get("Content-Type")
        .map_or_else(|| mime::lookup_path(&descriptor.canonical_path).to_string(), ToString::to_string);
    headers.insert("Content-Type", mime::content_type_header(&media_type));
    headers.insert("Content-Length", len.to_string());

    let completion = Completion::new(events.clone(), status, headers.clone(), temp);
    let body = stream_range(descriptor.canonical_path.clone(), start, len, completion);
    build_response(status, headers, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerOptions;
    use crate::serve::archive::is_temp_archive;
    use http_body_util::BodyExt;
    use hyper::header::HeaderValue;
    use std::fs;
    use std::io::{Cursor, Read};
    use tempfile::TempDir;

    const CONTENT: &[u8] = b"0123456789abcdefghij";

    fn site() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("file.txt"), CONTENT).unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/index.html"), b"<h1>docs</h1>").unwrap();
        fs::create_dir(dir.path().join("bundle")).unwrap();
        fs::write(dir.path().join("bundle/a.txt"), b"alpha").unwrap();
        fs::write(dir.path().join("bundle/b.txt"), b"beta").unwrap();
        fs::write(
            dir.path().join("bundle/index.json"),
            br#"{"files": ["a.txt", "b.txt"]}"#,
        )
        .unwrap();
        dir
    }

    fn server(dir: &TempDir) -> Server {
        Server::new(ServerConfig::new(dir.path(), ServerOptions::default()).unwrap())
    }

    /// Server whose archives are built in `scratch`
    fn archiving_server(dir: &TempDir, scratch: &TempDir) -> Server {
        let options = ServerOptions {
            temp_dir: Some(scratch.path().to_path_buf()),
            ..ServerOptions::default()
        };
        Server::new(ServerConfig::new(dir.path(), options).unwrap())
    }

    fn temp_archives(scratch: &TempDir) -> Vec<std::path::PathBuf> {
        fs::read_dir(scratch.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| is_temp_archive(path))
            .collect()
    }

    fn request(path: &str, pairs: &[(&'static str, &str)]) -> PipeRequest {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        PipeRequest::new(path, map)
    }

    async fn respond(server: &Server, request: PipeRequest) -> Response<ServeBody> {
        server
            .pipe(request, &Events::new())
            .await
            .into_response()
            .expect("response without subscriber")
    }

    async fn body_of(response: Response<ServeBody>) -> Vec<u8> {
        response.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    fn header<'a>(response: &'a Response<ServeBody>, name: &str) -> Option<&'a str> {
        response.headers().get(name).and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn test_full_file() {
        let dir = site();
        let server = server(&dir);
        let response = respond(&server, request("/file.txt", &[])).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "accept-ranges"), Some("bytes"));
        assert_eq!(header(&response, "server"), Some(crate::config::SERVER_NAME));
        assert_eq!(header(&response, "content-length"), Some("20"));
        assert_eq!(header(&response, "content-type"), Some("text/plain; charset=UTF-8"));
        assert_eq!(header(&response, "content-disposition"), Some("filename=file.txt"));
        assert!(header(&response, "date").is_some());
        assert!(header(&response, "last-modified").is_some());
        let etag = header(&response, "etag").unwrap();
        assert!(etag.starts_with('"') && etag.ends_with('"'));
        assert_eq!(body_of(response).await, CONTENT);
    }

    #[tokio::test]
    async fn test_if_none_match_gives_304() {
        let dir = site();
        let server = server(&dir);
        let first = respond(&server, request("file.txt", &[])).await;
        let etag = header(&first, "etag").unwrap().to_string();

        let response = respond(&server, request("file.txt", &[("if-none-match", etag.as_str())])).await;
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(header(&response, "etag"), Some(etag.as_str()));
        assert!(body_of(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_if_match_mismatch_gives_412() {
        let dir = site();
        let response = respond(&server(&dir), request("file.txt", &[("if-match", "\"nope\"")])).await;
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    }

    #[tokio::test]
    async fn test_if_match_star() {
        let dir = site();
        let response = respond(&server(&dir), request("file.txt", &[("if-match", "*")])).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_range_gives_206() {
        let dir = site();
        let response = respond(&server(&dir), request("file.txt", &[("range", "bytes=2-15")])).await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(header(&response, "content-range"), Some("bytes 2-15/20"));
        assert_eq!(header(&response, "content-length"), Some("14"));
        assert_eq!(body_of(response).await, b"23456789abcdef");
    }

    #[tokio::test]
    async fn test_bad_range_gives_416() {
        let dir = site();
        let response = respond(&server(&dir), request("file.txt", &[("range", "bytes=10-5")])).await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(header(&response, "content-range"), Some("bytes */20"));
    }

    #[tokio::test]
    async fn test_failing_if_range_serves_everything() {
        let dir = site();
        let response = respond(
            &server(&dir),
            request("file.txt", &[("if-range", "\"stale\""), ("range", "bytes=2-15")]),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, CONTENT);
    }

    #[tokio::test]
    async fn test_ranges_disabled() {
        let dir = site();
        let options = ServerOptions {
            accept_ranges: false,
            ..ServerOptions::default()
        };
        let server = Server::new(ServerConfig::new(dir.path(), options).unwrap());
        let response = respond(&server, request("file.txt", &[("range", "bytes=10-5")])).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(header(&response, "accept-ranges").is_none());
        assert_eq!(body_of(response).await, CONTENT);
    }

    #[tokio::test]
    async fn test_per_call_headers_win() {
        let dir = site();
        let headers: HeaderSet = [("Server", "edge"), ("Content-Type", "application/x-custom")]
            .into_iter()
            .collect();
        let response = respond(
            &server(&dir),
            request("file.txt", &[]).with_headers(headers).with_status(StatusCode::ACCEPTED),
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(header(&response, "server"), Some("edge"));
        assert_eq!(header(&response, "content-type"), Some("application/x-custom"));
    }

    #[tokio::test]
    async fn test_traversal_gives_403() {
        let dir = site();
        let response = respond(&server(&dir), request("../../etc/passwd", &[])).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(body_of(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_gives_404() {
        let dir = site();
        let response = respond(&server(&dir), request("nothing.txt", &[])).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_directory_serves_index_file() {
        let dir = site();
        let response = respond(&server(&dir), request("docs", &[])).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "content-type"), Some("text/html; charset=UTF-8"));
        assert_eq!(body_of(response).await, b"<h1>docs</h1>");
    }

    #[tokio::test]
    async fn test_index_files_tried_in_order() {
        let dir = site();
        fs::write(dir.path().join("docs/default.htm"), b"default").unwrap();
        let options = ServerOptions {
            index_files: vec!["missing.html".into(), "default.htm".into(), "index.html".into()],
            ..ServerOptions::default()
        };
        let server = Server::new(ServerConfig::new(dir.path(), options).unwrap());
        let response = respond(&server, request("docs/", &[])).await;
        assert_eq!(body_of(response).await, b"default");
    }

    #[tokio::test]
    async fn test_escaping_index_file_gives_403() {
        let dir = site();
        let options = ServerOptions {
            index_files: vec!["../file.txt".into()],
            ..ServerOptions::default()
        };
        let server = Server::new(ServerConfig::new(dir.path(), options).unwrap());
        let response = respond(&server, request("docs", &[])).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_directory_archive() {
        let dir = site();
        let response = respond(
            &server(&dir),
            request("bundle", &[]).with_download_name(Some("bundle.zip".into())),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "vary"), Some("Accept-Encoding"));
        assert_eq!(header(&response, "content-type"), Some("application/zip"));
        assert_eq!(
            header(&response, "content-disposition"),
            Some("attachment; filename=bundle.zip")
        );

        let bytes = body_of(response).await;
        assert!(!bytes.is_empty());
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(zip.len(), 2);
        let mut contents = String::new();
        zip.by_name("b.txt").unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "beta");
    }

    #[tokio::test]
    async fn test_archive_deleted_after_streaming() {
        let dir = site();
        let scratch = tempfile::tempdir().unwrap();
        let server = archiving_server(&dir, &scratch);
        assert!(temp_archives(&scratch).is_empty());

        let response = respond(&server, request("bundle", &[])).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(temp_archives(&scratch).len(), 1);

        let bytes = body_of(response).await;
        assert_eq!(zip::ZipArchive::new(Cursor::new(bytes)).unwrap().len(), 2);
        assert!(temp_archives(&scratch).is_empty());
    }

    #[tokio::test]
    async fn test_archive_deleted_when_client_goes_away() {
        let dir = site();
        let scratch = tempfile::tempdir().unwrap();
        let server = archiving_server(&dir, &scratch);

        let response = respond(&server, request("bundle", &[])).await;
        assert_eq!(temp_archives(&scratch).len(), 1);

        drop(response);
        assert!(temp_archives(&scratch).is_empty());
    }

    #[tokio::test]
    async fn test_archive_deleted_after_short_read() {
        let dir = site();
        let scratch = tempfile::tempdir().unwrap();
        let server = archiving_server(&dir, &scratch);
        let mut events = Events::new();
        let mut errors = events.subscribe_errors();

        let response = server
            .pipe(request("bundle", &[]), &events)
            .await
            .into_response()
            .unwrap();
        let archives = temp_archives(&scratch);
        assert_eq!(archives.len(), 1);
        fs::OpenOptions::new()
            .write(true)
            .open(&archives[0])
            .unwrap()
            .set_len(4)
            .unwrap();

        assert!(response.into_body().collect().await.is_err());
        assert_eq!(errors.try_recv().unwrap().code, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(temp_archives(&scratch).is_empty());
    }

    #[tokio::test]
    async fn test_archive_refused_encoding_gives_406() {
        let dir = site();
        let server = server(&dir);
        for value in ["identity;q=0", "deflate;q=0", "*;q=0", ""] {
            let response = respond(&server, request("bundle", &[("accept-encoding", value)])).await;
            assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE, "{value:?}");
        }
    }

    #[tokio::test]
    async fn test_archive_escaping_entry_gives_403() {
        let dir = site();
        fs::write(
            dir.path().join("bundle/index.json"),
            br#"{"files": ["a.txt", "../file.txt"]}"#,
        )
        .unwrap();
        let response = respond(&server(&dir), request("bundle", &[])).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(header(&response, "vary"), Some("Accept-Encoding"));
    }

    #[tokio::test]
    async fn test_archive_missing_entry_gives_404() {
        let dir = site();
        fs::write(dir.path().join("bundle/index.json"), br#"{"files": ["a.txt", "zzz.txt"]}"#).unwrap();
        let response = respond(&server(&dir), request("bundle", &[])).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_manifest_gives_500() {
        let dir = site();
        fs::write(dir.path().join("bundle/index.json"), b"{\"list\": []}").unwrap();
        let response = respond(&server(&dir), request("bundle", &[])).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_missing_manifest_gives_404() {
        let dir = site();
        fs::create_dir(dir.path().join("empty")).unwrap();
        let response = respond(&server(&dir), request("empty", &[])).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(header(&response, "vary").is_none());
    }

    #[tokio::test]
    async fn test_error_subscriber_takes_over() {
        let dir = site();
        let mut events = Events::new();
        let mut errors = events.subscribe_errors();

        let reply = server(&dir).pipe(request("nothing.txt", &[]), &events).await;
        assert!(reply.is_deferred());
        let outcome = errors.try_recv().unwrap();
        assert_eq!(outcome.code, StatusCode::NOT_FOUND);
        assert!(outcome.headers.contains("date"));
    }

    #[tokio::test]
    async fn test_success_published_after_body() {
        let dir = site();
        let mut events = Events::new();
        let mut successes = events.subscribe_successes();

        let response = server(&dir)
            .pipe(request("file.txt", &[("range", "bytes=-8")]), &events)
            .await
            .into_response()
            .unwrap();
        assert!(successes.try_recv().is_err());

        assert_eq!(body_of(response).await, b"cdefghij");
        let outcome = successes.try_recv().unwrap();
        assert_eq!(outcome.code, StatusCode::PARTIAL_CONTENT);
        assert_eq!(outcome.headers.get("content-range"), Some("bytes 12-19/20"));
    }
}
