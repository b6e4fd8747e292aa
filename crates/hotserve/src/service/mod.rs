//! File service for one output directory.
//!
//! A [`FileService`] answers requests for files under its root. Each request
//! runs through the same fixed pipeline: resolve and contain the path, apply
//! the ignore filter, stat, set headers, evaluate conditional headers, then
//! HEAD, then ranges, and finally stream the body. Any step may decline the
//! request (`Ok(None)`) or fail it with an [`HttpError`].

pub mod paths;
pub mod stream;

pub use stream::{DEFAULT_HIGH_WATER_MARK, MultipartRangeStream};

use crate::error::HttpError;
use crate::fs::{FileStat, OutputFileSystem};
use crate::http::date::format_http_date;
use crate::http::multipart::generate_boundary;
use crate::http::{
    BodyPlan, RangeOutcome, is_conditional, is_fresh, is_precondition_failed, is_range_fresh,
    parse_range, weak_etag,
};
use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::Response;
use path_clean::PathClean;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

/// Predicate excluding resolved paths from being served.
pub type IgnoreFn = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

/// Future returned by a [`Headers::Dynamic`] hook.
pub type HeadersFuture = Pin<Box<dyn Future<Output = Option<HeaderMap>> + Send>>;

/// Computes extra headers for a file from its path and stat.
pub type HeadersFn = Arc<dyn Fn(&Path, &FileStat) -> HeadersFuture + Send + Sync>;

/// Extra response headers.
///
/// Applied before the validators, so an `ETag` or `Last-Modified` set here
/// replaces the computed one.
#[derive(Clone)]
pub enum Headers {
    Static(HeaderMap),
    Dynamic(HeadersFn),
}

impl std::fmt::Debug for Headers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Headers::Static(map) => f.debug_tuple("Static").field(map).finish(),
            Headers::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Options shared by every file service of a server.
#[derive(Clone)]
pub struct ServiceOptions {
    pub fs: Arc<dyn OutputFileSystem>,
    /// Emit a weak `ETag`
    pub etag: bool,
    /// Honour `Range` requests
    pub accept_ranges: bool,
    /// Emit `Last-Modified`
    pub last_modified: bool,
    /// Maximum size of a single body chunk
    pub high_water_mark: usize,
    pub ignore: Option<IgnoreFn>,
    pub headers: Option<Headers>,
}

impl ServiceOptions {
    pub fn new(fs: Arc<dyn OutputFileSystem>) -> Self {
        Self {
            fs,
            etag: true,
            accept_ranges: true,
            last_modified: true,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            ignore: None,
            headers: None,
        }
    }

    pub fn with_ignore(mut self, ignore: impl Fn(&Path) -> bool + Send + Sync + 'static) -> Self {
        self.ignore = Some(Arc::new(ignore));
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }
}

impl std::fmt::Debug for ServiceOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceOptions")
            .field("fs", &self.fs)
            .field("etag", &self.etag)
            .field("accept_ranges", &self.accept_ranges)
            .field("last_modified", &self.last_modified)
            .field("high_water_mark", &self.high_water_mark)
            .field("ignore", &self.ignore.is_some())
            .field("headers", &self.headers)
            .finish()
    }
}

/// The parts of an HTTP request a file service looks at.
#[derive(Debug, Clone)]
pub struct FileRequest {
    pub method: Method,
    /// Percent-decoded request path
    pub path: String,
    pub headers: HeaderMap,
}

impl FileRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            headers: HeaderMap::new(),
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: header::HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }
}

/// Serves files from one output directory.
#[derive(Debug, Clone)]
pub struct FileService {
    root: PathBuf,
    options: ServiceOptions,
}

impl FileService {
    pub fn new(root: impl AsRef<Path>, options: ServiceOptions) -> Self {
        Self {
            root: root.as_ref().clean(),
            options,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Answer `request` if it names a servable file below `public_path`.
    ///
    /// `Ok(None)` means the request was not handled and should be passed on.
    pub async fn respond(
        &self,
        request: &FileRequest,
        public_path: &str,
    ) -> Result<Option<Response>, HttpError> {
        let Some(path) = paths::resolve(&self.root, &request.path, public_path) else {
            return Ok(None);
        };

        if !self.is_contained(&path).await {
            tracing::debug!(path = %path.display(), "refusing path that escapes the output root");
            return Ok(None);
        }

        if self.options.ignore.as_ref().is_some_and(|ignore| ignore(&path)) {
            return Ok(None);
        }

        let Some(stat) = self.options.fs.stat(&path).await else {
            return Ok(None);
        };
        if stat.is_dir || paths::has_trailing_slash(&request.path) {
            return Ok(None);
        }

        let mut headers = self.headers(&path, &stat).await;

        if is_conditional(&request.headers) {
            if is_precondition_failed(&request.headers, &headers) {
                return Err(HttpError::PreconditionFailed);
            }

            if is_fresh(&request.headers, &headers) {
                headers.remove(header::CONTENT_TYPE);
                headers.remove(header::CONTENT_LENGTH);
                return Ok(Some(build_response(
                    StatusCode::NOT_MODIFIED,
                    headers,
                    Body::empty(),
                )));
            }
        }

        if request.method == Method::HEAD {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(stat.size));
            return Ok(Some(build_response(StatusCode::OK, headers, Body::empty())));
        }

        let plan = self.plan(request, &headers, stat.size)?;

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(plan.content_length));
        if let Some(value) = plan.content_range.as_deref().and_then(header_value) {
            headers.insert(header::CONTENT_RANGE, value);
        }
        if let Some(value) = plan.content_type.as_deref().and_then(header_value) {
            headers.insert(header::CONTENT_TYPE, value);
        }

        let status = if plan.partial {
            StatusCode::PARTIAL_CONTENT
        } else {
            StatusCode::OK
        };

        let body = if plan.content_length == 0 {
            Body::empty()
        } else {
            let stream = MultipartRangeStream::new(Arc::clone(&self.options.fs), path, plan.ranges)
                .with_chunk_size(self.options.high_water_mark);
            Body::from_stream(stream.into_stream())
        };

        Ok(Some(build_response(status, headers, body)))
    }

    /// Response headers for a file, custom headers applied first.
    async fn headers(&self, path: &Path, stat: &FileStat) -> HeaderMap {
        let options = &self.options;
        let mut headers = HeaderMap::new();

        headers.insert(header::CONTENT_TYPE, content_type(path));

        match &options.headers {
            Some(Headers::Static(extra)) => merge_headers(&mut headers, extra),
            Some(Headers::Dynamic(hook)) => {
                if let Some(extra) = hook(path, stat).await {
                    merge_headers(&mut headers, &extra);
                }
            }
            None => {}
        }

        let accept_ranges = if options.accept_ranges { "bytes" } else { "none" };
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static(accept_ranges));

        if !options.etag {
            headers.remove(header::ETAG);
        } else if !headers.contains_key(header::ETAG) {
            if let Some(value) = header_value(&weak_etag(stat)) {
                headers.insert(header::ETAG, value);
            }
        }

        if !options.last_modified {
            headers.remove(header::LAST_MODIFIED);
        } else if !headers.contains_key(header::LAST_MODIFIED) {
            if let Some(value) = header_value(&format_http_date(stat.modified)) {
                headers.insert(header::LAST_MODIFIED, value);
            }
        }

        headers
    }

    /// Decide which bytes of the file to send.
    fn plan(
        &self,
        request: &FileRequest,
        headers: &HeaderMap,
        size: u64,
    ) -> Result<BodyPlan, HttpError> {
        let range = match request.headers.get(header::RANGE) {
            Some(range) if self.options.accept_ranges => range,
            _ => return Ok(BodyPlan::full(size)),
        };

        if !is_range_fresh(&request.headers, headers) {
            return Ok(BodyPlan::full(size));
        }

        let range = range
            .to_str()
            .map_err(|_| HttpError::BadRequest("malformed Range header"))?;

        match parse_range(size, range) {
            RangeOutcome::Ranges(ranges) => {
                let content_type = headers
                    .get(header::CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("application/octet-stream");

                Ok(BodyPlan::partial(
                    &ranges,
                    size,
                    content_type,
                    &generate_boundary(),
                ))
            }
            RangeOutcome::Unsatisfiable => Err(HttpError::RangeNotSatisfiable { size }),
            RangeOutcome::Malformed => Err(HttpError::BadRequest("malformed Range header")),
        }
    }

    /// Whether `path`, with links resolved, still lies inside the root.
    ///
    /// Paths that cannot be resolved pass; the stat that follows rejects them.
    async fn is_contained(&self, path: &Path) -> bool {
        let fs = &self.options.fs;
        match (fs.real_path(path).await, fs.real_path(&self.root).await) {
            (Some(real), Some(root)) => real.starts_with(root),
            _ => true,
        }
    }
}

/// `Content-Type` from the file extension, with a charset for text.
fn content_type(path: &Path) -> HeaderValue {
    let Some(mime) = mime_guess::from_path(path).first() else {
        return HeaderValue::from_static("application/octet-stream");
    };

    let textual = mime.type_() == mime_guess::mime::TEXT
        || matches!(mime.subtype().as_str(), "javascript" | "json");

    let value = if textual && mime.get_param(mime_guess::mime::CHARSET).is_none() {
        format!("{}; charset=utf-8", mime.essence_str())
    } else {
        mime.to_string()
    };

    header_value(&value).unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"))
}

/// Copy `extra` into `headers`, replacing every value of a copied name.
fn merge_headers(headers: &mut HeaderMap, extra: &HeaderMap) {
    for name in extra.keys() {
        headers.remove(name);
        for value in extra.get_all(name) {
            headers.append(name.clone(), value.clone());
        }
    }
}

fn header_value(value: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(value).ok()
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
