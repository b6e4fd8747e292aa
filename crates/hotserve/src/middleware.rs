//! axum middleware entry points.
//!
//! [`dev`] serves build output and passes everything else on; [`hot`] takes
//! over websocket upgrades on the socket path. Both are installed by
//! [`DevServer::layer`](crate::DevServer::layer).

use crate::error::HttpError;
use crate::hot::ConnectionHub;
use crate::http::decode_path;
use crate::server::DevServer;
use crate::service::FileRequest;
use axum::extract::{Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

/// Serve build output for GET and HEAD requests.
///
/// Requests arriving before the first build completes wait for it.
pub async fn dev(State(server): State<DevServer>, request: Request, next: Next) -> Response {
    let file_request = match file_request(&request) {
        Ok(Some(file_request)) => file_request,
        Ok(None) => return next.run(request).await,
        Err(e) => return e.into_response(),
    };

    match respond(&server, &file_request).await {
        Ok(Some(response)) => response,
        Ok(None) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

/// Complete websocket upgrades for the status socket.
pub async fn hot(State(hub): State<ConnectionHub>, request: Request, next: Next) -> Response {
    match hub.upgrade(request).await {
        Ok(response) => response,
        Err(request) => next.run(request).await,
    }
}

/// Decode the request into a [`FileRequest`], or `None` for methods that
/// are never served.
fn file_request(request: &Request) -> Result<Option<FileRequest>, HttpError> {
    let path = decode_path(request.uri().path())?;

    if request.method() != Method::GET && request.method() != Method::HEAD {
        return Ok(None);
    }

    Ok(Some(FileRequest {
        method: request.method().clone(),
        path: path.into_owned(),
        headers: request.headers().clone(),
    }))
}

async fn respond(
    server: &DevServer,
    request: &FileRequest,
) -> Result<Option<Response>, HttpError> {
    let stats = match server.tracker().current() {
        Some(stats) => stats,
        None => {
            tracing::info!(path = %request.path, "wait until bundle finished: {}", request.path);
            match server.tracker().wait_ready().await {
                Some(stats) => stats,
                None => return Ok(None),
            }
        }
    };

    server.router().respond(&stats, request).await
}
