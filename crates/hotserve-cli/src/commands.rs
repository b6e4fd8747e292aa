//! Command implementations.

use crate::cli::ServeArgs;
use crate::config::HotserveConfig;
use crate::error::{CliError, Result};
use crate::watcher::DirectoryCompiler;
use axum::Router;
use axum::http::StatusCode;
use hotserve::{DevServer, DevServerOptions, NativeFs, TargetConfig};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

/// Serve a directory until interrupted.
pub async fn serve_execute(args: ServeArgs, config_path: Option<&Path>) -> Result<()> {
    let config = HotserveConfig::load(&args, config_path)?;

    let root = args
        .dir
        .canonicalize()
        .map_err(|_| CliError::DirectoryNotFound(args.dir.clone()))?;
    if !root.is_dir() {
        return Err(CliError::DirectoryNotFound(args.dir));
    }

    let (server, app) = dev_server(&root, &config)?;
    let addr = config.addr()?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| CliError::Server(format!("Failed to bind to {addr}: {e}")))?;

    tracing::info!(
        root = %root.display(),
        "Development server running at http://{}",
        addr
    );

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CliError::Server(format!("Server error: {e}")));

    server.close();
    result
}

/// Build the dev server for `root` and the router it is installed on.
pub fn dev_server(root: &Path, config: &HotserveConfig) -> Result<(DevServer, Router)> {
    let mut target = TargetConfig::new(root).with_name(
        root.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| hotserve::PLUGIN_NAME.to_string()),
    );
    if let Some(public_path) = &config.public_path {
        target = target.with_public_path(public_path.clone());
    }

    let compiler = Arc::new(DirectoryCompiler::new(
        target,
        Duration::from_millis(config.debounce_ms),
    ));
    let options =
        DevServerOptions::new(config.server.clone()).with_fs(Arc::new(NativeFs::new()));
    let server = DevServer::new(compiler, options)?;

    let app = server
        .layer(Router::new().fallback(|| async { StatusCode::NOT_FOUND }))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    Ok((server, app))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("unable to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
