//! Build output to file service mapping.
//!
//! Every target of a build contributes one [`MountedService`]: its output
//! directory served under its public path. The list is computed once per
//! build generation and reused until the next invalidation.

use crate::build::{BuildListener, BuildResult, TargetConfig};
use crate::error::HttpError;
use crate::service::{FileRequest, FileService, ServiceOptions};
use axum::response::Response;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

/// Base used to strip scheme and host from absolute public paths.
const PUBLIC_PATH_BASE: &str = "https://127.0.0.1/";

/// A file service and the URL prefix it answers under.
#[derive(Debug, Clone)]
pub struct MountedService {
    pub public_path: String,
    pub service: FileService,
}

type Generation = (Arc<BuildResult>, Arc<Vec<MountedService>>);

/// Resolves requests against the output of the current build generation.
#[derive(Debug)]
pub struct OutputRouter {
    options: ServiceOptions,
    cache: Mutex<Option<Generation>>,
}

impl OutputRouter {
    pub fn new(options: ServiceOptions) -> Self {
        Self {
            options,
            cache: Mutex::new(None),
        }
    }

    /// Services for `stats`, in target declaration order.
    ///
    /// Memoized by the identity of `stats`: a new build always produces a
    /// new result, so a pointer comparison detects a new generation.
    pub fn resolve(&self, stats: &Arc<BuildResult>) -> Arc<Vec<MountedService>> {
        let mut cache = self.cache.lock();
        if let Some((cached, services)) = cache.as_ref() {
            if Arc::ptr_eq(cached, stats) {
                return Arc::clone(services);
            }
        }

        let hash = stats.hash();
        let services: Arc<Vec<MountedService>> = Arc::new(
            stats
                .targets()
                .iter()
                .map(|child| MountedService {
                    public_path: public_path(&child.target, &hash),
                    service: FileService::new(
                        output_path(&child.target, &hash),
                        self.options.clone(),
                    ),
                })
                .collect(),
        );

        *cache = Some((Arc::clone(stats), Arc::clone(&services)));
        services
    }

    /// Try each service in order until one handles the request.
    pub async fn respond(
        &self,
        stats: &Arc<BuildResult>,
        request: &FileRequest,
    ) -> Result<Option<Response>, HttpError> {
        let services = self.resolve(stats);

        for mounted in services.iter() {
            if let Some(response) = mounted.service.respond(request, &mounted.public_path).await? {
                return Ok(Some(response));
            }
        }

        Ok(None)
    }

    /// Drop the cached mapping.
    pub fn clear(&self) {
        self.cache.lock().take();
    }

    pub fn is_cached(&self) -> bool {
        self.cache.lock().is_some()
    }
}

impl BuildListener for OutputRouter {
    fn on_invalid(&self, _path: Option<&str>, _timestamp: i64) {
        self.clear();
    }
}

/// URL prefix a target's output is served under.
///
/// `"auto"` serves from `/`. Anything else has its `[hash]` placeholders
/// expanded and is reduced to its path component, so a CDN URL such as
/// `https://cdn.example.com/assets/` serves under `/assets/`.
pub fn public_path(target: &TargetConfig, hash: &str) -> String {
    let configured = target.output.public_path.as_deref().unwrap_or("");
    if configured == "auto" {
        return "/".to_string();
    }

    let expanded = expand_template(configured, hash);
    url::Url::parse(PUBLIC_PATH_BASE)
        .and_then(|base| base.join(&expanded))
        .map(|url| {
            urlencoding::decode(url.path())
                .map(|path| path.into_owned())
                .unwrap_or_else(|_| url.path().to_string())
        })
        .unwrap_or_else(|_| "/".to_string())
}

/// Directory a target's output is read from.
pub fn output_path(target: &TargetConfig, hash: &str) -> PathBuf {
    match target.output.path.to_str() {
        Some(path) if path.contains('[') => PathBuf::from(expand_template(path, hash)),
        _ => target.output.path.clone(),
    }
}

fn expand_template(template: &str, hash: &str) -> String {
    template
        .replace("[fullhash]", hash)
        .replace("[hash]", hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::Stats;
    use crate::fs::MemoryFs;
    use axum::http::StatusCode;

    fn stats(target: TargetConfig, hash: &str) -> Stats {
        Stats {
            target,
            hash: hash.to_string(),
            built_at: None,
            time: None,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn target(output: &str, public: Option<&str>) -> TargetConfig {
        let target = TargetConfig::new(output);
        match public {
            Some(public) => target.with_public_path(public),
            None => target,
        }
    }

    #[test]
    fn test_public_path_forms() {
        assert_eq!(public_path(&target("/out", Some("auto")), "h"), "/");
        assert_eq!(public_path(&target("/out", None), "h"), "/");
        assert_eq!(public_path(&target("/out", Some("")), "h"), "/");
        assert_eq!(public_path(&target("/out", Some("/static/")), "h"), "/static/");
        assert_eq!(public_path(&target("/out", Some("static/")), "h"), "/static/");
        assert_eq!(
            public_path(&target("/out", Some("https://cdn.example.com/assets/")), "h"),
            "/assets/"
        );
        assert_eq!(
            public_path(&target("/out", Some("//cdn.example.com/lib/")), "h"),
            "/lib/"
        );
    }

    #[test]
    fn test_public_path_template() {
        assert_eq!(
            public_path(&target("/out", Some("/build/[hash]/")), "abc"),
            "/build/abc/"
        );
        assert_eq!(
            public_path(&target("/out", Some("/[fullhash]/")), "abc"),
            "/abc/"
        );
    }

    #[test]
    fn test_public_path_is_decoded() {
        assert_eq!(
            public_path(&target("/out", Some("/my assets/")), "h"),
            "/my assets/"
        );
    }

    #[test]
    fn test_output_path_template() {
        assert_eq!(
            output_path(&target("/out/[hash]", None), "abc"),
            PathBuf::from("/out/abc")
        );
        assert_eq!(output_path(&target("/out", None), "abc"), PathBuf::from("/out"));
    }

    #[test]
    fn test_resolve_keeps_target_order() {
        let router = OutputRouter::new(ServiceOptions::new(Arc::new(MemoryFs::new())));
        let result = Arc::new(BuildResult::Aggregate(vec![
            stats(target("/out/web", Some("/web/")), "1"),
            stats(target("/out/admin", Some("auto")), "2"),
        ]));

        let services = router.resolve(&result);
        let mapping: Vec<_> = services
            .iter()
            .map(|m| (m.public_path.as_str(), m.service.root().to_path_buf()))
            .collect();
        assert_eq!(
            mapping,
            vec![
                ("/web/", PathBuf::from("/out/web")),
                ("/", PathBuf::from("/out/admin")),
            ]
        );
    }

    #[test]
    fn test_resolve_is_memoized_per_generation() {
        let router = OutputRouter::new(ServiceOptions::new(Arc::new(MemoryFs::new())));
        let first = Arc::new(BuildResult::Single(stats(target("/out", None), "1")));

        let a = router.resolve(&first);
        let b = router.resolve(&first);
        assert!(Arc::ptr_eq(&a, &b));

        // Equal content, different generation
        let second = Arc::new((*first).clone());
        let c = router.resolve(&second);
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_invalid_clears_cache() {
        let router = OutputRouter::new(ServiceOptions::new(Arc::new(MemoryFs::new())));
        let result = Arc::new(BuildResult::Single(stats(target("/out", None), "1")));

        router.resolve(&result);
        assert!(router.is_cached());

        router.on_invalid(None, 0);
        assert!(!router.is_cached());
    }

    #[tokio::test]
    async fn test_respond_tries_services_in_order() {
        let fs = MemoryFs::new();
        fs.insert("/out/web/app.js", b"web".to_vec());
        fs.insert("/out/admin/app.js", b"admin".to_vec());
        fs.insert("/out/admin/only-admin.js", b"admin only".to_vec());

        let router = OutputRouter::new(ServiceOptions::new(Arc::new(fs)));
        let result = Arc::new(BuildResult::Aggregate(vec![
            stats(target("/out/web", Some("/")), "1"),
            stats(target("/out/admin", Some("/")), "2"),
        ]));

        let response = router
            .respond(&result, &FileRequest::get("/app.js"))
            .await
            .unwrap()
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"web");

        let response = router
            .respond(&result, &FileRequest::get("/only-admin.js"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        assert!(
            router
                .respond(&result, &FileRequest::get("/nope.js"))
                .await
                .unwrap()
                .is_none()
        );
    }
}
