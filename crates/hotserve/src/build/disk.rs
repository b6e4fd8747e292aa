//! Mirror emitted assets onto the real disk.
//!
//! Build output normally lives only in the output filesystem (in memory by
//! default). Tools that need the files on disk can opt in with
//! [`WriteToDisk`]; failures are logged and never fail the build.

use super::{BuildListener, EmittedAsset, TargetConfig};
use std::path::Path;
use std::sync::Arc;

/// Predicate over an asset's absolute target path.
pub type WriteFilter = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

/// Which emitted assets are written to disk.
#[derive(Clone, Default)]
pub enum WriteToDisk {
    #[default]
    Disabled,
    All,
    Filter(WriteFilter),
}

impl WriteToDisk {
    pub fn allows(&self, target_path: &Path) -> bool {
        match self {
            WriteToDisk::Disabled => false,
            WriteToDisk::All => true,
            WriteToDisk::Filter(filter) => filter(target_path),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, WriteToDisk::Disabled)
    }
}

impl From<bool> for WriteToDisk {
    fn from(enabled: bool) -> Self {
        if enabled {
            WriteToDisk::All
        } else {
            WriteToDisk::Disabled
        }
    }
}

impl std::fmt::Debug for WriteToDisk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteToDisk::Disabled => f.write_str("Disabled"),
            WriteToDisk::All => f.write_str("All"),
            WriteToDisk::Filter(_) => f.write_str("Filter(..)"),
        }
    }
}

/// Build listener that writes accepted assets to the native filesystem.
#[derive(Debug, Clone)]
pub struct DiskWriter {
    targets: Arc<[TargetConfig]>,
    filter: WriteToDisk,
}

impl DiskWriter {
    pub fn new(targets: Vec<TargetConfig>, filter: WriteToDisk) -> Self {
        Self {
            targets: targets.into(),
            filter,
        }
    }

    /// Write one asset, creating its parent directory first.
    ///
    /// Returns whether the asset was written.
    pub async fn write(&self, asset: &EmittedAsset) -> bool {
        if !self.filter.allows(&asset.target_path) {
            return false;
        }

        let prefix = self
            .targets
            .get(asset.target)
            .map(TargetConfig::log_prefix)
            .unwrap_or_default();

        if let Some(dir) = asset.target_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                tracing::error!(
                    path = %dir.display(),
                    "{}unable to write \"{}\" directory to disk:\n{}",
                    prefix,
                    dir.display(),
                    e
                );
                return false;
            }
        }

        match tokio::fs::write(&asset.target_path, &asset.content[..]).await {
            Ok(()) => {
                tracing::debug!(
                    path = %asset.target_path.display(),
                    "{}asset written to disk: \"{}\"",
                    prefix,
                    asset.target_path.display()
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    path = %asset.target_path.display(),
                    "{}unable to write \"{}\" asset to disk:\n{}",
                    prefix,
                    asset.target_path.display(),
                    e
                );
                false
            }
        }
    }
}

impl BuildListener for DiskWriter {
    fn on_asset_emitted(&self, asset: &EmittedAsset) {
        if !self.filter.allows(&asset.target_path) {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let writer = self.clone();
                let asset = asset.clone();
                handle.spawn(async move {
                    writer.write(&asset).await;
                });
            }
            Err(_) => tracing::error!(
                path = %asset.target_path.display(),
                "no async runtime available to write asset to disk"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn asset(path: PathBuf, content: &[u8]) -> EmittedAsset {
        EmittedAsset {
            target: 0,
            target_path: path,
            content: content.into(),
        }
    }

    #[test]
    fn test_write_to_disk_filters() {
        assert!(!WriteToDisk::Disabled.allows(Path::new("/a.js")));
        assert!(WriteToDisk::All.allows(Path::new("/a.js")));
        assert!(WriteToDisk::from(true).is_enabled());
        assert!(!WriteToDisk::from(false).is_enabled());

        let only_html = WriteToDisk::Filter(Arc::new(|path: &Path| {
            path.extension().is_some_and(|ext| ext == "html")
        }));
        assert!(only_html.allows(Path::new("/out/index.html")));
        assert!(!only_html.allows(Path::new("/out/app.js")));
    }

    #[tokio::test]
    async fn test_writes_with_parent_directories() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("nested/dir/app.js");
        let writer = DiskWriter::new(vec![TargetConfig::new(temp.path())], WriteToDisk::All);

        assert!(writer.write(&asset(target.clone(), b"let a = 1;")).await);
        assert_eq!(std::fs::read(&target).unwrap(), b"let a = 1;");
    }

    #[tokio::test]
    async fn test_rejected_assets_are_not_written() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("app.js");
        let writer = DiskWriter::new(
            vec![TargetConfig::new(temp.path())],
            WriteToDisk::Filter(Arc::new(|_: &Path| false)),
        );

        assert!(!writer.write(&asset(target.clone(), b"x")).await);
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_write_failure_is_reported_not_raised() {
        let temp = TempDir::new().unwrap();
        // A file where a directory is expected
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();

        let writer = DiskWriter::new(
            vec![TargetConfig::new(temp.path()).with_name("web")],
            WriteToDisk::All,
        );
        assert!(!writer.write(&asset(blocker.join("app.js"), b"x")).await);
    }
}
