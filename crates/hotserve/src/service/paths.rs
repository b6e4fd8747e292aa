//! Mapping request paths onto a service root.

use path_clean::PathClean;
use std::path::{Path, PathBuf};

/// Resolve the file `pathname` names under `root`.
///
/// `pathname` must already be percent-decoded. Returns `None` when it is
/// outside `public_path`, or when the normalized result escapes `root`.
/// Containment is checked component-wise, so `/out-evil` is not inside
/// `/out`.
pub fn resolve(root: &Path, pathname: &str, public_path: &str) -> Option<PathBuf> {
    let relative = pathname.strip_prefix(public_path)?;
    let relative = relative.trim_start_matches(['/', '\\']);

    let resolved = root.join(relative).clean();
    resolved.starts_with(root).then_some(resolved)
}

/// Whether a request path names a directory-style location.
pub fn has_trailing_slash(pathname: &str) -> bool {
    pathname.ends_with('/') || pathname.ends_with('\\')
}
