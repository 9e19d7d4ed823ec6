//! File system operations: snapshotting and archiving.

pub mod archiver;
pub mod scanner;

use std::path::Path;

/// `path` relative to `base`, joined with `/` regardless of platform.
///
/// Returns `None` for `base` itself or paths outside it.
pub(crate) fn relative_name(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
