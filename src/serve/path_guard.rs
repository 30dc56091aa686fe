//! Path traversal guard
//!
//! Every path derived from request input is resolved lexically against its
//! containing directory and then checked with [`is_outside`] before anything
//! touches the filesystem.

use std::path::{Component, Path, PathBuf};

/// Join `relative` onto `root` and collapse `.` and `..` segments.
///
/// Leading `/` or drive prefixes in `relative` are ignored so a request path
/// like `/docs/a.txt` lands under `root`. The result may still point outside
/// `root` when `relative` climbs with `..`; callers check with [`is_outside`].
pub fn resolve(root: &Path, relative: &str) -> PathBuf {
    let mut resolved = normalize(root);
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::ParentDir => {
                resolved.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    resolved
}

/// Whether `candidate` lies outside `containing`.
///
/// Comparison is segment-wise, so `/www/public-evil` is outside `/www/pub`.
pub fn is_outside(candidate: &Path, containing: &Path) -> bool {
    !normalize(candidate).starts_with(normalize(containing))
}

/// Lexically collapse `.` and `..` without consulting the filesystem
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

/// Make `root` absolute against the working directory and normalize it
pub fn absolute_root(root: &Path) -> std::io::Result<PathBuf> {
    if root.is_absolute() {
        Ok(normalize(root))
    } else {
        Ok(normalize(&std::env::current_dir()?.join(root)))
    }
}
