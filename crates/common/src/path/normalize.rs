// Path canonicalization: slash-separated repo-relative paths, traversal rejection.

use std::path::{Component, Path};

use thiserror::Error;

/// Maximum allowed path length in characters.
const MAX_PATH_CHARS: usize = 4096;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path exceeds maximum length of {MAX_PATH_CHARS} characters")]
    TooLong,

    #[error("path contains directory traversal component: {0}")]
    Traversal(String),

    #[error("path contains null byte")]
    NullByte,

    #[error("path is not valid UTF-8: {0}")]
    NonUtf8(String),

    #[error("path {path} is outside {root}")]
    OutsideRoot { path: String, root: String },
}

/// Normalize a relative path to the form git prints in porcelain output.
///
/// Rules:
/// - Convert all separators to `/`
/// - Collapse consecutive `/` into one
/// - Strip leading and trailing `/`
/// - Reject `.` and `..` path components (traversal)
/// - Reject null bytes and empty paths
pub fn normalize_path(input: &str) -> Result<String, PathError> {
    if input.is_empty() {
        return Err(PathError::Empty);
    }

    if input.contains('\0') {
        return Err(PathError::NullByte);
    }

    let unified = input.replace('\\', "/");
    let components: Vec<&str> = unified.split('/').filter(|s| !s.is_empty()).collect();

    if components.is_empty() {
        return Err(PathError::Empty);
    }

    for component in &components {
        if *component == "." || *component == ".." {
            return Err(PathError::Traversal((*component).to_string()));
        }
    }

    let result = components.join("/");

    if result.chars().count() > MAX_PATH_CHARS {
        return Err(PathError::TooLong);
    }

    Ok(result)
}

/// Express `path` relative to `root` as a normalized slash path.
///
/// Both paths are compared component-wise without touching the
/// filesystem, so callers should canonicalize the root once up front.
pub fn relative_slash_path(path: &Path, root: &Path) -> Result<String, PathError> {
    let outside = || PathError::OutsideRoot {
        path: path.display().to_string(),
        root: root.display().to_string(),
    };

    let relative = path.strip_prefix(root).map_err(|_| outside())?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| PathError::NonUtf8(path.display().to_string()))?;
                parts.push(part);
            }
            Component::CurDir => {}
            Component::ParentDir => return Err(PathError::Traversal("..".to_string())),
            Component::RootDir | Component::Prefix(_) => return Err(outside()),
        }
    }

    normalize_path(&parts.join("/"))
}
