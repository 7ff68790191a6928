use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("entry name is empty")]
    Empty,
    #[error("entry name {0:?} contains unsupported component")]
    UnsupportedComponent(String),
}

/// Strips the `disk:` scheme the API puts in front of paths it returns and
/// guarantees a single leading slash.
pub fn normalize_remote(path: &str) -> String {
    let trimmed = path.strip_prefix("disk:").unwrap_or(path);
    let trimmed = trimmed.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// A directory level only ever deals with immediate children, so names must
/// be single normal components on both sides.
pub fn validate_entry_name(name: &str) -> Result<(), PathError> {
    if name.is_empty() {
        return Err(PathError::Empty);
    }
    if name.contains('/') || name.contains('\\') {
        return Err(PathError::UnsupportedComponent(name.to_string()));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(PathError::UnsupportedComponent(name.to_string())),
    }
}

pub fn join_remote(parent: &str, name: &str) -> Result<String, PathError> {
    validate_entry_name(name)?;
    let parent = normalize_remote(parent);
    if parent == "/" {
        Ok(format!("/{name}"))
    } else {
        Ok(format!("{parent}/{name}"))
    }
}

pub fn join_local(parent: &Path, name: &str) -> Result<PathBuf, PathError> {
    validate_entry_name(name)?;
    Ok(parent.join(name))
}
