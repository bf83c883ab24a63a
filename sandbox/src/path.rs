use std::path::{Component, Path, PathBuf};

use crate::errors::{Result, SandboxError};

pub fn ensure_absolute_root(root: &Path) -> Result<PathBuf> {
    if root.is_relative() {
        return Err(SandboxError::InvalidConfig(format!(
            "sandbox root '{}' must be absolute",
            root.display()
        )));
    }
    Ok(root.to_path_buf())
}

/// Joins a client supplied relative name onto `root`, refusing anything that
/// could land outside of it.
pub fn resolve(root: &Path, name: &str) -> Result<PathBuf> {
    let relative = Path::new(name);
    if name.is_empty() || relative.components().count() == 0 {
        return Err(SandboxError::PathTraversal(name.to_string()));
    }
    if relative.is_absolute() {
        return Err(SandboxError::OutsideRoot(name.to_string()));
    }

    let mut clean = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::CurDir => continue,
            Component::Normal(part) => clean.push(part),
            Component::ParentDir => return Err(SandboxError::PathTraversal(name.to_string())),
            Component::RootDir | Component::Prefix(_) => {
                return Err(SandboxError::OutsideRoot(name.to_string()))
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(SandboxError::PathTraversal(name.to_string()));
    }

    let resolved = root.join(clean);
    if !resolved.starts_with(root) {
        return Err(SandboxError::OutsideRoot(name.to_string()));
    }
    Ok(resolved)
}
