//! Lexical path resolution for diagnostic locations.
//!
//! Compiler output names files relative to the build's working directory.
//! These helpers join and normalize such paths without touching the
//! filesystem, so a diagnostic for a deleted or generated file still
//! resolves to a stable absolute location.

use std::path::{Component, Path, PathBuf};

/// Join `file` onto `working_dir` and fold `.` and `..` components.
///
/// Absolute `file` values replace `working_dir`, matching `Path::join`.
pub fn resolve(working_dir: &Path, file: &Path) -> PathBuf {
    normalize(&working_dir.join(file))
}

/// Fold `.` and `..` components of a path lexically.
///
/// `..` at the root is dropped (`/../a` becomes `/a`); leading `..` in a
/// relative path is preserved since there is nothing to cancel against.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }

    if out.is_empty() {
        return PathBuf::from(".");
    }

    out.iter().collect()
}

/// Whether `path` lies inside `root` once both are normalized.
///
/// `root` itself counts as contained. A root of `.` (or empty) contains
/// every relative path that does not climb out through a leading `..`.
pub fn is_contained(root: &Path, path: &Path) -> bool {
    let root = normalize(root);
    let path = normalize(path);
    if root == Path::new(".") {
        return path.is_relative() && !path.starts_with("..");
    }
    path.starts_with(root)
}
