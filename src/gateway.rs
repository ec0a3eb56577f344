// SPDX-License-Identifier: GPL-3.0-only

//! Typed read/write of kernel control files (§4.1). All paths passed to a
//! [`Gateway`] are relative to an optional root prefix, so the exact same
//! driver code runs against `/sys` on a real machine or against a
//! `tempfile::TempDir` mocking a sysfs tree in tests.

use crate::errors::GatewayError;
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Clone, Debug, Default)]
pub struct Gateway {
    root: Option<PathBuf>,
}

impl Gateway {
    /// A gateway that operates directly on the real filesystem.
    pub fn new() -> Self { Self { root: None } }

    /// A gateway confined to `root`, for tests.
    pub fn rooted(root: impl Into<PathBuf>) -> Self { Self { root: Some(root.into()) } }

    fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        match &self.root {
            Some(root) => {
                let relative = path.strip_prefix("/").unwrap_or(path);
                root.join(relative)
            }
            None => path.to_path_buf(),
        }
    }

    /// Reads `path`, stripping a single trailing newline if present.
    pub fn read(&self, path: impl AsRef<Path>) -> Result<String, GatewayError> {
        let resolved = self.resolve(&path);
        let mut contents = fs::read_to_string(&resolved).map_err(|source| GatewayError::Read {
            path: path.as_ref().to_path_buf(),
            kind: (&source).into(),
            source,
        })?;

        if contents.ends_with('\n') {
            contents.pop();
        }

        Ok(contents)
    }

    /// Writes `value` to `path` verbatim; no trailing newline is added.
    pub fn write(&self, path: impl AsRef<Path>, value: impl AsRef<[u8]>) -> Result<(), GatewayError> {
        let resolved = self.resolve(&path);
        fs::write(&resolved, value).map_err(|source| GatewayError::Write {
            path: path.as_ref().to_path_buf(),
            kind: (&source).into(),
            source,
        })
    }

    /// True if `path` exists under this gateway's root.
    pub fn exists(&self, path: impl AsRef<Path>) -> bool { self.resolve(&path).exists() }

    /// Lists the entries of a directory, returning their file names only.
    pub fn read_dir(&self, path: impl AsRef<Path>) -> Result<Vec<String>, GatewayError> {
        let resolved = self.resolve(&path);
        let entries = fs::read_dir(&resolved).map_err(|source| GatewayError::Read {
            path: path.as_ref().to_path_buf(),
            kind: (&source).into(),
            source,
        })?;

        let mut names = Vec::new();
        for entry in entries.flatten() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// The real filesystem path a logical path resolves to, e.g. for handing
    /// to the file-change watcher.
    pub fn resolved_path(&self, path: impl AsRef<Path>) -> PathBuf { self.resolve(path) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_single_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("value"), "active\n").unwrap();
        let gw = Gateway::rooted(dir.path());
        assert_eq!(gw.read("/value").unwrap(), "active");
    }

    #[test]
    fn write_does_not_add_newline() {
        let dir = tempfile::tempdir().unwrap();
        let gw = Gateway::rooted(dir.path());
        gw.write("/value", "performance").unwrap();
        assert_eq!(std::fs::read(dir.path().join("value")).unwrap(), b"performance");
    }

    #[test]
    fn classifies_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let gw = Gateway::rooted(dir.path());
        let err = gw.read("/missing").unwrap_err();
        assert_eq!(err.kind(), crate::errors::IoErrorKind::NotFound);
    }

    #[test]
    fn write_to_read_only_file_is_permission_denied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ro");
        std::fs::write(&path, "x").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&path, perms).unwrap();

        let gw = Gateway::rooted(dir.path());
        let err = gw.write("/ro", "y").unwrap_err();
        assert_eq!(err.kind(), crate::errors::IoErrorKind::PermissionDenied);
    }
}
