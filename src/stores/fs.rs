//! Filesystem-backed artifact store
//!
//! A local directory stands in for the bucket: object names are paths
//! relative to the root, always `/`-separated. Objects ending in `.gz` are
//! reported as gzip and decompressed on open.

use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{
    compile_glob, content_reader, glob_matches, ArtifactReader, ArtifactStore, ObjectAttrs,
    StorageError,
};
use crate::constants::GZIP_CONTENT_TYPE;

/// Artifact store rooted at a local directory
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, name: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if name.is_empty() || escapes {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn list_objects(
        &self,
        prefix: &str,
        match_glob: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ObjectAttrs>, StorageError> {
        let pattern = match_glob.map(compile_glob).transpose()?;
        let root = self.root.clone();
        let prefix = prefix.to_string();

        let mut names = tokio::task::spawn_blocking(move || list_names(&root, &prefix))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))??;
        names.sort();

        Ok(names
            .into_iter()
            .filter(|name| pattern.as_ref().map_or(true, |p| glob_matches(p, name)))
            .take(limit)
            .map(|name| {
                let content_type = name
                    .ends_with(".gz")
                    .then(|| GZIP_CONTENT_TYPE.to_string());
                ObjectAttrs { name, content_type }
            })
            .collect())
    }

    async fn open_object(&self, attrs: &ObjectAttrs) -> Result<ArtifactReader, StorageError> {
        let path = self.object_path(&attrs.name)?;
        let attrs = attrs.clone();
        tokio::task::spawn_blocking(move || -> Result<ArtifactReader, StorageError> {
            let file = File::open(&path).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => StorageError::NotFound(attrs.name.clone()),
                _ => StorageError::Io(e),
            })?;
            Ok(content_reader(file, &attrs))
        })
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
    }
}

/// Collect every file name under `root` that starts with `prefix`
///
/// Only the directory holding the prefix's last `/` is walked.
fn list_names(root: &Path, prefix: &str) -> Result<Vec<String>, StorageError> {
    let dir_part = match prefix.rfind('/') {
        Some(idx) => &prefix[..idx],
        None => "",
    };
    let start = if dir_part.is_empty() {
        root.to_path_buf()
    } else {
        root.join(dir_part)
    };
    if !start.is_dir() {
        debug!(prefix = %prefix, "listing prefix has no directory");
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    let mut stack = vec![start];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                stack.push(path);
                continue;
            }
            if !file_type.is_file() {
                continue;
            }
            let Some(name) = object_name(root, &path) else {
                continue;
            };
            if name.starts_with(prefix) {
                names.push(name);
            }
        }
    }
    Ok(names)
}

/// `/`-joined path of `path` relative to `root`
fn object_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_path_rejects_escapes() {
        let store = FsArtifactStore::new("/tmp/bucket");
        assert!(store.object_path("logs/../../etc/passwd").is_err());
        assert!(store.object_path("/etc/passwd").is_err());
        assert!(store.object_path("").is_err());
        assert!(store.object_path("logs/job/1/build-log.txt").is_ok());
    }

    #[test]
    fn test_object_name_is_slash_joined() {
        let root = Path::new("/tmp/bucket");
        let path = root.join("logs").join("job").join("file.txt");
        assert_eq!(object_name(root, &path).as_deref(), Some("logs/job/file.txt"));
    }
}
