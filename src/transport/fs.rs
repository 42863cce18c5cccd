use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use walkdir::WalkDir;

use crate::collection::CollectionItem;
use crate::constants::reference::SEPARATOR;
use crate::delegating::{DelegatingCollection, Resolver};
use crate::errors::CollectionError;
use crate::reference::{Reference, direct_references};

type Decoder<T> = Arc<dyn Fn(&Path, Vec<u8>) -> Result<T, CollectionError> + Send + Sync>;

/// Resolver reading items from files under a root directory.
///
/// Keys are root-relative paths joined with `/`; each file's bytes are handed
/// to a decode function.
pub struct FileResolver<T> {
    root: PathBuf,
    follow_links: bool,
    decode: Decoder<T>,
}

impl<T> Clone for FileResolver<T> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            follow_links: self.follow_links,
            decode: self.decode.clone(),
        }
    }
}

impl<T: CollectionItem> FileResolver<T> {
    /// Create a resolver rooted at `root`.
    pub fn new<F>(root: impl Into<PathBuf>, decode: F) -> Self
    where
        F: Fn(&Path, Vec<u8>) -> Result<T, CollectionError> + Send + Sync + 'static,
    {
        Self {
            root: root.into(),
            follow_links: false,
            decode: Arc::new(decode),
        }
    }

    /// Configure symlink traversal.
    pub fn with_follow_symlinks(mut self, follow_links: bool) -> Self {
        self.follow_links = follow_links;
        self
    }

    /// Root directory keys are relative to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Keys of every file under the root, in sorted order.
    pub fn list_references(&self) -> Result<Vec<Reference>, CollectionError> {
        let mut walker = WalkDir::new(&self.root);
        if self.follow_links {
            walker = walker.follow_links(true);
        }
        let mut keys = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|err| {
                CollectionError::Io(
                    err.into_io_error()
                        .unwrap_or_else(|| io::Error::other("directory walk failed")),
                )
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            match relative_key(relative) {
                Some(key) => keys.push(key),
                None => warn!(
                    path = %entry.path().display(),
                    "skipping file whose path is not valid UTF-8"
                ),
            }
        }
        keys.sort();
        Ok(direct_references(keys))
    }

    /// Collection over every file currently under the root.
    pub fn into_collection(self) -> Result<DelegatingCollection<T>, CollectionError> {
        let references = self.list_references()?;
        Ok(DelegatingCollection::new(references, self))
    }

    fn path_for(&self, key: &str) -> Option<PathBuf> {
        let relative = Path::new(key);
        let contained = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        contained.then(|| self.root.join(relative))
    }
}

fn relative_key(relative: &Path) -> Option<String> {
    let parts: Option<Vec<&str>> = relative
        .components()
        .map(|component| match component {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();
    parts.map(|parts| parts.join(SEPARATOR))
}

impl<T: CollectionItem> Resolver<T> for FileResolver<T> {
    fn resolve(&self, key: &str) -> Result<T, CollectionError> {
        let reference = Reference::direct(key);
        let path = self
            .path_for(key)
            .ok_or_else(|| CollectionError::not_found(&reference))?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(CollectionError::not_found(&reference));
            }
            Err(err) => return Err(err.into()),
        };
        (self.decode)(&path, bytes)
    }
}

/// Decoder yielding file contents as UTF-8 text.
pub fn utf8_text(path: &Path, bytes: Vec<u8>) -> Result<String, CollectionError> {
    String::from_utf8(bytes).map_err(|err| CollectionError::Resolver {
        reference: Reference::direct(path.to_string_lossy()),
        reason: err.to_string(),
    })
}
