use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::LoadError;

/// Source text for one logical path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedFile {
    /// Where the content came from: a filesystem path, a URI, or the logical
    /// path itself for in-memory sources.
    pub absolute_path: String,
    pub content: String,
}

/// Where source text comes from.
///
/// `load` returns `Ok(None)` when the path simply does not exist, and an
/// error only when it exists but cannot be read.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, path: &str) -> Result<Option<LoadedFile>, LoadError>;
}

#[async_trait]
impl<L: Loader + ?Sized> Loader for Arc<L> {
    async fn load(&self, path: &str) -> Result<Option<LoadedFile>, LoadError> {
        (**self).load(path).await
    }
}

/// In-memory sources keyed by logical path, e.g. an editor's open buffers.
#[derive(Default)]
pub struct MemoryLoader {
    inner: RwLock<HashMap<String, String>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let loader = Self::new();
        for (path, content) in files {
            loader.insert(path, content);
        }
        loader
    }

    /// Add or replace a file. Returns the previous content.
    pub fn insert(&self, path: impl Into<String>, content: impl Into<String>) -> Option<String> {
        let mut files = self.inner.write().unwrap_or_else(|e| e.into_inner());
        files.insert(path.into(), content.into())
    }

    pub fn remove(&self, path: &str) -> Option<String> {
        let mut files = self.inner.write().unwrap_or_else(|e| e.into_inner());
        files.remove(path)
    }
}

#[async_trait]
impl Loader for MemoryLoader {
    async fn load(&self, path: &str) -> Result<Option<LoadedFile>, LoadError> {
        let files = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(files.get(path).map(|content| LoadedFile {
            absolute_path: path.to_string(),
            content: content.clone(),
        }))
    }
}

/// Reads files relative to a list of include roots; the first root holding
/// the path wins.
#[derive(Debug, Clone, Default)]
pub struct FsLoader {
    roots: Vec<PathBuf>,
}

impl FsLoader {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        FsLoader {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

#[async_trait]
impl Loader for FsLoader {
    async fn load(&self, path: &str) -> Result<Option<LoadedFile>, LoadError> {
        for root in &self.roots {
            let candidate = root.join(path);
            let bytes = match tokio::fs::read(&candidate).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(source) => {
                    return Err(LoadError::Io {
                        path: candidate.display().to_string(),
                        source,
                    })
                }
            };
            let absolute_path = candidate.display().to_string();
            let content = String::from_utf8(bytes).map_err(|_| LoadError::InvalidUtf8 {
                path: absolute_path.clone(),
            })?;
            tracing::debug!(path, absolute_path = %absolute_path, "loaded file");
            return Ok(Some(LoadedFile {
                absolute_path,
                content,
            }));
        }
        Ok(None)
    }
}

/// Tries each loader in order; the first one that has the path wins.
#[derive(Default)]
pub struct ChainLoader {
    loaders: Vec<Arc<dyn Loader>>,
}

impl ChainLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, loader: impl Loader + 'static) -> Self {
        self.loaders.push(Arc::new(loader));
        self
    }

    pub fn push(&mut self, loader: Arc<dyn Loader>) {
        self.loaders.push(loader);
    }
}

#[async_trait]
impl Loader for ChainLoader {
    async fn load(&self, path: &str) -> Result<Option<LoadedFile>, LoadError> {
        for loader in &self.loaders {
            if let Some(file) = loader.load(path).await? {
                return Ok(Some(file));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_memory_loader() {
        let loader = MemoryLoader::with_files([("a.proto", "syntax = \"proto3\";")]);
        let file = loader.load("a.proto").await.unwrap().unwrap();
        assert_eq!(file.absolute_path, "a.proto");
        assert_eq!(loader.load("missing.proto").await.unwrap(), None);

        assert!(loader.insert("a.proto", "").is_some());
        assert_eq!(loader.load("a.proto").await.unwrap().unwrap().content, "");
        loader.remove("a.proto");
        assert_eq!(loader.load("a.proto").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fs_loader_first_root_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(second.path().join("pkg")).unwrap();
        std::fs::write(second.path().join("pkg/b.proto"), "// second").unwrap();
        std::fs::write(first.path().join("only.proto"), "// first").unwrap();

        let loader = FsLoader::new([first.path(), second.path()]);
        let b = loader.load("pkg/b.proto").await.unwrap().unwrap();
        assert_eq!(b.content, "// second");
        assert!(b.absolute_path.ends_with("b.proto"));
        assert_eq!(loader.load("only.proto").await.unwrap().unwrap().content, "// first");
        assert_eq!(loader.load("nope.proto").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fs_loader_rejects_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.proto"), [0xff, 0xfe]).unwrap();
        let loader = FsLoader::new([dir.path()]);
        let err = loader.load("bad.proto").await.unwrap_err();
        assert!(matches!(err, LoadError::InvalidUtf8 { .. }));
    }

    #[tokio::test]
    async fn test_chain_loader_order() {
        let chain = ChainLoader::new()
            .with(MemoryLoader::with_files([("a.proto", "first")]))
            .with(MemoryLoader::with_files([("a.proto", "second"), ("b.proto", "b")]));
        assert_eq!(chain.load("a.proto").await.unwrap().unwrap().content, "first");
        assert_eq!(chain.load("b.proto").await.unwrap().unwrap().content, "b");
        assert_eq!(chain.load("c.proto").await.unwrap(), None);
    }
}
