//! File resolution capability.
//!
//! Templates, layouts and stylesheets name their sources by relative path.
//! How a path maps to bytes (a development checkout, a packaged bundle,
//! assets compiled into the binary) is decided by the injected resolver.

use crate::error::MailerError;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
};

/// Reads template assets by relative path
pub trait FileResolver: Send + Sync {
    fn read(&self, path: &str) -> Result<String, MailerError>;
}

/// Resolves paths against a root directory on disk
#[derive(Debug, Clone)]
pub struct FsResolver {
    root: PathBuf,
}

impl FsResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a relative asset path
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl FileResolver for FsResolver {
    fn read(&self, path: &str) -> Result<String, MailerError> {
        let file = self.resolve(path);
        fs::read_to_string(&file)
            .map_err(|e| MailerError::source_unavailable(file.display().to_string(), e.to_string()))
    }
}

/// In-memory assets, for embedded templates and tests
#[derive(Debug, Default)]
pub struct MemoryResolver {
    files: RwLock<HashMap<String, String>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, builder style
    pub fn with_file(self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    /// Add or replace a file
    pub fn insert(&self, path: impl Into<String>, content: impl Into<String>) {
        if let Ok(mut files) = self.files.write() {
            files.insert(path.into(), content.into());
        }
    }

    pub fn remove(&self, path: &str) {
        if let Ok(mut files) = self.files.write() {
            files.remove(path);
        }
    }
}

impl FileResolver for MemoryResolver {
    fn read(&self, path: &str) -> Result<String, MailerError> {
        let files = self
            .files
            .read()
            .map_err(|_| MailerError::source_unavailable(path, "resolver lock poisoned"))?;

        files
            .get(path)
            .cloned()
            .ok_or_else(|| MailerError::source_unavailable(path, "no such file"))
    }
}
