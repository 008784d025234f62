//! Sync File System View
//!
//! The execution engine is synchronous; [`SyncFs`] is the narrow interface
//! it consumes, and [`SyncFsAdapter`] implements it over the async trait by
//! parking the current task (`block_in_place` + `Handle::block_on`), so the
//! host keeps a fully async `FileSystem` while the interpreter stays simple.

use std::sync::Arc;

use super::types::{
    DirEntry, FileSystem, FsError, FsStat, MkdirOptions, RemoveOptions,
};

pub trait SyncFs {
    fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError>;
    fn write_file(&self, path: &str, content: &[u8]) -> Result<(), FsError>;
    fn append_file(&self, path: &str, content: &[u8]) -> Result<(), FsError>;
    fn exists(&self, path: &str) -> bool;
    fn stat(&self, path: &str) -> Result<FsStat, FsError>;
    fn lstat(&self, path: &str) -> Result<FsStat, FsError>;
    fn readdir(&self, path: &str) -> Result<Vec<DirEntry>, FsError>;
    fn mkdir(&self, path: &str, options: &MkdirOptions) -> Result<(), FsError>;
    fn remove(&self, path: &str, options: &RemoveOptions) -> Result<(), FsError>;
    fn realpath(&self, path: &str) -> Result<String, FsError>;
    fn resolve_path(&self, base: &str, path: &str) -> String;

    fn is_dir(&self, path: &str) -> bool {
        self.stat(path).map(|s| s.is_directory).unwrap_or(false)
    }

    fn is_file(&self, path: &str) -> bool {
        self.stat(path).map(|s| s.is_file).unwrap_or(false)
    }
}

pub struct SyncFsAdapter {
    inner: Arc<dyn FileSystem>,
    handle: tokio::runtime::Handle,
}

impl SyncFsAdapter {
    pub fn new(fs: Arc<dyn FileSystem>, handle: tokio::runtime::Handle) -> Self {
        Self { inner: fs, handle }
    }

    fn wait<F, T>(&self, fut: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        tokio::task::block_in_place(|| self.handle.block_on(fut))
    }
}

impl SyncFs for SyncFsAdapter {
    fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError> {
        self.wait(self.inner.read_file_buffer(path))
    }

    fn write_file(&self, path: &str, content: &[u8]) -> Result<(), FsError> {
        self.wait(self.inner.write_file(path, content))
    }

    fn append_file(&self, path: &str, content: &[u8]) -> Result<(), FsError> {
        self.wait(self.inner.append_file(path, content))
    }

    fn exists(&self, path: &str) -> bool {
        self.wait(self.inner.exists(path))
    }

    fn stat(&self, path: &str) -> Result<FsStat, FsError> {
        self.wait(self.inner.stat(path))
    }

    fn lstat(&self, path: &str) -> Result<FsStat, FsError> {
        self.wait(self.inner.lstat(path))
    }

    fn readdir(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        self.wait(self.inner.readdir_entries(path))
    }

    fn mkdir(&self, path: &str, options: &MkdirOptions) -> Result<(), FsError> {
        self.wait(self.inner.mkdir(path, options))
    }

    fn remove(&self, path: &str, options: &RemoveOptions) -> Result<(), FsError> {
        self.wait(self.inner.remove(path, options))
    }

    fn realpath(&self, path: &str) -> Result<String, FsError> {
        self.wait(self.inner.realpath(path))
    }

    fn resolve_path(&self, base: &str, path: &str) -> String {
        self.inner.resolve_path(base, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFs;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_adapter_roundtrip() {
        let fs = Arc::new(InMemoryFs::new());
        fs.write_file("/f.txt", b"content").await.unwrap();

        let adapter = SyncFsAdapter::new(fs, tokio::runtime::Handle::current());
        assert!(adapter.exists("/f.txt"));
        assert_eq!(adapter.read_file("/f.txt").unwrap(), b"content");
        assert!(adapter.is_file("/f.txt"));
        assert!(adapter.is_dir("/"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_adapter_write_and_list() {
        let fs = Arc::new(InMemoryFs::new());
        let adapter = SyncFsAdapter::new(fs, tokio::runtime::Handle::current());
        adapter.mkdir("/d", &MkdirOptions::default()).unwrap();
        adapter.write_file("/d/x", b"1").unwrap();
        let entries = adapter.readdir("/d").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "x");
    }
}
