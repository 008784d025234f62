//! File System Types
//!
//! Errors carry the errno-style prefixes commands print; file content is
//! bytes everywhere. The async trait is the host-facing surface; the engine
//! consumes it through the sync adapter.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    #[error("ENOENT: no such file or directory, {operation} '{path}'")]
    NotFound { path: String, operation: String },

    #[error("EEXIST: file already exists, {operation} '{path}'")]
    AlreadyExists { path: String, operation: String },

    #[error("EISDIR: illegal operation on a directory, {operation} '{path}'")]
    IsDirectory { path: String, operation: String },

    #[error("ENOTDIR: not a directory, {operation} '{path}'")]
    NotDirectory { path: String, operation: String },

    #[error("ENOTEMPTY: directory not empty, {operation} '{path}'")]
    NotEmpty { path: String, operation: String },

    #[error("EINVAL: invalid argument, {operation} '{path}'")]
    InvalidArgument { path: String, operation: String },

    #[error("ELOOP: too many levels of symbolic links, {operation} '{path}'")]
    SymlinkLoop { path: String, operation: String },

    #[error("{message}")]
    Other { message: String },
}

impl FsError {
    pub fn not_found(operation: &str, path: &str) -> Self {
        FsError::NotFound { path: path.to_string(), operation: operation.to_string() }
    }

    /// Is this a missing-path error (for `rm -f`-style tolerance)?
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound { .. })
    }
}

#[derive(Debug, Clone)]
pub struct FsStat {
    pub is_file: bool,
    pub is_directory: bool,
    pub is_symlink: bool,
    pub mode: u32,
    pub size: u64,
    pub mtime: SystemTime,
}

/// Directory entry with type flags, so globbing can descend without extra
/// stat calls.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub is_file: bool,
    pub is_directory: bool,
    pub is_symlink: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MkdirOptions {
    pub recursive: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RemoveOptions {
    pub recursive: bool,
    pub force: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    pub recursive: bool,
}

/// Seed content for `ShellOptions::files`.
#[derive(Debug, Clone)]
pub enum FileContent {
    Text(String),
    Binary(Vec<u8>),
}

impl FileContent {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            FileContent::Text(s) => s.into_bytes(),
            FileContent::Binary(b) => b,
        }
    }
}

impl From<&str> for FileContent {
    fn from(s: &str) -> Self {
        FileContent::Text(s.to_string())
    }
}

impl From<String> for FileContent {
    fn from(s: String) -> Self {
        FileContent::Text(s)
    }
}

impl From<Vec<u8>> for FileContent {
    fn from(b: Vec<u8>) -> Self {
        FileContent::Binary(b)
    }
}

#[derive(Debug, Clone)]
pub struct FileInit {
    pub content: FileContent,
    pub mode: Option<u32>,
}

impl From<&str> for FileInit {
    fn from(content: &str) -> Self {
        FileInit { content: content.into(), mode: None }
    }
}

impl From<String> for FileInit {
    fn from(content: String) -> Self {
        FileInit { content: content.into(), mode: None }
    }
}

impl From<Vec<u8>> for FileInit {
    fn from(content: Vec<u8>) -> Self {
        FileInit { content: content.into(), mode: None }
    }
}

pub type InitialFiles = HashMap<String, FileInit>;

/// Abstract filesystem backend.
///
/// Path resolution normalizes `.`/`..` and never escapes the root; all
/// content is bytes.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read a file, decoding as (lossy) UTF-8.
    async fn read_file(&self, path: &str) -> Result<String, FsError>;

    /// Read a file as raw bytes.
    async fn read_file_buffer(&self, path: &str) -> Result<Vec<u8>, FsError>;

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), FsError>;

    async fn append_file(&self, path: &str, content: &[u8]) -> Result<(), FsError>;

    async fn exists(&self, path: &str) -> bool;

    /// Follows symlinks.
    async fn stat(&self, path: &str) -> Result<FsStat, FsError>;

    /// Does not follow the final symlink.
    async fn lstat(&self, path: &str) -> Result<FsStat, FsError>;

    async fn mkdir(&self, path: &str, options: &MkdirOptions) -> Result<(), FsError>;

    async fn readdir(&self, path: &str) -> Result<Vec<String>, FsError>;

    async fn readdir_entries(&self, path: &str) -> Result<Vec<DirEntry>, FsError>;

    async fn remove(&self, path: &str, options: &RemoveOptions) -> Result<(), FsError>;

    async fn rename(&self, from: &str, to: &str) -> Result<(), FsError>;

    async fn copy(&self, from: &str, to: &str, options: &CopyOptions) -> Result<(), FsError>;

    async fn chmod(&self, path: &str, mode: u32) -> Result<(), FsError>;

    async fn symlink(&self, target: &str, link_path: &str) -> Result<(), FsError>;

    async fn readlink(&self, path: &str) -> Result<String, FsError>;

    /// Canonical physical path with every symlink resolved.
    async fn realpath(&self, path: &str) -> Result<String, FsError>;

    /// Join and normalize; pure, no I/O.
    fn resolve_path(&self, base: &str, path: &str) -> String;
}

/// Normalize a path: leading `/`, `.`/`..` collapsed, no trailing slash.
/// `..` at the root stays at the root, so a sandboxed path can never escape.
pub fn normalize_path(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }
    // Normalized paths are always sandbox-absolute.
    format!("/{}", stack.join("/"))
}

/// Resolve `path` against `base` (both sandbox-absolute after the call).
pub fn join_path(base: &str, path: &str) -> String {
    if path.starts_with('/') {
        normalize_path(path)
    } else if base.is_empty() || base == "/" {
        normalize_path(&format!("/{}", path))
    } else {
        normalize_path(&format!("{}/{}", base, path))
    }
}

/// Parent directory of a normalized path.
pub fn dirname(path: &str) -> String {
    let normalized = normalize_path(path);
    match normalized.rfind('/') {
        Some(0) => "/".to_string(),
        Some(pos) => normalized[..pos].to_string(),
        None => "/".to_string(),
    }
}

/// Final component of a normalized path.
pub fn basename(path: &str) -> String {
    let normalized = normalize_path(path);
    if normalized == "/" {
        return "/".to_string();
    }
    normalized.rsplit('/').next().unwrap_or("").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_path("/a/b/../c"), "/a/c");
        assert_eq!(normalize_path("/a/./b//c/"), "/a/b/c");
        assert_eq!(normalize_path("/.."), "/");
        assert_eq!(normalize_path("/../../x"), "/x");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_join() {
        assert_eq!(join_path("/home/user", "file.txt"), "/home/user/file.txt");
        assert_eq!(join_path("/home/user", "/abs"), "/abs");
        assert_eq!(join_path("/home/user", "../other"), "/home/other");
        assert_eq!(join_path("/", "x"), "/x");
    }

    #[test]
    fn test_dirname_basename() {
        assert_eq!(dirname("/a/b/c"), "/a/b");
        assert_eq!(dirname("/a"), "/");
        assert_eq!(basename("/a/b/c"), "c");
        assert_eq!(basename("/"), "/");
    }

    #[test]
    fn test_sandbox_escape_blocked() {
        assert_eq!(join_path("/", "../../../../etc"), "/etc");
    }
}
