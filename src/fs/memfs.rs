//! In-Memory File System
//!
//! Path-keyed map guarded by an async `RwLock`. Keys are normalized
//! absolute paths; the root directory always exists. Symlinks are resolved
//! with a loop cap; `..` cannot climb above `/`.

use std::collections::{HashMap, HashSet};
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::types::*;

const SYMLINK_FOLLOW_LIMIT: usize = 40;

#[derive(Debug, Clone)]
enum Node {
    File { content: Vec<u8>, mode: u32, mtime: SystemTime },
    Dir { mode: u32, mtime: SystemTime },
    Symlink { target: String, mode: u32, mtime: SystemTime },
}

impl Node {
    fn file(content: Vec<u8>, mode: u32) -> Self {
        Node::File { content, mode, mtime: SystemTime::now() }
    }

    fn dir() -> Self {
        Node::Dir { mode: 0o755, mtime: SystemTime::now() }
    }

    fn stat(&self, follow_is_symlink: bool) -> FsStat {
        match self {
            Node::File { content, mode, mtime } => FsStat {
                is_file: true,
                is_directory: false,
                is_symlink: false,
                mode: *mode,
                size: content.len() as u64,
                mtime: *mtime,
            },
            Node::Dir { mode, mtime } => FsStat {
                is_file: false,
                is_directory: true,
                is_symlink: false,
                mode: *mode,
                size: 0,
                mtime: *mtime,
            },
            Node::Symlink { target, mode, mtime } => FsStat {
                is_file: false,
                is_directory: false,
                is_symlink: follow_is_symlink,
                mode: *mode,
                size: target.len() as u64,
                mtime: *mtime,
            },
        }
    }
}

pub struct InMemoryFs {
    nodes: RwLock<HashMap<String, Node>>,
}

impl Default for InMemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFs {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert("/".to_string(), Node::dir());
        Self { nodes: RwLock::new(nodes) }
    }

    /// Seed files before the shell starts (creates parent directories).
    pub fn with_files(files: &InitialFiles) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert("/".to_string(), Node::dir());
        for (path, init) in files {
            let path = normalize_path(path);
            ensure_parents(&mut nodes, &path);
            let content = init.content.clone().into_bytes();
            nodes.insert(path, Node::file(content, init.mode.unwrap_or(0o644)));
        }
        Self { nodes: RwLock::new(nodes) }
    }
}

fn ensure_parents(nodes: &mut HashMap<String, Node>, path: &str) {
    let parent = dirname(path);
    if parent != "/" && !nodes.contains_key(&parent) {
        ensure_parents(nodes, &parent);
        nodes.insert(parent, Node::dir());
    }
}

fn link_target(link_path: &str, target: &str) -> String {
    if target.starts_with('/') {
        normalize_path(target)
    } else {
        join_path(&dirname(link_path), target)
    }
}

/// Resolve every component including the final one.
fn resolve_full(
    nodes: &HashMap<String, Node>,
    path: &str,
    operation: &str,
) -> Result<String, FsError> {
    let normalized = normalize_path(path);
    if normalized == "/" {
        return Ok(normalized);
    }
    let mut resolved = String::new();
    let mut seen: HashSet<String> = HashSet::new();
    for part in normalized[1..].split('/') {
        resolved.push('/');
        resolved.push_str(part);
        let mut hops = 0;
        while let Some(Node::Symlink { target, .. }) = nodes.get(&resolved) {
            if hops >= SYMLINK_FOLLOW_LIMIT || !seen.insert(resolved.clone()) {
                return Err(FsError::SymlinkLoop {
                    path: path.to_string(),
                    operation: operation.to_string(),
                });
            }
            resolved = link_target(&resolved, target);
            hops += 1;
        }
    }
    Ok(resolved)
}

/// Resolve intermediate components but leave the final one alone (lstat,
/// unlink, readlink, symlink creation).
fn resolve_parent_of(
    nodes: &HashMap<String, Node>,
    path: &str,
    operation: &str,
) -> Result<String, FsError> {
    let normalized = normalize_path(path);
    if normalized == "/" {
        return Ok(normalized);
    }
    let parent = resolve_full(nodes, &dirname(&normalized), operation)?;
    Ok(join_path(&parent, &basename(&normalized)))
}

fn get_dir<'a>(
    nodes: &'a HashMap<String, Node>,
    path: &str,
    operation: &str,
) -> Result<&'a Node, FsError> {
    match nodes.get(path) {
        None => Err(FsError::not_found(operation, path)),
        Some(node @ Node::Dir { .. }) => Ok(node),
        Some(_) => Err(FsError::NotDirectory {
            path: path.to_string(),
            operation: operation.to_string(),
        }),
    }
}

fn children<'a>(nodes: &'a HashMap<String, Node>, dir: &str) -> Vec<(&'a String, &'a Node)> {
    let mut out: Vec<_> = nodes
        .iter()
        .filter(|(k, _)| k.as_str() != "/" && dirname(k) == dir && k.as_str() != dir)
        .collect();
    out.sort_by(|a, b| a.0.cmp(b.0));
    out
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn read_file(&self, path: &str) -> Result<String, FsError> {
        let bytes = self.read_file_buffer(path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn read_file_buffer(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let nodes = self.nodes.read().await;
        let resolved = resolve_full(&nodes, path, "open")?;
        match nodes.get(&resolved) {
            None => Err(FsError::not_found("open", path)),
            Some(Node::File { content, .. }) => Ok(content.clone()),
            Some(Node::Dir { .. }) => Err(FsError::IsDirectory {
                path: path.to_string(),
                operation: "read".to_string(),
            }),
            Some(Node::Symlink { .. }) => Err(FsError::not_found("open", path)),
        }
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), FsError> {
        let mut nodes = self.nodes.write().await;
        let resolved = resolve_full(&nodes, path, "open")?;
        let parent = dirname(&resolved);
        get_dir(&nodes, &parent, "open")?;
        let mode = match nodes.get(&resolved) {
            Some(Node::Dir { .. }) => {
                return Err(FsError::IsDirectory {
                    path: path.to_string(),
                    operation: "open".to_string(),
                })
            }
            Some(Node::File { mode, .. }) => *mode,
            _ => 0o644,
        };
        nodes.insert(resolved, Node::file(content.to_vec(), mode));
        Ok(())
    }

    async fn append_file(&self, path: &str, content: &[u8]) -> Result<(), FsError> {
        let mut nodes = self.nodes.write().await;
        let resolved = resolve_full(&nodes, path, "open")?;
        let parent = dirname(&resolved);
        get_dir(&nodes, &parent, "open")?;
        if let Some(node) = nodes.get_mut(&resolved) {
            match node {
                Node::Dir { .. } => {
                    return Err(FsError::IsDirectory {
                        path: path.to_string(),
                        operation: "open".to_string(),
                    })
                }
                Node::File { content: existing, mtime, .. } => {
                    existing.extend_from_slice(content);
                    *mtime = SystemTime::now();
                    return Ok(());
                }
                Node::Symlink { .. } => {}
            }
        }
        nodes.insert(resolved, Node::file(content.to_vec(), 0o644));
        Ok(())
    }

    async fn exists(&self, path: &str) -> bool {
        let nodes = self.nodes.read().await;
        match resolve_full(&nodes, path, "stat") {
            Ok(resolved) => nodes.contains_key(&resolved),
            Err(_) => false,
        }
    }

    async fn stat(&self, path: &str) -> Result<FsStat, FsError> {
        let nodes = self.nodes.read().await;
        let resolved = resolve_full(&nodes, path, "stat")?;
        nodes
            .get(&resolved)
            .map(|n| n.stat(false))
            .ok_or_else(|| FsError::not_found("stat", path))
    }

    async fn lstat(&self, path: &str) -> Result<FsStat, FsError> {
        let nodes = self.nodes.read().await;
        let resolved = resolve_parent_of(&nodes, path, "lstat")?;
        nodes
            .get(&resolved)
            .map(|n| n.stat(true))
            .ok_or_else(|| FsError::not_found("lstat", path))
    }

    async fn mkdir(&self, path: &str, options: &MkdirOptions) -> Result<(), FsError> {
        let mut nodes = self.nodes.write().await;
        let resolved = resolve_full(&nodes, path, "mkdir")?;
        if nodes.contains_key(&resolved) {
            if options.recursive && matches!(nodes.get(&resolved), Some(Node::Dir { .. })) {
                return Ok(());
            }
            return Err(FsError::AlreadyExists {
                path: path.to_string(),
                operation: "mkdir".to_string(),
            });
        }
        let parent = dirname(&resolved);
        if !nodes.contains_key(&parent) {
            if !options.recursive {
                return Err(FsError::not_found("mkdir", &parent));
            }
            ensure_parents(&mut nodes, &resolved);
        } else {
            get_dir(&nodes, &parent, "mkdir")?;
        }
        nodes.insert(resolved, Node::dir());
        Ok(())
    }

    async fn readdir(&self, path: &str) -> Result<Vec<String>, FsError> {
        Ok(self
            .readdir_entries(path)
            .await?
            .into_iter()
            .map(|e| e.name)
            .collect())
    }

    async fn readdir_entries(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        let nodes = self.nodes.read().await;
        let resolved = resolve_full(&nodes, path, "scandir")?;
        get_dir(&nodes, &resolved, "scandir")?;
        Ok(children(&nodes, &resolved)
            .into_iter()
            .map(|(k, node)| DirEntry {
                name: basename(k),
                is_file: matches!(node, Node::File { .. }),
                is_directory: matches!(node, Node::Dir { .. }),
                is_symlink: matches!(node, Node::Symlink { .. }),
            })
            .collect())
    }

    async fn remove(&self, path: &str, options: &RemoveOptions) -> Result<(), FsError> {
        let mut nodes = self.nodes.write().await;
        let resolved = resolve_parent_of(&nodes, path, "unlink")?;
        if resolved == "/" {
            return Err(FsError::InvalidArgument {
                path: path.to_string(),
                operation: "unlink".to_string(),
            });
        }
        let is_dir = match nodes.get(&resolved) {
            None => {
                return if options.force {
                    Ok(())
                } else {
                    Err(FsError::not_found("unlink", path))
                }
            }
            Some(node) => matches!(node, Node::Dir { .. }),
        };
        if is_dir {
            let has_children = !children(&nodes, &resolved).is_empty();
            if has_children && !options.recursive {
                return Err(FsError::NotEmpty {
                    path: path.to_string(),
                    operation: "rmdir".to_string(),
                });
            }
            let prefix = format!("{}/", resolved);
            nodes.retain(|k, _| k != &resolved && !k.starts_with(&prefix));
        } else {
            nodes.remove(&resolved);
        }
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), FsError> {
        let mut nodes = self.nodes.write().await;
        let src = resolve_parent_of(&nodes, from, "rename")?;
        let dst = resolve_parent_of(&nodes, to, "rename")?;
        if !nodes.contains_key(&src) {
            return Err(FsError::not_found("rename", from));
        }
        get_dir(&nodes, &dirname(&dst), "rename")?;
        let prefix = format!("{}/", src);
        let moved: Vec<(String, Node)> = nodes
            .iter()
            .filter(|(k, _)| k.as_str() == src || k.starts_with(&prefix))
            .map(|(k, v)| {
                let suffix = &k[src.len()..];
                (format!("{}{}", dst, suffix), v.clone())
            })
            .collect();
        nodes.retain(|k, _| k != &src && !k.starts_with(&prefix));
        for (k, v) in moved {
            nodes.insert(k, v);
        }
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str, options: &CopyOptions) -> Result<(), FsError> {
        let mut nodes = self.nodes.write().await;
        let src = resolve_full(&nodes, from, "copy")?;
        let dst = resolve_full(&nodes, to, "copy")?;
        get_dir(&nodes, &dirname(&dst), "copy")?;
        match nodes.get(&src).cloned() {
            None => Err(FsError::not_found("copy", from)),
            Some(Node::Dir { .. }) => {
                if !options.recursive {
                    return Err(FsError::IsDirectory {
                        path: from.to_string(),
                        operation: "copy".to_string(),
                    });
                }
                let prefix = format!("{}/", src);
                let copied: Vec<(String, Node)> = nodes
                    .iter()
                    .filter(|(k, _)| k.as_str() == src || k.starts_with(&prefix))
                    .map(|(k, v)| {
                        let suffix = &k[src.len()..];
                        (format!("{}{}", dst, suffix), v.clone())
                    })
                    .collect();
                for (k, v) in copied {
                    nodes.insert(k, v);
                }
                Ok(())
            }
            Some(node) => {
                nodes.insert(dst, node);
                Ok(())
            }
        }
    }

    async fn chmod(&self, path: &str, new_mode: u32) -> Result<(), FsError> {
        let mut nodes = self.nodes.write().await;
        let resolved = resolve_full(&nodes, path, "chmod")?;
        match nodes.get_mut(&resolved) {
            None => Err(FsError::not_found("chmod", path)),
            Some(Node::File { mode, .. })
            | Some(Node::Dir { mode, .. })
            | Some(Node::Symlink { mode, .. }) => {
                *mode = new_mode;
                Ok(())
            }
        }
    }

    async fn symlink(&self, target: &str, link_path: &str) -> Result<(), FsError> {
        let mut nodes = self.nodes.write().await;
        let resolved = resolve_parent_of(&nodes, link_path, "symlink")?;
        if nodes.contains_key(&resolved) {
            return Err(FsError::AlreadyExists {
                path: link_path.to_string(),
                operation: "symlink".to_string(),
            });
        }
        get_dir(&nodes, &dirname(&resolved), "symlink")?;
        nodes.insert(
            resolved,
            Node::Symlink { target: target.to_string(), mode: 0o777, mtime: SystemTime::now() },
        );
        Ok(())
    }

    async fn readlink(&self, path: &str) -> Result<String, FsError> {
        let nodes = self.nodes.read().await;
        let resolved = resolve_parent_of(&nodes, path, "readlink")?;
        match nodes.get(&resolved) {
            Some(Node::Symlink { target, .. }) => Ok(target.clone()),
            Some(_) => Err(FsError::InvalidArgument {
                path: path.to_string(),
                operation: "readlink".to_string(),
            }),
            None => Err(FsError::not_found("readlink", path)),
        }
    }

    async fn realpath(&self, path: &str) -> Result<String, FsError> {
        let nodes = self.nodes.read().await;
        let resolved = resolve_full(&nodes, path, "realpath")?;
        if nodes.contains_key(&resolved) {
            Ok(resolved)
        } else {
            Err(FsError::not_found("realpath", path))
        }
    }

    fn resolve_path(&self, base: &str, path: &str) -> String {
        join_path(base, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let fs = InMemoryFs::new();
        fs.write_file("/a.txt", b"hello").await.unwrap();
        assert_eq!(fs.read_file_buffer("/a.txt").await.unwrap(), b"hello");
        assert_eq!(fs.read_file("/a.txt").await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_binary_content_preserved() {
        let fs = InMemoryFs::new();
        fs.write_file("/bin.dat", &[0xff, 0x00, 0xfe]).await.unwrap();
        assert_eq!(fs.read_file_buffer("/bin.dat").await.unwrap(), vec![0xff, 0x00, 0xfe]);
    }

    #[tokio::test]
    async fn test_write_missing_parent_fails() {
        let fs = InMemoryFs::new();
        assert!(fs.write_file("/no/such/file", b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_mkdir_and_readdir() {
        let fs = InMemoryFs::new();
        fs.mkdir("/d/e", &MkdirOptions { recursive: true }).await.unwrap();
        fs.write_file("/d/a.txt", b"1").await.unwrap();
        fs.write_file("/d/b.txt", b"2").await.unwrap();
        let names = fs.readdir("/d").await.unwrap();
        assert_eq!(names, vec!["a.txt", "b.txt", "e"]);
    }

    #[tokio::test]
    async fn test_mkdir_non_recursive_missing_parent() {
        let fs = InMemoryFs::new();
        assert!(fs.mkdir("/x/y", &MkdirOptions { recursive: false }).await.is_err());
    }

    #[tokio::test]
    async fn test_append() {
        let fs = InMemoryFs::new();
        fs.append_file("/log", b"a").await.unwrap();
        fs.append_file("/log", b"b").await.unwrap();
        assert_eq!(fs.read_file_buffer("/log").await.unwrap(), b"ab");
    }

    #[tokio::test]
    async fn test_remove_recursive() {
        let fs = InMemoryFs::new();
        fs.mkdir("/d/sub", &MkdirOptions { recursive: true }).await.unwrap();
        fs.write_file("/d/sub/f", b"x").await.unwrap();
        assert!(fs.remove("/d", &RemoveOptions { recursive: false, force: false }).await.is_err());
        fs.remove("/d", &RemoveOptions { recursive: true, force: false }).await.unwrap();
        assert!(!fs.exists("/d").await);
        assert!(!fs.exists("/d/sub/f").await);
    }

    #[tokio::test]
    async fn test_rename_moves_tree() {
        let fs = InMemoryFs::new();
        fs.mkdir("/a/b", &MkdirOptions { recursive: true }).await.unwrap();
        fs.write_file("/a/b/f", b"x").await.unwrap();
        fs.rename("/a", "/z").await.unwrap();
        assert!(!fs.exists("/a/b/f").await);
        assert_eq!(fs.read_file_buffer("/z/b/f").await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn test_symlink_resolution() {
        let fs = InMemoryFs::new();
        fs.write_file("/target", b"data").await.unwrap();
        fs.symlink("/target", "/link").await.unwrap();
        assert_eq!(fs.read_file_buffer("/link").await.unwrap(), b"data");
        assert!(fs.stat("/link").await.unwrap().is_file);
        assert!(fs.lstat("/link").await.unwrap().is_symlink);
        assert_eq!(fs.readlink("/link").await.unwrap(), "/target");
    }

    #[tokio::test]
    async fn test_symlink_loop_detected() {
        let fs = InMemoryFs::new();
        fs.symlink("/b", "/a").await.unwrap();
        fs.symlink("/a", "/b").await.unwrap();
        assert!(matches!(
            fs.read_file_buffer("/a/x").await,
            Err(FsError::SymlinkLoop { .. })
        ));
    }

    #[tokio::test]
    async fn test_relative_symlink() {
        let fs = InMemoryFs::new();
        fs.mkdir("/d", &MkdirOptions::default()).await.unwrap();
        fs.write_file("/d/real", b"r").await.unwrap();
        fs.symlink("real", "/d/alias").await.unwrap();
        assert_eq!(fs.read_file_buffer("/d/alias").await.unwrap(), b"r");
    }

    #[tokio::test]
    async fn test_copy() {
        let fs = InMemoryFs::new();
        fs.write_file("/src", b"abc").await.unwrap();
        fs.copy("/src", "/dst", &CopyOptions::default()).await.unwrap();
        assert_eq!(fs.read_file_buffer("/dst").await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_with_files_seeds_parents() {
        let mut files = InitialFiles::new();
        files.insert("/proj/src/main.rs".to_string(), "fn main() {}".into());
        let fs = InMemoryFs::with_files(&files);
        assert!(fs.stat("/proj/src").await.unwrap().is_directory);
        assert_eq!(fs.read_file("/proj/src/main.rs").await.unwrap(), "fn main() {}");
    }
}
