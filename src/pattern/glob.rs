//! Pathname Expansion
//!
//! Traversal-with-matcher over the virtual filesystem. Patterns arrive as
//! escaped byte strings (quoted metacharacters backslashed); results come
//! back sorted and deduplicated, shaped like the pattern (relative patterns
//! yield relative paths). The caller applies nullglob/failglob policy.
//!
//! Every directory listing costs one glob operation against the metering
//! budget; exhausting it aborts the whole expansion.

use std::collections::BTreeSet;

use crate::fs::sync::SyncFs;
use crate::fs::types::join_path;
use crate::pattern::{fnmatch, has_glob_meta, unescape, MatchOptions};

#[derive(Debug, Clone, Copy, Default)]
pub struct GlobFlags {
    pub extglob: bool,
    pub dotglob: bool,
    pub globstar: bool,
    pub nocaseglob: bool,
}

/// Budget exhausted during traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobBudgetExceeded;

enum Segment {
    Literal(String),
    Pattern(Vec<u8>),
    Globstar,
}

/// Expand one pattern against the filesystem. Returns None when nothing
/// matched (the caller decides between the literal pattern, nothing, and an
/// error), Some(paths) otherwise.
pub fn expand(
    fs: &dyn SyncFs,
    cwd: &str,
    pattern: &[u8],
    flags: &GlobFlags,
    budget: &mut u64,
) -> Result<Option<Vec<Vec<u8>>>, GlobBudgetExceeded> {
    let text = String::from_utf8_lossy(pattern).into_owned();
    let absolute = text.starts_with('/');
    let dirs_only = text.ends_with('/');
    let trimmed = text.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(if fs.is_dir("/") { Some(vec![b"/".to_vec()]) } else { None });
    }

    let segments: Vec<Segment> = trimmed
        .split('/')
        .map(|seg| {
            if flags.globstar && seg == "**" {
                Segment::Globstar
            } else if has_glob_meta(seg.as_bytes(), flags.extglob) {
                Segment::Pattern(seg.as_bytes().to_vec())
            } else {
                Segment::Literal(String::from_utf8_lossy(&unescape(seg.as_bytes())).into_owned())
            }
        })
        .collect();

    let base = if absolute { "/".to_string() } else { cwd.to_string() };
    let mut out: BTreeSet<String> = BTreeSet::new();
    walk(fs, &base, &segments, "", absolute, flags, budget, &mut out)?;

    if dirs_only {
        let filtered: Vec<Vec<u8>> = out
            .into_iter()
            .filter(|p| fs.is_dir(&join_path(&base, p)))
            .map(|p| format!("{}/", p).into_bytes())
            .collect();
        return Ok(if filtered.is_empty() { None } else { Some(filtered) });
    }

    if out.is_empty() {
        Ok(None)
    } else {
        Ok(Some(out.into_iter().map(String::into_bytes).collect()))
    }
}

#[allow(clippy::too_many_arguments)]
fn walk(
    fs: &dyn SyncFs,
    dir: &str,
    segments: &[Segment],
    prefix: &str,
    absolute: bool,
    flags: &GlobFlags,
    budget: &mut u64,
    out: &mut BTreeSet<String>,
) -> Result<(), GlobBudgetExceeded> {
    let (segment, rest) = match segments.split_first() {
        None => return Ok(()),
        Some(pair) => pair,
    };

    let render = |prefix: &str, name: &str| -> String {
        if prefix.is_empty() {
            if absolute {
                format!("/{}", name)
            } else {
                name.to_string()
            }
        } else {
            format!("{}/{}", prefix, name)
        }
    };

    match segment {
        Segment::Literal(name) => {
            let path = join_path(dir, name);
            if rest.is_empty() {
                if fs.exists(&path) {
                    out.insert(render(prefix, name));
                }
            } else if fs.is_dir(&path) {
                walk(fs, &path, rest, &render(prefix, name), absolute, flags, budget, out)?;
            }
        }
        Segment::Pattern(pat) => {
            charge(budget)?;
            let entries = match fs.readdir(dir) {
                Ok(entries) => entries,
                Err(_) => return Ok(()),
            };
            let opts = MatchOptions { extglob: flags.extglob, nocase: flags.nocaseglob };
            let wants_hidden = flags.dotglob || pat.first() == Some(&b'.');
            for entry in entries {
                if entry.name.starts_with('.') && !wants_hidden {
                    continue;
                }
                if !fnmatch(pat, entry.name.as_bytes(), &opts) {
                    continue;
                }
                if rest.is_empty() {
                    out.insert(render(prefix, &entry.name));
                } else if entry.is_directory || entry.is_symlink {
                    let path = join_path(dir, &entry.name);
                    if fs.is_dir(&path) {
                        walk(fs, &path, rest, &render(prefix, &entry.name), absolute, flags, budget, out)?;
                    }
                }
            }
        }
        Segment::Globstar => {
            // Zero directories consumed.
            if rest.is_empty() {
                collect_recursive(fs, dir, prefix, absolute, flags, budget, out)?;
            } else {
                walk(fs, dir, rest, prefix, absolute, flags, budget, out)?;
            }
            charge(budget)?;
            if let Ok(entries) = fs.readdir(dir) {
                for entry in entries {
                    if entry.name.starts_with('.') && !flags.dotglob {
                        continue;
                    }
                    if entry.is_directory {
                        let path = join_path(dir, &entry.name);
                        walk(
                            fs,
                            &path,
                            segments,
                            &render(prefix, &entry.name),
                            absolute,
                            flags,
                            budget,
                            out,
                        )?;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Everything (files and directories) under `dir`, for a trailing `**`.
fn collect_recursive(
    fs: &dyn SyncFs,
    dir: &str,
    prefix: &str,
    absolute: bool,
    flags: &GlobFlags,
    budget: &mut u64,
    out: &mut BTreeSet<String>,
) -> Result<(), GlobBudgetExceeded> {
    charge(budget)?;
    let entries = match fs.readdir(dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };
    for entry in entries {
        if entry.name.starts_with('.') && !flags.dotglob {
            continue;
        }
        let rendered = if prefix.is_empty() {
            if absolute {
                format!("/{}", entry.name)
            } else {
                entry.name.clone()
            }
        } else {
            format!("{}/{}", prefix, entry.name)
        };
        out.insert(rendered.clone());
        if entry.is_directory {
            let path = join_path(dir, &entry.name);
            collect_recursive(fs, &path, &rendered, absolute, flags, budget, out)?;
        }
    }
    Ok(())
}

fn charge(budget: &mut u64) -> Result<(), GlobBudgetExceeded> {
    if *budget == 0 {
        return Err(GlobBudgetExceeded);
    }
    *budget -= 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{InMemoryFs, SyncFsAdapter};
    use crate::fs::types::{FileSystem, MkdirOptions};
    use std::sync::Arc;

    async fn fixture() -> Arc<InMemoryFs> {
        let fs = Arc::new(InMemoryFs::new());
        fs.mkdir("/home/user/sub", &MkdirOptions { recursive: true }).await.unwrap();
        fs.write_file("/home/user/a.txt", b"").await.unwrap();
        fs.write_file("/home/user/b.txt", b"").await.unwrap();
        fs.write_file("/home/user/c.md", b"").await.unwrap();
        fs.write_file("/home/user/.hidden", b"").await.unwrap();
        fs.write_file("/home/user/sub/d.txt", b"").await.unwrap();
        fs
    }

    fn sync(fs: Arc<InMemoryFs>) -> SyncFsAdapter {
        SyncFsAdapter::new(fs, tokio::runtime::Handle::current())
    }

    fn paths(result: Option<Vec<Vec<u8>>>) -> Vec<String> {
        result
            .unwrap_or_default()
            .into_iter()
            .map(|p| String::from_utf8_lossy(&p).into_owned())
            .collect()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_relative_star() {
        let fs = sync(fixture().await);
        let mut budget = 1000;
        let got = expand(&fs, "/home/user", b"*.txt", &GlobFlags::default(), &mut budget).unwrap();
        assert_eq!(paths(got), vec!["a.txt", "b.txt"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_absolute_pattern() {
        let fs = sync(fixture().await);
        let mut budget = 1000;
        let got = expand(&fs, "/", b"/home/user/*.md", &GlobFlags::default(), &mut budget).unwrap();
        assert_eq!(paths(got), vec!["/home/user/c.md"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_hidden_needs_dotglob() {
        let fs = sync(fixture().await);
        let mut budget = 1000;
        let got = expand(&fs, "/home/user", b"*", &GlobFlags::default(), &mut budget).unwrap();
        assert!(!paths(got).contains(&".hidden".to_string()));

        let flags = GlobFlags { dotglob: true, ..Default::default() };
        let mut budget = 1000;
        let got = expand(&fs, "/home/user", b"*", &flags, &mut budget).unwrap();
        assert!(paths(got).contains(&".hidden".to_string()));

        // Explicit leading dot always matches.
        let mut budget = 1000;
        let got = expand(&fs, "/home/user", b".h*", &GlobFlags::default(), &mut budget).unwrap();
        assert_eq!(paths(got), vec![".hidden"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_no_match_returns_none() {
        let fs = sync(fixture().await);
        let mut budget = 1000;
        let got = expand(&fs, "/home/user", b"*.zip", &GlobFlags::default(), &mut budget).unwrap();
        assert!(got.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_multi_segment() {
        let fs = sync(fixture().await);
        let mut budget = 1000;
        let got = expand(&fs, "/home/user", b"*/*.txt", &GlobFlags::default(), &mut budget).unwrap();
        assert_eq!(paths(got), vec!["sub/d.txt"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_globstar() {
        let fs = sync(fixture().await);
        let flags = GlobFlags { globstar: true, ..Default::default() };
        let mut budget = 1000;
        let got = expand(&fs, "/home/user", b"**/*.txt", &flags, &mut budget).unwrap();
        assert_eq!(paths(got), vec!["a.txt", "b.txt", "sub/d.txt"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_escaped_star_is_literal() {
        let fs = sync(fixture().await);
        let mut budget = 1000;
        // `\*` never matches unless a file is literally named `*`.
        let got = expand(&fs, "/home/user", b"\\*", &GlobFlags::default(), &mut budget).unwrap();
        assert!(got.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_budget_exceeded() {
        let fs = sync(fixture().await);
        let flags = GlobFlags { globstar: true, ..Default::default() };
        let mut budget = 1;
        let result = expand(&fs, "/home/user", b"**/*", &flags, &mut budget);
        assert_eq!(result, Err(GlobBudgetExceeded));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dirs_only_trailing_slash() {
        let fs = sync(fixture().await);
        let mut budget = 1000;
        let got = expand(&fs, "/home/user", b"*/", &GlobFlags::default(), &mut budget).unwrap();
        assert_eq!(paths(got), vec!["sub/"]);
    }
}
