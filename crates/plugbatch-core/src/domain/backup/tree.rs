//! Directory tree walking, copying, and hashing
//!
//! Directories, regular files and symlinks are reproduced exactly; symlinks
//! are recreated as links, never followed. Any other entry (sockets, FIFOs,
//! devices) makes the walk fail, since it could not be restored later.

use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
enum EntryKind {
    Dir,
    File,
    Symlink(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TreeEntry {
    relative: PathBuf,
    kind: EntryKind,
}

/// List every entry under `root` in file-name order, parents before children
fn walk_tree(root: &Path) -> io::Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(io::Error::other)?
            .to_path_buf();
        let file_type = entry.file_type();

        let kind = if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File
        } else if file_type.is_symlink() {
            EntryKind::Symlink(fs::read_link(entry.path())?)
        } else {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("Cannot preserve special file {}", entry.path().display()),
            ));
        };

        entries.push(TreeEntry { relative, kind });
    }

    Ok(entries)
}

#[cfg(unix)]
fn create_symlink(link_target: &Path, at: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(link_target, at)
}

#[cfg(windows)]
fn create_symlink(link_target: &Path, at: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(link_target, at)
}

#[cfg(not(any(unix, windows)))]
fn create_symlink(_link_target: &Path, at: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("Cannot recreate symlink {}", at.display()),
    ))
}

fn copy_tree_blocking(src: &Path, dst: &Path) -> io::Result<u64> {
    if !fs::metadata(src)?.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotADirectory,
            format!("{} is not a directory", src.display()),
        ));
    }
    let entries = walk_tree(src)?;
    fs::create_dir_all(dst)?;

    let mut files = 0;
    for entry in entries {
        let target = dst.join(&entry.relative);
        match &entry.kind {
            EntryKind::Dir => fs::create_dir_all(&target)?,
            EntryKind::File => {
                fs::copy(src.join(&entry.relative), &target)?;
                files += 1;
            }
            EntryKind::Symlink(link_target) => {
                create_symlink(link_target, &target)?;
                files += 1;
            }
        }
    }

    Ok(files)
}

fn tree_digest_blocking(root: &Path) -> io::Result<String> {
    let entries = walk_tree(root)?;
    let mut hasher = Sha256::new();

    for entry in entries {
        let name = portable_path(&entry.relative);
        match &entry.kind {
            EntryKind::Dir => {
                hasher.update(b"D ");
                hasher.update(name.as_bytes());
                hasher.update(b"\n");
            }
            EntryKind::File => {
                let contents = fs::read(root.join(&entry.relative))?;
                hasher.update(b"F ");
                hasher.update(name.as_bytes());
                hasher.update(format!(" {}\n", contents.len()).as_bytes());
                hasher.update(&contents);
            }
            EntryKind::Symlink(link_target) => {
                hasher.update(b"L ");
                hasher.update(name.as_bytes());
                hasher.update(b" -> ");
                hasher.update(portable_path(link_target).as_bytes());
                hasher.update(b"\n");
            }
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

async fn blocking<T, F>(work: F) -> io::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> io::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(io::Error::other)?
}

/// Recursively copy `src` into `dst`, creating `dst` if needed
///
/// Returns the number of files and symlinks copied.
pub async fn copy_tree(src: &Path, dst: &Path) -> io::Result<u64> {
    let (src, dst) = (src.to_path_buf(), dst.to_path_buf());
    blocking(move || copy_tree_blocking(&src, &dst)).await
}

/// SHA-256 over the sorted tree layout, file contents and link targets
///
/// Two trees hash equal iff they hold the same directories, the same bytes
/// and the same symlinks under the same relative paths.
pub async fn tree_digest(root: &Path) -> io::Result<String> {
    let root = root.to_path_buf();
    blocking(move || tree_digest_blocking(&root)).await
}

fn portable_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn test_copy_tree_copies_nested_files() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write(&src, "main.php", "<?php // main");
        write(&src, "includes/a.php", "a");
        write(&src, "assets/css/site.css", "body{}");
        std::fs::create_dir_all(src.join("empty")).unwrap();

        let dst = temp.path().join("dst");
        let copied = copy_tree(&src, &dst).await.unwrap();

        assert_eq!(copied, 3);
        assert_eq!(std::fs::read_to_string(dst.join("includes/a.php")).unwrap(), "a");
        assert!(dst.join("empty").is_dir());
        assert_eq!(
            tree_digest(&src).await.unwrap(),
            tree_digest(&dst).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_digest_detects_content_change() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.txt", "one");
        let before = tree_digest(temp.path()).await.unwrap();

        write(temp.path(), "a.txt", "two");
        let after = tree_digest(temp.path()).await.unwrap();

        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn test_digest_detects_rename() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        write(a.path(), "x.txt", "same");
        write(b.path(), "y.txt", "same");

        assert_ne!(
            tree_digest(a.path()).await.unwrap(),
            tree_digest(b.path()).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_copy_missing_source_fails() {
        let temp = TempDir::new().unwrap();
        let result = copy_tree(&temp.path().join("nope"), &temp.path().join("dst")).await;
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_copy_tree_recreates_symlinks() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write(&src, "real.txt", "real");
        std::os::unix::fs::symlink("real.txt", src.join("link.txt")).unwrap();

        let dst = temp.path().join("dst");
        let copied = copy_tree(&src, &dst).await.unwrap();

        assert_eq!(copied, 2);
        let link = dst.join("link.txt");
        assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_link(&link).unwrap(), PathBuf::from("real.txt"));
        assert_eq!(
            tree_digest(&src).await.unwrap(),
            tree_digest(&dst).await.unwrap()
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_digest_covers_symlink_targets() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        for dir in [a.path(), b.path()] {
            write(dir, "one.txt", "1");
            write(dir, "two.txt", "2");
        }
        std::os::unix::fs::symlink("one.txt", a.path().join("current")).unwrap();
        std::os::unix::fs::symlink("two.txt", b.path().join("current")).unwrap();

        assert_ne!(
            tree_digest(a.path()).await.unwrap(),
            tree_digest(b.path()).await.unwrap()
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_special_files_are_rejected() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write(&src, "a.txt", "a");
        let socket = std::os::unix::net::UnixListener::bind(src.join("daemon.sock")).unwrap();

        let err = copy_tree(&src, &temp.path().join("dst")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
        drop(socket);
    }
}
