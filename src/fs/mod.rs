/// File system operations abstraction for testing
///
/// Everything the lifecycle core persists (descriptors, generated artifacts,
/// staged removals, audit records) goes through this trait so tests can swap
/// the real file system for a `mockall` mock.
///
/// # Examples
///
/// ```rust,no_run
/// use lifecycle_forge::fs::{FileSystemOperations, StandardFileSystem};
/// use std::path::Path;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let fs_ops: Arc<dyn FileSystemOperations> = Arc::new(StandardFileSystem);
///
///     fs_ops.create_dir_all(Path::new("projects/demo")).await?;
///     fs_ops.write(Path::new("projects/demo/README.md"), b"# demo").await?;
///
///     if fs_ops.try_exists(Path::new("projects/demo/README.md")).await? {
///         println!("File was created successfully");
///     }
///
///     Ok(())
/// }
/// ```
///
/// # Testing with Mocks
///
/// ```rust
/// #[cfg(test)]
/// mod tests {
///     use crate::fs::MockFileSystemOperations;
///     use std::path::Path;
///
///     #[tokio::test]
///     async fn test_with_mocked_filesystem() {
///         let mut mock_fs = MockFileSystemOperations::new();
///         mock_fs
///             .expect_try_exists()
///             .returning(|_| Ok(true));
///
///         assert!(mock_fs.try_exists(Path::new("forge.toml")).await.unwrap());
///     }
/// }
/// ```
use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[cfg(test)]
use mockall::automock;

/// Trait for file system operations that can be mocked in tests
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait FileSystemOperations: Send + Sync {
    /// Create a directory and all its parent directories
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Write data to a file, creating the file if it doesn't exist
    async fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;

    /// Read a whole file. A missing file is `Ok(None)`, not an error.
    async fn read(&self, path: &Path) -> Result<Option<Vec<u8>>>;

    /// Check if a path exists.
    ///
    /// Unlike `Path::exists` this surfaces permission and other I/O errors
    /// instead of folding them into `false`.
    async fn try_exists(&self, path: &Path) -> Result<bool>;

    /// Remove a file or a directory tree. Returns `false` if nothing was there.
    async fn remove(&self, path: &Path) -> Result<bool>;

    /// Move a file or directory, creating the destination's parent.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// List every regular file below `dir`, relative to `dir`, sorted.
    async fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    /// Append a line to a file, creating it if needed
    async fn append_line(&self, path: &Path, line: &str) -> Result<()>;

    /// Execute a command in `cwd` and return its output
    async fn execute_command(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<std::process::Output>;
}

/// Standard implementation that uses actual file system operations
pub struct StandardFileSystem;

#[async_trait::async_trait]
impl FileSystemOperations for StandardFileSystem {
    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path)
            .await
            .with_context(|| format!("failed to create directory {}", path.display()))
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents)
            .await
            .with_context(|| format!("failed to write {}", path.display()))
    }

    async fn read(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    async fn try_exists(&self, path: &Path) -> Result<bool> {
        tokio::fs::try_exists(path)
            .await
            .with_context(|| format!("failed to stat {}", path.display()))
    }

    async fn remove(&self, path: &Path) -> Result<bool> {
        let metadata = match tokio::fs::symlink_metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to stat {}", path.display()))
            }
        };

        let removed = if metadata.is_dir() {
            tokio::fs::remove_dir_all(path).await
        } else {
            tokio::fs::remove_file(path).await
        };

        match removed {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
        }
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(from, to)
            .await
            .with_context(|| format!("failed to move {} to {}", from.display(), to.display()))
    }

    async fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![dir.to_path_buf()];

        while let Some(current) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("failed to list {}", current.display()))
                }
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(dir) {
                    files.push(relative.to_path_buf());
                }
            }
        }

        files.sort();
        Ok(files)
    }

    async fn append_line(&self, path: &Path, line: &str) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }

    async fn execute_command(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<std::process::Output> {
        let output = tokio::process::Command::new(program)
            .args(args)
            .current_dir(cwd)
            .output()
            .await
            .with_context(|| format!("failed to spawn {}", program))?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_remove_reports_absent_paths() {
        let temp = TempDir::new().unwrap();
        let fs_ops = StandardFileSystem;

        let dir = temp.path().join("backend/src");
        fs_ops.write(&dir.join("main.rs"), b"fn main() {}").await.unwrap();

        assert!(fs_ops.remove(&temp.path().join("backend")).await.unwrap());
        assert!(!fs_ops.remove(&temp.path().join("backend")).await.unwrap());
        assert!(!fs_ops.try_exists(&dir).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_files_is_relative_and_sorted() {
        let temp = TempDir::new().unwrap();
        let fs_ops = StandardFileSystem;

        fs_ops.write(&temp.path().join("b.txt"), b"b").await.unwrap();
        fs_ops.write(&temp.path().join("a/c.txt"), b"c").await.unwrap();

        let files = fs_ops.list_files(temp.path()).await.unwrap();
        assert_eq!(files, vec![PathBuf::from("a/c.txt"), PathBuf::from("b.txt")]);
        assert!(fs_ops.list_files(&temp.path().join("missing")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_missing_file_is_none() {
        let temp = TempDir::new().unwrap();
        let fs_ops = StandardFileSystem;
        assert!(fs_ops.read(&temp.path().join("nope")).await.unwrap().is_none());
    }
}
