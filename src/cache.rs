//! On-disk cache tree.
//!
//! [`CacheWriter`] owns the storage directory for the duration of a run.
//! Every file that lands in it (cached pages, the fallback table, the
//! ignore file) goes through [`CacheWriter::write`], which:
//!
//! 1. creates any missing parent directories with the configured
//!    directory mode,
//! 2. writes the content in full, replacing an existing file,
//! 3. re-applies the configured file mode, since the process umask may have
//!    masked bits off at creation time.
//!
//! Permission handling only applies on Unix; elsewhere the modes are ignored.
//!
//! ```text
//! static-site/
//! ├── .fallback.json      # URL → file table read by the runtime shim
//! ├── .gitignore          # optional, ignores the whole directory
//! ├── _.html              # "/"
//! ├── about.html          # "/about"
//! └── blog/
//!     └── post-1_x_1.html # "/blog/post-1?x=1"
//! ```

use crate::config::GeneratorConfig;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Name of the ignore file written into the storage directory.
pub const GITIGNORE_FILENAME: &str = ".gitignore";

const GITIGNORE_CONTENT: &str = "*\n!.gitignore\n";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to set permissions on {path}: {source}")]
    Permissions { path: PathBuf, source: io::Error },
    #[error("failed to clean {path}: {source}")]
    Clean { path: PathBuf, source: io::Error },
}

/// Writes files under the storage directory with enforced permissions.
#[derive(Debug, Clone)]
pub struct CacheWriter {
    root: PathBuf,
    dir_mode: u32,
    file_mode: u32,
}

impl CacheWriter {
    pub fn new(root: impl Into<PathBuf>, dir_mode: u32, file_mode: u32) -> Self {
        Self {
            root: root.into(),
            dir_mode,
            file_mode,
        }
    }

    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self::new(&config.storage_dir, config.dir_mode, config.file_mode)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Destination for a file name relative to the storage directory.
    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    /// Write `content` to `path`, creating parents and applying the file mode.
    pub fn write(&self, path: &Path, content: &[u8]) -> Result<(), CacheError> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
            && !dir.is_dir()
        {
            debug!(path = %dir.display(), "creating directory");
            create_dir_all(dir, self.dir_mode).map_err(|source| CacheError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        fs::write(path, content).map_err(|source| CacheError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        set_file_mode(path, self.file_mode).map_err(|source| CacheError::Permissions {
            path: path.to_path_buf(),
            source,
        })?;

        info!(path = %path.display(), bytes = content.len(), "wrote file");
        Ok(())
    }

    /// Write the ignore file marking the storage directory as disposable.
    pub fn write_gitignore(&self) -> Result<PathBuf, CacheError> {
        let path = self.path_for(GITIGNORE_FILENAME);
        self.write(&path, GITIGNORE_CONTENT.as_bytes())?;
        Ok(path)
    }
}

#[cfg(unix)]
fn create_dir_all(dir: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(mode).create(dir)
}

#[cfg(not(unix))]
fn create_dir_all(dir: &Path, _mode: u32) -> io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn set_file_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_file_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

/// Delete everything inside `dir`, keeping the directory itself.
///
/// Returns `Ok(false)` without touching anything if `dir` does not exist.
pub fn clean_directory(dir: &Path) -> Result<bool, CacheError> {
    if !dir.is_dir() {
        return Ok(false);
    }
    let clean_err = |source: io::Error| CacheError::Clean {
        path: dir.to_path_buf(),
        source,
    };
    for entry in fs::read_dir(dir).map_err(clean_err)? {
        let path = entry.map_err(clean_err)?.path();
        let removed = if path.is_dir() && !path.is_symlink() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|source| CacheError::Clean { path, source })?;
    }
    info!(path = %dir.display(), "cleaned directory");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn mode_of(path: &Path) -> u32 {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path).unwrap().permissions().mode() & 0o7777
    }

    #[test]
    fn write_creates_nested_directories() {
        let tmp = TempDir::new().unwrap();
        let writer = CacheWriter::new(tmp.path().join("cache"), 0o755, 0o644);
        let path = writer.path_for("blog/2024/post.html");

        writer.write(&path, b"<p>post</p>").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"<p>post</p>");
    }

    #[test]
    fn write_overwrites_existing_file() {
        let tmp = TempDir::new().unwrap();
        let writer = CacheWriter::new(tmp.path(), 0o755, 0o644);
        let path = writer.path_for("page.html");

        writer.write(&path, b"a much longer first version").unwrap();
        writer.write(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
    }

    #[cfg(unix)]
    #[test]
    fn write_applies_file_mode() {
        let tmp = TempDir::new().unwrap();
        let writer = CacheWriter::new(tmp.path(), 0o755, 0o600);
        let path = writer.path_for("secret.html");

        writer.write(&path, b"x").unwrap();

        assert_eq!(mode_of(&path), 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn write_reapplies_mode_on_existing_file() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let writer = CacheWriter::new(tmp.path(), 0o755, 0o640);
        let path = writer.path_for("page.html");
        fs::write(&path, b"old").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();

        writer.write(&path, b"new").unwrap();

        assert_eq!(mode_of(&path), 0o640);
    }

    #[cfg(unix)]
    #[test]
    fn created_directories_do_not_exceed_dir_mode() {
        let tmp = TempDir::new().unwrap();
        let writer = CacheWriter::new(tmp.path(), 0o700, 0o644);
        writer.write(&writer.path_for("a/b/c.html"), b"x").unwrap();

        // umask can only remove bits
        assert_eq!(mode_of(&tmp.path().join("a")) & !0o700, 0);
        assert_eq!(mode_of(&tmp.path().join("a/b")) & !0o700, 0);
    }

    #[test]
    fn write_into_file_parent_fails() {
        let tmp = TempDir::new().unwrap();
        let writer = CacheWriter::new(tmp.path(), 0o755, 0o644);
        fs::write(tmp.path().join("blocker"), b"file").unwrap();

        let result = writer.write(&writer.path_for("blocker/page.html"), b"x");
        assert!(matches!(result, Err(CacheError::CreateDir { .. })));
    }

    #[test]
    fn gitignore_content() {
        let tmp = TempDir::new().unwrap();
        let writer = CacheWriter::new(tmp.path(), 0o755, 0o644);
        let path = writer.write_gitignore().unwrap();
        assert_eq!(path, tmp.path().join(".gitignore"));
        assert_eq!(fs::read_to_string(path).unwrap(), "*\n!.gitignore\n");
    }

    #[test]
    fn clean_missing_directory_is_noop() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(!clean_directory(&missing).unwrap());
        assert!(!missing.exists());
    }

    #[test]
    fn clean_removes_contents_but_keeps_directory() {
        let tmp = TempDir::new().unwrap();
        let writer = CacheWriter::new(tmp.path().join("cache"), 0o755, 0o644);
        writer.write(&writer.path_for("a.html"), b"a").unwrap();
        writer.write(&writer.path_for("nested/b.html"), b"b").unwrap();
        writer.write_gitignore().unwrap();

        assert!(clean_directory(writer.root()).unwrap());

        assert!(writer.root().is_dir());
        assert_eq!(fs::read_dir(writer.root()).unwrap().count(), 0);
    }
}
