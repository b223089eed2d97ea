//! Show data layout on disk.
//!
//! Everything the controller and the admin UI share lives under one base
//! directory:
//!
//! ```text
//! <base>/config.json          settings document
//! <base>/state.json           status snapshot (written by the controller)
//! <base>/control.json         one-shot command (written by the UI)
//! <base>/cues/                NN_workcue.{wav,mp3,mid,midi}
//! <base>/jukebox/songs/       jukebox media
//! <base>/jukebox/playlists/   playlist documents
//! <base>/logs/                optional rolling log files
//! ```

use anyhow::Context;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory name used under the home directory when no base is given
const DEFAULT_DIR_NAME: &str = "showbox";

/// Mode given to shared documents the controller creates
#[cfg(unix)]
const SHARED_FILE_MODE: u32 = 0o644;

/// Resolved locations of every shared document and media folder.
#[derive(Debug, Clone)]
pub struct ShowPaths {
    pub base: PathBuf,
    pub cues_dir: PathBuf,
    pub songs_dir: PathBuf,
    pub playlists_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub config: PathBuf,
    pub state: PathBuf,
    pub control: PathBuf,
}

impl ShowPaths {
    /// Derive all locations from a base directory
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        let jukebox = base.join("jukebox");
        Self {
            cues_dir: base.join("cues"),
            songs_dir: jukebox.join("songs"),
            playlists_dir: jukebox.join("playlists"),
            logs_dir: base.join("logs"),
            config: base.join("config.json"),
            state: base.join("state.json"),
            control: base.join("control.json"),
            base,
        }
    }

    /// Default base directory: `~/showbox`, or `./showbox` when no home exists.
    pub fn default_base() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_DIR_NAME)
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        for dir in [
            &self.base,
            &self.cues_dir,
            &self.songs_dir,
            &self.playlists_dir,
        ] {
            ensure_dir(dir)?;
        }
        Ok(())
    }

    /// Create the logs directory (only needed when file logging is on)
    pub fn ensure_logs_dir(&self) -> anyhow::Result<()> {
        ensure_dir(&self.logs_dir)
    }
}

fn ensure_dir(dir: &Path) -> anyhow::Result<()> {
    if !dir.exists() {
        debug!("Creating directory: {}", dir.display());
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }
    Ok(())
}

/// Replace `path` with `contents` atomically.
///
/// Readers polling the file see either the old or the new document, never a
/// partial write: the data goes to a temp file in the same directory which is
/// then renamed over the target.
pub async fn replace_file(path: &Path, contents: Vec<u8>) -> std::io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || replace_file_blocking(&path, &contents))
        .await
        .map_err(std::io::Error::other)?
}

fn replace_file_blocking(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;

    // Temp files are created owner-only; other readers of the target must keep access
    match std::fs::metadata(path) {
        Ok(meta) => tmp.as_file().set_permissions(meta.permissions())?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => set_shared_permissions(tmp.as_file())?,
        Err(e) => return Err(e),
    }

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// New documents are world-readable, owner-writable
#[cfg(unix)]
fn set_shared_permissions(file: &std::fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(SHARED_FILE_MODE))
}

#[cfg(not(unix))]
fn set_shared_permissions(_file: &std::fs::File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_under_base() {
        let paths = ShowPaths::new("/srv/show");

        assert_eq!(paths.cues_dir, PathBuf::from("/srv/show/cues"));
        assert_eq!(paths.songs_dir, PathBuf::from("/srv/show/jukebox/songs"));
        assert_eq!(
            paths.playlists_dir,
            PathBuf::from("/srv/show/jukebox/playlists")
        );
        assert_eq!(paths.control, PathBuf::from("/srv/show/control.json"));
    }

    #[test]
    fn test_ensure_directories_creates_tree() {
        let tmp = TempDir::new().unwrap();
        let paths = ShowPaths::new(tmp.path().join("show"));

        paths.ensure_directories().unwrap();

        assert!(paths.cues_dir.is_dir());
        assert!(paths.songs_dir.is_dir());
        assert!(paths.playlists_dir.is_dir());
        assert!(!paths.logs_dir.exists());
    }

    #[tokio::test]
    async fn test_replace_file_overwrites_whole_document() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("state.json");
        std::fs::write(&target, "{\"old\": \"a much longer previous document\"}").unwrap();

        replace_file(&target, b"{}".to_vec()).await.unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "{}");
        // Only the target remains, no stray temp files
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_replace_file_keeps_existing_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("config.json");
        std::fs::write(&target, "{}").unwrap();
        std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o664)).unwrap();

        replace_file(&target, b"{\"mode\": \"cues\"}".to_vec()).await.unwrap();
        replace_file(&target, b"{\"mode\": \"jukebox\"}".to_vec()).await.unwrap();

        let mode = std::fs::metadata(&target).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o664);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_replace_file_new_document_is_readable_by_others() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("state.json");

        replace_file(&target, b"{}".to_vec()).await.unwrap();

        let mode = std::fs::metadata(&target).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }
}
