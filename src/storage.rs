//! Directory-rooted file storage with crash-safe writes.

use anyhow::{Context, Result, bail};
use getrandom::fill;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

/// Reads and atomically writes files below a root directory.
///
/// Paths handed to `Storage` are relative to the root and may not escape it.
#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Creates a new Storage rooted at `root`. Nothing is created on disk yet.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns `true` if `rel` exists below the root.
    pub fn exists(&self, rel: &Path) -> Result<bool> {
        Ok(self.resolve(rel)?.exists())
    }

    /// Loads the whole file at `rel` into memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn load(&self, rel: &Path) -> Result<Vec<u8>> {
        let path = self.resolve(rel)?;
        fs::read(&path).with_context(|| format!("failed to read {}", path.display()))
    }

    /// Saves `data` to `rel` using an atomic write.
    ///
    /// The data goes to a randomly named temporary file in the same directory,
    /// is synced, and then renamed over the target. The parent directory is
    /// synced afterwards so the rename itself survives a crash. Readers see
    /// either the old file or the new one, never a partial write.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save(&self, rel: &Path, data: &[u8]) -> Result<()> {
        let path = self.resolve(rel)?;
        let parent = path
            .parent()
            .context("storage path has no parent directory")?
            .to_path_buf();
        fs::create_dir_all(&parent)?;

        let tmp_path = random_tmp_path(&path)?;

        // fail if the temp name is somehow taken
        let mut tmp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .context("failed to create temporary file")?;

        tmp_file.write_all(data)?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        if let Err(e) = atomic_replace(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        let dir = File::open(&parent)?;
        dir.sync_all()?;

        tracing::debug!(path = %path.display(), bytes = data.len(), "stored file");
        Ok(())
    }

    fn resolve(&self, rel: &Path) -> Result<PathBuf> {
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("storage path must be relative and stay below the root: {}", rel.display());
        }
        Ok(self.root.join(rel))
    }
}

/// Generates a unique temporary path next to `path`.
///
/// Format: `filename.tmp.<randomhex>`
fn random_tmp_path(path: &Path) -> Result<PathBuf> {
    let mut buf = [0u8; 8]; // 64 bit entropy
    fill(&mut buf).map_err(|_| anyhow::anyhow!("OS random generator unavailable"))?;

    let rand_string = buf.iter().map(|b| format!("{b:02x}")).collect::<String>();

    let file_name = path
        .file_name()
        .context("storage path has no file name")?
        .to_string_lossy();

    Ok(path.with_file_name(format!("{file_name}.tmp.{rand_string}")))
}

/// Atomically replaces `target` with `tmp_path`.
///
/// Uses Windows `ReplaceFileW` with `REPLACEFILE_WRITE_THROUGH` when the target
/// already exists, and a plain rename for the first write.
#[cfg(target_os = "windows")]
fn atomic_replace(tmp_path: &Path, target: &Path) -> Result<()> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

    if !target.exists() {
        fs::rename(tmp_path, target)?;
        return Ok(());
    }

    fn to_wide(s: &OsStr) -> Vec<u16> {
        s.encode_wide().chain(std::iter::once(0)).collect()
    }

    let target_w = to_wide(target.as_os_str());
    let tmp_w = to_wide(tmp_path.as_os_str());

    // SAFETY:
    // - Strings are valid UTF-16 and null-terminated
    // - Pointers remain valid during the call
    // - Windows does not retain the pointers after return
    let result = unsafe {
        ReplaceFileW(
            target_w.as_ptr(),
            tmp_w.as_ptr(),
            std::ptr::null(),
            REPLACEFILE_WRITE_THROUGH,
            std::ptr::null(),
            std::ptr::null(),
        )
    };

    if result == 0 {
        let err = std::io::Error::last_os_error();
        return Err(err).context("atomic replace failed");
    }

    Ok(())
}

/// On Unix, `rename()` is atomic when both paths are on the same filesystem.
#[cfg(not(target_os = "windows"))]
fn atomic_replace(tmp_path: &Path, target: &Path) -> Result<()> {
    fs::rename(tmp_path, target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_returns_written_data() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());

        storage.save(Path::new("a/body.bin"), b"hello world").unwrap();

        assert_eq!(storage.load(Path::new("a/body.bin")).unwrap(), b"hello world");
    }

    #[test]
    fn load_fails_if_file_does_not_exist() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());

        assert!(storage.load(Path::new("missing.bin")).is_err());
        assert!(!storage.exists(Path::new("missing.bin")).unwrap());
    }

    #[test]
    fn save_replaces_existing_file() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());

        storage.save(Path::new("x"), b"first").unwrap();
        storage.save(Path::new("x"), b"second").unwrap();

        assert_eq!(fs::read(dir.path().join("x")).unwrap(), b"second");
    }

    #[test]
    fn tmp_file_is_removed_after_success() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        storage.save(Path::new("store.db"), b"data").unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0], "store.db");
    }

    #[test]
    fn tmp_names_are_unique_and_siblings() {
        let path = Path::new("/tmp/some/store.db");

        let a = random_tmp_path(path).unwrap();
        let b = random_tmp_path(path).unwrap();

        assert_ne!(a, b);
        assert_eq!(a.parent(), path.parent());
        assert_ne!(a, path);
    }

    #[test]
    fn paths_cannot_escape_the_root() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("root"));

        assert!(storage.save(Path::new("../outside"), b"x").is_err());
        assert!(storage.load(Path::new("/etc/passwd")).is_err());
    }
}
