//! Content-addressed byte cache.
//!
//! Stores processed output under `<root>/<namespace>/<name>`, where `name`
//! embeds a content hash. Writes are idempotent: re-saving identical bytes
//! under the same key is safe, so unsynchronized processes racing to
//! populate a key produce only redundant work.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub struct ContentCache {
    root: PathBuf,
    create: bool,
    mode: u32,
}

impl ContentCache {
    pub fn new(root: PathBuf, create: bool, mode: u32) -> Self {
        Self { root, create, mode }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, namespace: &str, name: &str) -> PathBuf {
        self.root.join(namespace).join(name)
    }

    pub fn exists(&self, namespace: &str, name: &str) -> bool {
        self.entry_path(namespace, name).exists()
    }

    pub fn load(&self, namespace: &str, name: &str) -> Result<Vec<u8>> {
        let path = self.entry_path(namespace, name);
        fs::read(&path).map_err(|source| Error::FileRead {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load as text. Cached pipeline output is always UTF-8.
    pub fn load_utf8(&self, namespace: &str, name: &str) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.load(namespace, name)?).into_owned())
    }

    /// Persist bytes, creating missing namespace directories when the
    /// creation policy permits.
    pub fn save(&self, namespace: &str, name: &str, bytes: &[u8]) -> Result<()> {
        self.ensure_root()?;
        let dir = self.root.join(namespace);
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|_| Error::CacheDirMissing(dir.clone()))?;
            set_mode(&dir, self.mode);
        }
        ensure_writable(&dir, self.mode)?;
        let path = dir.join(name);
        fs::write(&path, bytes).map_err(|_| Error::CacheDirNotWritable(dir))?;
        set_mode(&path, self.mode);
        Ok(())
    }

    /// Recursively delete every file under a namespace. Best effort:
    /// unreadable directories and failed unlinks are skipped.
    pub fn purge(&self, namespace: &str) {
        let mut pending = vec![self.root.join(namespace)];
        while let Some(dir) = pending.pop() {
            let Ok(listing) = fs::read_dir(&dir) else {
                continue;
            };
            for dir_entry in listing.flatten() {
                let path = dir_entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else if fs::remove_file(&path).is_err() {
                    crate::debug!("cache"; "purge left {} behind", path.display());
                }
            }
        }
    }

    /// Create or repair the cache root according to the creation policy.
    fn ensure_root(&self) -> Result<()> {
        if !self.root.exists() {
            if !self.create {
                return Err(Error::CacheDirMissing(self.root.clone()));
            }
            fs::create_dir_all(&self.root)
                .map_err(|_| Error::CacheDirMissing(self.root.clone()))?;
            set_mode(&self.root, self.mode);
        }
        ensure_writable(&self.root, self.mode)
    }
}

/// Apply the configured permission mode (unix only).
fn set_mode(path: &Path, mode: u32) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode));
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
}

/// Check writability, attempting one permission repair before giving up.
fn ensure_writable(dir: &Path, mode: u32) -> Result<()> {
    if is_writable(dir) {
        return Ok(());
    }
    set_mode(dir, mode);
    if is_writable(dir) {
        return Ok(());
    }
    Err(Error::CacheDirNotWritable(dir.to_path_buf()))
}

fn is_writable(dir: &Path) -> bool {
    fs::metadata(dir)
        .map(|meta| !meta.permissions().readonly())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache(dir: &TempDir) -> ContentCache {
        ContentCache::new(dir.path().join("cache"), true, 0o777)
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        assert!(!cache.exists("css", "abc.css"));
        cache.save("css", "abc.css", b"body{}").unwrap();
        assert!(cache.exists("css", "abc.css"));
        assert_eq!(cache.load("css", "abc.css").unwrap(), b"body{}");
    }

    #[test]
    fn test_resave_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        cache.save("js", "k.js", b"var a=1;").unwrap();
        assert!(cache.exists("js", "k.js"));
        cache.save("js", "k.js", b"var a=1;").unwrap();
        assert!(cache.exists("js", "k.js"));
        assert_eq!(cache.load("js", "k.js").unwrap(), b"var a=1;");
    }

    #[test]
    fn test_nested_namespace() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        cache.save("images/style.scss", "logo.png", b"png").unwrap();
        assert!(cache.exists("images/style.scss", "logo.png"));
    }

    #[test]
    fn test_missing_root_without_creation() {
        let dir = TempDir::new().unwrap();
        let cache = ContentCache::new(dir.path().join("cache"), false, 0o777);
        let err = cache.save("css", "x.css", b"x").unwrap_err();
        assert_eq!(err.code(), 54);
    }

    #[test]
    fn test_purge_removes_nested_files() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        cache.save("images/app.scss", "a.png", b"a").unwrap();
        cache.save("images/app.scss/sub", "b.png", b"b").unwrap();
        cache.save("css", "keep.css", b"k").unwrap();
        cache.purge("images/app.scss");
        assert!(!cache.exists("images/app.scss", "a.png"));
        assert!(!cache.exists("images/app.scss/sub", "b.png"));
        assert!(cache.exists("css", "keep.css"));
    }

    #[test]
    fn test_purge_unknown_namespace_is_noop() {
        let dir = TempDir::new().unwrap();
        cache(&dir).purge("nothing/here");
    }

    #[test]
    fn test_load_missing_entry() {
        let dir = TempDir::new().unwrap();
        let err = cache(&dir).load("css", "missing.css").unwrap_err();
        assert_eq!(err.code(), 33);
    }
}
