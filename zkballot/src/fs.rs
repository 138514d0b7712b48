use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Filesystem access used by the key-material store and the engine
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Names of the entries directly inside `dir`
    async fn list(&self, dir: &Path) -> io::Result<Vec<String>>;

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Replace the contents of `path`. Readers observe either the old or the new
    /// contents, never a partial write.
    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    async fn create_dir_all(&self, dir: &Path) -> io::Result<()>;
}

/// The local disk, through tokio's blocking-pool file API
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

#[async_trait]
impl FileSystem for LocalFs {
    async fn list(&self, dir: &Path) -> io::Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let tmp = temp_path(path)?;
        if let Err(e) = tokio::fs::write(&tmp, contents).await {
            tokio::fs::remove_file(&tmp).await.ok();
            return Err(e);
        }
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            tokio::fs::remove_file(&tmp).await.ok();
            return Err(e);
        }
        Ok(())
    }

    async fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(dir).await
    }
}

// Sibling of `path` so the final rename stays on one filesystem
fn temp_path(path: &Path) -> io::Result<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", path.display()),
        )
    })?;
    let tmp_name = format!(
        ".{}.{}.tmp",
        name.to_string_lossy(),
        uuid::Uuid::new_v4().simple()
    );
    Ok(path.with_file_name(tmp_name))
}

/// A simple filesystem held in memory
#[derive(Debug, Default)]
pub struct MemFs {
    inner: Mutex<MemFsInner>,
}

#[derive(Debug, Default)]
struct MemFsInner {
    dirs: BTreeSet<PathBuf>,
    files: BTreeMap<PathBuf, Vec<u8>>,
}

impl MemFs {
    pub fn new() -> Self {
        MemFs::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemFsInner> {
        // The inner maps stay consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Synchronous write for seeding fixtures
    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        let path = path.into();
        let mut inner = self.lock();
        if let Some(parent) = path.parent() {
            inner.add_dirs(parent);
        }
        inner.files.insert(path, contents.into());
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let inner = self.lock();
        inner.files.get(path.as_ref()).cloned()
    }

    pub fn remove(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let mut inner = self.lock();
        inner.files.remove(path.as_ref())
    }
}

impl MemFsInner {
    fn add_dirs(&mut self, dir: &Path) {
        for ancestor in dir.ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            self.dirs.insert(ancestor.to_path_buf());
        }
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} does not exist", path.display()),
    )
}

#[async_trait]
impl FileSystem for MemFs {
    async fn list(&self, dir: &Path) -> io::Result<Vec<String>> {
        let inner = self.lock();
        if !inner.dirs.contains(dir) {
            return Err(not_found(dir));
        }
        let files = inner.files.keys().filter(|p| p.parent() == Some(dir));
        let dirs = inner.dirs.iter().filter(|p| p.parent() == Some(dir));
        Ok(files
            .chain(dirs)
            .filter_map(|p| p.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect())
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.contents(path).ok_or_else(|| not_found(path))
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut inner = self.lock();
        match path.parent() {
            Some(parent) if parent.as_os_str().is_empty() || inner.dirs.contains(parent) => {}
            Some(parent) => return Err(not_found(parent)),
            None => return Err(not_found(path)),
        }
        inner.files.insert(path.to_path_buf(), contents.to_vec());
        Ok(())
    }

    async fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        let mut inner = self.lock();
        inner.add_dirs(dir);
        Ok(())
    }
}
