use std::fs::{self, File};
use std::io::{ErrorKind, Result, Write};
use std::path::{Path, PathBuf};

const TMP_PREFIX: &str = ".tmp-";

/// Scratch file created next to its final destination so that moving it
/// into place never crosses a filesystem boundary.
///
/// The file is removed on drop unless it was persisted.
pub struct TmpFile {
    file: File,
    path: PathBuf,
}

impl TmpFile {
    pub fn create_in(dir: impl AsRef<Path>) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        let filename: String = std::iter::repeat_with(fastrand::alphanumeric)
            .take(10)
            .collect();
        let path = dir.as_ref().join(format!("{}{}", TMP_PREFIX, filename));
        let file = File::create(&path)?;
        Ok(Self { file, path })
    }

    /// Flush and move the file over `dest`, replacing whatever is there.
    pub fn persist(self, dest: impl AsRef<Path>) -> Result<()> {
        self.file.sync_data()?;
        fs::rename(&self.path, dest.as_ref())
    }

    /// Flush and link the file at `dest` only if nothing exists there yet.
    ///
    /// # Errors
    /// `ErrorKind::AlreadyExists` if `dest` is taken; the existing file is
    /// left untouched.
    pub fn link_if_absent(self, dest: impl AsRef<Path>) -> Result<()> {
        self.file.sync_data()?;
        fs::hard_link(&self.path, dest.as_ref())
        // the temporary name is unlinked on drop
    }
}

impl std::io::Write for &TmpFile {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        (&self.file).write(buf)
    }

    fn flush(&mut self) -> Result<()> {
        (&self.file).flush()
    }
}

impl Drop for TmpFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Write `data` to `dest` in one step: readers see either the old content
/// or the new one.
pub fn write_replace(dest: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let dest = dest.as_ref();
    let dir = parent_dir(dest)?;
    let tmp = TmpFile::create_in(dir)?;
    (&tmp).write_all(data)?;
    (&tmp).flush()?;
    tmp.persist(dest)
}

/// Write `data` to `dest` unless a file is already there.
///
/// Returns `Ok(false)` when `dest` existed and nothing was written.
pub fn write_once(dest: impl AsRef<Path>, data: &[u8]) -> Result<bool> {
    let dest = dest.as_ref();
    let dir = parent_dir(dest)?;
    let tmp = TmpFile::create_in(dir)?;
    (&tmp).write_all(data)?;
    (&tmp).flush()?;
    match tmp.link_if_absent(dest) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(err) => Err(err),
    }
}

pub fn is_temporary(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with(TMP_PREFIX))
        .unwrap_or(false)
}

fn parent_dir(dest: &Path) -> Result<&Path> {
    match dest.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => Ok(dir),
        Some(_) => Ok(Path::new(".")),
        None => Err(std::io::Error::new(
            ErrorKind::InvalidInput,
            "`dest` must name a file",
        )),
    }
}
