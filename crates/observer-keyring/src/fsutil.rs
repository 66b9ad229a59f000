use eyre::Context as _;
use std::{
    fs::{self, OpenOptions},
    io::Write as _,
    path::{Path, PathBuf},
};
use uuid::Uuid;

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt as _, PermissionsExt as _};

pub const MODE_DIR_PRIVATE: u32 = 0o700;
pub const MODE_FILE_PRIVATE: u32 = 0o600;

fn is_symlink(p: &Path) -> eyre::Result<bool> {
    let md = fs::symlink_metadata(p).with_context(|| format!("stat {}", p.display()))?;
    Ok(md.file_type().is_symlink())
}

/// Create `dir` if needed and clamp it to owner-only permissions on Unix.
pub fn ensure_private_dir(dir: &Path) -> eyre::Result<()> {
    if dir.exists() {
        if is_symlink(dir)? {
            eyre::bail!("refusing to use symlinked directory: {}", dir.display());
        }
        if !dir.is_dir() {
            eyre::bail!("expected directory at {}", dir.display());
        }
    } else {
        fs::create_dir_all(dir).with_context(|| format!("create dir {}", dir.display()))?;
    }

    #[cfg(unix)]
    {
        let mode = fs::metadata(dir)
            .with_context(|| format!("stat {}", dir.display()))?
            .permissions()
            .mode();
        if (mode & 0o077) != 0 {
            fs::set_permissions(dir, fs::Permissions::from_mode(MODE_DIR_PRIVATE))
                .with_context(|| format!("chmod {MODE_DIR_PRIVATE:o} {}", dir.display()))?;
        }
    }

    Ok(())
}

fn tmp_path_for(parent: &Path, final_name: &Path) -> PathBuf {
    let base = final_name
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    parent.join(format!(".{base}.tmp.{}", Uuid::new_v4().simple()))
}

/// Replace `path` with `bytes` via a fresh temp file, fsync and rename.
///
/// Readers see either the previous contents or the new ones, never a torn write.
pub fn write_atomic_private(path: &Path, bytes: &[u8]) -> eyre::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| eyre::eyre!("missing parent for {}", path.display()))?;
    ensure_private_dir(parent)?;

    if path.exists() && is_symlink(path)? {
        eyre::bail!("refusing to write to symlink: {}", path.display());
    }

    let tmp = tmp_path_for(parent, path);
    let mut oo = OpenOptions::new();
    oo.create_new(true).write(true);
    #[cfg(unix)]
    {
        oo.mode(MODE_FILE_PRIVATE);
    }
    let mut f = oo
        .open(&tmp)
        .with_context(|| format!("open temp {}", tmp.display()))?;

    let written = f
        .write_all(bytes)
        .and_then(|()| f.flush())
        .and_then(|()| f.sync_all());
    drop(f);
    if let Err(e) = written {
        drop(fs::remove_file(&tmp));
        return Err(eyre::Report::new(e).wrap_err(format!("write {}", tmp.display())));
    }

    // `rename` does not replace an existing destination on Windows.
    #[cfg(windows)]
    {
        if path.exists() {
            fs::remove_file(path).with_context(|| format!("remove existing {}", path.display()))?;
        }
    }

    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

/// Read a UTF-8 file, mapping "does not exist" to `None`.
pub fn read_optional_string(path: &Path) -> eyre::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(eyre::Report::new(e).wrap_err(format!("read {}", path.display()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_contents_and_leaves_no_temp_files() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let p = dir.path().join("nested").join("state.json");

        assert_eq!(read_optional_string(&p)?, None);
        write_atomic_private(&p, b"one")?;
        write_atomic_private(&p, b"two")?;
        assert_eq!(read_optional_string(&p)?.as_deref(), Some("two"));

        let parent = p.parent().ok_or_else(|| eyre::eyre!("missing parent"))?;
        let leftovers = fs::read_dir(parent)?
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .count();
        assert_eq!(leftovers, 0, "temp files must be renamed away");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn written_files_are_owner_only() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let p = dir.path().join("state.json");
        write_atomic_private(&p, b"{}")?;
        let mode = fs::metadata(&p)?.permissions().mode() & 0o777;
        assert_eq!(mode, MODE_FILE_PRIVATE);
        Ok(())
    }
}
