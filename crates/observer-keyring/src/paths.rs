use directories::ProjectDirs;
use eyre::{Context as _, ContextCompat as _};
use fs2::FileExt as _;
use std::{
    fs::{File, OpenOptions},
    path::PathBuf,
};

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt as _;

#[derive(Debug, Clone)]
pub struct KeyringPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub log_file: PathBuf,
}

impl KeyringPaths {
    pub fn discover() -> eyre::Result<Self> {
        // Test/CI override knobs.
        if let (Ok(data_dir), Ok(config_dir)) = (
            std::env::var("OBSERVER_KEYRING_DATA_DIR"),
            std::env::var("OBSERVER_KEYRING_CONFIG_DIR"),
        ) {
            let data_dir = PathBuf::from(data_dir);
            let config_dir = PathBuf::from(config_dir);
            let log_file = data_dir.join("observer-keyring.log.jsonl");
            return Ok(Self {
                config_dir,
                data_dir,
                log_file,
            });
        }

        let proj = ProjectDirs::from("", "", "observer-keyring")
            .context("failed to resolve project dirs")?;
        let data_dir = proj.data_dir().to_path_buf();
        let log_file = data_dir.join("observer-keyring.log.jsonl");

        Ok(Self {
            config_dir: proj.config_dir().to_path_buf(),
            data_dir,
            log_file,
        })
    }

    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join("keyring_state.json")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.data_dir.join("observer-keyring.lock")
    }

    pub fn ensure_private_dirs(&self) -> eyre::Result<()> {
        crate::fsutil::ensure_private_dir(&self.config_dir)?;
        crate::fsutil::ensure_private_dir(&self.data_dir)?;
        Ok(())
    }

    /// Take the exclusive lock that makes this process the state file's only writer.
    ///
    /// The lock lives as long as the returned handle.
    pub fn acquire_state_lock(&self) -> eyre::Result<File> {
        self.ensure_private_dirs()?;
        let p = self.lock_file();
        let mut oo = OpenOptions::new();
        oo.create(true).read(true).write(true).truncate(false);
        #[cfg(unix)]
        {
            oo.mode(crate::fsutil::MODE_FILE_PRIVATE);
        }
        let f = oo.open(&p).with_context(|| format!("open {}", p.display()))?;
        match f.try_lock_exclusive() {
            Ok(()) => Ok(f),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => eyre::bail!(
                "another observer-keyring process owns {}",
                self.data_dir.display()
            ),
            Err(e) => Err(eyre::Report::new(e).wrap_err("lock state directory")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths_in(dir: &std::path::Path) -> KeyringPaths {
        KeyringPaths {
            config_dir: dir.join("config"),
            data_dir: dir.join("data"),
            log_file: dir.join("data").join("observer-keyring.log.jsonl"),
        }
    }

    #[test]
    fn state_lock_is_exclusive_until_dropped() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let paths = paths_in(dir.path());

        let held = paths.acquire_state_lock()?;
        assert!(
            paths.acquire_state_lock().is_err(),
            "second lock must fail while the first is held"
        );
        drop(held);
        let again = paths.acquire_state_lock()?;
        drop(again);
        Ok(())
    }

    #[test]
    fn state_file_lives_in_data_dir() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let paths = paths_in(dir.path());
        assert!(paths.state_file().starts_with(&paths.data_dir));
        assert!(paths.lock_file().starts_with(&paths.data_dir));
        Ok(())
    }
}
