use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use nix::fcntl::{Flock, FlockArg};

use crate::config::Config;
use crate::error::{Error, IoResultExt, Result};
use crate::refs::{branch_ref, write_symbolic_ref, HEAD};

/// a cairn repository
pub struct Repo {
    path: PathBuf,
    config: Config,
}

impl Repo {
    /// initialize a new repository at the given path
    pub fn init(path: &Path) -> Result<Self> {
        Self::init_with_config(path, Config::default())
    }

    /// initialize a new repository with an explicit configuration
    pub fn init_with_config(path: &Path, config: Config) -> Result<Self> {
        let config_path = path.join("config.toml");
        if config_path.exists() {
            return Err(Error::RepoExists(path.to_path_buf()));
        }

        // create directory structure
        std::fs::create_dir_all(path.join("objects")).with_path(path)?;
        std::fs::create_dir_all(path.join("refs/heads")).with_path(path)?;
        std::fs::create_dir_all(path.join("refs/tags")).with_path(path)?;
        std::fs::create_dir_all(path.join("tmp")).with_path(path)?;

        config.save(&config_path)?;

        let repo = Self {
            path: path.to_path_buf(),
            config,
        };

        // HEAD starts out pointing at an unborn default branch
        let default_branch = branch_ref(&repo.config.core.default_branch);
        write_symbolic_ref(&repo, HEAD, &default_branch)?;

        tracing::info!(path = %path.display(), branch = %default_branch, "initialized repository");
        Ok(repo)
    }

    /// open an existing repository
    pub fn open(path: &Path) -> Result<Self> {
        let config_path = path.join("config.toml");
        if !config_path.exists() {
            return Err(Error::NoRepo(path.to_path_buf()));
        }

        let config = Config::load(&config_path)?;

        Ok(Self {
            path: path.to_path_buf(),
            config,
        })
    }

    /// repository root path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// repository configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// mutable access to configuration
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// save configuration changes
    pub fn save_config(&self) -> Result<()> {
        self.config.save(&self.config_path())
    }

    /// path to config.toml
    pub fn config_path(&self) -> PathBuf {
        self.path.join("config.toml")
    }

    /// path to objects directory
    pub fn objects_path(&self) -> PathBuf {
        self.path.join("objects")
    }

    /// path to refs directory
    pub fn refs_path(&self) -> PathBuf {
        self.path.join("refs")
    }

    /// path to the index file
    pub fn index_path(&self) -> PathBuf {
        self.path.join("index")
    }

    /// path to tmp directory (for atomic writes)
    pub fn tmp_path(&self) -> PathBuf {
        self.path.join("tmp")
    }

    /// fresh unique path inside tmp/
    pub(crate) fn tmp_file_path(&self) -> PathBuf {
        self.tmp_path().join(uuid::Uuid::new_v4().to_string())
    }

    /// write `data` to `target` via temp file -> fsync -> rename -> fsync dir
    ///
    /// the temp file is removed if any step before the rename fails.
    pub(crate) fn write_atomic(&self, target: &Path, data: &[u8]) -> Result<()> {
        let tmp_path = self.tmp_file_path();
        let written = write_synced(&tmp_path, data)
            .and_then(|()| fs::rename(&tmp_path, target).with_path(target));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        match target.parent() {
            Some(parent) => fsync_dir(parent),
            None => Ok(()),
        }
    }
}

fn write_synced(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = File::create(path).with_path(path)?;
    file.write_all(data).with_path(path)?;
    file.sync_all().with_path(path)
}

/// fsync a directory
pub(crate) fn fsync_dir(path: &Path) -> Result<()> {
    let dir = File::open(path).with_path(path)?;
    dir.sync_all().with_path(path)
}

/// guard holding an exclusive flock until dropped
pub struct FileLock {
    #[allow(dead_code)]
    flock: Flock<File>,
    path: PathBuf,
}

impl FileLock {
    /// try to take an exclusive lock on `path` without blocking
    ///
    /// returns None when another holder has it.
    pub fn try_acquire(path: &Path) -> Result<Option<FileLock>> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_path(path)?;

        let flock = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(flock) => flock,
            Err((_, nix::errno::Errno::EWOULDBLOCK)) => return Ok(None),
            Err(_) => return Err(Error::LockContention(path.to_path_buf())),
        };

        // the previous holder unlinks the file on release; if we locked an
        // inode that is no longer at `path`, someone else may lock the new one
        let locked = flock.metadata().with_path(path)?;
        match std::fs::metadata(path) {
            Ok(current) if current.dev() == locked.dev() && current.ino() == locked.ino() => {
                Ok(Some(FileLock {
                    flock,
                    path: path.to_path_buf(),
                }))
            }
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    /// take the lock or fail with `LockContention`
    pub fn acquire(path: &Path) -> Result<FileLock> {
        Self::try_acquire(path)?.ok_or_else(|| Error::LockContention(path.to_path_buf()))
    }

    /// the lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // lock files are advisory; a stale file left behind is harmless
        let _ = std::fs::remove_file(&self.path);
    }
}
