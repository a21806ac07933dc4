//! Startup configuration loading.
//!
//! The configuration tree lives under a root directory:
//!
//! ```text
//! <root>/configs/config.json     {"default_account": "a@x.com"}
//! <root>/configs/accounts/*      one account object per file
//! ```
//!
//! Missing files and directories are not errors; the registry simply stays
//! smaller.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::account::AccountRegistry;
use crate::{Error, Result};

/// Environment variable overriding the configuration root.
pub const ROOT_ENV: &str = "MAILRELAY_ROOT";

/// Contents of `configs/config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GlobalConfig {
    /// Account used when a request names none.
    #[serde(default, alias = "defaultAccount")]
    pub default_account: Option<String>,
}

/// Reads the configuration tree into an [`AccountRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLoader {
    root: PathBuf,
}

impl ConfigLoader {
    /// Creates a loader reading from `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates a loader for the default root: `$MAILRELAY_ROOT` when set,
    /// otherwise the directory holding the running executable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if neither is available.
    pub fn from_env() -> Result<Self> {
        if let Some(root) = std::env::var_os(ROOT_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::new(root));
        }
        Self::executable_dir().map(Self::new)
    }

    fn executable_dir() -> Result<PathBuf> {
        let exe = std::env::current_exe()
            .map_err(|e| Error::Config(format!("cannot locate executable: {e}")))?;
        exe.parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::Config(format!("{} has no parent directory", exe.display())))
    }

    /// Root directory of the configuration tree.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the global configuration file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.root.join("configs").join("config.json")
    }

    /// Directory holding one file per account.
    #[must_use]
    pub fn accounts_dir(&self) -> PathBuf {
        self.root.join("configs").join("accounts")
    }

    /// Populates `registry` from the configuration tree.
    ///
    /// A `default_account` in `config.json` overrides the default login no
    /// matter which account file is read first. Account files are read in
    /// file name order; entries that are not regular files are skipped, and
    /// accounts the registry rejects are logged there and not counted.
    ///
    /// Returns the number of accounts registered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if a file is not valid JSON and [`Error::Io`]
    /// if an existing file or directory cannot be read.
    pub fn load_configuration(&self, registry: &mut AccountRegistry) -> Result<usize> {
        let global = self.read_global()?;
        if let Some(default) = &global.default_account {
            registry.set_default_login(default.clone());
        }

        let mut loaded = 0;
        for path in self.account_files()? {
            if registry.add_account(read_json(&path)?) {
                loaded += 1;
            } else {
                debug!(path = %path.display(), "account file skipped");
            }
        }

        if let Some(default) = global.default_account {
            registry.set_default_login(default);
        }

        info!("{loaded} account(s) loaded");
        Ok(loaded)
    }

    fn read_global(&self) -> Result<GlobalConfig> {
        let path = self.config_file();
        if !path.is_file() {
            debug!(path = %path.display(), "no global config");
            return Ok(GlobalConfig::default());
        }
        serde_json::from_value(read_json(&path)?).map_err(|source| Error::Json { path, source })
    }

    fn account_files(&self) -> Result<Vec<PathBuf>> {
        let dir = self.accounts_dir();
        if !dir.is_dir() {
            debug!(path = %dir.display(), "no accounts directory");
            return Ok(Vec::new());
        }

        let io_err = |source| Error::Io {
            path: dir.clone(),
            source,
        };
        let mut files = Vec::new();
        for entry in fs::read_dir(&dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let path = entry.path();
            if path.is_file() {
                files.push(path);
            } else {
                debug!(path = %path.display(), "not a regular file, skipping");
            }
        }
        files.sort();
        Ok(files)
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })
}
