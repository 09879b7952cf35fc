//! Where configuration files live

use crate::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

const USER_CONFIG_FILE: &str = "config.toml";
const PROJECT_CONFIG_FILE: &str = "permit.toml";
const LOCAL_CONFIG_FILE: &str = "permit.local.toml";

/// XDG-compliant paths for permit
pub struct Paths {
    project_dirs: Option<ProjectDirs>,
}

impl Paths {
    pub fn new() -> Self {
        Self {
            project_dirs: ProjectDirs::from("dev", "permit", "permit"),
        }
    }

    /// User config directory (`~/.config/permit/` on Linux)
    pub fn user_config_dir(&self) -> Result<PathBuf, ConfigError> {
        self.project_dirs
            .as_ref()
            .map(|p| p.config_dir().to_path_buf())
            .ok_or_else(|| ConfigError::Xdg("no home directory to hold user config".to_string()))
    }

    /// `config.toml` inside the user config directory
    pub fn user_config_file(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.user_config_dir()?.join(USER_CONFIG_FILE))
    }

    /// `config.toml` inside an explicitly chosen config directory
    pub fn config_file_in(dir: impl AsRef<Path>) -> PathBuf {
        dir.as_ref().join(USER_CONFIG_FILE)
    }

    /// Project config (`permit.toml`)
    pub fn project_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join(PROJECT_CONFIG_FILE)
    }

    /// Local overrides (`permit.local.toml`, kept out of version control)
    pub fn local_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join(LOCAL_CONFIG_FILE)
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
