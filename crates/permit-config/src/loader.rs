//! Multi-source configuration loading

use crate::{ConfigError, Paths, PermitConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Default prefix of environment overrides (`PERMIT_ISSUER__APPROVAL=external`).
pub const ENV_PREFIX: &str = "PERMIT";

/// Separator between nested keys in environment overrides.
pub const ENV_SEPARATOR: &str = "__";

/// Loads a [`PermitConfig`] from defaults, files and the environment.
///
/// Later sources override earlier ones:
///
/// 1. built-in defaults
/// 2. user config (`~/.config/permit/config.toml`, or `config.toml` in the
///    directory given to [`ConfigLoader::with_config_dir`])
/// 3. `permit.toml` in the project directory
/// 4. `permit.local.toml` in the project directory
/// 5. `PERMIT_*` environment variables
pub struct ConfigLoader {
    project_dir: PathBuf,
    config_dir: Option<PathBuf>,
    env_prefix: String,
}

impl ConfigLoader {
    /// A loader rooted at the current directory.
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_dir: None,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Reads the user config from `dir` instead of the XDG location.
    pub fn with_config_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Merges every source, then validates the result.
    pub fn load(self) -> Result<PermitConfig, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&PermitConfig::default())?);

        let user_file = match &self.config_dir {
            Some(dir) => Some(Paths::config_file_in(dir)),
            None => Paths::new().user_config_file().ok(),
        };
        let files = user_file.into_iter().chain([
            Paths::project_config_file(&self.project_dir),
            Paths::local_config_file(&self.project_dir),
        ]);
        for file in files.filter(|f| f.exists()) {
            builder = builder.add_source(
                config::File::from(file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let config: PermitConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
