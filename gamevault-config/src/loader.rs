use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, anyhow};
use gamevault_core::config::VaultConfig;
use tracing::debug;

/// Path to a TOML or JSON config file.
pub const CONFIG_PATH_ENV: &str = "GAMEVAULT_CONFIG_PATH";
/// Inline JSON config.
pub const CONFIG_JSON_ENV: &str = "GAMEVAULT_CONFIG_JSON";
/// Content roots, separated like `PATH` on the host platform.
pub const ROOTS_ENV: &str = "GAMEVAULT_ROOTS";
pub const IGDB_CLIENT_ID_ENV: &str = "IGDB_CLIENT_ID";
pub const IGDB_CLIENT_SECRET_ENV: &str = "IGDB_CLIENT_SECRET";

const DEFAULT_CANDIDATES: &[&str] = &[
    "gamevault.toml",
    "gamevault.json",
    "config/gamevault.toml",
    "config/gamevault.json",
];

/// Source that produced the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    /// Passed on the command line.
    Explicit(PathBuf),
    EnvPath(PathBuf),
    EnvInline,
    /// Found among the default candidate files.
    File(PathBuf),
}

/// A loaded configuration and where it came from.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: VaultConfig,
    pub source: ConfigSource,
    /// Environment variables that overrode file values.
    pub env_overrides: Vec<&'static str>,
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Resolves a [`VaultConfig`].
///
/// Evaluation order:
/// 1) an explicit path (`--config`),
/// 2) `$GAMEVAULT_CONFIG_PATH` (TOML or JSON file),
/// 3) `$GAMEVAULT_CONFIG_JSON` (inline JSON),
/// 4) the first existing default candidate (`gamevault.toml`, `gamevault.json`,
///    `config/gamevault.toml`, `config/gamevault.json`),
/// 5) defaults.
///
/// `IGDB_CLIENT_ID`, `IGDB_CLIENT_SECRET` and `GAMEVAULT_ROOTS` are applied on
/// top of whichever source won.
pub struct ConfigLoader {
    lookup: Lookup,
    base_dir: PathBuf,
    explicit_path: Option<PathBuf>,
}

impl fmt::Debug for ConfigLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigLoader")
            .field("base_dir", &self.base_dir)
            .field("explicit_path", &self.explicit_path)
            .finish()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader reading the process environment relative to the working directory.
    pub fn new() -> Self {
        Self {
            lookup: Box::new(|key| env::var(key).ok()),
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            explicit_path: None,
        }
    }

    /// Replace the environment lookup.
    pub fn with_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.lookup = Box::new(lookup);
        self
    }

    /// Directory that relative config paths and default candidates resolve against.
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn with_path(mut self, path: Option<PathBuf>) -> Self {
        self.explicit_path = path;
        self
    }

    pub fn load(&self) -> anyhow::Result<ConfigLoad> {
        let (mut config, source) = self.load_base()?;
        let env_overrides = self.apply_env_overrides(&mut config);
        debug!(?source, ?env_overrides, "configuration resolved");
        Ok(ConfigLoad {
            config,
            source,
            env_overrides,
        })
    }

    fn load_base(&self) -> anyhow::Result<(VaultConfig, ConfigSource)> {
        if let Some(path) = &self.explicit_path {
            let path = self.resolve(path);
            let config = Self::load_from_file(&path)?;
            return Ok((config, ConfigSource::Explicit(path)));
        }

        if let Some(path_str) = self.var(CONFIG_PATH_ENV) {
            let path = self.resolve(Path::new(&path_str));
            let config = Self::load_from_file(&path)?;
            return Ok((config, ConfigSource::EnvPath(path)));
        }

        if let Some(raw) = self.var(CONFIG_JSON_ENV) {
            let parsed = Self::parse_json(&raw)
                .with_context(|| format!("failed to parse {CONFIG_JSON_ENV}"))?;
            return Ok((parsed, ConfigSource::EnvInline));
        }

        if let Some(path) = self.find_default_file() {
            let config = Self::load_from_file(&path)?;
            return Ok((config, ConfigSource::File(path)));
        }

        Ok((VaultConfig::default(), ConfigSource::Default))
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<VaultConfig> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents)
                .with_context(|| format!("invalid config {}", path.display())),
            Some("toml") | Some("tml") => toml::from_str(&contents)
                .map_err(|err| anyhow!("invalid config {}: {}", path.display(), err)),
            _ => Self::parse_from_str(&contents, &path.display().to_string()),
        }
    }

    pub fn parse_from_str(contents: &str, origin: &str) -> anyhow::Result<VaultConfig> {
        // Try TOML first, then JSON.
        toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                anyhow!(
                    "failed to parse config {}: toml error: {}; json error: {}",
                    origin,
                    toml_err,
                    json_err
                )
            })
        })
    }

    pub fn parse_json(raw: &str) -> anyhow::Result<VaultConfig> {
        serde_json::from_str(raw).map_err(|err| anyhow!("invalid config json: {err}"))
    }

    fn apply_env_overrides(&self, config: &mut VaultConfig) -> Vec<&'static str> {
        let mut applied = Vec::new();

        if let Some(client_id) = self.var(IGDB_CLIENT_ID_ENV) {
            config.providers.igdb.client_id = client_id;
            applied.push(IGDB_CLIENT_ID_ENV);
        }
        if let Some(secret) = self.var(IGDB_CLIENT_SECRET_ENV) {
            config.providers.igdb.client_secret = secret;
            applied.push(IGDB_CLIENT_SECRET_ENV);
        }
        if let Some(raw) = self.var(ROOTS_ENV) {
            config.roots = env::split_paths(&raw)
                .filter(|path| !path.as_os_str().is_empty())
                .collect();
            applied.push(ROOTS_ENV);
        }

        applied
    }

    fn find_default_file(&self) -> Option<PathBuf> {
        DEFAULT_CANDIDATES
            .iter()
            .map(|candidate| self.base_dir.join(candidate))
            .find(|path| path.exists())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Non-blank environment value.
    fn var(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|value| !value.trim().is_empty())
    }
}
