use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::model::Mood;
use crate::search::{SortDirection, SortField, SortSpec};

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "Booknook";
const APP_NAME: &str = "booknook";

pub const CONFIG_ENV: &str = "BOOKNOOK_CONFIG";
pub const DATA_ENV: &str = "BOOKNOOK_DATA";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn with_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = AppConfig::default();
            default_cfg.post_load(&self.paths)?;
            self.write_default_config(&default_cfg)?;
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load(&self.paths)?;
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub state_dir: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let override_data = env::var(DATA_ENV).ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let data_root = override_data.unwrap_or_else(|| project_dirs.data_dir().to_path_buf());
        let state_dir = project_dirs
            .state_dir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| data_root.join("state"));

        Ok(Self::rooted(config_dir, config_file, data_root, state_dir))
    }

    /// Everything under one directory; used for `--data-dir` and tests.
    pub fn under(root: &Path) -> Self {
        let config_dir = root.join("config");
        let config_file = config_dir.join("config.toml");
        Self::rooted(config_dir, config_file, root.to_path_buf(), root.join("state"))
    }

    fn rooted(
        config_dir: PathBuf,
        config_file: PathBuf,
        data_dir: PathBuf,
        state_dir: PathBuf,
    ) -> Self {
        Self {
            config_dir,
            config_file,
            database_path: data_dir.join("journal.db"),
            data_dir,
            state_dir,
        }
    }

    /// Crash-recovery draft snapshots.
    pub fn recovery_dir(&self) -> PathBuf {
        self.state_dir.join("drafts")
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.data_dir, &self.state_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub auto_save: AutoSaveConfig,
    pub gateway: GatewayConfig,
    pub storage: StorageOptions,
    pub search: SearchOptions,
    pub editor: EditorConfig,
}

impl AppConfig {
    fn post_load(&mut self, paths: &ConfigPaths) -> Result<()> {
        self.storage
            .resolve(paths)
            .context("resolving storage paths")?;
        if Mood::resolve(&self.editor.default_mood).is_none() {
            tracing::warn!(
                mood = %self.editor.default_mood,
                "unknown default mood in config, falling back to healing"
            );
            self.editor.default_mood = Mood::default().key().to_string();
        }
        if self.auto_save.snapshot_retention_hours > MAX_SNAPSHOT_RETENTION_HOURS {
            tracing::warn!(
                hours = self.auto_save.snapshot_retention_hours,
                max = MAX_SNAPSHOT_RETENTION_HOURS,
                "snapshot retention too long, capping"
            );
            self.auto_save.snapshot_retention_hours = MAX_SNAPSHOT_RETENTION_HOURS;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSaveConfig {
    pub debounce_ms: u64,
    pub enabled: bool,
    pub crash_recovery: bool,
    /// Retain crash-recovery snapshots for this many hours (0 = keep indefinitely)
    pub snapshot_retention_hours: u64,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 30_000,
            enabled: true,
            crash_recovery: true,
            snapshot_retention_hours: 24 * 7,
        }
    }
}

/// Ten years.
pub const MAX_SNAPSHOT_RETENTION_HOURS: u64 = 24 * 365 * 10;

impl AutoSaveConfig {
    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_ms)
    }

    pub fn snapshot_retention(&self) -> Option<Duration> {
        if self.snapshot_retention_hours == 0 {
            None
        } else {
            let hours = self.snapshot_retention_hours.min(MAX_SNAPSHOT_RETENTION_HOURS);
            Some(Duration::hours(i64::try_from(hours).unwrap_or(i64::MAX)))
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    #[default]
    Sqlite,
    /// Process-local, nothing survives exit.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub backend: Backend,
    pub request_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Sqlite,
            request_timeout_ms: 30_000,
        }
    }
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    #[serde(skip)]
    pub database_path: PathBuf,
    pub wal_autocheckpoint: u32,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            database_path: PathBuf::new(),
            wal_autocheckpoint: 1000,
        }
    }
}

impl StorageOptions {
    fn resolve(&mut self, paths: &ConfigPaths) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = paths.database_path.clone();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub default_limit: usize,
    pub default_sort: SortSpec,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            default_limit: 50,
            default_sort: SortSpec {
                field: SortField::Created,
                direction: SortDirection::Descending,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Mood key applied to new entries and letters.
    pub default_mood: String,
    pub excerpt_graphemes: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            default_mood: Mood::default().key().to_string(),
            excerpt_graphemes: 120,
        }
    }
}

impl EditorConfig {
    pub fn default_mood(&self) -> Mood {
        Mood::resolve_or_default(&self.default_mood)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn load_or_init_writes_defaults_once() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let loader = ConfigLoader::with_paths(ConfigPaths::under(temp.path()));

        let first = loader.load_or_init()?;
        assert!(loader.paths().config_file.exists());
        assert_eq!(first.auto_save.debounce(), std::time::Duration::from_secs(30));
        assert_eq!(first.gateway.backend, Backend::Sqlite);
        assert_eq!(
            first.storage.database_path,
            temp.path().join("journal.db")
        );

        let second = loader.load_or_init()?;
        assert_eq!(second.search.default_limit, 50);
        assert_eq!(second.editor.default_mood(), Mood::Healing);
        Ok(())
    }

    #[test]
    fn partial_file_keeps_defaults_and_resets_unknown_mood() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::under(temp.path());
        paths.ensure_directories()?;
        fs::write(
            &paths.config_file,
            "[auto_save]\ndebounce_ms = 500\n\n[gateway]\nbackend = \"memory\"\n\n[editor]\ndefault_mood = \"grumpy\"\n",
        )?;

        let cfg = ConfigLoader::with_paths(paths).load()?;
        assert_eq!(cfg.auto_save.debounce_ms, 500);
        assert!(cfg.auto_save.crash_recovery);
        assert_eq!(cfg.gateway.backend, Backend::Memory);
        assert_eq!(cfg.gateway.request_timeout_ms, 30_000);
        assert_eq!(cfg.editor.default_mood, "healing");
        Ok(())
    }

    #[test]
    fn zero_retention_keeps_snapshots_forever() {
        let cfg = AutoSaveConfig {
            snapshot_retention_hours: 0,
            ..AutoSaveConfig::default()
        };
        assert_eq!(cfg.snapshot_retention(), None);
        assert_eq!(
            AutoSaveConfig::default().snapshot_retention(),
            Some(Duration::hours(168))
        );
    }

    #[test]
    fn oversized_retention_is_capped() -> anyhow::Result<()> {
        let cfg = AutoSaveConfig {
            snapshot_retention_hours: u64::MAX,
            ..AutoSaveConfig::default()
        };
        let max = Duration::hours(MAX_SNAPSHOT_RETENTION_HOURS as i64);
        assert_eq!(cfg.snapshot_retention(), Some(max));

        let temp = TempDir::new()?;
        let paths = ConfigPaths::under(temp.path());
        paths.ensure_directories()?;
        fs::write(
            &paths.config_file,
            "[auto_save]\nsnapshot_retention_hours = 9223372036854775807\n",
        )?;
        let cfg = ConfigLoader::with_paths(paths).load()?;
        assert_eq!(cfg.auto_save.snapshot_retention_hours, MAX_SNAPSHOT_RETENTION_HOURS);
        assert_eq!(cfg.auto_save.snapshot_retention(), Some(max));
        Ok(())
    }

    #[test]
    fn recovery_dir_lives_under_state() {
        let paths = ConfigPaths::under(Path::new("/tmp/booknook"));
        assert_eq!(paths.recovery_dir(), PathBuf::from("/tmp/booknook/state/drafts"));
        assert_eq!(paths.database_path, PathBuf::from("/tmp/booknook/journal.db"));
    }
}
