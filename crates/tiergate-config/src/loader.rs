use notify::{Event as NotifyEvent, EventKind, RecursiveMode, Watcher};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tiergate_core::{GateError, PermissionTier};
use tracing::{info, warn};

use crate::schema::GateConfig;

/// Loads and optionally hot-reloads the gate configuration.
///
/// Every load path parses *and* validates before anything is replaced, so a
/// broken file never displaces a working config.
pub struct ConfigLoader {
    config: Arc<RwLock<GateConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > TIERGATE_CONFIG env > ~/.tiergate/tiergate.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("TIERGATE_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tiergate")
            .join("tiergate.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> tiergate_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            Self::parse(&raw, &config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            GateConfig::default()
        };

        let config = Self::apply_env_overrides(config)?;
        Self::check(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> GateConfig {
        self.config.read().clone()
    }

    /// Get a shared reference for subscription.
    pub fn shared(&self) -> Arc<RwLock<GateConfig>> {
        Arc::clone(&self.config)
    }

    /// Path being watched.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    fn parse(raw: &str, path: &Path) -> tiergate_core::Result<GateConfig> {
        toml::from_str::<GateConfig>(raw).map_err(|e| {
            GateError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Validate, logging warnings and failing on errors.
    fn check(config: &GateConfig) -> tiergate_core::Result<()> {
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
                Ok(())
            }
            Err(e) => Err(GateError::Config(e)),
        }
    }

    /// Apply env var overrides (TIERGATE_LOG_LEVEL, TIERGATE_INITIAL_TIER, etc.)
    fn apply_env_overrides(mut config: GateConfig) -> tiergate_core::Result<GateConfig> {
        if let Ok(v) = std::env::var("TIERGATE_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("TIERGATE_LOG_FORMAT") {
            config.logging.format = v;
        }
        if let Ok(v) = std::env::var("TIERGATE_STATE_PATH") {
            config.state.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("TIERGATE_INITIAL_TIER") {
            let tier = v
                .parse::<u8>()
                .map_err(|e| e.to_string())
                .and_then(|n| PermissionTier::try_from(n).map_err(|e| e.to_string()))
                .map_err(|reason| GateError::ConfigValidation {
                    field: "TIERGATE_INITIAL_TIER".into(),
                    reason,
                })?;
            config.catalog.initial_tier = tier;
        }
        Ok(config)
    }

    fn read_validated(path: &Path) -> tiergate_core::Result<GateConfig> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::apply_env_overrides(Self::parse(&raw, path)?)?;
        Self::check(&config)?;
        Ok(config)
    }

    /// Reload the config from disk. On any error the current config stays.
    pub fn reload(&self) -> tiergate_core::Result<GateConfig> {
        if !self.config_path.exists() {
            return Err(GateError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let new_config = Self::read_validated(&self.config_path)?;
        *self.config.write() = new_config.clone();
        info!("configuration reloaded");
        Ok(new_config)
    }

    /// Start a background file watcher that reloads when the config file changes
    /// and hands each accepted config to `on_reload`.
    /// Returns a handle to the watcher (must be kept alive for watching to continue).
    pub fn watch<F>(&self, on_reload: F) -> tiergate_core::Result<notify::RecommendedWatcher>
    where
        F: Fn(&GateConfig) + Send + 'static,
    {
        let config = Arc::clone(&self.config);
        let config_path = self.config_path.clone();

        info!(?config_path, "starting config file watcher");

        let path_for_event = config_path.clone();
        let mut watcher = notify::recommended_watcher(
            move |res: Result<NotifyEvent, notify::Error>| match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    let is_our_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == path_for_event.file_name());
                    if !is_our_file {
                        return;
                    }

                    info!("config file changed, reloading");
                    match ConfigLoader::read_validated(&path_for_event) {
                        Ok(new_config) => {
                            *config.write() = new_config.clone();
                            on_reload(&new_config);
                            info!("configuration hot-reloaded successfully");
                        }
                        Err(e) => {
                            warn!(error = %e, "config file rejected, keeping current config");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "file watcher error");
                }
            },
        )
        .map_err(|e| GateError::Config(format!("failed to create file watcher: {}", e)))?;

        // Watch the parent directory (some editors create temp files + rename)
        let watch_path = self.config_path.parent().unwrap_or(Path::new("."));
        watcher
            .watch(watch_path, RecursiveMode::NonRecursive)
            .map_err(|e| GateError::Config(format!("failed to watch config directory: {}", e)))?;

        Ok(watcher)
    }
}
